//! Discount storage contracts and in-memory implementations.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use common::{CategoryId, DiscountId, ProductId};
use tokio::sync::RwLock;

use super::{Discount, DiscountRule, DiscountTargets, normalize_code};
use crate::repository::{RepositoryError, RepositoryResult};

const ENTITY: &str = "Discount";

/// Storage for discount definitions and their usage counters.
#[async_trait]
pub trait DiscountRepository: Send + Sync {
    /// Stores a new discount and assigns its id. Codes are unique.
    async fn insert(&self, discount: Discount) -> RepositoryResult<Discount>;

    /// Loads a discount by id.
    async fn get(&self, id: DiscountId) -> RepositoryResult<Option<Discount>>;

    /// Loads a discount by (case-insensitive) code.
    async fn find_by_code(&self, code: &str) -> RepositoryResult<Option<Discount>>;

    /// Replaces a discount definition. The usage counter is left untouched.
    async fn update(&self, discount: &Discount) -> RepositoryResult<()>;

    /// Atomically bumps the usage counter if the discount is active and under
    /// its limit. Returns false when the limit is already reached.
    ///
    /// This is a single conditional increment; implementations must not read
    /// the counter and write it back in separate steps.
    async fn try_increment_usage(&self, id: DiscountId) -> RepositoryResult<bool>;

    /// Gives back one redemption after a failed order creation.
    async fn release_usage(&self, id: DiscountId) -> RepositoryResult<()>;
}

/// Expands category restrictions into product ids.
#[async_trait]
pub trait CategoryResolver: Send + Sync {
    /// Returns every product belonging to at least one of the categories.
    async fn products_in_categories(
        &self,
        categories: &BTreeSet<CategoryId>,
    ) -> RepositoryResult<BTreeSet<ProductId>>;
}

/// Expands a rule's category restriction into the targets the engine sees.
///
/// Basket rules and rules without categories resolve to no extra targets.
pub async fn resolve_targets(
    resolver: &dyn CategoryResolver,
    rule: &DiscountRule,
) -> RepositoryResult<DiscountTargets> {
    let categories = rule.kind().category_ids();
    if categories.is_empty() {
        return Ok(DiscountTargets::none());
    }
    let products = resolver.products_in_categories(&categories).await?;
    Ok(DiscountTargets::new(products))
}

#[derive(Debug, Default)]
struct DiscountTable {
    rows: HashMap<DiscountId, Discount>,
    next_id: i64,
}

/// In-memory discount repository for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDiscountRepository {
    state: Arc<RwLock<DiscountTable>>,
}

impl InMemoryDiscountRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DiscountRepository for InMemoryDiscountRepository {
    async fn insert(&self, mut discount: Discount) -> RepositoryResult<Discount> {
        let mut state = self.state.write().await;
        if state.rows.values().any(|d| d.code() == discount.code()) {
            return Err(RepositoryError::Duplicate {
                entity: ENTITY,
                key: discount.code().to_string(),
            });
        }

        state.next_id += 1;
        let id = DiscountId::new(state.next_id);
        discount.assign_id(id);
        state.rows.insert(id, discount.clone());
        Ok(discount)
    }

    async fn get(&self, id: DiscountId) -> RepositoryResult<Option<Discount>> {
        Ok(self.state.read().await.rows.get(&id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> RepositoryResult<Option<Discount>> {
        let code = normalize_code(code);
        let state = self.state.read().await;
        Ok(state.rows.values().find(|d| d.code() == code).cloned())
    }

    async fn update(&self, discount: &Discount) -> RepositoryResult<()> {
        let id = discount
            .id()
            .ok_or(RepositoryError::NotPersisted { entity: ENTITY })?;
        let mut state = self.state.write().await;

        if state
            .rows
            .values()
            .any(|d| d.id() != Some(id) && d.code() == discount.code())
        {
            return Err(RepositoryError::Duplicate {
                entity: ENTITY,
                key: discount.code().to_string(),
            });
        }

        let stored = state
            .rows
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::not_found(ENTITY, id))?;
        let usage = stored.current_usage();
        *stored = discount.clone();
        stored.restore_usage(usage);
        Ok(())
    }

    async fn try_increment_usage(&self, id: DiscountId) -> RepositoryResult<bool> {
        let mut state = self.state.write().await;
        let stored = state
            .rows
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::not_found(ENTITY, id))?;

        if !stored.is_active() || !stored.has_remaining_usage() {
            return Ok(false);
        }
        let next = stored.current_usage() + 1;
        stored.restore_usage(next);
        Ok(true)
    }

    async fn release_usage(&self, id: DiscountId) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        let stored = state
            .rows
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::not_found(ENTITY, id))?;
        let previous = stored.current_usage().saturating_sub(1);
        stored.restore_usage(previous);
        Ok(())
    }
}

/// In-memory product/category membership for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    memberships: Arc<RwLock<HashMap<CategoryId, BTreeSet<ProductId>>>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Places a product in a category.
    pub async fn assign(&self, product_id: ProductId, category_id: CategoryId) {
        self.memberships
            .write()
            .await
            .entry(category_id)
            .or_default()
            .insert(product_id);
    }
}

#[async_trait]
impl CategoryResolver for InMemoryCatalog {
    async fn products_in_categories(
        &self,
        categories: &BTreeSet<CategoryId>,
    ) -> RepositoryResult<BTreeSet<ProductId>> {
        let memberships = self.memberships.read().await;
        Ok(categories
            .iter()
            .filter_map(|c| memberships.get(c))
            .flatten()
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discount::{DiscountKind, DiscountMethod, DiscountRule, ValidityWindow};
    use crate::money::Money;
    use chrono::{Duration, Utc};

    fn discount(code: &str, limit: u32) -> Discount {
        let now = Utc::now();
        let rule = DiscountRule::new(
            DiscountKind::Basket,
            DiscountMethod::Fixed(Money::from_minor(100)),
        )
        .unwrap();
        let window = ValidityWindow::new(now - Duration::days(1), now + Duration::days(1)).unwrap();
        Discount::new(code, rule, window)
            .unwrap()
            .with_usage_limit(limit)
    }

    #[tokio::test]
    async fn test_insert_and_find_by_code_case_insensitive() {
        let repo = InMemoryDiscountRepository::new();
        let stored = repo.insert(discount("SPRING", 0)).await.unwrap();
        assert!(stored.id().is_some());

        let found = repo.find_by_code("spring").await.unwrap().unwrap();
        assert_eq!(found.id(), stored.id());
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let repo = InMemoryDiscountRepository::new();
        repo.insert(discount("SPRING", 0)).await.unwrap();
        let result = repo.insert(discount("spring", 0)).await;
        assert!(matches!(result, Err(RepositoryError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_increment_stops_at_limit() {
        let repo = InMemoryDiscountRepository::new();
        let id = repo.insert(discount("ONCE", 2)).await.unwrap().id().unwrap();

        assert!(repo.try_increment_usage(id).await.unwrap());
        assert!(repo.try_increment_usage(id).await.unwrap());
        assert!(!repo.try_increment_usage(id).await.unwrap());
        assert_eq!(repo.get(id).await.unwrap().unwrap().current_usage(), 2);

        repo.release_usage(id).await.unwrap();
        assert!(repo.try_increment_usage(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_increments_respect_limit() {
        let repo = InMemoryDiscountRepository::new();
        let id = repo.insert(discount("RACE", 5)).await.unwrap().id().unwrap();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.try_increment_usage(id).await.unwrap() })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
    }

    #[tokio::test]
    async fn test_update_preserves_usage_counter() {
        let repo = InMemoryDiscountRepository::new();
        let stored = repo.insert(discount("KEEP", 0)).await.unwrap();
        let id = stored.id().unwrap();
        repo.try_increment_usage(id).await.unwrap();

        let mut edited = stored.with_description("edited");
        edited.restore_usage(0);
        repo.update(&edited).await.unwrap();

        let reloaded = repo.get(id).await.unwrap().unwrap();
        assert_eq!(reloaded.description(), "edited");
        assert_eq!(reloaded.current_usage(), 1);
    }

    #[tokio::test]
    async fn test_catalog_expands_categories() {
        let catalog = InMemoryCatalog::new();
        catalog.assign(ProductId::new(1), CategoryId::new(10)).await;
        catalog.assign(ProductId::new(2), CategoryId::new(10)).await;
        catalog.assign(ProductId::new(3), CategoryId::new(11)).await;

        let products = catalog
            .products_in_categories(&BTreeSet::from([CategoryId::new(10)]))
            .await
            .unwrap();
        assert_eq!(products, BTreeSet::from([ProductId::new(1), ProductId::new(2)]));
    }

    #[tokio::test]
    async fn test_resolve_targets_only_for_category_rules() {
        let catalog = InMemoryCatalog::new();
        catalog.assign(ProductId::new(4), CategoryId::new(10)).await;

        let basket = DiscountRule::new(
            DiscountKind::Basket,
            DiscountMethod::Fixed(Money::from_minor(100)),
        )
        .unwrap();
        assert!(resolve_targets(&catalog, &basket).await.unwrap().is_empty());

        let by_category = DiscountRule::new(
            DiscountKind::product(Vec::<ProductId>::new(), [CategoryId::new(10)]),
            DiscountMethod::Fixed(Money::from_minor(100)),
        )
        .unwrap();
        let targets = resolve_targets(&catalog, &by_category).await.unwrap();
        assert!(targets.contains(&ProductId::new(4)));
        assert_eq!(targets.len(), 1);
    }
}
