//! Checkout storage contract and in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::CheckoutId;
use tokio::sync::RwLock;

use super::{Checkout, CheckoutStatus, Owner};
use crate::aggregate::Aggregate;
use crate::repository::{RepositoryResult, VersionedTable};

/// Persistence for checkout sessions.
///
/// `save` is an optimistic compare-and-swap on the aggregate version; a
/// concurrent writer that saved first makes it fail with
/// [`RepositoryError::ConcurrencyConflict`](crate::repository::RepositoryError::ConcurrencyConflict).
#[async_trait]
pub trait CheckoutRepository: Send + Sync {
    /// Stores a new checkout and assigns its id.
    async fn insert(&self, checkout: Checkout) -> RepositoryResult<Checkout>;

    async fn get(&self, id: CheckoutId) -> RepositoryResult<Option<Checkout>>;

    /// Saves a loaded checkout and returns it at its new version.
    async fn save(&self, checkout: &Checkout) -> RepositoryResult<Checkout>;

    /// The owner's active checkout, if any. Expiry is not considered.
    async fn find_active_by_owner(&self, owner: &Owner) -> RepositoryResult<Option<Checkout>>;

    /// Active checkouts whose expiry is before `now`, oldest first.
    async fn find_expired_active(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> RepositoryResult<Vec<Checkout>>;

    async fn delete(&self, id: CheckoutId) -> RepositoryResult<()>;

    /// Saves `target` and deletes `absorbed` as one unit. Both must still be
    /// at their loaded versions; otherwise nothing is written.
    async fn save_merged(&self, target: &Checkout, absorbed: &Checkout) -> RepositoryResult<Checkout>;
}

/// In-memory checkout repository for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckoutRepository {
    state: Arc<RwLock<VersionedTable<Checkout>>>,
}

impl InMemoryCheckoutRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored checkouts.
    pub async fn len(&self) -> usize {
        self.state.read().await.values().count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CheckoutRepository for InMemoryCheckoutRepository {
    async fn insert(&self, mut checkout: Checkout) -> RepositoryResult<Checkout> {
        let mut state = self.state.write().await;
        let id = state.allocate_id();
        checkout.assign_id(id);
        state.insert(checkout)
    }

    async fn get(&self, id: CheckoutId) -> RepositoryResult<Option<Checkout>> {
        Ok(self.state.read().await.get(id).cloned())
    }

    async fn save(&self, checkout: &Checkout) -> RepositoryResult<Checkout> {
        self.state.write().await.save(checkout)
    }

    async fn find_active_by_owner(&self, owner: &Owner) -> RepositoryResult<Option<Checkout>> {
        let state = self.state.read().await;
        Ok(state
            .values()
            .filter(|c| c.status() == CheckoutStatus::Active && c.owner() == owner)
            .max_by_key(|c| c.created_at())
            .cloned())
    }

    async fn find_expired_active(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> RepositoryResult<Vec<Checkout>> {
        let state = self.state.read().await;
        let mut expired: Vec<Checkout> = state
            .values()
            .filter(|c| c.status() == CheckoutStatus::Active && c.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|c| (c.expires_at(), c.id()));
        expired.truncate(limit);
        Ok(expired)
    }

    async fn delete(&self, id: CheckoutId) -> RepositoryResult<()> {
        self.state.write().await.remove(id);
        Ok(())
    }

    async fn save_merged(&self, target: &Checkout, absorbed: &Checkout) -> RepositoryResult<Checkout> {
        let mut state = self.state.write().await;
        let absorbed_id = state.ensure_current(absorbed)?;
        let saved = state.save(target)?;
        state.remove(absorbed_id);
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::CheckoutItem;
    use crate::money::{CurrencyCode, Money};
    use crate::repository::RepositoryError;
    use chrono::Duration;
    use common::{ProductId, SessionId, Version};

    fn guest(session: &str, created: DateTime<Utc>) -> Checkout {
        Checkout::new(
            Owner::Guest(SessionId::new(session)),
            CurrencyCode::default(),
            Duration::hours(24),
            created,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_version() {
        let repo = InMemoryCheckoutRepository::new();
        let stored = repo.insert(guest("a", Utc::now())).await.unwrap();
        assert!(stored.id().is_some());
        assert_eq!(stored.version(), Version::first());
    }

    #[tokio::test]
    async fn test_stale_save_conflicts() {
        let repo = InMemoryCheckoutRepository::new();
        let stored = repo.insert(guest("a", Utc::now())).await.unwrap();

        let mut tab_one = stored.clone();
        let mut tab_two = stored.clone();
        tab_one
            .add_item(CheckoutItem::new(ProductId::new(1), 1, Money::from_minor(100)), Utc::now())
            .unwrap();
        tab_two
            .add_item(CheckoutItem::new(ProductId::new(2), 1, Money::from_minor(100)), Utc::now())
            .unwrap();

        let saved = repo.save(&tab_one).await.unwrap();
        assert_eq!(saved.version(), Version::first().next());

        let result = repo.save(&tab_two).await;
        assert!(matches!(result, Err(RepositoryError::ConcurrencyConflict { .. })));

        let reloaded = repo.get(stored.id().unwrap()).await.unwrap().unwrap();
        assert_eq!(reloaded.items().len(), 1);
        assert_eq!(reloaded.items()[0].product_id, ProductId::new(1));
    }

    #[tokio::test]
    async fn test_find_active_by_owner_ignores_terminal() {
        let repo = InMemoryCheckoutRepository::new();
        let mut abandoned = repo.insert(guest("a", Utc::now())).await.unwrap();
        abandoned.mark_abandoned(Utc::now()).unwrap();
        repo.save(&abandoned).await.unwrap();

        let owner = Owner::Guest(SessionId::new("a"));
        assert!(repo.find_active_by_owner(&owner).await.unwrap().is_none());

        let active = repo.insert(guest("a", Utc::now())).await.unwrap();
        let found = repo.find_active_by_owner(&owner).await.unwrap().unwrap();
        assert_eq!(found.id(), active.id());
    }

    #[tokio::test]
    async fn test_find_expired_active_respects_limit() {
        let repo = InMemoryCheckoutRepository::new();
        let now = Utc::now();
        repo.insert(guest("old-1", now - Duration::hours(50))).await.unwrap();
        repo.insert(guest("old-2", now - Duration::hours(30))).await.unwrap();
        repo.insert(guest("fresh", now)).await.unwrap();

        let expired = repo.find_expired_active(now, 10).await.unwrap();
        assert_eq!(expired.len(), 2);
        assert_eq!(expired[0].owner(), &Owner::Guest(SessionId::new("old-1")));

        let limited = repo.find_expired_active(now, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_save_merged_writes_both_or_neither() {
        let repo = InMemoryCheckoutRepository::new();
        let now = Utc::now();
        let guest_row = repo.insert(guest("g", now)).await.unwrap();
        let user_row = repo
            .insert(
                Checkout::new(
                    Owner::Registered(common::UserId::new(7)),
                    CurrencyCode::default(),
                    Duration::hours(24),
                    now,
                )
                .unwrap(),
            )
            .await
            .unwrap();

        // The guest changed after it was loaded for the merge.
        let mut newer_guest = guest_row.clone();
        newer_guest
            .add_item(CheckoutItem::new(ProductId::new(3), 1, Money::from_minor(100)), now)
            .unwrap();
        repo.save(&newer_guest).await.unwrap();

        let mut target = user_row.clone();
        target.absorb(guest_row.clone(), now).unwrap();
        let result = repo.save_merged(&target, &guest_row).await;
        assert!(matches!(result, Err(RepositoryError::ConcurrencyConflict { .. })));
        assert!(repo.get(guest_row.id().unwrap()).await.unwrap().is_some());
        let untouched = repo.get(user_row.id().unwrap()).await.unwrap().unwrap();
        assert_eq!(untouched.version(), Version::first());

        // Retrying from fresh reads succeeds and removes the guest.
        let guest_row = repo.get(guest_row.id().unwrap()).await.unwrap().unwrap();
        let mut target = untouched;
        target.absorb(guest_row.clone(), now).unwrap();
        let saved = repo.save_merged(&target, &guest_row).await.unwrap();
        assert_eq!(saved.items().len(), 1);
        assert!(repo.get(guest_row.id().unwrap()).await.unwrap().is_none());
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = InMemoryCheckoutRepository::new();
        let stored = repo.insert(guest("a", Utc::now())).await.unwrap();
        repo.delete(stored.id().unwrap()).await.unwrap();
        assert!(repo.is_empty().await);
    }
}
