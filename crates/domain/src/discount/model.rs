//! Discount definitions.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::{CategoryId, DiscountId, ProductId};
use serde::{Deserialize, Serialize};

use super::DiscountError;
use crate::money::{Money, Percent};

/// What a discount is computed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountKind {
    /// Applies to the order total.
    Basket,

    /// Applies to matching line items only.
    Product {
        product_ids: BTreeSet<ProductId>,
        category_ids: BTreeSet<CategoryId>,
    },
}

impl DiscountKind {
    /// Builds a product-restricted kind.
    pub fn product(
        product_ids: impl IntoIterator<Item = ProductId>,
        category_ids: impl IntoIterator<Item = CategoryId>,
    ) -> Self {
        DiscountKind::Product {
            product_ids: product_ids.into_iter().collect(),
            category_ids: category_ids.into_iter().collect(),
        }
    }

    /// Returns the category restriction, empty for basket discounts.
    pub fn category_ids(&self) -> BTreeSet<CategoryId> {
        match self {
            DiscountKind::Basket => BTreeSet::new(),
            DiscountKind::Product { category_ids, .. } => category_ids.clone(),
        }
    }

    /// Returns the name used in logs and snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Basket => "basket",
            DiscountKind::Product { .. } => "product",
        }
    }
}

/// How the discount value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "value", rename_all = "snake_case")]
pub enum DiscountMethod {
    /// A fixed amount in minor units.
    Fixed(Money),

    /// A percentage of the discounted amount.
    Percentage(Percent),
}

/// The pricing part of a discount, independent of when and how often it may be used.
///
/// A checkout keeps a copy of the rule it applied so the amount can be
/// re-derived every time the cart changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountRule {
    kind: DiscountKind,
    method: DiscountMethod,
    min_order_value: Money,
    max_discount: Option<Money>,
}

impl DiscountRule {
    /// Creates a rule with no order threshold and no cap.
    pub fn new(kind: DiscountKind, method: DiscountMethod) -> Result<Self, DiscountError> {
        match method {
            DiscountMethod::Fixed(value) if !value.is_positive() => {
                return Err(DiscountError::InvalidValue(
                    "fixed discount must be greater than zero".to_string(),
                ));
            }
            DiscountMethod::Percentage(percent) if percent.value().is_zero() => {
                return Err(DiscountError::InvalidValue(
                    "percentage discount must be greater than zero".to_string(),
                ));
            }
            _ => {}
        }

        if let DiscountKind::Product {
            product_ids,
            category_ids,
        } = &kind
            && product_ids.is_empty()
            && category_ids.is_empty()
        {
            return Err(DiscountError::MissingProductRestriction);
        }

        Ok(Self {
            kind,
            method,
            min_order_value: Money::zero(),
            max_discount: None,
        })
    }

    /// Sets the minimum order total required before the rule applies.
    pub fn with_min_order_value(mut self, value: Money) -> Self {
        self.min_order_value = value.non_negative();
        self
    }

    /// Caps the discount amount. Zero means uncapped.
    pub fn with_max_discount(mut self, cap: Money) -> Self {
        self.max_discount = cap.is_positive().then_some(cap);
        self
    }

    pub fn kind(&self) -> &DiscountKind {
        &self.kind
    }

    pub fn method(&self) -> DiscountMethod {
        self.method
    }

    pub fn min_order_value(&self) -> Money {
        self.min_order_value
    }

    pub fn max_discount(&self) -> Option<Money> {
        self.max_discount
    }
}

/// Half-open validity window `[starts_at, ends_at)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl ValidityWindow {
    /// Creates a window, rejecting empty or inverted ranges.
    pub fn new(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Result<Self, DiscountError> {
        if starts_at >= ends_at {
            return Err(DiscountError::InvalidWindow { starts_at, ends_at });
        }
        Ok(Self { starts_at, ends_at })
    }

    /// Returns true if `now` falls inside the window.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }
}

/// A redeemable discount code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    id: Option<DiscountId>,
    code: String,
    description: String,
    rule: DiscountRule,
    window: ValidityWindow,
    usage_limit: Option<u32>,
    current_usage: u32,
    active: bool,
}

impl Discount {
    /// Creates an active discount with unlimited usage.
    ///
    /// Codes are trimmed and upper-cased so lookups are case-insensitive.
    pub fn new(
        code: impl AsRef<str>,
        rule: DiscountRule,
        window: ValidityWindow,
    ) -> Result<Self, DiscountError> {
        let code = normalize_code(code.as_ref());
        if code.is_empty() {
            return Err(DiscountError::EmptyCode);
        }

        Ok(Self {
            id: None,
            code,
            description: String::new(),
            rule,
            window,
            usage_limit: None,
            current_usage: 0,
            active: true,
        })
    }

    /// Limits the number of redemptions. Zero means unlimited.
    pub fn with_usage_limit(mut self, limit: u32) -> Self {
        self.usage_limit = (limit > 0).then_some(limit);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Marks the discount inactive.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Marks the discount active.
    pub fn activate(&mut self) {
        self.active = true;
    }

    /// Sets the storage-assigned id.
    pub fn assign_id(&mut self, id: DiscountId) {
        self.id = Some(id);
    }

    /// Overwrites the usage counter with the value held by storage.
    ///
    /// Storage owns the counter; this only refreshes the in-memory copy.
    pub fn restore_usage(&mut self, current_usage: u32) {
        self.current_usage = current_usage;
    }

    pub fn id(&self) -> Option<DiscountId> {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn rule(&self) -> &DiscountRule {
        &self.rule
    }

    pub fn window(&self) -> ValidityWindow {
        self.window
    }

    pub fn usage_limit(&self) -> Option<u32> {
        self.usage_limit
    }

    pub fn current_usage(&self) -> u32 {
        self.current_usage
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns true if another redemption fits under the usage limit.
    pub fn has_remaining_usage(&self) -> bool {
        self.usage_limit
            .is_none_or(|limit| self.current_usage < limit)
    }
}

/// Normalizes a customer-entered code for lookup.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn window() -> ValidityWindow {
        let now = Utc::now();
        ValidityWindow::new(now - Duration::days(1), now + Duration::days(1)).unwrap()
    }

    #[test]
    fn test_product_discount_requires_restriction() {
        let result = DiscountRule::new(
            DiscountKind::product([], []),
            DiscountMethod::Fixed(Money::from_minor(500)),
        );
        assert!(matches!(
            result,
            Err(DiscountError::MissingProductRestriction)
        ));
    }

    #[test]
    fn test_category_only_restriction_is_enough() {
        let result = DiscountRule::new(
            DiscountKind::product([], [CategoryId::new(3)]),
            DiscountMethod::Percentage(Percent::from_whole(5).unwrap()),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        assert!(
            DiscountRule::new(DiscountKind::Basket, DiscountMethod::Fixed(Money::zero())).is_err()
        );
        assert!(
            DiscountRule::new(
                DiscountKind::Basket,
                DiscountMethod::Percentage(Percent::from_whole(0).unwrap())
            )
            .is_err()
        );
    }

    #[test]
    fn test_zero_cap_means_uncapped() {
        let rule = DiscountRule::new(
            DiscountKind::Basket,
            DiscountMethod::Percentage(Percent::from_whole(10).unwrap()),
        )
        .unwrap()
        .with_max_discount(Money::zero());
        assert_eq!(rule.max_discount(), None);
    }

    #[test]
    fn test_window_is_half_open() {
        let start = Utc::now();
        let end = start + Duration::hours(1);
        let window = ValidityWindow::new(start, end).unwrap();
        assert!(window.contains(start));
        assert!(!window.contains(end));
        assert!(ValidityWindow::new(end, start).is_err());
    }

    #[test]
    fn test_code_is_normalized() {
        let rule = DiscountRule::new(
            DiscountKind::Basket,
            DiscountMethod::Fixed(Money::from_minor(100)),
        )
        .unwrap();
        let discount = Discount::new("  save20 ", rule.clone(), window()).unwrap();
        assert_eq!(discount.code(), "SAVE20");
        assert!(matches!(
            Discount::new("   ", rule, window()),
            Err(DiscountError::EmptyCode)
        ));
    }

    #[test]
    fn test_usage_limit_zero_is_unlimited() {
        let rule = DiscountRule::new(
            DiscountKind::Basket,
            DiscountMethod::Fixed(Money::from_minor(100)),
        )
        .unwrap();
        let mut discount = Discount::new("X", rule, window()).unwrap().with_usage_limit(0);
        discount.restore_usage(10_000);
        assert!(discount.has_remaining_usage());

        let mut limited = discount.clone().with_usage_limit(2);
        limited.restore_usage(2);
        assert!(!limited.has_remaining_usage());
    }
}
