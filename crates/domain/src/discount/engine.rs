//! Discount applicability and amount calculation.
//!
//! The engine only ever sees product ids. Category restrictions are expanded
//! by the caller (see [`CategoryResolver`](super::CategoryResolver)) into a
//! [`DiscountTargets`] set before any of these functions run, so a discount
//! restricted to categories the caller did not resolve simply matches nothing.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};

use super::{Discount, DiscountError, DiscountKind, DiscountMethod, DiscountRule};
use crate::money::Money;

/// One priced line of something a discount can be applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceableLine {
    pub product_id: ProductId,
    /// Unit price times quantity.
    pub subtotal: Money,
}

/// Anything a discount can be evaluated against (checkouts and orders).
pub trait Priceable {
    /// Sum of all line subtotals, before shipping and discounts.
    fn priceable_total(&self) -> Money;

    /// The priced lines.
    fn priceable_lines(&self) -> Vec<PriceableLine>;
}

/// Product ids resolved from a discount's category restriction.
///
/// Explicit product ids on the rule always match; these are the extra ids
/// the caller found by expanding categories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscountTargets(BTreeSet<ProductId>);

impl DiscountTargets {
    /// No resolved category products.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(product_ids: impl IntoIterator<Item = ProductId>) -> Self {
        Self(product_ids.into_iter().collect())
    }

    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.0.contains(product_id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl DiscountRule {
    /// Returns true if a line with this product id is discounted by the rule.
    fn targets_product(&self, product_id: &ProductId, targets: &DiscountTargets) -> bool {
        match self.kind() {
            DiscountKind::Basket => true,
            DiscountKind::Product { product_ids, .. } => {
                product_ids.contains(product_id) || targets.contains(product_id)
            }
        }
    }

    /// Checks the order-dependent conditions: minimum order value and, for
    /// product discounts, at least one matching line.
    pub fn check_applicable<P: Priceable + ?Sized>(
        &self,
        order: &P,
        targets: &DiscountTargets,
    ) -> Result<(), DiscountError> {
        let total = order.priceable_total();
        if self.min_order_value().is_positive() && total < self.min_order_value() {
            return Err(DiscountError::BelowMinimumOrder {
                minimum: self.min_order_value(),
                total,
            });
        }

        if let DiscountKind::Product { .. } = self.kind() {
            let any_match = order
                .priceable_lines()
                .iter()
                .any(|line| self.targets_product(&line.product_id, targets));
            if !any_match {
                return Err(DiscountError::NoMatchingItems);
            }
        }

        Ok(())
    }

    /// Returns true if [`check_applicable`](Self::check_applicable) passes.
    pub fn is_applicable_to<P: Priceable + ?Sized>(
        &self,
        order: &P,
        targets: &DiscountTargets,
    ) -> bool {
        self.check_applicable(order, targets).is_ok()
    }

    /// Computes the discount amount, or zero if the rule does not apply.
    ///
    /// The sum is clamped to the cap (if any) and then to the order total, so
    /// a discount never exceeds 100% of the order.
    pub fn amount_for<P: Priceable + ?Sized>(&self, order: &P, targets: &DiscountTargets) -> Money {
        if !self.is_applicable_to(order, targets) {
            return Money::zero();
        }

        let total = order.priceable_total();
        let raw = match (self.kind(), self.method()) {
            (DiscountKind::Basket, DiscountMethod::Fixed(value)) => value,
            (DiscountKind::Basket, DiscountMethod::Percentage(percent)) => {
                total.apply_percentage(percent)
            }
            (DiscountKind::Product { .. }, method) => order
                .priceable_lines()
                .iter()
                .filter(|line| self.targets_product(&line.product_id, targets))
                .map(|line| match method {
                    // Quantity is already folded into the subtotal.
                    DiscountMethod::Fixed(value) => value.min(line.subtotal),
                    DiscountMethod::Percentage(percent) => line.subtotal.apply_percentage(percent),
                })
                .sum(),
        };

        let capped = match self.max_discount() {
            Some(cap) => raw.min(cap),
            None => raw,
        };

        capped.min(total).non_negative()
    }
}

impl Discount {
    /// Checks activity, the validity window and the usage limit.
    pub fn check_valid(&self, now: DateTime<Utc>) -> Result<(), DiscountError> {
        let code = self.code().to_string();
        if !self.is_active() {
            return Err(DiscountError::Inactive { code });
        }
        let window = self.window();
        if now < window.starts_at {
            return Err(DiscountError::NotYetValid {
                code,
                starts_at: window.starts_at,
            });
        }
        if now >= window.ends_at {
            return Err(DiscountError::Expired {
                code,
                ended_at: window.ends_at,
            });
        }
        if !self.has_remaining_usage() {
            return Err(DiscountError::UsageLimitReached { code });
        }
        Ok(())
    }

    /// Active, inside `[starts_at, ends_at)`, and under the usage limit.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.check_valid(now).is_ok()
    }

    /// Valid at `now` and applicable to the order.
    pub fn is_applicable<P: Priceable + ?Sized>(
        &self,
        order: &P,
        targets: &DiscountTargets,
        now: DateTime<Utc>,
    ) -> bool {
        self.is_valid(now) && self.rule().is_applicable_to(order, targets)
    }

    /// Discount amount for the order, zero when not applicable.
    pub fn calculate<P: Priceable + ?Sized>(
        &self,
        order: &P,
        targets: &DiscountTargets,
        now: DateTime<Utc>,
    ) -> Money {
        if !self.is_valid(now) {
            return Money::zero();
        }
        self.rule().amount_for(order, targets)
    }

    /// Validates the discount against the order and returns a positive amount,
    /// or the reason it cannot be used.
    pub fn evaluate<P: Priceable + ?Sized>(
        &self,
        order: &P,
        targets: &DiscountTargets,
        now: DateTime<Utc>,
    ) -> Result<Money, DiscountError> {
        self.check_valid(now)?;
        self.rule().check_applicable(order, targets)?;

        let amount = self.rule().amount_for(order, targets);
        if !amount.is_positive() {
            return Err(DiscountError::ZeroAmount {
                code: self.code().to_string(),
            });
        }
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discount::ValidityWindow;
    use crate::money::Percent;
    use chrono::Duration;
    use common::CategoryId;

    struct Basket(Vec<PriceableLine>);

    impl Priceable for Basket {
        fn priceable_total(&self) -> Money {
            self.0.iter().map(|l| l.subtotal).sum()
        }

        fn priceable_lines(&self) -> Vec<PriceableLine> {
            self.0.clone()
        }
    }

    fn line(product: i64, subtotal: i64) -> PriceableLine {
        PriceableLine {
            product_id: ProductId::new(product),
            subtotal: Money::from_minor(subtotal),
        }
    }

    fn open_window() -> ValidityWindow {
        let now = Utc::now();
        ValidityWindow::new(now - Duration::days(1), now + Duration::days(1)).unwrap()
    }

    fn discount(rule: DiscountRule) -> Discount {
        Discount::new("TEST", rule, open_window()).unwrap()
    }

    fn pct(value: u32) -> DiscountMethod {
        DiscountMethod::Percentage(Percent::from_whole(value).unwrap())
    }

    fn fixed(value: i64) -> DiscountMethod {
        DiscountMethod::Fixed(Money::from_minor(value))
    }

    #[test]
    fn test_basket_percentage() {
        let d = discount(DiscountRule::new(DiscountKind::Basket, pct(10)).unwrap());
        let order = Basket(vec![line(1, 10000)]);
        let amount = d.calculate(&order, &DiscountTargets::none(), Utc::now());
        assert_eq!(amount.minor(), 1000);
    }

    #[test]
    fn test_basket_fixed_clamped_to_total() {
        let d = discount(DiscountRule::new(DiscountKind::Basket, fixed(5000)).unwrap());
        let order = Basket(vec![line(1, 1200)]);
        let amount = d.calculate(&order, &DiscountTargets::none(), Utc::now());
        assert_eq!(amount.minor(), 1200);
    }

    #[test]
    fn test_product_fixed_limited_to_item_subtotal() {
        let d = discount(
            DiscountRule::new(DiscountKind::product([ProductId::new(1)], []), fixed(500)).unwrap(),
        );
        let order = Basket(vec![line(1, 300), line(2, 5000)]);
        let amount = d.calculate(&order, &DiscountTargets::none(), Utc::now());
        assert_eq!(amount.minor(), 300);
    }

    #[test]
    fn test_product_fixed_applies_once_per_matching_line() {
        let d = discount(
            DiscountRule::new(
                DiscountKind::product([ProductId::new(1), ProductId::new(2)], []),
                fixed(100),
            )
            .unwrap(),
        );
        // quantity is folded into the subtotal, so each line contributes 100 once
        let order = Basket(vec![line(1, 3000), line(2, 2000), line(3, 1000)]);
        let amount = d.calculate(&order, &DiscountTargets::none(), Utc::now());
        assert_eq!(amount.minor(), 200);
    }

    #[test]
    fn test_product_percentage_sums_matching_lines() {
        let d = discount(
            DiscountRule::new(DiscountKind::product([ProductId::new(1)], []), pct(15)).unwrap(),
        );
        let order = Basket(vec![line(1, 333), line(2, 1000)]);
        let amount = d.calculate(&order, &DiscountTargets::none(), Utc::now());
        assert_eq!(amount.minor(), 49);
    }

    #[test]
    fn test_max_discount_caps_amount() {
        let d = discount(
            DiscountRule::new(DiscountKind::Basket, pct(50))
                .unwrap()
                .with_max_discount(Money::from_minor(700)),
        );
        let order = Basket(vec![line(1, 10000)]);
        assert_eq!(
            d.calculate(&order, &DiscountTargets::none(), Utc::now())
                .minor(),
            700
        );
    }

    #[test]
    fn test_min_order_value_threshold() {
        let d = discount(
            DiscountRule::new(DiscountKind::Basket, pct(20))
                .unwrap()
                .with_min_order_value(Money::from_minor(1500)),
        );
        let small = Basket(vec![line(1, 1499)]);
        let exact = Basket(vec![line(1, 1500)]);
        let now = Utc::now();

        assert!(!d.is_applicable(&small, &DiscountTargets::none(), now));
        assert!(matches!(
            d.evaluate(&small, &DiscountTargets::none(), now),
            Err(DiscountError::BelowMinimumOrder { .. })
        ));
        assert_eq!(
            d.calculate(&exact, &DiscountTargets::none(), now).minor(),
            300
        );
    }

    #[test]
    fn test_category_restriction_needs_resolved_targets() {
        let d = discount(
            DiscountRule::new(DiscountKind::product([], [CategoryId::new(9)]), pct(10)).unwrap(),
        );
        let order = Basket(vec![line(5, 2000)]);
        let now = Utc::now();

        assert!(!d.is_applicable(&order, &DiscountTargets::none(), now));
        assert!(matches!(
            d.evaluate(&order, &DiscountTargets::none(), now),
            Err(DiscountError::NoMatchingItems)
        ));

        let resolved = DiscountTargets::new([ProductId::new(5)]);
        assert!(d.is_applicable(&order, &resolved, now));
        assert_eq!(d.calculate(&order, &resolved, now).minor(), 200);
    }

    #[test]
    fn test_validity_reasons() {
        let rule = DiscountRule::new(DiscountKind::Basket, fixed(100)).unwrap();
        let now = Utc::now();
        let order = Basket(vec![line(1, 1000)]);

        let future = Discount::new(
            "LATER",
            rule.clone(),
            ValidityWindow::new(now + Duration::days(1), now + Duration::days(2)).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            future.check_valid(now),
            Err(DiscountError::NotYetValid { .. })
        ));

        let past = Discount::new(
            "OLD",
            rule.clone(),
            ValidityWindow::new(now - Duration::days(2), now - Duration::days(1)).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            past.check_valid(now),
            Err(DiscountError::Expired { .. })
        ));
        assert_eq!(
            past.calculate(&order, &DiscountTargets::none(), now),
            Money::zero()
        );

        let mut inactive = discount(rule.clone());
        inactive.deactivate();
        assert!(matches!(
            inactive.check_valid(now),
            Err(DiscountError::Inactive { .. })
        ));

        let mut used_up = discount(rule).with_usage_limit(1);
        used_up.restore_usage(1);
        assert!(matches!(
            used_up.check_valid(now),
            Err(DiscountError::UsageLimitReached { .. })
        ));
    }

    #[test]
    fn test_evaluate_empty_order_is_zero_amount() {
        let d = discount(DiscountRule::new(DiscountKind::Basket, pct(10)).unwrap());
        let order = Basket(vec![]);
        assert!(matches!(
            d.evaluate(&order, &DiscountTargets::none(), Utc::now()),
            Err(DiscountError::ZeroAmount { .. })
        ));
    }
}
