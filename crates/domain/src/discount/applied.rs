//! Snapshot of a discount attached to a checkout or order.

use common::DiscountId;
use serde::{Deserialize, Serialize};

use super::{Discount, DiscountError, DiscountRule, DiscountTargets, Priceable};
use crate::money::Money;

/// The rule and resolved targets of a redeemed code, frozen at application time.
///
/// Later edits to the stored discount do not change an applied snapshot;
/// only validity (window, usage, active flag) is re-checked at completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub discount_id: DiscountId,
    pub code: String,
    pub rule: DiscountRule,
    pub targets: DiscountTargets,
}

impl AppliedDiscount {
    /// Captures a stored discount together with its resolved category targets.
    pub fn capture(discount: &Discount, targets: DiscountTargets) -> Result<Self, DiscountError> {
        let discount_id = discount.id().ok_or_else(|| DiscountError::UnknownCode {
            code: discount.code().to_string(),
        })?;
        Ok(Self {
            discount_id,
            code: discount.code().to_string(),
            rule: discount.rule().clone(),
            targets,
        })
    }

    /// Re-derives the amount for the current contents, zero when no longer applicable.
    pub fn amount_for<P: Priceable + ?Sized>(&self, order: &P) -> Money {
        self.rule.amount_for(order, &self.targets)
    }

    pub fn is_applicable_to<P: Priceable + ?Sized>(&self, order: &P) -> bool {
        self.rule.is_applicable_to(order, &self.targets)
    }
}
