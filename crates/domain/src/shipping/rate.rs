//! Shipping methods, rates and tiered cost calculation.

use common::{ShippingMethodId, ShippingRateId, ShippingZoneId};
use serde::{Deserialize, Serialize};

use super::ShippingError;
use crate::money::{Money, Weight};

/// A delivery option offered to shoppers (e.g. "Standard", "Express").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: Option<ShippingMethodId>,
    pub name: String,
    pub description: String,
    pub active: bool,
}

impl ShippingMethod {
    /// Creates an active method.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            active: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Weight range `[min, max]` adding a fixed amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightTier {
    pub min_weight: Weight,
    pub max_weight: Weight,
    pub rate: Money,
}

impl WeightTier {
    fn contains(&self, weight: Weight) -> bool {
        self.min_weight <= weight && weight <= self.max_weight
    }
}

/// Order value range `[min, max]` adding a fixed amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueTier {
    pub min_order_value: Money,
    pub max_order_value: Money,
    pub rate: Money,
}

impl ValueTier {
    fn contains(&self, order_value: Money) -> bool {
        self.min_order_value <= order_value && order_value <= self.max_order_value
    }
}

/// Price of one shipping method within one zone.
///
/// Tiers are scanned in the order they were added and only the first
/// matching tier of each kind is used. Overlapping tiers are a
/// configuration error the rate does not detect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRate {
    id: Option<ShippingRateId>,
    method_id: ShippingMethodId,
    zone_id: ShippingZoneId,
    base_rate: Money,
    min_order_value: Money,
    free_shipping_threshold: Option<Money>,
    weight_tiers: Vec<WeightTier>,
    value_tiers: Vec<ValueTier>,
    active: bool,
}

impl ShippingRate {
    /// Creates an active rate with no threshold and no tiers.
    pub fn new(
        method_id: ShippingMethodId,
        zone_id: ShippingZoneId,
        base_rate: Money,
    ) -> Result<Self, ShippingError> {
        if base_rate.is_negative() {
            return Err(ShippingError::NegativeAmount {
                field: "base_rate",
                amount: base_rate,
            });
        }
        Ok(Self {
            id: None,
            method_id,
            zone_id,
            base_rate,
            min_order_value: Money::zero(),
            free_shipping_threshold: None,
            weight_tiers: Vec::new(),
            value_tiers: Vec::new(),
            active: true,
        })
    }

    /// Orders below this value are not offered the rate.
    pub fn with_min_order_value(mut self, value: Money) -> Self {
        self.min_order_value = value.non_negative();
        self
    }

    /// Orders at or above this value ship for free.
    pub fn with_free_shipping_threshold(mut self, threshold: Money) -> Self {
        self.free_shipping_threshold = Some(threshold.non_negative());
        self
    }

    /// Appends a weight tier.
    pub fn with_weight_tier(
        mut self,
        min_weight: Weight,
        max_weight: Weight,
        rate: Money,
    ) -> Result<Self, ShippingError> {
        if min_weight > max_weight {
            return Err(ShippingError::InvalidTier {
                min: min_weight.to_string(),
                max: max_weight.to_string(),
            });
        }
        if rate.is_negative() {
            return Err(ShippingError::NegativeAmount {
                field: "weight_tier.rate",
                amount: rate,
            });
        }
        self.weight_tiers.push(WeightTier {
            min_weight,
            max_weight,
            rate,
        });
        Ok(self)
    }

    /// Appends an order value tier.
    pub fn with_value_tier(
        mut self,
        min_order_value: Money,
        max_order_value: Money,
        rate: Money,
    ) -> Result<Self, ShippingError> {
        if min_order_value > max_order_value {
            return Err(ShippingError::InvalidTier {
                min: min_order_value.to_string(),
                max: max_order_value.to_string(),
            });
        }
        if rate.is_negative() {
            return Err(ShippingError::NegativeAmount {
                field: "value_tier.rate",
                amount: rate,
            });
        }
        self.value_tiers.push(ValueTier {
            min_order_value,
            max_order_value,
            rate,
        });
        Ok(self)
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Sets the storage-assigned id.
    pub fn assign_id(&mut self, id: ShippingRateId) {
        self.id = Some(id);
    }

    pub fn id(&self) -> Option<ShippingRateId> {
        self.id
    }

    pub fn method_id(&self) -> ShippingMethodId {
        self.method_id
    }

    pub fn zone_id(&self) -> ShippingZoneId {
        self.zone_id
    }

    pub fn base_rate(&self) -> Money {
        self.base_rate
    }

    pub fn min_order_value(&self) -> Money {
        self.min_order_value
    }

    pub fn free_shipping_threshold(&self) -> Option<Money> {
        self.free_shipping_threshold
    }

    pub fn weight_tiers(&self) -> &[WeightTier] {
        &self.weight_tiers
    }

    pub fn value_tiers(&self) -> &[ValueTier] {
        &self.value_tiers
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns true if the rate may be offered for an order of this value.
    pub fn accepts_order_value(&self, order_value: Money) -> bool {
        self.min_order_value <= order_value
    }

    /// Computes the shipping cost for an order.
    ///
    /// Weight and value tiers are both added to the base rate when both match.
    pub fn cost(&self, order_value: Money, weight: Weight) -> Money {
        if let Some(threshold) = self.free_shipping_threshold
            && order_value >= threshold
        {
            return Money::zero();
        }

        // Callers filter these out already; the floor keeps a stale selection harmless.
        if order_value < self.min_order_value {
            return Money::zero();
        }

        let mut cost = self.base_rate;
        if let Some(tier) = self.weight_tiers.iter().find(|t| t.contains(weight)) {
            cost += tier.rate;
        }
        if let Some(tier) = self.value_tiers.iter().find(|t| t.contains(order_value)) {
            cost += tier.rate;
        }
        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(base: i64) -> ShippingRate {
        ShippingRate::new(
            ShippingMethodId::new(1),
            ShippingZoneId::new(1),
            Money::from_minor(base),
        )
        .unwrap()
    }

    fn grams(g: u64) -> Weight {
        Weight::from_grams(g)
    }

    #[test]
    fn test_base_rate_only() {
        let r = rate(500);
        assert_eq!(r.cost(Money::from_minor(1000), grams(100)).minor(), 500);
    }

    #[test]
    fn test_first_matching_weight_tier_wins() {
        let r = rate(0)
            .with_weight_tier(grams(0), grams(1000), Money::from_minor(5))
            .unwrap()
            .with_weight_tier(grams(1000), grams(5000), Money::from_minor(10))
            .unwrap();
        assert_eq!(r.cost(Money::from_minor(100), grams(3000)).minor(), 10);
        // the boundary belongs to the first tier listed
        assert_eq!(r.cost(Money::from_minor(100), grams(1000)).minor(), 5);
        // beyond every tier only the base applies
        assert_eq!(r.cost(Money::from_minor(100), grams(9000)).minor(), 0);
    }

    #[test]
    fn test_weight_and_value_tiers_are_additive() {
        let r = rate(300)
            .with_weight_tier(grams(0), grams(2000), Money::from_minor(100))
            .unwrap()
            .with_value_tier(
                Money::from_minor(0),
                Money::from_minor(5000),
                Money::from_minor(50),
            )
            .unwrap();
        assert_eq!(r.cost(Money::from_minor(2000), grams(500)).minor(), 450);
        assert_eq!(r.cost(Money::from_minor(6000), grams(500)).minor(), 400);
    }

    #[test]
    fn test_free_shipping_threshold() {
        let r = rate(700).with_free_shipping_threshold(Money::from_minor(5000));
        assert_eq!(r.cost(Money::from_minor(5000), grams(1)).minor(), 0);
        assert_eq!(r.cost(Money::from_minor(4999), grams(1)).minor(), 700);
    }

    #[test]
    fn test_below_min_order_value_costs_nothing() {
        let r = rate(700).with_min_order_value(Money::from_minor(1000));
        assert!(!r.accepts_order_value(Money::from_minor(999)));
        assert_eq!(r.cost(Money::from_minor(999), grams(1)).minor(), 0);
        assert_eq!(r.cost(Money::from_minor(1000), grams(1)).minor(), 700);
    }

    #[test]
    fn test_inverted_tier_rejected() {
        let result = rate(0).with_weight_tier(grams(10), grams(5), Money::from_minor(1));
        assert!(matches!(result, Err(ShippingError::InvalidTier { .. })));
    }

    #[test]
    fn test_negative_base_rejected() {
        let result = ShippingRate::new(
            ShippingMethodId::new(1),
            ShippingZoneId::new(1),
            Money::from_minor(-1),
        );
        assert!(matches!(result, Err(ShippingError::NegativeAmount { .. })));
    }
}
