//! Value objects for the checkout domain.

use common::{ProductId, SessionId, ShippingMethodId, ShippingRateId, UserId, VariantId};
use serde::{Deserialize, Serialize};

use crate::money::{Money, Weight};
use crate::shipping::{ShippingOption, ShippingRate};

/// Who a checkout belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Owner {
    /// A signed-in customer.
    Registered(UserId),

    /// An anonymous browser session.
    Guest(SessionId),
}

impl Owner {
    pub fn is_guest(&self) -> bool {
        matches!(self, Owner::Guest(_))
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Owner::Registered(id) => Some(*id),
            Owner::Guest(_) => None,
        }
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Owner::Registered(id) => write!(f, "user:{id}"),
            Owner::Guest(session) => write!(f, "guest:{session}"),
        }
    }
}

/// Merge key of a line: same product and variant means same line.
pub type ItemKey = (ProductId, Option<VariantId>);

/// A line in a checkout.
///
/// Price, weight and display names are captured when the item is added and
/// are not refreshed if the catalog changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    pub unit_price: Money,
    /// Weight of a single unit.
    pub weight: Weight,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub sku: String,
}

impl CheckoutItem {
    /// Creates a line for a product without a variant.
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id,
            variant_id: None,
            quantity,
            unit_price,
            weight: Weight::zero(),
            product_name: String::new(),
            variant_name: None,
            sku: String::new(),
        }
    }

    pub fn with_variant(mut self, variant_id: VariantId, variant_name: impl Into<String>) -> Self {
        self.variant_id = Some(variant_id);
        self.variant_name = Some(variant_name.into());
        self
    }

    pub fn with_weight(mut self, weight: Weight) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_name(mut self, product_name: impl Into<String>) -> Self {
        self.product_name = product_name.into();
        self
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = sku.into();
        self
    }

    pub fn key(&self) -> ItemKey {
        (self.product_id, self.variant_id)
    }

    /// Unit price times quantity.
    pub fn subtotal(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    /// Unit weight times quantity.
    pub fn total_weight(&self) -> Weight {
        self.weight.multiply(self.quantity)
    }
}

/// Contact data of the person placing the order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
}

impl CustomerDetails {
    pub fn new(email: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            full_name: full_name.into(),
            phone: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

/// The shipping rate a shopper picked, kept so its cost can be recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingSelection {
    pub method_id: ShippingMethodId,
    pub method_name: String,
    pub rate: ShippingRate,
}

impl ShippingSelection {
    pub fn rate_id(&self) -> Option<ShippingRateId> {
        self.rate.id()
    }

    /// Cost for the given order value and weight.
    pub fn cost(&self, order_value: Money, weight: Weight) -> Money {
        self.rate.cost(order_value, weight)
    }
}

impl From<ShippingOption> for ShippingSelection {
    fn from(option: ShippingOption) -> Self {
        Self {
            method_id: option.rate.method_id(),
            method_name: option.method.name,
            rate: option.rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_subtotal_and_weight() {
        let item = CheckoutItem::new(ProductId::new(1), 3, Money::from_minor(250))
            .with_weight(Weight::from_grams(400));
        assert_eq!(item.subtotal().minor(), 750);
        assert_eq!(item.total_weight().grams(), 1200);
    }

    #[test]
    fn test_variant_is_part_of_key() {
        let plain = CheckoutItem::new(ProductId::new(1), 1, Money::from_minor(1));
        let red = plain.clone().with_variant(VariantId::new(7), "Red");
        assert_ne!(plain.key(), red.key());
    }

    #[test]
    fn test_owner_serialization_is_tagged() {
        let owner = Owner::Guest(SessionId::new("sess-1"));
        let json = serde_json::to_value(&owner).unwrap();
        assert_eq!(json, serde_json::json!({"type": "guest", "id": "sess-1"}));
        assert!(owner.is_guest());
        assert_eq!(Owner::Registered(UserId::new(4)).user_id(), Some(UserId::new(4)));
    }
}
