//! Value objects for the order domain.

use common::{ProductId, ShippingMethodId, UserId, VariantId};
use serde::{Deserialize, Serialize};

use crate::checkout::CheckoutItem;
use crate::money::{Money, Weight};

/// Contact block identifying a guest buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestContact {
    pub email: String,
    pub phone: Option<String>,
    pub full_name: String,
}

/// Who placed an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OrderOwner {
    Registered(UserId),
    Guest(GuestContact),
}

/// An item snapshot taken when the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub sku: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
    /// Weight of a single unit.
    pub weight: Weight,
}

impl From<&CheckoutItem> for OrderItem {
    fn from(item: &CheckoutItem) -> Self {
        Self {
            product_id: item.product_id,
            variant_id: item.variant_id,
            product_name: item.product_name.clone(),
            variant_name: item.variant_name.clone(),
            sku: item.sku.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            subtotal: item.subtotal(),
            weight: item.weight,
        }
    }
}

/// The shipping method an order was placed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShippingMethod {
    pub method_id: ShippingMethodId,
    pub name: String,
}

/// Amounts copied from the checkout at placement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub total_amount: Money,
    pub shipping_cost: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub total_weight: Weight,
}
