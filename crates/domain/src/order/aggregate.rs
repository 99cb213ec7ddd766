//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{CheckoutId, OrderId, Version};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::discount::{AppliedDiscount, Discount, DiscountTargets, Priceable, PriceableLine};
use crate::money::{CurrencyCode, Money, Weight};
use crate::shipping::Address;

use super::{
    DiscountAppliedData, OrderError, OrderEvent, OrderItem, OrderNumber, OrderOwner,
    OrderPlacedData, OrderShippingMethod, OrderStatus, OrderTotals, StatusChangedData,
};

/// Everything needed to place an order, usually taken from a checkout.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub owner: OrderOwner,
    pub checkout_id: Option<CheckoutId>,
    pub items: Vec<OrderItem>,
    pub currency: CurrencyCode,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub shipping_method: Option<OrderShippingMethod>,
    pub totals: OrderTotals,
    pub discount: Option<AppliedDiscount>,
}

/// Order aggregate root.
///
/// Items and amounts are fixed at placement. After that only the status,
/// payment references, tracking data and (before payment) the discount change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: Option<OrderId>,

    #[serde(default)]
    version: Version,

    number: OrderNumber,
    owner: OrderOwner,
    checkout_id: Option<CheckoutId>,
    items: Vec<OrderItem>,
    status: OrderStatus,
    currency: CurrencyCode,
    shipping_address: Address,
    billing_address: Option<Address>,
    shipping_method: Option<OrderShippingMethod>,

    payment_id: Option<String>,
    payment_provider: Option<String>,
    tracking_code: Option<String>,
    action_url: Option<String>,

    total_amount: Money,
    shipping_cost: Money,
    discount_amount: Money,
    final_amount: Money,
    total_weight: Weight,
    discount: Option<AppliedDiscount>,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Id = OrderId;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<OrderId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

impl Priceable for Order {
    fn priceable_total(&self) -> Money {
        self.total_amount
    }

    fn priceable_lines(&self) -> Vec<PriceableLine> {
        self.items
            .iter()
            .map(|item| PriceableLine {
                product_id: item.product_id,
                subtotal: item.subtotal,
            })
            .collect()
    }
}

// Query methods
impl Order {
    /// Creates a pending order with a provisional number.
    pub fn place(new: NewOrder, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if new.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if let OrderOwner::Guest(contact) = &new.owner
            && contact.email.trim().is_empty()
        {
            return Err(OrderError::GuestEmailRequired);
        }

        let guest = matches!(new.owner, OrderOwner::Guest(_));
        Ok(Self {
            id: None,
            version: Version::initial(),
            number: OrderNumber::provisional(guest, now),
            owner: new.owner,
            checkout_id: new.checkout_id,
            items: new.items,
            status: OrderStatus::Pending,
            currency: new.currency,
            shipping_address: new.shipping_address,
            billing_address: new.billing_address,
            shipping_method: new.shipping_method,
            payment_id: None,
            payment_provider: None,
            tracking_code: None,
            action_url: None,
            total_amount: new.totals.total_amount,
            shipping_cost: new.totals.shipping_cost,
            discount_amount: new.totals.discount_amount,
            final_amount: new.totals.final_amount,
            total_weight: new.totals.total_weight,
            discount: new.discount,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    pub fn number(&self) -> &OrderNumber {
        &self.number
    }

    pub fn owner(&self) -> &OrderOwner {
        &self.owner
    }

    pub fn is_guest(&self) -> bool {
        matches!(self.owner, OrderOwner::Guest(_))
    }

    pub fn checkout_id(&self) -> Option<CheckoutId> {
        self.checkout_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn shipping_address(&self) -> &Address {
        &self.shipping_address
    }

    pub fn billing_address(&self) -> Option<&Address> {
        self.billing_address.as_ref()
    }

    pub fn shipping_method(&self) -> Option<&OrderShippingMethod> {
        self.shipping_method.as_ref()
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.payment_id.as_deref()
    }

    pub fn payment_provider(&self) -> Option<&str> {
        self.payment_provider.as_deref()
    }

    pub fn tracking_code(&self) -> Option<&str> {
        self.tracking_code.as_deref()
    }

    pub fn action_url(&self) -> Option<&str> {
        self.action_url.as_deref()
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn shipping_cost(&self) -> Money {
        self.shipping_cost
    }

    pub fn discount_amount(&self) -> Money {
        self.discount_amount
    }

    pub fn final_amount(&self) -> Money {
        self.final_amount
    }

    pub fn total_weight(&self) -> Weight {
        self.total_weight
    }

    pub fn discount(&self) -> Option<&AppliedDiscount> {
        self.discount.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// True for a stored order still carrying its provisional number.
    pub fn needs_number_repair(&self) -> bool {
        self.id.is_some() && self.number.is_provisional()
    }

    /// The placement milestone, available once the order is stored.
    pub fn placed_event(&self) -> Option<OrderEvent> {
        let order_id = self.id?;
        let guest_email = match &self.owner {
            OrderOwner::Guest(contact) => Some(contact.email.clone()),
            OrderOwner::Registered(_) => None,
        };
        Some(OrderEvent::OrderPlaced(OrderPlacedData {
            order_id,
            order_number: self.number.clone(),
            final_amount: self.final_amount,
            currency: self.currency.clone(),
            guest_email,
            placed_at: self.created_at,
        }))
    }
}

// Storage hooks
impl Order {
    /// Sets the storage-assigned id and finalizes the number in one step.
    pub fn assign_id(&mut self, id: OrderId) {
        self.id = Some(id);
        self.finalize_number();
    }

    /// Sets the storage-assigned id without numbering. Only for rows read
    /// back from storage or tests reproducing an interrupted insert.
    pub fn restore_id(&mut self, id: OrderId) {
        self.id = Some(id);
    }

    /// Replaces a provisional number with the final one.
    ///
    /// Returns true if the number changed. Does nothing before an id exists
    /// or when the number is already final.
    pub fn finalize_number(&mut self) -> bool {
        let Some(id) = self.id else {
            return false;
        };
        if !self.number.is_provisional() {
            return false;
        }
        self.number = OrderNumber::finalized(self.is_guest(), self.created_at, id);
        true
    }
}

// Status transitions
impl Order {
    /// Moves the order to `next`.
    ///
    /// Returns `Ok(None)` when the order is already in `next`; nothing is
    /// touched and no milestone is produced. Disallowed moves leave the
    /// order unchanged.
    pub fn transition_to(
        &mut self,
        next: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderEvent>, OrderError> {
        let from = self.status;
        if from == next {
            return Ok(None);
        }
        if !from.can_transition_to(next) {
            return Err(OrderError::InvalidStateTransition {
                current_state: from,
                requested: next,
            });
        }

        self.status = next;
        self.updated_at = now;
        if next == OrderStatus::Delivered && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }

        metrics::counter!("order_transitions_total", "to" => next.as_str()).increment(1);
        tracing::info!(
            order_id = ?self.id,
            number = %self.number,
            from = %from,
            to = %next,
            "Order status changed"
        );

        Ok(Some(OrderEvent::StatusChanged(StatusChangedData {
            order_id: self.id,
            order_number: self.number.clone(),
            from,
            to: next,
            tracking_code: self.tracking_code.clone(),
            action_url: self.action_url.clone(),
            changed_at: now,
        })))
    }

    /// Records an authorized payment.
    pub fn mark_paid(
        &mut self,
        payment_id: impl Into<String>,
        provider: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderEvent>, OrderError> {
        self.check_transition(OrderStatus::Paid)?;
        if self.status == OrderStatus::Paid {
            return Ok(None);
        }
        self.payment_id = Some(payment_id.into());
        self.payment_provider = Some(provider.into());
        self.action_url = None;
        self.transition_to(OrderStatus::Paid, now)
    }

    /// Records a payment waiting on the shopper at `action_url`.
    pub fn mark_pending_action(
        &mut self,
        action_url: impl Into<String>,
        payment_id: impl Into<String>,
        provider: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderEvent>, OrderError> {
        self.check_transition(OrderStatus::PendingAction)?;
        if self.status == OrderStatus::PendingAction {
            return Ok(None);
        }
        self.action_url = Some(action_url.into());
        self.payment_id = Some(payment_id.into());
        self.payment_provider = Some(provider.into());
        self.transition_to(OrderStatus::PendingAction, now)
    }

    pub fn mark_captured(&mut self, now: DateTime<Utc>) -> Result<Option<OrderEvent>, OrderError> {
        self.transition_to(OrderStatus::Captured, now)
    }

    pub fn mark_shipped(
        &mut self,
        tracking_code: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderEvent>, OrderError> {
        let tracking_code = tracking_code.into();
        if tracking_code.trim().is_empty() {
            return Err(OrderError::TrackingCodeRequired);
        }
        self.check_transition(OrderStatus::Shipped)?;
        if self.status == OrderStatus::Shipped {
            return Ok(None);
        }
        self.tracking_code = Some(tracking_code);
        self.transition_to(OrderStatus::Shipped, now)
    }

    pub fn mark_delivered(&mut self, now: DateTime<Utc>) -> Result<Option<OrderEvent>, OrderError> {
        self.transition_to(OrderStatus::Delivered, now)
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<Option<OrderEvent>, OrderError> {
        self.transition_to(OrderStatus::Cancelled, now)
    }

    pub fn mark_refunded(&mut self, now: DateTime<Utc>) -> Result<Option<OrderEvent>, OrderError> {
        self.transition_to(OrderStatus::Refunded, now)
    }

    /// Re-validates a discount against this order and applies it.
    ///
    /// Only allowed before payment. The amount due becomes
    /// `total_amount - discount_amount`.
    pub fn apply_discount(
        &mut self,
        discount: &Discount,
        targets: DiscountTargets,
        now: DateTime<Utc>,
    ) -> Result<OrderEvent, OrderError> {
        if !self.status.can_apply_discount() {
            return Err(OrderError::DiscountNotAllowed {
                current_state: self.status,
            });
        }

        let amount = discount.evaluate(&*self, &targets, now)?;
        let applied = AppliedDiscount::capture(discount, targets)?;

        self.discount_amount = amount;
        self.final_amount = (self.total_amount - amount).non_negative();
        self.discount = Some(applied);
        self.updated_at = now;

        Ok(OrderEvent::DiscountApplied(DiscountAppliedData {
            order_id: self.id,
            code: discount.code().to_string(),
            discount_amount: self.discount_amount,
            final_amount: self.final_amount,
            applied_at: now,
        }))
    }

    fn check_transition(&self, next: OrderStatus) -> Result<(), OrderError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(OrderError::InvalidStateTransition {
                current_state: self.status,
                requested: next,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discount::{DiscountKind, DiscountMethod, DiscountRule, ValidityWindow};
    use crate::money::Percent;
    use crate::order::GuestContact;
    use chrono::Duration;
    use common::{DiscountId, ProductId, UserId};

    fn item(product: i64, qty: u32, price: i64) -> OrderItem {
        let unit_price = Money::from_minor(price);
        OrderItem {
            product_id: ProductId::new(product),
            variant_id: None,
            product_name: format!("Product {product}"),
            variant_name: None,
            sku: format!("SKU-{product}"),
            quantity: qty,
            unit_price,
            subtotal: unit_price.multiply(qty),
            weight: Weight::from_grams(100),
        }
    }

    fn new_order(owner: OrderOwner) -> NewOrder {
        NewOrder {
            owner,
            checkout_id: None,
            items: vec![item(1, 2, 500), item(2, 1, 1000)],
            currency: CurrencyCode::default(),
            shipping_address: Address::new("1 Main St", "Austin", "TX", "73301", "US"),
            billing_address: None,
            shipping_method: None,
            totals: OrderTotals {
                total_amount: Money::from_minor(2000),
                shipping_cost: Money::from_minor(500),
                discount_amount: Money::zero(),
                final_amount: Money::from_minor(2500),
                total_weight: Weight::from_grams(300),
            },
            discount: None,
        }
    }

    fn order() -> Order {
        Order::place(new_order(OrderOwner::Registered(UserId::new(1))), Utc::now()).unwrap()
    }

    fn discount(percent: u32) -> Discount {
        let now = Utc::now();
        let rule = DiscountRule::new(
            DiscountKind::Basket,
            DiscountMethod::Percentage(Percent::from_whole(percent).unwrap()),
        )
        .unwrap();
        let window = ValidityWindow::new(now - Duration::days(1), now + Duration::days(1)).unwrap();
        let mut d = Discount::new("LATE", rule, window).unwrap();
        d.assign_id(DiscountId::new(5));
        d
    }

    #[test]
    fn test_place_requires_items() {
        let mut new = new_order(OrderOwner::Registered(UserId::new(1)));
        new.items.clear();
        assert_eq!(Order::place(new, Utc::now()).unwrap_err(), OrderError::NoItems);
    }

    #[test]
    fn test_guest_needs_email() {
        let owner = OrderOwner::Guest(GuestContact {
            email: " ".to_string(),
            phone: None,
            full_name: "Ann".to_string(),
        });
        assert_eq!(
            Order::place(new_order(owner), Utc::now()).unwrap_err(),
            OrderError::GuestEmailRequired
        );
    }

    #[test]
    fn test_assign_id_finalizes_number_once() {
        let mut o = order();
        assert!(o.number().is_provisional());
        assert!(o.placed_event().is_none());

        o.assign_id(OrderId::new(42));
        assert!(o.number().as_str().ends_with("-000042"));
        assert!(!o.needs_number_repair());
        assert!(!o.finalize_number());
        assert!(matches!(o.placed_event(), Some(OrderEvent::OrderPlaced(_))));
    }

    #[test]
    fn test_restore_id_leaves_number_for_repair() {
        let mut o = order();
        o.restore_id(OrderId::new(7));
        assert!(o.needs_number_repair());
        assert!(o.finalize_number());
        assert!(!o.needs_number_repair());
    }

    #[test]
    fn test_happy_path_transitions() {
        let now = Utc::now();
        let mut o = order();
        assert!(o.mark_paid("pay_1", "sandbox", now).unwrap().is_some());
        assert_eq!(o.payment_id(), Some("pay_1"));
        o.mark_captured(now).unwrap();
        o.mark_shipped("TRACK-1", now).unwrap();
        assert_eq!(o.tracking_code(), Some("TRACK-1"));
        o.mark_delivered(now).unwrap();
        assert_eq!(o.status(), OrderStatus::Delivered);
        assert_eq!(o.completed_at(), Some(now));
    }

    #[test]
    fn test_same_state_is_idempotent_and_completed_at_set_once() {
        let first = Utc::now();
        let mut o = order();
        o.mark_paid("pay_1", "sandbox", first).unwrap();
        o.mark_captured(first).unwrap();
        o.mark_shipped("T", first).unwrap();
        o.mark_delivered(first).unwrap();

        let later = first + Duration::hours(1);
        let again = o.mark_delivered(later).unwrap();
        assert!(again.is_none());
        assert_eq!(o.completed_at(), Some(first));
        assert_eq!(o.updated_at(), first);
    }

    #[test]
    fn test_repeated_payment_marks_keep_first_reference() {
        let now = Utc::now();
        let mut o = order();
        o.mark_pending_action("https://pay.example/3ds/1", "pay_1", "sandbox", now)
            .unwrap();
        let again = o
            .mark_pending_action("https://pay.example/3ds/2", "pay_2", "other", now)
            .unwrap();
        assert!(again.is_none());
        assert_eq!(o.action_url(), Some("https://pay.example/3ds/1"));
        assert_eq!(o.payment_id(), Some("pay_1"));

        o.mark_paid("pay_1", "sandbox", now).unwrap();
        let again = o.mark_paid("pay_2", "other", now).unwrap();
        assert!(again.is_none());
        assert_eq!(o.payment_id(), Some("pay_1"));
        assert_eq!(o.payment_provider(), Some("sandbox"));

        o.mark_captured(now).unwrap();
        o.mark_shipped("TRACK-1", now).unwrap();
        assert!(o.mark_shipped("TRACK-2", now).unwrap().is_none());
        assert_eq!(o.tracking_code(), Some("TRACK-1"));
    }

    #[test]
    fn test_shipped_to_paid_rejected() {
        let now = Utc::now();
        let mut o = order();
        o.mark_paid("pay_1", "sandbox", now).unwrap();
        o.mark_captured(now).unwrap();
        o.mark_shipped("T", now).unwrap();

        let result = o.mark_paid("pay_2", "sandbox", now);
        assert_eq!(
            result.unwrap_err(),
            OrderError::InvalidStateTransition {
                current_state: OrderStatus::Shipped,
                requested: OrderStatus::Paid,
            }
        );
        assert_eq!(o.status(), OrderStatus::Shipped);
        assert_eq!(o.payment_id(), Some("pay_1"));
    }

    #[test]
    fn test_pending_action_then_paid_clears_action_url() {
        let now = Utc::now();
        let mut o = order();
        let event = o
            .mark_pending_action("https://pay.example/redirect", "pay_1", "sandbox", now)
            .unwrap()
            .unwrap();
        if let OrderEvent::StatusChanged(data) = event {
            assert_eq!(data.action_url.as_deref(), Some("https://pay.example/redirect"));
        } else {
            panic!("expected status change");
        }
        o.mark_paid("pay_1", "sandbox", now).unwrap();
        assert_eq!(o.action_url(), None);
    }

    #[test]
    fn test_terminal_cancelled() {
        let now = Utc::now();
        let mut o = order();
        o.cancel(now).unwrap();
        assert!(o.mark_paid("p", "sandbox", now).is_err());
        assert!(o.cancel(now).unwrap().is_none());
    }

    #[test]
    fn test_apply_discount_sets_final_from_total() {
        let mut o = order();
        o.apply_discount(&discount(10), DiscountTargets::none(), Utc::now())
            .unwrap();
        assert_eq!(o.discount_amount().minor(), 200);
        assert_eq!(o.final_amount().minor(), 1800);
        assert_eq!(o.discount().unwrap().code, "LATE");
    }

    #[test]
    fn test_apply_discount_rejected_after_payment() {
        let mut o = order();
        o.mark_paid("p", "sandbox", Utc::now()).unwrap();
        let result = o.apply_discount(&discount(10), DiscountTargets::none(), Utc::now());
        assert!(matches!(result, Err(OrderError::DiscountNotAllowed { .. })));
        assert_eq!(o.discount_amount(), Money::zero());
    }

    #[test]
    fn test_apply_expired_discount_rejected() {
        let mut o = order();
        let later = Utc::now() + Duration::days(3);
        let result = o.apply_discount(&discount(10), DiscountTargets::none(), later);
        assert!(matches!(result, Err(OrderError::Discount(_))));
    }

    #[test]
    fn test_serde_round_trip_keeps_state() {
        let mut o = order();
        o.assign_id(OrderId::new(3));
        o.mark_paid("p", "sandbox", Utc::now()).unwrap();
        let json = serde_json::to_string(&o).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status(), OrderStatus::Paid);
        assert_eq!(back.number(), o.number());
        assert_eq!(back.id(), Some(OrderId::new(3)));
    }
}
