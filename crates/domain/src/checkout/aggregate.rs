//! Checkout aggregate implementation.

use chrono::{DateTime, Duration, Utc};
use common::{CheckoutId, OrderId, ProductId, VariantId, Version};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::discount::{AppliedDiscount, Discount, DiscountTargets, Priceable, PriceableLine};
use crate::money::{CurrencyCode, Money, Weight};
use crate::order::{
    GuestContact, NewOrder, Order, OrderItem, OrderOwner, OrderShippingMethod, OrderTotals,
};
use crate::shipping::{Address, ShippingOption};

use super::{
    CheckoutError, CheckoutItem, CheckoutStatus, CustomerDetails, Owner, ShippingSelection,
};

/// Checkout aggregate root.
///
/// A mutable shopping session that carries items, addresses, a shipping
/// choice and a discount until it is turned into an order. The derived
/// amounts are private and only change through [`recalculate_totals`],
/// which every mutation calls, so
/// `final_amount == max(total_amount + shipping_cost - discount_amount, 0)`
/// holds after any successful call.
///
/// [`recalculate_totals`]: Checkout::recalculate_totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkout {
    id: Option<CheckoutId>,

    #[serde(default)]
    version: Version,

    owner: Owner,
    status: CheckoutStatus,
    items: Vec<CheckoutItem>,
    shipping_address: Option<Address>,
    billing_address: Option<Address>,
    customer: Option<CustomerDetails>,
    shipping: Option<ShippingSelection>,
    currency: CurrencyCode,
    discount: Option<AppliedDiscount>,

    total_amount: Money,
    total_weight: Weight,
    shipping_cost: Money,
    discount_amount: Money,
    final_amount: Money,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    converted_order_id: Option<OrderId>,
}

impl Aggregate for Checkout {
    type Id = CheckoutId;

    fn aggregate_type() -> &'static str {
        "Checkout"
    }

    fn id(&self) -> Option<CheckoutId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

impl Priceable for Checkout {
    fn priceable_total(&self) -> Money {
        self.items.iter().map(CheckoutItem::subtotal).sum()
    }

    fn priceable_lines(&self) -> Vec<PriceableLine> {
        self.items
            .iter()
            .map(|item| PriceableLine {
                product_id: item.product_id,
                subtotal: item.subtotal(),
            })
            .collect()
    }
}

// Query methods
impl Checkout {
    /// Starts an empty, active session expiring `ttl` after `now`.
    pub fn new(
        owner: Owner,
        currency: CurrencyCode,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, CheckoutError> {
        validate_owner(&owner)?;

        Ok(Self {
            id: None,
            version: Version::initial(),
            owner,
            status: CheckoutStatus::Active,
            items: Vec::new(),
            shipping_address: None,
            billing_address: None,
            customer: None,
            shipping: None,
            currency,
            discount: None,
            total_amount: Money::zero(),
            total_weight: Weight::zero(),
            shipping_cost: Money::zero(),
            discount_amount: Money::zero(),
            final_amount: Money::zero(),
            created_at: now,
            updated_at: now,
            last_activity_at: now,
            expires_at: now + ttl,
            completed_at: None,
            converted_order_id: None,
        })
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn status(&self) -> CheckoutStatus {
        self.status
    }

    pub fn items(&self) -> &[CheckoutItem] {
        &self.items
    }

    /// Returns the line for a product/variant pair.
    pub fn get_item(
        &self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> Option<&CheckoutItem> {
        self.items
            .iter()
            .find(|item| item.key() == (product_id, variant_id))
    }

    pub fn shipping_address(&self) -> Option<&Address> {
        self.shipping_address.as_ref()
    }

    pub fn billing_address(&self) -> Option<&Address> {
        self.billing_address.as_ref()
    }

    pub fn customer(&self) -> Option<&CustomerDetails> {
        self.customer.as_ref()
    }

    pub fn shipping(&self) -> Option<&ShippingSelection> {
        self.shipping.as_ref()
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn discount(&self) -> Option<&AppliedDiscount> {
        self.discount.as_ref()
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn total_weight(&self) -> Weight {
        self.total_weight
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

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn converted_order_id(&self) -> Option<OrderId> {
        self.converted_order_id
    }

    /// True once `now` is past the expiry. Pure; never changes the status.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Sets the storage-assigned id.
    pub fn assign_id(&mut self, id: CheckoutId) {
        self.id = Some(id);
    }
}

// Mutations
impl Checkout {
    /// Adds a line, or increases the quantity of an existing (product, variant) line.
    pub fn add_item(&mut self, item: CheckoutItem, now: DateTime<Utc>) -> Result<(), CheckoutError> {
        self.ensure_mutable("add item", now)?;
        validate_item(&item)?;

        let quantity = match self.items.iter().find(|line| line.key() == item.key()) {
            Some(existing) => {
                let quantity = existing
                    .quantity
                    .checked_add(item.quantity)
                    .ok_or(CheckoutError::AmountOverflow)?;
                self.ensure_line_fits(existing, quantity)?;
                quantity
            }
            None => {
                self.ensure_line_fits(&item, item.quantity)?;
                item.quantity
            }
        };

        match self.items.iter_mut().find(|line| line.key() == item.key()) {
            Some(existing) => existing.quantity = quantity,
            None => self.items.push(item),
        }

        self.finish_mutation(now);
        Ok(())
    }

    /// Sets the quantity of an existing line.
    pub fn update_item(
        &mut self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CheckoutError> {
        self.ensure_mutable("update item", now)?;
        if quantity == 0 {
            return Err(CheckoutError::InvalidQuantity { quantity });
        }

        let position = self
            .items
            .iter()
            .position(|line| line.key() == (product_id, variant_id))
            .ok_or(CheckoutError::ItemNotFound {
                product_id,
                variant_id,
            })?;
        self.ensure_line_fits(&self.items[position], quantity)?;
        self.items[position].quantity = quantity;

        self.finish_mutation(now);
        Ok(())
    }

    pub fn remove_item(
        &mut self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        now: DateTime<Utc>,
    ) -> Result<(), CheckoutError> {
        self.ensure_mutable("remove item", now)?;

        let position = self
            .items
            .iter()
            .position(|line| line.key() == (product_id, variant_id))
            .ok_or(CheckoutError::ItemNotFound {
                product_id,
                variant_id,
            })?;
        self.items.remove(position);

        self.finish_mutation(now);
        Ok(())
    }

    /// Removes every line.
    pub fn clear(&mut self, now: DateTime<Utc>) -> Result<(), CheckoutError> {
        self.ensure_mutable("clear", now)?;
        self.items.clear();
        self.finish_mutation(now);
        Ok(())
    }

    /// Sets the shipping address. A previously picked shipping rate is
    /// dropped when the address changes, since the zone may differ.
    pub fn set_shipping_address(
        &mut self,
        address: Address,
        now: DateTime<Utc>,
    ) -> Result<(), CheckoutError> {
        self.ensure_mutable("set shipping address", now)?;
        address.validate()?;

        if self.shipping_address.as_ref() != Some(&address) {
            self.shipping = None;
        }
        self.shipping_address = Some(address);

        self.finish_mutation(now);
        Ok(())
    }

    pub fn set_billing_address(
        &mut self,
        address: Address,
        now: DateTime<Utc>,
    ) -> Result<(), CheckoutError> {
        self.ensure_mutable("set billing address", now)?;
        address.validate()?;
        self.billing_address = Some(address);
        self.finish_mutation(now);
        Ok(())
    }

    pub fn set_customer_details(
        &mut self,
        details: CustomerDetails,
        now: DateTime<Utc>,
    ) -> Result<(), CheckoutError> {
        self.ensure_mutable("set customer details", now)?;
        if details.email.trim().is_empty() {
            return Err(CheckoutError::MissingCustomerEmail);
        }
        self.customer = Some(details);
        self.finish_mutation(now);
        Ok(())
    }

    /// Selects a shipping rate already resolved for the current shipping address.
    pub fn set_shipping_method(
        &mut self,
        option: ShippingOption,
        now: DateTime<Utc>,
    ) -> Result<(), CheckoutError> {
        self.ensure_mutable("set shipping method", now)?;
        if self.shipping_address.is_none() {
            return Err(CheckoutError::MissingShippingAddress);
        }
        self.shipping = Some(ShippingSelection::from(option));
        self.finish_mutation(now);
        Ok(())
    }

    /// Validates the discount against the current contents and attaches it,
    /// replacing any discount already applied.
    pub fn apply_discount(
        &mut self,
        discount: &Discount,
        targets: DiscountTargets,
        now: DateTime<Utc>,
    ) -> Result<Money, CheckoutError> {
        self.ensure_mutable("apply discount", now)?;
        let amount = discount.evaluate(&*self, &targets, now)?;

        self.discount = Some(AppliedDiscount::capture(discount, targets)?);
        self.finish_mutation(now);
        Ok(amount)
    }

    pub fn remove_discount(&mut self, now: DateTime<Utc>) -> Result<(), CheckoutError> {
        self.ensure_mutable("remove discount", now)?;
        self.discount = None;
        self.finish_mutation(now);
        Ok(())
    }

    /// Hands the session to another owner, e.g. a guest who signed in.
    pub fn reassign_owner(&mut self, owner: Owner, now: DateTime<Utc>) -> Result<(), CheckoutError> {
        self.ensure_mutable("reassign owner", now)?;
        validate_owner(&owner)?;
        self.owner = owner;
        self.finish_mutation(now);
        Ok(())
    }

    /// Re-aggregates every derived amount from the current contents.
    ///
    /// The applied discount and the selected shipping rate are re-evaluated
    /// against the new total and weight. A discount whose rule no longer
    /// matches (order below its minimum, no targeted items left) is dropped.
    pub fn recalculate_totals(&mut self) {
        self.total_amount = self.priceable_total();
        self.total_weight = self.items.iter().map(CheckoutItem::total_weight).sum();

        self.shipping_cost = match &self.shipping {
            Some(selection) => selection.cost(self.total_amount, self.total_weight),
            None => Money::zero(),
        };

        self.discount_amount = Money::zero();
        if let Some(applied) = self.discount.take() {
            if applied.is_applicable_to(&*self) {
                self.discount_amount = applied.amount_for(&*self);
                self.discount = Some(applied);
            } else {
                tracing::warn!(
                    checkout_id = ?self.id,
                    code = %applied.code,
                    "Discount no longer applies to checkout contents, removing"
                );
            }
        }

        self.final_amount =
            (self.total_amount + self.shipping_cost - self.discount_amount).non_negative();
    }

    /// Marks the session converted into an order.
    pub fn mark_completed(&mut self, order_id: OrderId, now: DateTime<Utc>) -> Result<(), CheckoutError> {
        self.ensure_active("complete")?;
        self.status = CheckoutStatus::Completed;
        self.converted_order_id = Some(order_id);
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_abandoned(&mut self, now: DateTime<Utc>) -> Result<(), CheckoutError> {
        self.ensure_active("abandon")?;
        self.status = CheckoutStatus::Abandoned;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_expired(&mut self, now: DateTime<Utc>) -> Result<(), CheckoutError> {
        self.ensure_active("expire")?;
        self.status = CheckoutStatus::Expired;
        self.updated_at = now;
        Ok(())
    }

    /// Snapshots the session into a new, unpersisted order.
    ///
    /// The order gets a provisional number; storage finalizes it when the id
    /// is assigned.
    pub fn to_order(&self, now: DateTime<Utc>) -> Result<Order, CheckoutError> {
        self.ensure_mutable("convert to order", now)?;
        if self.items.is_empty() {
            return Err(CheckoutError::NoItems);
        }
        let shipping_address = self
            .shipping_address
            .clone()
            .ok_or(CheckoutError::MissingShippingAddress)?;

        let owner = match &self.owner {
            Owner::Registered(user_id) => OrderOwner::Registered(*user_id),
            Owner::Guest(_) => {
                let details = self
                    .customer
                    .as_ref()
                    .filter(|c| !c.email.trim().is_empty())
                    .ok_or(CheckoutError::MissingCustomerEmail)?;
                OrderOwner::Guest(GuestContact {
                    email: details.email.clone(),
                    phone: details.phone.clone(),
                    full_name: details.full_name.clone(),
                })
            }
        };

        let items = self.items.iter().map(OrderItem::from).collect();

        let order = Order::place(
            NewOrder {
                owner,
                checkout_id: self.id,
                items,
                currency: self.currency.clone(),
                shipping_address,
                billing_address: self.billing_address.clone(),
                shipping_method: self
                    .shipping
                    .as_ref()
                    .map(|s| OrderShippingMethod {
                        method_id: s.method_id,
                        name: s.method_name.clone(),
                    }),
                totals: OrderTotals {
                    total_amount: self.total_amount,
                    shipping_cost: self.shipping_cost,
                    discount_amount: self.discount_amount,
                    final_amount: self.final_amount,
                    total_weight: self.total_weight,
                },
                discount: self.discount.clone(),
            },
            now,
        )?;
        Ok(order)
    }

    fn ensure_active(&self, action: &'static str) -> Result<(), CheckoutError> {
        if !self.status.can_mutate() {
            return Err(CheckoutError::InvalidStateTransition {
                current_state: self.status,
                action,
            });
        }
        Ok(())
    }

    pub(super) fn ensure_mutable(&self, action: &'static str, now: DateTime<Utc>) -> Result<(), CheckoutError> {
        self.ensure_active(action)?;
        if self.is_expired(now) {
            return Err(CheckoutError::Expired {
                expires_at: self.expires_at,
            });
        }
        Ok(())
    }

    fn finish_mutation(&mut self, now: DateTime<Utc>) {
        self.recalculate_totals();
        self.updated_at = now;
        self.last_activity_at = now;
    }

    // Used by the merge so the shopper-facing fields follow the user-wins policy.
    pub(super) fn merge_parts_mut(&mut self) -> MergeParts<'_> {
        MergeParts {
            items: &mut self.items,
            shipping_address: &mut self.shipping_address,
            billing_address: &mut self.billing_address,
            customer: &mut self.customer,
            shipping: &mut self.shipping,
            discount: &mut self.discount,
        }
    }

    /// Checks that `line` at `quantity`, together with every other line,
    /// still has representable totals.
    fn ensure_line_fits(&self, line: &CheckoutItem, quantity: u32) -> Result<(), CheckoutError> {
        let others = self
            .items
            .iter()
            .filter(|other| other.key() != line.key())
            .map(|other| (other, other.quantity));
        checked_line_totals(others.chain(std::iter::once((line, quantity))))
            .map(|_| ())
            .ok_or(CheckoutError::AmountOverflow)
    }

    pub(super) fn finish_merge(&mut self, now: DateTime<Utc>) {
        self.finish_mutation(now);
    }
}

pub(super) struct MergeParts<'a> {
    pub items: &'a mut Vec<CheckoutItem>,
    pub shipping_address: &'a mut Option<Address>,
    pub billing_address: &'a mut Option<Address>,
    pub customer: &'a mut Option<CustomerDetails>,
    pub shipping: &'a mut Option<ShippingSelection>,
    pub discount: &'a mut Option<AppliedDiscount>,
}

fn validate_owner(owner: &Owner) -> Result<(), CheckoutError> {
    match owner {
        Owner::Registered(user_id) if !user_id.is_assigned() => Err(CheckoutError::InvalidOwner {
            reason: "user id must be positive",
        }),
        Owner::Guest(session) if session.is_blank() => Err(CheckoutError::InvalidOwner {
            reason: "guest session id is blank",
        }),
        _ => Ok(()),
    }
}

/// Sums line amounts and weights, or `None` when either overflows.
pub(super) fn checked_line_totals<'a>(
    lines: impl IntoIterator<Item = (&'a CheckoutItem, u32)>,
) -> Option<(Money, Weight)> {
    lines
        .into_iter()
        .try_fold((Money::zero(), Weight::zero()), |(amount, weight), (line, quantity)| {
            Some((
                amount.checked_add(line.unit_price.checked_multiply(quantity)?)?,
                weight.checked_add(line.weight.checked_multiply(quantity)?)?,
            ))
        })
}

fn validate_item(item: &CheckoutItem) -> Result<(), CheckoutError> {
    if !item.product_id.is_assigned() {
        return Err(CheckoutError::InvalidProductId {
            product_id: item.product_id,
        });
    }
    if item.quantity == 0 {
        return Err(CheckoutError::InvalidQuantity {
            quantity: item.quantity,
        });
    }
    if item.unit_price.is_negative() {
        return Err(CheckoutError::NegativePrice {
            price: item.unit_price,
        });
    }
    Ok(())
}
