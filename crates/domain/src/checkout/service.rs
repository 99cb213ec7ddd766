//! Checkout service providing the shopper-facing API over checkout storage.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{CheckoutId, DiscountId, ProductId, SessionId, ShippingRateId, UserId, VariantId};

use crate::aggregate::Aggregate;
use crate::config::StoreConfig;
use crate::discount::{
    AppliedDiscount, CategoryResolver, DiscountError, DiscountRepository, resolve_targets,
};
use crate::error::DomainError;
use crate::notification::{self, Notifier};
use crate::order::{Order, OrderRepository};
use crate::repository::RepositoryError;
use crate::shipping::{Address, ShippingQuote, ShippingService};

use super::{
    Checkout, CheckoutError, CheckoutItem, CheckoutRepository, CustomerDetails, Owner,
};

/// Collaborators a [`CheckoutService`] is built from.
#[derive(Clone)]
pub struct CheckoutDependencies {
    pub checkouts: Arc<dyn CheckoutRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub discounts: Arc<dyn DiscountRepository>,
    pub categories: Arc<dyn CategoryResolver>,
    pub shipping: ShippingService,
    pub notifier: Arc<dyn Notifier>,
    pub config: StoreConfig,
}

/// Service for the checkout lifecycle, from the first item to the placed order.
///
/// Every mutation loads the checkout, applies the change to the aggregate and
/// saves it with an optimistic version check, so two concurrent writers on the
/// same checkout cannot both succeed.
#[derive(Clone)]
pub struct CheckoutService {
    checkouts: Arc<dyn CheckoutRepository>,
    orders: Arc<dyn OrderRepository>,
    discounts: Arc<dyn DiscountRepository>,
    categories: Arc<dyn CategoryResolver>,
    shipping: ShippingService,
    notifier: Arc<dyn Notifier>,
    config: StoreConfig,
}

impl CheckoutService {
    pub fn new(deps: CheckoutDependencies) -> Self {
        Self {
            checkouts: deps.checkouts,
            orders: deps.orders,
            discounts: deps.discounts,
            categories: deps.categories,
            shipping: deps.shipping,
            notifier: deps.notifier,
            config: deps.config,
        }
    }

    /// Returns the owner's usable checkout, creating one if there is none.
    ///
    /// An active checkout found past its expiry is expired on the spot and a
    /// fresh one started.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self, owner: Owner) -> Result<Checkout, DomainError> {
        let now = Utc::now();
        if let Some(existing) = self.checkouts.find_active_by_owner(&owner).await? {
            if !existing.is_expired(now) {
                return Ok(existing);
            }
            self.expire(existing, now).await?;
        }

        let checkout = Checkout::new(
            owner,
            self.config.default_currency.clone(),
            self.config.checkout_ttl,
            now,
        )?;
        let checkout = self.checkouts.insert(checkout).await?;
        tracing::info!(checkout_id = ?checkout.id(), "Checkout started");
        Ok(checkout)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: CheckoutId) -> Result<Checkout, DomainError> {
        self.checkouts
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Checkout", id))
    }

    /// The owner's active, unexpired checkout.
    #[tracing::instrument(skip(self))]
    pub async fn get_active_for_owner(&self, owner: &Owner) -> Result<Option<Checkout>, DomainError> {
        let now = Utc::now();
        Ok(self
            .checkouts
            .find_active_by_owner(owner)
            .await?
            .filter(|c| !c.is_expired(now)))
    }

    #[tracing::instrument(skip(self, item), fields(product_id = %item.product_id))]
    pub async fn add_item(&self, id: CheckoutId, item: CheckoutItem) -> Result<Checkout, DomainError> {
        self.mutate(id, "add_item", |c, now| c.add_item(item, now))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        id: CheckoutId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: u32,
    ) -> Result<Checkout, DomainError> {
        self.mutate(id, "update_item", move |c, now| {
            c.update_item(product_id, variant_id, quantity, now)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        id: CheckoutId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> Result<Checkout, DomainError> {
        self.mutate(id, "remove_item", move |c, now| {
            c.remove_item(product_id, variant_id, now)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, id: CheckoutId) -> Result<Checkout, DomainError> {
        self.mutate(id, "clear", |c, now| c.clear(now)).await
    }

    #[tracing::instrument(skip(self, address))]
    pub async fn set_shipping_address(
        &self,
        id: CheckoutId,
        address: Address,
    ) -> Result<Checkout, DomainError> {
        self.mutate(id, "set_shipping_address", |c, now| {
            c.set_shipping_address(address, now)
        })
        .await
    }

    #[tracing::instrument(skip(self, address))]
    pub async fn set_billing_address(
        &self,
        id: CheckoutId,
        address: Address,
    ) -> Result<Checkout, DomainError> {
        self.mutate(id, "set_billing_address", |c, now| {
            c.set_billing_address(address, now)
        })
        .await
    }

    #[tracing::instrument(skip(self, details))]
    pub async fn set_customer_details(
        &self,
        id: CheckoutId,
        details: CustomerDetails,
    ) -> Result<Checkout, DomainError> {
        self.mutate(id, "set_customer_details", |c, now| {
            c.set_customer_details(details, now)
        })
        .await
    }

    /// Shipping options for the checkout's address and contents, cheapest first.
    #[tracing::instrument(skip(self))]
    pub async fn shipping_quotes(&self, id: CheckoutId) -> Result<Vec<ShippingQuote>, DomainError> {
        let checkout = self.get(id).await?;
        let address = checkout
            .shipping_address()
            .ok_or(CheckoutError::MissingShippingAddress)?;
        Ok(self
            .shipping
            .quote(address, checkout.total_amount(), checkout.total_weight())
            .await?)
    }

    /// Selects one of the rates offered for the checkout's shipping address.
    #[tracing::instrument(skip(self))]
    pub async fn select_shipping(
        &self,
        id: CheckoutId,
        rate_id: ShippingRateId,
    ) -> Result<Checkout, DomainError> {
        let mut checkout = self.get(id).await?;
        let now = Utc::now();
        checkout.ensure_mutable("set shipping method", now)?;

        let address = checkout
            .shipping_address()
            .ok_or(CheckoutError::MissingShippingAddress)?;
        let option = self
            .shipping
            .select_for_checkout(address, rate_id, checkout.total_amount())
            .await
            .map_err(CheckoutError::from)?;

        checkout.set_shipping_method(option, now)?;
        self.save(&checkout, "select_shipping").await
    }

    /// Looks up a discount code and applies it to the checkout.
    ///
    /// Validity and applicability are checked now; the redemption is only
    /// counted when the checkout completes.
    #[tracing::instrument(skip(self))]
    pub async fn apply_discount_code(&self, id: CheckoutId, code: &str) -> Result<Checkout, DomainError> {
        let mut checkout = self.get(id).await?;
        let discount = self
            .discounts
            .find_by_code(code)
            .await?
            .ok_or_else(|| {
                CheckoutError::from(DiscountError::UnknownCode {
                    code: code.to_string(),
                })
            })?;
        let targets = resolve_targets(self.categories.as_ref(), discount.rule()).await?;

        let amount = checkout.apply_discount(&discount, targets, Utc::now())?;
        tracing::info!(code = %discount.code(), %amount, "Discount applied to checkout");
        self.save(&checkout, "apply_discount").await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_discount(&self, id: CheckoutId) -> Result<Checkout, DomainError> {
        self.mutate(id, "remove_discount", |c, now| c.remove_discount(now))
            .await
    }

    /// Hands a guest's checkout to the user who just signed in.
    ///
    /// When the user already has an active checkout the guest's lines and
    /// missing details are merged into it, and the merged checkout is saved
    /// in the same unit that deletes the guest row, so a failed merge leaves
    /// both untouched and can be retried; otherwise the guest checkout is simply re-owned. Returns the user's
    /// checkout afterwards, if any.
    #[tracing::instrument(skip(self))]
    pub async fn authenticate_guest(
        &self,
        session: SessionId,
        user_id: UserId,
    ) -> Result<Option<Checkout>, DomainError> {
        let now = Utc::now();
        let user_owner = Owner::Registered(user_id);

        let guest = self
            .checkouts
            .find_active_by_owner(&Owner::Guest(session))
            .await?
            .filter(|c| !c.is_expired(now));
        let Some(guest) = guest else {
            return self.get_active_for_owner(&user_owner).await;
        };

        let mut user_checkout = self.checkouts.find_active_by_owner(&user_owner).await?;
        if let Some(stale) = user_checkout.take_if(|c| c.is_expired(now)) {
            self.expire(stale, now).await?;
        }

        match user_checkout {
            Some(mut target) => {
                let guest_id = guest
                    .id()
                    .ok_or(RepositoryError::NotPersisted { entity: "Checkout" })?;
                target.absorb(guest.clone(), now)?;
                let saved = self.checkouts.save_merged(&target, &guest).await?;
                metrics::counter!("checkout_mutations_total", "action" => "merge").increment(1);
                tracing::info!(
                    checkout_id = ?saved.id(),
                    guest_checkout_id = %guest_id,
                    "Merged guest checkout into user checkout"
                );
                Ok(Some(saved))
            }
            None => {
                let mut reowned = guest;
                reowned.reassign_owner(user_owner, now)?;
                let saved = self.save(&reowned, "reassign_owner").await?;
                tracing::info!(checkout_id = ?saved.id(), "Guest checkout re-owned");
                Ok(Some(saved))
            }
        }
    }

    /// Turns the checkout into an order.
    ///
    /// The discount is re-validated and its redemption counted atomically
    /// before the order is stored. If storing the order or completing the
    /// checkout fails afterwards, the redemption is given back (and a stored
    /// order cancelled) before the error is returned.
    #[tracing::instrument(skip(self))]
    pub async fn complete(&self, id: CheckoutId) -> Result<Order, DomainError> {
        let mut checkout = self.get(id).await?;
        let now = Utc::now();
        let order = checkout.to_order(now)?;

        let redemption = match checkout.discount() {
            Some(applied) => Some(self.redeem(applied, now).await?),
            None => None,
        };

        let mut order = match self.orders.create(order).await {
            Ok(order) => order,
            Err(e) => {
                self.release(redemption).await;
                return Err(e.into());
            }
        };

        if let Err(error) = self.finish_completion(&mut checkout, &order, now).await {
            tracing::error!(checkout_id = %id, %error, "Checkout completion failed after order was stored");
            match order.cancel(now) {
                Ok(_) => {
                    if let Err(cancel_error) = self.orders.save(&order).await {
                        tracing::error!(order_id = ?order.id(), %cancel_error, "Failed to cancel orphaned order");
                    }
                }
                Err(cancel_error) => {
                    tracing::error!(order_id = ?order.id(), %cancel_error, "Failed to cancel orphaned order");
                }
            }
            self.release(redemption).await;
            return Err(error);
        }

        metrics::counter!("orders_created_total", "guest" => order.is_guest().to_string())
            .increment(1);
        if redemption.is_some() {
            metrics::counter!("discount_redemptions_total", "scope" => "checkout").increment(1);
        }
        tracing::info!(
            checkout_id = %id,
            order_id = ?order.id(),
            number = %order.number(),
            final_amount = %order.final_amount(),
            "Checkout completed"
        );
        if let Some(event) = order.placed_event() {
            notification::dispatch(self.notifier.as_ref(), &event).await;
        }
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn abandon(&self, id: CheckoutId) -> Result<Checkout, DomainError> {
        self.mutate(id, "abandon", |c, now| c.mark_abandoned(now))
            .await
    }

    async fn mutate<F>(&self, id: CheckoutId, action: &'static str, change: F) -> Result<Checkout, DomainError>
    where
        F: FnOnce(&mut Checkout, DateTime<Utc>) -> Result<(), CheckoutError> + Send,
    {
        let mut checkout = self.get(id).await?;
        change(&mut checkout, Utc::now())?;
        self.save(&checkout, action).await
    }

    async fn save(&self, checkout: &Checkout, action: &'static str) -> Result<Checkout, DomainError> {
        let saved = self.checkouts.save(checkout).await?;
        metrics::counter!("checkout_mutations_total", "action" => action).increment(1);
        Ok(saved)
    }

    async fn expire(&self, mut checkout: Checkout, now: DateTime<Utc>) -> Result<(), DomainError> {
        checkout.mark_expired(now)?;
        self.checkouts.save(&checkout).await?;
        metrics::counter!("checkouts_expired_total").increment(1);
        Ok(())
    }

    async fn finish_completion(
        &self,
        checkout: &mut Checkout,
        order: &Order,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let order_id = order.id().ok_or_else(|| {
            DomainError::Inconsistency("stored order has no id".to_string())
        })?;
        checkout.mark_completed(order_id, now)?;
        self.save(checkout, "complete").await?;
        Ok(())
    }

    /// Re-checks the stored discount and takes one redemption.
    async fn redeem(&self, applied: &AppliedDiscount, now: DateTime<Utc>) -> Result<DiscountId, DomainError> {
        let discount = self
            .discounts
            .get(applied.discount_id)
            .await?
            .ok_or_else(|| {
                CheckoutError::from(DiscountError::UnknownCode {
                    code: applied.code.clone(),
                })
            })?;
        discount.check_valid(now).map_err(CheckoutError::from)?;

        if !self.discounts.try_increment_usage(applied.discount_id).await? {
            return Err(CheckoutError::from(DiscountError::UsageLimitReached {
                code: applied.code.clone(),
            })
            .into());
        }
        Ok(applied.discount_id)
    }

    async fn release(&self, redemption: Option<DiscountId>) {
        let Some(discount_id) = redemption else {
            return;
        };
        if let Err(error) = self.discounts.release_usage(discount_id).await {
            tracing::error!(%discount_id, %error, "Failed to release discount redemption");
        }
    }
}
