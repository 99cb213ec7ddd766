//! Order service providing a simplified API for order operations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::OrderId;

use crate::aggregate::Aggregate;
use crate::discount::{CategoryResolver, DiscountError, DiscountRepository, resolve_targets};
use crate::error::DomainError;
use crate::notification::{self, Notifier};
use crate::repository::RepositoryError;

use super::{Order, OrderError, OrderEvent, OrderRepository, OrderStatus};

/// Outcome of a provisional-number sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub repaired: usize,
    pub failed: usize,
}

/// Service for managing placed orders.
///
/// Reads go through [`get`](Self::get), which also repairs orders left with
/// a provisional number by an interrupted insert.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    discounts: Arc<dyn DiscountRepository>,
    categories: Arc<dyn CategoryResolver>,
    notifier: Arc<dyn Notifier>,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        discounts: Arc<dyn DiscountRepository>,
        categories: Arc<dyn CategoryResolver>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            orders,
            discounts,
            categories,
            notifier,
        }
    }

    /// Loads an order, finalizing its number first if it is still provisional.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: OrderId) -> Result<Order, DomainError> {
        let order = self
            .orders
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", id))?;

        if order.needs_number_repair() {
            return self.repair(order).await;
        }
        Ok(order)
    }

    /// Like [`get`](Self::get), keyed by the order number.
    #[tracing::instrument(skip(self))]
    pub async fn get_by_number(&self, number: &str) -> Result<Order, DomainError> {
        let order = self
            .orders
            .find_by_number(number)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", number))?;

        if order.needs_number_repair() {
            return self.repair(order).await;
        }
        Ok(order)
    }

    /// Loads an order, applies a status change and saves it.
    ///
    /// The milestone produced by the change is sent to the notifier after the
    /// save. A same-status request returns the order without saving.
    pub async fn update_status<F>(&self, id: OrderId, change: F) -> Result<Order, DomainError>
    where
        F: FnOnce(&mut Order, DateTime<Utc>) -> Result<Option<OrderEvent>, OrderError> + Send,
    {
        let mut order = self.get(id).await?;
        let Some(event) = change(&mut order, Utc::now())? else {
            return Ok(order);
        };

        let saved = self.orders.save(&order).await?;
        notification::dispatch(self.notifier.as_ref(), &event).await;
        Ok(saved)
    }

    /// Moves an order to any allowed status.
    #[tracing::instrument(skip(self))]
    pub async fn transition(&self, id: OrderId, next: OrderStatus) -> Result<Order, DomainError> {
        self.update_status(id, move |order, now| order.transition_to(next, now))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_shipped(&self, id: OrderId, tracking_code: String) -> Result<Order, DomainError> {
        self.update_status(id, move |order, now| order.mark_shipped(tracking_code, now))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_delivered(&self, id: OrderId) -> Result<Order, DomainError> {
        self.update_status(id, |order, now| order.mark_delivered(now))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, id: OrderId) -> Result<Order, DomainError> {
        self.update_status(id, |order, now| order.cancel(now)).await
    }

    /// Applies a discount code to an unpaid order.
    ///
    /// Validity and applicability are checked against the order itself. A
    /// code different from the one already on the order takes a redemption
    /// and gives the previous one back.
    #[tracing::instrument(skip(self))]
    pub async fn apply_discount(&self, id: OrderId, code: &str) -> Result<Order, DomainError> {
        let mut order = self.get(id).await?;
        let discount = self
            .discounts
            .find_by_code(code)
            .await?
            .ok_or_else(|| DiscountError::UnknownCode {
                code: code.to_string(),
            })?;
        let discount_id = discount
            .id()
            .ok_or(RepositoryError::NotPersisted { entity: "Discount" })?;
        let targets = resolve_targets(self.categories.as_ref(), discount.rule()).await?;

        let now = Utc::now();
        let previous = order.discount().map(|d| d.discount_id);
        let event = order.apply_discount(&discount, targets, now)?;

        let redeemed = previous != Some(discount_id);
        if redeemed && !self.discounts.try_increment_usage(discount_id).await? {
            return Err(DiscountError::UsageLimitReached {
                code: discount.code().to_string(),
            }
            .into());
        }

        let saved = match self.orders.save(&order).await {
            Ok(saved) => saved,
            Err(e) => {
                if redeemed {
                    self.discounts.release_usage(discount_id).await?;
                }
                return Err(e.into());
            }
        };

        if redeemed {
            if let Some(previous) = previous {
                self.discounts.release_usage(previous).await?;
            }
            metrics::counter!("discount_redemptions_total", "scope" => "order").increment(1);
        }
        notification::dispatch(self.notifier.as_ref(), &event).await;
        Ok(saved)
    }

    /// Finalizes the number of every stored order still carrying a
    /// provisional one. Safe to run repeatedly and alongside normal traffic.
    #[tracing::instrument(skip(self))]
    pub async fn repair_provisional_numbers(&self, limit: usize) -> Result<RepairReport, DomainError> {
        let mut report = RepairReport::default();
        for order in self.orders.find_provisional(limit).await? {
            let id = order.id();
            match self.repair(order).await {
                Ok(_) => report.repaired += 1,
                Err(error) => {
                    report.failed += 1;
                    tracing::error!(order_id = ?id, %error, "Order number repair failed");
                }
            }
        }
        Ok(report)
    }

    async fn repair(&self, mut order: Order) -> Result<Order, DomainError> {
        let Some(id) = order.id() else {
            return Err(DomainError::Inconsistency(
                "provisional order without id".to_string(),
            ));
        };
        order.finalize_number();

        match self.orders.save(&order).await {
            Ok(saved) => {
                metrics::counter!("order_number_repairs_total").increment(1);
                tracing::warn!(order_id = %id, number = %saved.number(), "Repaired provisional order number");
                Ok(saved)
            }
            // Someone else saved first; their copy may already carry the final number.
            Err(RepositoryError::ConcurrencyConflict { .. }) => {
                let current = self
                    .orders
                    .get(id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("Order", id))?;
                if current.needs_number_repair() {
                    return Err(DomainError::Inconsistency(format!(
                        "order {id} still has provisional number {}",
                        current.number()
                    )));
                }
                Ok(current)
            }
            Err(e) => Err(e.into()),
        }
    }
}
