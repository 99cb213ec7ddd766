//! Drives orders and the transaction ledger from provider outcomes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use common::OrderId;
use domain::payment::{
    NewTransaction, TransactionStatus, TransactionType, ensure_none_in_flight, ensure_not_succeeded,
};
use domain::{
    LedgerError, Money, Order, OrderService, OrderStatus, PaymentTransaction, TransactionLedger,
};
use serde_json::{Value, json};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::{GatewayError, PaymentError, ProviderError, Result};
use crate::gateway::PaymentGateway;
use crate::provider::{PaymentOutcome, PaymentRequest, ProviderResponse};

const LOCK_TABLE_PRUNE_AT: usize = 1024;

/// The order after a payment operation, with the ledger row it produced.
#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    pub order: Order,
    pub transaction: Option<PaymentTransaction>,
}

/// Outcome of a reconciliation pass over pending ledger rows.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Rows the provider answered for, either way.
    pub settled: usize,
    /// Rows the provider still reports as in progress.
    pub still_pending: usize,
    /// Rows that cannot be looked up automatically.
    pub needs_attention: usize,
}

/// Coordinates payment operations for orders.
///
/// Every operation on an order runs under that order's lock, and the ledger
/// guard is consulted inside the lock before any provider call, so two
/// concurrent captures cannot both reach the provider. A call whose outcome
/// is still unknown blocks the next call of the same kind until it is
/// confirmed or reconciled.
#[derive(Clone)]
pub struct PaymentCoordinator {
    gateway: PaymentGateway,
    ledger: Arc<dyn TransactionLedger>,
    orders: OrderService,
    locks: Arc<Mutex<HashMap<OrderId, Arc<Mutex<()>>>>>,
}

impl PaymentCoordinator {
    pub fn new(gateway: PaymentGateway, ledger: Arc<dyn TransactionLedger>, orders: OrderService) -> Self {
        Self {
            gateway,
            ledger,
            orders,
            locks: Arc::default(),
        }
    }

    /// Starts a payment for an unpaid order with the given provider.
    ///
    /// An approved payment marks the order paid, a payment waiting on the
    /// shopper moves it to pending-action, and a payment the provider will
    /// confirm later leaves it pending with a pending ledger row.
    #[tracing::instrument(skip(self, return_url))]
    pub async fn authorize(
        &self,
        order_id: OrderId,
        provider: &str,
        return_url: Option<String>,
    ) -> Result<PaymentReceipt> {
        let _guard = self.lock(order_id).await;
        let order = self.orders.get(order_id).await?;
        if !matches!(order.status(), OrderStatus::Pending | OrderStatus::PendingAction) {
            return Err(invalid_status(&order, order_id, "authorize"));
        }
        ensure_not_succeeded(self.ledger.as_ref(), order_id, TransactionType::Authorize).await?;
        ensure_none_in_flight(self.ledger.as_ref(), order_id, TransactionType::Authorize).await?;

        let request = PaymentRequest {
            order_id,
            order_number: order.number().to_string(),
            amount: order.final_amount(),
            currency: order.currency().clone(),
            return_url,
        };
        let response = match self.gateway.process_payment(provider, &request).await {
            Ok(response) => response,
            Err(error) => {
                self.record_failure(&request, TransactionType::Authorize, provider, &error)
                    .await;
                return Err(error.into());
            }
        };

        let transaction = self
            .record_response(&order, order_id, TransactionType::Authorize, &response)
            .await?;

        let payment_id = response.transaction_id.clone();
        let provider_key = response.provider.clone();
        let updated = match response.outcome {
            PaymentOutcome::Approved => {
                self.orders
                    .update_status(order_id, move |o, now| o.mark_paid(payment_id, provider_key, now))
                    .await
            }
            PaymentOutcome::ActionRequired { action_url } => {
                self.orders
                    .update_status(order_id, move |o, now| {
                        o.mark_pending_action(action_url, payment_id, provider_key, now)
                    })
                    .await
            }
            PaymentOutcome::Pending => Ok(order),
        }
        .inspect_err(|error| {
            tracing::error!(%order_id, %error, "Payment accepted by provider but order update failed");
        })?;

        tracing::info!(%order_id, provider, status = %updated.status(), "Payment authorized");
        Ok(PaymentReceipt {
            order: updated,
            transaction: Some(transaction),
        })
    }

    /// Captures the authorized amount of a paid order.
    #[tracing::instrument(skip(self))]
    pub async fn capture(&self, order_id: OrderId) -> Result<PaymentReceipt> {
        let _guard = self.lock(order_id).await;
        let order = self.orders.get(order_id).await?;
        if order.status() != OrderStatus::Paid {
            return Err(invalid_status(&order, order_id, "capture"));
        }
        ensure_not_succeeded(self.ledger.as_ref(), order_id, TransactionType::Capture).await?;
        ensure_none_in_flight(self.ledger.as_ref(), order_id, TransactionType::Capture).await?;
        let (payment_id, provider) = self.payment_reference(&order, order_id).await?;

        let amount = order.final_amount();
        let response = match self
            .gateway
            .capture_payment(&provider, &payment_id, amount)
            .await
        {
            Ok(response) => response,
            Err(error) => {
                self.record_failure(
                    &request_for(&order, order_id),
                    TransactionType::Capture,
                    &provider,
                    &error,
                )
                .await;
                // The authorization stands; the order stays paid.
                tracing::error!(%order_id, %error, "Capture failed on a paid order");
                return Err(error.into());
            }
        };

        let transaction = self
            .record_response(&order, order_id, TransactionType::Capture, &response)
            .await?;
        let order = if transaction.is_successful() {
            self.orders
                .update_status(order_id, |o, now| o.mark_captured(now))
                .await
                .inspect_err(|error| {
                    tracing::error!(%order_id, %error, "Capture succeeded but order update failed");
                })?
        } else {
            order
        };

        tracing::info!(%order_id, amount = %amount, "Payment captured");
        Ok(PaymentReceipt {
            order,
            transaction: Some(transaction),
        })
    }

    /// Refunds part or all of the captured amount.
    ///
    /// With no amount the whole remaining captured amount is refunded. The
    /// order moves to refunded once nothing captured is left.
    #[tracing::instrument(skip(self))]
    pub async fn refund(&self, order_id: OrderId, amount: Option<Money>) -> Result<PaymentReceipt> {
        let _guard = self.lock(order_id).await;
        let order = self.orders.get(order_id).await?;
        if !matches!(order.status(), OrderStatus::Captured | OrderStatus::Delivered) {
            return Err(invalid_status(&order, order_id, "refund"));
        }
        ensure_none_in_flight(self.ledger.as_ref(), order_id, TransactionType::Refund).await?;

        let captured = self
            .ledger
            .sum_successful_amount_by_order_and_type(order_id, TransactionType::Capture)
            .await?;
        let refunded = self
            .ledger
            .sum_successful_amount_by_order_and_type(order_id, TransactionType::Refund)
            .await?;
        let refundable = captured - refunded;
        let amount = amount.unwrap_or(refundable);
        if amount <= Money::zero() {
            return Err(PaymentError::InvalidRefundAmount { amount });
        }
        if amount > refundable {
            return Err(PaymentError::RefundExceedsCaptured {
                requested: amount,
                refundable,
            });
        }

        let (payment_id, provider) = self.payment_reference(&order, order_id).await?;
        let response = match self.gateway.refund_payment(&provider, &payment_id, amount).await {
            Ok(response) => response,
            Err(error) => {
                let mut request = request_for(&order, order_id);
                request.amount = amount;
                self.record_failure(&request, TransactionType::Refund, &provider, &error)
                    .await;
                tracing::error!(%order_id, %error, "Refund failed");
                return Err(error.into());
            }
        };

        let transaction = self
            .record_response(&order, order_id, TransactionType::Refund, &response)
            .await?;
        let fully_refunded = transaction.is_successful() && refunded + amount >= captured;
        let order = if fully_refunded {
            self.orders
                .update_status(order_id, |o, now| o.mark_refunded(now))
                .await
                .inspect_err(|error| {
                    tracing::error!(%order_id, %error, "Refund succeeded but order update failed");
                })?
        } else {
            order
        };

        tracing::info!(%order_id, amount = %amount, fully_refunded, "Payment refunded");
        Ok(PaymentReceipt {
            order,
            transaction: Some(transaction),
        })
    }

    /// Cancels an unpaid order, voiding any payment still open at the provider.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId) -> Result<PaymentReceipt> {
        let _guard = self.lock(order_id).await;
        let order = self.orders.get(order_id).await?;
        if !matches!(order.status(), OrderStatus::Pending | OrderStatus::PendingAction) {
            return Err(invalid_status(&order, order_id, "cancel"));
        }
        ensure_not_succeeded(self.ledger.as_ref(), order_id, TransactionType::Cancel).await?;
        ensure_none_in_flight(self.ledger.as_ref(), order_id, TransactionType::Cancel).await?;

        let transaction = match self.payment_reference(&order, order_id).await {
            Ok((payment_id, provider)) => {
                let response = match self.gateway.cancel_payment(&provider, &payment_id).await {
                    Ok(response) => response,
                    Err(error) => {
                        self.record_failure(
                            &request_for(&order, order_id),
                            TransactionType::Cancel,
                            &provider,
                            &error,
                        )
                        .await;
                        return Err(error.into());
                    }
                };
                Some(
                    self.record_response(&order, order_id, TransactionType::Cancel, &response)
                        .await?,
                )
            }
            Err(PaymentError::NoPayment { .. }) => None,
            Err(error) => return Err(error),
        };

        let order = self.orders.cancel(order_id).await?;
        tracing::info!(%order_id, "Order cancelled");
        Ok(PaymentReceipt { order, transaction })
    }

    /// Applies an asynchronous confirmation from a provider to its ledger
    /// row and the order.
    #[tracing::instrument(skip(self, raw_response))]
    pub async fn confirm(
        &self,
        provider: &str,
        transaction_id: &str,
        status: TransactionStatus,
        raw_response: Option<Value>,
    ) -> Result<PaymentReceipt> {
        let row = self
            .ledger
            .find_by_transaction_id(provider, transaction_id)
            .await?
            .ok_or_else(|| LedgerError::TransactionNotFound {
                provider: provider.to_string(),
                transaction_id: transaction_id.to_string(),
            })?;

        let _guard = self.lock(row.order_id).await;
        self.settle(provider, transaction_id, status, raw_response)
            .await
    }

    /// Approves an offline or sandbox payment without the shopper.
    #[tracing::instrument(skip(self))]
    pub async fn force_approve(&self, order_id: OrderId) -> Result<PaymentReceipt> {
        let _guard = self.lock(order_id).await;
        let order = self.orders.get(order_id).await?;
        if !matches!(order.status(), OrderStatus::Pending | OrderStatus::PendingAction) {
            return Err(invalid_status(&order, order_id, "approve"));
        }
        let (payment_id, provider) = self.payment_reference(&order, order_id).await?;

        let response = self.gateway.force_approve(&provider, &payment_id).await?;
        self.settle(
            &provider,
            &payment_id,
            TransactionStatus::Successful,
            Some(response.raw),
        )
        .await
    }

    /// Looks up pending ledger rows older than `older_than` with their
    /// providers and settles the ones that have an answer.
    ///
    /// Rows recorded after an unreachable provider carry a local id the
    /// provider does not know; they are counted as needing attention.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, older_than: Duration, limit: usize) -> Result<ReconcileReport> {
        let cutoff = Utc::now() - older_than;
        let mut report = ReconcileReport::default();

        for row in self.ledger.pending_older_than(cutoff, limit).await? {
            if row.reconcile || row.kind != TransactionType::Authorize {
                tracing::warn!(
                    order_id = %row.order_id,
                    provider = %row.provider,
                    transaction_id = %row.transaction_id,
                    kind = %row.kind,
                    "Pending payment needs manual reconciliation"
                );
                report.needs_attention += 1;
                continue;
            }

            let _guard = self.lock(row.order_id).await;
            let verdict = match self
                .gateway
                .verify_payment(&row.provider, &row.transaction_id)
                .await
            {
                Ok(response) if response.is_approved() => {
                    Some((TransactionStatus::Successful, response.raw))
                }
                Ok(_) => None,
                Err(GatewayError::Provider {
                    source: ProviderError::Rejected { reason },
                    ..
                }) => Some((TransactionStatus::Failed, json!({ "error": reason }))),
                Err(error) => {
                    tracing::warn!(transaction_id = %row.transaction_id, %error, "Verification failed");
                    None
                }
            };

            let Some((status, raw)) = verdict else {
                report.still_pending += 1;
                continue;
            };
            match self
                .settle(&row.provider, &row.transaction_id, status, Some(raw))
                .await
            {
                Ok(_) => report.settled += 1,
                Err(error) => {
                    tracing::error!(transaction_id = %row.transaction_id, %error, "Settling payment failed");
                    report.needs_attention += 1;
                }
            }
        }

        tracing::info!(
            settled = report.settled,
            still_pending = report.still_pending,
            needs_attention = report.needs_attention,
            "Payment reconciliation finished"
        );
        Ok(report)
    }

    /// Updates a ledger row and moves the order accordingly. Caller holds the
    /// order lock.
    async fn settle(
        &self,
        provider: &str,
        transaction_id: &str,
        status: TransactionStatus,
        raw_response: Option<Value>,
    ) -> Result<PaymentReceipt> {
        let transaction = self
            .ledger
            .update_status(provider, transaction_id, status, raw_response)
            .await?;
        let order_id = transaction.order_id;
        let order = self.orders.get(order_id).await?;

        let order = match (transaction.kind, transaction.status) {
            (TransactionType::Authorize, TransactionStatus::Successful)
                if matches!(order.status(), OrderStatus::Pending | OrderStatus::PendingAction) =>
            {
                let payment_id = transaction.transaction_id.clone();
                let provider_key = transaction.provider.clone();
                self.orders
                    .update_status(order_id, move |o, now| o.mark_paid(payment_id, provider_key, now))
                    .await?
            }
            (TransactionType::Capture, TransactionStatus::Successful)
                if order.status() == OrderStatus::Paid =>
            {
                self.orders
                    .update_status(order_id, |o, now| o.mark_captured(now))
                    .await?
            }
            (TransactionType::Refund, TransactionStatus::Successful)
                if matches!(order.status(), OrderStatus::Captured | OrderStatus::Delivered) =>
            {
                let captured = self
                    .ledger
                    .sum_successful_amount_by_order_and_type(order_id, TransactionType::Capture)
                    .await?;
                let refunded = self
                    .ledger
                    .sum_successful_amount_by_order_and_type(order_id, TransactionType::Refund)
                    .await?;
                if refunded >= captured {
                    self.orders
                        .update_status(order_id, |o, now| o.mark_refunded(now))
                        .await?
                } else {
                    order
                }
            }
            (TransactionType::Cancel, TransactionStatus::Successful)
                if order.status().can_transition_to(OrderStatus::Cancelled) =>
            {
                self.orders.cancel(order_id).await?
            }
            (kind, TransactionStatus::Failed) => {
                if order.status().is_paid() {
                    tracing::error!(%order_id, %kind, transaction_id, "Provider reported failure on a paid order");
                } else {
                    tracing::warn!(%order_id, %kind, transaction_id, "Provider reported payment failure");
                }
                order
            }
            _ => order,
        };

        Ok(PaymentReceipt {
            order,
            transaction: Some(transaction),
        })
    }

    async fn lock(&self, order_id: OrderId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() >= LOCK_TABLE_PRUNE_AT {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(order_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// The provider payment behind an order: the one stamped on the order,
    /// or else the latest authorization still open in the ledger.
    async fn payment_reference(&self, order: &Order, order_id: OrderId) -> Result<(String, String)> {
        if let (Some(payment_id), Some(provider)) = (order.payment_id(), order.payment_provider()) {
            return Ok((payment_id.to_string(), provider.to_string()));
        }

        self.ledger
            .latest_by_order_and_type(order_id, TransactionType::Authorize)
            .await?
            .filter(|tx| !tx.reconcile && tx.status != TransactionStatus::Failed)
            .map(|tx| (tx.transaction_id, tx.provider))
            .ok_or(PaymentError::NoPayment { order_id })
    }

    async fn record_response(
        &self,
        order: &Order,
        order_id: OrderId,
        kind: TransactionType,
        response: &ProviderResponse,
    ) -> Result<PaymentTransaction> {
        let status = match response.outcome {
            PaymentOutcome::Approved => TransactionStatus::Successful,
            PaymentOutcome::ActionRequired { .. } | PaymentOutcome::Pending => TransactionStatus::Pending,
        };
        let mut row = NewTransaction::new(
            order_id,
            &response.transaction_id,
            kind,
            status,
            response.amount,
            &response.provider,
        )
        .with_currency(order.currency().clone())
        .with_raw_response(response.raw.clone())
        .with_metadata("order_number", order.number().to_string());
        if let PaymentOutcome::ActionRequired { action_url } = &response.outcome {
            row = row.with_metadata("action_url", action_url.as_str());
        }

        self.ledger.record(row).await.map_err(|error| {
            tracing::error!(
                %order_id,
                %kind,
                transaction_id = %response.transaction_id,
                %error,
                "Provider call succeeded but ledger write failed"
            );
            error.into()
        })
    }

    /// Writes the ledger row for a failed provider call. A rejection is a
    /// failed row; an unreachable provider leaves a pending row under a local
    /// id flagged for reconciliation.
    async fn record_failure(
        &self,
        request: &PaymentRequest,
        kind: TransactionType,
        provider: &str,
        error: &GatewayError,
    ) {
        let local_id = format!("local-{}", Uuid::new_v4());
        let row = match error.provider_error() {
            Some(ProviderError::Rejected { reason }) => NewTransaction::new(
                request.order_id,
                local_id,
                kind,
                TransactionStatus::Failed,
                request.amount,
                provider,
            )
            .with_raw_response(json!({ "error": reason })),
            Some(ProviderError::Unreachable { reason }) => {
                tracing::warn!(order_id = %request.order_id, provider, %kind, %reason, "Provider unreachable, outcome unknown");
                NewTransaction::new(
                    request.order_id,
                    local_id,
                    kind,
                    TransactionStatus::Pending,
                    request.amount,
                    provider,
                )
                .with_raw_response(json!({ "error": reason }))
                .needing_reconciliation()
            }
            Some(ProviderError::Unsupported { .. }) | None => return,
        };

        let row = row
            .with_currency(request.currency.clone())
            .with_metadata("order_number", request.order_number.as_str());
        if let Err(ledger_error) = self.ledger.record(row).await {
            tracing::error!(order_id = %request.order_id, %ledger_error, "Failed to record payment failure");
        }
    }
}

fn invalid_status(order: &Order, order_id: OrderId, operation: &'static str) -> PaymentError {
    PaymentError::InvalidOrderStatus {
        order_id,
        status: order.status(),
        operation,
    }
}

fn request_for(order: &Order, order_id: OrderId) -> PaymentRequest {
    PaymentRequest {
        order_id,
        order_number: order.number().to_string(),
        amount: order.final_amount(),
        currency: order.currency().clone(),
        return_url: None,
    }
}
