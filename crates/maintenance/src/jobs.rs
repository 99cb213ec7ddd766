//! Periodic jobs that keep checkouts and orders consistent.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::DomainError;
use domain::checkout::{CheckoutSweeper, SweepReport};
use domain::order::{OrderService, RepairReport};
use tokio::time::MissedTickBehavior;

/// Result of one pass over every job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub sweep: SweepReport,
    pub repair: RepairReport,
}

/// The checkout expiry sweep and the provisional order-number repair.
#[derive(Clone)]
pub struct MaintenanceJobs {
    sweeper: CheckoutSweeper,
    orders: OrderService,
    repair_batch: usize,
}

impl MaintenanceJobs {
    pub fn new(sweeper: CheckoutSweeper, orders: OrderService, repair_batch: usize) -> Self {
        Self {
            sweeper,
            orders,
            repair_batch: repair_batch.max(1),
        }
    }

    /// Runs both jobs once. The repair still runs when the sweep fails; the
    /// first error is returned after both have had their turn.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<RunReport, DomainError> {
        let sweep = self.sweeper.expire_stale(now).await;
        let repair = self.orders.repair_provisional_numbers(self.repair_batch).await;

        let report = RunReport {
            sweep: sweep?,
            repair: repair?,
        };
        if report.repair.failed > 0 {
            tracing::warn!(failed = report.repair.failed, "Some order numbers could not be repaired");
        }
        Ok(report)
    }

    /// Runs the jobs every `period` until `shutdown` resolves. A failed run is
    /// logged and retried on the next tick.
    pub async fn run_until<S>(&self, period: Duration, shutdown: S) -> usize
    where
        S: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut runs = 0;
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    runs += 1;
                    match self.run_once(Utc::now()).await {
                        Ok(report) => tracing::debug!(
                            expired = report.sweep.expired,
                            repaired = report.repair.repaired,
                            "Maintenance run finished"
                        ),
                        Err(error) => tracing::error!(%error, kind = error.kind().as_str(), "Maintenance run failed"),
                    }
                }
            }
        }
        tracing::info!(runs, "Maintenance loop stopped");
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;
    use common::{ProductId, SessionId, UserId};
    use domain::checkout::{Checkout, CheckoutRepository, CheckoutStatus, InMemoryCheckoutRepository, Owner};
    use domain::discount::{InMemoryCatalog, InMemoryDiscountRepository};
    use domain::notification::NoopNotifier;
    use domain::order::{InMemoryOrderRepository, NewOrder, Order, OrderItem, OrderOwner, OrderRepository, OrderTotals};
    use domain::{Address, Aggregate, CurrencyCode, Money, Weight};

    struct Fixture {
        jobs: MaintenanceJobs,
        checkouts: InMemoryCheckoutRepository,
        orders: InMemoryOrderRepository,
    }

    fn fixture() -> Fixture {
        let checkouts = InMemoryCheckoutRepository::new();
        let orders = InMemoryOrderRepository::new();
        let service = OrderService::new(
            Arc::new(orders.clone()),
            Arc::new(InMemoryDiscountRepository::new()),
            Arc::new(InMemoryCatalog::new()),
            Arc::new(NoopNotifier),
        );
        let jobs = MaintenanceJobs::new(CheckoutSweeper::new(Arc::new(checkouts.clone())), service, 10);
        Fixture {
            jobs,
            checkouts,
            orders,
        }
    }

    fn order() -> Order {
        let unit_price = Money::from_minor(1500);
        Order::place(
            NewOrder {
                owner: OrderOwner::Registered(UserId::new(7)),
                checkout_id: None,
                items: vec![OrderItem {
                    product_id: ProductId::new(3),
                    variant_id: None,
                    product_name: "Kettle".to_string(),
                    variant_name: None,
                    sku: "KTL".to_string(),
                    quantity: 1,
                    unit_price,
                    subtotal: unit_price,
                    weight: Weight::from_grams(1200),
                }],
                currency: CurrencyCode::default(),
                shipping_address: Address::new("9 Elm St", "Denver", "CO", "80202", "US"),
                billing_address: None,
                shipping_method: None,
                totals: OrderTotals {
                    total_amount: unit_price,
                    shipping_cost: Money::zero(),
                    discount_amount: Money::zero(),
                    final_amount: unit_price,
                    total_weight: Weight::from_grams(1200),
                },
                discount: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_once_sweeps_and_repairs() {
        let f = fixture();
        let now = Utc::now();
        let stale = Checkout::new(
            Owner::Guest(SessionId::new("gone")),
            CurrencyCode::default(),
            ChronoDuration::hours(1),
            now - ChronoDuration::hours(2),
        )
        .unwrap();
        let stale = f.checkouts.insert(stale).await.unwrap();
        let unnumbered = f.orders.insert_unnumbered(order()).await.unwrap();

        let report = f.jobs.run_once(now).await.unwrap();
        assert_eq!(report.sweep.expired, 1);
        assert_eq!(report.repair, RepairReport { repaired: 1, failed: 0 });

        let swept = f.checkouts.get(stale.id().unwrap()).await.unwrap().unwrap();
        assert_eq!(swept.status(), CheckoutStatus::Expired);
        assert!(f.orders.find_provisional(10).await.unwrap().is_empty());
        let repaired = f.orders.get(unnumbered.id().unwrap()).await.unwrap().unwrap();
        assert!(!repaired.number().is_provisional());
        assert!(repaired.number().as_str().starts_with("ORD-"));
    }

    #[tokio::test]
    async fn test_run_once_with_nothing_to_do() {
        let f = fixture();
        let report = f.jobs.run_once(Utc::now()).await.unwrap();
        assert_eq!(report, RunReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_stops_on_shutdown() {
        let f = fixture();
        let shutdown = tokio::time::sleep(Duration::from_secs(25));

        // Ticks at 0s, 10s and 20s before the 25s shutdown.
        let runs = f.jobs.run_until(Duration::from_secs(10), shutdown).await;
        assert_eq!(runs, 3);
    }
}
