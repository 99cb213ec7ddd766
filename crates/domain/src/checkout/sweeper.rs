//! Out-of-band expiry of abandoned checkout sessions.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::CheckoutRepository;
use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::repository::RepositoryError;

const DEFAULT_BATCH_SIZE: usize = 500;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Checkouts moved to `Expired`.
    pub expired: usize,
    /// Checkouts skipped because a concurrent writer saved them first.
    pub conflicts: usize,
}

/// Marks active checkouts past their expiry as `Expired`.
///
/// Runs on a schedule next to normal traffic. Each checkout is saved with the
/// usual version check, so a sweep that loses a race against a shopper skips
/// that row; the next sweep picks it up again if it is still stale.
#[derive(Clone)]
pub struct CheckoutSweeper {
    checkouts: Arc<dyn CheckoutRepository>,
    batch_size: usize,
}

impl CheckoutSweeper {
    pub fn new(checkouts: Arc<dyn CheckoutRepository>) -> Self {
        Self {
            checkouts,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[tracing::instrument(skip(self))]
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<SweepReport, DomainError> {
        let mut report = SweepReport::default();

        loop {
            let batch = self
                .checkouts
                .find_expired_active(now, self.batch_size)
                .await?;
            let fetched = batch.len();
            let mut progressed = 0;

            for mut checkout in batch {
                checkout.mark_expired(now)?;
                match self.checkouts.save(&checkout).await {
                    Ok(_) => {
                        progressed += 1;
                        report.expired += 1;
                    }
                    Err(RepositoryError::ConcurrencyConflict { .. }) => {
                        report.conflicts += 1;
                        tracing::debug!(checkout_id = ?checkout.id(), "Checkout changed during sweep, skipping");
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            // A short batch is the last one; a batch of only conflicts would be refetched forever.
            if fetched < self.batch_size || progressed == 0 {
                break;
            }
        }

        if report.expired > 0 {
            metrics::counter!("checkouts_expired_total").increment(report.expired as u64);
            tracing::info!(expired = report.expired, conflicts = report.conflicts, "Expired stale checkouts");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::{Checkout, CheckoutStatus, InMemoryCheckoutRepository, Owner};
    use crate::money::CurrencyCode;
    use chrono::Duration;
    use common::{SessionId, UserId};

    async fn insert(repo: &InMemoryCheckoutRepository, owner: Owner, created: DateTime<Utc>) -> Checkout {
        let checkout = Checkout::new(owner, CurrencyCode::default(), Duration::hours(1), created).unwrap();
        repo.insert(checkout).await.unwrap()
    }

    #[tokio::test]
    async fn test_expires_only_stale_active_checkouts() {
        let repo = InMemoryCheckoutRepository::new();
        let now = Utc::now();
        let stale = insert(&repo, Owner::Guest(SessionId::new("old")), now - Duration::hours(3)).await;
        let fresh = insert(&repo, Owner::Guest(SessionId::new("new")), now).await;

        let mut abandoned = insert(&repo, Owner::Registered(UserId::new(1)), now - Duration::hours(5)).await;
        abandoned.mark_abandoned(now - Duration::hours(4)).unwrap();
        repo.save(&abandoned).await.unwrap();

        let sweeper = CheckoutSweeper::new(Arc::new(repo.clone()));
        let report = sweeper.expire_stale(now).await.unwrap();
        assert_eq!(report, SweepReport { expired: 1, conflicts: 0 });

        let get = |id| {
            let repo = repo.clone();
            async move { repo.get(id).await.unwrap().unwrap().status() }
        };
        assert_eq!(get(stale.id().unwrap()).await, CheckoutStatus::Expired);
        assert_eq!(get(fresh.id().unwrap()).await, CheckoutStatus::Active);
        assert_eq!(get(abandoned.id().unwrap()).await, CheckoutStatus::Abandoned);

        // Running again finds nothing left to do.
        let again = sweeper.expire_stale(now).await.unwrap();
        assert_eq!(again, SweepReport::default());
    }

    #[tokio::test]
    async fn test_sweeps_in_batches() {
        let repo = InMemoryCheckoutRepository::new();
        let now = Utc::now();
        for i in 0..5 {
            insert(
                &repo,
                Owner::Guest(SessionId::new(format!("sess-{i}"))),
                now - Duration::hours(2),
            )
            .await;
        }

        let sweeper = CheckoutSweeper::new(Arc::new(repo.clone())).with_batch_size(2);
        let report = sweeper.expire_stale(now).await.unwrap();
        assert_eq!(report.expired, 5);
    }

    #[tokio::test]
    async fn test_late_mutation_and_sweep_agree() {
        let repo = InMemoryCheckoutRepository::new();
        let now = Utc::now();
        let stale = insert(&repo, Owner::Guest(SessionId::new("late")), now - Duration::hours(2)).await;

        let mut late = stale.clone();
        let err = late.clear(now).unwrap_err();
        assert!(matches!(err, crate::checkout::CheckoutError::Expired { .. }));

        let report = CheckoutSweeper::new(Arc::new(repo.clone()))
            .expire_stale(now)
            .await
            .unwrap();
        assert_eq!(report.expired, 1);
    }
}
