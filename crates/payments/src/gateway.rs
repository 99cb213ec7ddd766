//! Routes payment calls to the provider registered under a key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use domain::Money;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, ProviderError};
use crate::provider::{PaymentProvider, PaymentRequest, ProviderResponse};

/// Keyed table of payment providers.
///
/// Lookup is exact: an unknown or disabled key fails with
/// [`GatewayError::ProviderUnavailable`] and no other provider is tried.
/// Every call is bounded by the configured timeout; a call that runs out of
/// time is reported as [`ProviderError::Unreachable`].
#[derive(Clone)]
pub struct PaymentGateway {
    providers: HashMap<String, Arc<dyn PaymentProvider>>,
    timeout: Duration,
}

impl PaymentGateway {
    pub fn new(timeout: Duration) -> Self {
        Self {
            providers: HashMap::new(),
            timeout,
        }
    }

    /// Builds a gateway holding only the providers the configuration enables.
    pub fn from_config<I>(config: &GatewayConfig, available: I) -> Self
    where
        I: IntoIterator<Item = (String, Arc<dyn PaymentProvider>)>,
    {
        let mut gateway = Self::new(config.timeout);
        for (key, provider) in available {
            if config.is_enabled(&key) {
                gateway.providers.insert(key, provider);
            } else {
                tracing::info!(provider = %key, "Payment provider disabled");
            }
        }
        gateway
    }

    pub fn with_provider(mut self, key: impl Into<String>, provider: Arc<dyn PaymentProvider>) -> Self {
        self.providers.insert(key.into(), provider);
        self
    }

    pub fn has_provider(&self, key: &str) -> bool {
        self.providers.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn provider_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    fn resolve(&self, key: &str) -> Result<Arc<dyn PaymentProvider>, GatewayError> {
        self.providers
            .get(key)
            .cloned()
            .ok_or_else(|| GatewayError::ProviderUnavailable {
                provider: key.to_string(),
            })
    }

    async fn call<F, Fut>(
        &self,
        key: &str,
        operation: &'static str,
        f: F,
    ) -> Result<ProviderResponse, GatewayError>
    where
        F: FnOnce(Arc<dyn PaymentProvider>) -> Fut,
        Fut: Future<Output = Result<ProviderResponse, ProviderError>>,
    {
        let provider = self.resolve(key)?;
        let started = Instant::now();

        let result = match tokio::time::timeout(self.timeout, f(provider)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::unreachable(format!(
                "no answer within {}s",
                self.timeout.as_secs_f64()
            ))),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.label(),
        };
        metrics::counter!(
            "payment_provider_calls_total",
            "provider" => key.to_string(),
            "operation" => operation,
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!(
            "payment_provider_latency_seconds",
            "provider" => key.to_string(),
            "operation" => operation
        )
        .record(started.elapsed().as_secs_f64());

        match result {
            Ok(mut response) => {
                response.provider = key.to_string();
                Ok(response)
            }
            Err(source) => {
                tracing::warn!(provider = %key, operation, error = %source, "Payment provider call failed");
                Err(GatewayError::Provider {
                    provider: key.to_string(),
                    source,
                })
            }
        }
    }

    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn process_payment(
        &self,
        key: &str,
        request: &PaymentRequest,
    ) -> Result<ProviderResponse, GatewayError> {
        let request = request.clone();
        self.call(key, "process_payment", move |p| async move {
            p.process_payment(&request).await
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn verify_payment(
        &self,
        key: &str,
        transaction_id: &str,
    ) -> Result<ProviderResponse, GatewayError> {
        let transaction_id = transaction_id.to_string();
        self.call(key, "verify_payment", move |p| async move {
            p.verify_payment(&transaction_id).await
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn capture_payment(
        &self,
        key: &str,
        transaction_id: &str,
        amount: Money,
    ) -> Result<ProviderResponse, GatewayError> {
        let transaction_id = transaction_id.to_string();
        self.call(key, "capture_payment", move |p| async move {
            p.capture_payment(&transaction_id, amount).await
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn refund_payment(
        &self,
        key: &str,
        transaction_id: &str,
        amount: Money,
    ) -> Result<ProviderResponse, GatewayError> {
        let transaction_id = transaction_id.to_string();
        self.call(key, "refund_payment", move |p| async move {
            p.refund_payment(&transaction_id, amount).await
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel_payment(
        &self,
        key: &str,
        transaction_id: &str,
    ) -> Result<ProviderResponse, GatewayError> {
        let transaction_id = transaction_id.to_string();
        self.call(key, "cancel_payment", move |p| async move {
            p.cancel_payment(&transaction_id).await
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn force_approve(
        &self,
        key: &str,
        transaction_id: &str,
    ) -> Result<ProviderResponse, GatewayError> {
        let transaction_id = transaction_id.to_string();
        self.call(key, "force_approve", move |p| async move {
            p.force_approve(&transaction_id).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::PaymentOutcome;
    use crate::providers::{ManualProvider, SandboxBehavior, SandboxProvider};
    use common::OrderId;
    use domain::CurrencyCode;

    fn request() -> PaymentRequest {
        PaymentRequest {
            order_id: OrderId::new(1),
            order_number: "GS-20250101-000001".to_string(),
            amount: Money::from_minor(2600),
            currency: CurrencyCode::default(),
            return_url: None,
        }
    }

    #[tokio::test]
    async fn test_routes_by_key_and_stamps_provider() {
        let gateway = PaymentGateway::new(Duration::from_secs(5))
            .with_provider("sandbox", Arc::new(SandboxProvider::new()))
            .with_provider("manual", Arc::new(ManualProvider::new()));

        let card = gateway.process_payment("sandbox", &request()).await.unwrap();
        assert_eq!(card.provider, "sandbox");
        assert_eq!(card.outcome, PaymentOutcome::Approved);

        let transfer = gateway.process_payment("manual", &request()).await.unwrap();
        assert_eq!(transfer.provider, "manual");
        assert_eq!(transfer.outcome, PaymentOutcome::Pending);
    }

    #[tokio::test]
    async fn test_unknown_key_never_falls_back() {
        let gateway = PaymentGateway::new(Duration::from_secs(5))
            .with_provider("sandbox", Arc::new(SandboxProvider::new()));

        let err = gateway.process_payment("stripe", &request()).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::ProviderUnavailable {
                provider: "stripe".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_disabled_provider_is_unavailable() {
        let config = GatewayConfig {
            enabled_providers: vec!["sandbox".to_string()],
            timeout: Duration::from_secs(5),
        };
        let available: Vec<(String, Arc<dyn PaymentProvider>)> = vec![
            ("sandbox".to_string(), Arc::new(SandboxProvider::new()) as Arc<dyn PaymentProvider>),
            ("manual".to_string(), Arc::new(ManualProvider::new()) as Arc<dyn PaymentProvider>),
        ];
        let gateway = PaymentGateway::from_config(&config, available);

        assert_eq!(gateway.provider_keys(), vec!["sandbox"]);
        let err = gateway.process_payment("manual", &request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::ProviderUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_unreachable() {
        let sandbox = SandboxProvider::new();
        sandbox.script([SandboxBehavior::Stall]).await;
        let gateway = PaymentGateway::new(Duration::from_secs(30))
            .with_provider("sandbox", Arc::new(sandbox));

        let err = gateway.process_payment("sandbox", &request()).await.unwrap_err();
        assert!(err.is_unreachable());
    }

    #[tokio::test]
    async fn test_rejection_is_typed() {
        let sandbox = SandboxProvider::new();
        sandbox.script([SandboxBehavior::Decline]).await;
        let gateway = PaymentGateway::new(Duration::from_secs(5))
            .with_provider("sandbox", Arc::new(sandbox));

        let err = gateway.process_payment("sandbox", &request()).await.unwrap_err();
        assert!(err.is_rejected());
    }
}
