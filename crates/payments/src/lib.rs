//! Payments for the storefront engine.
//!
//! - [`PaymentGateway`] routes calls to the [`PaymentProvider`] registered
//!   under a key, with a per-call timeout.
//! - [`PaymentCoordinator`] runs authorize, capture, refund, cancel,
//!   confirmation and reconciliation against an order, keeping the
//!   transaction ledger and the order status in step.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod provider;
pub mod providers;

pub use config::GatewayConfig;
pub use coordinator::{PaymentCoordinator, PaymentReceipt, ReconcileReport};
pub use error::{GatewayError, PaymentError, ProviderError, Result};
pub use gateway::PaymentGateway;
pub use provider::{PaymentOutcome, PaymentProvider, PaymentRequest, ProviderResponse};
pub use providers::{ManualProvider, SandboxBehavior, SandboxProvider};
