//! Built-in provider integrations.

pub mod manual;
pub mod sandbox;

pub use manual::ManualProvider;
pub use sandbox::{SandboxBehavior, SandboxProvider};

use std::sync::Arc;

use crate::provider::PaymentProvider;

pub const SANDBOX: &str = "sandbox";
pub const MANUAL: &str = "manual";

/// Every built-in provider under its key.
pub fn builtin() -> Vec<(String, Arc<dyn PaymentProvider>)> {
    vec![
        (SANDBOX.to_string(), Arc::new(SandboxProvider::new()) as Arc<dyn PaymentProvider>),
        (MANUAL.to_string(), Arc::new(ManualProvider::new()) as Arc<dyn PaymentProvider>),
    ]
}
