//! Domain layer for the storefront transaction engine.
//!
//! This crate provides the core of the checkout-to-payment lifecycle:
//! - Money, currency and weight value types
//! - Discount engine and shipping rate engine
//! - Checkout aggregate with guest/user merge and the checkout service
//! - Order aggregate with its status machine, numbering and order service
//! - Payment transaction ledger
//! - Repository contracts with in-memory implementations

pub mod aggregate;
pub mod checkout;
pub mod config;
pub mod discount;
pub mod error;
pub mod money;
pub mod notification;
pub mod order;
pub mod payment;
pub mod repository;
pub mod shipping;

pub use aggregate::{Aggregate, DomainEvent};
pub use checkout::{Checkout, CheckoutError, CheckoutService, CheckoutStatus, Owner};
pub use config::StoreConfig;
pub use discount::{Discount, DiscountError, Priceable};
pub use error::{DomainError, ErrorKind};
pub use money::{CurrencyCode, Money, MoneyError, Percent, Weight};
pub use notification::{Notifier, NotifyError};
pub use order::{Order, OrderError, OrderEvent, OrderService, OrderStatus};
pub use payment::{LedgerError, PaymentTransaction, TransactionLedger};
pub use repository::{RepositoryError, RepositoryResult};
pub use shipping::{Address, ShippingError, ShippingService};
