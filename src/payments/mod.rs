//! M-Pesa push-payment integration
//!
//! Domain types, phone normalization, the gateway trait with its Daraja
//! implementation, and the storage ports the services reconcile through.

pub mod in_memory;
pub mod phone;
pub mod providers;
pub mod store;
pub mod traits;
pub mod types;

pub use in_memory::InMemoryPaymentStore;
pub use providers::{MpesaClient, MpesaConfig};
pub use store::{FailureStatus, OrderStore, PaymentStore};
pub use traits::MpesaGateway;
