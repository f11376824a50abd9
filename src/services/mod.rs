//! Payment use cases
//!
//! Each service is constructed from trait objects for the gateway and the
//! stores, so the same code runs against Postgres in production and the
//! in-memory store in tests.

pub mod callback;
pub mod initiation;
pub mod queries;
pub mod verification;

#[cfg(test)]
pub(crate) mod testing;

pub use callback::{CallbackOutcome, CallbackService};
pub use initiation::{InitiatePaymentRequest, InitiatedPayment, InitiationService};
pub use queries::{HistoryQuery, PaymentHistory, PaymentQueries, PaymentView};
pub use verification::{VerificationResult, VerificationService};

use crate::payments::store::{OrderStore, PaymentStore};
use crate::payments::traits::MpesaGateway;
use std::sync::Arc;

/// All payment services wired to one gateway and one pair of stores
#[derive(Clone)]
pub struct PaymentServices {
    pub initiation: Arc<InitiationService>,
    pub callback: Arc<CallbackService>,
    pub verification: Arc<VerificationService>,
    pub queries: Arc<PaymentQueries>,
    pub payments: Arc<dyn PaymentStore>,
}

impl PaymentServices {
    pub fn new(
        gateway: Arc<dyn MpesaGateway>,
        payments: Arc<dyn PaymentStore>,
        orders: Arc<dyn OrderStore>,
    ) -> Self {
        Self {
            initiation: Arc::new(InitiationService::new(
                gateway.clone(),
                payments.clone(),
                orders.clone(),
            )),
            callback: Arc::new(CallbackService::new(payments.clone())),
            verification: Arc::new(VerificationService::new(gateway, payments.clone())),
            queries: Arc::new(PaymentQueries::new(payments.clone(), orders)),
            payments,
        }
    }
}
