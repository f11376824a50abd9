//! Payment gateway trait definitions
//!
//! Services talk to the mobile-money provider only through [`MpesaGateway`], so
//! they can be exercised against a mock provider.

use crate::error::AppResult;
use crate::payments::types::{PushAcceptance, PushRequest, QueryOutcome};
use async_trait::async_trait;

/// Push-payment gateway
#[async_trait]
pub trait MpesaGateway: Send + Sync {
    /// Ask the provider to prompt the customer's phone for a payment
    ///
    /// # Returns
    /// * `PushAcceptance` - provider identifiers plus the customer-facing message.
    ///   A non-zero response code is reported as `ExternalError::GatewayRejected`.
    ///
    /// # Errors
    /// * `GatewayAuth` when no access token could be obtained
    /// * `GatewayTransient` on network failure or timeout
    async fn initiate_push(&self, request: PushRequest) -> AppResult<PushAcceptance>;

    /// Ask the provider for the current outcome of an earlier push
    ///
    /// # Arguments
    /// * `checkout_request_id` - identifier returned by `initiate_push`
    async fn query_status(&self, checkout_request_id: &str) -> AppResult<QueryOutcome>;
}
