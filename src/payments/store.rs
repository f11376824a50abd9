//! Storage ports for payment attempts and the orders they pay for
//!
//! Every terminal transition is conditional on the attempt still being
//! `PENDING`. The callback and a concurrent status poll may race to reconcile
//! the same attempt; whichever commits first wins and the other receives `None`.

use crate::error::AppResult;
use crate::payments::types::{NewPaymentAttempt, Order, PaymentAttempt, PaymentStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Terminal states other than success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStatus {
    Failed,
    Cancelled,
}

impl FailureStatus {
    pub fn status(&self) -> PaymentStatus {
        match self {
            FailureStatus::Failed => PaymentStatus::Failed,
            FailureStatus::Cancelled => PaymentStatus::Cancelled,
        }
    }
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Persist a freshly accepted push in `PENDING`
    async fn insert_pending(&self, attempt: NewPaymentAttempt) -> AppResult<PaymentAttempt>;

    async fn find_by_checkout_request_id(
        &self,
        checkout_request_id: &str,
    ) -> AppResult<Option<PaymentAttempt>>;

    async fn find_by_id(&self, id: i64) -> AppResult<Option<PaymentAttempt>>;

    /// Newest first
    async fn list_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<PaymentAttempt>>;

    async fn count_by_user(&self, user_id: i64) -> AppResult<i64>;

    /// `PENDING` → `COMPLETED`, stamping the receipt and completion time. The
    /// linked order, if still `PENDING`, moves to `PROCESSING` in the same unit
    /// of work.
    ///
    /// Returns `None` when the attempt is unknown or already terminal.
    async fn mark_completed(
        &self,
        checkout_request_id: &str,
        receipt_number: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> AppResult<Option<PaymentAttempt>>;

    /// `PENDING` → `FAILED` / `CANCELLED` with the provider's description.
    ///
    /// Returns `None` when the attempt is unknown or already terminal.
    async fn mark_unsuccessful(
        &self,
        checkout_request_id: &str,
        status: FailureStatus,
        reason: &str,
    ) -> AppResult<Option<PaymentAttempt>>;

    /// Round-trip to the backing storage
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_id(&self, order_id: i64) -> AppResult<Option<Order>>;

    /// The order, only if `user_id` placed it
    async fn find_owned(&self, order_id: i64, user_id: i64) -> AppResult<Option<Order>> {
        Ok(self
            .find_by_id(order_id)
            .await?
            .filter(|order| order.user_id == user_id))
    }
}
