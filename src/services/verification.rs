//! Status verification
//!
//! Pull-side reconciliation for when the callback is late or lost. A terminal
//! record is answered from storage; a pending one is checked with the
//! provider and updated through the same conditional transitions the callback
//! uses.

use crate::error::{AppError, AppResult};
use crate::payments::store::{FailureStatus, PaymentStore};
use crate::payments::traits::MpesaGateway;
use crate::payments::types::{PaymentAttempt, PaymentStatus, QueryOutcome};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const MSG_COMPLETED: &str = "Payment completed successfully";
const MSG_FAILED: &str = "Payment failed";
const MSG_CANCELLED: &str = "Payment cancelled by user";
const MSG_PENDING: &str = "Payment still pending";
const MSG_CHECK_IN_PROGRESS: &str = "Payment status check in progress";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub id: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub phone_number: String,
    pub mpesa_receipt_number: Option<String>,
    pub status: PaymentStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&PaymentAttempt> for PaymentSummary {
    fn from(payment: &PaymentAttempt) -> Self {
        Self {
            id: payment.id,
            amount: payment.amount,
            phone_number: payment.phone_number.clone(),
            mpesa_receipt_number: payment.mpesa_receipt_number.clone(),
            status: payment.status,
            completed_at: payment.completed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub status: PaymentStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl VerificationResult {
    fn from_record(payment: &PaymentAttempt) -> Self {
        let (message, payment_summary, failure_reason) = match payment.status {
            PaymentStatus::Completed => (MSG_COMPLETED, Some(PaymentSummary::from(payment)), None),
            PaymentStatus::Failed => (MSG_FAILED, None, payment.failure_reason.clone()),
            PaymentStatus::Cancelled => (MSG_CANCELLED, None, payment.failure_reason.clone()),
            PaymentStatus::Pending => (MSG_PENDING, None, None),
        };

        Self {
            status: payment.status,
            message: message.to_string(),
            payment: payment_summary,
            failure_reason,
        }
    }

    fn pending(message: &str) -> Self {
        Self {
            status: PaymentStatus::Pending,
            message: message.to_string(),
            payment: None,
            failure_reason: None,
        }
    }
}

pub struct VerificationService {
    gateway: Arc<dyn MpesaGateway>,
    payments: Arc<dyn PaymentStore>,
}

impl VerificationService {
    pub fn new(gateway: Arc<dyn MpesaGateway>, payments: Arc<dyn PaymentStore>) -> Self {
        Self { gateway, payments }
    }

    pub async fn verify(
        &self,
        user_id: i64,
        checkout_request_id: &str,
    ) -> AppResult<VerificationResult> {
        let payment = self
            .payments
            .find_by_checkout_request_id(checkout_request_id)
            .await?
            .ok_or_else(|| AppError::not_found("Payment", checkout_request_id))?;

        if payment.user_id != user_id {
            warn!(
                "User {} tried to verify payment {} owned by user {}",
                user_id, payment.id, payment.user_id
            );
            return Err(AppError::forbidden("Payment does not belong to you"));
        }

        if payment.status.is_terminal() {
            debug!(
                "Payment {} already {}, answering from storage",
                checkout_request_id, payment.status
            );
            return Ok(VerificationResult::from_record(&payment));
        }

        let outcome = match self.gateway.query_status(checkout_request_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "Status query for {} failed, reporting pending: {}",
                    checkout_request_id, e
                );
                return Ok(VerificationResult::pending(MSG_CHECK_IN_PROGRESS));
            }
        };

        let updated = match outcome {
            QueryOutcome::Pending { description } => {
                debug!("Payment {} still pending: {}", checkout_request_id, description);
                return Ok(VerificationResult::pending(MSG_PENDING));
            }
            QueryOutcome::Completed { receipt_number, .. } => {
                if receipt_number.is_none() {
                    warn!(
                        "Status query for {} reports success without a receipt number",
                        checkout_request_id
                    );
                }
                self.payments
                    .mark_completed(checkout_request_id, receipt_number.as_deref(), Utc::now())
                    .await?
            }
            QueryOutcome::Cancelled { description } => {
                self.payments
                    .mark_unsuccessful(checkout_request_id, FailureStatus::Cancelled, &description)
                    .await?
            }
            QueryOutcome::Failed {
                result_code,
                description,
            } => {
                info!(
                    "Status query for {} returned failure code {}",
                    checkout_request_id, result_code
                );
                self.payments
                    .mark_unsuccessful(checkout_request_id, FailureStatus::Failed, &description)
                    .await?
            }
        };

        let current = match updated {
            Some(payment) => {
                info!(
                    "Payment {} reconciled by status query: {}",
                    checkout_request_id, payment.status
                );
                payment
            }
            // A callback won the race; report what it stored
            None => self
                .payments
                .find_by_checkout_request_id(checkout_request_id)
                .await?
                .ok_or_else(|| AppError::not_found("Payment", checkout_request_id))?,
        };

        Ok(VerificationResult::from_record(&current))
    }
}
