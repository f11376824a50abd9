//! Callback reconciliation
//!
//! The provider retries aggressively on anything but a success response, so
//! [`CallbackService::handle`] never fails: every outcome, including internal
//! errors, becomes an acknowledgement.

use crate::error::AppResult;
use crate::payments::store::{FailureStatus, PaymentStore};
use crate::payments::types::{CallbackEnvelope, PaymentDetails, StkCallback};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    Completed,
    Failed,
    /// Attempt was already terminal; nothing changed
    AlreadyProcessed,
    UnknownPayment,
    InvalidPayload,
    /// Reconciliation hit an internal error; acknowledged anyway
    Errored,
}

impl CallbackOutcome {
    pub fn ack_message(&self) -> &'static str {
        match self {
            CallbackOutcome::Completed | CallbackOutcome::Failed => {
                "Callback processed successfully"
            }
            CallbackOutcome::AlreadyProcessed => "Callback already processed",
            CallbackOutcome::UnknownPayment => "Payment not found",
            CallbackOutcome::InvalidPayload => "Invalid callback data",
            CallbackOutcome::Errored => "Callback received",
        }
    }
}

pub struct CallbackService {
    payments: Arc<dyn PaymentStore>,
}

impl CallbackService {
    pub fn new(payments: Arc<dyn PaymentStore>) -> Self {
        Self { payments }
    }

    /// Reconcile a raw callback body
    pub async fn handle(&self, body: &[u8]) -> CallbackOutcome {
        let envelope: CallbackEnvelope = match serde_json::from_slice(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    "Invalid M-Pesa callback payload: {} body={}",
                    e,
                    String::from_utf8_lossy(body)
                );
                return CallbackOutcome::InvalidPayload;
            }
        };

        let callback = envelope.body.stk_callback;
        match self.reconcile(&callback).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "Callback processing error for {}: {}",
                    callback.checkout_request_id, e
                );
                CallbackOutcome::Errored
            }
        }
    }

    async fn reconcile(&self, callback: &StkCallback) -> AppResult<CallbackOutcome> {
        let checkout_request_id = callback.checkout_request_id.as_str();
        info!(
            "M-Pesa callback received: checkout_request_id={} merchant_request_id={} result_code={}",
            checkout_request_id, callback.merchant_request_id, callback.result_code
        );

        let Some(payment) = self
            .payments
            .find_by_checkout_request_id(checkout_request_id)
            .await?
        else {
            error!("Payment not found for callback: {}", checkout_request_id);
            return Ok(CallbackOutcome::UnknownPayment);
        };

        if payment.status.is_terminal() {
            info!(
                "Duplicate callback for {} ignored, payment already {}",
                checkout_request_id, payment.status
            );
            return Ok(CallbackOutcome::AlreadyProcessed);
        }

        if callback.is_success() {
            let details = PaymentDetails::from_items(callback.items());
            if let Some(paid) = details.amount {
                if paid != payment.amount {
                    warn!(
                        "Callback amount {} differs from requested {} for {}",
                        paid, payment.amount, checkout_request_id
                    );
                }
            }

            let updated = self
                .payments
                .mark_completed(
                    checkout_request_id,
                    details.receipt_number.as_deref(),
                    Utc::now(),
                )
                .await?;

            return Ok(match updated {
                Some(_) => {
                    info!(
                        "Payment completed: checkout_request_id={} receipt={:?} amount={:?} phone={:?} date={:?}",
                        checkout_request_id,
                        details.receipt_number,
                        details.amount,
                        details.phone_number,
                        details.transaction_date
                    );
                    CallbackOutcome::Completed
                }
                None => CallbackOutcome::AlreadyProcessed,
            });
        }

        let updated = self
            .payments
            .mark_unsuccessful(checkout_request_id, FailureStatus::Failed, &callback.result_desc)
            .await?;

        Ok(match updated {
            Some(_) => {
                info!(
                    "Payment failed: checkout_request_id={} result_code={} reason={}",
                    checkout_request_id, callback.result_code, callback.result_desc
                );
                CallbackOutcome::Failed
            }
            None => CallbackOutcome::AlreadyProcessed,
        })
    }
}
