//! Payment initiation
//!
//! Validates the request, asks the provider to prompt the customer's phone and
//! persists the `PENDING` anchor record the callback and status poll reconcile
//! against. Nothing is persisted unless the provider accepts the push.

use crate::error::{AppError, AppResult};
use crate::payments::phone::{is_valid_mobile_number, normalize_phone_number};
use crate::payments::store::{OrderStore, PaymentStore};
use crate::payments::traits::MpesaGateway;
use crate::payments::types::{NewPaymentAttempt, PushRequest};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Largest single STK push the provider accepts, in KSh
const MAX_AMOUNT: Decimal = Decimal::from_parts(250_000, 0, 0, false, 0);

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatedPayment {
    pub payment_id: i64,
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    /// Provider's customer-facing prompt, e.g. "Success. Request accepted for processing"
    pub message: String,
}

pub struct InitiationService {
    gateway: Arc<dyn MpesaGateway>,
    payments: Arc<dyn PaymentStore>,
    orders: Arc<dyn OrderStore>,
}

impl InitiationService {
    pub fn new(
        gateway: Arc<dyn MpesaGateway>,
        payments: Arc<dyn PaymentStore>,
        orders: Arc<dyn OrderStore>,
    ) -> Self {
        Self {
            gateway,
            payments,
            orders,
        }
    }

    pub async fn initiate(
        &self,
        user_id: i64,
        request: InitiatePaymentRequest,
    ) -> AppResult<InitiatedPayment> {
        let phone_input = request
            .phone_number
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        let (amount, phone_input) = match (request.amount, phone_input) {
            (Some(amount), Some(phone)) => (amount, phone),
            _ => return Err(AppError::validation("Amount and phone number are required")),
        };

        if amount < Decimal::ONE {
            return Err(AppError::validation("Amount must be at least KSh 1"));
        }

        if amount.normalize().scale() > 2 {
            return Err(AppError::validation(
                "Amount can have at most 2 decimal places",
            ));
        }

        if amount > MAX_AMOUNT {
            return Err(AppError::validation("Amount must not exceed KSh 250,000"));
        }

        let phone_number = normalize_phone_number(phone_input);
        if !is_valid_mobile_number(&phone_number) {
            return Err(AppError::validation("Invalid Kenyan phone number"));
        }

        if let Some(order_id) = request.order_id {
            if self.orders.find_owned(order_id, user_id).await?.is_none() {
                warn!(
                    "User {} tried to pay for order {} they do not own",
                    user_id, order_id
                );
                return Err(AppError::validation(
                    "Invalid order ID or order does not belong to you",
                ));
            }
        }

        let account_reference = match request.order_id {
            Some(order_id) => format!("ORDER-{}", order_id),
            None => format!("PAY-{}", Utc::now().timestamp_millis()),
        };
        let description = request
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| match request.order_id {
                Some(order_id) => format!("Payment for Order #{}", order_id),
                None => "Payment".to_string(),
            });

        let acceptance = self
            .gateway
            .initiate_push(PushRequest {
                amount,
                phone_number: phone_number.clone(),
                account_reference,
                description,
            })
            .await?;

        let payment = self
            .payments
            .insert_pending(NewPaymentAttempt {
                user_id,
                order_id: request.order_id,
                checkout_request_id: acceptance.checkout_request_id.clone(),
                merchant_request_id: acceptance.merchant_request_id.clone(),
                amount,
                phone_number,
            })
            .await
            .map_err(|e| {
                error!(
                    "Push {} accepted by provider but not recorded: {}",
                    acceptance.checkout_request_id, e
                );
                e
            })?;

        info!(
            "Payment {} pending: user={} checkout_request_id={} amount={}",
            payment.id, user_id, payment.checkout_request_id, payment.amount
        );

        Ok(InitiatedPayment {
            payment_id: payment.id,
            checkout_request_id: acceptance.checkout_request_id,
            merchant_request_id: acceptance.merchant_request_id,
            message: acceptance.customer_message,
        })
    }
}
