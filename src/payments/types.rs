//! Payment types and data structures
//!
//! Records kept for every push-payment attempt, the linked order, and the wire
//! shapes exchanged with the mobile-money provider.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provider result code for a successful push
pub const RESULT_SUCCESS: &str = "0";
/// Provider result code when the customer dismissed the prompt
pub const RESULT_CANCELLED_BY_USER: &str = "1032";
/// Provider result code while the customer has not answered yet
pub const RESULT_STILL_PROCESSING: &str = "1037";

/// Lifecycle of a payment attempt. Every state except `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            "CANCELLED" => Ok(PaymentStatus::Cancelled),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

/// One row per push-payment request, keyed by the provider's checkout id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAttempt {
    pub id: i64,
    pub user_id: i64,
    pub order_id: Option<i64>,
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub phone_number: String,
    pub status: PaymentStatus,
    pub mpesa_receipt_number: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields needed to persist a freshly accepted push
#[derive(Debug, Clone, PartialEq)]
pub struct NewPaymentAttempt {
    pub user_id: i64,
    pub order_id: Option<i64>,
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub amount: Decimal,
    pub phone_number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

/// The slice of an order the payment flow reads and advances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub status: OrderStatus,
}

/// Push-payment request handed to the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct PushRequest {
    pub amount: Decimal,
    /// Already normalized to international form
    pub phone_number: String,
    pub account_reference: String,
    pub description: String,
}

/// Provider's answer to an accepted (or rejected) push
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushAcceptance {
    /// Absent on some rejections
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode", deserialize_with = "de_code")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
}

impl PushAcceptance {
    pub fn is_accepted(&self) -> bool {
        self.response_code == RESULT_SUCCESS
    }
}

/// Outcome of a status query, classified from the provider's result code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Completed {
        receipt_number: Option<String>,
        description: String,
    },
    /// Customer has not answered yet; ask again later
    Pending { description: String },
    Cancelled { description: String },
    Failed {
        result_code: String,
        description: String,
    },
}

impl QueryOutcome {
    pub fn classify(result_code: &str, description: String, receipt_number: Option<String>) -> Self {
        match result_code {
            RESULT_SUCCESS => QueryOutcome::Completed {
                receipt_number,
                description,
            },
            RESULT_STILL_PROCESSING => QueryOutcome::Pending { description },
            RESULT_CANCELLED_BY_USER => QueryOutcome::Cancelled { description },
            other => QueryOutcome::Failed {
                result_code: other.to_string(),
                description,
            },
        }
    }
}

/// Inbound notification: `{Body: {stkCallback: {...}}}`
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode", deserialize_with = "de_code")]
    pub result_code: String,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

impl StkCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == RESULT_SUCCESS
    }

    pub fn items(&self) -> &[MetadataItem] {
        self.callback_metadata
            .as_ref()
            .map(|m| m.items.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<serde_json::Value>,
}

/// Typed lookup of a named metadata item. Position in the list is irrelevant.
pub fn metadata_value<T: DeserializeOwned>(items: &[MetadataItem], name: &str) -> Option<T> {
    items
        .iter()
        .find(|item| item.name == name)
        .and_then(|item| item.value.clone())
        .and_then(|value| serde_json::from_value(value).ok())
}

/// Like [`metadata_value`], but renders numbers as text (phone numbers and
/// transaction dates arrive as JSON numbers).
pub fn metadata_text(items: &[MetadataItem], name: &str) -> Option<String> {
    match metadata_value::<serde_json::Value>(items, name)? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Details the provider attaches to a successful callback
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentDetails {
    pub amount: Option<Decimal>,
    pub receipt_number: Option<String>,
    pub transaction_date: Option<String>,
    pub phone_number: Option<String>,
}

impl PaymentDetails {
    pub fn from_items(items: &[MetadataItem]) -> Self {
        Self {
            amount: metadata_value(items, "Amount"),
            receipt_number: metadata_text(items, "MpesaReceiptNumber"),
            transaction_date: metadata_text(items, "TransactionDate"),
            phone_number: metadata_text(items, "PhoneNumber"),
        }
    }
}

/// Result codes arrive as JSON numbers in callbacks and as strings in query
/// and push responses.
pub(crate) fn de_code<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s.trim().to_string()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected result code, got {}",
            other
        ))),
    }
}
