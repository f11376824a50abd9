//! M-Pesa (Daraja) payment provider implementation
//!
//! This module provides integration with Safaricom's Daraja API for collecting
//! Lipa na M-Pesa Online (STK push) payments in Kenya (KES).

use crate::error::{AppError, AppResult, ExternalError};
use crate::payments::traits::MpesaGateway;
use crate::payments::types::{
    metadata_text, MetadataItem, PushAcceptance, PushRequest, QueryOutcome,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const PROVIDER: &str = "M-Pesa";

pub const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
pub const PRODUCTION_BASE_URL: &str = "https://api.safaricom.co.ke";

const TOKEN_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";
const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
const STK_QUERY_PATH: &str = "/mpesa/stkpushquery/v1/query";

/// Daraja error code for a query made while the customer is still on the prompt
const QUERY_IN_PROGRESS_ERROR: &str = "500.001.1001";

/// Provider timestamps are East Africa Time
const EAT_OFFSET_HOURS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnvironment {
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => SANDBOX_BASE_URL,
            MpesaEnvironment::Production => PRODUCTION_BASE_URL,
        }
    }
}

impl FromStr for MpesaEnvironment {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sandbox" => Ok(MpesaEnvironment::Sandbox),
            "production" => Ok(MpesaEnvironment::Production),
            other => Err(AppError::configuration(format!(
                "MPESA_ENVIRONMENT must be 'sandbox' or 'production', got {}",
                other
            ))),
        }
    }
}

/// M-Pesa provider configuration
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Lipa na M-Pesa Online passkey used to derive the request password
    pub passkey: String,
    /// Paybill / till number receiving the payment
    pub shortcode: String,
    /// Public URL the provider posts the outcome to
    pub callback_url: String,
    pub environment: MpesaEnvironment,
    /// API base URL; defaults to the environment's URL
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for MpesaConfig {
    fn default() -> Self {
        Self {
            consumer_key: String::new(),
            consumer_secret: String::new(),
            passkey: String::new(),
            shortcode: String::new(),
            callback_url: String::new(),
            environment: MpesaEnvironment::Sandbox,
            base_url: SANDBOX_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl MpesaConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        let required = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| {
                    AppError::configuration(format!(
                        "{} environment variable is required",
                        name
                    ))
                })
        };

        let consumer_key = required("MPESA_CONSUMER_KEY")?;
        let consumer_secret = required("MPESA_CONSUMER_SECRET")?;
        let passkey = required("MPESA_PASSKEY")?;
        let shortcode = required("MPESA_SHORTCODE")?;
        let callback_url = required("MPESA_CALLBACK_URL")?;

        let environment: MpesaEnvironment = std::env::var("MPESA_ENVIRONMENT")
            .unwrap_or_else(|_| "sandbox".to_string())
            .parse()?;

        let base_url = std::env::var("MPESA_BASE_URL")
            .unwrap_or_else(|_| environment.base_url().to_string());

        let timeout_secs = std::env::var("MPESA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        Ok(Self {
            consumer_key,
            consumer_secret,
            passkey,
            shortcode,
            callback_url,
            environment,
            base_url,
            timeout_secs,
        })
    }
}

/// 14-digit `YYYYMMDDHHmmss` timestamp in provider local time
pub fn timestamp_at(now: DateTime<Utc>) -> String {
    let local = now.naive_utc() + chrono::Duration::hours(EAT_OFFSET_HOURS);
    local.format("%Y%m%d%H%M%S").to_string()
}

/// base64(shortcode + passkey + timestamp)
pub fn generate_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

/// The provider only takes whole currency units; fractions round up
pub fn provider_amount(amount: Decimal) -> Option<u64> {
    amount.ceil().to_u64()
}

/// M-Pesa STK push client
pub struct MpesaClient {
    config: MpesaConfig,
    client: Client,
}

impl MpesaClient {
    /// Create a new M-Pesa client instance
    pub fn new(config: MpesaConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &MpesaConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn transient(message: impl Into<String>) -> AppError {
        AppError::external(ExternalError::GatewayTransient {
            provider: PROVIDER.to_string(),
            message: message.into(),
        })
    }

    fn rejected(message: impl Into<String>) -> AppError {
        AppError::external(ExternalError::GatewayRejected {
            provider: PROVIDER.to_string(),
            message: message.into(),
        })
    }

    fn auth_failed(message: impl Into<String>) -> AppError {
        AppError::external(ExternalError::GatewayAuth {
            provider: PROVIDER.to_string(),
            message: message.into(),
        })
    }

    /// Exchange the consumer key and secret for a bearer token.
    ///
    /// Tokens are fetched per operation and never cached.
    pub async fn acquire_access_token(&self) -> AppResult<String> {
        let credentials = STANDARD.encode(format!(
            "{}:{}",
            self.config.consumer_key, self.config.consumer_secret
        ));

        let response = self
            .client
            .get(self.url(TOKEN_PATH))
            .header(header::AUTHORIZATION, format!("Basic {}", credentials))
            .send()
            .await
            .map_err(|e| {
                error!("M-Pesa token request failed: {}", e);
                Self::auth_failed(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("M-Pesa token request rejected: HTTP {} {}", status, body);
            return Err(Self::auth_failed(format!("HTTP {}", status)));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            error!("Failed to parse M-Pesa token response: {}", e);
            Self::auth_failed(format!("Invalid token response: {}", e))
        })?;

        debug!("M-Pesa access token obtained, expires_in={}", token.expires_in);
        Ok(token.access_token)
    }

    /// Timestamp and password for a signed request made right now
    fn sign(&self) -> (String, String) {
        let timestamp = timestamp_at(Utc::now());
        let password = generate_password(&self.config.shortcode, &self.config.passkey, &timestamp);
        (timestamp, password)
    }

    async fn post_signed<B: Serialize>(
        &self,
        path: &str,
        token: &str,
        body: &B,
    ) -> AppResult<(StatusCode, String)> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!("M-Pesa request to {} timed out", path);
                } else {
                    error!("M-Pesa request to {} failed: {}", path, e);
                }
                Self::transient(e.to_string())
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Self::transient(format!("Failed to read response: {}", e)))?;
        Ok((status, text))
    }
}

#[async_trait]
impl MpesaGateway for MpesaClient {
    async fn initiate_push(&self, request: PushRequest) -> AppResult<PushAcceptance> {
        let amount = provider_amount(request.amount).ok_or_else(|| {
            AppError::validation(format!("Amount {} cannot be sent to M-Pesa", request.amount))
        })?;

        info!(
            "Initiating M-Pesa STK push: amount={} phone={} reference={}",
            amount, request.phone_number, request.account_reference
        );

        let token = self.acquire_access_token().await?;
        let (timestamp, password) = self.sign();

        let payload = StkPushPayload {
            business_short_code: self.config.shortcode.clone(),
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount,
            party_a: request.phone_number.clone(),
            party_b: self.config.shortcode.clone(),
            phone_number: request.phone_number,
            callback_url: self.config.callback_url.clone(),
            account_reference: request.account_reference,
            transaction_desc: request.description,
        };

        let (status, body) = self.post_signed(STK_PUSH_PATH, &token, &payload).await?;

        if status.is_success() {
            let acceptance: PushAcceptance = serde_json::from_str(&body).map_err(|e| {
                error!("Failed to parse M-Pesa STK push response: {}", e);
                Self::transient(format!("Invalid response format: {}", e))
            })?;

            if !acceptance.is_accepted() {
                warn!(
                    "M-Pesa rejected STK push: code={} description={}",
                    acceptance.response_code, acceptance.response_description
                );
                let message = [&acceptance.customer_message, &acceptance.response_description]
                    .into_iter()
                    .find(|m| !m.is_empty())
                    .cloned()
                    .unwrap_or_else(|| "Failed to initiate payment".to_string());
                return Err(Self::rejected(message));
            }

            if acceptance.checkout_request_id.is_empty()
                || acceptance.merchant_request_id.is_empty()
            {
                error!("M-Pesa accepted STK push without request identifiers: {}", body);
                return Err(Self::transient("Accepted response missing request identifiers"));
            }

            info!(
                "M-Pesa STK push accepted: checkout_request_id={} merchant_request_id={}",
                acceptance.checkout_request_id, acceptance.merchant_request_id
            );
            return Ok(acceptance);
        }

        let error_body = serde_json::from_str::<ProviderErrorBody>(&body).unwrap_or_default();
        error!("M-Pesa STK push error: HTTP {} {}", status, body);

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Self::auth_failed(format!("HTTP {}", status)));
        }
        if status.is_client_error() {
            return Err(Self::rejected(
                error_body
                    .error_message
                    .unwrap_or_else(|| "Failed to initiate STK Push".to_string()),
            ));
        }
        Err(Self::transient(format!("HTTP {}: {}", status, body)))
    }

    async fn query_status(&self, checkout_request_id: &str) -> AppResult<QueryOutcome> {
        info!("Querying M-Pesa STK status: checkout_request_id={}", checkout_request_id);

        let token = self.acquire_access_token().await?;
        let (timestamp, password) = self.sign();

        let payload = StkQueryPayload {
            business_short_code: self.config.shortcode.clone(),
            password,
            timestamp,
            checkout_request_id: checkout_request_id.to_string(),
        };

        let (status, body) = self.post_signed(STK_QUERY_PATH, &token, &payload).await?;

        if !status.is_success() {
            let error_body = serde_json::from_str::<ProviderErrorBody>(&body).unwrap_or_default();
            if error_body.error_code.as_deref() == Some(QUERY_IN_PROGRESS_ERROR) {
                debug!("M-Pesa reports {} still processing", checkout_request_id);
                return Ok(QueryOutcome::Pending {
                    description: error_body
                        .error_message
                        .unwrap_or_else(|| "The transaction is being processed".to_string()),
                });
            }
            error!("M-Pesa STK query error: HTTP {} {}", status, body);
            return Err(Self::transient(format!("HTTP {}: {}", status, body)));
        }

        let response: StkQueryResponse = serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse M-Pesa STK query response: {}", e);
            Self::transient(format!("Invalid response format: {}", e))
        })?;

        let description = response.result_desc.unwrap_or_default();
        let outcome = match response.result_code.as_ref().and_then(code_text) {
            Some(code) => {
                let receipt = response
                    .callback_metadata
                    .as_ref()
                    .and_then(|m| metadata_text(&m.items, "MpesaReceiptNumber"));
                QueryOutcome::classify(&code, description, receipt)
            }
            None => QueryOutcome::Pending { description },
        };

        info!(
            "M-Pesa STK query: checkout_request_id={} outcome={:?}",
            checkout_request_id, outcome
        );
        Ok(outcome)
    }
}

fn code_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// OAuth token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: String,
}

// STK push request
#[derive(Debug, Serialize)]
struct StkPushPayload {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: String,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "TransactionType")]
    transaction_type: String,
    #[serde(rename = "Amount")]
    amount: u64,
    #[serde(rename = "PartyA")]
    party_a: String,
    #[serde(rename = "PartyB")]
    party_b: String,
    #[serde(rename = "PhoneNumber")]
    phone_number: String,
    #[serde(rename = "CallBackURL")]
    callback_url: String,
    #[serde(rename = "AccountReference")]
    account_reference: String,
    #[serde(rename = "TransactionDesc")]
    transaction_desc: String,
}

// STK query request
#[derive(Debug, Serialize)]
struct StkQueryPayload {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: String,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
}

// STK query response
#[derive(Debug, Deserialize)]
struct StkQueryResponse {
    #[serde(rename = "ResultCode", default)]
    result_code: Option<serde_json::Value>,
    #[serde(rename = "ResultDesc", default)]
    result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata", default)]
    callback_metadata: Option<QueryMetadata>,
}

#[derive(Debug, Deserialize)]
struct QueryMetadata {
    #[serde(rename = "Item", default)]
    items: Vec<MetadataItem>,
}

// Error body returned with non-2xx responses
#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
    #[serde(rename = "errorMessage", default)]
    error_message: Option<String>,
}
