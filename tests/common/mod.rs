//! In-process stand-in for the Daraja API.
//!
//! Records every request it receives and answers with scripted replies.

#![allow(dead_code)]

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storefront_backend::payments::providers::mpesa::{MpesaConfig, MpesaEnvironment};

pub const CONSUMER_KEY: &str = "test-key";
pub const CONSUMER_SECRET: &str = "test-secret";
pub const PASSKEY: &str = "test-passkey";
pub const SHORTCODE: &str = "174379";
pub const CHECKOUT_REQUEST_ID: &str = "ws_CO_191220191020363925";

#[derive(Clone)]
pub struct MockProvider {
    pub auth_headers: Arc<Mutex<Vec<String>>>,
    pub pushes: Arc<Mutex<Vec<Value>>>,
    pub queries: Arc<Mutex<Vec<Value>>>,
    push_reply: Arc<Mutex<(StatusCode, Value)>>,
    query_reply: Arc<Mutex<(StatusCode, Value)>>,
    query_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            auth_headers: Arc::default(),
            pushes: Arc::default(),
            queries: Arc::default(),
            push_reply: Arc::new(Mutex::new((StatusCode::OK, accepted_push(CHECKOUT_REQUEST_ID)))),
            query_reply: Arc::new(Mutex::new((StatusCode::OK, query_result("1037", "The transaction is being processed")))),
            query_delay: Arc::default(),
        }
    }

    pub fn reply_to_push(&self, status: StatusCode, body: Value) {
        *self.push_reply.lock().unwrap() = (status, body);
    }

    pub fn reply_to_query(&self, status: StatusCode, body: Value) {
        *self.query_reply.lock().unwrap() = (status, body);
    }

    pub fn delay_queries(&self, delay: Duration) {
        *self.query_delay.lock().unwrap() = Some(delay);
    }

    pub fn push_count(&self) -> usize {
        self.pushes.lock().unwrap().len()
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn last_push(&self) -> Value {
        self.pushes.lock().unwrap().last().cloned().unwrap()
    }

    /// Bind to port 0 and return the base URL
    pub async fn start(&self) -> String {
        let app = Router::new()
            .route("/oauth/v1/generate", get(token))
            .route("/mpesa/stkpush/v1/processrequest", post(push))
            .route("/mpesa/stkpushquery/v1/query", post(query))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}

pub fn mpesa_config(base_url: &str) -> MpesaConfig {
    MpesaConfig {
        consumer_key: CONSUMER_KEY.to_string(),
        consumer_secret: CONSUMER_SECRET.to_string(),
        passkey: PASSKEY.to_string(),
        shortcode: SHORTCODE.to_string(),
        callback_url: "https://shop.example.com/api/mobile/payments/mpesa/callback".to_string(),
        environment: MpesaEnvironment::Sandbox,
        base_url: base_url.to_string(),
        timeout_secs: 5,
    }
}

pub fn accepted_push(checkout_request_id: &str) -> Value {
    json!({
        "MerchantRequestID": "29115-34620561-1",
        "CheckoutRequestID": checkout_request_id,
        "ResponseCode": "0",
        "ResponseDescription": "Success. Request accepted for processing",
        "CustomerMessage": "Success. Request accepted for processing"
    })
}

pub fn query_result(code: &str, desc: &str) -> Value {
    json!({
        "ResponseCode": "0",
        "ResponseDescription": "The service request has been accepted successsfully",
        "MerchantRequestID": "29115-34620561-1",
        "CheckoutRequestID": CHECKOUT_REQUEST_ID,
        "ResultCode": code,
        "ResultDesc": desc
    })
}

async fn token(State(mock): State<MockProvider>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    mock.auth_headers.lock().unwrap().push(header.clone());

    let expected = format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", CONSUMER_KEY, CONSUMER_SECRET))
    );
    if header != expected {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "errorCode": "400.008.01", "errorMessage": "Invalid Authentication passed" })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({ "access_token": "mock-access-token", "expires_in": "3599" })),
    )
}

async fn push(State(mock): State<MockProvider>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    mock.pushes.lock().unwrap().push(body);
    let (status, reply) = mock.push_reply.lock().unwrap().clone();
    (status, Json(reply))
}

async fn query(State(mock): State<MockProvider>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    mock.queries.lock().unwrap().push(body);
    let delay = *mock.query_delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let (status, reply) = mock.query_reply.lock().unwrap().clone();
    (status, Json(reply))
}
