//! Scripted gateway for service tests

use crate::error::{AppError, AppResult, ExternalError};
use crate::payments::traits::MpesaGateway;
use crate::payments::types::{PushAcceptance, PushRequest, QueryOutcome};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct MockGateway {
    push_result: AppResult<PushAcceptance>,
    query_result: AppResult<QueryOutcome>,
    push_calls: AtomicUsize,
    query_calls: AtomicUsize,
    last_push: Mutex<Option<PushRequest>>,
}

impl MockGateway {
    pub fn accepting(checkout_request_id: &str) -> Self {
        Self {
            push_result: Ok(PushAcceptance {
                merchant_request_id: format!("m-{}", checkout_request_id),
                checkout_request_id: checkout_request_id.to_string(),
                response_code: "0".to_string(),
                response_description: "Success. Request accepted for processing".to_string(),
                customer_message: "Success. Request accepted for processing".to_string(),
            }),
            query_result: Ok(QueryOutcome::Pending {
                description: "The transaction is being processed".to_string(),
            }),
            push_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            last_push: Mutex::new(None),
        }
    }

    pub fn rejecting(message: &str) -> Self {
        Self {
            push_result: Err(AppError::external(ExternalError::GatewayRejected {
                provider: "M-Pesa".to_string(),
                message: message.to_string(),
            })),
            ..Self::accepting("unused")
        }
    }

    pub fn querying(outcome: QueryOutcome) -> Self {
        Self {
            query_result: Ok(outcome),
            ..Self::accepting("unused")
        }
    }

    pub fn query_unreachable() -> Self {
        Self {
            query_result: Err(AppError::external(ExternalError::GatewayTransient {
                provider: "M-Pesa".to_string(),
                message: "operation timed out".to_string(),
            })),
            ..Self::accepting("unused")
        }
    }

    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn last_push(&self) -> Option<PushRequest> {
        self.last_push.lock().unwrap().clone()
    }
}

#[async_trait]
impl MpesaGateway for MockGateway {
    async fn initiate_push(&self, request: PushRequest) -> AppResult<PushAcceptance> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_push.lock().unwrap() = Some(request);
        self.push_result.clone()
    }

    async fn query_status(&self, _checkout_request_id: &str) -> AppResult<QueryOutcome> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.query_result.clone()
    }
}
