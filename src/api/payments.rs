//! Mobile payment endpoints

use crate::api::auth::AuthUser;
use crate::api::response::ApiResponse;
use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::services::{
    HistoryQuery, InitiatePaymentRequest, InitiatedPayment, PaymentHistory, PaymentView,
    VerificationResult,
};
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;
use tracing::debug;

const INITIATED_MESSAGE: &str = "Payment initiated successfully. Please check your phone.";

#[derive(Debug, Serialize)]
pub struct CallbackAck {
    pub message: &'static str,
}

pub async fn initiate(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> AppResult<ApiResponse<InitiatedPayment>> {
    let Json(request) = body.map_err(|e| {
        debug!("Malformed initiate body: {}", e);
        AppError::validation("Amount and phone number are required")
    })?;

    let initiated = state
        .services
        .initiation
        .initiate(user.user_id, request)
        .await?;

    Ok(ApiResponse::with_message(INITIATED_MESSAGE, initiated))
}

/// Provider-originated; always 200
pub async fn callback(State(state): State<AppState>, body: Bytes) -> ApiResponse<CallbackAck> {
    let outcome = state.services.callback.handle(&body).await;
    ApiResponse::ok(CallbackAck {
        message: outcome.ack_message(),
    })
}

pub async fn verify(
    State(state): State<AppState>,
    user: AuthUser,
    Path(checkout_request_id): Path<String>,
) -> AppResult<ApiResponse<VerificationResult>> {
    let result = state
        .services
        .verification
        .verify(user.user_id, &checkout_request_id)
        .await?;

    Ok(ApiResponse::ok(result))
}

pub async fn payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(payment_id): Path<String>,
) -> AppResult<ApiResponse<PaymentView>> {
    let payment_id: i64 = payment_id
        .parse()
        .map_err(|_| AppError::validation("Invalid payment ID"))?;

    let view = state.services.queries.payment(user.user_id, payment_id).await?;
    Ok(ApiResponse::ok(view))
}

pub async fn history(
    State(state): State<AppState>,
    user: AuthUser,
    query: Option<Query<HistoryQuery>>,
) -> AppResult<ApiResponse<PaymentHistory>> {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let history = state.services.queries.history(user.user_id, &query).await?;
    Ok(ApiResponse::ok(history))
}
