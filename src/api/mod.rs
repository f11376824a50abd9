//! HTTP surface

pub mod auth;
pub mod health;
pub mod payments;
pub mod response;

use crate::services::PaymentServices;
use auth::JwtVerifier;
use axum::routing::{get, post};
use axum::Router;
use http::HeaderName;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Static facts reported by the health check
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub environment: String,
    pub mpesa_environment: String,
    pub storage: &'static str,
}

#[derive(Clone)]
pub struct AppState {
    pub services: PaymentServices,
    pub jwt: JwtVerifier,
    pub info: ServiceInfo,
}

impl AppState {
    pub fn new(services: PaymentServices, jwt_secret: &str, info: ServiceInfo) -> Self {
        Self {
            services,
            jwt: JwtVerifier::new(jwt_secret),
            info,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let mobile_payments = Router::new()
        .route("/mpesa/initiate", post(payments::initiate))
        .route("/mpesa/callback", post(payments::callback))
        .route("/mpesa/verify/:checkout_request_id", get(payments::verify))
        .route("/history", get(payments::history))
        .route("/:payment_id", get(payments::payment));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/mobile/payments", mobile_payments)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .with_state(state)
}
