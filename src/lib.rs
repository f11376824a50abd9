//! Storefront back office: M-Pesa push-payment collection
//!
//! Initiates STK push payments, reconciles their outcome from the provider's
//! callback or a status query, and serves the mobile payment endpoints.

pub mod api;
pub mod config;
#[cfg(feature = "database")]
pub mod database;
pub mod error;
pub mod payments;
pub mod services;
