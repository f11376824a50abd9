//! Payment provider implementations

pub mod mpesa;

pub use mpesa::{MpesaClient, MpesaConfig, MpesaEnvironment};
