//! Webhook Module
//!
//! Admission validation for SSP resources, served by the manager's webhook
//! server on the canonical serving certificate.

pub mod validator;

pub use validator::{review, SspValidator, VALIDATE_PATH};
