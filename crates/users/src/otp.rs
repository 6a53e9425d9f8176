//! One-time-password delivery port (SMS provider).

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OtpError {
    #[error("invalid otp")]
    Invalid,

    #[error("otp provider: {0}")]
    Provider(String),
}

#[async_trait]
pub trait OtpSender: Send + Sync {
    /// Send a fresh code to `phone`; returns the provider's message id.
    async fn send_otp(&self, phone: &str) -> Result<String, OtpError>;

    async fn check_otp(&self, phone: &str, code: &str) -> Result<(), OtpError>;
}
