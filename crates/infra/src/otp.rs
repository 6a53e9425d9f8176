//! Development OTP sender: codes are logged instead of sent by SMS.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rand::Rng;
use uuid::Uuid;

use propdesk_users::{OtpError, OtpSender};

#[derive(Debug, Default)]
pub struct DevOtpSender {
    codes: RwLock<HashMap<String, String>>,
}

impl DevOtpSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending code for `phone`, if one was sent and not yet used.
    pub fn last_code(&self, phone: &str) -> Option<String> {
        self.codes.read().ok()?.get(phone).cloned()
    }
}

#[async_trait]
impl OtpSender for DevOtpSender {
    async fn send_otp(&self, phone: &str) -> Result<String, OtpError> {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let message_id = Uuid::now_v7().to_string();
        tracing::info!(%phone, %code, %message_id, "otp issued (dev sender, not delivered)");

        self.codes
            .write()
            .map_err(|_| OtpError::Provider("lock poisoned".to_string()))?
            .insert(phone.to_string(), code);
        Ok(message_id)
    }

    async fn check_otp(&self, phone: &str, code: &str) -> Result<(), OtpError> {
        let mut codes = self
            .codes
            .write()
            .map_err(|_| OtpError::Provider("lock poisoned".to_string()))?;
        match codes.get(phone) {
            Some(expected) if expected == code => {
                codes.remove(phone);
                Ok(())
            }
            _ => Err(OtpError::Invalid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn code_is_single_use() {
        let otp = DevOtpSender::new();
        otp.send_otp("0900000000").await.unwrap();
        let code = otp.last_code("0900000000").unwrap();
        assert_eq!(code.len(), 6);

        assert_eq!(otp.check_otp("0900000000", "not-it").await, Err(OtpError::Invalid));
        otp.check_otp("0900000000", &code).await.unwrap();
        assert_eq!(otp.check_otp("0900000000", &code).await, Err(OtpError::Invalid));
    }

    #[tokio::test]
    async fn unknown_phone_is_invalid() {
        let otp = DevOtpSender::new();
        assert_eq!(otp.check_otp("0911111111", "123456").await, Err(OtpError::Invalid));
    }
}
