//! Delivery of one-time codes to the user's phone. Delivery is best effort: the code is stored
//! before it is sent, and a failed delivery never fails the login.

use super::Code;
use crate::phone::PhoneNumber;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("gateway request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("gateway returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, phone: &PhoneNumber, code: &Code) -> Result<(), DispatchError>;
}

/// Posts codes to an external messaging gateway, which forwards them to the phone.
pub struct GatewayMessenger {
    client: Client,
    url: Url,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendOtpRequest<'a> {
    phone_number: &'a str,
    otp_code: &'a str,
}

impl GatewayMessenger {
    pub fn new(url: Url, api_key: String) -> Self {
        Self {
            client: Client::new(),
            url,
            api_key,
        }
    }
}

#[async_trait]
impl Messenger for GatewayMessenger {
    async fn send(&self, phone: &PhoneNumber, code: &Code) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(self.url.clone())
            .header("x-api-key", &self.api_key)
            .json(&SendOtpRequest {
                phone_number: phone.as_str(),
                otp_code: code.as_str(),
            })
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(DispatchError::Rejected { status, body })
        }
    }
}

/// Only logs that a code was issued. Meant for development setups without a gateway.
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send(&self, phone: &PhoneNumber, _code: &Code) -> Result<(), DispatchError> {
        log::info!("no messaging gateway configured, not delivering code to {}", phone);
        Ok(())
    }
}

/// Sends the code in the background. The caller never waits for the gateway.
pub(crate) fn dispatch(messenger: Arc<dyn Messenger>, phone: PhoneNumber, code: Code) {
    tokio::spawn(async move {
        match messenger.send(&phone, &code).await {
            Ok(()) => log::info!("OTP delivered to {}", phone),
            Err(e) => log::warn!("failed to deliver OTP to {}: {}", phone, e),
        }
    });
}
