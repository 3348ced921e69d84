use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use fieldrelay_core::config::MessagingConfig;
use fieldrelay_core::notify::{DeliveryError, Messenger};

use crate::address::normalize_address;

const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("messaging.base_url is required for the whatsapp_http provider")]
    MissingBaseUrl,
    #[error("could not build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

/// Posts text messages to a WhatsApp-style HTTP provider at `{base_url}/messages`.
pub struct WhatsAppMessenger {
    client: Client,
    endpoint: String,
    api_token: SecretString,
    sender_id: Option<String>,
    country_code: String,
}

impl std::fmt::Debug for WhatsAppMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppMessenger")
            .field("endpoint", &self.endpoint)
            .field("sender_id", &self.sender_id)
            .field("api_token", &"[redacted]")
            .finish()
    }
}

impl WhatsAppMessenger {
    pub fn from_config(config: &MessagingConfig) -> Result<Self, ClientError> {
        let base_url = config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(ClientError::MissingBaseUrl)?;
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/messages", base_url.trim_end_matches('/')),
            api_token: config.api_token.clone(),
            sender_id: config.sender_id.clone().filter(|sender| !sender.trim().is_empty()),
            country_code: config.default_country_code.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Messenger for WhatsAppMessenger {
    async fn send(&self, address: &str, text: &str) -> Result<(), DeliveryError> {
        let to = normalize_address(address, &self.country_code)
            .map_err(|_| DeliveryError::InvalidAddress(address.to_owned()))?;
        let payload = OutboundMessage {
            messaging_product: "whatsapp",
            to: &to,
            kind: "text",
            text: TextBody { body: text },
            from: self.sender_id.as_deref(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY).rev().find(|index| body.is_char_boundary(*index)).unwrap_or(0);
                body.truncate(cut);
            }
            warn!(
                event_name = "whatsapp.send.rejected",
                status = status.as_u16(),
                to = %to,
                "provider rejected outbound message"
            );
            return Err(DeliveryError::Rejected { status: status.as_u16(), body });
        }

        debug!(event_name = "whatsapp.send.accepted", to = %to, "provider accepted outbound message");
        Ok(())
    }
}
