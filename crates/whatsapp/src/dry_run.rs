use async_trait::async_trait;
use tracing::info;

use fieldrelay_core::notify::{DeliveryError, Messenger};

use crate::address::normalize_address;

/// Logs each message instead of sending it. Address normalisation still applies.
#[derive(Clone, Debug)]
pub struct DryRunMessenger {
    country_code: String,
}

impl DryRunMessenger {
    pub fn new(country_code: impl Into<String>) -> Self {
        Self { country_code: country_code.into() }
    }
}

#[async_trait]
impl Messenger for DryRunMessenger {
    async fn send(&self, address: &str, text: &str) -> Result<(), DeliveryError> {
        let to = normalize_address(address, &self.country_code)
            .map_err(|_| DeliveryError::InvalidAddress(address.to_owned()))?;
        info!(event_name = "whatsapp.dry_run.message", to = %to, chars = text.chars().count(), text, "dry run, message not sent");
        Ok(())
    }
}
