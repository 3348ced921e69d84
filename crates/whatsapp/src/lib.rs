//! Outbound WhatsApp messaging.

pub mod address;
pub mod client;
pub mod dry_run;

use std::sync::Arc;

use fieldrelay_core::config::{MessagingConfig, MessagingProvider};
use fieldrelay_core::notify::Messenger;

pub use address::{normalize_address, AddressError};
pub use client::{ClientError, WhatsAppMessenger};
pub use dry_run::DryRunMessenger;

/// Messenger for the configured provider.
pub fn build_messenger(config: &MessagingConfig) -> Result<Arc<dyn Messenger>, ClientError> {
    match config.provider {
        MessagingProvider::WhatsappHttp => Ok(Arc::new(WhatsAppMessenger::from_config(config)?)),
        MessagingProvider::DryRun => {
            Ok(Arc::new(DryRunMessenger::new(config.default_country_code.clone())))
        }
    }
}
