//! Outbound notification: the messenger port, message templates and the dispatcher.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

pub mod dispatcher;
pub mod templates;

pub use dispatcher::{
    DeliveryOutcome, DeliveryRecord, DispatchReport, NotificationDispatcher, SubmitterContact,
};
pub use templates::{Audience, MessageRenderer, MessageTemplates, TemplateError};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("address `{0}` cannot receive messages")]
    InvalidAddress(String),
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, address: &str, text: &str) -> Result<(), DeliveryError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub address: String,
    pub text: String,
}

/// Captures sends in memory; addresses marked failing return a transport error.
#[derive(Clone, Default)]
pub struct RecordingMessenger {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, address: impl Into<String>) {
        match self.failing.lock() {
            Ok(mut failing) => failing.insert(address.into()),
            Err(poisoned) => poisoned.into_inner().insert(address.into()),
        };
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn sent_to(&self, address: &str) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|message| message.address == address).collect()
    }

    fn is_failing(&self, address: &str) -> bool {
        match self.failing.lock() {
            Ok(failing) => failing.contains(address),
            Err(poisoned) => poisoned.into_inner().contains(address),
        }
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, address: &str, text: &str) -> Result<(), DeliveryError> {
        if self.is_failing(address) {
            return Err(DeliveryError::Transport(format!("scripted failure for {address}")));
        }

        let message = SentMessage { address: address.to_owned(), text: text.to_owned() };
        match self.sent.lock() {
            Ok(mut sent) => sent.push(message),
            Err(poisoned) => poisoned.into_inner().push(message),
        }
        Ok(())
    }
}
