//! Visibility-timeout message queues
//!
//! Delivery is at-least-once: a received message stays stored, hidden for the
//! visibility timeout, until it is deleted with the receipt handle of its
//! latest delivery.

pub mod messages;
pub mod store;

pub use messages::{FileTransfer, GranuleDispatch, PdrMessage};
pub use store::FjallQueue;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Receipt handle '{receipt_handle}' for queue '{queue}' was superseded")]
    StaleReceipt {
        queue: String,
        receipt_handle: String,
    },

    #[error("Malformed receipt handle: {0}")]
    InvalidReceipt(String),

    #[error("Invalid queue name '{0}'")]
    InvalidQueueName(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub id: String,
    pub body: Value,
    pub receipt_handle: String,
    /// Deliveries so far, this one included
    pub receive_count: u32,
}

impl ReceivedMessage {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Append a message and return its id
    async fn send(&self, queue: &str, body: Value) -> Result<String>;

    /// Up to `max` visible messages, each hidden for `visibility`
    async fn receive(
        &self,
        queue: &str,
        max: usize,
        visibility: Duration,
    ) -> Result<Vec<ReceivedMessage>>;

    /// Remove a message; unknown messages are ignored
    async fn delete(&self, queue: &str, receipt_handle: &str) -> Result<()>;

    /// Make every accepted send and delete durable
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

impl dyn MessageQueue {
    /// Serialize `message` and send it
    pub async fn send_message<T: Serialize + Sync>(&self, queue: &str, message: &T) -> Result<String> {
        self.send(queue, serde_json::to_value(message)?).await
    }
}
