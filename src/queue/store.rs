use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{MessageQueue, QueueError, ReceivedMessage, Result};

const NEXT_SEQ: &[u8] = b"next_seq";

/// Stored form of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    id: String,
    body: Value,
    /// Hidden from `receive` until this instant (unix millis)
    visible_at_ms: u64,
    /// Token of the latest delivery
    receipt: Option<String>,
    receive_count: u32,
}

/// FjallQueue persists named queues in an embedded Fjall keyspace
///
/// Architecture:
/// - `messages` partition: "{queue}:{seq:016}" -> Envelope (JSON)
/// - `metadata` partition: "next_seq" -> u64 (big-endian)
///
/// Receiving a message hides it for the visibility timeout and issues a fresh
/// receipt handle `"{seq}:{token}"`. The message stays stored until deleted
/// with its latest receipt handle, so a consumer that crashes before deleting
/// sees the message again once the timeout passes.
#[derive(Clone)]
pub struct FjallQueue {
    keyspace: Keyspace,
    messages: PartitionHandle,
    metadata: PartitionHandle,
    seq_counter: Arc<AtomicU64>,
    lock: Arc<Mutex<()>>,
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

fn message_key(queue: &str, seq: u64) -> Vec<u8> {
    format!("{}:{:016}", queue, seq).into_bytes()
}

fn queue_prefix(queue: &str) -> Vec<u8> {
    format!("{}:", queue).into_bytes()
}

fn parse_receipt(handle: &str) -> Result<(u64, &str)> {
    let (seq, token) = handle
        .split_once(':')
        .ok_or_else(|| QueueError::InvalidReceipt(handle.to_string()))?;
    let seq = seq
        .parse()
        .map_err(|_| QueueError::InvalidReceipt(handle.to_string()))?;
    Ok((seq, token))
}

impl FjallQueue {
    /// Open or create a FjallQueue at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening FjallQueue at: {}", path.as_ref().display());

        let keyspace = Config::new(path).open()?;
        let messages = keyspace.open_partition("messages", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        let current_seq = metadata
            .get(NEXT_SEQ)?
            .map(|bytes| u64::from_be_bytes(bytes.as_ref().try_into().unwrap_or([0u8; 8])))
            .unwrap_or(0);

        info!("FjallQueue opened, current sequence: {}", current_seq);

        Ok(Self {
            keyspace,
            messages,
            metadata,
            seq_counter: Arc::new(AtomicU64::new(current_seq)),
            lock: Arc::new(Mutex::new(())),
        })
    }

    /// Stored messages of `queue`, visible or not
    pub fn depth(&self, queue: &str) -> Result<usize> {
        let mut n = 0;
        for item in self.messages.prefix(queue_prefix(queue)) {
            item?;
            n += 1;
        }
        Ok(n)
    }

    /// Stored message bodies of `queue`, oldest first
    pub fn peek_all(&self, queue: &str) -> Result<Vec<Value>> {
        let mut bodies = Vec::new();
        for item in self.messages.prefix(queue_prefix(queue)) {
            let (_, value) = item?;
            let envelope: Envelope = serde_json::from_slice(&value)?;
            bodies.push(envelope.body);
        }
        Ok(bodies)
    }
}

#[async_trait]
impl MessageQueue for FjallQueue {
    async fn send(&self, queue: &str, body: Value) -> Result<String> {
        if queue.is_empty() || queue.contains(':') {
            return Err(QueueError::InvalidQueueName(queue.to_string()));
        }
        let seq = self.seq_counter.fetch_add(1, Ordering::SeqCst);
        let envelope = Envelope {
            id: Uuid::now_v7().to_string(),
            body,
            visible_at_ms: 0,
            receipt: None,
            receive_count: 0,
        };

        self.messages
            .insert(message_key(queue, seq), serde_json::to_vec(&envelope)?)?;
        self.metadata.insert(NEXT_SEQ, (seq + 1).to_be_bytes())?;

        debug!(queue, seq, id = %envelope.id, "Message sent");
        Ok(envelope.id)
    }

    async fn receive(
        &self,
        queue: &str,
        max: usize,
        visibility: Duration,
    ) -> Result<Vec<ReceivedMessage>> {
        let _guard = self.lock.lock().await;
        let now = now_ms();
        let hidden_until = now.saturating_add(visibility.as_millis() as u64);
        let prefix = queue_prefix(queue);

        let mut due = Vec::new();
        for item in self.messages.prefix(&prefix) {
            if due.len() >= max {
                break;
            }
            let (key, value) = item?;
            let envelope: Envelope = serde_json::from_slice(&value)?;
            if envelope.visible_at_ms <= now {
                due.push((key.to_vec(), envelope));
            }
        }

        let mut received = Vec::with_capacity(due.len());
        for (key, mut envelope) in due {
            let seq = std::str::from_utf8(&key[prefix.len()..])
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| QueueError::InvalidReceipt(String::from_utf8_lossy(&key).into()))?;
            let token = Uuid::new_v4().simple().to_string();

            envelope.visible_at_ms = hidden_until;
            envelope.receive_count += 1;
            envelope.receipt = Some(token.clone());
            self.messages
                .insert(key.as_slice(), serde_json::to_vec(&envelope)?)?;

            received.push(ReceivedMessage {
                id: envelope.id,
                body: envelope.body,
                receipt_handle: format!("{}:{}", seq, token),
                receive_count: envelope.receive_count,
            });
        }

        if !received.is_empty() {
            debug!(queue, count = received.len(), "Messages received");
        }
        Ok(received)
    }

    async fn delete(&self, queue: &str, receipt_handle: &str) -> Result<()> {
        let (seq, token) = parse_receipt(receipt_handle)?;
        let key = message_key(queue, seq);

        let _guard = self.lock.lock().await;
        let Some(value) = self.messages.get(&key)? else {
            debug!(queue, seq, "Message already deleted");
            return Ok(());
        };

        let envelope: Envelope = serde_json::from_slice(&value)?;
        if envelope.receipt.as_deref() != Some(token) {
            return Err(QueueError::StaleReceipt {
                queue: queue.to_string(),
                receipt_handle: receipt_handle.to_string(),
            });
        }

        self.messages.remove(key)?;
        debug!(queue, seq, id = %envelope.id, "Message deleted");
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}
