use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Outbound WebSocket frames block for at most this long before being
/// dropped for a slow or dead client.
const SEND_DEADLINE: Duration = Duration::from_secs(1);
const OUTBOUND_BUFFER: usize = 64;

/// The `{event, data}` wire envelope, both directions.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct Frame {
    pub event: String,
    pub data: serde_json::Value,
}

impl Frame {
    pub fn new<T: Serialize>(event: &str, data: &T) -> anyhow::Result<Self> {
        Ok(Self {
            event: event.to_string(),
            data: serde_json::to_value(data)?,
        })
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self {
            event: "error".to_string(),
            data: serde_json::json!({ "code": code, "message": message }),
        }
    }
}

struct ClientEntry {
    tx: mpsc::Sender<Frame>,
    cancel: CancellationToken,
    generation: u64,
}

/// What a freshly-registered connection gets back: its outbound queue and
/// the token that fires if a newer connection for the same user replaces
/// it.
pub struct Registration {
    pub generation: u64,
    pub outbound: mpsc::Receiver<Frame>,
    pub cancel: CancellationToken,
}

/// One connection per user. Registration is last-writer-wins: the
/// previous connection (if any) is cancelled. Disconnect removes the
/// entry only if it still belongs to the departing generation.
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<Uuid, ClientEntry>,
    generations: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: Uuid) -> Registration {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, outbound) = mpsc::channel(OUTBOUND_BUFFER);
        let cancel = CancellationToken::new();

        let previous = self.clients.insert(
            user_id,
            ClientEntry {
                tx,
                cancel: cancel.clone(),
                generation,
            },
        );
        if let Some(previous) = previous {
            tracing::info!(user_id = %user_id, "replacing an existing connection");
            previous.cancel.cancel();
        }

        Registration {
            generation,
            outbound,
            cancel,
        }
    }

    pub fn unregister(&self, user_id: Uuid, generation: u64) {
        self.clients
            .remove_if(&user_id, |_, entry| entry.generation == generation);
    }

    pub fn is_connected(&self, user_id: Uuid) -> bool {
        self.clients.contains_key(&user_id)
    }

    /// Queue a frame for a user. Offline users and queues that stay full
    /// past the send deadline drop the frame; the bus retains the source
    /// of truth.
    pub async fn send(&self, user_id: Uuid, frame: Frame) -> bool {
        let tx = match self.clients.get(&user_id) {
            Some(entry) => entry.tx.clone(),
            None => {
                tracing::debug!(user_id = %user_id, event = frame.event, "user offline; frame dropped");
                return false;
            }
        };
        match tx.send_timeout(frame, SEND_DEADLINE).await {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(user_id = %user_id, error = %err, "outbound frame dropped");
                false
            }
        }
    }
}
