//! Events emitted by the mocker towards its puppet adapter.

use puppet_mock_env::{ContactId, MessageId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// QR-code login progress, numbered as the puppet protocol numbers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScanStatus {
    Unknown = 0,
    Cancel = 1,
    #[default]
    Waiting = 2,
    Scanned = 3,
    Confirmed = 4,
    Timeout = 5,
}

/// Flat event records; listeners dereference ids through the payload
/// accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum PuppetEvent {
    Scan { qrcode: String, status: ScanStatus },
    Login { contact_id: ContactId },
    Logout { contact_id: ContactId },
    Message { message_id: MessageId },
    Dong { data: String },
}

impl PuppetEvent {
    /// Event name as seen by framework listeners.
    pub fn name(&self) -> &'static str {
        match self {
            PuppetEvent::Scan { .. } => "scan",
            PuppetEvent::Login { .. } => "login",
            PuppetEvent::Logout { .. } => "logout",
            PuppetEvent::Message { .. } => "message",
            PuppetEvent::Dong { .. } => "dong",
        }
    }
}

/// Receiving end of mocker emissions.
///
/// The adapter binds one sink into the mocker; the mocker never talks to
/// listeners directly.
pub trait PuppetSink: Send + Sync {
    fn emit(&self, event: PuppetEvent);
}

/// Fire-and-forget fan-out over a tokio broadcast channel.
///
/// Events sent while nobody is subscribed are dropped. Late subscribers
/// see only events sent after they subscribed.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PuppetEvent>,
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PuppetEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Sends to current subscribers, returning how many received it.
    pub fn publish(&self, event: PuppetEvent) -> usize {
        let name = event.name();
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                trace!("dropping {} event: no listener", name);
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl PuppetSink for EventBus {
    fn emit(&self, event: PuppetEvent) {
        self.publish(event);
    }
}
