use tokio::sync::mpsc;

/// Outcomes of background work that already returned to its caller.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(tag = "type")]
pub enum SyncEvent {
    #[serde(rename = "writeConfirmed")]
    WriteConfirmed { cache_key: String, record_id: String },
    #[serde(rename = "writeFailed")]
    WriteFailed {
        cache_key: String,
        record_id: String,
        error: String,
        /// `false` when a newer write to the same record was still in flight
        /// and the entry was marked stale instead of rolled back.
        rolled_back: bool,
    },
    #[serde(rename = "refreshFailed")]
    RefreshFailed { cache_key: String, error: String },
}

pub trait SyncRuntime: Send + Sync + 'static {
    fn emit(&self, event: SyncEvent);
}

/// Forwards every event into an unbounded channel.
pub struct ChannelRuntime {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelRuntime {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SyncRuntime for ChannelRuntime {
    fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}
