#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use subtag_annotation::{Segment, SegmentId, Token};
use annotation_sync::persistence::MemoryPersistence;
use annotation_sync::{
    AnnotationStore, BoxFuture, ChannelRuntime, Persistence, PlaybackClock, SyncConfig, SyncEvent,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub const MEDIA: &str = "ep_01";

pub struct Harness {
    pub store: AnnotationStore,
    pub persistence: Arc<MemoryPersistence>,
    pub events: UnboundedReceiver<SyncEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        let persistence = Arc::new(MemoryPersistence::new());
        let (runtime, events) = ChannelRuntime::new();
        let store = AnnotationStore::new(persistence.clone(), Arc::new(runtime), config);
        Self {
            store,
            persistence,
            events,
        }
    }

    /// Write straight to the store of record, bypassing the cache.
    pub async fn seed(&self, segments: &[Segment]) {
        self.persistence.upsert_segments(segments).await.unwrap();
    }

    pub async fn remote_segment(&self, id: &str) -> Segment {
        let row = self.persistence.segment(id).await.unwrap().unwrap();
        serde_json::from_value(row).unwrap()
    }

    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        let mut out = vec![];
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

/// Segment `ordinal` of [`MEDIA`] with one token per word. A word written as
/// `"word#7"` is tagged with sense 7.
pub fn segment(ordinal: u32, start: f64, end: f64, words: &[&str]) -> Segment {
    let tokens = words
        .iter()
        .map(|word| match word.split_once('#') {
            Some((text, sense)) => Token::tagged(text, sense.parse().unwrap()),
            None => Token::untagged(*word),
        })
        .collect::<Vec<_>>();
    let text = tokens
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    Segment::new(&SegmentId::new(MEDIA, ordinal), text, start, end).with_tokens(tokens)
}

pub fn sense_ids(segment: &Segment) -> Vec<Option<i64>> {
    segment.tokens().iter().map(|t| t.sense_id).collect()
}

/// Clock whose authoritative answer arrives after `latency`.
pub struct ScriptedClock {
    pub authoritative: f64,
    pub local: f64,
    pub latency: Duration,
}

impl ScriptedClock {
    pub fn at(seconds: f64) -> Self {
        Self {
            authoritative: seconds,
            local: seconds,
            latency: Duration::ZERO,
        }
    }
}

impl PlaybackClock for ScriptedClock {
    fn query_position(&self) -> BoxFuture<'_, Option<f64>> {
        Box::pin(async move {
            tokio::time::sleep(self.latency).await;
            Some(self.authoritative)
        })
    }

    fn local_position(&self) -> f64 {
        self.local
    }
}
