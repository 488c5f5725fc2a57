//! Drives a [`TaggingMachine`] from playback observations for one media
//! item.
//!
//! The session never holds on to segments between calls: every observation
//! and every edit goes back to the store, so whatever it acts on is the
//! current value, optimistic writes included.

use std::time::Duration;

use subtag_annotation::{
    Entry, Segment, SenseId, TaggingMachine, TaggingSignal, TaggingState, active_segment, edit,
};

use crate::clock::{PlaybackClock, TimeReading, read_position};
use crate::generation::{GenerationGuard, Generations};
use crate::store::{AnnotationStore, PendingWrite};
use crate::{Error, Result, SyncConfig};

pub struct TaggingSession {
    store: AnnotationStore,
    media_id: String,
    machine: TaggingMachine,
    generations: Generations,
    time_query_timeout: Duration,
}

impl TaggingSession {
    pub fn new(store: AnnotationStore, media_id: impl Into<String>, config: &SyncConfig) -> Self {
        Self {
            store,
            media_id: media_id.into(),
            machine: TaggingMachine::new(),
            generations: Generations::new(),
            time_query_timeout: config.time_query_timeout(),
        }
    }

    pub fn media_id(&self) -> &str {
        &self.media_id
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn state(&self) -> TaggingState {
        self.machine.state()
    }

    pub fn selected(&self) -> Option<usize> {
        self.machine.selected()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.machine.active_id()
    }

    /// Guard for work derived from the current active segment.
    pub fn guard(&self) -> GenerationGuard {
        self.generations.guard()
    }

    /// Current value of the active segment, if any.
    pub async fn active_segment(&self) -> Result<Option<Segment>> {
        match self.machine.active_id() {
            Some(id) => self.store.segment(id).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn observe(&mut self, entry: Entry) -> Result<Vec<TaggingSignal>> {
        let segments = self.store.segments(&self.media_id).await?;
        let active = active_segment(&segments, entry.time());

        let (changed, signals) = self.machine.observe(active, entry);
        if changed {
            self.generations.advance(self.machine.generation());
            tracing::debug!(
                media_id = %self.media_id,
                segment_id = ?self.machine.active_id(),
                generation = self.machine.generation(),
                "active_segment_changed"
            );
        }
        self.log_signals(&signals);
        Ok(signals)
    }

    /// One playback tick: read the clock (authoritative if it answers in
    /// time) and observe the result.
    pub async fn tick(
        &mut self,
        clock: &dyn PlaybackClock,
    ) -> Result<(TimeReading, Vec<TaggingSignal>)> {
        let reading = read_position(clock, self.time_query_timeout).await;
        let signals = self.observe(Entry::Tick(reading.seconds)).await?;
        Ok((reading, signals))
    }

    pub async fn seek(&mut self, seconds: f64) -> Result<Vec<TaggingSignal>> {
        self.observe(Entry::Seek(seconds)).await
    }

    /// Attach `sense_id` to token `index` of the active segment.
    ///
    /// Signals are derived from the optimistic value. A write that later
    /// fails is rolled back in the store, and the next observation at the
    /// segment's end pauses again if the rollback left it incomplete.
    pub async fn tag_token(
        &mut self,
        index: usize,
        sense_id: SenseId,
    ) -> Result<(Vec<TaggingSignal>, PendingWrite<Segment>)> {
        let id = self.require_active()?;
        let (segment, pending) = self
            .store
            .edit_segment(&id, |s| edit::tag_token(s, index, sense_id))
            .await?;

        let signals = self.machine.on_token_tagged(&segment, index);
        self.log_signals(&signals);
        Ok((signals, pending))
    }

    /// Apply a structural token edit (split, merge, rewrite, rebuild) to the
    /// active segment.
    pub async fn edit_active<F>(
        &mut self,
        edit: F,
    ) -> Result<(Vec<TaggingSignal>, PendingWrite<Segment>)>
    where
        F: FnOnce(&Segment) -> subtag_annotation::Result<Segment>,
    {
        let id = self.require_active()?;
        let (segment, pending) = self.store.edit_segment(&id, edit).await?;

        let signals = self.machine.on_tokens_edited(&segment);
        self.log_signals(&signals);
        Ok((signals, pending))
    }

    /// The user resumed playback. Returns `true` if an incomplete segment was
    /// accepted as-is.
    pub fn manual_resume(&mut self) -> bool {
        let overridden = self.machine.on_manual_resume();
        if overridden {
            tracing::info!(segment_id = ?self.machine.active_id(), "pause_overridden");
        }
        overridden
    }

    pub fn select(&mut self, index: Option<usize>) {
        self.machine.select(index);
    }

    fn require_active(&self) -> Result<String> {
        self.machine
            .active_id()
            .map(str::to_string)
            .ok_or(Error::NoActiveSegment)
    }

    fn log_signals(&self, signals: &[TaggingSignal]) {
        for signal in signals {
            match signal {
                TaggingSignal::Pause { segment_id } => {
                    tracing::info!(segment_id = %segment_id, "playback_paused_for_tagging");
                }
                TaggingSignal::Resume { segment_id } => {
                    tracing::info!(segment_id = %segment_id, "playback_resumed");
                }
                TaggingSignal::FocusToken { segment_id, index } => {
                    tracing::debug!(segment_id = %segment_id, index, "token_focused");
                }
            }
        }
    }
}
