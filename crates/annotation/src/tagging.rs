//! Per-segment pause policy.
//!
//! The machine only ever tracks the currently active segment. Entering a
//! different segment resets everything (state, selection) and bumps the
//! generation counter, so work derived from the previous segment can be told
//! apart and dropped.
//!
//! ```text
//!             time >= end, incomplete            token tagged, complete
//!   Free ────────────────────────────> AwaitingTag ─────────────────────> Complete
//!    │                                      │
//!    │ time >= end, complete                │ manual resume
//!    └─────────────> Complete               └──────────────> Overridden
//! ```
//!
//! `Complete` is re-checked on every observation at or past the end: if the
//! segment reads incomplete again, the machine returns to `AwaitingTag`.
//!
//! A segment only pauses if playback actually reaches its end. Arrival
//! through natural playback arms it; a seek arms it only when landing before
//! the end, so jumping past (or back into) an already-finished line never
//! pauses after the fact.

use crate::navigation::{first_untagged, next_untagged};
use crate::types::Segment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub enum TaggingState {
    Free,
    AwaitingTag,
    Complete,
    /// The user resumed playback over an incomplete segment.
    Overridden,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TaggingSignal {
    Pause { segment_id: String },
    Resume { segment_id: String },
    FocusToken { segment_id: String, index: usize },
}

/// How the playback position was reached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Entry {
    Tick(f64),
    Seek(f64),
}

impl Entry {
    pub fn time(&self) -> f64 {
        match self {
            Self::Tick(t) | Self::Seek(t) => *t,
        }
    }
}

#[derive(Debug, Clone)]
struct Active {
    id: String,
    end_time: f64,
    armed: bool,
}

#[derive(Debug, Clone)]
pub struct TaggingMachine {
    active: Option<Active>,
    state: TaggingState,
    selected: Option<usize>,
    generation: u64,
}

impl TaggingMachine {
    pub fn new() -> Self {
        Self {
            active: None,
            state: TaggingState::Free,
            selected: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> TaggingState {
        self.state
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.id.as_str())
    }

    /// Feed one playback observation together with the segment the timeline
    /// resolved as active for it.
    ///
    /// Returns `true` in the first slot when the active segment changed (the
    /// machine has already been reset by then).
    pub fn observe(
        &mut self,
        segment: Option<&Segment>,
        entry: Entry,
    ) -> (bool, Vec<TaggingSignal>) {
        let time = entry.time();

        let Some(segment) = segment else {
            let changed = self.active.is_some();
            if changed {
                self.reset(None);
            }
            return (changed, vec![]);
        };

        let changed = self.active_id() != Some(segment.id.as_str());
        if changed {
            let armed = match entry {
                Entry::Tick(_) => true,
                Entry::Seek(t) => t < segment.end_time,
            };
            self.reset(Some(Active {
                id: segment.id.clone(),
                end_time: segment.end_time,
                armed,
            }));
        } else if let (Entry::Seek(t), Some(active)) = (entry, self.active.as_mut()) {
            active.armed = t < active.end_time;
            active.end_time = segment.end_time;
        }

        (changed, self.check_boundary(segment, time))
    }

    fn check_boundary(&mut self, segment: &Segment, time: f64) -> Vec<TaggingSignal> {
        let Some(active) = self.active.as_ref() else {
            return vec![];
        };
        if !active.armed || time < segment.end_time {
            return vec![];
        }
        match self.state {
            TaggingState::Free => {}
            // Completion was derived from a value that no longer holds (a
            // rolled-back tag or an untag).
            TaggingState::Complete if !segment.is_complete() => {}
            _ => return vec![],
        }

        if segment.is_complete() {
            self.state = TaggingState::Complete;
            return vec![];
        }

        self.state = TaggingState::AwaitingTag;
        let mut signals = vec![TaggingSignal::Pause {
            segment_id: segment.id.clone(),
        }];
        if let Some(index) = first_untagged(segment.tokens()) {
            self.selected = Some(index);
            signals.push(TaggingSignal::FocusToken {
                segment_id: segment.id.clone(),
                index,
            });
        }
        signals
    }

    /// A token of `segment` just acquired a sense.
    pub fn on_token_tagged(&mut self, segment: &Segment, index: usize) -> Vec<TaggingSignal> {
        if self.active_id() != Some(segment.id.as_str()) {
            return vec![];
        }
        if self.state != TaggingState::AwaitingTag {
            return vec![];
        }

        match next_untagged(segment.tokens(), index) {
            None => {
                self.state = TaggingState::Complete;
                self.selected = None;
                vec![TaggingSignal::Resume {
                    segment_id: segment.id.clone(),
                }]
            }
            Some(next) => {
                self.selected = Some(next);
                vec![TaggingSignal::FocusToken {
                    segment_id: segment.id.clone(),
                    index: next,
                }]
            }
        }
    }

    /// The token list of the active segment changed shape (split, merge,
    /// rebuild). Keeps the selection in range and releases a held pause if
    /// the edit completed the segment.
    pub fn on_tokens_edited(&mut self, segment: &Segment) -> Vec<TaggingSignal> {
        if self.active_id() != Some(segment.id.as_str()) {
            return vec![];
        }

        let len = segment.tokens().len();
        if self.selected.is_some_and(|i| i >= len) {
            self.selected = None;
        }

        if self.state == TaggingState::AwaitingTag && segment.is_complete() {
            self.state = TaggingState::Complete;
            self.selected = None;
            return vec![TaggingSignal::Resume {
                segment_id: segment.id.clone(),
            }];
        }
        vec![]
    }

    /// The user pressed play while the machine was holding playback.
    ///
    /// Returns `true` if this overrode a pending tag requirement. The pause
    /// check stays off for this segment until the next segment change.
    pub fn on_manual_resume(&mut self) -> bool {
        if self.state != TaggingState::AwaitingTag {
            return false;
        }
        self.state = TaggingState::Overridden;
        true
    }

    pub fn select(&mut self, index: Option<usize>) {
        self.selected = index;
    }

    fn reset(&mut self, active: Option<Active>) {
        self.active = active;
        self.state = TaggingState::Free;
        self.selected = None;
        self.generation += 1;
    }
}

impl Default for TaggingMachine {
    fn default() -> Self {
        Self::new()
    }
}
