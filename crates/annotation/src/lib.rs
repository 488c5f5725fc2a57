mod error;

pub mod edit;
pub mod id;
pub mod navigation;
pub mod tagging;
pub mod timeline;
pub mod token;
pub mod types;
pub mod validate;

pub use error::*;
pub use id::{SegmentId, SegmentIdError};
pub use navigation::{first_untagged, is_fully_tagged, next_untagged, tagged_count};
pub use tagging::{Entry, TaggingMachine, TaggingSignal, TaggingState};
pub use timeline::{active_index, active_segment};
pub use token::{WireToken, normalize};
pub use types::{NewSense, Segment, SegmentUpdate, Sense, SenseId, SensePatch, Token};
