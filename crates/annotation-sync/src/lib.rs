mod cache;
mod config;
mod error;
mod events;
mod generation;
mod verify;

pub mod clock;
pub mod persistence;
pub mod session;
pub mod store;

pub use clock::{PlaybackClock, TimeReading, TimeSource, read_position};
pub use config::SyncConfig;
pub use error::*;
pub use events::{ChannelRuntime, SyncEvent, SyncRuntime};
pub use generation::{GenerationGuard, Generations};
pub use persistence::{BoxFuture, Persistence, Row};
pub use session::TaggingSession;
pub use store::{AnnotationStore, PendingWrite};
