//! Contract of the remote store of record.
//!
//! Every method is request/response. Rows come back as raw JSON so the store
//! can check their shape before trusting them; mutating calls return the
//! rows actually written, and `None` from one of them means the write could
//! not be confirmed.

mod document;
mod file;
mod memory;

use std::future::Future;
use std::pin::Pin;

use subtag_annotation::{NewSense, Segment, SegmentUpdate, SenseId, SensePatch};

use crate::PersistenceError;

pub use document::Document;
pub use file::JsonFilePersistence;
pub use memory::MemoryPersistence;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type Row = serde_json::Value;

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Object-safe via explicit `BoxFuture` returns; the store holds it as
/// `Arc<dyn Persistence>`.
pub trait Persistence: Send + Sync + 'static {
    /// All segments of a media item, ordered by start time.
    fn segments_by_media<'a>(
        &'a self,
        media_id: &'a str,
    ) -> BoxFuture<'a, PersistenceResult<Vec<Row>>>;

    fn segment<'a>(&'a self, id: &'a str) -> BoxFuture<'a, PersistenceResult<Option<Row>>>;

    /// Insert-or-replace keyed by segment id.
    fn upsert_segments<'a>(
        &'a self,
        segments: &'a [Segment],
    ) -> BoxFuture<'a, PersistenceResult<Vec<Row>>>;

    fn update_segment<'a>(
        &'a self,
        id: &'a str,
        update: &'a SegmentUpdate,
    ) -> BoxFuture<'a, PersistenceResult<Option<Row>>>;

    fn senses_by_word<'a>(&'a self, word: &'a str) -> BoxFuture<'a, PersistenceResult<Vec<Row>>>;

    fn senses<'a>(&'a self, ids: &'a [SenseId]) -> BoxFuture<'a, PersistenceResult<Vec<Row>>>;

    fn create_sense<'a>(
        &'a self,
        sense: &'a NewSense,
    ) -> BoxFuture<'a, PersistenceResult<Option<Row>>>;

    fn update_sense<'a>(
        &'a self,
        id: SenseId,
        patch: &'a SensePatch,
    ) -> BoxFuture<'a, PersistenceResult<Option<Row>>>;

    /// Returns the deleted row.
    fn delete_sense<'a>(&'a self, id: SenseId) -> BoxFuture<'a, PersistenceResult<Option<Row>>>;
}
