use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use subtag_annotation::{NewSense, Segment, SegmentUpdate, SenseId, SensePatch};
use tokio::sync::Mutex;

use super::{BoxFuture, Document, Persistence, PersistenceResult, Row};
use crate::PersistenceError;

/// In-process store of record with failure injection.
///
/// Writes can be made to fail outright, to "succeed" without returning a
/// row, or to finish after a scripted delay (useful with paused tokio time
/// to force out-of-order completions).
#[derive(Default)]
pub struct MemoryPersistence {
    doc: Mutex<Document>,
    fail_writes: AtomicUsize,
    drop_rows: AtomicBool,
    write_delays: Mutex<VecDeque<Duration>>,
    write_calls: AtomicUsize,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(doc: Document) -> Self {
        Self {
            doc: Mutex::new(doc),
            ..Self::default()
        }
    }

    /// The next `n` mutating calls fail with a transport error.
    pub fn fail_next_writes(&self, n: usize) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    /// Mutating calls apply but report no row back.
    pub fn drop_rows(&self, enabled: bool) {
        self.drop_rows.store(enabled, Ordering::SeqCst);
    }

    /// Queue a delay for the next mutating call that has none yet.
    pub async fn delay_next_write(&self, delay: Duration) {
        self.write_delays.lock().await.push_back(delay);
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Document {
        self.doc.lock().await.clone()
    }

    async fn write<T>(
        &self,
        apply: impl FnOnce(&mut Document) -> PersistenceResult<T>,
    ) -> PersistenceResult<T> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.write_delays.lock().await.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let fail = self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(PersistenceError::Transport("injected failure".into()));
        }

        let mut doc = self.doc.lock().await;
        apply(&mut doc)
    }

    async fn write_one(
        &self,
        apply: impl FnOnce(&mut Document) -> PersistenceResult<Option<Row>>,
    ) -> PersistenceResult<Option<Row>> {
        let row = self.write(apply).await?;
        if self.drop_rows.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(row)
    }
}

impl Persistence for MemoryPersistence {
    fn segments_by_media<'a>(
        &'a self,
        media_id: &'a str,
    ) -> BoxFuture<'a, PersistenceResult<Vec<Row>>> {
        Box::pin(async move { self.doc.lock().await.segments_by_media(media_id) })
    }

    fn segment<'a>(&'a self, id: &'a str) -> BoxFuture<'a, PersistenceResult<Option<Row>>> {
        Box::pin(async move { self.doc.lock().await.segment(id) })
    }

    fn upsert_segments<'a>(
        &'a self,
        segments: &'a [Segment],
    ) -> BoxFuture<'a, PersistenceResult<Vec<Row>>> {
        Box::pin(async move {
            let rows = self.write(|doc| doc.upsert_segments(segments)).await?;
            if self.drop_rows.load(Ordering::SeqCst) {
                return Ok(vec![]);
            }
            Ok(rows)
        })
    }

    fn update_segment<'a>(
        &'a self,
        id: &'a str,
        update: &'a SegmentUpdate,
    ) -> BoxFuture<'a, PersistenceResult<Option<Row>>> {
        Box::pin(self.write_one(move |doc| doc.update_segment(id, update)))
    }

    fn senses_by_word<'a>(&'a self, word: &'a str) -> BoxFuture<'a, PersistenceResult<Vec<Row>>> {
        Box::pin(async move { self.doc.lock().await.senses_by_word(word) })
    }

    fn senses<'a>(&'a self, ids: &'a [SenseId]) -> BoxFuture<'a, PersistenceResult<Vec<Row>>> {
        Box::pin(async move { self.doc.lock().await.senses(ids) })
    }

    fn create_sense<'a>(
        &'a self,
        sense: &'a NewSense,
    ) -> BoxFuture<'a, PersistenceResult<Option<Row>>> {
        Box::pin(self.write_one(move |doc| doc.create_sense(sense).map(Some)))
    }

    fn update_sense<'a>(
        &'a self,
        id: SenseId,
        patch: &'a SensePatch,
    ) -> BoxFuture<'a, PersistenceResult<Option<Row>>> {
        Box::pin(self.write_one(move |doc| doc.update_sense(id, patch)))
    }

    fn delete_sense<'a>(&'a self, id: SenseId) -> BoxFuture<'a, PersistenceResult<Option<Row>>> {
        Box::pin(self.write_one(move |doc| doc.delete_sense(id)))
    }
}
