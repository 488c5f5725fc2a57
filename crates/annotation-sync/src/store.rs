//! Local-first view over the persistence service.
//!
//! Reads are served from per-key cache entries (segments per media id,
//! senses per owner word). Writes apply to the cached copy immediately and
//! are confirmed by a background task; the caller gets the optimistic value
//! right away plus a [`PendingWrite`] that resolves once the store of record
//! has answered. A failed write never leaves its optimistic value behind.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use subtag_annotation::{
    NewSense, Segment, SegmentId, SegmentUpdate, Sense, SenseId, SensePatch, ValidationError,
    edit, validate,
};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::cache::{Entry, Record, RecordCache, Settled, Snapshot};
use crate::persistence::{BoxFuture, Persistence};
use crate::{Error, PersistenceError, RecordKind, Result, SyncConfig, SyncEvent, SyncRuntime, verify};

/// Records settled by one write, paired with the value handed back to the
/// caller.
type Written<R, T> = (T, Vec<(<R as Record>::Key, Option<R>)>);

trait Cached: Record {
    const KIND: RecordKind;

    fn cache(inner: &Inner) -> &Mutex<RecordCache<Self>>;
}

impl Cached for Segment {
    const KIND: RecordKind = RecordKind::Segment;

    fn cache(inner: &Inner) -> &Mutex<RecordCache<Self>> {
        &inner.segments
    }
}

impl Cached for Sense {
    const KIND: RecordKind = RecordKind::Sense;

    fn cache(inner: &Inner) -> &Mutex<RecordCache<Self>> {
        &inner.senses
    }
}

struct Inner {
    persistence: Arc<dyn Persistence>,
    runtime: Arc<dyn SyncRuntime>,
    config: SyncConfig,
    segments: Mutex<RecordCache<Segment>>,
    senses: Mutex<RecordCache<Sense>>,
    seq: AtomicU64,
}

/// A write whose optimistic value is already visible.
///
/// Dropping it does not cancel the write; confirmation continues in the
/// background and failures are still reported through the runtime.
#[must_use = "the write is still pending; await `confirmed` to observe its outcome"]
pub struct PendingWrite<T> {
    handle: JoinHandle<Result<T>>,
}

impl<T> PendingWrite<T> {
    pub fn is_settled(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the store of record. Returns its confirmed value, or the
    /// error that caused the optimistic value to be withdrawn.
    pub async fn confirmed(self) -> Result<T> {
        self.handle.await.map_err(|_| Error::WriteAbandoned)?
    }
}

#[derive(Clone)]
pub struct AnnotationStore {
    inner: Arc<Inner>,
}

impl AnnotationStore {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        runtime: Arc<dyn SyncRuntime>,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                persistence,
                runtime,
                config,
                segments: Mutex::new(RecordCache::new()),
                senses: Mutex::new(RecordCache::new()),
                seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Drop every cached entry. Subscribers observe `None` until the next
    /// read repopulates their key. Writes still in flight settle against
    /// nothing.
    pub async fn clear(&self) {
        self.inner.segments.lock().await.clear();
        self.inner.senses.lock().await.clear();
        tracing::debug!("annotation_cache_cleared");
    }

    // Segments

    /// All segments of a media item ordered by start time.
    pub async fn segments(&self, media_id: &str) -> Result<Snapshot<Segment>> {
        self.read_through(media_id, || self.fetch_segments(media_id))
            .await
    }

    pub async fn subscribe_segments(
        &self,
        media_id: &str,
    ) -> watch::Receiver<Option<Snapshot<Segment>>> {
        self.inner.segments.lock().await.subscribe(media_id)
    }

    /// One segment by id. Served from the media's cache entry when it is
    /// loaded, otherwise fetched on its own.
    pub async fn segment(&self, id: &str) -> Result<Segment> {
        let media_id = parse_media_id(id)?;
        {
            let cache = self.inner.segments.lock().await;
            if let Some(entry) = cache.entry(&media_id).filter(|e| !e.is_stale()) {
                return entry
                    .get(&id.to_string())
                    .cloned()
                    .ok_or_else(|| Error::not_found(RecordKind::Segment, id));
            }
        }

        let row = self.inner.persistence.segment(id).await?;
        match row {
            Some(row) => Ok(verify::segment("segment", row)?),
            None => Err(Error::not_found(RecordKind::Segment, id)),
        }
    }

    pub async fn segment_exists(&self, id: &str) -> Result<bool> {
        match self.segment(id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn update_segment(
        &self,
        id: &str,
        update: SegmentUpdate,
    ) -> Result<(Segment, PendingWrite<Segment>)> {
        self.write_segment(id, |current| Ok((current.apply_update(&update), update)))
            .await
    }

    /// Apply a token edit to the current cached version of a segment.
    ///
    /// `edit` runs under the cache lock against the latest local state and
    /// may fail with an [`subtag_annotation::EditError`], in which case
    /// nothing is written. Only the resulting token list is persisted.
    pub async fn edit_segment<F>(&self, id: &str, edit: F) -> Result<(Segment, PendingWrite<Segment>)>
    where
        F: FnOnce(&Segment) -> subtag_annotation::Result<Segment>,
    {
        self.write_segment(id, |current| {
            let edited = edit(current)?;
            let update = SegmentUpdate::Tokens {
                tokens: edited.tokens().to_vec(),
            };
            Ok((current.apply_update(&update), update))
        })
        .await
    }

    /// Upsert a whole batch of segments for one media item.
    pub async fn replace_segments(
        &self,
        media_id: &str,
        mut batch: Vec<Segment>,
    ) -> Result<PendingWrite<Vec<Segment>>> {
        validate::sort_by_start(&mut batch);
        validate::segments(&batch)?;
        for segment in &batch {
            let owner = parse_media_id(&segment.id)?;
            if owner != media_id {
                return Err(Error::ForeignSegment {
                    id: segment.id.clone(),
                    media_id: media_id.to_string(),
                });
            }
        }

        self.segments(media_id).await?;

        let seq = self.next_seq();
        let keys: Vec<String> = batch.iter().map(|s| s.id.clone()).collect();
        {
            let mut cache = self.inner.segments.lock().await;
            cache.update(media_id, |entry| {
                for segment in &batch {
                    entry.begin_write(seq, segment.id.clone());
                    entry.put_local(segment.clone());
                }
            });
        }
        tracing::debug!(media_id, seq, count = batch.len(), "segment_batch_write_started");

        let persistence = Arc::clone(&self.inner.persistence);
        let expected = keys.clone();
        let call: BoxFuture<'static, Result<Written<Segment, Vec<Segment>>>> = Box::pin(async move {
            const OP: &str = "upsert_segments";
            let rows = persistence.upsert_segments(&batch).await?;
            let written = verify::segments(OP, rows)?;
            if expected.iter().any(|id| !written.iter().any(|s| &s.id == id)) {
                return Err(PersistenceError::MissingRow { operation: OP }.into());
            }
            let settled = written
                .iter()
                .map(|s| (s.id.clone(), Some(s.clone())))
                .collect();
            Ok((written, settled))
        });

        Ok(self.spawn_write(media_id.to_string(), seq, keys, call))
    }

    // Senses

    pub async fn senses_for_word(&self, word: &str) -> Result<Snapshot<Sense>> {
        self.read_through(word, || self.fetch_senses_for_word(word))
            .await
    }

    pub async fn subscribe_senses(&self, word: &str) -> watch::Receiver<Option<Snapshot<Sense>>> {
        self.inner.senses.lock().await.subscribe(word)
    }

    pub async fn sense(&self, id: SenseId) -> Result<Sense> {
        let cached = self.inner.senses.lock().await.find(|s| s.id == id);
        if let Some((_, sense)) = cached {
            return Ok(sense);
        }

        let rows = self.inner.persistence.senses(&[id]).await?;
        verify::senses("senses", rows)?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::not_found(RecordKind::Sense, id))
    }

    /// Senses for the given ids that still exist. Unknown ids are skipped,
    /// and so are senses whose deletion is still being confirmed.
    pub async fn senses(&self, ids: &[SenseId]) -> Result<Vec<Sense>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let rows = self.inner.persistence.senses(ids).await?;
        let mut found = verify::senses("senses", rows)?;

        let cache = self.inner.senses.lock().await;
        found.retain(|sense| !cache.withdrawn(&sense.id));
        for sense in found.iter_mut() {
            if let Some((_, local)) = cache.find(|s| s.id == sense.id) {
                *sense = local;
            }
        }
        Ok(found)
    }

    /// Created senses are not optimistic: the id comes from the store of
    /// record, so this waits for it.
    pub async fn create_sense(&self, sense: NewSense) -> Result<Sense> {
        validate::sense(&sense.clone().into_sense(0))?;

        let row = self.inner.persistence.create_sense(&sense).await;
        let created = match row {
            Ok(row) => verify::sense("create_sense", verify::required("create_sense", row)?)?,
            Err(e) => {
                tracing::error!(owner_word = %sense.owner_word, error = %e, "sense_create_failed");
                return Err(e.into());
            }
        };

        let seq = self.next_seq();
        let mut cache = self.inner.senses.lock().await;
        cache.update(&created.owner_word, |entry| {
            entry.confirm(seq, created.id, Some(created.clone()))
        });
        tracing::debug!(sense_id = created.id, owner_word = %created.owner_word, "sense_created");
        Ok(created)
    }

    pub async fn update_sense(
        &self,
        id: SenseId,
        patch: SensePatch,
    ) -> Result<(Sense, PendingWrite<Sense>)> {
        let word = self.sense(id).await?.owner_word;
        self.senses_for_word(&word).await?;

        let seq = self.next_seq();
        let optimistic = {
            let mut cache = self.inner.senses.lock().await;
            let current = cache
                .entry(&word)
                .and_then(|e| e.get(&id))
                .cloned()
                .ok_or_else(|| Error::not_found(RecordKind::Sense, id))?;
            let next = current.apply_patch(&patch);
            validate::sense(&next)?;
            cache.update(&word, |entry| {
                entry.begin_write(seq, id);
                entry.put_local(next.clone());
            });
            next
        };

        let persistence = Arc::clone(&self.inner.persistence);
        let call: BoxFuture<'static, Result<Written<Sense, Sense>>> = Box::pin(async move {
            const OP: &str = "update_sense";
            let row = persistence.update_sense(id, &patch).await?;
            let sense = verify::sense(OP, verify::required(OP, row)?)?;
            Ok((sense.clone(), vec![(id, Some(sense))]))
        });

        Ok((optimistic, self.spawn_write(word, seq, vec![id], call)))
    }

    /// Removes the sense locally right away. Tokens still pointing at it
    /// read as untagged through [`AnnotationStore::resolve_senses`].
    pub async fn delete_sense(&self, id: SenseId) -> Result<PendingWrite<()>> {
        let word = self.sense(id).await?.owner_word;
        self.senses_for_word(&word).await?;

        let seq = self.next_seq();
        {
            let mut cache = self.inner.senses.lock().await;
            cache.update(&word, |entry| {
                entry.begin_write(seq, id);
                entry.remove_local(&id);
            });
        }

        let persistence = Arc::clone(&self.inner.persistence);
        let call: BoxFuture<'static, Result<Written<Sense, ()>>> = Box::pin(async move {
            const OP: &str = "delete_sense";
            let row = persistence.delete_sense(id).await?;
            verify::sense(OP, verify::required(OP, row)?)?;
            Ok(((), vec![(id, None)]))
        });

        Ok(self.spawn_write(word, seq, vec![id], call))
    }

    /// Copy of `segment` with references to senses that no longer exist
    /// cleared.
    pub async fn resolve_senses(&self, segment: &Segment) -> Result<Segment> {
        let referenced: Vec<SenseId> = segment
            .tokens()
            .iter()
            .filter_map(|t| t.sense_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if referenced.is_empty() {
            return Ok(segment.clone());
        }

        let known: HashSet<SenseId> = self
            .senses(&referenced)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        Ok(edit::detach_senses(segment, &known))
    }

    fn next_seq(&self) -> u64 {
        self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn fetch_segments(&self, media_id: &str) -> BoxFuture<'static, Result<Vec<Segment>>> {
        let persistence = Arc::clone(&self.inner.persistence);
        let media_id = media_id.to_string();
        Box::pin(async move {
            let rows = persistence.segments_by_media(&media_id).await?;
            Ok(verify::segments("segments_by_media", rows)?)
        })
    }

    fn fetch_senses_for_word(&self, word: &str) -> BoxFuture<'static, Result<Vec<Sense>>> {
        let persistence = Arc::clone(&self.inner.persistence);
        let word = word.to_string();
        Box::pin(async move {
            let rows = persistence.senses_by_word(&word).await?;
            Ok(verify::senses("senses_by_word", rows)?)
        })
    }

    /// Serve `key` from cache, fetching it if absent or stale. An entry past
    /// its age limit is served as-is and refreshed in the background.
    ///
    /// The cache lock is not held while the store of record answers. If the
    /// entry changed in the meantime, a fresh entry installed by someone else
    /// wins; a still-stale one is fetched again.
    async fn read_through<R, F>(&self, key: &str, fetch: F) -> Result<Snapshot<R>>
    where
        R: Cached,
        F: Fn() -> BoxFuture<'static, Result<Vec<R>>>,
    {
        let stale_after = self.inner.config.stale_after();
        loop {
            let observed = {
                let mut cache = R::cache(&self.inner).lock().await;
                if let Some(entry) = cache.entry_mut(key).filter(|e| !e.is_stale()) {
                    let snapshot = entry.snapshot();
                    if entry.is_expired(stale_after) && entry.start_refresh() {
                        tracing::debug!(kind = %R::KIND, cache_key = key, "background_refresh_started");
                        self.spawn_refresh(key.to_string(), entry.epoch(), fetch());
                    } else {
                        tracing::debug!(kind = %R::KIND, cache_key = key, "cache_hit");
                    }
                    return Ok(snapshot);
                }
                cache.entry(key).map(Entry::epoch)
            };

            tracing::debug!(kind = %R::KIND, cache_key = key, "cache_miss");
            let fetched = fetch().await?;

            let mut cache = R::cache(&self.inner).lock().await;
            match cache.entry(key).map(|e| (e.epoch(), e.is_stale(), e.snapshot())) {
                Some((epoch, _, _)) if Some(epoch) == observed => {}
                None => {}
                Some((_, false, snapshot)) => return Ok(snapshot),
                Some((_, true, _)) => {
                    tracing::debug!(kind = %R::KIND, cache_key = key, "fetch_raced_write");
                    continue;
                }
            }
            return Ok(cache.install(key, fetched));
        }
    }

    fn spawn_refresh<R: Cached>(
        &self,
        key: String,
        epoch: u64,
        fetch: BoxFuture<'static, Result<Vec<R>>>,
    ) {
        let store = self.clone();
        tokio::spawn(async move {
            let result = fetch.await;

            let mut cache = R::cache(&store.inner).lock().await;
            let current_epoch = cache.entry(&key).map(Entry::epoch);
            if let Some(entry) = cache.entry_mut(&key) {
                entry.end_refresh();
            }

            match result {
                Ok(records) if current_epoch == Some(epoch) => {
                    cache.install(&key, records);
                    tracing::debug!(kind = %R::KIND, cache_key = %key, "background_refresh_applied");
                }
                Ok(_) => {
                    // A write was confirmed while the fetch ran; its result
                    // may predate that write.
                    tracing::debug!(kind = %R::KIND, cache_key = %key, "background_refresh_discarded");
                }
                Err(e) => {
                    tracing::warn!(kind = %R::KIND, cache_key = %key, error = %e, "background_refresh_failed");
                    store.inner.runtime.emit(SyncEvent::RefreshFailed {
                        cache_key: key.clone(),
                        error: e.to_string(),
                    });
                }
            }
        });
    }

    /// Run `call` in the background and settle every record in `keys`
    /// against the cache entry for `cache_key` once it answers.
    fn spawn_write<R: Cached, T: Send + 'static>(
        &self,
        cache_key: String,
        seq: u64,
        keys: Vec<R::Key>,
        call: BoxFuture<'static, Result<Written<R, T>>>,
    ) -> PendingWrite<T> {
        let store = self.clone();
        let handle = tokio::spawn(async move {
            let outcome = call.await;

            let mut cache = R::cache(&store.inner).lock().await;
            match outcome {
                Ok((value, settled)) => {
                    for (key, record) in settled {
                        let record_id = key.to_string();
                        let result = cache.update(&cache_key, |entry| entry.confirm(seq, key, record));
                        if result == Some(Settled::MarkedStale) {
                            tracing::debug!(kind = %R::KIND, cache_key = %cache_key, record_id = %record_id, seq, "write_confirmed_out_of_order");
                        }
                        store.inner.runtime.emit(SyncEvent::WriteConfirmed {
                            cache_key: cache_key.clone(),
                            record_id,
                        });
                    }
                    Ok(value)
                }
                Err(error) => {
                    for key in keys {
                        let record_id = key.to_string();
                        let result = cache.update(&cache_key, |entry| entry.reject(seq, key));
                        let rolled_back = result == Some(Settled::RolledBack);
                        tracing::error!(
                            kind = %R::KIND,
                            cache_key = %cache_key,
                            record_id = %record_id,
                            seq,
                            rolled_back,
                            error = %error,
                            "write_failed"
                        );
                        store.inner.runtime.emit(SyncEvent::WriteFailed {
                            cache_key: cache_key.clone(),
                            record_id,
                            error: error.to_string(),
                            rolled_back,
                        });
                    }
                    Err(error)
                }
            }
        });
        PendingWrite { handle }
    }

    async fn write_segment<B>(&self, id: &str, build: B) -> Result<(Segment, PendingWrite<Segment>)>
    where
        B: FnOnce(&Segment) -> Result<(Segment, SegmentUpdate)>,
    {
        let media_id = parse_media_id(id)?;
        self.segments(&media_id).await?;

        let seq = self.next_seq();
        let (optimistic, update) = {
            let mut cache = self.inner.segments.lock().await;
            let current = cache
                .entry(&media_id)
                .and_then(|e| e.get(&id.to_string()))
                .cloned()
                .ok_or_else(|| Error::not_found(RecordKind::Segment, id))?;
            let (next, update) = build(&current)?;
            validate::segment(&next)?;
            cache.update(&media_id, |entry| {
                entry.begin_write(seq, id.to_string());
                entry.put_local(next.clone());
            });
            (next, update)
        };
        tracing::debug!(segment_id = id, seq, "segment_write_started");

        let persistence = Arc::clone(&self.inner.persistence);
        let record_id = id.to_string();
        let call: BoxFuture<'static, Result<Written<Segment, Segment>>> = Box::pin(async move {
            const OP: &str = "update_segment";
            let row = persistence.update_segment(&record_id, &update).await?;
            let segment = verify::segment(OP, verify::required(OP, row)?)?;
            if segment.id != record_id {
                return Err(PersistenceError::MalformedRow {
                    operation: OP,
                    reason: format!("expected row {record_id}, got {}", segment.id),
                }
                .into());
            }
            Ok((segment.clone(), vec![(record_id, Some(segment))]))
        });

        Ok((optimistic, self.spawn_write(media_id, seq, vec![id.to_string()], call)))
    }
}

fn parse_media_id(id: &str) -> Result<String> {
    let parsed = SegmentId::parse(id).map_err(ValidationError::from)?;
    Ok(parsed.media_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelRuntime;
    use crate::Row;
    use crate::persistence::{MemoryPersistence, PersistenceResult};
    use subtag_annotation::Token;
    use tracing_test::traced_test;

    fn seeded() -> (AnnotationStore, Arc<MemoryPersistence>) {
        let persistence = Arc::new(MemoryPersistence::new());
        let (runtime, _rx) = ChannelRuntime::new();
        let store = AnnotationStore::new(
            persistence.clone(),
            Arc::new(runtime),
            SyncConfig::default(),
        );
        (store, persistence)
    }

    fn seg(ordinal: u32, words: &[&str]) -> Segment {
        Segment::new(
            &SegmentId::new("m", ordinal),
            words.join(" "),
            ordinal as f64 * 2.0,
            ordinal as f64 * 2.0 + 1.5,
        )
        .with_tokens(words.iter().map(|w| Token::untagged(*w)).collect())
    }

    #[tokio::test]
    async fn edit_validation_happens_before_any_write() {
        let (store, persistence) = seeded();
        persistence.upsert_segments(&[seg(0, &["a"])]).await.unwrap();

        let err = store
            .edit_segment("m_0", |s| edit::split_token(s, 0, 1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Edit(_)));
        assert_eq!(persistence.write_calls(), 1);
    }

    #[tokio::test]
    async fn optimistic_value_is_visible_before_confirmation() {
        let (store, persistence) = seeded();
        persistence.upsert_segments(&[seg(0, &["a", "b"])]).await.unwrap();

        let (optimistic, pending) = store
            .edit_segment("m_0", |s| edit::merge_tokens(s, 0, 1))
            .await
            .unwrap();
        assert_eq!(optimistic.tokens().len(), 1);
        assert_eq!(store.segment("m_0").await.unwrap(), optimistic);

        let confirmed = pending.confirmed().await.unwrap();
        assert_eq!(confirmed, optimistic);
    }

    #[tokio::test]
    #[traced_test]
    async fn reads_and_writes_are_traced() {
        let (store, persistence) = seeded();
        persistence.upsert_segments(&[seg(0, &["a"])]).await.unwrap();

        store.segments("m").await.unwrap();
        assert!(logs_contain("cache_miss"));
        store.segments("m").await.unwrap();
        assert!(logs_contain("cache_hit"));

        let (_, pending) = store
            .edit_segment("m_0", |s| edit::tag_token(s, 0, 1))
            .await
            .unwrap();
        assert!(logs_contain("segment_write_started"));
        pending.confirmed().await.unwrap();
    }

    /// Fetches for `slow` media take ten seconds; everything else answers
    /// straight away.
    struct SlowMedia {
        inner: MemoryPersistence,
    }

    impl Persistence for SlowMedia {
        fn segments_by_media<'a>(
            &'a self,
            media_id: &'a str,
        ) -> BoxFuture<'a, PersistenceResult<Vec<Row>>> {
            Box::pin(async move {
                if media_id == "slow" {
                    tokio::time::sleep(std::time::Duration::from_secs(10)).await;
                }
                self.inner.segments_by_media(media_id).await
            })
        }

        fn segment<'a>(
            &'a self,
            id: &'a str,
        ) -> BoxFuture<'a, PersistenceResult<Option<Row>>> {
            self.inner.segment(id)
        }

        fn upsert_segments<'a>(
            &'a self,
            segments: &'a [Segment],
        ) -> BoxFuture<'a, PersistenceResult<Vec<Row>>> {
            self.inner.upsert_segments(segments)
        }

        fn update_segment<'a>(
            &'a self,
            id: &'a str,
            update: &'a SegmentUpdate,
        ) -> BoxFuture<'a, PersistenceResult<Option<Row>>> {
            self.inner.update_segment(id, update)
        }

        fn senses_by_word<'a>(
            &'a self,
            word: &'a str,
        ) -> BoxFuture<'a, PersistenceResult<Vec<Row>>> {
            self.inner.senses_by_word(word)
        }

        fn senses<'a>(
            &'a self,
            ids: &'a [SenseId],
        ) -> BoxFuture<'a, PersistenceResult<Vec<Row>>> {
            self.inner.senses(ids)
        }

        fn create_sense<'a>(
            &'a self,
            sense: &'a NewSense,
        ) -> BoxFuture<'a, PersistenceResult<Option<Row>>> {
            self.inner.create_sense(sense)
        }

        fn update_sense<'a>(
            &'a self,
            id: SenseId,
            patch: &'a SensePatch,
        ) -> BoxFuture<'a, PersistenceResult<Option<Row>>> {
            self.inner.update_sense(id, patch)
        }

        fn delete_sense<'a>(
            &'a self,
            id: SenseId,
        ) -> BoxFuture<'a, PersistenceResult<Option<Row>>> {
            self.inner.delete_sense(id)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_does_not_block_other_media() {
        let persistence = Arc::new(SlowMedia {
            inner: MemoryPersistence::new(),
        });
        persistence
            .upsert_segments(&[seg(0, &["a"])])
            .await
            .unwrap();
        let (runtime, _rx) = ChannelRuntime::new();
        let store = AnnotationStore::new(persistence, Arc::new(runtime), SyncConfig::default());
        store.segments("m").await.unwrap();

        let slow = {
            let store = store.clone();
            tokio::spawn(async move { store.segments("slow").await })
        };
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        let started = tokio::time::Instant::now();
        let (optimistic, pending) = store
            .edit_segment("m_0", |s| edit::tag_token(s, 0, 1))
            .await
            .unwrap();
        assert_eq!(optimistic.tokens()[0].sense_id, Some(1));
        assert_eq!(store.segment("m_0").await.unwrap(), optimistic);
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        pending.confirmed().await.unwrap();
        assert!(slow.await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_rejects_foreign_ids() {
        let (store, _) = seeded();
        let foreign = Segment::new(&SegmentId::new("other", 0), "x", 0.0, 1.0);
        assert!(matches!(
            store.replace_segments("m", vec![foreign]).await,
            Err(Error::ForeignSegment { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_segment_is_not_found() {
        let (store, _) = seeded();
        assert!(store.segment("m_7").await.unwrap_err().is_not_found());
        assert!(!store.segment_exists("m_7").await.unwrap());
        assert!(matches!(
            store.segment_exists("no-ordinal").await,
            Err(Error::Validation(_))
        ));
    }
}
