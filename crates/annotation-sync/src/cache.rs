//! Keyed record cache with optimistic-write bookkeeping.
//!
//! Each cache key ("segments of media X", "senses of word Y") owns an
//! [`Entry`]: the list currently shown to readers, the last version of every
//! record the store of record has confirmed, and the sequence numbers of the
//! writes still in flight per record. Those three are enough to settle
//! writes that complete in any order without ever letting an older result
//! overwrite newer local state.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use subtag_annotation::{Segment, Sense, SenseId};
use tokio::sync::watch;
use tokio::time::Instant;

pub(crate) type Snapshot<R> = Arc<Vec<R>>;

pub(crate) trait Record: Clone + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Display + Send + Sync + 'static;

    fn key(&self) -> Self::Key;

    fn order(a: &Self, b: &Self) -> Ordering;
}

impl Record for Segment {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        a.start_time.total_cmp(&b.start_time)
    }
}

impl Record for Sense {
    type Key = SenseId;

    fn key(&self) -> SenseId {
        self.id
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        a.id.cmp(&b.id)
    }
}

#[derive(Debug, Default)]
struct WriteTrack {
    in_flight: BTreeSet<u64>,
    last_confirmed: u64,
}

impl WriteTrack {
    fn has_newer_than(&self, seq: u64) -> bool {
        self.in_flight.range(seq + 1..).next().is_some()
    }
}

/// What happened to the visible value when a write settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settled {
    /// The write's own result is now the visible record.
    Applied,
    /// A newer write owns the visible record; only bookkeeping changed.
    Superseded,
    /// A failed write's record was restored to its last confirmed version.
    RolledBack,
    /// The result could not be placed safely; the entry must be re-fetched.
    MarkedStale,
}

pub(crate) struct Entry<R: Record> {
    records: Snapshot<R>,
    confirmed: HashMap<R::Key, R>,
    writes: HashMap<R::Key, WriteTrack>,
    fetched_at: Instant,
    stale: bool,
    refreshing: bool,
    epoch: u64,
}

impl<R: Record> Entry<R> {
    fn from_fetch(mut records: Vec<R>) -> Self {
        records.sort_by(R::order);
        let confirmed = records.iter().map(|r| (r.key(), r.clone())).collect();
        Self {
            records: Arc::new(records),
            confirmed,
            writes: HashMap::new(),
            fetched_at: Instant::now(),
            stale: false,
            refreshing: false,
            epoch: 0,
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot<R> {
        Arc::clone(&self.records)
    }

    pub(crate) fn get(&self, key: &R::Key) -> Option<&R> {
        self.records.iter().find(|r| &r.key() == key)
    }

    pub(crate) fn is_stale(&self) -> bool {
        self.stale
    }

    pub(crate) fn is_expired(&self, stale_after: Duration) -> bool {
        self.fetched_at.elapsed() >= stale_after
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Claim the background refresh slot. Returns `false` if a refresh is
    /// already running.
    pub(crate) fn start_refresh(&mut self) -> bool {
        !std::mem::replace(&mut self.refreshing, true)
    }

    pub(crate) fn end_refresh(&mut self) {
        self.refreshing = false;
    }

    fn pending(&self, key: &R::Key) -> bool {
        self.writes
            .get(key)
            .is_some_and(|track| !track.in_flight.is_empty())
    }

    /// Removed locally by a write the store of record has not settled yet.
    pub(crate) fn is_withdrawn(&self, key: &R::Key) -> bool {
        self.pending(key) && self.get(key).is_none()
    }

    pub(crate) fn begin_write(&mut self, seq: u64, key: R::Key) {
        self.writes.entry(key).or_default().in_flight.insert(seq);
    }

    pub(crate) fn put_local(&mut self, record: R) {
        let key = record.key();
        let records = Arc::make_mut(&mut self.records);
        match records.iter_mut().find(|r| r.key() == key) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        records.sort_by(R::order);
    }

    pub(crate) fn remove_local(&mut self, key: &R::Key) {
        Arc::make_mut(&mut self.records).retain(|r| &r.key() != key);
    }

    /// Settle a write the store of record accepted. `authoritative` is the
    /// confirmed row, or `None` for a confirmed removal.
    pub(crate) fn confirm(&mut self, seq: u64, key: R::Key, authoritative: Option<R>) -> Settled {
        self.epoch += 1;
        let track = self.writes.entry(key.clone()).or_default();
        track.in_flight.remove(&seq);

        if seq < track.last_confirmed {
            // An older write landed after a newer one was confirmed; the
            // remote order is unknown, so ask the store of record.
            self.stale = true;
            return Settled::MarkedStale;
        }
        track.last_confirmed = seq;
        let superseded = track.has_newer_than(seq);

        match &authoritative {
            Some(record) => self.confirmed.insert(key.clone(), record.clone()),
            None => self.confirmed.remove(&key),
        };

        if superseded {
            return Settled::Superseded;
        }
        match authoritative {
            Some(record) => self.put_local(record),
            None => self.remove_local(&key),
        }
        Settled::Applied
    }

    /// Settle a write the store of record refused (or could not confirm).
    pub(crate) fn reject(&mut self, seq: u64, key: R::Key) -> Settled {
        let track = self.writes.entry(key.clone()).or_default();
        track.in_flight.remove(&seq);

        if track.has_newer_than(seq) {
            self.stale = true;
            return Settled::MarkedStale;
        }

        match self.confirmed.get(&key).cloned() {
            Some(record) => self.put_local(record),
            None => self.remove_local(&key),
        }
        Settled::RolledBack
    }

    /// Merge a fresh fetch. The fetch becomes the confirmed baseline for
    /// every record; only the visible list keeps local versions of records
    /// with writes in flight.
    pub(crate) fn install_fetch(&mut self, fetched: Vec<R>) {
        self.confirmed = fetched.iter().map(|r| (r.key(), r.clone())).collect();

        let mut next: Vec<R> = Vec::with_capacity(fetched.len());
        for record in fetched {
            let key = record.key();
            if self.pending(&key) {
                if let Some(local) = self.get(&key) {
                    next.push(local.clone());
                }
                continue;
            }
            next.push(record);
        }
        for local in self.records.iter() {
            let key = local.key();
            if self.pending(&key) && !next.iter().any(|r| r.key() == key) {
                next.push(local.clone());
            }
        }
        next.sort_by(R::order);

        self.records = Arc::new(next);
        self.fetched_at = Instant::now();
        self.stale = false;
    }
}

struct Slot<R: Record> {
    entry: Option<Entry<R>>,
    tx: watch::Sender<Option<Snapshot<R>>>,
}

impl<R: Record> Slot<R> {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { entry: None, tx }
    }

    fn publish(&self) {
        self.tx
            .send_replace(self.entry.as_ref().map(Entry::snapshot));
    }
}

/// Cache entries for one record type, one per query key.
pub(crate) struct RecordCache<R: Record> {
    slots: HashMap<String, Slot<R>>,
}

impl<R: Record> RecordCache<R> {
    pub(crate) fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    pub(crate) fn entry(&self, key: &str) -> Option<&Entry<R>> {
        self.slots.get(key)?.entry.as_ref()
    }

    /// Bookkeeping access that does not notify subscribers.
    pub(crate) fn entry_mut(&mut self, key: &str) -> Option<&mut Entry<R>> {
        self.slots.get_mut(key)?.entry.as_mut()
    }

    pub(crate) fn subscribe(&mut self, key: &str) -> watch::Receiver<Option<Snapshot<R>>> {
        self.slots
            .entry(key.to_string())
            .or_insert_with(Slot::new)
            .tx
            .subscribe()
    }

    /// Install a fetch result: creates the entry or merges into it.
    pub(crate) fn install(&mut self, key: &str, records: Vec<R>) -> Snapshot<R> {
        let slot = self.slots.entry(key.to_string()).or_insert_with(Slot::new);
        match slot.entry.as_mut() {
            Some(entry) => entry.install_fetch(records),
            None => slot.entry = Some(Entry::from_fetch(records)),
        }
        slot.publish();
        slot.entry
            .as_ref()
            .map(Entry::snapshot)
            .unwrap_or_default()
    }

    /// Run `f` against an existing entry and publish the result to
    /// subscribers.
    pub(crate) fn update<T>(&mut self, key: &str, f: impl FnOnce(&mut Entry<R>) -> T) -> Option<T> {
        let slot = self.slots.get_mut(key)?;
        let out = f(slot.entry.as_mut()?);
        slot.publish();
        Some(out)
    }

    /// First cached record matching `pred`, with the key of its entry.
    pub(crate) fn find(&self, pred: impl Fn(&R) -> bool) -> Option<(String, R)> {
        self.slots.iter().find_map(|(key, slot)| {
            let entry = slot.entry.as_ref()?;
            entry
                .records
                .iter()
                .find(|r| pred(r))
                .map(|r| (key.clone(), r.clone()))
        })
    }

    /// Whether any entry is still waiting on a removal of `key`.
    pub(crate) fn withdrawn(&self, key: &R::Key) -> bool {
        self.slots
            .values()
            .filter_map(|slot| slot.entry.as_ref())
            .any(|entry| entry.is_withdrawn(key))
    }

    pub(crate) fn clear(&mut self) {
        for slot in self.slots.values_mut() {
            slot.entry = None;
            slot.publish();
        }
        self.slots.retain(|_, slot| slot.tx.receiver_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subtag_annotation::{SegmentId, Token};

    fn seg(ordinal: u32, text: &str) -> Segment {
        Segment::new(
            &SegmentId::new("m", ordinal),
            text,
            ordinal as f64,
            ordinal as f64 + 1.0,
        )
        .with_tokens(vec![Token::untagged(text)])
    }

    fn texts(entry: &Entry<Segment>) -> Vec<String> {
        entry.snapshot().iter().map(|s| s.text.clone()).collect()
    }

    #[test]
    fn rejected_write_rolls_back_to_confirmed() {
        let mut entry = Entry::from_fetch(vec![seg(0, "a")]);
        entry.begin_write(1, "m_0".into());
        entry.put_local(seg(0, "optimistic"));

        assert_eq!(entry.reject(1, "m_0".into()), Settled::RolledBack);
        assert_eq!(texts(&entry), vec!["a"]);
        assert!(!entry.is_stale());
    }

    #[test]
    fn older_confirmation_does_not_clobber_newer_local_state() {
        let mut entry = Entry::from_fetch(vec![seg(0, "a")]);
        entry.begin_write(1, "m_0".into());
        entry.put_local(seg(0, "first"));
        entry.begin_write(2, "m_0".into());
        entry.put_local(seg(0, "second"));

        assert_eq!(
            entry.confirm(1, "m_0".into(), Some(seg(0, "first"))),
            Settled::Superseded
        );
        assert_eq!(texts(&entry), vec!["second"]);

        assert_eq!(
            entry.confirm(2, "m_0".into(), Some(seg(0, "second"))),
            Settled::Applied
        );
        assert_eq!(texts(&entry), vec!["second"]);
    }

    #[test]
    fn late_older_confirmation_marks_stale() {
        let mut entry = Entry::from_fetch(vec![seg(0, "a")]);
        entry.begin_write(1, "m_0".into());
        entry.begin_write(2, "m_0".into());
        entry.put_local(seg(0, "second"));

        entry.confirm(2, "m_0".into(), Some(seg(0, "second")));
        assert_eq!(
            entry.confirm(1, "m_0".into(), Some(seg(0, "first"))),
            Settled::MarkedStale
        );
        assert!(entry.is_stale());
        assert_eq!(texts(&entry), vec!["second"]);
    }

    #[test]
    fn failure_under_newer_pending_write_marks_stale() {
        let mut entry = Entry::from_fetch(vec![seg(0, "a")]);
        entry.begin_write(1, "m_0".into());
        entry.begin_write(2, "m_0".into());
        entry.put_local(seg(0, "second"));

        assert_eq!(entry.reject(1, "m_0".into()), Settled::MarkedStale);
        assert_eq!(texts(&entry), vec!["second"]);
    }

    #[test]
    fn failure_after_older_pending_then_older_confirms() {
        let mut entry = Entry::from_fetch(vec![seg(0, "a")]);
        entry.begin_write(1, "m_0".into());
        entry.put_local(seg(0, "first"));
        entry.begin_write(2, "m_0".into());
        entry.put_local(seg(0, "second"));

        assert_eq!(entry.reject(2, "m_0".into()), Settled::RolledBack);
        assert_eq!(texts(&entry), vec!["a"]);

        assert_eq!(
            entry.confirm(1, "m_0".into(), Some(seg(0, "first"))),
            Settled::Applied
        );
        assert_eq!(texts(&entry), vec!["first"]);
    }

    #[test]
    fn rejected_insert_is_removed() {
        let mut entry = Entry::from_fetch(vec![seg(0, "a")]);
        entry.begin_write(1, "m_1".into());
        entry.put_local(seg(1, "new"));

        entry.reject(1, "m_1".into());
        assert_eq!(texts(&entry), vec!["a"]);
    }

    #[test]
    fn fetch_keeps_pending_local_versions() {
        let mut entry = Entry::from_fetch(vec![seg(0, "a"), seg(1, "b")]);
        entry.begin_write(1, "m_1".into());
        entry.put_local(seg(1, "local"));

        entry.install_fetch(vec![seg(0, "remote-a"), seg(1, "remote-b")]);
        assert_eq!(texts(&entry), vec!["remote-a", "local"]);

        entry.reject(1, "m_1".into());
        assert_eq!(texts(&entry), vec!["remote-a", "remote-b"]);
    }

    #[test]
    fn rollback_after_fetch_drops_records_the_store_no_longer_has() {
        let mut entry = Entry::from_fetch(vec![seg(0, "a"), seg(1, "b")]);
        entry.begin_write(1, "m_1".into());
        entry.put_local(seg(1, "local"));

        entry.install_fetch(vec![seg(0, "a")]);
        assert_eq!(texts(&entry), vec!["a", "local"]);

        assert_eq!(entry.reject(1, "m_1".into()), Settled::RolledBack);
        assert_eq!(texts(&entry), vec!["a"]);
    }

    #[test]
    fn pending_removal_is_withdrawn_until_settled() {
        let mut entry = Entry::from_fetch(vec![seg(0, "a"), seg(1, "b")]);
        entry.begin_write(1, "m_1".into());
        entry.remove_local(&"m_1".to_string());
        assert!(entry.is_withdrawn(&"m_1".to_string()));
        assert!(!entry.is_withdrawn(&"m_0".to_string()));

        entry.reject(1, "m_1".into());
        assert!(!entry.is_withdrawn(&"m_1".to_string()));
        assert_eq!(texts(&entry), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn subscribers_see_updates_and_clear() {
        let mut cache: RecordCache<Segment> = RecordCache::new();
        let mut rx = cache.subscribe("m");
        assert!(rx.borrow().is_none());

        cache.install("m", vec![seg(0, "a")]);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().len(), 1);

        cache.update("m", |entry| entry.put_local(seg(1, "b")));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().len(), 2);

        cache.clear();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }
}
