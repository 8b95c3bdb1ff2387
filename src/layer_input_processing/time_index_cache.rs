//! Helpers for frame history bookkeeping.
//!
//! Frames arrive from a decoder in capture order. We keep all of them and
//! need to find them again either by their ordinal index or by (approximate)
//! capture time.
//!
//! See [`TimeIndexCache`] and [`IndexTime`].

use super::f64::Seconds;
use core::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use thiserror::Error;

/// Possible errors when inserting into a [`TimeIndexCache`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InsertError {
    #[error("timestamp {0} is not a valid capture time")]
    InvalidTime(f64),
    #[error("timestamp {time} is not strictly after the last cached timestamp {last}")]
    NotIncreasing { time: Seconds, last: Seconds },
}

/// Ordinal index of a frame together with its capture time.
#[derive(Copy, Clone, Debug)]
pub struct IndexTime {
    /// Position in capture order, starting at 0.
    pub index: i64,
    /// Capture time.
    pub time: Seconds,
}

impl PartialEq for IndexTime {
    fn eq(&self, other: &Self) -> bool {
        self.index.eq(&other.index)
    }
}

impl PartialOrd for IndexTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for IndexTime {}

impl Ord for IndexTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

/// Counters for diagnostics only.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of successful inserts.
    pub inserts: u64,
    /// Number of time queries that resolved to a frame.
    pub time_hits: u64,
}

#[derive(Debug)]
struct CacheState<T> {
    /// Storage slots in insertion order.
    elems: Vec<(Arc<T>, IndexTime)>,
    time_to_index: BTreeMap<Seconds, i64>,
    index_to_time: BTreeMap<i64, Seconds>,
    index_to_slot: BTreeMap<i64, usize>,
    /// Largest cached timestamp. New timestamps must be strictly greater.
    last_time: Option<Seconds>,
    stats: CacheStats,
}

impl<T> CacheState<T> {
    fn new() -> Self {
        Self {
            elems: Vec::new(),
            time_to_index: BTreeMap::new(),
            index_to_time: BTreeMap::new(),
            index_to_slot: BTreeMap::new(),
            last_time: None,
            stats: CacheStats::default(),
        }
    }

    /// Hands out the next index if `time` continues the strictly increasing
    /// timeline.
    fn next_index_time(&self, time: Seconds) -> Result<IndexTime, InsertError> {
        if let Some(last) = self.last_time {
            if time <= last {
                return Err(InsertError::NotIncreasing { time, last });
            }
        }
        let index = self
            .index_to_time
            .last_key_value()
            .map_or(0, |(&index, _)| index + 1);
        Ok(IndexTime { index, time })
    }

    fn store(&mut self, elem: Arc<T>, it: IndexTime) {
        assert!(
            !self.index_to_slot.contains_key(&it.index),
            "index {} is already cached",
            it.index
        );
        assert!(
            !self.time_to_index.contains_key(&it.time),
            "time {} is already cached",
            it.time
        );

        self.elems.push((elem, it));
        self.time_to_index.insert(it.time, it.index);
        self.index_to_time.insert(it.index, it.time);
        self.index_to_slot.insert(it.index, self.elems.len() - 1);
        if self.last_time.map_or(true, |last| it.time > last) {
            self.last_time = Some(it.time);
        }
        self.stats.inserts += 1;
    }

    /// Resolves the index of the frame nearest to `query`.
    ///
    /// Looks for the first cached time that is not before `query`. If there
    /// is a predecessor, the closer one of both wins; on equal distance the
    /// later frame wins. Queries past the last frame resolve to the last
    /// frame.
    fn nearest_index(&mut self, query: Seconds) -> Option<i64> {
        let (&at_or_after_time, &at_or_after) = match self.time_to_index.range(query..).next() {
            Some(entry) => entry,
            None => {
                let (_, &last) = self.time_to_index.iter().next_back()?;
                self.stats.time_hits += 1;
                return Some(last);
            }
        };
        self.stats.time_hits += 1;

        let before = self.time_to_index.range(..query).next_back();
        let index = match before {
            None => at_or_after,
            Some((&before_time, &before_index)) => {
                if query.abs_diff(before_time) < at_or_after_time.abs_diff(query) {
                    before_index
                } else {
                    at_or_after
                }
            }
        };
        Some(index)
    }

    fn elem_at_index(&self, index: i64) -> Option<Arc<T>> {
        let &slot = self.index_to_slot.get(&index)?;
        assert!(slot < self.elems.len());
        Some(self.elems[slot].0.clone())
    }
}

/// Ordered cache of frames keyed by strictly increasing capture time.
///
/// Maintains a bijection between ordinal index and capture time. Elements
/// are copied on insert and immutable afterwards. There is no internal
/// sorting: the source must deliver elements in capture order, others are
/// rejected.
///
/// One mutex guards all state. The blocking accessors wait for the lock; the
/// `try_*` accessors treat a contended lock as "not found". Callers therefore
/// must not assume linear consistency for the `try_*` family under
/// contention, only memory safety.
#[derive(Debug)]
pub struct TimeIndexCache<T> {
    state: Mutex<CacheState<T>>,
}

impl<T> Default for TimeIndexCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimeIndexCache<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
        // The state is consistent after every completed operation, so a
        // poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validates a lookup time. Unlike inserted timestamps, queries may lie
    /// before zero; they resolve to the first element.
    fn query_time(time: f64) -> Option<Seconds> {
        if !time.is_finite() {
            return None;
        }
        Seconds::try_from(time.max(0.0)).ok()
    }

    fn try_lock(&self) -> Option<MutexGuard<'_, CacheState<T>>> {
        match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Inserts an already shared element with an explicit, pre-validated
    /// index/time pair.
    ///
    /// This is meant for bulk insertion where the caller guarantees unique
    /// indices and times. Violating this is a bug and panics.
    pub fn insert_at(&self, elem: Arc<T>, index_time: IndexTime) {
        self.lock().store(elem, index_time);
    }

    /// Number of cached elements.
    pub fn count(&self) -> usize {
        self.lock().elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// The largest cached capture time.
    pub fn last_time(&self) -> Option<Seconds> {
        self.lock().last_time
    }

    /// Returns the capture time of the element with the given index.
    pub fn time_of_index(&self, index: i64) -> Option<Seconds> {
        self.lock().index_to_time.get(&index).copied()
    }

    /// Returns the element with the given ordinal index.
    pub fn get_frame_at_index(&self, index: i64) -> Option<Arc<T>> {
        self.lock().elem_at_index(index)
    }

    /// Non-blocking variant of [`Self::get_frame_at_index`].
    pub fn try_get_frame_at_index(&self, index: i64) -> Option<Arc<T>> {
        self.try_lock()?.elem_at_index(index)
    }

    /// Returns the element captured nearest to `time`.
    ///
    /// Returns `None` if the cache is empty or `time` is not finite. Every resolved query counts as a hit in [`CacheStats`].
    pub fn get_frame_at_time(&self, time: f64) -> Option<Arc<T>> {
        let query = Self::query_time(time)?;
        let mut state = self.lock();
        let index = state.nearest_index(query)?;
        state.elem_at_index(index)
    }

    /// Non-blocking variant of [`Self::get_frame_at_time`].
    pub fn try_get_frame_at_time(&self, time: f64) -> Option<Arc<T>> {
        let query = Self::query_time(time)?;
        let mut state = self.try_lock()?;
        let index = state.nearest_index(query)?;
        state.elem_at_index(index)
    }

    /// Probes for an element with the given index.
    pub fn has_frame_at_index(&self, index: i64) -> bool {
        self.lock().index_to_slot.contains_key(&index)
    }

    /// Probes for an element near `time` with the same lookup as
    /// [`Self::get_frame_at_time`].
    pub fn has_frame_at_time(&self, time: f64) -> bool {
        self.index_from_time(time).is_some()
    }

    /// Ordinal index of the element captured nearest to `time`, or `None` if
    /// the cache is empty or `time` is not finite.
    pub fn index_from_time(&self, time: f64) -> Option<i64> {
        let query = Self::query_time(time)?;
        self.lock().nearest_index(query)
    }

    /// Snapshot of all elements in index order.
    pub fn frames(&self) -> Vec<(IndexTime, Arc<T>)> {
        let state = self.lock();
        state
            .index_to_slot
            .values()
            .map(|&slot| {
                let (elem, it) = &state.elems[slot];
                (*it, elem.clone())
            })
            .collect()
    }

    /// Returns a copy of the diagnostic counters.
    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }
}

impl<T: Clone> TimeIndexCache<T> {
    /// Inserts a copy of `elem` captured at `time` (seconds).
    ///
    /// Fails without side effects if `time` is not a valid timestamp or not
    /// strictly greater than every cached timestamp. On success, the element
    /// gets the next ordinal index, which is returned.
    pub fn insert(&self, elem: &T, time: f64) -> Result<IndexTime, InsertError> {
        let time = Seconds::try_from(time).map_err(|_| InsertError::InvalidTime(time))?;
        let mut state = self.lock();
        let index_time = state.next_index_time(time).inspect_err(|e| {
            log::debug!("Rejecting frame: {e}");
        })?;
        state.store(Arc::new(elem.clone()), index_time);
        Ok(index_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;
    use std::thread;

    fn cache_with_times(times: &[f64]) -> TimeIndexCache<u32> {
        let cache = TimeIndexCache::new();
        for (i, &time) in times.iter().enumerate() {
            cache.insert(&(i as u32), time).unwrap();
        }
        cache
    }

    #[test]
    fn is_send_and_sync() {
        fn accept<I: Send + Sync>() {}

        accept::<TimeIndexCache<crate::Frame>>();
    }

    #[test]
    fn insert_assigns_increasing_indices() {
        let cache = TimeIndexCache::new();
        for (i, time) in [0.0, 0.5, 1.0, 1.5].into_iter().enumerate() {
            let it = cache.insert(&"frame", time).unwrap();
            check!(it.index == i as i64);
            check!(it.time.raw() == time);
        }
        check!(cache.count() == 4);
        check!(cache.time_of_index(2).map(Seconds::raw) == Some(1.0));
        check!(cache.last_time().map(Seconds::raw) == Some(1.5));
        check!(cache.stats().inserts == 4);
    }

    #[test]
    fn out_of_order_insert_is_rejected() {
        let cache = TimeIndexCache::new();
        check!(cache.insert(&1, 0.0).is_ok());
        check!(cache.insert(&2, 0.1).is_ok());
        check!(matches!(
            cache.insert(&3, 0.05),
            Err(InsertError::NotIncreasing { .. })
        ));
        check!(cache.count() == 2);

        // Equal time is not strictly increasing either.
        check!(cache.insert(&4, 0.1).is_err());
        check!(matches!(
            cache.insert(&5, f64::NAN),
            Err(InsertError::InvalidTime(_))
        ));
        check!(cache.count() == 2);
        check!(!cache.has_frame_at_index(2));
    }

    #[test]
    fn nearest_match_lookup() {
        let cache = cache_with_times(&[1.0, 2.0, 4.0]);

        // Before all entries: first one.
        check!(cache.get_frame_at_time(0.0).as_deref() == Some(&0));
        // Exact hits.
        check!(cache.get_frame_at_time(2.0).as_deref() == Some(&1));
        // Closer to the earlier candidate.
        check!(cache.get_frame_at_time(2.9).as_deref() == Some(&1));
        // Closer to the later candidate.
        check!(cache.get_frame_at_time(3.1).as_deref() == Some(&2));
        // Tie favors the later entry.
        check!(cache.get_frame_at_time(3.0).as_deref() == Some(&2));
        check!(cache.get_frame_at_time(1.5).as_deref() == Some(&1));
        // Past the end: last one.
        check!(cache.get_frame_at_time(100.0).as_deref() == Some(&2));

        check!(cache.stats().time_hits == 7);
    }

    #[test]
    fn index_and_time_lookups_agree() {
        let times = [0.0, 0.033, 0.066, 0.1, 0.133];
        let cache = cache_with_times(&times);
        for query in [0.0, 0.01, 0.02, 0.05, 0.07, 0.12, 0.2] {
            let index = cache.index_from_time(query).unwrap();
            check!(
                cache.get_frame_at_index(index) == cache.get_frame_at_time(query),
                "query {query}"
            );
            check!(cache.has_frame_at_time(query));
        }
    }

    #[test]
    fn empty_cache_misses() {
        let cache = TimeIndexCache::<u8>::new();
        check!(cache.index_from_time(1.0) == None);
        check!(cache.get_frame_at_time(1.0) == None);
        check!(cache.get_frame_at_index(0) == None);
        check!(!cache.has_frame_at_time(0.0));
        check!(cache.stats().time_hits == 0);
    }

    #[test]
    fn insert_at_with_explicit_index_time() {
        let cache = TimeIndexCache::new();
        for i in 0..3_i64 {
            let time = Seconds::try_from(i as f64 * 0.25).unwrap();
            cache.insert_at(Arc::new(i), IndexTime { index: i, time });
        }
        check!(cache.count() == 3);
        check!(cache.get_frame_at_time(0.3).as_deref() == Some(&1));
        // The regular insert continues the timeline.
        check!(cache.insert(&3, 0.75).map(|it| it.index) == Ok(3));
        check!(cache.insert(&3, 0.5).is_err());
    }

    #[test]
    fn insert_continues_after_sparse_insert_at() {
        let cache = TimeIndexCache::new();
        let time = Seconds::try_from(0.0).unwrap();
        cache.insert_at(Arc::new(0), IndexTime { index: 1, time });
        let it = cache.insert(&1, 0.1).unwrap();
        check!(it.index == 2);
        check!(cache.count() == 2);
        check!(cache.get_frame_at_index(2).as_deref() == Some(&1));
        check!(cache.get_frame_at_index(0) == None);
        check!(cache.frames().iter().map(|(it, _)| it.index).collect::<Vec<_>>() == [1, 2]);
    }

    #[test]
    fn queries_before_zero_resolve_to_the_first_frame() {
        let cache = TimeIndexCache::new();
        cache.insert(&7, 0.0).unwrap();
        cache.insert(&8, 1.0).unwrap();
        check!(cache.get_frame_at_time(-0.5).as_deref() == Some(&7));
        check!(cache.try_get_frame_at_time(-0.5).as_deref() == Some(&7));
        check!(cache.index_from_time(-100.0) == Some(0));
        check!(cache.has_frame_at_time(-1.0));
        check!(cache.get_frame_at_time(f64::NAN) == None);
        check!(cache.index_from_time(f64::NEG_INFINITY) == None);
        // Inserting stays restricted to non-negative timestamps.
        check!(matches!(
            cache.insert(&9, -1.0),
            Err(InsertError::InvalidTime(_))
        ));
    }

    #[test]
    #[should_panic]
    fn insert_at_rejects_duplicate_index() {
        let cache = TimeIndexCache::new();
        let time = Seconds::try_from(0.0).unwrap();
        cache.insert_at(Arc::new(0), IndexTime { index: 0, time });
        let time = Seconds::try_from(1.0).unwrap();
        cache.insert_at(Arc::new(1), IndexTime { index: 0, time });
    }

    #[test]
    fn frames_snapshot_is_in_index_order() {
        let cache = cache_with_times(&[0.0, 1.0, 2.0]);
        let frames = cache.frames();
        check!(frames.iter().map(|(it, _)| it.index).collect::<Vec<_>>() == [0, 1, 2]);
        check!(frames.iter().map(|(_, v)| **v).collect::<Vec<_>>() == [0, 1, 2]);
    }

    #[test]
    fn concurrent_readers_and_writer() {
        let cache = Arc::new(TimeIndexCache::new());
        let writer = {
            let cache = cache.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    cache.insert(&i, i as f64 * 0.01).unwrap();
                }
            })
        };
        let readers = (0..4)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        // Either a hit or a miss; never a torn result.
                        if let Some(v) = cache.try_get_frame_at_time(i as f64 * 0.01) {
                            assert!(*v < 200);
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        writer.join().unwrap();
        readers.into_iter().for_each(|r| r.join().unwrap());
        check!(cache.count() == 200);
    }
}
