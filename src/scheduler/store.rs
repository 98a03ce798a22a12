//! Completed results awaiting the caller.
//!
//! Results are kept in completion order. Each is keyed either by the
//! caller-supplied id or, for unnamed requests, by its completion sequence
//! number. A repeated id replaces the earlier result in place.
//!
//! Ids are indexed by absolute position, so inserts and lookups stay
//! constant-time however many results accumulate. Sequence keys are never
//! reused within a session and skip the duplicate check.
//!
//! Streaming consumers use a two-phase pattern: [`ResultStore::deliver_pending`]
//! hands each undelivered result to the callback and marks it delivered.
//! Removal happens in a separate call.

use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Key under which a result is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResultKey {
    /// Caller-supplied identifier.
    Id(String),
    /// Completion sequence number of an unnamed request.
    Seq(usize),
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => f.write_str(id),
            Self::Seq(seq) => write!(f, "{seq}"),
        }
    }
}

#[derive(Debug)]
struct Entry<R> {
    key: ResultKey,
    result: R,
    delivered: bool,
}

/// Completion-ordered result storage.
#[derive(Debug)]
pub struct ResultStore<R> {
    entries: VecDeque<Entry<R>>,
    /// Absolute position of `entries[0]`.
    head: usize,
    ids: HashMap<String, usize>,
    delivered: usize,
    next_seq: usize,
}

impl<R> Default for ResultStore<R> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
            head: 0,
            ids: HashMap::new(),
            delivered: 0,
            next_seq: 0,
        }
    }
}

impl<R> ResultStore<R> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `result`. Returns the result it displaced when `id` was
    /// already present; the new result takes over the old position.
    pub fn insert(&mut self, id: Option<String>, result: R) -> Option<R> {
        let key = match id {
            Some(id) => {
                if let Some(&position) = self.ids.get(&id)
                    && let Some(entry) = self.entries.get_mut(position - self.head)
                {
                    if entry.delivered {
                        entry.delivered = false;
                        self.delivered -= 1;
                    }
                    return Some(std::mem::replace(&mut entry.result, result));
                }
                self.ids.insert(id.clone(), self.head + self.entries.len());
                ResultKey::Id(id)
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                ResultKey::Seq(seq)
            }
        };

        self.entries.push_back(Entry {
            key,
            result,
            delivered: false,
        });
        None
    }

    /// Number of stored results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns the oldest result.
    pub fn pop_front(&mut self) -> Option<(ResultKey, R)> {
        let entry = self.entries.pop_front()?;
        self.head += 1;
        if entry.delivered {
            self.delivered -= 1;
        }
        if let ResultKey::Id(id) = &entry.key {
            self.ids.remove(id);
        }
        Some((entry.key, entry.result))
    }

    /// Removes and returns everything, restarting sequence numbering.
    pub fn take_all(&mut self) -> ResultSet<R> {
        let entries = std::mem::take(&mut self.entries);
        self.reset();
        entries
            .into_iter()
            .map(|entry| (entry.key, entry.result))
            .collect()
    }

    /// Drops everything, returning how many results were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        self.reset();
        dropped
    }

    fn reset(&mut self) {
        self.head = 0;
        self.ids.clear();
        self.delivered = 0;
        self.next_seq = 0;
    }

    /// Hands every not-yet-delivered result to `callback` once, oldest
    /// first, and returns how many were delivered.
    pub fn deliver_pending<F>(&mut self, mut callback: F) -> usize
    where
        F: FnMut(&R),
    {
        if self.delivered == self.entries.len() {
            return 0;
        }
        let mut count = 0;
        for entry in self.entries.iter_mut().filter(|entry| !entry.delivered) {
            callback(&entry.result);
            entry.delivered = true;
            count += 1;
        }
        self.delivered += count;
        count
    }

    /// Number of results already handed to a callback.
    #[must_use]
    pub fn delivered_count(&self) -> usize {
        self.delivered
    }

    /// Drops every delivered result, returning how many were dropped.
    pub fn discard_delivered(&mut self) -> usize {
        let dropped = self.delivered;
        if dropped > 0 {
            self.rebuild(|entry| (!entry.delivered).then_some(entry));
        }
        dropped
    }

    /// Removes up to `max` delivered results, oldest first.
    pub fn take_delivered(&mut self, max: usize) -> Vec<R> {
        let mut taken = Vec::new();
        if self.delivered == 0 || max == 0 {
            return taken;
        }
        self.rebuild(|entry| {
            if entry.delivered && taken.len() < max {
                taken.push(entry.result);
                None
            } else {
                Some(entry)
            }
        });
        taken
    }

    /// Passes every entry through `keep` in order, retaining those it hands
    /// back, then re-indexes what is left from position zero.
    fn rebuild<F>(&mut self, mut keep: F)
    where
        F: FnMut(Entry<R>) -> Option<Entry<R>>,
    {
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries.into_iter().filter_map(&mut keep).collect();
        self.head = 0;
        self.ids.clear();
        self.delivered = 0;
        for (position, entry) in self.entries.iter().enumerate() {
            if entry.delivered {
                self.delivered += 1;
            }
            if let ResultKey::Id(id) = &entry.key {
                self.ids.insert(id.clone(), position);
            }
        }
    }
}

/// Results returned by [`Scheduler::all`](super::Scheduler::all), in
/// completion order.
#[derive(Debug)]
pub struct ResultSet<R> {
    entries: Vec<Option<(ResultKey, R)>>,
    ids: HashMap<String, usize>,
    seqs: HashMap<usize, usize>,
    len: usize,
}

impl<R> Default for ResultSet<R> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            ids: HashMap::new(),
            seqs: HashMap::new(),
            len: 0,
        }
    }
}

impl<R> FromIterator<(ResultKey, R)> for ResultSet<R> {
    fn from_iter<I: IntoIterator<Item = (ResultKey, R)>>(iter: I) -> Self {
        let mut set = Self::default();
        for (key, result) in iter {
            let position = set.entries.len();
            match &key {
                ResultKey::Id(id) => {
                    set.ids.insert(id.clone(), position);
                }
                ResultKey::Seq(seq) => {
                    set.seqs.insert(*seq, position);
                }
            }
            set.entries.push(Some((key, result)));
            set.len += 1;
        }
        set
    }
}

impl<R> ResultSet<R> {
    fn at(&self, position: Option<&usize>) -> Option<&R> {
        self.entries
            .get(*position?)?
            .as_ref()
            .map(|(_, result)| result)
    }

    /// Looks up a result by caller-supplied id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&R> {
        self.at(self.ids.get(id))
    }

    /// Looks up an unnamed result by completion sequence number.
    #[must_use]
    pub fn get_seq(&self, seq: usize) -> Option<&R> {
        self.at(self.seqs.get(&seq))
    }

    /// Removes a result by caller-supplied id.
    pub fn remove(&mut self, id: &str) -> Option<R> {
        let position = self.ids.remove(id)?;
        let (_, result) = self.entries.get_mut(position)?.take()?;
        self.len -= 1;
        Some(result)
    }

    /// Number of results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when there are no results.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates over keys and results in completion order.
    pub fn iter(&self) -> impl Iterator<Item = (&ResultKey, &R)> {
        self.entries.iter().flatten().map(|(key, result)| (key, result))
    }

    /// Iterates over the keys in completion order.
    pub fn keys(&self) -> impl Iterator<Item = &ResultKey> {
        self.iter().map(|(key, _)| key)
    }

    /// Discards the keys.
    #[must_use]
    pub fn into_results(self) -> Vec<R> {
        self.into_iter().map(|(_, result)| result).collect()
    }
}

impl<R> IntoIterator for ResultSet<R> {
    type Item = (ResultKey, R);
    type IntoIter = std::iter::Flatten<std::vec::IntoIter<Option<(ResultKey, R)>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter().flatten()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unnamed_results_get_sequence_keys() {
        let mut store = ResultStore::new();
        store.insert(None, "first");
        store.insert(None, "second");

        let set = store.take_all();
        assert_eq!(set.get_seq(0), Some(&"first"));
        assert_eq!(set.get_seq(1), Some(&"second"));
    }

    #[test]
    fn test_take_all_restarts_sequence() {
        let mut store = ResultStore::new();
        store.insert(None, 1);
        let _ = store.take_all();
        store.insert(None, 2);
        assert_eq!(store.pop_front(), Some((ResultKey::Seq(0), 2)));
    }

    #[test]
    fn test_pop_front_is_completion_order() {
        let mut store = ResultStore::new();
        store.insert(Some("z".to_string()), 1);
        store.insert(Some("a".to_string()), 2);
        store.insert(None, 3);

        assert_eq!(store.pop_front().unwrap().1, 1);
        assert_eq!(store.pop_front().unwrap().1, 2);
        assert_eq!(store.pop_front().unwrap().1, 3);
        assert!(store.pop_front().is_none());
    }

    #[test]
    fn test_duplicate_id_replaces_in_place() {
        let mut store = ResultStore::new();
        store.insert(Some("a".to_string()), 1);
        store.insert(Some("b".to_string()), 2);

        let displaced = store.insert(Some("a".to_string()), 3);

        assert_eq!(displaced, Some(1));
        assert_eq!(store.len(), 2);
        assert_eq!(store.pop_front(), Some((ResultKey::Id("a".to_string()), 3)));
    }

    #[test]
    fn test_deliver_pending_delivers_each_once() {
        let mut store = ResultStore::new();
        store.insert(None, 1);
        store.insert(None, 2);

        let mut seen = Vec::new();
        assert_eq!(store.deliver_pending(|r| seen.push(*r)), 2);
        store.insert(None, 3);
        assert_eq!(store.deliver_pending(|r| seen.push(*r)), 1);
        assert_eq!(store.deliver_pending(|r| seen.push(*r)), 0);

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(store.delivered_count(), 3);
    }

    #[test]
    fn test_discard_delivered_keeps_undelivered() {
        let mut store = ResultStore::new();
        store.insert(None, 1);
        store.deliver_pending(|_| {});
        store.insert(None, 2);

        assert_eq!(store.discard_delivered(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.pop_front().unwrap().1, 2);
    }

    #[test]
    fn test_take_delivered_respects_max() {
        let mut store = ResultStore::new();
        for n in 0..5 {
            store.insert(None, n);
        }
        store.deliver_pending(|_| {});

        assert_eq!(store.take_delivered(3), vec![0, 1, 2]);
        assert_eq!(store.take_delivered(3), vec![3, 4]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_result_set_lookup_and_remove() {
        let mut store = ResultStore::new();
        store.insert(Some("a".to_string()), "ok");
        let mut set = store.take_all();

        assert_eq!(set.get("a"), Some(&"ok"));
        assert_eq!(set.get("missing"), None);
        assert_eq!(set.remove("a"), Some("ok"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_result_key_display() {
        assert_eq!(ResultKey::Id("abc".to_string()).to_string(), "abc");
        assert_eq!(ResultKey::Seq(7).to_string(), "7");
    }

    #[test]
    fn test_many_keyed_results_stay_addressable() {
        let mut store = ResultStore::new();
        for n in 0..50_000 {
            assert!(store.insert(Some(format!("req-{n}")), n).is_none());
        }
        assert_eq!(store.insert(Some("req-25000".to_string()), -1), Some(25_000));
        assert_eq!(store.len(), 50_000);

        let mut set = store.take_all();
        for n in (0..50_000).step_by(997) {
            let expected = if n == 25_000 { -1 } else { n };
            assert_eq!(set.get(&format!("req-{n}")), Some(&expected));
        }
        assert_eq!(set.remove("req-0"), Some(0));
        assert_eq!(set.get("req-0"), None);
        assert_eq!(set.remove("req-0"), None);
        assert_eq!(set.get("req-1"), Some(&1));
        assert_eq!(set.len(), 49_999);
        assert_eq!(set.iter().next().map(|(_, r)| *r), Some(1));
    }

    #[test]
    fn test_replacing_delivered_result_redelivers_it() {
        let mut store = ResultStore::new();
        store.insert(Some("a".to_string()), 1);
        store.insert(Some("b".to_string()), 2);
        store.deliver_pending(|_| {});
        assert_eq!(store.delivered_count(), 2);

        assert_eq!(store.insert(Some("a".to_string()), 10), Some(1));
        assert_eq!(store.delivered_count(), 1);

        let mut seen = Vec::new();
        assert_eq!(store.deliver_pending(|r| seen.push(*r)), 1);
        assert_eq!(seen, vec![10]);
    }

    #[test]
    fn test_ids_survive_front_removal_and_compaction() {
        let mut store = ResultStore::new();
        store.insert(Some("a".to_string()), 1);
        store.insert(Some("b".to_string()), 2);
        store.insert(Some("c".to_string()), 3);
        assert_eq!(store.pop_front().unwrap().1, 1);

        // "a" left the store, so it is a fresh entry again.
        assert_eq!(store.insert(Some("a".to_string()), 4), None);

        store.deliver_pending(|_| {});
        assert_eq!(store.take_delivered(1), vec![2]);
        assert_eq!(store.insert(Some("c".to_string()), 30), Some(3));
        assert_eq!(store.insert(Some("a".to_string()), 40), Some(4));

        let set = store.take_all();
        let keys: Vec<String> = set.keys().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["c", "a"]);
        assert_eq!(set.into_results(), vec![30, 40]);
    }

    #[test]
    fn test_result_set_mixed_keys() {
        let mut store = ResultStore::new();
        store.insert(None, "first");
        store.insert(Some("named".to_string()), "second");
        store.insert(None, "third");

        let mut set = store.take_all();
        assert_eq!(set.get_seq(1), Some(&"third"));
        assert_eq!(set.remove("named"), Some("second"));
        assert_eq!(set.get_seq(0), Some(&"first"));
        let rest: Vec<_> = set.into_iter().collect();
        assert_eq!(
            rest,
            vec![(ResultKey::Seq(0), "first"), (ResultKey::Seq(1), "third")]
        );
    }
}
