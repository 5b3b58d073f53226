//! history.rs: prior dispositions of a comment author.
//!
//! The scorer only reads history. Storage belongs to the host; `InMemoryHistory` is the
//! bounded collaborator used by the HTTP service and the tests.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{PoisonError, RwLock};

/// Final state a stored comment ended up in.
///
/// Declaration order is the iteration order of `HistoryRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Held in moderation; carries no weight.
    Pending,
    Approved,
    Spam,
    Trash,
}

/// Counts of prior comments grouped by disposition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    counts: BTreeMap<Disposition, u32>,
}

impl HistoryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder style, mostly for tests.
    pub fn with(mut self, d: Disposition, count: u32) -> Self {
        self.add(d, count);
        self
    }

    pub fn add(&mut self, d: Disposition, count: u32) {
        *self.counts.entry(d).or_insert(0) += count;
    }

    pub fn count(&self, d: Disposition) -> u32 {
        self.counts.get(&d).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.values().all(|&c| c == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Disposition, u32)> + '_ {
        self.counts.iter().map(|(d, c)| (*d, *c))
    }
}

/// How hard repeat trashed authors are punished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrashPenalty {
    /// `-count^(count-1)`: -1, -2, -9, -64, ...
    #[default]
    Exponential,
    /// `-count`
    Linear,
    /// Trashed comments carry no weight.
    None,
}

impl TrashPenalty {
    /// Score delta for `count` trashed comments (0 for a zero count).
    pub fn delta(self, count: u32) -> i32 {
        if count == 0 {
            return 0;
        }
        match self {
            TrashPenalty::Exponential => {
                let magnitude = i64::from(count)
                    .checked_pow(count - 1)
                    .unwrap_or(i64::MAX)
                    .min(i64::from(i32::MAX));
                -(magnitude as i32)
            }
            TrashPenalty::Linear => -(count.min(i32::MAX as u32) as i32),
            TrashPenalty::None => 0,
        }
    }
}

/// Read-only access to prior comments of an author.
///
/// Implementations must return an empty record on no match and must be safe for
/// concurrent reads; the scorer treats any error as "no history".
pub trait HistoryLookup: Send + Sync {
    /// Counts for comments where `(name AND email)` match, or `ip` matches when given.
    fn counts(&self, name: &str, email: &str, ip: Option<&str>) -> anyhow::Result<HistoryRecord>;
}

pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

type AuthorKey = (String, String);

/// One stored comment as seen by the eviction queue.
#[derive(Debug)]
struct Entry {
    id: u64,
    author: AuthorKey,
    ip: Option<String>,
}

#[derive(Debug, Default)]
struct Store {
    next_id: u64,
    /// Oldest first; ids ascend.
    entries: VecDeque<Entry>,
    by_author: HashMap<AuthorKey, VecDeque<(u64, Disposition)>>,
    by_ip: HashMap<String, VecDeque<(u64, Disposition)>>,
}

impl Store {
    fn evict_oldest(&mut self) {
        let Some(old) = self.entries.pop_front() else {
            return;
        };
        // the evicted id is the oldest one in every index it appears in
        if let Some(list) = self.by_author.get_mut(&old.author) {
            debug_assert_eq!(list.front().map(|e| e.0), Some(old.id));
            list.pop_front();
            if list.is_empty() {
                self.by_author.remove(&old.author);
            }
        }
        if let Some(ip) = old.ip {
            if let Some(list) = self.by_ip.get_mut(&ip) {
                list.pop_front();
                if list.is_empty() {
                    self.by_ip.remove(&ip);
                }
            }
        }
    }
}

/// Bounded in-memory history indexed by author pair and by IP.
///
/// Keeps the newest `capacity` comments and drops the oldest beyond that. A lookup only
/// touches the entries of the matching author and IP.
#[derive(Debug)]
pub struct InMemoryHistory {
    inner: RwLock<Store>,
    cap: usize,
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zero capacity is bumped to one.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: RwLock::new(Store::default()),
            cap: cap.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn record(&self, name: &str, email: &str, ip: Option<&str>, disposition: Disposition) {
        let mut s = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = s.next_id;
        s.next_id += 1;

        let author = (name.to_string(), email.to_string());
        let ip = ip.filter(|v| !v.is_empty()).map(str::to_string);

        s.by_author
            .entry(author.clone())
            .or_default()
            .push_back((id, disposition));
        if let Some(ip) = &ip {
            s.by_ip
                .entry(ip.clone())
                .or_default()
                .push_back((id, disposition));
        }
        s.entries.push_back(Entry { id, author, ip });

        while s.entries.len() > self.cap {
            s.evict_oldest();
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .map(|s| s.entries.len())
            .unwrap_or_else(|e| e.into_inner().entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn oldest_id(&self) -> Option<u64> {
        self.inner
            .read()
            .ok()
            .and_then(|s| s.entries.front().map(|e| e.id))
    }
}

impl HistoryLookup for InMemoryHistory {
    fn counts(&self, name: &str, email: &str, ip: Option<&str>) -> anyhow::Result<HistoryRecord> {
        let s = self
            .inner
            .read()
            .map_err(|_| anyhow!("history lock poisoned"))?;

        let mut rec = HistoryRecord::new();
        let author = (name.to_string(), email.to_string());
        let by_author = s.by_author.get(&author);
        for (_, d) in by_author.into_iter().flatten() {
            rec.add(*d, 1);
        }

        if let Some(list) = ip.filter(|v| !v.is_empty()).and_then(|ip| s.by_ip.get(ip)) {
            // a comment matching both keys counts once
            let seen: HashSet<u64> = by_author
                .into_iter()
                .flatten()
                .map(|(id, _)| *id)
                .collect();
            for (id, d) in list {
                if !seen.contains(id) {
                    rec.add(*d, 1);
                }
            }
        }
        Ok(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_trash_penalty_grows_fast() {
        let p = TrashPenalty::Exponential;
        assert_eq!(p.delta(0), 0);
        assert_eq!(p.delta(1), -1);
        assert_eq!(p.delta(2), -2);
        assert_eq!(p.delta(3), -9);
        assert_eq!(p.delta(4), -64);
        // saturates instead of overflowing
        assert_eq!(p.delta(40), -i32::MAX);
    }

    #[test]
    fn other_trash_policies() {
        assert_eq!(TrashPenalty::Linear.delta(3), -3);
        assert_eq!(TrashPenalty::None.delta(5), 0);
    }

    #[test]
    fn in_memory_matches_author_pair_or_ip() {
        let h = InMemoryHistory::new();
        h.record("Ann", "ann@example.com", None, Disposition::Approved);
        h.record("Ann", "ann@example.com", Some("10.0.0.1"), Disposition::Approved);
        h.record("Ann", "other@example.com", None, Disposition::Spam);
        h.record("Bot", "bot@example.com", Some("10.0.0.9"), Disposition::Trash);

        let rec = h.counts("Ann", "ann@example.com", None).unwrap();
        assert_eq!(rec.count(Disposition::Approved), 2);
        assert_eq!(rec.count(Disposition::Spam), 0);

        let rec = h.counts("Ann", "ann@example.com", Some("10.0.0.9")).unwrap();
        assert_eq!(rec.count(Disposition::Trash), 1);
        assert_eq!(rec.count(Disposition::Approved), 2);
    }

    #[test]
    fn no_match_is_empty_not_error() {
        let h = InMemoryHistory::new();
        let rec = h.counts("Nobody", "no@example.com", Some("")).unwrap();
        assert!(rec.is_empty());
    }

    #[test]
    fn record_iterates_in_disposition_order() {
        let rec = HistoryRecord::new()
            .with(Disposition::Trash, 1)
            .with(Disposition::Approved, 2)
            .with(Disposition::Pending, 1);
        let order: Vec<_> = rec.iter().map(|(d, _)| d).collect();
        assert_eq!(
            order,
            vec![Disposition::Pending, Disposition::Approved, Disposition::Trash]
        );
    }

    #[test]
    fn comment_matching_author_and_ip_counts_once() {
        let h = InMemoryHistory::new();
        h.record("Ann", "ann@example.com", Some("10.0.0.1"), Disposition::Spam);
        let rec = h.counts("Ann", "ann@example.com", Some("10.0.0.1")).unwrap();
        assert_eq!(rec.count(Disposition::Spam), 1);
    }

    #[test]
    fn capacity_bound_drops_oldest() {
        let h = InMemoryHistory::with_capacity(3);
        h.record("Old", "old@example.com", Some("10.0.0.1"), Disposition::Trash);
        for i in 0..5 {
            h.record(&format!("bot{i}"), "bot@example.com", None, Disposition::Spam);
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.oldest_id(), Some(3));

        // the evicted entry is gone from both indexes
        assert!(h.counts("Old", "old@example.com", None).unwrap().is_empty());
        assert!(h.counts("x", "y", Some("10.0.0.1")).unwrap().is_empty());
        assert_eq!(
            h.counts("bot4", "bot@example.com", None)
                .unwrap()
                .count(Disposition::Spam),
            1
        );
    }

    #[test]
    fn flood_of_distinct_authors_stays_bounded() {
        let h = InMemoryHistory::with_capacity(1_000);
        for i in 0..20_000 {
            let ip = format!("10.{i}");
            h.record(&format!("bot{i}"), "spam@example.com", Some(ip.as_str()), Disposition::Spam);
        }
        assert_eq!(h.len(), 1_000);
        let s = h.inner.read().unwrap();
        assert_eq!(s.by_author.len(), 1_000);
        assert_eq!(s.by_ip.len(), 1_000);
        drop(s);
        assert!(h.counts("Jane", "jane@example.com", None).unwrap().is_empty());
    }

    #[test]
    fn zero_capacity_keeps_one() {
        let h = InMemoryHistory::with_capacity(0);
        h.record("a", "a@example.com", None, Disposition::Approved);
        h.record("b", "b@example.com", None, Disposition::Approved);
        assert_eq!(h.capacity(), 1);
        assert_eq!(h.len(), 1);
    }
}
