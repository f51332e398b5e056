// Frequency table for top-N extraction.
//
// Every key remembers the stream position of the record that introduced it
// so ties in count resolve to "seen first". Merging shifts the other side's
// positions by the number of records already folded here, which makes
// merge(fold(A), fold(B)) identical to fold(A ++ B) for exact tables.
//
// With a capacity the table switches to space-saving counters (Metwally et
// al.): a new key arriving at a full table replaces the smallest counter and
// inherits its count. Any reported count overestimates the true count by at
// most `records / capacity`, and every key with a true count above that
// bound is guaranteed to be present. Bounded tables keep an ordered index
// (smallest count first, newest first on ties) so eviction is O(log capacity).

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

// eviction order: lowest count, then most recently introduced
type Slot = (u64, Reverse<u64>, String);

fn slot(key: &str, counter: &Counter) -> Slot {
    (counter.count, Reverse(counter.first_seen), key.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    pub count: u64,
    pub first_seen: u64, // ordinal of the record that introduced the key
    pub error: u64,      // overestimation bound, always 0 in exact mode
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrequencyTable {
    entries: HashMap<String, Counter>,
    capacity: Option<usize>,
    // only maintained for bounded tables
    index: BTreeSet<Slot>,
}

impl FrequencyTable {
    /// Unbounded table with exact counts
    pub fn exact() -> Self {
        Self::default()
    }

    /// Space-saving table holding at most `capacity` keys
    pub fn bounded(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.max(1)),
            capacity: Some(capacity.max(1)),
            index: BTreeSet::new(),
        }
    }

    pub fn is_approximate(&self) -> bool {
        self.capacity.is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Counter> {
        self.entries.get(key)
    }

    /// Count one occurrence of `key` seen at record position `ordinal`
    pub fn observe(&mut self, key: &str, ordinal: u64) {
        let bounded = self.capacity.is_some();
        if let Some(counter) = self.entries.get_mut(key) {
            if bounded {
                self.index.remove(&slot(key, counter));
                counter.count += 1;
                self.index.insert(slot(key, counter));
            } else {
                counter.count += 1;
            }
            return;
        }

        let counter = match self.capacity {
            Some(cap) if self.entries.len() >= cap => {
                let floor = self.evict_smallest();
                Counter {
                    count: floor + 1,
                    first_seen: ordinal,
                    error: floor,
                }
            }
            _ => Counter {
                count: 1,
                first_seen: ordinal,
                error: 0,
            },
        };
        if bounded {
            self.index.insert(slot(key, &counter));
        }
        self.entries.insert(key.to_string(), counter);
    }

    /// Fold `other` into this table. `offset` is the number of records this
    /// side had folded, so `other`'s keys count as observed afterwards.
    pub fn merge(&mut self, other: FrequencyTable, offset: u64) {
        for (key, theirs) in other.entries {
            let shifted = theirs.first_seen + offset;
            self.entries
                .entry(key)
                .and_modify(|ours| {
                    ours.count += theirs.count;
                    ours.error += theirs.error;
                    ours.first_seen = ours.first_seen.min(shifted);
                })
                .or_insert(Counter {
                    first_seen: shifted,
                    ..theirs
                });
        }

        if let Some(cap) = self.capacity {
            self.index = self.entries.iter().map(|(k, c)| slot(k, c)).collect();
            // index order is the reverse of top() order, so this keeps the best `cap`
            while self.entries.len() > cap {
                self.evict_smallest();
            }
        }
    }

    /// The `n` most frequent keys, count descending, first seen first on ties
    pub fn top(&self, n: usize) -> Vec<(String, u64)> {
        self.ranked()
            .into_iter()
            .take(n)
            .map(|(k, c)| (k.clone(), c.count))
            .collect()
    }

    fn ranked(&self) -> Vec<(&String, &Counter)> {
        let mut all: Vec<_> = self.entries.iter().collect();
        all.sort_by_key(|(_, c)| (Reverse(c.count), c.first_seen));
        all
    }

    // drop the smallest counter (newest on ties) and return its count
    fn evict_smallest(&mut self) -> u64 {
        match self.index.pop_first() {
            Some((count, _, key)) => {
                self.entries.remove(&key);
                count
            }
            None => 0,
        }
    }
}
