use crate::{
    key::Key,
    store::{
        AtomicBatch, Check, CommitOutcome, Entry, ListOptions, ListSelector, Mutation, Store,
        StoreError, StoreValue, Versionstamp,
    },
};
use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::Mutex,
};

///
/// MemoryStore
///
/// Ordered in-memory store implementing the full contract: CAS-gated atomic
/// batches, a per-commit monotonic versionstamp, wrapping 64-bit `sum`, and
/// prefix enumeration. The reference backend for tests and embedding.
///

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<Key, (StoreValue, Versionstamp)>,
    clock: u64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store mutex poisoned")
    }
}

impl Inner {
    fn check_passes(&self, check: &Check) -> bool {
        let current = self.entries.get(&check.key).map(|(_, versionstamp)| *versionstamp);
        current == check.versionstamp
    }

    /// Stage all mutations before touching the map so a failing `sum`
    /// leaves the batch without side effects.
    fn stage(
        &self,
        mutations: &[Mutation],
    ) -> Result<BTreeMap<Key, Option<StoreValue>>, StoreError> {
        let mut staged: BTreeMap<Key, Option<StoreValue>> = BTreeMap::new();

        for mutation in mutations {
            match mutation {
                Mutation::Set { key, value } => {
                    staged.insert(key.clone(), Some(value.clone()));
                }
                Mutation::Delete { key } => {
                    staged.insert(key.clone(), None);
                }
                Mutation::Sum { key, delta } => {
                    let current = match staged.get(key) {
                        Some(staged_value) => staged_value.clone(),
                        None => self.entries.get(key).map(|(value, _)| value.clone()),
                    };
                    let base = match current {
                        None => 0,
                        Some(StoreValue::U64(value)) => value,
                        Some(_) => {
                            return Err(StoreError::SumTypeMismatch {
                                key: key.to_string(),
                            });
                        }
                    };
                    staged.insert(key.clone(), Some(StoreValue::U64(base.wrapping_add(*delta))));
                }
            }
        }

        Ok(staged)
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &Key) -> Result<Entry, StoreError> {
        let inner = self.lock();
        Ok(inner
            .entries
            .get(key)
            .map_or_else(Entry::absent, |(value, versionstamp)| {
                Entry::present(value.clone(), *versionstamp)
            }))
    }

    fn get_many(&self, keys: &[Key]) -> Result<Vec<Entry>, StoreError> {
        let inner = self.lock();
        Ok(keys
            .iter()
            .map(|key| {
                inner
                    .entries
                    .get(key)
                    .map_or_else(Entry::absent, |(value, versionstamp)| {
                        Entry::present(value.clone(), *versionstamp)
                    })
            })
            .collect())
    }

    fn list(
        &self,
        selector: &ListSelector,
        options: &ListOptions,
    ) -> Result<Vec<(Key, Entry)>, StoreError> {
        let inner = self.lock();

        let lower = selector
            .start
            .clone()
            .map_or(selector.prefix.clone(), |start| {
                start.max(selector.prefix.clone())
            });

        let mut matches: Vec<(Key, Entry)> = inner
            .entries
            .range((Bound::Included(lower), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(&selector.prefix))
            .filter(|(key, _)| selector.end.as_ref().is_none_or(|end| *key < end))
            .map(|(key, (value, versionstamp))| {
                (key.clone(), Entry::present(value.clone(), *versionstamp))
            })
            .collect();

        if options.reverse {
            matches.reverse();
        }
        if let Some(limit) = options.limit {
            matches.truncate(limit);
        }

        Ok(matches)
    }

    fn delete(&self, key: &Key) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.entries.remove(key);
        Ok(())
    }

    fn commit(&self, batch: AtomicBatch) -> Result<CommitOutcome, StoreError> {
        let mut inner = self.lock();

        for (index, check) in batch.checks().iter().enumerate() {
            if batch.checks()[..index].iter().any(|prior| prior.key == check.key) {
                return Err(StoreError::DuplicateCheck {
                    key: check.key.to_string(),
                });
            }
        }

        if !batch.checks().iter().all(|check| inner.check_passes(check)) {
            return Ok(CommitOutcome::Conflict);
        }

        let staged = inner.stage(batch.mutations())?;

        inner.clock += 1;
        let versionstamp = Versionstamp::new(inner.clock);
        for (key, value) in staged {
            match value {
                Some(value) => {
                    inner.entries.insert(key, (value, versionstamp));
                }
                None => {
                    inner.entries.remove(&key);
                }
            }
        }

        Ok(CommitOutcome::Committed { versionstamp })
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyPart;

    fn key(parts: &[&str]) -> Key {
        parts.iter().map(|p| KeyPart::from(*p)).collect()
    }

    fn set(store: &MemoryStore, k: &Key, value: StoreValue) -> Versionstamp {
        let outcome = AtomicBatch::new()
            .set(k.clone(), value)
            .commit(store)
            .unwrap();
        outcome.versionstamp().unwrap()
    }

    #[test]
    fn absent_keys_read_as_absent() {
        let store = MemoryStore::new();
        let entry = store.get(&key(&["missing"])).unwrap();

        assert!(entry.value.is_none());
        assert!(entry.versionstamp.is_none());
    }

    #[test]
    fn null_check_passes_only_for_absent_keys() {
        let store = MemoryStore::new();
        let k = key(&["a"]);

        let first = AtomicBatch::new()
            .check(Check {
                key: k.clone(),
                versionstamp: None,
            })
            .set(k.clone(), StoreValue::U64(1))
            .commit(&store)
            .unwrap();
        assert!(first.is_committed());

        let second = AtomicBatch::new()
            .check(Check {
                key: k.clone(),
                versionstamp: None,
            })
            .set(k, StoreValue::U64(2))
            .commit(&store)
            .unwrap();
        assert_eq!(second, CommitOutcome::Conflict);
    }

    #[test]
    fn versionstamp_check_gates_the_whole_batch() {
        let store = MemoryStore::new();
        let a = key(&["a"]);
        let b = key(&["b"]);
        let stamp = set(&store, &a, StoreValue::U64(1));

        // stale stamp: nothing in the batch applies
        set(&store, &a, StoreValue::U64(2));
        let outcome = AtomicBatch::new()
            .check(Check {
                key: a,
                versionstamp: Some(stamp),
            })
            .set(b.clone(), StoreValue::U64(9))
            .commit(&store)
            .unwrap();

        assert_eq!(outcome, CommitOutcome::Conflict);
        assert!(store.get(&b).unwrap().value.is_none());
    }

    #[test]
    fn all_mutations_of_a_batch_share_one_versionstamp() {
        let store = MemoryStore::new();
        let a = key(&["a"]);
        let b = key(&["b"]);

        let outcome = AtomicBatch::new()
            .set(a.clone(), StoreValue::U64(1))
            .set(b.clone(), StoreValue::U64(2))
            .commit(&store)
            .unwrap();
        let stamp = outcome.versionstamp().unwrap();

        assert_eq!(store.get(&a).unwrap().versionstamp, Some(stamp));
        assert_eq!(store.get(&b).unwrap().versionstamp, Some(stamp));
    }

    #[test]
    fn sum_creates_and_accumulates_counters() {
        let store = MemoryStore::new();
        let k = key(&["counter"]);

        AtomicBatch::new().sum(k.clone(), 5).commit(&store).unwrap();
        AtomicBatch::new().sum(k.clone(), 7).commit(&store).unwrap();

        assert_eq!(store.get(&k).unwrap().value, Some(StoreValue::U64(12)));
    }

    #[test]
    fn sum_on_a_non_counter_fails_without_side_effects() {
        let store = MemoryStore::new();
        let doc = key(&["doc"]);
        let other = key(&["other"]);
        set(&store, &doc, StoreValue::Bytes(vec![1, 2]));

        let err = AtomicBatch::new()
            .set(other.clone(), StoreValue::U64(1))
            .sum(doc.clone(), 1)
            .commit(&store)
            .unwrap_err();

        assert!(matches!(err, StoreError::SumTypeMismatch { .. }));
        assert!(store.get(&other).unwrap().value.is_none());
        assert_eq!(
            store.get(&doc).unwrap().value,
            Some(StoreValue::Bytes(vec![1, 2]))
        );
    }

    #[test]
    fn duplicate_checks_are_rejected() {
        let store = MemoryStore::new();
        let k = key(&["a"]);

        let err = AtomicBatch::new()
            .check(Check {
                key: k.clone(),
                versionstamp: None,
            })
            .check(Check {
                key: k,
                versionstamp: None,
            })
            .commit(&store)
            .unwrap_err();

        assert!(matches!(err, StoreError::DuplicateCheck { .. }));
    }

    #[test]
    fn list_enumerates_a_prefix_in_order() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c"] {
            set(&store, &key(&["users", id]), StoreValue::U64(0));
        }
        set(&store, &key(&["zz"]), StoreValue::U64(0));

        let entries = store
            .list(
                &ListSelector::prefix(key(&["users"])),
                &ListOptions::default(),
            )
            .unwrap();

        let keys: Vec<Key> = entries.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![key(&["users", "a"]), key(&["users", "b"]), key(&["users", "c"])]);
    }

    #[test]
    fn list_honours_limit_reverse_and_bounds() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c", "d"] {
            set(&store, &key(&["users", id]), StoreValue::U64(0));
        }

        let reversed = store
            .list(
                &ListSelector::prefix(key(&["users"])),
                &ListOptions {
                    limit: Some(2),
                    reverse: true,
                    ..ListOptions::default()
                },
            )
            .unwrap();
        let keys: Vec<Key> = reversed.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![key(&["users", "d"]), key(&["users", "c"])]);

        let bounded = store
            .list(
                &ListSelector {
                    prefix: key(&["users"]),
                    start: Some(key(&["users", "b"])),
                    end: Some(key(&["users", "d"])),
                },
                &ListOptions::default(),
            )
            .unwrap();
        let keys: Vec<Key> = bounded.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![key(&["users", "b"]), key(&["users", "c"])]);
    }
}
