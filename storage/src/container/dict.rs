//! `Dictionary<V>`: a single-key-axis container, backed by either a
//! `BTreeMap` (ordered) or a `HashMap` (unordered) chosen at construction,
//! mirroring the byte-oriented `Memory` engine's `BTreeMap<Vec<u8>, Vec<u8>>`
//! but keyed by `V::Key` and storing typed entries instead of bytes.

use std::collections::{BTreeMap, HashMap};

use super::DictEntry;
use crate::clock::Us;

enum Backing<V: DictEntry> {
    Ordered(BTreeMap<V::Key, V>),
    Unordered(HashMap<V::Key, V>),
}

/// One event a `Dictionary` write produced. Wrapped into a schema's closed
/// `Mutation` enum by the generated field accessor before being recorded
/// into the journal.
#[derive(Debug, Clone)]
pub enum DictEvent<V: DictEntry> {
    Updated { us: Us, data: V },
    Deleted { us: Us, key: V::Key },
}

/// Enough state to reverse one `DictEvent`, kept in memory only: never
/// serialized, never sent to a follower.
#[derive(Debug, Clone)]
pub struct DictUndo<V: DictEntry> {
    key: V::Key,
    prior: Option<(V, Us)>,
}

pub struct Dictionary<V: DictEntry> {
    backing: Backing<V>,
    last_modified: HashMap<V::Key, Us>,
}

impl<V: DictEntry> Dictionary<V> {
    pub fn ordered() -> Self {
        Dictionary { backing: Backing::Ordered(BTreeMap::new()), last_modified: HashMap::new() }
    }

    pub fn unordered() -> Self {
        Dictionary { backing: Backing::Unordered(HashMap::new()), last_modified: HashMap::new() }
    }

    pub fn is_ordered(&self) -> bool {
        matches!(self.backing, Backing::Ordered(_))
    }

    pub fn get(&self, key: &V::Key) -> Option<&V> {
        match &self.backing {
            Backing::Ordered(map) => map.get(key),
            Backing::Unordered(map) => map.get(key),
        }
    }

    pub fn has(&self, key: &V::Key) -> bool {
        self.get(key).is_some()
    }

    pub fn size(&self) -> usize {
        match &self.backing {
            Backing::Ordered(map) => map.len(),
            Backing::Unordered(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn last_modified(&self, key: &V::Key) -> Option<Us> {
        self.last_modified.get(key).copied()
    }

    /// Iterates entries. For an ordered dictionary this is key order; for an
    /// unordered one it is whatever order the backing `HashMap` yields.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &V> + '_> {
        match &self.backing {
            Backing::Ordered(map) => Box::new(map.values()),
            Backing::Unordered(map) => Box::new(map.values()),
        }
    }

    fn raw_insert(&mut self, key: V::Key, value: V) -> Option<V> {
        match &mut self.backing {
            Backing::Ordered(map) => map.insert(key, value),
            Backing::Unordered(map) => map.insert(key, value),
        }
    }

    fn raw_remove(&mut self, key: &V::Key) -> Option<V> {
        match &mut self.backing {
            Backing::Ordered(map) => map.remove(key),
            Backing::Unordered(map) => map.remove(key),
        }
    }

    /// Inserts or overwrites `entry` at `entry.key()`, stamping it with `us`.
    /// Always emits: an overwrite at a new timestamp is a real mutation even
    /// when the value is unchanged, since the last-modified clock still
    /// advances (storage.md §4.1: "per-key last-modified map updated
    /// unconditionally").
    pub fn add(&mut self, entry: V, us: Us) -> (DictEvent<V>, DictUndo<V>) {
        let key = entry.key();
        let prior_us = self.last_modified(&key);
        let prior_value = self.raw_insert(key.clone(), entry.clone());
        let prior = prior_value.zip(prior_us);
        self.last_modified.insert(key.clone(), us);
        (DictEvent::Updated { us, data: entry }, DictUndo { key, prior })
    }

    /// Erases `key`. The last-modified stamp is recorded unconditionally,
    /// even when `key` was already absent; only the `DictEvent`/`DictUndo`
    /// pair is elided in that case, since there is no prior value to undo to.
    pub fn erase(&mut self, key: &V::Key, us: Us) -> Option<(DictEvent<V>, DictUndo<V>)> {
        let prior_us = self.last_modified(key);
        let removed = self.raw_remove(key);
        self.last_modified.insert(key.clone(), us);
        let removed = removed?;
        Some((
            DictEvent::Deleted { us, key: key.clone() },
            DictUndo { key: key.clone(), prior: Some((removed, prior_us.unwrap_or(us))) },
        ))
    }

    /// Reverses one recorded undo step. Called by the transaction engine in
    /// the reverse order mutations were recorded.
    pub fn apply_undo(&mut self, undo: DictUndo<V>) {
        match undo.prior {
            Some((value, us)) => {
                self.raw_insert(undo.key.clone(), value);
                self.last_modified.insert(undo.key, us);
            }
            None => {
                self.raw_remove(&undo.key);
                self.last_modified.remove(&undo.key);
            }
        }
    }

    /// Applies an event read from a persisted or replicated record, without
    /// producing an undo -- used by followers replaying a stream.
    pub fn apply_event(&mut self, event: DictEvent<V>) {
        match event {
            DictEvent::Updated { us, data } => {
                let key = data.key();
                self.raw_insert(key.clone(), data);
                self.last_modified.insert(key, us);
            }
            DictEvent::Deleted { us, key } => {
                self.raw_remove(&key);
                self.last_modified.insert(key, us);
            }
        }
    }
}
