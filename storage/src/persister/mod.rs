//! Durable storage for committed transactions, generalizing the teacher's
//! `Engine` trait (`get`/`set`/`delete`/`status`) from a raw byte store to an
//! append-only log of typed, already-serializable mutation batches.
//!
//! A `Persister` never interprets the mutations it stores -- it only needs
//! enough of the record to order and replay it. The schema-specific
//! `Mutation` type only has to be `Serialize + DeserializeOwned`; producing
//! the exact on-disk line (with its `TypeID` discriminators) additionally
//! asks it to implement `ReflectedMutation`, which only `FilePersister`
//! requires.

pub mod file;
pub mod memory;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_derive::{Deserialize, Serialize as SerializeDerive};
use serde_json::Value;

use crate::clock::Us;
use crate::error::{CResult, Error};
use crate::typeid::ReflectedMutation;

/// One committed transaction as it is durably recorded, per storage.md §6:
/// an ordered batch of mutations sharing a transaction index, stamped with
/// the wall-clock instant the transaction began and ended, and any free-form
/// metadata fields the caller attached to the journal.
#[derive(Debug, Clone, SerializeDerive, Deserialize)]
pub struct PersistedRecord<M> {
    pub index: u64,
    pub begin_us: Us,
    pub end_us: Us,
    pub mutations: Vec<M>,
    pub meta: BTreeMap<String, String>,
}

/// A snapshot of a persister's durability state, surfaced through the CLI's
/// `status` command and the REST status contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct Status {
    pub record_count: u64,
    pub last_us: Us,
    pub bytes_on_disk: u64,
}

/// Durable, append-only storage for a stream of `PersistedRecord<M>`s.
/// Implementors must never reorder or drop a record once `append` returns
/// `Ok`.
pub trait Persister<M>: Send {
    fn append(&mut self, record: PersistedRecord<M>) -> CResult<()>;

    /// The index that will be assigned to the next appended record.
    fn next_index(&self) -> u64;

    /// The `begin_us` of the most recently appended record, or whatever
    /// `update_head` last advanced it to, or `i64::MIN` if neither has ever
    /// happened. Used to enforce invariant 1's cross-transaction
    /// monotonicity at the persister boundary.
    fn last_us(&self) -> Us;

    fn status(&self) -> Status;

    /// Every record appended so far, in order. Used to rebuild a follower's
    /// containers from scratch and by the CLI's `tail` command.
    fn replay(&self) -> CResult<Vec<PersistedRecord<M>>>;

    /// Appends `record` only if its `begin_us` exceeds the persister's
    /// current head, rejecting it with `NonMonotonicTimestamp` otherwise --
    /// the explicit-timestamp sibling of `append`'s own
    /// `max(clock.now(), last_us + 1)` monotonicity, for callers that have
    /// already decided the `us` themselves (e.g. a caught-up follower
    /// re-publishing its master's own timestamps).
    fn publish_at(&mut self, record: PersistedRecord<M>) -> CResult<(u64, Us)> {
        let head = self.last_us();
        if record.begin_us <= head {
            return Err(Error::NonMonotonicTimestamp { given: record.begin_us, head });
        }
        let index = record.index;
        let us = record.begin_us;
        self.append(record)?;
        Ok((index, us))
    }

    /// Advances the persister's head timestamp without appending a record,
    /// signaling "nothing new happened, but time moved" to anything tailing
    /// `last_us`/`status().last_us`.
    fn update_head(&mut self, us: Us) -> CResult<()>;

    /// Every record with `from_index <= index` and, if given, `index <
    /// to_index`, restartable from any index. The default implementation is
    /// an eager filter over `replay()`; a persister backed by a real index
    /// file could seek directly instead.
    fn iterate(&self, from_index: u64, to_index: Option<u64>) -> CResult<Vec<PersistedRecord<M>>> {
        Ok(self
            .replay()?
            .into_iter()
            .filter(|record| record.index >= from_index && to_index.is_none_or(|hi| record.index < hi))
            .collect())
    }
}

/// Encodes one record as a line of storage.md §6's wire format:
/// `{"index":<u64>,"us":<i64>}\t<transaction_json>`, where `transaction_json`
/// nests `meta` (`begin_us`/`end_us`/`fields`) alongside `mutations`, and
/// each mutation's externally-tagged JSON object carries a trailing
/// `"": "<TypeID>"` discriminator next to its variant key.
pub fn encode_line<M: Serialize + ReflectedMutation>(record: &PersistedRecord<M>) -> CResult<String> {
    let header = serde_json::json!({ "index": record.index, "us": record.begin_us });

    let mut mutations = Vec::with_capacity(record.mutations.len());
    for mutation in &record.mutations {
        let mut value = serde_json::to_value(mutation)?;
        if let Value::Object(ref mut map) = value {
            map.insert(String::new(), Value::String(mutation.type_id().to_string()));
        }
        mutations.push(value);
    }

    let body = serde_json::json!({
        "meta": {
            "begin_us": record.begin_us,
            "end_us": record.end_us,
            "fields": record.meta,
        },
        "mutations": mutations,
    });

    Ok(format!("{header}\t{body}"))
}

/// Decodes one line written by `encode_line`. Each mutation's `TypeID`
/// discriminator is stripped before handing the remaining single-key object
/// to `M`'s own externally-tagged `Deserialize` impl -- the discriminator
/// exists for forward-compatible readers this crate doesn't implement, not
/// for round-tripping here.
pub fn decode_line<M: DeserializeOwned>(line: &str) -> CResult<PersistedRecord<M>> {
    let (header_str, body_str) = line
        .split_once('\t')
        .ok_or_else(|| Error::Serde("persisted line is missing its header/body separator".to_string()))?;

    let header: Value = serde_json::from_str(header_str)?;
    let index = header
        .get("index")
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::Serde("persisted line header missing \"index\"".to_string()))?;

    let body: Value = serde_json::from_str(body_str)?;
    let meta = body.get("meta").cloned().unwrap_or(Value::Null);
    let begin_us = meta.get("begin_us").and_then(Value::as_i64).unwrap_or_default();
    let end_us = meta.get("end_us").and_then(Value::as_i64).unwrap_or_default();
    let fields: BTreeMap<String, String> = meta
        .get("fields")
        .cloned()
        .map(|value| serde_json::from_value(value).unwrap_or_default())
        .unwrap_or_default();

    let mutations_value = body.get("mutations").cloned().unwrap_or(Value::Array(Vec::new()));
    let mut mutations = Vec::new();
    if let Value::Array(items) = mutations_value {
        for mut item in items {
            if let Value::Object(ref mut map) = item {
                map.remove("");
            }
            mutations.push(serde_json::from_value(item)?);
        }
    }

    Ok(PersistedRecord { index, begin_us, end_us, mutations, meta: fields })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persister::memory::MemoryPersister;

    #[test]
    fn publish_at_rejects_non_monotonic_timestamp() {
        let mut p: MemoryPersister<u32> = MemoryPersister::new();
        p.append(PersistedRecord { index: 0, begin_us: 100, end_us: 100, mutations: vec![1], meta: Default::default() })
            .unwrap();
        let result = p.publish_at(PersistedRecord {
            index: 1,
            begin_us: 50,
            end_us: 50,
            mutations: vec![2],
            meta: Default::default(),
        });
        assert!(matches!(result, Err(Error::NonMonotonicTimestamp { given: 50, head: 100 })));
    }

    #[test]
    fn publish_at_accepts_a_strictly_later_timestamp() {
        let mut p: MemoryPersister<u32> = MemoryPersister::new();
        let (index, us) = p
            .publish_at(PersistedRecord { index: 0, begin_us: 100, end_us: 100, mutations: vec![1], meta: Default::default() })
            .unwrap();
        assert_eq!((index, us), (0, 100));
    }

    #[test]
    fn update_head_advances_last_us_without_appending_a_record() {
        let mut p: MemoryPersister<u32> = MemoryPersister::new();
        p.update_head(500).unwrap();
        assert_eq!(p.last_us(), 500);
        assert_eq!(p.status().record_count, 0);
    }

    #[test]
    fn iterate_is_restartable_from_an_arbitrary_index() {
        let mut p: MemoryPersister<u32> = MemoryPersister::new();
        for i in 0..5u64 {
            p.append(PersistedRecord {
                index: i,
                begin_us: 100 + i as i64,
                end_us: 100 + i as i64,
                mutations: vec![i as u32],
                meta: Default::default(),
            })
            .unwrap();
        }
        let middle = p.iterate(2, Some(4)).unwrap();
        assert_eq!(middle.iter().map(|r| r.index).collect::<Vec<_>>(), vec![2, 3]);

        let rest = p.iterate(3, None).unwrap();
        assert_eq!(rest.iter().map(|r| r.index).collect::<Vec<_>>(), vec![3, 4]);
    }
}
