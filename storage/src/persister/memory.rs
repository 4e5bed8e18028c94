//! An in-memory `Persister`, mirroring the teacher's `Memory` engine: useful
//! for tests and for schemas that don't need cross-process durability.

use super::{PersistedRecord, Persister, Status};
use crate::clock::Us;
use crate::error::CResult;

pub struct MemoryPersister<M> {
    records: Vec<PersistedRecord<M>>,
    head: Us,
}

impl<M> Default for MemoryPersister<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> MemoryPersister<M> {
    pub fn new() -> Self {
        MemoryPersister { records: Vec::new(), head: i64::MIN }
    }
}

impl<M: Clone + Send> Persister<M> for MemoryPersister<M> {
    fn append(&mut self, record: PersistedRecord<M>) -> CResult<()> {
        self.head = self.head.max(record.begin_us);
        self.records.push(record);
        Ok(())
    }

    fn next_index(&self) -> u64 {
        self.records.last().map(|r| r.index + 1).unwrap_or(0)
    }

    fn last_us(&self) -> Us {
        self.records.last().map(|r| r.begin_us).unwrap_or(i64::MIN).max(self.head)
    }

    fn status(&self) -> Status {
        Status {
            record_count: self.records.len() as u64,
            last_us: self.last_us(),
            bytes_on_disk: 0,
        }
    }

    fn replay(&self) -> CResult<Vec<PersistedRecord<M>>> {
        Ok(self.records.clone())
    }

    fn update_head(&mut self, us: Us) -> CResult<()> {
        self.head = self.head.max(us);
        Ok(())
    }
}
