//! The per-transaction mutation journal: a `commit_log` of mutations bound
//! for the persister, and a `rollback_log` of in-memory-only undo records
//! sufficient to reverse them. Both grow in lockstep as container methods
//! are called from inside a transaction closure, and the transaction engine
//! (`txn.rs`) is the only thing that ever reads them back out.

use std::collections::BTreeMap;

use crate::clock::Us;

/// Bound to a schema's generated `Mutation` and `Undo` enums. Created fresh
/// by the engine for each transaction and passed by mutable borrow into the
/// user's closure -- it never outlives that one call, so it never needs to
/// be stored inside a container or `Fields` struct.
pub struct Journal<M, U> {
    begin_us: Us,
    last_us: Us,
    commit_log: Vec<M>,
    rollback_log: Vec<U>,
    meta_fields: BTreeMap<String, String>,
}

impl<M, U> Journal<M, U> {
    pub fn new(begin_us: Us) -> Self {
        Journal {
            begin_us,
            last_us: begin_us,
            commit_log: Vec::new(),
            rollback_log: Vec::new(),
            meta_fields: BTreeMap::new(),
        }
    }

    /// Returns the next timestamp to stamp a mutation with: strictly greater
    /// than every timestamp already recorded in this transaction, and no
    /// earlier than the clock's own reading (invariant 1: "strictly
    /// increasing `us` within one transaction's mutation sequence").
    pub fn next_us(&mut self, observed_now: Us) -> Us {
        let candidate = observed_now.max(self.last_us + 1);
        self.last_us = candidate;
        candidate
    }

    pub fn record(&mut self, mutation: M, undo: U) {
        self.commit_log.push(mutation);
        self.rollback_log.push(undo);
    }

    pub fn is_empty(&self) -> bool {
        self.commit_log.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commit_log.len()
    }

    pub fn begin_us(&self) -> Us {
        self.begin_us
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.meta_fields.insert(key.into(), value.into());
    }

    pub fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta_fields
    }

    /// Consumes the journal, handing the engine the commit log (to persist),
    /// the transaction's `end_us` (the last `us` stamped by any mutation in
    /// it), and discarding the rollback log (no longer needed once
    /// committed).
    pub fn into_commit_log(self) -> (Vec<M>, Us, BTreeMap<String, String>) {
        (self.commit_log, self.last_us, self.meta_fields)
    }

    /// Drains the rollback log in the order it must be replayed: most
    /// recent mutation first. The caller (the transaction engine) applies
    /// each entry to the matching container via that container's
    /// `apply_undo`.
    pub fn drain_rollback(self) -> Vec<U> {
        let mut log = self.rollback_log;
        log.reverse();
        log
    }
}
