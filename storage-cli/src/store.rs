//! The schema this CLI operates on: a single ordered dictionary mapping
//! string keys to arbitrary JSON values, i.e. a generic key/value surface
//! analogous to the byte-oriented `get`/`set`/`delete` the engine this CLI
//! grew out of exposed directly.

use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use storage::clock::Us;
use storage::container::dict::{DictEvent, DictUndo, Dictionary};
use storage::container::DictEntry;
use storage::schema::SchemaFields;
use storage::txn::TxnContext;
use storage::typeid::{mutation_type_id, ReflectedMutation, TypeId128};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub value: Value,
}

impl DictEntry for Entry {
    type Key = String;
    fn key(&self) -> String {
        self.key.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Mutation {
    Updated { us: Us, data: Entry },
    Deleted { us: Us, key: String },
}

impl ReflectedMutation for Mutation {
    fn type_id(&self) -> TypeId128 {
        match self {
            Mutation::Updated { .. } => mutation_type_id("Updated", &["us", "data"]),
            Mutation::Deleted { .. } => mutation_type_id("Deleted", &["us", "key"]),
        }
    }
}

pub enum Undo {
    Store(DictUndo<Entry>),
}

pub struct Fields {
    pub store: Dictionary<Entry>,
}

impl Fields {
    pub fn new() -> Self {
        Fields { store: Dictionary::ordered() }
    }

    pub fn put(&mut self, ctx: &mut TxnContext<Mutation, Undo>, key: String, value: Value) {
        let us = ctx.next_us();
        let entry = Entry { key, value };
        let (_event, undo) = self.store.add(entry.clone(), us);
        ctx.record(Mutation::Updated { us, data: entry }, Undo::Store(undo));
    }

    pub fn del(&mut self, ctx: &mut TxnContext<Mutation, Undo>, key: &str) -> bool {
        let us = ctx.next_us();
        match self.store.erase(&key.to_string(), us) {
            Some((_event, undo)) => {
                ctx.record(Mutation::Deleted { us, key: key.to_string() }, Undo::Store(undo));
                true
            }
            None => false,
        }
    }
}

impl SchemaFields<Mutation, Undo> for Fields {
    fn apply_replay(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::Updated { us, data } => self.store.apply_event(DictEvent::Updated { us, data }),
            Mutation::Deleted { us, key } => self.store.apply_event(DictEvent::Deleted { us, key }),
        }
    }

    fn apply_undo(&mut self, undo: Undo) {
        match undo {
            Undo::Store(undo) => self.store.apply_undo(undo),
        }
    }
}
