//! Typed containers shared by every declared storage schema: `Dictionary`,
//! `Matrix` (in four uniqueness flavors), and `Vector`. Every container
//! follows the same shape the teacher's `Engine` trait uses for its raw
//! byte-oriented store (`get`/`set`/`delete`/`scan`/`status`), generalized
//! here from `Vec<u8>` to typed keys and entries, and specialized with the
//! `Add`/`Erase` mutation-emission contract storage.md §4.1 requires.
//!
//! Containers never touch a journal directly (see `txn.rs`): they return the
//! raw events and undo records a write produced, and the schema-generated
//! field wrapper is responsible for tagging them into the storage's closed
//! `Mutation`/`Undo` enums and recording them into the active `Journal`.
//! This is the Rust rendering of storage.md §9's "borrowed journal handle
//! passed into the user closure" redesign note: nothing here stores a
//! long-lived reference to the journal, so there is no lifetime entanglement
//! between containers and the engine that owns them.

pub mod dict;
pub mod matrix;
pub mod vector;

/// The container classification tag reflected alongside a schema's field
/// descriptors (storage.md §4.1), consumed by the external reflection
/// subsystem to produce per-language type descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Dictionary { ordered: bool },
    Matrix { multiplicity: Multiplicity, row_ordered: bool, col_ordered: bool },
    Vector,
}

/// Matrix uniqueness flavor, per storage.md §3 invariant 8 and §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    /// No uniqueness constraint: any number of cells may share a row or a column.
    ManyToMany,
    /// Each column value is unique: adding `(r, c)` evicts any existing cell sharing `c`.
    OneToMany,
    /// Each row value is unique: adding `(r, c)` evicts any existing cell sharing `r`.
    ManyToOne,
    /// Both axes are unique: adding `(r, c)` evicts any cell sharing `r` or `c`.
    OneToOne,
}

/// A container entry that knows its own dictionary key, mirroring this
/// codebase's `Key<'a>` enum on the raw byte engine: instead of passing a
/// key alongside a value, the value carries it and `Dictionary` derives it.
pub trait DictEntry: Clone {
    type Key: Clone + Eq + std::hash::Hash + Ord;
    fn key(&self) -> Self::Key;
}

/// A container entry that knows both endpoints of the cell it occupies in a
/// `Matrix`.
pub trait MatrixEntry: Clone {
    type Row: Clone + Eq + std::hash::Hash + Ord;
    type Col: Clone + Eq + std::hash::Hash + Ord;
    fn row(&self) -> Self::Row;
    fn col(&self) -> Self::Col;
}

