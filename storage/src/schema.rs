//! The seam a declared schema's generated `Fields` struct plugs into the
//! transaction engine through. Where the original engine used reflection
//! over a cyclic C++ template graph to discover a schema's fields at
//! compile time, this crate asks a schema to implement one small trait:
//! "given one of your own mutations (or undos), apply it to yourself."
//! Everything else -- container storage, eviction, journaling -- is generic
//! and lives in `container/` and `journal.rs`.

/// Implemented by a schema's owned `Fields` struct (one `Dictionary`/
/// `Matrix`/`Vector` per declared field). `M` is that schema's closed
/// `Mutation` enum (serialized, sent to followers); `U` is its `Undo` enum
/// (in-memory only).
pub trait SchemaFields<M, U> {
    /// Applies a mutation read from a persisted or replicated record. Used
    /// by followers and by recovery-from-persister on open.
    fn apply_replay(&mut self, mutation: M);

    /// Reverses one recorded undo step. Called by the transaction engine,
    /// in the journal's reverse-recording order, when a transaction rolls
    /// back.
    fn apply_undo(&mut self, undo: U);
}
