//! A transactional, schema-driven, append-only storage engine.
//!
//! Schemas declare a set of typed containers (`Dictionary`, `Matrix`,
//! `Vector`); the engine gives them ACID-ish single-writer transactions
//! (`txn::Storage::write`), a durable mutation log (`persister`), and
//! stream-based replication to followers (`stream`, `follower`). A REST
//! projection (`rest`) is provided as a contract other crates adapt a real
//! HTTP framework to, not as a bundled server.
//!
//! See `storage-example` for a worked schema (a `users` dictionary and a
//! `likes` many-to-many matrix) and `storage-cli` for a command-line client.

pub mod clock;
pub mod config;
pub mod container;
pub mod error;
pub mod follower;
pub mod journal;
pub mod persister;
pub mod rest;
pub mod schema;
pub mod stream;
pub mod txn;
pub mod typeid;

pub use clock::{Clock, SystemClock, Us};
pub use error::{CResult, Error};
pub use schema::SchemaFields;
pub use txn::{Outcome, Storage, TxnContext};
