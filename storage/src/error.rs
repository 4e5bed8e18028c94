//! Error kinds for the storage engine, grouped the way `storage.md` §7 groups them:
//! programming errors (invariant breaches), control-flow rollback, user exceptions,
//! control-plane violations on master/follower transitions, and I/O failures.

/// Convenience alias, named the way this codebase's ancestor named its own `CResult`.
pub type CResult<T> = Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A container was mutated or read outside an active transaction. This indicates
    /// a bug in the calling code, not a recoverable runtime condition.
    #[error("container accessed outside an active transaction")]
    NotInTransaction,

    /// The journal was asserted empty at transaction start but wasn't.
    #[error("transaction journal was not empty at begin()")]
    JournalNotEmpty,

    /// The user's transaction closure returned `Outcome::Abort(None)`: an
    /// exception with no application-supplied reason. The journal was already
    /// reversed by `Storage::write` before this error was constructed.
    #[error("transaction rolled back")]
    RolledBack,

    /// The user's transaction closure returned `Outcome::Abort(Some(reason))`.
    /// `reason` is the closure's abort payload, formatted with `{:?}` since
    /// `write`'s error payload type only requires `Debug`, not `Display`.
    #[error("transaction aborted: {0}")]
    User(String),

    /// A `ReadWriteTransaction` was attempted on a storage whose publisher authority
    /// lives on an external stream (i.e. this storage is a follower).
    #[error("this storage is a follower and cannot accept write transactions")]
    FollowerWriteNotAllowed,

    /// `flip_to_master()` was called on a storage that already owns the publisher.
    #[error("storage is already master")]
    AlreadyMaster,

    /// `flip_to_master()` was called while the stream's publisher token is still
    /// held externally.
    #[error("stream publisher authority is held externally")]
    ExternalAuthority,

    /// `GracefulShutdown()` was called previously; no new transactions are accepted.
    #[error("storage is shutting down")]
    ShutdownInProgress,

    /// Appending the committed transaction to the persister failed. The storage
    /// cannot safely continue serving write transactions after this.
    #[error("failed to durably append transaction: {0}")]
    PersisterAppendFailed(String),

    /// `publish_at` was called with a `us` that does not exceed the persister's
    /// last recorded timestamp.
    #[error("timestamp {given} does not exceed persister head {head}")]
    NonMonotonicTimestamp { given: i64, head: i64 },

    /// While replaying into a follower, the index or timestamp of an incoming
    /// record disagreed with what the subscriber expected next.
    #[error("replay mismatch: expected index {expected}, found {found}")]
    ReplayMismatch { expected: u64, found: u64 },

    /// REST-layer header parsing failed (e.g. a malformed `If-Unmodified-Since`).
    #[error("failed to parse header: {0}")]
    HeaderParse(String),

    /// REST-layer key parsing failed (e.g. a malformed URL key segment).
    #[error("failed to parse key: {0}")]
    KeyParse(String),

    /// REST-layer body parsing failed (malformed JSON, wrong shape, etc.)
    #[error("failed to parse request body: {0}")]
    BodyParse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}
