//! Error types for the synchronization engine.

use thiserror::Error;

/// Result type for synchronization runs.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for document store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors raised by a document store client.
///
/// A lookup miss is not an error; see [`crate::Lookup`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// The target database does not exist.
    #[error("database does not exist: {0}")]
    MissingDatabase(String),

    /// The supplied revision token is stale (or absent for an existing document).
    #[error("revision conflict on {database}/{id}")]
    Conflict {
        /// Database name.
        database: String,
        /// Document id.
        id: String,
    },

    /// The database already exists. Reconciliation treats this as success.
    #[error("database already exists: {0}")]
    DatabaseExists(String),

    /// Any other failed request.
    #[error("store transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// HTTP status, when one was received.
        status: Option<u16>,
    },

    /// The store answered with a body that could not be decoded.
    #[error("store decode error: {0}")]
    Decode(String),
}

impl StoreError {
    /// Creates a transport error without a status code.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }
}

/// Errors raised by a catalog client.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The catalog answered 404.
    #[error("catalog path not found: {0}")]
    NotFound(String),

    /// The platform envelope reported a failure.
    #[error("catalog API error {code}: {status}")]
    Api {
        /// Platform error code (1 means success).
        code: i64,
        /// Platform error status text.
        status: String,
    },

    /// Any other failed request.
    #[error("catalog transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// HTTP status, when one was received.
        status: Option<u16>,
    },

    /// The body could not be decoded.
    #[error("catalog decode error: {0}")]
    Decode(String),
}

impl CatalogError {
    /// Creates a transport error without a status code.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }
}

/// Upstream data that must never be patched over.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    /// A collection key is not a 32-bit integer.
    #[error("{kind}: key {key:?} is not a 32-bit hash")]
    InvalidHashKey {
        /// Source collection name.
        kind: String,
        /// The offending key.
        key: String,
    },

    /// An entity declares a `hash` different from its key.
    #[error("{kind}: entity under key {key} declares hash {declared}")]
    HashMismatch {
        /// Source collection name.
        kind: String,
        /// Container key.
        key: i64,
        /// Declared hash, as found in the payload.
        declared: String,
    },

    /// Two gear definitions disagree on the payload of the same dye.
    #[error("dye {hash} has divergent definitions ({first_source} vs {second_source})")]
    DivergentDye {
        /// Dye hash.
        hash: String,
        /// Gear file the dye was first seen in.
        first_source: String,
        /// Gear file carrying the divergent copy.
        second_source: String,
    },

    /// No relational snapshot is published with the required format version.
    #[error("manifest has no snapshot with format version {version}")]
    MissingSnapshotVersion {
        /// Required version.
        version: u32,
    },
}

/// A JSON payload did not have the expected shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected {expected} at {location}")]
pub struct ShapeError {
    /// Expected JSON type.
    pub expected: &'static str,
    /// Where in the payload the mismatch was found.
    pub location: String,
}

/// Errors that abort a synchronization run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Document store failure (includes revision conflicts).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Catalog failure.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Upstream data corruption.
    #[error("integrity violation: {0}")]
    Integrity(#[from] IntegrityViolation),

    /// Payload shape mismatch.
    #[error("malformed payload: {0}")]
    Shape(#[from] ShapeError),

    /// Snapshot archive could not be unpacked or read.
    #[error("archive error: {0}")]
    Archive(String),

    /// Local scratch storage failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Returns true if a concurrent editor won an optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Store(StoreError::Conflict { .. }))
    }

    /// Returns true if the run aborted on corrupt upstream data.
    pub fn is_integrity(&self) -> bool {
        matches!(self, SyncError::Integrity(_))
    }
}
