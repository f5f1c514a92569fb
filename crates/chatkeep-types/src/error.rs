use thiserror::Error;

/// Boxed underlying cause attached to storage-level errors.
///
/// Keeps this crate free of any driver dependency while still letting callers
/// walk the `source()` chain down to the original driver error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Connection and file-level failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot open database at '{path}'")]
    Open {
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("database is busy after {attempts} attempts")]
    Busy {
        attempts: u32,
        #[source]
        source: BoxError,
    },

    #[error("database connection error")]
    Connection(#[source] BoxError),
}

/// Schema convergence failures. Always fatal at startup.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("duplicate migration version {0}")]
    DuplicateVersion(i64),

    #[error("invalid migration version {0}: versions start at 1")]
    InvalidVersion(i64),

    #[error("migration {version} ({description}) failed")]
    Failed {
        version: i64,
        description: String,
        #[source]
        source: BoxError,
    },

    #[error("applied migration {version} does not match its definition: recorded checksum '{recorded}', expected '{expected}'")]
    ChecksumMismatch {
        version: i64,
        recorded: String,
        expected: String,
    },

    #[error("cannot read migration bookkeeping: {0}")]
    Bookkeeping(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl MigrationError {
    /// The migration version this error concerns, if any.
    pub fn version(&self) -> Option<i64> {
        match self {
            MigrationError::DuplicateVersion(v) | MigrationError::InvalidVersion(v) => Some(*v),
            MigrationError::Failed { version, .. }
            | MigrationError::ChecksumMismatch { version, .. } => Some(*version),
            MigrationError::Bookkeeping(_) | MigrationError::Storage(_) => None,
        }
    }
}

/// A config file that exists but cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: BoxError,
    },
}

/// Malformed input, rejected before any statement executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid message role: '{0}'")]
    UnknownRole(String),

    #[error("unknown provider: '{0}'")]
    UnknownProvider(String),

    #[error("username must not be empty")]
    EmptyUsername,

    #[error("invalid id {0}: storage ids are positive")]
    InvalidId(i64),
}

/// Errors from repository operations (used by trait definitions in chatkeep-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("conflict: {message}")]
    Conflict {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("foreign key violation: {message}")]
    ForeignKey {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("constraint violation: {message}")]
    Constraint {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("statement failed: {message}")]
    Statement {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("cannot map row: {0}")]
    Mapping(String),

    #[error("entity not found")]
    NotFound,
}

impl RepositoryError {
    /// True when the error is a uniqueness violation reported by the store.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RepositoryError::Conflict { .. })
    }
}
