use std::path::PathBuf;
use thiserror::Error;

pub type PoolResult<T> = Result<T, PoolError>;

/// Identifier pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    /// Every id in `[1, capacity]` is committed or in flight
    #[error("Identifier pool exhausted (capacity: {capacity})")]
    Exhausted { capacity: u32 },

    /// Persisted state could not be read back as a valid id set
    #[error("Identifier store {path} is corrupt: {reason}")]
    StorageCorrupt { path: PathBuf, reason: String },

    /// Attempt to commit an id that is already durable
    #[error("Identifier {0} is already allocated")]
    AlreadyAllocated(u32),

    /// Id outside `[1, capacity]`
    #[error("Identifier {id} is outside [1, {capacity}]")]
    OutOfRange { id: u32, capacity: u32 },

    /// Invalid pool configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The blocking commit task died before reporting back
    #[error("Commit of identifier {id} interrupted: {reason}")]
    CommitInterrupted { id: u32, reason: String },

    /// Filesystem failure while reading or writing the store
    #[error("Identifier store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PoolError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PoolError::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors an operator has to resolve by hand before the pool can be used
    pub fn requires_operator(&self) -> bool {
        matches!(
            self,
            PoolError::StorageCorrupt { .. } | PoolError::Configuration(_) | PoolError::Io { .. }
        )
    }
}
