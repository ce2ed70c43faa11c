//! Identifier pool
//!
//! Hands out unique integers from `[1, capacity]`, lowest first, and makes
//! them durable only once the action tied to the id has been observed on the
//! ledger:
//! - `pool_store`: durable file representation (atomic rewrite)
//! - `pool_allocator`: the shared allocator and its RAII reservations
//! - `pool_errors`: error taxonomy

pub mod pool_allocator;
pub mod pool_errors;
pub mod pool_store;

pub use pool_allocator::{next_free, IdReservation, IdentifierPool, PoolStatus};
pub use pool_errors::{PoolError, PoolResult};
pub use pool_store::{CorruptionPolicy, PoolStore};
