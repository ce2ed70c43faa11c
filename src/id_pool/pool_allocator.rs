//! Lowest-first identifier allocator with RAII reservations
//!
//! `reserve()` picks the lowest id that is neither committed nor held by
//! another reservation. The id stays in memory only until
//! `IdReservation::commit()` persists it; dropping the reservation instead
//! returns the id to the pool. A crash between reserve and commit therefore
//! leaves nothing on disk, and the next run hands out the same id again.
//!
//! All reservations and commits go through one mutex, which is the only
//! shared mutable state between concurrent workflow runs.

use super::pool_errors::{PoolError, PoolResult};
use super::pool_store::PoolStore;
use crate::metrics::metrics;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// First id in `[1, capacity]` not present in `allocated`
pub fn next_free(allocated: &BTreeSet<u32>, capacity: u32) -> Option<u32> {
    lowest_untaken(capacity, |id| allocated.contains(&id))
}

fn lowest_untaken(capacity: u32, taken: impl Fn(u32) -> bool) -> Option<u32> {
    (1..=capacity).find(|&id| !taken(id))
}

#[derive(Debug, Default)]
struct PoolState {
    allocated: BTreeSet<u32>,
    in_flight: BTreeSet<u32>,
}

impl PoolState {
    /// Lowest id neither committed nor reserved
    fn first_free(&self, capacity: u32) -> Option<u32> {
        lowest_untaken(capacity, |id| self.allocated.contains(&id) || self.in_flight.contains(&id))
    }

    fn publish_gauges(&self) {
        let m = metrics();
        m.pool_allocated.set(self.allocated.len() as i64);
        m.pool_in_flight.set(self.in_flight.len() as i64);
    }
}

#[derive(Debug)]
struct PoolShared {
    store: PoolStore,
    state: Mutex<PoolState>,
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    pub capacity: u32,
    pub allocated: usize,
    pub in_flight: usize,
    pub free: usize,
    pub next_free: Option<u32>,
}

/// Shared handle to the identifier pool (cheap to clone)
#[derive(Debug, Clone)]
pub struct IdentifierPool {
    shared: Arc<PoolShared>,
}

impl IdentifierPool {
    /// Open the pool, loading the committed set from `store`
    pub fn open(store: PoolStore) -> PoolResult<Self> {
        if store.capacity() == 0 {
            return Err(PoolError::Configuration(
                "identifier pool capacity must be at least 1".to_string(),
            ));
        }
        let allocated = store.load()?;
        info!(
            path = %store.path().display(),
            capacity = store.capacity(),
            allocated = allocated.len(),
            "Identifier pool opened"
        );
        let state = PoolState {
            allocated,
            in_flight: BTreeSet::new(),
        };
        state.publish_gauges();
        Ok(Self {
            shared: Arc::new(PoolShared {
                store,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn capacity(&self) -> u32 {
        self.shared.store.capacity()
    }

    /// Reserve the lowest free id. Nothing is persisted until commit.
    pub fn reserve(&self) -> PoolResult<IdReservation> {
        let capacity = self.capacity();
        let mut state = self.shared.state.lock();
        let id = state
            .first_free(capacity)
            .ok_or(PoolError::Exhausted { capacity })?;
        state.in_flight.insert(id);
        state.publish_gauges();
        debug!(id, "Identifier reserved");

        Ok(IdReservation {
            id,
            pool: self.clone(),
            settled: false,
        })
    }

    /// Persist `id` as allocated. The write completes before the in-memory
    /// set changes, so a failed save leaves the id free.
    ///
    /// Blocks on a full-file rewrite plus fsync while holding the pool lock.
    /// Async callers go through `IdReservation::commit_async`.
    pub fn commit(&self, id: u32) -> PoolResult<()> {
        let capacity = self.capacity();
        if id == 0 || id > capacity {
            return Err(PoolError::OutOfRange { id, capacity });
        }

        let mut state = self.shared.state.lock();
        if state.allocated.contains(&id) {
            return Err(PoolError::AlreadyAllocated(id));
        }
        if state.allocated.len() as u64 >= capacity as u64 {
            return Err(PoolError::Exhausted { capacity });
        }

        let mut next = state.allocated.clone();
        next.insert(id);
        self.shared.store.save(&next)?;

        state.allocated = next;
        state.in_flight.remove(&id);
        state.publish_gauges();
        info!(id, allocated = state.allocated.len(), "Identifier committed");
        Ok(())
    }

    fn release_in_flight(&self, id: u32) {
        let mut state = self.shared.state.lock();
        if state.in_flight.remove(&id) {
            state.publish_gauges();
            debug!(id, "Identifier reservation released");
        }
    }

    /// Committed ids, ascending
    pub fn allocated(&self) -> Vec<u32> {
        self.shared.state.lock().allocated.iter().copied().collect()
    }

    pub fn status(&self) -> PoolStatus {
        let capacity = self.capacity();
        let state = self.shared.state.lock();
        let used = state.allocated.len() + state.in_flight.len();
        PoolStatus {
            capacity,
            allocated: state.allocated.len(),
            in_flight: state.in_flight.len(),
            free: (capacity as usize).saturating_sub(used),
            next_free: state.first_free(capacity),
        }
    }
}

/// An id held for one workflow run.
///
/// Dropping the reservation without `commit()` returns the id to the pool;
/// nothing was ever written for it.
#[derive(Debug)]
pub struct IdReservation {
    id: u32,
    pool: IdentifierPool,
    settled: bool,
}

impl IdReservation {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Persist the id. On error the reservation is dropped and the id is free again.
    pub fn commit(mut self) -> PoolResult<u32> {
        self.pool.commit(self.id)?;
        self.settled = true;
        Ok(self.id)
    }

    /// `commit()` on tokio's blocking pool, keeping the fsync off the
    /// runtime worker. If the task dies the reservation is dropped with it.
    pub async fn commit_async(self) -> PoolResult<u32> {
        let id = self.id;
        tokio::task::spawn_blocking(move || self.commit())
            .await
            .map_err(|e| PoolError::CommitInterrupted {
                id,
                reason: e.to_string(),
            })?
    }

    /// Give the id back explicitly (same effect as dropping)
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for IdReservation {
    fn drop(&mut self) {
        if !self.settled {
            self.pool.release_in_flight(self.id);
        }
    }
}
