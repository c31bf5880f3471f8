// SPDX-License-Identifier: MIT OR Apache-2.0
//! Read-only connection pool over a finished store.
//!
//! The engine allows one writer but any number of readers; the pool opens
//! a fixed set of read-only connections up front and hands them out as
//! RAII guards. `acquire` blocks until a connection returns, so callers
//! queue instead of failing under contention.

use std::ops::Deref;
use std::path::Path;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::{LoadError, Result};
use crate::query::Condition;
use crate::store::{Store, StoreLimits};
use crate::types::DomainRecord;

pub struct ConnectionPool {
    slots_rx: Receiver<Store>,
    slots_tx: Sender<Store>,
    size: usize,
}

impl ConnectionPool {
    /// Open `size` read-only connections against the store at `path`.
    /// Fails up front if the store is missing or any connection cannot
    /// open, rather than surprising the first caller.
    pub fn open(path: &Path, size: usize, limits: &StoreLimits) -> Result<Self> {
        if size == 0 {
            return Err(LoadError::InvalidConfig(
                "connection pool size must be at least 1".to_string(),
            ));
        }
        let (slots_tx, slots_rx) = bounded(size);
        for _ in 0..size {
            let store = Store::open_read_only(path, limits)?;
            // Channel has exactly `size` slots; this cannot block.
            slots_tx.send(store).expect("pool channel sized to fit");
        }
        Ok(Self {
            slots_rx,
            slots_tx,
            size,
        })
    }

    /// Block until a connection is free.
    pub fn acquire(&self) -> PooledStore<'_> {
        // The pool owns a sender half for returns, so the channel can
        // never disconnect while `self` is alive.
        let store = self.slots_rx.recv().expect("pool sender half alive");
        PooledStore {
            store: Some(store),
            pool: self,
        }
    }

    /// Like `acquire`, but give up after `timeout`. `None` means every
    /// connection stayed busy for the whole wait.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<PooledStore<'_>> {
        self.slots_rx.recv_timeout(timeout).ok().map(|store| PooledStore {
            store: Some(store),
            pool: self,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Convenience: acquire, query, release.
    pub fn query(&self, condition: &Condition, limit: usize) -> Result<Vec<DomainRecord>> {
        self.acquire().query(condition, limit)
    }

    /// Convenience: acquire, count, release.
    pub fn count_matching(&self, condition: &Condition) -> Result<u64> {
        self.acquire().count_matching(condition)
    }
}

/// A checked-out connection. Dropping it returns the connection to the
/// pool and wakes one blocked `acquire`.
pub struct PooledStore<'a> {
    store: Option<Store>,
    pool: &'a ConnectionPool,
}

impl Deref for PooledStore<'_> {
    type Target = Store;

    fn deref(&self) -> &Store {
        self.store.as_ref().expect("present until drop")
    }
}

impl Drop for PooledStore<'_> {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            // Send only fails if the pool itself is gone, and the borrow
            // makes that impossible; ignore the result regardless.
            let _ = self.pool.slots_tx.send(store);
        }
    }
}
