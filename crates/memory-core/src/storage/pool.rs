//! Bounded reader pool (C5, spec §4.5)
//!
//! `Store`'s writer is a single serialized connection (SQLite only
//! allows one writer), but reads fan out across up to `pool_max_conns`
//! connections so concurrent `get_relevant` calls don't queue behind
//! each other. Acquisition blocks up to `pool_acquire_timeout_ms`
//! before returning `MemoryError::Timeout`, mirroring the teacher's
//! bounded-wait pattern for its task queue.

use crate::error::{MemoryError, Result};
use parking_lot::{Condvar, Mutex};
use rusqlite::Connection;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct PoolMetrics {
    pub acquired_total: AtomicU64,
    pub timed_out_total: AtomicU64,
    pub retries_total: AtomicU64,
}

struct Inner {
    idle: Mutex<Vec<Connection>>,
    condvar: Condvar,
    max_conns: usize,
    checked_out: Mutex<usize>,
}

/// A bounded pool of read-only SQLite connections.
pub struct ReaderPool {
    inner: Arc<Inner>,
    acquire_timeout: Duration,
    pub metrics: Arc<PoolMetrics>,
}

/// RAII guard; returns its connection to the pool on drop.
pub struct PooledConnection {
    conn: Option<Connection>,
    inner: Arc<Inner>,
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken before drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let mut idle = self.inner.idle.lock();
            idle.push(conn);
            *self.inner.checked_out.lock() -= 1;
            self.inner.condvar.notify_one();
        }
    }
}

impl ReaderPool {
    pub fn open(path: &Path, max_conns: usize, acquire_timeout_ms: u64) -> Result<Self> {
        let mut idle = Vec::with_capacity(max_conns);
        for _ in 0..max_conns {
            let conn = Connection::open(path)?;
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA query_only = ON;")?;
            idle.push(conn);
        }

        Ok(Self {
            inner: Arc::new(Inner {
                idle: Mutex::new(idle),
                condvar: Condvar::new(),
                max_conns,
                checked_out: Mutex::new(0),
            }),
            acquire_timeout: Duration::from_millis(acquire_timeout_ms),
            metrics: Arc::new(PoolMetrics::default()),
        })
    }

    pub fn acquire(&self) -> Result<PooledConnection> {
        let deadline = Instant::now() + self.acquire_timeout;
        let mut idle = self.inner.idle.lock();
        while idle.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                self.metrics.timed_out_total.fetch_add(1, Ordering::Relaxed);
                return Err(MemoryError::Timeout("reader pool exhausted".into()));
            }
            let timed_out = self.inner.condvar.wait_for(&mut idle, deadline - now);
            if timed_out.timed_out() && idle.is_empty() {
                self.metrics.timed_out_total.fetch_add(1, Ordering::Relaxed);
                return Err(MemoryError::Timeout("reader pool exhausted".into()));
            }
        }
        let conn = idle.pop().expect("checked non-empty above");
        *self.inner.checked_out.lock() += 1;
        self.metrics.acquired_total.fetch_add(1, Ordering::Relaxed);
        Ok(PooledConnection {
            conn: Some(conn),
            inner: self.inner.clone(),
        })
    }

    /// Run `op` against a pooled connection, retrying once on a
    /// `Timeout`/`Unavailable` class error (spec §7: "low-level errors
    /// are recovered locally when idempotent").
    pub fn execute_with_retry<T>(&self, op: impl Fn(&Connection) -> Result<T>) -> Result<T> {
        match self.acquire().and_then(|conn| op(&conn)) {
            Err(e) if e.is_retryable() => {
                self.metrics.retries_total.fetch_add(1, Ordering::Relaxed);
                let conn = self.acquire()?;
                op(&conn)
            }
            other => other,
        }
    }

    pub fn active_count(&self) -> usize {
        *self.inner.checked_out.lock()
    }

    pub fn capacity(&self) -> usize {
        self.inner.max_conns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release_returns_connection_to_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.db");
        Connection::open(&path).unwrap();
        let pool = ReaderPool::open(&path, 2, 1000).unwrap();

        {
            let _conn = pool.acquire().unwrap();
            assert_eq!(pool.active_count(), 1);
        }
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn acquire_times_out_when_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool2.db");
        Connection::open(&path).unwrap();
        let pool = ReaderPool::open(&path, 1, 50).unwrap();

        let _held = pool.acquire().unwrap();
        let err = pool.acquire();
        assert!(matches!(err, Err(MemoryError::Timeout(_))));
    }

    #[test]
    fn execute_with_retry_succeeds_on_first_try() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool3.db");
        Connection::open(&path).unwrap();
        let pool = ReaderPool::open(&path, 1, 1000).unwrap();

        let result: Result<i64> = pool.execute_with_retry(|conn| {
            conn.query_row("SELECT 1", [], |r| r.get(0)).map_err(Into::into)
        });
        assert_eq!(result.unwrap(), 1);
    }
}
