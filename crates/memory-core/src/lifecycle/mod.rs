//! Background-task lifecycle manager (C10, spec §4.10)
//!
//! Owns every interval/timeout/worker the engine spawns so `shutdown`
//! has one place to cancel them from. Nothing here runs tasks itself —
//! it just tracks handles so they can be torn down together instead of
//! leaking detached tokio tasks past process shutdown.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;

/// A named background task plus the handle needed to cancel it.
struct Registered {
    name: String,
    handle: JoinHandle<()>,
}

pub struct LifecycleManager {
    intervals: Mutex<Vec<Registered>>,
    timeouts: Mutex<Vec<Registered>>,
    workers: Mutex<Vec<Registered>>,
    cleanup_hooks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    shut_down: AtomicBool,
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self {
            intervals: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
            cleanup_hooks: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Spawn `task` as a repeating interval and track it under `name`
    /// so `shutdown` aborts it. `task` is responsible for its own
    /// `tokio::time::interval` loop.
    pub fn register_interval<F>(&self, name: &str, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.intervals.lock().push(Registered {
            name: name.to_string(),
            handle,
        });
    }

    pub fn clear_interval(&self, name: &str) {
        remove_and_abort(&self.intervals, name);
    }

    /// Spawn `task` as a one-shot delayed task tracked under `name`.
    pub fn register_timeout<F>(&self, name: &str, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.timeouts.lock().push(Registered {
            name: name.to_string(),
            handle,
        });
    }

    pub fn clear_timeout(&self, name: &str) {
        remove_and_abort(&self.timeouts, name);
    }

    /// Spawn a long-running worker loop tracked under `name`.
    pub fn register_worker<F>(&self, name: &str, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.workers.lock().push(Registered {
            name: name.to_string(),
            handle,
        });
    }

    pub fn terminate_worker(&self, name: &str) {
        remove_and_abort(&self.workers, name);
    }

    /// Register a synchronous hook to run once, in registration order,
    /// during `shutdown` — before any task is aborted, so a hook can
    /// still observe in-flight state (e.g. flush a counter) if it
    /// needs to.
    pub fn register_cleanup<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cleanup_hooks.lock().push(Box::new(hook));
    }

    pub fn active_interval_count(&self) -> usize {
        self.intervals.lock().len()
    }

    pub fn active_worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Run cleanup hooks, then abort every tracked interval/timeout/
    /// worker. Idempotent: a second call is a no-op (spec §4.10:
    /// "shutdown is idempotent and atomic").
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        for hook in self.cleanup_hooks.lock().drain(..) {
            hook();
        }

        for registered in self.intervals.lock().drain(..) {
            registered.handle.abort();
        }
        for registered in self.timeouts.lock().drain(..) {
            registered.handle.abort();
        }
        for registered in self.workers.lock().drain(..) {
            registered.handle.abort();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

fn remove_and_abort(list: &Mutex<Vec<Registered>>, name: &str) {
    let mut guard = list.lock();
    if let Some(pos) = guard.iter().position(|r| r.name == name) {
        guard.remove(pos).handle.abort();
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
