//! Background maintenance worker.
//!
//! One thread per open array handles the work that must not run on the
//! caller's stack: deferred garbage collection after a boundary-crossing
//! shift, and delivery of backlog-evicted entries to the user callback.
//!
//! GC scheduling is coalesced: a pending flag guarantees at most one queued
//! collection pass, and the pass recomputes the live span from the shared
//! cursor cell when it actually runs. Worker failures are logged and never
//! propagate into the synchronous call path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use eyre::{Result, WrapErr};
use tracing::warn;

use crate::array::gc::GcContext;
use crate::config::BacklogFn;

enum Task {
    Gc,
    Backlog(Vec<u8>),
    Shutdown,
}

pub(crate) struct Worker {
    tx: Sender<Task>,
    handle: Option<JoinHandle<()>>,
    gc_pending: Arc<AtomicBool>,
}

impl Worker {
    pub fn spawn(gc: GcContext, mut backlog: Option<BacklogFn>) -> Result<Self> {
        let gc_pending = Arc::new(AtomicBool::new(false));
        let pending = Arc::clone(&gc_pending);
        let (tx, rx) = mpsc::channel();

        let handle = std::thread::Builder::new()
            .name("bigring-maint".into())
            .spawn(move || {
                for task in rx {
                    match task {
                        Task::Gc => {
                            if let Err(err) = gc.collect() {
                                warn!(error = ?err, "deferred garbage collection failed");
                            }
                            pending.store(false, Ordering::Release);
                        }
                        Task::Backlog(entry) => {
                            if let Some(callback) = backlog.as_mut() {
                                callback(entry);
                            }
                        }
                        Task::Shutdown => break,
                    }
                }
            })
            .wrap_err("failed to spawn maintenance thread")?;

        Ok(Self {
            tx,
            handle: Some(handle),
            gc_pending,
        })
    }

    /// Queues a collection pass unless one is already pending.
    pub fn schedule_gc(&self) {
        if self
            .gc_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            && self.tx.send(Task::Gc).is_err()
        {
            // worker already gone; nothing will clear the flag
            self.gc_pending.store(false, Ordering::Release);
        }
    }

    /// Hands an evicted entry to the backlog callback, off the caller's stack.
    pub fn push_backlog(&self, entry: Vec<u8>) {
        let _ = self.tx.send(Task::Backlog(entry));
    }

    /// Stops the worker after it drains already-queued tasks.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.tx.send(Task::Shutdown);
            if handle.join().is_err() {
                warn!("maintenance thread panicked during shutdown");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
