//! Write queue and the single writer task.
//!
//! Workers push kept tiles into a [`WriteQueue`]; one [`Writer`] drains it
//! and persists every task through a [`TileSink`]. The queue lock is only
//! held for the push or pop itself, never across I/O.
//!
//! # Writer states
//!
//! ```text
//!            push                       queue empty, not finished
//!   ┌─────────┐ ───────────────▶ ┌──────────┐ ─────────────────┐
//!   │ WAITING │                  │ DRAINING │                  │
//!   └─────────┘ ◀─────────────── └──────────┘ ◀────────────────┘
//!        │                             │
//!        │ finished and empty          │ finished and empty
//!        ▼                             ▼
//!   ┌────────────────────────────────────────┐
//!   │               TERMINATED               │
//!   └────────────────────────────────────────┘
//! ```
//!
//! The done flag is read before the emptiness check, so a task pushed before
//! [`WriteQueue::finish`] is always seen by the final drain.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use super::summary::{record_failure, FailureStage, TileFailure};
use crate::tile::{TileBuffer, TileCoordinate, TileSink};

// =============================================================================
// Write Task
// =============================================================================

/// A kept tile and the path it is written to.
#[derive(Debug)]
pub struct WriteTask {
    /// Origin of the tile in level pixel space (before downsampling)
    pub coordinate: TileCoordinate,
    pub path: PathBuf,
    pub tile: TileBuffer,
}

// =============================================================================
// Write Queue
// =============================================================================

/// FIFO of pending write tasks shared by the workers and the writer.
#[derive(Debug, Default)]
pub struct WriteQueue {
    tasks: Mutex<VecDeque<WriteTask>>,
    notify: Notify,
    done: AtomicBool,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a task and wake the writer.
    pub fn push(&self, task: WriteTask) {
        self.tasks.lock().push_back(task);
        self.notify.notify_one();
    }

    /// Dequeue the oldest task.
    pub fn pop(&self) -> Option<WriteTask> {
        self.tasks.lock().pop_front()
    }

    /// Signal that no more tasks will be pushed and wake the writer.
    pub fn finish(&self) {
        self.done.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Wait for the next push or finish.
    ///
    /// A notification sent while nobody waits is kept, so a wake-up between
    /// the writer's checks and this call is not lost.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

// =============================================================================
// Writer
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Waiting,
    Draining,
    Terminated,
}

/// Counters reported by the writer once it terminates.
#[derive(Debug, Clone, Default)]
pub struct WriterReport {
    pub written: u64,
    pub failed: u64,
    pub failures: Vec<TileFailure>,
}

/// Single consumer of a [`WriteQueue`].
pub struct Writer<K> {
    queue: Arc<WriteQueue>,
    sink: Arc<K>,
}

impl<K: TileSink> Writer<K> {
    pub fn new(queue: Arc<WriteQueue>, sink: Arc<K>) -> Self {
        Self { queue, sink }
    }

    /// Run until the queue is finished and fully drained.
    ///
    /// Every task is written at most once. A failed write is logged and
    /// dropped.
    pub async fn run(self) -> WriterReport {
        let mut report = WriterReport::default();
        let mut state = WriterState::Waiting;

        loop {
            state = match state {
                WriterState::Waiting => {
                    let finished = self.queue.is_finished();
                    if !self.queue.is_empty() {
                        WriterState::Draining
                    } else if finished {
                        WriterState::Terminated
                    } else {
                        self.queue.wait().await;
                        WriterState::Waiting
                    }
                }
                WriterState::Draining => {
                    while let Some(task) = self.queue.pop() {
                        self.write(task, &mut report).await;
                    }
                    let finished = self.queue.is_finished();
                    if finished && self.queue.is_empty() {
                        WriterState::Terminated
                    } else {
                        WriterState::Waiting
                    }
                }
                WriterState::Terminated => break,
            };
            trace!(?state, "writer state");
        }

        debug!(
            written = report.written,
            failed = report.failed,
            "writer terminated"
        );
        report
    }

    async fn write(&self, task: WriteTask, report: &mut WriterReport) {
        match self.sink.write(&task.path, &task.tile).await {
            Ok(()) => report.written += 1,
            Err(e) => {
                warn!(x = task.coordinate.x, y = task.coordinate.y, error = %e, "tile write failed");
                report.failed += 1;
                record_failure(
                    &mut report.failures,
                    TileFailure::new(&task.coordinate, FailureStage::Write, e.to_string()),
                );
            }
        }
    }
}
