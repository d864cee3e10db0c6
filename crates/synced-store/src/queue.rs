//! Debounced batching of read-path updates.
//!
//! The first [`UpdateQueue::enqueue`] after an idle period asks the
//! [`Scheduler`] to run a flush once the debounce window has passed. Every
//! update enqueued before that flush joins the same batch, and the batch is
//! handed to [`BatchTarget::apply_batch`] in enqueue order.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::trace;

/// A deferred store update. It receives the target at flush time.
pub type QueuedUpdate<C> = Box<dyn FnOnce(&C)>;

pub type Task = Box<dyn FnOnce()>;

/// Runs a task after a delay on the current thread.
pub trait Scheduler {
    fn schedule(&self, delay: Duration, task: Task);
}

/// Owner of an [`UpdateQueue`] that knows how to apply a batch.
pub trait BatchTarget: Sized + 'static {
    fn update_queue(&self) -> &UpdateQueue<Self>;

    /// Run all updates of one batch as a single store transaction.
    fn apply_batch(&self, updates: Vec<QueuedUpdate<Self>>);
}

/// Drain the pending batch of `target` and apply it.
pub fn flush<C: BatchTarget>(target: &C) -> usize {
    let batch = target.update_queue().take();
    let count = batch.len();
    if count > 0 {
        trace!(updates = count, "flushing update batch");
        target.apply_batch(batch);
    }
    count
}

pub struct UpdateQueue<C> {
    scheduler: Rc<dyn Scheduler>,
    delay: Duration,
    pending: RefCell<Vec<QueuedUpdate<C>>>,
    scheduled: Cell<bool>,
    /// Bumped on every drain; a timer from an older generation is stale.
    generation: Cell<u64>,
}

impl<C: BatchTarget> UpdateQueue<C> {
    pub fn new(scheduler: Rc<dyn Scheduler>, delay: Duration) -> Self {
        Self {
            scheduler,
            delay,
            pending: RefCell::new(Vec::new()),
            scheduled: Cell::new(false),
            generation: Cell::new(0),
        }
    }

    /// Append `update` to the current batch, opening a debounce window if
    /// none is running.
    pub fn enqueue(&self, target: Weak<C>, update: QueuedUpdate<C>) {
        self.pending.borrow_mut().push(update);
        if self.scheduled.replace(true) {
            return;
        }
        let generation = self.generation.get();
        self.scheduler.schedule(
            self.delay,
            Box::new(move || {
                let Some(target) = target.upgrade() else {
                    return;
                };
                if target.update_queue().generation.get() == generation {
                    flush(&*target);
                } else {
                    trace!(generation, "stale flush timer ignored");
                }
            }),
        );
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    fn take(&self) -> Vec<QueuedUpdate<C>> {
        self.scheduled.set(false);
        self.generation.set(self.generation.get() + 1);
        std::mem::take(&mut *self.pending.borrow_mut())
    }
}

// ── ManualScheduler ────────────────────────────────────────────────────────

/// Virtual-time scheduler: tasks run only when the host advances the clock.
#[derive(Default)]
pub struct ManualScheduler {
    now: Cell<Duration>,
    seq: Cell<u64>,
    tasks: RefCell<BTreeMap<(Duration, u64), Task>>,
}

impl ManualScheduler {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Move the clock forward and run every task that became due.
    pub fn advance(&self, by: Duration) -> usize {
        self.now.set(self.now.get() + by);
        self.run_due()
    }

    /// Run every task whose deadline has passed, in deadline order. Tasks
    /// scheduled by a running task are picked up if already due.
    pub fn run_due(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = {
                let mut tasks = self.tasks.borrow_mut();
                let due = tasks.first_key_value().map(|(&(due, _), _)| due);
                match due {
                    Some(due) if due <= self.now.get() => tasks.pop_first(),
                    _ => None,
                }
            };
            let Some((_, task)) = task else {
                return ran;
            };
            task();
            ran += 1;
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.tasks
            .borrow_mut()
            .insert((self.now.get() + delay, seq), task);
    }
}

// ── TokioScheduler ─────────────────────────────────────────────────────────

/// Spawns each task on the current `LocalSet` after a `tokio::time::sleep`.
#[cfg(feature = "tokio")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

#[cfg(feature = "tokio")]
impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}
