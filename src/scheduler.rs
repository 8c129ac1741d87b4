//! Update scheduler for batched binding refreshes
//!
//! Binding observers never update their targets synchronously. A change
//! notification enqueues one task; tasks run in enqueue order when the host
//! calls [`process_updates`] on its next tick.
//!
//! ## Architecture
//!
//! 1. `queue_update()` appends a task to the thread-local queue
//! 2. When the queue goes from empty to non-empty, the scheduled flag is set and
//!    the host's tick trigger (installed with [`set_tick_trigger`]) is called
//! 3. The host calls `process_updates()`, which drains the queue; tasks enqueued
//!    while draining run in the same drain
//! 4. Every [`DEFAULT_COMPACTION_THRESHOLD`] processed tasks the consumed prefix
//!    is dropped from the backing storage, so long cascades do not grow it
//!
//! ## Usage
//!
//! ```ignore
//! // Hosts with an event loop ask to be woken once per batch
//! set_tick_trigger(|| request_animation_frame(process_updates));
//!
//! // Sync hosts and tests flush by hand
//! object.set("name", "Ada")?;
//! process_updates();
//!
//! // Async code can wait for the next flush
//! next_update().await;
//! ```

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use tracing::trace;

use crate::transaction::is_transaction_active;

/// Number of processed tasks after which the consumed prefix is discarded.
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 1024;

type Task = Box<dyn FnOnce()>;

#[derive(Default)]
struct UpdateQueue {
    tasks: Vec<Option<Task>>,
    /// Position of the next task to run.
    index: usize,
    draining: bool,
}

thread_local! {
    static UPDATE_QUEUE: RefCell<UpdateQueue> = RefCell::default();
    static UPDATE_SCHEDULED: Cell<bool> = const { Cell::new(false) };
    static TICK_TRIGGER: RefCell<Option<Rc<dyn Fn()>>> = const { RefCell::new(None) };
}

/// Install the hook called when the queue becomes non-empty.
///
/// The hook should arrange for [`process_updates`] to run soon, typically on the
/// host's next frame. It must not call `process_updates` synchronously.
pub fn set_tick_trigger(trigger: impl Fn() + 'static) {
    TICK_TRIGGER.set(Some(Rc::new(trigger)));
}

/// Remove the tick hook; flushing becomes fully manual.
pub fn clear_tick_trigger() {
    TICK_TRIGGER.set(None);
}

/// Check if a flush has been requested and not yet performed
pub fn is_update_scheduled() -> bool {
    UPDATE_SCHEDULED.get()
}

/// Number of tasks waiting to run.
pub fn pending_update_count() -> usize {
    UPDATE_QUEUE.with_borrow(|queue| queue.tasks.len() - queue.index)
}

fn arm_tick() {
    UPDATE_SCHEDULED.set(true);
    // transactions flush on exit instead
    if is_transaction_active() {
        return;
    }
    let trigger = TICK_TRIGGER.with_borrow(Clone::clone);
    if let Some(trigger) = trigger {
        trigger();
    }
}

/// Append a task to the update queue.
pub fn queue_update(task: impl FnOnce() + 'static) {
    let was_empty = UPDATE_QUEUE.with_borrow_mut(|queue| {
        // a running drain picks the task up without another tick
        let was_empty = !queue.draining && queue.tasks.len() == queue.index;
        queue.tasks.push(Some(Box::new(task)));
        was_empty
    });
    if was_empty {
        arm_tick();
    }
}

/// Restores the queue to a consistent state if a task panics mid-drain.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        UPDATE_QUEUE.with_borrow_mut(|queue| {
            let consumed = queue.index;
            queue.tasks.drain(..consumed);
            queue.index = 0;
            queue.draining = false;
            if !queue.tasks.is_empty() {
                UPDATE_SCHEDULED.set(true);
            }
        });
    }
}

/// Run every queued task, including tasks queued while draining.
///
/// Returns the number of tasks run. Calling this from inside a task is a no-op
/// returning 0; the outer drain picks up anything queued meanwhile.
pub fn process_updates() -> usize {
    let already_draining = UPDATE_QUEUE.with_borrow_mut(|queue| {
        std::mem::replace(&mut queue.draining, true)
    });
    if already_draining {
        return 0;
    }
    UPDATE_SCHEDULED.set(false);

    let _guard = DrainGuard;
    let mut processed = 0;
    loop {
        let task = UPDATE_QUEUE.with_borrow_mut(|queue| {
            let task = queue.tasks.get_mut(queue.index)?.take();
            queue.index += 1;
            task
        });
        let Some(task) = task else {
            break;
        };
        // no borrow is held while the task runs
        task();
        processed += 1;

        UPDATE_QUEUE.with_borrow_mut(|queue| {
            if queue.index > DEFAULT_COMPACTION_THRESHOLD {
                cov_mark::hit!(update_queue_compacted);
                let consumed = queue.index;
                queue.tasks.drain(..consumed);
                queue.index = 0;
            }
        });
    }

    if processed > 0 {
        trace!(processed, "processed queued updates");
    }
    processed
}

#[derive(Default)]
struct NextUpdateState {
    done: Cell<bool>,
    waker: RefCell<Option<Waker>>,
}

/// Future returned by [`next_update`].
pub struct NextUpdate {
    state: Rc<NextUpdateState>,
}

/// A future that resolves once the currently queued updates have been processed.
///
/// Resolution happens inside the next [`process_updates`] call, after every
/// task queued before this one.
pub fn next_update() -> NextUpdate {
    let state = Rc::new(NextUpdateState::default());
    let task_state = state.clone();
    queue_update(move || {
        task_state.done.set(true);
        if let Some(waker) = task_state.waker.take() {
            waker.wake();
        }
    });
    NextUpdate { state }
}

impl Future for NextUpdate {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.state.done.get() {
            Poll::Ready(())
        } else {
            *self.state.waker.borrow_mut() = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

/// Capacity of the queue's backing storage (test-only)
#[cfg(test)]
pub(crate) fn queue_capacity() -> usize {
    UPDATE_QUEUE.with_borrow(|queue| queue.tasks.capacity())
}
