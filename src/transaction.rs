use crate::scheduler::process_updates;
use std::cell::Cell;

// Thread-local transaction depth counter
// When > 0, queued updates don't arm the host's tick trigger
thread_local! {
    static TRANSACTION_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// RAII guard that ensures transaction cleanup happens even on panic.
///
/// When this guard is dropped (either normally or due to unwinding),
/// it decrements the transaction depth and, for the outermost transaction,
/// flushes the update queue.
struct TransactionGuard;

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        exit_transaction();
    }
}

fn exit_transaction() {
    let depth = TRANSACTION_DEPTH.get().saturating_sub(1);
    TRANSACTION_DEPTH.set(depth);

    // Leaving the outermost transaction runs everything it batched. Skip the
    // flush while unwinding: a half-applied batch should not drive updates.
    if depth == 0 && !std::thread::panicking() {
        process_updates();
    }
}

/// Check if currently inside a transaction
///
/// While true, queued updates wait for the outermost transaction to exit
/// instead of asking the host for a tick.
pub fn is_transaction_active() -> bool {
    TRANSACTION_DEPTH.get() > 0
}

/// Batch property writes and flush the resulting updates synchronously
///
/// Writes inside the closure queue binding updates as usual, but the host's
/// tick trigger is not armed. When the outermost transaction returns, the
/// queue is drained right away, so bound views are up to date on return.
///
/// # Example
/// ```ignore
/// // Without transaction: the host is asked for a tick and views update later
/// person.set("first", "Ada")?;
/// person.set("last", "Lovelace")?;
///
/// // With transaction: views reflect both writes when `run` returns
/// Transaction::run(|| {
///     person.set("first", "Ada")?;
///     person.set("last", "Lovelace")
/// })?;
/// ```
pub struct Transaction {
    _private: (),
}

impl Transaction {
    /// Run a function within a transaction context
    pub fn run<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        TRANSACTION_DEPTH.set(TRANSACTION_DEPTH.get() + 1);

        // If f() panics, _guard will be dropped during unwinding and restore
        // the depth.
        let _guard = TransactionGuard;
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{clear_tick_trigger, pending_update_count, queue_update, set_tick_trigger};
    use std::rc::Rc;

    #[test]
    fn transaction_returns_value() {
        let result = Transaction::run(|| 42);

        assert_eq!(result, 42);
    }

    #[test]
    fn outermost_exit_flushes_and_skips_the_tick() {
        let ticks = Rc::new(Cell::new(0));
        let counter = ticks.clone();
        set_tick_trigger(move || counter.set(counter.get() + 1));

        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        Transaction::run(|| {
            Transaction::run(|| queue_update(move || flag.set(true)));
            // the nested exit does not flush
            assert!(!ran.get());
            assert!(is_transaction_active());
        });

        assert!(ran.get());
        assert_eq!(ticks.get(), 0);
        assert_eq!(pending_update_count(), 0);
        clear_tick_trigger();
    }

    #[test]
    fn depth_is_restored_after_panic() {
        let result = std::panic::catch_unwind(|| {
            let _: () = Transaction::run(|| panic!("inside transaction"));
        });
        assert!(result.is_err());
        assert!(!is_transaction_active());
    }
}
