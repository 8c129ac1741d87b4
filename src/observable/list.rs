use std::cell::{Ref, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

use tracing::trace;

use crate::observable::Source;
use crate::scheduler::queue_update;
use crate::splice::{Splice, calc_splices, project_splices};
use crate::value::Value;

#[derive(Default)]
struct PendingChanges {
    splices: Vec<Splice<Value>>,
    /// Sequence as it was at the start of the cycle, recorded by a reorder.
    snapshot: Option<Vec<Value>>,
    queued: bool,
}

struct ListInner {
    items: RefCell<Vec<Value>>,
    source: Source,
    pending: RefCell<PendingChanges>,
}

/// A sequence whose mutations are observable as splices.
///
/// Every mutation made through the wrapper is recorded once somebody observes
/// the list. At the next scheduler flush the recorded edits are reduced to a
/// minimal, ascending splice list and delivered to source-level subscribers as
/// [`Change::Splices`](crate::Change::Splices). Reads are tracked as
/// dependencies on the whole list.
///
/// Cloning shares the list.
#[derive(Clone)]
pub struct ObservableList(Rc<ListInner>);

impl Default for ObservableList {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Value> for ObservableList {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl ObservableList {
    /// An empty list.
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// A list holding `items`.
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(ListInner {
            items: RefCell::new(items),
            source: Source::new(),
            pending: RefCell::default(),
        }))
    }

    /// Change-notification handle of this list.
    pub fn source(&self) -> &Source {
        &self.0.source
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // -- reads -------------------------------------------------------------

    /// Number of items (tracked).
    pub fn len(&self) -> usize {
        self.0.source.track_all();
        self.0.items.borrow().len()
    }

    /// True when empty (tracked).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item at `index` (tracked).
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.source.track_all();
        self.0.items.borrow().get(index).cloned()
    }

    /// Copy of all items (tracked).
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.source.track_all();
        self.to_vec_untracked()
    }

    /// Copy of all items without reporting a dependency.
    pub fn to_vec_untracked(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    /// Borrow the items (tracked). Do not mutate the list while the borrow lives.
    pub fn items(&self) -> Ref<'_, [Value]> {
        self.0.source.track_all();
        Ref::map(self.0.items.borrow(), Vec::as_slice)
    }

    // -- mutations ---------------------------------------------------------

    /// Append an item.
    pub fn push(&self, item: impl Into<Value>) {
        let index = {
            let mut items = self.0.items.borrow_mut();
            items.push(item.into());
            items.len() - 1
        };
        self.record_splice(Splice::new(index, Vec::new(), 1));
    }

    /// Append several items.
    pub fn extend<I>(&self, items: I)
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let len = self.0.items.borrow().len();
        self.splice(len, 0, items);
    }

    /// Remove and return the last item.
    pub fn pop(&self) -> Option<Value> {
        let (index, item) = {
            let mut items = self.0.items.borrow_mut();
            let item = items.pop()?;
            (items.len(), item)
        };
        self.record_splice(Splice::new(index, vec![item.clone()], 0));
        Some(item)
    }

    /// Remove and return the first item.
    pub fn shift(&self) -> Option<Value> {
        let item = {
            let mut items = self.0.items.borrow_mut();
            if items.is_empty() {
                return None;
            }
            items.remove(0)
        };
        self.record_splice(Splice::new(0, vec![item.clone()], 0));
        Some(item)
    }

    /// Insert an item at the front.
    pub fn unshift(&self, item: impl Into<Value>) {
        self.insert(0, item);
    }

    /// Insert an item at `index`, clamped to the length.
    pub fn insert(&self, index: usize, item: impl Into<Value>) {
        self.splice(index, 0, [item.into()]);
    }

    /// Replace the item at `index`. Returns the old item.
    pub fn set(&self, index: usize, item: impl Into<Value>) -> Option<Value> {
        if index >= self.0.items.borrow().len() {
            return None;
        }
        self.splice(index, 1, [item.into()]).pop()
    }

    /// Remove `delete_count` items at `start` and insert `items` there.
    ///
    /// `start` is clamped to the length and `delete_count` to the items
    /// available, like `Array.prototype.splice`. Returns the removed items.
    pub fn splice<I>(&self, start: usize, delete_count: usize, items: I) -> Vec<Value>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let (start, removed, added_count) = {
            let mut current = self.0.items.borrow_mut();
            let start = start.min(current.len());
            let end = start + delete_count.min(current.len() - start);
            let before = current.len();
            let removed: Vec<Value> = current
                .splice(start..end, items.into_iter().map(Into::into))
                .collect();
            let added_count = current.len() + removed.len() - before;
            (start, removed, added_count)
        };
        if !removed.is_empty() || added_count > 0 {
            self.record_splice(Splice::new(start, removed.clone(), added_count));
        }
        removed
    }

    /// Remove the items in `range`, clamped to the length.
    pub fn remove_range(&self, range: Range<usize>) -> Vec<Value> {
        self.splice(range.start, range.end.saturating_sub(range.start), std::iter::empty::<Value>())
    }

    /// Replace every item.
    pub fn replace<I>(&self, items: I) -> Vec<Value>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let len = self.0.items.borrow().len();
        self.splice(0, len, items)
    }

    /// Sort in place with a comparator.
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        let before = self.0.items.borrow().clone();
        self.0.items.borrow_mut().sort_by(compare);
        self.record_reset(before);
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        let before = self.0.items.borrow().clone();
        self.0.items.borrow_mut().reverse();
        self.record_reset(before);
    }

    // -- change recording --------------------------------------------------

    fn is_observed(&self) -> bool {
        self.0.source.existing_id().is_some()
    }

    fn record_splice(&self, splice: Splice<Value>) {
        if !self.is_observed() {
            return;
        }
        let mut pending = self.0.pending.borrow_mut();
        if pending.snapshot.is_none() {
            pending.splices.push(splice);
        }
        self.schedule_flush(&mut pending);
    }

    /// Record an arbitrary reorder. `before` is the sequence right before it.
    fn record_reset(&self, before: Vec<Value>) {
        if !self.is_observed() {
            return;
        }
        let mut pending = self.0.pending.borrow_mut();
        if pending.snapshot.is_none() {
            // Undo this cycle's splices to recover the pre-cycle sequence.
            let mut original = before;
            for splice in pending.splices.drain(..).rev() {
                original.splice(splice.index..splice.index + splice.added_count, splice.removed);
            }
            pending.snapshot = Some(original);
        }
        self.schedule_flush(&mut pending);
    }

    fn schedule_flush(&self, pending: &mut PendingChanges) {
        if pending.queued {
            return;
        }
        pending.queued = true;
        let list = self.clone();
        queue_update(move || list.flush());
    }

    fn flush(&self) {
        let PendingChanges {
            splices, snapshot, ..
        } = std::mem::take(&mut *self.0.pending.borrow_mut());

        let final_splices = {
            let current = self.0.items.borrow();
            match snapshot {
                Some(old) => calc_splices(&current, 0, current.len(), &old, 0, old.len()),
                None => project_splices(&current, splices),
            }
        };
        if final_splices.is_empty() {
            return;
        }
        trace!(splices = final_splices.len(), "delivering list splices");
        if let Some(id) = self.0.source.existing_id() {
            id.notify_splices(&final_splices);
        }
    }
}

impl fmt::Debug for ObservableList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.items.borrow().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::{Change, Subscriber};
    use crate::scheduler::process_updates;
    use crate::splice::apply_splices;

    #[derive(Default)]
    struct SpliceLog(RefCell<Vec<Vec<Splice<Value>>>>);

    impl Subscriber for SpliceLog {
        fn handle_change(self: Rc<Self>, change: &Change<'_>) {
            if let Change::Splices { splices, .. } = change {
                self.0.borrow_mut().push(splices.to_vec());
            }
        }
    }

    fn numbers(values: &[i32]) -> ObservableList {
        values.iter().map(|&v| Value::from(v)).collect()
    }

    fn observe(list: &ObservableList) -> Rc<SpliceLog> {
        let log = Rc::new(SpliceLog::default());
        list.source().subscribe(log.clone(), None);
        log
    }

    fn assert_replays(before: Vec<Value>, list: &ObservableList, log: &SpliceLog) {
        let after = list.to_vec_untracked();
        let mut replayed = before;
        for batch in log.0.borrow().iter() {
            apply_splices(&mut replayed, &after, batch);
        }
        assert_eq!(replayed, after);
    }

    #[test]
    fn unobserved_lists_record_nothing() {
        let list = numbers(&[1, 2]);
        list.push(3);
        assert_eq!(process_updates(), 0);
    }

    #[test]
    fn one_flush_delivers_one_merged_batch() {
        let list = numbers(&[1, 2, 3]);
        let log = observe(&list);
        let before = list.to_vec_untracked();

        list.push(4);
        list.push(5);
        list.shift();
        process_updates();

        assert_eq!(log.0.borrow().len(), 1);
        assert_eq!(
            log.0.borrow()[0],
            [
                Splice::new(0, vec![Value::from(1)], 0),
                Splice::new(2, vec![], 2)
            ]
        );
        assert_replays(before, &list, &log);
    }

    #[test]
    fn remove_and_restore_is_invisible() {
        let list = numbers(&[1, 2, 3]);
        let log = observe(&list);
        let item = list.pop();
        list.push(item);
        process_updates();
        assert!(log.0.borrow().is_empty());
    }

    #[test]
    fn reorder_after_splices_diffs_against_cycle_start() {
        let list = numbers(&[3, 1, 2]);
        let log = observe(&list);
        let before = list.to_vec_untracked();

        list.push(0);
        list.sort_by(|a, b| {
            a.as_number()
                .partial_cmp(&b.as_number())
                .unwrap_or(Ordering::Equal)
        });
        list.remove_range(3..4);
        process_updates();

        assert_eq!(list.to_vec_untracked(), numbers(&[0, 1, 2]).to_vec_untracked());
        assert_replays(before, &list, &log);
    }

    #[test]
    fn splice_clamps_like_arrays() {
        let list = numbers(&[1, 2, 3]);
        let removed = list.splice(2, 10, [Value::from(9)]);
        assert_eq!(removed, [Value::from(3)]);
        assert_eq!(list.to_vec_untracked(), numbers(&[1, 2, 9]).to_vec_untracked());
        assert!(list.splice(10, 1, std::iter::empty::<Value>()).is_empty());
    }
}
