//! Property-based tests for list change delivery and reconciliation.
//!
//! For any sequence of list mutations:
//!
//! 1. `diff(old, new)` applied to `old` yields `new`.
//! 2. Splices are ascending and non-overlapping.
//! 3. The splices a list delivers on flush, applied to its previous items,
//!    yield its current items.
//! 4. A repeated template mirrors the list after every flush.

use proptest::prelude::*;
use reaktiv_view::{
    Change, Node, Observable, ObservableList, ObservableType, RepeatOptions, Splice, Subscriber,
    Value, apply_splices, binding, diff, html, process_updates, repeat,
};
use std::cell::RefCell;
use std::rc::Rc;

// ── Helpers ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
enum Op {
    Push(i32),
    Pop,
    Shift,
    Unshift(i32),
    Insert(usize, i32),
    Set(usize, i32),
    Splice(usize, usize, Vec<i32>),
    Reverse,
    Sort,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..20i32).prop_map(Op::Push),
        Just(Op::Pop),
        Just(Op::Shift),
        (0..20i32).prop_map(Op::Unshift),
        (0..12usize, 0..20i32).prop_map(|(i, v)| Op::Insert(i, v)),
        (0..12usize, 0..20i32).prop_map(|(i, v)| Op::Set(i, v)),
        (0..12usize, 0..4usize, proptest::collection::vec(0..20i32, 0..4))
            .prop_map(|(i, n, items)| Op::Splice(i, n, items)),
        Just(Op::Reverse),
        Just(Op::Sort),
    ]
}

fn apply(list: &ObservableList, op: &Op) {
    match op {
        Op::Push(v) => list.push(*v),
        Op::Pop => {
            list.pop();
        }
        Op::Shift => {
            list.shift();
        }
        Op::Unshift(v) => list.unshift(*v),
        Op::Insert(i, v) => list.insert(*i, *v),
        Op::Set(i, v) => {
            list.set(*i, *v);
        }
        Op::Splice(i, n, items) => {
            list.splice(*i, *n, items.iter().copied());
        }
        Op::Reverse => list.reverse(),
        Op::Sort => list.sort_by(|a, b| {
            let a = a.as_number().unwrap_or_default();
            let b = b.as_number().unwrap_or_default();
            a.total_cmp(&b)
        }),
    }
}

fn numbers(values: &[i32]) -> ObservableList {
    values.iter().map(|&v| Value::from(v)).collect()
}

#[derive(Default)]
struct SpliceLog(RefCell<Vec<Vec<Splice<Value>>>>);

impl Subscriber for SpliceLog {
    fn handle_change(self: Rc<Self>, change: &Change<'_>) {
        if let Change::Splices { splices, .. } = change {
            self.0.borrow_mut().push(splices.to_vec());
        }
    }
}

fn assert_ordered<T>(splices: &[Splice<T>]) -> Result<(), TestCaseError> {
    for pair in splices.windows(2) {
        prop_assert!(
            pair[0].index + pair[0].added_count <= pair[1].index,
            "splices overlap or are out of order"
        );
    }
    Ok(())
}

// ═════════════════════════════════════════════════════════════════════════
// 1-2. diff
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn diff_transforms_old_into_new(
        old in proptest::collection::vec(0..6i32, 0..24),
        new in proptest::collection::vec(0..6i32, 0..24),
    ) {
        let splices = diff(&old, &new);
        assert_ordered(&splices)?;
        let mut target = old.clone();
        apply_splices(&mut target, &new, &splices);
        prop_assert_eq!(target, new);
    }

    #[test]
    fn identical_sequences_have_no_splices(items in proptest::collection::vec(0..6i32, 0..24)) {
        prop_assert!(diff(&items, &items).is_empty());
    }

    /// Removed items are the old items at the shifted position.
    #[test]
    fn removed_items_come_from_old(
        old in proptest::collection::vec(0..6i32, 0..24),
        new in proptest::collection::vec(0..6i32, 0..24),
    ) {
        let mut shift = 0isize;
        for splice in diff(&old, &new) {
            let start = (splice.index as isize - shift) as usize;
            prop_assert_eq!(&old[start..start + splice.removed.len()], &splice.removed[..]);
            shift += splice.delta();
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. delivered splices
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn delivered_splices_replay_the_flush(
        initial in proptest::collection::vec(0..20i32, 0..10),
        batches in proptest::collection::vec(proptest::collection::vec(op(), 1..6), 1..5),
    ) {
        let list = numbers(&initial);
        let log = Rc::new(SpliceLog::default());
        list.source().subscribe(log.clone(), None);

        for batch in &batches {
            let before = list.to_vec_untracked();
            for op in batch {
                apply(&list, op);
            }
            process_updates();

            let delivered = log.0.take();
            prop_assert!(delivered.len() <= 1, "one delivery per flush");
            let mut replay = before;
            if let Some(splices) = delivered.first() {
                assert_ordered(splices)?;
                prop_assert!(!splices.is_empty());
                apply_splices(&mut replay, &list.to_vec_untracked(), splices);
            }
            prop_assert_eq!(replay, list.to_vec_untracked());
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. repeat reconciliation
// ═════════════════════════════════════════════════════════════════════════

fn rendered(ul: Node) -> Vec<String> {
    ul.children()
        .into_iter()
        .filter(|node| node.tag_name().is_some())
        .map(|li| li.text_content())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn repeat_mirrors_the_list(
        initial in proptest::collection::vec(0..20i32, 0..8),
        batches in proptest::collection::vec(proptest::collection::vec(op(), 1..5), 1..5),
        recycle in any::<bool>(),
    ) {
        let ty = ObservableType::builder("Owner").property("items").build().unwrap();
        let list = numbers(&initial);
        let owner = Observable::with_values(&ty, [("items", list.clone())]).unwrap();

        let item = html()
            .markup("<li>")
            .bind(binding!(|s| s.clone()))
            .markup("</li>")
            .build()
            .unwrap();
        let directive = repeat(binding!(|s| s.get("items")), item)
            .options(RepeatOptions::new().recycle(recycle));
        let template = html()
            .markup("<ul>")
            .directive(directive)
            .markup("</ul>")
            .build()
            .unwrap();
        let host = Node::element("div");
        let _view = template.render(&Value::from(owner), host);
        let ul = host
            .children()
            .into_iter()
            .find(|node| node.tag_name().as_deref() == Some("ul"))
            .unwrap();

        for batch in &batches {
            for op in batch {
                apply(&list, op);
            }
            process_updates();
            let expected: Vec<String> =
                list.to_vec_untracked().iter().map(ToString::to_string).collect();
            prop_assert_eq!(rendered(ul), expected);
        }
    }
}
