//! Minimal edit scripts between two sequences.
//!
//! A [`Splice`] says: at `index`, the items in `removed` were replaced by
//! `added_count` items of the new sequence. A list of splices is ascending and
//! non-overlapping, and each index is expressed in coordinates of the sequence
//! with all earlier splices already applied. Applying the list in order to the
//! old sequence yields the new one (see [`apply_splices`]).
//!
//! [`calc_splices`] runs a Levenshtein edit-distance table over the part of the
//! two sequences that differs after trimming the common prefix and suffix, then
//! walks the table back into splices. [`merge_splices`] folds a stream of
//! recorded edits into one non-overlapping list and [`project_splices`]
//! minimizes such a list against the final sequence.

/// One contiguous replacement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Splice<T> {
    /// Position in the new sequence where the replacement starts.
    pub index: usize,
    /// Items of the old sequence that were removed.
    pub removed: Vec<T>,
    /// Number of items of the new sequence inserted at `index`.
    pub added_count: usize,
}

impl<T> Splice<T> {
    /// Create a splice.
    pub fn new(index: usize, removed: Vec<T>, added_count: usize) -> Self {
        Self {
            index,
            removed,
            added_count,
        }
    }

    /// Net change in length.
    pub fn delta(&self) -> isize {
        self.added_count as isize - self.removed.len() as isize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EditOp {
    Leave,
    Update,
    Add,
    Delete,
}

fn shared_prefix<T: PartialEq>(current: &[T], old: &[T], search_length: usize) -> usize {
    current
        .iter()
        .zip(old)
        .take(search_length)
        .take_while(|(a, b)| a == b)
        .count()
}

fn shared_suffix<T: PartialEq>(current: &[T], old: &[T], search_length: usize) -> usize {
    current
        .iter()
        .rev()
        .zip(old.iter().rev())
        .take(search_length)
        .take_while(|(a, b)| a == b)
        .count()
}

/// Levenshtein distances without substitution cost shortcuts: a mismatch is
/// always one delete plus one add away from the diagonal.
fn edit_distances<T: PartialEq>(
    current: &[T],
    current_start: usize,
    current_end: usize,
    old: &[T],
    old_start: usize,
    old_end: usize,
) -> Vec<Vec<usize>> {
    let row_count = old_end - old_start + 1;
    let column_count = current_end - current_start + 1;
    let mut distances = vec![vec![0usize; column_count]; row_count];

    for (i, row) in distances.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in distances[0].iter_mut().enumerate() {
        *cell = j;
    }

    for i in 1..row_count {
        for j in 1..column_count {
            distances[i][j] = if current[current_start + j - 1] == old[old_start + i - 1] {
                distances[i - 1][j - 1]
            } else {
                let north = distances[i - 1][j] + 1;
                let west = distances[i][j - 1] + 1;
                north.min(west)
            };
        }
    }
    distances
}

/// Walk the distance table from the bottom-right corner back to the origin.
fn edit_operations(distances: &[Vec<usize>]) -> Vec<EditOp> {
    let mut i = distances.len() - 1;
    let mut j = distances[0].len() - 1;
    let mut current = distances[i][j];
    let mut edits = Vec::with_capacity(i + j);

    while i > 0 || j > 0 {
        if i == 0 {
            edits.push(EditOp::Add);
            j -= 1;
            continue;
        }
        if j == 0 {
            edits.push(EditOp::Delete);
            i -= 1;
            continue;
        }

        let north_west = distances[i - 1][j - 1];
        let north = distances[i - 1][j];
        let west = distances[i][j - 1];

        let min = if north < west {
            north.min(north_west)
        } else {
            west.min(north_west)
        };

        if min == north_west {
            if north_west == current {
                edits.push(EditOp::Leave);
            } else {
                edits.push(EditOp::Update);
                current = north_west;
            }
            i -= 1;
            j -= 1;
        } else if min == north {
            edits.push(EditOp::Delete);
            i -= 1;
            current = north;
        } else {
            edits.push(EditOp::Add);
            j -= 1;
            current = west;
        }
    }

    edits.reverse();
    edits
}

/// Splices turning `old[old_start..old_end]` into `current[current_start..current_end]`.
///
/// The common prefix is only trimmed when both ranges start at zero and the
/// common suffix only when both ranges run to the end of their sequences.
/// Returned indices are positions in `current`.
///
/// # Panics
/// When a range is out of bounds.
pub fn calc_splices<T: PartialEq + Clone>(
    current: &[T],
    mut current_start: usize,
    mut current_end: usize,
    old: &[T],
    mut old_start: usize,
    mut old_end: usize,
) -> Vec<Splice<T>> {
    let min_length = (current_end - current_start).min(old_end - old_start);
    let prefix_count = if current_start == 0 && old_start == 0 {
        shared_prefix(current, old, min_length)
    } else {
        0
    };
    let suffix_count = if current_end == current.len() && old_end == old.len() {
        shared_suffix(
            &current[..current_end],
            &old[..old_end],
            min_length - prefix_count,
        )
    } else {
        0
    };

    current_start += prefix_count;
    old_start += prefix_count;
    current_end -= suffix_count;
    old_end -= suffix_count;

    if current_end == current_start && old_end == old_start {
        return Vec::new();
    }
    if current_start == current_end {
        return vec![Splice::new(current_start, old[old_start..old_end].to_vec(), 0)];
    }
    if old_start == old_end {
        return vec![Splice::new(
            current_start,
            Vec::new(),
            current_end - current_start,
        )];
    }

    let ops = edit_operations(&edit_distances(
        current,
        current_start,
        current_end,
        old,
        old_start,
        old_end,
    ));

    let mut splices = Vec::new();
    let mut splice: Option<Splice<T>> = None;
    let mut index = current_start;
    let mut old_index = old_start;

    for op in ops {
        match op {
            EditOp::Leave => {
                if let Some(done) = splice.take() {
                    splices.push(done);
                }
                index += 1;
                old_index += 1;
            }
            EditOp::Update => {
                let open = splice.get_or_insert_with(|| Splice::new(index, Vec::new(), 0));
                open.added_count += 1;
                index += 1;
                open.removed.push(old[old_index].clone());
                old_index += 1;
            }
            EditOp::Add => {
                let open = splice.get_or_insert_with(|| Splice::new(index, Vec::new(), 0));
                open.added_count += 1;
                index += 1;
            }
            EditOp::Delete => {
                let open = splice.get_or_insert_with(|| Splice::new(index, Vec::new(), 0));
                open.removed.push(old[old_index].clone());
                old_index += 1;
            }
        }
    }
    splices.extend(splice);
    splices
}

/// Splices turning `old` into `current`.
pub fn diff<T: PartialEq + Clone>(old: &[T], current: &[T]) -> Vec<Splice<T>> {
    calc_splices(current, 0, current.len(), old, 0, old.len())
}

/// Length of the overlap of `[start1, end1]` and `[start2, end2]`; negative
/// when they are disjoint, zero when they only touch.
fn intersect(start1: usize, end1: usize, start2: usize, end2: usize) -> isize {
    if end1 < start2 || end2 < start1 {
        return -1;
    }
    if end1 == start2 || end2 == start1 {
        return 0;
    }
    if start1 < start2 {
        if end1 < end2 {
            (end1 - start2) as isize
        } else {
            (end2 - start2) as isize
        }
    } else if end2 < end1 {
        (end2 - start1) as isize
    } else {
        (end1 - start1) as isize
    }
}

fn shift(index: usize, offset: isize) -> usize {
    index.checked_add_signed(offset).unwrap_or(0)
}

/// Fold one recorded splice into an ascending, non-overlapping list.
fn merge_splice<T: Clone>(splices: &mut Vec<Splice<T>>, mut splice: Splice<T>) {
    let mut inserted = false;
    let mut insertion_offset: isize = 0;
    let mut i = 0;

    while i < splices.len() {
        splices[i].index = shift(splices[i].index, insertion_offset);
        if inserted {
            i += 1;
            continue;
        }

        let current_index = splices[i].index;
        let intersect_count = intersect(
            splice.index,
            splice.index + splice.removed.len(),
            current_index,
            current_index + splices[i].added_count,
        );

        if intersect_count >= 0 {
            // Merge the two splices.
            let current = splices.remove(i);
            insertion_offset -= current.delta();
            let intersect_count = intersect_count as usize;

            splice.added_count += current.added_count - intersect_count;
            let delete_count = splice.removed.len() + current.removed.len() - intersect_count;

            if splice.added_count == 0 && delete_count == 0 {
                // merged splice is a no-op, discard it
                inserted = true;
            } else {
                let mut removed = current.removed;
                if splice.index < current.index {
                    let mut prepend = splice.removed[..current.index - splice.index].to_vec();
                    prepend.append(&mut removed);
                    removed = prepend;
                }
                if splice.index + splice.removed.len() > current.index + current.added_count {
                    let tail_start = current.index + current.added_count - splice.index;
                    removed.extend_from_slice(&splice.removed[tail_start..]);
                }
                splice.removed = removed;
                if current.index < splice.index {
                    splice.index = current.index;
                }
            }
        } else if splice.index < current_index {
            // Insert the splice here.
            inserted = true;
            let offset = splice.delta();
            splices[i].index = shift(current_index, offset);
            insertion_offset += offset;
            splices.insert(i, splice.clone());
            i += 2;
        } else {
            i += 1;
        }
    }

    if !inserted {
        splices.push(splice);
    }
}

/// Fold recorded splices, in the order they happened, into one ascending,
/// non-overlapping list.
pub fn merge_splices<T: Clone>(records: impl IntoIterator<Item = Splice<T>>) -> Vec<Splice<T>> {
    let mut splices = Vec::new();
    for record in records {
        merge_splice(&mut splices, record);
    }
    splices
}

/// Merge recorded splices, then minimize each against the final sequence.
///
/// A one-for-one replacement is kept only when the item actually changed;
/// every other merged splice is re-diffed so items that were removed and put
/// back do not show up as edits.
pub fn project_splices<T: PartialEq + Clone>(
    current: &[T],
    records: impl IntoIterator<Item = Splice<T>>,
) -> Vec<Splice<T>> {
    let mut splices = Vec::new();
    for splice in merge_splices(records) {
        if splice.added_count == 1 && splice.removed.len() == 1 {
            if splice.removed[0] != current[splice.index] {
                splices.push(splice);
            }
            continue;
        }
        splices.extend(calc_splices(
            current,
            splice.index,
            splice.index + splice.added_count,
            &splice.removed,
            0,
            splice.removed.len(),
        ));
    }
    splices
}

/// Apply `splices` to `target`, taking inserted items from `current`.
///
/// With `target` equal to the old sequence and `splices` the diff from old to
/// `current`, `target` ends up equal to `current`.
///
/// # Panics
/// When a splice does not fit `target` or `current`.
pub fn apply_splices<T: Clone>(target: &mut Vec<T>, current: &[T], splices: &[Splice<T>]) {
    for splice in splices {
        let added = &current[splice.index..splice.index + splice.added_count];
        target.splice(
            splice.index..splice.index + splice.removed.len(),
            added.iter().cloned(),
        );
    }
}
