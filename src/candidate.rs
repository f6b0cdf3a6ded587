/* Copyright (c) 2018 University of Utah
 *
 * Permission to use, copy, modify, and distribute this software for any
 * purpose with or without fee is hereby granted, provided that the above
 * copyright notice and this permission notice appear in all copies.
 *
 * THE SOFTWARE IS PROVIDED "AS IS" AND THE AUTHOR(S) DISCLAIM ALL WARRANTIES
 * WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
 * MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL AUTHORS BE LIABLE FOR
 * ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
 * WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
 * ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
 * OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.
 */

use std::collections::HashSet;

use spin::RwLock;

use crate::key::{DistanceOrder, Key};
use crate::node::KBucketEntry;
use crate::visited::VisitedSet;

/// The three disjoint, `DistanceOrder(target)`-ordered partitions of a
/// task's candidate pool (spec.md 3): `todo` (discovered, unprobed),
/// `in_flight` (a probe outstanding) and `stalled` (in-flight past the soft
/// deadline). An id only ever reaches `stalled` by way of `in_flight`.
pub struct CandidateSet {
    order: DistanceOrder,
    // Kept sorted by `order` at all times; closest first. A plain Vec with
    // binary-search insertion, like sched.rs's waiting queue elsewhere in
    // this codebase, keeps this as a single spin::RwLock-guarded collection
    // rather than one lock per bucket; candidate counts are small (bounded
    // by a few times K).
    todo: RwLock<Vec<KBucketEntry>>,
    in_flight: RwLock<HashSet<Key>>,
    stalled: RwLock<HashSet<Key>>,
}

impl CandidateSet {
    pub fn new(target: Key) -> CandidateSet {
        CandidateSet {
            order: DistanceOrder::new(target),
            todo: RwLock::new(Vec::new()),
            in_flight: RwLock::new(HashSet::new()),
            stalled: RwLock::new(HashSet::new()),
        }
    }

    /// Adds `entry` to `todo` unless `visited` already knows its id or ip.
    /// A duplicate insertion (same id already in `todo`) is a no-op.
    pub fn add_candidate(&self, entry: KBucketEntry, visited: &VisitedSet) {
        if visited.has(&entry) {
            return;
        }

        let mut todo = self.todo.write();
        if todo.iter().any(|e| e.id == entry.id) {
            return;
        }

        let pos = todo
            .binary_search_by(|probe| self.order.cmp(&probe.id, &entry.id))
            .unwrap_or_else(|p| p);
        todo.insert(pos, entry);
    }

    /// Removes and returns the closest entry in `todo`, if any.
    pub fn pop_closest(&self) -> Option<KBucketEntry> {
        let mut todo = self.todo.write();
        if todo.is_empty() {
            None
        } else {
            Some(todo.remove(0))
        }
    }

    /// Puts `entry` back into `todo` after it was popped by `pop_closest` but
    /// could not be issued as a probe (the per-task concurrency cap was hit
    /// between the pop and the submit attempt, spec.md 4.5 step 1). Unlike
    /// `add_candidate`, this does not consult `visited`: `entry` was already
    /// marked visited at pop time (spec.md 4.6), and re-checking here would
    /// just drop it, stranding it out of `todo` forever.
    pub fn requeue(&self, entry: KBucketEntry) {
        let mut todo = self.todo.write();
        let pos = todo
            .binary_search_by(|probe| self.order.cmp(&probe.id, &entry.id))
            .unwrap_or_else(|p| p);
        todo.insert(pos, entry);
    }

    pub fn promote_in_flight(&self, id: Key) {
        self.in_flight.write().insert(id);
    }

    /// Moves `id` from `in_flight` to `stalled`.
    pub fn demote_stalled(&self, id: Key) {
        self.in_flight.write().remove(&id);
        self.stalled.write().insert(id);
    }

    /// Releases `id` from both `in_flight` and `stalled` (response or
    /// timeout terminal event).
    pub fn release(&self, id: Key) {
        self.in_flight.write().remove(&id);
        self.stalled.write().remove(&id);
    }

    pub fn todo_len(&self) -> usize {
        self.todo.read().len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.read().len()
    }

    pub fn stalled_len(&self) -> usize {
        self.stalled.read().len()
    }

    pub fn is_stalled(&self, id: &Key) -> bool {
        self.stalled.read().contains(id)
    }

    /// True if `todo` is empty, or every entry in it is farther from the
    /// target than `kth_closest_responded` — the non-kind-specific half of
    /// spec.md 4.6's `is_done()` predicate.
    pub fn todo_exhausted(&self, kth_closest_responded: Option<&Key>) -> bool {
        let todo = self.todo.read();
        match kth_closest_responded {
            None => todo.is_empty(),
            Some(kth) => todo
                .iter()
                .all(|e| self.order.cmp(&e.id, kth) == std::cmp::Ordering::Greater),
        }
    }
}
