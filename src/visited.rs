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
use std::net::IpAddr;

use spin::RwLock;

use crate::key::Key;
use crate::node::KBucketEntry;

/// Anti-amplification dedup index (spec.md 4.4, Design Notes): a node is
/// "visited" once either its id or its ip has been seen, so an attacker
/// controlling many ids behind one ip, or many ips for one id, cannot force
/// a lookup to revisit it. Grows monotonically for the task's lifetime.
pub struct VisitedSet {
    inner: RwLock<Inner>,
}

struct Inner {
    ids: HashSet<Key>,
    ips: HashSet<IpAddr>,
}

impl VisitedSet {
    pub fn new() -> VisitedSet {
        VisitedSet {
            inner: RwLock::new(Inner {
                ids: HashSet::new(),
                ips: HashSet::new(),
            }),
        }
    }

    pub fn mark(&self, entry: &KBucketEntry) {
        let mut inner = self.inner.write();
        inner.ids.insert(entry.id);
        inner.ips.insert(entry.ip());
    }

    /// Marks `id` visited without an associated address, for the case where
    /// a responder is already known only by the id a probe was addressed to
    /// (spec.md 4.3) — the id half of the dedup index still applies.
    pub fn mark_id(&self, id: Key) {
        self.inner.write().ids.insert(id);
    }

    pub fn has(&self, entry: &KBucketEntry) -> bool {
        let inner = self.inner.read();
        inner.ids.contains(&entry.id) || inner.ips.contains(&entry.ip())
    }

    pub fn has_id(&self, id: &Key) -> bool {
        self.inner.read().ids.contains(id)
    }
}

impl Default for VisitedSet {
    fn default() -> VisitedSet {
        VisitedSet::new()
    }
}
