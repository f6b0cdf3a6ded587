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

use std::net::IpAddr;
use std::time::Instant;

use crate::key::Key;

/// A known contact: a node id plus the address it was last seen at. Equality
/// used by ordered containers is `DistanceOrder(target)` over `id` (see
/// `key.rs`); identity for deduplication is the pair `(id, ip)` (see
/// `visited.rs`), not `KBucketEntry`'s own `PartialEq`.
#[derive(Clone, Copy, Debug)]
pub struct KBucketEntry {
    pub id: Key,
    pub address: (IpAddr, u16),
    pub first_seen: Instant,
    pub last_responded: Option<Instant>,
}

impl KBucketEntry {
    pub fn new(id: Key, address: (IpAddr, u16)) -> KBucketEntry {
        KBucketEntry {
            id,
            address,
            first_seen: Instant::now(),
            last_responded: None,
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.address.0
    }

    pub fn mark_responded(&mut self) {
        self.last_responded = Some(Instant::now());
    }
}

impl PartialEq for KBucketEntry {
    /// Compares by id only. This is the underlying container's notion of
    /// "the same slot", distinct from visited-set identity which also
    /// considers the IP (see `visited.rs`).
    fn eq(&self, other: &KBucketEntry) -> bool {
        self.id == other.id
    }
}

impl Eq for KBucketEntry {}
