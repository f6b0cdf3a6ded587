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

use std::cmp::Ordering;
use std::fmt;

use crate::error::TaskError;

/// Length in bytes of a DHT identifier (160 bits, as used by both nodes and
/// content in the Mainline DHT).
pub const KEY_LEN: usize = 20;

/// A 160-bit node or content identifier. Equality is bitwise; the total
/// order used by every ordered container in this crate is not `Key`'s
/// `Ord` impl but the `DistanceOrder` comparator keyed by a lookup target.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Key {
        Key(bytes)
    }

    /// Parses a 40-character hex string into a `Key`. Malformed hex is
    /// rejected here, before a task (or any candidate entry) is constructed
    /// from it, per spec.md 4.1.
    pub fn from_hex(s: &str) -> Result<Key, TaskError> {
        if s.len() != KEY_LEN * 2 {
            return Err(TaskError::InvalidKey(s.to_string()));
        }

        let mut bytes = [0u8; KEY_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let hi = hex_digit(s.as_bytes()[i * 2]).ok_or_else(|| TaskError::InvalidKey(s.to_string()))?;
            let lo = hex_digit(s.as_bytes()[i * 2 + 1]).ok_or_else(|| TaskError::InvalidKey(s.to_string()))?;
            *byte = (hi << 4) | lo;
        }

        Ok(Key(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// `self XOR other`, the Kademlia routing metric.
    pub fn distance(&self, other: &Key) -> Key {
        let mut out = [0u8; KEY_LEN];
        for i in 0..KEY_LEN {
            out[i] = self.0[i] ^ other.0[i];
        }
        Key(out)
    }
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A comparator that orders `Key`s by unsigned XOR distance to a fixed
/// `target`, as required by every ordered container in spec.md 3/4.1.
/// `todo`/`in_flight`/`stalled` all key their entries through this, never
/// through `Key`'s own (meaningless) byte order.
#[derive(Clone, Copy)]
pub struct DistanceOrder {
    target: Key,
}

impl DistanceOrder {
    pub fn new(target: Key) -> DistanceOrder {
        DistanceOrder { target }
    }

    pub fn target(&self) -> Key {
        self.target
    }

    /// `unsigned_cmp(a XOR target, b XOR target)`.
    pub fn cmp(&self, a: &Key, b: &Key) -> Ordering {
        let da = a.distance(&self.target);
        let db = b.distance(&self.target);
        da.0.cmp(&db.0)
    }
}
