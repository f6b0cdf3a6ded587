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

//! The capabilities this crate consumes (spec.md 6) rather than implements:
//! the wire codec, socket I/O and routing-table maintenance all live on the
//! other side of these traits. A test-only in-memory implementation lives
//! in `lib.rs`'s `#[cfg(test)]` module and in `tests/`.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::key::Key;
use crate::node::KBucketEntry;
use crate::task::Task;

/// The RPC payload a task sends. The wire format is out of scope (spec.md
/// 1); this is the in-process shape a `Message` is reduced to once decoded.
#[derive(Clone, Debug)]
pub enum Message {
    FindNode { target: Key },
    GetPeers { info_hash: Key },
    AnnouncePeer { info_hash: Key, token: Vec<u8> },
    Ping,
}

/// The RPC response payload, already parsed. A malformed wire response is
/// expected (spec.md 7) to never reach this type — the `RpcServer` either
/// produces a `Response` or calls `on_timeout`.
#[derive(Clone, Debug, Default)]
pub struct Response {
    pub contacts: Vec<KBucketEntry>,
    pub peers: Vec<(IpAddr, u16)>,
    pub token: Option<Vec<u8>>,
}

/// Correlates an outbound request with its expected responder id and the
/// task that issued it (spec.md 3). Resolved exactly once by one of
/// {response, timeout}; `stalled` may be set at most once before that.
pub struct RpcCall {
    pub request: Message,
    pub expected_id: Key,
    /// The address the probe was sent to. Carried here (rather than looked
    /// up again later) so a response/timeout callback can fold the
    /// responder's full `KBucketEntry` — id and ip both — into the
    /// visited-set dedup index (spec.md 4.4, 8 scenario S6).
    pub address: (IpAddr, u16),
    stalled: AtomicBool,
    listener: Weak<Task>,
}

impl RpcCall {
    pub(crate) fn new(
        request: Message,
        expected_id: Key,
        address: (IpAddr, u16),
        listener: Weak<Task>,
    ) -> RpcCall {
        RpcCall {
            request,
            expected_id,
            address,
            stalled: AtomicBool::new(false),
            listener,
        }
    }

    /// Monotonic flag: true once the soft deadline has fired for this call.
    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stalled(&self) -> bool {
        // Returns whether this call transitioned stalled for the first time,
        // so a server can avoid firing `on_stall` twice for the same call.
        self.stalled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// The task this call belongs to, if it still exists. An `RpcServer`
    /// implementation calls back into it via `on_response`/`on_timeout`;
    /// `task.rs` calls back into it via `on_stall` on its own soft-deadline
    /// schedule.
    pub fn listener(&self) -> Option<Arc<Task>> {
        self.listener.upgrade()
    }
}

/// The RPC server capability a task is built against (spec.md 6). The core
/// never talks to sockets directly; it hands a correlated `RpcCall` to this
/// trait and waits for exactly one of `on_response`/`on_timeout` to land on
/// the `Task` (via whatever thread the implementation chooses).
pub trait RpcServer: Send + Sync {
    /// Submits `call` for asynchronous transmission. Single-shot: the
    /// server does not retransmit. The server owns the soft-stall and
    /// hard-timeout deadlines (spec.md 4.2) and is responsible for
    /// eventually resolving the call even on local submission failure
    /// (spec.md 7).
    fn do_call(&self, call: std::sync::Arc<RpcCall>);

    /// Registers a one-shot callback invoked when the server has freed at
    /// least one global RPC slot. Used to wake a task that was refused a
    /// slot by its own per-task cap (spec.md 4.5 step 1).
    fn on_declog(&self, callback: Box<dyn FnOnce() + Send>);
}

/// The routing-table capability a task observes responders into (spec.md
/// 6). Routing-table maintenance itself is out of scope (spec.md 1).
pub trait RoutingTable: Send + Sync {
    fn observe(&self, entry: KBucketEntry);
}

/// An executor used to decouple listener context from I/O submission
/// (spec.md 6) — `rpc_call` must not submit to the `RpcServer` while
/// holding any task-level lock, since the server may re-enter listeners
/// synchronously.
pub trait Scheduler: Send + Sync {
    fn execute(&self, job: Box<dyn FnOnce() + Send>);
}
