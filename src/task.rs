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

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Instant;

use log::debug;

use crate::candidate::CandidateSet;
use crate::config::Config;
use crate::key::Key;
use crate::lookup::LookupKind;
use crate::node::KBucketEntry;
use crate::rpc::{Message, Response, RoutingTable, RpcCall, RpcServer, Scheduler};
use crate::visited::VisitedSet;

/// Sentinel written into `finish_time` by `kill()` before `finished()` runs,
/// distinguishing "killed" from "naturally finished" (spec.md 9). Preserved
/// exactly; external consumers rely on it.
pub const FINISH_TIME_KILLED: i64 = -1;

/// `finish_time`'s "not yet finished" value.
pub const FINISH_TIME_NOT_FINISHED: i64 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Finished,
}

/// `TaskListener.finished(task)` (spec.md 6). A listener added after
/// termination fires synchronously at registration (spec.md 3, 9).
pub trait TaskListener: Send + Sync {
    fn finished(&self, task: &Task);
}

/// The core lifecycle and RPC-slot-accounting state machine described by
/// spec.md 4.5. Subclass behavior (spec.md 4.6) is supplied by `kind`, a
/// tagged variant per spec.md 9's Design Notes rather than dynamic dispatch.
pub struct Task {
    pub task_id: u64,
    pub target: Key,
    pub info: String,

    rpc: Arc<dyn RpcServer>,
    routing_table: Arc<dyn RoutingTable>,
    scheduler: Arc<dyn Scheduler>,
    config: Config,

    candidates: CandidateSet,
    visited: VisitedSet,
    kind: Mutex<LookupKind>,

    // Gauges. `i64` (not `usize`) because a response/timeout racing a stall
    // promotion on another thread can transiently decrement past a value
    // that has not yet been incremented elsewhere; the invariants in
    // spec.md 8 hold only at quiescent points, not mid-flight.
    outstanding_total: AtomicI64,
    outstanding_excluding_stalled: AtomicI64,

    sent: AtomicU64,
    recv: AtomicU64,
    failed: AtomicU64,

    start_time: Mutex<Option<Instant>>,
    first_result_time: Mutex<Option<Instant>>,
    // Milliseconds elapsed since `start_time` at natural completion, or one
    // of the FINISH_TIME_* sentinels above. See the module doc for why this
    // is not simply `Option<Instant>`.
    finish_time: AtomicI64,

    queued: AtomicBool,
    finished: AtomicBool,

    listeners: Mutex<Vec<Box<dyn TaskListener>>>,

    self_weak: RwLock<Weak<Task>>,
}

impl Task {
    /// Constructs a queued task. spec.md 7 calls for rejecting a
    /// null/missing RPC server at construction; here that failure mode is
    /// unrepresentable by type instead, since `rpc` is a non-nullable `Arc`.
    pub fn new(
        task_id: u64,
        target: Key,
        info: String,
        kind: LookupKind,
        rpc: Arc<dyn RpcServer>,
        routing_table: Arc<dyn RoutingTable>,
        scheduler: Arc<dyn Scheduler>,
        config: Config,
    ) -> Arc<Task> {
        let task = Arc::new(Task {
            task_id,
            target,
            info,
            rpc,
            routing_table,
            scheduler,
            config,
            candidates: CandidateSet::new(target),
            visited: VisitedSet::new(),
            kind: Mutex::new(kind),
            outstanding_total: AtomicI64::new(0),
            outstanding_excluding_stalled: AtomicI64::new(0),
            sent: AtomicU64::new(0),
            recv: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            start_time: Mutex::new(None),
            first_result_time: Mutex::new(None),
            finish_time: AtomicI64::new(FINISH_TIME_NOT_FINISHED),
            queued: AtomicBool::new(true),
            finished: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            self_weak: RwLock::new(Weak::new()),
        });
        *task.self_weak.write().unwrap() = Arc::downgrade(&task);
        task
    }

    fn this(&self) -> Arc<Task> {
        self.self_weak
            .read()
            .unwrap()
            .upgrade()
            .expect("Task dropped while still running")
    }

    // ---------------------------------------------------------------
    // Seeding
    // ---------------------------------------------------------------

    /// Seeds the initial todo-set, typically the K closest entries known
    /// locally to the target (spec.md 2).
    pub fn add_to_todo(&self, entry: KBucketEntry) {
        self.candidates.add_candidate(entry, &self.visited);
    }

    pub fn add_dht_node(&self, id: Key, address: (std::net::IpAddr, u16)) {
        self.add_to_todo(KBucketEntry::new(id, address));
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// queued -> running, exactly once; stamps `start_time` and drives the
    /// first scheduling tick. Subsequent calls are no-ops.
    pub fn start(&self) {
        if self.queued.swap(false, Ordering::AcqRel) {
            debug!("task {} ({}) starting against target {}", self.task_id, self.info, self.target);
            *self.start_time.lock().unwrap() = Some(Instant::now());
            self.run_tick();
        }
    }

    pub fn is_queued(&self) -> bool {
        self.queued.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// any -> finished. Sets `finish_time` to the killed sentinel *before*
    /// `finished()` runs, so the natural-completion stamp is skipped
    /// (spec.md 4.5). In-flight RPCs are not cancelled at the server
    /// (spec.md 5, 9); their callbacks become no-ops against subclass hooks
    /// because `is_finished()` is checked first.
    pub fn kill(&self) {
        debug!("task {} killed after {} sent, {} outstanding", self.task_id, self.sent(), self.outstanding_total());
        self.finish_time.store(FINISH_TIME_KILLED, Ordering::Release);
        self.finished_transition();
    }

    /// Idempotent: the first caller sets `finished=true`, stamps
    /// `finish_time` unless `kill()` pinned it to the sentinel, and
    /// notifies listeners. Guard preserved verbatim per spec.md 9's open
    /// question: the kill path always pre-sets the sentinel before this
    /// runs, so the `== FINISH_TIME_NOT_FINISHED` check below is redundant
    /// today, but is kept in case a future caller pre-sets it some other
    /// way.
    fn finished_transition(&self) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }

        if self.finish_time.load(Ordering::Acquire) == FINISH_TIME_NOT_FINISHED {
            let elapsed = self
                .start_time
                .lock()
                .unwrap()
                .map(|t| t.elapsed().as_millis() as i64)
                .unwrap_or(0);
            self.finish_time.store(elapsed, Ordering::Release);
        }

        debug!(
            "task {} finished: sent={} recv={} failed={} finish_time={}",
            self.task_id,
            self.sent(),
            self.recv(),
            self.failed(),
            self.finish_time.load(Ordering::Acquire)
        );

        // Snapshot listeners under the lock, then notify outside of it, so
        // a listener registering itself (or another task) during
        // notification cannot deadlock against `add_listener` (spec.md 5).
        let listeners: Vec<Box<dyn TaskListener>> =
            std::mem::take(&mut *self.listeners.lock().unwrap());
        for listener in &listeners {
            listener.finished(self);
        }
        // Keep them reachable in case remove_listener / future bookkeeping
        // ever needs to reason about "already notified" listeners; for now
        // finished() is a one-shot consumption so we simply drop them.
        drop(listeners);
    }

    /// Registers `listener`. Fires synchronously, on the calling thread, if
    /// the task has already finished (spec.md 3, 9).
    pub fn add_listener(&self, listener: Box<dyn TaskListener>) {
        {
            let mut listeners = self.listeners.lock().unwrap();
            if !self.is_finished() {
                listeners.push(listener);
                return;
            }
        }
        listener.finished(self);
    }

    // ---------------------------------------------------------------
    // Counters / gauges (read-only observable surface, spec.md 6)
    // ---------------------------------------------------------------

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Acquire)
    }

    pub fn recv(&self) -> u64 {
        self.recv.load(Ordering::Acquire)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    pub fn outstanding_total(&self) -> i64 {
        self.outstanding_total.load(Ordering::Acquire)
    }

    pub fn outstanding_excluding_stalled(&self) -> i64 {
        self.outstanding_excluding_stalled.load(Ordering::Acquire)
    }

    pub fn todo_count(&self) -> usize {
        self.candidates.todo_len()
    }

    pub fn start_time(&self) -> Option<Instant> {
        *self.start_time.lock().unwrap()
    }

    pub fn first_result_time(&self) -> Option<Instant> {
        *self.first_result_time.lock().unwrap()
    }

    /// `-1` (killed), `0` (not finished yet), or the number of milliseconds
    /// elapsed since `start_time` at natural completion. See spec.md 9.
    pub fn finish_time(&self) -> i64 {
        self.finish_time.load(Ordering::Acquire)
    }

    // ---------------------------------------------------------------
    // Admission and probe issuance (spec.md 4.5)
    // ---------------------------------------------------------------

    pub fn can_do_request(&self) -> bool {
        self.outstanding_excluding_stalled.load(Ordering::Acquire)
            < self.config.max_concurrent_requests as i64
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn routing_table(&self) -> &Arc<dyn RoutingTable> {
        &self.routing_table
    }

    /// Issues a probe for `expected_id` at `address`. Returns `false`
    /// (refused) if the per-task concurrency cap is reached; in that case a
    /// single `on_declog` wake-up is registered per refusal (spec.md 8).
    pub fn rpc_call(&self, request: Message, expected_id: Key, address: (std::net::IpAddr, u16)) -> bool {
        if !self.can_do_request() {
            let weak = self.self_weak.read().unwrap().clone();
            self.rpc.on_declog(Box::new(move || {
                if let Some(task) = weak.upgrade() {
                    task.run_tick();
                }
            }));
            return false;
        }

        self.candidates.promote_in_flight(expected_id);
        self.outstanding_total.fetch_add(1, Ordering::AcqRel);
        self.outstanding_excluding_stalled.fetch_add(1, Ordering::AcqRel);
        self.sent.fetch_add(1, Ordering::AcqRel);

        let call = Arc::new(RpcCall::new(
            request,
            expected_id,
            address,
            Arc::downgrade(&self.this()),
        ));
        let rpc = self.rpc.clone();
        // Submitted via the scheduler, not inline: the server may re-enter
        // listeners synchronously, and `rpc_call` must not hold any
        // task-level lock while that happens (spec.md 4.5 step 3).
        self.scheduler.execute(Box::new(move || {
            rpc.do_call(call);
        }));

        true
    }

    // ---------------------------------------------------------------
    // Listener callbacks invoked by the RpcServer (spec.md 4.5)
    // ---------------------------------------------------------------

    pub fn on_response(&self, call: &RpcCall, response: Response) {
        let was_stalled = call.is_stalled();
        self.candidates.release(call.expected_id);

        self.outstanding_total.fetch_sub(1, Ordering::AcqRel);
        if !was_stalled {
            self.outstanding_excluding_stalled.fetch_sub(1, Ordering::AcqRel);
        }
        self.recv.fetch_add(1, Ordering::AcqRel);

        {
            let mut first = self.first_result_time.lock().unwrap();
            if first.is_none() {
                *first = Some(Instant::now());
            }
        }

        if !self.is_finished() {
            let mut responder = KBucketEntry::new(call.expected_id, call.address);
            responder.mark_responded();
            let mut kind = self.kind.lock().unwrap();
            kind.call_finished(self, responder, response);
        }

        self.run_tick();
    }

    pub fn on_stall(&self, call: &RpcCall) {
        if call.mark_stalled() {
            self.candidates.demote_stalled(call.expected_id);
            self.outstanding_excluding_stalled.fetch_sub(1, Ordering::AcqRel);
        }
        self.run_tick();
    }

    pub fn on_timeout(&self, call: &RpcCall) {
        let was_stalled = call.is_stalled();
        self.candidates.release(call.expected_id);
        // A node that never answered is marked visited by id alone (its
        // address was never confirmed as responsive) so a later contact
        // naming the same id does not queue it for a repeat probe.
        self.visited.mark_id(call.expected_id);

        self.outstanding_total.fetch_sub(1, Ordering::AcqRel);
        if !was_stalled {
            self.outstanding_excluding_stalled.fetch_sub(1, Ordering::AcqRel);
        }
        self.failed.fetch_add(1, Ordering::AcqRel);

        if !self.is_finished() {
            let mut kind = self.kind.lock().unwrap();
            kind.call_timeout(self, call.expected_id);
        }

        self.run_tick();
    }

    // ---------------------------------------------------------------
    // Scheduling tick (spec.md 4.5)
    // ---------------------------------------------------------------

    pub fn run_tick(&self) {
        if self.is_finished() {
            return;
        }

        if self.is_done() {
            self.finished_transition();
            return;
        }

        // Drains probes one at a time, locking `kind` only long enough to
        // pop each one. `rpc_call` below is deliberately called with no lock
        // on `kind` held: the scheduler it submits through may resolve
        // synchronously (a test or demo `RpcServer` that answers inline)
        // and re-enter `on_response`/`on_timeout`, which themselves lock
        // `kind` — holding it across submission would self-deadlock on that
        // same, non-reentrant mutex (spec.md 4.5 step 3).
        //
        // Not gated on `can_do_request()` here: that check belongs to
        // `rpc_call` alone (spec.md 4.5 step 1), which registers the
        // `on_declog` wake-up on refusal. Gating the loop itself on the same
        // predicate would mean `rpc_call` is only ever entered with capacity
        // already free, making its refusal branch — and the wake-up it
        // registers — unreachable; a task that fills its cap with candidates
        // still in `todo` would then just stop ticking with no wake-up
        // scheduled, never to resume (spec.md 8's concurrency-cap boundary
        // behavior). Instead the loop keeps popping until `next_probe`
        // returns `None` or a single `rpc_call` refusal requeues its probe
        // and breaks — one refusal per burst registers exactly one
        // `on_declog` callback, per spec.md 8.
        //
        // `alpha` is the exploration-margin knob named in spec.md 6 but is
        // not a separate per-tick issuance limiter here — `CandidateSet`
        // already only ever exposes the single globally closest candidate,
        // so there is no wider "closer than the k-th" candidate pool for
        // alpha to narrow beyond `rpc_call`'s hard cap.
        loop {
            let probe = {
                let mut kind = self.kind.lock().unwrap();
                kind.next_probe(self)
            };
            let probe = match probe {
                Some(p) => p,
                None => break,
            };
            let message = self.kind.lock().unwrap().message_for(&probe);
            let id = probe.id();
            let address = probe.address();
            if !self.rpc_call(message, id, address) {
                let mut kind = self.kind.lock().unwrap();
                kind.requeue_probe(self, probe);
                break;
            }
        }

        if self.is_done() {
            self.finished_transition();
        }
    }

    fn is_done(&self) -> bool {
        if self.outstanding_total.load(Ordering::Acquire) != 0 {
            return false;
        }
        let mut kind = self.kind.lock().unwrap();
        kind.is_done(self)
    }

    /// Peers collected so far (`GetPeers`); empty for every other kind.
    pub fn collected_peers(&self) -> Vec<(std::net::IpAddr, u16)> {
        self.kind.lock().unwrap().collected_peers().to_vec()
    }

    /// Responders successfully announced to (`Announce`); empty for every
    /// other kind.
    pub fn announced_to(&self) -> std::collections::BTreeSet<Key> {
        self.kind.lock().unwrap().announced_to()
    }

    pub(crate) fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    pub(crate) fn visited(&self) -> &VisitedSet {
        &self.visited
    }

    pub fn state(&self) -> TaskState {
        if self.is_finished() {
            TaskState::Finished
        } else if self.is_queued() {
            TaskState::Queued
        } else {
            TaskState::Running
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::LookupKind;
    use crate::test_support::{MockRoutingTable, MockScheduler, MockServer};
    use std::net::{IpAddr, Ipv4Addr};

    fn key(b: u8) -> Key {
        let mut bytes = [0u8; crate::key::KEY_LEN];
        bytes[crate::key::KEY_LEN - 1] = b;
        Key::from_bytes(bytes)
    }

    fn entry(b: u8) -> KBucketEntry {
        KBucketEntry::new(key(b), (IpAddr::V4(Ipv4Addr::new(10, 0, 0, b)), 6881))
    }

    /// S1: one entry, server answers immediately with no new contacts.
    #[test]
    fn finishes_on_immediate_empty_response() {
        let server = Arc::new(MockServer::new());
        let table = Arc::new(MockRoutingTable::new());
        let sched = Arc::new(MockScheduler);
        let config = Config::default();

        let task = Task::new(
            1,
            key(0x00),
            "find_node(S1)".to_string(),
            LookupKind::find_node(),
            server.clone(),
            table,
            sched,
            config,
        );
        task.add_to_todo(entry(0x01));
        server.respond_next_with(Response::default());

        task.start();

        assert!(task.is_finished());
        assert_eq!(task.sent(), 1);
        assert_eq!(task.recv(), 1);
        assert_eq!(task.failed(), 0);
        assert!(task.first_result_time().is_some());
        assert!(task.finish_time() >= 0);
    }

    /// S2: same setup, server times out instead.
    #[test]
    fn finishes_on_timeout() {
        let server = Arc::new(MockServer::new());
        let table = Arc::new(MockRoutingTable::new());
        let sched = Arc::new(MockScheduler);
        let config = Config::default();

        let task = Task::new(
            2,
            key(0x00),
            "find_node(S2)".to_string(),
            LookupKind::find_node(),
            server.clone(),
            table,
            sched,
            config,
        );
        task.add_to_todo(entry(0x01));
        server.timeout_next();

        task.start();

        assert!(task.is_finished());
        assert_eq!(task.sent(), 1);
        assert_eq!(task.recv(), 0);
        assert_eq!(task.failed(), 1);
    }

    /// S3: 16 candidates, cap 8, server never answers.
    #[test]
    fn respects_per_task_concurrency_cap() {
        let server = Arc::new(MockServer::new());
        let table = Arc::new(MockRoutingTable::new());
        let sched = Arc::new(MockScheduler);
        let mut config = Config::default();
        config.max_concurrent_requests = 8;

        let task = Task::new(
            3,
            key(0x00),
            "find_node(S3)".to_string(),
            LookupKind::find_node(),
            server.clone(),
            table,
            sched,
            config,
        );
        for b in 1..=16u8 {
            task.add_to_todo(entry(b));
        }
        server.swallow_all();

        task.start();

        assert_eq!(task.outstanding_excluding_stalled(), 8);
        assert_eq!(task.sent(), 8);
        assert_eq!(task.todo_count(), 8);
        assert!(!task.is_finished());
    }

    /// S5: kill() during flight pins the sentinel and is idempotent.
    #[test]
    fn kill_pins_sentinel_and_is_idempotent() {
        let server = Arc::new(MockServer::new());
        let table = Arc::new(MockRoutingTable::new());
        let sched = Arc::new(MockScheduler);
        let config = Config::default();

        let task = Task::new(
            5,
            key(0x00),
            "find_node(S5)".to_string(),
            LookupKind::find_node(),
            server.clone(),
            table,
            sched,
            config,
        );
        task.add_to_todo(entry(0x01));
        server.swallow_all();
        task.start();

        task.kill();
        assert_eq!(task.finish_time(), FINISH_TIME_KILLED);
        assert!(task.is_finished());

        task.kill();
        assert_eq!(task.finish_time(), FINISH_TIME_KILLED);
    }

    #[test]
    fn start_is_idempotent() {
        let server = Arc::new(MockServer::new());
        let table = Arc::new(MockRoutingTable::new());
        let sched = Arc::new(MockScheduler);
        let config = Config::default();

        let task = Task::new(
            6,
            key(0x00),
            "find_node(idempotent start)".to_string(),
            LookupKind::find_node(),
            server.clone(),
            table,
            sched,
            config,
        );
        server.respond_next_with(Response::default());
        task.start();
        let sent_after_first = task.sent();
        task.start();
        assert_eq!(task.sent(), sent_after_first);
    }

    #[test]
    fn listener_added_after_finish_fires_synchronously() {
        let server = Arc::new(MockServer::new());
        let table = Arc::new(MockRoutingTable::new());
        let sched = Arc::new(MockScheduler);
        let config = Config::default();

        let task = Task::new(
            7,
            key(0x00),
            "find_node(late listener)".to_string(),
            LookupKind::find_node(),
            server.clone(),
            table,
            sched,
            config,
        );
        server.respond_next_with(Response::default());
        task.add_to_todo(entry(0x01));
        task.start();
        assert!(task.is_finished());

        let fired = Arc::new(AtomicBool::new(false));
        struct Flag(Arc<AtomicBool>);
        impl TaskListener for Flag {
            fn finished(&self, _task: &Task) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        task.add_listener(Box::new(Flag(fired.clone())));
        assert!(fired.load(Ordering::SeqCst));
    }

    /// S4: as S3, then every outstanding call stalls one at a time. Each
    /// stall frees exactly one slot and `on_stall`'s own tick (spec.md 4.5)
    /// refills it immediately from `todo`, so after all 8 have stalled the
    /// cap is back at steady state (8 in flight, 8 stalled) rather than
    /// sitting empty: the freed slot never survives to be observed idle.
    #[test]
    fn stalling_calls_frees_slots_for_more_probes() {
        let server = Arc::new(MockServer::new());
        let table = Arc::new(MockRoutingTable::new());
        let sched = Arc::new(MockScheduler);
        let mut config = Config::default();
        config.max_concurrent_requests = 8;

        let task = Task::new(
            4,
            key(0x00),
            "find_node(S4)".to_string(),
            LookupKind::find_node(),
            server.clone(),
            table,
            sched,
            config,
        );
        for b in 1..=16u8 {
            task.add_to_todo(entry(b));
        }
        server.swallow_all();
        task.start();
        assert_eq!(task.sent(), 8);

        for call in server.issued() {
            task.on_stall(&call);
        }

        // Every stall freed one slot and that same tick refilled it from
        // `todo`, so all 16 candidates are now accounted for: 8 stalled
        // (the original batch) plus 8 freshly in flight (the refill).
        assert_eq!(task.outstanding_excluding_stalled(), 8);
        assert_eq!(task.outstanding_total(), 16);
        assert_eq!(task.sent(), 16);
        assert_eq!(task.todo_count(), 0);
        assert!(!task.is_finished());
    }

    /// S6: a response carries a new contact whose IP matches an
    /// already-visited responder; that contact must not enter `todo`.
    #[test]
    fn response_contact_sharing_visited_ip_is_dropped() {
        let server = Arc::new(MockServer::new());
        let table = Arc::new(MockRoutingTable::new());
        let sched = Arc::new(MockScheduler);
        let config = Config::default();

        let task = Task::new(
            8,
            key(0x00),
            "find_node(S6)".to_string(),
            LookupKind::find_node(),
            server.clone(),
            table,
            sched,
            config,
        );
        let e1 = entry(0x01);
        task.add_to_todo(e1);

        // E2 shares E1's IP but has a distinct id.
        let e2 = KBucketEntry::new(key(0x02), e1.address);
        server.respond_next_with(Response { contacts: vec![e2], peers: Vec::new(), token: None });

        task.start();

        assert!(task.is_finished());
        assert_eq!(task.todo_count(), 0);
        assert!(!task.visited().has_id(&key(0x02)));
    }

    /// Hitting the per-task cap with candidates still in `todo` registers
    /// exactly one `on_declog` wake-up (spec.md 8's concurrency-cap boundary
    /// behavior) rather than leaving the task to stop ticking with no
    /// scheduled wake-up.
    #[test]
    fn cap_refusal_registers_exactly_one_declog_wakeup() {
        let server = Arc::new(MockServer::new());
        let table = Arc::new(MockRoutingTable::new());
        let sched = Arc::new(MockScheduler);
        let mut config = Config::default();
        config.max_concurrent_requests = 4;

        let task = Task::new(
            9,
            key(0x00),
            "find_node(declog)".to_string(),
            LookupKind::find_node(),
            server.clone(),
            table,
            sched,
            config,
        );
        for b in 1..=8u8 {
            task.add_to_todo(entry(b));
        }
        server.swallow_all();

        task.start();

        assert_eq!(task.sent(), 4);
        assert_eq!(task.outstanding_excluding_stalled(), 4);
        assert_eq!(task.todo_count(), 4);
        assert_eq!(server.declog_pending(), 1);
    }

    /// A response naming a contact whose probe is already outstanding (not
    /// yet resolved) must not be re-admitted to `todo`: `next_probe` marks a
    /// candidate visited at the moment it is popped (spec.md 4.6), before
    /// the probe is even submitted, so a second responder naming the same
    /// id cannot queue a duplicate probe for it.
    #[test]
    fn in_flight_candidate_is_not_reprobed_from_a_concurrent_response() {
        let server = Arc::new(MockServer::new());
        let table = Arc::new(MockRoutingTable::new());
        let sched = Arc::new(MockScheduler);
        let mut config = Config::default();
        config.max_concurrent_requests = 8;

        let task = Task::new(
            10,
            key(0x00),
            "find_node(no double probe)".to_string(),
            LookupKind::find_node(),
            server.clone(),
            table,
            sched,
            config,
        );
        // A1 is the candidate that will be (re)named by B's response while
        // A1's own probe is still outstanding.
        let a1 = entry(0x01);
        let b = entry(0x02);
        task.add_to_todo(a1);
        task.add_to_todo(b);
        server.swallow_all();

        task.start();
        assert_eq!(task.sent(), 2);
        assert_eq!(task.todo_count(), 0);

        // B's response names A1 again as a contact. Since A1 was marked
        // visited the moment it was popped for its own probe, it must not
        // be re-admitted to `todo`.
        let issued = server.issued();
        let b_call = issued.iter().find(|c| c.expected_id == b.id).unwrap();
        task.on_response(b_call, Response { contacts: vec![a1], peers: Vec::new(), token: None });

        assert_eq!(task.todo_count(), 0);
        assert_eq!(task.sent(), 2);
    }
}
