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

//! Subclass behavior (spec.md 4.6) for the four probe kinds named in spec.md
//! 9's Design Notes and supplemented in SPEC_FULL.md 10.5. `Task` owns the
//! generic lifecycle, slot accounting and candidate bookkeeping; `LookupKind`
//! only decides *which* request to send next, what a response means for
//! termination, and when the search is done. Expressed as a tagged enum
//! rather than a trait object so `Task` can hold it behind a single `Mutex`
//! without an extra allocation per task.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::IpAddr;

use crate::key::{DistanceOrder, Key};
use crate::node::KBucketEntry;
use crate::rpc::{Message, Response};
use crate::task::Task;

/// Per-kind state threaded through `update`/`call_finished`/`call_timeout`.
#[derive(Debug)]
pub enum LookupKind {
    FindNode(FindNodeState),
    GetPeers(GetPeersState),
    Announce(AnnounceState),
    Ping(PingState),
}

impl LookupKind {
    pub fn find_node() -> LookupKind {
        LookupKind::FindNode(FindNodeState::default())
    }

    /// A get_peers lookup additionally terminates once `target_peer_count`
    /// peers have been collected (SPEC_FULL.md 10.5), without waiting for
    /// `todo` to exhaust against the k-th closest responder.
    pub fn get_peers(info_hash: Key, target_peer_count: usize) -> LookupKind {
        LookupKind::GetPeers(GetPeersState {
            info_hash,
            responded: BTreeSet::new(),
            peers: Vec::new(),
            tokens: BTreeMap::new(),
            target_peer_count,
        })
    }

    /// A get_peers-shaped lookup that, once the collecting phase converges,
    /// sequences one non-recursive `announce_peer` RPC per closest responder
    /// that handed over a write token (SPEC_FULL.md 10.5). Token issuance
    /// and validation are out of scope (spec.md 1); this only sequences the
    /// second round of RPCs against tokens already carried on the response.
    pub fn announce(info_hash: Key) -> LookupKind {
        LookupKind::Announce(AnnounceState {
            info_hash,
            responded: BTreeSet::new(),
            phase: AnnouncePhase::Collecting,
            token_holders: VecDeque::new(),
            announced: BTreeSet::new(),
        })
    }

    pub fn ping() -> LookupKind {
        LookupKind::Ping(PingState::default())
    }

    /// Pops exactly one probe to issue — the closest `todo` candidate, or,
    /// for an `Announce` task past its collecting phase, the next queued
    /// token holder — without submitting it. Returns `None` when there is
    /// nothing left to send right now.
    ///
    /// Deliberately does *not* call `Task::rpc_call` itself: `Task::run_tick`
    /// (task.rs) holds `self.kind`'s mutex only across this call, then
    /// releases it before submitting, because submission may synchronously
    /// re-enter `on_response`/`on_timeout` (e.g. under a test or demo
    /// `RpcServer` that resolves inline) — which themselves lock `self.kind`.
    /// Locking across the submission call would self-deadlock on that same,
    /// non-reentrant mutex (spec.md 4.5 step 3 forbids holding a task-level
    /// lock across submission for exactly this reason).
    pub(crate) fn next_probe(&mut self, task: &Task) -> Option<Probe> {
        if let LookupKind::Announce(state) = self {
            if state.phase == AnnouncePhase::Announcing {
                return state
                    .token_holders
                    .pop_front()
                    .map(|(id, address, token)| Probe { id, address, source: ProbeSource::AnnouncePeer(token) });
            }
        }

        let entry = task.candidates().pop_closest()?;
        // spec.md 4.6: "pop the closest unvisited candidate, mark it
        // visited, and issue a probe". Marking here, before the probe is
        // even submitted, closes the window where a different in-flight
        // call's response names this same id as a contact: `add_candidate`
        // would otherwise re-admit it to `todo` while its first probe is
        // still outstanding, and the next tick would issue a second one.
        task.visited().mark(&entry);
        let id = entry.id;
        let address = entry.address;
        Some(Probe { id, address, source: ProbeSource::Candidate(entry) })
    }

    /// Builds the wire-level `Message` for a probe popped by `next_probe`.
    pub(crate) fn message_for(&self, probe: &Probe) -> Message {
        match &probe.source {
            ProbeSource::AnnouncePeer(token) => {
                let info_hash = match self {
                    LookupKind::Announce(s) => s.info_hash,
                    _ => unreachable!("AnnouncePeer probes only come from Announce's announcing phase"),
                };
                Message::AnnouncePeer { info_hash, token: token.clone() }
            }
            ProbeSource::Candidate(entry) => self.request_for(entry),
        }
    }

    /// Puts a probe back because `Task::rpc_call` refused it (per-task
    /// concurrency cap hit between the pop and the submit attempt); it will
    /// be retried once `on_declog` fires `run_tick` again. Uses
    /// `CandidateSet::requeue`, not `add_to_todo`/`add_candidate`: `entry` was
    /// already marked visited by `next_probe` before the refusal, and
    /// `add_candidate`'s visited check would just drop it instead of putting
    /// it back.
    pub(crate) fn requeue_probe(&mut self, task: &Task, probe: Probe) {
        match probe.source {
            ProbeSource::Candidate(entry) => task.candidates().requeue(entry),
            ProbeSource::AnnouncePeer(token) => {
                if let LookupKind::Announce(state) = self {
                    state.token_holders.push_front((probe.id, probe.address, token));
                }
            }
        }
    }

    fn request_for(&self, entry: &KBucketEntry) -> Message {
        match self {
            LookupKind::FindNode(_) => Message::FindNode { target: entry.id },
            LookupKind::GetPeers(s) => Message::GetPeers { info_hash: s.info_hash },
            LookupKind::Announce(s) => Message::GetPeers { info_hash: s.info_hash },
            LookupKind::Ping(_) => Message::Ping,
        }
    }

    /// A response landed for `responder`. Newly-discovered contacts are
    /// folded into `task`'s candidate pool (deduplicated against `visited`,
    /// spec.md 4.4); `responder` itself is recorded — by both id and ip,
    /// so a later contact sharing its address is also treated as visited
    /// (spec.md 8 scenario S6) — and observed into the routing table
    /// (spec.md 4.3).
    pub(crate) fn call_finished(&mut self, task: &Task, responder: KBucketEntry, response: Response) {
        let from = responder.id;
        let address = responder.address;
        task.visited().mark(&responder);
        task.routing_table().observe(responder);
        for contact in &response.contacts {
            task.add_to_todo(contact.clone());
        }

        match self {
            LookupKind::FindNode(s) => {
                s.responded.insert(from);
            }
            LookupKind::GetPeers(s) => {
                s.responded.insert(from);
                s.peers.extend(response.peers.iter().cloned());
                if let Some(token) = response.token {
                    s.tokens.insert(from, token);
                }
            }
            LookupKind::Announce(s) => match s.phase {
                AnnouncePhase::Collecting => {
                    s.responded.insert(from);
                    // A token observed from `from` authorizes one
                    // announce_peer back to that same node (BEP 5); queued
                    // here, drained once the collecting phase converges.
                    if let Some(token) = response.token {
                        s.token_holders.push_back((from, address, token));
                    }
                }
                AnnouncePhase::Announcing => {
                    s.announced.insert(from);
                }
            },
            LookupKind::Ping(s) => {
                s.responded = true;
            }
        }
    }

    pub(crate) fn call_timeout(&mut self, _task: &Task, _from: Key) {
        // No per-kind bookkeeping needed: `Task::on_timeout` has already
        // released the candidate and counted the failure. Termination is
        // driven purely by `is_done()` re-evaluating `todo_exhausted` (or,
        // for `Announce`'s second phase, the token-holder queue draining).
    }

    /// True once no further progress is possible: `todo` is exhausted
    /// relative to the closest `k` responders seen so far (spec.md 4.6); a
    /// `GetPeers` task is additionally done once it has collected enough
    /// peers (SPEC_FULL.md 10.5); an `Announce` task transitions from its
    /// collecting phase to its announcing phase instead of finishing, and is
    /// only done once that second phase's queue has drained; `Ping` is done
    /// once its single probe resolves one way or another.
    pub(crate) fn is_done(&mut self, task: &Task) -> bool {
        match self {
            LookupKind::FindNode(s) => {
                let kth = kth_closest(task, &s.responded);
                task.candidates().todo_exhausted(kth.as_ref())
            }
            LookupKind::GetPeers(s) => {
                if s.peers.len() >= s.target_peer_count {
                    return true;
                }
                let kth = kth_closest(task, &s.responded);
                task.candidates().todo_exhausted(kth.as_ref())
            }
            LookupKind::Announce(s) => match s.phase {
                AnnouncePhase::Collecting => {
                    let kth = kth_closest(task, &s.responded);
                    if task.candidates().todo_exhausted(kth.as_ref()) {
                        s.phase = AnnouncePhase::Announcing;
                        s.token_holders.is_empty()
                    } else {
                        false
                    }
                }
                AnnouncePhase::Announcing => s.token_holders.is_empty(),
            },
            LookupKind::Ping(s) => s.responded || task.failed() > 0,
        }
    }

    /// Peers collected so far, for `GetPeers`; empty for every other kind.
    pub fn collected_peers(&self) -> &[(IpAddr, u16)] {
        match self {
            LookupKind::GetPeers(s) => &s.peers,
            _ => &[],
        }
    }

    /// Responders an `Announce` task has successfully announced to; empty
    /// (and always will be) for every other kind.
    pub fn announced_to(&self) -> BTreeSet<Key> {
        match self {
            LookupKind::Announce(s) => s.announced.clone(),
            _ => BTreeSet::new(),
        }
    }
}

/// The `k`-th closest responder seen so far, ordered by distance to
/// `task.target`, or `None` if fewer than `k` have responded yet — matching
/// spec.md 4.6's "closest k contacts that have actually responded" rule.
fn kth_closest(task: &Task, responded: &BTreeSet<Key>) -> Option<Key> {
    if responded.len() < task.config().k {
        return None;
    }
    let order = DistanceOrder::new(task.target);
    let mut sorted: Vec<Key> = responded.iter().copied().collect();
    sorted.sort_by(|a, b| order.cmp(a, b));
    sorted.into_iter().nth(task.config().k - 1)
}

#[derive(Debug, Default)]
pub struct FindNodeState {
    responded: BTreeSet<Key>,
}

#[derive(Debug)]
pub struct GetPeersState {
    info_hash: Key,
    responded: BTreeSet<Key>,
    peers: Vec<(IpAddr, u16)>,
    tokens: BTreeMap<Key, Vec<u8>>,
    target_peer_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AnnouncePhase {
    Collecting,
    Announcing,
}

#[derive(Debug)]
pub struct AnnounceState {
    info_hash: Key,
    responded: BTreeSet<Key>,
    phase: AnnouncePhase,
    // (expected_id, address, token) for closest responders that handed over
    // a write token during the collecting phase, awaiting their
    // announce_peer round.
    token_holders: VecDeque<(Key, (IpAddr, u16), Vec<u8>)>,
    announced: BTreeSet<Key>,
}

/// A single probe popped by `LookupKind::next_probe`, not yet submitted.
pub(crate) struct Probe {
    id: Key,
    address: (IpAddr, u16),
    source: ProbeSource,
}

enum ProbeSource {
    Candidate(KBucketEntry),
    AnnouncePeer(Vec<u8>),
}

impl Probe {
    pub(crate) fn id(&self) -> Key {
        self.id
    }

    pub(crate) fn address(&self) -> (IpAddr, u16) {
        self.address
    }
}

#[derive(Debug, Default)]
pub struct PingState {
    responded: bool,
}
