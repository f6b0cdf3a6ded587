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

//! Integration-level scenario tests exercised entirely against the crate's
//! public surface (no `pub(crate)` mocks) — a `find_node` and a `get_peers`
//! lookup driven end to end through a tiny in-memory `RpcServer` built the
//! same way `lookup_demo` builds one.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

use dht_tasks::{
    Config, KBucketEntry, Key, LookupKind, Response, RoutingTable, RpcCall, RpcServer, Scheduler,
    Task,
};

struct FixedGraphServer {
    pool: Mutex<HashMap<Key, Response>>,
}

impl RpcServer for FixedGraphServer {
    fn do_call(&self, call: Arc<RpcCall>) {
        let response = self
            .pool
            .lock()
            .unwrap()
            .get(&call.expected_id)
            .cloned()
            .unwrap_or_default();
        if let Some(task) = call.listener() {
            task.on_response(&call, response);
        }
    }

    fn on_declog(&self, callback: Box<dyn FnOnce() + Send>) {
        callback();
    }
}

struct NullRoutingTable;

impl RoutingTable for NullRoutingTable {
    fn observe(&self, _entry: KBucketEntry) {}
}

struct InlineScheduler;

impl Scheduler for InlineScheduler {
    fn execute(&self, job: Box<dyn FnOnce() + Send>) {
        job();
    }
}

fn key(seed: u8) -> Key {
    let mut bytes = [0u8; dht_tasks::key::KEY_LEN];
    bytes[dht_tasks::key::KEY_LEN - 1] = seed;
    Key::from_bytes(bytes)
}

fn entry(seed: u8) -> KBucketEntry {
    KBucketEntry::new(key(seed), (IpAddr::V4(Ipv4Addr::new(10, 0, 0, seed)), 6881))
}

/// A find_node lookup converges through a small fan-out graph to the point
/// where `todo` holds nothing closer than what has already responded.
#[test]
fn find_node_converges_through_fan_out_graph() {
    let mut pool = HashMap::new();
    pool.insert(
        key(0x10),
        Response { contacts: vec![entry(0x08), entry(0x18)], peers: Vec::new(), token: None },
    );
    pool.insert(key(0x08), Response { contacts: vec![entry(0x04)], peers: Vec::new(), token: None });
    pool.insert(key(0x18), Response { contacts: vec![entry(0x02)], peers: Vec::new(), token: None });
    pool.insert(key(0x04), Response::default());
    pool.insert(key(0x02), Response::default());

    let server = Arc::new(FixedGraphServer { pool: Mutex::new(pool) });
    let table = Arc::new(NullRoutingTable);
    let scheduler = Arc::new(InlineScheduler);

    let task = Task::new(
        1,
        key(0x00),
        "integration find_node".to_string(),
        LookupKind::find_node(),
        server,
        table,
        scheduler,
        Config::default(),
    );
    task.add_to_todo(entry(0x10));
    task.start();

    assert!(task.is_finished());
    assert_eq!(task.sent(), 5);
    assert_eq!(task.recv(), 5);
    assert_eq!(task.failed(), 0);
    assert_eq!(task.todo_count(), 0);
}

/// A get_peers lookup stops early once it has collected its target peer
/// count, without needing `todo` to exhaust (SPEC_FULL.md 10.5).
#[test]
fn get_peers_finishes_early_once_target_peer_count_collected() {
    let info_hash = key(0xaa);
    let peer_addr = (IpAddr::V4(Ipv4Addr::new(203, 0, 113, 5)), 51413);

    let mut pool = HashMap::new();
    pool.insert(
        key(0x10),
        Response { contacts: vec![entry(0x20), entry(0x30)], peers: vec![peer_addr], token: None },
    );
    // Neither 0x20 nor 0x30 is ever probed if the task stops after the
    // first response, since a single peer already meets target_peer_count.

    let server = Arc::new(FixedGraphServer { pool: Mutex::new(pool) });
    let table = Arc::new(NullRoutingTable);
    let scheduler = Arc::new(InlineScheduler);

    let task = Task::new(
        2,
        info_hash,
        "integration get_peers".to_string(),
        LookupKind::get_peers(info_hash, 1),
        server,
        table,
        scheduler,
        Config::default(),
    );
    task.add_to_todo(entry(0x10));
    task.start();

    assert!(task.is_finished());
    assert_eq!(task.collected_peers(), vec![peer_addr]);
}
