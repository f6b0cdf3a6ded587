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

//! Drives a single find_node lookup against a tiny in-process stand-in for
//! an `RpcServer`, to show the engine running end to end without a real
//! socket. Every "remote" node here just returns a handful of closer
//! contacts pulled from a fixed pool, until the pool is exhausted.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

use log::info;

use dht_tasks::{
    Config, DistanceOrder, Key, KBucketEntry, LookupKind, Response, RoutingTable, RpcCall,
    RpcServer, Scheduler, Task, TaskManager,
};

struct DemoServer {
    pool: Mutex<HashMap<Key, Vec<KBucketEntry>>>,
}

impl DemoServer {
    fn new(pool: HashMap<Key, Vec<KBucketEntry>>) -> DemoServer {
        DemoServer { pool: Mutex::new(pool) }
    }
}

impl RpcServer for DemoServer {
    fn do_call(&self, call: Arc<RpcCall>) {
        let contacts = self
            .pool
            .lock()
            .unwrap()
            .get(&call.expected_id)
            .cloned()
            .unwrap_or_default();
        info!("demo server answering {:?} with {} contacts", call.request, contacts.len());
        if let Some(task) = call.listener() {
            task.on_response(
                &call,
                Response { contacts, peers: Vec::new(), token: None },
            );
        }
    }

    fn on_declog(&self, callback: Box<dyn FnOnce() + Send>) {
        callback();
    }
}

struct DemoRoutingTable;

impl RoutingTable for DemoRoutingTable {
    fn observe(&self, entry: KBucketEntry) {
        info!("observed {} at {:?}", entry.id, entry.address);
    }
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

fn main() {
    env_logger::init();

    let target = key(0x00);
    let order = DistanceOrder::new(target);
    info!("looking up target {}", target);

    // A small fan-out graph: the seed responds with two contacts, each of
    // which responds with one more, closer still, contact.
    let mut pool = HashMap::new();
    pool.insert(key(0x10), vec![entry(0x08), entry(0x18)]);
    pool.insert(key(0x08), vec![entry(0x04)]);
    pool.insert(key(0x18), vec![entry(0x02)]);
    pool.insert(key(0x04), Vec::new());
    pool.insert(key(0x02), Vec::new());

    let server = Arc::new(DemoServer::new(pool));
    let table = Arc::new(DemoRoutingTable);
    let scheduler = Arc::new(InlineScheduler);

    let task = Task::new(
        1,
        target,
        "lookup_demo find_node".to_string(),
        LookupKind::find_node(),
        server.clone(),
        table,
        scheduler,
        Config::default(),
    );
    task.add_to_todo(entry(0x10));

    let manager = TaskManager::new(4);
    manager.submit(task.clone());

    info!(
        "lookup finished: sent={} recv={} failed={} finish_time={}ms closest_order_target={}",
        task.sent(),
        task.recv(),
        task.failed(),
        task.finish_time(),
        order.target()
    );
}
