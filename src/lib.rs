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

//! An iterative Kademlia-style lookup task engine for the BitTorrent
//! Mainline DHT: tracks a lookup's candidate pool, issues bounded-parallel
//! RPC probes against it, and drives the lookup to completion. Wire codec,
//! socket I/O and routing-table maintenance are supplied by the host
//! application through the `RpcServer`, `RoutingTable` and `Scheduler`
//! traits in `rpc`.

pub mod candidate;
pub mod config;
pub mod error;
pub mod key;
pub mod lookup;
pub mod manager;
pub mod node;
pub mod rpc;
pub mod task;
pub mod visited;

pub use config::Config;
pub use error::TaskError;
pub use key::{DistanceOrder, Key};
pub use lookup::LookupKind;
pub use manager::TaskManager;
pub use node::KBucketEntry;
pub use rpc::{Message, Response, RoutingTable, RpcCall, RpcServer, Scheduler};
pub use task::{Task, TaskListener, TaskState};
