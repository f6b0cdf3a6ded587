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

//! A global admission layer above individual `Task`s (spec.md 4.7): caps how
//! many tasks run concurrently across the whole engine, independent of each
//! task's own per-task `max_concurrent_requests` cap from `rpc_call`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::task::{Task, TaskListener};

/// FIFO-by-`task_id` admission controller. Tasks submitted beyond
/// `max_running` sit in `queued` until an earlier task finishes, at which
/// point the oldest queued task is started.
pub struct TaskManager {
    max_running: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    running: Vec<Arc<Task>>,
    queued: VecDeque<Arc<Task>>,
}

impl TaskManager {
    pub fn new(max_running: usize) -> Arc<TaskManager> {
        Arc::new(TaskManager {
            max_running: max_running.max(1),
            inner: Mutex::new(Inner {
                running: Vec::new(),
                queued: VecDeque::new(),
            }),
        })
    }

    /// Submits `task` for execution. Starts it immediately if a running
    /// slot is free; otherwise it waits in FIFO order. Either way, a
    /// listener is attached so the next queued task is promoted the moment
    /// this one finishes.
    pub fn submit(self: &Arc<Self>, task: Arc<Task>) {
        task.add_listener(Box::new(CompletionListener {
            manager: Arc::downgrade(self),
            task_id: task.task_id,
        }));

        let mut inner = self.inner.lock().unwrap();
        if inner.running.len() < self.max_running {
            debug!("task manager: starting task {} immediately ({} running)", task.task_id, inner.running.len() + 1);
            inner.running.push(task.clone());
            drop(inner);
            task.start();
        } else {
            debug!("task manager: queuing task {} ({} already running)", task.task_id, inner.running.len());
            inner.queued.push_back(task);
        }
    }

    pub fn running_count(&self) -> usize {
        self.inner.lock().unwrap().running.len()
    }

    pub fn queued_count(&self) -> usize {
        self.inner.lock().unwrap().queued.len()
    }

    fn on_task_finished(&self, task_id: u64) {
        let next = {
            let mut inner = self.inner.lock().unwrap();
            inner.running.retain(|t| t.task_id != task_id);
            inner.queued.pop_front().map(|t| {
                inner.running.push(t.clone());
                t
            })
        };
        if let Some(task) = next {
            debug!("task manager: promoting queued task {}", task.task_id);
            task.start();
        }
    }
}

struct CompletionListener {
    manager: std::sync::Weak<TaskManager>,
    task_id: u64,
}

impl TaskListener for CompletionListener {
    fn finished(&self, _task: &Task) {
        if let Some(manager) = self.manager.upgrade() {
            manager.on_task_finished(self.task_id);
        }
    }
}
