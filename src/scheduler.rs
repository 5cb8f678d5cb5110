// Copyright 2024 The SmartInspect Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The async scheduler: one dedicated worker thread per protocol, fed by
//! a byte-bounded command queue. Producers either block
//! (`async.throttle=true`) or have the oldest pending commands silently
//! evicted (`async.throttle=false`) when the queue is over budget.
//!
//! A `Disconnect` command is the worker's only termination signal — it is
//! always the last command a `Scheduler` instance processes, matching
//! `Protocol::disconnect`'s async path ("enqueue Disconnect, stop() the
//! scheduler").

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use tracing::{debug, instrument};

use crate::packet::Packet;

pub struct DispatchCommand {
    pub name: &'static str,
    pub action: Box<dyn FnOnce() + Send>,
}

impl std::fmt::Debug for DispatchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchCommand").field("name", &self.name).finish()
    }
}

#[derive(Debug)]
pub enum SchedulerCommand {
    Connect,
    Disconnect,
    WritePacket(Packet),
    Dispatch(DispatchCommand),
}

impl SchedulerCommand {
    fn byte_size(&self) -> usize {
        match self {
            SchedulerCommand::WritePacket(p) => p.size(),
            _ => 0,
        }
    }

    fn is_disconnect(&self) -> bool {
        matches!(self, SchedulerCommand::Disconnect)
    }
}

struct Inner {
    deque: Mutex<VecDeque<SchedulerCommand>>,
    not_empty: Condvar,
    not_full: Condvar,
    threshold: usize,
    throttle: bool,
    size: Mutex<usize>,
}

/// The byte-bounded, single-consumer command queue backing a `Scheduler`.
pub struct SchedulerQueue {
    inner: Arc<Inner>,
}

impl SchedulerQueue {
    pub fn new(threshold: usize, throttle: bool) -> Self {
        SchedulerQueue {
            inner: Arc::new(Inner {
                deque: Mutex::new(VecDeque::new()),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                threshold,
                throttle,
                size: Mutex::new(0),
            }),
        }
    }

    /// Tail-inserts `cmd`. Blocks if `throttle` is set and the queue is
    /// over budget; otherwise evicts from the head until `cmd` fits.
    pub fn push(&self, cmd: SchedulerCommand) {
        let cmd_size = cmd.byte_size();
        let mut deque = self.inner.deque.lock().unwrap();
        let mut size = self.inner.size.lock().unwrap();

        if self.inner.throttle {
            while *size + cmd_size > self.inner.threshold && !deque.is_empty() {
                deque = self.inner.not_full.wait(deque).unwrap();
            }
        } else {
            while *size + cmd_size > self.inner.threshold && !deque.is_empty() {
                if let Some(evicted) = deque.pop_front() {
                    *size -= evicted.byte_size();
                }
            }
        }

        *size += cmd_size;
        deque.push_back(cmd);
        self.inner.not_empty.notify_one();
    }

    fn pop_blocking(&self) -> SchedulerCommand {
        let mut deque = self.inner.deque.lock().unwrap();
        while deque.is_empty() {
            deque = self.inner.not_empty.wait(deque).unwrap();
        }
        let cmd = deque.pop_front().unwrap();
        let mut size = self.inner.size.lock().unwrap();
        *size -= cmd.byte_size();
        self.inner.not_full.notify_one();
        cmd
    }

    /// Drops all pending commands without executing them.
    pub fn clear(&self) {
        let mut deque = self.inner.deque.lock().unwrap();
        deque.clear();
        *self.inner.size.lock().unwrap() = 0;
        self.inner.not_full.notify_all();
    }

    pub fn byte_size(&self) -> usize {
        *self.inner.size.lock().unwrap()
    }

    pub fn len(&self) -> usize {
        self.inner.deque.lock().unwrap().len()
    }
}

impl Clone for SchedulerQueue {
    fn clone(&self) -> Self {
        SchedulerQueue { inner: self.inner.clone() }
    }
}

/// One dedicated worker thread draining a `SchedulerQueue` in insertion
/// order, invoking `on_command` for each. The worker is the sole caller of
/// the protocol's internal primitives in async mode.
pub struct Scheduler {
    queue: SchedulerQueue,
    worker: Option<thread::JoinHandle<()>>,
}

impl Scheduler {
    pub fn start<F>(threshold: usize, throttle: bool, mut on_command: F) -> Self
    where
        F: FnMut(SchedulerCommand) + Send + 'static,
    {
        let queue = SchedulerQueue::new(threshold, throttle);
        let worker_queue = queue.clone();
        let worker = thread::spawn(move || {
            loop {
                let cmd = worker_queue.pop_blocking();
                let terminal = cmd.is_disconnect();
                on_command(cmd);
                if terminal {
                    break;
                }
            }
        });
        Scheduler { queue, worker: Some(worker) }
    }

    pub fn schedule(&self, cmd: SchedulerCommand) {
        self.queue.push(cmd);
    }

    pub fn clear(&self) {
        self.queue.clear();
    }

    pub fn queue(&self) -> &SchedulerQueue {
        &self.queue
    }

    /// Schedules a terminal `Disconnect`, drains it, and joins the worker.
    #[instrument(skip_all)]
    pub fn stop(mut self) {
        self.queue.push(SchedulerCommand::Disconnect);
        if let Some(handle) = self.worker.take() {
            debug!("joining scheduler worker");
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn preserves_submission_order() {
        let (tx, rx) = mpsc::channel();
        let scheduler = Scheduler::start(1_000_000, true, move |cmd| {
            if let SchedulerCommand::Dispatch(d) = cmd {
                tx.send(d.name).unwrap();
            }
        });

        for name in ["a", "b", "c"] {
            scheduler.schedule(SchedulerCommand::Dispatch(DispatchCommand {
                name,
                action: Box::new(|| {}),
            }));
        }
        scheduler.stop();

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received, vec!["a", "b", "c"]);
    }

    #[test]
    fn evicts_oldest_when_not_throttling() {
        let queue = SchedulerQueue::new(10, false);
        for i in 0..5u32 {
            queue.push(SchedulerCommand::WritePacket(test_packet(i)));
        }
        assert!(queue.byte_size() <= 10 || queue.len() <= 1);
    }

    #[test]
    fn stop_is_the_only_way_to_end_the_worker() {
        let scheduler = Scheduler::start(1_000_000, true, |_| {
            thread::sleep(Duration::from_millis(1));
        });
        scheduler.schedule(SchedulerCommand::Connect);
        scheduler.stop();
    }

    fn test_packet(n: u32) -> Packet {
        use crate::packet::{ControlCommandPacket, PacketBody};
        Packet::new(PacketBody::ControlCommand(ControlCommandPacket {
            level: crate::level::Level::Debug,
            control_command_type: n,
            data: vec![0; 64],
        }))
    }
}
