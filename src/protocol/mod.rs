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

//! The protocol lifecycle state machine: option loading, the backlog,
//! reconnect policy, and the blocking/async split, generic over
//! whatever [`transport::Transport`] it drives.

pub mod cloud;
pub mod tcp;
pub mod transport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::error::{ConfigError, TransportError};
use crate::level::Level;
use crate::listener::{ErrorListener, NoopErrorListener};
use crate::options::OptionTable;
use crate::packet::Packet;
use crate::queue::PacketQueue;
use crate::scheduler::{DispatchCommand, Scheduler, SchedulerCommand};

pub use transport::Transport;

pub const COMMON_OPTION_KEYS: &[&str] = &[
    "level",
    "caption",
    "reconnect",
    "reconnect.interval",
    "backlog.enabled",
    "backlog.queue",
    "backlog.flushon",
    "backlog.keepopen",
    "async.enabled",
    "async.queue",
    "async.throttle",
    "async.clearondisconnect",
];

#[derive(Debug, Clone)]
pub struct CommonOptions {
    pub level: Level,
    pub caption: String,
    pub reconnect: bool,
    pub reconnect_interval: Duration,
    pub backlog_enabled: bool,
    pub backlog_queue: usize,
    pub backlog_flushon: Level,
    pub backlog_keepopen: bool,
    pub async_enabled: bool,
    pub async_queue: usize,
    pub async_throttle: bool,
    pub async_clearondisconnect: bool,
}

impl CommonOptions {
    pub fn load(table: &OptionTable, protocol_name: &str) -> Self {
        CommonOptions {
            level: table.get_level("level", Level::Debug),
            caption: table.get_string("caption", protocol_name),
            reconnect: table.get_bool("reconnect", false),
            reconnect_interval: Duration::from_millis(table.get_timespan_ms("reconnect.interval", 0)),
            backlog_enabled: table.get_bool("backlog.enabled", false),
            backlog_queue: table.get_size("backlog.queue", 2 * 1024 * 1024) as usize,
            backlog_flushon: table.get_level("backlog.flushon", Level::Error),
            backlog_keepopen: table.get_bool("backlog.keepopen", false),
            async_enabled: table.get_bool("async.enabled", false),
            async_queue: table.get_size("async.queue", 2 * 1024 * 1024) as usize,
            async_throttle: table.get_bool("async.throttle", true),
            async_clearondisconnect: table.get_bool("async.clearondisconnect", false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProtocolState {
    Unconfigured,
    Configured,
    Disconnected,
    Connected,
    Closed,
}

/// Everything a worker thread (async) or the calling thread (blocking)
/// touches while driving the transport. Held behind one lock, matching the
/// single state-machine mutex every public entry point acquires.
struct Inner<T: Transport> {
    name: String,
    transport: T,
    level: Level,
    reconnect: bool,
    reconnect_interval: Duration,
    keep_open: bool,
    backlog_enabled: bool,
    backlog_flushon: Level,
    backlog_keepopen: bool,
    backlog: PacketQueue,
    connected: bool,
    failed: bool,
    last_reconnect_attempt: Option<Instant>,
}

impl<T: Transport> Inner<T> {
    fn reset(&mut self) {
        if let Err(e) = self.transport.close() {
            warn!(protocol = %self.name, error = %e, "error closing transport during reset");
        }
        self.connected = false;
    }

    fn impl_connect(&mut self) -> Result<(), TransportError> {
        if !self.connected && self.keep_open {
            match self.transport.open() {
                Ok(()) => {
                    self.connected = true;
                    self.failed = false;
                    Ok(())
                }
                Err(e) => {
                    self.reset();
                    Err(e)
                }
            }
        } else {
            Ok(())
        }
    }

    fn try_reconnect(&mut self) {
        let now = Instant::now();
        let too_soon = self
            .last_reconnect_attempt
            .map(|t| now.duration_since(t) < self.reconnect_interval)
            .unwrap_or(false);
        if too_soon {
            return;
        }
        self.last_reconnect_attempt = Some(now);
        match self.transport.open() {
            Ok(()) => {
                self.connected = true;
                self.failed = false;
            }
            Err(e) => {
                debug!(protocol = %self.name, error = %e, "reconnect attempt failed, recorded silently");
                self.failed = true;
            }
        }
    }

    /// `force_open` and `disconnect_after` together implement
    /// `backlog.keepopen=false`: every backlog-governed trigger write
    /// reopens the transport regardless of `reconnect`/its interval, then
    /// closes it again right after, so the transport is only ever open for
    /// the duration of a flush.
    fn forward_packet(&mut self, mut packet: Packet, force_open: bool, disconnect_after: bool) -> Result<(), TransportError> {
        if !self.connected {
            if force_open || !self.keep_open {
                self.transport.open()?;
                self.connected = true;
            } else if self.reconnect {
                self.try_reconnect();
            }
        }

        if self.connected {
            packet.mark_thread_safe();
            packet.lock();
            let result = self.transport.write_packet(&packet);
            packet.unlock();
            result?;
        }

        if disconnect_after {
            self.reset();
        }
        Ok(())
    }

    fn impl_write_packet(&mut self, packet: Packet) -> Result<(), TransportError> {
        let backlog_flush_cycle = self.backlog_enabled && !self.backlog_keepopen;
        if !self.connected && !self.reconnect && !self.keep_open && !backlog_flush_cycle {
            return Ok(());
        }

        if self.backlog_enabled && packet.level() < self.backlog_flushon && packet.level() != Level::Control {
            self.backlog.push(packet);
            return Ok(());
        }

        while let Some(buffered) = self.backlog.pop() {
            if let Err(e) = self.forward_packet(buffered, backlog_flush_cycle, false) {
                warn!(protocol = %self.name, error = %e, "discarding remaining backlog after forced-flush failure");
                self.reset();
                self.backlog.clear();
                break;
            }
        }

        self.forward_packet(packet, backlog_flush_cycle, backlog_flush_cycle)
    }
}

/// The lifecycle state machine: `Unconfigured -> Configured ->
/// (Disconnected <-> Connected) -> Closed`.
pub struct Protocol<T: Transport> {
    shared: Arc<Mutex<Inner<T>>>,
    listener: Arc<dyn ErrorListener>,
    async_enabled: bool,
    async_queue: usize,
    async_throttle: bool,
    async_clearondisconnect: bool,
    scheduler: Option<Scheduler>,
    poll_stop: Option<Arc<AtomicBool>>,
    poll_thread: Option<thread::JoinHandle<()>>,
    state: ProtocolState,
}

impl<T: Transport + 'static> Protocol<T> {
    pub fn new(name: impl Into<String>, transport: T) -> Self {
        let name = name.into();
        Protocol {
            shared: Arc::new(Mutex::new(Inner {
                name,
                transport,
                level: Level::Debug,
                reconnect: false,
                reconnect_interval: Duration::from_millis(0),
                keep_open: true,
                backlog_enabled: false,
                backlog_flushon: Level::Error,
                backlog_keepopen: false,
                backlog: PacketQueue::new(2 * 1024 * 1024),
                connected: false,
                failed: false,
                last_reconnect_attempt: None,
            })),
            listener: Arc::new(NoopErrorListener),
            async_enabled: false,
            async_queue: 2 * 1024 * 1024,
            async_throttle: true,
            async_clearondisconnect: false,
            scheduler: None,
            poll_stop: None,
            poll_thread: None,
            state: ProtocolState::Unconfigured,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ErrorListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn name(&self) -> String {
        self.shared.lock().unwrap().name.clone()
    }

    pub fn is_failed(&self) -> bool {
        self.shared.lock().unwrap().failed
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().unwrap().connected
    }

    /// Parses and validates `options` against `allowed_keys` (the union of
    /// the common keys and whatever the transport itself recognizes),
    /// applies the common fields, and returns the table so the caller can
    /// also pull transport-specific fields out of it. Re-running this
    /// later simply reapplies the same pure parse, so it is idempotent.
    pub fn initialize(&mut self, options: &str, allowed_keys: &[&str]) -> Result<OptionTable, ConfigError> {
        let table = OptionTable::parse(options)?;
        let name = self.name();
        table.validate_keys(&name, allowed_keys)?;
        let common = CommonOptions::load(&table, &name);

        {
            let mut inner = self.shared.lock().unwrap();
            inner.level = common.level;
            inner.reconnect = common.reconnect;
            inner.reconnect_interval = common.reconnect_interval;
            inner.backlog_enabled = common.backlog_enabled;
            inner.backlog_flushon = common.backlog_flushon;
            inner.backlog_keepopen = common.backlog_keepopen;
            inner.backlog.set_backlog(common.backlog_queue);
        }
        self.async_enabled = common.async_enabled;
        self.async_queue = common.async_queue;
        self.async_throttle = common.async_throttle;
        self.async_clearondisconnect = common.async_clearondisconnect;

        self.state = ProtocolState::Configured;
        Ok(table)
    }

    fn ensure_scheduler(&mut self) {
        if self.scheduler.is_some() {
            return;
        }
        let shared = self.shared.clone();
        let listener = self.listener.clone();
        let scheduler = Scheduler::start(self.async_queue, self.async_throttle, move |cmd| {
            let mut inner = shared.lock().unwrap();
            match cmd {
                SchedulerCommand::Connect => {
                    if let Err(e) = inner.impl_connect() {
                        listener.on_error(&inner.name, &e);
                    }
                }
                SchedulerCommand::Disconnect => inner.reset(),
                SchedulerCommand::WritePacket(packet) => {
                    if let Err(e) = inner.impl_write_packet(packet) {
                        inner.reset();
                        listener.on_error(&inner.name, &e);
                    }
                }
                SchedulerCommand::Dispatch(d) => (d.action)(),
            }
        });
        self.scheduler = Some(scheduler);
    }

    fn start_poll_thread(&mut self) {
        if self.poll_thread.is_some() {
            return;
        }
        let stop = Arc::new(AtomicBool::new(false));
        let stop_signal = stop.clone();
        let shared = self.shared.clone();
        let handle = thread::spawn(move || {
            while !stop_signal.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(100));
                let mut inner = shared.lock().unwrap();
                if inner.connected {
                    if let Err(e) = inner.transport.poll() {
                        warn!(protocol = %inner.name, error = %e, "poll failed, resetting");
                        inner.reset();
                    }
                }
            }
        });
        self.poll_stop = Some(stop);
        self.poll_thread = Some(handle);
    }

    fn stop_poll_thread(&mut self) {
        if let Some(stop) = self.poll_stop.take() {
            stop.store(true, Ordering::Relaxed);
        }
        if let Some(handle) = self.poll_thread.take() {
            let _ = handle.join();
        }
    }

    #[instrument(skip_all, fields(protocol = %self.name()))]
    pub fn connect(&mut self) -> Result<(), TransportError> {
        let result = if self.async_enabled {
            self.ensure_scheduler();
            self.scheduler.as_ref().unwrap().schedule(SchedulerCommand::Connect);
            Ok(())
        } else {
            let mut inner = self.shared.lock().unwrap();
            inner.impl_connect()
        };
        if result.is_ok() {
            self.state = ProtocolState::Connected;
            self.start_poll_thread();
        }
        result
    }

    #[instrument(skip_all, fields(protocol = %self.name()))]
    pub fn write_packet(&mut self, mut packet: Packet) -> Result<(), TransportError> {
        let level = { self.shared.lock().unwrap().level };
        if packet.level() < level {
            return Ok(());
        }
        if self.async_enabled {
            self.ensure_scheduler();
            packet.mark_thread_safe();
            self.scheduler.as_ref().unwrap().schedule(SchedulerCommand::WritePacket(packet));
            Ok(())
        } else {
            let mut inner = self.shared.lock().unwrap();
            let result = inner.impl_write_packet(packet);
            if result.is_err() {
                inner.reset();
            }
            result
        }
    }

    pub fn dispatch(&mut self, name: &'static str, action: Box<dyn FnOnce() + Send>) {
        if self.async_enabled {
            self.ensure_scheduler();
            self.scheduler.as_ref().unwrap().schedule(SchedulerCommand::Dispatch(DispatchCommand { name, action }));
        } else {
            action();
        }
    }

    pub fn disconnect(&mut self) -> Result<(), TransportError> {
        self.stop_poll_thread();
        if self.async_enabled {
            if let Some(scheduler) = self.scheduler.take() {
                if self.async_clearondisconnect {
                    scheduler.clear();
                }
                scheduler.stop();
            }
            self.state = ProtocolState::Disconnected;
            Ok(())
        } else {
            let mut inner = self.shared.lock().unwrap();
            inner.reset();
            self.state = ProtocolState::Disconnected;
            Ok(())
        }
    }

    pub fn close(&mut self) -> Result<(), TransportError> {
        self.disconnect()?;
        self.state = ProtocolState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::level::Level;
    use crate::packet::ControlCommandPacket;
    use std::sync::atomic::AtomicUsize;

    struct RecordingTransport {
        opens: Arc<AtomicUsize>,
        written: Arc<Mutex<Vec<u32>>>,
        fail_write: bool,
    }

    impl Transport for RecordingTransport {
        fn name(&self) -> &str {
            "test"
        }
        fn open(&mut self) -> Result<(), TransportError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
        fn write_packet(&mut self, packet: &Packet) -> Result<(), TransportError> {
            if self.fail_write {
                return Err(TransportError::Rejected { protocol: "test".into(), message: "nope".into() });
            }
            if let crate::packet::PacketBody::ControlCommand(c) = &packet.body {
                self.written.lock().unwrap().push(c.control_command_type);
            }
            Ok(())
        }
    }

    fn control(n: u32, level: Level) -> Packet {
        ControlCommandPacket { level, control_command_type: n, data: vec![] }.into()
    }

    #[test]
    fn backlog_flush_preserves_order() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let transport = RecordingTransport { opens: Arc::new(AtomicUsize::new(0)), written: written.clone(), fail_write: false };
        let mut protocol = Protocol::new("test", transport);
        protocol
            .initialize("backlog.enabled=true,backlog.flushon=error,backlog.queue=65536", COMMON_OPTION_KEYS)
            .unwrap();
        protocol.connect().unwrap();

        protocol.write_packet(control(1, Level::Debug)).unwrap();
        protocol.write_packet(control(2, Level::Debug)).unwrap();
        protocol.write_packet(control(3, Level::Warning)).unwrap();
        protocol.write_packet(control(4, Level::Error)).unwrap();

        assert_eq!(*written.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn write_below_level_is_skipped() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let transport = RecordingTransport { opens: Arc::new(AtomicUsize::new(0)), written: written.clone(), fail_write: false };
        let mut protocol = Protocol::new("test", transport);
        protocol.initialize("level=warning", COMMON_OPTION_KEYS).unwrap();
        protocol.connect().unwrap();
        protocol.write_packet(control(1, Level::Debug)).unwrap();
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn backlog_keepopen_false_reopens_on_every_flush() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let opens = Arc::new(AtomicUsize::new(0));
        let transport = RecordingTransport { opens: opens.clone(), written: written.clone(), fail_write: false };
        let mut protocol = Protocol::new("test", transport);
        protocol
            .initialize("backlog.enabled=true,backlog.flushon=error,backlog.queue=65536,backlog.keepopen=false", COMMON_OPTION_KEYS)
            .unwrap();
        protocol.connect().unwrap();

        // First flush cycle: closes the transport again once the trigger lands.
        protocol.write_packet(control(1, Level::Debug)).unwrap();
        protocol.write_packet(control(2, Level::Error)).unwrap();
        assert!(!protocol.is_connected());

        // A second, independent flush cycle must still reach the transport
        // instead of being silently dropped now that the transport is closed.
        protocol.write_packet(control(3, Level::Debug)).unwrap();
        protocol.write_packet(control(4, Level::Error)).unwrap();
        assert!(!protocol.is_connected());

        assert_eq!(*written.lock().unwrap(), vec![1, 2, 3, 4]);
        assert!(opens.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn write_failure_then_next_write_is_inert() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let opens = Arc::new(AtomicUsize::new(0));
        let transport = RecordingTransport { opens: opens.clone(), written: written.clone(), fail_write: true };
        let mut protocol = Protocol::new("test", transport);
        protocol.initialize("reconnect=false", COMMON_OPTION_KEYS).unwrap();
        protocol.connect().unwrap();
        assert!(protocol.is_connected());

        let err = protocol.write_packet(control(1, Level::Error));
        assert!(err.is_err());
        assert!(!protocol.is_connected());

        // reconnect=false and the transport is already closed, so this is a no-op.
        let second = protocol.write_packet(control(2, Level::Error));
        assert!(second.is_ok());
        assert!(written.lock().unwrap().is_empty());
    }
}
