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

//! The packet model: a tagged variant of record kinds sharing a severity
//! level and a thread-safety marker.
//!
//! The real protocol's per-packet mutex exists so a session façade can keep
//! mutating a packet it handed off to a background writer thread. Here
//! ownership transfers on enqueue instead, since the packet moves into a
//! channel send, so there is no mutex to acquire; `lock`/`unlock` are kept
//! as no-ops for API parity with callers that still bracket a write with
//! them.

pub mod control_command;
pub mod log_entry;
pub mod log_header;
pub mod process_flow;
pub mod watch;

pub use control_command::ControlCommandPacket;
pub use log_entry::LogEntryPacket;
pub use log_header::LogHeaderPacket;
pub use process_flow::ProcessFlowPacket;
pub use watch::WatchPacket;

use crate::chunk::ChunkPacket;
use crate::level::Level;

/// The 6-byte packet header's type tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum PacketType {
    ControlCommand = 1,
    LogEntry = 4,
    Watch = 5,
    ProcessFlow = 6,
    LogHeader = 7,
    Chunk = 8,
}

#[derive(Debug, Clone)]
pub enum PacketBody {
    LogEntry(LogEntryPacket),
    ControlCommand(ControlCommandPacket),
    Watch(WatchPacket),
    ProcessFlow(ProcessFlowPacket),
    LogHeader(LogHeaderPacket),
    Chunk(ChunkPacket),
}

#[derive(Debug, Clone)]
pub struct Packet {
    thread_safe: bool,
    pub body: PacketBody,
}

impl Packet {
    pub fn new(body: PacketBody) -> Self {
        Packet { thread_safe: false, body }
    }

    pub fn kind(&self) -> PacketType {
        match &self.body {
            PacketBody::LogEntry(_) => PacketType::LogEntry,
            PacketBody::ControlCommand(_) => PacketType::ControlCommand,
            PacketBody::Watch(_) => PacketType::Watch,
            PacketBody::ProcessFlow(_) => PacketType::ProcessFlow,
            PacketBody::LogHeader(_) => PacketType::LogHeader,
            PacketBody::Chunk(_) => PacketType::Chunk,
        }
    }

    pub fn level(&self) -> Level {
        match &self.body {
            PacketBody::LogEntry(p) => p.level,
            PacketBody::ControlCommand(p) => p.level,
            PacketBody::Watch(p) => p.level,
            PacketBody::ProcessFlow(p) => p.level,
            PacketBody::LogHeader(p) => p.level,
            PacketBody::Chunk(_) => Level::Control,
        }
    }

    pub fn set_level(&mut self, level: Level) {
        match &mut self.body {
            PacketBody::LogEntry(p) => p.level = level,
            PacketBody::ControlCommand(p) => p.level = level,
            PacketBody::Watch(p) => p.level = level,
            PacketBody::ProcessFlow(p) => p.level = level,
            PacketBody::LogHeader(p) => p.level = level,
            PacketBody::Chunk(_) => {}
        }
    }

    /// Serialized size in bytes: the per-type header plus payload, as
    /// emitted by `wire::encode_packet`. Must always equal what the
    /// formatter actually produces, so it simply delegates rather than
    /// keeping an independent estimate in sync.
    pub fn size(&self) -> usize {
        crate::wire::encode_packet(self).len()
    }

    /// No-op unless the packet has been marked thread-safe by the
    /// scheduler on enqueue; real cross-thread safety comes from ownership
    /// transfer (the packet moves into the scheduler's channel), not this
    /// call.
    pub fn lock(&self) {}

    /// See `lock`.
    pub fn unlock(&self) {}

    pub fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }

    pub fn mark_thread_safe(&mut self) {
        self.thread_safe = true;
    }
}

impl From<LogEntryPacket> for Packet {
    fn from(p: LogEntryPacket) -> Self {
        Packet::new(PacketBody::LogEntry(p))
    }
}

impl From<ControlCommandPacket> for Packet {
    fn from(p: ControlCommandPacket) -> Self {
        Packet::new(PacketBody::ControlCommand(p))
    }
}

impl From<WatchPacket> for Packet {
    fn from(p: WatchPacket) -> Self {
        Packet::new(PacketBody::Watch(p))
    }
}

impl From<ProcessFlowPacket> for Packet {
    fn from(p: ProcessFlowPacket) -> Self {
        Packet::new(PacketBody::ProcessFlow(p))
    }
}

impl From<LogHeaderPacket> for Packet {
    fn from(p: LogHeaderPacket) -> Self {
        Packet::new(PacketBody::LogHeader(p))
    }
}

impl From<ChunkPacket> for Packet {
    fn from(p: ChunkPacket) -> Self {
        Packet::new(PacketBody::Chunk(p))
    }
}
