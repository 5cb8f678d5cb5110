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

//! The backlog packet queue: a byte-bounded FIFO. `push` evicts from the
//! front until the new packet fits. A single packet larger than the cap
//! is still admitted; eviction empties the queue around it rather than
//! rejecting it outright.

use std::collections::VecDeque;

use crate::packet::Packet;

#[derive(Default)]
pub struct PacketQueue {
    backlog: usize,
    size: usize,
    packets: VecDeque<Packet>,
}

impl PacketQueue {
    pub fn new(backlog: usize) -> Self {
        PacketQueue { backlog, size: 0, packets: VecDeque::new() }
    }

    pub fn set_backlog(&mut self, backlog: usize) {
        self.backlog = backlog;
    }

    pub fn byte_size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Appends `packet`, evicting from the front until the total byte size
    /// fits within `backlog`. A packet bigger than the whole backlog is
    /// still admitted once the queue has been emptied around it.
    pub fn push(&mut self, packet: Packet) {
        let packet_size = packet.size();
        while !self.packets.is_empty() && self.size + packet_size > self.backlog {
            if let Some(evicted) = self.packets.pop_front() {
                self.size -= evicted.size();
            }
        }
        self.size += packet_size;
        self.packets.push_back(packet);
    }

    pub fn pop(&mut self) -> Option<Packet> {
        let packet = self.packets.pop_front()?;
        self.size -= packet.size();
        Some(packet)
    }

    pub fn clear(&mut self) {
        self.packets.clear();
        self.size = 0;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::level::Level;
    use crate::packet::{ControlCommandPacket, PacketBody};

    fn sized(data_len: usize) -> Packet {
        Packet::new(PacketBody::ControlCommand(ControlCommandPacket {
            level: Level::Debug,
            control_command_type: 0,
            data: vec![0; data_len],
        }))
    }

    #[test]
    fn eviction_keeps_newest() {
        // Each packet below serializes to exactly 64 bytes: 6-byte header +
        // 4 (type) + 4 (level) + 4 (data len prefix) + 46 bytes of data.
        let packet = sized(46);
        assert_eq!(packet.size(), 64);

        let mut q = PacketQueue::new(128);
        for _ in 0..6 {
            q.push(sized(46));
        }
        // Only the last two fit in a 128 byte backlog.
        assert_eq!(q.len(), 2);
        assert_eq!(q.byte_size(), 128);
    }

    #[test]
    fn oversized_packet_still_admitted() {
        let mut q = PacketQueue::new(10);
        q.push(sized(46));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn fifo_order_preserved() {
        let mut q = PacketQueue::new(10_000);
        for i in 0..5u32 {
            q.push(Packet::new(PacketBody::ControlCommand(ControlCommandPacket {
                level: Level::Debug,
                control_command_type: i,
                data: vec![],
            })));
        }
        for i in 0..5u32 {
            let p = q.pop().unwrap();
            match p.body {
                PacketBody::ControlCommand(c) => assert_eq!(c.control_command_type, i),
                _ => panic!("wrong kind"),
            }
        }
        assert!(q.pop().is_none());
    }
}
