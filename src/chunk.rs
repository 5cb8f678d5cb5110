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

//! The chunk bundler: packs many formatted packets into one `Chunk` wire
//! record (kind 8), bounded by byte size and by the age of the first
//! packet appended since the last reset.
//!
//! `compile_packet`/`chunk_formatted_packet` are split the same way the
//! binary formatter's `compile`/`write` are: staging a packet lets the
//! caller test whether it fits before committing it to the chunk body.

use std::time::{Duration, Instant};

use crate::packet::Packet;
use crate::wire;

/// The wire payload for a `Chunk` packet: `packetCount` formatted inner
/// packets concatenated in `body`, each already a full 6-byte-headered
/// record.
#[derive(Debug, Clone, Default)]
pub struct ChunkPacket {
    pub packet_count: u32,
    pub body: Vec<u8>,
}

pub struct Chunk {
    max_size: usize,
    packet_count: u32,
    body: Vec<u8>,
    staged: Option<Vec<u8>>,
    first_packet_at: Option<Instant>,
}

impl Chunk {
    pub fn new(max_size: usize) -> Self {
        Chunk { max_size, packet_count: 0, body: Vec::new(), staged: None, first_packet_at: None }
    }

    pub fn packet_count(&self) -> u32 {
        self.packet_count
    }

    /// Total size this chunk would occupy on the wire if finished right
    /// now: the 6-byte outer packet header, the 2+4+4 chunk-specific
    /// header, plus the accumulated body.
    pub fn size(&self) -> usize {
        6 + 2 + 4 + 4 + self.body.len()
    }

    /// Serializes `packet` into the staging area and returns its byte
    /// length, without appending it to the chunk body yet.
    pub fn compile_packet(&mut self, packet: &Packet) -> usize {
        let encoded = wire::encode_packet(packet);
        let len = encoded.len();
        self.staged = Some(encoded);
        len
    }

    /// True iff the most recently staged packet would fit alongside the
    /// chunk's current contents without exceeding `max_size`.
    pub fn can_fit_formatted_packet(&self) -> bool {
        match &self.staged {
            Some(staged) => self.size() + staged.len() <= self.max_size,
            None => true,
        }
    }

    /// Moves the staged bytes into the chunk body and increments
    /// `packet_count`. Captures the start time on the first append.
    pub fn chunk_formatted_packet(&mut self) {
        if let Some(staged) = self.staged.take() {
            if self.first_packet_at.is_none() {
                self.first_packet_at = Some(Instant::now());
            }
            self.body.extend_from_slice(&staged);
            self.packet_count += 1;
        }
    }

    pub fn milliseconds_since_first_packet(&self) -> u64 {
        match self.first_packet_at {
            Some(start) => start.elapsed().as_millis() as u64,
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.packet_count == 0
    }

    /// Drains this chunk into its wire packet and resets all internal
    /// state so the `Chunk` can be reused for the next batch.
    pub fn reset(&mut self) -> ChunkPacket {
        let packet = ChunkPacket {
            packet_count: self.packet_count,
            body: std::mem::take(&mut self.body),
        };
        self.packet_count = 0;
        self.staged = None;
        self.first_packet_at = None;
        packet
    }

    pub fn max_age_elapsed(&self, max_age: Duration) -> bool {
        match self.first_packet_at {
            Some(start) => start.elapsed() >= max_age,
            None => false,
        }
    }
}
