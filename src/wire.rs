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

//! The binary formatter: the bit-exact wire layout shared by every packet
//! kind. Stateless — `encode_packet`/`decode_packet` are free
//! functions; `Formatter` only adds the compile/write staging split TCP
//! writes need so a chunk can test-fit a packet before committing it.

use std::io::{self, Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::chunk::ChunkPacket;
use crate::level::Level;
use crate::packet::{
    ControlCommandPacket, LogEntryPacket, LogHeaderPacket, Packet, PacketBody, PacketType,
    ProcessFlowPacket, WatchPacket,
};

const NULL_STRING_LEN: u32 = 0xFFFF_FFFF;

fn write_string<W: Write>(w: &mut W, s: &Option<String>) -> io::Result<()> {
    match s {
        None => w.write_u32::<BigEndian>(NULL_STRING_LEN),
        Some(v) => {
            let bytes = v.as_bytes();
            w.write_u32::<BigEndian>(bytes.len() as u32)?;
            w.write_all(bytes)
        }
    }
}

fn read_string<R: Read>(r: &mut R) -> io::Result<Option<String>> {
    let len = r.read_u32::<BigEndian>()?;
    if len == NULL_STRING_LEN {
        return Ok(None);
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map(Some).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn write_bytes<W: Write>(w: &mut W, data: &[u8]) -> io::Result<()> {
    w.write_u32::<BigEndian>(data.len() as u32)?;
    w.write_all(data)
}

fn read_bytes<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = r.read_u32::<BigEndian>()?;
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn encode_payload(body: &PacketBody) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    match body {
        PacketBody::LogEntry(p) => {
            buf.write_u32::<BigEndian>(p.log_entry_type)?;
            buf.write_u32::<BigEndian>(p.viewer_id)?;
            buf.write_u32::<BigEndian>(p.thread_id)?;
            buf.write_u32::<BigEndian>(p.process_id)?;
            buf.write_u32::<BigEndian>(p.timestamp_sec)?;
            buf.write_u32::<BigEndian>(p.timestamp_usec)?;
            buf.write_u32::<BigEndian>(p.color)?;
            write_string(&mut buf, &p.appname)?;
            write_string(&mut buf, &p.sessionname)?;
            write_string(&mut buf, &p.title)?;
            write_string(&mut buf, &p.hostname)?;
            write_bytes(&mut buf, &p.data)?;
        }
        PacketBody::ControlCommand(p) => {
            buf.write_u32::<BigEndian>(p.control_command_type)?;
            buf.write_u32::<BigEndian>(p.level.as_u32())?;
            write_bytes(&mut buf, &p.data)?;
        }
        PacketBody::Watch(p) => {
            buf.write_u32::<BigEndian>(p.watch_type)?;
            buf.write_u32::<BigEndian>(p.level.as_u32())?;
            buf.write_u32::<BigEndian>(p.timestamp_sec)?;
            buf.write_u32::<BigEndian>(p.timestamp_usec)?;
            write_string(&mut buf, &p.name)?;
            write_string(&mut buf, &p.value)?;
        }
        PacketBody::ProcessFlow(p) => {
            buf.write_u32::<BigEndian>(p.process_flow_type)?;
            buf.write_u32::<BigEndian>(p.level.as_u32())?;
            buf.write_u32::<BigEndian>(p.thread_id)?;
            buf.write_u32::<BigEndian>(p.process_id)?;
            buf.write_u32::<BigEndian>(p.timestamp_sec)?;
            buf.write_u32::<BigEndian>(p.timestamp_usec)?;
            write_string(&mut buf, &p.title)?;
            write_string(&mut buf, &p.hostname)?;
        }
        PacketBody::LogHeader(p) => {
            buf.write_u32::<BigEndian>(p.level.as_u32())?;
            write_string(&mut buf, &p.content)?;
        }
        PacketBody::Chunk(c) => {
            buf.write_u16::<BigEndian>(1)?; // chunkFormat
            buf.write_u32::<BigEndian>(c.packet_count)?;
            buf.write_u32::<BigEndian>(c.body.len() as u32)?;
            buf.write_all(&c.body)?;
        }
    }
    Ok(buf)
}

/// Serializes a packet into a full wire record: the 6-byte header followed
/// by its payload. Always succeeds for well-formed in-memory packets; the
/// `io::Result` only exists because it's built atop `Write`.
pub fn encode_packet(packet: &Packet) -> Vec<u8> {
    let payload = encode_payload(&packet.body).expect("encoding into a Vec<u8> cannot fail");
    let mut out = Vec::with_capacity(6 + payload.len());
    out.write_u16::<BigEndian>(packet.kind() as u16).unwrap();
    out.write_u32::<BigEndian>(payload.len() as u32).unwrap();
    out.extend_from_slice(&payload);
    out
}

/// Parses a single full wire record (header + payload) from `bytes`,
/// returning the packet and the number of bytes consumed.
pub fn decode_packet(bytes: &[u8]) -> io::Result<(Packet, usize)> {
    let mut cursor = Cursor::new(bytes);
    let kind = cursor.read_u16::<BigEndian>()?;
    let total_length = cursor.read_u32::<BigEndian>()? as usize;
    let header_len = cursor.position() as usize;
    let payload = &bytes[header_len..header_len + total_length];
    let mut body_cursor = Cursor::new(payload);

    let body = match kind {
        x if x == PacketType::LogEntry as u16 => PacketBody::LogEntry(LogEntryPacket {
            level: Level::Debug,
            log_entry_type: body_cursor.read_u32::<BigEndian>()?,
            viewer_id: body_cursor.read_u32::<BigEndian>()?,
            thread_id: body_cursor.read_u32::<BigEndian>()?,
            process_id: body_cursor.read_u32::<BigEndian>()?,
            timestamp_sec: body_cursor.read_u32::<BigEndian>()?,
            timestamp_usec: body_cursor.read_u32::<BigEndian>()?,
            color: body_cursor.read_u32::<BigEndian>()?,
            appname: read_string(&mut body_cursor)?,
            sessionname: read_string(&mut body_cursor)?,
            title: read_string(&mut body_cursor)?,
            hostname: read_string(&mut body_cursor)?,
            data: read_bytes(&mut body_cursor)?,
        }),
        x if x == PacketType::ControlCommand as u16 => {
            PacketBody::ControlCommand(ControlCommandPacket {
                control_command_type: body_cursor.read_u32::<BigEndian>()?,
                level: level_from_u32(body_cursor.read_u32::<BigEndian>()?),
                data: read_bytes(&mut body_cursor)?,
            })
        }
        x if x == PacketType::Watch as u16 => PacketBody::Watch(WatchPacket {
            watch_type: body_cursor.read_u32::<BigEndian>()?,
            level: level_from_u32(body_cursor.read_u32::<BigEndian>()?),
            timestamp_sec: body_cursor.read_u32::<BigEndian>()?,
            timestamp_usec: body_cursor.read_u32::<BigEndian>()?,
            name: read_string(&mut body_cursor)?,
            value: read_string(&mut body_cursor)?,
        }),
        x if x == PacketType::ProcessFlow as u16 => PacketBody::ProcessFlow(ProcessFlowPacket {
            process_flow_type: body_cursor.read_u32::<BigEndian>()?,
            level: level_from_u32(body_cursor.read_u32::<BigEndian>()?),
            thread_id: body_cursor.read_u32::<BigEndian>()?,
            process_id: body_cursor.read_u32::<BigEndian>()?,
            timestamp_sec: body_cursor.read_u32::<BigEndian>()?,
            timestamp_usec: body_cursor.read_u32::<BigEndian>()?,
            title: read_string(&mut body_cursor)?,
            hostname: read_string(&mut body_cursor)?,
        }),
        x if x == PacketType::LogHeader as u16 => PacketBody::LogHeader(LogHeaderPacket {
            level: level_from_u32(body_cursor.read_u32::<BigEndian>()?),
            content: read_string(&mut body_cursor)?,
        }),
        x if x == PacketType::Chunk as u16 => {
            let _chunk_format = body_cursor.read_u16::<BigEndian>()?;
            let packet_count = body_cursor.read_u32::<BigEndian>()?;
            let body_bytes = body_cursor.read_u32::<BigEndian>()? as usize;
            let mut body = vec![0u8; body_bytes];
            body_cursor.read_exact(&mut body)?;
            PacketBody::Chunk(ChunkPacket { packet_count, body })
        }
        other => {
            return Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown packet type {other}")))
        }
    };

    Ok((Packet::new(body), header_len + total_length))
}

fn level_from_u32(v: u32) -> Level {
    match v {
        0 => Level::Debug,
        1 => Level::Verbose,
        2 => Level::Message,
        3 => Level::Warning,
        4 => Level::Error,
        5 => Level::Fatal,
        _ => Level::Control,
    }
}

/// Stages a packet's serialized bytes so a caller can inspect its length
/// (`compile`) before actually emitting them to a stream (`write`).
#[derive(Default)]
pub struct Formatter {
    staged: Vec<u8>,
}

impl Formatter {
    pub fn new() -> Self {
        Formatter { staged: Vec::new() }
    }

    pub fn compile(&mut self, packet: &Packet) -> usize {
        self.staged = encode_packet(packet);
        self.staged.len()
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.staged)
    }
}
