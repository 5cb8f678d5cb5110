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

//! The tcp handshake and ack cycle driven through the full lifecycle state
//! machine rather than the bare transport (see `src/protocol/tcp.rs`'s own
//! inline tests for that narrower check).

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use smartinspect_transport::level::Level;
use smartinspect_transport::packet::ControlCommandPacket;
use smartinspect_transport::protocol::tcp::{TcpOptions, TcpTransport, TCP_OPTION_KEYS};
use smartinspect_transport::protocol::{Protocol, COMMON_OPTION_KEYS};

fn allowed_keys() -> Vec<&'static str> {
    COMMON_OPTION_KEYS.iter().chain(TCP_OPTION_KEYS.iter()).copied().collect()
}

/// Reads one framed packet (6-byte header + body) and acks it `OK`.
fn read_and_ack_frame<R: Read, W: Write>(reader: &mut R, writer: &mut W) {
    let mut header = [0u8; 6];
    reader.read_exact(&mut header).unwrap();
    let total_len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
    let mut body = vec![0u8; total_len];
    reader.read_exact(&mut body).unwrap();
    writer.write_all(b"OK").unwrap();
}

#[test]
#[ntest::timeout(5000)]
fn handshake_then_packet_succeeds() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        writer.write_all(b"Console 1.0\n").unwrap();

        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut client_banner = String::new();
        reader.read_line(&mut client_banner).unwrap();
        assert!(client_banner.starts_with("SmartInspect Java Library v"));

        // The automatic LogHeader sent by open().
        read_and_ack_frame(&mut reader, &mut writer);
        // The caller's own packet.
        read_and_ack_frame(&mut reader, &mut writer);
    });

    let transport = TcpTransport::new(TcpOptions { host: addr.ip().to_string(), port: addr.port(), timeout: Duration::from_secs(2) });
    let mut protocol = Protocol::new("tcp", transport);
    protocol.initialize("", &allowed_keys()).unwrap();
    protocol.connect().unwrap();
    assert!(protocol.is_connected());

    let packet: smartinspect_transport::Packet =
        ControlCommandPacket { level: Level::Error, control_command_type: 1, data: vec![] }.into();
    protocol.write_packet(packet).unwrap();
    protocol.disconnect().unwrap();

    server.join().unwrap();
}

#[test]
#[ntest::timeout(5000)]
fn ack_failure_resets_and_next_write_is_inert() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        writer.write_all(b"Console 1.0\n").unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut client_banner = String::new();
        reader.read_line(&mut client_banner).unwrap();

        // The automatic LogHeader sent by open().
        read_and_ack_frame(&mut reader, &mut writer);

        // The caller's own packet gets rejected.
        let mut header = [0u8; 6];
        reader.read_exact(&mut header).unwrap();
        let total_len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
        let mut body = vec![0u8; total_len];
        reader.read_exact(&mut body).unwrap();
        writer.write_all(b"E").unwrap();
    });

    let transport = TcpTransport::new(TcpOptions { host: addr.ip().to_string(), port: addr.port(), timeout: Duration::from_secs(2) });
    let mut protocol = Protocol::new("tcp", transport);
    protocol.initialize("reconnect=false", &allowed_keys()).unwrap();
    protocol.connect().unwrap();

    let packet: smartinspect_transport::Packet =
        ControlCommandPacket { level: Level::Error, control_command_type: 1, data: vec![] }.into();
    let err = protocol.write_packet(packet);
    assert!(err.is_err());
    assert!(!protocol.is_connected());

    let second: smartinspect_transport::Packet =
        ControlCommandPacket { level: Level::Error, control_command_type: 2, data: vec![] }.into();
    let result = protocol.write_packet(second);
    assert!(result.is_ok());

    server.join().unwrap();
}
