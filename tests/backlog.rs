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

//! Backlog flush ordering and eviction, end to end through a real
//! `Protocol<TcpTransport>` talking to a fake console over loopback TCP.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread;

use smartinspect_transport::level::Level;
use smartinspect_transport::packet::ControlCommandPacket;
use smartinspect_transport::protocol::tcp::{TcpOptions, TcpTransport, TCP_OPTION_KEYS};
use smartinspect_transport::protocol::{Protocol, COMMON_OPTION_KEYS};

fn allowed_keys() -> Vec<&'static str> {
    COMMON_OPTION_KEYS.iter().chain(TCP_OPTION_KEYS.iter()).copied().collect()
}

/// Accepts one connection, performs the tcp handshake, then acks every
/// subsequent packet with `OK` while recording each `controlCommandType`
/// it receives, in arrival order.
fn run_fake_console(listener: TcpListener) -> thread::JoinHandle<Vec<u32>> {
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        writer.write_all(b"Console 1.0\n").unwrap();

        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut client_banner = String::new();
        reader.read_line(&mut client_banner).unwrap();

        const KIND_CONTROL_COMMAND: u16 = 1;

        let mut received = Vec::new();
        loop {
            let mut header = [0u8; 6];
            if reader.read_exact(&mut header).is_err() {
                break;
            }
            let kind = u16::from_be_bytes([header[0], header[1]]);
            let total_len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
            let mut body = vec![0u8; total_len];
            reader.read_exact(&mut body).unwrap();
            // Only ControlCommand frames carry a controlCommandType; the
            // automatic LogHeader sent by open() is acked but not recorded.
            if kind == KIND_CONTROL_COMMAND {
                let control_type = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                received.push(control_type);
            }
            writer.write_all(b"OK").unwrap();
        }
        received
    })
}

fn control(n: u32, level: Level) -> smartinspect_transport::Packet {
    ControlCommandPacket { level, control_command_type: n, data: vec![] }.into()
}

#[test]
#[ntest::timeout(5000)]
fn backlog_flush_preserves_order_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = run_fake_console(listener);

    let transport = TcpTransport::new(TcpOptions { host: addr.ip().to_string(), port: addr.port(), timeout: std::time::Duration::from_secs(2) });
    let mut protocol = Protocol::new("tcp", transport);
    protocol
        .initialize("backlog.enabled=true,backlog.flushon=error,backlog.queue=65536", &allowed_keys())
        .unwrap();
    protocol.connect().unwrap();

    protocol.write_packet(control(1, Level::Debug)).unwrap();
    protocol.write_packet(control(2, Level::Debug)).unwrap();
    protocol.write_packet(control(3, Level::Warning)).unwrap();
    protocol.write_packet(control(4, Level::Error)).unwrap();
    protocol.disconnect().unwrap();

    let received = server.join().unwrap();
    assert_eq!(received, vec![1, 2, 3, 4]);
}

#[test]
#[ntest::timeout(5000)]
fn backlog_eviction_keeps_last_two_plus_trigger() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = run_fake_console(listener);

    // Each Debug control packet with no data serializes to 18 bytes; a
    // 128-byte backlog keeps exactly the last two buffered survivors.
    let transport = TcpTransport::new(TcpOptions { host: addr.ip().to_string(), port: addr.port(), timeout: std::time::Duration::from_secs(2) });
    let mut protocol = Protocol::new("tcp", transport);
    protocol
        .initialize("backlog.enabled=true,backlog.flushon=error,backlog.queue=36", &allowed_keys())
        .unwrap();
    protocol.connect().unwrap();

    for n in 1..=6u32 {
        protocol.write_packet(control(n, Level::Debug)).unwrap();
    }
    protocol.write_packet(control(7, Level::Error)).unwrap();
    protocol.disconnect().unwrap();

    let received = server.join().unwrap();
    assert_eq!(received, vec![5, 6, 7]);
}
