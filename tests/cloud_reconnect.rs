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

//! A `ReconnectForbidden` reply latches the transport shut: the triggering
//! write fails, every write after it is an inert no-op, and a later `open`
//! doesn't even attempt to dial out.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread;

use smartinspect_transport::level::Level;
use smartinspect_transport::options::OptionTable;
use smartinspect_transport::packet::ControlCommandPacket;
use smartinspect_transport::protocol::cloud::{CloudOptions, CloudTransport};
use smartinspect_transport::protocol::Transport;

fn run_fake_cloud_forbidding_reconnect(listener: TcpListener) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut client_banner = String::new();
        reader.read_line(&mut client_banner).unwrap();
        writer.write_all(b"Cloud 1.0\n").unwrap();

        // LogHeader frame sent by open().
        let mut preface = [0u8; 4];
        reader.read_exact(&mut preface).unwrap();
        let mut header = [0u8; 6];
        reader.read_exact(&mut header).unwrap();
        let total_len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
        let mut body = vec![0u8; total_len];
        reader.read_exact(&mut body).unwrap();
        writer.write_all(b"OK\n").unwrap();

        // First control command: forbid any further reconnects.
        reader.read_exact(&mut preface).unwrap();
        reader.read_exact(&mut header).unwrap();
        let total_len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
        let mut body = vec![0u8; total_len];
        reader.read_exact(&mut body).unwrap();
        writer.write_all(b"SmartInspectProtocolExceptionReconnectForbidden - quota exhausted\n").unwrap();
    })
}

#[test]
#[ntest::timeout(5000)]
fn reconnect_forbidden_latches_the_transport_shut() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = run_fake_cloud_forbidding_reconnect(listener);

    let table = OptionTable::parse(&format!(
        "host=\"{}\",port={},tls.enabled=false,chunking.enabled=false",
        addr.ip(),
        addr.port()
    ))
    .unwrap();
    let mut transport = CloudTransport::new(CloudOptions::load(&table));
    transport.open().unwrap();

    let packet: smartinspect_transport::Packet =
        ControlCommandPacket { level: Level::Control, control_command_type: 1, data: vec![] }.into();
    let first = transport.write_packet(&packet);
    assert!(first.is_err());
    server.join().unwrap();

    let packet2: smartinspect_transport::Packet =
        ControlCommandPacket { level: Level::Control, control_command_type: 2, data: vec![] }.into();
    let second = transport.write_packet(&packet2);
    assert!(second.is_ok());

    // The fake server is long gone; open() returning Ok here proves it
    // never tried to dial out, since dialing a dead address would error.
    let reopen = transport.open();
    assert!(reopen.is_ok());
}
