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

//! The TCP transport: banner handshake, framed packet write, 2-byte ack.

use std::io::{BufWriter, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::options::OptionTable;
use crate::packet::{LogHeaderBuilder, Packet};
use crate::wire::Formatter;

use super::transport::{appname_guess, hostname_guess, read_line_lf, Transport};

pub const CLIENT_BANNER_VERSION: &str = "3.0";

#[derive(Debug, Clone)]
pub struct TcpOptions {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl TcpOptions {
    pub fn load(table: &OptionTable) -> Self {
        TcpOptions {
            host: table.get_string("host", "127.0.0.1"),
            port: table.get_int("port", 4228).clamp(1, u16::MAX as i64) as u16,
            timeout: Duration::from_millis(table.get_int("timeout", 30_000).max(0) as u64),
        }
    }
}

pub const TCP_OPTION_KEYS: &[&str] = &["host", "port", "timeout"];

/// Socket, banner handshake and the per-packet write/ack cycle.
pub struct TcpTransport {
    options: TcpOptions,
    ack_source: Option<TcpStream>,
    sink: Option<BufWriter<TcpStream>>,
}

impl TcpTransport {
    pub fn new(options: TcpOptions) -> Self {
        TcpTransport { options, ack_source: None, sink: None }
    }

    fn io_error(&self, source: std::io::Error) -> TransportError {
        TransportError::io_error(self.name(), source)
    }

    /// Flattens an `anyhow` context chain from [`Self::dial_and_handshake`]
    /// into a `TransportError::Connect`, keeping the root `io::Error` as
    /// the source when the chain bottoms out in one.
    fn connect_error(&self, e: anyhow::Error) -> TransportError {
        let message = format!("{e:#}");
        let source = e.downcast::<std::io::Error>().ok();
        TransportError::Connect { protocol: self.name().to_string(), message, source }
    }

    /// Dials the server and runs the banner handshake, returning the
    /// ack-read half and the stream to wrap as the packet sink. Internal
    /// plumbing only: `open()` converts any failure to a `TransportError`
    /// at the boundary.
    fn dial_and_handshake(&self) -> anyhow::Result<(TcpStream, TcpStream)> {
        let addr = format!("{}:{}", self.options.host, self.options.port);
        let stream = TcpStream::connect(&addr).with_context(|| format!("connect to {addr} failed"))?;
        stream.set_read_timeout(Some(self.options.timeout)).context("setting read timeout")?;
        stream.set_write_timeout(Some(self.options.timeout)).context("setting write timeout")?;

        let mut handshake_stream = stream.try_clone().context("cloning tcp stream for handshake")?;
        let banner = read_line_lf(&mut handshake_stream).context("no handshake banner from server")?;
        debug!(%banner, "received tcp handshake banner");

        let client_banner = format!("SmartInspect Java Library v{CLIENT_BANNER_VERSION}\n");
        handshake_stream.write_all(client_banner.as_bytes()).context("writing client banner")?;
        handshake_stream.flush().context("flushing client banner")?;

        Ok((handshake_stream, stream))
    }
}

impl Transport for TcpTransport {
    fn name(&self) -> &str {
        "tcp"
    }

    fn open(&mut self) -> Result<(), TransportError> {
        let (handshake_stream, stream) = self.dial_and_handshake().map_err(|e| self.connect_error(e))?;

        self.ack_source = Some(handshake_stream);
        self.sink = Some(BufWriter::with_capacity(8 * 1024, stream));

        let mut builder = LogHeaderBuilder::new();
        builder.push("hostname", hostname_guess());
        builder.push("appname", appname_guess());
        let header: Packet = builder.build().into();
        self.write_packet(&header)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.sink = None;
        self.ack_source = None;
        Ok(())
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<(), TransportError> {
        let sink = self.sink.as_mut().ok_or_else(|| {
            TransportError::Io {
                protocol: self.name().to_string(),
                message: "not connected".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotConnected, "tcp transport not open"),
            }
        })?;

        let mut formatter = Formatter::new();
        formatter.compile(packet);
        formatter.write(sink).map_err(|e| self.io_error(e))?;
        sink.flush().map_err(|e| self.io_error(e))?;

        let ack_source = self.ack_source.as_mut().expect("sink implies ack_source");
        let mut ack = [0u8; 2];
        ack_source.read_exact(&mut ack).map_err(|e| self.io_error(e))?;
        if &ack != b"OK" {
            warn!(?ack, "tcp server rejected packet");
            return Err(TransportError::Rejected {
                protocol: self.name().to_string(),
                message: format!("unexpected ack {ack:?}"),
            });
        }
        Ok(())
    }
}
