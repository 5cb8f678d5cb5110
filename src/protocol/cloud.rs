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

//! The cloud transport: TLS, write-key auth, virtual-file rotation, chunk
//! batching, and server-reply classification layered on top of the same
//! handshake/framing shape `tcp` uses.
//!
//! Unlike `tcp`, handshake order is reversed (client banner first, then
//! the server's) so a TLS alert doesn't race the client's own banner
//! write, and every top-level frame is preceded by a 4-byte magic preface.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunk::Chunk;
use crate::error::TransportError;
use crate::options::OptionTable;
use crate::packet::{LogHeaderBuilder, Packet, PacketBody};
use crate::rotate::RotateMode;
use crate::wire;

use super::transport::{appname_guess, hostname_guess, read_line_lf, Transport};

const PREFACE: [u8; 4] = [0x29, 0x17, 0x73, 0x50];
const MIB: u64 = 1024 * 1024;
const KIB: u64 = 1024;

pub const CLOUD_OPTION_KEYS: &[&str] = &[
    "writekey",
    "customlabels",
    "region",
    "host",
    "port",
    "timeout",
    "chunking.enabled",
    "chunking.maxsize",
    "chunking.maxagems",
    "maxsize",
    "rotate",
    "tls.enabled",
    "tls.certificate.location",
    "tls.certificate.filepath",
    "tls.certificate.password",
];

static DEFAULT_TLS_CONFIG: Lazy<Arc<ClientConfig>> = Lazy::new(|| {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Arc::new(ClientConfig::builder().with_root_certificates(roots).with_no_client_auth())
});

#[derive(Debug, Clone)]
pub struct CloudOptions {
    pub writekey: String,
    pub customlabels: Vec<(String, String)>,
    pub region: String,
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub chunking_enabled: bool,
    pub chunking_maxsize: u64,
    pub chunking_maxagems: u64,
    pub maxsize: u64,
    pub rotate: RotateMode,
    pub tls_enabled: bool,
    pub tls_certificate_location: String,
    pub tls_certificate_filepath: Option<String>,
}

impl CloudOptions {
    pub fn load(table: &OptionTable) -> Self {
        let customlabels = parse_custom_labels(&table.get_string("customlabels", ""));
        CloudOptions {
            writekey: table.get_string("writekey", ""),
            customlabels,
            region: table.get_string("region", "eu-central-1"),
            host: table.get_string("host", ""),
            port: table.get_int("port", 4228).clamp(1, u16::MAX as i64) as u16,
            timeout: Duration::from_millis(table.get_int("timeout", 30_000).max(0) as u64),
            chunking_enabled: table.get_bool("chunking.enabled", true),
            chunking_maxsize: table
                .get_size("chunking.maxsize", 395 * KIB)
                .clamp(10 * KIB, 395 * KIB),
            chunking_maxagems: table.get_timespan_ms("chunking.maxagems", 1000).max(500),
            maxsize: table.get_size("maxsize", MIB).clamp(MIB, 50 * MIB),
            rotate: table.get_rotate("rotate", RotateMode::None),
            tls_enabled: table.get_bool("tls.enabled", true),
            tls_certificate_location: table.get_string("tls.certificate.location", "resource"),
            tls_certificate_filepath: {
                let v = table.get_string("tls.certificate.filepath", "");
                if v.is_empty() { None } else { Some(v) }
            },
        }
    }

    fn resolved_host(&self) -> String {
        if self.host.is_empty() {
            format!("packet-receiver.{}.cloud.smartinspect.com", self.region)
        } else {
            self.host.clone()
        }
    }
}

/// `"k1=v1;k2=v2;..."`, rejecting components outside `[1,100]` chars and
/// capping at 5 entries. Malformed input degrades to an empty label set
/// rather than failing the whole option parse — customlabels is metadata,
/// not a connection prerequisite.
fn parse_custom_labels(raw: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    if raw.is_empty() {
        return out;
    }
    for component in raw.split(';') {
        if out.len() >= 5 {
            break;
        }
        if component.is_empty() || component.len() > 100 {
            continue;
        }
        if let Some((k, v)) = component.split_once('=') {
            if !k.is_empty() {
                out.push((k.to_string(), v.to_string()));
            }
        }
    }
    out
}

trait CloudStream: Read + Write + Send {}
impl<T: Read + Write + Send> CloudStream for T {}

pub struct CloudTransport {
    options: CloudOptions,
    stream: Option<Box<dyn CloudStream>>,
    chunk: Chunk,
    virtual_file_id: Uuid,
    virtual_file_size: u64,
    virtual_file_opened_at: DateTime<Utc>,
    reconnect_allowed: bool,
}

impl CloudTransport {
    pub fn new(options: CloudOptions) -> Self {
        let chunk_cap = options.chunking_maxsize as usize;
        CloudTransport {
            options,
            stream: None,
            chunk: Chunk::new(chunk_cap),
            virtual_file_id: Uuid::nil(),
            virtual_file_size: 0,
            virtual_file_opened_at: Utc::now(),
            reconnect_allowed: true,
        }
    }

    fn connect_error(&self, message: impl Into<String>, source: std::io::Error) -> TransportError {
        TransportError::Connect { protocol: self.name().to_string(), message: message.into(), source: Some(source) }
    }

    fn io_error(&self, source: std::io::Error) -> TransportError {
        TransportError::io_error(self.name(), source)
    }

    /// Flattens an `anyhow` context chain from [`Self::dial_and_handshake`]
    /// into a `TransportError::Connect`, keeping the root `io::Error` as
    /// the source when the chain bottoms out in one.
    fn anyhow_connect_error(&self, e: anyhow::Error) -> TransportError {
        let message = format!("{e:#}");
        let source = e.downcast::<std::io::Error>().ok();
        TransportError::Connect { protocol: self.name().to_string(), message, source }
    }

    /// Dials the server, layers TLS on if enabled, and runs the banner
    /// handshake, returning the stream to wrap as the packet sink.
    /// Internal plumbing only: `open()` converts any failure to a
    /// `TransportError` at the boundary.
    fn dial_and_handshake(&mut self) -> anyhow::Result<Box<dyn CloudStream>> {
        let host = self.options.resolved_host();
        let addr = format!("{host}:{}", self.options.port);
        let tcp = TcpStream::connect(&addr).with_context(|| format!("connect to {addr} failed"))?;
        tcp.set_nodelay(true).context("setting tcp nodelay")?;
        tcp.set_read_timeout(Some(self.options.timeout)).context("setting read timeout")?;

        let mut stream: Box<dyn CloudStream> = if self.options.tls_enabled {
            self.establish_tls(tcp).context("establishing tls")?
        } else {
            Box::new(tcp)
        };

        let client_banner = format!("SmartInspect Java Library v{}\n", super::tcp::CLIENT_BANNER_VERSION);
        stream.write_all(client_banner.as_bytes()).context("writing client banner")?;
        stream.flush().context("flushing client banner")?;
        let banner = read_line_lf(&mut stream).context("no handshake banner from server")?;
        debug!(%banner, "received cloud handshake banner");

        Ok(stream)
    }

    fn establish_tls(&self, tcp: TcpStream) -> Result<Box<dyn CloudStream>, TransportError> {
        let config = if let Some(path) = &self.options.tls_certificate_filepath {
            let pem = std::fs::read(path).map_err(|e| self.connect_error("reading tls certificate file", e))?;
            let mut roots = RootCertStore::empty();
            for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
                let cert = cert.map_err(|e| self.connect_error("parsing tls certificate", e))?;
                roots.add(cert).map_err(|e| {
                    self.connect_error("invalid tls certificate", std::io::Error::other(e.to_string()))
                })?;
            }
            Arc::new(ClientConfig::builder().with_root_certificates(roots).with_no_client_auth())
        } else {
            DEFAULT_TLS_CONFIG.clone()
        };

        let host = self.options.resolved_host();
        let server_name = ServerName::try_from(host.clone())
            .map_err(|e| self.connect_error("invalid tls server name", std::io::Error::other(e.to_string())))?;
        let conn = ClientConnection::new(config, server_name)
            .map_err(|e| self.connect_error("tls handshake setup failed", std::io::Error::other(e.to_string())))?;
        Ok(Box::new(StreamOwned::new(conn, tcp)))
    }

    /// Writes the 4-byte preface then the packet's wire bytes, flushes,
    /// reads an LF-terminated reply, and classifies it.
    fn write_frame(&mut self, packet: &Packet) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or_else(|| TransportError::Io {
            protocol: self.name().to_string(),
            message: "not connected".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotConnected, "cloud transport not open"),
        })?;

        let encoded = wire::encode_packet(packet);
        stream.write_all(&PREFACE).map_err(|e| self.io_error(e))?;
        stream.write_all(&encoded).map_err(|e| self.io_error(e))?;
        stream.flush().map_err(|e| self.io_error(e))?;

        let reply = read_line_lf(stream).map_err(|e| self.io_error(e))?;
        self.classify_reply(&reply)
    }

    fn classify_reply(&mut self, reply: &str) -> Result<(), TransportError> {
        let trimmed = reply.trim();
        if trimmed == "OK" {
            return Ok(());
        }
        if let Some(rest) = trimmed.strip_prefix("SmartInspectProtocolException") {
            let (kind, message) = match rest.split_once(" - ") {
                Some((kind, message)) => (kind.trim(), message.trim()),
                None => (rest.trim(), ""),
            };
            return match kind {
                "Warning" => {
                    warn!(%message, "cloud server reported a warning");
                    Ok(())
                }
                "ReconnectAllowed" => {
                    info!(%message, "cloud server requested reconnect");
                    self.stream = None;
                    Err(TransportError::ServerWarning { protocol: self.name().to_string(), message: message.to_string() })
                }
                "ReconnectForbidden" => {
                    warn!(%message, "cloud server forbade further reconnects");
                    self.reconnect_allowed = false;
                    self.stream = None;
                    Err(TransportError::ReconnectForbidden { protocol: self.name().to_string(), message: message.to_string() })
                }
                other => Err(TransportError::Rejected {
                    protocol: self.name().to_string(),
                    message: format!("unknown exception kind '{other}': {message}"),
                }),
            };
        }
        Err(TransportError::Rejected { protocol: self.name().to_string(), message: format!("unexpected reply: {trimmed}") })
    }

    fn send_log_header(&mut self) -> Result<(), TransportError> {
        let mut builder = LogHeaderBuilder::new();
        builder.push("hostname", hostname_guess());
        builder.push("appname", appname_guess());
        builder.push("writekey", self.options.writekey.clone());
        builder.push("virtualfileid", self.virtual_file_id.to_string());
        if !self.options.customlabels.is_empty() {
            let joined = self
                .options
                .customlabels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(";");
            builder.push("customlabels", joined);
        }
        let packet: Packet = builder.build().into();
        self.write_frame(&packet)
    }

    fn rotate(&mut self) -> Result<(), TransportError> {
        self.flush_chunk()?;
        self.virtual_file_id = Uuid::new_v4();
        self.virtual_file_size = 0;
        self.virtual_file_opened_at = Utc::now();
        self.send_log_header()
    }

    fn maybe_rotate(&mut self, pending_len: u64) -> Result<(), TransportError> {
        let over_size = self.virtual_file_size + pending_len > self.options.maxsize;
        let calendar_elapsed = self.options.rotate.has_elapsed(self.virtual_file_opened_at, Utc::now());
        if over_size || calendar_elapsed {
            self.rotate()?;
        }
        Ok(())
    }

    fn flush_chunk(&mut self) -> Result<(), TransportError> {
        if self.chunk.is_empty() {
            return Ok(());
        }
        let chunk_packet: Packet = self.chunk.reset().into();
        self.write_frame(&chunk_packet)
    }

    fn chunk_or_send(&mut self, packet: &Packet) -> Result<(), TransportError> {
        self.chunk.compile_packet(packet);
        if self.chunk.can_fit_formatted_packet() {
            self.chunk.chunk_formatted_packet();
            return Ok(());
        }
        if !self.chunk.is_empty() {
            self.flush_chunk()?;
            self.chunk.compile_packet(packet);
            if self.chunk.can_fit_formatted_packet() {
                self.chunk.chunk_formatted_packet();
                return Ok(());
            }
        }
        self.write_frame(packet)
    }
}

impl Transport for CloudTransport {
    fn name(&self) -> &str {
        "cloud"
    }

    fn open(&mut self) -> Result<(), TransportError> {
        if !self.reconnect_allowed {
            return Ok(());
        }
        let stream = self.dial_and_handshake().map_err(|e| self.anyhow_connect_error(e))?;

        self.stream = Some(stream);
        self.virtual_file_id = Uuid::new_v4();
        self.virtual_file_size = 0;
        self.virtual_file_opened_at = Utc::now();
        self.send_log_header()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let flush_result = self.flush_chunk();
        self.stream = None;
        flush_result
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<(), TransportError> {
        if !self.reconnect_allowed {
            return Ok(());
        }
        if matches!(packet.body, PacketBody::LogHeader(_)) {
            return self.write_frame(packet);
        }

        let packet_len = packet.size() as u64;
        self.maybe_rotate(packet_len)?;
        self.virtual_file_size += packet_len;

        if self.options.chunking_enabled {
            self.chunk_or_send(packet)
        } else {
            self.write_frame(packet)
        }
    }

    fn poll(&mut self) -> Result<(), TransportError> {
        if !self.reconnect_allowed || self.chunk.is_empty() {
            return Ok(());
        }
        if self.chunk.max_age_elapsed(Duration::from_millis(self.options.chunking_maxagems)) {
            self.flush_chunk()?;
        }
        Ok(())
    }
}
