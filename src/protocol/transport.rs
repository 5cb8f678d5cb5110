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

//! The capability a `Protocol` drives: open a connection, write one packet,
//! close it. Composition over the original's inheritance chain — `tcp`
//! implements this directly, `cloud` wraps TLS/chunking/rotation around
//! the same shape rather than extending `tcp`.

use crate::error::TransportError;
use crate::packet::Packet;

pub trait Transport: Send {
    fn name(&self) -> &str;

    fn open(&mut self) -> Result<(), TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;

    fn write_packet(&mut self, packet: &Packet) -> Result<(), TransportError>;

    /// Called periodically (currently only by the cloud transport's
    /// age-bounded chunk flush) while the protocol holds a connection open.
    /// Transports with nothing to do on a timer can leave the default.
    fn poll(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Best-effort local hostname for the post-connect LogHeader both
/// transports send. Falls back rather than failing `open()` over it.
pub(crate) fn hostname_guess() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

/// Best-effort process name for the same LogHeader.
pub(crate) fn appname_guess() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Reads a single LF-terminated line one byte at a time. Used for both
/// handshake banners and (for cloud) ack replies, since neither protocol
/// can be safely wrapped in a `BufReader` without risking bytes read past
/// the line being stranded in a buffer that's about to be discarded.
pub(crate) fn read_line_lf<R: std::io::Read>(stream: &mut R) -> std::io::Result<String> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte)?;
        if n == 0 {
            if out.is_empty() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed before line terminator",
                ));
            }
            break;
        }
        if byte[0] == b'\n' {
            break;
        }
        out.push(byte[0]);
    }
    if out.last() == Some(&b'\r') {
        out.pop();
    }
    String::from_utf8(out).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
