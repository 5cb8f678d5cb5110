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

//! The two error surfaces a protocol can raise: configuration errors
//! (always synchronous) and transport errors (raised in blocking mode,
//! delivered to an [`crate::listener::ErrorListener`] in async mode).

use std::io;

use thiserror::Error;

/// Raised by `Protocol::initialize` when the option string is malformed or
/// references a key the protocol doesn't understand. Never delivered async.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown option '{key}' for protocol '{protocol}'")]
    UnknownOption { protocol: String, key: String },

    #[error("malformed option string at byte {pos}: {reason}")]
    Malformed { pos: usize, reason: String },
}

/// A connect/write/close failure, or (cloud only) a classified server
/// reply. Carries the protocol name, a human message, and an optional
/// source error, whether it surfaces synchronously in blocking mode or
/// gets handed whole to [`crate::listener::ErrorListener::on_error`] in
/// async mode.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("{protocol}: {message}")]
    Connect { protocol: String, message: String, #[source] source: Option<io::Error> },

    #[error("{protocol}: {message}")]
    Io { protocol: String, message: String, #[source] source: io::Error },

    #[error("{protocol}: server rejected packet: {message}")]
    Rejected { protocol: String, message: String },

    #[error("{protocol}: server reported a warning: {message}")]
    ServerWarning { protocol: String, message: String },

    #[error("{protocol}: server requested reconnect (forbidden): {message}")]
    ReconnectForbidden { protocol: String, message: String },
}

impl TransportError {
    pub fn protocol(&self) -> &str {
        match self {
            TransportError::Connect { protocol, .. }
            | TransportError::Io { protocol, .. }
            | TransportError::Rejected { protocol, .. }
            | TransportError::ServerWarning { protocol, .. }
            | TransportError::ReconnectForbidden { protocol, .. } => protocol,
        }
    }

    pub fn io_error(protocol: impl Into<String>, source: io::Error) -> Self {
        let message = source.to_string();
        TransportError::Io { protocol: protocol.into(), message, source }
    }

    pub fn connect(protocol: impl Into<String>, message: impl Into<String>) -> Self {
        TransportError::Connect { protocol: protocol.into(), message: message.into(), source: None }
    }
}
