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

//! The transport and delivery subsystem of a structured diagnostic-logging
//! client.
//!
//! Applications build [`packet::Packet`] values (log entries, watches,
//! process-flow markers, control commands) and hand them to a
//! [`protocol::Protocol`], which serializes them with [`wire::Formatter`]
//! and ships them over a [`protocol::transport::Transport`] — currently
//! [`protocol::tcp::TcpTransport`] or [`protocol::cloud::CloudTransport`].
//!
//! Everything above the packet-producing API (session façades, viewer
//! formatters, object-renderer reflection, the connections-string builder)
//! is out of scope here; this crate only has to honor the contract those
//! layers drive it through.

pub mod chunk;
pub mod error;
pub mod level;
pub mod listener;
pub mod options;
pub mod packet;
pub mod protocol;
pub mod queue;
pub mod rotate;
pub mod scheduler;
pub mod variables;
pub mod wire;

pub use error::{ConfigError, TransportError};
pub use level::Level;
pub use listener::{ErrorListener, NoopErrorListener};
pub use packet::Packet;
pub use protocol::Protocol;
