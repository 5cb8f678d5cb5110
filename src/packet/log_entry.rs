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

//! LogEntry, wire kind 4. Note the severity `level` field here is
//! in-memory only (used by `Protocol::write_packet` for threshold
//! filtering) and is not itself part of the wire payload — the wire
//! layout for this packet kind has no level field, unlike the others.

use crate::level::Level;

#[derive(Debug, Clone, Default)]
pub struct LogEntryPacket {
    pub level: Level,
    pub log_entry_type: u32,
    pub viewer_id: u32,
    pub thread_id: u32,
    pub process_id: u32,
    pub timestamp_sec: u32,
    pub timestamp_usec: u32,
    pub color: u32,
    pub appname: Option<String>,
    pub sessionname: Option<String>,
    pub title: Option<String>,
    pub hostname: Option<String>,
    pub data: Vec<u8>,
}
