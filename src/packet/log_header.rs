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

//! LogHeader, wire kind 7: a CRLF-separated `key=value` list. Core keys
//! are `hostname`/`appname`; the cloud protocol adds `writekey`,
//! `virtualfileid` and `customlabels`.

use crate::level::Level;

#[derive(Debug, Clone, Default)]
pub struct LogHeaderPacket {
    pub level: Level,
    pub content: Option<String>,
}

/// Builds the CRLF-joined `key=value` block that becomes a `LogHeaderPacket`'s
/// content, preserving insertion order (the order entries were `push`ed).
#[derive(Debug, Default)]
pub struct LogHeaderBuilder {
    entries: Vec<(String, String)>,
}

impl LogHeaderBuilder {
    pub fn new() -> Self {
        LogHeaderBuilder { entries: Vec::new() }
    }

    pub fn push(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.entries.push((key.to_string(), value.into()));
        self
    }

    pub fn build(&self) -> LogHeaderPacket {
        let content = self
            .entries
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\r\n");
        LogHeaderPacket { level: Level::Control, content: Some(content) }
    }
}
