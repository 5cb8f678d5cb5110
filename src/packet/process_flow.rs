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

//! ProcessFlow, wire kind 6.

use crate::level::Level;

#[derive(Debug, Clone, Default)]
pub struct ProcessFlowPacket {
    pub level: Level,
    pub process_flow_type: u32,
    pub thread_id: u32,
    pub process_id: u32,
    pub timestamp_sec: u32,
    pub timestamp_usec: u32,
    pub title: Option<String>,
    pub hostname: Option<String>,
}
