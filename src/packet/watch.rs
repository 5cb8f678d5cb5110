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

//! Watch, wire kind 5.

use crate::level::Level;

#[derive(Debug, Clone, Default)]
pub struct WatchPacket {
    pub level: Level,
    pub watch_type: u32,
    pub timestamp_sec: u32,
    pub timestamp_usec: u32,
    pub name: Option<String>,
    pub value: Option<String>,
}
