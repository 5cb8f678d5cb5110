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

//! ControlCommand, wire kind 1. Control commands bypass backlog buffering
//! regardless of their level.

use crate::level::Level;

#[derive(Debug, Clone, Default)]
pub struct ControlCommandPacket {
    pub level: Level,
    pub control_command_type: u32,
    pub data: Vec<u8>,
}
