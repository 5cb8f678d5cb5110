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

//! In async mode, producers never see exceptions: transport failures are
//! instead handed to an `ErrorListener`. Mirrors the
//! optional-hooks-with-a-no-op-default shape of `libshpool::hooks::Hooks`.

use crate::error::TransportError;

pub trait ErrorListener: Send + Sync {
    fn on_error(&self, protocol_name: &str, cause: &TransportError);
}

/// The default listener: drops errors on the floor after they've already
/// been logged by the protocol at the point of failure.
#[derive(Default)]
pub struct NoopErrorListener;

impl ErrorListener for NoopErrorListener {
    fn on_error(&self, _protocol_name: &str, _cause: &TransportError) {}
}
