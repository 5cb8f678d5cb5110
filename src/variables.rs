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

//! `$name$` placeholder expansion in connection strings.

use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct ProtocolVariables {
    // Keys are folded to lowercase so lookups are case-insensitive, the
    // same approach `OptionTable` uses.
    vars: HashMap<String, String>,
}

impl ProtocolVariables {
    pub fn new() -> Self {
        ProtocolVariables { vars: HashMap::new() }
    }

    pub fn put(&mut self, key: &str, value: impl Into<String>) {
        self.vars.insert(key.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(&key.to_ascii_lowercase()).map(|s| s.as_str())
    }

    /// Replaces every `$key$` substring with its value. Unknown keys are
    /// left untouched so a stray `$` in user text doesn't vanish.
    ///
    /// Idempotent once all `$*$` substrings are exhausted (invariant 3):
    /// expansion only ever consumes a `$...$` span once, so a value that
    /// itself contains `$foo$` is not expanded recursively.
    pub fn expand(&self, s: &str) -> String {
        let bytes = s.as_bytes();
        let mut out = String::with_capacity(s.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' {
                if let Some(end) = s[i + 1..].find('$') {
                    let name = &s[i + 1..i + 1 + end];
                    if let Some(value) = self.get(name) {
                        out.push_str(value);
                        i = i + 1 + end + 1;
                        continue;
                    }
                }
            }
            // Not the start of a resolvable placeholder; copy one char.
            let ch = s[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
        out
    }
}
