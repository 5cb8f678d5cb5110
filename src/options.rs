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

//! The option table: a case-insensitive `string -> string` map parsed out
//! of a protocol's connection-option body, plus the typed accessors each
//! transport's options struct relies on. The grammar is a comma-separated
//! `key=value` list where values are either a bare word or a
//! double-quoted string with `\"`/`\\` escapes.

use std::collections::HashMap;

use crate::{level::Level, rotate::RotateMode};
use crate::error::ConfigError;

#[derive(Debug, Default, Clone)]
pub struct OptionTable {
    values: HashMap<String, String>,
}

impl OptionTable {
    pub fn parse(input: &str) -> Result<OptionTable, ConfigError> {
        let mut values = HashMap::new();
        let bytes: Vec<char> = input.chars().collect();
        let mut i = 0;
        let len = bytes.len();

        while i < len {
            // Skip leading whitespace before a key.
            while i < len && bytes[i].is_whitespace() {
                i += 1;
            }
            if i >= len {
                break;
            }

            let key_start = i;
            while i < len && bytes[i] != '=' {
                i += 1;
            }
            if i >= len {
                return Err(ConfigError::Malformed { pos: key_start, reason: "missing '=' after key".into() });
            }
            let key: String = bytes[key_start..i].iter().collect::<String>().trim().to_ascii_lowercase();
            if key.is_empty() {
                return Err(ConfigError::Malformed { pos: key_start, reason: "empty option key".into() });
            }
            i += 1; // consume '='

            let (value, next) = parse_value(&bytes, i)?;
            values.insert(key, value);
            i = next;

            while i < len && bytes[i].is_whitespace() {
                i += 1;
            }
            if i < len {
                if bytes[i] != ',' {
                    return Err(ConfigError::Malformed { pos: i, reason: "expected ',' between options".into() });
                }
                i += 1;
            }
        }

        Ok(OptionTable { values })
    }

    /// Fails if `values` contains any key not present in `allowed`
    /// (case-insensitive), surfacing it as an unknown-option-key
    /// configuration error.
    pub fn validate_keys(&self, protocol: &str, allowed: &[&str]) -> Result<(), ConfigError> {
        for key in self.values.keys() {
            if !allowed.iter().any(|a| a.eq_ignore_ascii_case(key)) {
                return Err(ConfigError::UnknownOption { protocol: protocol.to_string(), key: key.clone() });
            }
        }
        Ok(())
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.values.get(&key.to_ascii_lowercase()).cloned().unwrap_or_else(|| default.to_string())
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.values.get(&key.to_ascii_lowercase()) {
            Some(v) => v.trim().parse::<i64>().ok().filter(|n| *n >= 0).unwrap_or(default),
            None => default,
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(&key.to_ascii_lowercase()) {
            Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
            None => default,
        }
    }

    /// Integer with an optional `KB`/`MB`/`GB` suffix (factor 1024, default
    /// unit `KB`), returned in bytes.
    pub fn get_size(&self, key: &str, default_bytes: u64) -> u64 {
        match self.values.get(&key.to_ascii_lowercase()) {
            Some(v) => parse_unit(v, 1024, &[("gb", 1024 * 1024), ("mb", 1024), ("kb", 1)])
                .map(|(n, factor)| n.saturating_mul(factor))
                .unwrap_or(default_bytes),
            None => default_bytes,
        }
    }

    /// Integer with an optional `s`/`m`/`h`/`d` suffix (default unit `s`),
    /// returned in milliseconds.
    pub fn get_timespan_ms(&self, key: &str, default_ms: u64) -> u64 {
        match self.values.get(&key.to_ascii_lowercase()) {
            Some(v) => parse_unit(v, 1, &[("d", 86_400_000), ("h", 3_600_000), ("m", 60_000), ("s", 1000)])
                .map(|(n, factor)| n.saturating_mul(factor))
                .unwrap_or(default_ms),
            None => default_ms,
        }
    }

    pub fn get_level(&self, key: &str, default: Level) -> Level {
        match self.values.get(&key.to_ascii_lowercase()) {
            Some(v) => Level::parse(v).unwrap_or(default),
            None => default,
        }
    }

    pub fn get_rotate(&self, key: &str, default: RotateMode) -> RotateMode {
        match self.values.get(&key.to_ascii_lowercase()) {
            Some(v) => RotateMode::parse(v).unwrap_or(default),
            None => default,
        }
    }

    /// Hex string padded with zero bytes or truncated to `len` bytes.
    pub fn get_bytes(&self, key: &str, len: usize, default: &[u8]) -> Vec<u8> {
        let parsed = self.values.get(&key.to_ascii_lowercase()).and_then(|v| decode_hex(v));
        let mut out = parsed.unwrap_or_else(|| default.to_vec());
        out.resize(len, 0);
        out
    }
}

/// Parses a decimal integer followed by an optional case-insensitive unit
/// suffix drawn from `units` (checked longest-first so e.g. "gb" isn't
/// mistaken for a malformed "g" unit). `base_factor` is used when there is
/// no suffix at all.
fn parse_unit(s: &str, base_factor: u64, units: &[(&str, u64)]) -> Option<(u64, u64)> {
    let s = s.trim();
    for (suffix, factor) in units {
        if s.len() > suffix.len() && s[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix) {
            let digits = &s[..s.len() - suffix.len()];
            return digits.trim().parse::<u64>().ok().map(|n| (n, *factor));
        }
    }
    s.parse::<u64>().ok().map(|n| (n, base_factor))
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

fn parse_value(bytes: &[char], mut i: usize) -> Result<(String, usize), ConfigError> {
    let len = bytes.len();
    while i < len && bytes[i].is_whitespace() {
        i += 1;
    }

    if i < len && bytes[i] == '"' {
        i += 1;
        let mut out = String::new();
        loop {
            if i >= len {
                return Err(ConfigError::Malformed { pos: i, reason: "unterminated quoted value".into() });
            }
            match bytes[i] {
                '\\' if i + 1 < len && (bytes[i + 1] == '"' || bytes[i + 1] == '\\') => {
                    out.push(bytes[i + 1]);
                    i += 2;
                }
                '"' => {
                    i += 1;
                    break;
                }
                c => {
                    out.push(c);
                    i += 1;
                }
            }
        }
        Ok((out, i))
    } else {
        let start = i;
        while i < len && bytes[i] != ',' {
            i += 1;
        }
        let value: String = bytes[start..i].iter().collect::<String>().trim().to_string();
        Ok((value, i))
    }
}
