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

//! The file-rotate timer: whether a calendar-based rotation boundary has
//! elapsed between two instants. Shared by the cloud protocol's
//! virtual-file rotation.

use chrono::{DateTime, Datelike, Utc};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum RotateMode {
    #[default]
    None,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl RotateMode {
    pub fn parse(s: &str) -> Option<RotateMode> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Some(RotateMode::None),
            "hourly" => Some(RotateMode::Hourly),
            "daily" => Some(RotateMode::Daily),
            "weekly" => Some(RotateMode::Weekly),
            "monthly" => Some(RotateMode::Monthly),
            _ => None,
        }
    }

    /// True if `now` has crossed a rotation boundary relative to `last`.
    /// `last` is the timestamp the current virtual file/segment was opened.
    pub fn has_elapsed(self, last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if now <= last {
            return false;
        }
        match self {
            RotateMode::None => false,
            RotateMode::Hourly => {
                (last.date_naive(), last.hour()) != (now.date_naive(), now.hour())
            }
            RotateMode::Daily => last.date_naive() != now.date_naive(),
            RotateMode::Weekly => iso_week(last) != iso_week(now),
            RotateMode::Monthly => {
                (last.year(), last.month()) != (now.year(), now.month())
            }
        }
    }
}

fn iso_week(d: DateTime<Utc>) -> (i32, u32) {
    let w = d.iso_week();
    (w.year(), w.week())
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn none_never_elapses() {
        let a = dt(2024, 1, 1, 0, 0);
        let b = dt(2030, 1, 1, 0, 0);
        assert!(!RotateMode::None.has_elapsed(a, b));
    }

    #[test]
    fn hourly_crosses_hour_boundary() {
        let a = dt(2024, 1, 1, 10, 59);
        let b = dt(2024, 1, 1, 11, 0);
        assert!(RotateMode::Hourly.has_elapsed(a, b));
        assert!(!RotateMode::Hourly.has_elapsed(a, dt(2024, 1, 1, 10, 59)));
    }

    #[test]
    fn daily_crosses_midnight() {
        let a = dt(2024, 1, 1, 23, 59);
        let b = dt(2024, 1, 2, 0, 0);
        assert!(RotateMode::Daily.has_elapsed(a, b));
        assert!(!RotateMode::Daily.has_elapsed(a, dt(2024, 1, 1, 0, 0)));
    }

    #[test]
    fn monthly_crosses_month_boundary() {
        let a = dt(2024, 1, 31, 23, 0);
        let b = dt(2024, 2, 1, 1, 0);
        assert!(RotateMode::Monthly.has_elapsed(a, b));
    }

    #[test]
    fn future_only() {
        let a = dt(2024, 6, 1, 0, 0);
        assert!(!RotateMode::Daily.has_elapsed(a, dt(2024, 5, 31, 0, 0)));
    }
}
