// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time source abstraction, so the per-app output path's timestamp
//! (spec §6: `"<name>-<pid>-<YYYYmmdd-HHMMSS>/"`) is reproducible in tests.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Render the per-app trace output directory name (spec §6).
pub fn trace_output_path(app_name: &str, pid: i32, now: DateTime<Utc>) -> String {
    format!("{app_name}-{pid}-{}/", now.format("%Y%m%d-%H%M%S"))
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
