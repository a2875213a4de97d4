// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event rules and their composite identity (spec §3 "Event identity").

use std::hash::{Hash, Hasher};

use crate::filter::Filter;
use crate::loglevel::{LogLevel, LogLevelType};

/// The tracepoint kind an event rule selects on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Tracepoint,
    Syscall,
    Probe,
}

/// Static attributes of an event rule, independent of identity.
#[derive(Debug, Clone)]
pub struct EventAttr {
    pub event_type: EventType,
    pub loglevel: LogLevel,
}

/// Composite identity of an event: two events match iff their names are
/// byte-equal, their filters are both absent or byte-equal, and their
/// loglevels are equal under the `ALL` equivalence rule.
///
/// `Hash` is computed from the name alone (spec §3: "Hash is computed from
/// name only; equality uses the full composite") — callers must not rely on
/// `Hash` to distinguish two events with the same name, only `Eq`.
#[derive(Debug, Clone)]
pub struct EventKey {
    pub name: String,
    pub loglevel: LogLevel,
    pub filter: Option<Filter>,
}

impl EventKey {
    pub fn new(name: impl Into<String>, loglevel: LogLevel, filter: Option<Filter>) -> Self {
        Self {
            name: name.into(),
            loglevel,
            filter,
        }
    }
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.loglevel == other.loglevel && self.filter == other.filter
    }
}

impl Eq for EventKey {}

impl Hash for EventKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// An app-local replica of an event rule.
#[derive(Debug, Clone)]
pub struct AppEvent {
    pub key: EventKey,
    pub attr: EventAttr,
    /// Tracer handle, assigned once `create_event` succeeds.
    pub handle: i64,
    /// Tracer object, assigned alongside `handle`; the target of later
    /// `enable`/`disable` calls.
    pub object: u64,
    pub enabled: bool,
}

impl AppEvent {
    pub fn new(key: EventKey, attr: EventAttr, enabled: bool) -> Self {
        Self {
            key,
            attr,
            handle: -1,
            object: 0,
            enabled,
        }
    }
}

/// A loglevel query with `loglevel_type = All` defaults to the conventional
/// stored value of `-1`, matching a plain query of `0` (spec §3, scenario 3
/// of §8).
pub fn loglevel_all() -> LogLevel {
    LogLevel::new(-1, LogLevelType::All)
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
