// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! App-local session replicas (C5 / spec §3: `AppSession`).

use std::collections::HashMap;

use crate::channel::AppChannel;
use crate::id::SessionId;

/// The app-local replica of one logical tracing session.
///
/// Invariant (spec §3): `started = true` implies `handle >= 0`.
pub struct AppSession {
    pub logical_id: SessionId,
    pub uid: u32,
    pub gid: u32,
    /// Unique identifier minted at shadow-copy time (UUID in production).
    pub unique_id: String,
    /// `"<app-name>-<pid>-<YYYYmmdd-HHMMSS>/"` (spec §6).
    pub output_path: String,
    pub handle: i64,
    pub started: bool,
    /// Owned by the session, not the channel index, to reflect its
    /// singleton role and different attribute defaults (spec §9).
    pub metadata: Option<AppChannel>,
    pub channels: HashMap<String, AppChannel>,
}

impl AppSession {
    pub fn new(logical_id: SessionId, uid: u32, gid: u32, unique_id: String, output_path: String) -> Self {
        Self {
            logical_id,
            uid,
            gid,
            unique_id,
            output_path,
            handle: -1,
            started: false,
            metadata: None,
            channels: HashMap::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.started || self.handle >= 0
    }
}
