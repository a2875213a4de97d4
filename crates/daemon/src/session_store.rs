// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The canonical, mutable logical configuration (spec §4.6/§4.7): every
//! `create_*_global` operation mutates a `LogicalSession` here first, then
//! fans the change out to every compatible app via the reconciler.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracectl_core::{LogicalSession, SessionId};

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, LogicalSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created logical session if absent; idempotent.
    pub fn ensure(&self, id: &SessionId, uid: u32, gid: u32) {
        self.sessions.write().entry(id.clone()).or_insert_with(|| LogicalSession::new(id.clone(), uid, gid));
    }

    pub fn get(&self, id: &SessionId) -> Option<LogicalSession> {
        self.sessions.read().get(id).cloned()
    }

    pub fn with_mut<R>(&self, id: &SessionId, f: impl FnOnce(&mut LogicalSession) -> R) -> Option<R> {
        let mut sessions = self.sessions.write();
        sessions.get_mut(id).map(f)
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }
}

#[cfg(test)]
#[path = "session_store_tests.rs"]
mod tests;
