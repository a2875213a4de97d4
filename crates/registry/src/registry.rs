// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `RegistryIndex` / `AppRegistry` (spec §3/§4.4): the two concurrent maps
//! plus `register`/`unregister`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracectl_core::{Bitness, FdBudget, FdClass, RegisterMsg, RegistryError};
use tracectl_transport::{ConsumerEndpoints, TracerTransport};
use tracing::{debug, warn};

use crate::app::App;
use crate::socket_id::SocketId;

/// Two concurrent indexes over the same set of `App`s (spec §3).
///
/// `by_pid` is **replace-on-insert**: the OS may recycle pids, so a new
/// registration with a pid already present evicts the old mapping without
/// touching the old `App` itself (it stays reachable via `by_sock` until
/// its own `unregister`). `by_sock` is **insert-unique**: socket identity
/// is stable until the daemon closes it, so a collision there is a
/// registry-invariant violation rather than an expected race.
pub struct AppRegistry {
    by_pid: RwLock<HashMap<i32, Arc<App>>>,
    by_sock: RwLock<HashMap<SocketId, Arc<App>>>,
    consumers: Arc<ConsumerEndpoints>,
    fd_budget: Arc<FdBudget>,
    supported_protocol_major: u32,
}

impl AppRegistry {
    pub fn new(consumers: Arc<ConsumerEndpoints>, fd_budget: Arc<FdBudget>, supported_protocol_major: u32) -> Self {
        Self {
            by_pid: RwLock::new(HashMap::new()),
            by_sock: RwLock::new(HashMap::new()),
            consumers,
            fd_budget,
            supported_protocol_major,
        }
    }

    /// Validate, allocate, and install a newly-registered app (spec §4.4).
    ///
    /// On any validation failure the caller's `conn` is simply dropped at
    /// the end of this function (it was never stored anywhere else),
    /// which is this realisation's way of "closing the socket" on the
    /// rejection path; the one FD reserved up front is released first.
    pub fn register(
        &self,
        msg: &RegisterMsg,
        sock: SocketId,
        conn: Arc<dyn TracerTransport>,
    ) -> Result<Arc<App>, RegistryError> {
        if !self.fd_budget.reserve(FdClass::Apps, 1) {
            return Err(RegistryError::FdBudgetExhausted);
        }

        let bitness = match Bitness::from_bits(msg.bitness) {
            Some(b) if self.consumers.get(b).is_some() => b,
            _ => {
                self.fd_budget.release(FdClass::Apps, 1);
                return Err(RegistryError::UnsupportedBitness);
            }
        };

        if msg.protocol_major != self.supported_protocol_major {
            self.fd_budget.release(FdClass::Apps, 1);
            return Err(RegistryError::ProtocolMismatch);
        }

        let app = Arc::new(App::new(msg, bitness, sock, conn, self.fd_budget.clone()));

        self.by_pid.write().insert(app.pid, app.clone());
        if self.by_sock.write().insert(sock, app.clone()).is_some() {
            warn!(sock = sock.0, "socket already present in registry; invariant violated");
        }

        debug!(pid = app.pid, ?bitness, "app registered");
        Ok(app)
    }

    /// Remove `sock` from both indexes and drain its sessions onto the
    /// teardown queue (spec §4.4/§5 steps 1-4). The caller is responsible
    /// for dropping the returned `Arc` (or simply letting it go out of
    /// scope) once it no longer needs the app, which is what schedules
    /// deferred destruction. Returns `None` if `sock` was never registered
    /// or has already been unregistered.
    pub fn unregister(&self, sock: SocketId) -> Option<Arc<App>> {
        let app = self.by_sock.write().remove(&sock)?;

        {
            let mut by_pid = self.by_pid.write();
            if let Some(current) = by_pid.get(&app.pid) {
                if Arc::ptr_eq(current, &app) {
                    by_pid.remove(&app.pid);
                }
            }
        }

        app.drain_sessions_to_teardown();
        debug!(pid = app.pid, "app unregistered; deferred destroy on last reference");
        Some(app)
    }

    pub fn find_by_pid(&self, pid: i32) -> Option<Arc<App>> {
        self.by_pid.read().get(&pid).cloned()
    }

    pub fn find_by_sock(&self, sock: SocketId) -> Option<Arc<App>> {
        self.by_sock.read().get(&sock).cloned()
    }

    /// Every live app, in iteration order (unspecified, not observable,
    /// spec §4.6 "Ordering and tie-breaks"). Fan-out operations iterate
    /// this list.
    pub fn apps(&self) -> Vec<Arc<App>> {
        self.by_sock.read().values().cloned().collect()
    }

    pub fn app_count(&self) -> usize {
        self.by_sock.read().len()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
