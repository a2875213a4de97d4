// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `App` entity (spec §3/§4.4): one registered application, its
//! per-app session index, and the deferred-destruction discipline that
//! runs when the last reader pinning it drops its `Arc`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracectl_core::{AppSession, Bitness, FdBudget, FdClass, RegisterMsg, SessionId};
use tracectl_transport::TracerTransport;
use tracing::{debug, warn};

use crate::socket_id::SocketId;

/// One registered application.
///
/// Both registry indexes (`AppRegistry::by_pid`, `AppRegistry::by_sock`)
/// hold non-owning `Arc<App>` clones. Destruction is realised entirely
/// through ownership: `App` implements [`Drop`], and Rust guarantees that
/// runs only once every clone — including every reader's pinned clone — has
/// gone away. There is no separate "deferred destroy" call to invoke; the
/// registry schedules it simply by letting its own `Arc` clone drop.
pub struct App {
    pub pid: i32,
    pub ppid: i32,
    pub uid: u32,
    pub gid: u32,
    pub name: String,
    pub bitness: Bitness,
    pub protocol_major: u32,
    pub protocol_minor: u32,
    pub sock: SocketId,
    compatible: AtomicBool,
    /// `None` once deferred destruction has run; closes the socket on the
    /// transition since this is normally the app's only strong reference
    /// to its transport.
    conn: RwLock<Option<Arc<dyn TracerTransport>>>,
    sessions: Mutex<HashMap<SessionId, AppSession>>,
    teardown_queue: Mutex<Vec<AppSession>>,
    fd_budget: Arc<FdBudget>,
}

impl App {
    pub fn new(
        msg: &RegisterMsg,
        bitness: Bitness,
        sock: SocketId,
        conn: Arc<dyn TracerTransport>,
        fd_budget: Arc<FdBudget>,
    ) -> Self {
        Self {
            pid: msg.pid,
            ppid: msg.ppid,
            uid: msg.uid,
            gid: msg.gid,
            name: msg.name.clone(),
            bitness,
            protocol_major: msg.protocol_major,
            protocol_minor: msg.protocol_minor,
            sock,
            compatible: AtomicBool::new(false),
            conn: RwLock::new(Some(conn)),
            sessions: Mutex::new(HashMap::new()),
            teardown_queue: Mutex::new(Vec::new()),
            fd_budget,
        }
    }

    pub fn is_compatible(&self) -> bool {
        self.compatible.load(Ordering::SeqCst)
    }

    /// Set once `validate_version` (C7) confirms the tracer's handshake
    /// (spec §7 item 3: until then every fan-out silently skips this app).
    pub fn set_compatible(&self, value: bool) {
        self.compatible.store(value, Ordering::SeqCst);
    }

    /// Clone out the pinned transport handle. Panics if called after
    /// deferred destruction has already run, which cannot happen through
    /// normal use: every caller reaches `App` through a registry lookup
    /// that itself holds a pinning `Arc`, so this object is still alive.
    #[allow(clippy::expect_used)]
    pub fn conn(&self) -> Arc<dyn TracerTransport> {
        self.conn
            .read()
            .clone()
            .expect("app connection used after deferred destroy")
    }

    pub fn sessions(&self) -> &Mutex<HashMap<SessionId, AppSession>> {
        &self.sessions
    }

    /// Move every entry out of the session index and onto the teardown
    /// queue (spec §4.4 `unregister`, step 3). Idempotent: draining an
    /// already-empty index is a no-op.
    pub fn drain_sessions_to_teardown(&self) {
        let mut sessions = self.sessions.lock();
        if sessions.is_empty() {
            return;
        }
        let mut queue = self.teardown_queue.lock();
        queue.extend(sessions.drain().map(|(_, session)| session));
    }
}

impl Drop for App {
    /// Realises `deferred_destroy` (spec §4.4/§5): destroy whatever remains
    /// of the session index, free every queued session using the still-open
    /// socket, close the socket, then release the APPS-class FD reservation
    /// — in that order, because the socket must outlive every use of it.
    fn drop(&mut self) {
        self.drain_sessions_to_teardown();
        let queue = std::mem::take(&mut *self.teardown_queue.lock());
        if !queue.is_empty() {
            let conn = self.conn.read().clone();
            if let Some(conn) = conn {
                for session in queue {
                    if session.handle < 0 {
                        continue;
                    }
                    if let Err(err) = conn.release_session_handle(session.handle) {
                        if err.is_benign_peer_death() {
                            debug!(pid = self.pid, "peer gone during deferred session release");
                        } else {
                            warn!(pid = self.pid, %err, "failed to release session handle during deferred destroy");
                        }
                    }
                }
            }
        }
        // Close the socket: drop the last strong reference to the transport
        // now, ahead of releasing the FD reservation below.
        *self.conn.write() = None;
        self.fd_budget.release(FdClass::Apps, 1);
        debug!(pid = self.pid, sock = self.sock.0, "app deferred-destroyed");
    }
}
