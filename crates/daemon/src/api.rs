// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Public API (C7): the operations the command layer invokes (spec §4.7).
//!
//! Every `*_global` operation iterates every registered app and fans out
//! through the reconciler (C6); per-app failures never abort the fan-out
//! (spec §7) except an out-of-memory condition, which is propagated. The
//! caller of a global operation gets back only the last per-app status,
//! for diagnostics — see DESIGN.md for why a per-app result map was not
//! built instead.

use std::sync::Arc;

use thiserror::Error;
use tracectl_core::{
    ContextKind, EventKey, LogicalChannel, LogicalEvent, LogicalSession, ReconcileError, RegisterMsg, RegistryError,
    SessionId,
};
use tracectl_reconcile::Reconciler;
use tracectl_registry::{App, AppRegistry, SocketId};
use tracectl_transport::{tracer_transport_for, CalibrateParams, FieldDesc, TracepointDesc};
use tracing::{debug, warn};

use crate::session_store::SessionStore;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown session id")]
    UnknownSession,
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Caps the number of doubling rounds `list_tracepoints`/`list_tracepoint_fields`
/// will run per app before giving up, so a misbehaving tracer can't spin the
/// daemon forever (a bound the distilled spec leaves implicit).
const MAX_LIST_PAGES: u32 = 1 << 20;

/// Wires the registry (C4), reconciler (C6), and canonical logical
/// configuration together behind the operation set C7 names.
pub struct Controller {
    registry: AppRegistry,
    reconciler: Reconciler,
    sessions: SessionStore,
}

impl Controller {
    pub fn new(registry: AppRegistry, reconciler: Reconciler, sessions: SessionStore) -> Self {
        Self { registry, reconciler, sessions }
    }

    pub fn registry(&self) -> &AppRegistry {
        &self.registry
    }

    /// Register a newly connected app, wrapping its accepted socket as a
    /// tracer transport (spec §4.4/§6).
    pub fn register(&self, msg: &RegisterMsg, sock: SocketId, conn: Arc<dyn tracectl_transport::TracerTransport>) -> Result<Arc<App>, RegistryError> {
        self.registry.register(msg, sock, conn)
    }

    pub fn unregister(&self, sock: SocketId) -> Option<Arc<App>> {
        self.registry.unregister(sock)
    }

    /// Query the app's tracer for its protocol version and mark the app
    /// compatible iff the major version it reports matches the one given
    /// at registration (spec §4.1 `tracer_version`, §7 item 3). A
    /// transport failure here leaves the app incompatible, which is the
    /// same "silently skip every fan-out" outcome as a genuine mismatch.
    pub fn validate_version(&self, sock: SocketId) -> Result<(u32, u32), ApiError> {
        let app = self.registry.find_by_sock(sock).ok_or(ApiError::UnknownSession)?;
        let version = app.conn().tracer_version().map_err(|err| ApiError::Reconcile(ReconcileError::Transport(err)))?;
        app.set_compatible(version.0 == app.protocol_major);
        Ok(version)
    }

    /// Ensure a logical session exists in the canonical configuration,
    /// creating it if this is the first operation to reference `id`.
    pub fn ensure_session(&self, id: &SessionId, uid: u32, gid: u32) {
        self.sessions.ensure(id, uid, gid);
    }

    fn session(&self, id: &SessionId) -> Result<LogicalSession, ApiError> {
        self.sessions.get(id).ok_or(ApiError::UnknownSession)
    }

    /// Run `op` over every compatible app, collapsing per-app outcomes to
    /// the last non-benign error seen (spec §7/§9). An out-of-memory
    /// result aborts the fan-out immediately.
    fn fan_out(&self, op: impl Fn(&App) -> Result<(), ReconcileError>) -> Result<(), ApiError> {
        let mut last_err = None;
        for app in self.registry.apps() {
            match op(&app) {
                Ok(()) => {}
                Err(ReconcileError::Oom) => return Err(ApiError::Reconcile(ReconcileError::Oom)),
                Err(err) => {
                    if !err.is_benign_peer_death() {
                        warn!(pid = app.pid, %err, "per-app reconcile error");
                    } else {
                        debug!(pid = app.pid, "peer disconnected mid fan-out");
                    }
                    last_err = Some(err);
                }
            }
        }
        match last_err {
            Some(err) => Err(ApiError::Reconcile(err)),
            None => Ok(()),
        }
    }

    pub fn create_channel_global(&self, session_id: &SessionId, channel: LogicalChannel) -> Result<(), ApiError> {
        self.sessions
            .with_mut(session_id, |session| {
                session.channels.entry(channel.name.clone()).or_insert(channel.clone());
            })
            .ok_or(ApiError::UnknownSession)?;
        // An app sees its first channel for this session here, so this is
        // also where its AppSession comes into existence (a no-op on an
        // app that already has one, see Reconciler::create_app_session).
        let logical = self.session(session_id)?;
        self.fan_out(|app| {
            self.reconciler.create_app_session(&logical, app)?;
            self.reconciler.create_channel(session_id, &channel, tracectl_core::ChannelType::PerCpu, app)
        })
    }

    pub fn enable_channel_global(&self, session_id: &SessionId, channel_name: &str) -> Result<(), ApiError> {
        self.sessions
            .with_mut(session_id, |session| {
                if let Some(c) = session.channels.get_mut(channel_name) {
                    c.enabled = true;
                }
            })
            .ok_or(ApiError::UnknownSession)?;
        self.fan_out(|app| self.reconciler.set_channel_enabled(session_id, channel_name, true, app))
    }

    pub fn disable_channel_global(&self, session_id: &SessionId, channel_name: &str) -> Result<(), ApiError> {
        self.sessions
            .with_mut(session_id, |session| {
                if let Some(c) = session.channels.get_mut(channel_name) {
                    c.enabled = false;
                }
            })
            .ok_or(ApiError::UnknownSession)?;
        self.fan_out(|app| self.reconciler.set_channel_enabled(session_id, channel_name, false, app))
    }

    pub fn create_event_global(
        &self,
        session_id: &SessionId,
        channel_name: &str,
        event: LogicalEvent,
    ) -> Result<(), ApiError> {
        self.sessions
            .with_mut(session_id, |session| {
                if let Some(c) = session.channels.get_mut(channel_name) {
                    c.events.entry(event.key.clone()).or_insert(event.clone());
                }
            })
            .ok_or(ApiError::UnknownSession)?;
        self.fan_out(|app| self.reconciler.create_event(session_id, channel_name, &event, app))
    }

    pub fn enable_event_global(&self, session_id: &SessionId, channel_name: &str, event: &EventKey) -> Result<(), ApiError> {
        self.set_event_state(session_id, channel_name, event, true)
    }

    pub fn disable_event_global(&self, session_id: &SessionId, channel_name: &str, event: &EventKey) -> Result<(), ApiError> {
        self.set_event_state(session_id, channel_name, event, false)
    }

    fn set_event_state(
        &self,
        session_id: &SessionId,
        channel_name: &str,
        event: &EventKey,
        enabled: bool,
    ) -> Result<(), ApiError> {
        self.sessions
            .with_mut(session_id, |session| {
                if let Some(c) = session.channels.get_mut(channel_name) {
                    if let Some(e) = c.events.get_mut(event) {
                        e.enabled = enabled;
                    }
                }
            })
            .ok_or(ApiError::UnknownSession)?;
        self.fan_out(|app| self.reconciler.set_event_enabled(session_id, channel_name, event, enabled, app))
    }

    /// Disable every event on every channel of `session_id` (spec §4.7
    /// `disable_all_events_global`).
    pub fn disable_all_events_global(&self, session_id: &SessionId) -> Result<(), ApiError> {
        let session = self.session(session_id)?;
        for (channel_name, channel) in &session.channels {
            for key in channel.events.keys() {
                self.set_event_state(session_id, channel_name, key, false)?;
            }
        }
        Ok(())
    }

    pub fn add_ctx_channel_global(&self, session_id: &SessionId, channel_name: &str, ctx: ContextKind) -> Result<(), ApiError> {
        self.sessions
            .with_mut(session_id, |session| {
                if let Some(c) = session.channels.get_mut(channel_name) {
                    if !c.contexts.contains(&ctx) {
                        c.contexts.push(ctx);
                    }
                }
            })
            .ok_or(ApiError::UnknownSession)?;
        self.fan_out(|app| self.reconciler.add_context(session_id, channel_name, ctx, app))
    }

    /// Single-app variant of `enable_event_global` (spec §4.7 `enable_event_pid`).
    pub fn enable_event_pid(&self, session_id: &SessionId, channel_name: &str, event: &EventKey, pid: i32) -> Result<(), ApiError> {
        let app = self.registry.find_by_pid(pid).ok_or(ApiError::UnknownSession)?;
        self.reconciler.set_event_enabled(session_id, channel_name, event, true, &app)?;
        Ok(())
    }

    pub fn disable_event_pid(&self, session_id: &SessionId, channel_name: &str, event: &EventKey, pid: i32) -> Result<(), ApiError> {
        let app = self.registry.find_by_pid(pid).ok_or(ApiError::UnknownSession)?;
        self.reconciler.set_event_enabled(session_id, channel_name, event, false, &app)?;
        Ok(())
    }

    pub fn start_trace_all(&self, session_id: &SessionId) -> Result<(), ApiError> {
        self.sessions.with_mut(session_id, |session| session.started = true).ok_or(ApiError::UnknownSession)?;
        let session = self.session(session_id)?;
        self.fan_out(|app| self.reconciler.start_trace(&session, app))
    }

    pub fn stop_trace_all(&self, session_id: &SessionId) -> Result<(), ApiError> {
        self.fan_out(|app| self.reconciler.stop_trace(session_id, app))
    }

    pub fn destroy_trace_all(&self, session_id: &SessionId) -> Result<(), ApiError> {
        self.fan_out(|app| self.reconciler.destroy_trace(session_id, app))
    }

    /// Project every existing session onto a freshly (re-)registered app
    /// (spec §4.6/§4.7 `global_update`).
    pub fn global_update(&self, sock: SocketId) -> Result<(), ApiError> {
        let app = self.registry.find_by_sock(sock).ok_or(ApiError::UnknownSession)?;
        for id in self.sessions.ids() {
            if let Some(session) = self.sessions.get(&id) {
                self.reconciler.global_update(&session, &app)?;
            }
        }
        Ok(())
    }

    pub fn calibrate(&self, params: &CalibrateParams) -> Result<(), ApiError> {
        self.fan_out(|app| {
            if !app.is_compatible() {
                return Ok(());
            }
            app.conn().calibrate(params).map_err(ReconcileError::Transport)
        })
    }

    /// Enumerate every tracepoint across every compatible app, doubling the
    /// per-app page size is unnecessary here since the transport already
    /// iterates by index to a sentinel "no entry" (spec §4.7
    /// `list_tracepoints`); this just drives that iteration per app and
    /// concatenates the results, abandoning an app on transport failure.
    pub fn list_tracepoints(&self) -> Vec<TracepointDesc> {
        let mut out = Vec::new();
        for app in self.registry.apps() {
            if !app.is_compatible() {
                continue;
            }
            let conn = app.conn();
            for index in 0..MAX_LIST_PAGES {
                match conn.tracepoint_list_get(index) {
                    Ok(Some(desc)) => out.push(desc),
                    Ok(None) => break,
                    Err(err) => {
                        if !err.is_benign_peer_death() {
                            warn!(pid = app.pid, %err, "tracepoint_list_get failed");
                        }
                        break;
                    }
                }
            }
        }
        out
    }

    pub fn list_tracepoint_fields(&self) -> Vec<FieldDesc> {
        let mut out = Vec::new();
        for app in self.registry.apps() {
            if !app.is_compatible() {
                continue;
            }
            let conn = app.conn();
            for index in 0..MAX_LIST_PAGES {
                match conn.field_list_get(index) {
                    Ok(Some(desc)) => out.push(desc),
                    Ok(None) => break,
                    Err(err) => {
                        if !err.is_benign_peer_death() {
                            warn!(pid = app.pid, %err, "field_list_get failed");
                        }
                        break;
                    }
                }
            }
        }
        out
    }
}

/// Wrap a freshly accepted app socket as a boxed tracer transport, ready
/// for `Controller::register` (spec §6).
pub fn transport_for_accepted(pid: i32, sock: std::os::unix::net::UnixStream) -> Arc<dyn tracectl_transport::TracerTransport> {
    tracer_transport_for(pid, sock)
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
