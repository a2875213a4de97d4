// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The reconciler (C6): per-app procedures driving the tracer transport
//! and consumer client to bring one app's shadow in line with the
//! logical configuration (spec §4.6).

use std::sync::Arc;

use tracectl_core::{
    trace_output_path, AppChannel, AppContext, AppEvent, AppSession, ChannelKeyGen, ChannelType, Clock, ContextKind,
    EventKey, FdBudget, FdClass, LogicalChannel, LogicalEvent, LogicalSession, ReconcileError, SessionId,
    TransportError, TransportErrorKind, UniqueIdGen,
};
use tracectl_registry::App;
use tracectl_transport::ConsumerEndpoints;
use tracing::warn;

use crate::config::ReconcileConfig;
use crate::shadow::shadow_copy_channel;
use crate::trace_dir::TraceDirCreator;

fn map_transport_err(err: TransportError) -> ReconcileError {
    if err.is_benign_peer_death() {
        ReconcileError::PeerDisconnected(err.pid)
    } else {
        ReconcileError::Transport(err)
    }
}

/// Per-app reconciliation procedures (spec §4.6). One instance is shared
/// process-wide; all state it touches beyond its own immutable
/// configuration lives on the `App`s it's handed.
pub struct Reconciler {
    consumers: Arc<ConsumerEndpoints>,
    fd_budget: Arc<FdBudget>,
    channel_keys: ChannelKeyGen,
    unique_ids: Arc<dyn UniqueIdGen>,
    clock: Arc<dyn Clock>,
    trace_dirs: Arc<dyn TraceDirCreator>,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(
        consumers: Arc<ConsumerEndpoints>,
        fd_budget: Arc<FdBudget>,
        unique_ids: Arc<dyn UniqueIdGen>,
        clock: Arc<dyn Clock>,
        trace_dirs: Arc<dyn TraceDirCreator>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            consumers,
            fd_budget,
            channel_keys: ChannelKeyGen::new(),
            unique_ids,
            clock,
            trace_dirs,
            config,
        }
    }

    /// Build (or no-op if present) the `AppSession` replica for `logical`
    /// on `app` (spec §4.6 `create_app_session`).
    ///
    /// Channel *attributes* are shadow-copied immediately so a later
    /// `create_channel` on an existing logical channel finds its key and
    /// attrs already in place; events are deliberately left empty here —
    /// they are materialized exactly once, by the explicit `create_event`
    /// procedure (called directly or from `global_update`), never by this
    /// shadow-copy step. See DESIGN.md.
    pub fn create_app_session(&self, logical: &LogicalSession, app: &App) -> Result<(), ReconcileError> {
        if !app.is_compatible() {
            return Ok(());
        }
        {
            let sessions = app.sessions().lock();
            if sessions.contains_key(&logical.id) {
                return Ok(());
            }
        }

        let unique_id = self.unique_ids.next();
        let output_path = trace_output_path(&app.name, app.pid, self.clock.now());
        let mut session = AppSession::new(logical.id.clone(), logical.uid, logical.gid, unique_id, output_path);
        for (name, logical_channel) in &logical.channels {
            let mut channel = shadow_copy_channel(&self.channel_keys, logical_channel, ChannelType::PerCpu);
            channel.events.clear();
            session.channels.insert(name.clone(), channel);
        }

        match app.conn().create_session() {
            Ok(handle) => session.handle = handle,
            Err(err) => {
                // Every failure here — benign or not — degrades to a
                // per-app skip rather than a logged transport error
                // (spec §4.6: "translate any non-OOM tracer error to a
                // peer disconnected code").
                if !err.is_benign_peer_death() {
                    warn!(pid = app.pid, %err, "create_session failed");
                }
                return Err(ReconcileError::PeerDisconnected(app.pid));
            }
        }

        app.sessions().lock().insert(logical.id.clone(), session);
        Ok(())
    }

    /// Materialise one already-allocated channel on the tracer and
    /// consumer, in place: ask the consumer for stream descriptors,
    /// reserve their FDs, create the channel on the tracer, then forward
    /// the channel and every stream to the app (spec §4.6 `create_channel`).
    ///
    /// A no-op if `channel.is_sent` already. On any failure the channel is
    /// left exactly as far along as it got — a partial stream list stays
    /// on the channel for later cleanup, per spec's ordering note.
    fn materialize_channel(&self, channel: &mut AppChannel, session_handle: i64, app: &App) -> Result<(), ReconcileError> {
        if channel.is_sent {
            return Ok(());
        }

        let consumer = self.consumers.get(app.bitness).ok_or(ReconcileError::ConsumerUnavailable)?;
        let key = channel.key;

        let stream_count = consumer
            .ask_channel(key, channel.attr.subbuf_size, channel.attr.subbuf_count)
            .map_err(map_transport_err)?;

        // Two FDs per stream plus two for the channel object itself,
        // reserved up front so the release on teardown (spec §4.3) is the
        // exact mirror of what was taken here.
        let nb_fd = 2u64 * u64::from(stream_count) + 2;
        if !self.fd_budget.reserve(FdClass::Apps, nb_fd) {
            consumer.destroy_channel(key);
            return Err(ReconcileError::FdBudgetExhausted);
        }

        let conn = app.conn();
        let created = match conn.create_channel(session_handle, &channel.attr, channel.channel_type) {
            Ok(created) => created,
            Err(err) => {
                self.fd_budget.release(FdClass::Apps, nb_fd);
                consumer.destroy_channel(key);
                return Err(map_transport_err(err));
            }
        };

        let handoff = match consumer.get_channel(key) {
            Ok(handoff) => handoff,
            Err(err) => {
                self.fd_budget.release(FdClass::Apps, nb_fd);
                consumer.destroy_channel(key);
                return Err(map_transport_err(err));
            }
        };

        channel.handle = created.handle;
        channel.object = Some(handoff.object);
        channel.expected_stream_count = stream_count;
        channel.streams = handoff.streams;

        if let Err(err) = conn.send_channel_to_app(handoff.object) {
            self.fd_budget.release(FdClass::Apps, nb_fd);
            consumer.destroy_channel(key);
            return Err(map_transport_err(err));
        }

        while !channel.streams.is_empty() {
            let stream = channel.streams[0];
            match conn.send_stream_to_app(handoff.object, stream.data_fd, stream.wakeup_fd) {
                Ok(()) => {
                    channel.streams.remove(0);
                }
                Err(err) => {
                    // A failure mid-list leaves the remaining streams
                    // owned by the channel for later cleanup (spec §4.6
                    // "Ordering and tie-breaks").
                    return Err(map_transport_err(err));
                }
            }
        }

        channel.is_sent = true;
        if !channel.enabled {
            conn.disable(handoff.object).map_err(map_transport_err)?;
        }
        Ok(())
    }

    pub fn create_channel(
        &self,
        session_id: &SessionId,
        logical: &LogicalChannel,
        channel_type: ChannelType,
        app: &App,
    ) -> Result<(), ReconcileError> {
        if !app.is_compatible() {
            return Ok(());
        }
        let mut sessions = app.sessions().lock();
        let session = sessions.get_mut(session_id).ok_or(ReconcileError::NotFound)?;
        let session_handle = session.handle;
        let channel = session
            .channels
            .entry(logical.name.clone())
            .or_insert_with(|| AppChannel::new(&logical.name, self.channel_keys.next(), channel_type, logical.attr));
        channel.enabled = logical.enabled;
        self.materialize_channel(channel, session_handle, app)
    }

    fn ensure_metadata_channel(&self, session_id: &SessionId, app: &App) -> Result<(), ReconcileError> {
        let mut sessions = app.sessions().lock();
        let session = sessions.get_mut(session_id).ok_or(ReconcileError::NotFound)?;
        let session_handle = session.handle;
        let metadata = session.metadata.get_or_insert_with(|| {
            AppChannel::new("metadata", self.channel_keys.next(), ChannelType::Metadata, self.config.metadata_channel_attr)
        });
        self.materialize_channel(metadata, session_handle, app)
    }

    pub fn create_event(
        &self,
        session_id: &SessionId,
        channel_name: &str,
        logical: &LogicalEvent,
        app: &App,
    ) -> Result<(), ReconcileError> {
        if !app.is_compatible() {
            return Ok(());
        }
        let conn = app.conn();
        let mut sessions = app.sessions().lock();
        let session = sessions.get_mut(session_id).ok_or(ReconcileError::NotFound)?;
        let channel = session.channels.get_mut(channel_name).ok_or(ReconcileError::NotFound)?;

        if channel.find_event(&logical.key).is_some() {
            return Err(ReconcileError::AlreadyExists);
        }

        let created = conn
            .create_event(channel.key, &logical.key.name, &logical.attr)
            .map_err(map_transport_err)?;

        let mut event = AppEvent::new(logical.key.clone(), logical.attr.clone(), logical.enabled);
        event.handle = created.handle;
        event.object = created.object;

        if let Some(filter) = &logical.key.filter {
            conn.set_filter(created.object, filter).map_err(map_transport_err)?;
        }

        if !event.enabled {
            if let Err(err) = conn.disable(created.object) {
                match err.kind {
                    TransportErrorKind::AlreadyExists => {}
                    TransportErrorKind::PermissionDenied => {
                        return Err(ReconcileError::Violation(format!(
                            "disable returned permission-denied after successful create (pid {})",
                            err.pid
                        )));
                    }
                    _ if err.is_benign_peer_death() => return Err(map_transport_err(err)),
                    _ => return Err(ReconcileError::Transport(err)),
                }
            }
        }

        channel.events.insert(event.key.clone(), event);
        Ok(())
    }

    /// Toggle a channel's enabled state on the tracer and in the shadow, the
    /// channel-level counterpart of [`Reconciler::set_event_enabled`] (spec
    /// §4.7 `enable_channel_global`/`disable_channel_global`). A no-op if
    /// the channel hasn't reached the app yet or is already in the
    /// requested state.
    pub fn set_channel_enabled(
        &self,
        session_id: &SessionId,
        channel_name: &str,
        enabled: bool,
        app: &App,
    ) -> Result<(), ReconcileError> {
        if !app.is_compatible() {
            return Ok(());
        }
        let conn = app.conn();
        let mut sessions = app.sessions().lock();
        let session = sessions.get_mut(session_id).ok_or(ReconcileError::NotFound)?;
        let channel = session.channels.get_mut(channel_name).ok_or(ReconcileError::NotFound)?;

        if channel.enabled == enabled {
            return Ok(());
        }
        if let Some(object) = channel.object {
            let result = if enabled { conn.enable(object) } else { conn.disable(object) };
            result.map_err(map_transport_err)?;
        }
        channel.enabled = enabled;
        Ok(())
    }

    /// Toggle an already-created event's enabled state on the tracer and
    /// in the shadow. A no-op if the event is already in the requested
    /// state (spec §4.7 idempotence: "enable on an enabled entity is
    /// success").
    pub fn set_event_enabled(
        &self,
        session_id: &SessionId,
        channel_name: &str,
        logical: &EventKey,
        enabled: bool,
        app: &App,
    ) -> Result<(), ReconcileError> {
        if !app.is_compatible() {
            return Ok(());
        }
        let conn = app.conn();
        let mut sessions = app.sessions().lock();
        let session = sessions.get_mut(session_id).ok_or(ReconcileError::NotFound)?;
        let channel = session.channels.get_mut(channel_name).ok_or(ReconcileError::NotFound)?;
        let event = channel.find_event_mut(logical).ok_or(ReconcileError::NotFound)?;

        if event.enabled == enabled {
            return Ok(());
        }
        let result = if enabled { conn.enable(event.object) } else { conn.disable(event.object) };
        result.map_err(map_transport_err)?;
        event.enabled = enabled;
        Ok(())
    }

    pub fn add_context(
        &self,
        session_id: &SessionId,
        channel_name: &str,
        ctx: ContextKind,
        app: &App,
    ) -> Result<(), ReconcileError> {
        if !app.is_compatible() {
            return Ok(());
        }
        let conn = app.conn();
        let mut sessions = app.sessions().lock();
        let session = sessions.get_mut(session_id).ok_or(ReconcileError::NotFound)?;
        let channel = session.channels.get_mut(channel_name).ok_or(ReconcileError::NotFound)?;

        if channel.contexts.contains_key(&ctx) {
            return Err(ReconcileError::AlreadyExists);
        }

        let mut context = AppContext::new(ctx);
        context.handle = conn.add_context(channel.key, ctx).map_err(map_transport_err)? as i64;
        channel.contexts.insert(ctx, context);
        Ok(())
    }

    pub fn start_trace(&self, session: &LogicalSession, app: &App) -> Result<(), ReconcileError> {
        if !app.is_compatible() {
            return Ok(());
        }

        if let Some(base) = self.config.trace_base_path.clone() {
            let output_path = {
                let sessions = app.sessions().lock();
                sessions.get(&session.id).map(|s| s.output_path.clone())
            };
            if let Some(output_path) = output_path {
                let dir = base.join(&self.config.trace_subdir).join(output_path);
                self.trace_dirs.ensure_dir(&dir, session.uid, session.gid)?;
            }
        }

        self.ensure_metadata_channel(&session.id, app)?;

        let conn = app.conn();
        let handle = {
            let sessions = app.sessions().lock();
            sessions.get(&session.id).ok_or(ReconcileError::NotFound)?.handle
        };

        if let Err(err) = conn.start_session(handle) {
            return Err(map_transport_err(err));
        }
        if let Err(err) = conn.wait_quiescent() {
            return Err(map_transport_err(err));
        }

        let mut sessions = app.sessions().lock();
        if let Some(app_session) = sessions.get_mut(&session.id) {
            app_session.started = true;
        }
        Ok(())
    }

    pub fn stop_trace(&self, session_id: &SessionId, app: &App) -> Result<(), ReconcileError> {
        if !app.is_compatible() {
            return Ok(());
        }
        let conn = app.conn();
        let handle = {
            let sessions = app.sessions().lock();
            let session = sessions.get(session_id).ok_or(ReconcileError::NotFound)?;
            if !session.started {
                return Err(ReconcileError::Violation("stop_trace on a session that was never started".to_string()));
            }
            session.handle
        };

        if let Err(err) = conn.stop_session(handle) {
            return if err.is_benign_peer_death() { Ok(()) } else { Err(ReconcileError::Transport(err)) };
        }
        if let Err(err) = conn.wait_quiescent() {
            return if err.is_benign_peer_death() { Ok(()) } else { Err(ReconcileError::Transport(err)) };
        }

        let objects: Vec<u64> = {
            let sessions = app.sessions().lock();
            let session = sessions.get(session_id).ok_or(ReconcileError::NotFound)?;
            let mut objects: Vec<u64> = session.channels.values().filter_map(|c| c.object).collect();
            if let Some(meta) = &session.metadata {
                if let Some(object) = meta.object {
                    objects.push(object);
                }
            }
            objects
        };

        for object in objects {
            if let Err(err) = conn.flush_buffer(object) {
                return if err.is_benign_peer_death() { Ok(()) } else { Err(ReconcileError::Transport(err)) };
            }
        }
        Ok(())
    }

    pub fn destroy_trace(&self, session_id: &SessionId, app: &App) -> Result<(), ReconcileError> {
        if !app.is_compatible() {
            return Ok(());
        }
        let session = app.sessions().lock().remove(session_id);
        let Some(session) = session else {
            return Ok(());
        };

        let conn = app.conn();
        for channel in session.channels.values() {
            if let Some(object) = channel.object {
                let _ = conn.release_object(object);
            }
        }
        if let Some(meta) = &session.metadata {
            if let Some(object) = meta.object {
                let _ = conn.release_object(object);
            }
        }
        if session.handle >= 0 {
            let _ = conn.release_session_handle(session.handle);
        }
        let _ = conn.wait_quiescent();
        Ok(())
    }

    /// Bring a newly (re-)registered app up to date with a session that
    /// already existed (spec §4.6 `global_update`).
    pub fn global_update(&self, session: &LogicalSession, app: &App) -> Result<(), ReconcileError> {
        if !app.is_compatible() {
            return Ok(());
        }
        self.create_app_session(session, app)?;
        for channel in session.channels.values() {
            self.create_channel(&session.id, channel, ChannelType::PerCpu, app)?;
            for ctx in &channel.contexts {
                self.add_context(&session.id, &channel.name, *ctx, app)?;
            }
            for event in channel.events.values() {
                self.create_event(&session.id, &channel.name, event, app)?;
            }
        }
        if session.started {
            self.start_trace(session, app)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;
