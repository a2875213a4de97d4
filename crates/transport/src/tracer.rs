// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracer transport (C1): a synchronous, per-socket request/response API.
//!
//! Every call returns either success with an opaque handle/object, or a
//! [`TransportError`] whose [`TransportErrorKind`] distinguishes benign peer
//! death from every other failure (spec §4.1). Implementations must never
//! block holding a registry lock — callers pin an app (clone its `Arc`) and
//! then call through this trait, entirely outside any lock.

use tracectl_core::{ChannelAttr, ChannelType, ContextKind, EventAttr, Filter, TransportError};

/// One tracepoint entry returned by `tracepoint_list`/`tracepoint_list_get`.
///
/// Carries the app pid and a sentinel `enabled = -1` the way the public API
/// requires (spec §4.7).
#[derive(Debug, Clone)]
pub struct TracepointDesc {
    pub name: String,
    pub loglevel: i32,
    pub pid: i32,
    pub enabled: i32,
}

/// One field entry returned by `field_list`/`field_list_get`.
#[derive(Debug, Clone)]
pub struct FieldDesc {
    pub name: String,
    pub event_name: String,
    pub pid: i32,
}

/// Parameters for the `calibrate` operation. Opaque to the controller: it
/// forwards them to the tracer and reports success or failure.
#[derive(Debug, Clone, Default)]
pub struct CalibrateParams {
    pub function: CalibrateFunction,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CalibrateFunction {
    #[default]
    FunctionEntry,
}

/// The tracer-side handle/object pair returned by a successful create call.
#[derive(Debug, Clone, Copy)]
pub struct Created {
    pub handle: i64,
    pub object: u64,
}

/// Per-socket tracer transport (C1). One instance per registered app.
pub trait TracerTransport: Send + Sync {
    fn create_session(&self) -> Result<i64, TransportError>;
    fn release_session_handle(&self, handle: i64) -> Result<(), TransportError>;

    fn create_channel(
        &self,
        session: i64,
        attr: &ChannelAttr,
        channel_type: ChannelType,
    ) -> Result<Created, TransportError>;

    fn enable(&self, object: u64) -> Result<(), TransportError>;
    fn disable(&self, object: u64) -> Result<(), TransportError>;

    fn create_event(&self, channel: u64, name: &str, attr: &EventAttr) -> Result<Created, TransportError>;
    fn set_filter(&self, object: u64, bytecode: &Filter) -> Result<(), TransportError>;

    fn add_context(&self, channel: u64, ctx: ContextKind) -> Result<u64, TransportError>;
    fn release_object(&self, object: u64) -> Result<(), TransportError>;

    fn start_session(&self, handle: i64) -> Result<(), TransportError>;
    fn stop_session(&self, handle: i64) -> Result<(), TransportError>;
    fn wait_quiescent(&self) -> Result<(), TransportError>;
    fn flush_buffer(&self, object: u64) -> Result<(), TransportError>;

    /// Send the channel object itself to the app, after the consumer has
    /// handed it over via `get_channel` (spec §4.2 step 3).
    fn send_channel_to_app(&self, object: u64) -> Result<(), TransportError>;
    /// Send one stream to the app. Called once per stream, in list order.
    fn send_stream_to_app(&self, object: u64, data_fd: i32, wakeup_fd: i32) -> Result<(), TransportError>;

    fn tracer_version(&self) -> Result<(u32, u32), TransportError>;

    /// Returns `None` on the sentinel "no entry" value; every other negative
    /// return is a `TransportError` (spec §4.1).
    fn tracepoint_list_get(&self, index: u32) -> Result<Option<TracepointDesc>, TransportError>;
    fn field_list_get(&self, index: u32) -> Result<Option<FieldDesc>, TransportError>;

    fn calibrate(&self, params: &CalibrateParams) -> Result<(), TransportError>;
}
