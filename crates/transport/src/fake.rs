// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake tracer transport and consumer client for testing the reconciler
//! without real sockets.
#![cfg_attr(coverage_nightly, coverage(off))]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracectl_core::{
    ChannelAttr, ChannelType, ContextKind, EventAttr, Filter, TransportError, TransportErrorKind,
};

use crate::consumer::{ConsumerChannelHandoff, ConsumerClient};
use crate::tracer::{CalibrateParams, Created, FieldDesc, TracepointDesc, TracerTransport};

/// A recorded call, for assertions on ordering (e.g. "channel before event").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracerCall {
    CreateSession,
    CreateChannel { session: i64 },
    Enable(u64),
    Disable(u64),
    CreateEvent { channel: u64, name: String },
    SetFilter(u64),
    AddContext { channel: u64 },
    ReleaseObject(u64),
    StartSession(i64),
    StopSession(i64),
    WaitQuiescent,
    FlushBuffer(u64),
    SendChannelToApp(u64),
    SendStreamToApp(u64),
    ReleaseSessionHandle(i64),
}

/// Scriptable failure: the next matching call returns this instead of
/// succeeding. Consumed after one use.
#[derive(Debug, Clone)]
pub struct ScriptedFailure {
    pub op: &'static str,
    pub kind: TransportErrorKind,
}

struct FakeState {
    calls: Vec<TracerCall>,
    failures: Vec<ScriptedFailure>,
}

/// In-memory stand-in for a per-app tracer socket.
pub struct FakeTracerTransport {
    pid: i32,
    next_handle: AtomicI64,
    next_object: AtomicU64,
    state: Mutex<FakeState>,
}

impl FakeTracerTransport {
    pub fn new(pid: i32) -> Self {
        Self {
            pid,
            next_handle: AtomicI64::new(1),
            next_object: AtomicU64::new(1),
            state: Mutex::new(FakeState { calls: Vec::new(), failures: Vec::new() }),
        }
    }

    pub fn calls(&self) -> Vec<TracerCall> {
        self.state.lock().calls.clone()
    }

    /// Queue a failure for the next call to `op`. Peer-death kinds make the
    /// app look dead for exactly that one call.
    pub fn fail_next(&self, op: &'static str, kind: TransportErrorKind) {
        self.state.lock().failures.push(ScriptedFailure { op, kind });
    }

    fn take_failure(&self, op: &'static str) -> Option<TransportErrorKind> {
        let mut state = self.state.lock();
        let idx = state.failures.iter().position(|f| f.op == op)?;
        Some(state.failures.remove(idx).kind)
    }

    fn record(&self, call: TracerCall) {
        self.state.lock().calls.push(call);
    }

    fn check(&self, op: &'static str) -> Result<(), TransportError> {
        if let Some(kind) = self.take_failure(op) {
            return Err(TransportError::new(kind, op, self.pid));
        }
        Ok(())
    }
}

impl TracerTransport for FakeTracerTransport {
    fn create_session(&self) -> Result<i64, TransportError> {
        self.check("create_session")?;
        self.record(TracerCall::CreateSession);
        Ok(self.next_handle.fetch_add(1, Ordering::SeqCst))
    }

    fn release_session_handle(&self, handle: i64) -> Result<(), TransportError> {
        self.check("release_session_handle")?;
        self.record(TracerCall::ReleaseSessionHandle(handle));
        Ok(())
    }

    fn create_channel(
        &self,
        session: i64,
        _attr: &ChannelAttr,
        _channel_type: ChannelType,
    ) -> Result<Created, TransportError> {
        self.check("create_channel")?;
        self.record(TracerCall::CreateChannel { session });
        Ok(Created {
            handle: self.next_handle.fetch_add(1, Ordering::SeqCst),
            object: self.next_object.fetch_add(1, Ordering::SeqCst),
        })
    }

    fn enable(&self, object: u64) -> Result<(), TransportError> {
        self.check("enable")?;
        self.record(TracerCall::Enable(object));
        Ok(())
    }

    fn disable(&self, object: u64) -> Result<(), TransportError> {
        self.check("disable")?;
        self.record(TracerCall::Disable(object));
        Ok(())
    }

    fn create_event(&self, channel: u64, name: &str, _attr: &EventAttr) -> Result<Created, TransportError> {
        self.check("create_event")?;
        self.record(TracerCall::CreateEvent { channel, name: name.to_string() });
        Ok(Created {
            handle: self.next_handle.fetch_add(1, Ordering::SeqCst),
            object: self.next_object.fetch_add(1, Ordering::SeqCst),
        })
    }

    fn set_filter(&self, object: u64, _bytecode: &Filter) -> Result<(), TransportError> {
        self.check("set_filter")?;
        self.record(TracerCall::SetFilter(object));
        Ok(())
    }

    fn add_context(&self, channel: u64, _ctx: ContextKind) -> Result<u64, TransportError> {
        self.check("add_context")?;
        self.record(TracerCall::AddContext { channel });
        Ok(self.next_object.fetch_add(1, Ordering::SeqCst))
    }

    fn release_object(&self, object: u64) -> Result<(), TransportError> {
        self.check("release_object")?;
        self.record(TracerCall::ReleaseObject(object));
        Ok(())
    }

    fn start_session(&self, handle: i64) -> Result<(), TransportError> {
        self.check("start_session")?;
        self.record(TracerCall::StartSession(handle));
        Ok(())
    }

    fn stop_session(&self, handle: i64) -> Result<(), TransportError> {
        self.check("stop_session")?;
        self.record(TracerCall::StopSession(handle));
        Ok(())
    }

    fn wait_quiescent(&self) -> Result<(), TransportError> {
        self.check("wait_quiescent")?;
        self.record(TracerCall::WaitQuiescent);
        Ok(())
    }

    fn flush_buffer(&self, object: u64) -> Result<(), TransportError> {
        self.check("flush_buffer")?;
        self.record(TracerCall::FlushBuffer(object));
        Ok(())
    }

    fn send_channel_to_app(&self, object: u64) -> Result<(), TransportError> {
        self.check("send_channel_to_app")?;
        self.record(TracerCall::SendChannelToApp(object));
        Ok(())
    }

    fn send_stream_to_app(&self, object: u64, _data_fd: i32, _wakeup_fd: i32) -> Result<(), TransportError> {
        self.check("send_stream_to_app")?;
        self.record(TracerCall::SendStreamToApp(object));
        Ok(())
    }

    fn tracer_version(&self) -> Result<(u32, u32), TransportError> {
        self.check("tracer_version")?;
        Ok((2, 0))
    }

    fn tracepoint_list_get(&self, index: u32) -> Result<Option<TracepointDesc>, TransportError> {
        self.check("tracepoint_list_get")?;
        if index == 0 {
            Ok(Some(TracepointDesc {
                name: "sched_switch".to_string(),
                loglevel: 0,
                pid: self.pid,
                enabled: -1,
            }))
        } else {
            Ok(None)
        }
    }

    fn field_list_get(&self, _index: u32) -> Result<Option<FieldDesc>, TransportError> {
        self.check("field_list_get")?;
        Ok(None)
    }

    fn calibrate(&self, _params: &CalibrateParams) -> Result<(), TransportError> {
        self.check("calibrate")?;
        Ok(())
    }
}

/// In-memory stand-in for a consumer process.
pub struct FakeConsumerClient {
    next_object: AtomicU64,
    stream_count: Mutex<HashMap<u64, u32>>,
    destroyed: Mutex<Vec<u64>>,
    fail_ask: Mutex<Option<TransportErrorKind>>,
}

impl FakeConsumerClient {
    pub fn new() -> Self {
        Self {
            next_object: AtomicU64::new(1),
            stream_count: Mutex::new(HashMap::new()),
            destroyed: Mutex::new(Vec::new()),
            fail_ask: Mutex::new(None),
        }
    }

    pub fn set_stream_count(&self, channel_key: u64, n: u32) {
        self.stream_count.lock().insert(channel_key, n);
    }

    pub fn fail_next_ask(&self, kind: TransportErrorKind) {
        *self.fail_ask.lock() = Some(kind);
    }

    pub fn destroyed_channels(&self) -> Vec<u64> {
        self.destroyed.lock().clone()
    }
}

impl Default for FakeConsumerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumerClient for FakeConsumerClient {
    fn ask_channel(&self, channel_key: u64, _subbuf_size: u64, _subbuf_count: u64) -> Result<u32, TransportError> {
        if let Some(kind) = self.fail_ask.lock().take() {
            return Err(TransportError::new(kind, "ask_channel", -1));
        }
        Ok(*self.stream_count.lock().get(&channel_key).unwrap_or(&1))
    }

    fn get_channel(&self, channel_key: u64) -> Result<ConsumerChannelHandoff, TransportError> {
        let count = *self.stream_count.lock().get(&channel_key).unwrap_or(&1);
        let object = self.next_object.fetch_add(1, Ordering::SeqCst);
        let streams = (0..count)
            .map(|i| tracectl_core::AppStream::new(100 + i as i32, 200 + i as i32))
            .collect();
        Ok(ConsumerChannelHandoff { object, streams })
    }

    fn destroy_channel(&self, channel_key: u64) {
        self.destroyed.lock().push(channel_key);
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
