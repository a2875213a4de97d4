// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real tracer transport and consumer client over Unix domain sockets.

use std::os::unix::net::UnixStream;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracectl_core::{
    AppStream, ChannelAttr, ChannelType, ContextKind, EventAttr, Filter, TransportError,
    TransportErrorKind,
};

use crate::consumer::{ConsumerChannelHandoff, ConsumerClient};
use crate::tracer::{CalibrateParams, Created, FieldDesc, TracepointDesc, TracerTransport};
use crate::wire::{classify_io_error, read_frame, write_frame};

#[derive(Debug, Serialize, Deserialize)]
enum TracerRequest {
    CreateSession,
    ReleaseSessionHandle { handle: i64 },
    CreateChannel { session: i64, subbuf_size: u64, subbuf_count: u64, overwrite: bool, metadata: bool },
    Enable { object: u64 },
    Disable { object: u64 },
    CreateEvent { channel: u64, name: String, loglevel: i32 },
    SetFilter { object: u64, bytecode: Vec<u8> },
    AddContext { channel: u64, kind: ContextKindWire },
    ReleaseObject { object: u64 },
    StartSession { handle: i64 },
    StopSession { handle: i64 },
    WaitQuiescent,
    FlushBuffer { object: u64 },
    SendChannelToApp { object: u64 },
    SendStreamToApp { object: u64, data_fd: i32, wakeup_fd: i32 },
    TracerVersion,
    TracepointListGet { index: u32 },
    FieldListGet { index: u32 },
    Calibrate,
}

#[derive(Debug, Serialize, Deserialize)]
enum ContextKindWire {
    Pid,
    ProcName,
    Tid,
    Vpid,
    Vtid,
    Vuid,
    Vgid,
    Cpu,
    Custom(u32),
}

impl From<ContextKind> for ContextKindWire {
    fn from(k: ContextKind) -> Self {
        match k {
            ContextKind::Pid => Self::Pid,
            ContextKind::ProcName => Self::ProcName,
            ContextKind::Tid => Self::Tid,
            ContextKind::Vpid => Self::Vpid,
            ContextKind::Vtid => Self::Vtid,
            ContextKind::Vuid => Self::Vuid,
            ContextKind::Vgid => Self::Vgid,
            ContextKind::Cpu => Self::Cpu,
            ContextKind::Custom(n) => Self::Custom(n),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
enum TracerResponse {
    Created { handle: i64, object: u64 },
    Handle(i64),
    Object(u64),
    Version(u32, u32),
    Tracepoint(Option<(String, i32, i32)>),
    Field(Option<(String, String)>),
    Ok,
    Err { benign: bool, kind: WireErrorKind },
}

#[derive(Debug, Serialize, Deserialize)]
enum WireErrorKind {
    BrokenPipe,
    PeerExiting,
    PermissionDenied,
    AlreadyExists,
    NoEntry,
    NotSupported,
    Other,
}

impl From<WireErrorKind> for TransportErrorKind {
    fn from(k: WireErrorKind) -> Self {
        match k {
            WireErrorKind::BrokenPipe => Self::BrokenPipe,
            WireErrorKind::PeerExiting => Self::PeerExiting,
            WireErrorKind::PermissionDenied => Self::PermissionDenied,
            WireErrorKind::AlreadyExists => Self::AlreadyExists,
            WireErrorKind::NoEntry => Self::NoEntry,
            WireErrorKind::NotSupported => Self::NotSupported,
            WireErrorKind::Other => Self::Other,
        }
    }
}

/// Tracer transport over a private Unix domain socket, one per app.
pub struct UnixTracerTransport {
    pid: i32,
    sock: Mutex<UnixStream>,
}

impl UnixTracerTransport {
    pub fn new(pid: i32, sock: UnixStream) -> Self {
        Self {
            pid,
            sock: Mutex::new(sock),
        }
    }

    fn call(&self, op: &'static str, req: TracerRequest) -> Result<TracerResponse, TransportError> {
        let mut guard = self.sock.lock();
        write_frame(&mut *guard, &req).map_err(|e| TransportError::new(classify_io_error(&e), op, self.pid))?;
        let resp: TracerResponse =
            read_frame(&mut *guard).map_err(|e| TransportError::new(classify_io_error(&e), op, self.pid))?;
        if let TracerResponse::Err { benign: _, kind } = resp {
            return Err(TransportError::new(kind.into(), op, self.pid));
        }
        Ok(resp)
    }
}

impl TracerTransport for UnixTracerTransport {
    fn create_session(&self) -> Result<i64, TransportError> {
        match self.call("create_session", TracerRequest::CreateSession)? {
            TracerResponse::Handle(h) => Ok(h),
            _ => Ok(-1),
        }
    }

    fn release_session_handle(&self, handle: i64) -> Result<(), TransportError> {
        self.call("release_session_handle", TracerRequest::ReleaseSessionHandle { handle })?;
        Ok(())
    }

    fn create_channel(
        &self,
        session: i64,
        attr: &ChannelAttr,
        channel_type: ChannelType,
    ) -> Result<Created, TransportError> {
        let resp = self.call(
            "create_channel",
            TracerRequest::CreateChannel {
                session,
                subbuf_size: attr.subbuf_size,
                subbuf_count: attr.subbuf_count,
                overwrite: attr.overwrite,
                metadata: channel_type == ChannelType::Metadata,
            },
        )?;
        match resp {
            TracerResponse::Created { handle, object } => Ok(Created { handle, object }),
            _ => Err(TransportError::new(TransportErrorKind::Other, "create_channel", self.pid)),
        }
    }

    fn enable(&self, object: u64) -> Result<(), TransportError> {
        self.call("enable", TracerRequest::Enable { object })?;
        Ok(())
    }

    fn disable(&self, object: u64) -> Result<(), TransportError> {
        self.call("disable", TracerRequest::Disable { object })?;
        Ok(())
    }

    fn create_event(&self, channel: u64, name: &str, attr: &EventAttr) -> Result<Created, TransportError> {
        let resp = self.call(
            "create_event",
            TracerRequest::CreateEvent {
                channel,
                name: name.to_string(),
                loglevel: attr.loglevel.value,
            },
        )?;
        match resp {
            TracerResponse::Created { handle, object } => Ok(Created { handle, object }),
            _ => Err(TransportError::new(TransportErrorKind::Other, "create_event", self.pid)),
        }
    }

    fn set_filter(&self, object: u64, bytecode: &Filter) -> Result<(), TransportError> {
        self.call(
            "set_filter",
            TracerRequest::SetFilter { object, bytecode: bytecode.as_bytes().to_vec() },
        )?;
        Ok(())
    }

    fn add_context(&self, channel: u64, ctx: ContextKind) -> Result<u64, TransportError> {
        match self.call("add_context", TracerRequest::AddContext { channel, kind: ctx.into() })? {
            TracerResponse::Object(o) => Ok(o),
            _ => Err(TransportError::new(TransportErrorKind::Other, "add_context", self.pid)),
        }
    }

    fn release_object(&self, object: u64) -> Result<(), TransportError> {
        self.call("release_object", TracerRequest::ReleaseObject { object })?;
        Ok(())
    }

    fn start_session(&self, handle: i64) -> Result<(), TransportError> {
        self.call("start_session", TracerRequest::StartSession { handle })?;
        Ok(())
    }

    fn stop_session(&self, handle: i64) -> Result<(), TransportError> {
        self.call("stop_session", TracerRequest::StopSession { handle })?;
        Ok(())
    }

    fn wait_quiescent(&self) -> Result<(), TransportError> {
        self.call("wait_quiescent", TracerRequest::WaitQuiescent)?;
        Ok(())
    }

    fn flush_buffer(&self, object: u64) -> Result<(), TransportError> {
        self.call("flush_buffer", TracerRequest::FlushBuffer { object })?;
        Ok(())
    }

    fn send_channel_to_app(&self, object: u64) -> Result<(), TransportError> {
        self.call("send_channel_to_app", TracerRequest::SendChannelToApp { object })?;
        Ok(())
    }

    fn send_stream_to_app(&self, object: u64, data_fd: i32, wakeup_fd: i32) -> Result<(), TransportError> {
        self.call(
            "send_stream_to_app",
            TracerRequest::SendStreamToApp { object, data_fd, wakeup_fd },
        )?;
        Ok(())
    }

    fn tracer_version(&self) -> Result<(u32, u32), TransportError> {
        match self.call("tracer_version", TracerRequest::TracerVersion)? {
            TracerResponse::Version(major, minor) => Ok((major, minor)),
            _ => Err(TransportError::new(TransportErrorKind::Other, "tracer_version", self.pid)),
        }
    }

    fn tracepoint_list_get(&self, index: u32) -> Result<Option<TracepointDesc>, TransportError> {
        match self.call("tracepoint_list_get", TracerRequest::TracepointListGet { index })? {
            TracerResponse::Tracepoint(Some((name, loglevel, _pid))) => Ok(Some(TracepointDesc {
                name,
                loglevel,
                pid: self.pid,
                enabled: -1,
            })),
            TracerResponse::Tracepoint(None) => Ok(None),
            _ => Err(TransportError::new(TransportErrorKind::Other, "tracepoint_list_get", self.pid)),
        }
    }

    fn field_list_get(&self, index: u32) -> Result<Option<FieldDesc>, TransportError> {
        match self.call("field_list_get", TracerRequest::FieldListGet { index })? {
            TracerResponse::Field(Some((name, event_name))) => Ok(Some(FieldDesc {
                name,
                event_name,
                pid: self.pid,
            })),
            TracerResponse::Field(None) => Ok(None),
            _ => Err(TransportError::new(TransportErrorKind::Other, "field_list_get", self.pid)),
        }
    }

    fn calibrate(&self, _params: &CalibrateParams) -> Result<(), TransportError> {
        self.call("calibrate", TracerRequest::Calibrate)?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
enum ConsumerRequest {
    AskChannel { channel_key: u64, subbuf_size: u64, subbuf_count: u64 },
    GetChannel { channel_key: u64 },
    DestroyChannel { channel_key: u64 },
}

#[derive(Debug, Serialize, Deserialize)]
enum ConsumerResponse {
    ExpectedStreamCount(u32),
    Handoff { object: u64, streams: Vec<(i32, i32)> },
    Ok,
    Err { kind: WireErrorKind },
}

/// Consumer RPC client over a Unix domain socket to one consumer process.
pub struct UnixConsumerClient {
    sock: Mutex<UnixStream>,
}

impl UnixConsumerClient {
    pub fn new(sock: UnixStream) -> Self {
        Self { sock: Mutex::new(sock) }
    }

    fn call(&self, op: &'static str, req: ConsumerRequest) -> Result<ConsumerResponse, TransportError> {
        let mut guard = self.sock.lock();
        write_frame(&mut *guard, &req).map_err(|e| TransportError::new(classify_io_error(&e), op, -1))?;
        let resp: ConsumerResponse =
            read_frame(&mut *guard).map_err(|e| TransportError::new(classify_io_error(&e), op, -1))?;
        if let ConsumerResponse::Err { kind } = resp {
            return Err(TransportError::new(kind.into(), op, -1));
        }
        Ok(resp)
    }
}

impl ConsumerClient for UnixConsumerClient {
    fn ask_channel(&self, channel_key: u64, subbuf_size: u64, subbuf_count: u64) -> Result<u32, TransportError> {
        match self.call("ask_channel", ConsumerRequest::AskChannel { channel_key, subbuf_size, subbuf_count })? {
            ConsumerResponse::ExpectedStreamCount(n) => Ok(n),
            _ => Err(TransportError::new(TransportErrorKind::Other, "ask_channel", -1)),
        }
    }

    fn get_channel(&self, channel_key: u64) -> Result<ConsumerChannelHandoff, TransportError> {
        match self.call("get_channel", ConsumerRequest::GetChannel { channel_key })? {
            ConsumerResponse::Handoff { object, streams } => Ok(ConsumerChannelHandoff {
                object,
                streams: streams.into_iter().map(|(d, w)| AppStream::new(d, w)).collect(),
            }),
            _ => Err(TransportError::new(TransportErrorKind::Other, "get_channel", -1)),
        }
    }

    fn destroy_channel(&self, channel_key: u64) {
        let _ = self.call("destroy_channel", ConsumerRequest::DestroyChannel { channel_key });
    }
}

/// Shared constructor used by registration: wraps a freshly accepted app
/// socket as a boxed transport, ready to install on the `App`.
pub fn tracer_transport_for(pid: i32, sock: UnixStream) -> Arc<dyn TracerTransport> {
    Arc::new(UnixTracerTransport::new(pid, sock))
}
