// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel replicas (C5 / spec §3: `AppChannel`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::context::{AppContext, ContextKind};
use crate::event::{AppEvent, EventKey};
use crate::stream::AppStream;

/// Ordinary channels carry per-cpu trace data; exactly one channel per
/// session is the distinguished metadata channel (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    PerCpu,
    Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    Mmap,
    Splice,
}

/// Attributes a channel is created with. The channel *type* is deliberately
/// not part of this struct: shadow-copy omits it, and the reconciler alone
/// decides per-cpu vs. metadata (spec §4.5).
///
/// `Serialize`/`Deserialize` back the daemon's channel-default configuration
/// (spec §10 "Configuration"), not the wire protocol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChannelAttr {
    pub subbuf_size: u64,
    pub subbuf_count: u64,
    pub overwrite: bool,
    pub switch_timer_interval: u32,
    pub read_timer_interval: u32,
    pub output: OutputMode,
}

impl ChannelAttr {
    pub fn defaults_metadata() -> Self {
        Self {
            subbuf_size: 4096,
            subbuf_count: 2,
            overwrite: false,
            switch_timer_interval: 0,
            read_timer_interval: 0,
            output: OutputMode::Mmap,
        }
    }
}

/// An app-local replica of a channel.
pub struct AppChannel {
    pub name: String,
    /// Globally unique key minted by `ChannelKeyGen` at shadow-copy time.
    pub key: u64,
    pub channel_type: ChannelType,
    pub attr: ChannelAttr,
    /// Tracer handle, assigned once `create_channel` succeeds on the tracer.
    pub handle: i64,
    /// Opaque consumer/tracer channel object, set once the consumer has
    /// handed the channel over (`get_channel`).
    pub object: Option<u64>,
    pub enabled: bool,
    /// Reached the app (`send_channel_to_app` + every stream forwarded).
    pub is_sent: bool,
    pub expected_stream_count: u32,
    /// Transient: populated by `get_channel`, drained as each stream is
    /// forwarded to the app (spec §3 invariant).
    pub streams: Vec<AppStream>,
    pub contexts: HashMap<ContextKind, AppContext>,
    pub events: HashMap<EventKey, AppEvent>,
}

impl AppChannel {
    pub fn new(name: impl Into<String>, key: u64, channel_type: ChannelType, attr: ChannelAttr) -> Self {
        Self {
            name: name.into(),
            key,
            channel_type,
            attr,
            handle: -1,
            object: None,
            enabled: true,
            is_sent: false,
            expected_stream_count: 0,
            streams: Vec::new(),
            contexts: HashMap::new(),
            events: HashMap::new(),
        }
    }

    /// Composite-key lookup used by `create_event` (spec §4.6): locate an
    /// existing `AppEvent` whose key is equal under the full composite
    /// (not merely same hash bucket).
    pub fn find_event(&self, key: &EventKey) -> Option<&AppEvent> {
        self.events.get(key)
    }

    pub fn find_event_mut(&mut self, key: &EventKey) -> Option<&mut AppEvent> {
        self.events.get_mut(key)
    }
}
