// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consumer client (C2): RPC to the consumer process that owns ring-buffer
//! file descriptors, plus the process-wide bitness-keyed endpoint registry
//! the reconciler selects from (spec §4.2).

use std::sync::Arc;

use parking_lot::RwLock;
use tracectl_core::{AppStream, Bitness, TransportError};

/// What the consumer hands back from `get_channel`: the opaque channel
/// object plus every stream, in the order they must be forwarded to the app.
#[derive(Debug, Clone)]
pub struct ConsumerChannelHandoff {
    pub object: u64,
    pub streams: Vec<AppStream>,
}

/// RPC client to a single consumer process.
pub trait ConsumerClient: Send + Sync {
    /// Ask the consumer to allocate the channel; returns the expected
    /// stream count the reconciler must reserve FDs for before calling
    /// `get_channel`.
    fn ask_channel(&self, channel_key: u64, subbuf_size: u64, subbuf_count: u64) -> Result<u32, TransportError>;

    /// Receive the stream descriptors for a previously asked-for channel.
    fn get_channel(&self, channel_key: u64) -> Result<ConsumerChannelHandoff, TransportError>;

    /// Best-effort teardown on the consumer when the local flow fails after
    /// `ask_channel` succeeded. Errors are not actionable by the caller.
    fn destroy_channel(&self, channel_key: u64);
}

/// The two process-wide consumer sockets, selected by app bitness
/// (spec §4.2). Atomically readable: a reader takes a brief read lock,
/// clones the `Arc`, and releases the lock before making any RPC call.
#[derive(Default)]
pub struct ConsumerEndpoints {
    consumerd32: RwLock<Option<Arc<dyn ConsumerClient>>>,
    consumerd64: RwLock<Option<Arc<dyn ConsumerClient>>>,
}

impl ConsumerEndpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, bitness: Bitness, client: Arc<dyn ConsumerClient>) {
        let slot = self.slot(bitness);
        *slot.write() = Some(client);
    }

    pub fn clear(&self, bitness: Bitness) {
        *self.slot(bitness).write() = None;
    }

    /// `None` is the "not available" sentinel (spec §4.2): registering an
    /// app whose bitness has no available consumer must be rejected.
    pub fn get(&self, bitness: Bitness) -> Option<Arc<dyn ConsumerClient>> {
        self.slot(bitness).read().clone()
    }

    fn slot(&self, bitness: Bitness) -> &RwLock<Option<Arc<dyn ConsumerClient>>> {
        match bitness {
            Bitness::B32 => &self.consumerd32,
            Bitness::B64 => &self.consumerd64,
        }
    }
}
