// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shadow-copy projection (C5, spec §4.5): build an `AppChannel` replica
//! from a `LogicalChannel`, deep-copying its events by composite identity.

use tracectl_core::{AppChannel, AppEvent, ChannelKeyGen, ChannelType, LogicalChannel};

/// Copy a logical channel's attributes and events into a fresh app-local
/// replica. The channel *type* is not part of the logical model (spec
/// §4.5): the caller decides `PerCpu` for ordinary channels, `Metadata`
/// for the session's metadata channel.
pub fn shadow_copy_channel(channel_keys: &ChannelKeyGen, logical: &LogicalChannel, channel_type: ChannelType) -> AppChannel {
    let key = channel_keys.next();
    let mut channel = AppChannel::new(&logical.name, key, channel_type, logical.attr);
    channel.enabled = logical.enabled;
    for (event_key, logical_event) in &logical.events {
        if channel.find_event(event_key).is_some() {
            continue;
        }
        let event = AppEvent::new(event_key.clone(), logical_event.attr.clone(), logical_event.enabled);
        channel.events.insert(event_key.clone(), event);
    }
    channel
}

#[cfg(test)]
#[path = "shadow_tests.rs"]
mod tests;
