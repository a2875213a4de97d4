// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconciler-facing configuration: local trace path layout and the
//! metadata channel's default attributes (spec §4.5/§6).

use std::path::PathBuf;

use tracectl_core::ChannelAttr;

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Consumer's local trace path, e.g. `/var/lib/tracectl/trace`. `None`
    /// when the consumer isn't local (spec §4.6 `start_trace`: "if the
    /// consumer is local and has a trace path").
    pub trace_base_path: Option<PathBuf>,
    pub trace_subdir: String,
    /// Subbuffer size/count and timer intervals applied to every
    /// metadata channel (spec §4.5 "Channel-type decision").
    pub metadata_channel_attr: ChannelAttr,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            trace_base_path: None,
            trace_subdir: "ust".to_string(),
            metadata_channel_attr: ChannelAttr::defaults_metadata(),
        }
    }
}
