// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ring-buffer stream views handed from the consumer to the app (C2/spec §3).

/// A single ring-buffer view. Transient: born when the consumer answers
/// `get_channel`, deleted once forwarded to the app via `send_stream_to_app`.
#[derive(Debug, Clone, Copy)]
pub struct AppStream {
    /// The ring-buffer data fd.
    pub data_fd: i32,
    /// The wakeup/control fd paired with the ring buffer.
    pub wakeup_fd: i32,
}

impl AppStream {
    pub fn new(data_fd: i32, wakeup_fd: i32) -> Self {
        Self { data_fd, wakeup_fd }
    }
}
