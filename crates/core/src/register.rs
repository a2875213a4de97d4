// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registration message sent by an app when it connects to the daemon
//! (spec §6).

use serde::{Deserialize, Serialize};

/// Fields carried by an app's registration handshake.
///
/// `name` is assumed already bounded to 16 bytes by the wire layer that
/// decoded it; this type does not re-validate that, only the registry's
/// bitness/protocol checks are enforced downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMsg {
    pub name: String,
    pub pid: i32,
    pub ppid: i32,
    pub uid: u32,
    pub gid: u32,
    pub bitness: u32,
    pub protocol_major: u32,
    pub protocol_minor: u32,
}
