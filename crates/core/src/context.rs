// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Context attachments (C5 / spec §3: `AppContext`).

use serde::{Deserialize, Serialize};

/// Identity of a context attachment. The controller treats the kind as an
/// opaque enum discriminant; the tracer interprets what to actually collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextKind {
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

/// An app-local replica of one context attachment.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub kind: ContextKind,
    /// Tracer-side handle, assigned once `add_context` succeeds.
    pub handle: i64,
}

impl AppContext {
    pub fn new(kind: ContextKind) -> Self {
        Self { kind, handle: -1 }
    }
}
