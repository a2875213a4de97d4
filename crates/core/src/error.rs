// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error vocabulary for the tracing session controller.

use thiserror::Error;

/// The outcome of a single call through the tracer transport or consumer
/// client, independent of which operation was invoked.
///
/// Two variants are "benign peer death" (see spec §4.1/§7): a dead app must
/// never surface as a logged error, only as a per-app skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The app's socket returned EPIPE — the app is gone.
    BrokenPipe,
    /// The app reported it is in the process of exiting.
    PeerExiting,
    PermissionDenied,
    AlreadyExists,
    NoEntry,
    NotSupported,
    /// Catch-all for any other negative return from the transport.
    Other,
}

impl TransportErrorKind {
    /// Benign peer-death signals must be distinguishable from all other
    /// failures at every call site (spec §4.1).
    pub fn is_benign_peer_death(self) -> bool {
        matches!(self, Self::BrokenPipe | Self::PeerExiting)
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BrokenPipe => "broken pipe",
            Self::PeerExiting => "peer exiting",
            Self::PermissionDenied => "permission denied",
            Self::AlreadyExists => "already exists",
            Self::NoEntry => "no entry",
            Self::NotSupported => "not supported",
            Self::Other => "transport error",
        };
        f.write_str(s)
    }
}

/// Error returned by a single transport or consumer-client call, carrying
/// enough context (pid, operation name) for the non-benign logging path to
/// report it without the caller having to thread that context back through.
#[derive(Debug, Clone, Error)]
#[error("{op} failed for pid {pid}: {kind}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub op: &'static str,
    pub pid: i32,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, op: &'static str, pid: i32) -> Self {
        Self { kind, op, pid }
    }

    pub fn is_benign_peer_death(&self) -> bool {
        self.kind.is_benign_peer_death()
    }
}

/// Errors surfaced by the per-app reconciliation procedures (C6).
///
/// `Oom` is the one variant that aborts a whole fan-out; every other variant
/// is a per-app skip (spec §7).
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Out of memory: fatal to the current fan-out, propagated upward.
    #[error("out of memory")]
    Oom,
    /// The app's socket is gone or about to be; skip this app only.
    #[error("peer disconnected (pid {0})")]
    PeerDisconnected(i32),
    /// The requested entity already exists on this app's shadow.
    #[error("already exists")]
    AlreadyExists,
    /// The requested entity is not present on this app's shadow.
    #[error("not found")]
    NotFound,
    /// A transport/consumer call failed for a reason other than peer death.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A should-never-happen contract violation (spec §7 item 2).
    #[error("programming violation: {0}")]
    Violation(String),
    /// The FD budget could not be reserved.
    #[error("fd budget exhausted")]
    FdBudgetExhausted,
    /// No consumer socket is configured for the app's bitness.
    #[error("no consumer available for this app's bitness")]
    ConsumerUnavailable,
    /// Local filesystem error (trace directory creation, etc).
    #[error("io error: {0}")]
    Io(String),
}

impl ReconcileError {
    pub fn is_benign_peer_death(&self) -> bool {
        match self {
            Self::PeerDisconnected(_) => true,
            Self::Transport(e) => e.is_benign_peer_death(),
            _ => false,
        }
    }
}

/// Errors returned by the app registry (C4).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unsupported bitness")]
    UnsupportedBitness,
    #[error("protocol major version mismatch")]
    ProtocolMismatch,
    #[error("fd budget exhausted")]
    FdBudgetExhausted,
}
