// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire framing shared by the tracer transport and consumer client's real
//! socket implementations.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload, the same
//! convention used for the daemon's own control protocol.

use std::io::{self, Read, Write};

use serde::{de::DeserializeOwned, Serialize};

pub fn write_frame<W: Write, T: Serialize>(w: &mut W, value: &T) -> io::Result<()> {
    let payload = serde_json::to_vec(value)?;
    let len = u32::try_from(payload.len()).map_err(|_| io::Error::other("frame too large"))?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(&payload)?;
    w.flush()
}

pub fn read_frame<R: Read, T: DeserializeOwned>(r: &mut R) -> io::Result<T> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    serde_json::from_slice(&payload).map_err(io::Error::from)
}

/// Classify an I/O error into the benign-peer-death / other split the
/// controller needs at every call site (spec §4.1).
pub fn classify_io_error(err: &io::Error) -> tracectl_core::TransportErrorKind {
    use tracectl_core::TransportErrorKind as K;
    match err.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => K::BrokenPipe,
        io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionAborted => K::PeerExiting,
        io::ErrorKind::PermissionDenied => K::PermissionDenied,
        io::ErrorKind::AlreadyExists => K::AlreadyExists,
        io::ErrorKind::NotFound => K::NoEntry,
        io::ErrorKind::Unsupported => K::NotSupported,
        _ => K::Other,
    }
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
