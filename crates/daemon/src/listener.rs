// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registration accept loop (spec §4.4/§6).
//!
//! The real transport is synchronous request/response over a blocking Unix
//! socket (the daemon always calls out to the app, never the reverse), so
//! this runs on plain `std::thread` rather than an async runtime: one
//! thread accepting, one short-lived thread per connection to read the
//! handshake, and one long-lived monitor thread per registered app that
//! blocks on the now-idle socket until the peer closes it.

use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::thread;

use tracectl_core::RegisterMsg;
use tracectl_registry::SocketId;
use tracectl_transport::wire::read_frame;
use tracing::{debug, error, info, warn};

use crate::api::{transport_for_accepted, Controller};

/// Bind `path` and accept registrations until the process exits.
///
/// Removes a stale socket file left behind by an unclean shutdown before
/// binding, the same tolerance a Unix daemon's listener conventionally
/// grants itself.
pub fn run(path: &std::path::Path, controller: Arc<Controller>) -> io::Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    info!(path = %path.display(), "listening for app registrations");

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let controller = controller.clone();
                thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &controller) {
                        warn!(%err, "registration handshake failed");
                    }
                });
            }
            Err(err) => error!(%err, "accept failed"),
        }
    }
    Ok(())
}

/// Read the one-shot registration handshake, register the app, then spawn
/// its monitor thread. The accepting thread's job ends here; the monitor
/// thread outlives it.
fn handle_connection(mut stream: UnixStream, controller: &Arc<Controller>) -> io::Result<()> {
    let msg: RegisterMsg = read_frame(&mut stream)?;
    let pid = msg.pid;
    let sock = SocketId(stream.as_raw_fd());

    let monitor = stream.try_clone()?;
    let conn = transport_for_accepted(pid, stream);

    // `validate_version` is left to the embedding command layer, the same
    // way every other C7 operation is (see the module doc comment on
    // `main.rs`): it calls the tracer over the socket we just accepted,
    // and the peer isn't guaranteed to answer before this connection's
    // handshake thread would otherwise move on to spawning the monitor.
    match controller.register(&msg, sock, conn) {
        Ok(app) => {
            debug!(pid, sock = sock.0, "app registered");
            spawn_monitor(controller.clone(), sock, monitor);
            let _ = app;
        }
        Err(err) => {
            warn!(pid, %err, "app registration rejected");
        }
    }
    Ok(())
}

/// Block on the app's otherwise-idle socket until it closes, then
/// unregister. A byte arriving here instead of EOF would mean the app
/// sent something outside the handshake/reconcile protocol; that is
/// treated the same as a close, since this connection never expects
/// app-initiated traffic after registration.
fn spawn_monitor(controller: Arc<Controller>, sock: SocketId, mut monitor: UnixStream) {
    thread::spawn(move || {
        let mut buf = [0u8; 1];
        loop {
            use std::io::Read;
            match monitor.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        debug!(sock = sock.0, "app socket closed; unregistering");
        let app = controller.unregister(sock);
        drop(app);
    });
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
