// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local trace output directory creation (spec §6: mode `0770`, owned by
//! the session's uid/gid, "already exists" tolerated).

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use nix::unistd::{chown, Gid, Uid};
use tracectl_core::ReconcileError;

/// Abstraction over directory creation, so reconciler tests don't need a
/// real filesystem/uid-switching environment (mirrors the split between
/// [`tracectl_transport::TracerTransport`] and its fake).
pub trait TraceDirCreator: Send + Sync {
    fn ensure_dir(&self, path: &Path, uid: u32, gid: u32) -> Result<(), ReconcileError>;
}

/// Real implementation: `mkdir -p` plus `chown`/mode 0770, tolerating
/// "already exists".
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixTraceDirCreator;

impl TraceDirCreator for UnixTraceDirCreator {
    fn ensure_dir(&self, path: &Path, uid: u32, gid: u32) -> Result<(), ReconcileError> {
        match fs::create_dir_all(path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(err) => return Err(ReconcileError::Io(err.to_string())),
        }
        fs::set_permissions(path, fs::Permissions::from_mode(0o770)).map_err(|err| ReconcileError::Io(err.to_string()))?;
        chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
            .map_err(|err| ReconcileError::Io(err.to_string()))?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use std::path::{Path, PathBuf};

    use parking_lot::Mutex;
    use tracectl_core::ReconcileError;

    use super::TraceDirCreator;

    #[derive(Default)]
    pub struct FakeTraceDirCreator {
        created: Mutex<Vec<PathBuf>>,
    }

    impl FakeTraceDirCreator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn created_dirs(&self) -> Vec<PathBuf> {
            self.created.lock().clone()
        }
    }

    impl TraceDirCreator for FakeTraceDirCreator {
        fn ensure_dir(&self, path: &Path, _uid: u32, _gid: u32) -> Result<(), ReconcileError> {
            self.created.lock().push(path.to_path_buf());
            Ok(())
        }
    }
}
