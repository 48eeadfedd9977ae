//! Advisory file locks: implements `LockProvider` with `fs2`.
//!
//! Lock files are never unlinked. Removing a held lock file would let a second
//! process lock a fresh inode at the same path.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

use crate::application::ports::{LockAttempt, LockProvider};

const RUN_LOCK_DIR: &str = "/run/lock";
const SESSION_LOCK_FILE: &str = "blackberets.lock";

/// The host-wide lock held by every install and cleanup session.
///
/// Independent of configuration and environment: `/run/lock` when it is
/// world-writable, otherwise `/tmp`.
#[cfg(unix)]
#[must_use]
pub fn session_lock_path() -> PathBuf {
    session_lock_in(Path::new(RUN_LOCK_DIR), Path::new("/tmp"))
}

#[cfg(not(unix))]
#[must_use]
pub fn session_lock_path() -> PathBuf {
    session_lock_in(Path::new(RUN_LOCK_DIR), &std::env::temp_dir())
}

fn session_lock_in(run_lock: &Path, fallback: &Path) -> PathBuf {
    let dir = if world_writable(run_lock) { run_lock } else { fallback };
    dir.join(SESSION_LOCK_FILE)
}

#[cfg(unix)]
fn world_writable(dir: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(dir).is_ok_and(|m| m.is_dir() && m.permissions().mode() & 0o002 != 0)
}

#[cfg(not(unix))]
fn world_writable(_dir: &Path) -> bool {
    false
}

/// Opens `path` for locking, creating it if needed.
///
/// The bool is false when the file belongs to another user and only a read
/// handle was granted; the lock still works but the pid is not recorded.
fn open_lock_file(path: &Path) -> Result<(File, bool)> {
    // a second pass covers losing the create race to another session
    for _ in 0..2 {
        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => return Ok((file, true)),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                let file = File::open(path)
                    .with_context(|| format!("opening lock file {}", path.display()))?;
                return Ok((file, false));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("opening lock file {}", path.display()));
            }
        }
        match OpenOptions::new().read(true).write(true).create_new(true).open(path) {
            Ok(file) => {
                share_with_other_users(&file, path);
                return Ok((file, true));
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(e).with_context(|| format!("creating lock file {}", path.display()));
            }
        }
    }
    anyhow::bail!("lock file {} keeps disappearing", path.display())
}

/// Mode 0666, so a session run by another user can lock the same file.
#[cfg(unix)]
fn share_with_other_users(file: &File, path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = file.set_permissions(std::fs::Permissions::from_mode(0o666)) {
        tracing::debug!(path = %path.display(), "could not widen lock file mode: {e}");
    }
}

#[cfg(not(unix))]
fn share_with_other_users(_file: &File, _path: &Path) {}

/// Production lock provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileLocks;

/// Holds the lock until dropped. The OS also releases it if the process dies.
#[derive(Debug)]
pub struct FileLockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::debug!(path = %self.path.display(), "unlock failed: {e}");
        }
    }
}

impl LockProvider for FileLocks {
    type Guard = FileLockGuard;

    fn try_acquire(&self, path: &Path) -> Result<LockAttempt<FileLockGuard>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let (mut file, writable) = open_lock_file(path)?;

        if file.try_lock_exclusive().is_err() {
            let mut content = String::new();
            let holder = file
                .read_to_string(&mut content)
                .ok()
                .and_then(|_| content.trim().parse().ok());
            return Ok(LockAttempt::Held { holder });
        }

        if writable {
            file.set_len(0)
                .and_then(|()| file.seek(SeekFrom::Start(0)))
                .and_then(|_| writeln!(file, "{}", std::process::id()))
                .and_then(|()| file.flush())
                .with_context(|| format!("recording pid in {}", path.display()))?;
        }
        tracing::debug!(path = %path.display(), writable, "lock acquired");

        Ok(LockAttempt::Acquired(FileLockGuard {
            file,
            path: path.to_path_buf(),
        }))
    }
}
