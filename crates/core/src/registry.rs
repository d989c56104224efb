//! Display-number registry: the single place that decides which X display
//! numbers are in use, in-process or by some other program entirely.
//!
//! Grounded on `frecar-beam/crates/agent/src/display.rs::is_display_running`
//! (PID-from-lockfile liveness probing) and the allocation loop in
//! `original_source/src/x-server-local.c:126-165`'s `display_number_in_use` /
//! `x_server_local_get_unused_display_number`.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Tracks display numbers leased by this process. Foreign processes are not
/// tracked here; they're detected on demand by [`foreign_lock_holds`].
pub struct DisplayNumberRegistry {
    leased: Mutex<HashSet<u32>>,
}

impl Default for DisplayNumberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayNumberRegistry {
    pub fn new() -> Self {
        Self {
            leased: Mutex::new(HashSet::new()),
        }
    }

    /// Process-wide default registry, for callers that don't need to inject
    /// a private instance (tests construct their own with `new()` instead).
    pub fn global() -> &'static DisplayNumberRegistry {
        static GLOBAL: OnceLock<DisplayNumberRegistry> = OnceLock::new();
        GLOBAL.get_or_init(DisplayNumberRegistry::new)
    }

    /// Scan upward from `minimum` and lease the first display number that is
    /// free both in-process and on disk (no live lock file holder).
    pub fn acquire(&self, minimum: u32) -> u32 {
        let mut leased = self.leased.lock().unwrap();
        let mut candidate = minimum;
        loop {
            if !leased.contains(&candidate) && !foreign_lock_holds(candidate) {
                leased.insert(candidate);
                tracing::debug!(display = candidate, "leased display number");
                return candidate;
            }
            candidate += 1;
        }
    }

    /// Release a display number leased by [`acquire`]. Releasing a number
    /// this registry never leased is a no-op, matching the idempotent-stop
    /// property the rest of the supervisor relies on.
    pub fn release(&self, display: u32) {
        if self.leased.lock().unwrap().remove(&display) {
            tracing::debug!(display, "released display number");
        }
    }
}

/// Returns true if `/tmp/.X<display>-lock` exists and names a PID that is
/// still alive. A lock file naming a dead PID is stale and does not block
/// allocation — this is what makes the registry tolerant of a previous
/// supervisor run's crash-leftover lock files.
///
/// Existence and readability are checked separately: a lock file that
/// exists but can't be read (permission denied, for instance) still blocks
/// the display number, since we have no evidence it's stale.
pub fn foreign_lock_holds(display: u32) -> bool {
    let path = format!("/tmp/.X{display}-lock");
    if std::fs::symlink_metadata(&path).is_err() {
        return false;
    }
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(err) => {
            tracing::debug!(display, %path, error = %err, "lock file present but unreadable, treating as held");
            return true;
        }
    };

    let pid: i32 = match contents.trim().parse() {
        Ok(pid) => pid,
        Err(_) => {
            tracing::debug!(display, %path, "lock file present but unparsable, treating as stale");
            return false;
        }
    };

    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(_) => {
            tracing::debug!(display, pid, "lock file names a dead process, ignoring");
            false
        }
    }
}
