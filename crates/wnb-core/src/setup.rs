//! One-time provisioning of the on-disk layout (`data/`, `data/logs`).
//!
//! Idempotency is tracked by a marker file, and the provisioning step itself is
//! guarded by a lock file created with `create_new`, so two processes started at
//! the same time cannot both run it.

use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tracing::{debug, info, warn};

use crate::{errors::Error, Result};

pub const MARKER_FILE: &str = ".setup-complete";
pub const LOCK_FILE: &str = ".setup.lock";

const STALE_LOCK_AGE: Duration = Duration::from_secs(60);
const WAIT_STEP: Duration = Duration::from_millis(100);
const MAX_WAIT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupOutcome {
    /// This call created the layout and wrote the marker.
    Provisioned,
    /// The marker was already present (or another process finished first).
    AlreadyProvisioned,
}

/// Paths managed by the setup guard.
#[derive(Clone, Debug)]
pub struct Layout {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Layout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            log_dir: data_dir.join("logs"),
            data_dir,
        }
    }

    pub fn marker(&self) -> PathBuf {
        self.data_dir.join(MARKER_FILE)
    }

    fn lock(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE)
    }
}

/// Provision `data_dir` once. Safe to call from concurrent processes.
pub fn ensure_layout(data_dir: &Path) -> Result<SetupOutcome> {
    let layout = Layout::new(data_dir);
    if layout.marker().is_file() {
        debug!(marker = %layout.marker().display(), "setup marker present");
        return Ok(SetupOutcome::AlreadyProvisioned);
    }

    fs::create_dir_all(&layout.data_dir)?;

    let waited_from = SystemTime::now();
    loop {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(layout.lock())
        {
            Ok(mut lock) => {
                if let Err(e) = writeln!(lock, "{}", std::process::id()) {
                    debug!("cannot record pid in setup lock: {e}");
                }
                let res = provision(&layout);
                if let Err(e) = fs::remove_file(layout.lock()) {
                    warn!(lock = %layout.lock().display(), "cannot remove setup lock: {e}");
                }
                return res;
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if layout.marker().is_file() {
                    return Ok(SetupOutcome::AlreadyProvisioned);
                }
                if lock_is_stale(&layout.lock()) {
                    warn!(lock = %layout.lock().display(), "removing stale setup lock");
                    match fs::remove_file(layout.lock()) {
                        // NotFound: another waiter reclaimed it first.
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(Error::Io(e)),
                    }
                    // Retry `create_new`; AlreadyExists means someone else won.
                    continue;
                }
                let waited = waited_from.elapsed().unwrap_or_default();
                if waited > MAX_WAIT {
                    return Err(Error::Config(format!(
                        "timed out waiting for setup lock {}",
                        layout.lock().display()
                    )));
                }
                std::thread::sleep(WAIT_STEP);
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
}

fn provision(layout: &Layout) -> Result<SetupOutcome> {
    // Re-check under the lock: the previous holder may have just finished.
    if layout.marker().is_file() {
        return Ok(SetupOutcome::AlreadyProvisioned);
    }

    fs::create_dir_all(&layout.log_dir)?;

    // The marker itself is created with `create_new`, so exactly one caller
    // reports `Provisioned` even if two ever hold the lock at once.
    let mut marker = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(layout.marker())
    {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Ok(SetupOutcome::AlreadyProvisioned)
        }
        Err(e) => return Err(Error::Io(e)),
    };
    writeln!(marker, "{}", chrono::Utc::now().to_rfc3339())?;

    info!(data_dir = %layout.data_dir.display(), "provisioned data layout");
    Ok(SetupOutcome::Provisioned)
}

fn lock_is_stale(lock: &Path) -> bool {
    let Ok(md) = fs::metadata(lock) else {
        return false;
    };
    let Ok(modified) = md.modified() else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > STALE_LOCK_AGE)
        .unwrap_or(false)
}
