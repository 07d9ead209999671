//! Master PID file.
//!
//! Holds the running master's PID; an empty or missing file means no master is
//! running. `stop` reads it, the master writes it on start and clears it on exit.

use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_FILE_NAME: &str = "rex-proxy.pid";

pub fn default_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_FILE_NAME)
}

pub fn write(path: &Path, pid: u32) -> io::Result<()> {
    std::fs::write(path, pid.to_string())
}

/// Recorded PID, if any.
pub fn read(path: &Path) -> io::Result<Option<u32>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content.trim().parse().ok()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Truncate to empty.
pub fn clear(path: &Path) -> io::Result<()> {
    match std::fs::write(path, "") {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
