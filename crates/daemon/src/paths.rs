// SPDX-License-Identifier: MIT

//! Daemon process paths: state directory layout, independent of the
//! workspace-per-project layout `scaorch-engine::workspace` owns.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathsError {
    #[error("could not determine a state directory (set SCAORCH_STATE_DIR or HOME)")]
    NoStateDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fixed paths under the daemon's state directory (one daemon per user,
/// mirroring the reference workspace's single user-level daemon).
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub log_path: PathBuf,
    pub wal_path: PathBuf,
}

impl DaemonPaths {
    pub fn load() -> Result<Self, PathsError> {
        let state_dir = crate::env::state_dir()?;
        Ok(Self {
            socket_path: state_dir.join("daemon.sock"),
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            wal_path: state_dir.join("events.wal"),
            state_dir,
        })
    }

    pub fn ensure_dirs(&self) -> Result<(), PathsError> {
        std::fs::create_dir_all(&self.state_dir)?;
        Ok(())
    }
}
