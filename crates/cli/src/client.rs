// SPDX-License-Identifier: MIT

//! Thin client for the `scaorch` CLI -> `scaorchd` daemon IPC boundary,
//! talking the `wire`/`protocol` contract `scaorch-daemon` defines.

use scaorch_daemon::protocol::{Request, Response};
use scaorch_daemon::wire::{self, ProtocolError};
use scaorch_daemon::{DaemonPaths, PathsError};
use std::path::PathBuf;
use thiserror::Error;
use tokio::net::UnixStream;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("scaorchd is not running (no socket at {0}); start it with `scaorchd &`")]
    DaemonNotRunning(PathBuf),
    #[error("could not resolve daemon state directory: {0}")]
    Paths(#[from] PathsError),
    #[error("protocol error talking to scaorchd: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("unexpected response from scaorchd")]
    UnexpectedResponse,
}

pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Connect to the daemon's Unix socket. Unlike the auto-starting
    /// client this is modeled on, `scaorchd` is operator-managed (§6's
    /// CLI surface assumes a running daemon), so a missing socket is a
    /// plain error rather than a trigger to spawn one.
    pub fn connect() -> Result<Self, ClientError> {
        let paths = DaemonPaths::load()?;
        if !paths.socket_path.exists() {
            return Err(ClientError::DaemonNotRunning(paths.socket_path));
        }
        Ok(Self {
            socket_path: paths.socket_path,
        })
    }

    pub async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        let mut stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            ClientError::Protocol(ProtocolError::Io(e))
        })?;
        wire::write_framed(&mut stream, request, wire::DEFAULT_TIMEOUT).await?;
        let response = wire::read_framed(&mut stream, wire::DEFAULT_TIMEOUT).await?;
        Ok(response)
    }
}
