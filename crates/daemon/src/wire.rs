// SPDX-License-Identifier: MIT

//! Wire format for the CLI <-> daemon IPC protocol (§6 "wire contract").
//!
//! Wire format: 4-byte big-endian length prefix + JSON payload, mirroring
//! the reference workspace's own daemon framing.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
    #[error("connection closed")]
    ConnectionClosed,
    #[error("timeout waiting for the daemon")]
    Timeout,
}

/// Maximum message size (64 MB — comfortably above a `results` payload).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Default request/response timeout.
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: json.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(json)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

async fn read_message<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn write_message<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    writer.write_all(&(data.len() as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a value with a timeout, used by both ends of the connection.
pub async fn read_framed<T: DeserializeOwned, R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<T, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

/// Write a value with a timeout.
pub async fn write_framed<T: Serialize, W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    value: &T,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError> {
    let data = encode(value)?;
    tokio::time::timeout(timeout, write_message(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, serde::Deserialize, PartialEq)]
    struct Ping {
        n: u32,
    }

    #[tokio::test]
    async fn round_trips_through_an_in_memory_duplex() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        write_framed(&mut client, &Ping { n: 7 }, DEFAULT_TIMEOUT)
            .await
            .unwrap();
        let received: Ping = read_framed(&mut server, DEFAULT_TIMEOUT).await.unwrap();
        assert_eq!(received, Ping { n: 7 });
    }

    #[tokio::test]
    async fn reading_from_a_closed_connection_reports_connection_closed() {
        let (client, mut server) = tokio::io::duplex(4096);
        drop(client);
        let err = read_message(&mut server).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
    }
}
