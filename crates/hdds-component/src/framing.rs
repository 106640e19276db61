// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefixed JSON framing over byte streams.
//!
//! Wire format:
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | JSON payload      |
//! +----------------+-------------------+
//! ```

use crate::error::TransportError;
use crate::stream::{StreamReceiver, StreamSender};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::trace;

/// Writes JSON frames to the inner writer.
pub struct FramedSender<W> {
    inner: W,
    max_message_size: usize,
}

/// Reads JSON frames from the inner reader.
pub struct FramedReceiver<R> {
    inner: R,
    max_message_size: usize,
    read_buffer: Vec<u8>,
}

/// Split a Unix socket into framed halves.
pub fn split_unix(
    stream: UnixStream,
    max_message_size: usize,
) -> (FramedSender<OwnedWriteHalf>, FramedReceiver<OwnedReadHalf>) {
    let (read_half, write_half) = stream.into_split();
    (
        FramedSender::new(write_half, max_message_size),
        FramedReceiver::new(read_half, max_message_size),
    )
}

impl<W> FramedSender<W> {
    pub fn new(inner: W, max_message_size: usize) -> Self {
        Self {
            inner,
            max_message_size,
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> FramedSender<W> {
    /// Serialize and write one frame.
    pub async fn write_frame<T: Serialize>(&mut self, msg: &T) -> Result<(), TransportError> {
        let json = serde_json::to_vec(msg)
            .map_err(|e| TransportError::Protocol(format!("Serialize error: {}", e)))?;
        self.write_bytes(&json).await
    }

    async fn write_bytes(&mut self, json: &[u8]) -> Result<(), TransportError> {
        if json.len() > self.max_message_size {
            return Err(TransportError::Protocol(format!(
                "Message too large: {} > {}",
                json.len(),
                self.max_message_size
            )));
        }

        let len = u32::try_from(json.len()).map_err(|_| {
            TransportError::Protocol(format!("Message too large: {} bytes", json.len()))
        })?;
        self.inner.write_all(&len.to_be_bytes()).await?;
        self.inner.write_all(json).await?;
        self.inner.flush().await?;

        trace!(len = json.len(), "wrote frame");
        Ok(())
    }

    /// Close the write direction; the peer reads end of stream.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

impl<R> FramedReceiver<R> {
    pub fn new(inner: R, max_message_size: usize) -> Self {
        Self {
            inner,
            max_message_size,
            read_buffer: Vec::with_capacity(4096),
        }
    }
}

impl<R: AsyncRead + Unpin + Send> FramedReceiver<R> {
    /// Read and deserialize one frame.
    ///
    /// Returns `Ok(None)` if the peer closed the stream at a frame boundary.
    /// A close inside the length header is a protocol error.
    pub async fn read_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            let n = self.inner.read(&mut len_buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(TransportError::Protocol(format!(
                    "Truncated frame header: {} of 4 bytes",
                    filled
                )));
            }
            filled += n;
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len == 0 {
            return Err(TransportError::Protocol("Empty message".into()));
        }
        if len > self.max_message_size {
            return Err(TransportError::Protocol(format!(
                "Message too large: {} > {}",
                len, self.max_message_size
            )));
        }

        self.read_buffer.clear();
        self.read_buffer.resize(len, 0);
        self.inner.read_exact(&mut self.read_buffer).await?;

        trace!(len, "read frame");
        let msg = serde_json::from_slice(&self.read_buffer)
            .map_err(|e| TransportError::Protocol(format!("Invalid JSON: {}", e)))?;
        Ok(Some(msg))
    }
}

#[async_trait]
impl<T, W> StreamSender<T> for FramedSender<W>
where
    T: Serialize + Send + 'static,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: T) -> Result<(), TransportError> {
        let json = serde_json::to_vec(&message)
            .map_err(|e| TransportError::Protocol(format!("Serialize error: {}", e)))?;
        self.write_bytes(&json).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.shutdown().await
    }
}

#[async_trait]
impl<T, R> StreamReceiver<T> for FramedReceiver<R>
where
    T: DeserializeOwned + Send + 'static,
    R: AsyncRead + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Option<T>, TransportError> {
        self.read_frame().await
    }
}
