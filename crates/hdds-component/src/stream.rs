// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Duplex stream abstraction and its correlated (per-direction locked) wrapper.
//!
//! A raw duplex stream tolerates at most one concurrent call per direction.
//! [`CorrelatedStream`] guards each half with its own lock so that many
//! dispatchers can share the send side while a single ack loop drains the
//! receive side, without sends and receives serializing on each other.

use crate::error::TransportError;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

/// Send half of a duplex stream.
#[async_trait]
pub trait StreamSender<T: Send + 'static>: Send {
    async fn send(&mut self, message: T) -> Result<(), TransportError>;

    /// Close the send direction; the peer sees end of stream.
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Receive half of a duplex stream.
///
/// `Ok(None)` signals a clean end of stream.
#[async_trait]
pub trait StreamReceiver<T: Send + 'static>: Send {
    async fn recv(&mut self) -> Result<Option<T>, TransportError>;
}

/// Duplex stream safe for concurrent senders and a concurrent receiver.
pub struct CorrelatedStream<S, R> {
    sender: Mutex<S>,
    receiver: Mutex<R>,
}

impl<S, R> CorrelatedStream<S, R> {
    pub fn new(sender: S, receiver: R) -> Self {
        Self {
            sender: Mutex::new(sender),
            receiver: Mutex::new(receiver),
        }
    }

    /// Send one message; the transport error is returned unchanged.
    pub async fn send<T>(&self, message: T) -> Result<(), TransportError>
    where
        S: StreamSender<T>,
        T: Send + 'static,
    {
        let mut sender = self.sender.lock().await;
        sender.send(message).await
    }

    /// Close the send side. Sends after this fail.
    pub async fn close<T>(&self) -> Result<(), TransportError>
    where
        S: StreamSender<T>,
        T: Send + 'static,
    {
        let mut sender = self.sender.lock().await;
        sender.close().await
    }

    /// Receive one message; `Ok(None)` at end of stream.
    pub async fn recv<T>(&self) -> Result<Option<T>, TransportError>
    where
        R: StreamReceiver<T>,
        T: Send + 'static,
    {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }
}

/// In-memory send half backed by a tokio channel.
pub struct ChannelSender<T> {
    tx: mpsc::Sender<T>,
}

/// In-memory receive half backed by a tokio channel.
pub struct ChannelReceiver<T> {
    rx: mpsc::Receiver<T>,
}

#[async_trait]
impl<T: Send + 'static> StreamSender<T> for ChannelSender<T> {
    async fn send(&mut self, message: T) -> Result<(), TransportError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl<T: Send + 'static> StreamReceiver<T> for ChannelReceiver<T> {
    async fn recv(&mut self) -> Result<Option<T>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

/// Both ends of an in-memory duplex stream.
///
/// The first end sends `A` and receives `B`; the second end is its mirror.
/// Dropping a sender ends the stream for the opposite receiver.
#[allow(clippy::type_complexity)]
pub fn channel_pair<A, B>(
    capacity: usize,
) -> (
    (ChannelSender<A>, ChannelReceiver<B>),
    (ChannelSender<B>, ChannelReceiver<A>),
) {
    let (a_tx, a_rx) = mpsc::channel(capacity);
    let (b_tx, b_rx) = mpsc::channel(capacity);
    (
        (ChannelSender { tx: a_tx }, ChannelReceiver { rx: b_rx }),
        (ChannelSender { tx: b_tx }, ChannelReceiver { rx: a_rx }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_channel_pair_roundtrip() {
        let ((mut left_tx, mut left_rx), (mut right_tx, mut right_rx)) =
            channel_pair::<u32, String>(4);

        left_tx.send(7).await.unwrap();
        assert_eq!(right_rx.recv().await.unwrap(), Some(7));

        right_tx.send("ack".to_string()).await.unwrap();
        assert_eq!(left_rx.recv().await.unwrap(), Some("ack".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_sender_is_end_of_stream() {
        let ((left_tx, _left_rx), (_right_tx, mut right_rx)) = channel_pair::<u32, u32>(1);
        drop(left_tx);
        assert_eq!(right_rx.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_send_to_dropped_receiver_fails() {
        let ((mut left_tx, _left_rx), (_right_tx, right_rx)) = channel_pair::<u32, u32>(1);
        drop(right_rx);
        assert!(matches!(
            left_tx.send(1).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_send_proceeds_while_receive_is_blocked() {
        let ((left_tx, left_rx), (_right_tx, mut right_rx)) = channel_pair::<u32, u32>(4);
        let stream = Arc::new(CorrelatedStream::new(left_tx, left_rx));

        // Parks on the receive lock with nothing to read.
        let receiving = stream.clone();
        let pending_recv = tokio::spawn(async move { receiving.recv::<u32>().await });
        tokio::task::yield_now().await;

        tokio::time::timeout(Duration::from_secs(1), stream.send(1u32))
            .await
            .expect("send must not wait for the receive lock")
            .unwrap();
        assert_eq!(right_rx.recv().await.unwrap(), Some(1));

        pending_recv.abort();
    }

    #[tokio::test]
    async fn test_concurrent_sends_are_all_delivered() {
        let ((left_tx, left_rx), (_right_tx, mut right_rx)) = channel_pair::<u32, u32>(64);
        let stream = Arc::new(CorrelatedStream::new(left_tx, left_rx));

        let mut handles = Vec::new();
        for i in 0..16u32 {
            let stream = stream.clone();
            handles.push(tokio::spawn(async move { stream.send(i).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut received = Vec::new();
        for _ in 0..16 {
            received.push(right_rx.recv().await.unwrap().unwrap());
        }
        received.sort_unstable();
        assert_eq!(received, (0..16).collect::<Vec<_>>());
    }
}
