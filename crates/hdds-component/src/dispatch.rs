// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dispatch handler and ack loop.
//!
//! A [`Dispatcher`] turns a payload into a wire message carrying a fresh
//! correlation id, sends it over the shared [`CorrelatedStream`] and waits for
//! the matching acknowledgement. The ack loop is the single reader of the
//! stream: it decodes each ack and routes it to the waiting dispatcher through
//! the [`AckManager`].
//!
//! ```text
//! dispatch(ctx, payload)                 ack_loop(token)
//!   register() -> id                       loop {
//!   send(outbound(id, payload))              recv() -> ack
//!   select! {                                correlate(ack) -> (id, result)
//!     result = registration.recv()           resolve(id, result)
//!     _ = ctx.done() -> AckTimeout         }
//!   }
//! ```

use crate::ack::AckManager;
use crate::context::CallContext;
use crate::error::{ComponentError, ComponentResult};
use crate::stream::{CorrelatedStream, StreamReceiver, StreamSender};
use futures::future::BoxFuture;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Binds a payload type to its outbound frame and its acknowledgement frame.
pub trait AckProtocol: Send + Sync + 'static {
    /// What the component hands to the dispatcher.
    type Payload: Send + 'static;
    /// Frame sent to the consumer.
    type Outbound: Send + 'static;
    /// Frame the consumer sends back.
    type Ack: Send + 'static;
    /// Value returned to the component on a successful ack.
    type Output: Send + 'static;

    /// Embed the correlation id into the outbound frame.
    fn outbound(message_id: &str, payload: Self::Payload) -> Self::Outbound;

    /// Extract the correlation id and the decoded result from an ack.
    fn correlate(ack: Self::Ack) -> (String, ComponentResult<Self::Output>);
}

/// Callback through which a component pushes payloads to the consumer.
pub type Handler<P, O> =
    Arc<dyn Fn(CallContext, P) -> BoxFuture<'static, ComponentResult<O>> + Send + Sync>;

/// Sends payloads over a correlated stream and awaits their acks.
pub struct Dispatcher<P: AckProtocol, S, R> {
    stream: Arc<CorrelatedStream<S, R>>,
    acks: Arc<AckManager<ComponentResult<P::Output>>>,
    _protocol: PhantomData<fn() -> P>,
}

impl<P: AckProtocol, S, R> Clone for Dispatcher<P, S, R> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
            acks: self.acks.clone(),
            _protocol: PhantomData,
        }
    }
}

impl<P, S, R> Dispatcher<P, S, R>
where
    P: AckProtocol,
    S: StreamSender<P::Outbound> + 'static,
    R: StreamReceiver<P::Ack> + 'static,
{
    pub fn new(
        stream: Arc<CorrelatedStream<S, R>>,
        acks: Arc<AckManager<ComponentResult<P::Output>>>,
    ) -> Self {
        Self {
            stream,
            acks,
            _protocol: PhantomData,
        }
    }

    pub fn stream(&self) -> &Arc<CorrelatedStream<S, R>> {
        &self.stream
    }

    /// Number of messages awaiting an ack.
    pub fn pending(&self) -> usize {
        self.acks.len()
    }

    /// Send one payload and wait for its acknowledgement.
    ///
    /// Returns the consumer's result, [`ComponentError::AckTimeout`] when `ctx`
    /// ends first, or [`ComponentError::SendFailed`] when the send itself
    /// fails. The pending entry is gone once this returns.
    pub async fn dispatch(&self, ctx: &CallContext, payload: P::Payload) -> ComponentResult<P::Output> {
        let mut registration = self.acks.register();
        let message_id = registration.id().to_string();

        let outbound = P::outbound(&message_id, payload);
        if let Err(source) = self.stream.send(outbound).await {
            debug!(message_id = %message_id, error = %source, "send failed");
            return Err(ComponentError::SendFailed { message_id, source });
        }
        trace!(message_id = %message_id, "message sent, awaiting ack");

        tokio::select! {
            biased;
            result = registration.recv() => match result {
                Some(result) => result,
                None => Err(ComponentError::AckChannelClosed(message_id)),
            },
            _ = ctx.done() => {
                debug!(message_id = %message_id, "ack wait abandoned");
                Err(ComponentError::AckTimeout)
            }
        }
    }

    /// Wrap this dispatcher as a component handler.
    pub fn handler(&self) -> Handler<P::Payload, P::Output> {
        let dispatcher = self.clone();
        Arc::new(move |ctx: CallContext, payload: P::Payload| {
            let dispatcher = dispatcher.clone();
            let call: BoxFuture<'static, ComponentResult<P::Output>> =
                Box::pin(async move { dispatcher.dispatch(&ctx, payload).await });
            call
        })
    }

    /// Run the ack loop for this dispatcher's stream.
    pub async fn ack_loop(&self, token: CancellationToken) -> ComponentResult<()> {
        ack_loop::<P, S, R>(token, &self.stream, &self.acks).await
    }
}

/// Drain acks from `stream` and resolve them until the stream ends.
///
/// Returns `Ok(())` at end of stream, [`ComponentError::Cancelled`] when
/// `token` fires and the transport error when a receive fails. Acks for
/// unknown ids are logged and skipped.
pub async fn ack_loop<P, S, R>(
    token: CancellationToken,
    stream: &CorrelatedStream<S, R>,
    acks: &AckManager<ComponentResult<P::Output>>,
) -> ComponentResult<()>
where
    P: AckProtocol,
    R: StreamReceiver<P::Ack>,
{
    loop {
        if token.is_cancelled() {
            return Err(ComponentError::Cancelled);
        }

        let received = tokio::select! {
            _ = token.cancelled() => return Err(ComponentError::Cancelled),
            received = stream.recv::<P::Ack>() => received,
        };

        let ack = match received {
            Ok(Some(ack)) => ack,
            Ok(None) => {
                debug!("ack stream ended");
                return Ok(());
            }
            Err(e) => {
                warn!("ack stream receive failed: {}", e);
                return Err(e.into());
            }
        };

        let (message_id, result) = P::correlate(ack);
        trace!(message_id = %message_id, ok = result.is_ok(), "ack received");
        if let Err(e) = acks.resolve(&message_id, result).await {
            warn!("{}", e);
        }
    }
}
