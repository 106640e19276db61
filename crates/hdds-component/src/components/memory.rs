// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process pub/sub.
//!
//! `publish` hands the message to every live subscriber of the topic and
//! waits for all acks; any nack fails the publish.

use crate::component::{MessageHandler, NewMessage, Properties, PubSub, PublishRequest, SubscribeRequest};
use crate::context::CallContext;
use crate::error::{ComponentError, ComponentResult};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone)]
struct Subscriber {
    id: u64,
    ctx: CallContext,
    handler: MessageHandler,
}

pub struct MemoryPubSub {
    topics: Arc<DashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
    dispatch_timeout: Duration,
}

impl MemoryPubSub {
    /// `dispatch_timeout` bounds how long a publish waits for each subscriber's ack.
    pub fn new(dispatch_timeout: Duration) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            dispatch_timeout,
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PubSub for MemoryPubSub {
    async fn init(&self, properties: Properties) -> ComponentResult<()> {
        debug!("memory pubsub initialized with {} properties", properties.len());
        Ok(())
    }

    async fn publish(&self, ctx: &CallContext, request: PublishRequest) -> ComponentResult<()> {
        let subscribers = self
            .topics
            .get(&request.topic)
            .map(|s| s.value().clone())
            .unwrap_or_default();
        if subscribers.is_empty() {
            debug!("no subscribers for topic {}", request.topic);
            return Ok(());
        }

        let deliveries = subscribers.iter().map(|subscriber| {
            let mut call_ctx = subscriber.ctx.child().with_timeout(self.dispatch_timeout);
            if let Some(deadline) = ctx.deadline() {
                call_ctx = call_ctx.with_deadline(deadline);
            }
            let message = NewMessage {
                topic: request.topic.clone(),
                data: request.data.clone(),
                metadata: request.metadata.clone(),
                content_type: request.content_type.clone(),
            };
            (subscriber.handler)(call_ctx, message)
        });

        let failures: Vec<String> = join_all(deliveries)
            .await
            .into_iter()
            .filter_map(|result| result.err())
            .map(|e| e.to_string())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            warn!(
                "{} of {} subscribers rejected message on {}",
                failures.len(),
                subscribers.len(),
                request.topic
            );
            Err(ComponentError::component(failures.join("; ")))
        }
    }

    async fn subscribe(
        &self,
        ctx: CallContext,
        request: SubscribeRequest,
        handler: MessageHandler,
    ) -> ComponentResult<()> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let topic = request.topic;

        self.topics.entry(topic.clone()).or_default().push(Subscriber {
            id,
            ctx: ctx.clone(),
            handler,
        });
        info!("subscriber {} added to topic {}", id, topic);

        let topics = self.topics.clone();
        tokio::spawn(async move {
            ctx.done().await;
            if let Some(mut subscribers) = topics.get_mut(&topic) {
                subscribers.retain(|s| s.id != id);
            }
            topics.remove_if(&topic, |_, subscribers| subscribers.is_empty());
            info!("subscriber {} removed from topic {}", id, topic);
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn recording_handler(fail_with: Option<&'static str>) -> (MessageHandler, mpsc::UnboundedReceiver<NewMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: MessageHandler = Arc::new(move |_ctx: CallContext, message: NewMessage| {
            let tx = tx.clone();
            let delivery: futures::future::BoxFuture<'static, ComponentResult<()>> = Box::pin(async move {
                tx.send(message).ok();
                match fail_with {
                    Some(reason) => Err(ComponentError::Remote(reason.to_string())),
                    None => Ok(()),
                }
            });
            delivery
        });
        (handler, rx)
    }

    fn subscription(topic: &str) -> SubscribeRequest {
        SubscribeRequest {
            topic: topic.into(),
            ..Default::default()
        }
    }

    fn message(topic: &str, data: &[u8]) -> PublishRequest {
        PublishRequest {
            topic: topic.into(),
            data: data.to_vec(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let pubsub = MemoryPubSub::new(Duration::from_secs(1));
        pubsub
            .publish(&CallContext::new(), message("orders", b"x"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let pubsub = MemoryPubSub::new(Duration::from_secs(1));
        let (first, mut first_rx) = recording_handler(None);
        let (second, mut second_rx) = recording_handler(None);

        pubsub
            .subscribe(CallContext::new(), subscription("orders"), first)
            .await
            .unwrap();
        pubsub
            .subscribe(CallContext::new(), subscription("orders"), second)
            .await
            .unwrap();
        assert_eq!(pubsub.subscriber_count("orders"), 2);

        pubsub
            .publish(&CallContext::new(), message("orders", b"hello"))
            .await
            .unwrap();
        assert_eq!(first_rx.recv().await.unwrap().data, b"hello");
        assert_eq!(second_rx.recv().await.unwrap().data, b"hello");
    }

    #[tokio::test]
    async fn test_nack_fails_publish() {
        let pubsub = MemoryPubSub::new(Duration::from_secs(1));
        let (handler, _rx) = recording_handler(Some("boom"));
        pubsub
            .subscribe(CallContext::new(), subscription("orders"), handler)
            .await
            .unwrap();

        let err = pubsub
            .publish(&CallContext::new(), message("orders", b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_cancelled_subscription_is_removed() {
        let pubsub = MemoryPubSub::new(Duration::from_secs(1));
        let (handler, _rx) = recording_handler(None);
        let ctx = CallContext::new();
        pubsub
            .subscribe(ctx.clone(), subscription("orders"), handler)
            .await
            .unwrap();
        assert_eq!(pubsub.subscriber_count("orders"), 1);

        ctx.cancel();
        for _ in 0..100 {
            if pubsub.subscriber_count("orders") == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(pubsub.subscriber_count("orders"), 0);
    }
}
