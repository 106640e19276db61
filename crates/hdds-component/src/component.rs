// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Component traits and the request types they exchange with the server.

use crate::context::CallContext;
use crate::dispatch::Handler;
use crate::error::{ComponentError, ComponentResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Component configuration properties passed to `init`.
pub type Properties = HashMap<String, String>;

/// A message delivered to a subscriber.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub topic: String,
    pub data: Vec<u8>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Data produced by an input binding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadPayload {
    pub data: Vec<u8>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub topic: String,
    pub data: Vec<u8>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub topic: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub operation: String,
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub data: Vec<u8>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Handler a pub/sub component calls for each message of a subscription.
pub type MessageHandler = Handler<NewMessage, ()>;

/// Handler an input binding calls for each payload; resolves to the response data.
pub type ReadHandler = Handler<ReadPayload, Vec<u8>>;

/// Publish/subscribe component.
#[async_trait]
pub trait PubSub: Send + Sync {
    async fn init(&self, properties: Properties) -> ComponentResult<()>;

    /// Optional features this component supports.
    fn features(&self) -> Vec<String> {
        Vec::new()
    }

    async fn ping(&self) -> ComponentResult<()> {
        Ok(())
    }

    async fn publish(&self, ctx: &CallContext, request: PublishRequest) -> ComponentResult<()>;

    /// Start delivering messages of `request.topic` through `handler`.
    ///
    /// Returns once the subscription is set up. Delivery stops when `ctx` is
    /// done.
    async fn subscribe(
        &self,
        ctx: CallContext,
        request: SubscribeRequest,
        handler: MessageHandler,
    ) -> ComponentResult<()>;
}

/// Input binding: pushes external events to the consumer.
#[async_trait]
pub trait InputBinding: Send + Sync {
    async fn init(&self, properties: Properties) -> ComponentResult<()>;

    async fn ping(&self) -> ComponentResult<()> {
        Ok(())
    }

    /// Start producing payloads through `handler` until `ctx` is done.
    async fn read(&self, ctx: CallContext, handler: ReadHandler) -> ComponentResult<()>;
}

/// Output binding: performs operations on request.
#[async_trait]
pub trait OutputBinding: Send + Sync {
    async fn init(&self, properties: Properties) -> ComponentResult<()>;

    async fn ping(&self) -> ComponentResult<()> {
        Ok(())
    }

    async fn invoke(&self, ctx: &CallContext, request: InvokeRequest) -> ComponentResult<InvokeResponse>;

    fn operations(&self) -> Vec<String>;
}

impl InvokeRequest {
    /// Fail with `Unsupported` unless `operation` is one of `supported`.
    pub fn check_operation(&self, supported: &[String]) -> ComponentResult<()> {
        if supported.iter().any(|op| op == &self.operation) {
            Ok(())
        } else {
            Err(ComponentError::Unsupported(format!(
                "operation '{}'",
                self.operation
            )))
        }
    }
}
