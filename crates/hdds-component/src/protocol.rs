// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Component socket wire protocol.
//!
//! Every connection starts with one [`OpenRequest`] frame from the client.
//! Unary requests are answered with a single [`ServerFrame`]. Streaming
//! requests (`pull_messages`, `read`) are answered with `ok` followed by
//! outbound message frames, while the client sends acks
//! ([`PullMessageAck`], [`ReadAck`]) on the same connection.
//!
//! Frames use the length-prefixed JSON format of [`crate::framing`].

use crate::component::{NewMessage, Properties, ReadPayload};
use crate::context::Metadata;
use crate::dispatch::AckProtocol;
use crate::error::{ComponentError, ComponentResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Component service addressed by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    PubSub,
    InputBinding,
    OutputBinding,
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PubSub => write!(f, "pubsub"),
            Self::InputBinding => write!(f, "input binding"),
            Self::OutputBinding => write!(f, "output binding"),
        }
    }
}

/// First frame of every connection.
///
/// `metadata` is the call metadata; `x-component-instance` selects the
/// component instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OpenRequest {
    /// Initialize the instance with its configuration properties.
    #[serde(rename = "init")]
    Init {
        kind: ComponentKind,
        #[serde(default)]
        properties: Properties,
        #[serde(default)]
        metadata: Metadata,
    },

    /// Liveness check.
    #[serde(rename = "ping")]
    Ping {
        kind: ComponentKind,
        #[serde(default)]
        metadata: Metadata,
    },

    /// Pub/sub feature list.
    #[serde(rename = "features")]
    Features {
        #[serde(default)]
        metadata: Metadata,
    },

    /// Publish one message.
    #[serde(rename = "publish")]
    Publish {
        topic: String,
        data: Vec<u8>,
        #[serde(default)]
        properties: HashMap<String, String>,
        #[serde(default)]
        content_type: Option<String>,
        #[serde(default)]
        metadata: Metadata,
    },

    /// Subscribe to a topic; the connection becomes a message stream.
    #[serde(rename = "pull_messages")]
    PullMessages {
        topic: String,
        #[serde(default)]
        properties: HashMap<String, String>,
        #[serde(default)]
        metadata: Metadata,
    },

    /// Start reading an input binding; the connection becomes a payload stream.
    #[serde(rename = "read")]
    Read {
        #[serde(default)]
        metadata: Metadata,
    },

    /// Invoke an output binding operation.
    #[serde(rename = "invoke")]
    Invoke {
        operation: String,
        #[serde(default)]
        data: Vec<u8>,
        #[serde(default)]
        properties: HashMap<String, String>,
        #[serde(default)]
        metadata: Metadata,
    },

    /// Output binding operation list.
    #[serde(rename = "list_operations")]
    ListOperations {
        #[serde(default)]
        metadata: Metadata,
    },
}

impl OpenRequest {
    /// Call metadata carried by the request.
    pub fn metadata(&self) -> &Metadata {
        match self {
            Self::Init { metadata, .. }
            | Self::Ping { metadata, .. }
            | Self::Features { metadata }
            | Self::Publish { metadata, .. }
            | Self::PullMessages { metadata, .. }
            | Self::Read { metadata }
            | Self::Invoke { metadata, .. }
            | Self::ListOperations { metadata } => metadata,
        }
    }

    /// Component service the request is addressed to.
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Init { kind, .. } | Self::Ping { kind, .. } => *kind,
            Self::Features { .. } | Self::Publish { .. } | Self::PullMessages { .. } => {
                ComponentKind::PubSub
            }
            Self::Read { .. } => ComponentKind::InputBinding,
            Self::Invoke { .. } | Self::ListOperations { .. } => ComponentKind::OutputBinding,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Ping { .. } => "ping",
            Self::Features { .. } => "features",
            Self::Publish { .. } => "publish",
            Self::PullMessages { .. } => "pull_messages",
            Self::Read { .. } => "read",
            Self::Invoke { .. } => "invoke",
            Self::ListOperations { .. } => "list_operations",
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::PullMessages { .. } | Self::Read { .. })
    }
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Request accepted (unary success, or stream established).
    #[serde(rename = "ok")]
    Ok,

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(rename = "features")]
    Features { features: Vec<String> },

    #[serde(rename = "operations")]
    Operations { operations: Vec<String> },

    #[serde(rename = "invoke_response")]
    InvokeResponse {
        data: Vec<u8>,
        metadata: HashMap<String, String>,
        content_type: String,
    },

    /// Subscription message awaiting a [`PullMessageAck`].
    #[serde(rename = "pull_message")]
    PullMessage {
        id: String,
        topic: String,
        data: Vec<u8>,
        metadata: HashMap<String, String>,
        content_type: String,
    },

    /// Input binding payload awaiting a [`ReadAck`].
    #[serde(rename = "read_response")]
    ReadResponse {
        message_id: String,
        data: Vec<u8>,
        metadata: HashMap<String, String>,
        content_type: String,
    },
}

impl ServerFrame {
    pub fn error(err: &ComponentError) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }
}

/// Error reported by the consumer in an ack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckErrorWire {
    pub message: String,
}

/// Consumer ack for a `pull_message` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullMessageAck {
    pub ack_message_id: String,
    #[serde(default)]
    pub ack_error: Option<AckErrorWire>,
}

/// Consumer ack for a `read_response` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadAck {
    pub message_id: String,
    #[serde(default)]
    pub response_data: Vec<u8>,
    #[serde(default)]
    pub response_error: Option<AckErrorWire>,
}

/// Pub/sub subscription stream.
pub struct PullProtocol;

impl AckProtocol for PullProtocol {
    type Payload = NewMessage;
    type Outbound = ServerFrame;
    type Ack = PullMessageAck;
    type Output = ();

    fn outbound(message_id: &str, payload: NewMessage) -> ServerFrame {
        ServerFrame::PullMessage {
            id: message_id.to_string(),
            topic: payload.topic,
            data: payload.data,
            metadata: payload.metadata,
            content_type: payload.content_type.unwrap_or_default(),
        }
    }

    fn correlate(ack: PullMessageAck) -> (String, ComponentResult<()>) {
        let result = match ack.ack_error {
            Some(err) => Err(ComponentError::Remote(err.message)),
            None => Ok(()),
        };
        (ack.ack_message_id, result)
    }
}

/// Input binding read stream.
pub struct ReadProtocol;

impl AckProtocol for ReadProtocol {
    type Payload = ReadPayload;
    type Outbound = ServerFrame;
    type Ack = ReadAck;
    type Output = Vec<u8>;

    fn outbound(message_id: &str, payload: ReadPayload) -> ServerFrame {
        ServerFrame::ReadResponse {
            message_id: message_id.to_string(),
            data: payload.data,
            metadata: payload.metadata,
            content_type: payload.content_type.unwrap_or_default(),
        }
    }

    fn correlate(ack: ReadAck) -> (String, ComponentResult<Vec<u8>>) {
        let result = match ack.response_error {
            Some(err) => Err(ComponentError::Remote(err.message)),
            None => Ok(ack.response_data),
        };
        (ack.message_id, result)
    }
}
