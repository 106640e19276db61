// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS Pluggable Component Runtime
//!
//! Serves pub/sub and binding components over Unix sockets, with
//! acknowledged delivery on duplex streams.
//!
//! # Features
//!
//! - **Correlated Acks**: Every pushed message carries a correlation id; the
//!   consumer's ack (or error) is routed back to the exact caller
//! - **Bounded Waits**: Callers give up when their context is cancelled or
//!   its deadline passes; late acks are discarded
//! - **Instance Multiplexing**: One component instance per
//!   `x-component-instance` routing key, built lazily and exactly once
//!
//! # Quick Start
//!
//! ```bash
//! # Serve the bundled components under /tmp/dapr-components-sockets/memory.sock
//! hdds-component --name memory
//!
//! # Custom socket folder and config
//! hdds-component --socket-folder /var/run/components --config component.json
//! ```
//!
//! # Embedding
//!
//! ```no_run
//! use hdds_component::components::MemoryPubSub;
//! use hdds_component::{ComponentConfig, ComponentOptions, ComponentRegistry, PubSub};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> hdds_component::ComponentResult<()> {
//! let mut registry = ComponentRegistry::new();
//! registry.register(
//!     "memory",
//!     ComponentOptions::new().with_pubsub(|| {
//!         Ok(Arc::new(MemoryPubSub::new(Duration::from_secs(30))) as Arc<dyn PubSub>)
//!     }),
//! );
//!
//! let config = ComponentConfig::default().with_env();
//! hdds_component::run(registry, config, CancellationToken::new()).await
//! # }
//! ```

pub mod ack;
pub mod component;
pub mod components;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod framing;
pub mod mux;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod stream;

pub use ack::{AckManager, Registration};
pub use component::{
    InputBinding, InvokeRequest, InvokeResponse, MessageHandler, NewMessage, OutputBinding,
    Properties, PubSub, PublishRequest, ReadHandler, ReadPayload, SubscribeRequest,
};
pub use config::{ComponentConfig, ConfigError};
pub use context::{CallContext, Metadata};
pub use dispatch::{ack_loop, AckProtocol, Dispatcher, Handler};
pub use error::{ComponentError, ComponentResult, TransportError};
pub use mux::{routing_key, InstanceSource, Multiplexer, DEFAULT_INSTANCE_ID, INSTANCE_ID_METADATA};
pub use protocol::{ComponentKind, OpenRequest, PullProtocol, ReadProtocol, ServerFrame};
pub use registry::{ComponentOptions, ComponentRegistry};
pub use server::{run, ComponentServer};
pub use stream::{channel_pair, CorrelatedStream, StreamReceiver, StreamSender};
