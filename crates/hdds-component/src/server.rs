// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Component socket server.
//!
//! One [`ComponentServer`] per registered component, listening on
//! `<socket_folder>/<name>.sock`. Each connection carries one request:
//! unary requests get a single reply frame; `pull_messages` and `read` turn
//! the connection into an acknowledged message stream served by a
//! [`Dispatcher`] and its ack loop.

use crate::ack::AckManager;
use crate::component::{
    InputBinding, InvokeRequest, OutputBinding, PubSub, PublishRequest, SubscribeRequest,
};
use crate::config::ComponentConfig;
use crate::context::CallContext;
use crate::dispatch::{AckProtocol, Dispatcher, Handler};
use crate::error::{ComponentError, ComponentResult};
use crate::framing::{split_unix, FramedReceiver, FramedSender};
use crate::mux::InstanceSource;
use crate::protocol::{ComponentKind, OpenRequest, PullProtocol, ReadProtocol, ServerFrame};
use crate::registry::{ComponentOptions, ComponentRegistry};
use crate::stream::CorrelatedStream;
use futures::future::BoxFuture;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type SocketStream = CorrelatedStream<FramedSender<OwnedWriteHalf>, FramedReceiver<OwnedReadHalf>>;

/// Instance sources for the services a component offers.
struct Services {
    pubsub: Option<InstanceSource<dyn PubSub>>,
    input_binding: Option<InstanceSource<dyn InputBinding>>,
    output_binding: Option<InstanceSource<dyn OutputBinding>>,
}

impl Services {
    fn new(options: ComponentOptions) -> Self {
        Self {
            pubsub: options.pubsub.map(InstanceSource::new),
            input_binding: options.input_binding.map(InstanceSource::new),
            output_binding: options.output_binding.map(InstanceSource::new),
        }
    }

    fn pubsub(&self) -> ComponentResult<&InstanceSource<dyn PubSub>> {
        self.pubsub
            .as_ref()
            .ok_or_else(|| ComponentError::Unsupported(ComponentKind::PubSub.to_string()))
    }

    fn input_binding(&self) -> ComponentResult<&InstanceSource<dyn InputBinding>> {
        self.input_binding
            .as_ref()
            .ok_or_else(|| ComponentError::Unsupported(ComponentKind::InputBinding.to_string()))
    }

    fn output_binding(&self) -> ComponentResult<&InstanceSource<dyn OutputBinding>> {
        self.output_binding
            .as_ref()
            .ok_or_else(|| ComponentError::Unsupported(ComponentKind::OutputBinding.to_string()))
    }
}

/// Serves one named component over a Unix socket.
#[derive(Clone)]
pub struct ComponentServer {
    name: Arc<str>,
    config: Arc<ComponentConfig>,
    services: Arc<Services>,
    shutdown: CancellationToken,
    running: Arc<AtomicBool>,
}

impl ComponentServer {
    /// Create a server for `options` registered under `name`.
    pub fn new(
        name: impl Into<String>,
        options: ComponentOptions,
        config: ComponentConfig,
    ) -> ComponentResult<Self> {
        config.validate()?;
        options.validate()?;

        Ok(Self {
            name: Arc::from(name.into()),
            config: Arc::new(config),
            services: Arc::new(Services::new(options)),
            shutdown: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Stop when `token` is cancelled, in addition to [`Self::shutdown`].
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn socket_path(&self) -> PathBuf {
        self.config.socket_path(&self.name)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Accept connections until shutdown.
    pub async fn run(&self) -> ComponentResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ComponentError::AlreadyRunning);
        }

        let result = self.serve().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn serve(&self) -> ComponentResult<()> {
        let socket = self.socket_path();
        tokio::fs::create_dir_all(&self.config.socket_folder).await?;
        match tokio::fs::remove_file(&socket).await {
            Ok(()) => debug!("Removed stale socket {:?}", socket),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(&socket)?;
        info!("Component '{}' using socket {:?}", self.name, socket);

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            debug!("New connection on {}", self.name);

                            let name = self.name.clone();
                            let services = self.services.clone();
                            let config = self.config.clone();
                            let shutdown = self.shutdown.child_token();

                            connections.spawn(async move {
                                if let Err(e) = Self::handle_connection(
                                    stream,
                                    services,
                                    config,
                                    shutdown,
                                ).await {
                                    warn!("Connection error on {}: {}", name, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection task failed: {}", e);
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("Component '{}' shutting down", self.name);
                    break;
                }
            }
        }

        drop(listener);
        debug!("Draining {} connections on {}", connections.len(), self.name);
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                error!("Connection task failed: {}", e);
            }
        }
        if let Err(e) = tokio::fs::remove_file(&socket).await {
            debug!("Failed to remove socket {:?}: {}", socket, e);
        }
        Ok(())
    }

    /// Signal the server and its connections to stop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn handle_connection(
        stream: UnixStream,
        services: Arc<Services>,
        config: Arc<ComponentConfig>,
        shutdown: CancellationToken,
    ) -> ComponentResult<()> {
        let (mut tx, mut rx) = split_unix(stream, config.max_message_size);

        let request: OpenRequest = tokio::select! {
            result = rx.read_frame::<OpenRequest>() => match result? {
                Some(request) => request,
                None => return Ok(()),
            },
            _ = shutdown.cancelled() => return Ok(()),
        };
        debug!("{} request for {}", request.name(), request.kind());

        if request.is_streaming() {
            let stream = Arc::new(CorrelatedStream::new(tx, rx));
            return Self::serve_stream(request, stream, &services, &config, shutdown).await;
        }

        let ctx = CallContext::with_metadata(request.metadata().clone())
            .with_cancellation(shutdown.child_token());
        let frame = match Self::handle_unary(&services, &ctx, request).await {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Request failed: {}", e);
                ServerFrame::error(&e)
            }
        };

        tx.write_frame(&frame).await?;
        if let Err(e) = tx.shutdown().await {
            debug!("Shutdown of reply stream failed: {}", e);
        }
        Ok(())
    }

    async fn handle_unary(
        services: &Services,
        ctx: &CallContext,
        request: OpenRequest,
    ) -> ComponentResult<ServerFrame> {
        match request {
            OpenRequest::Init {
                kind,
                properties,
                metadata,
            } => {
                match kind {
                    ComponentKind::PubSub => {
                        services.pubsub()?.instance(&metadata)?.init(properties).await?
                    }
                    ComponentKind::InputBinding => {
                        services
                            .input_binding()?
                            .instance(&metadata)?
                            .init(properties)
                            .await?
                    }
                    ComponentKind::OutputBinding => {
                        services
                            .output_binding()?
                            .instance(&metadata)?
                            .init(properties)
                            .await?
                    }
                }
                Ok(ServerFrame::Ok)
            }
            OpenRequest::Ping { kind, metadata } => {
                match kind {
                    ComponentKind::PubSub => services.pubsub()?.instance(&metadata)?.ping().await?,
                    ComponentKind::InputBinding => {
                        services.input_binding()?.instance(&metadata)?.ping().await?
                    }
                    ComponentKind::OutputBinding => {
                        services.output_binding()?.instance(&metadata)?.ping().await?
                    }
                }
                Ok(ServerFrame::Ok)
            }
            OpenRequest::Features { metadata } => {
                let features = services.pubsub()?.instance(&metadata)?.features();
                Ok(ServerFrame::Features { features })
            }
            OpenRequest::Publish {
                topic,
                data,
                properties,
                content_type,
                metadata,
            } => {
                let pubsub = services.pubsub()?.instance(&metadata)?;
                let request = PublishRequest {
                    topic,
                    data,
                    metadata: properties,
                    content_type,
                };
                pubsub.publish(ctx, request).await?;
                Ok(ServerFrame::Ok)
            }
            OpenRequest::Invoke {
                operation,
                data,
                properties,
                metadata,
            } => {
                let binding = services.output_binding()?.instance(&metadata)?;
                let request = InvokeRequest {
                    operation,
                    data,
                    metadata: properties,
                };
                let response = binding.invoke(ctx, request).await?;
                Ok(ServerFrame::InvokeResponse {
                    data: response.data,
                    metadata: response.metadata,
                    content_type: response.content_type.unwrap_or_default(),
                })
            }
            OpenRequest::ListOperations { metadata } => {
                let operations = services.output_binding()?.instance(&metadata)?.operations();
                Ok(ServerFrame::Operations { operations })
            }
            other => Err(ComponentError::Unsupported(format!(
                "{} as a unary request",
                other.name()
            ))),
        }
    }

    async fn serve_stream(
        request: OpenRequest,
        stream: Arc<SocketStream>,
        services: &Services,
        config: &ComponentConfig,
        shutdown: CancellationToken,
    ) -> ComponentResult<()> {
        let ctx = CallContext::with_metadata(request.metadata().clone())
            .with_cancellation(shutdown.child_token());
        let acks_timeout = config.ack_resolve_timeout();

        let result = match request {
            OpenRequest::PullMessages {
                topic,
                properties,
                metadata,
            } => {
                let dispatcher = Dispatcher::<PullProtocol, _, _>::new(
                    stream.clone(),
                    Arc::new(AckManager::with_resolve_timeout(acks_timeout)),
                );
                let subscription = SubscribeRequest {
                    topic,
                    metadata: properties,
                };
                let sub_ctx = ctx.clone();
                Self::drive(&dispatcher, &ctx, |handler| async move {
                    let pubsub = services.pubsub()?.instance(&metadata)?;
                    pubsub.subscribe(sub_ctx, subscription, handler).await
                })
                .await
            }
            OpenRequest::Read { metadata } => {
                let dispatcher = Dispatcher::<ReadProtocol, _, _>::new(
                    stream.clone(),
                    Arc::new(AckManager::with_resolve_timeout(acks_timeout)),
                );
                let read_ctx = ctx.clone();
                Self::drive(&dispatcher, &ctx, |handler| async move {
                    let binding = services.input_binding()?.instance(&metadata)?;
                    binding.read(read_ctx, handler).await
                })
                .await
            }
            other => Err(ComponentError::Unsupported(format!(
                "{} as a streaming request",
                other.name()
            ))),
        };

        if let Err(e) = &result {
            if let Err(send_err) = stream.send(ServerFrame::error(e)).await {
                debug!("Failed to report stream error: {}", send_err);
            }
        }
        if let Err(e) = stream.close::<ServerFrame>().await {
            debug!("Shutdown of stream failed: {}", e);
        }
        result
    }

    /// Start the component side of a stream, confirm it with `ok`, then run
    /// the ack loop until the client closes the stream or shutdown.
    ///
    /// Payloads the component emits before `ok` is sent are held back.
    async fn drive<P, F, Fut>(
        dispatcher: &Dispatcher<P, FramedSender<OwnedWriteHalf>, FramedReceiver<OwnedReadHalf>>,
        ctx: &CallContext,
        start: F,
    ) -> ComponentResult<()>
    where
        P: AckProtocol<Outbound = ServerFrame>,
        P::Ack: serde::de::DeserializeOwned,
        F: FnOnce(Handler<P::Payload, P::Output>) -> Fut,
        Fut: Future<Output = ComponentResult<()>>,
    {
        let (ready_tx, ready_rx) = watch::channel(false);
        let handler = after_ready(dispatcher.handler(), ready_rx);

        let started = async {
            start(handler).await?;
            dispatcher.stream().send(ServerFrame::Ok).await?;
            Ok::<(), ComponentError>(())
        };
        if let Err(e) = started.await {
            ctx.cancel();
            return Err(e);
        }
        ready_tx.send_replace(true);

        let result = dispatcher
            .ack_loop(ctx.cancellation_token().clone())
            .await;
        ctx.cancel();
        debug!("Stream closed with {} pending acks", dispatcher.pending());

        match result {
            Ok(()) | Err(ComponentError::Cancelled) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Hold calls to `handler` until `ready` turns true.
fn after_ready<P, O>(handler: Handler<P, O>, ready: watch::Receiver<bool>) -> Handler<P, O>
where
    P: Send + 'static,
    O: Send + 'static,
{
    Arc::new(move |ctx: CallContext, payload: P| {
        let handler = handler.clone();
        let mut ready = ready.clone();
        let call: BoxFuture<'static, ComponentResult<O>> = Box::pin(async move {
            tokio::select! {
                established = async { ready.wait_for(|ready| *ready).await.map(|_| ()) } => {
                    if established.is_err() {
                        return Err(ComponentError::Cancelled);
                    }
                }
                _ = ctx.done() => return Err(ComponentError::AckTimeout),
            }
            handler(ctx, payload).await
        });
        call
    })
}

/// Serve every component of `registry` until `shutdown` is cancelled.
///
/// The first component that fails stops all others.
pub async fn run(
    registry: ComponentRegistry,
    config: ComponentConfig,
    shutdown: CancellationToken,
) -> ComponentResult<()> {
    if registry.is_empty() {
        return Err(ComponentError::NothingRegistered);
    }

    let stop = shutdown.child_token();
    let mut servers = JoinSet::new();
    for (name, options) in registry.iter() {
        let server = ComponentServer::new(name, options.clone(), config.clone())?
            .with_shutdown_token(stop.child_token());
        servers.spawn(async move {
            let result = server.run().await;
            (server.name().to_string(), result)
        });
    }

    let mut first_error = None;
    while let Some(joined) = servers.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((name, Err(e))) => {
                error!("Aborting due to an error in '{}': {}", name, e);
                stop.cancel();
                first_error.get_or_insert(e);
            }
            Err(e) => {
                error!("Component task failed: {}", e);
                stop.cancel();
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
