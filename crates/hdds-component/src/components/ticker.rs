// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Input binding emitting a counter at a fixed interval.

use crate::component::{InputBinding, Properties, ReadHandler, ReadPayload};
use crate::context::CallContext;
use crate::error::ComponentResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

pub struct TickerBinding {
    interval: Duration,
    dispatch_timeout: Duration,
    ticks: Arc<AtomicU64>,
}

impl TickerBinding {
    pub fn new(interval: Duration, dispatch_timeout: Duration) -> Self {
        Self {
            interval,
            dispatch_timeout,
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Ticks emitted so far, across all readers.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl InputBinding for TickerBinding {
    async fn init(&self, properties: Properties) -> ComponentResult<()> {
        debug!("ticker initialized with {} properties", properties.len());
        Ok(())
    }

    async fn read(&self, ctx: CallContext, handler: ReadHandler) -> ComponentResult<()> {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let ticks = self.ticks.clone();
        let dispatch_timeout = self.dispatch_timeout;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ctx.done() => break,
                    _ = interval.tick() => {}
                }

                let tick = ticks.fetch_add(1, Ordering::Relaxed) + 1;
                let payload = ReadPayload {
                    data: tick.to_string().into_bytes(),
                    metadata: HashMap::from([("tick".to_string(), tick.to_string())]),
                    content_type: Some("text/plain".to_string()),
                };

                match handler(ctx.child().with_timeout(dispatch_timeout), payload).await {
                    Ok(response) => trace!(tick, response_len = response.len(), "tick acknowledged"),
                    Err(e) => warn!("tick {} was not delivered: {}", tick, e),
                }
            }
            debug!("ticker reader stopped");
        });

        Ok(())
    }
}
