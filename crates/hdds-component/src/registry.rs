// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Component registration: which services a named component exposes.

use crate::component::{InputBinding, OutputBinding, PubSub};
use crate::error::{ComponentError, ComponentResult};
use crate::mux::Factory;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Services offered by one component, each as an instance factory.
#[derive(Clone, Default)]
pub struct ComponentOptions {
    pub(crate) pubsub: Option<Factory<dyn PubSub>>,
    pub(crate) input_binding: Option<Factory<dyn InputBinding>>,
    pub(crate) output_binding: Option<Factory<dyn OutputBinding>>,
}

impl ComponentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pubsub<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> ComponentResult<Arc<dyn PubSub>> + Send + Sync + 'static,
    {
        info!("pubsub was registered");
        self.pubsub = Some(Arc::new(factory));
        self
    }

    pub fn with_input_binding<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> ComponentResult<Arc<dyn InputBinding>> + Send + Sync + 'static,
    {
        info!("input binding was registered");
        self.input_binding = Some(Arc::new(factory));
        self
    }

    pub fn with_output_binding<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> ComponentResult<Arc<dyn OutputBinding>> + Send + Sync + 'static,
    {
        info!("output binding was registered");
        self.output_binding = Some(Arc::new(factory));
        self
    }

    pub fn has_pubsub(&self) -> bool {
        self.pubsub.is_some()
    }

    pub fn has_input_binding(&self) -> bool {
        self.input_binding.is_some()
    }

    pub fn has_output_binding(&self) -> bool {
        self.output_binding.is_some()
    }

    /// At least one service must be set.
    pub fn validate(&self) -> ComponentResult<()> {
        if self.pubsub.is_none() && self.input_binding.is_none() && self.output_binding.is_none() {
            return Err(ComponentError::NoComponents);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ComponentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentOptions")
            .field("pubsub", &self.has_pubsub())
            .field("input_binding", &self.has_input_binding())
            .field("output_binding", &self.has_output_binding())
            .finish()
    }
}

/// Named components served by [`crate::run`].
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: BTreeMap<String, ComponentOptions>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `options` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, options: ComponentOptions) -> &mut Self {
        let name = name.into();
        info!("component {} registered", name);
        self.components.insert(name, options);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ComponentOptions> {
        self.components.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ComponentOptions)> {
        self.components.iter().map(|(name, opts)| (name.as_str(), opts))
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
