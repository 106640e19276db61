// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-call context: call metadata, deadline and cancellation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Call metadata: header name -> values.
///
/// Header names are case-insensitive and stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "HashMap<String, Vec<String>>",
    into = "HashMap<String, Vec<String>>"
)]
pub struct Metadata {
    entries: HashMap<String, Vec<String>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build metadata from `(key, value)` pairs, appending repeated keys.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut metadata = Self::new();
        for (key, value) in pairs {
            metadata.append(key, value);
        }
        metadata
    }

    /// All values for `key` (empty when absent).
    pub fn get(&self, key: &str) -> &[String] {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First value for `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).first().map(String::as_str)
    }

    /// Replace every value of `key` with `value`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .insert(key.into().to_ascii_lowercase(), vec![value.into()]);
    }

    /// Add `value` to the values of `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .entry(key.into().to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<HashMap<String, Vec<String>>> for Metadata {
    fn from(raw: HashMap<String, Vec<String>>) -> Self {
        let mut metadata = Self::new();
        for (key, values) in raw {
            for value in values {
                metadata.append(key.clone(), value);
            }
        }
        metadata
    }
}

impl From<Metadata> for HashMap<String, Vec<String>> {
    fn from(metadata: Metadata) -> Self {
        metadata.entries
    }
}

/// Context handed to every dispatch and component call.
///
/// `done()` completes when the context is cancelled or its deadline passes.
/// Cancelling a child never cancels the parent.
#[derive(Debug, Clone)]
pub struct CallContext {
    metadata: Metadata,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl Default for CallContext {
    fn default() -> Self {
        Self {
            metadata: Metadata::new(),
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(metadata: Metadata) -> Self {
        Self {
            metadata,
            ..Self::default()
        }
    }

    /// Replace the cancellation token (e.g. with a child of a stream token).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Tighten the deadline to at most `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Tighten the deadline; an earlier existing deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Derive a context with a child cancellation token.
    pub fn child(&self) -> Self {
        Self {
            metadata: self.metadata.clone(),
            deadline: self.deadline,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| d <= Instant::now())
    }

    /// Wait until the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_keys_are_case_insensitive() {
        let mut metadata = Metadata::new();
        metadata.insert("X-Component-Instance", "a");
        assert_eq!(metadata.first("x-component-instance"), Some("a"));
        assert_eq!(metadata.get("X-COMPONENT-INSTANCE").len(), 1);
    }

    #[test]
    fn test_metadata_append_and_insert() {
        let mut metadata = Metadata::from_pairs([("k", "1"), ("k", "2")]);
        assert_eq!(metadata.get("k"), ["1".to_string(), "2".to_string()]);

        metadata.insert("k", "3");
        assert_eq!(metadata.get("k"), ["3".to_string()]);
        assert!(metadata.get("missing").is_empty());
    }

    #[test]
    fn test_metadata_deserialize_normalizes_keys() {
        let metadata: Metadata = serde_json::from_str(r#"{"Subscription-Id": ["s1"]}"#).unwrap();
        assert_eq!(metadata.first("subscription-id"), Some("s1"));
    }

    #[tokio::test]
    async fn test_zero_timeout_is_done_immediately() {
        let ctx = CallContext::new().with_timeout(Duration::ZERO);
        assert!(ctx.is_done());
        tokio::time::timeout(Duration::from_secs(1), ctx.done())
            .await
            .expect("done() should complete");
    }

    #[tokio::test]
    async fn test_cancel_completes_done() {
        let ctx = CallContext::new();
        assert!(!ctx.is_done());

        let waiter = ctx.clone();
        let handle = tokio::spawn(async move { waiter.done().await });
        ctx.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("done() should complete")
            .unwrap();
    }

    #[test]
    fn test_child_cancel_does_not_cancel_parent() {
        let parent = CallContext::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_done());
        assert!(!parent.is_done());

        let child = parent.child();
        parent.cancel();
        assert!(child.is_done());
    }

    #[test]
    fn test_with_deadline_keeps_earliest() {
        let now = Instant::now();
        let ctx = CallContext::new()
            .with_deadline(now + Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(10));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));
    }
}
