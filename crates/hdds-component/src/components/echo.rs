// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Output binding that returns the request data unchanged.

use crate::component::{InvokeRequest, InvokeResponse, OutputBinding, Properties};
use crate::context::CallContext;
use crate::error::ComponentResult;
use async_trait::async_trait;
use tracing::debug;

const ECHO_OPERATION: &str = "echo";

#[derive(Debug, Default)]
pub struct EchoBinding;

impl EchoBinding {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OutputBinding for EchoBinding {
    async fn init(&self, properties: Properties) -> ComponentResult<()> {
        debug!("echo binding initialized with {} properties", properties.len());
        Ok(())
    }

    async fn invoke(&self, _ctx: &CallContext, request: InvokeRequest) -> ComponentResult<InvokeResponse> {
        request.check_operation(&self.operations())?;
        Ok(InvokeResponse {
            data: request.data,
            metadata: request.metadata,
            content_type: Some("application/octet-stream".to_string()),
        })
    }

    fn operations(&self) -> Vec<String> {
        vec![ECHO_OPERATION.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ComponentError;

    #[tokio::test]
    async fn test_echo_returns_data() {
        let binding = EchoBinding::new();
        let response = binding
            .invoke(
                &CallContext::new(),
                InvokeRequest {
                    operation: "echo".into(),
                    data: b"ping".to_vec(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(response.data, b"ping");
    }

    #[tokio::test]
    async fn test_unknown_operation_is_unsupported() {
        let binding = EchoBinding::new();
        let result = binding
            .invoke(
                &CallContext::new(),
                InvokeRequest {
                    operation: "delete".into(),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(ComponentError::Unsupported(_))));
    }
}
