use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use serde_json::{Map, Value};

use crate::error::ClientError;

/// One call handed to the host's [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    /// Api prefix plus compiled query
    pub url: String,
    pub body: Option<Value>,
    /// Merged client, per-method and per-request passthrough options
    pub passthrough: Map<String, Value>,
}

/// The host side of a request: sends it and returns the decoded JSON body.
///
/// Non-2xx responses must be reported as [`ClientError::HttpStatus`] so that
/// retries and upsert fallbacks can see the status.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: TransportRequest) -> Result<Value, ClientError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: TransportRequest) -> Result<Value, ClientError> {
        (**self).send(request).await
    }
}
