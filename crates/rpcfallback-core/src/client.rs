//! The `EndpointClient` trait: the collaborator that issues one request
//! against one node.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::endpoint::Endpoint;
use crate::error::ClientError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// Issues JSON-RPC requests against a single endpoint.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` for use across Tokio tasks.
///
/// # Object Safety
/// The trait is object-safe and can be stored as `Arc<dyn EndpointClient>`.
#[async_trait]
pub trait EndpointClient: Send + Sync + 'static {
    /// Send one request and return the raw response.
    ///
    /// Transport failures (timeout, refused connection, bad status) are
    /// errors; a JSON-RPC error object is still a response here.
    async fn issue(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, ClientError>;

    /// The endpoint this client talks to.
    fn endpoint(&self) -> &Endpoint;

    /// Call a method and deserialize the result.
    ///
    /// A JSON-RPC error object becomes [`ClientError::Rpc`].
    async fn call<T: DeserializeOwned>(
        &self,
        id: u64,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, ClientError>
    where
        Self: Sized,
    {
        let resp = self.issue(JsonRpcRequest::new(id, method, params)).await?;
        decode_response(resp)
    }
}

/// Turns an endpoint into a ready client.
///
/// Connectors are where connection reuse lives; the dispatcher asks for a
/// client on every attempt and never caches one itself.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn EndpointClient>, ClientError>;
}

/// Unwrap a response into a typed result.
pub fn decode_response<T: DeserializeOwned>(resp: JsonRpcResponse) -> Result<T, ClientError> {
    let result = resp.into_result().map_err(ClientError::Rpc)?;
    serde_json::from_value(result).map_err(ClientError::Deserialization)
}
