//! Multi-endpoint JSON-RPC client that routes every call through a
//! [`Dispatcher`].

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::client::{decode_response, Connector};
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::endpoint::Endpoint;
use crate::error::{ClientError, ConfigError, DispatchError};
use crate::fanout::FanOut;
use crate::policy::FanOutStrategy;
use crate::request::JsonRpcRequest;

/// JSON-RPC client over an immutable, ordered fallback chain.
///
/// The chain is fixed at construction; there is no "current provider" that
/// gets swapped around. Each call asks the connector for a fresh client per
/// attempt, so a connector that fails to build one simply fails that attempt.
pub struct FallbackClient {
    endpoints: Vec<Endpoint>,
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
}

impl FallbackClient {
    pub fn new(
        endpoints: Vec<Endpoint>,
        connector: Arc<dyn Connector>,
        dispatcher: Dispatcher,
    ) -> Result<Self, ConfigError> {
        dispatcher.validate(&endpoints)?;
        Ok(Self {
            endpoints,
            connector,
            dispatcher,
        })
    }

    /// Number of endpoints in the chain.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always `false`: construction rejects an empty chain.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Send `req` with sequential fallback; returns the JSON-RPC result value.
    ///
    /// A JSON-RPC error object counts as a failed attempt.
    pub async fn request(&self, req: JsonRpcRequest) -> DispatchOutcome<Value> {
        self.request_with(&CancellationToken::new(), req).await
    }

    /// [`request`](Self::request), cancellable through `cancel`.
    pub async fn request_with(
        &self,
        cancel: &CancellationToken,
        req: JsonRpcRequest,
    ) -> DispatchOutcome<Value> {
        self.dispatcher
            .dispatch_with(cancel, &self.endpoints, |endpoint| {
                self.attempt(endpoint, req.clone())
            })
            .await
    }

    /// Call `method` with sequential fallback and deserialize the result.
    ///
    /// Deserialization happens inside the attempt, so an endpoint returning
    /// a malformed result is retried like any other failure.
    pub async fn call<T: DeserializeOwned>(
        &self,
        id: u64,
        method: &str,
        params: Vec<Value>,
    ) -> DispatchOutcome<T> {
        self.call_with(&CancellationToken::new(), id, method, params)
            .await
    }

    /// [`call`](Self::call), cancellable through `cancel`.
    pub async fn call_with<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        id: u64,
        method: &str,
        params: Vec<Value>,
    ) -> DispatchOutcome<T> {
        let req = JsonRpcRequest::new(id, method, params);
        self.dispatcher
            .dispatch_with(cancel, &self.endpoints, |endpoint| {
                let attempt = self.attempt(endpoint, req.clone());
                async move {
                    match attempt.await {
                        Ok(value) => serde_json::from_value::<T>(value).map_err(ClientError::from),
                        Err(e) => Err(e),
                    }
                }
            })
            .await
    }

    /// Send `req` to every endpoint at once, combined per `strategy`.
    pub async fn fan_out(
        &self,
        strategy: FanOutStrategy,
        req: JsonRpcRequest,
    ) -> Result<FanOut<Value>, DispatchError> {
        self.fan_out_with(&CancellationToken::new(), strategy, req)
            .await
    }

    /// [`fan_out`](Self::fan_out), cancellable through `cancel`.
    pub async fn fan_out_with(
        &self,
        cancel: &CancellationToken,
        strategy: FanOutStrategy,
        req: JsonRpcRequest,
    ) -> Result<FanOut<Value>, DispatchError> {
        self.dispatcher
            .fan_out_with(cancel, strategy, &self.endpoints, |endpoint| {
                self.attempt(endpoint, req.clone())
            })
            .await
    }

    fn attempt(
        &self,
        endpoint: Endpoint,
        req: JsonRpcRequest,
    ) -> impl Future<Output = Result<Value, ClientError>> + Send + 'static {
        let connector = self.connector.clone();
        async move {
            let client = connector.connect(&endpoint)?;
            let resp = client.issue(req).await?;
            decode_response::<Value>(resp)
        }
    }
}

impl std::fmt::Debug for FallbackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackClient")
            .field("endpoints", &self.endpoints)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::EndpointClient;
    use crate::endpoint::endpoints;
    use crate::policy::RetryPolicy;
    use crate::request::{JsonRpcError, JsonRpcResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Ok,
        Down,
        RpcError,
    }

    struct MockNode {
        endpoint: Endpoint,
        behaviour: Behaviour,
        log: Arc<Mutex<Vec<Endpoint>>>,
    }

    #[async_trait]
    impl EndpointClient for MockNode {
        async fn issue(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, ClientError> {
            self.log.lock().unwrap().push(self.endpoint.clone());
            match self.behaviour {
                Behaviour::Ok => Ok(JsonRpcResponse::success(req.id, json!("0x2a"))),
                Behaviour::Down => Err(ClientError::Http("connection refused".into())),
                Behaviour::RpcError => Ok(JsonRpcResponse {
                    jsonrpc: "2.0".into(),
                    id: req.id,
                    result: None,
                    error: Some(JsonRpcError {
                        code: -32005,
                        message: "limit exceeded".into(),
                        data: None,
                    }),
                }),
            }
        }
        fn endpoint(&self) -> &Endpoint {
            &self.endpoint
        }
    }

    struct MockConnector {
        nodes: HashMap<String, Behaviour>,
        log: Arc<Mutex<Vec<Endpoint>>>,
    }

    impl Connector for MockConnector {
        fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn EndpointClient>, ClientError> {
            let behaviour = *self
                .nodes
                .get(endpoint.as_str())
                .ok_or_else(|| ClientError::Request(format!("unknown endpoint {endpoint}")))?;
            Ok(Arc::new(MockNode {
                endpoint: endpoint.clone(),
                behaviour,
                log: self.log.clone(),
            }))
        }
    }

    fn client(
        nodes: &[(&str, Behaviour)],
        chain: &[&str],
        policy: RetryPolicy,
    ) -> (FallbackClient, Arc<Mutex<Vec<Endpoint>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let connector = MockConnector {
            nodes: nodes.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            log: log.clone(),
        };
        let client = FallbackClient::new(
            endpoints(chain.iter().copied()),
            Arc::new(connector),
            Dispatcher::new(policy),
        )
        .unwrap();
        (client, log)
    }

    #[test]
    fn rejects_empty_chain() {
        let connector = MockConnector {
            nodes: HashMap::new(),
            log: Arc::default(),
        };
        let err = FallbackClient::new(vec![], Arc::new(connector), Dispatcher::default()).unwrap_err();
        assert!(matches!(err, ConfigError::NoEndpoints));
    }

    #[tokio::test]
    async fn rpc_error_falls_through() {
        let (client, log) = client(
            &[("a", Behaviour::RpcError), ("b", Behaviour::Ok)],
            &["a", "b"],
            RetryPolicy::default(),
        );
        let out: String = client.call(1, "eth_blockNumber", vec![]).await.unwrap().value;
        assert_eq!(out, "0x2a");
        assert_eq!(*log.lock().unwrap(), endpoints(["a", "b"]));
    }

    #[tokio::test]
    async fn connector_failure_is_an_attempt_failure() {
        let (client, log) = client(&[("b", Behaviour::Ok)], &["missing", "b"], RetryPolicy::default());
        let out = client
            .request(JsonRpcRequest::new(1, "eth_chainId", vec![]))
            .await
            .unwrap();
        assert_eq!(out.origin.as_str(), "b");
        assert_eq!(*log.lock().unwrap(), endpoints(["b"]));
    }

    #[tokio::test]
    async fn malformed_result_is_retried_elsewhere() {
        let (client, _) = client(
            &[("a", Behaviour::Ok), ("b", Behaviour::Ok)],
            &["a", "b"],
            RetryPolicy::immediate(2),
        );
        // "0x2a" is not a u64, so every attempt fails deserialization.
        let err = client.call::<u64>(1, "eth_blockNumber", vec![]).await.unwrap_err();
        match err {
            DispatchError::Exhausted { last_error, attempted } => {
                assert!(matches!(last_error, ClientError::Deserialization(_)));
                assert_eq!(attempted, endpoints(["a", "a", "b", "b"]));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_chain_reports_every_attempt() {
        let (client, _) = client(
            &[("a", Behaviour::Down), ("b", Behaviour::Down)],
            &["a", "b"],
            RetryPolicy::default(),
        );
        let err = client
            .request(JsonRpcRequest::new(1, "eth_chainId", vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.attempted(), endpoints(["a", "b"]).as_slice());
    }

    #[tokio::test]
    async fn cancelling_one_call_does_not_poison_the_client() {
        let (client, log) = client(&[("a", Behaviour::Ok)], &["a"], RetryPolicy::default());
        let token = CancellationToken::new();
        token.cancel();

        let err = client
            .request_with(&token, JsonRpcRequest::new(1, "eth_chainId", vec![]))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(log.lock().unwrap().is_empty());

        let out: String = client.call(2, "eth_blockNumber", vec![]).await.unwrap().value;
        assert_eq!(out, "0x2a");
        let out = client
            .request(JsonRpcRequest::new(3, "eth_chainId", vec![]))
            .await
            .unwrap();
        assert_eq!(out.origin.as_str(), "a");
        assert_eq!(*log.lock().unwrap(), endpoints(["a", "a"]));
    }

    #[tokio::test]
    async fn fan_out_first_success() {
        let (client, _) = client(
            &[("a", Behaviour::Down), ("b", Behaviour::Ok)],
            &["a", "b"],
            RetryPolicy::default(),
        );
        let winner = client
            .fan_out(
                FanOutStrategy::FirstSuccess,
                JsonRpcRequest::new(1, "eth_chainId", vec![]),
            )
            .await
            .unwrap()
            .winner()
            .unwrap();
        assert_eq!(winner.origin.as_str(), "b");
        assert_eq!(winner.value, json!("0x2a"));
    }
}
