//! HTTP JSON-RPC endpoint client backed by `reqwest`.
//!
//! The client does one POST per [`issue`](EndpointClient::issue) call and
//! nothing else: retry, fallback and timeouts per attempt belong to the
//! dispatcher. Connection reuse is left to `reqwest`, whose pool is shared
//! by every client a [`HttpConnector`] hands out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use rpcfallback_core::client::{Connector, EndpointClient};
use rpcfallback_core::endpoint::Endpoint;
use rpcfallback_core::error::ClientError;
use rpcfallback_core::request::{JsonRpcRequest, JsonRpcResponse};

/// Configuration for the underlying `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Hard ceiling on one HTTP exchange, independent of the dispatcher's
    /// attempt timeout.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("rpcfallback/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

fn build_http(config: &HttpClientConfig) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|e| ClientError::Request(format!("failed to build HTTP client: {e}")))
}

fn map_reqwest(err: reqwest::Error, timeout: Duration) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout {
            ms: timeout.as_millis() as u64,
        }
    } else {
        ClientError::Http(err.to_string())
    }
}

/// JSON-RPC client for one HTTP endpoint.
pub struct HttpEndpointClient {
    endpoint: Endpoint,
    url: Url,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpEndpointClient {
    /// Create a standalone client with its own connection pool.
    pub fn new(endpoint: Endpoint, config: HttpClientConfig) -> Result<Self, ClientError> {
        let http = build_http(&config)?;
        Self::with_http(endpoint, http, config.request_timeout)
    }

    fn with_http(
        endpoint: Endpoint,
        http: reqwest::Client,
        request_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let url = parse_url(&endpoint)?;
        Ok(Self {
            endpoint,
            url,
            http,
            request_timeout,
        })
    }
}

fn parse_url(endpoint: &Endpoint) -> Result<Url, ClientError> {
    let url = Url::parse(endpoint.as_str())
        .map_err(|e| ClientError::Request(format!("invalid endpoint URL '{endpoint}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ClientError::Request(format!(
            "unsupported scheme '{other}' for endpoint {endpoint}"
        ))),
    }
}

#[async_trait]
impl EndpointClient for HttpEndpointClient {
    async fn issue(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, ClientError> {
        tracing::trace!(endpoint = %self.endpoint, method = %req.method, id = %req.id, "POST");

        let resp = self
            .http
            .post(self.url.clone())
            .json(&req)
            .send()
            .await
            .map_err(|e| map_reqwest(e, self.request_timeout))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Http(format!("HTTP {status}: {body}")));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| map_reqwest(e, self.request_timeout))?;
        Ok(serde_json::from_slice::<JsonRpcResponse>(&body)?)
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

/// Hands out [`HttpEndpointClient`]s that share one `reqwest` pool.
#[derive(Clone)]
pub struct HttpConnector {
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpConnector {
    pub fn new(config: HttpClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_http(&config)?,
            request_timeout: config.request_timeout,
        })
    }
}

impl Connector for HttpConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn EndpointClient>, ClientError> {
        let client =
            HttpEndpointClient::with_http(endpoint.clone(), self.http.clone(), self.request_timeout)?;
        Ok(Arc::new(client))
    }
}

impl std::fmt::Debug for HttpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnector")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
