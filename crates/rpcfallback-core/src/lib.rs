//! rpcfallback-core: multi-endpoint JSON-RPC dispatch with retry and fallback.
//!
//! # Overview
//!
//! Given an ordered chain of endpoints, the [`Dispatcher`] tries the
//! primary first, retries it with capped backoff per [`RetryPolicy`], and
//! falls through to the next endpoint once retries are exhausted. The
//! caller sees exactly two outcomes: a value with the endpoint that
//! produced it, or a [`DispatchError`] listing every attempt.
//!
//! - [`Endpoint`]: immutable node address
//! - [`RetryPolicy`]: per-endpoint attempts and backoff curve
//! - [`Dispatcher`] / [`dispatch`]: sequential fallback with retry
//! - [`FanOutStrategy`]: race-first, first-success and wait-all fan-out
//! - [`EndpointClient`] / [`Connector`]: the request primitive
//! - [`FallbackClient`]: JSON-RPC calls over a fallback chain
//! - [`DispatchConfig`]: serde configuration
//!
//! ```rust,no_run
//! use rpcfallback_core::{dispatch, endpoints, ClientError, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn run() {
//! let chain = endpoints(["https://primary.example", "https://backup.example"]);
//! let policy = RetryPolicy::exponential(2, Duration::from_millis(10), Duration::from_millis(100));
//! let outcome = dispatch(&chain, |ep| async move {
//!     if ep.as_str().contains("primary") {
//!         Err(ClientError::Http("connection refused".into()))
//!     } else {
//!         Ok(42u64)
//!     }
//! }, &policy).await;
//! assert_eq!(outcome.unwrap().origin.as_str(), "https://backup.example");
//! # }
//! ```

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod fallback;
pub mod fanout;
pub mod policy;
pub mod request;

pub use client::{Connector, EndpointClient};
pub use config::{DispatchConfig, RetryConfig};
pub use dispatcher::{dispatch, DispatchOutcome, Dispatched, Dispatcher};
pub use endpoint::{endpoints, Endpoint};
pub use error::{ClientError, ConfigError, DispatchError};
pub use fallback::FallbackClient;
pub use fanout::{FanOut, Settled};
pub use policy::{DelayGrowth, FanOutStrategy, RetryPolicy, Strategy};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};

pub use tokio_util::sync::CancellationToken;
