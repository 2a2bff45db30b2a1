//! rpcfallback-http: JSON-RPC over HTTP for the rpcfallback dispatcher.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rpcfallback_core::{endpoints, Dispatcher, FallbackClient, RetryPolicy};
//! use rpcfallback_http::{HttpClientConfig, HttpConnector};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = HttpConnector::new(HttpClientConfig::default())?;
//! let client = FallbackClient::new(
//!     endpoints(["https://cloudflare-eth.com", "https://eth.llamarpc.com"]),
//!     Arc::new(connector),
//!     Dispatcher::new(RetryPolicy::immediate(2)),
//! )?;
//! let block: String = client.call(1, "eth_blockNumber", vec![]).await?.value;
//! # Ok(())
//! # }
//! ```

pub mod client;

pub use client::{HttpClientConfig, HttpConnector, HttpEndpointClient};
