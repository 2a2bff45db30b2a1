//! Dispatch policies.
//!
//! Sequential fallback retries each endpoint per [`RetryPolicy`]; the
//! concurrent alternatives are selected with [`FanOutStrategy`].
//! ```text
//! Request → [Endpoint 0: attempt, backoff, attempt…] → [Endpoint 1: …] → Exhausted
//! ```

pub mod retry;
pub mod strategy;

pub use retry::{DelayGrowth, RetryPolicy};
pub use strategy::{FanOutStrategy, Strategy};
