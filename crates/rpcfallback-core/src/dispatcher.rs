//! Sequential fallback dispatcher: retry each endpoint with backoff, then
//! fall through to the next one.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::endpoint::Endpoint;
use crate::error::{ClientError, ConfigError, DispatchError};
use crate::policy::RetryPolicy;

/// A successful dispatch: the value and the endpoint that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched<T> {
    pub value: T,
    pub origin: Endpoint,
}

impl<T> Dispatched<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Dispatched<U> {
        Dispatched {
            value: f(self.value),
            origin: self.origin,
        }
    }
}

/// Either a value with its origin, or a terminal [`DispatchError`].
pub type DispatchOutcome<T> = Result<Dispatched<T>, DispatchError>;

/// One failed attempt, kept only long enough to decide what comes next.
struct AttemptRecord<'a> {
    endpoint: &'a Endpoint,
    number: u32,
    error: ClientError,
}

/// Dispatches one logical request over an ordered fallback chain.
///
/// The dispatcher holds configuration only. Every call to
/// [`dispatch`](Self::dispatch) owns its own attempt state and its own
/// cancellation, so one dispatcher can serve concurrent dispatches from
/// many tasks and cancelling one of them leaves the others alone.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    policy: RetryPolicy,
    attempt_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Bound every attempt; a timed out attempt counts as a failed one.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }

    pub(crate) fn validate(&self, endpoints: &[Endpoint]) -> Result<(), ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        if self.attempt_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTimeout);
        }
        self.policy.validate()
    }

    /// Try `endpoints` in order until one succeeds.
    ///
    /// `request` builds the attempt future for an endpoint. It is called
    /// once per attempt; a request that cannot be built should resolve to
    /// [`ClientError::Request`], which is handled like any failed attempt.
    pub async fn dispatch<T, F, Fut>(&self, endpoints: &[Endpoint], request: F) -> DispatchOutcome<T>
    where
        F: Fn(Endpoint) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        self.dispatch_with(&CancellationToken::new(), endpoints, request)
            .await
    }

    /// Like [`dispatch`](Self::dispatch), abandoning the in-flight attempt
    /// or pending delay once `cancel` fires.
    ///
    /// The token belongs to this call only. Pass a
    /// [`child_token`](CancellationToken::child_token) to tie several calls
    /// to one parent.
    pub async fn dispatch_with<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        endpoints: &[Endpoint],
        request: F,
    ) -> DispatchOutcome<T>
    where
        F: Fn(Endpoint) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        self.validate(endpoints)?;

        let mut attempted: Vec<Endpoint> = Vec::new();
        let mut last_error: Option<ClientError> = None;

        for (index, endpoint) in endpoints.iter().enumerate() {
            let mut attempt = 0u32;
            loop {
                if cancel.is_cancelled() {
                    return Err(DispatchError::Cancelled { attempted });
                }
                attempted.push(endpoint.clone());
                tracing::debug!(endpoint = %endpoint, index, attempt, "issuing attempt");

                let record = match self.attempt(cancel, request(endpoint.clone())).await {
                    None => return Err(DispatchError::Cancelled { attempted }),
                    Some(Ok(value)) => {
                        return Ok(Dispatched {
                            value,
                            origin: endpoint.clone(),
                        })
                    }
                    Some(Err(error)) => AttemptRecord {
                        endpoint,
                        number: attempt,
                        error,
                    },
                };

                if !self.policy.should_retry(record.number) {
                    tracing::info!(
                        endpoint = %record.endpoint,
                        attempts = record.number + 1,
                        error = %record.error,
                        "endpoint exhausted, falling through"
                    );
                    last_error = Some(record.error);
                    break;
                }

                let delay = self.policy.delay_for(record.number);
                tracing::warn!(
                    attempt = record.number,
                    delay_ms = delay.as_millis() as u64,
                    error = %record.error,
                    endpoint = %record.endpoint,
                    "retrying request"
                );
                if !self.pause(cancel, delay).await {
                    return Err(DispatchError::Cancelled { attempted });
                }
                attempt += 1;
            }
        }

        let last_error =
            last_error.unwrap_or_else(|| ClientError::Other("no attempt was made".into()));
        tracing::error!(
            attempts = attempted.len(),
            error = %last_error,
            "all endpoints exhausted"
        );
        Err(DispatchError::Exhausted {
            last_error,
            attempted,
        })
    }

    /// Run one attempt under the attempt timeout and `cancel`.
    ///
    /// `None` means the dispatch was cancelled while the attempt was in flight.
    async fn attempt<T, Fut>(
        &self,
        cancel: &CancellationToken,
        fut: Fut,
    ) -> Option<Result<T, ClientError>>
    where
        Fut: Future<Output = Result<T, ClientError>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.timed(fut) => Some(result),
        }
    }

    /// Apply the attempt timeout, if any.
    pub(crate) async fn timed<T, Fut>(&self, fut: Fut) -> Result<T, ClientError>
    where
        Fut: Future<Output = Result<T, ClientError>>,
    {
        match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .unwrap_or_else(|_| {
                    Err(ClientError::Timeout {
                        ms: limit.as_millis() as u64,
                    })
                }),
            None => fut.await,
        }
    }

    /// Sleep between retries. Returns `false` if cancelled first.
    async fn pause(&self, cancel: &CancellationToken, delay: Duration) -> bool {
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Dispatch with a one-off [`Dispatcher`] built from `policy`.
pub async fn dispatch<T, F, Fut>(
    endpoints: &[Endpoint],
    request: F,
    policy: &RetryPolicy,
) -> DispatchOutcome<T>
where
    F: Fn(Endpoint) -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    Dispatcher::new(policy.clone()).dispatch(endpoints, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::endpoints;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fail(msg: &str) -> ClientError {
        ClientError::Http(msg.to_string())
    }

    #[tokio::test]
    async fn empty_chain_is_configuration_error() {
        let calls = AtomicU32::new(0);
        let out = dispatch(
            &[],
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ClientError>(()) }
            },
            &RetryPolicy::default(),
        )
        .await;
        assert!(matches!(
            out,
            Err(DispatchError::Configuration(ConfigError::NoEndpoints))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_timeout_rejected_before_any_attempt() {
        let dispatcher = Dispatcher::default().with_attempt_timeout(Duration::ZERO);
        let out = dispatcher
            .dispatch(&endpoints(["a"]), |_| async { Ok::<_, ClientError>(1) })
            .await;
        assert!(matches!(
            out,
            Err(DispatchError::Configuration(ConfigError::ZeroTimeout))
        ));
    }

    #[tokio::test]
    async fn primary_success_short_circuits() {
        let calls = AtomicU32::new(0);
        let out = dispatch(
            &endpoints(["a", "b", "c"]),
            |ep| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, ClientError>(ep.to_string()) }
            },
            &RetryPolicy::immediate(3),
        )
        .await
        .unwrap();
        assert_eq!(out.origin, Endpoint::from("a"));
        assert_eq!(out.value, "a");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_on_retry_of_same_endpoint() {
        let calls = AtomicU32::new(0);
        let out = dispatch(
            &endpoints(["a", "b"]),
            |ep| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(fail("flaky"))
                    } else {
                        Ok(ep)
                    }
                }
            },
            &RetryPolicy::exponential(3, Duration::from_millis(5), Duration::from_millis(50)),
        )
        .await
        .unwrap();
        assert_eq!(out.origin, Endpoint::from("a"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn construction_failure_counts_as_attempt() {
        let out = dispatch(
            &endpoints(["bad", "good"]),
            |ep| async move {
                if ep.as_str() == "bad" {
                    Err(ClientError::Request("invalid url".into()))
                } else {
                    Ok(7)
                }
            },
            &RetryPolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(out.value, 7);
        assert_eq!(out.origin, Endpoint::from("good"));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_attempt_times_out_and_falls_through() {
        let dispatcher = Dispatcher::default().with_attempt_timeout(Duration::from_millis(100));
        let out = dispatcher
            .dispatch(&endpoints(["slow", "fast"]), |ep| async move {
                if ep.as_str() == "slow" {
                    std::future::pending::<()>().await;
                }
                Ok::<_, ClientError>(ep)
            })
            .await
            .unwrap();
        assert_eq!(out.origin, Endpoint::from("fast"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_reported_as_last_error() {
        let dispatcher = Dispatcher::default().with_attempt_timeout(Duration::from_millis(250));
        let err = dispatcher
            .dispatch(&endpoints(["slow"]), |_| async {
                std::future::pending::<Result<(), ClientError>>().await
            })
            .await
            .unwrap_err();
        match err {
            DispatchError::Exhausted { last_error, .. } => {
                assert!(matches!(last_error, ClientError::Timeout { ms: 250 }))
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn already_cancelled_makes_no_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = AtomicU32::new(0);
        let err = Dispatcher::default()
            .dispatch_with(&token, &endpoints(["a"]), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ClientError>(()) }
            })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.attempted().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_call_leaves_later_calls_alone() {
        let dispatcher = Dispatcher::new(RetryPolicy::immediate(2));
        let calls = AtomicU32::new(0);
        let request = |ep: Endpoint| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, ClientError>(ep) }
        };

        let token = CancellationToken::new();
        token.cancel();
        let err = dispatcher
            .dispatch_with(&token, &endpoints(["a"]), request)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let out = dispatcher.dispatch(&endpoints(["a"]), request).await.unwrap();
        assert_eq!(out.origin, Endpoint::from("a"));
        let fresh = CancellationToken::new();
        let out = dispatcher
            .dispatch_with(&fresh, &endpoints(["a"]), request)
            .await
            .unwrap();
        assert_eq!(out.origin, Endpoint::from("a"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dispatched_map_keeps_origin() {
        let d = Dispatched {
            value: "0x10".to_string(),
            origin: Endpoint::from("a"),
        };
        let mapped = d.map(|s| s.len());
        assert_eq!(mapped.value, 4);
        assert_eq!(mapped.origin, Endpoint::from("a"));
    }
}
