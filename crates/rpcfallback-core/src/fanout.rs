//! Concurrent fan-out: one attempt per endpoint, combined per
//! [`FanOutStrategy`].
//!
//! Fan-out never retries. Each attempt gets the same timeout and
//! cancellation wrapping as a sequential attempt. Once a winner is picked,
//! the remaining attempts are dropped, which cancels them if the
//! underlying request supports it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{Dispatched, Dispatcher};
use crate::endpoint::Endpoint;
use crate::error::{ClientError, DispatchError};
use crate::policy::FanOutStrategy;

/// The settled result of one fan-out attempt.
#[derive(Debug)]
pub struct Settled<T> {
    pub endpoint: Endpoint,
    pub result: Result<T, ClientError>,
}

/// Result of a fan-out call.
#[derive(Debug)]
pub enum FanOut<T> {
    /// `RaceFirst` and `FirstSuccess` resolve to a single winner.
    Winner(Dispatched<T>),
    /// `WaitAll` returns every outcome, in endpoint order.
    All(Vec<Settled<T>>),
}

impl<T> FanOut<T> {
    pub fn winner(self) -> Option<Dispatched<T>> {
        match self {
            Self::Winner(d) => Some(d),
            Self::All(_) => None,
        }
    }

    /// All settled outcomes; a winner becomes a single successful entry.
    pub fn into_settled(self) -> Vec<Settled<T>> {
        match self {
            Self::Winner(d) => vec![Settled {
                endpoint: d.origin,
                result: Ok(d.value),
            }],
            Self::All(all) => all,
        }
    }
}

impl Dispatcher {
    /// Issue the request to every endpoint at once and combine the
    /// outcomes per `strategy`.
    pub async fn fan_out<T, F, Fut>(
        &self,
        strategy: FanOutStrategy,
        endpoints: &[Endpoint],
        request: F,
    ) -> Result<FanOut<T>, DispatchError>
    where
        F: Fn(Endpoint) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        self.fan_out_with(&CancellationToken::new(), strategy, endpoints, request)
            .await
    }

    /// Like [`fan_out`](Self::fan_out), dropping every outstanding attempt
    /// once `cancel` fires.
    ///
    /// On cancellation `attempted` lists only the endpoints whose attempt
    /// had started running, in endpoint order.
    pub async fn fan_out_with<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        strategy: FanOutStrategy,
        endpoints: &[Endpoint],
        request: F,
    ) -> Result<FanOut<T>, DispatchError>
    where
        F: Fn(Endpoint) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        self.validate(endpoints)?;
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled { attempted: Vec::new() });
        }
        tracing::debug!(%strategy, endpoints = endpoints.len(), "fanning out request");

        let started: Vec<AtomicBool> = endpoints.iter().map(|_| AtomicBool::new(false)).collect();
        let mut pending: FuturesUnordered<_> = endpoints
            .iter()
            .enumerate()
            .map(|(index, endpoint)| {
                let attempt = self.timed(request(endpoint.clone()));
                let started = &started[index];
                async move {
                    started.store(true, Ordering::Relaxed);
                    (index, attempt.await)
                }
            })
            .collect();

        let mut slots: Vec<Option<Result<T, ClientError>>> =
            std::iter::repeat_with(|| None).take(endpoints.len()).collect();
        let mut last_error: Option<ClientError> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let attempted = endpoints
                        .iter()
                        .zip(&started)
                        .filter(|(_, started)| started.load(Ordering::Relaxed))
                        .map(|(endpoint, _)| endpoint.clone())
                        .collect();
                    return Err(DispatchError::Cancelled { attempted });
                }
                next = pending.next() => next,
            };
            let Some((index, result)) = next else { break };
            let endpoint = &endpoints[index];

            match (strategy, result) {
                (FanOutStrategy::RaceFirst, Ok(value))
                | (FanOutStrategy::FirstSuccess, Ok(value)) => {
                    tracing::debug!(%endpoint, %strategy, "fan-out winner");
                    return Ok(FanOut::Winner(Dispatched {
                        value,
                        origin: endpoint.clone(),
                    }));
                }
                (FanOutStrategy::RaceFirst, Err(error)) => {
                    tracing::warn!(%endpoint, %error, "first settled attempt failed");
                    return Err(DispatchError::RaceLost {
                        endpoint: endpoint.clone(),
                        error,
                    });
                }
                (FanOutStrategy::FirstSuccess, Err(error)) => {
                    tracing::warn!(%endpoint, %error, "fan-out attempt failed");
                    last_error = Some(error);
                }
                (FanOutStrategy::WaitAll, result) => {
                    if let Err(error) = &result {
                        tracing::warn!(%endpoint, %error, "fan-out attempt failed");
                    }
                    slots[index] = Some(result);
                }
            }
        }

        match strategy {
            FanOutStrategy::WaitAll => Ok(FanOut::All(
                endpoints
                    .iter()
                    .zip(slots)
                    .map(|(endpoint, slot)| Settled {
                        endpoint: endpoint.clone(),
                        result: slot.unwrap_or_else(|| {
                            Err(ClientError::Other("attempt never settled".into()))
                        }),
                    })
                    .collect(),
            )),
            _ => {
                let last_error = last_error
                    .unwrap_or_else(|| ClientError::Other("no attempt was made".into()));
                tracing::error!(
                    attempts = endpoints.len(),
                    error = %last_error,
                    "every fan-out attempt failed"
                );
                Err(DispatchError::Exhausted {
                    last_error,
                    attempted: endpoints.to_vec(),
                })
            }
        }
    }
}
