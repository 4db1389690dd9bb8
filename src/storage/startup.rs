//! Bounded connect-and-retry for store initialization.
//!
//! `Connecting` advances on every failed probe until the attempt budget runs
//! out (`Failed`, terminal) or a probe succeeds (`Ready`). The machine itself
//! is synchronous; [`wait_until_ready`] drives it against a [`Probe`].

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupState {
    /// Attempt number about to run, starting at 1.
    Connecting { attempt: u32 },
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

#[derive(Debug)]
pub struct Startup {
    policy: RetryPolicy,
    state: StartupState,
    last_error: Option<String>,
}

impl Startup {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: StartupState::Connecting { attempt: 1 },
            last_error: None,
        }
    }

    pub fn state(&self) -> StartupState {
        self.state
    }

    /// Feed the outcome of the current attempt and return the next state.
    /// Outcomes arriving after a terminal state are ignored.
    pub fn advance(&mut self, outcome: Result<(), String>) -> StartupState {
        let StartupState::Connecting { attempt } = self.state else {
            return self.state;
        };

        self.state = match outcome {
            Ok(()) => StartupState::Ready,
            Err(e) => {
                self.last_error = Some(e);
                if attempt >= self.policy.max_attempts {
                    StartupState::Failed
                } else {
                    StartupState::Connecting {
                        attempt: attempt + 1,
                    }
                }
            }
        };
        self.state
    }

    pub fn into_error(self) -> StoreError {
        StoreError::Init {
            attempts: self.policy.max_attempts,
            last_error: self.last_error.unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

/// A backend that can be asked whether it is reachable.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self) -> StoreResult<()>;
}

/// Probe until the backend answers or the policy is exhausted.
/// Returns the number of attempts used.
pub async fn wait_until_ready<P: Probe + ?Sized>(
    probe: &P,
    policy: RetryPolicy,
) -> StoreResult<u32> {
    let mut startup = Startup::new(policy);

    loop {
        let StartupState::Connecting { attempt } = startup.state() else {
            break;
        };

        let outcome = probe.probe().await.map_err(|e| e.to_string());
        if let Err(ref e) = outcome {
            tracing::warn!(
                error = %e,
                attempt,
                max_attempts = policy.max_attempts,
                "failed to reach the database, retrying..."
            );
        }

        match startup.advance(outcome) {
            StartupState::Ready => {
                tracing::info!(attempts = attempt, "database ready");
                return Ok(attempt);
            }
            StartupState::Connecting { .. } => tokio::time::sleep(policy.delay).await,
            StartupState::Failed => break,
        }
    }

    let err = startup.into_error();
    tracing::error!(error = %err, "database is not ready");
    Err(err)
}
