//! Bounded wait-for-completion loop over the registration endpoint.
//!
//! The loop calls the register-or-check endpoint until it reports a finished
//! or failed registration, or the attempt budget runs out. Running out of
//! attempts is not an error: the job may still finish on the provider side.

use crate::client::{RegisterOptions, RegistrationClient, RegistrationResult};
use element_core::{AssetRef, BackoffStrategy, ElementError, RegistrationConfig, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Spacing between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay after every attempt
    Fixed,
    /// Delay grows by `multiplier` after every attempt, capped at `max_interval`
    Exponential { multiplier: f64, max_interval: Duration },
}

/// Attempt budget and spacing of a poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Maximum number of calls to the endpoint
    pub max_attempts: u32,
    /// Base delay between calls
    pub interval: Duration,
    pub backoff: Backoff,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::fixed(20, Duration::from_millis(3000))
    }
}

impl PollPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(
        max_attempts: u32,
        interval: Duration,
        multiplier: f64,
        max_interval: Duration,
    ) -> Self {
        Self {
            max_attempts,
            interval,
            backoff: Backoff::Exponential {
                multiplier,
                max_interval,
            },
        }
    }

    /// Delay to wait after the given 1-based attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential {
                multiplier,
                max_interval,
            } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let secs = self.interval.as_secs_f64() * multiplier.powi(exponent);
                Duration::from_secs_f64(secs.min(max_interval.as_secs_f64()))
            }
        }
    }

    /// Longest total time the loop can spend waiting between attempts.
    pub fn max_total_wait(&self) -> Duration {
        (1..self.max_attempts).map(|attempt| self.delay_after(attempt)).sum()
    }
}

impl From<&RegistrationConfig> for PollPolicy {
    fn from(config: &RegistrationConfig) -> Self {
        let interval = Duration::from_millis(config.interval_ms);
        match config.backoff {
            BackoffStrategy::Fixed => Self::fixed(config.max_attempts, interval),
            BackoffStrategy::Exponential => Self::exponential(
                config.max_attempts,
                interval,
                config.multiplier,
                Duration::from_millis(config.max_interval_ms),
            ),
        }
    }
}

/// How a poll loop ended, apart from a failed registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The provider issued a registration id
    Completed { id: String, attempts: u32 },
    /// Attempts ran out while the job was still processing
    Indeterminate { attempts: u32 },
    /// The cancellation token fired; any in-flight response was discarded
    Cancelled { attempts: u32 },
}

/// Drives a [`RegistrationClient`] until a terminal answer or budget exhaustion.
#[derive(Debug, Clone, Default)]
pub struct PollLoop {
    policy: PollPolicy,
}

impl PollLoop {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Poll the endpoint for `asset`.
    ///
    /// # Errors
    ///
    /// Returns [`ElementError::RegistrationFailed`] as soon as the provider
    /// reports a failure, and propagates transport errors of the client
    /// without retrying.
    pub async fn run(
        &self,
        client: &dyn RegistrationClient,
        asset: &AssetRef,
        options: RegisterOptions,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome> {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                debug!(%asset, attempt, "Registration poll cancelled before attempt");
                return Ok(PollOutcome::Cancelled {
                    attempts: attempt - 1,
                });
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(%asset, attempt, "Registration poll cancelled, discarding in-flight call");
                    return Ok(PollOutcome::Cancelled { attempts: attempt });
                }
                result = client.register(asset, options) => result,
            };

            match result {
                Ok(RegistrationResult::Completed { id }) => {
                    info!(%asset, attempt, registration_id = %id, "Registration completed");
                    return Ok(PollOutcome::Completed {
                        id,
                        attempts: attempt,
                    });
                }
                Ok(RegistrationResult::Failed { reason }) => {
                    warn!(%asset, attempt, %reason, "Registration failed");
                    return Err(ElementError::registration_failed(reason));
                }
                Ok(RegistrationResult::Processing { job_token }) => {
                    debug!(
                        %asset,
                        attempt,
                        max_attempts,
                        job_token = job_token.as_deref().unwrap_or("-"),
                        "Registration still processing"
                    );
                }
                Err(e) => {
                    warn!(%asset, attempt, error = %e, "Registration call failed");
                    return Err(e);
                }
            }

            if attempt == max_attempts {
                break;
            }

            let delay = self.policy.delay_after(attempt);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(%asset, attempt, "Registration poll cancelled while waiting");
                    return Ok(PollOutcome::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(
            %asset,
            attempts = max_attempts,
            "Registration still processing after all attempts"
        );
        Ok(PollOutcome::Indeterminate {
            attempts: max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use element_core::AssetType;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays a fixed script, then keeps answering `Processing`.
    #[derive(Default)]
    struct ScriptedClient {
        script: Mutex<VecDeque<Result<RegistrationResult>>>,
        calls: AtomicU32,
    }

    impl ScriptedClient {
        fn new(script: Vec<Result<RegistrationResult>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RegistrationClient for ScriptedClient {
        async fn register(
            &self,
            _asset: &AssetRef,
            _options: RegisterOptions,
        ) -> Result<RegistrationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(RegistrationResult::Processing { job_token: None }))
        }
    }

    fn processing() -> Result<RegistrationResult> {
        Ok(RegistrationResult::Processing {
            job_token: Some("job".to_string()),
        })
    }

    fn asset() -> AssetRef {
        AssetRef::new(AssetType::Character, "a1")
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_after_processing() {
        let client = ScriptedClient::new(vec![
            processing(),
            processing(),
            Ok(RegistrationResult::Completed {
                id: "rk_99".to_string(),
            }),
        ]);
        let poll = PollLoop::new(PollPolicy::fixed(20, Duration::from_millis(3000)));
        let started = tokio::time::Instant::now();

        let outcome = poll
            .run(&client, &asset(), RegisterOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Completed {
                id: "rk_99".to_string(),
                attempts: 3
            }
        );
        assert_eq!(client.calls(), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(6000));
        assert!(elapsed < Duration::from_millis(6100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_not_retried() {
        let client = ScriptedClient::new(vec![Ok(RegistrationResult::Failed {
            reason: "quota".to_string(),
        })]);
        let poll = PollLoop::default();

        let err = poll
            .run(&client, &asset(), RegisterOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_registration_failed());
        assert!(err.to_string().contains("quota"));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_not_retried() {
        let client = ScriptedClient::new(vec![Err(ElementError::transport("connection reset"))]);
        let poll = PollLoop::default();

        let err = poll
            .run(&client, &asset(), RegisterOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ElementError::Transport(_)));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_is_indeterminate() {
        let client = ScriptedClient::default();
        let policy = PollPolicy::fixed(5, Duration::from_millis(3000));
        let bound = policy.interval * policy.max_attempts;
        let poll = PollLoop::new(policy);
        let started = tokio::time::Instant::now();

        let outcome = poll
            .run(&client, &asset(), RegisterOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Indeterminate { attempts: 5 });
        assert_eq!(client.calls(), 5);
        let elapsed = started.elapsed();
        assert!(elapsed <= bound);
        assert!(elapsed >= Duration::from_millis(12_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_stops_polling() {
        let client = Arc::new(ScriptedClient::default());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let client = client.clone();
            let cancel = cancel.clone();
            async move {
                PollLoop::default()
                    .run(client.as_ref(), &asset(), RegisterOptions::default(), &cancel)
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(4500)).await;
        cancel.cancel();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 2 });

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(client.calls(), 2);
    }

    /// Answers `Completed` only after a long delay.
    struct SlowClient {
        delay: Duration,
        answered: AtomicU32,
    }

    #[async_trait]
    impl RegistrationClient for SlowClient {
        async fn register(
            &self,
            _asset: &AssetRef,
            _options: RegisterOptions,
        ) -> Result<RegistrationResult> {
            tokio::time::sleep(self.delay).await;
            self.answered.fetch_add(1, Ordering::SeqCst);
            Ok(RegistrationResult::Completed {
                id: "rk_late".to_string(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_call_discards_response() {
        let client = Arc::new(SlowClient {
            delay: Duration::from_secs(10),
            answered: AtomicU32::new(0),
        });
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let client = client.clone();
            let cancel = cancel.clone();
            async move {
                PollLoop::default()
                    .run(client.as_ref(), &asset(), RegisterOptions::default(), &cancel)
                    .await
            }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 1 });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(client.answered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_call() {
        let client = ScriptedClient::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = PollLoop::default()
            .run(&client, &asset(), RegisterOptions::default(), &cancel)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 0 });
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = PollPolicy::exponential(
            10,
            Duration::from_millis(1000),
            2.0,
            Duration::from_millis(5000),
        );
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_after(4), Duration::from_millis(5000));
        assert_eq!(policy.delay_after(9), Duration::from_millis(5000));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = PollPolicy::from(&RegistrationConfig::default());
        assert_eq!(policy, PollPolicy::default());
        assert_eq!(policy.max_total_wait(), Duration::from_millis(19 * 3000));
    }
}
