//! Token Poller
//!
//! Reads a pin back at a fixed interval until the user approves it. The loop
//! is bounded by a deadline (the configured timeout, or the pin's own expiry
//! if sooner) and an optional attempt cap, and stops as soon as the caller's
//! cancellation token fires.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::{AccessToken, Pin, PinStatus};
use crate::config::PollConfig;
use crate::{Error, Result};

/// Something that can read a pin back by id
#[async_trait]
pub trait PinSource: Send + Sync {
    /// Fetch the current state of a pin
    async fn fetch_pin(&self, id: &str) -> Result<Pin>;
}

/// Bounded, cancellable pin poller
#[derive(Debug, Clone)]
pub struct TokenPoller {
    interval: Duration,
    timeout: Duration,
    max_attempts: Option<u32>,
}

impl TokenPoller {
    /// Create a poller
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            max_attempts: None,
        }
    }

    /// Create a poller from configuration
    #[must_use]
    pub fn from_config(config: &PollConfig) -> Self {
        Self {
            interval: config.interval,
            timeout: config.timeout,
            max_attempts: config.max_attempts,
        }
    }

    /// Cap the number of poll requests
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// How long polling `pin` may run: the timeout, or the pin's expiry if sooner
    #[must_use]
    pub fn budget_for(&self, pin: &Pin) -> Duration {
        pin.expires_in()
            .map_or(self.timeout, |expires_in| expires_in.min(self.timeout))
    }

    /// Poll until the pin is granted.
    ///
    /// A request is only issued if it starts no later than the deadline, so an
    /// endpoint that never grants sees at most `budget / interval + 1` requests.
    /// Network, transport and parse failures on a tick are retried within the
    /// same bound.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] once the deadline or attempt cap is reached,
    /// including when a request is still in flight at the deadline,
    /// [`Error::Cancelled`] if `cancel` fires, and any non-transient error from
    /// `source` as-is. A budget too large to represent as a deadline is a
    /// [`Error::Config`].
    pub async fn poll<S>(
        &self,
        source: &S,
        pin: &Pin,
        cancel: &CancellationToken,
    ) -> Result<AccessToken>
    where
        S: PinSource + ?Sized,
    {
        let started = Instant::now();
        let budget = self.budget_for(pin);
        let deadline = started
            .checked_add(budget)
            .ok_or_else(|| Error::Config(format!("poll budget {budget:?} is out of range")))?;
        let mut attempts = 0u32;
        let mut last_error: Option<String> = None;

        debug!(
            pin_id = %pin.id(),
            interval = ?self.interval,
            budget = ?budget,
            "Polling for authorization"
        );

        loop {
            attempts += 1;

            let tick = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                tick = source.fetch_pin(pin.id()) => tick,
                () = sleep_until(deadline) => {
                    warn!(pin_id = %pin.id(), attempt = attempts, "Poll request still pending at deadline");
                    return Err(Error::Timeout {
                        attempts,
                        elapsed: started.elapsed(),
                        last_error: Some("poll request did not complete before the deadline".to_string()),
                    });
                }
            };

            match tick {
                Ok(current) => match current.status() {
                    PinStatus::Granted(token) => {
                        info!(pin_id = %pin.id(), attempts, "Pin authorized");
                        return Ok(token);
                    }
                    PinStatus::Pending => {
                        debug!(pin_id = %pin.id(), attempt = attempts, "Pin not yet authorized");
                        last_error = None;
                    }
                },
                Err(e) if e.is_transient() => {
                    warn!(pin_id = %pin.id(), attempt = attempts, error = %e, "Poll attempt failed");
                    last_error = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }

            let exhausted = self.max_attempts.is_some_and(|max| attempts >= max);
            let past_deadline = Instant::now()
                .checked_add(self.interval)
                .is_none_or(|next| next > deadline);
            if exhausted || past_deadline {
                return Err(Error::Timeout {
                    attempts,
                    elapsed: started.elapsed(),
                    last_error,
                });
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin::parse_pin;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays scripted responses, then repeats the fallback forever
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Pin>>>,
        fallback: fn() -> Result<Pin>,
        calls: AtomicU32,
        requested_ids: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Pin>>, fallback: fn() -> Result<Pin>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: AtomicU32::new(0),
                requested_ids: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PinSource for ScriptedSource {
        async fn fetch_pin(&self, id: &str) -> Result<Pin> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested_ids.lock().unwrap().push(id.to_string());
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(self.fallback)
        }
    }

    fn pending() -> Result<Pin> {
        Ok(pin(None))
    }

    fn granted(token: &str) -> Result<Pin> {
        Ok(pin(Some(token)))
    }

    fn pin(token: Option<&str>) -> Pin {
        let token = token.unwrap_or_default();
        parse_pin(&format!(r#"<pin id="1" code="XYZ9" authToken="{token}"/>"#)).unwrap()
    }

    fn expiring_pin(expires_in_secs: u64) -> Pin {
        parse_pin(&format!(r#"<pin id="1" code="XYZ9" expiresIn="{expires_in_secs}"/>"#)).unwrap()
    }

    /// Answers every fetch with a pending pin, but only after `delay`
    struct SlowSource {
        delay: Duration,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PinSource for SlowSource {
        async fn fetch_pin(&self, _id: &str) -> Result<Pin> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(self.delay).await;
            Ok(pin(None))
        }
    }

    fn poller() -> TokenPoller {
        TokenPoller::new(Duration::from_secs(1), Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn returns_token_after_pending_ticks() {
        let source = ScriptedSource::new(
            vec![pending(), pending(), granted("tok-1")],
            || panic!("polled after the token was granted"),
        );
        let started = Instant::now();

        let token = poller()
            .poll(&source, &pin(None), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(token.as_str(), "tok-1");
        assert_eq!(source.calls(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert!(source.requested_ids.lock().unwrap().iter().all(|id| id == "1"));
    }

    #[tokio::test(start_paused = true)]
    async fn granted_on_first_tick_does_not_sleep() {
        let source = ScriptedSource::new(vec![granted("tok-0")], pending);
        let started = Instant::now();

        let token = poller()
            .poll(&source, &pin(None), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(token.as_str(), "tok-0");
        assert_eq!(source.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn never_granted_times_out_within_request_bound() {
        let source = ScriptedSource::new(vec![], pending);
        let started = Instant::now();

        let err = poller()
            .poll(&source, &pin(None), &CancellationToken::new())
            .await
            .unwrap_err();

        // 5s budget / 1s interval + 1
        assert_eq!(source.calls(), 6);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        match err {
            Error::Timeout {
                attempts,
                elapsed,
                last_error,
            } => {
                assert_eq!(attempts, 6);
                assert_eq!(elapsed, Duration::from_secs(5));
                assert!(last_error.is_none());
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn uneven_budget_rounds_request_count_down() {
        let source = ScriptedSource::new(vec![], pending);
        let poller = TokenPoller::new(Duration::from_secs(2), Duration::from_secs(5));

        let err = poller
            .poll(&source, &pin(None), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { attempts: 3, .. }));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let source = ScriptedSource::new(
            vec![
                Err(Error::Parse("pin response has no id attribute".into())),
                Err(Error::Transport("pin request failed: HTTP 503".into())),
                Err(Error::Network("connection reset".into())),
                granted("tok-2"),
            ],
            pending,
        );

        let token = poller()
            .poll(&source, &pin(None), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(token.as_str(), "tok-2");
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_last_transient_error() {
        let source = ScriptedSource::new(vec![], || {
            Err(Error::Transport("pin request failed: HTTP 404".into()))
        });

        let err = poller()
            .poll(&source, &pin(None), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::Timeout { last_error, .. } => {
                assert!(last_error.unwrap().contains("HTTP 404"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(source.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_error_aborts_immediately() {
        let source = ScriptedSource::new(
            vec![pending(), Err(Error::Config("bad header".into()))],
            pending,
        );

        let err = poller()
            .poll(&source, &pin(None), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn max_attempts_caps_requests() {
        let source = ScriptedSource::new(vec![], pending);
        let poller = poller().with_max_attempts(2);

        let err = poller
            .poll(&source, &pin(None), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { attempts: 2, .. }));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pin_expiry_clamps_deadline() {
        let source = ScriptedSource::new(vec![], pending);

        let err = poller()
            .poll(&source, &expiring_pin(2), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { attempts: 3, .. }));
    }

    #[test]
    fn budget_prefers_shorter_of_timeout_and_expiry() {
        let poller = poller();
        assert_eq!(poller.budget_for(&pin(None)), Duration::from_secs(5));
        assert_eq!(poller.budget_for(&expiring_pin(1800)), Duration::from_secs(5));
        assert_eq!(poller.budget_for(&expiring_pin(3)), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_request_is_cut_off_at_deadline() {
        let source = SlowSource {
            delay: Duration::from_secs(60),
            calls: AtomicU32::new(0),
        };
        let started = Instant::now();

        let err = poller()
            .poll(&source, &pin(None), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        match err {
            Error::Timeout {
                attempts,
                elapsed,
                last_error,
            } => {
                assert_eq!(attempts, 1);
                assert_eq!(elapsed, Duration::from_secs(5));
                assert!(last_error.unwrap().contains("deadline"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn request_slower_than_interval_still_polls_within_budget() {
        let source = SlowSource {
            delay: Duration::from_millis(1500),
            calls: AtomicU32::new(0),
        };
        let started = Instant::now();

        let err = poller()
            .poll(&source, &pin(None), &CancellationToken::new())
            .await
            .unwrap_err();

        // requests start at 0s, 2.5s and 5s; the third is cut off at the deadline
        assert!(matches!(err, Error::Timeout { attempts: 3, .. }), "got {err:?}");
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_deadline_is_config_error() {
        let source = ScriptedSource::new(vec![], pending);
        let poller = TokenPoller::new(Duration::from_secs(1), Duration::from_secs(u64::MAX));

        let err = poller
            .poll(&source, &pin(None), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Config(_)), "got {err:?}");
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let source = ScriptedSource::new(vec![], pending);
        let cancel = CancellationToken::new();
        let poller = TokenPoller::new(Duration::from_secs(1), Duration::from_secs(60));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(2500)).await;
            trigger.cancel();
        });

        let err = poller.poll(&source, &pin(None), &cancel).await.unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        // ticks at 0s, 1s, 2s; cancelled while sleeping towards 3s
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_issues_no_requests() {
        let source = ScriptedSource::new(vec![], pending);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = poller().poll(&source, &pin(None), &cancel).await.unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(source.calls(), 0);
    }

    #[test]
    fn from_config_copies_bounds() {
        let config = PollConfig {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
            max_attempts: Some(4),
        };
        let poller = TokenPoller::from_config(&config);
        assert_eq!(poller.interval, Duration::from_millis(500));
        assert_eq!(poller.timeout, Duration::from_secs(10));
        assert_eq!(poller.max_attempts, Some(4));
    }
}
