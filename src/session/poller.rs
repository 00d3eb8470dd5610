//! Session event polling
//!
//! After the session is connected, the server is asked for queued events in a
//! strictly sequential loop. Transient failures are retried with exponential
//! backoff up to the configured ceiling.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::signaling::{PollResult, RpcError, SignalingApi};

use super::config::PollPolicy;
use super::events::{SessionEvent, SessionEventSender};
use super::notification::{Notification, Notifier};
use super::state::{PollState, Session};

/// Delay before the next retry, or `None` once the ceiling is reached
///
/// The first retry waits one backoff unit, doubling on each consecutive failure.
pub fn retry_delay(policy: &PollPolicy, error_try_count: u32) -> Option<Duration> {
    if error_try_count >= policy.max_error_tries {
        return None;
    }
    Some(policy.backoff_unit.saturating_mul(1u32 << error_try_count))
}

/// Long-poll loop owner; the only writer of `poll_state` and `error_try_count`
pub(crate) struct EventPoller {
    policy: PollPolicy,
    api: SignalingApi,
    events: SessionEventSender,
    timer: Option<JoinHandle<()>>,
    in_flight: bool,
}

impl EventPoller {
    pub(crate) fn new(policy: PollPolicy, api: SignalingApi, events: SessionEventSender) -> Self {
        Self {
            policy,
            api,
            events,
            timer: None,
            in_flight: false,
        }
    }

    /// Start polling; only the first call has an effect
    pub(crate) fn start(&mut self, session: &mut Session) {
        if session.poll_state != PollState::NotStarted {
            return;
        }
        session.poll_state = PollState::Polling;
        debug!("Event polling started");
        self.issue(session);
    }

    /// The scheduled cycle is due
    pub(crate) fn on_due(&mut self, session: &Session) {
        self.timer = None;
        if session.poll_state != PollState::Polling {
            return;
        }
        self.issue(session);
    }

    /// Deliver the events of a successful poll, in order, then reschedule
    pub(crate) fn on_success(&mut self, session: &mut Session, result: PollResult, notifier: &Notifier) {
        self.in_flight = false;
        session.error_try_count = 0;

        for event in result.events {
            notifier.emit(Notification::MediaEvent(event));
        }

        if session.poll_state != PollState::Stopped {
            self.schedule(Duration::ZERO);
        }
    }

    /// Schedule a retry, or hand back the error once the ceiling is reached
    pub(crate) fn on_failure(&mut self, session: &mut Session, error: RpcError) -> Result<(), RpcError> {
        self.in_flight = false;

        let Some(delay) = retry_delay(&self.policy, session.error_try_count) else {
            warn!(
                "Poll failed {} times in a row, giving up: {}",
                session.error_try_count, error
            );
            return Err(error);
        };

        warn!(
            "Poll failed ({}), retry {} in {:?}",
            error,
            session.error_try_count + 1,
            delay
        );
        if session.poll_state != PollState::Stopped {
            self.schedule(delay);
        }
        session.error_try_count += 1;
        Ok(())
    }

    /// Drop a failure that arrived after polling stopped
    pub(crate) fn discard_failure(&mut self, error: &RpcError) {
        self.in_flight = false;
        debug!("Poll failed after termination: {}", error);
    }

    /// Whether a poll request is waiting for its response
    pub(crate) fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Stop polling and cancel the pending cycle
    pub(crate) fn stop(&mut self, session: &mut Session) {
        session.poll_state = PollState::Stopped;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn issue(&mut self, session: &Session) {
        if self.in_flight {
            debug!("Poll already in flight");
            return;
        }
        let Some(session_id) = session.session_id().map(str::to_owned) else {
            warn!("Cannot poll without a session id");
            return;
        };

        self.in_flight = true;
        let api = self.api.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = api.poll(&session_id).await;
            let _ = events.send(SessionEvent::PollCompleted(result));
        });
    }

    fn schedule(&mut self, delay: Duration) {
        let events = self.events.clone();
        self.timer = Some(tokio::spawn(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            let _ = events.send(SessionEvent::PollDue);
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_from_one_unit() {
        let policy = PollPolicy::default();
        let delays: Vec<u64> = (0..10)
            .map(|tries| retry_delay(&policy, tries).unwrap().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 512]);
    }

    #[test]
    fn test_ceiling_reached() {
        let policy = PollPolicy::default();
        assert!(retry_delay(&policy, 10).is_none());
        assert!(retry_delay(&policy, 11).is_none());
    }

    #[test]
    fn test_backoff_scales_with_unit() {
        let policy = PollPolicy {
            max_error_tries: 3,
            backoff_unit: Duration::from_millis(100),
        };
        assert_eq!(retry_delay(&policy, 2), Some(Duration::from_millis(400)));
        assert_eq!(retry_delay(&policy, 3), None);
    }

    #[test]
    fn test_zero_ceiling_never_retries() {
        let policy = PollPolicy {
            max_error_tries: 0,
            backoff_unit: Duration::from_millis(1),
        };
        assert!(retry_delay(&policy, 0).is_none());
    }
}
