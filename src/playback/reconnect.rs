use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MULTIPLIER: u32 = 2;
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Exponential backoff for reconnecting a failed stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl ReconnectPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Whether retry number `attempt` (1-based) may be scheduled
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt < self.max_attempts
    }

    /// `min(base * multiplier^(attempt - 1), cap)`, saturating
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).checked_pow(exponent);
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let cap_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let delay_ms = match factor {
            Some(factor) => base_ms.saturating_mul(factor as u64),
            None => u64::MAX,
        };
        Duration::from_millis(delay_ms.min(cap_ms))
    }

    /// Delays for every retry the policy allows, in order
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|n| self.delay_for(n)).collect()
    }

    /// Sum of every delay in the schedule, saturating at `Duration::MAX`
    pub fn total_delay(&self) -> Duration {
        (1..self.max_attempts)
            .map(|n| self.delay_for(n))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Message posted back to the owner task when a backoff delay elapses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectDue {
    pub ticket: u64,
}

#[derive(Debug)]
struct PendingReconnect {
    ticket: u64,
    attempt: u32,
    token: CancellationToken,
}

/// Owns at most one outstanding backoff timer.
///
/// Timers run as tokio tasks and post `ReconnectDue` unless cancelled. The
/// owner also checks the ticket on receipt, since a due message can already
/// be queued when the timer gets cancelled.
#[derive(Debug)]
pub struct ReconnectScheduler {
    due_tx: mpsc::UnboundedSender<ReconnectDue>,
    next_ticket: u64,
    pending: Option<PendingReconnect>,
}

impl ReconnectScheduler {
    pub fn new(due_tx: mpsc::UnboundedSender<ReconnectDue>) -> Self {
        Self {
            due_tx,
            next_ticket: 1,
            pending: None,
        }
    }

    /// Start a timer for `attempt`, replacing any pending one. Must be called
    /// from within a tokio runtime.
    pub fn schedule(&mut self, attempt: u32, delay: Duration) -> u64 {
        self.cancel();

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let token = CancellationToken::new();
        let child = token.clone();
        let due_tx = self.due_tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {
                    trace!("Reconnect timer {} cancelled", ticket);
                }
                _ = tokio::time::sleep(delay) => {
                    if !child.is_cancelled() {
                        let _ = due_tx.send(ReconnectDue { ticket });
                    }
                }
            }
        });

        debug!(
            "Scheduled reconnect attempt {} in {:?} (ticket {})",
            attempt, delay, ticket
        );
        self.pending = Some(PendingReconnect {
            ticket,
            attempt,
            token,
        });
        ticket
    }

    /// Cancel the outstanding timer. Returns true if one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.token.cancel();
                debug!(
                    "Cancelled reconnect attempt {} (ticket {})",
                    pending.attempt, pending.ticket
                );
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Accept a due message if it belongs to the live timer; returns its attempt
    pub fn take_due(&mut self, due: ReconnectDue) -> Option<u32> {
        match &self.pending {
            Some(pending) if pending.ticket == due.ticket && !pending.token.is_cancelled() => {
                self.pending.take().map(|p| p.attempt)
            }
            _ => {
                trace!("Ignoring stale reconnect ticket {}", due.ticket);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = policy
            .schedule()
            .iter()
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000, 30000]
        );
    }

    #[test]
    fn test_delay_never_exceeds_cap() {
        let policy = ReconnectPolicy::with_max_attempts(200);
        for attempt in 1..policy.max_attempts {
            let delay = policy.delay_for(attempt);
            assert!(delay <= policy.max_delay, "attempt {} gave {:?}", attempt, delay);
            let expected = 1000u64
                .saturating_mul(2u64.saturating_pow(attempt - 1))
                .min(30_000);
            assert_eq!(delay.as_millis() as u64, expected);
        }
    }

    #[test]
    fn test_huge_delays_saturate() {
        let policy = ReconnectPolicy {
            max_attempts: 1000,
            base_delay: Duration::MAX,
            multiplier: u32::MAX,
            max_delay: Duration::MAX,
        };
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(u64::MAX));
        assert!(policy.total_delay() >= Duration::from_millis(u64::MAX));
        assert_eq!(
            ReconnectPolicy::default().total_delay(),
            Duration::from_millis(151_000)
        );
    }

    #[test]
    fn test_allows_is_exclusive_of_max() {
        let policy = ReconnectPolicy::with_max_attempts(3);
        assert!(!policy.allows(0));
        assert!(policy.allows(1));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
        assert!(ReconnectPolicy::with_max_attempts(0).schedule().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = ReconnectScheduler::new(tx);
        let ticket = scheduler.schedule(1, Duration::from_millis(1000));

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(rx.try_recv().is_err(), "Timer fired early");

        let due = rx.recv().await.unwrap();
        assert_eq!(due.ticket, ticket);
        assert_eq!(scheduler.take_due(due), Some(1));
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = ReconnectScheduler::new(tx);
        scheduler.schedule(1, Duration::from_millis(1000));
        assert!(scheduler.cancel());
        assert!(!scheduler.cancel());

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_timer_ticket_is_stale() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler = ReconnectScheduler::new(tx);
        let first = scheduler.schedule(1, Duration::from_millis(1000));
        let second = scheduler.schedule(2, Duration::from_millis(2000));

        assert_eq!(scheduler.take_due(ReconnectDue { ticket: first }), None);
        assert_eq!(scheduler.take_due(ReconnectDue { ticket: second }), Some(2));
    }
}
