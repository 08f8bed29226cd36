use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Generates a random election timeout within the configured range
pub fn random_election_timeout(min_ms: u64, max_ms: u64) -> Duration {
    let mut rng = rand::thread_rng();
    let timeout_ms = rng.gen_range(min_ms..=max_ms);
    Duration::from_millis(timeout_ms)
}

/// In-memory failure-detection state of one node. Never persisted; a
/// restarted process starts over with a fresh deadline.
#[derive(Debug, Clone)]
pub struct ElectionTimer {
    min_ms: u64,
    max_ms: u64,
    last_heartbeat: Option<Instant>,
    last_heartbeat_at: Option<DateTime<Utc>>,
    deadline: Instant,
}

impl ElectionTimer {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms,
            max_ms,
            last_heartbeat: None,
            last_heartbeat_at: None,
            deadline: Instant::now() + random_election_timeout(min_ms, max_ms),
        }
    }

    /// Push the deadline out by a freshly drawn timeout from now
    pub fn reset(&mut self) -> Instant {
        self.deadline = Instant::now() + random_election_timeout(self.min_ms, self.max_ms);
        self.deadline
    }

    /// Record a heartbeat and reset the deadline
    pub fn heartbeat_received(&mut self) {
        self.last_heartbeat = Some(Instant::now());
        self.last_heartbeat_at = Some(Utc::now());
        self.reset();
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() > self.deadline
    }

    /// Time left until the deadline, zero once it has passed
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn since_last_heartbeat(&self) -> Option<Duration> {
        self.last_heartbeat.map(|at| at.elapsed())
    }

    pub fn last_heartbeat_at(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_election_timeout_in_range() {
        for _ in 0..100 {
            let timeout = random_election_timeout(150, 300);
            assert!(timeout >= Duration::from_millis(150));
            assert!(timeout <= Duration::from_millis(300));
        }
    }

    #[test]
    fn test_random_election_timeout_degenerate_range() {
        assert_eq!(random_election_timeout(200, 200), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_new_timer_is_not_expired() {
        let timer = ElectionTimer::new(1000, 2000);
        assert!(!timer.is_expired());
        assert!(timer.remaining() > Duration::from_millis(900));
        assert!(timer.since_last_heartbeat().is_none());
        assert!(timer.last_heartbeat_at().is_none());
    }

    #[tokio::test]
    async fn test_timer_expires() {
        let timer = ElectionTimer::new(10, 20);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(timer.is_expired());
        assert_eq!(timer.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_heartbeat_resets_deadline() {
        let mut timer = ElectionTimer::new(10, 20);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(timer.is_expired());

        timer.heartbeat_received();
        assert!(!timer.is_expired());
        assert!(timer.since_last_heartbeat().is_some());
        assert!(timer.last_heartbeat_at().is_some());
    }
}
