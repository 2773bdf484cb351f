//! Runtime settings for the game server.

use shared::WinRule;
use std::net::SocketAddr;
use std::time::Duration;

/// How hard to try when a connection's outbound queue is full.
///
/// Enqueueing is attempted without blocking; on a full queue the sender
/// sleeps `delay` and tries again, `attempts` times in total, then drops
/// the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Longest time a single delivery can hold up its caller.
    pub fn max_wait(&self) -> Duration {
        self.delay * self.attempts.saturating_sub(1)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Outbound messages buffered per connection before backoff kicks in.
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
    pub win_rule: WinRule,
    /// How often finished and abandoned rooms are swept.
    pub reap_interval: Duration,
    /// Fixes the first-mover coin flips when set.
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            queue_capacity: 8,
            retry: RetryPolicy::default(),
            win_rule: WinRule::ExactlyFive,
            reap_interval: Duration::from_secs(60),
            seed: None,
        }
    }
}

impl ServerConfig {
    /// tokio bounded channels need room for at least one message.
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}
