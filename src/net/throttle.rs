//! Outbound send throttle
//!
//! Token bucket owned by a connection's writer task. Producers never wait on
//! it: they enqueue frames and return, and the writer paces the socket.

use std::time::{Duration, Instant};

use crate::config::ThrottleConfig;

/// Token bucket pacing frames written to one connection
#[derive(Debug, Clone)]
pub struct OutboundThrottle {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
    delayed: u64,
}

impl OutboundThrottle {
    /// Create a full bucket holding `burst` tokens, refilled at `refill_per_sec`
    pub fn new(burst: u32, refill_per_sec: u32) -> Self {
        let capacity = burst.max(1) as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: refill_per_sec as f64,
            last_refill: Instant::now(),
            delayed: 0,
        }
    }

    /// Build from configuration; `None` when throttling is disabled
    pub fn from_config(config: &ThrottleConfig) -> Option<Self> {
        if config.refill_per_sec == 0 {
            return None;
        }
        Some(Self::new(config.burst, config.refill_per_sec))
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Take a token if one is available
    pub fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until the next token is available
    pub fn time_until_ready(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 || self.refill_per_sec <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((1.0 - self.tokens) / self.refill_per_sec)
    }

    /// Wait until a token is available, then take it
    pub async fn acquire(&mut self) {
        if self.try_acquire() {
            return;
        }
        self.delayed += 1;
        loop {
            let wait = self.time_until_ready();
            tokio::time::sleep(wait).await;
            if self.try_acquire() {
                return;
            }
        }
    }

    /// Whole tokens currently available
    pub fn available(&mut self) -> u32 {
        self.refill();
        self.tokens as u32
    }

    /// Number of frames that had to wait for a token
    pub fn delayed_count(&self) -> u64 {
        self.delayed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_empty() {
        let mut throttle = OutboundThrottle::new(3, 1);

        assert!(throttle.try_acquire());
        assert!(throttle.try_acquire());
        assert!(throttle.try_acquire());
        assert!(!throttle.try_acquire());
        assert!(throttle.time_until_ready() > Duration::ZERO);
    }

    #[test]
    fn test_disabled_by_config() {
        let config = ThrottleConfig {
            burst: 10,
            refill_per_sec: 0,
        };
        assert!(OutboundThrottle::from_config(&config).is_none());
        assert!(OutboundThrottle::from_config(&ThrottleConfig::default()).is_some());
    }

    #[tokio::test]
    async fn test_refill() {
        let mut throttle = OutboundThrottle::new(2, 100);
        assert!(throttle.try_acquire());
        assert!(throttle.try_acquire());
        assert!(!throttle.try_acquire());

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(throttle.try_acquire());
        // Never refills past the burst size
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(throttle.available(), 2);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_token() {
        let mut throttle = OutboundThrottle::new(1, 50);
        throttle.acquire().await;
        assert_eq!(throttle.delayed_count(), 0);

        let start = Instant::now();
        throttle.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(15));
        assert_eq!(throttle.delayed_count(), 1);
    }
}
