//! Local rate limiting for auth flows.
//!
//! This runs in front of the backend, which applies its own limits; it only
//! keeps a single process from relaying unbounded credential guesses.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Login,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_email(&self, _email: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

/// Sliding-window limiter: at most `limit` attempts per key within `window`.
#[derive(Debug)]
pub struct WindowRateLimiter {
    limit: usize,
    window: Duration,
    attempts: Mutex<HashMap<(RateLimitAction, String), VecDeque<Instant>>>,
}

impl WindowRateLimiter {
    #[must_use]
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn record(&self, key: String, action: RateLimitAction) -> RateLimitDecision {
        let now = Instant::now();
        let mut attempts = self
            .attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Drop keys whose whole window has elapsed so the map stays bounded.
        attempts.retain(|_, seen| {
            seen.back()
                .is_some_and(|last| now.duration_since(*last) < self.window)
        });

        let seen = attempts.entry((action, key)).or_default();
        while seen
            .front()
            .is_some_and(|first| now.duration_since(*first) >= self.window)
        {
            seen.pop_front();
        }

        if seen.len() >= self.limit {
            return RateLimitDecision::Limited;
        }
        seen.push_back(now);
        RateLimitDecision::Allowed
    }
}

impl RateLimiter for WindowRateLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        match ip {
            Some(ip) => self.record(format!("ip:{ip}"), action),
            None => RateLimitDecision::Allowed,
        }
    }

    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision {
        self.record(format!("email:{}", email.to_lowercase()), action)
    }
}
