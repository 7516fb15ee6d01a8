use app::user;
use dashmap::DashMap;
use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

/// Allows each admin at most `limit` requests within any window of length `span`.
pub struct RateLimit {
    limit: usize,
    span: Duration,
    requests: DashMap<user::Id, VecDeque<Instant>>,
}

impl RateLimit {
    pub fn new(limit: usize, span: Duration) -> Self {
        Self {
            limit,
            span,
            requests: DashMap::new(),
        }
    }

    /// Returns true if the user should be rate limited, false otherwise.
    pub fn limit(&self, user_id: user::Id) -> bool {
        self.limit_at(user_id, Instant::now())
    }

    fn limit_at(&self, user_id: user::Id, now: Instant) -> bool {
        // Admins without a request in the last span have nothing left to count.
        self.requests.retain(|_, requests| {
            requests
                .back()
                .map_or(false, |&last| now.saturating_duration_since(last) < self.span)
        });
        let mut requests = self.requests.entry(user_id).or_default();
        while let Some(&oldest) = requests.front() {
            if now.saturating_duration_since(oldest) < self.span {
                break;
            }
            requests.pop_front();
        }
        if requests.len() >= self.limit {
            true
        } else {
            requests.push_back(now);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn limits_within_span_and_recovers_after() {
        let rate_limit = RateLimit::new(2, Duration::from_secs(10));
        let admin = user::Id(Uuid::new_v4());
        let start = Instant::now();

        assert!(!rate_limit.limit_at(admin, start));
        assert!(!rate_limit.limit_at(admin, start + Duration::from_secs(1)));
        assert!(rate_limit.limit_at(admin, start + Duration::from_secs(2)));

        // The first request leaves the window, making room for exactly one more.
        assert!(!rate_limit.limit_at(admin, start + Duration::from_secs(10)));
        assert!(rate_limit.limit_at(admin, start + Duration::from_secs(10)));
    }

    #[test]
    fn idle_admins_are_forgotten() {
        let rate_limit = RateLimit::new(5, Duration::from_secs(10));
        let idle = user::Id(Uuid::new_v4());
        let active = user::Id(Uuid::new_v4());
        let start = Instant::now();

        assert!(!rate_limit.limit_at(idle, start));
        assert!(!rate_limit.limit_at(active, start + Duration::from_secs(5)));
        assert_eq!(rate_limit.requests.len(), 2);

        assert!(!rate_limit.limit_at(active, start + Duration::from_secs(12)));
        assert_eq!(rate_limit.requests.len(), 1);
        assert!(rate_limit.requests.contains_key(&active));
    }

    #[test]
    fn admins_are_limited_separately() {
        let rate_limit = RateLimit::new(1, Duration::from_secs(10));
        let start = Instant::now();
        assert!(!rate_limit.limit_at(user::Id(Uuid::new_v4()), start));
        assert!(!rate_limit.limit_at(user::Id(Uuid::new_v4()), start));
    }
}
