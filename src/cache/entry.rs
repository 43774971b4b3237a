//! Expiring Item Module
//!
//! A cached value paired with an absolute expiration instant.

use std::time::{Duration, Instant};

// == Expiring Item ==
/// A value that is logically absent once `now > expires_at`, even while it is
/// still physically present in the store waiting for a sweep.
#[derive(Debug, Clone)]
pub struct ExpiringItem<V> {
    /// The stored value
    pub value: V,
    /// Absolute expiration instant
    pub expires_at: Instant,
}

impl<V> ExpiringItem<V> {
    // == Constructor ==
    /// Creates an item expiring `ttl` after `now`.
    pub fn new(value: V, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: now + ttl,
        }
    }

    // == Is Expired ==
    /// The expiration instant itself is still live; only strictly later
    /// instants are expired.
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    // == Slide ==
    /// Pushes expiration to `now + ttl`.
    pub fn slide(&mut self, now: Instant, ttl: Duration) {
        self.expires_at = now + ttl;
    }

    /// Time left before expiry; zero once expired.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_not_expired_before_ttl() {
        let now = Instant::now();
        let item = ExpiringItem::new("v", now, Duration::from_millis(50));

        assert!(!item.is_expired(now));
        assert!(!item.is_expired(now + Duration::from_millis(49)));
        assert_eq!(item.remaining(now), Duration::from_millis(50));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = Instant::now();
        let item = ExpiringItem::new("v", now, Duration::from_millis(50));

        assert!(!item.is_expired(now + Duration::from_millis(50)));
        assert!(item.is_expired(now + Duration::from_millis(51)));
        assert_eq!(item.remaining(now + Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn test_slide_extends_expiration() {
        let now = Instant::now();
        let mut item = ExpiringItem::new("v", now, Duration::from_millis(50));

        let later = now + Duration::from_millis(40);
        item.slide(later, Duration::from_millis(50));

        assert!(!item.is_expired(now + Duration::from_millis(80)));
        assert_eq!(item.expires_at, later + Duration::from_millis(50));
    }
}
