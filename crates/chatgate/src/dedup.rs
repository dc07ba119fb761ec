//! Duplicate suppression for outbound messages.
//!
//! Guarantees only that the same text to the same recipient is not sent twice
//! within the cooldown window. It is not a rate limiter.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shortest period the sweeper will tick at.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Key identifying a (recipient, body) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(recipient: &str, body: &str) -> Self {
        Self(format!("{}:{}", recipient, body))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Time-windowed cache of recently accepted sends.
///
/// Each entry records when its fingerprint was last allowed through. An entry
/// blocks while it is younger than the window; older entries are inert until
/// a sweep removes them.
#[derive(Clone)]
pub struct DedupCache {
    entries: Arc<DashMap<Fingerprint, Instant>>,
    window: Duration,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true if `fingerprint` was accepted within the window.
    ///
    /// Otherwise records the current time for it and returns false.
    pub fn should_suppress(&self, fingerprint: &Fingerprint) -> bool {
        self.should_suppress_at(fingerprint, Instant::now())
    }

    pub fn should_suppress_at(&self, fingerprint: &Fingerprint, now: Instant) -> bool {
        match self.entries.entry(fingerprint.clone()) {
            Entry::Occupied(mut entry) => {
                if now.saturating_duration_since(*entry.get()) < self.window {
                    true
                } else {
                    entry.insert(now);
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                false
            }
        }
    }

    /// Forget an entry recorded at `recorded_at`, unless a later send has
    /// refreshed it since.
    pub fn release(&self, fingerprint: &Fingerprint, recorded_at: Instant) {
        self.entries
            .remove_if(fingerprint, |_, recorded| *recorded == recorded_at);
    }

    /// Remove every entry whose age has reached the window. Returns the number removed.
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    pub fn prune_at(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, recorded| {
            let live = now.saturating_duration_since(*recorded) < self.window;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    /// Empty the cache. Returns the number of entries it held.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, _| {
            removed += 1;
            false
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn a task that prunes the cache every `interval` until `cancel` fires.
    ///
    /// A zero `interval` is raised to one millisecond.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip immediate tick
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.prune();
                        if removed > 0 {
                            debug!(
                                removed,
                                remaining = cache.len(),
                                "Pruned expired duplicate entries"
                            );
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(30);

    fn fp(body: &str) -> Fingerprint {
        Fingerprint::new("254700000000@s.whatsapp.net", body)
    }

    #[test]
    fn test_fingerprint_format() {
        assert_eq!(
            Fingerprint::new("1@s.whatsapp.net", "hi there").as_str(),
            "1@s.whatsapp.net:hi there"
        );
    }

    #[test]
    fn test_second_send_within_window_is_suppressed() {
        let cache = DedupCache::new(WINDOW);
        let t0 = Instant::now();

        assert!(!cache.should_suppress_at(&fp("hi"), t0));
        assert!(cache.should_suppress_at(&fp("hi"), t0 + Duration::from_secs(29)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_suppression_does_not_refresh_timestamp() {
        let cache = DedupCache::new(WINDOW);
        let t0 = Instant::now();

        assert!(!cache.should_suppress_at(&fp("hi"), t0));
        assert!(cache.should_suppress_at(&fp("hi"), t0 + Duration::from_secs(20)));
        // Measured from t0, not from the suppressed attempt at t0+20s.
        assert!(!cache.should_suppress_at(&fp("hi"), t0 + Duration::from_secs(31)));
    }

    #[test]
    fn test_window_expiry_allows_and_refreshes() {
        let cache = DedupCache::new(WINDOW);
        let t0 = Instant::now();
        let t1 = t0 + WINDOW;

        assert!(!cache.should_suppress_at(&fp("hi"), t0));
        assert!(!cache.should_suppress_at(&fp("hi"), t1));
        assert!(cache.should_suppress_at(&fp("hi"), t1 + Duration::from_secs(1)));
    }

    #[test]
    fn test_distinct_recipient_or_body_not_suppressed() {
        let cache = DedupCache::new(WINDOW);
        let t0 = Instant::now();

        assert!(!cache.should_suppress_at(&fp("hi"), t0));
        assert!(!cache.should_suppress_at(&fp("hello"), t0));
        assert!(!cache.should_suppress_at(&Fingerprint::new("2@s.whatsapp.net", "hi"), t0));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_prune_removes_only_expired() {
        let cache = DedupCache::new(WINDOW);
        let t0 = Instant::now();

        cache.should_suppress_at(&fp("old"), t0);
        cache.should_suppress_at(&fp("new"), t0 + Duration::from_secs(20));

        assert_eq!(cache.prune_at(t0 + Duration::from_secs(10)), 0);
        assert_eq!(cache.prune_at(t0 + Duration::from_secs(35)), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.should_suppress_at(&fp("new"), t0 + Duration::from_secs(35)));
    }

    #[test]
    fn test_release_respects_newer_record() {
        let cache = DedupCache::new(WINDOW);
        let t0 = Instant::now();
        let t1 = t0 + WINDOW + Duration::from_secs(1);

        cache.should_suppress_at(&fp("hi"), t0);
        cache.should_suppress_at(&fp("hi"), t1);

        cache.release(&fp("hi"), t0);
        assert_eq!(cache.len(), 1);

        cache.release(&fp("hi"), t1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_returns_previous_size() {
        let cache = DedupCache::new(WINDOW);
        cache.should_suppress(&fp("a"));
        cache.should_suppress(&fp("b"));

        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.clear(), 0);
        assert!(!cache.should_suppress(&fp("a")));
    }

    #[tokio::test]
    async fn test_sweeper_prunes_and_stops() {
        let cache = DedupCache::new(Duration::from_millis(20));
        cache.should_suppress(&fp("hi"));

        let cancel = CancellationToken::new();
        let handle = cache.spawn_sweeper(Duration::from_millis(10), cancel.clone());

        for _ in 0..100 {
            if cache.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(cache.is_empty());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweeper_with_zero_interval_still_prunes() {
        let cache = DedupCache::new(Duration::from_millis(10));
        cache.should_suppress(&fp("hi"));

        let cancel = CancellationToken::new();
        let handle = cache.spawn_sweeper(Duration::ZERO, cancel.clone());

        for _ in 0..100 {
            if cache.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(cache.is_empty());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
