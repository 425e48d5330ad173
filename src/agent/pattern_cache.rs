//! Intent fast-path cache (§4.5.1): "cache only what worked". Keyed by a
//! normalized goal text; entries are written only after the goal they were
//! classified for actually completed successfully downstream, so a bad
//! classification never gets reinforced.

use moka::future::Cache;
use std::time::Duration;

const MAX_ENTRIES: u64 = 10_000;
const TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

fn normalize(goal_text: &str) -> String {
    goal_text.trim().to_lowercase()
}

/// Caches the classified intent label for a goal text. No embeddings or
/// similarity search: lookups are on the normalized text itself, which
/// covers the common case of a recurring scheduled or templated goal.
pub struct PatternCache {
    inner: Cache<String, String>,
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternCache {
    pub fn new() -> Self {
        PatternCache {
            inner: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(TTL)
                .build(),
        }
    }

    pub async fn get(&self, goal_text: &str) -> Option<String> {
        self.inner.get(&normalize(goal_text)).await
    }

    /// Only call this after the goal's downstream execution succeeded.
    pub async fn record_success(&self, goal_text: &str, intent: &str) {
        self.inner
            .insert(normalize(goal_text), intent.to_string())
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_miss_before_any_success_recorded() {
        let cache = PatternCache::new();
        assert_eq!(cache.get("what time is it").await, None);
    }

    #[tokio::test]
    async fn test_hit_after_recording_success() {
        let cache = PatternCache::new();
        cache.record_success("What time is it?", "tool").await;
        assert_eq!(cache.get("what time is it?").await.as_deref(), Some("tool"));
    }
}
