/// Menu cache keyed by `(meal, date)`.
///
/// Two tiers, both with the same fixed TTL:
/// - in-process map (always on); the lock is held only to copy in or out, never across an await
/// - Redis (optional), JSON under `dining:v1:menu:{meal}:{date}`, degrading to a miss on any error
///
/// Concurrent misses for the same key may both go to storage. That is accepted.
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use dining_common::redis::RedisCache;
use tracing::{debug, warn};

use crate::model::DiningHall;

const KEY_PREFIX: &str = "dining:v1:";

struct Entry {
    halls: Vec<DiningHall>,
    stored_at: Instant,
}

pub struct MenuCache {
    ttl: Duration,
    local: RwLock<HashMap<(String, String), Entry>>,
    redis: RedisCache,
}

impl MenuCache {
    pub fn new(ttl: Duration, redis: RedisCache) -> Self {
        Self {
            ttl,
            local: RwLock::new(HashMap::new()),
            redis,
        }
    }

    pub async fn get(&self, meal: &str, date: &str) -> Option<Vec<DiningHall>> {
        if let Some(halls) = self.get_local(meal, date) {
            debug!(meal, date, "menu cache hit (local)");
            return Some(halls);
        }

        let key = menu_key(meal, date);
        let json = self.redis.get(&key).await?;
        let halls: Vec<DiningHall> = serde_json::from_str(&json)
            .inspect_err(|e| warn!(error = %e, key, "cache deserialization failed"))
            .ok()?;
        debug!(meal, date, "menu cache hit (redis)");
        self.put_local(meal, date, halls.clone());
        Some(halls)
    }

    pub async fn put(&self, meal: &str, date: &str, halls: &[DiningHall]) {
        self.put_local(meal, date, halls.to_vec());
        if self.redis.is_configured() {
            if let Ok(json) = serde_json::to_string(halls) {
                self.redis
                    .set_with_ttl(&menu_key(meal, date), &json, self.ttl.as_secs().max(1))
                    .await;
            }
        }
    }

    fn get_local(&self, meal: &str, date: &str) -> Option<Vec<DiningHall>> {
        let local = self.local.read().unwrap_or_else(PoisonError::into_inner);
        let entry = local.get(&(meal.to_string(), date.to_string()))?;
        (entry.stored_at.elapsed() < self.ttl).then(|| entry.halls.clone())
    }

    fn put_local(&self, meal: &str, date: &str, halls: Vec<DiningHall>) {
        let mut local = self.local.write().unwrap_or_else(PoisonError::into_inner);
        local.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        local.insert(
            (meal.to_string(), date.to_string()),
            Entry {
                halls,
                stored_at: Instant::now(),
            },
        );
    }
}

fn menu_key(meal: &str, date: &str) -> String {
    format!("{KEY_PREFIX}menu:{meal}:{date}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn halls(name: &str) -> Vec<DiningHall> {
        vec![DiningHall {
            name: name.to_string(),
            food_items: vec![],
        }]
    }

    #[tokio::test]
    async fn returns_fresh_entries() {
        let cache = MenuCache::new(Duration::from_secs(60), RedisCache::disabled());
        cache.put("Dinner", "2024-12-25", &halls("A")).await;
        assert_eq!(cache.get("Dinner", "2024-12-25").await, Some(halls("A")));
    }

    #[tokio::test]
    async fn keys_by_meal_and_date() {
        let cache = MenuCache::new(Duration::from_secs(60), RedisCache::disabled());
        cache.put("Dinner", "2024-12-25", &halls("A")).await;
        assert_eq!(cache.get("Lunch", "2024-12-25").await, None);
        assert_eq!(cache.get("Dinner", "2024-12-26").await, None);
    }

    #[tokio::test]
    async fn stale_entries_are_misses() {
        let cache = MenuCache::new(Duration::ZERO, RedisCache::disabled());
        cache.put("Dinner", "2024-12-25", &halls("A")).await;
        assert_eq!(cache.get("Dinner", "2024-12-25").await, None);
    }

    #[test]
    fn key_layout() {
        assert_eq!(menu_key("Dinner", "2024-12-25"), "dining:v1:menu:Dinner:2024-12-25");
    }
}
