/// Redis wrapper with graceful degradation.
///
/// Every operation returns `Option<T>` or `bool`. On any Redis error the operation logs a
/// warning and reports a miss, so callers fall through to the source of truth. The service
/// is fully functional without Redis.
use redis::AsyncCommands;
use tracing::warn;

pub struct RedisCache {
    client: Option<redis::Client>,
}

impl RedisCache {
    /// Create a client for `url`. `None` or an unparseable URL yields a cache that always misses.
    pub fn new(url: Option<&str>) -> Self {
        let client = url.and_then(|u| {
            redis::Client::open(u)
                .inspect_err(|e| warn!(error = %e, "failed to create redis client, shared cache disabled"))
                .ok()
        });
        Self { client }
    }

    /// A cache with no backing server.
    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Send a PING. Returns `true` if Redis is reachable.
    pub async fn is_available(&self) -> bool {
        let Some(client) = &self.client else {
            return false;
        };
        match client.get_multiplexed_async_connection().await {
            Ok(mut conn) => {
                let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
                result.is_ok()
            }
            Err(_) => false,
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let client = self.client.as_ref()?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .inspect_err(|e| warn!(error = %e, "redis connection failed"))
            .ok()?;
        let value: Option<String> = conn
            .get(key)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis GET failed"))
            .ok()?;
        value
    }

    /// SETEX. Returns `true` if the value was stored.
    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> bool {
        let Some(client) = &self.client else {
            return false;
        };
        let Ok(mut conn) = client
            .get_multiplexed_async_connection()
            .await
            .inspect_err(|e| warn!(error = %e, "redis connection failed"))
        else {
            return false;
        };
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis SETEX failed"))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = RedisCache::disabled();
        assert!(!cache.is_configured());
        assert!(!cache.is_available().await);
        assert_eq!(cache.get("dining:v1:menu:Dinner:2024-12-25").await, None);
        assert!(!cache.set_with_ttl("k", "v", 60).await);
    }

    #[test]
    fn invalid_url_disables_cache() {
        let cache = RedisCache::new(Some("not a redis url"));
        assert!(!cache.is_configured());
    }
}
