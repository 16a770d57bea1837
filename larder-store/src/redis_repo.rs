use async_trait::async_trait;
use larder_core::{StoreError, StoreResult};
use larder_order::{CacheScope, Order, OrderFilter, OrderListCache};
use redis::AsyncCommands;
use tracing::debug;
use uuid::Uuid;

/// Order list cache in Redis.
///
/// `orders:gen:{scope}` holds a counter per scope; entries live under
/// `orders:list:{scope}:{generation}:{filter}`. Invalidation only bumps
/// counters, the TTL collects entries nobody can reach anymore.
#[derive(Clone)]
pub struct RedisOrderListCache {
    client: redis::Client,
    ttl_seconds: u64,
}

impl RedisOrderListCache {
    pub fn new(connection_string: &str, ttl_seconds: u64) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client, ttl_seconds })
    }

    async fn connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(cache_error)
    }
}

fn cache_error(e: redis::RedisError) -> StoreError {
    StoreError::Cache(e.to_string())
}

fn scope_key(scope: CacheScope) -> String {
    match scope {
        CacheScope::Customer(id) => format!("customer:{}", id),
        CacheScope::All => "all".to_string(),
    }
}

fn generation_key(scope: CacheScope) -> String {
    format!("orders:gen:{}", scope_key(scope))
}

fn entry_key(filter: &OrderFilter, generation: u64) -> String {
    format!(
        "orders:list:{}:{}:{}:{}:{}",
        scope_key(CacheScope::of(filter)),
        generation,
        filter.status.map_or("any", |s| s.as_str()),
        filter.limit,
        filter.offset
    )
}

#[async_trait]
impl OrderListCache for RedisOrderListCache {
    async fn generation(&self, scope: CacheScope) -> StoreResult<u64> {
        let mut conn = self.connection().await?;
        let generation: Option<u64> = conn.get(generation_key(scope)).await.map_err(cache_error)?;
        Ok(generation.unwrap_or(0))
    }

    async fn get(&self, filter: &OrderFilter, generation: u64) -> StoreResult<Option<Vec<Order>>> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(entry_key(filter, generation)).await.map_err(cache_error)?;

        payload
            .map(|json| serde_json::from_str(&json).map_err(|e| StoreError::Corrupt(e.to_string())))
            .transpose()
    }

    async fn put(&self, filter: &OrderFilter, generation: u64, orders: &[Order]) -> StoreResult<()> {
        let payload = serde_json::to_string(orders).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let mut conn = self.connection().await?;

        // Store only while the scope is still at the generation the reader saw.
        let script = redis::Script::new(
            r#"
            local current = tonumber(redis.call("GET", KEYS[1]) or "0")
            if current == tonumber(ARGV[1]) then
                redis.call("SET", KEYS[2], ARGV[2], "EX", ARGV[3])
                return 1
            end
            return 0
        "#,
        );

        let stored: i32 = script
            .key(generation_key(CacheScope::of(filter)))
            .key(entry_key(filter, generation))
            .arg(generation)
            .arg(payload)
            .arg(self.ttl_seconds)
            .invoke_async(&mut conn)
            .await
            .map_err(cache_error)?;

        if stored == 0 {
            debug!("Dropped stale order list entry at generation {}", generation);
        }
        Ok(())
    }

    async fn invalidate(&self, customer_id: Uuid) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .incr(generation_key(CacheScope::Customer(customer_id)), 1)
            .ignore()
            .incr(generation_key(CacheScope::All), 1)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(cache_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_order::OrderStatus;

    #[test]
    fn test_entry_keys_separate_scopes_and_generations() {
        let customer = Uuid::new_v4();
        let mine = OrderFilter { customer_id: Some(customer), status: None, limit: 20, offset: 0 };
        let staff = OrderFilter { customer_id: None, status: Some(OrderStatus::Pending), limit: 20, offset: 0 };

        assert_eq!(
            entry_key(&mine, 3),
            format!("orders:list:customer:{}:3:any:20:0", customer)
        );
        assert_eq!(entry_key(&staff, 0), "orders:list:all:0:pending:20:0");
        assert_ne!(entry_key(&mine, 3), entry_key(&mine, 4));
        assert_eq!(generation_key(CacheScope::All), "orders:gen:all");
    }
}
