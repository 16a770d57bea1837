use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use larder_api::{app, AppState, AuthConfig};
use larder_catalog::{InMemoryDiscountRepository, InMemoryStockStore};
use larder_core::{InMemoryCustomerDirectory, LogNotifier, Notifier};
use larder_order::{InMemoryOrderListCache, InMemoryOrderRepository, OrderConfig, OrderListCache, OrderStores};
use larder_store::{
    Config, DbClient, EventProducer, PgCustomerDirectory, PgDiscountRepository, PgOrderRepository,
    PgStockStore, RedisOrderListCache, StorageBackend,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "larder_api=debug,larder_order=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Larder API on port {} ({:?} storage)", config.server.port, config.storage.backend);

    let cache: Arc<dyn OrderListCache> = match &config.redis.url {
        Some(url) => Arc::new(
            RedisOrderListCache::new(url, config.redis.cache_ttl_seconds).context("Failed to open Redis client")?,
        ),
        None => {
            tracing::warn!("No redis.url configured, order lists cached in process");
            Arc::new(InMemoryOrderListCache::new())
        }
    };

    let stores = match config.storage.backend {
        StorageBackend::Postgres => {
            let db = DbClient::new(&config.database.url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;

            OrderStores {
                customers: Arc::new(PgCustomerDirectory::new(db.pool.clone())),
                stock: Arc::new(PgStockStore::new(db.pool.clone())),
                discounts: Arc::new(PgDiscountRepository::new(db.pool.clone())),
                orders: Arc::new(PgOrderRepository::new(db.pool.clone())),
                cache,
            }
        }
        StorageBackend::Memory => {
            tracing::warn!("Memory storage: nothing survives a restart");
            OrderStores {
                customers: Arc::new(InMemoryCustomerDirectory::new()),
                stock: Arc::new(InMemoryStockStore::new()),
                discounts: Arc::new(InMemoryDiscountRepository::new()),
                orders: Arc::new(InMemoryOrderRepository::new()),
                cache,
            }
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.kafka.brokers {
        Some(brokers) => Arc::new(EventProducer::new(brokers).context("Failed to create Kafka producer")?),
        None => Arc::new(LogNotifier),
    };

    let app_state = AppState::new(
        stores,
        notifier,
        OrderConfig::from(&config.orders),
        AuthConfig { secret: config.auth.jwt_secret.clone() },
    )?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(app_state)).await?;
    Ok(())
}
