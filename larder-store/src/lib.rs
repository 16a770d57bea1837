pub mod app_config;
pub mod database;
pub mod stock_repo;
pub mod discount_repo;
pub mod customer_repo;
pub mod order_repo;
pub mod redis_repo;
pub mod events;

pub use app_config::{Config, StorageBackend};
pub use database::DbClient;
pub use stock_repo::PgStockStore;
pub use discount_repo::PgDiscountRepository;
pub use customer_repo::PgCustomerDirectory;
pub use order_repo::PgOrderRepository;
pub use redis_repo::RedisOrderListCache;
pub use events::EventProducer;
