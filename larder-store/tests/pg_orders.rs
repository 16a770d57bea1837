use chrono::Utc;
use larder_catalog::StockStore;
use larder_order::{
    BackorderLine, FulfillmentLine, FulfillmentPlan, InMemoryOrderListCache, OrderLedger, OrderRepository,
    OrderStateMachine, OrderStatus, StatusChange,
};
use larder_store::{DbClient, PgOrderRepository, PgStockStore};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a scratch database");
    let db = DbClient::new(&url, 2).await.unwrap();
    db.migrate().await.unwrap();
    db.pool
}

async fn seed_customer(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO customers (id, business_name, email, is_approved) VALUES ($1, $2, $3, TRUE)")
        .bind(id)
        .bind("Taberna El Puerto")
        .bind("pedidos@elpuerto.es")
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn seed_product(pool: &PgPool, name: &str, on_hand: i32) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO products (id, name, category, base_price_cents, on_hand) VALUES ($1, $2, 'despensa', 500, $3)")
        .bind(id)
        .bind(name)
        .bind(on_hand)
        .execute(pool)
        .await
        .unwrap();
    id
}

fn line(product_id: Uuid, quantity: i32) -> FulfillmentLine {
    FulfillmentLine {
        product_id,
        product_name: format!("producto {}", product_id),
        quantity,
        unit_price_cents: 500,
        discount_percentage: 0.0,
        total_price_cents: 500 * i64::from(quantity),
    }
}

#[tokio::test]
#[ignore] // needs DATABASE_URL
async fn test_order_lines_come_back_in_placement_order() {
    let pool = pool().await;
    let customer = seed_customer(&pool).await;
    let mut products = Vec::new();
    for n in 0..6 {
        products.push(seed_product(&pool, &format!("Legumbre {}", n), 50).await);
    }

    let ledger = OrderLedger::new(
        Arc::new(PgOrderRepository::new(pool.clone())),
        Arc::new(InMemoryOrderListCache::new()),
    );
    let plan = FulfillmentPlan {
        lines: products.iter().map(|id| line(*id, 2)).collect(),
        backorders: products
            .iter()
            .rev()
            .map(|id| BackorderLine {
                product_id: *id,
                product_name: "pendiente".into(),
                requested_quantity: 5,
                available_quantity: 2,
                backorder_quantity: 3,
            })
            .collect(),
    };
    let order = ledger.create(customer, &plan, None).await.unwrap();

    let stored = ledger.get(order.id).await.unwrap();
    let item_products: Vec<Uuid> = stored.items.iter().map(|item| item.product_id).collect();
    let backorder_products: Vec<Uuid> = stored.backorder_items.iter().map(|item| item.product_id).collect();
    assert_eq!(item_products, products);
    assert_eq!(backorder_products, products.iter().rev().copied().collect::<Vec<_>>());
}

#[tokio::test]
#[ignore] // needs DATABASE_URL
async fn test_cancel_restocks_and_reopen_clears_cancellation() {
    let pool = pool().await;
    let customer = seed_customer(&pool).await;
    let rice = seed_product(&pool, "Arroz bomba 5kg", 10).await;

    let stock = Arc::new(PgStockStore::new(pool.clone()));
    let repo = Arc::new(PgOrderRepository::new(pool.clone()));
    let ledger = Arc::new(OrderLedger::new(repo.clone(), Arc::new(InMemoryOrderListCache::new())));
    let machine = OrderStateMachine::new(ledger.clone(), stock.clone());

    stock.try_decrement(rice, 4).await.unwrap().unwrap();
    let order = ledger
        .create(customer, &FulfillmentPlan { lines: vec![line(rice, 4)], backorders: vec![] }, None)
        .await
        .unwrap();

    // a pending order is not cancelled, so there is nothing to reopen
    assert!(!repo.reopen(order.id, OrderStatus::Pending, Utc::now()).await.unwrap());

    let cancel = StatusChange { to: OrderStatus::Cancelled, at: Utc::now(), reason: Some("cerrado".into()) };
    assert!(repo.transition(order.id, OrderStatus::Pending, &cancel).await.unwrap());
    assert!(repo.reopen(order.id, OrderStatus::Pending, Utc::now()).await.unwrap());
    let reopened = ledger.get(order.id).await.unwrap();
    assert_eq!(reopened.status, OrderStatus::Pending);
    assert!(reopened.cancelled_at.is_none());
    assert!(reopened.cancellation_reason.is_none());

    let cancelled = machine.transition(order.id, OrderStatus::Cancelled, None).await.unwrap();
    assert_eq!(cancelled.restocked[0].quantity_restored, 4);
    assert_eq!(stock.on_hand(rice).await.unwrap(), Some(10));
}
