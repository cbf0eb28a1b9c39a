//! Runs against a real database when `TEST_DATABASE_URL` is set; every test
//! returns early otherwise.

use std::sync::{Arc, Once};

use order_service::postgres::{run_migrations, PgStorage};
use order_service::{EngineError, OrderEngine, UnitOfWork};
use shared::{Item, NewItem, NewUser, PlaceOrder};
use uuid::Uuid;

static MIGRATED: Once = Once::new();

async fn engine() -> Option<OrderEngine> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    MIGRATED.call_once(|| run_migrations(&url).unwrap());
    let storage = PgStorage::connect(&url, 16).await.unwrap();
    Some(OrderEngine::new(UnitOfWork::new(Arc::new(storage))))
}

async fn seed(engine: &OrderEngine, unit_price: i64, stock: i64) -> Item {
    engine
        .create_item(NewItem {
            name: "charmander".into(),
            status: "available".into(),
            unit_price,
            stock,
        })
        .await
        .unwrap()
}

async fn trainer(engine: &OrderEngine) -> i64 {
    engine
        .create_user(NewUser {
            user_name: format!("trainer-{}", Uuid::new_v4()),
            user_role: "GRUNT".into(),
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn place_reject_and_cancel_scenario() {
    let Some(engine) = engine().await else {
        return;
    };
    let user_id = trainer(&engine).await;
    let item = seed(&engine, 2000, 5).await;

    let first = engine
        .place_order(PlaceOrder {
            user_id,
            item_id: item.id,
            quantity: 2,
        })
        .await
        .unwrap();
    assert_eq!(first.total_price, 4000);
    assert_eq!(engine.get_item(item.id).await.unwrap().stock, 3);

    let err = engine
        .place_order(PlaceOrder {
            user_id,
            item_id: item.id,
            quantity: 10,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientStock { available: 3, .. }));
    assert_eq!(engine.get_item(item.id).await.unwrap().stock, 3);

    let receipt = engine.cancel_order(first.id).await.unwrap();
    assert_eq!(receipt.restored, 2);
    assert_eq!(engine.get_item(item.id).await.unwrap().stock, 5);

    let err = engine.cancel_order(first.id).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyCancelled(_)));
    assert_eq!(engine.get_item(item.id).await.unwrap().stock, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_never_oversell() {
    let Some(engine) = engine().await else {
        return;
    };
    let user_id = trainer(&engine).await;
    let item_id = seed(&engine, 10, 10).await.id;

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .place_order(PlaceOrder {
                        user_id,
                        item_id,
                        quantity: 3,
                    })
                    .await
            })
        })
        .collect();

    let mut placed = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            placed += 1;
        }
    }

    assert_eq!(placed, 3);
    assert_eq!(engine.get_item(item_id).await.unwrap().stock, 1);
}

#[tokio::test]
async fn order_for_unknown_user_violates_the_foreign_key() {
    let Some(engine) = engine().await else {
        return;
    };
    let item = seed(&engine, 10, 3).await;

    let err = engine
        .place_order(PlaceOrder {
            user_id: i64::MAX,
            item_id: item.id,
            quantity: 1,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WriteFailed(_)));
    assert_eq!(engine.get_item(item.id).await.unwrap().stock, 3);
}
