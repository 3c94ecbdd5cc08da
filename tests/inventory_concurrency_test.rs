mod common;

use assert_matches::assert_matches;
use std::sync::Arc;
use variant_inventory::{
    entities::AdjustmentOperation,
    services::inventory_adjustment_service::{ledger_is_consistent, AdjustInventoryCommand},
    ServiceError,
};

use common::{catalog, seed_family};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_subtracts_never_oversell() {
    let catalog = catalog();
    let variant = seed_family(&catalog, "Red", &["M"], 10).await.remove(0);
    let engine = Arc::new(catalog.engine.clone());

    // 20 concurrent single-unit subtracts against 10 on hand: exactly 10 win.
    let mut tasks = vec![];
    for _ in 0..20 {
        let engine = engine.clone();
        let id = variant.id;
        tasks.push(tokio::spawn(async move {
            engine
                .apply_adjustment(AdjustInventoryCommand::new(id, AdjustmentOperation::Subtract, 1.0))
                .await
        }));
    }

    let mut successes = 0;
    for task in tasks {
        match task.await.expect("task completes") {
            Ok(_) => successes += 1,
            Err(e) => assert_matches!(e, ServiceError::InsufficientStock(_)),
        }
    }

    assert_eq!(successes, 10);
    assert_eq!(engine.store.get(variant.id).unwrap().quantity, 0);

    let ledger = engine.store.adjustments_for(variant.id).unwrap();
    assert_eq!(ledger.len(), 10);
    assert!(ledger_is_consistent(&ledger));
    assert_eq!(engine.adjustments.replay_ledger(variant.id, 10).unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_variants_adjust_independently() {
    let catalog = catalog();
    let variants = seed_family(&catalog, "Blue", &["S", "M", "L", "XL"], 0).await;
    let engine = Arc::new(catalog.engine.clone());

    let mut tasks = vec![];
    for variant in &variants {
        for _ in 0..25 {
            let engine = engine.clone();
            let id = variant.id;
            tasks.push(tokio::spawn(async move {
                engine
                    .apply_adjustment(AdjustInventoryCommand::new(id, AdjustmentOperation::Add, 2.0))
                    .await
            }));
        }
    }
    for task in tasks {
        task.await.expect("task completes").expect("add succeeds");
    }

    for variant in &variants {
        let stored = engine.store.get(variant.id).unwrap();
        assert_eq!(stored.quantity, 50);
        assert_eq!(stored.version, 25);
        let ledger = engine.store.adjustments_for(variant.id).unwrap();
        assert!(ledger_is_consistent(&ledger));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn optimistic_writers_lose_cleanly() {
    let catalog = catalog();
    let variant = seed_family(&catalog, "Red", &["S"], 5).await.remove(0);
    let engine = Arc::new(catalog.engine.clone());

    let mut tasks = vec![];
    for _ in 0..8 {
        let engine = engine.clone();
        let id = variant.id;
        let version = variant.version;
        tasks.push(tokio::spawn(async move {
            engine
                .apply_adjustment(
                    AdjustInventoryCommand::new(id, AdjustmentOperation::Add, 1.0).expect_version(version),
                )
                .await
        }));
    }

    let mut winners = 0;
    for task in tasks {
        match task.await.expect("task completes") {
            Ok(_) => winners += 1,
            Err(e) => assert!(e.is_retryable()),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(engine.store.get(variant.id).unwrap().quantity, 6);
}
