mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;
use variant_inventory::{
    entities::{AdjustmentOperation, AdjustmentReason, SourceType},
    services::inventory_adjustment_service::{AdjustInventoryCommand, AdjustmentQuery},
    EngineConfig, Event, HealthStatus, ServiceError,
};

use common::{catalog, catalog_with, drain, seed_family};

#[tokio::test]
async fn add_subtract_and_set_record_one_entry_each() {
    let mut catalog = catalog();
    let variant = seed_family(&catalog, "Red", &["M"], 20).await.remove(0);
    let engine = &catalog.engine;

    let added = engine
        .apply_adjustment(
            AdjustInventoryCommand::new(variant.id, AdjustmentOperation::Add, 5.0)
                .reason(AdjustmentReason::Restock)
                .cost_per_unit(dec!(12.50)),
        )
        .await
        .unwrap();
    assert_eq!(added.variant.quantity, 25);
    assert_eq!(added.adjustment.delta, 5);
    assert_eq!(added.adjustment.cost_impact, Some(dec!(62.50)));

    let subtracted = engine
        .apply_adjustment(
            AdjustInventoryCommand::new(variant.id, AdjustmentOperation::Subtract, 7.0)
                .reason(AdjustmentReason::Damage)
                .note("water damage"),
        )
        .await
        .unwrap();
    assert_eq!(subtracted.variant.quantity, 18);
    assert_eq!(subtracted.adjustment.quantity_before, 25);

    let set = engine
        .apply_adjustment(
            AdjustInventoryCommand::new(variant.id, AdjustmentOperation::Set, 3.0)
                .reason(AdjustmentReason::CycleCount),
        )
        .await
        .unwrap();
    assert_eq!(set.variant.quantity, 3);
    assert_eq!(set.adjustment.delta, -15);
    assert_eq!(set.variant.version, 3);

    let ledger = engine.store.adjustments_for(variant.id).unwrap();
    assert_eq!(ledger.len(), 3);
    assert_eq!(engine.adjustments.replay_ledger(variant.id, 20).unwrap(), 3);
    assert_eq!(engine.classify_health(&set.variant), HealthStatus::LowStock);

    let adjusted = drain(&mut catalog.events)
        .into_iter()
        .filter(|e| matches!(e, Event::InventoryAdjusted { .. }))
        .count();
    assert_eq!(adjusted, 3);
}

#[tokio::test]
async fn subtract_beyond_on_hand_leaves_state_unchanged() {
    let catalog = catalog();
    let variant = seed_family(&catalog, "Red", &["S"], 4).await.remove(0);

    let result = catalog
        .engine
        .apply_adjustment(AdjustInventoryCommand::new(
            variant.id,
            AdjustmentOperation::Subtract,
            5.0,
        ))
        .await;

    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));
    let stored = catalog.engine.store.get(variant.id).unwrap();
    assert_eq!(stored.quantity, 4);
    assert_eq!(stored.version, variant.version);
    assert!(catalog.engine.store.adjustments().unwrap().is_empty());
}

#[tokio::test]
async fn set_below_reserved_is_a_reservation_conflict() {
    let catalog = catalog();
    let variant = seed_family(&catalog, "Red", &["S"], 10).await.remove(0);
    let engine = &catalog.engine;

    let reserved = engine
        .adjustments
        .update_reservation(variant.id, 6, None)
        .await
        .unwrap();
    assert_eq!(reserved.available(), 4);

    let result = engine
        .apply_adjustment(AdjustInventoryCommand::new(
            variant.id,
            AdjustmentOperation::Set,
            5.0,
        ))
        .await;
    assert_matches!(result, Err(ServiceError::ReservationConflict(_)));
    assert_eq!(engine.store.get(variant.id).unwrap().reserved, 6);

    assert_matches!(
        engine.adjustments.update_reservation(variant.id, 11, None).await,
        Err(ServiceError::ReservationConflict(_))
    );
}

#[tokio::test]
async fn invalid_input_is_rejected_before_mutation() {
    let catalog = catalog();
    let variant = seed_family(&catalog, "Red", &["S"], 10).await.remove(0);
    let engine = &catalog.engine;

    for (operation, quantity) in [
        (AdjustmentOperation::Add, 0.0),
        (AdjustmentOperation::Subtract, -1.0),
        (AdjustmentOperation::Set, -3.0),
        (AdjustmentOperation::Add, f64::NAN),
    ] {
        let result = engine
            .apply_adjustment(AdjustInventoryCommand::new(variant.id, operation, quantity))
            .await;
        assert_matches!(result, Err(ServiceError::InvalidQuantity(_)));
    }

    assert_matches!(
        engine
            .apply_adjustment(AdjustInventoryCommand::new(
                Uuid::new_v4(),
                AdjustmentOperation::Add,
                1.0
            ))
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert!(engine.store.adjustments().unwrap().is_empty());
}

#[tokio::test]
async fn stale_expected_version_is_retryable() {
    let catalog = catalog();
    let variant = seed_family(&catalog, "Red", &["S"], 10).await.remove(0);
    let engine = &catalog.engine;

    engine
        .apply_adjustment(
            AdjustInventoryCommand::new(variant.id, AdjustmentOperation::Add, 1.0)
                .expect_version(variant.version),
        )
        .await
        .unwrap();

    let err = engine
        .apply_adjustment(
            AdjustInventoryCommand::new(variant.id, AdjustmentOperation::Add, 1.0)
                .expect_version(variant.version),
        )
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.error_code(), "concurrent_modification");
}

#[tokio::test]
async fn history_is_filtered_and_paginated_newest_first() {
    let catalog = catalog();
    let variants = seed_family(&catalog, "Red", &["S", "M"], 10).await;
    let engine = &catalog.engine;
    let actor = Uuid::new_v4();

    for i in 1..=5 {
        engine
            .apply_adjustment(
                AdjustInventoryCommand::new(variants[0].id, AdjustmentOperation::Add, f64::from(i))
                    .source(SourceType::Order, Some(format!("PO-{}", i)))
                    .performed_by(actor, Some("Dana".to_string())),
            )
            .await
            .unwrap();
    }
    engine
        .apply_adjustment(
            AdjustInventoryCommand::new(variants[1].id, AdjustmentOperation::Subtract, 2.0)
                .reason(AdjustmentReason::Damage),
        )
        .await
        .unwrap();

    let page = engine
        .adjustments
        .list_adjustments(&AdjustmentQuery {
            variant_id: Some(variants[0].id),
            page: Some(2),
            limit: Some(2),
            ..AdjustmentQuery::default()
        })
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.pages, 3);
    assert_eq!(page.items.len(), 2);
    assert!(page.items[0].created_at >= page.items[1].created_at);

    let damage = engine
        .adjustments
        .list_adjustments(&AdjustmentQuery {
            reason: Some(AdjustmentReason::Damage),
            ..AdjustmentQuery::default()
        })
        .unwrap();
    assert_eq!(damage.total, 1);
    assert_eq!(damage.items[0].sku, variants[1].sku);

    let searched = engine
        .adjustments
        .list_adjustments(&AdjustmentQuery {
            search: Some("po-3".to_string()),
            sku: Some(variants[0].sku.to_lowercase()),
            ..AdjustmentQuery::default()
        })
        .unwrap();
    assert_eq!(searched.total, 1);
    assert_eq!(searched.items[0].delta, 3);

    let future = engine
        .adjustments
        .list_adjustments(&AdjustmentQuery {
            from: Some(Utc::now() + Duration::hours(1)),
            ..AdjustmentQuery::default()
        })
        .unwrap();
    assert_eq!(future.total, 0);

    let clamped = engine
        .adjustments
        .list_adjustments(&AdjustmentQuery {
            limit: Some(10_000),
            ..AdjustmentQuery::default()
        })
        .unwrap();
    assert_eq!(clamped.limit, 200);
}

#[tokio::test]
async fn variant_detail_and_overview_reflect_ledger() {
    let catalog = catalog();
    let variant = seed_family(&catalog, "Red", &["L"], 30).await.remove(0);
    let engine = &catalog.engine;

    engine
        .apply_adjustment(AdjustInventoryCommand::new(
            variant.id,
            AdjustmentOperation::Subtract,
            15.0,
        ))
        .await
        .unwrap();
    engine
        .adjustments
        .update_incoming(variant.id, 40, None)
        .await
        .unwrap();

    let detail = engine.adjustments.variant_detail(variant.id).unwrap();
    assert_eq!(detail.variant.quantity, 15);
    assert_eq!(detail.adjustments.len(), 1);
    assert_eq!(detail.health_status, HealthStatus::Healthy);

    let overview = engine.overview().unwrap();
    assert_eq!(overview.total_units, 15);
    assert_eq!(overview.incoming_units, 40);
    assert_eq!(overview.total_value, dec!(750));
    // 15 units over 30 days
    assert_eq!(overview.days_of_supply, Some(dec!(30)));
    assert_eq!(overview.recent_adjustments.len(), 1);
}

#[tokio::test]
async fn undrained_event_channel_does_not_stall_adjustments() {
    let catalog = catalog_with(EngineConfig {
        event_channel_capacity: 1,
        ..EngineConfig::default()
    });
    // creation alone fills the single event slot
    let variant = seed_family(&catalog, "Red", &["S", "M"], 5).await.remove(0);

    for _ in 0..3 {
        let adjusted = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            catalog.engine.apply_adjustment(AdjustInventoryCommand::new(
                variant.id,
                AdjustmentOperation::Add,
                1.0,
            )),
        )
        .await
        .expect("adjustment returns while the channel is full");
        adjusted.unwrap();
    }
    assert_eq!(catalog.engine.store.get(variant.id).unwrap().quantity, 8);
}

#[tokio::test]
async fn cost_impact_out_of_range_is_rejected_without_mutation() {
    let catalog = catalog();
    let variant = seed_family(&catalog, "Red", &["S"], 5).await.remove(0);

    let result = catalog
        .engine
        .apply_adjustment(
            AdjustInventoryCommand::new(variant.id, AdjustmentOperation::Add, 2.0)
                .cost_per_unit(Decimal::MAX),
        )
        .await;

    assert_matches!(result, Err(ServiceError::ValidationError(_)));
    let stored = catalog.engine.store.get(variant.id).unwrap();
    assert_eq!(stored.quantity, 5);
    assert_eq!(stored.version, variant.version);
    assert!(catalog.engine.store.adjustments().unwrap().is_empty());
}
