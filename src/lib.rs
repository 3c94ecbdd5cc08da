//! Variant inventory engine
//!
//! Variants of a product (one SKU per color and size), audited quantity
//! adjustments, derived health, family generation with color-group sync,
//! catalog statistics and CSV transfer.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod entities;
pub mod errors;
pub mod events;
pub mod repositories;
pub mod services;

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

pub use config::EngineConfig;
pub use entities::{Adjustment, AdjustmentOperation, AdjustmentReason, ReferenceData, SourceType, Variant};
pub use errors::ServiceError;
pub use events::{Event, EventSender};
pub use repositories::{InMemoryVariantStore, VariantStore};
pub use services::filter::{filter_variants, StockStatus, VariantFilter};
pub use services::health::{classify, classify_health, HealthPolicy, HealthStatus};
pub use services::sku::generate_sku;
pub use services::stats::{compute_stats, VariantStats};

use services::{
    csv_transfer::CsvTransferService,
    inventory_adjustment_service::{AdjustInventoryCommand, AdjustmentResult, InventoryAdjustmentService},
    stats::{inventory_alerts, inventory_overview, InventoryAlerts, InventoryOverview},
    variant_family_service::{
        VariantFamilyInput, VariantFamilyOutcome, VariantFamilyService, VariantFamilyUpdate,
    },
};

/// Wires the store, reference data and services together.
#[derive(Clone)]
pub struct InventoryEngine {
    pub config: Arc<EngineConfig>,
    pub store: Arc<dyn VariantStore>,
    pub reference: Arc<ReferenceData>,
    pub event_sender: Arc<EventSender>,
    pub adjustments: Arc<InventoryAdjustmentService>,
    pub families: Arc<VariantFamilyService>,
    pub transfer: Arc<CsvTransferService>,
}

impl InventoryEngine {
    pub fn new(
        config: EngineConfig,
        reference: ReferenceData,
        store: Arc<dyn VariantStore>,
        event_sender: EventSender,
    ) -> Self {
        let config = Arc::new(config);
        let reference = Arc::new(reference);
        let event_sender = Arc::new(event_sender);

        let adjustments = Arc::new(InventoryAdjustmentService::new(
            store.clone(),
            event_sender.clone(),
            config.clone(),
        ));
        let families = Arc::new(VariantFamilyService::new(
            store.clone(),
            event_sender.clone(),
            reference.clone(),
        ));
        let transfer = Arc::new(CsvTransferService::new(
            store.clone(),
            families.clone(),
            event_sender.clone(),
            reference.clone(),
            config.clone(),
        ));

        Self {
            config,
            store,
            reference,
            event_sender,
            adjustments,
            families,
            transfer,
        }
    }

    /// Engine over a fresh in-memory store, returning the event receiver.
    pub fn in_memory(config: EngineConfig, reference: ReferenceData) -> (Self, mpsc::Receiver<Event>) {
        let (sender, rx) = EventSender::channel(config.event_channel_capacity);
        let engine = Self::new(config, reference, Arc::new(InMemoryVariantStore::new()), sender);
        (engine, rx)
    }

    pub async fn apply_adjustment(
        &self,
        command: AdjustInventoryCommand,
    ) -> Result<AdjustmentResult, ServiceError> {
        self.adjustments.apply_adjustment(command).await
    }

    pub async fn create_variant_family(
        &self,
        input: VariantFamilyInput,
    ) -> Result<VariantFamilyOutcome, ServiceError> {
        self.families.create_variant_family(input).await
    }

    pub async fn update_variant_family(
        &self,
        input: VariantFamilyUpdate,
    ) -> Result<VariantFamilyOutcome, ServiceError> {
        self.families.update_variant_family(input).await
    }

    pub async fn delete_variant(&self, variant_id: Uuid) -> Result<Variant, ServiceError> {
        self.families.delete_variant(variant_id).await
    }

    pub async fn delete_variants(&self, variant_ids: &[Uuid]) -> Result<Vec<Variant>, ServiceError> {
        self.families.delete_variants(variant_ids).await
    }

    pub fn variants(&self) -> Vec<Variant> {
        self.store.list()
    }

    pub fn classify_health(&self, variant: &Variant) -> HealthStatus {
        classify_health(variant, &self.config.health_policy())
    }

    pub fn compute_stats(&self, variants: &[Variant]) -> VariantStats {
        compute_stats(variants, self.config.default_low_stock_threshold)
    }

    pub fn filter_variants(&self, variants: &[Variant], filter: &VariantFilter) -> Vec<Variant> {
        filter_variants(
            variants,
            filter,
            &self.reference,
            self.config.default_low_stock_threshold,
        )
    }

    pub fn overview(&self) -> Result<InventoryOverview, ServiceError> {
        let ledger = self.store.adjustments()?;
        Ok(inventory_overview(
            &self.store.list(),
            &ledger,
            &self.config,
            Utc::now(),
        ))
    }

    pub fn alerts(&self) -> InventoryAlerts {
        inventory_alerts(&self.store.list(), &self.config)
    }
}
