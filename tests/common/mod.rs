#![allow(dead_code)]

use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use uuid::Uuid;
use variant_inventory::{
    entities::{ReferenceData, Variant},
    services::variant_family_service::VariantFamilyInput,
    EngineConfig, Event, InventoryEngine,
};

pub const PRODUCT_NAME: &str = "Linen Shirt";

pub struct TestCatalog {
    pub engine: InventoryEngine,
    pub events: mpsc::Receiver<Event>,
    pub product_id: Uuid,
    pub red_id: Uuid,
}

pub fn catalog() -> TestCatalog {
    catalog_with(EngineConfig::default())
}

pub fn catalog_with(config: EngineConfig) -> TestCatalog {
    let product_id = Uuid::new_v4();
    let red_id = Uuid::new_v4();
    let reference = ReferenceData::default()
        .with_product(product_id, PRODUCT_NAME)
        .with_color(red_id, "Red")
        .with_color(Uuid::new_v4(), "Blue");
    let (engine, events) = InventoryEngine::in_memory(config, reference);
    TestCatalog {
        engine,
        events,
        product_id,
        red_id,
    }
}

pub fn images() -> Vec<String> {
    vec!["front.jpg".to_string(), "back.jpg".to_string()]
}

pub fn family(product_id: Uuid, color: &str, sizes: &[&str], quantity: i32) -> VariantFamilyInput {
    VariantFamilyInput {
        product_id,
        color: color.to_string(),
        color_id: None,
        sizes: sizes.iter().map(|s| s.to_string()).collect(),
        price: dec!(50),
        quantity,
        images: images(),
        main_image: Some("front.jpg".to_string()),
        hover_image: Some("back.jpg".to_string()),
        low_stock_threshold: None,
        reorder_point: None,
    }
}

/// Creates one variant family and returns its variants in size order.
pub async fn seed_family(
    catalog: &TestCatalog,
    color: &str,
    sizes: &[&str],
    quantity: i32,
) -> Vec<Variant> {
    catalog
        .engine
        .create_variant_family(family(catalog.product_id, color, sizes, quantity))
        .await
        .expect("family is created")
        .created
}

pub fn drain(events: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
