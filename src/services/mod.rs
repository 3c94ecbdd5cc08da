// Pure rules
pub mod filter;
pub mod health;
pub mod sku;
pub mod stats;

// Stateful services over the variant store
pub mod csv_transfer;
pub mod inventory_adjustment_service;
pub mod variant_family_service;
