use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Quantity-changing operation applied by the adjustment engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AdjustmentOperation {
    Add,
    Subtract,
    Set,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AdjustmentReason {
    Manual,
    CycleCount,
    Damage,
    Return,
    TransferIn,
    TransferOut,
    Restock,
    Correction,
}

impl Default for AdjustmentReason {
    fn default() -> Self {
        Self::Manual
    }
}

impl AdjustmentReason {
    /// Parses a reason code, rejecting anything outside the known set.
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        Self::from_str(raw.trim())
            .map_err(|_| ServiceError::ValidationError(format!("Unknown adjustment reason {}", raw)))
    }
}

/// Where an adjustment originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SourceType {
    Manual,
    Order,
    Return,
    Import,
    System,
}

impl Default for SourceType {
    fn default() -> Self {
        Self::Manual
    }
}

impl SourceType {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        Self::from_str(raw.trim())
            .map_err(|_| ServiceError::ValidationError(format!("Unknown source type {}", raw)))
    }
}

/// Append-only audit record; exactly one per quantity change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adjustment {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub operation: AdjustmentOperation,
    /// `quantity_after - quantity_before`
    pub delta: i32,
    pub quantity_before: i32,
    pub quantity_after: i32,
    pub reason: AdjustmentReason,
    pub note: Option<String>,
    pub cost_per_unit: Option<Decimal>,
    pub cost_impact: Option<Decimal>,
    pub source_type: SourceType,
    pub source_ref: Option<String>,
    pub performed_by: Option<Uuid>,
    pub performed_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Adjustment {
    pub fn is_outbound(&self) -> bool {
        self.delta < 0
    }
}
