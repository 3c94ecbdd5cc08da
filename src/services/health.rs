use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::entities::Variant;

/// Derived stock health. Computed on every read, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum HealthStatus {
    Healthy,
    LowStock,
    OutOfStock,
    Overstock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    pub default_low_stock_threshold: i32,
    /// Absolute ceiling; quantities above it are overstocked
    pub overstock_ceiling: Option<i32>,
    /// Variants with a reorder point are overstocked from
    /// `reorder_point * multiplier` units on
    pub reorder_multiplier: Option<i32>,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            default_low_stock_threshold: 10,
            overstock_ceiling: None,
            reorder_multiplier: None,
        }
    }
}

impl HealthPolicy {
    /// Highest quantity still considered healthy for `variant`, if any.
    pub fn ceiling_for(&self, variant: &Variant) -> Option<i32> {
        let from_reorder = match (variant.reorder_point, self.reorder_multiplier) {
            (Some(point), Some(multiplier)) if point > 0 => {
                Some(point.saturating_mul(multiplier).saturating_sub(1))
            }
            _ => None,
        };
        match (self.overstock_ceiling, from_reorder) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Out-of-stock wins over every other outcome. `reserved` does not move
/// the boundaries; it is accepted so callers can pass a full snapshot.
pub fn classify(
    quantity: i32,
    _reserved: i32,
    low_stock_threshold: i32,
    overstock_ceiling: Option<i32>,
) -> HealthStatus {
    if quantity <= 0 {
        HealthStatus::OutOfStock
    } else if quantity <= low_stock_threshold {
        HealthStatus::LowStock
    } else if matches!(overstock_ceiling, Some(ceiling) if quantity > ceiling) {
        HealthStatus::Overstock
    } else {
        HealthStatus::Healthy
    }
}

pub fn classify_health(variant: &Variant, policy: &HealthPolicy) -> HealthStatus {
    classify(
        variant.quantity,
        variant.reserved,
        variant.effective_low_stock_threshold(policy.default_low_stock_threshold),
        policy.ceiling_for(variant),
    )
}
