use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::config::EngineConfig;
use crate::entities::{Adjustment, Variant};
use crate::services::filter::StockStatus;
use crate::services::health::{classify_health, HealthStatus};

/// Label used for variants without a color.
pub const NO_COLOR_LABEL: &str = "None";

/// Color bucket. Uncolored variants get their own bucket, distinct from
/// any real color that happens to be called "None".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColorKey {
    Uncolored,
    Named(String),
}

impl fmt::Display for ColorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uncolored => f.write_str(NO_COLOR_LABEL),
            Self::Named(name) => f.write_str(name),
        }
    }
}

impl Serialize for ColorKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<Option<&str>> for ColorKey {
    fn from(color: Option<&str>) -> Self {
        match color {
            Some(name) => Self::Named(name.to_string()),
            None => Self::Uncolored,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantStats {
    pub total_skus: usize,
    pub total_stock: i64,
    pub total_value: Decimal,
    pub distribution_by_size: BTreeMap<String, i64>,
    pub distribution_by_color: BTreeMap<ColorKey, i64>,
    pub needs_attention: Vec<Variant>,
    pub in_stock: usize,
    pub low_stock: usize,
    pub out_of_stock: usize,
}

/// Aggregates totals, distributions and the attention list over any
/// variant collection. Pure; the collection may be a filtered subset.
pub fn compute_stats(variants: &[Variant], default_threshold: i32) -> VariantStats {
    let mut stats = VariantStats {
        total_skus: variants.len(),
        ..VariantStats::default()
    };
    let mut flagged = HashSet::new();

    for variant in variants {
        let quantity = i64::from(variant.quantity);
        let threshold = variant.effective_low_stock_threshold(default_threshold);

        stats.total_stock += quantity;
        stats.total_value = stats.total_value.saturating_add(variant.inventory_value());
        *stats
            .distribution_by_size
            .entry(variant.size.clone())
            .or_insert(0) += quantity;
        *stats
            .distribution_by_color
            .entry(ColorKey::from(variant.color.as_deref()))
            .or_insert(0) += quantity;

        if (variant.quantity == 0 || variant.quantity < threshold) && flagged.insert(variant.id) {
            stats.needs_attention.push(variant.clone());
        }

        match StockStatus::of(variant.quantity, threshold) {
            StockStatus::InStock => stats.in_stock += 1,
            StockStatus::Low => stats.low_stock += 1,
            StockStatus::Out => stats.out_of_stock += 1,
        }
    }

    stats
}

/// Share of `part` in `total` as a percentage with one decimal place.
pub fn percentage(part: i64, total: i64) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) * Decimal::from(100) / Decimal::from(total)).round_dp(1)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryOverview {
    pub total_skus: usize,
    pub total_units: i64,
    pub reserved_units: i64,
    pub incoming_units: i64,
    pub total_value: Decimal,
    pub low_stock_count: usize,
    pub out_of_stock_count: usize,
    pub turnover_rate: Decimal,
    pub days_of_supply: Option<Decimal>,
    pub recent_adjustments: Vec<Adjustment>,
}

/// Dashboard summary over active variants plus outbound velocity from the
/// ledger window ending at `now`.
pub fn inventory_overview(
    variants: &[Variant],
    ledger: &[Adjustment],
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> InventoryOverview {
    let active: Vec<&Variant> = variants.iter().filter(|v| v.is_active).collect();

    let mut total_units = 0i64;
    let mut reserved_units = 0i64;
    let mut incoming_units = 0i64;
    let mut total_value = Decimal::ZERO;
    let mut low_stock_count = 0;
    let mut out_of_stock_count = 0;
    for variant in &active {
        total_units += i64::from(variant.quantity);
        reserved_units += i64::from(variant.reserved);
        incoming_units += i64::from(variant.incoming);
        total_value = total_value.saturating_add(variant.inventory_value());
        let threshold = variant.effective_low_stock_threshold(config.default_low_stock_threshold);
        match StockStatus::of(variant.quantity, threshold) {
            StockStatus::Low => low_stock_count += 1,
            StockStatus::Out => out_of_stock_count += 1,
            StockStatus::InStock => {}
        }
    }

    let window_start = now - Duration::days(config.turnover_window_days);
    let outbound: i64 = ledger
        .iter()
        .filter(|a| a.created_at >= window_start && a.is_outbound())
        .map(|a| i64::from(a.delta).abs())
        .sum();
    let avg_daily_outbound = Decimal::from(outbound) / Decimal::from(config.turnover_window_days);

    let turnover_rate = if total_units > 0 && !avg_daily_outbound.is_zero() {
        (avg_daily_outbound * Decimal::from(365) / Decimal::from(total_units)).round_dp(2)
    } else {
        Decimal::ZERO
    };
    let days_of_supply = (!avg_daily_outbound.is_zero())
        .then(|| (Decimal::from(total_units) / avg_daily_outbound).round_dp(2));

    let mut recent: Vec<Adjustment> = ledger.to_vec();
    recent.sort_by_key(|a| Reverse(a.created_at));
    recent.truncate(config.recent_adjustments_limit);

    InventoryOverview {
        total_skus: active.len(),
        total_units,
        reserved_units,
        incoming_units,
        total_value,
        low_stock_count,
        out_of_stock_count,
        turnover_rate,
        days_of_supply,
        recent_adjustments: recent,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryAlerts {
    pub low_stock: Vec<Variant>,
    pub out_of_stock: Vec<Variant>,
    pub overstock: Vec<Variant>,
    pub reservation_issues: Vec<Variant>,
}

/// Buckets variants by health for the alert panel. Reservation issues catch
/// records that entered the catalog with `reserved > quantity`.
pub fn inventory_alerts(variants: &[Variant], config: &EngineConfig) -> InventoryAlerts {
    let policy = config.health_policy();
    let mut alerts = InventoryAlerts::default();

    for variant in variants {
        match classify_health(variant, &policy) {
            HealthStatus::LowStock => alerts.low_stock.push(variant.clone()),
            HealthStatus::OutOfStock => alerts.out_of_stock.push(variant.clone()),
            HealthStatus::Overstock => alerts.overstock.push(variant.clone()),
            HealthStatus::Healthy => {}
        }
        if variant.reserved > variant.quantity {
            alerts.reservation_issues.push(variant.clone());
        }
    }

    alerts.low_stock.sort_by_key(|v| v.quantity);
    alerts.out_of_stock.sort_by_key(|v| Reverse(v.updated_at));
    alerts.overstock.sort_by_key(|v| Reverse(v.quantity));
    alerts.reservation_issues.sort_by_key(|v| Reverse(v.reserved));
    for bucket in [
        &mut alerts.low_stock,
        &mut alerts.out_of_stock,
        &mut alerts.overstock,
        &mut alerts.reservation_issues,
    ] {
        bucket.truncate(config.alert_limit);
    }
    alerts
}
