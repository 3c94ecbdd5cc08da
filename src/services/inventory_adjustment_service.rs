use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::EngineConfig,
    entities::{Adjustment, AdjustmentOperation, AdjustmentReason, SourceType, Variant},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{ChangeSet, VariantPatch, VariantStore, VariantUpdate},
    services::health::{classify_health, HealthStatus},
};

/// Number of ledger entries returned with a variant detail view.
const DETAIL_HISTORY_LIMIT: usize = 50;

/// Request to change the on-hand quantity of one variant.
///
/// `quantity` is taken as a raw number so that non-finite and fractional
/// input is rejected as `InvalidQuantity` instead of failing to parse.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdjustInventoryCommand {
    pub variant_id: Uuid,
    pub operation: AdjustmentOperation,
    pub quantity: f64,
    #[serde(default)]
    pub reason: AdjustmentReason,
    #[validate(length(max = 500))]
    pub note: Option<String>,
    pub cost_per_unit: Option<Decimal>,
    #[serde(default)]
    pub source_type: SourceType,
    #[validate(length(max = 120))]
    pub source_ref: Option<String>,
    pub performed_by: Option<Uuid>,
    #[validate(length(max = 120))]
    pub performed_by_name: Option<String>,
    /// Optimistic check against `Variant::version`
    pub expected_version: Option<i32>,
}

impl AdjustInventoryCommand {
    pub fn new(variant_id: Uuid, operation: AdjustmentOperation, quantity: f64) -> Self {
        Self {
            variant_id,
            operation,
            quantity,
            reason: AdjustmentReason::default(),
            note: None,
            cost_per_unit: None,
            source_type: SourceType::default(),
            source_ref: None,
            performed_by: None,
            performed_by_name: None,
            expected_version: None,
        }
    }

    pub fn reason(mut self, reason: AdjustmentReason) -> Self {
        self.reason = reason;
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn cost_per_unit(mut self, cost: Decimal) -> Self {
        self.cost_per_unit = Some(cost);
        self
    }

    pub fn source(mut self, source_type: SourceType, source_ref: Option<String>) -> Self {
        self.source_type = source_type;
        self.source_ref = source_ref;
        self
    }

    pub fn performed_by(mut self, actor: Uuid, name: Option<String>) -> Self {
        self.performed_by = Some(actor);
        self.performed_by_name = name;
        self
    }

    pub fn expect_version(mut self, version: i32) -> Self {
        self.expected_version = Some(version);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentResult {
    pub variant: Variant,
    pub adjustment: Adjustment,
}

/// Computes the on-hand quantity after `operation`. Pure.
pub fn plan_quantity(
    operation: AdjustmentOperation,
    current: i32,
    amount: f64,
) -> Result<i32, ServiceError> {
    if !amount.is_finite() {
        return Err(ServiceError::InvalidQuantity(
            "quantity must be a finite number".to_string(),
        ));
    }
    if amount.fract() != 0.0 {
        return Err(ServiceError::InvalidQuantity(format!(
            "quantity must be a whole number of units, got {}",
            amount
        )));
    }
    if amount > f64::from(i32::MAX) || amount < f64::from(i32::MIN) {
        return Err(ServiceError::InvalidQuantity(format!(
            "quantity {} is out of range",
            amount
        )));
    }
    let amount = amount as i32;

    match operation {
        AdjustmentOperation::Add | AdjustmentOperation::Subtract if amount <= 0 => {
            Err(ServiceError::InvalidQuantity(format!(
                "{} requires a positive quantity, got {}",
                operation, amount
            )))
        }
        AdjustmentOperation::Add => current.checked_add(amount).ok_or_else(|| {
            ServiceError::InvalidQuantity(format!("adding {} overflows on-hand quantity", amount))
        }),
        AdjustmentOperation::Subtract if amount > current => {
            Err(ServiceError::InsufficientStock(format!(
                "cannot subtract {} from {} on hand",
                amount, current
            )))
        }
        AdjustmentOperation::Subtract => Ok(current - amount),
        AdjustmentOperation::Set if amount < 0 => Err(ServiceError::InvalidQuantity(format!(
            "set requires a non-negative quantity, got {}",
            amount
        ))),
        AdjustmentOperation::Set => Ok(amount),
    }
}

/// True when every entry continues the previous one and carries a delta
/// matching its before/after pair.
pub fn ledger_is_consistent(entries: &[Adjustment]) -> bool {
    entries
        .iter()
        .all(|a| a.delta == a.quantity_after - a.quantity_before)
        && entries
            .windows(2)
            .all(|pair| pair[0].quantity_after == pair[1].quantity_before)
}

/// Ledger query. Unset fields do not restrict.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentQuery {
    pub variant_id: Option<Uuid>,
    pub sku: Option<String>,
    pub reason: Option<AdjustmentReason>,
    pub source_type: Option<SourceType>,
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl AdjustmentQuery {
    fn matches(&self, adjustment: &Adjustment) -> bool {
        if matches!(self.variant_id, Some(id) if id != adjustment.variant_id) {
            return false;
        }
        if let Some(sku) = &self.sku {
            if !adjustment.sku.eq_ignore_ascii_case(sku.trim()) {
                return false;
            }
        }
        if matches!(self.reason, Some(reason) if reason != adjustment.reason) {
            return false;
        }
        if matches!(self.source_type, Some(source) if source != adjustment.source_type) {
            return false;
        }
        if matches!(self.from, Some(from) if adjustment.created_at < from) {
            return false;
        }
        if matches!(self.to, Some(to) if adjustment.created_at > to) {
            return false;
        }
        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let term = term.to_lowercase();
            let contains = |field: Option<&str>| {
                field.map_or(false, |value| value.to_lowercase().contains(&term))
            };
            if !(contains(Some(&adjustment.sku))
                || contains(adjustment.note.as_deref())
                || contains(adjustment.performed_by_name.as_deref())
                || contains(adjustment.source_ref.as_deref()))
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentPage {
    pub items: Vec<Adjustment>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantDetail {
    pub variant: Variant,
    pub available: i32,
    pub health_status: HealthStatus,
    /// Most recent first
    pub adjustments: Vec<Adjustment>,
}

/// Applies audited quantity changes and maintains the counters owned by
/// collaborators (reserved, incoming).
pub struct InventoryAdjustmentService {
    store: Arc<dyn VariantStore>,
    event_sender: Arc<EventSender>,
    config: Arc<EngineConfig>,
}

impl InventoryAdjustmentService {
    pub fn new(
        store: Arc<dyn VariantStore>,
        event_sender: Arc<EventSender>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            event_sender,
            config,
        }
    }

    /// Validates and applies one adjustment, recording exactly one ledger
    /// entry. Nothing is written when any check fails.
    #[instrument(skip(self, command), fields(variant_id = %command.variant_id, operation = %command.operation))]
    pub async fn apply_adjustment(
        &self,
        command: AdjustInventoryCommand,
    ) -> Result<AdjustmentResult, ServiceError> {
        command.validate()?;

        let applied = {
            let mut change = |current: &Variant| -> Result<Adjustment, ServiceError> {
                let after = plan_quantity(command.operation, current.quantity, command.quantity)?;
                if after < current.reserved {
                    return Err(ServiceError::ReservationConflict(format!(
                        "{} would leave {} on hand with {} reserved",
                        current.sku, after, current.reserved
                    )));
                }
                let delta = after - current.quantity;
                let cost_impact = match command.cost_per_unit {
                    Some(cost) => Some(cost.checked_mul(Decimal::from(delta)).ok_or_else(|| {
                        ServiceError::ValidationError(format!(
                            "cost impact of {} units at {} is out of range",
                            delta, cost
                        ))
                    })?),
                    None => None,
                };
                Ok(Adjustment {
                    id: Uuid::new_v4(),
                    variant_id: current.id,
                    product_id: current.product_id,
                    sku: current.sku.clone(),
                    operation: command.operation,
                    delta,
                    quantity_before: current.quantity,
                    quantity_after: after,
                    reason: command.reason,
                    note: command.note.clone(),
                    cost_per_unit: command.cost_per_unit,
                    cost_impact,
                    source_type: command.source_type,
                    source_ref: command.source_ref.clone(),
                    performed_by: command.performed_by,
                    performed_by_name: command.performed_by_name.clone(),
                    created_at: Utc::now(),
                })
            };
            self.store
                .apply_quantity_change(command.variant_id, command.expected_version, &mut change)
        };

        let (variant, adjustment) = match applied {
            Ok(applied) => applied,
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "inventory adjustment rejected");
                return Err(e);
            }
        };

        info!(
            sku = %adjustment.sku,
            delta = adjustment.delta,
            quantity_before = adjustment.quantity_before,
            quantity_after = adjustment.quantity_after,
            reason = %adjustment.reason,
            "inventory adjusted"
        );

        self.event_sender
            .send_or_log(Event::InventoryAdjusted {
                variant_id: variant.id,
                sku: variant.sku.clone(),
                delta: adjustment.delta,
                reason: adjustment.reason,
                quantity_after: adjustment.quantity_after,
            })
            .await;

        Ok(AdjustmentResult {
            variant,
            adjustment,
        })
    }

    /// Sets the reserved counter. Rejected with `ReservationConflict` when it
    /// would exceed on-hand quantity or go negative.
    #[instrument(skip(self))]
    pub async fn update_reservation(
        &self,
        variant_id: Uuid,
        reserved: i32,
        expected_version: Option<i32>,
    ) -> Result<Variant, ServiceError> {
        let variant = self.patch_counter(
            variant_id,
            expected_version,
            VariantPatch {
                reserved: Some(reserved),
                ..VariantPatch::default()
            },
        )?;
        info!(sku = %variant.sku, reserved, "reservation updated");
        self.event_sender
            .send_or_log(Event::VariantUpdated {
                product_id: variant.product_id,
                variant_id,
                sku: variant.sku.clone(),
            })
            .await;
        Ok(variant)
    }

    #[instrument(skip(self))]
    pub async fn update_incoming(
        &self,
        variant_id: Uuid,
        incoming: i32,
        expected_version: Option<i32>,
    ) -> Result<Variant, ServiceError> {
        let variant = self.patch_counter(
            variant_id,
            expected_version,
            VariantPatch {
                incoming: Some(incoming),
                ..VariantPatch::default()
            },
        )?;
        info!(sku = %variant.sku, incoming, "incoming updated");
        self.event_sender
            .send_or_log(Event::VariantUpdated {
                product_id: variant.product_id,
                variant_id,
                sku: variant.sku.clone(),
            })
            .await;
        Ok(variant)
    }

    fn patch_counter(
        &self,
        variant_id: Uuid,
        expected_version: Option<i32>,
        patch: VariantPatch,
    ) -> Result<Variant, ServiceError> {
        let outcome = self.store.commit(ChangeSet {
            updates: vec![VariantUpdate {
                id: variant_id,
                expected_version,
                patch,
            }],
            ..ChangeSet::default()
        })?;
        outcome
            .updated
            .into_iter()
            .next()
            .map(|u| u.variant)
            .ok_or_else(|| ServiceError::InternalError("commit returned no update".to_string()))
    }

    /// Filtered, newest-first page of the ledger.
    pub fn list_adjustments(&self, query: &AdjustmentQuery) -> Result<AdjustmentPage, ServiceError> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query
            .limit
            .unwrap_or(self.config.history_page_size)
            .clamp(1, self.config.history_max_page_size);

        let mut matching: Vec<Adjustment> = self
            .store
            .adjustments()?
            .into_iter()
            .rev()
            .filter(|a| query.matches(a))
            .collect();
        matching.sort_by_key(|a| Reverse(a.created_at));

        let total = matching.len() as u64;
        let pages = (total + limit - 1) / limit;
        let skip = usize::try_from((page - 1).saturating_mul(limit)).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .collect();

        Ok(AdjustmentPage {
            items,
            page,
            limit,
            total,
            pages,
        })
    }

    pub fn variant_detail(&self, variant_id: Uuid) -> Result<VariantDetail, ServiceError> {
        let variant = self
            .store
            .get(variant_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;
        let mut adjustments = self.store.adjustments_for(variant_id)?;
        adjustments.reverse();
        adjustments.truncate(DETAIL_HISTORY_LIMIT);

        Ok(VariantDetail {
            available: variant.available(),
            health_status: classify_health(&variant, &self.config.health_policy()),
            variant,
            adjustments,
        })
    }

    /// Folds the ledger deltas of one variant onto `initial_quantity`.
    pub fn replay_ledger(&self, variant_id: Uuid, initial_quantity: i32) -> Result<i32, ServiceError> {
        let entries = self.store.adjustments_for(variant_id)?;
        if !ledger_is_consistent(&entries) {
            return Err(ServiceError::InternalError(format!(
                "ledger of variant {} is not contiguous",
                variant_id
            )));
        }
        Ok(entries
            .iter()
            .fold(initial_quantity, |quantity, a| quantity + a.delta))
    }
}
