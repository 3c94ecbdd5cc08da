use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use uuid::Uuid;

use super::{QuantityChange, VariantStore};
use crate::entities::{Adjustment, Variant};
use crate::errors::ServiceError;

type AxisKey = (Uuid, Option<String>, String);

/// Partial edit of a variant. `None` leaves the field untouched; for the
/// nullable fields `Some(None)` clears the value.
///
/// Quantity is deliberately absent: on-hand changes go through
/// [`VariantStore::apply_quantity_change`] so they always hit the ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantPatch {
    pub sku: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub color_id: Option<Option<Uuid>>,
    pub price: Option<Decimal>,
    pub images: Option<Vec<String>>,
    pub main_image: Option<Option<String>>,
    pub hover_image: Option<Option<String>>,
    pub low_stock_threshold: Option<i32>,
    pub reorder_point: Option<i32>,
    pub reorder_quantity: Option<i32>,
    pub safety_stock: Option<i32>,
    pub bin_location: Option<String>,
    pub reserved: Option<i32>,
    pub incoming: Option<i32>,
    pub is_active: Option<bool>,
}

fn assign<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

impl VariantPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the patch in place and reports whether anything changed.
    pub fn apply(&self, variant: &mut Variant) -> bool {
        let mut changed = false;
        if let Some(sku) = &self.sku {
            changed |= assign(&mut variant.sku, sku.clone());
        }
        if let Some(size) = &self.size {
            changed |= assign(&mut variant.size, size.clone());
        }
        if let Some(color) = &self.color {
            changed |= assign(&mut variant.color, Some(color.clone()));
        }
        if let Some(color_id) = self.color_id {
            changed |= assign(&mut variant.color_id, color_id);
        }
        if let Some(price) = self.price {
            changed |= assign(&mut variant.price, price);
        }
        if let Some(images) = &self.images {
            changed |= assign(&mut variant.images, images.clone());
        }
        if let Some(main) = &self.main_image {
            changed |= assign(&mut variant.main_image, main.clone());
        }
        if let Some(hover) = &self.hover_image {
            changed |= assign(&mut variant.hover_image, hover.clone());
        }
        if let Some(v) = self.low_stock_threshold {
            changed |= assign(&mut variant.low_stock_threshold, Some(v));
        }
        if let Some(v) = self.reorder_point {
            changed |= assign(&mut variant.reorder_point, Some(v));
        }
        if let Some(v) = self.reorder_quantity {
            changed |= assign(&mut variant.reorder_quantity, Some(v));
        }
        if let Some(v) = self.safety_stock {
            changed |= assign(&mut variant.safety_stock, Some(v));
        }
        if let Some(bin) = &self.bin_location {
            changed |= assign(&mut variant.bin_location, Some(bin.clone()));
        }
        if let Some(v) = self.reserved {
            changed |= assign(&mut variant.reserved, v);
        }
        if let Some(v) = self.incoming {
            changed |= assign(&mut variant.incoming, v);
        }
        if let Some(v) = self.is_active {
            changed |= assign(&mut variant.is_active, v);
        }
        changed
    }
}

#[derive(Debug, Clone)]
pub struct VariantUpdate {
    pub id: Uuid,
    pub expected_version: Option<i32>,
    pub patch: VariantPatch,
}

/// Unit of work applied by [`VariantStore::commit`].
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub inserts: Vec<Variant>,
    pub updates: Vec<VariantUpdate>,
    pub deletes: Vec<Uuid>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct UpdatedVariant {
    pub variant: Variant,
    pub changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CommitOutcome {
    pub inserted: Vec<Variant>,
    /// One entry per requested update, in request order
    pub updated: Vec<UpdatedVariant>,
    pub deleted: Vec<Variant>,
}

#[derive(Debug, Default)]
struct CatalogIndex {
    skus: HashMap<String, Uuid>,
    axes: HashMap<AxisKey, Uuid>,
}

fn sku_key(sku: &str) -> String {
    sku.trim().to_uppercase()
}

fn poisoned<T>(_: T) -> ServiceError {
    ServiceError::InternalError("variant store lock poisoned".to_string())
}

/// In-memory store.
///
/// Lock order is always `index` → variant shard → `ledger`. Quantity changes
/// take the index lock shared, so adjustments of different variants run in
/// parallel; structural commits take it exclusively.
#[derive(Debug, Default)]
pub struct InMemoryVariantStore {
    variants: DashMap<Uuid, Variant>,
    index: RwLock<CatalogIndex>,
    ledger: RwLock<Vec<Adjustment>>,
}

impl InMemoryVariantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    fn read_index(&self) -> Result<RwLockReadGuard<'_, CatalogIndex>, ServiceError> {
        self.index.read().map_err(poisoned)
    }

    fn write_index(&self) -> Result<RwLockWriteGuard<'_, CatalogIndex>, ServiceError> {
        self.index.write().map_err(poisoned)
    }

    fn current(&self, id: Uuid) -> Result<Variant, ServiceError> {
        self.variants
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", id)))
    }
}

impl VariantStore for InMemoryVariantStore {
    fn get(&self, id: Uuid) -> Option<Variant> {
        self.variants.get(&id).map(|entry| entry.value().clone())
    }

    fn find_by_sku(&self, sku: &str) -> Option<Variant> {
        let id = {
            let index = self.read_index().ok()?;
            *index.skus.get(&sku_key(sku))?
        };
        self.get(id)
    }

    fn list(&self) -> Vec<Variant> {
        let mut all: Vec<Variant> = self.variants.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.sku.cmp(&b.sku)));
        all
    }

    fn list_by_product(&self, product_id: Uuid) -> Vec<Variant> {
        self.list()
            .into_iter()
            .filter(|v| v.product_id == product_id)
            .collect()
    }

    fn commit(&self, changes: ChangeSet) -> Result<CommitOutcome, ServiceError> {
        let mut index = self.write_index()?;

        // Stage every change against the current state; nothing is written
        // until the whole set validates.
        let mut touched: HashSet<Uuid> = HashSet::new();
        let mut staged_updates = Vec::with_capacity(changes.updates.len());
        for update in &changes.updates {
            if !touched.insert(update.id) {
                return Err(ServiceError::ValidationError(format!(
                    "Variant {} appears more than once in one change set",
                    update.id
                )));
            }
            let before = self.current(update.id)?;
            if let Some(expected) = update.expected_version {
                if expected != before.version {
                    return Err(ServiceError::ConcurrentModification(update.id));
                }
            }
            let mut after = before.clone();
            let changed = update.patch.apply(&mut after);
            if changed {
                after.validate()?;
            }
            staged_updates.push((before, after, changed));
        }

        let mut staged_deletes = Vec::with_capacity(changes.deletes.len());
        for id in &changes.deletes {
            if !touched.insert(*id) {
                return Err(ServiceError::ValidationError(format!(
                    "Variant {} appears more than once in one change set",
                    id
                )));
            }
            staged_deletes.push(self.current(*id)?);
        }

        for variant in &changes.inserts {
            if self.variants.contains_key(&variant.id) || !touched.insert(variant.id) {
                return Err(ServiceError::ValidationError(format!(
                    "Variant id {} already exists",
                    variant.id
                )));
            }
            variant.validate()?;
        }

        // Keys owned by updated or deleted variants are released first, so a
        // variant keeping its own SKU does not collide with itself.
        let released: HashSet<Uuid> = staged_updates
            .iter()
            .map(|(before, _, _)| before.id)
            .chain(staged_deletes.iter().map(|v| v.id))
            .collect();
        let mut claimed_skus: HashSet<String> = HashSet::new();
        let mut claimed_axes: HashSet<AxisKey> = HashSet::new();
        let candidates = staged_updates
            .iter()
            .map(|(_, after, _)| after)
            .chain(changes.inserts.iter());
        for candidate in candidates {
            let sku = sku_key(&candidate.sku);
            let sku_taken = index
                .skus
                .get(&sku)
                .map_or(false, |owner| !released.contains(owner));
            if sku_taken || !claimed_skus.insert(sku) {
                return Err(ServiceError::DuplicateSku(candidate.sku.clone()));
            }

            let axis = candidate.axis_key();
            let axis_taken = index
                .axes
                .get(&axis)
                .map_or(false, |owner| !released.contains(owner));
            if axis_taken || !claimed_axes.insert(axis) {
                return Err(ServiceError::DuplicateVariantAxis(format!(
                    "{} / {} already exists for product {}",
                    candidate.color.as_deref().unwrap_or("None"),
                    candidate.size,
                    candidate.product_id
                )));
            }
        }

        // Apply.
        let now = Utc::now();
        for (before, _, _) in &staged_updates {
            index.skus.remove(&sku_key(&before.sku));
            index.axes.remove(&before.axis_key());
        }
        for variant in &staged_deletes {
            index.skus.remove(&sku_key(&variant.sku));
            index.axes.remove(&variant.axis_key());
            self.variants.remove(&variant.id);
        }

        let mut outcome = CommitOutcome {
            deleted: staged_deletes,
            ..CommitOutcome::default()
        };
        for (_, mut after, changed) in staged_updates {
            if changed {
                after.version += 1;
                after.updated_at = now;
                self.variants.insert(after.id, after.clone());
            }
            index.skus.insert(sku_key(&after.sku), after.id);
            index.axes.insert(after.axis_key(), after.id);
            outcome.updated.push(UpdatedVariant {
                variant: after,
                changed,
            });
        }
        for variant in changes.inserts {
            index.skus.insert(sku_key(&variant.sku), variant.id);
            index.axes.insert(variant.axis_key(), variant.id);
            self.variants.insert(variant.id, variant.clone());
            outcome.inserted.push(variant);
        }

        debug!(
            inserted = outcome.inserted.len(),
            updated = outcome.updated.len(),
            deleted = outcome.deleted.len(),
            "variant change set committed"
        );
        Ok(outcome)
    }

    fn apply_quantity_change(
        &self,
        variant_id: Uuid,
        expected_version: Option<i32>,
        change: &mut QuantityChange<'_>,
    ) -> Result<(Variant, Adjustment), ServiceError> {
        let _index = self.read_index()?;
        let mut entry = self
            .variants
            .get_mut(&variant_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;

        if let Some(expected) = expected_version {
            if expected != entry.version {
                return Err(ServiceError::ConcurrentModification(variant_id));
            }
        }

        let adjustment = change(entry.value())?;
        if adjustment.variant_id != variant_id || adjustment.quantity_before != entry.quantity {
            return Err(ServiceError::InternalError(format!(
                "Adjustment for {} does not continue the ledger",
                variant_id
            )));
        }

        let mut next = entry.value().clone();
        next.quantity = adjustment.quantity_after;
        next.version += 1;
        next.updated_at = adjustment.created_at;
        next.validate()?;

        let mut ledger = self.ledger.write().map_err(poisoned)?;
        ledger.push(adjustment.clone());
        *entry.value_mut() = next.clone();

        Ok((next, adjustment))
    }

    fn adjustments(&self) -> Result<Vec<Adjustment>, ServiceError> {
        Ok(self.ledger.read().map_err(poisoned)?.clone())
    }

    fn adjustments_for(&self, variant_id: Uuid) -> Result<Vec<Adjustment>, ServiceError> {
        Ok(self
            .ledger
            .read()
            .map_err(poisoned)?
            .iter()
            .filter(|a| a.variant_id == variant_id)
            .cloned()
            .collect())
    }
}
