use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        variant::{validate_image_selection, validate_price},
        ReferenceData, Variant,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{ChangeSet, VariantPatch, VariantStore, VariantUpdate},
    services::sku::generate_sku,
};

/// One color of a product expanded over a set of sizes.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VariantFamilyInput {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 60))]
    pub color: String,
    pub color_id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub sizes: Vec<String>,
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub quantity: i32,
    pub images: Vec<String>,
    pub main_image: Option<String>,
    pub hover_image: Option<String>,
    #[validate(range(min = 0))]
    pub low_stock_threshold: Option<i32>,
    #[validate(range(min = 0))]
    pub reorder_point: Option<i32>,
}

/// Edit of an existing variant through the family form.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VariantFamilyUpdate {
    pub variant_id: Uuid,
    pub expected_version: Option<i32>,
    #[validate(length(min = 1, max = 60))]
    pub color: String,
    pub color_id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub sizes: Vec<String>,
    pub price: Decimal,
    /// Initial quantity for sizes created by this edit
    #[serde(default)]
    #[validate(range(min = 0))]
    pub new_size_quantity: i32,
    pub images: Vec<String>,
    pub main_image: Option<String>,
    pub hover_image: Option<String>,
    #[validate(range(min = 0))]
    pub low_stock_threshold: Option<i32>,
    #[validate(range(min = 0))]
    pub reorder_point: Option<i32>,
}

/// Direct creation of a single variant. The SKU is generated when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateVariantInput {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    pub color: Option<String>,
    pub color_id: Option<Uuid>,
    #[validate(length(min = 1, max = 30))]
    pub size: String,
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub quantity: i32,
    pub low_stock_threshold: Option<i32>,
    pub reorder_point: Option<i32>,
    pub bin_location: Option<String>,
    pub images: Vec<String>,
    pub main_image: Option<String>,
    pub hover_image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantFamilyOutcome {
    /// The edited variant in edit mode
    pub variant: Option<Variant>,
    pub created: Vec<Variant>,
    pub synced_count: usize,
}

/// Shared merchandising attributes propagated across a color group.
#[derive(Debug, Clone, PartialEq)]
struct SharedAttributes {
    price: Decimal,
    images: Vec<String>,
    main_image: Option<String>,
    hover_image: Option<String>,
}

impl SharedAttributes {
    fn of(variant: &Variant) -> Self {
        Self {
            price: variant.price,
            images: variant.images.clone(),
            main_image: variant.main_image.clone(),
            hover_image: variant.hover_image.clone(),
        }
    }

    fn patch(&self) -> VariantPatch {
        VariantPatch {
            price: Some(self.price),
            images: Some(self.images.clone()),
            main_image: Some(self.main_image.clone()),
            hover_image: Some(self.hover_image.clone()),
            ..VariantPatch::default()
        }
    }
}

fn normalize_sizes(sizes: &[String]) -> Result<Vec<String>, ServiceError> {
    let mut seen = HashSet::new();
    let normalized: Vec<String> = sizes
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect();
    if normalized.is_empty() {
        return Err(ServiceError::ValidationError(
            "at least one size must be selected".to_string(),
        ));
    }
    Ok(normalized)
}

fn check_price(price: Decimal) -> Result<(), ServiceError> {
    validate_price(price).map_err(ServiceError::ValidationError)
}

/// Creates, edits and removes variants, keeping color groups in sync.
pub struct VariantFamilyService {
    store: Arc<dyn VariantStore>,
    event_sender: Arc<EventSender>,
    reference: Arc<ReferenceData>,
}

impl VariantFamilyService {
    pub fn new(
        store: Arc<dyn VariantStore>,
        event_sender: Arc<EventSender>,
        reference: Arc<ReferenceData>,
    ) -> Self {
        Self {
            store,
            event_sender,
            reference,
        }
    }

    fn product_name(&self, product_id: Uuid) -> Result<&str, ServiceError> {
        self.reference
            .product_name(product_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Builds one variant per size. Either the whole family is stored or
    /// none of it.
    #[instrument(skip(self, input), fields(product_id = %input.product_id, color = %input.color))]
    pub async fn create_variant_family(
        &self,
        input: VariantFamilyInput,
    ) -> Result<VariantFamilyOutcome, ServiceError> {
        input.validate()?;
        check_price(input.price)?;
        validate_image_selection(
            &input.images,
            input.main_image.as_deref(),
            input.hover_image.as_deref(),
            true,
        )?;
        let sizes = normalize_sizes(&input.sizes)?;
        let name = self.product_name(input.product_id)?;

        let now = Utc::now();
        let inserts: Vec<Variant> = sizes
            .iter()
            .map(|size| Variant {
                id: Uuid::new_v4(),
                sku: generate_sku(name, &input.color, size),
                product_id: input.product_id,
                color: Some(input.color.trim().to_string()),
                color_id: input.color_id,
                size: size.clone(),
                price: input.price,
                quantity: input.quantity,
                reserved: 0,
                incoming: 0,
                low_stock_threshold: input.low_stock_threshold,
                reorder_point: input.reorder_point,
                reorder_quantity: None,
                safety_stock: None,
                bin_location: None,
                main_image: input.main_image.clone(),
                hover_image: input.hover_image.clone(),
                images: input.images.clone(),
                is_active: true,
                version: 0,
                created_at: now,
                updated_at: now,
            })
            .collect();

        let outcome = self.store.commit(ChangeSet {
            inserts,
            ..ChangeSet::default()
        })?;

        info!(created = outcome.inserted.len(), "variant family created");
        for variant in &outcome.inserted {
            self.send_created(variant).await;
        }

        Ok(VariantFamilyOutcome {
            variant: None,
            created: outcome.inserted,
            synced_count: 0,
        })
    }

    /// Edits a variant from the family form.
    ///
    /// When the selection is exactly the original size and the color is
    /// unchanged, price and images are copied to the active siblings of the
    /// original color within the same commit. Extra sizes become new
    /// variants. A changed color never cascades.
    #[instrument(skip(self, input), fields(variant_id = %input.variant_id))]
    pub async fn update_variant_family(
        &self,
        input: VariantFamilyUpdate,
    ) -> Result<VariantFamilyOutcome, ServiceError> {
        input.validate()?;
        check_price(input.price)?;
        validate_image_selection(
            &input.images,
            input.main_image.as_deref(),
            input.hover_image.as_deref(),
            true,
        )?;
        let sizes = normalize_sizes(&input.sizes)?;
        let original = self.store.get(input.variant_id).ok_or_else(|| {
            ServiceError::NotFound(format!("Variant {} not found", input.variant_id))
        })?;
        let name = self.product_name(original.product_id)?;

        let color = input.color.trim().to_string();
        let color_changed = original.color.as_deref() != Some(color.as_str());
        let target_size = if sizes.contains(&original.size) {
            original.size.clone()
        } else {
            sizes[0].clone()
        };
        let size_changed = target_size != original.size;

        let shared = SharedAttributes {
            price: input.price,
            images: input.images.clone(),
            main_image: input.main_image.clone(),
            hover_image: input.hover_image.clone(),
        };
        let mut patch = VariantPatch {
            color: Some(color.clone()),
            color_id: Some(input.color_id),
            size: Some(target_size.clone()),
            low_stock_threshold: input.low_stock_threshold,
            reorder_point: input.reorder_point,
            ..shared.patch()
        };
        if size_changed || color_changed {
            patch.sku = Some(generate_sku(name, &color, &target_size));
        }

        let mut updates = vec![VariantUpdate {
            id: original.id,
            expected_version: input.expected_version,
            patch,
        }];

        let cascade = !color_changed && sizes.len() == 1 && sizes[0] == original.size;
        if cascade {
            updates.extend(self.color_group_updates(&original, &shared));
        }

        let now = Utc::now();
        let inserts: Vec<Variant> = sizes
            .iter()
            .filter(|size| **size != target_size)
            .map(|size| Variant {
                id: Uuid::new_v4(),
                sku: generate_sku(name, &color, size),
                size: size.clone(),
                quantity: input.new_size_quantity,
                reserved: 0,
                incoming: 0,
                version: 0,
                is_active: true,
                created_at: now,
                updated_at: now,
                ..original.clone()
            })
            .map(|mut v| {
                v.color = Some(color.clone());
                v.color_id = input.color_id;
                v.price = input.price;
                v.images = input.images.clone();
                v.main_image = input.main_image.clone();
                v.hover_image = input.hover_image.clone();
                v.low_stock_threshold = input.low_stock_threshold.or(v.low_stock_threshold);
                v.reorder_point = input.reorder_point.or(v.reorder_point);
                v
            })
            .collect();

        let outcome = self.store.commit(ChangeSet {
            inserts,
            updates,
            ..ChangeSet::default()
        })?;

        let mut updated = outcome.updated.into_iter();
        let primary = updated
            .next()
            .map(|u| u.variant)
            .ok_or_else(|| ServiceError::InternalError("commit returned no update".to_string()))?;
        let synced_count = updated.filter(|u| u.changed).count();

        info!(
            sku = %primary.sku,
            created = outcome.inserted.len(),
            "variant family updated"
        );
        self.event_sender
            .send_or_log(Event::VariantUpdated {
                product_id: primary.product_id,
                variant_id: primary.id,
                sku: primary.sku.clone(),
            })
            .await;
        if cascade {
            self.report_sync(primary.product_id, &color, synced_count).await;
        }
        for variant in &outcome.inserted {
            self.send_created(variant).await;
        }

        Ok(VariantFamilyOutcome {
            variant: Some(primary),
            created: outcome.inserted,
            synced_count,
        })
    }

    /// Copies price and images of `source_id` onto every active sibling of
    /// the same product and color. Returns how many siblings changed.
    #[instrument(skip(self))]
    pub async fn sync_color_group(&self, source_id: Uuid) -> Result<usize, ServiceError> {
        let source = self
            .store
            .get(source_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", source_id)))?;
        let Some(color) = source.color.clone() else {
            return Ok(0);
        };

        let updates = self.color_group_updates(&source, &SharedAttributes::of(&source));
        if updates.is_empty() {
            self.report_sync(source.product_id, &color, 0).await;
            return Ok(0);
        }
        let outcome = self.store.commit(ChangeSet {
            updates,
            ..ChangeSet::default()
        })?;
        let synced_count = outcome.updated.iter().filter(|u| u.changed).count();
        self.report_sync(source.product_id, &color, synced_count).await;
        Ok(synced_count)
    }

    /// Sibling patches for the color group of `source`. Variants without a
    /// color form no group.
    fn color_group_updates(&self, source: &Variant, shared: &SharedAttributes) -> Vec<VariantUpdate> {
        let Some(color) = source.color.as_deref() else {
            return Vec::new();
        };
        self.store
            .list_by_product(source.product_id)
            .into_iter()
            .filter(|v| v.id != source.id && v.is_active && v.color.as_deref() == Some(color))
            .map(|v| VariantUpdate {
                id: v.id,
                expected_version: Some(v.version),
                patch: shared.patch(),
            })
            .collect()
    }

    async fn report_sync(&self, product_id: Uuid, color: &str, synced_count: usize) {
        info!(%product_id, color, synced_count, "color group synced");
        self.event_sender
            .send_or_log(Event::ColorGroupSynced {
                product_id,
                color: color.to_string(),
                synced_count,
            })
            .await;
    }

    #[instrument(skip(self, input), fields(product_id = %input.product_id, size = %input.size))]
    pub async fn create_variant(&self, input: CreateVariantInput) -> Result<Variant, ServiceError> {
        input.validate()?;
        let sku = match input.sku.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(sku) => sku.to_uppercase(),
            None => {
                let color = input
                    .color
                    .as_deref()
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| {
                        ServiceError::ValidationError(
                            "an uncolored variant needs an explicit sku".to_string(),
                        )
                    })?;
                generate_sku(self.product_name(input.product_id)?, color, &input.size)
            }
        };
        let now = Utc::now();
        let variant = Variant {
            id: Uuid::new_v4(),
            sku,
            product_id: input.product_id,
            color: input.color.map(|c| c.trim().to_string()),
            color_id: input.color_id,
            size: input.size.trim().to_string(),
            price: input.price,
            quantity: input.quantity,
            reserved: 0,
            incoming: 0,
            low_stock_threshold: input.low_stock_threshold,
            reorder_point: input.reorder_point,
            reorder_quantity: None,
            safety_stock: None,
            bin_location: input.bin_location,
            main_image: input.main_image,
            hover_image: input.hover_image,
            images: input.images,
            is_active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let outcome = self.store.commit(ChangeSet {
            inserts: vec![variant],
            ..ChangeSet::default()
        })?;
        let variant = outcome
            .inserted
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::InternalError("commit returned no insert".to_string()))?;
        info!(sku = %variant.sku, "variant created");
        self.send_created(&variant).await;
        Ok(variant)
    }

    /// Plain field edit without any cascade. Quantity cannot be patched.
    #[instrument(skip(self, patch))]
    pub async fn update_variant(
        &self,
        variant_id: Uuid,
        expected_version: Option<i32>,
        mut patch: VariantPatch,
    ) -> Result<Variant, ServiceError> {
        if let Some(sku) = patch.sku.as_mut() {
            *sku = sku.trim().to_uppercase();
        }
        let outcome = self.store.commit(ChangeSet {
            updates: vec![VariantUpdate {
                id: variant_id,
                expected_version,
                patch,
            }],
            ..ChangeSet::default()
        })?;
        let updated = outcome
            .updated
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::InternalError("commit returned no update".to_string()))?;
        if updated.changed {
            self.event_sender
                .send_or_log(Event::VariantUpdated {
                    product_id: updated.variant.product_id,
                    variant_id,
                    sku: updated.variant.sku.clone(),
                })
                .await;
        }
        Ok(updated.variant)
    }

    #[instrument(skip(self))]
    pub async fn delete_variant(&self, variant_id: Uuid) -> Result<Variant, ServiceError> {
        let mut deleted = self.delete_variants(&[variant_id]).await?;
        deleted
            .pop()
            .ok_or_else(|| ServiceError::InternalError("commit returned no delete".to_string()))
    }

    /// Removes all of `variant_ids` or none of them. Siblings are untouched.
    #[instrument(skip(self, variant_ids), fields(count = variant_ids.len()))]
    pub async fn delete_variants(&self, variant_ids: &[Uuid]) -> Result<Vec<Variant>, ServiceError> {
        let mut seen = HashSet::new();
        let deletes: Vec<Uuid> = variant_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if deletes.is_empty() {
            return Ok(Vec::new());
        }

        for id in &deletes {
            if matches!(self.store.get(*id), Some(v) if !v.can_delete()) {
                warn!(variant_id = %id, "deleting variant that still holds reserved units");
            }
        }

        let outcome = self.store.commit(ChangeSet {
            deletes,
            ..ChangeSet::default()
        })?;
        info!(deleted = outcome.deleted.len(), "variants deleted");
        for variant in &outcome.deleted {
            self.event_sender
                .send_or_log(Event::VariantDeleted {
                    product_id: variant.product_id,
                    variant_id: variant.id,
                    sku: variant.sku.clone(),
                })
                .await;
        }
        Ok(outcome.deleted)
    }

    async fn send_created(&self, variant: &Variant) {
        self.event_sender
            .send_or_log(Event::VariantCreated {
                product_id: variant.product_id,
                variant_id: variant.id,
                sku: variant.sku.clone(),
            })
            .await;
    }
}
