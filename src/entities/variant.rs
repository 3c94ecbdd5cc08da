use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Sellable product variant: one SKU per (product, color, size).
///
/// Derived values (`available`, health status) are never stored; they are
/// computed on read from the fields below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: Uuid,
    pub sku: String,
    pub product_id: Uuid,
    pub color: Option<String>,
    pub color_id: Option<Uuid>,
    pub size: String,
    pub price: Decimal,
    /// Units physically on hand
    pub quantity: i32,
    /// Units held against open orders and carts
    pub reserved: i32,
    /// Units expected from pending supply
    pub incoming: i32,
    pub low_stock_threshold: Option<i32>,
    pub reorder_point: Option<i32>,
    pub reorder_quantity: Option<i32>,
    pub safety_stock: Option<i32>,
    pub bin_location: Option<String>,
    pub main_image: Option<String>,
    pub hover_image: Option<String>,
    pub images: Vec<String>,
    /// Soft-archive flag; archived variants are skipped by color-group sync
    pub is_active: bool,
    /// Optimistic concurrency counter, bumped on every committed mutation
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Variant {
    /// Sellable units right now.
    pub fn available(&self) -> i32 {
        (self.quantity - self.reserved).max(0)
    }

    pub fn effective_low_stock_threshold(&self, default_threshold: i32) -> i32 {
        self.low_stock_threshold.unwrap_or(default_threshold)
    }

    pub fn inventory_value(&self) -> Decimal {
        self.price.saturating_mul(Decimal::from(self.quantity))
    }

    /// Axis key used for per-product uniqueness. Colors compare exactly;
    /// a variant without color is its own bucket.
    pub fn axis_key(&self) -> (Uuid, Option<String>, String) {
        (self.product_id, self.color.clone(), self.size.clone())
    }

    /// Deletion guard for the order collaborator: a variant still holding
    /// reserved units is referenced by open orders.
    pub fn can_delete(&self) -> bool {
        self.reserved == 0
    }

    /// Checks field-level invariants of a single record. Cross-record
    /// uniqueness is enforced by the store.
    pub fn validate(&self) -> Result<(), ServiceError> {
        validate_sku(&self.sku)?;
        if self.size.trim().is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "Variant {} has an empty size",
                self.sku
            )));
        }
        if let Some(color) = &self.color {
            if color.trim().is_empty() {
                return Err(ServiceError::ValidationError(format!(
                    "Variant {} has an empty color",
                    self.sku
                )));
            }
        }
        validate_price(self.price)
            .map_err(|e| ServiceError::ValidationError(format!("{} for {}", e, self.sku)))?;
        if self.quantity < 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "Quantity must not be negative for {}",
                self.sku
            )));
        }
        if self.incoming < 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "Incoming must not be negative for {}",
                self.sku
            )));
        }
        if self.reserved < 0 || self.reserved > self.quantity {
            return Err(ServiceError::ReservationConflict(format!(
                "Reserved {} must be between 0 and quantity {} for {}",
                self.reserved, self.quantity, self.sku
            )));
        }
        for (field, value) in [
            ("lowStockThreshold", self.low_stock_threshold),
            ("reorderPoint", self.reorder_point),
            ("reorderQuantity", self.reorder_quantity),
            ("safetyStock", self.safety_stock),
        ] {
            if matches!(value, Some(v) if v < 0) {
                return Err(ServiceError::ValidationError(format!(
                    "{} must not be negative for {}",
                    field, self.sku
                )));
            }
        }
        validate_image_selection(
            &self.images,
            self.main_image.as_deref(),
            self.hover_image.as_deref(),
            false,
        )
    }
}

/// Highest unit price accepted: `MAX_PRICE * i32::MAX` still fits a
/// `Decimal` with room left for catalog-wide sums.
pub const MAX_PRICE: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

pub fn validate_price(price: Decimal) -> Result<(), String> {
    if price.is_sign_negative() {
        return Err(format!("price {} must not be negative", price));
    }
    if price > MAX_PRICE {
        return Err(format!("price {} exceeds the maximum of {}", price, MAX_PRICE));
    }
    Ok(())
}

/// A SKU must be non-empty and free of whitespace. Hyphen layout is up to
/// the caller; the generator's blank segments are caught by the color and
/// size checks instead.
pub fn validate_sku(sku: &str) -> Result<(), ServiceError> {
    if sku.trim().is_empty() {
        return Err(ServiceError::ValidationError("SKU must not be empty".into()));
    }
    if sku.chars().any(char::is_whitespace) {
        return Err(ServiceError::ValidationError(format!(
            "SKU {:?} must not contain whitespace",
            sku
        )));
    }
    Ok(())
}

/// `main`/`hover` must each belong to `images` when set. With `required`
/// both must be set.
pub fn validate_image_selection(
    images: &[String],
    main: Option<&str>,
    hover: Option<&str>,
    required: bool,
) -> Result<(), ServiceError> {
    for (label, selected) in [("main", main), ("hover", hover)] {
        match selected.filter(|s| !s.is_empty()) {
            Some(url) if !images.iter().any(|img| img == url) => {
                return Err(ServiceError::MissingImageSelection(format!(
                    "{} image {} is not part of the image set",
                    label, url
                )));
            }
            None if required => {
                return Err(ServiceError::MissingImageSelection(format!(
                    "a {} image must be selected",
                    label
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use rust_decimal::Decimal;

    pub fn variant(sku: &str, color: Option<&str>, size: &str, price: i64, quantity: i32) -> Variant {
        let now = Utc::now();
        Variant {
            id: Uuid::new_v4(),
            sku: sku.to_string(),
            product_id: Uuid::nil(),
            color: color.map(str::to_string),
            color_id: None,
            size: size.to_string(),
            price: Decimal::from(price),
            quantity,
            reserved: 0,
            incoming: 0,
            low_stock_threshold: None,
            reorder_point: None,
            reorder_quantity: None,
            safety_stock: None,
            bin_location: None,
            main_image: None,
            hover_image: None,
            images: Vec::new(),
            is_active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::variant;
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn available_never_goes_negative() {
        let mut v = variant("TEE-M-RED", Some("Red"), "M", 10, 5);
        v.reserved = 3;
        assert_eq!(v.available(), 2);
        v.quantity = 2;
        v.reserved = 2;
        assert_eq!(v.available(), 0);
    }

    #[test]
    fn reserved_above_quantity_is_a_conflict() {
        let mut v = variant("TEE-M-RED", Some("Red"), "M", 10, 5);
        v.reserved = 6;
        assert_matches!(v.validate(), Err(ServiceError::ReservationConflict(_)));
    }

    #[test]
    fn sku_allows_any_hyphen_layout_but_no_whitespace() {
        assert!(validate_sku("TEE-M-RED").is_ok());
        assert!(validate_sku("TEE--001").is_ok());
        assert!(validate_sku("-LI-S-RED").is_ok());
        assert_matches!(validate_sku("TEE M"), Err(ServiceError::ValidationError(_)));
        assert_matches!(validate_sku("   "), Err(ServiceError::ValidationError(_)));
        assert_matches!(validate_sku(""), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn selected_images_must_belong_to_the_set() {
        let images = vec!["a.jpg".to_string(), "b.jpg".to_string()];
        assert!(validate_image_selection(&images, Some("a.jpg"), Some("b.jpg"), true).is_ok());
        assert_matches!(
            validate_image_selection(&images, Some("c.jpg"), Some("b.jpg"), true),
            Err(ServiceError::MissingImageSelection(_))
        );
        assert_matches!(
            validate_image_selection(&images, Some("a.jpg"), None, true),
            Err(ServiceError::MissingImageSelection(_))
        );
        assert!(validate_image_selection(&images, None, None, false).is_ok());
    }

    #[test]
    fn price_is_bounded() {
        assert!(validate_price(MAX_PRICE).is_ok());
        assert!(validate_price(Decimal::ZERO).is_ok());
        assert!(validate_price(MAX_PRICE + Decimal::ONE).is_err());
        assert!(validate_price(Decimal::NEGATIVE_ONE).is_err());
        assert_eq!(MAX_PRICE, Decimal::from(1_000_000_000_000_i64));

        let mut v = variant("TEE-M-RED", Some("Red"), "M", 12, 3);
        v.price = Decimal::MAX;
        assert_matches!(v.validate(), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn inventory_value_saturates_instead_of_overflowing() {
        let mut v = variant("TEE-M-RED", Some("Red"), "M", 0, 2);
        v.price = Decimal::MAX;
        assert_eq!(v.inventory_value(), Decimal::MAX);
    }

    #[test]
    fn inventory_value_is_price_times_quantity() {
        let v = variant("TEE-M-RED", Some("Red"), "M", 12, 3);
        assert_eq!(v.inventory_value(), Decimal::from(36));
    }
}
