use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::entities::{ReferenceData, Variant};
use crate::errors::ServiceError;

/// Three-way stock partition used by list filters and quick counts.
///
/// Boundaries match the health classifier but this is computed on its own
/// so aggregation never depends on display classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum StockStatus {
    #[serde(rename = "inStock")]
    #[strum(to_string = "inStock", serialize = "in_stock")]
    InStock,
    #[serde(rename = "low")]
    #[strum(serialize = "low")]
    Low,
    #[serde(rename = "out")]
    #[strum(serialize = "out")]
    Out,
}

impl StockStatus {
    pub fn of(quantity: i32, threshold: i32) -> Self {
        if quantity <= 0 {
            Self::Out
        } else if quantity <= threshold {
            Self::Low
        } else {
            Self::InStock
        }
    }
}

/// Filter dimensions combined with AND. `None` leaves a dimension open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantFilter {
    pub search: Option<String>,
    pub product: Option<Uuid>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub stock_status: Option<StockStatus>,
}

fn open_dimension(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

impl VariantFilter {
    /// Builds a filter from raw query values where `"all"` or an empty
    /// string means "no restriction".
    pub fn from_query(
        search: Option<&str>,
        product: Option<&str>,
        size: Option<&str>,
        color: Option<&str>,
        stock_status: Option<&str>,
    ) -> Result<Self, ServiceError> {
        let product = open_dimension(product)
            .map(|raw| {
                Uuid::parse_str(raw).map_err(|_| {
                    ServiceError::ValidationError(format!("Invalid product id {}", raw))
                })
            })
            .transpose()?;
        let stock_status = open_dimension(stock_status)
            .map(|raw| {
                StockStatus::from_str(raw).map_err(|_| {
                    ServiceError::ValidationError(format!(
                        "Unknown stock status {} (expected inStock, low, out or all)",
                        raw
                    ))
                })
            })
            .transpose()?;

        Ok(Self {
            search: search
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            product,
            size: open_dimension(size).map(str::to_string),
            color: open_dimension(color).map(str::to_string),
            stock_status,
        })
    }

    pub fn matches(&self, variant: &Variant, reference: &ReferenceData, default_threshold: i32) -> bool {
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            let hit = variant.sku.to_lowercase().contains(&term)
                || reference
                    .product_name(variant.product_id)
                    .map_or(false, |name| name.to_lowercase().contains(&term))
                || variant
                    .color
                    .as_deref()
                    .map_or(false, |c| c.to_lowercase().contains(&term))
                || variant.size.to_lowercase().contains(&term);
            if !hit {
                return false;
            }
        }
        if matches!(self.product, Some(id) if id != variant.product_id) {
            return false;
        }
        if matches!(&self.size, Some(size) if *size != variant.size) {
            return false;
        }
        if let Some(color) = &self.color {
            if variant.color.as_deref() != Some(color.as_str()) {
                return false;
            }
        }
        if let Some(status) = self.stock_status {
            let threshold = variant.effective_low_stock_threshold(default_threshold);
            if StockStatus::of(variant.quantity, threshold) != status {
                return false;
            }
        }
        true
    }
}

/// Returns the matching variants in input order.
pub fn filter_variants(
    variants: &[Variant],
    filter: &VariantFilter,
    reference: &ReferenceData,
    default_threshold: i32,
) -> Vec<Variant> {
    variants
        .iter()
        .filter(|v| filter.matches(v, reference, default_threshold))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::variant::fixtures::variant;
    use assert_matches::assert_matches;

    fn catalog() -> (Vec<Variant>, ReferenceData) {
        let product = Uuid::new_v4();
        let reference = ReferenceData::default().with_product(product, "Summer Tee");
        let mut variants = vec![
            variant("SUM-S-RED", Some("Red"), "S", 20, 0),
            variant("SUM-M-RED", Some("Red"), "M", 20, 4),
            variant("SUM-L-BLUE", Some("Blue"), "L", 20, 40),
            variant("SUM-XL", None, "XL", 20, 12),
        ];
        for v in &mut variants {
            v.product_id = product;
        }
        (variants, reference)
    }

    #[test]
    fn search_spans_sku_product_color_and_size() {
        let (variants, reference) = catalog();
        let by = |term: &str| {
            let filter = VariantFilter {
                search: Some(term.to_string()),
                ..VariantFilter::default()
            };
            filter_variants(&variants, &filter, &reference, 10).len()
        };
        assert_eq!(by("blue"), 1);
        assert_eq!(by("summer"), 4);
        assert_eq!(by("xl"), 1);
        assert_eq!(by("sum-m"), 1);
        assert_eq!(by("green"), 0);
    }

    #[test]
    fn stock_status_out_ignores_other_open_dimensions() {
        let (variants, reference) = catalog();
        let filter = VariantFilter::from_query(None, Some("all"), Some("all"), Some(""), Some("out")).unwrap();
        let found = filter_variants(&variants, &filter, &reference, 10);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].quantity, 0);
    }

    #[test]
    fn dimensions_combine_with_and() {
        let (variants, reference) = catalog();
        let filter = VariantFilter::from_query(None, None, Some("M"), Some("Red"), Some("low")).unwrap();
        assert_eq!(filter_variants(&variants, &filter, &reference, 10).len(), 1);

        let filter = VariantFilter::from_query(None, None, Some("L"), Some("Red"), None).unwrap();
        assert!(filter_variants(&variants, &filter, &reference, 10).is_empty());
    }

    #[test]
    fn in_stock_is_above_threshold() {
        let (variants, reference) = catalog();
        let filter = VariantFilter {
            stock_status: Some(StockStatus::InStock),
            ..VariantFilter::default()
        };
        let skus: Vec<_> = filter_variants(&variants, &filter, &reference, 10)
            .into_iter()
            .map(|v| v.sku)
            .collect();
        assert_eq!(skus, vec!["SUM-L-BLUE", "SUM-XL"]);
    }

    #[test]
    fn rejects_unknown_status() {
        assert_matches!(
            VariantFilter::from_query(None, None, None, None, Some("sideways")),
            Err(ServiceError::ValidationError(_))
        );
    }
}
