use chrono::{DateTime, Duration, Utc};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::str::FromStr;
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    entities::{variant::validate_price, ReferenceData, Variant},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::VariantStore,
    services::{
        health::{classify_health, HealthStatus},
        variant_family_service::{CreateVariantInput, VariantFamilyService},
    },
};

pub const EXPORT_HEADERS: [&str; 7] = ["SKU", "Product Name", "Size", "Color", "Price", "Stock", "Status"];
pub const REQUIRED_IMPORT_COLUMNS: [&str; 5] = ["sku", "size", "color", "price", "stock"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ReportType {
    #[default]
    All,
    /// Low or out of stock
    NeedsRestock,
    /// Stocked but untouched for `slow_moving_days`
    SlowMoving,
}

/// Variants included in `report`, in input order.
pub fn select_for_report<'a>(
    variants: &'a [Variant],
    report: ReportType,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Vec<&'a Variant> {
    let policy = config.health_policy();
    let cutoff = now - Duration::days(config.slow_moving_days);
    variants
        .iter()
        .filter(|v| match report {
            ReportType::All => true,
            ReportType::NeedsRestock => matches!(
                classify_health(v, &policy),
                HealthStatus::LowStock | HealthStatus::OutOfStock
            ),
            ReportType::SlowMoving => v.updated_at < cutoff && v.quantity > 0,
        })
        .collect()
}

/// Writes the export columns for `variants` and returns the row count.
pub fn write_export<W: io::Write>(
    writer: W,
    variants: &[&Variant],
    reference: &ReferenceData,
    config: &EngineConfig,
) -> Result<usize, ServiceError> {
    let policy = config.health_policy();
    let mut out = WriterBuilder::new().from_writer(writer);
    out.write_record(EXPORT_HEADERS)?;
    for variant in variants {
        let price = variant.price.normalize().to_string();
        let stock = variant.quantity.to_string();
        let status = classify_health(variant, &policy).to_string();
        out.write_record([
            variant.sku.as_str(),
            reference.product_name(variant.product_id).unwrap_or_default(),
            variant.size.as_str(),
            variant.color.as_deref().unwrap_or_default(),
            price.as_str(),
            stock.as_str(),
            status.as_str(),
        ])?;
    }
    out.flush()
        .map_err(|e| ServiceError::InternalError(format!("failed to flush export: {}", e)))?;
    Ok(variants.len())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportFailure {
    /// 1-based data row, header excluded
    pub row: usize,
    pub sku: String,
    pub code: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub failures: Vec<ImportFailure>,
}

#[derive(Debug)]
pub struct ParsedRow {
    pub row: usize,
    pub sku: String,
    pub input: Result<CreateVariantInput, ServiceError>,
}

struct ColumnMap(HashMap<String, usize>);

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Result<Self, ServiceError> {
        let columns: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_lowercase(), i))
            .collect();
        let missing: Vec<String> = REQUIRED_IMPORT_COLUMNS
            .iter()
            .filter(|c| !columns.contains_key(**c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ServiceError::MissingColumns(missing));
        }
        Ok(Self(columns))
    }

    fn get<'r>(&self, record: &'r StringRecord, column: &str) -> Option<&'r str> {
        self.0
            .get(column)
            .and_then(|i| record.get(*i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

fn parse_row(
    columns: &ColumnMap,
    record: &StringRecord,
    reference: &ReferenceData,
    default_product: Uuid,
) -> Result<CreateVariantInput, ServiceError> {
    let sku = columns
        .get(record, "sku")
        .ok_or_else(|| ServiceError::ValidationError("sku is empty".to_string()))?;
    let size = columns
        .get(record, "size")
        .ok_or_else(|| ServiceError::ValidationError("size is empty".to_string()))?;
    let color = columns.get(record, "color");

    let raw_price = columns.get(record, "price").unwrap_or("0");
    let price = Decimal::from_str(raw_price)
        .map_err(|_| ServiceError::ValidationError(format!("invalid price {}", raw_price)))?;
    validate_price(price).map_err(ServiceError::ValidationError)?;

    let raw_stock = columns.get(record, "stock").unwrap_or("0");
    let stock: i32 = raw_stock
        .parse()
        .map_err(|_| ServiceError::InvalidQuantity(format!("invalid stock {}", raw_stock)))?;
    if stock < 0 {
        return Err(ServiceError::InvalidQuantity(format!(
            "stock must not be negative, got {}",
            stock
        )));
    }

    let product_id = match columns.get(record, "product_id") {
        Some(raw) => Uuid::parse_str(raw)
            .map_err(|_| ServiceError::ValidationError(format!("invalid product_id {}", raw)))?,
        None => default_product,
    };
    let low_stock_threshold = columns
        .get(record, "low_stock_threshold")
        .map(|raw| {
            raw.parse::<i32>().map_err(|_| {
                ServiceError::ValidationError(format!("invalid low_stock_threshold {}", raw))
            })
        })
        .transpose()?;

    Ok(CreateVariantInput {
        product_id,
        sku: Some(sku.to_uppercase()),
        color: color.map(str::to_string),
        color_id: color.and_then(|c| reference.color_by_name(c)).map(|c| c.id),
        size: size.to_string(),
        price,
        quantity: stock,
        low_stock_threshold,
        ..CreateVariantInput::default()
    })
}

/// Parses an import file. A missing required column fails the whole file
/// before any row is looked at; row problems are reported per row.
pub fn parse_import<R: io::Read>(
    reader: R,
    reference: &ReferenceData,
    default_product: Uuid,
) -> Result<Vec<ParsedRow>, ServiceError> {
    let mut csv = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);
    let columns = ColumnMap::from_headers(csv.headers()?)?;

    let mut rows = Vec::new();
    for (index, record) in csv.records().enumerate() {
        let row = index + 1;
        let parsed = match record {
            Ok(record) => ParsedRow {
                row,
                sku: columns.get(&record, "sku").unwrap_or_default().to_uppercase(),
                input: parse_row(&columns, &record, reference, default_product),
            },
            Err(e) => ParsedRow {
                row,
                sku: String::new(),
                input: Err(e.into()),
            },
        };
        rows.push(parsed);
    }
    Ok(rows)
}

/// CSV import and export of the catalog.
pub struct CsvTransferService {
    store: Arc<dyn VariantStore>,
    family: Arc<VariantFamilyService>,
    event_sender: Arc<EventSender>,
    reference: Arc<ReferenceData>,
    config: Arc<EngineConfig>,
}

impl CsvTransferService {
    pub fn new(
        store: Arc<dyn VariantStore>,
        family: Arc<VariantFamilyService>,
        event_sender: Arc<EventSender>,
        reference: Arc<ReferenceData>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            family,
            event_sender,
            reference,
            config,
        }
    }

    #[instrument(skip(self, writer))]
    pub fn export_csv<W: io::Write>(&self, writer: W, report: ReportType) -> Result<usize, ServiceError> {
        let variants = self.store.list();
        let selected = select_for_report(&variants, report, &self.config, Utc::now());
        let written = write_export(writer, &selected, &self.reference, &self.config)?;
        info!(%report, rows = written, "catalog exported");
        Ok(written)
    }

    /// Creates one variant per valid row; failing rows are skipped and
    /// reported.
    #[instrument(skip(self, reader))]
    pub async fn import_csv<R: io::Read>(
        &self,
        reader: R,
        default_product: Uuid,
    ) -> Result<ImportReport, ServiceError> {
        let rows = parse_import(reader, &self.reference, default_product)?;

        let mut report = ImportReport::default();
        for parsed in rows {
            let result = match parsed.input {
                Ok(input) => self.family.create_variant(input).await.map(|_| ()),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => report.created += 1,
                Err(e) => {
                    warn!(row = parsed.row, sku = %parsed.sku, error = %e, "import row skipped");
                    report.failures.push(ImportFailure {
                        row: parsed.row,
                        sku: parsed.sku,
                        code: e.error_code().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            created = report.created,
            failed = report.failures.len(),
            "catalog import finished"
        );
        self.event_sender
            .send_or_log(Event::VariantsImported {
                created: report.created,
                failed: report.failures.len(),
            })
            .await;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::variant::fixtures::variant;
    use assert_matches::assert_matches;

    #[test]
    fn missing_columns_are_listed_in_order() {
        let data = "SKU,Size,Stock\nTEE-S-RED,S,3\n";
        let result = parse_import(data.as_bytes(), &ReferenceData::default(), Uuid::nil());
        assert_matches!(
            result,
            Err(ServiceError::MissingColumns(cols)) if cols == vec!["color".to_string(), "price".to_string()]
        );
    }

    #[test]
    fn quoted_fields_keep_embedded_commas() {
        let color_id = Uuid::new_v4();
        let reference = ReferenceData::default().with_color(color_id, "Red, Dark");
        let data = "sku,size,color,price,stock\ntee-s-dr,S,\"Red, Dark\",19.90,4\n";
        let rows = parse_import(data.as_bytes(), &reference, Uuid::nil()).unwrap();
        let input = rows[0].input.as_ref().unwrap();
        assert_eq!(input.sku.as_deref(), Some("TEE-S-DR"));
        assert_eq!(input.color.as_deref(), Some("Red, Dark"));
        assert_eq!(input.color_id, Some(color_id));
        assert_eq!(input.price, Decimal::new(1990, 2));
    }

    #[test]
    fn bad_rows_do_not_stop_parsing() {
        let data = "sku,size,color,price,stock\nA-S-RED,S,Red,abc,1\nA-M-RED,M,Red,10,-2\nA-L-RED,L,Red,10,2\n";
        let rows = parse_import(data.as_bytes(), &ReferenceData::default(), Uuid::nil()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_matches!(rows[0].input, Err(ServiceError::ValidationError(_)));
        assert_matches!(rows[1].input, Err(ServiceError::InvalidQuantity(_)));
        assert!(rows[2].input.is_ok());
        assert_eq!(rows[2].row, 3);
    }

    #[test]
    fn export_writes_status_from_classifier() {
        let product = Uuid::new_v4();
        let reference = ReferenceData::default().with_product(product, "Tee, Classic");
        let mut v = variant("TEE-S-RED", Some("Red"), "S", 25, 0);
        v.product_id = product;

        let mut buf = Vec::new();
        let rows = write_export(&mut buf, &[&v], &reference, &EngineConfig::default()).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert_eq!(rows, 1);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("SKU,Product Name,Size,Color,Price,Stock,Status"));
        assert_eq!(lines.next(), Some("TEE-S-RED,\"Tee, Classic\",S,Red,25,0,out-of-stock"));
    }

    #[test]
    fn report_types_select_expected_rows() {
        let now = Utc::now();
        let config = EngineConfig::default();
        let mut stale = variant("A-S-RED", Some("Red"), "S", 10, 40);
        stale.updated_at = now - Duration::days(120);
        let low = variant("A-M-RED", Some("Red"), "M", 10, 3);
        let healthy = variant("A-L-RED", Some("Red"), "L", 10, 50);
        let all = vec![stale, low, healthy];

        assert_eq!(select_for_report(&all, ReportType::All, &config, now).len(), 3);
        let restock = select_for_report(&all, ReportType::NeedsRestock, &config, now);
        assert_eq!(restock.len(), 1);
        assert_eq!(restock[0].sku, "A-M-RED");
        let slow = select_for_report(&all, ReportType::SlowMoving, &config, now);
        assert_eq!(slow.len(), 1);
        assert_eq!(slow[0].sku, "A-S-RED");
    }

    #[test]
    fn report_type_parses_snake_case() {
        assert_eq!(ReportType::from_str("needs_restock").unwrap(), ReportType::NeedsRestock);
        assert_eq!(ReportType::SlowMoving.to_string(), "slow_moving");
    }
}
