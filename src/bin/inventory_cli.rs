use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;
use variant_inventory::{
    config::{self, EngineConfig},
    entities::{AdjustmentOperation, AdjustmentReason, ReferenceData, Variant},
    events::{process_events, EventHandler, LoggingEventHandler},
    services::{
        csv_transfer::ReportType,
        inventory_adjustment_service::AdjustInventoryCommand,
        stats::percentage,
    },
    InventoryEngine, VariantFilter,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config_from(&cli.config_dir)
        .with_context(|| format!("failed to load configuration from {}", cli.config_dir))?;
    config::init_tracing(config.log_level(), config.log_json);

    match cli.command {
        Commands::CheckConfig => handle_check_config(&config, cli.json),
        Commands::Stats(args) => handle_stats(config, args, cli.json).await,
        Commands::List(args) => handle_list(config, args, cli.json).await,
        Commands::Alerts(args) => handle_alerts(config, args).await,
        Commands::Export(args) => handle_export(config, args).await,
        Commands::Adjust(args) => handle_adjust(config, args, cli.json).await,
    }
}

#[derive(Parser)]
#[command(
    name = "variant-inventory",
    about = "Inspect and adjust a variant catalog exported as CSV",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[arg(long, global = true, default_value = "config", help = "Directory holding default.toml")]
    config_dir: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate configuration, then print it
    CheckConfig,
    /// Totals, distributions and attention list for a catalog
    Stats(CatalogArgs),
    /// Filtered listing
    List(ListArgs),
    /// Low, out, overstock and reservation alerts
    Alerts(CatalogArgs),
    /// Re-export a catalog through the engine
    Export(ExportArgs),
    /// Apply one adjustment and print the resulting ledger entry
    Adjust(AdjustArgs),
}

#[derive(Args)]
struct CatalogArgs {
    #[arg(help = "CSV file with at least sku,size,color,price,stock")]
    file: PathBuf,
    #[arg(long, help = "Product name used for rows without product_id")]
    product_name: Option<String>,
}

#[derive(Args)]
struct ListArgs {
    #[command(flatten)]
    catalog: CatalogArgs,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    size: Option<String>,
    #[arg(long)]
    color: Option<String>,
    #[arg(long, help = "inStock, low, out or all")]
    status: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportArg {
    All,
    NeedsRestock,
    SlowMoving,
}

impl From<ReportArg> for ReportType {
    fn from(value: ReportArg) -> Self {
        match value {
            ReportArg::All => ReportType::All,
            ReportArg::NeedsRestock => ReportType::NeedsRestock,
            ReportArg::SlowMoving => ReportType::SlowMoving,
        }
    }
}

#[derive(Args)]
struct ExportArgs {
    #[command(flatten)]
    catalog: CatalogArgs,
    #[arg(long, value_enum, default_value = "all")]
    report: ReportArg,
}

#[derive(Clone, Copy, ValueEnum)]
enum OperationArg {
    Add,
    Subtract,
    Set,
}

impl From<OperationArg> for AdjustmentOperation {
    fn from(value: OperationArg) -> Self {
        match value {
            OperationArg::Add => AdjustmentOperation::Add,
            OperationArg::Subtract => AdjustmentOperation::Subtract,
            OperationArg::Set => AdjustmentOperation::Set,
        }
    }
}

#[derive(Args)]
struct AdjustArgs {
    #[command(flatten)]
    catalog: CatalogArgs,
    #[arg(long)]
    sku: String,
    #[arg(long, value_enum)]
    operation: OperationArg,
    #[arg(long, allow_negative_numbers = true)]
    quantity: f64,
    #[arg(long, default_value = "manual")]
    reason: String,
    #[arg(long)]
    note: Option<String>,
}

/// Builds an engine over an in-memory store and imports `args.file` into it.
async fn load_engine(config: EngineConfig, args: &CatalogArgs) -> Result<InventoryEngine> {
    let product_id = Uuid::new_v4();
    let product_name = args
        .product_name
        .clone()
        .unwrap_or_else(|| default_product_name(&args.file));
    let reference = ReferenceData::default().with_product(product_id, product_name);

    let (engine, rx) = InventoryEngine::in_memory(config, reference);
    let handlers: Vec<Arc<dyn EventHandler>> = vec![Arc::new(LoggingEventHandler)];
    tokio::spawn(process_events(rx, handlers));

    let file = File::open(&args.file)
        .with_context(|| format!("failed to open {}", args.file.display()))?;
    let report = engine
        .transfer
        .import_csv(file, product_id)
        .await
        .map_err(|e| anyhow!(e.response_message()))
        .context("catalog import failed")?;

    for failure in &report.failures {
        warn!(row = failure.row, sku = %failure.sku, error = %failure.error, "row skipped");
    }
    debug!(created = report.created, "catalog loaded");
    Ok(engine)
}

fn default_product_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("catalog")
        .to_string()
}

fn handle_check_config(config: &EngineConfig, json: bool) -> Result<()> {
    if json {
        print_json(&ConfigSummary::from(config))?;
    } else {
        println!("Configuration OK ({})", config.environment);
        println!("  default low stock threshold: {}", config.default_low_stock_threshold);
        match config.overstock_ceiling {
            Some(ceiling) => println!("  overstock ceiling: {}", ceiling),
            None => println!("  overstock ceiling: none"),
        }
        println!(
            "  overstock reorder multiplier: {}",
            config.overstock_reorder_multiplier
        );
        println!("  alert limit: {}", config.alert_limit);
    }
    Ok(())
}

#[derive(Serialize)]
struct ConfigSummary {
    environment: String,
    default_low_stock_threshold: i32,
    overstock_ceiling: Option<i32>,
    overstock_reorder_multiplier: i32,
    alert_limit: usize,
    slow_moving_days: i64,
}

impl From<&EngineConfig> for ConfigSummary {
    fn from(config: &EngineConfig) -> Self {
        Self {
            environment: config.environment.clone(),
            default_low_stock_threshold: config.default_low_stock_threshold,
            overstock_ceiling: config.overstock_ceiling,
            overstock_reorder_multiplier: config.overstock_reorder_multiplier,
            alert_limit: config.alert_limit,
            slow_moving_days: config.slow_moving_days,
        }
    }
}

async fn handle_stats(config: EngineConfig, args: CatalogArgs, json: bool) -> Result<()> {
    let engine = load_engine(config, &args).await?;
    let stats = engine.compute_stats(&engine.variants());

    if json {
        return print_json(&stats);
    }

    println!(
        "{} SKUs • {} units • value {}",
        stats.total_skus, stats.total_stock, stats.total_value
    );
    println!(
        "in stock {} • low {} • out {}",
        stats.in_stock, stats.low_stock, stats.out_of_stock
    );
    println!("By size:");
    for (size, units) in &stats.distribution_by_size {
        println!(
            "  {:<12} {:>8} ({}%)",
            size,
            units,
            percentage(*units, stats.total_stock)
        );
    }
    println!("By color:");
    for (color, units) in &stats.distribution_by_color {
        println!(
            "  {:<12} {:>8} ({}%)",
            color.to_string(),
            units,
            percentage(*units, stats.total_stock)
        );
    }
    if !stats.needs_attention.is_empty() {
        println!("Needs attention:");
        for variant in &stats.needs_attention {
            render_variant(&engine, variant);
        }
    }
    Ok(())
}

async fn handle_list(config: EngineConfig, args: ListArgs, json: bool) -> Result<()> {
    let engine = load_engine(config, &args.catalog).await?;
    let filter = VariantFilter::from_query(
        args.search.as_deref(),
        None,
        args.size.as_deref(),
        args.color.as_deref(),
        args.status.as_deref(),
    )
    .map_err(|e| anyhow!(e.response_message()))?;
    let variants = engine.filter_variants(&engine.variants(), &filter);

    if json {
        return print_json(&variants);
    }
    for variant in &variants {
        render_variant(&engine, variant);
    }
    println!("{} variant(s)", variants.len());
    Ok(())
}

async fn handle_alerts(config: EngineConfig, args: CatalogArgs) -> Result<()> {
    let engine = load_engine(config, &args).await?;
    print_json(&engine.alerts())
}

async fn handle_export(config: EngineConfig, args: ExportArgs) -> Result<()> {
    let engine = load_engine(config, &args.catalog).await?;
    let stdout = io::stdout();
    engine
        .transfer
        .export_csv(stdout.lock(), args.report.into())
        .map_err(|e| anyhow!(e.response_message()))
        .context("export failed")?;
    Ok(())
}

async fn handle_adjust(config: EngineConfig, args: AdjustArgs, json: bool) -> Result<()> {
    let engine = load_engine(config, &args.catalog).await?;
    let variant = engine
        .store
        .find_by_sku(&args.sku)
        .ok_or_else(|| anyhow!("no variant with SKU {}", args.sku))?;
    let reason = AdjustmentReason::parse(&args.reason).map_err(|e| anyhow!(e.response_message()))?;

    let mut command = AdjustInventoryCommand::new(variant.id, args.operation.into(), args.quantity)
        .reason(reason);
    if let Some(note) = args.note {
        command = command.note(note);
    }

    let result = engine
        .apply_adjustment(command)
        .await
        .map_err(|e| anyhow!(e.response_message()))?;

    if json {
        return print_json(&result);
    }
    let adjustment = &result.adjustment;
    println!(
        "{} {} {} → {} ({:+})",
        adjustment.sku,
        adjustment.operation,
        adjustment.quantity_before,
        adjustment.quantity_after,
        adjustment.delta
    );
    render_variant(&engine, &result.variant);
    Ok(())
}

fn render_variant(engine: &InventoryEngine, variant: &Variant) {
    println!(
        "- {} • {} / {} • {} on hand ({} available) • {} • {}",
        variant.sku,
        variant.color.as_deref().unwrap_or("-"),
        variant.size,
        variant.quantity,
        variant.available(),
        variant.price,
        engine.classify_health(variant)
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
