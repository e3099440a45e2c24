use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use std::env;
use tracing_subscriber::EnvFilter;

use sales_reconciliation::analysis::{SalesReport, ViewFilter};
use sales_reconciliation::fetcher::SourceFetcher;
use sales_reconciliation::{PipelineConfig, reconcile_sources};

/// Prints filtered snapshots of both views.
///
/// Usage: inspect_views [config] [--outlet NAME] [--channel NAME]
///        [--from YYYY-MM-DD] [--to YYYY-MM-DD] [--parent NAME]... [--json]
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let (config_arg, filter, as_json) = parse_args(&args)?;

    let config_path = PipelineConfig::resolve_path(config_arg);
    let config = PipelineConfig::from_file(&config_path)?;

    let fetcher = SourceFetcher::new(config.source_timeout())?;
    let raw = fetcher
        .fetch_all(&config.sources)
        .await
        .context("Failed to load sources")?;
    let reconciled =
        reconcile_sources(&raw, &config.cleaning).context("Reconciliation failed")?;

    if as_json {
        let report = SalesReport::build(&reconciled, &filter, config.report.top_n)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let revenue = filter.apply(&reconciled.revenue.to_dataframe()?)?;
    let quantity = filter.apply(&reconciled.quantity.to_dataframe()?)?;

    println!("=== Revenue view ({} rows) ===", revenue.height());
    println!("{}", revenue.head(Some(20)));
    println!("\n=== Quantity view ({} rows) ===", quantity.height());
    println!("{}", quantity.head(Some(20)));

    if !reconciled.diagnostics.is_empty() {
        println!("\n=== Diagnostics ===");
        for diagnostic in &reconciled.diagnostics {
            println!("  {}", diagnostic);
        }
    }

    Ok(())
}

fn parse_args(args: &[String]) -> Result<(Option<String>, ViewFilter, bool)> {
    let mut config = None;
    let mut filter = ViewFilter::default();
    let mut as_json = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .with_context(|| format!("{} needs a value", arg))
        };
        match arg.as_str() {
            "--json" => as_json = true,
            "--outlet" => filter.outlet = Some(value()?),
            "--channel" => filter.sales_channel = Some(value()?),
            "--from" => filter.date_from = Some(parse_day(&value()?)?),
            "--to" => filter.date_to = Some(parse_day(&value()?)?),
            "--parent" => filter.parent_categories.push(value()?),
            "--sub" => filter.sub_categories.push(value()?),
            "--item" => filter.items.push(value()?),
            flag if flag.starts_with("--") => bail!("Unknown option: {}", flag),
            path => config = Some(path.to_string()),
        }
    }

    Ok((config, filter, as_json))
}

fn parse_day(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {}", raw))
}
