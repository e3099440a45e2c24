use anyhow::{Context, Result};
use chrono::Local;
use std::env;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sales_reconciliation::analysis::{
    BasketMatrix, DailyMetric, PairMiner, SalesReport, ViewFilter, WeeklyProfileForecaster,
    analyze_baskets, daily_series, run_forecast, unit_forecast,
};
use sales_reconciliation::fetcher::SourceFetcher;
use sales_reconciliation::{PipelineConfig, ReconcileCache, Reconciled, reconcile_sources};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    dotenv::dotenv().ok();

    let config_path = PipelineConfig::resolve_path(env::args().nth(1));
    let config = PipelineConfig::from_file(&config_path)
        .context("Failed to load pipeline configuration")?;

    info!("🚀 Starting sales reconciliation with {}", config_path);

    let fetcher = SourceFetcher::new(config.source_timeout())
        .context("Failed to initialize source fetcher")?;
    let cache = ReconcileCache::with_ttl(config.cache_ttl());

    let reconciled = cache
        .get_or_try_reconcile_async(&config.source_identity(), || async {
            let raw = fetcher.fetch_all(&config.sources).await?;
            reconcile_sources(&raw, &config.cleaning)
        })
        .await
        .context("Reconciliation failed")?;

    log_diagnostics(&reconciled);

    let report = SalesReport::build(&reconciled, &ViewFilter::default(), config.report.top_n)?;
    log_report(&report);

    let series = daily_series(reconciled.revenue.rows(), DailyMetric::Revenue);
    if series.is_empty() {
        warn!("No dated revenue, skipping the revenue forecast");
    } else {
        let forecaster = WeeklyProfileForecaster::new(config.forecast.trailing_weeks);
        if let Err(e) = run_forecast(&forecaster, &series, config.forecast.horizon_days) {
            error!("❌ Revenue forecast failed: {:#}", e);
        }
    }

    match unit_forecast(
        &reconciled.quantity,
        &ViewFilter::default(),
        config.forecast.growth_pct,
        Local::now().date_naive(),
    ) {
        Ok(forecast) => {
            for row in forecast.rows.iter().take(config.report.top_n) {
                info!(
                    "  {:<24} {:>6.0} units/week{}",
                    row.group,
                    row.total,
                    if row.is_new { " (new)" } else { "" }
                );
            }
        }
        Err(e) => warn!("Unit forecast skipped: {:#}", e),
    }

    let basket = BasketMatrix::from_revenue_view(&reconciled.revenue);
    info!(
        "Basket matrix: {} invoices x {} items",
        basket.invoice_count(),
        basket.items().len()
    );
    let outcome = analyze_baskets(
        &PairMiner,
        &basket,
        config.basket.min_support,
        config.basket.min_lift,
    )?;
    for rule in outcome.rules.iter().take(5) {
        info!(
            "  {} -> {}: support {:.4}, confidence {:.2}, lift {:.2}",
            rule.antecedents.join(", "),
            rule.consequents.join(", "),
            rule.support,
            rule.confidence,
            rule.lift
        );
    }

    info!("🎉 Sales reconciliation completed");
    Ok(())
}

fn log_diagnostics(reconciled: &Reconciled) {
    let stats = &reconciled.cleaning;
    let numeric_failures: usize = stats.numeric_parse_failures.values().sum();
    info!(
        "Cleaning: {} raw rows, {} retained, {} dropped by status",
        stats.raw_rows, stats.retained_rows, stats.dropped_by_status
    );
    info!(
        "Unparseable: {} dates, {} timestamps, {} numbers; {} blank item names",
        stats.unparseable_dates,
        stats.unparseable_timestamps,
        numeric_failures,
        stats.blank_item_names
    );

    for fault in reconciled.combo_integrity_faults() {
        warn!("⚠️ {}", fault);
    }
    let misses = reconciled.diagnostics.len() - reconciled.combo_integrity_faults().count();
    if misses > 0 {
        info!("{} invoiced items fell back to Unknown categories", misses);
    }
}

fn log_report(report: &SalesReport) {
    let kpis = &report.kpis;
    info!("=== Business KPIs ===");
    info!("Total revenue: ₹{:.2}", kpis.total_revenue);
    info!("Orders: {}", kpis.orders);
    info!("Average order value: ₹{:.2}", kpis.average_order_value);
    info!("Items sold: {:.0}", kpis.items_sold);

    info!("=== Sales channels ===");
    for channel in &report.channels {
        info!(
            "  {:<12} ₹{:.2} ({:.1}%), AOV ₹{:.2}",
            channel.channel, channel.revenue, channel.share_pct, channel.average_order_value
        );
    }

    info!("=== Discounts by channel ===");
    for row in &report.discount_by_channel {
        info!(
            "  {:<12} gross ₹{:.2}, discount ₹{:.2} ({:.2}%), net ₹{:.2}",
            row.label, row.gross, row.discount, row.discount_pct, row.net
        );
    }

    info!("=== Monthly trend ===");
    for row in &report.monthly_summary {
        let growth = |pct: Option<f64>| pct.map_or("n/a".to_string(), |p| format!("{:+.1}%", p));
        info!(
            "  {} gross ₹{:.2}, tax ₹{:.2}, net ₹{:.2} ({} MoM), {:.0} units ({} MoM)",
            row.month,
            row.gross,
            row.tax,
            row.net,
            growth(row.revenue_growth_pct),
            row.units,
            growth(row.units_growth_pct)
        );
    }

    info!("=== Revenue by week of month ===");
    for point in &report.week_of_month {
        info!("  {:<7} ₹{:.2}", point.label, point.revenue);
    }

    info!("=== Top items by revenue ===");
    for (i, item) in report.top_by_revenue.iter().enumerate() {
        info!("  {:2}. {:<30} ₹{:.2}", i + 1, item.item, item.value);
    }
    info!("=== Top items by quantity (component level) ===");
    for (i, item) in report.top_by_quantity.iter().enumerate() {
        info!("  {:2}. {:<30} {:.0} units", i + 1, item.item, item.value);
    }

    let comparison = &report.comparison;
    info!(
        "In both top lists: {}, revenue only: {}, quantity only: {}",
        comparison.in_both.len(),
        comparison.only_revenue.len(),
        comparison.only_quantity.len()
    );
}
