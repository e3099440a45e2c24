use anyhow::{Context, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use super::aggregate::{GroupKey, Measure, aggregate, number_values, text_values};
use super::filters::ViewFilter;
use super::view_frame::cols;
use crate::models::WEEKDAYS;
use crate::pipeline::Reconciled;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessKpis {
    pub total_revenue: f64,
    pub orders: usize,
    pub average_order_value: f64,
    pub items_sold: f64,
}

impl BusinessKpis {
    pub fn from_frame(revenue: &DataFrame) -> PolarsResult<Self> {
        let totals = aggregate(
            revenue,
            &[],
            &[Measure::FinalTotal, Measure::Invoices, Measure::Quantity],
        )?;
        let total_revenue = first(&totals, Measure::FinalTotal)?;
        let orders = first(&totals, Measure::Invoices)? as usize;

        Ok(BusinessKpis {
            total_revenue,
            orders,
            average_order_value: ratio(total_revenue, orders as f64),
            items_sold: first(&totals, Measure::Quantity)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPerformance {
    pub channel: String,
    pub revenue: f64,
    pub share_pct: f64,
    pub orders: usize,
    pub average_order_value: f64,
}

/// Revenue per sales channel, largest first.
pub fn channel_performance(revenue: &DataFrame) -> PolarsResult<Vec<ChannelPerformance>> {
    let grouped = aggregate(
        revenue,
        &[GroupKey::Channel],
        &[Measure::FinalTotal, Measure::Invoices],
    )?;
    let channels = text_values(&grouped, cols::SALES_CHANNEL)?;
    let totals = number_values(&grouped, Measure::FinalTotal.name())?;
    let orders = number_values(&grouped, Measure::Invoices.name())?;
    let overall: f64 = totals.iter().sum();

    let mut rows: Vec<ChannelPerformance> = channels
        .into_iter()
        .zip(totals)
        .zip(orders)
        .filter_map(|((channel, revenue), orders)| {
            Some(ChannelPerformance {
                channel: channel?,
                revenue,
                share_pct: ratio(revenue, overall) * 100.0,
                orders: orders as usize,
                average_order_value: ratio(revenue, orders),
            })
        })
        .collect();

    rows.sort_by(|a, b| descending(a.revenue, b.revenue));
    Ok(rows)
}

/// Gross is the pre-discount sub total, net the final total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountBreakdown {
    pub label: String,
    pub gross: f64,
    pub discount: f64,
    pub discount_pct: f64,
    pub net: f64,
    pub orders: usize,
    pub gross_aov: f64,
    pub net_aov: f64,
}

pub fn discount_by_channel(revenue: &DataFrame) -> PolarsResult<Vec<DiscountBreakdown>> {
    discount_breakdown(revenue, GroupKey::Channel)
}

/// Chronological by month label; undated rows are left out.
pub fn discount_by_month(revenue: &DataFrame) -> PolarsResult<Vec<DiscountBreakdown>> {
    discount_breakdown(revenue, GroupKey::MonthYear)
}

fn discount_breakdown(
    revenue: &DataFrame,
    key: GroupKey,
) -> PolarsResult<Vec<DiscountBreakdown>> {
    let grouped = aggregate(
        revenue,
        &[key],
        &[
            Measure::SubTotal,
            Measure::Discount,
            Measure::FinalTotal,
            Measure::Invoices,
        ],
    )?;

    let labels = text_values(&grouped, key.column())?;
    let gross = number_values(&grouped, Measure::SubTotal.name())?;
    let discount = number_values(&grouped, Measure::Discount.name())?;
    let net = number_values(&grouped, Measure::FinalTotal.name())?;
    let orders = number_values(&grouped, Measure::Invoices.name())?;

    let rows = labels
        .into_iter()
        .enumerate()
        .filter_map(|(i, label)| {
            Some(DiscountBreakdown {
                label: label?,
                gross: gross[i],
                discount: discount[i],
                discount_pct: ratio(discount[i], gross[i]) * 100.0,
                net: net[i],
                orders: orders[i] as usize,
                gross_aov: ratio(gross[i], orders[i]),
                net_aov: ratio(net[i], orders[i]),
            })
        })
        .collect();

    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub label: String,
    pub revenue: f64,
}

/// Monday first, only weekdays that had sales.
pub fn weekday_trend(revenue: &DataFrame) -> PolarsResult<Vec<TrendPoint>> {
    let mut points = trend(revenue, GroupKey::Weekday)?;
    points.sort_by_key(|p| WEEKDAYS.iter().position(|d| *d == p.label));
    Ok(points)
}

pub fn hourly_trend(revenue: &DataFrame) -> PolarsResult<Vec<TrendPoint>> {
    let mut points = trend(revenue, GroupKey::Hour)?;
    points.sort_by_key(|p| p.label.parse::<u32>().unwrap_or(u32::MAX));
    Ok(points)
}

/// Revenue for each week of the month, `Week 1` to `Week 5`. Weeks without
/// sales read 0.
pub fn week_of_month_trend(revenue: &DataFrame) -> PolarsResult<Vec<TrendPoint>> {
    let totals: BTreeMap<String, f64> = trend(revenue, GroupKey::WeekOfMonth)?
        .into_iter()
        .map(|p| (p.label, p.revenue))
        .collect();

    Ok((1..=5)
        .map(|week: u32| TrendPoint {
            label: format!("Week {}", week),
            revenue: totals.get(&week.to_string()).copied().unwrap_or(0.0),
        })
        .collect())
}

/// One month of invoiced money beside component-level units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTrendRow {
    pub month: String,
    pub gross: f64,
    pub tax: f64,
    pub net: f64,
    pub units: f64,
    /// Change against the previous month; `None` for the first month or
    /// when the previous month was 0.
    pub units_growth_pct: Option<f64>,
    pub revenue_growth_pct: Option<f64>,
}

/// Months of the revenue view in order, with units taken from the quantity
/// view. A month with revenue but no units reads 0 units.
pub fn monthly_summary(
    revenue: &DataFrame,
    quantity: &DataFrame,
) -> PolarsResult<Vec<MonthlyTrendRow>> {
    let money = aggregate(
        revenue,
        &[GroupKey::MonthYear],
        &[Measure::SubTotal, Measure::Tax, Measure::FinalTotal],
    )?;
    let months = text_values(&money, cols::MONTH_YEAR)?;
    let gross = number_values(&money, Measure::SubTotal.name())?;
    let tax = number_values(&money, Measure::Tax.name())?;
    let net = number_values(&money, Measure::FinalTotal.name())?;

    let by_units = aggregate(quantity, &[GroupKey::MonthYear], &[Measure::Quantity])?;
    let units: BTreeMap<String, f64> = text_values(&by_units, cols::MONTH_YEAR)?
        .into_iter()
        .zip(number_values(&by_units, Measure::Quantity.name())?)
        .filter_map(|(month, qty)| Some((month?, qty)))
        .collect();

    let mut rows: Vec<MonthlyTrendRow> = months
        .into_iter()
        .enumerate()
        .filter_map(|(i, month)| {
            let month = month?;
            Some(MonthlyTrendRow {
                units: units.get(&month).copied().unwrap_or(0.0),
                month,
                gross: gross[i],
                tax: tax[i],
                net: net[i],
                units_growth_pct: None,
                revenue_growth_pct: None,
            })
        })
        .collect();

    rows.sort_by(|a, b| a.month.cmp(&b.month));
    for i in 1..rows.len() {
        let (previous, current) = (&rows[i - 1], &rows[i]);
        let units_growth = growth_pct(previous.units, current.units);
        let revenue_growth = growth_pct(previous.net, current.net);
        rows[i].units_growth_pct = units_growth;
        rows[i].revenue_growth_pct = revenue_growth;
    }

    Ok(rows)
}

fn trend(revenue: &DataFrame, key: GroupKey) -> PolarsResult<Vec<TrendPoint>> {
    let grouped = aggregate(revenue, &[key], &[Measure::FinalTotal])?;
    let labels = text_values(&grouped, key.column())?;
    let totals = number_values(&grouped, Measure::FinalTotal.name())?;

    Ok(labels
        .into_iter()
        .zip(totals)
        .filter_map(|(label, revenue)| Some(TrendPoint { label: label?, revenue }))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub item: String,
    pub value: f64,
}

/// Canonical items ranked by `measure`, ties broken by name.
pub fn top_items(
    frame: &DataFrame,
    measure: Measure,
    n: usize,
) -> PolarsResult<Vec<RankedItem>> {
    let grouped = aggregate(frame, &[GroupKey::Item], &[measure])?;
    let items = text_values(&grouped, cols::CANONICAL_NAME)?;
    let values = number_values(&grouped, measure.name())?;

    let mut ranked: Vec<RankedItem> = items
        .into_iter()
        .zip(values)
        .filter_map(|(item, value)| Some(RankedItem { item: item?, value }))
        .collect();

    ranked.sort_by(|a, b| descending(a.value, b.value).then_with(|| a.item.cmp(&b.item)));
    ranked.truncate(n);
    Ok(ranked)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMetrics {
    pub category: String,
    pub revenue: f64,
    pub quantity: f64,
}

/// Parent categories with invoiced revenue beside component-level quantity,
/// the `n` largest by revenue.
pub fn category_matrix(
    revenue: &DataFrame,
    quantity: &DataFrame,
    n: usize,
) -> PolarsResult<Vec<CategoryMetrics>> {
    let mut metrics: BTreeMap<String, CategoryMetrics> = BTreeMap::new();

    let by_revenue = aggregate(revenue, &[GroupKey::ParentCategory], &[Measure::FinalTotal])?;
    let categories = text_values(&by_revenue, cols::PARENT_CATEGORY)?;
    let totals = number_values(&by_revenue, Measure::FinalTotal.name())?;
    for (category, total) in categories.into_iter().zip(totals) {
        if let Some(category) = category {
            entry(&mut metrics, category).revenue += total;
        }
    }

    let by_quantity = aggregate(quantity, &[GroupKey::ParentCategory], &[Measure::Quantity])?;
    let categories = text_values(&by_quantity, cols::PARENT_CATEGORY)?;
    let units = number_values(&by_quantity, Measure::Quantity.name())?;
    for (category, qty) in categories.into_iter().zip(units) {
        if let Some(category) = category {
            entry(&mut metrics, category).quantity += qty;
        }
    }

    let mut rows: Vec<CategoryMetrics> = metrics.into_values().collect();
    rows.sort_by(|a, b| {
        descending(a.revenue, b.revenue).then_with(|| a.category.cmp(&b.category))
    });
    rows.truncate(n);
    Ok(rows)
}

fn entry(
    metrics: &mut BTreeMap<String, CategoryMetrics>,
    category: String,
) -> &mut CategoryMetrics {
    metrics
        .entry(category.clone())
        .or_insert_with(|| CategoryMetrics {
            category,
            revenue: 0.0,
            quantity: 0.0,
        })
}

/// Overlap of the top revenue items and the top quantity items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopItemComparison {
    pub in_both: Vec<String>,
    pub only_revenue: Vec<String>,
    pub only_quantity: Vec<String>,
}

pub fn compare_top_items(
    by_revenue: &[RankedItem],
    by_quantity: &[RankedItem],
) -> TopItemComparison {
    let revenue: BTreeSet<&str> = by_revenue.iter().map(|r| r.item.as_str()).collect();
    let quantity: BTreeSet<&str> = by_quantity.iter().map(|r| r.item.as_str()).collect();

    let owned = |items: Vec<&&str>| -> Vec<String> {
        items.into_iter().map(|s| s.to_string()).collect()
    };
    TopItemComparison {
        in_both: owned(revenue.intersection(&quantity).collect()),
        only_revenue: owned(revenue.difference(&quantity).collect()),
        only_quantity: owned(quantity.difference(&revenue).collect()),
    }
}

/// Every report over one filtered pair of views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesReport {
    pub kpis: BusinessKpis,
    pub channels: Vec<ChannelPerformance>,
    pub discount_by_channel: Vec<DiscountBreakdown>,
    pub discount_by_month: Vec<DiscountBreakdown>,
    pub monthly_summary: Vec<MonthlyTrendRow>,
    pub weekday: Vec<TrendPoint>,
    pub week_of_month: Vec<TrendPoint>,
    pub hourly: Vec<TrendPoint>,
    pub top_by_revenue: Vec<RankedItem>,
    pub top_by_quantity: Vec<RankedItem>,
    pub categories: Vec<CategoryMetrics>,
    pub comparison: TopItemComparison,
}

impl SalesReport {
    pub fn build(reconciled: &Reconciled, filter: &ViewFilter, top_n: usize) -> Result<Self> {
        let revenue = reconciled
            .revenue
            .to_dataframe()
            .and_then(|df| filter.apply(&df))
            .context("Failed to build revenue view frame")?;
        let quantity = reconciled
            .quantity
            .to_dataframe()
            .and_then(|df| filter.apply(&df))
            .context("Failed to build quantity view frame")?;

        info!(
            "Building reports over {} revenue rows and {} quantity rows",
            revenue.height(),
            quantity.height()
        );

        let top_by_revenue = top_items(&revenue, Measure::FinalTotal, top_n)
            .context("Failed to rank items by revenue")?;
        let top_by_quantity = top_items(&quantity, Measure::Quantity, top_n)
            .context("Failed to rank items by quantity")?;
        let comparison = compare_top_items(&top_by_revenue, &top_by_quantity);

        Ok(SalesReport {
            kpis: BusinessKpis::from_frame(&revenue).context("Failed to compute KPIs")?,
            channels: channel_performance(&revenue)
                .context("Failed to compute channel performance")?,
            discount_by_channel: discount_by_channel(&revenue)
                .context("Failed to compute discounts by channel")?,
            discount_by_month: discount_by_month(&revenue)
                .context("Failed to compute discounts by month")?,
            monthly_summary: monthly_summary(&revenue, &quantity)
                .context("Failed to compute monthly summary")?,
            weekday: weekday_trend(&revenue).context("Failed to compute weekday trend")?,
            week_of_month: week_of_month_trend(&revenue)
                .context("Failed to compute week-of-month trend")?,
            hourly: hourly_trend(&revenue).context("Failed to compute hourly trend")?,
            categories: category_matrix(&revenue, &quantity, top_n)
                .context("Failed to compute category matrix")?,
            top_by_revenue,
            top_by_quantity,
            comparison,
        })
    }
}

fn first(frame: &DataFrame, measure: Measure) -> PolarsResult<f64> {
    Ok(number_values(frame, measure.name())?
        .first()
        .copied()
        .unwrap_or(0.0))
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

fn growth_pct(previous: f64, current: f64) -> Option<f64> {
    (previous != 0.0).then(|| (current - previous) / previous * 100.0)
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::reconcile_sources;
    use crate::pipeline::tests::raw_sources;
    use crate::processor::CleaningSettings;

    fn reconciled() -> Reconciled {
        reconcile_sources(&raw_sources(), &CleaningSettings::default()).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_business_kpis() {
        let df = reconciled().revenue.to_dataframe().unwrap();
        let kpis = BusinessKpis::from_frame(&df).unwrap();

        assert!(close(kpis.total_revenue, 1226.4));
        assert_eq!(kpis.orders, 4);
        assert!(close(kpis.average_order_value, 1226.4 / 4.0));
        assert!(close(kpis.items_sold, 7.0));
    }

    #[test]
    fn test_channel_performance_sorted_by_revenue() {
        let df = reconciled().revenue.to_dataframe().unwrap();
        let channels = channel_performance(&df).unwrap();

        assert_eq!(channels[0].channel, "Delivery");
        assert!(close(channels[0].revenue, 661.5));
        let shares: f64 = channels.iter().map(|c| c.share_pct).sum();
        assert!(close(shares, 100.0));
        assert!(close(channels[1].average_order_value, 564.9 / 3.0));
    }

    #[test]
    fn test_discount_by_channel() {
        let df = reconciled().revenue.to_dataframe().unwrap();
        let rows = discount_by_channel(&df).unwrap();

        let delivery = rows.iter().find(|r| r.label == "Delivery").unwrap();
        assert!(close(delivery.gross, 690.0));
        assert!(close(delivery.discount, 60.0));
        assert!(close(delivery.discount_pct, 60.0 / 690.0 * 100.0));
        assert!(close(delivery.gross_aov, 690.0));
        assert!(close(delivery.net_aov, 661.5));
    }

    #[test]
    fn test_discount_by_month_skips_undated() {
        let df = reconciled().revenue.to_dataframe().unwrap();
        let rows = discount_by_month(&df).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label, "2025-04");
        assert!(close(rows[0].discount, 72.0));
    }

    #[test]
    fn test_weekday_and_hourly_order() {
        let df = reconciled().revenue.to_dataframe().unwrap();

        let labels = |points: Vec<TrendPoint>| -> Vec<String> {
            points.into_iter().map(|p| p.label).collect()
        };
        assert_eq!(labels(weekday_trend(&df).unwrap()), vec!["Monday", "Tuesday"]);

        let hours = labels(hourly_trend(&df).unwrap());
        assert_eq!(hours, vec!["12", "18", "19", "20"]);
    }

    /// March and April sales, with a combo exploded in April.
    fn two_month_sources() -> Reconciled {
        let mut sources = raw_sources();
        sources.transactions = df! {
            "Invoice No." => &["10", "11", "12", "13"],
            "Item Name" => &["Veg Momo", "Cold Coffee", "Combo-A", "Veg Momo"],
            "Status" => &["Success", "Success", "Success", "Success"],
            "Date" => &["2025-03-03", "2025-03-21", "2025-04-22", "2025-04-30"],
            "Timestamp" => &["12:00", "13:00", "14:00", "15:00"],
            "Outlet" => &["Mall", "Mall", "Mall", "Mall"],
            "Area" => &["Dine In", "Dine In", "Dine In", "Dine In"],
            "Price" => &["100", "100", "150", "100"],
            "Qty." => &["1", "1", "2", "3"],
            "Sub Total" => &["100", "100", "300", "300"],
            "Discount" => &["0", "0", "0", "0"],
            "Tax" => &["5", "5", "15", "15"],
            "Final Total" => &["105", "105", "315", "315"],
        }
        .unwrap();
        reconcile_sources(&sources, &CleaningSettings::default()).unwrap()
    }

    #[test]
    fn test_monthly_summary_with_growth() {
        let reconciled = two_month_sources();
        let revenue = reconciled.revenue.to_dataframe().unwrap();
        let quantity = reconciled.quantity.to_dataframe().unwrap();

        let rows = monthly_summary(&revenue, &quantity).unwrap();

        assert_eq!(rows.len(), 2);
        let march = &rows[0];
        assert_eq!(march.month, "2025-03");
        assert!(close(march.gross, 200.0));
        assert!(close(march.tax, 10.0));
        assert!(close(march.net, 210.0));
        assert!(close(march.units, 2.0));
        assert_eq!(march.units_growth_pct, None);
        assert_eq!(march.revenue_growth_pct, None);

        // Combo-A counts once per component: 2 + 2 + 3 units.
        let april = &rows[1];
        assert_eq!(april.month, "2025-04");
        assert!(close(april.net, 630.0));
        assert!(close(april.units, 7.0));
        assert!(close(april.units_growth_pct.unwrap(), 250.0));
        assert!(close(april.revenue_growth_pct.unwrap(), 200.0));
    }

    #[test]
    fn test_growth_from_zero_is_undefined() {
        assert_eq!(growth_pct(0.0, 10.0), None);
        assert!(close(growth_pct(200.0, 150.0).unwrap(), -25.0));
    }

    #[test]
    fn test_week_of_month_trend_fills_every_week() {
        let df = two_month_sources().revenue.to_dataframe().unwrap();
        let weeks = week_of_month_trend(&df).unwrap();

        let labels: Vec<&str> = weeks.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Week 1", "Week 2", "Week 3", "Week 4", "Week 5"]);
        assert!(close(weeks[0].revenue, 105.0));
        assert!(close(weeks[1].revenue, 0.0));
        assert!(close(weeks[2].revenue, 105.0));
        assert!(close(weeks[3].revenue, 315.0));
        assert!(close(weeks[4].revenue, 315.0));
    }

    #[test]
    fn test_top_items_per_view() {
        let reconciled = reconciled();
        let revenue = reconciled.revenue.to_dataframe().unwrap();
        let quantity = reconciled.quantity.to_dataframe().unwrap();

        let by_revenue = top_items(&revenue, Measure::FinalTotal, 2).unwrap();
        assert_eq!(by_revenue[0].item, "Combo-A");
        assert_eq!(by_revenue.len(), 2);

        // Combos never appear at component level.
        let by_quantity = top_items(&quantity, Measure::Quantity, 10).unwrap();
        assert!(by_quantity.iter().all(|r| !r.item.starts_with("Combo")));
        assert_eq!(by_quantity[0].item, "Cold Coffee");
        assert!(close(by_quantity[0].value, 3.0));
    }

    #[test]
    fn test_compare_top_items() {
        let ranked = |names: &[&str]| -> Vec<RankedItem> {
            names
                .iter()
                .map(|n| RankedItem { item: n.to_string(), value: 1.0 })
                .collect()
        };
        let comparison = compare_top_items(&ranked(&["A", "B", "C"]), &ranked(&["B", "D"]));

        assert_eq!(comparison.in_both, vec!["B"]);
        assert_eq!(comparison.only_revenue, vec!["A", "C"]);
        assert_eq!(comparison.only_quantity, vec!["D"]);
    }

    #[test]
    fn test_sales_report_with_filter() {
        let filter = ViewFilter::default().outlet("Mall");
        let report = SalesReport::build(&reconciled(), &filter, 10).unwrap();

        assert_eq!(report.kpis.orders, 2);
        assert!(close(report.kpis.total_revenue, 375.9));
        let food = report.categories.iter().find(|c| c.category == "Food").unwrap();
        assert!(close(food.quantity, 1.0));
        assert_eq!(report.monthly_summary.len(), 1);
        assert!(close(report.monthly_summary[0].net, 375.9));
        assert_eq!(report.week_of_month.len(), 5);
        assert!(close(report.week_of_month[3].revenue, 375.9));
    }
}
