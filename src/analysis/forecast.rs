use anyhow::{Result, bail};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::models::ViewRow;

/// Value summed per day when building a [`DailySeries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyMetric {
    Revenue,
    Quantity,
}

impl DailyMetric {
    fn value(&self, row: &ViewRow) -> Option<f64> {
        match self {
            DailyMetric::Revenue => row.transaction.final_total,
            DailyMetric::Quantity => row.transaction.qty,
        }
    }
}

/// Chronological, gap-free daily totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySeries {
    points: Vec<(NaiveDate, f64)>,
}

impl DailySeries {
    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|(date, _)| *date)
    }

    pub fn total(&self) -> f64 {
        self.points.iter().map(|(_, v)| v).sum()
    }

    pub fn mean(&self) -> f64 {
        mean(self.points.iter().map(|(_, v)| *v))
    }

    /// Mean over the last `days` points, or all of them if fewer.
    pub fn trailing_mean(&self, days: usize) -> f64 {
        let start = self.points.len().saturating_sub(days);
        mean(self.points[start..].iter().map(|(_, v)| *v))
    }
}

/// Sums `metric` per calendar day from the first to the last sale date,
/// filling days without sales with zero. Undated rows are skipped.
pub fn daily_series<'a>(
    rows: impl IntoIterator<Item = &'a ViewRow>,
    metric: DailyMetric,
) -> DailySeries {
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for row in rows {
        if let Some(date) = row.transaction.date {
            *totals.entry(date).or_insert(0.0) += metric.value(row).unwrap_or(0.0);
        }
    }

    let (Some(first), Some(last)) = (
        totals.keys().next().copied(),
        totals.keys().next_back().copied(),
    ) else {
        return DailySeries::default();
    };

    let points = first
        .iter_days()
        .take_while(|day| *day <= last)
        .map(|day| (day, totals.get(&day).copied().unwrap_or(0.0)))
        .collect();

    DailySeries { points }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Seam for time-series models fed with a daily series.
pub trait Forecaster: Send + Sync {
    /// Predicts `horizon` days starting the day after the series ends.
    fn forecast(&self, series: &DailySeries, horizon: usize) -> Result<Vec<ForecastPoint>>;

    fn name(&self) -> &str;
}

/// Baseline model: each future day is the mean of the same weekday over
/// the trailing window, with a normal interval of `z` standard deviations.
#[derive(Debug, Clone)]
pub struct WeeklyProfileForecaster {
    pub trailing_weeks: usize,
    pub z: f64,
}

impl WeeklyProfileForecaster {
    pub fn new(trailing_weeks: usize) -> Self {
        WeeklyProfileForecaster {
            trailing_weeks: trailing_weeks.max(1),
            z: 1.96,
        }
    }
}

impl Forecaster for WeeklyProfileForecaster {
    fn forecast(&self, series: &DailySeries, horizon: usize) -> Result<Vec<ForecastPoint>> {
        let Some(last) = series.last_date() else {
            bail!("Cannot forecast from an empty daily series");
        };

        let window_start = series.len().saturating_sub(self.trailing_weeks * 7);
        let window = &series.points()[window_start..];

        let mut by_weekday: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        for (date, value) in window {
            by_weekday
                .entry(date.weekday().num_days_from_monday())
                .or_default()
                .push(*value);
        }
        let overall: Vec<f64> = window.iter().map(|(_, v)| *v).collect();
        debug!(
            "Weekly profile over {} days, {} weekdays observed",
            window.len(),
            by_weekday.len()
        );

        let points = (1..=horizon as i64)
            .map(|offset| {
                let date = last + Duration::days(offset);
                let values = by_weekday
                    .get(&date.weekday().num_days_from_monday())
                    .unwrap_or(&overall);
                let mean = mean(values.iter().copied());
                let spread = self.z * std_dev(values);
                ForecastPoint {
                    date,
                    mean,
                    lower: (mean - spread).max(0.0),
                    upper: mean + spread,
                }
            })
            .collect();

        Ok(points)
    }

    fn name(&self) -> &str {
        "weekly-profile"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub model: String,
    pub horizon_days: usize,
    pub total: f64,
    pub average_daily: f64,
    pub trailing_average: f64,
    pub change_pct: f64,
}

impl ForecastSummary {
    /// Compares the forecast against the last 30 days of history.
    pub fn new(model: &str, series: &DailySeries, points: &[ForecastPoint]) -> Self {
        let total: f64 = points.iter().map(|p| p.mean).sum();
        let average_daily = mean(points.iter().map(|p| p.mean));
        let trailing_average = series.trailing_mean(30);
        let change_pct = if trailing_average > 0.0 {
            (average_daily - trailing_average) / trailing_average * 100.0
        } else {
            0.0
        };

        ForecastSummary {
            model: model.to_string(),
            horizon_days: points.len(),
            total,
            average_daily,
            trailing_average,
            change_pct,
        }
    }
}

/// Runs `forecaster` over the series and summarises the result.
pub fn run_forecast(
    forecaster: &dyn Forecaster,
    series: &DailySeries,
    horizon: usize,
) -> Result<(Vec<ForecastPoint>, ForecastSummary)> {
    let points = forecaster.forecast(series, horizon)?;
    let summary = ForecastSummary::new(forecaster.name(), series, &points);

    info!(
        "{} forecast for {} days: total {:.2}, average {:.2}/day ({:+.1}% vs trailing 30 days)",
        summary.model,
        summary.horizon_days,
        summary.total,
        summary.average_daily,
        summary.change_pct
    );

    Ok((points, summary))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values.iter().copied());
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
