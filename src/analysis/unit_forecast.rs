use anyhow::{Result, bail};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use super::filters::ViewFilter;
use crate::models::{ViewRow, WEEKDAYS};
use crate::processor::QuantityView;

/// Groups younger than this many days are flagged as new.
pub const NEW_ITEM_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupLevel {
    Item,
    SubCategory,
    ParentCategory,
}

impl GroupLevel {
    /// The finest level the selection narrows to: picked items or sub
    /// categories break down by item, picked parents by sub category.
    pub fn for_filter(filter: &ViewFilter) -> Self {
        if !filter.items.is_empty() || !filter.sub_categories.is_empty() {
            GroupLevel::Item
        } else if !filter.parent_categories.is_empty() {
            GroupLevel::SubCategory
        } else {
            GroupLevel::ParentCategory
        }
    }

    fn key<'a>(&self, row: &'a ViewRow) -> &'a str {
        match self {
            GroupLevel::Item => &row.item.canonical_name,
            GroupLevel::SubCategory => &row.item.sub_category,
            GroupLevel::ParentCategory => &row.item.parent_category,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekWindow {
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        self.start.iter_days().take(7)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitForecastRow {
    pub group: String,
    pub launch_date: NaiveDate,
    pub days_in_market: i64,
    pub is_new: bool,
    /// Expected units Monday through Sunday, rounded to whole units.
    pub units: [f64; 7],
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitForecast {
    pub level: GroupLevel,
    pub growth_pct: i32,
    pub week1: WeekWindow,
    pub week2: WeekWindow,
    /// Same expectations apply to both weeks; largest total first.
    pub rows: Vec<UnitForecastRow>,
}

/// Week 1 starts on the Monday strictly after `today`.
pub fn forecast_weeks(today: NaiveDate) -> (WeekWindow, WeekWindow) {
    let days_until_monday = match (7 - today.weekday().num_days_from_monday()) % 7 {
        0 => 7,
        n => n,
    };
    let start = today + Duration::days(days_until_monday as i64);
    let week1 = WeekWindow {
        start,
        end: start + Duration::days(6),
    };
    let week2 = WeekWindow {
        start: start + Duration::days(7),
        end: start + Duration::days(13),
    };
    (week1, week2)
}

/// Expected units per weekday for the next two weeks, from the quantity view.
///
/// Each group's average counts only days from its first sale onwards, so a
/// recently launched item is not diluted by the months before it existed.
pub fn unit_forecast(
    quantity: &QuantityView,
    filter: &ViewFilter,
    growth_pct: i32,
    today: NaiveDate,
) -> Result<UnitForecast> {
    let level = GroupLevel::for_filter(filter);

    let mut daily: BTreeMap<&str, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    for row in quantity.view_rows().filter(|r| filter.matches(r)) {
        let Some(date) = row.transaction.date else {
            continue;
        };
        *daily
            .entry(level.key(row))
            .or_default()
            .entry(date)
            .or_insert(0.0) += row.transaction.qty.unwrap_or(0.0);
    }

    let latest = daily
        .values()
        .filter_map(|days| days.keys().next_back())
        .max()
        .copied();
    let Some(latest) = latest else {
        bail!("No dated sales match the unit forecast filters");
    };

    let adjustment = 1.0 + growth_pct as f64 / 100.0;
    let mut rows: Vec<UnitForecastRow> = daily
        .into_iter()
        .filter_map(|(group, days)| {
            let launch_date = *days.keys().next()?;
            let units = weekday_means(&days).map(|avg| (avg * adjustment).round());
            let days_in_market = (latest - launch_date).num_days();

            Some(UnitForecastRow {
                group: group.to_string(),
                launch_date,
                days_in_market,
                is_new: days_in_market < NEW_ITEM_DAYS,
                total: units.iter().sum(),
                units,
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.group.cmp(&b.group))
    });

    let (week1, week2) = forecast_weeks(today);
    info!(
        "Unit forecast by {:?}: {} groups, week 1 {} to {}, adjustment {:+}%",
        level,
        rows.len(),
        week1.start,
        week1.end,
        growth_pct
    );

    Ok(UnitForecast {
        level,
        growth_pct,
        week1,
        week2,
        rows,
    })
}

/// Mean of the per-day totals for each weekday; weekdays never sold are zero.
fn weekday_means(days: &BTreeMap<NaiveDate, f64>) -> [f64; 7] {
    let mut sums = [0.0; WEEKDAYS.len()];
    let mut counts = [0usize; WEEKDAYS.len()];
    for (date, total) in days {
        let idx = date.weekday().num_days_from_monday() as usize;
        sums[idx] += total;
        counts[idx] += 1;
    }

    let mut means = [0.0; WEEKDAYS.len()];
    for idx in 0..WEEKDAYS.len() {
        if counts[idx] > 0 {
            means[idx] = sums[idx] / counts[idx] as f64;
        }
    }
    means
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::reconcile_sources;
    use crate::pipeline::tests::raw_sources;
    use crate::processor::CleaningSettings;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn quantity() -> QuantityView {
        reconcile_sources(&raw_sources(), &CleaningSettings::default())
            .unwrap()
            .quantity
    }

    #[test]
    fn test_week_windows() {
        // 2025-04-23 is a Wednesday.
        let (week1, week2) = forecast_weeks(date(4, 23));
        assert_eq!(week1.start, date(4, 28));
        assert_eq!(week1.end, date(5, 4));
        assert_eq!(week2.start, date(5, 5));
        assert_eq!(week2.end, date(5, 11));
        assert_eq!(week1.dates().count(), 7);

        // A Monday looks a full week ahead.
        let (week1, _) = forecast_weeks(date(4, 21));
        assert_eq!(week1.start, date(4, 28));
    }

    #[test]
    fn test_group_level_follows_selection() {
        assert_eq!(GroupLevel::for_filter(&ViewFilter::default()), GroupLevel::ParentCategory);
        assert_eq!(
            GroupLevel::for_filter(&ViewFilter::default().parents(["Food"])),
            GroupLevel::SubCategory
        );
        assert_eq!(
            GroupLevel::for_filter(&ViewFilter::default().parents(["Food"]).subs(["Momos"])),
            GroupLevel::Item
        );
        assert_eq!(
            GroupLevel::for_filter(&ViewFilter::default().items(["Veg Momos"])),
            GroupLevel::Item
        );
    }

    #[test]
    fn test_parent_level_forecast() {
        let forecast = unit_forecast(&quantity(), &ViewFilter::default(), 0, date(4, 23)).unwrap();

        assert_eq!(forecast.level, GroupLevel::ParentCategory);
        let food = forecast.rows.iter().find(|r| r.group == "Food").unwrap();
        // Item-X 2 units on Monday, Veg Momos 1 on Tuesday.
        assert_eq!(food.units[0], 2.0);
        assert_eq!(food.units[1], 1.0);
        assert_eq!(food.total, 3.0);
        assert_eq!(food.launch_date, date(4, 21));
        assert_eq!(food.days_in_market, 1);
        assert!(food.is_new);
        assert!(forecast.rows.windows(2).all(|w| w[0].total >= w[1].total));
    }

    #[test]
    fn test_growth_adjustment_applies() {
        let filter = ViewFilter::default().items(["Item-X"]);
        let forecast = unit_forecast(&quantity(), &filter, 50, date(4, 23)).unwrap();

        assert_eq!(forecast.rows.len(), 1);
        assert_eq!(forecast.rows[0].group, "Item-X");
        assert_eq!(forecast.rows[0].units[0], 3.0);
        assert_eq!(forecast.rows[0].total, 3.0);
    }

    #[test]
    fn test_weekday_mean_uses_sale_days_only() {
        let mut days = BTreeMap::new();
        days.insert(date(4, 21), 4.0);
        days.insert(date(4, 28), 8.0);
        days.insert(date(4, 22), 3.0);

        let means = weekday_means(&days);
        assert_eq!(means[0], 6.0);
        assert_eq!(means[1], 3.0);
        assert_eq!(means[6], 0.0);
    }

    #[test]
    fn test_no_matching_sales_is_an_error() {
        let filter = ViewFilter::default().outlet("Nowhere");
        assert!(unit_forecast(&quantity(), &filter, 0, date(4, 23)).is_err());
    }
}
