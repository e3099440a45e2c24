use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::view_frame::cols;

/// Dimension a view frame can be grouped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Date,
    MonthYear,
    WeekOfMonth,
    Weekday,
    Hour,
    ParentCategory,
    SubCategory,
    Item,
    Channel,
    Outlet,
    Invoice,
}

impl GroupKey {
    pub fn column(&self) -> &'static str {
        match self {
            GroupKey::Date => cols::DATE,
            GroupKey::MonthYear => cols::MONTH_YEAR,
            GroupKey::WeekOfMonth => cols::WEEK_OF_MONTH,
            GroupKey::Weekday => cols::WEEKDAY,
            GroupKey::Hour => cols::HOUR,
            GroupKey::ParentCategory => cols::PARENT_CATEGORY,
            GroupKey::SubCategory => cols::SUB_CATEGORY,
            GroupKey::Item => cols::CANONICAL_NAME,
            GroupKey::Channel => cols::SALES_CHANNEL,
            GroupKey::Outlet => cols::OUTLET,
            GroupKey::Invoice => cols::INVOICE_NO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    /// Distinct invoice numbers; rows without one are not counted.
    Invoices,
    Quantity,
    FinalTotal,
    SubTotal,
    Discount,
    Tax,
}

impl Measure {
    /// Column name of the measure in an aggregate result.
    pub fn name(&self) -> &'static str {
        match self {
            Measure::Invoices => "invoices",
            Measure::Quantity => cols::QTY,
            Measure::FinalTotal => cols::FINAL_TOTAL,
            Measure::SubTotal => cols::SUB_TOTAL,
            Measure::Discount => cols::DISCOUNT,
            Measure::Tax => cols::TAX,
        }
    }

    fn expr(&self) -> Expr {
        match self {
            Measure::Invoices => col(cols::INVOICE_NO)
                .drop_nulls()
                .n_unique()
                .cast(DataType::Float64)
                .alias(self.name()),
            // polars sums skip nulls
            _ => col(self.name()).sum().alias(self.name()),
        }
    }
}

/// Groups a view frame by `keys` and evaluates `measures` per group.
///
/// Groups come back sorted by key. With no keys the result is a single
/// row over the whole frame.
pub fn aggregate(
    frame: &DataFrame,
    keys: &[GroupKey],
    measures: &[Measure],
) -> PolarsResult<DataFrame> {
    let measure_exprs: Vec<Expr> = measures.iter().map(Measure::expr).collect();

    if keys.is_empty() {
        return frame.clone().lazy().select(measure_exprs).collect();
    }

    let key_exprs: Vec<Expr> = keys.iter().map(|k| col(k.column())).collect();
    frame
        .clone()
        .lazy()
        .group_by(key_exprs.clone())
        .agg(measure_exprs)
        .sort_by_exprs(key_exprs, SortMultipleOptions::default())
        .collect()
}

/// A result column read as text; null keys stay `None`.
pub fn text_values(frame: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    let column = frame.column(name)?.cast(&DataType::String)?;
    let values = column
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect();
    Ok(values)
}

/// A result column read as numbers with nulls as zero.
pub fn number_values(frame: &DataFrame, name: &str) -> PolarsResult<Vec<f64>> {
    let column = frame.column(name)?.cast(&DataType::Float64)?;
    let values = column
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect();
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::reconcile_sources;
    use crate::pipeline::tests::raw_sources;
    use crate::processor::CleaningSettings;

    fn revenue_frame() -> DataFrame {
        reconcile_sources(&raw_sources(), &CleaningSettings::default())
            .unwrap()
            .revenue
            .to_dataframe()
            .unwrap()
    }

    #[test]
    fn test_totals_without_keys() {
        let df = aggregate(
            &revenue_frame(),
            &[],
            &[Measure::Invoices, Measure::FinalTotal, Measure::Quantity],
        )
        .unwrap();

        assert_eq!(df.height(), 1);
        assert_eq!(number_values(&df, "invoices").unwrap(), vec![4.0]);
        let total = number_values(&df, cols::FINAL_TOTAL).unwrap()[0];
        assert!((total - 1226.4).abs() < 1e-9);
        assert_eq!(number_values(&df, cols::QTY).unwrap(), vec![7.0]);
    }

    #[test]
    fn test_group_by_channel() {
        let df = aggregate(
            &revenue_frame(),
            &[GroupKey::Channel],
            &[Measure::Invoices, Measure::FinalTotal],
        )
        .unwrap();

        let channels = text_values(&df, cols::SALES_CHANNEL).unwrap();
        assert_eq!(
            channels,
            vec![Some("Delivery".to_string()), Some("In-Shop".to_string())]
        );
        assert_eq!(number_values(&df, "invoices").unwrap(), vec![1.0, 3.0]);
        let totals = number_values(&df, cols::FINAL_TOTAL).unwrap();
        assert!((totals[0] - 661.5).abs() < 1e-9);
    }

    #[test]
    fn test_undated_rows_form_a_null_group() {
        let df =
            aggregate(&revenue_frame(), &[GroupKey::MonthYear], &[Measure::FinalTotal]).unwrap();

        let months = text_values(&df, cols::MONTH_YEAR).unwrap();
        assert_eq!(months.len(), 2);
        assert!(months.contains(&None));
        assert!(months.contains(&Some("2025-04".to_string())));
    }
}
