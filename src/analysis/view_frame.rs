use polars::prelude::*;

use crate::models::ViewRow;
use crate::processor::{QuantityView, RevenueView};

/// Frame column names shared by both view snapshots.
pub mod cols {
    pub const INVOICE_NO: &str = "invoice_no";
    pub const ITEM_NAME: &str = "item_name";
    pub const CANONICAL_NAME: &str = "canonical_name";
    pub const PARENT_CATEGORY: &str = "parent_category";
    pub const SUB_CATEGORY: &str = "sub_category";
    pub const OUTLET: &str = "outlet";
    pub const SALES_CHANNEL: &str = "sales_channel";
    pub const DATE: &str = "date";
    pub const YEAR: &str = "year";
    pub const MONTH: &str = "month";
    pub const MONTH_YEAR: &str = "month_year";
    pub const WEEK: &str = "week";
    pub const WEEK_OF_MONTH: &str = "week_of_month";
    pub const WEEKDAY: &str = "weekday";
    pub const HOUR: &str = "hour";
    pub const PRICE: &str = "price";
    pub const QTY: &str = "qty";
    pub const SUB_TOTAL: &str = "sub_total";
    pub const DISCOUNT: &str = "discount";
    pub const TAX: &str = "tax";
    pub const FINAL_TOTAL: &str = "final_total";
    pub const SOURCE_ITEM: &str = "source_item";
    pub const IS_COMBO_COMPONENT: &str = "is_combo_component";
}

impl RevenueView {
    /// Immutable polars snapshot for consumers that filter and aggregate.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        rows_to_dataframe(self.rows().iter())
    }
}

impl QuantityView {
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut df = rows_to_dataframe(self.view_rows())?;
        // Exploded rows keep the invoiced combo name on the transaction.
        let sources: Vec<String> = self
            .view_rows()
            .map(|row| row.transaction.item_name.clone())
            .collect();
        df.with_column(Series::new(cols::SOURCE_ITEM.into(), sources))?;
        let flags: Vec<bool> = self.rows().iter().map(|q| q.is_combo_component).collect();
        df.with_column(Series::new(cols::IS_COMBO_COMPONENT.into(), flags))?;
        Ok(df)
    }
}

fn rows_to_dataframe<'a>(rows: impl Iterator<Item = &'a ViewRow>) -> PolarsResult<DataFrame> {
    let rows: Vec<&ViewRow> = rows.collect();

    let text = |name: &str, f: &dyn Fn(&ViewRow) -> Option<String>| -> Column {
        let values: Vec<Option<String>> = rows.iter().map(|row| f(row)).collect();
        Column::new(name.into(), values)
    };
    let number = |name: &str, f: &dyn Fn(&ViewRow) -> Option<f64>| -> Column {
        let values: Vec<Option<f64>> = rows.iter().map(|row| f(row)).collect();
        Column::new(name.into(), values)
    };
    let unsigned = |name: &str, f: &dyn Fn(&ViewRow) -> Option<u32>| -> Column {
        let values: Vec<Option<u32>> = rows.iter().map(|row| f(row)).collect();
        Column::new(name.into(), values)
    };
    let years: Vec<Option<i32>> = rows
        .iter()
        .map(|row| row.transaction.calendar.year)
        .collect();

    let columns = vec![
        text(cols::INVOICE_NO, &|r| r.transaction.invoice_no.clone()),
        text(cols::ITEM_NAME, &|r| Some(r.transaction.item_name.clone())),
        text(cols::CANONICAL_NAME, &|r| Some(r.item.canonical_name.clone())),
        text(cols::PARENT_CATEGORY, &|r| Some(r.item.parent_category.clone())),
        text(cols::SUB_CATEGORY, &|r| Some(r.item.sub_category.clone())),
        text(cols::OUTLET, &|r| Some(r.transaction.outlet.clone())),
        text(cols::SALES_CHANNEL, &|r| Some(r.transaction.sales_channel.clone())),
        text(cols::DATE, &|r| {
            r.transaction.date.map(|d| d.format("%Y-%m-%d").to_string())
        }),
        Column::new(cols::YEAR.into(), years),
        unsigned(cols::MONTH, &|r| r.transaction.calendar.month),
        text(cols::MONTH_YEAR, &|r| r.transaction.calendar.month_year.clone()),
        unsigned(cols::WEEK, &|r| r.transaction.calendar.week),
        unsigned(cols::WEEK_OF_MONTH, &|r| r.transaction.calendar.week_of_month),
        text(cols::WEEKDAY, &|r| r.transaction.calendar.weekday.clone()),
        unsigned(cols::HOUR, &|r| r.transaction.calendar.hour),
        number(cols::PRICE, &|r| r.transaction.price),
        number(cols::QTY, &|r| r.transaction.qty),
        number(cols::SUB_TOTAL, &|r| r.transaction.sub_total),
        number(cols::DISCOUNT, &|r| r.transaction.discount),
        number(cols::TAX, &|r| r.transaction.tax),
        number(cols::FINAL_TOTAL, &|r| r.transaction.final_total),
    ];

    DataFrame::new(columns)
}
