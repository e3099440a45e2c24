use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::column_reader::{
    has_column, optional_text_column, parse_date, parse_number, parse_time_of_day,
    parse_timestamp, require_columns, text_column,
};
use crate::error::ReconcileError;
use crate::models::columns::{UNKNOWN, sales};
use crate::models::{CalendarFields, Transaction};

pub const DELIVERY: &str = "Delivery";
pub const IN_SHOP: &str = "In-Shop";

/// Source-specific knobs of the cleaning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningSettings {
    pub success_status: String,
    /// Explicit channel column; used instead of the area rule when present.
    pub channel_column: Option<String>,
    pub area_column: String,
    /// Area value that marks a delivery-platform order.
    pub delivery_area: String,
}

impl Default for CleaningSettings {
    fn default() -> Self {
        CleaningSettings {
            success_status: "Success".to_string(),
            channel_column: Some("Online / Offline".to_string()),
            area_column: "Area".to_string(),
            delivery_area: "Swiggy".to_string(),
        }
    }
}

/// Counters describing what cleaning discarded or could not parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningStats {
    pub raw_rows: usize,
    pub retained_rows: usize,
    pub dropped_by_status: usize,
    pub unparseable_dates: usize,
    /// Rows whose timestamp carries no readable time of day.
    pub unparseable_timestamps: usize,
    /// Rows kept under the `Unknown` item name.
    pub blank_item_names: usize,
    pub numeric_parse_failures: BTreeMap<String, usize>,
}

/// Retained, typed transactions. Never empty.
#[derive(Debug, Clone)]
pub struct CleanedTransactions {
    rows: Vec<Transaction>,
    stats: CleaningStats,
}

impl CleanedTransactions {
    pub fn rows(&self) -> &[Transaction] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn stats(&self) -> &CleaningStats {
        &self.stats
    }

    /// Null-skipping sum of final totals.
    pub fn total_final(&self) -> f64 {
        self.rows.iter().filter_map(|tx| tx.final_total).sum()
    }
}

struct NumericColumns {
    price: Vec<Option<String>>,
    qty: Vec<Option<String>>,
    sub_total: Vec<Option<String>>,
    discount: Vec<Option<String>>,
    tax: Vec<Option<String>>,
    final_total: Vec<Option<String>>,
}

pub struct TransactionCleaner {
    settings: CleaningSettings,
}

impl TransactionCleaner {
    pub fn new(settings: CleaningSettings) -> Self {
        TransactionCleaner { settings }
    }

    pub fn clean(&self, df: &DataFrame) -> Result<CleanedTransactions, ReconcileError> {
        require_columns(df, sales::TABLE, &sales::REQUIRED)?;

        let channel_column = self
            .settings
            .channel_column
            .as_deref()
            .filter(|name| has_column(df, name));

        if channel_column.is_none() && !has_column(df, &self.settings.area_column) {
            let mut columns = vec![self.settings.area_column.clone()];
            columns.extend(self.settings.channel_column.clone());
            return Err(ReconcileError::MissingColumns {
                table: sales::TABLE.to_string(),
                columns,
            });
        }

        let statuses = text_column(df, sales::STATUS)?;
        let dates = text_column(df, sales::DATE)?;
        let timestamps = text_column(df, sales::TIMESTAMP)?;
        let items = text_column(df, sales::ITEM_NAME)?;
        let invoices = text_column(df, sales::INVOICE_NO)?;
        let outlets = optional_text_column(df, sales::OUTLET)?;
        let areas = optional_text_column(df, &self.settings.area_column)?;
        let channels = match channel_column {
            Some(name) => text_column(df, name)?,
            None => vec![None; df.height()],
        };
        let numbers = NumericColumns {
            price: text_column(df, sales::PRICE)?,
            qty: text_column(df, sales::QTY)?,
            sub_total: text_column(df, sales::SUB_TOTAL)?,
            discount: text_column(df, sales::DISCOUNT)?,
            tax: text_column(df, sales::TAX)?,
            final_total: text_column(df, sales::FINAL_TOTAL)?,
        };

        let mut stats = CleaningStats {
            raw_rows: df.height(),
            ..CleaningStats::default()
        };
        let mut rows = Vec::with_capacity(df.height());

        for idx in 0..df.height() {
            if statuses[idx].as_deref() != Some(self.settings.success_status.as_str()) {
                stats.dropped_by_status += 1;
                continue;
            }

            let date = dates[idx].as_deref().and_then(parse_date);
            if date.is_none() {
                stats.unparseable_dates += 1;
            }

            let raw_timestamp = timestamps[idx].as_deref();
            let time = raw_timestamp.and_then(parse_time_of_day);
            if time.is_none() {
                stats.unparseable_timestamps += 1;
            }
            let timestamp = raw_timestamp.and_then(|raw| parse_timestamp(raw, date));

            let item_name = items[idx].clone().unwrap_or_else(|| {
                stats.blank_item_names += 1;
                UNKNOWN.to_string()
            });

            let mut number = |label: &str, column: &[Option<String>]| -> Option<f64> {
                let raw = column[idx].as_deref()?;
                let parsed = parse_number(raw);
                if parsed.is_none() {
                    *stats
                        .numeric_parse_failures
                        .entry(label.to_string())
                        .or_insert(0) += 1;
                }
                parsed
            };

            let price = number(sales::PRICE, &numbers.price);
            let qty = number(sales::QTY, &numbers.qty);
            let sub_total = number(sales::SUB_TOTAL, &numbers.sub_total);
            let discount = number(sales::DISCOUNT, &numbers.discount);
            let tax = number(sales::TAX, &numbers.tax);
            let final_total = number(sales::FINAL_TOTAL, &numbers.final_total);

            let area = areas[idx].clone();
            let sales_channel = self.sales_channel(channels[idx].as_deref(), area.as_deref());

            rows.push(Transaction {
                invoice_no: invoices[idx].clone(),
                item_name,
                outlet: outlets[idx].clone().unwrap_or_else(|| UNKNOWN.to_string()),
                area,
                sales_channel,
                date,
                timestamp,
                price,
                qty,
                sub_total,
                discount,
                tax,
                final_total,
                calendar: CalendarFields::derive(date, time),
            });
        }

        stats.retained_rows = rows.len();
        self.report(&stats);

        if rows.is_empty() {
            return Err(ReconcileError::NoUsableRows {
                reason: format!(
                    "none of {} rows has status '{}'",
                    stats.raw_rows, self.settings.success_status
                ),
            });
        }

        if rows.iter().all(|tx| tx.date.is_none()) {
            return Err(ReconcileError::NoUsableRows {
                reason: format!("none of {} retained rows has a parseable date", rows.len()),
            });
        }

        Ok(CleanedTransactions { rows, stats })
    }

    fn sales_channel(&self, explicit: Option<&str>, area: Option<&str>) -> String {
        if let Some(channel) = explicit {
            return channel.to_string();
        }

        if area == Some(self.settings.delivery_area.as_str()) {
            DELIVERY.to_string()
        } else {
            IN_SHOP.to_string()
        }
    }

    fn report(&self, stats: &CleaningStats) {
        info!(
            "Cleaned transactions: {} of {} rows retained ({} dropped by status)",
            stats.retained_rows, stats.raw_rows, stats.dropped_by_status
        );

        if stats.unparseable_dates > 0 {
            warn!("{} retained rows have an unparseable date", stats.unparseable_dates);
        }
        if stats.unparseable_timestamps > 0 {
            warn!(
                "{} retained rows have an unparseable timestamp",
                stats.unparseable_timestamps
            );
        }
        if stats.blank_item_names > 0 {
            warn!(
                "{} retained rows have a blank item name, kept as '{}'",
                stats.blank_item_names, UNKNOWN
            );
        }
        for (column, failures) in &stats.numeric_parse_failures {
            warn!("{} values in '{}' could not be parsed as numbers", failures, column);
        }
    }
}
