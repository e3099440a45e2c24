use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::columns::UNKNOWN;

/// One retained line item of a successful sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub invoice_no: Option<String>,
    pub item_name: String,
    pub outlet: String,
    pub area: Option<String>,
    pub sales_channel: String,
    pub date: Option<NaiveDate>,
    pub timestamp: Option<NaiveDateTime>,
    pub price: Option<f64>,
    pub qty: Option<f64>,
    pub sub_total: Option<f64>,
    pub discount: Option<f64>,
    pub tax: Option<f64>,
    pub final_total: Option<f64>,
    pub calendar: CalendarFields,
}

/// Calendar features derived from a row's date, plus the hour of its
/// time of day. The hour survives an unparseable date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFields {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub month_year: Option<String>,
    pub week: Option<u32>,
    /// 1 for days 1-7, up to 5 for days 29-31.
    pub week_of_month: Option<u32>,
    pub weekday: Option<String>,
    pub hour: Option<u32>,
}

impl CalendarFields {
    pub fn derive(date: Option<NaiveDate>, time: Option<NaiveTime>) -> Self {
        let mut fields = CalendarFields {
            hour: time.map(|t| t.hour()),
            ..CalendarFields::default()
        };

        if let Some(date) = date {
            fields.year = Some(date.year());
            fields.month = Some(date.month());
            fields.month_year = Some(date.format("%Y-%m").to_string());
            fields.week = Some(date.iso_week().week());
            fields.week_of_month = Some(week_of_month(date));
            fields.weekday = Some(weekday_name(date).to_string());
        }

        fields
    }
}

pub fn week_of_month(date: NaiveDate) -> u32 {
    (date.day() - 1) / 7 + 1
}

/// Monday-first weekday names, the order reports use.
pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

pub fn weekday_name(date: NaiveDate) -> &'static str {
    WEEKDAYS[date.weekday().num_days_from_monday() as usize]
}

/// Canonical name and categories an item resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub canonical_name: String,
    pub parent_category: String,
    pub sub_category: String,
}

impl ItemInfo {
    /// Resolution for an item the reference table does not know.
    pub fn fallback(item_name: &str) -> Self {
        ItemInfo {
            canonical_name: item_name.to_string(),
            parent_category: UNKNOWN.to_string(),
            sub_category: UNKNOWN.to_string(),
        }
    }
}

/// One component row of a combo definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboComponent {
    pub canonical_name: String,
    pub category_hint: Option<String>,
    pub sub_category_hint: Option<String>,
    pub multiplicity: f64,
}

/// A transaction enriched with its resolved item info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    pub transaction: Transaction,
    pub item: ItemInfo,
}

/// Quantity view row. `is_combo_component` marks rows exploded out of a combo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityRow {
    pub row: ViewRow,
    pub is_combo_component: bool,
}

/// Non-fatal data-quality findings returned alongside a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// A combo is defined without any component rows. Its sales cannot be
    /// exploded, which means the combo reference itself is broken.
    ComboIntegrityFault { combo: String, transactions: usize },
    /// An invoiced item has no item reference entry and was given fallback values.
    ReferenceMiss { item: String, occurrences: usize },
}

impl Diagnostic {
    pub fn is_combo_integrity_fault(&self) -> bool {
        matches!(self, Diagnostic::ComboIntegrityFault { .. })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ComboIntegrityFault { combo, .. } => {
                write!(f, "combo-integrity fault: {}", combo)
            }
            Diagnostic::ReferenceMiss { item, .. } => write!(f, "reference miss: {}", item),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_fields_from_date_and_timestamp() {
        let date = NaiveDate::from_ymd_opt(2025, 4, 7).unwrap();
        let time = NaiveTime::from_hms_opt(19, 45, 0);

        let fields = CalendarFields::derive(Some(date), time);

        assert_eq!(fields.year, Some(2025));
        assert_eq!(fields.month, Some(4));
        assert_eq!(fields.month_year.as_deref(), Some("2025-04"));
        assert_eq!(fields.week, Some(15));
        assert_eq!(fields.week_of_month, Some(1));
        assert_eq!(fields.weekday.as_deref(), Some("Monday"));
        assert_eq!(fields.hour, Some(19));
    }

    #[test]
    fn test_calendar_fields_without_date() {
        let fields = CalendarFields::derive(None, None);
        assert_eq!(fields, CalendarFields::default());

        let fields = CalendarFields::derive(None, NaiveTime::from_hms_opt(20, 15, 0));
        assert_eq!(fields.hour, Some(20));
        assert_eq!(fields.month_year, None);
        assert_eq!(fields.week_of_month, None);
    }

    #[test]
    fn test_week_of_month_buckets() {
        let day = |d| NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
        assert_eq!(week_of_month(day(1)), 1);
        assert_eq!(week_of_month(day(7)), 1);
        assert_eq!(week_of_month(day(8)), 2);
        assert_eq!(week_of_month(day(21)), 3);
        assert_eq!(week_of_month(day(22)), 4);
        assert_eq!(week_of_month(day(31)), 5);
    }

    #[test]
    fn test_diagnostic_display() {
        let fault = Diagnostic::ComboIntegrityFault {
            combo: "Combo-Z".to_string(),
            transactions: 3,
        };
        assert_eq!(fault.to_string(), "combo-integrity fault: Combo-Z");
        assert!(fault.is_combo_integrity_fault());

        let miss = Diagnostic::ReferenceMiss {
            item: "Masala Tea".to_string(),
            occurrences: 1,
        };
        assert!(!miss.is_combo_integrity_fault());
    }
}
