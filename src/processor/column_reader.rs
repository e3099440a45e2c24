use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use std::str::FromStr;

use crate::error::ReconcileError;

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y", "%m/%d/%Y"];

const DATETIME_FORMATS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
];

const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

pub fn require_columns(
    df: &DataFrame,
    table: &str,
    names: &[&str],
) -> Result<(), ReconcileError> {
    let missing: Vec<String> = names
        .iter()
        .filter(|name| !has_column(df, name))
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ReconcileError::MissingColumns {
            table: table.to_string(),
            columns: missing,
        })
    }
}

/// Reads any column as trimmed text. Blank cells come back as `None`.
pub fn text_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, ReconcileError> {
    let column = df.column(name)?.cast(&DataType::String)?;
    let values = column
        .str()?
        .into_iter()
        .map(|value| {
            value
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .collect();

    Ok(values)
}

/// Like [`text_column`], but an absent column reads as all `None`.
pub fn optional_text_column(
    df: &DataFrame,
    name: &str,
) -> Result<Vec<Option<String>>, ReconcileError> {
    if has_column(df, name) {
        text_column(df, name)
    } else {
        Ok(vec![None; df.height()])
    }
}

pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw
        .replace("₹", "")
        .replace("$", "")
        .replace(",", "");
    let trimmed = cleaned.trim();

    if trimmed.is_empty() {
        return None;
    }

    f64::from_str(trimmed).ok().filter(|v| v.is_finite())
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| parse_datetime(raw).map(|dt| dt.date()))
}

pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local()))
}

/// Time of day from either a full datetime or a bare `HH:MM[:SS]` value.
pub fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    parse_datetime(raw).map(|dt| dt.time()).or_else(|| {
        TIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(raw.trim(), fmt).ok())
    })
}

/// Timestamps may carry a full datetime or only a time of day. A bare time
/// is anchored on the row's date and yields nothing when the date is unknown.
pub fn parse_timestamp(raw: &str, date: Option<NaiveDate>) -> Option<NaiveDateTime> {
    parse_datetime(raw).or_else(|| Some(date?.and_time(parse_time_of_day(raw)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_number_formats() {
        assert_eq!(parse_number("1,250.50"), Some(1250.5));
        assert_eq!(parse_number(" ₹ 99 "), Some(99.0));
        assert_eq!(parse_number("$19.99"), Some(19.99));
        assert_eq!(parse_number("-12"), Some(-12.0));
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 4, 21);
        assert_eq!(parse_date("2025-04-21"), expected);
        assert_eq!(parse_date("2025/04/21"), expected);
        assert_eq!(parse_date("21-04-2025"), expected);
        assert_eq!(parse_date("21/04/2025"), expected);
        assert_eq!(parse_date("2025-04-21 00:00:00"), expected);
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_parse_timestamp_time_only_uses_row_date() {
        let date = NaiveDate::from_ymd_opt(2025, 4, 21);
        let ts = parse_timestamp("13:05:00", date).unwrap();
        assert_eq!(ts.date(), date.unwrap());
        assert_eq!(ts.hour(), 13);

        let full = parse_timestamp("2025-04-21 08:15:00", None).unwrap();
        assert_eq!(full.hour(), 8);

        assert!(parse_timestamp("later", date).is_none());
    }

    #[test]
    fn test_time_only_without_date_has_no_timestamp() {
        assert_eq!(parse_timestamp("20:15:00", None), None);
        assert_eq!(parse_time_of_day("20:15:00"), NaiveTime::from_hms_opt(20, 15, 0));
        assert_eq!(parse_time_of_day("2025-04-21 08:15"), NaiveTime::from_hms_opt(8, 15, 0));
        assert_eq!(parse_time_of_day("later"), None);
    }

    #[test]
    fn test_text_column_blank_and_missing() {
        let df = df! {
            "Outlet" => &[Some(" Main "), Some("  "), None],
        }
        .unwrap();

        let values = text_column(&df, "Outlet").unwrap();
        assert_eq!(values, vec![Some("Main".to_string()), None, None]);

        let absent = optional_text_column(&df, "Area").unwrap();
        assert_eq!(absent, vec![None, None, None]);

        let err = require_columns(&df, "transactions", &["Outlet", "Status"]).unwrap_err();
        assert!(err.to_string().contains("Status"));
    }

    #[test]
    fn test_text_column_casts_numbers() {
        let df = df! {
            "Invoice No." => &[101i64, 102],
        }
        .unwrap();

        let values = text_column(&df, "Invoice No.").unwrap();
        assert_eq!(values, vec![Some("101".to_string()), Some("102".to_string())]);
    }
}
