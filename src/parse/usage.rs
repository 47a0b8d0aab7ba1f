//! Usage Extractor: peak capacity and today's latest usage reading.

use crate::clock::localize;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;

/// Timestamp layouts seen in the demand feeds (month/day may be unpadded)
const ROW_TIME_FORMATS: [&str; 4] = [
    "%Y/%m/%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// Why a usage scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStop {
    /// A blank or whitespace-only record
    BlankRecord,
    /// Fewer than three non-empty fields
    TooFewFields,
    /// The row is dated other than today
    DateMismatch,
    /// Zero or negative value (placeholder for a future slot)
    NonPositiveValue,
    /// Ran off the end of the records
    EndOfRecords,
}

/// Result of walking the usage table
#[derive(Debug, Clone, PartialEq)]
pub struct UsageScan {
    /// Value of the last accepted row
    pub usage_amount: Option<f64>,
    /// Timestamp of the last today row that parsed one and was not cut off
    /// by a non-positive value
    pub data_time: Option<DateTime<Tz>>,
    /// Number of rows whose value was accepted
    pub accepted_rows: usize,
    pub stop: ScanStop,
}

fn clean_field(field: &str) -> &str {
    field.trim().trim_matches('"').trim()
}

fn parse_number(field: &str) -> Option<f64> {
    clean_field(field)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Peak capacity from the record after the peak header: first field, rounded
/// half-to-even to an integer.
pub fn parse_peak_supply(record: &str) -> Option<f64> {
    let first = record.split(',').next()?;
    parse_number(first).map(f64::round_ties_even)
}

/// Combine a row's date and time fields into a local timestamp
pub fn parse_row_time(date: &str, time: &str, tz: Tz) -> Option<DateTime<Tz>> {
    let joined = format!("{} {}", clean_field(date), clean_field(time));
    ROW_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&joined, fmt).ok())
        .and_then(|naive| localize(tz, naive))
}

/// Walk the usage rows that follow `header` and pick today's latest reading.
///
/// Per row, in order:
/// - a blank record ends the scan;
/// - non-empty comma fields are kept, fewer than three ends the scan;
/// - a parsable timestamp dated other than `today` ends the scan, and the
///   row contributes nothing;
/// - a value of zero or less ends the scan, leaving both fields as they were;
/// - otherwise the value (if it parses) and the timestamp (if it parses) are
///   applied independently of each other.
pub fn scan_usage(records: &[&str], header: usize, today: NaiveDate, tz: Tz) -> UsageScan {
    let mut scan = UsageScan {
        usage_amount: None,
        data_time: None,
        accepted_rows: 0,
        stop: ScanStop::EndOfRecords,
    };

    for record in records.iter().skip(header.saturating_add(1)) {
        if record.trim().is_empty() {
            scan.stop = ScanStop::BlankRecord;
            return scan;
        }

        let fields: Vec<&str> = record
            .split(',')
            .map(clean_field)
            .filter(|f| !f.is_empty())
            .collect();
        if fields.len() < 3 {
            scan.stop = ScanStop::TooFewFields;
            return scan;
        }

        let row_time = parse_row_time(fields[0], fields[1], tz);
        if let Some(t) = row_time
            && t.date_naive() != today
        {
            scan.stop = ScanStop::DateMismatch;
            return scan;
        }

        let value = parse_number(fields[2]);
        if let Some(v) = value
            && v <= 0.0
        {
            scan.stop = ScanStop::NonPositiveValue;
            return scan;
        }

        if let Some(v) = value {
            scan.usage_amount = Some(v);
            scan.accepted_rows += 1;
        }
        if row_time.is_some() {
            scan.data_time = row_time;
        }
    }

    scan
}
