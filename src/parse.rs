//! Parsing of the utilities' loosely structured CSV responses
//!
//! The pipeline is split across smaller files:
//! - `records`: raw text to records
//! - `headers`: locating (and caching) the two header rows
//! - `usage`: peak capacity and today's latest usage reading
//!
//! [`extract_into`] ties them together and writes the results back into a
//! source's state.

mod headers;
mod records;
mod usage;

pub use headers::{find_headers, resolve_headers};
pub use records::split_records;
pub use usage::{ScanStop, UsageScan, parse_peak_supply, parse_row_time, scan_usage};

use crate::error::{PowerMapError, Result};
use crate::source::{Source, SourceState};
use chrono::NaiveDate;
use chrono_tz::Tz;

/// What one extraction pass found
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Whether the peak row parsed this time
    pub peak_updated: bool,
    /// The usage scan result
    pub scan: UsageScan,
}

impl Extraction {
    /// Whether a fresh usage reading was accepted
    pub fn has_reading(&self) -> bool {
        self.scan.usage_amount.is_some()
    }

    /// `NoData` unless a fresh usage reading was accepted
    pub fn require_reading(self) -> Result<Self> {
        if self.has_reading() {
            Ok(self)
        } else {
            Err(PowerMapError::no_data(format!(
                "no usable row for today ({:?})",
                self.scan.stop
            )))
        }
    }
}

/// Locate headers and extract today's figures from `text` into `state`.
///
/// On a header miss this returns `MalformedResponse` and `state` is left
/// exactly as it was. Otherwise the no-data streak is bumped, then cleared
/// again if any usage row was accepted; peak and usage values that do not
/// parse leave their previous values in place. `data_time` follows the last
/// today row with a parsable timestamp, even if its value did not parse.
pub fn extract_into(
    text: &str,
    source: &Source,
    state: &mut SourceState,
    today: NaiveDate,
    tz: Tz,
) -> Result<Extraction> {
    let records = split_records(text);
    let offsets = resolve_headers(&records, state, &source.peak_header, &source.usage_header)?;

    let peak = records
        .get(offsets.peak.saturating_add(1))
        .and_then(|r| parse_peak_supply(r));
    if let Some(p) = peak {
        state.peak_supply = Some(p);
    }

    state.no_data_count = state.no_data_count.saturating_add(1);

    let scan = scan_usage(&records, offsets.usage, today, tz);
    if let Some(amount) = scan.usage_amount {
        state.usage_amount = Some(amount);
        state.no_data_count = 0;
    }
    if let Some(t) = scan.data_time {
        state.data_time = Some(t);
    }
    state.recompute_percentage();

    Ok(Extraction {
        peak_updated: peak.is_some(),
        scan,
    })
}
