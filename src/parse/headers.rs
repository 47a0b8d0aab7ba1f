//! Header Locator: finds the peak-capacity and usage-table header rows.

use crate::error::{PowerMapError, Result};
use crate::source::{HeaderOffsets, SourceState};

/// Search `records` for both header rows.
///
/// The peak header is the first record starting with `peak_marker`; the usage
/// header is the last record starting with `usage_marker`, since feeds repeat
/// the table header and only the final one precedes today's rows. A usage
/// header on the final record is valid: the table simply has no rows yet.
pub fn find_headers(
    records: &[&str],
    peak_marker: &str,
    usage_marker: &str,
) -> Result<HeaderOffsets> {
    let peak = records
        .iter()
        .position(|r| r.starts_with(peak_marker))
        .ok_or_else(|| {
            PowerMapError::malformed(format!("peak header '{}' not found", peak_marker))
        })?;
    let usage = records
        .iter()
        .rposition(|r| r.starts_with(usage_marker))
        .ok_or_else(|| {
            PowerMapError::malformed(format!("usage header '{}' not found", usage_marker))
        })?;

    Ok(HeaderOffsets { peak, usage })
}

/// Header offsets for this response, discovering them on first use.
///
/// Once both offsets are cached in `state` they are returned as-is for the
/// rest of the run, even if a later response has shifted rows. A failed
/// search leaves `state` untouched.
pub fn resolve_headers(
    records: &[&str],
    state: &mut SourceState,
    peak_marker: &str,
    usage_marker: &str,
) -> Result<HeaderOffsets> {
    if let Some(cached) = state.cached_headers() {
        return Ok(cached);
    }

    let found = find_headers(records, peak_marker, usage_marker)?;
    state.cache_headers(found);
    Ok(found)
}
