//! Record Splitter: raw response text to an ordered list of lines.

/// Split a decoded response body into records.
///
/// Both `\n` and `\r\n` terminate a record; a final terminator does not
/// produce a trailing empty record. A leading byte-order mark is dropped.
pub fn split_records(text: &str) -> Vec<&str> {
    text.strip_prefix('\u{feff}').unwrap_or(text).lines().collect()
}
