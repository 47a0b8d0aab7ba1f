#![no_main]
use libfuzzer_sys::fuzz_target;
use powermap::config::SourceConfig;
use powermap::parse::extract_into;
use powermap::source::{Source, SourceId, SourceState};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let source = Source::from_config(
        SourceId(0),
        &SourceConfig::new("fuzz", "http://localhost/feed.csv", 5, 35.0, 139.0),
    );
    let tz = chrono_tz::Asia::Tokyo;
    let today = chrono::NaiveDate::from_ymd_opt(2024, 7, 1).unwrap_or_default();

    // Run twice so the second pass goes through the cached header offsets
    let mut state = SourceState::new();
    let _ = extract_into(&text, &source, &mut state, today, tz);
    let _ = extract_into(&text, &source, &mut state, today, tz);

    if let Some(peak) = state.peak_supply {
        assert!(peak.fract() == 0.0);
    }
});
