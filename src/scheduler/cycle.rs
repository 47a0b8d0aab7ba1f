//! One Fetch → Parse → Update cycle and the adaptive re-poll rule.

use crate::clock::{Clock, next_local_midnight};
use crate::config::ScheduleConfig;
use crate::error::PowerMapError;
use crate::fetcher::TextFetcher;
use crate::parse::{Extraction, extract_into};
use crate::source::{Source, SourceState};
use chrono::{DateTime, TimeDelta};
use chrono_tz::Tz;
use std::fmt;

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Headers resolved and at least one usage row accepted
    Updated { accepted_rows: usize },
    /// Headers resolved but no row qualified as today's reading
    NoData,
    /// Header rows not found; state left as it was
    Malformed(String),
    /// Fetch succeeded with an empty body
    EmptyBody,
    /// Final attempt failed
    FetchFailed(String),
    /// Overall fetch deadline exceeded
    TimedOut(String),
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Updated { accepted_rows } => write!(f, "updated ({} rows)", accepted_rows),
            CycleOutcome::NoData => write!(f, "no data"),
            CycleOutcome::Malformed(msg) => write!(f, "malformed: {}", msg),
            CycleOutcome::EmptyBody => write!(f, "empty body"),
            CycleOutcome::FetchFailed(msg) => write!(f, "fetch failed: {}", msg),
            CycleOutcome::TimedOut(msg) => write!(f, "timed out: {}", msg),
        }
    }
}

/// Healthy re-poll wait: half the interval in whole minutes, at least one
fn healthy_wait_minutes(interval_minutes: u32) -> u32 {
    (interval_minutes / 2).max(1)
}

/// When to check a source next, given the counters after a cycle.
///
/// Healthy sources are re-polled after half their publication interval,
/// rounded down to whole minutes.
/// After `failure_limit` empty fetches in a row, or `no_data_limit` cycles
/// without a fresh reading, they back off to `backoff_minutes`, but never
/// past the next local midnight, when a new day's file appears.
pub fn next_check_time(
    last_check: DateTime<Tz>,
    interval_minutes: u32,
    failure_count: u32,
    no_data_count: u32,
    schedule: &ScheduleConfig,
) -> DateTime<Tz> {
    if failure_count < schedule.failure_limit && no_data_count < schedule.no_data_limit {
        let wait = TimeDelta::minutes(i64::from(healthy_wait_minutes(interval_minutes)));
        return last_check + wait;
    }

    let backoff = last_check + TimeDelta::minutes(i64::from(schedule.backoff_minutes));
    match next_local_midnight(&last_check) {
        Some(midnight) if midnight < backoff => midnight,
        _ => backoff,
    }
}

/// Run one cycle for `source`, updating `state` in place.
///
/// Never fails: every error kind is folded into the returned outcome and the
/// counters, and `next_check_time` is always recomputed.
pub async fn run_cycle(
    source: &Source,
    state: &mut SourceState,
    fetcher: &dyn TextFetcher,
    clock: &dyn Clock,
    schedule: &ScheduleConfig,
) -> CycleOutcome {
    let target_url = source.url_for(clock.today());
    let fetched = fetcher.fetch_text(&target_url, &source.encoding).await;

    let now = clock.now();
    state.last_check_time = Some(now);

    let outcome = match fetched {
        Err(PowerMapError::FetchTimeout { message }) => CycleOutcome::TimedOut(message),
        Err(e) => {
            state.failure_count = state.failure_count.saturating_add(1);
            CycleOutcome::FetchFailed(e.to_string())
        }
        Ok(body) if body.is_empty() => {
            state.failure_count = state.failure_count.saturating_add(1);
            CycleOutcome::EmptyBody
        }
        Ok(body) => {
            state.failure_count = 0;
            match extract_into(&body, source, state, now.date_naive(), clock.tz())
                .and_then(Extraction::require_reading)
            {
                Ok(extraction) => CycleOutcome::Updated {
                    accepted_rows: extraction.scan.accepted_rows,
                },
                Err(PowerMapError::NoData { .. }) => CycleOutcome::NoData,
                Err(e) => CycleOutcome::Malformed(e.to_string()),
            }
        }
    };

    state.next_check_time = Some(next_check_time(
        now,
        source.interval_minutes,
        state.failure_count,
        state.no_data_count,
        schedule,
    ));

    outcome
}
