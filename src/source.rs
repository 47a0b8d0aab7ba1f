//! Upstream sources and their per-source mutable state
//!
//! A [`Source`] is built once from configuration and shared read-only. Each
//! source has exactly one [`SourceState`], owned by that source's polling
//! loop; consumers only ever see [`SourceSnapshot`] copies of it.

use crate::clock::date_stamp;
use crate::config::{Config, DATE_PLACEHOLDER, SourceConfig};
use chrono::{DateTime, FixedOffset, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Position of a source in the configured list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub usize);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immutable description of one upstream demand feed
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub url_template: String,
    pub interval_minutes: u32,
    pub encoding: String,
    pub latitude: f64,
    pub longitude: f64,
    pub peak_header: String,
    pub usage_header: String,
}

impl Source {
    pub fn from_config(id: SourceId, cfg: &SourceConfig) -> Self {
        Self {
            id,
            name: cfg.name.clone(),
            url_template: cfg.url.clone(),
            interval_minutes: cfg.interval_minutes,
            encoding: cfg.encoding.trim().to_string(),
            latitude: cfg.latitude,
            longitude: cfg.longitude,
            peak_header: cfg.peak_header.clone(),
            usage_header: cfg.usage_header.clone(),
        }
    }

    /// Build the shared source list, in configuration order
    pub fn all_from_config(config: &Config) -> Vec<Arc<Source>> {
        config
            .sources
            .iter()
            .enumerate()
            .map(|(idx, cfg)| Arc::new(Source::from_config(SourceId(idx), cfg)))
            .collect()
    }

    /// URL to fetch on the given local date
    pub fn url_for(&self, date: NaiveDate) -> String {
        self.url_template.replace(DATE_PLACEHOLDER, &date_stamp(date))
    }
}

/// Cached record offsets of the two header rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderOffsets {
    pub peak: usize,
    pub usage: usize,
}

/// Mutable per-source record, owned by the source's polling loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceState {
    /// Record index of the peak-capacity header; `None` until discovered
    pub peak_header_index: Option<usize>,
    /// Record index of the last usage-table header; `None` until discovered
    pub usage_header_index: Option<usize>,
    pub failure_count: u32,
    pub no_data_count: u32,
    pub last_check_time: Option<DateTime<Tz>>,
    pub next_check_time: Option<DateTime<Tz>>,
    pub peak_supply: Option<f64>,
    pub usage_amount: Option<f64>,
    pub usage_percentage: Option<f64>,
    pub data_time: Option<DateTime<Tz>>,
}

impl SourceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both header offsets, if both are known
    pub fn cached_headers(&self) -> Option<HeaderOffsets> {
        match (self.peak_header_index, self.usage_header_index) {
            (Some(peak), Some(usage)) => Some(HeaderOffsets { peak, usage }),
            _ => None,
        }
    }

    pub fn cache_headers(&mut self, offsets: HeaderOffsets) {
        self.peak_header_index = Some(offsets.peak);
        self.usage_header_index = Some(offsets.usage);
    }

    /// Recompute the usage percentage; left untouched unless peak > 0
    pub fn recompute_percentage(&mut self) {
        if let (Some(usage), Some(peak)) = (self.usage_amount, self.peak_supply)
            && peak > 0.0
        {
            self.usage_percentage = Some(usage / peak * 100.0);
        }
    }

    pub fn snapshot(&self, source: &Source) -> SourceSnapshot {
        SourceSnapshot {
            id: source.id,
            name: source.name.clone(),
            peak_supply: self.peak_supply,
            usage_amount: self.usage_amount,
            usage_percentage: self.usage_percentage,
            data_time: self.data_time.map(|t| t.fixed_offset()),
            last_check_time: self.last_check_time.map(|t| t.fixed_offset()),
            next_check_time: self.next_check_time.map(|t| t.fixed_offset()),
            failure_count: self.failure_count,
            no_data_count: self.no_data_count,
        }
    }
}

/// Read-only copy of a source's latest values, published after every cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub id: SourceId,
    pub name: String,
    pub peak_supply: Option<f64>,
    pub usage_amount: Option<f64>,
    pub usage_percentage: Option<f64>,
    pub data_time: Option<DateTime<FixedOffset>>,
    pub last_check_time: Option<DateTime<FixedOffset>>,
    pub next_check_time: Option<DateTime<FixedOffset>>,
    pub failure_count: u32,
    pub no_data_count: u32,
}

impl SourceSnapshot {
    /// Snapshot of a source that has not completed a cycle yet
    pub fn initial(source: &Source) -> Self {
        SourceState::new().snapshot(source)
    }
}
