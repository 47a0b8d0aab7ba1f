//! Per-source polling loops
//!
//! Each source gets one [`SourcePoller`] that owns its [`SourceState`] and
//! runs Fetch → Parse → Update cycles on its own adaptive schedule. After
//! every cycle a fresh [`SourceSnapshot`] is published on a watch channel, so
//! readers never observe a half-updated state. Sources are independent: a
//! slow or failing source never delays another.

mod cycle;

pub use cycle::{CycleOutcome, next_check_time, run_cycle};

use crate::clock::Clock;
use crate::config::{Config, ScheduleConfig};
use crate::fetcher::TextFetcher;
use crate::logging::{LogContext, StructuredLogger, get_logger, get_logger_with_context};
use crate::source::{Source, SourceId, SourceSnapshot, SourceState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::sleep;

/// Read side of one source: its description and latest snapshot
#[derive(Debug, Clone)]
pub struct SourceHandle {
    pub source: Arc<Source>,
    pub snapshot: watch::Receiver<Arc<SourceSnapshot>>,
}

impl SourceHandle {
    /// Latest published snapshot
    pub fn latest(&self) -> Arc<SourceSnapshot> {
        self.snapshot.borrow().clone()
    }
}

/// Owns one source's state and drives its cycles
pub struct SourcePoller {
    source: Arc<Source>,
    state: SourceState,
    fetcher: Arc<dyn TextFetcher>,
    clock: Arc<dyn Clock>,
    schedule: ScheduleConfig,
    snapshot_tx: Arc<SnapshotPublisher>,
    logger: StructuredLogger,
}

type SnapshotPublisher = watch::Sender<Arc<SourceSnapshot>>;

impl SourcePoller {
    pub fn new(
        source: Arc<Source>,
        fetcher: Arc<dyn TextFetcher>,
        clock: Arc<dyn Clock>,
        schedule: ScheduleConfig,
    ) -> (Self, SourceHandle) {
        let (snapshot_tx, snapshot_rx) =
            watch::channel(Arc::new(SourceSnapshot::initial(&source)));
        let handle = SourceHandle {
            source: Arc::clone(&source),
            snapshot: snapshot_rx,
        };
        let poller = Self::with_publisher(source, fetcher, clock, schedule, Arc::new(snapshot_tx));
        (poller, handle)
    }

    /// Fresh-state poller that publishes on an existing channel
    fn with_publisher(
        source: Arc<Source>,
        fetcher: Arc<dyn TextFetcher>,
        clock: Arc<dyn Clock>,
        schedule: ScheduleConfig,
        snapshot_tx: Arc<SnapshotPublisher>,
    ) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("scheduler")
                .with_source(&source.name)
                .with_field("interval", source.interval_minutes.to_string()),
        );
        Self {
            source,
            state: SourceState::new(),
            fetcher,
            clock,
            schedule,
            snapshot_tx,
            logger,
        }
    }

    pub fn id(&self) -> SourceId {
        self.source.id
    }

    pub fn state(&self) -> &SourceState {
        &self.state
    }

    /// Run one cycle now and publish the result
    pub async fn poll_once(&mut self) -> CycleOutcome {
        let outcome = run_cycle(
            &self.source,
            &mut self.state,
            self.fetcher.as_ref(),
            self.clock.as_ref(),
            &self.schedule,
        )
        .await;

        self.log_outcome(&outcome);
        self.snapshot_tx
            .send_replace(Arc::new(self.state.snapshot(&self.source)));
        outcome
    }

    /// Time left until the next scheduled check; zero if it is due
    pub fn time_until_next_check(&self) -> Duration {
        match self.state.next_check_time {
            Some(next) => (next - self.clock.now()).to_std().unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        }
    }

    /// Poll until `shutdown` flips to `true` or its sender goes away.
    ///
    /// An in-flight cycle is allowed to finish; it is bounded by the fetch
    /// deadline. Returns the final state.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SourceState {
        while !*shutdown.borrow() {
            let wait = self.time_until_next_check();
            tokio::select! {
                _ = sleep(wait) => {
                    self.poll_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        self.logger.debug("Polling loop stopped");
        self.state
    }

    fn log_outcome(&self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Updated { .. } | CycleOutcome::NoData => {}
            CycleOutcome::Malformed(msg) => {
                self.logger.warn(&format!("Malformed response: {}", msg));
            }
            CycleOutcome::EmptyBody => {
                self.logger.warn(&format!(
                    "Empty response (failure {})",
                    self.state.failure_count
                ));
            }
            CycleOutcome::FetchFailed(msg) => {
                self.logger.warn(&format!(
                    "Fetch failed (failure {}): {}",
                    self.state.failure_count, msg
                ));
            }
            CycleOutcome::TimedOut(msg) => {
                self.logger.warn(&format!("Fetch timed out: {}", msg));
            }
        }

        self.logger.debug(&summary_line(&self.source, &self.state));
        if let Some(next) = self.state.next_check_time {
            self.logger.debug(&format!(
                "{} (no-data {}), next check at {}",
                outcome,
                self.state.no_data_count,
                next.format("%Y-%m-%d %H:%M:%S")
            ));
        }
    }
}

fn fmt_value(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "-".to_string(),
    }
}

/// One-line human summary of a source's current figures
pub fn summary_line(source: &Source, state: &SourceState) -> String {
    format!(
        "{}: peak={} usage={} pct={}",
        source.name,
        fmt_value(state.peak_supply, 0),
        fmt_value(state.usage_amount, 0),
        fmt_value(state.usage_percentage, 1)
    )
}

/// Owns every source poller and hands out their read handles
pub struct Scheduler {
    pollers: Vec<SourcePoller>,
    handles: Vec<SourceHandle>,
    /// One per source, in id order; outlives the pollers that publish on it
    publishers: Vec<Arc<SnapshotPublisher>>,
    fetcher: Arc<dyn TextFetcher>,
    clock: Arc<dyn Clock>,
    schedule: ScheduleConfig,
    logger: StructuredLogger,
}

impl Scheduler {
    /// One poller per configured source, in configuration order
    pub fn new(config: &Config, fetcher: Arc<dyn TextFetcher>, clock: Arc<dyn Clock>) -> Self {
        let (pollers, handles): (Vec<SourcePoller>, Vec<SourceHandle>) =
            Source::all_from_config(config)
                .into_iter()
                .map(|source| {
                    SourcePoller::new(
                        source,
                        Arc::clone(&fetcher),
                        Arc::clone(&clock),
                        config.schedule.clone(),
                    )
                })
                .unzip();
        let publishers = pollers.iter().map(|p| Arc::clone(&p.snapshot_tx)).collect();
        Self {
            pollers,
            handles,
            publishers,
            fetcher,
            clock,
            schedule: config.schedule.clone(),
            logger: get_logger("scheduler"),
        }
    }

    pub fn handles(&self) -> &[SourceHandle] {
        &self.handles
    }

    pub fn states(&self) -> impl Iterator<Item = (SourceId, &SourceState)> {
        self.pollers.iter().map(|p| (p.id(), p.state()))
    }

    /// Run one cycle for every source concurrently and wait for all of them.
    ///
    /// A source whose cycle panicked reports no outcome; its poller is
    /// rebuilt with fresh state on the same snapshot channel.
    pub async fn refresh_all(&mut self) -> Vec<(SourceId, CycleOutcome)> {
        let mut set = JoinSet::new();
        for mut poller in std::mem::take(&mut self.pollers) {
            set.spawn(async move {
                let outcome = poller.poll_once().await;
                (poller, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((poller, outcome)) => {
                    outcomes.push((poller.id(), outcome));
                    self.pollers.push(poller);
                }
                Err(e) => self.logger.error(&format!("Refresh task failed: {}", e)),
            }
        }

        for (handle, publisher) in self.handles.iter().zip(&self.publishers) {
            let source = &handle.source;
            if self.pollers.iter().any(|p| p.id() == source.id) {
                continue;
            }
            self.logger.error(&format!(
                "Refresh of {} did not complete; restarting its poller",
                source.name
            ));
            self.pollers.push(SourcePoller::with_publisher(
                Arc::clone(source),
                Arc::clone(&self.fetcher),
                Arc::clone(&self.clock),
                self.schedule.clone(),
                Arc::clone(publisher),
            ));
        }

        self.pollers.sort_by_key(|p| p.id());
        outcomes.sort_by_key(|(id, _)| *id);
        outcomes
    }

    /// Spawn every poller's loop; each stops when `shutdown` flips to `true`
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinSet<SourceState> {
        self.logger.info(&format!(
            "Starting {} source polling loops",
            self.pollers.len()
        ));
        let mut set = JoinSet::new();
        for poller in self.pollers {
            set.spawn(poller.run(shutdown.clone()));
        }
        set
    }
}
