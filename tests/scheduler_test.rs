use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone};
use chrono_tz::Tz;
use powermap::clock::Clock;
use powermap::config::{Config, ScheduleConfig, SourceConfig};
use powermap::error::{PowerMapError, Result};
use powermap::fetcher::TextFetcher;
use powermap::scheduler::{CycleOutcome, Scheduler, SourcePoller, run_cycle};
use powermap::source::{Source, SourceId, SourceState};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::watch;

const TODAY_BODY: &str = "2024/7/1 10:05 UPDATE\r\n\
ピーク時供給力(万kW),時間帯,供給力情報更新日,供給力情報更新時刻\r\n\
12345,17:00~18:00,7/1,8:30\r\n\
\r\n\
DATE,TIME,当日実績(万kW),予測値(万kW),使用率(%),供給力(万kW)\r\n\
2024/7/1,0:00,100,3200,85,3800\r\n\
2024/7/1,0:05,150,3150,84,3800\r\n\
2024/7/1,0:10,0,3100,0,3800\r\n\
\r\n";

const YESTERDAY_BODY: &str = "ピーク時供給力(万kW),時間帯\r\n\
12000,17:00~18:00\r\n\
DATE,TIME,当日実績(万kW)\r\n\
2024/6/30,23:50,400\r\n\
2024/6/30,23:55,410\r\n\
\r\n";

fn tokyo() -> Tz {
    "Asia/Tokyo".parse().unwrap()
}

/// Wall clock that starts at a fixed local time and follows tokio's
/// (possibly paused) clock from there.
struct TestClock {
    base: DateTime<Tz>,
    started: tokio::time::Instant,
}

impl TestClock {
    fn at(hour: u32, minute: u32) -> Self {
        Self {
            base: tokyo().with_ymd_and_hms(2024, 7, 1, hour, minute, 0).unwrap(),
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Tz> {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap();
        self.base + elapsed
    }

    fn tz(&self) -> Tz {
        tokyo()
    }
}

/// Answers every fetch with the next scripted reply, repeating the last one
struct ScriptedFetcher {
    replies: Mutex<Vec<Result<String>>>,
    urls: Mutex<Vec<String>>,
    calls: AtomicU32,
}

impl ScriptedFetcher {
    fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            urls: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    fn always(body: &str) -> Self {
        Self::new(vec![Ok(body.to_string())])
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

fn replay(reply: &Result<String>) -> Result<String> {
    match reply {
        Ok(body) => Ok(body.clone()),
        Err(PowerMapError::FetchTimeout { message }) => Err(PowerMapError::fetch_timeout(message)),
        Err(e) => Err(PowerMapError::fetch_failure(e.to_string())),
    }
}

#[async_trait]
impl TextFetcher for ScriptedFetcher {
    async fn fetch_text(&self, url: &str, _encoding: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.remove(0)
        } else {
            replay(&replies[0])
        }
    }
}

/// Panics on the first fetch of `poison_url`, then serves `TODAY_BODY`
struct PanicOnceFetcher {
    poison_url: String,
    tripped: AtomicBool,
}

#[async_trait]
impl TextFetcher for PanicOnceFetcher {
    async fn fetch_text(&self, url: &str, _encoding: &str) -> Result<String> {
        if url == self.poison_url && !self.tripped.swap(true, Ordering::SeqCst) {
            panic!("fetcher bug on {}", url);
        }
        Ok(TODAY_BODY.to_string())
    }
}

fn source(name: &str, id: usize) -> Source {
    Source::from_config(
        SourceId(id),
        &SourceConfig::new(
            name,
            "http://example.com/juyo_[yyyyMMdd].csv",
            5,
            35.68,
            139.69,
        ),
    )
}

async fn cycle(
    fetcher: &ScriptedFetcher,
    clock: &TestClock,
    state: &mut SourceState,
) -> CycleOutcome {
    run_cycle(
        &source("TEPCO", 0),
        state,
        fetcher,
        clock,
        &ScheduleConfig::default(),
    )
    .await
}

#[tokio::test(start_paused = true)]
async fn empty_body_counts_as_failure_only() {
    let fetcher = ScriptedFetcher::new(vec![Ok(TODAY_BODY.to_string()), Ok(String::new())]);
    let clock = TestClock::at(10, 0);
    let mut state = SourceState::new();

    cycle(&fetcher, &clock, &mut state).await;
    let before = state.clone();

    let outcome = cycle(&fetcher, &clock, &mut state).await;
    assert_eq!(outcome, CycleOutcome::EmptyBody);
    assert_eq!(state.failure_count, before.failure_count + 1);
    assert_eq!(state.peak_supply, before.peak_supply);
    assert_eq!(state.usage_amount, before.usage_amount);
    assert_eq!(state.no_data_count, before.no_data_count);
}

#[tokio::test(start_paused = true)]
async fn todays_rows_update_peak_usage_and_percentage() {
    let fetcher = ScriptedFetcher::always(TODAY_BODY);
    let clock = TestClock::at(10, 0);
    let mut state = SourceState::new();

    let outcome = cycle(&fetcher, &clock, &mut state).await;
    assert_eq!(outcome, CycleOutcome::Updated { accepted_rows: 2 });
    assert_eq!(state.peak_supply, Some(12345.0));
    assert_eq!(state.usage_amount, Some(150.0));
    assert!((state.usage_percentage.unwrap() - 1.215).abs() < 0.001);
    assert_eq!(
        state.data_time,
        Some(tokyo().with_ymd_and_hms(2024, 7, 1, 0, 5, 0).unwrap())
    );
    assert_eq!(state.failure_count, 0);
    assert_eq!(state.no_data_count, 0);
}

#[tokio::test(start_paused = true)]
async fn yesterdays_rows_bump_no_data_and_keep_usage() {
    let fetcher = ScriptedFetcher::new(vec![
        Ok(TODAY_BODY.to_string()),
        Ok(YESTERDAY_BODY.to_string()),
    ]);
    let clock = TestClock::at(10, 0);
    let mut state = SourceState::new();

    cycle(&fetcher, &clock, &mut state).await;
    // Headers are cached from the first body; reset so the second is searched
    state.peak_header_index = None;
    state.usage_header_index = None;

    let outcome = cycle(&fetcher, &clock, &mut state).await;
    assert_eq!(outcome, CycleOutcome::NoData);
    assert_eq!(state.no_data_count, 1);
    assert_eq!(state.usage_amount, Some(150.0));
    assert_eq!(state.peak_supply, Some(12000.0));
}

#[tokio::test(start_paused = true)]
async fn url_carries_todays_date() {
    let fetcher = ScriptedFetcher::always(TODAY_BODY);
    let clock = TestClock::at(10, 0);
    let mut state = SourceState::new();
    cycle(&fetcher, &clock, &mut state).await;
    assert_eq!(
        fetcher.urls.lock().unwrap().as_slice(),
        ["http://example.com/juyo_20240701.csv"]
    );
}

#[tokio::test(start_paused = true)]
async fn timeout_leaves_counters_alone() {
    let fetcher = ScriptedFetcher::new(vec![Err(PowerMapError::fetch_timeout("20s"))]);
    let clock = TestClock::at(10, 0);
    let mut state = SourceState::new();

    let outcome = cycle(&fetcher, &clock, &mut state).await;
    assert!(matches!(outcome, CycleOutcome::TimedOut(_)));
    assert_eq!(state.failure_count, 0);
    assert_eq!(state.no_data_count, 0);
    assert_eq!(state.last_check_time, Some(clock.now()));
    assert_eq!(
        state.next_check_time,
        Some(clock.now() + TimeDelta::minutes(2))
    );
}

#[tokio::test(start_paused = true)]
async fn failure_streak_switches_to_backoff_and_success_resets_it() {
    let fetcher = ScriptedFetcher::new(vec![
        Err(PowerMapError::network("503")),
        Err(PowerMapError::network("503")),
        Err(PowerMapError::network("503")),
        Ok(TODAY_BODY.to_string()),
    ]);
    let clock = TestClock::at(10, 0);
    let mut state = SourceState::new();

    for expected in 1..=2 {
        let outcome = cycle(&fetcher, &clock, &mut state).await;
        assert!(matches!(outcome, CycleOutcome::FetchFailed(_)));
        assert_eq!(state.failure_count, expected);
        assert_eq!(
            state.next_check_time,
            Some(clock.now() + TimeDelta::minutes(2))
        );
    }

    cycle(&fetcher, &clock, &mut state).await;
    assert_eq!(state.failure_count, 3);
    assert_eq!(
        state.next_check_time,
        Some(clock.now() + TimeDelta::minutes(60))
    );

    cycle(&fetcher, &clock, &mut state).await;
    assert_eq!(state.failure_count, 0);
    assert_eq!(
        state.next_check_time,
        Some(clock.now() + TimeDelta::minutes(2))
    );
}

#[tokio::test(start_paused = true)]
async fn late_evening_backoff_stops_at_midnight() {
    let fetcher = ScriptedFetcher::always("");
    let clock = TestClock::at(23, 30);
    let mut state = SourceState::new();
    state.failure_count = 5;

    cycle(&fetcher, &clock, &mut state).await;
    assert_eq!(
        state.next_check_time,
        Some(tokyo().with_ymd_and_hms(2024, 7, 2, 0, 0, 0).unwrap())
    );
}

#[tokio::test(start_paused = true)]
async fn malformed_response_only_moves_the_schedule() {
    let fetcher = ScriptedFetcher::always("<html>maintenance</html>\r\n");
    let clock = TestClock::at(10, 0);
    let mut state = SourceState::new();
    state.failure_count = 2;
    state.no_data_count = 7;

    let outcome = cycle(&fetcher, &clock, &mut state).await;
    assert!(matches!(outcome, CycleOutcome::Malformed(_)));
    // A successful fetch still clears the failure streak
    assert_eq!(state.failure_count, 0);
    assert_eq!(state.no_data_count, 7);
    assert_eq!(state.peak_header_index, None);
    assert!(state.next_check_time.is_some());
}

#[tokio::test(start_paused = true)]
async fn cached_header_offsets_are_reused() {
    let moved = TODAY_BODY
        .replace("ピーク時供給力", "PEAK-RENAMED")
        .replace("DATE,TIME,", "WHEN,AT,");
    let fetcher = ScriptedFetcher::new(vec![Ok(TODAY_BODY.to_string()), Ok(moved)]);
    let clock = TestClock::at(10, 0);
    let mut state = SourceState::new();

    cycle(&fetcher, &clock, &mut state).await;
    let offsets = (state.peak_header_index, state.usage_header_index);
    assert_eq!(offsets, (Some(1), Some(4)));

    let outcome = cycle(&fetcher, &clock, &mut state).await;
    assert_eq!(outcome, CycleOutcome::Updated { accepted_rows: 2 });
    assert_eq!((state.peak_header_index, state.usage_header_index), offsets);
}

#[tokio::test(start_paused = true)]
async fn poller_loop_polls_at_half_interval_until_shutdown() {
    let fetcher = Arc::new(ScriptedFetcher::always(TODAY_BODY));
    let clock = Arc::new(TestClock::at(10, 0));
    let (poller, handle) = SourcePoller::new(
        Arc::new(source("TEPCO", 0)),
        fetcher.clone(),
        clock,
        ScheduleConfig::default(),
    );
    assert!(handle.latest().usage_amount.is_none());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(poller.run(shutdown_rx));

    // Cycles at 0s, 120s and 240s
    tokio::time::sleep(Duration::from_secs(301)).await;
    shutdown_tx.send_replace(true);
    let state = task.await.unwrap();

    assert_eq!(fetcher.calls(), 3);
    assert_eq!(state.usage_amount, Some(150.0));
    let snapshot = handle.latest();
    assert_eq!(snapshot.usage_amount, Some(150.0));
    assert_eq!(snapshot.name, "TEPCO");
}

#[tokio::test(start_paused = true)]
async fn refresh_all_reports_every_source_in_order() {
    let mut config = Config::default();
    config.sources = vec![
        SourceConfig::new("Hokkaido", "http://example.com/a.csv", 5, 43.06, 141.35),
        SourceConfig::new("Tohoku", "http://example.com/b.csv", 5, 38.27, 140.87),
        SourceConfig::new("TEPCO", "http://example.com/c.csv", 5, 35.68, 139.69),
    ];
    let fetcher = Arc::new(ScriptedFetcher::always(TODAY_BODY));
    let clock = Arc::new(TestClock::at(10, 0));
    let mut scheduler = Scheduler::new(&config, fetcher.clone(), clock);

    let outcomes = scheduler.refresh_all().await;
    let ids: Vec<SourceId> = outcomes.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![SourceId(0), SourceId(1), SourceId(2)]);
    assert!(
        outcomes
            .iter()
            .all(|(_, o)| *o == CycleOutcome::Updated { accepted_rows: 2 })
    );
    assert_eq!(fetcher.calls(), 3);

    for handle in scheduler.handles() {
        let snap = handle.latest();
        assert_eq!(snap.name, handle.source.name);
        assert_eq!(snap.peak_supply, Some(12345.0));
    }
    assert_eq!(scheduler.states().count(), 3);
}

#[tokio::test(start_paused = true)]
async fn panicked_refresh_rebuilds_the_poller() {
    let mut config = Config::default();
    config.sources = vec![
        SourceConfig::new("Chubu", "http://example.com/chubu.csv", 5, 35.18, 136.91),
        SourceConfig::new("Kansai", "http://example.com/kansai.csv", 5, 34.69, 135.50),
    ];
    let fetcher = Arc::new(PanicOnceFetcher {
        poison_url: "http://example.com/kansai.csv".to_string(),
        tripped: AtomicBool::new(false),
    });
    let clock = Arc::new(TestClock::at(10, 0));
    let mut scheduler = Scheduler::new(&config, fetcher, clock);
    let kansai = scheduler.handles()[1].clone();

    let outcomes = scheduler.refresh_all().await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].0, SourceId(0));
    assert_eq!(scheduler.states().count(), 2);
    assert!(kansai.latest().usage_amount.is_none());

    // The rebuilt poller publishes on the channel the old handle watches
    let outcomes = scheduler.refresh_all().await;
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[1], (SourceId(1), CycleOutcome::Updated { accepted_rows: 2 }));
    assert_eq!(kansai.latest().usage_amount, Some(150.0));
}
