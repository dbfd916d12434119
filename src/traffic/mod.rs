/// Traffic Estimator
///
/// Samples the online-user count on a fixed interval, converts it into an
/// estimated byte volume and accumulates it into hourly ledger buckets. The
/// bucket write is a single upsert with an atomic increment, so several
/// estimators can feed the same hour without losing updates.
use crate::{
    error::ConsoleResult,
    metrics,
    models::{collections, TrafficBucket},
    store::{timestamp_value, Direction, DocPath, DocumentStore, Patch, Query},
};
use chrono::{DateTime, Duration, DurationRound, Months, NaiveDate, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Estimated bytes per online user per interval (100 KiB)
pub const DEFAULT_BYTES_PER_USER: u64 = 100 * 1024;

/// Hourly buckets returned as history (7 days)
pub const HISTORY_BUCKETS: usize = 24 * 7;

const BYTE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Estimator tunables
#[derive(Debug, Clone)]
pub struct TrafficOptions {
    pub bytes_per_user: u64,
    /// Age after which in-memory history points are dropped
    pub history_window: Duration,
}

impl Default for TrafficOptions {
    fn default() -> Self {
        Self {
            bytes_per_user: DEFAULT_BYTES_PER_USER,
            history_window: Duration::days(7),
        }
    }
}

/// Where the figures of a summary come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    /// Read from the traffic ledger
    Store,
    /// Synthesized because the ledger was unreachable
    Placeholder,
}

/// One point of the traffic chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryPoint {
    pub time: DateTime<Utc>,
    pub bytes: u64,
}

/// Traffic totals and chart history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficSummary {
    pub today: u64,
    pub week: u64,
    pub month: u64,
    pub history: Vec<HistoryPoint>,
    pub provenance: Provenance,
}

impl TrafficSummary {
    fn empty() -> Self {
        Self {
            today: 0,
            week: 0,
            month: 0,
            history: Vec::new(),
            provenance: Provenance::Store,
        }
    }
}

struct EstimatorState {
    summary: TrafficSummary,
    /// UTC day `summary.today` refers to
    day: Option<NaiveDate>,
}

/// Traffic estimator
pub struct TrafficEstimator {
    store: Arc<dyn DocumentStore>,
    options: TrafficOptions,
    state: Mutex<EstimatorState>,
}

impl TrafficEstimator {
    pub fn new(store: Arc<dyn DocumentStore>, options: TrafficOptions) -> Self {
        Self {
            store,
            options,
            state: Mutex::new(EstimatorState {
                summary: TrafficSummary::empty(),
                day: None,
            }),
        }
    }

    /// Estimated bytes for one interval with `online_users` connected
    pub fn estimate(&self, online_users: usize) -> u64 {
        (online_users as u64).saturating_mul(self.options.bytes_per_user)
    }

    /// Record one sampling interval
    ///
    /// The in-memory figures are updated even when the ledger write fails;
    /// the write error is still returned. Returns the estimated bytes.
    pub async fn record_tick(&self, online_users: usize, now: DateTime<Utc>) -> ConsoleResult<u64> {
        let bytes = self.estimate(online_users);
        let hour = hour_start(now);

        let written = self
            .store
            .upsert(
                &DocPath::doc(collections::TRAFFIC, &bucket_id(now)),
                Patch::new()
                    .set_timestamp("date", hour)
                    .increment("bytes", i64::try_from(bytes).unwrap_or(i64::MAX))
                    .server_timestamp("updatedAt"),
            )
            .await;

        self.accumulate(bytes, now);
        metrics::record_traffic_bytes(bytes);

        match written {
            Ok(()) => {
                debug!("Recorded {} bytes for {} online users", bytes, online_users);
                Ok(bytes)
            }
            Err(e) => {
                warn!("Failed to write traffic bucket: {}", e);
                Err(e)
            }
        }
    }

    /// Refresh totals and history from the ledger
    ///
    /// Falls back to placeholder figures when the ledger cannot be read.
    pub async fn load(&self, now: DateTime<Utc>) -> TrafficSummary {
        let summary = match self.load_from_store(now).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Traffic ledger unavailable, using placeholder data: {}", e);
                placeholder(now)
            }
        };

        let mut state = self.state.lock();
        state.summary = summary.clone();
        state.day = Some(now.date_naive());
        summary
    }

    /// Current totals without touching the store
    pub fn summary(&self) -> TrafficSummary {
        self.state.lock().summary.clone()
    }

    async fn load_from_store(&self, now: DateTime<Utc>) -> ConsoleResult<TrafficSummary> {
        let midnight = day_start(now);
        let week_ago = now - Duration::days(7);
        let month_ago = now.checked_sub_months(Months::new(1)).unwrap_or(week_ago);

        let today = self.sum_since(midnight).await?;
        let week = self.sum_since(week_ago).await?;
        let month = self.sum_since(month_ago).await?;

        let recent = self
            .store
            .query(
                &Query::collection(collections::TRAFFIC)
                    .order_by("date", Direction::Desc)
                    .limit(HISTORY_BUCKETS),
            )
            .await?;
        let mut history = recent
            .iter()
            .map(TrafficBucket::from_document)
            .collect::<ConsoleResult<Vec<_>>>()?
            .into_iter()
            .filter_map(|bucket| {
                bucket.date.map(|time| HistoryPoint {
                    time,
                    bytes: bucket.bytes,
                })
            })
            .collect::<Vec<_>>();
        history.reverse();

        Ok(TrafficSummary {
            today,
            week,
            month,
            history,
            provenance: Provenance::Store,
        })
    }

    async fn sum_since(&self, since: DateTime<Utc>) -> ConsoleResult<u64> {
        let docs = self
            .store
            .query(
                &Query::collection(collections::TRAFFIC)
                    .where_gte("date", timestamp_value(since)),
            )
            .await?;

        Ok(docs
            .iter()
            .filter_map(|doc| doc.get("bytes").and_then(serde_json::Value::as_u64))
            .sum())
    }

    fn accumulate(&self, bytes: u64, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        let today = now.date_naive();

        // Measured bytes never mix with synthesized figures
        if state.summary.provenance == Provenance::Placeholder {
            state.summary = TrafficSummary::empty();
            state.day = Some(today);
        }

        if state.day != Some(today) {
            if state.day.is_some() {
                state.summary.today = 0;
            }
            state.day = Some(today);
        }

        let summary = &mut state.summary;
        summary.today += bytes;
        summary.week += bytes;
        summary.month += bytes;
        summary.history.push(HistoryPoint { time: now, bytes });

        let cutoff = now - self.options.history_window;
        summary.history.retain(|point| point.time > cutoff);
    }
}

/// Ledger document id of the hour containing `at` (`YYYYMMDDHH`)
pub fn bucket_id(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H").to_string()
}

/// `at` truncated to the start of its hour
pub fn hour_start(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::hours(1)).unwrap_or(at)
}

/// UTC midnight of the day containing `at`
pub fn day_start(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::days(1)).unwrap_or(at)
}

/// Human-readable size, base 1024, at most two decimals
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, BYTE_UNITS[unit])
}

/// Random but plausible figures for an unreachable ledger
fn placeholder(now: DateTime<Utc>) -> TrafficSummary {
    let mut rng = rand::thread_rng();
    let mut history: Vec<HistoryPoint> = (0..24)
        .map(|i| HistoryPoint {
            time: now - Duration::hours(i),
            bytes: rng.gen_range(10..60),
        })
        .collect();
    history.reverse();

    TrafficSummary {
        today: rng.gen_range(100..600),
        week: rng.gen_range(500..3500),
        month: rng.gen_range(2000..12000),
        history,
        provenance: Provenance::Placeholder,
    }
}
