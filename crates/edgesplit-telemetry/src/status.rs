//! Composite status line: timestamp, external system metrics, bandwidth
//! estimate, and the time taken to assemble it.
//!
//! Wire format (comma separated, no spaces, no trailing delimiter):
//!
//! ```text
//! <timestamp_us>,<metric_1>,...,<metric_n>,<bandwidth>,<latency_us>
//! ```
//!
//! Both segments are only read here. A segment that cannot be read or decoded
//! yields the last good value instead of failing the request.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, warn};

use edgesplit_types::config::SegmentConfig;

use crate::error::{Result, TelemetryError};
use crate::segment::{decode_fixed_width, SharedSegment};

/// Field count the external producer emits in its short form.
pub const SHORT_METRICS_FIELDS: usize = 7;

/// Field count downstream parsers expect.
pub const NORMALIZED_METRICS_FIELDS: usize = 17;

const ZERO_FIELD: &str = "0";

// ── Metrics record ────────────────────────────────────────────────────────────

/// Decode the external metrics segment into its delimited text record.
///
/// Reads ASCII up to the first newline or NUL and strips `*` markers.
/// Returns `None` for non-ASCII or empty content.
pub fn decode_metrics_record(bytes: &[u8]) -> Option<String> {
    let end = bytes
        .iter()
        .position(|&b| b == b'\n' || b == 0)
        .unwrap_or(bytes.len());
    let line = &bytes[..end];
    if !line.is_ascii() {
        return None;
    }
    let record: String = line
        .iter()
        .map(|&b| b as char)
        .filter(|&c| c != '*')
        .collect();
    let record = record.trim();
    if record.is_empty() {
        None
    } else {
        Some(record.to_string())
    }
}

/// Pad a 7-field record to 17 fields with zeros. Records of 17 or more are
/// returned unchanged; any other count passes through with a warning.
pub fn normalize_metrics(record: &str) -> Vec<String> {
    let mut fields: Vec<String> = record.split(',').map(str::to_string).collect();
    match fields.len() {
        SHORT_METRICS_FIELDS => {
            fields.resize(NORMALIZED_METRICS_FIELDS, ZERO_FIELD.to_string());
        }
        n if n >= NORMALIZED_METRICS_FIELDS => {}
        n => warn!(fields = n, "unexpected metrics field count, passing through"),
    }
    fields
}

fn zero_metrics() -> Vec<String> {
    vec![ZERO_FIELD.to_string(); NORMALIZED_METRICS_FIELDS]
}

// ── StatusReport ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Wall-clock time the request was received, µs since the Unix epoch.
    pub timestamp_us: i64,
    pub metrics: Vec<String>,
    pub bandwidth: u64,
    pub latency_us: u64,
}

impl StatusReport {
    /// Split a status line back into its parts. Needs at least the
    /// timestamp, bandwidth and latency fields.
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim().split(',').collect();
        if fields.len() < 3 {
            return Err(TelemetryError::Decode(format!(
                "status line has {} fields, need at least 3",
                fields.len()
            )));
        }
        let n = fields.len();
        let number = |idx: usize, what: &str| -> Result<u64> {
            fields[idx]
                .parse::<u64>()
                .map_err(|e| TelemetryError::Decode(format!("{what} '{}': {e}", fields[idx])))
        };

        let timestamp_us = fields[0]
            .parse::<i64>()
            .map_err(|e| TelemetryError::Decode(format!("timestamp '{}': {e}", fields[0])))?;

        Ok(Self {
            timestamp_us,
            metrics: fields[1..n - 2].iter().map(|f| f.to_string()).collect(),
            bandwidth: number(n - 2, "bandwidth")?,
            latency_us: number(n - 1, "latency")?,
        })
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.timestamp_us)?;
        for field in &self.metrics {
            write!(f, ",{field}")?;
        }
        write!(f, ",{},{}", self.bandwidth, self.latency_us)
    }
}

// ── StatusService ─────────────────────────────────────────────────────────────

/// Answers status queries from the two shared segments.
pub struct StatusService {
    metrics: SharedSegment,
    bandwidth: SharedSegment,
    last_metrics: Mutex<Option<Vec<String>>>,
    last_bandwidth: AtomicU64,
}

impl StatusService {
    /// Opens both segments. Either one missing is fatal.
    pub fn open(config: &SegmentConfig) -> Result<Self> {
        let metrics = SharedSegment::open(&config.shm_dir, config.metrics_key)?;
        let bandwidth = SharedSegment::open(&config.shm_dir, config.bandwidth_key)?;
        Ok(Self::from_segments(metrics, bandwidth))
    }

    pub fn from_segments(metrics: SharedSegment, bandwidth: SharedSegment) -> Self {
        Self {
            metrics,
            bandwidth,
            last_metrics: Mutex::new(None),
            last_bandwidth: AtomicU64::new(0),
        }
    }

    /// Assemble one status report. Never fails; unreadable segments fall back
    /// to the last good value (or zeros before any good read).
    pub fn report(&self) -> StatusReport {
        let start = Instant::now();
        let timestamp_us = chrono::Utc::now().timestamp_micros();

        let metrics = self.read_metrics();
        let bandwidth = self.read_bandwidth();

        let latency_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
        StatusReport { timestamp_us, metrics, bandwidth, latency_us }
    }

    /// The status line served to clients.
    pub fn get_status(&self) -> String {
        self.report().to_string()
    }

    /// Report built from cached values only, without touching the segments.
    /// Served when a live read could not complete.
    pub fn cached_report(&self) -> StatusReport {
        let metrics = self
            .last_metrics
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .unwrap_or_else(zero_metrics);
        StatusReport {
            timestamp_us: chrono::Utc::now().timestamp_micros(),
            metrics,
            bandwidth: self.last_bandwidth.load(Ordering::Relaxed),
            latency_us: 0,
        }
    }

    fn read_metrics(&self) -> Vec<String> {
        let decoded = match self.metrics.read() {
            Ok(bytes) => decode_metrics_record(&bytes),
            Err(e) => {
                warn!(%e, key = self.metrics.key(), "metrics segment unreadable");
                None
            }
        };

        let mut last = self.last_metrics.lock().unwrap_or_else(|p| p.into_inner());
        match decoded {
            Some(record) => {
                let fields = normalize_metrics(&record);
                *last = Some(fields.clone());
                fields
            }
            None => {
                debug!("serving stale metrics");
                last.clone().unwrap_or_else(zero_metrics)
            }
        }
    }

    fn read_bandwidth(&self) -> u64 {
        let decoded = self
            .bandwidth
            .read()
            .and_then(|bytes| decode_fixed_width(&bytes));
        match decoded {
            Ok(value) => {
                self.last_bandwidth.store(value, Ordering::Relaxed);
                value
            }
            Err(e) => {
                debug!(%e, "serving stale bandwidth");
                self.last_bandwidth.load(Ordering::Relaxed)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
