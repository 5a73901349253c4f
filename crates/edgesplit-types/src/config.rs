// Global configuration structs. Each component owns one section.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::EdgeSplitError;

// ── Stage graph ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct GraphConfig {
    /// Node id of the first stage that expects a flat `[N, features]` input.
    /// A reshape stage is inserted immediately before it. Architecture
    /// specific; `None` means no reshape is inserted.
    pub flatten_before: Option<String>,
}

impl GraphConfig {
    pub fn flatten_before(node_id: impl Into<String>) -> Self {
        Self {
            flatten_before: Some(node_id.into()),
        }
    }
}

// ── Profiler ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ProfilerConfig {
    /// Absolute tolerance when comparing split output to the full run.
    pub abs_tolerance: f32,
    /// Relative tolerance, scaled by the magnitude of the expected value.
    pub rel_tolerance: f32,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            abs_tolerance: 1e-5,
            rel_tolerance: 1e-4,
        }
    }
}

// ── Shared telemetry segments ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SegmentConfig {
    /// Directory holding named segments. Defaults to `/dev/shm`.
    pub shm_dir: PathBuf,

    /// Key of the segment this process owns and writes (bandwidth).
    pub bandwidth_key: u32,

    /// Key of the externally produced system-metrics segment (read only).
    pub metrics_key: u32,

    /// Size in bytes of the owned segment. Must hold the 10-digit encoding.
    pub bandwidth_segment_size: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            shm_dir: PathBuf::from("/dev/shm"),
            bandwidth_key: 6652,
            metrics_key: 1991,
            bandwidth_segment_size: 10,
        }
    }
}

// ── Bandwidth monitor ─────────────────────────────────────────────────────────

/// Which cumulative interface counter feeds the bandwidth sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterDirection {
    #[default]
    Received,
    Transmitted,
    Both,
}

impl fmt::Display for CounterDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received    => write!(f, "received"),
            Self::Transmitted => write!(f, "transmitted"),
            Self::Both        => write!(f, "both"),
        }
    }
}

impl FromStr for CounterDirection {
    type Err = EdgeSplitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "received" | "rx"    => Ok(Self::Received),
            "transmitted" | "tx" => Ok(Self::Transmitted),
            "both"               => Ok(Self::Both),
            other => Err(EdgeSplitError::Config(format!(
                "unknown counter direction '{other}' (expected received, transmitted or both)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Network interface whose byte counters are sampled.
    pub interface: String,

    /// Nominal link capacity in Mbps. Samples are headroom under this value.
    pub assumed_link_capacity_mbps: f64,

    /// Sampling period. Default: 1 second.
    pub sample_interval: Duration,

    /// Maximum number of samples in the smoothing window. Default: 10.
    pub window_len: usize,

    pub direction: CounterDirection,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interface: "eno1".to_string(),
            assumed_link_capacity_mbps: 1000.0,
            sample_interval: Duration::from_secs(1),
            window_len: 10,
            direction: CounterDirection::Received,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), EdgeSplitError> {
        if !self.assumed_link_capacity_mbps.is_finite() || self.assumed_link_capacity_mbps <= 0.0 {
            return Err(EdgeSplitError::Config(format!(
                "assumed link capacity must be a positive number, got {}",
                self.assumed_link_capacity_mbps
            )));
        }
        if self.window_len == 0 {
            return Err(EdgeSplitError::Config("window length must be at least 1".into()));
        }
        if self.sample_interval.is_zero() {
            return Err(EdgeSplitError::Config("sample interval must be non-zero".into()));
        }
        if self.interface.is_empty() {
            return Err(EdgeSplitError::Config("network interface name is empty".into()));
        }
        Ok(())
    }
}

// ── Status endpoint ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StatusServerConfig {
    pub listen_addr: SocketAddr,
}

impl Default for StatusServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8004)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_config_defaults() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.window_len, 10);
        assert_eq!(cfg.sample_interval, Duration::from_secs(1));
        assert_eq!(cfg.assumed_link_capacity_mbps, 1000.0);
        assert_eq!(cfg.direction, CounterDirection::Received);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn monitor_config_rejects_bad_values() {
        let mut cfg = MonitorConfig::default();
        cfg.window_len = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = MonitorConfig::default();
        cfg.assumed_link_capacity_mbps = -5.0;
        assert!(cfg.validate().is_err());

        let mut cfg = MonitorConfig::default();
        cfg.sample_interval = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn segment_config_defaults() {
        let cfg = SegmentConfig::default();
        assert_eq!(cfg.bandwidth_key, 6652);
        assert_eq!(cfg.metrics_key, 1991);
        assert!(cfg.bandwidth_segment_size >= 10);
        assert!(cfg.shm_dir.ends_with("shm"));
    }

    #[test]
    fn counter_direction_parses() {
        assert_eq!("rx".parse::<CounterDirection>().unwrap(), CounterDirection::Received);
        assert_eq!("Transmitted".parse::<CounterDirection>().unwrap(), CounterDirection::Transmitted);
        assert_eq!("both".parse::<CounterDirection>().unwrap(), CounterDirection::Both);
        assert!("sideways".parse::<CounterDirection>().is_err());
    }

    #[test]
    fn status_server_default_port() {
        assert_eq!(StatusServerConfig::default().listen_addr.port(), 8004);
    }
}
