//! Periodic bandwidth headroom estimator.
//!
//! Every tick reads the interface's cumulative byte counter, converts the
//! delta since the previous tick to megabits, and subtracts it from the
//! configured link capacity. Non-negative samples enter a bounded smoothing
//! window; the window mean is published to the owned shared segment as a
//! 10-digit decimal. The first reading only establishes the baseline.
//!
//! The window and estimate are owned by the monitor task. Other components
//! see the estimate only through the shared segment.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use edgesplit_types::config::{MonitorConfig, SegmentConfig};

use crate::counters::ByteCounterSource;
use crate::error::Result;
use crate::segment::{encode_fixed_width, SharedSegment, FIXED_WIDTH_DIGITS};
use crate::window::SmoothingWindow;

const BITS_PER_BYTE: f64 = 8.0;
const BITS_PER_MEGABIT: f64 = 1_000_000.0;

/// What a single tick did with its counter reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// First reading; baseline recorded, nothing published.
    Primed,
    /// Sample accepted and the new mean published.
    Published { sample: f64, estimate: f64 },
    /// Traffic exceeded the assumed capacity; sample dropped.
    Negative { sample: f64 },
    /// Counter went backwards (interface reset or wrap); sample dropped.
    CounterReset { previous: u64, current: u64 },
}

// ── Estimator ─────────────────────────────────────────────────────────────────

/// Pure sampling arithmetic, free of I/O.
#[derive(Debug, Clone)]
pub struct BandwidthEstimator {
    capacity_mbps: f64,
    previous: Option<u64>,
    window: SmoothingWindow,
}

impl BandwidthEstimator {
    pub fn new(capacity_mbps: f64, window_len: usize) -> Self {
        Self {
            capacity_mbps,
            previous: None,
            window: SmoothingWindow::new(window_len),
        }
    }

    /// Feed one cumulative counter reading. The baseline always advances to
    /// `counter`, including when the sample is dropped.
    pub fn observe(&mut self, counter: u64) -> TickOutcome {
        let Some(previous) = self.previous.replace(counter) else {
            return TickOutcome::Primed;
        };
        if counter < previous {
            return TickOutcome::CounterReset { previous, current: counter };
        }

        let delta_mbit = (counter - previous) as f64 * BITS_PER_BYTE / BITS_PER_MEGABIT;
        let sample = self.capacity_mbps - delta_mbit;
        if sample < 0.0 {
            return TickOutcome::Negative { sample };
        }

        self.window.push(sample);
        // Non-empty after push.
        let estimate = self.window.mean().unwrap_or(sample);
        TickOutcome::Published { sample, estimate }
    }

    pub fn estimate(&self) -> Option<f64> {
        self.window.mean()
    }

    pub fn window(&self) -> &SmoothingWindow {
        &self.window
    }
}

/// Integer value written to the segment for an estimate.
pub fn estimate_to_segment_value(estimate: f64) -> u64 {
    // `as` saturates: negatives and NaN become 0.
    estimate as u64
}

// ── Monitor ───────────────────────────────────────────────────────────────────

/// Owns the estimator, the counter source, and the bandwidth segment.
pub struct BandwidthMonitor<C: ByteCounterSource> {
    estimator: BandwidthEstimator,
    counters: C,
    segment: SharedSegment,
    sample_interval: Duration,
}

impl<C: ByteCounterSource> BandwidthMonitor<C> {
    /// Creates the owned segment and zeroes it. Failure here is fatal to the
    /// caller.
    pub fn new(config: &MonitorConfig, segments: &SegmentConfig, counters: C) -> Result<Self> {
        config.validate()?;
        let size = segments.bandwidth_segment_size.max(FIXED_WIDTH_DIGITS);
        let segment = SharedSegment::create(&segments.shm_dir, segments.bandwidth_key, size)?;
        segment.write(encode_fixed_width(0).as_bytes())?;

        info!(
            key = segments.bandwidth_key,
            path = %segment.path().display(),
            capacity_mbps = config.assumed_link_capacity_mbps,
            window = config.window_len,
            "bandwidth segment ready"
        );

        Ok(Self {
            estimator: BandwidthEstimator::new(config.assumed_link_capacity_mbps, config.window_len),
            counters,
            segment,
            sample_interval: config.sample_interval,
        })
    }

    pub fn estimator(&self) -> &BandwidthEstimator {
        &self.estimator
    }

    pub fn segment(&self) -> &SharedSegment {
        &self.segment
    }

    /// One sampling step: read counters, update the window, publish.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        let counter = self.counters.read_bytes()?;
        let outcome = self.estimator.observe(counter);
        match outcome {
            TickOutcome::Primed => debug!(counter, "bandwidth baseline primed"),
            TickOutcome::Published { sample, estimate } => {
                let value = estimate_to_segment_value(estimate);
                self.segment.write(encode_fixed_width(value).as_bytes())?;
                debug!(sample, estimate, value, "bandwidth published");
            }
            TickOutcome::Negative { sample } => {
                debug!(sample, "negative bandwidth sample discarded");
            }
            TickOutcome::CounterReset { previous, current } => {
                warn!(previous, current, "interface counter went backwards, sample discarded");
            }
        }
        Ok(outcome)
    }

    /// Tick once per interval until `shutdown` flips to `true` or its sender
    /// is dropped. Per-tick errors are logged and the loop continues.
    ///
    /// Each tick runs on the blocking pool: counter refresh and the segment
    /// write are synchronous syscalls.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>)
    where
        C: 'static,
    {
        let mut interval = tokio::time::interval(self.sample_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut monitor = self;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }

            let joined = tokio::task::spawn_blocking(move || {
                let result = monitor.tick();
                (monitor, result)
            })
            .await;
            match joined {
                Ok((returned, result)) => {
                    monitor = returned;
                    if let Err(e) = result {
                        warn!(%e, "bandwidth tick failed");
                    }
                }
                Err(e) => {
                    error!(%e, "bandwidth tick task panicked, monitor stopping");
                    break;
                }
            }
        }
        info!("bandwidth monitor stopped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
