//! Bandwidth telemetry for split-point selection.
//!
//! ```text
//!   interface counters ──► BandwidthMonitor ──► segment <bandwidth_key>
//!                          (1 s tick, window)          │
//!                                                      ▼
//!   external producer ───────────────────────► segment <metrics_key>
//!                                                      │
//!                                       StatusService ◄┘ ──► GET /status
//! ```
//!
//! The monitor is the only writer. The status service only reads, and the
//! two never share memory except through the segments.

// ── Module declarations ───────────────────────────────────────────────────────

pub mod bandwidth;
pub mod counters;
pub mod error;
pub mod segment;
pub mod server;
pub mod status;
pub mod window;

// ── Public re-exports ─────────────────────────────────────────────────────────

pub use bandwidth::{BandwidthEstimator, BandwidthMonitor, TickOutcome};
pub use counters::{ByteCounterSource, ScriptedCounters, SysinfoCounters};
pub use error::{Result, TelemetryError};
pub use segment::{decode_fixed_width, encode_fixed_width, SharedSegment};
pub use status::{StatusReport, StatusService};
pub use window::SmoothingWindow;

// ── Imports ───────────────────────────────────────────────────────────────────

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use edgesplit_types::config::{MonitorConfig, SegmentConfig, StatusServerConfig};

// ── TelemetryHandle ───────────────────────────────────────────────────────────

/// Running monitor and status server, stopped together by [`shutdown`].
///
/// [`shutdown`]: TelemetryHandle::shutdown
pub struct TelemetryHandle {
    shutdown_tx: watch::Sender<bool>,
    local_addr: SocketAddr,
    monitor: JoinHandle<()>,
    server: JoinHandle<()>,
}

impl TelemetryHandle {
    /// Start against the configured interface. Every startup failure (bad
    /// config, unknown interface, segment create/open) is returned here.
    pub async fn start(
        monitor: &MonitorConfig,
        segments: &SegmentConfig,
        server: &StatusServerConfig,
    ) -> Result<Self> {
        let counters = SysinfoCounters::new(monitor.interface.clone(), monitor.direction)?;
        info!(interface = %counters.interface(), direction = %monitor.direction, "counters attached");
        Self::start_with_counters(monitor, segments, server.listen_addr, counters).await
    }

    pub async fn start_with_counters<C>(
        monitor: &MonitorConfig,
        segments: &SegmentConfig,
        listen_addr: SocketAddr,
        counters: C,
    ) -> Result<Self>
    where
        C: ByteCounterSource + 'static,
    {
        // The monitor creates the bandwidth segment the service opens.
        let bandwidth_monitor = BandwidthMonitor::new(monitor, segments, counters)?;
        let service = Arc::new(StatusService::open(segments)?);

        // Bind before spawning so address errors surface to the caller.
        let listener = tokio::net::TcpListener::bind(listen_addr)
            .await
            .map_err(|e| TelemetryError::Server(format!("bind {listen_addr}: {e}")))?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor = tokio::spawn(bandwidth_monitor.run(shutdown_rx.clone()));
        let server = tokio::spawn(async move {
            if let Err(e) = server::serve_listener(listener, service, shutdown_rx).await {
                error!(%e, "status server exited with error");
            }
        });

        Ok(Self { shutdown_tx, local_addr, monitor, server })
    }

    /// Address the status server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal both tasks and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.monitor.await {
            error!(%e, "bandwidth monitor task panicked");
        }
        if let Err(e) = self.server.await {
            error!(%e, "status server task panicked");
        }
    }
}
