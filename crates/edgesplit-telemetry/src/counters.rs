//! Cumulative interface byte counters.
//!
//! The monitor only needs a monotonically growing byte count per tick, so the
//! source is a trait: production reads the OS through `sysinfo`, tests feed
//! scripted values.

use sysinfo::Networks;
use tracing::debug;

use edgesplit_types::config::CounterDirection;

use crate::error::{Result, TelemetryError};

pub trait ByteCounterSource: Send {
    /// Current cumulative byte count. Called once per monitor tick.
    fn read_bytes(&mut self) -> Result<u64>;
}

// ── sysinfo ───────────────────────────────────────────────────────────────────

/// Reads one interface's counters from the operating system.
pub struct SysinfoCounters {
    networks: Networks,
    interface: String,
    direction: CounterDirection,
}

impl SysinfoCounters {
    /// Fails with [`TelemetryError::UnknownInterface`] if `interface` is not
    /// present right now.
    pub fn new(interface: impl Into<String>, direction: CounterDirection) -> Result<Self> {
        let interface = interface.into();
        let networks = Networks::new_with_refreshed_list();
        if !networks.list().contains_key(&interface) {
            let known: Vec<&String> = networks.list().keys().collect();
            debug!(%interface, ?known, "interface lookup failed");
            return Err(TelemetryError::UnknownInterface(interface));
        }
        Ok(Self { networks, interface, direction })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl ByteCounterSource for SysinfoCounters {
    fn read_bytes(&mut self) -> Result<u64> {
        self.networks.refresh();
        let data = self
            .networks
            .list()
            .get(&self.interface)
            .ok_or_else(|| TelemetryError::UnknownInterface(self.interface.clone()))?;

        let rx = data.total_received();
        let tx = data.total_transmitted();
        Ok(match self.direction {
            CounterDirection::Received => rx,
            CounterDirection::Transmitted => tx,
            CounterDirection::Both => rx.saturating_add(tx),
        })
    }
}

// ── Scripted ──────────────────────────────────────────────────────────────────

/// Replays a fixed list of readings; errors once exhausted.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCounters {
    readings: std::collections::VecDeque<u64>,
}

impl ScriptedCounters {
    pub fn new(readings: impl IntoIterator<Item = u64>) -> Self {
        Self { readings: readings.into_iter().collect() }
    }
}

impl ByteCounterSource for ScriptedCounters {
    fn read_bytes(&mut self) -> Result<u64> {
        self.readings
            .pop_front()
            .ok_or_else(|| TelemetryError::Decode("scripted counters exhausted".into()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
