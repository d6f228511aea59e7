use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chainwatch_rpc::{Counter, RpcMetrics};

use crate::status::ChainStatus;

#[derive(Debug, Clone)]
pub struct Gauge {
    value: Arc<AtomicU64>,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0f64.to_bits())),
        }
    }

    pub fn set(&self, value: f64) {
        self.value.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

/// Poller and chain gauges, plus the retry counters of the RPC layer.
#[derive(Debug, Clone, Default)]
pub struct MonitorMetrics {
    pub ticks_total: Counter,
    pub tick_failures_total: Counter,
    pub connected: Gauge,
    pub block_height: Gauge,
    pub current_slot: Gauge,
    pub storage_usage: Gauge,
    pub transaction_count: Gauge,
    pub tps: Gauge,
    pub rpc: RpcMetrics,
}

impl MonitorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one poll tick.
    pub fn record_tick(&self, status: &ChainStatus, tps: f64) {
        self.ticks_total.inc();
        if !status.is_connected() {
            self.tick_failures_total.inc();
        }
        self.connected
            .set(if status.is_connected() { 1.0 } else { 0.0 });
        self.block_height.set(status.block_height as f64);
        self.current_slot.set(status.current_slot as f64);
        self.storage_usage.set(status.storage_usage);
        self.transaction_count.set(status.transaction_count as f64);
        self.tps.set(tps);
    }

    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();
        let rpc = self.rpc.snapshot();

        let counters = [
            ("chainwatch_ticks_total", self.ticks_total.get()),
            ("chainwatch_tick_failures_total", self.tick_failures_total.get()),
            ("chainwatch_rpc_attempts_total", rpc.attempts),
            ("chainwatch_rpc_successes_total", rpc.successes),
            ("chainwatch_rpc_failures_total", rpc.failures),
            ("chainwatch_rpc_rotations_total", rpc.rotations),
            ("chainwatch_rpc_exhausted_total", rpc.exhausted),
        ];
        for (name, value) in counters {
            let _ = writeln!(output, "# TYPE {} counter", name);
            let _ = writeln!(output, "{} {}", name, value);
        }

        let gauges = [
            ("chainwatch_connected", self.connected.get()),
            ("chainwatch_block_height", self.block_height.get()),
            ("chainwatch_current_slot", self.current_slot.get()),
            ("chainwatch_storage_usage", self.storage_usage.get()),
            ("chainwatch_transaction_count", self.transaction_count.get()),
            ("chainwatch_tps", self.tps.get()),
        ];
        for (name, value) in gauges {
            let _ = writeln!(output, "# TYPE {} gauge", name);
            let _ = writeln!(output, "{} {}", name, value);
        }

        output
    }
}
