//! Telemetry for the virtual-time scheduler: JSON logging and dispatch metrics.

#![deny(unsafe_code)]

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use vtime_core::{DispatchObserver, DispatchRecord};

#[cfg(feature = "otel")]
pub mod dispatch_observer;

/// Initialize structured logging (JSON on stderr) with env filter.
/// Set RUST_LOG, e.g., "info,scheduler=trace".
pub fn init_json_logging() {
    let fmt_layer = fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_current_span(true)
        .with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}

/// In-process dispatch counters. Cheap to clone; clones share the counters.
#[derive(Clone, Debug, Default)]
pub struct SchedulerMetrics {
    dispatched: Arc<AtomicU64>,
    purged: Arc<AtomicU64>,
    // clock reading of the most recent dispatch
    last_clock_ms: Arc<AtomicI64>,
}

impl SchedulerMetrics {
    /// Zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// (dispatched, purged, last dispatch clock in ms)
    pub fn snapshot(&self) -> (u64, u64, i64) {
        (
            self.dispatched.load(Ordering::Relaxed),
            self.purged.load(Ordering::Relaxed),
            self.last_clock_ms.load(Ordering::Relaxed),
        )
    }
}

impl DispatchObserver for SchedulerMetrics {
    fn on_dispatch(&self, record: &DispatchRecord) {
        let _ = self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.last_clock_ms.store(record.clock_ms, Ordering::Relaxed);
    }

    fn on_purge(&self, _entry: u64) {
        let _ = self.purged.fetch_add(1, Ordering::Relaxed);
    }
}
