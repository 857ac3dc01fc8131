//! OTel-backed dispatch observer (feature-gated via `otel`).
//! Counts dispatches and purges and records how far behind due time work ran.

use once_cell::sync::OnceCell;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter, Unit};
use opentelemetry::KeyValue;
use vtime_core::{DispatchObserver, DispatchRecord};

use crate::SchedulerMetrics;

struct Instruments {
    dispatched: Counter<u64>,
    purged: Counter<u64>,
    lateness_ms: Histogram<u64>,
}

static INSTR: OnceCell<Instruments> = OnceCell::new();

fn ensure_instruments() -> &'static Instruments {
    INSTR.get_or_init(|| {
        // Use the global meter provider (may be a no-op if OTLP not initialized).
        let meter: Meter = global::meter("vtime.scheduler");
        let dispatched = meter
            .u64_counter("vtime.dispatch.count")
            .with_description("Scheduled items whose action ran")
            .init();
        let purged = meter
            .u64_counter("vtime.purge.count")
            .with_description("Cancelled items dropped from the queue")
            .init();
        let lateness_ms = meter
            .u64_histogram("vtime.dispatch.lateness")
            .with_description("Clock minus due time at dispatch")
            .with_unit(Unit::new("ms"))
            .init();
        Instruments { dispatched, purged, lateness_ms }
    })
}

/// Forwards to OTel instruments and mirrors into in-process [`SchedulerMetrics`].
#[derive(Clone, Debug, Default)]
pub struct OtelDispatchObserver {
    mirror: SchedulerMetrics,
}

impl OtelDispatchObserver {
    pub fn new() -> Self {
        let _ = ensure_instruments();
        Self::default()
    }

    /// Test-visible mirror of the exported counters.
    pub fn mirror(&self) -> &SchedulerMetrics {
        &self.mirror
    }
}

impl DispatchObserver for OtelDispatchObserver {
    fn on_dispatch(&self, record: &DispatchRecord) {
        let inst = ensure_instruments();
        inst.dispatched.add(1, &[KeyValue::new("op", "dispatch")]);
        let lateness = record.clock_ms.saturating_sub(record.due_ms).max(0) as u64;
        inst.lateness_ms.record(lateness, &[]);
        self.mirror.on_dispatch(record);
    }

    fn on_purge(&self, entry: u64) {
        let inst = ensure_instruments();
        inst.purged.add(1, &[KeyValue::new("op", "purge")]);
        self.mirror.on_purge(entry);
    }
}
