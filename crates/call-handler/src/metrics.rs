use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use crate::ports::MetricsPort;

#[derive(Clone, Debug, Default)]
pub struct NoopMetrics;

impl MetricsPort for NoopMetrics {
    fn record_ok(&self, _latency_ms: u64) {}
    fn record_fail(&self, _kind: &str) {}
}

/// In-process counters for processed actions.
#[derive(Debug, Default)]
pub struct ActionCounters {
    ok: AtomicU64,
    total_latency_ms: AtomicU64,
    failures: Mutex<BTreeMap<String, u64>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub ok: u64,
    pub failed: u64,
    pub mean_latency_ms: u64,
    pub failures: BTreeMap<String, u64>,
}

impl ActionCounters {
    pub fn snapshot(&self) -> CounterSnapshot {
        let ok = self.ok.load(Ordering::Relaxed);
        let failures = self.failures.lock().clone();
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        CounterSnapshot {
            ok,
            failed: failures.values().sum(),
            mean_latency_ms: if ok == 0 { 0 } else { total / ok },
            failures,
        }
    }
}

impl MetricsPort for ActionCounters {
    fn record_ok(&self, latency_ms: u64) {
        self.ok.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    fn record_fail(&self, kind: &str) {
        *self.failures.lock().entry(kind.to_string()).or_default() += 1;
    }
}
