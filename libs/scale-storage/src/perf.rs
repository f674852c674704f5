use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Write,
    Query,
}

#[derive(Debug, Clone)]
pub struct OpSample {
    pub op_type: OpType,
    pub ts: Instant,
    pub duration: Duration,
    pub points_processed: usize,
    pub points_failed: usize,
    pub success: bool,
}

/// Point-in-time summary polled by the (out-of-scope) health reporter.
#[derive(Debug, Clone, Default)]
pub struct CurrentMetrics {
    pub avg_write_latency_ms: f64,
    pub avg_query_latency_ms: f64,
    pub throughput_ops_per_s: f64,
    pub error_rate_pct: f64,
    pub active_connections: usize,
    pub queue_size: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    pub count: usize,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Clone, Default)]
pub struct DetailedMetrics {
    pub total_ops: usize,
    pub total_failures: usize,
    pub write: LatencyStats,
    pub query: LatencyStats,
}

struct Backend {
    window: RwLock<VecDeque<OpSample>>,
    active_connections: AtomicUsize,
    queue_size: AtomicUsize,
}

impl Backend {
    fn new() -> Self {
        Self {
            window: RwLock::new(VecDeque::new()),
            active_connections: AtomicUsize::new(0),
            queue_size: AtomicUsize::new(0),
        }
    }

    fn prune(&self, window_size: Duration, now: Instant) {
        let mut w = self.window.write();
        while let Some(front) = w.front() {
            if now.duration_since(front.ts) > window_size {
                w.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding-window operation metrics, one ring buffer per backend, mirroring
/// the ring-buffer idiom a transport's rolling stats struct would use for
/// its own history.
pub struct PerformanceTracker {
    window_size: Duration,
    backends: DashMap<String, Backend>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self {
            window_size: DEFAULT_WINDOW,
            backends: DashMap::new(),
        }
    }

    pub fn with_window(window_size: Duration) -> Self {
        Self {
            window_size,
            backends: DashMap::new(),
        }
    }

    fn entry(&self, backend: &str) -> dashmap::mapref::one::Ref<'_, String, Backend> {
        self.backends
            .entry(backend.to_string())
            .or_insert_with(Backend::new);
        self.backends.get(backend).unwrap()
    }

    pub fn record(&self, backend: &str, sample: OpSample) {
        let entry = self.entry(backend);
        entry.prune(self.window_size, Instant::now());
        entry.window.write().push_back(sample);
    }

    pub fn set_connection_state(&self, backend: &str, connected: bool) {
        let entry = self.entry(backend);
        entry
            .active_connections
            .store(if connected { 1 } else { 0 }, Ordering::Relaxed);
    }

    pub fn set_queue_size(&self, backend: &str, size: usize) {
        self.entry(backend).queue_size.store(size, Ordering::Relaxed);
    }

    pub fn current_metrics(&self, backend: &str) -> CurrentMetrics {
        let Some(entry) = self.backends.get(backend) else {
            return CurrentMetrics::default();
        };
        entry.prune(self.window_size, Instant::now());
        let samples: Vec<OpSample> = entry.window.read().iter().cloned().collect();

        let writes: Vec<&OpSample> = samples.iter().filter(|s| s.op_type == OpType::Write).collect();
        let queries: Vec<&OpSample> = samples.iter().filter(|s| s.op_type == OpType::Query).collect();

        let avg_write_latency_ms = mean_ms(&writes);
        let avg_query_latency_ms = mean_ms(&queries);
        let failures = samples.iter().filter(|s| !s.success).count();
        let error_rate_pct = if samples.is_empty() {
            0.0
        } else {
            100.0 * failures as f64 / samples.len() as f64
        };
        let throughput_ops_per_s = samples.len() as f64 / self.window_size.as_secs_f64();

        CurrentMetrics {
            avg_write_latency_ms,
            avg_query_latency_ms,
            throughput_ops_per_s,
            error_rate_pct,
            active_connections: entry.active_connections.load(Ordering::Relaxed),
            queue_size: entry.queue_size.load(Ordering::Relaxed),
        }
    }

    pub fn detailed(&self, backend: &str) -> DetailedMetrics {
        let Some(entry) = self.backends.get(backend) else {
            return DetailedMetrics::default();
        };
        entry.prune(self.window_size, Instant::now());
        let samples: Vec<OpSample> = entry.window.read().iter().cloned().collect();

        let writes: Vec<f64> = samples
            .iter()
            .filter(|s| s.op_type == OpType::Write)
            .map(|s| s.duration.as_secs_f64() * 1000.0)
            .collect();
        let queries: Vec<f64> = samples
            .iter()
            .filter(|s| s.op_type == OpType::Query)
            .map(|s| s.duration.as_secs_f64() * 1000.0)
            .collect();

        DetailedMetrics {
            total_ops: samples.len(),
            total_failures: samples.iter().filter(|s| !s.success).count(),
            write: latency_stats(writes),
            query: latency_stats(queries),
        }
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn mean_ms(samples: &[&OpSample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.duration.as_secs_f64() * 1000.0).sum::<f64>() / samples.len() as f64
}

fn percentile(sorted_ms: &[f64], pct: f64) -> f64 {
    if sorted_ms.is_empty() {
        return 0.0;
    }
    let idx = ((sorted_ms.len() - 1) as f64 * pct).round() as usize;
    sorted_ms[idx.min(sorted_ms.len() - 1)]
}

fn latency_stats(mut samples_ms: Vec<f64>) -> LatencyStats {
    samples_ms.sort_by(|a, b| a.partial_cmp(b).unwrap());
    LatencyStats {
        count: samples_ms.len(),
        p50_ms: percentile(&samples_ms, 0.50),
        p95_ms: percentile(&samples_ms, 0.95),
        p99_ms: percentile(&samples_ms, 0.99),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(op: OpType, ms: u64, success: bool) -> OpSample {
        OpSample {
            op_type: op,
            ts: Instant::now(),
            duration: Duration::from_millis(ms),
            points_processed: 1,
            points_failed: if success { 0 } else { 1 },
            success,
        }
    }

    #[test]
    fn current_metrics_reflect_recorded_samples() {
        let tracker = PerformanceTracker::new();
        tracker.record("relational", sample(OpType::Write, 10, true));
        tracker.record("relational", sample(OpType::Write, 20, true));
        tracker.record("relational", sample(OpType::Write, 30, false));
        let metrics = tracker.current_metrics("relational");
        assert!((metrics.avg_write_latency_ms - 20.0).abs() < 1e-9);
        assert!((metrics.error_rate_pct - (100.0 / 3.0)).abs() < 1e-6);
    }

    #[test]
    fn unknown_backend_returns_zeroed_metrics() {
        let tracker = PerformanceTracker::new();
        let metrics = tracker.current_metrics("nowhere");
        assert_eq!(metrics.throughput_ops_per_s, 0.0);
    }

    #[test]
    fn detailed_percentiles_are_monotonic() {
        let tracker = PerformanceTracker::new();
        for ms in [5, 10, 15, 20, 100] {
            tracker.record("ts", sample(OpType::Write, ms, true));
        }
        let detailed = tracker.detailed("ts");
        assert!(detailed.write.p50_ms <= detailed.write.p95_ms);
        assert!(detailed.write.p95_ms <= detailed.write.p99_ms);
    }
}
