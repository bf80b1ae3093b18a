//! Statistics collection for load runs
//!
//! Uses HDR Histogram for accurate latency percentile calculation.

use std::collections::BTreeMap;
use std::time::Duration;
use hdrhistogram::Histogram;
use serde::Serialize;

use crate::pipeline::ExecutionResult;

/// Latency statistics in milliseconds
#[derive(Debug, Clone, Default, Serialize)]
pub struct LatencyStats {
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub stddev_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Aggregate numbers for a load run
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadStats {
    pub total_requests: u64,
    pub passed_requests: u64,
    pub failed_requests: u64,
    /// Requests that never got a response
    pub errored_requests: u64,
    pub pass_rate: f64,
    pub requests_per_second: f64,
    pub total_bytes: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub errors: BTreeMap<String, u64>,
    pub latency: LatencyStats,
}

/// Collects statistics while virtual users report in
pub struct StatsCollector {
    /// HDR Histogram for latency tracking (in microseconds)
    histogram: Histogram<u64>,
    status_codes: BTreeMap<u16, u64>,
    errors: BTreeMap<String, u64>,
    passed: u64,
    failed: u64,
    errored: u64,
    total_bytes: u64,
}

const MAX_LATENCY_US: u64 = 300_000_000; // 5 minutes

impl StatsCollector {
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(1, MAX_LATENCY_US, 3)
            .expect("histogram bounds are constant and valid");

        Self {
            histogram,
            status_codes: BTreeMap::new(),
            errors: BTreeMap::new(),
            passed: 0,
            failed: 0,
            errored: 0,
            total_bytes: 0,
        }
    }

    pub fn record(&mut self, result: &ExecutionResult) {
        let latency_ms = result
            .response
            .as_ref()
            .map(|r| r.latency_ms)
            .filter(|ms| *ms > 0)
            .unwrap_or(result.duration_ms);
        let clamped = (latency_ms.saturating_mul(1000)).clamp(1, MAX_LATENCY_US);
        let _ = self.histogram.record(clamped);

        if result.passed() {
            self.passed += 1;
        } else {
            self.failed += 1;
        }

        match &result.response {
            Some(response) => {
                *self.status_codes.entry(response.status).or_insert(0) += 1;
                self.total_bytes += response.size_bytes;
            }
            None => {
                self.errored += 1;
                if let Some(error) = &result.error {
                    *self.errors.entry(error.clone()).or_insert(0) += 1;
                }
            }
        }
    }

    pub fn finalize(self, duration: Duration) -> LoadStats {
        let total = self.passed + self.failed;
        let duration_secs = duration.as_secs_f64();

        let latency = if self.histogram.len() > 0 {
            LatencyStats {
                min_ms: self.histogram.min() as f64 / 1000.0,
                max_ms: self.histogram.max() as f64 / 1000.0,
                mean_ms: self.histogram.mean() / 1000.0,
                stddev_ms: self.histogram.stdev() / 1000.0,
                p50_ms: self.histogram.value_at_percentile(50.0) as f64 / 1000.0,
                p90_ms: self.histogram.value_at_percentile(90.0) as f64 / 1000.0,
                p95_ms: self.histogram.value_at_percentile(95.0) as f64 / 1000.0,
                p99_ms: self.histogram.value_at_percentile(99.0) as f64 / 1000.0,
            }
        } else {
            LatencyStats::default()
        };

        LoadStats {
            total_requests: total,
            passed_requests: self.passed,
            failed_requests: self.failed,
            errored_requests: self.errored,
            pass_rate: if total > 0 { self.passed as f64 / total as f64 } else { 0.0 },
            requests_per_second: if duration_secs > 0.0 { total as f64 / duration_secs } else { 0.0 },
            total_bytes: self.total_bytes,
            status_codes: self.status_codes,
            errors: self.errors,
            latency,
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::models::Phase;
    use crate::transport::RawResponse;

    fn result(status: Option<u16>, latency_ms: u64) -> ExecutionResult {
        let response = status.map(|s| {
            let mut r = RawResponse::new(s, "abcd");
            r.latency_ms = latency_ms;
            r
        });
        ExecutionResult {
            origin_tcid: "T1".to_string(),
            tcid: "T1".to_string(),
            name: String::new(),
            suite: String::new(),
            phase: Phase::Main,
            request: None,
            error: if response.is_none() { Some("connection refused".to_string()) } else { None },
            response,
            checks: Vec::new(),
            started_at: Utc::now(),
            duration_ms: latency_ms,
        }
    }

    #[test]
    fn test_stats_collector() {
        let mut collector = StatsCollector::new();
        collector.record(&result(Some(200), 100));
        collector.record(&result(Some(200), 150));
        collector.record(&result(Some(500), 50));
        collector.record(&result(None, 1000));

        let stats = collector.finalize(Duration::from_secs(2));
        assert_eq!(stats.total_requests, 4);
        // No checks: a 500 still passes, a transport error does not
        assert_eq!(stats.passed_requests, 3);
        assert_eq!(stats.errored_requests, 1);
        assert_eq!(stats.status_codes.get(&200), Some(&2));
        assert_eq!(stats.errors.get("connection refused"), Some(&1));
        assert_eq!(stats.total_bytes, 12);
        assert_eq!(stats.requests_per_second, 2.0);
        assert!(stats.latency.mean_ms > 0.0);
    }

    #[test]
    fn test_latency_percentiles() {
        let mut collector = StatsCollector::new();
        for i in 1..=100 {
            collector.record(&result(Some(200), i * 10));
        }

        let stats = collector.finalize(Duration::from_secs(10));
        assert!(stats.latency.p50_ms >= 450.0 && stats.latency.p50_ms <= 550.0);
        assert!(stats.latency.p99_ms >= 950.0 && stats.latency.p99_ms <= 1010.0);
    }

    #[test]
    fn test_empty_collector() {
        let stats = StatsCollector::new().finalize(Duration::from_secs(1));
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.pass_rate, 0.0);
        assert_eq!(stats.latency.mean_ms, 0.0);
    }
}
