//! In-memory latency histogram for chunk processing.
//! One sample per committed chunk: scoring plus persistence, retries included.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Shared chunk latency stats. The pipeline records, the API reads.
/// Values stored in microseconds.
pub struct LatencyStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

/// Percentiles in milliseconds. `None` until the first chunk completes.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub max_ms: Option<f64>,
}

impl LatencyStats {
    /// Tracks 1us to 10 minutes at 3 significant figures, enough to hold a
    /// chunk that spent its whole retry budget.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 600_000_000, 3)
            .expect("constant histogram bounds are valid");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        let us = d.as_micros().clamp(1, 600_000_000) as u64;
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(us);
        }
    }

    pub fn summary(&self) -> LatencySummary {
        let empty = LatencySummary {
            samples: 0,
            p50_ms: None,
            p95_ms: None,
            p99_ms: None,
            max_ms: None,
        };
        let Ok(h) = self.inner.lock() else {
            return empty;
        };
        if h.len() == 0 {
            return empty;
        }
        let ms = |us: u64| Some(us as f64 / 1000.0);
        LatencySummary {
            samples: h.len(),
            p50_ms: ms(h.value_at_quantile(0.5)),
            p95_ms: ms(h.value_at_quantile(0.95)),
            p99_ms: ms(h.value_at_quantile(0.99)),
            max_ms: ms(h.max()),
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let stats = LatencyStats::new();
        let s = stats.summary();
        assert_eq!(s.samples, 0);
        assert!(s.p50_ms.is_none());
    }

    #[test]
    fn reports_milliseconds() {
        let stats = LatencyStats::new();
        for ms in [10, 20, 30, 40] {
            stats.record(Duration::from_millis(ms));
        }
        let s = stats.summary();
        assert_eq!(s.samples, 4);
        let p50 = s.p50_ms.unwrap();
        assert!((19.0..=21.0).contains(&p50), "p50={p50}");
        let max = s.max_ms.unwrap();
        assert!((39.9..=40.1).contains(&max), "max={max}");
    }
}
