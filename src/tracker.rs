use crate::error::{ResilienceError, Result};
use crate::sla::{self, EndpointClass};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Default number of samples retained per endpoint.
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy)]
struct Sample {
    duration_ms: f64,
    recorded_at: Instant,
}

/// Statistical summary of the retained samples for one endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStats {
    pub count: usize,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointReport {
    pub key: String,
    pub class: EndpointClass,
    pub target_ms: f64,
    pub passing: bool,
    pub stats: EndpointStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlaReport {
    pub endpoints: Vec<EndpointReport>,
    pub failing: Vec<String>,
    pub pass_rate: f64,
}

/// Records duration samples per endpoint key and computes percentile
/// summaries over a bounded ring of recent samples.
///
/// Keys are `"METHOD /normalized/path"` strings. Each key holds at most
/// `capacity` samples; the oldest rotate out, which bounds both memory
/// and the cost of a stats call regardless of total request volume.
pub struct PercentileTracker {
    capacity: usize,
    samples: RwLock<HashMap<String, VecDeque<Sample>>>,
}

impl PercentileTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: RwLock::new(HashMap::new()),
        }
    }

    /// Record one completed operation for `key`.
    pub fn track(&self, key: &str, duration_ms: f64) -> Result<()> {
        let mut samples = self
            .samples
            .write()
            .map_err(|_| ResilienceError::LockPoisoned("tracker samples".to_string()))?;

        let ring = samples.entry(key.to_string()).or_default();
        ring.push_back(Sample {
            duration_ms,
            recorded_at: Instant::now(),
        });
        while ring.len() > self.capacity {
            ring.pop_front();
        }

        Ok(())
    }

    /// Summary for one endpoint key. A key with no samples yields `None`.
    pub fn stats(&self, key: &str) -> Result<Option<EndpointStats>> {
        let samples = self
            .samples
            .read()
            .map_err(|_| ResilienceError::LockPoisoned("tracker samples".to_string()))?;

        let ring = match samples.get(key) {
            Some(ring) if !ring.is_empty() => ring,
            _ => return Ok(None),
        };

        let mut sorted: Vec<f64> = ring.iter().map(|s| s.duration_ms).collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();

        Ok(Some(EndpointStats {
            count,
            avg_ms: sum / count as f64,
            min_ms: sorted[0],
            max_ms: sorted[count - 1],
            p50_ms: percentile(&sorted, 50.0),
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
        }))
    }

    /// Whether the endpoint's p95 is within `threshold_ms`. A key with no
    /// samples has nothing in violation and passes.
    pub fn meets_target(&self, key: &str, threshold_ms: f64) -> Result<bool> {
        Ok(self
            .stats(key)?
            .map(|stats| stats.p95_ms <= threshold_ms)
            .unwrap_or(true))
    }

    /// Aggregate every tracked endpoint against its classified target.
    pub fn report(&self) -> Result<SlaReport> {
        let keys = self.tracked_keys()?;

        let mut endpoints = Vec::with_capacity(keys.len());
        let mut failing = Vec::new();

        for key in keys {
            let Some(stats) = self.stats(&key)? else {
                continue;
            };
            let (method, path) = key.split_once(' ').unwrap_or(("GET", key.as_str()));
            let class = sla::classify(method, path);
            let target_ms = class.target_ms();
            let passing = stats.p95_ms <= target_ms;
            if !passing {
                failing.push(key.clone());
            }
            endpoints.push(EndpointReport {
                key,
                class,
                target_ms,
                passing,
                stats,
            });
        }

        let pass_rate = if endpoints.is_empty() {
            1.0
        } else {
            let passing = endpoints.iter().filter(|e| e.passing).count();
            passing as f64 / endpoints.len() as f64
        };

        Ok(SlaReport {
            endpoints,
            failing,
            pass_rate,
        })
    }

    pub fn tracked_keys(&self) -> Result<Vec<String>> {
        let samples = self
            .samples
            .read()
            .map_err(|_| ResilienceError::LockPoisoned("tracker samples".to_string()))?;

        let mut keys: Vec<String> = samples.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    pub fn endpoint_count(&self) -> Result<usize> {
        let samples = self
            .samples
            .read()
            .map_err(|_| ResilienceError::LockPoisoned("tracker samples".to_string()))?;
        Ok(samples.len())
    }

    /// Drop endpoints whose newest sample is older than `max_idle`.
    pub fn prune(&self, max_idle: Duration) -> Result<usize> {
        let mut samples = self
            .samples
            .write()
            .map_err(|_| ResilienceError::LockPoisoned("tracker samples".to_string()))?;

        let initial = samples.len();
        samples.retain(|_, ring| {
            ring.back()
                .map(|sample| sample.recorded_at.elapsed() < max_idle)
                .unwrap_or(false)
        });

        Ok(initial - samples.len())
    }
}

impl Default for PercentileTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Nearest-rank percentile over an already sorted slice:
/// `ceil(p/100 * n) - 1`, clamped to the slice bounds.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let rank = (p / 100.0 * n as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(n - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_for_unknown_key_is_none() {
        let tracker = PercentileTracker::default();
        assert!(tracker.stats("GET /api/items").unwrap().is_none());
    }

    #[test]
    fn percentiles_are_ordered() {
        let tracker = PercentileTracker::default();
        for i in 1..=100 {
            tracker.track("GET /api/items", i as f64).unwrap();
        }

        let stats = tracker.stats("GET /api/items").unwrap().unwrap();
        assert!(stats.p50_ms <= stats.p95_ms);
        assert!(stats.p95_ms <= stats.p99_ms);
        assert!(stats.p99_ms <= stats.max_ms);
        assert!(stats.min_ms <= stats.avg_ms);
        assert!(stats.avg_ms <= stats.max_ms);

        assert_eq!(stats.p50_ms, 50.0);
        assert_eq!(stats.p95_ms, 95.0);
        assert_eq!(stats.p99_ms, 99.0);
    }

    #[test]
    fn single_sample_percentiles() {
        let tracker = PercentileTracker::default();
        tracker.track("GET /api/items", 42.0).unwrap();

        let stats = tracker.stats("GET /api/items").unwrap().unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.p50_ms, 42.0);
        assert_eq!(stats.p99_ms, 42.0);
        assert_eq!(stats.min_ms, 42.0);
        assert_eq!(stats.max_ms, 42.0);
    }

    #[test]
    fn ring_buffer_is_bounded() {
        let tracker = PercentileTracker::new(10);
        for i in 0..25 {
            tracker.track("GET /api/items", i as f64).unwrap();
        }

        let stats = tracker.stats("GET /api/items").unwrap().unwrap();
        assert_eq!(stats.count, 10);
        // Oldest samples rotated out, only 15..24 remain.
        assert_eq!(stats.min_ms, 15.0);
        assert_eq!(stats.max_ms, 24.0);
    }

    #[test]
    fn meets_target_compares_p95() {
        let tracker = PercentileTracker::default();
        for _ in 0..20 {
            tracker.track("GET /api/items", 100.0).unwrap();
        }

        assert!(tracker.meets_target("GET /api/items", 150.0).unwrap());
        assert!(!tracker.meets_target("GET /api/items", 50.0).unwrap());
        assert!(tracker.meets_target("GET /api/nothing", 1.0).unwrap());
    }

    #[test]
    fn report_aggregates_by_classification() {
        let tracker = PercentileTracker::default();
        // List target is 200ms, Read target is 150ms.
        for _ in 0..10 {
            tracker.track("GET /api/bookings", 50.0).unwrap();
            tracker.track("GET /api/bookings/:id", 400.0).unwrap();
        }

        let report = tracker.report().unwrap();
        assert_eq!(report.endpoints.len(), 2);
        assert_eq!(report.failing, vec!["GET /api/bookings/:id".to_string()]);
        assert_eq!(report.pass_rate, 0.5);

        let read = report
            .endpoints
            .iter()
            .find(|e| e.key == "GET /api/bookings/:id")
            .unwrap();
        assert_eq!(read.class, EndpointClass::Read);
        assert_eq!(read.target_ms, 150.0);
        assert!(!read.passing);
    }

    #[test]
    fn empty_report_passes() {
        let tracker = PercentileTracker::default();
        let report = tracker.report().unwrap();
        assert!(report.endpoints.is_empty());
        assert_eq!(report.pass_rate, 1.0);
    }

    #[test]
    fn prune_drops_idle_endpoints() {
        let tracker = PercentileTracker::default();
        tracker.track("GET /api/items", 10.0).unwrap();

        assert_eq!(tracker.prune(Duration::from_secs(60)).unwrap(), 0);
        assert_eq!(tracker.prune(Duration::from_nanos(0)).unwrap(), 1);
        assert_eq!(tracker.endpoint_count().unwrap(), 0);
    }
}
