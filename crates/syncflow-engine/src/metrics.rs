//! Performance samples for integrations.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Samples kept in memory.
const MAX_SAMPLES: usize = 500;

/// One performance observation, taken on every connection test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub integration_id: String,
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: u64,
    /// Schema cache hits over lookups, 0.0 to 1.0.
    pub cache_hit_rate: f64,
    /// Resident memory of this process in MB.
    pub memory_usage: f64,
    /// CPU usage of this process in percent.
    pub cpu_usage: f32,
    /// Failed requests over all requests, 0.0 to 1.0.
    pub error_rate: f64,
    /// Requests per second since the collector started.
    pub throughput: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    requests: u64,
    errors: u64,
    cache_hits: u64,
    cache_misses: u64,
}

/// Request counters plus the latest samples.
pub struct MetricsCollector {
    started: Instant,
    counters: Mutex<Counters>,
    samples: Mutex<VecDeque<PerformanceSample>>,
    system: Mutex<System>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            counters: Mutex::new(Counters::default()),
            samples: Mutex::new(VecDeque::new()),
            system: Mutex::new(System::new()),
        }
    }

    /// Count one provider request.
    pub fn record_request(&self, success: bool) {
        if let Ok(mut c) = self.counters.lock() {
            c.requests += 1;
            if !success {
                c.errors += 1;
            }
        }
    }

    /// Count one schema cache lookup.
    pub fn record_cache_lookup(&self, hit: bool) {
        if let Ok(mut c) = self.counters.lock() {
            if hit {
                c.cache_hits += 1;
            } else {
                c.cache_misses += 1;
            }
        }
    }

    pub fn error_rate(&self) -> f64 {
        let c = self.counters();
        ratio(c.errors, c.requests)
    }

    pub fn cache_hit_rate(&self) -> f64 {
        let c = self.counters();
        ratio(c.cache_hits, c.cache_hits + c.cache_misses)
    }

    pub fn throughput(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= f64::EPSILON {
            return 0.0;
        }
        self.counters().requests as f64 / elapsed
    }

    /// Take a sample for `integration_id` and keep it.
    pub fn sample(&self, integration_id: &str, response_time_ms: u64) -> PerformanceSample {
        let (memory_usage, cpu_usage) = self.process_usage();
        let sample = PerformanceSample {
            integration_id: integration_id.to_string(),
            timestamp: Utc::now(),
            response_time_ms,
            cache_hit_rate: self.cache_hit_rate(),
            memory_usage,
            cpu_usage,
            error_rate: self.error_rate(),
            throughput: self.throughput(),
        };

        tracing::debug!(
            integration_id = %integration_id,
            response_time_ms,
            error_rate = sample.error_rate,
            "Performance sample"
        );

        if let Ok(mut samples) = self.samples.lock() {
            if samples.len() >= MAX_SAMPLES {
                samples.pop_front();
            }
            samples.push_back(sample.clone());
        }
        sample
    }

    /// Samples for one integration, oldest first.
    pub fn samples_for(&self, integration_id: &str) -> Vec<PerformanceSample> {
        self.samples
            .lock()
            .map(|samples| {
                samples
                    .iter()
                    .filter(|s| s.integration_id == integration_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Most recent sample for one integration.
    pub fn latest(&self, integration_id: &str) -> Option<PerformanceSample> {
        self.samples_for(integration_id).pop()
    }

    fn counters(&self) -> Counters {
        self.counters.lock().map(|c| *c).unwrap_or_default()
    }

    fn process_usage(&self) -> (f64, f32) {
        let Ok(mut sys) = self.system.lock() else {
            return (0.0, 0.0);
        };
        let pid = Pid::from_u32(std::process::id());
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        match sys.process(pid) {
            Some(process) => (process.memory() as f64 / 1_048_576.0, process.cpu_usage()),
            None => (0.0, 0.0),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
