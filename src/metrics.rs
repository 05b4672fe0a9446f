//! Performance metrics collection (spec §6 "Observability outputs"). Not a
//! wire protocol — a small accumulator the orchestrator updates per rule
//! evaluation and that callers can snapshot and aggregate externally (the
//! *analyzer* that turns these into recommendations is explicitly out of
//! scope, §1).
//!
//! `average_memory`/`average_complexity` are implementation-defined proxies
//! (allocation count, AST node count) since the source system's exact
//! definitions aren't specified — see DESIGN.md.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    pub rule_name: String,
    pub evaluation_count: u64,
    pub total_time: Duration,
    pub min_time: Duration,
    pub max_time: Duration,
    total_memory: u64,
    total_complexity: u64,
    pub failed_evaluations: u64,
}

impl PerformanceMetrics {
    pub fn new(rule_name: impl Into<String>) -> Self {
        PerformanceMetrics {
            rule_name: rule_name.into(),
            evaluation_count: 0,
            total_time: Duration::ZERO,
            min_time: Duration::MAX,
            max_time: Duration::ZERO,
            total_memory: 0,
            total_complexity: 0,
            failed_evaluations: 0,
        }
    }

    fn record(&mut self, elapsed: Duration, succeeded: bool, memory_proxy: u64, complexity_proxy: u64) {
        self.evaluation_count += 1;
        self.total_time += elapsed;
        self.min_time = self.min_time.min(elapsed);
        self.max_time = self.max_time.max(elapsed);
        self.total_memory += memory_proxy;
        self.total_complexity += complexity_proxy;
        if !succeeded {
            self.failed_evaluations += 1;
        }
    }

    pub fn average_time(&self) -> Duration {
        if self.evaluation_count == 0 {
            Duration::ZERO
        } else {
            self.total_time / self.evaluation_count as u32
        }
    }

    pub fn average_memory(&self) -> f64 {
        if self.evaluation_count == 0 {
            0.0
        } else {
            self.total_memory as f64 / self.evaluation_count as f64
        }
    }

    pub fn average_complexity(&self) -> f64 {
        if self.evaluation_count == 0 {
            0.0
        } else {
            self.total_complexity as f64 / self.evaluation_count as f64
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.evaluation_count == 0 {
            0.0
        } else {
            (self.evaluation_count - self.failed_evaluations) as f64 / self.evaluation_count as f64
        }
    }
}

/// A process-wide (or per-`Evaluator`) table of `PerformanceMetrics` keyed
/// by rule name, updated as each rule is evaluated.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    inner: Mutex<HashMap<String, PerformanceMetrics>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        MetricsRegistry::default()
    }

    pub fn record(&self, rule_name: &str, elapsed: Duration, succeeded: bool, memory_proxy: u64, complexity_proxy: u64) {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        guard
            .entry(rule_name.to_string())
            .or_insert_with(|| PerformanceMetrics::new(rule_name))
            .record(elapsed, succeeded, memory_proxy, complexity_proxy);
    }

    pub fn get(&self, rule_name: &str) -> Option<PerformanceMetrics> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).get(rule_name).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, PerformanceMetrics> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}
