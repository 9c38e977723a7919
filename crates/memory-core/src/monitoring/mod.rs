//! Counters, gauges, latency histograms, and alert thresholds (C11, spec §4.11)
//!
//! A single `Monitor` handle is shared across every component; each
//! records under its own named key so a dashboard or `stats` CLI
//! command can render the whole engine's health from one struct.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::Clock;

#[derive(Debug, Default, serde::Serialize)]
pub struct CounterSnapshot {
    pub value: u64,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct GaugeSnapshot {
    pub value: i64,
}

/// Running count + sum for a latency series; `mean_ms` is derived on
/// snapshot rather than stored, so hot-path recording stays two atomic
/// adds.
#[derive(Debug, Default, serde::Serialize)]
pub struct LatencySnapshot {
    pub count: u64,
    pub mean_ms: f64,
}

struct Latency {
    count: AtomicU64,
    sum_us: AtomicU64,
}

impl Default for Latency {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_us: AtomicU64::new(0),
        }
    }
}

/// A named alert condition: fires once a threshold is crossed, then
/// suppresses repeats until `cooldown_secs` has elapsed, and
/// auto-resolves the next time the check passes (spec §4.11: "named
/// alert thresholds with cool-down auto-resolve").
struct AlertState {
    cooldown_secs: i64,
    last_fired_at: Option<i64>,
    active: bool,
}

pub struct Monitor {
    counters: DashMap<String, AtomicU64>,
    gauges: DashMap<String, AtomicI64>,
    latencies: DashMap<String, Latency>,
    alerts: Mutex<std::collections::HashMap<String, AlertState>>,
    clock: Arc<dyn Clock>,
}

impl Monitor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            gauges: DashMap::new(),
            latencies: DashMap::new(),
            alerts: Mutex::new(std::collections::HashMap::new()),
            clock,
        }
    }

    pub fn incr(&self, name: &str, by: u64) {
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(by, Ordering::Relaxed);
    }

    pub fn counter(&self, name: &str) -> CounterSnapshot {
        let value = self.counters.get(name).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0);
        CounterSnapshot { value }
    }

    pub fn set_gauge(&self, name: &str, value: i64) {
        self.gauges
            .entry(name.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::Relaxed);
    }

    pub fn gauge(&self, name: &str) -> GaugeSnapshot {
        let value = self.gauges.get(name).map(|g| g.load(Ordering::Relaxed)).unwrap_or(0);
        GaugeSnapshot { value }
    }

    pub fn record_latency(&self, name: &str, duration: std::time::Duration) {
        let entry = self.latencies.entry(name.to_string()).or_default();
        entry.count.fetch_add(1, Ordering::Relaxed);
        entry.sum_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn latency(&self, name: &str) -> LatencySnapshot {
        match self.latencies.get(name) {
            Some(entry) => {
                let count = entry.count.load(Ordering::Relaxed);
                let sum_us = entry.sum_us.load(Ordering::Relaxed);
                LatencySnapshot {
                    count,
                    mean_ms: if count > 0 {
                        (sum_us as f64 / count as f64) / 1000.0
                    } else {
                        0.0
                    },
                }
            }
            None => LatencySnapshot::default(),
        }
    }

    /// Register an alert with its cooldown. Idempotent: calling twice
    /// with the same name keeps the first registration.
    pub fn register_alert(&self, name: &str, cooldown_secs: i64) {
        self.alerts.lock().entry(name.to_string()).or_insert(AlertState {
            cooldown_secs,
            last_fired_at: None,
            active: false,
        });
    }

    /// Evaluate a registered alert. Returns `true` the moment it
    /// transitions into firing (so callers only notify once per
    /// episode); a still-firing or still-quiet condition returns
    /// `false`. Auto-resolves (clears `active`) as soon as `condition`
    /// is false again.
    pub fn check_alert(&self, name: &str, condition: bool) -> bool {
        let now = self.clock.now_secs();
        let mut alerts = self.alerts.lock();
        let Some(state) = alerts.get_mut(name) else {
            return false;
        };

        if !condition {
            state.active = false;
            return false;
        }

        let on_cooldown = state
            .last_fired_at
            .map(|t| now - t < state.cooldown_secs)
            .unwrap_or(false);

        if state.active || on_cooldown {
            return false;
        }

        state.active = true;
        state.last_fired_at = Some(now);
        true
    }
}
