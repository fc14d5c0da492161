//! Per-subject send rate limiter

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::clock::{system_clock, Clock};
use crate::metrics::RateLimitMetrics;

use super::config::RateLimitConfig;
use super::window::FixedWindow;

/// Cap that denied a send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateCap {
    Hourly,
    Daily,
    Scope,
}

impl RateCap {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateCap::Hourly => "hourly",
            RateCap::Daily => "daily",
            RateCap::Scope => "scope",
        }
    }
}

impl fmt::Display for RateCap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Send authorized; counts are after consumption
    Allowed {
        hourly_count: u32,
        daily_count: u32,
        scope_count: Option<u32>,
    },
    /// Send denied; nothing was consumed
    Denied { cap: RateCap, limit: u32 },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }
}

/// Rate state for one subject
#[derive(Debug, Clone)]
struct SubjectWindows {
    hourly: FixedWindow,
    daily: FixedWindow,
    /// Lifetime counters per scope key
    scopes: HashMap<String, u32>,
}

impl SubjectWindows {
    fn new(now_ms: i64) -> Self {
        Self {
            hourly: FixedWindow::new(now_ms),
            daily: FixedWindow::new(now_ms),
            scopes: HashMap::new(),
        }
    }

    fn latest_start_ms(&self) -> i64 {
        self.hourly
            .window_start_ms()
            .max(self.daily.window_start_ms())
    }
}

/// Point-in-time view of one subject's counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectSnapshot {
    pub hourly_count: u32,
    pub hourly_window_start_ms: i64,
    pub daily_count: u32,
    pub daily_window_start_ms: i64,
    pub scopes: HashMap<String, u32>,
}

/// Rate limiter statistics
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub enabled: bool,
    pub tracked_subjects: usize,
    pub allowed_total: u64,
    pub denied_total: u64,
    pub max_per_hour: u32,
    pub max_per_day: u32,
    pub max_per_scope: u32,
}

/// In-memory send rate limiter.
///
/// Counters live in a `DashMap` keyed by subject. A check holds the entry's
/// shard lock for its whole read-then-write, so concurrent checks for the
/// same subject are serialized.
pub struct SendRateLimiter {
    subjects: DashMap<String, SubjectWindows>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    last_sweep_ms: AtomicI64,
    allowed_total: AtomicU64,
    denied_total: AtomicU64,
}

impl SendRateLimiter {
    /// Create a rate limiter using the system clock
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Create a rate limiter reading time from `clock`
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        Self {
            subjects: DashMap::new(),
            config,
            clock,
            last_sweep_ms: AtomicI64::new(now),
            allowed_total: AtomicU64::new(0),
            denied_total: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check all caps and consume one unit from each when they all pass.
    pub fn check_and_consume(&self, subject_key: &str, scope_key: Option<&str>) -> bool {
        self.check(subject_key, scope_key).is_allowed()
    }

    /// Detailed variant of [`check_and_consume`](Self::check_and_consume).
    pub fn check(&self, subject_key: &str, scope_key: Option<&str>) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::Allowed {
                hourly_count: 0,
                daily_count: 0,
                scope_count: None,
            };
        }

        let now = self.clock.now_millis();
        // Must run before taking the entry lock: a sweep locks every shard.
        self.maybe_sweep(now);

        let hour_ms = (self.config.hour_window_seconds * 1000) as i64;
        let day_ms = (self.config.day_window_seconds * 1000) as i64;

        let mut entry = self
            .subjects
            .entry(subject_key.to_string())
            .or_insert_with(|| SubjectWindows::new(now));
        let windows = entry.value_mut();

        let denied = if windows.hourly.current(now, hour_ms) >= self.config.max_per_hour {
            Some((RateCap::Hourly, self.config.max_per_hour))
        } else if windows.daily.current(now, day_ms) >= self.config.max_per_day {
            Some((RateCap::Daily, self.config.max_per_day))
        } else if scope_key
            .and_then(|scope| windows.scopes.get(scope))
            .is_some_and(|count| *count >= self.config.max_per_scope)
        {
            Some((RateCap::Scope, self.config.max_per_scope))
        } else {
            None
        };

        if let Some((cap, limit)) = denied {
            drop(entry);
            self.denied_total.fetch_add(1, Ordering::Relaxed);
            RateLimitMetrics::record_denied(cap.as_str());
            tracing::debug!(
                subject_key = %subject_key,
                scope_key = ?scope_key,
                cap = %cap,
                limit = limit,
                "Send denied by rate limiter"
            );
            return RateLimitResult::Denied { cap, limit };
        }

        windows.hourly.consume(now, hour_ms);
        windows.daily.consume(now, day_ms);
        let scope_count = scope_key.map(|scope| {
            let count = windows.scopes.entry(scope.to_string()).or_insert(0);
            *count += 1;
            *count
        });

        let result = RateLimitResult::Allowed {
            hourly_count: windows.hourly.count(),
            daily_count: windows.daily.count(),
            scope_count,
        };
        drop(entry);

        self.allowed_total.fetch_add(1, Ordering::Relaxed);
        RateLimitMetrics::record_allowed();
        result
    }

    /// Current counters for a subject, if tracked
    pub fn snapshot(&self, subject_key: &str) -> Option<SubjectSnapshot> {
        self.subjects.get(subject_key).map(|entry| SubjectSnapshot {
            hourly_count: entry.hourly.count(),
            hourly_window_start_ms: entry.hourly.window_start_ms(),
            daily_count: entry.daily.count(),
            daily_window_start_ms: entry.daily.window_start_ms(),
            scopes: entry.scopes.clone(),
        })
    }

    fn maybe_sweep(&self, now: i64) {
        let interval_ms = (self.config.sweep_interval_seconds * 1000) as i64;
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        if now - last < interval_ms {
            return;
        }
        // Only one caller wins the right to sweep for this interval
        if self
            .last_sweep_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.sweep_at(now);
        }
    }

    /// Remove subjects whose windows are all older than the longest window.
    ///
    /// Returns the number of subjects removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        self.last_sweep_ms.store(now, Ordering::Relaxed);
        self.sweep_at(now)
    }

    fn sweep_at(&self, now: i64) -> usize {
        let max_age = self.config.longest_window_ms();
        let before = self.subjects.len();

        self.subjects
            .retain(|_, windows| now - windows.latest_start_ms() <= max_age);

        let removed = before.saturating_sub(self.subjects.len());
        RateLimitMetrics::set_tracked_subjects(self.subjects.len());

        if removed > 0 {
            tracing::debug!(
                removed = removed,
                remaining = self.subjects.len(),
                "Evicted stale rate windows"
            );
        }

        removed
    }

    /// Number of tracked subjects
    pub fn tracked_subjects(&self) -> usize {
        self.subjects.len()
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            enabled: self.config.enabled,
            tracked_subjects: self.subjects.len(),
            allowed_total: self.allowed_total.load(Ordering::Relaxed),
            denied_total: self.denied_total.load(Ordering::Relaxed),
            max_per_hour: self.config.max_per_hour,
            max_per_day: self.config.max_per_day,
            max_per_scope: self.config.max_per_scope,
        }
    }
}
