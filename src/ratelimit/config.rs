//! Rate limiting configuration

use serde::Deserialize;

/// Configuration for notification rate limiting
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Maximum sends per subject within one hourly window
    #[serde(default = "default_max_per_hour")]
    pub max_per_hour: u32,
    /// Maximum sends per subject within one daily window
    #[serde(default = "default_max_per_day")]
    pub max_per_day: u32,
    /// Maximum sends per scope, regardless of time
    #[serde(default = "default_max_per_scope")]
    pub max_per_scope: u32,
    /// Length of the short window in seconds
    #[serde(default = "default_hour_window")]
    pub hour_window_seconds: u64,
    /// Length of the long window in seconds
    #[serde(default = "default_day_window")]
    pub day_window_seconds: u64,
    /// Minimum time between opportunistic eviction sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_max_per_hour() -> u32 {
    10
}

fn default_max_per_day() -> u32 {
    50
}

fn default_max_per_scope() -> u32 {
    5
}

fn default_hour_window() -> u64 {
    3_600
}

fn default_day_window() -> u64 {
    86_400
}

fn default_sweep_interval() -> u64 {
    300 // 5 minutes
}

impl RateLimitConfig {
    /// Longest configured window in milliseconds
    pub fn longest_window_ms(&self) -> i64 {
        (self.hour_window_seconds.max(self.day_window_seconds) * 1000) as i64
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_per_hour: default_max_per_hour(),
            max_per_day: default_max_per_day(),
            max_per_scope: default_max_per_scope(),
            hour_window_seconds: default_hour_window(),
            day_window_seconds: default_day_window(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}
