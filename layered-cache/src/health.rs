//! Health reporting for the distributed tier
//!
//! The distributed tier is pinged, and the round trip classifies it as
//! healthy, degraded (responding but slow) or unhealthy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for health check behavior
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Bound on a single ping
    pub timeout: Duration,
    /// Additional attempts after a failed ping
    pub max_retries: u32,
    /// Delay between attempts
    pub retry_delay: Duration,
    /// Response time above which the tier is reported degraded (in milliseconds)
    pub degraded_threshold_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            max_retries: 2,
            retry_delay: Duration::from_millis(200),
            degraded_threshold_ms: 100,
        }
    }
}

/// Health status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Backend is reachable and responsive
    Healthy,
    /// Backend is reachable but slow (above degraded threshold)
    Degraded,
    /// Backend is not reachable; the cache runs on Tier 1 and the loader
    Unhealthy,
}

impl HealthStatus {
    /// Convert to HTTP status code equivalent
    pub fn to_http_status_code(&self) -> u16 {
        match self {
            HealthStatus::Healthy => 200,
            HealthStatus::Degraded => 200,
            HealthStatus::Unhealthy => 503,
        }
    }

    /// Check if status is healthy or degraded (operational)
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

/// Detailed health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Overall health status
    pub status: HealthStatus,
    /// Response time of the last attempt in milliseconds
    pub response_time_ms: u64,
    /// Distributed backend name
    pub backend: String,
    /// Timestamp of the health check
    pub timestamp: DateTime<Utc>,
    /// Error message (if unhealthy)
    pub error: Option<String>,
    /// Whether the circuit breaker was open after the check
    pub breaker_open: bool,
    /// Number of retry attempts made
    pub retry_count: u32,
    /// Entries currently held by Tier 1
    pub local_entries: usize,
}

impl HealthCheckResult {
    pub(crate) fn healthy(response_time: Duration, backend: &str, degraded_threshold_ms: u64) -> Self {
        let response_time_ms = response_time.as_millis() as u64;
        let status = if response_time_ms > degraded_threshold_ms {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            response_time_ms,
            backend: backend.to_string(),
            timestamp: Utc::now(),
            error: None,
            breaker_open: false,
            retry_count: 0,
            local_entries: 0,
        }
    }

    pub(crate) fn unhealthy(response_time: Duration, backend: &str, error: &str) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            response_time_ms: response_time.as_millis() as u64,
            backend: backend.to_string(),
            timestamp: Utc::now(),
            error: Some(error.to_string()),
            breaker_open: false,
            retry_count: 0,
            local_entries: 0,
        }
    }
}
