//! # Application State Management
//!
//! Shared state handed to every HTTP handler through `web::Data`.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: Every actix worker gets a clone of `AppState`; the clones share the
//!   router, configuration and metrics instead of copying them
//!
//! ### RwLock (Reader-Writer Lock)
//! - **Purpose**: Many readers OR one writer. Metrics are written on every request and
//!   read by the metrics endpoint.
//! - **Poisoning**: a panic while holding the lock poisons it. Counters stay usable after
//!   a poisoned lock, so the guard is recovered with `PoisonError::into_inner`.
//!
//! ### What is NOT behind a lock
//! - The [`EventRouter`] and its collaborators are immutable after startup. Preference
//!   writes synchronise inside the store.

use crate::config::AppConfig;
use crate::skill::router::{EventRouter, Route};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    /// Effective configuration, fixed at startup.
    pub config: Arc<AppConfig>,

    pub router: Arc<EventRouter>,

    /// Performance metrics (constantly being updated by requests)
    pub metrics: Arc<RwLock<AppMetrics>>,

    pub start_time: Instant,
}

/// Counters collected across all HTTP requests and skill events.
///
/// ## What is tracked:
/// - **request_count** / **error_count**: every HTTP request, and those that failed
/// - **event_count**: skill events that reached the router
/// - **route_counts**: events per route (handler name, `fallback`, `catch_all`)
/// - **endpoint_metrics**: per-endpoint timing
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub event_count: u64,
    pub route_counts: HashMap<String, u64>,
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

impl AppMetrics {
    /// Events answered by the catch-all apology.
    pub fn fault_count(&self) -> u64 {
        self.route_counts
            .get(Route::CatchAll.as_str())
            .copied()
            .unwrap_or(0)
    }
}

/// Detailed performance metrics for a specific API endpoint.
///
/// ## Performance calculations:
/// - **Average response time**: total_duration_ms / request_count
/// - **Error rate**: error_count / request_count
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, router: EventRouter) -> Self {
        Self {
            config: Arc::new(config),
            router: Arc::new(router),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    fn metrics_mut(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by the metrics middleware for every request.
    pub fn increment_request_count(&self) {
        self.metrics_mut().request_count += 1;
    }

    /// Called for every request that ends in a 4xx/5xx or an error.
    pub fn increment_error_count(&self) {
        self.metrics_mut().error_count += 1;
    }

    /// Record timing for one request to `endpoint` (e.g. "POST /api/v1/events").
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_mut();
        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Count one routed skill event.
    pub fn record_dispatch(&self, route: Route) {
        let mut metrics = self.metrics_mut();
        metrics.event_count += 1;
        *metrics
            .route_counts
            .entry(route.as_str().to_string())
            .or_default() += 1;
    }

    /// Consistent copy of the metrics; the lock is released before serialization.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate between 0.0 and 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
