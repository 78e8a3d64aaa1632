//! Simple metrics module for the Meta-Broker service
//!
//! This module provides a straightforward API for recording metrics using
//! the standard Prometheus naming conventions.

use std::fmt;

use tracing::info;

const DEFAULT_METRICS_PORT: u16 = 9898;

/// Enum representing all metric names used in the system
/// This eliminates magic strings and provides compile-time safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Catalog metrics
    CatalogRefreshSuccess,
    CatalogRefreshError,
    CatalogRefreshDuration,
    CatalogRecords,
    CatalogFallbackServed,

    // Lookup metrics
    LookupHits,
    LookupFallbackHits,
    LookupMisses,

    // Broker metrics
    BrokerQueriesSuccess,
    BrokerQueriesError,
    BrokerQueriesSkipped,
    BrokerQueryDuration,

    // Normalize metrics
    NormalizeObservations,
    NormalizeNoMatch,
}

impl MetricName {
    /// Get the metric name as a string (convenience method)
    pub fn as_str(&self) -> &'static str {
        match self {
            // Catalog metrics
            MetricName::CatalogRefreshSuccess => "metabroker_catalog_refresh_success_total",
            MetricName::CatalogRefreshError => "metabroker_catalog_refresh_error_total",
            MetricName::CatalogRefreshDuration => "metabroker_catalog_refresh_duration_seconds",
            MetricName::CatalogRecords => "metabroker_catalog_records",
            MetricName::CatalogFallbackServed => "metabroker_catalog_fallback_served_total",

            // Lookup metrics
            MetricName::LookupHits => "metabroker_lookup_hits_total",
            MetricName::LookupFallbackHits => "metabroker_lookup_fallback_hits_total",
            MetricName::LookupMisses => "metabroker_lookup_misses_total",

            // Broker metrics
            MetricName::BrokerQueriesSuccess => "metabroker_broker_queries_success_total",
            MetricName::BrokerQueriesError => "metabroker_broker_queries_error_total",
            MetricName::BrokerQueriesSkipped => "metabroker_broker_queries_skipped_total",
            MetricName::BrokerQueryDuration => "metabroker_broker_query_duration_seconds",

            // Normalize metrics
            MetricName::NormalizeObservations => "metabroker_normalize_observations_total",
            MetricName::NormalizeNoMatch => "metabroker_normalize_no_match_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Initialize the metrics system with a Prometheus scrape endpoint.
/// The port comes from METABROKER_METRICS_PORT when set.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let port: u16 = std::env::var("METABROKER_METRICS_PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_METRICS_PORT);
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))?;
    info!(port, "Metrics system initialized");
    Ok(())
}

// ============================================================================
// Catalog Metrics
// ============================================================================

pub mod catalog {
    use super::MetricName;

    /// Record a completed refresh and the record count it produced
    pub fn refresh_success(records: usize) {
        ::metrics::counter!(MetricName::CatalogRefreshSuccess.as_str()).increment(1);
        ::metrics::gauge!(MetricName::CatalogRecords.as_str()).set(records as f64);
    }

    /// Record a failed refresh
    pub fn refresh_error() {
        ::metrics::counter!(MetricName::CatalogRefreshError.as_str()).increment(1);
    }

    /// Record refresh duration
    pub fn refresh_duration(secs: f64) {
        ::metrics::histogram!(MetricName::CatalogRefreshDuration.as_str()).record(secs);
    }

    /// Record a request answered from the built-in offline catalog
    pub fn fallback_served() {
        ::metrics::counter!(MetricName::CatalogFallbackServed.as_str()).increment(1);
    }
}

// ============================================================================
// Lookup Metrics
// ============================================================================

pub mod lookup {
    use super::MetricName;

    /// Record a name resolved from the cached catalog
    pub fn hit() {
        ::metrics::counter!(MetricName::LookupHits.as_str()).increment(1);
    }

    /// Record a name resolved from the historical fallback table
    pub fn fallback_hit() {
        ::metrics::counter!(MetricName::LookupFallbackHits.as_str()).increment(1);
    }

    /// Record a name that matched nothing
    pub fn miss() {
        ::metrics::counter!(MetricName::LookupMisses.as_str()).increment(1);
    }
}

// ============================================================================
// Broker Metrics
// ============================================================================

pub mod brokers {
    use super::MetricName;

    /// Record a broker query that returned a body
    pub fn query_success(broker: &str) {
        ::metrics::counter!(
            MetricName::BrokerQueriesSuccess.as_str(),
            "broker" => broker.to_string()
        )
        .increment(1);
    }

    /// Record a broker query that errored or timed out
    pub fn query_error(broker: &str) {
        ::metrics::counter!(
            MetricName::BrokerQueriesError.as_str(),
            "broker" => broker.to_string()
        )
        .increment(1);
    }

    /// Record a broker skipped before any request went out
    pub fn skipped(broker: &str) {
        ::metrics::counter!(
            MetricName::BrokerQueriesSkipped.as_str(),
            "broker" => broker.to_string()
        )
        .increment(1);
    }

    /// Record one broker query duration
    pub fn query_duration(broker: &str, secs: f64) {
        ::metrics::histogram!(
            MetricName::BrokerQueryDuration.as_str(),
            "broker" => broker.to_string()
        )
        .record(secs);
    }
}

// ============================================================================
// Normalize Metrics
// ============================================================================

pub mod normalize {
    use super::MetricName;

    /// Record a raw body normalized into an observation
    pub fn observation(broker: &str) {
        ::metrics::counter!(
            MetricName::NormalizeObservations.as_str(),
            "broker" => broker.to_string()
        )
        .increment(1);
    }

    /// Record a raw body that held no object
    pub fn no_match(broker: &str) {
        ::metrics::counter!(
            MetricName::NormalizeNoMatch.as_str(),
            "broker" => broker.to_string()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_follow_prometheus_conventions() {
        let counters = [
            MetricName::CatalogRefreshSuccess,
            MetricName::CatalogRefreshError,
            MetricName::CatalogFallbackServed,
            MetricName::LookupHits,
            MetricName::LookupFallbackHits,
            MetricName::LookupMisses,
            MetricName::BrokerQueriesSuccess,
            MetricName::BrokerQueriesError,
            MetricName::BrokerQueriesSkipped,
            MetricName::NormalizeObservations,
            MetricName::NormalizeNoMatch,
        ];
        for name in counters {
            assert!(name.as_str().starts_with("metabroker_"));
            assert!(name.as_str().ends_with("_total"));
        }
        assert!(MetricName::CatalogRefreshDuration
            .as_str()
            .ends_with("_seconds"));
        assert!(MetricName::BrokerQueryDuration
            .as_str()
            .ends_with("_seconds"));
    }
}
