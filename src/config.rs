//! Fixed endpoints and intervals for the demo pair, plus the `APIKEY`
//! credential lookup used by the collector exporters.

use std::env;
use std::time::Duration;

/// Environment variable holding the collector credential. Absence is
/// allowed; exports are then sent without an `api-key` entry.
pub const API_KEY_ENV: &str = "APIKEY";

/// OTLP/gRPC collector endpoint.
pub const COLLECTOR_ENDPOINT: &str = "https://otlp.nr-data.net:4317";

/// Upper bound on how long a single telemetry export may block.
pub const EXPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between metric collections pushed to the collector.
pub const METRIC_EXPORT_INTERVAL: Duration = Duration::from_millis(1000);

/// Service name reported in the exported resource.
pub const SERVICE_NAME: &str = "otlp-http-probe";

/// Port the echo server binds and the probe targets.
pub const SERVER_PORT: u16 = 8080;

/// URL the probe issues its periodic GET against.
pub const PROBE_TARGET: &str = "http://localhost:8080";

/// Pause between probe cycles.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Deadline for one probe GET. A hung request is abandoned after this
/// long so the cycle (and shutdown) can proceed.
pub const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How the OTLP exporters reach the collector. Both variants speak
/// gRPC; they differ in whether the transport channel is built
/// explicitly or left to the exporter builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExporterTransport {
    /// Explicitly constructed TLS channel, credential attached as gRPC
    /// metadata on every call.
    #[default]
    GrpcChannel,
    /// Endpoint-configured exporter with the credential as an
    /// `api-key` metadata header.
    Grpc,
}

/// Collector-facing settings consumed by [`crate::telemetry::Telemetry`].
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Collector endpoint, `https` scheme.
    pub endpoint: String,
    /// Credential sent with every export call, if configured.
    pub api_key: Option<String>,
    /// Channel construction strategy.
    pub transport: ExporterTransport,
    /// Per-export deadline.
    pub export_timeout: Duration,
    /// Periodic metric reader interval.
    pub metric_interval: Duration,
    /// Resource service name.
    pub service_name: String,
}

impl CollectorConfig {
    /// Builds the fixed demo configuration, picking the credential up
    /// from [`API_KEY_ENV`]. No validation is performed on the value.
    pub fn from_env() -> Self {
        Self {
            api_key: env::var(API_KEY_ENV).ok(),
            ..Self::default()
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoint: COLLECTOR_ENDPOINT.to_string(),
            api_key: None,
            transport: ExporterTransport::default(),
            export_timeout: EXPORT_TIMEOUT,
            metric_interval: METRIC_EXPORT_INTERVAL,
            service_name: SERVICE_NAME.to_string(),
        }
    }
}

/// Probe-loop settings consumed by [`crate::probe::Probe`].
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Target URL for the periodic GET.
    pub target: String,
    /// Pause between cycles.
    pub interval: Duration,
    /// Deadline for one GET, response included.
    pub request_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            target: PROBE_TARGET.to_string(),
            interval: PROBE_INTERVAL,
            request_timeout: PROBE_REQUEST_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_read_from_env() {
        temp_env::with_var(API_KEY_ENV, Some("secret"), || {
            let config = CollectorConfig::from_env();
            assert_eq!(config.api_key.as_deref(), Some("secret"));
        });
    }

    #[test]
    fn missing_api_key_is_allowed() {
        temp_env::with_var_unset(API_KEY_ENV, || {
            let config = CollectorConfig::from_env();
            assert!(config.api_key.is_none());
            assert_eq!(config.endpoint, COLLECTOR_ENDPOINT);
        });
    }
}
