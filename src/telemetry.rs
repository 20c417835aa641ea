//! Explicitly constructed telemetry client.
//!
//! Provider setup lives here, away from the instrumentation code. The
//! client object is handed to the probe at startup instead of being
//! registered process-globally, and the owning binary calls
//! [`Telemetry::shutdown`] after the run loop exits so buffered spans
//! and metrics are flushed before the process terminates.

use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::Context;
use opentelemetry_http::HeaderInjector;
use opentelemetry_otlp::{
    ExporterBuildError, MetricExporter, SpanExporter, WithExportConfig, WithTonicConfig,
};
use opentelemetry_sdk::error::OTelSdkError;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Sampler, SdkTracer, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use thiserror::Error;
use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::transport::{Channel, ClientTlsConfig};

use crate::config::{CollectorConfig, ExporterTransport};

/// Instrumentation scope name for the tracer and meter handed out by
/// the client.
pub const INSTRUMENTATION_NAME: &str = "otlp-http-probe";

/// gRPC metadata key carrying the collector credential.
const API_KEY_METADATA: &str = "api-key";

/// Failures while wiring the exporters.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("exporter setup failed: {0}")]
    Exporter(#[from] ExporterBuildError),
    #[error("invalid collector endpoint: {0}")]
    Endpoint(String),
    #[error("collector channel setup failed: {0}")]
    Channel(#[from] tonic::transport::Error),
    #[error("API key is not valid gRPC metadata")]
    ApiKey,
}

/// Owns the tracer and meter providers plus the W3C trace-context
/// propagator, and exposes the few capabilities the probe consumes.
#[derive(Debug)]
pub struct Telemetry {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    propagator: TraceContextPropagator,
}

impl Telemetry {
    /// Builds the OTLP/gRPC export pipelines described by `config`:
    /// always-on ratio sampling, batched span export and a periodic
    /// metric reader, both bounded by the configured export timeout.
    /// Finished spans are additionally printed to stdout so the demo
    /// is observable without a collector.
    pub fn init(config: &CollectorConfig) -> Result<Self, TelemetryError> {
        let resource = Resource::builder()
            .with_service_name(config.service_name.clone())
            .build();

        let tracer_provider = SdkTracerProvider::builder()
            .with_sampler(Sampler::TraceIdRatioBased(1.0))
            .with_resource(resource.clone())
            .with_batch_exporter(span_exporter(config)?)
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();

        let reader = PeriodicReader::builder(metric_exporter(config)?)
            .with_interval(config.metric_interval)
            .build();
        let meter_provider = SdkMeterProvider::builder()
            .with_reader(reader)
            .with_resource(resource)
            .build();

        Ok(Self::from_providers(tracer_provider, meter_provider))
    }

    /// Wires caller-supplied providers. Tests use this seam to install
    /// in-memory exporters.
    pub fn from_providers(
        tracer_provider: SdkTracerProvider,
        meter_provider: SdkMeterProvider,
    ) -> Self {
        Self {
            tracer_provider,
            meter_provider,
            propagator: TraceContextPropagator::new(),
        }
    }

    /// Tracer scoped to this crate's instrumentation name.
    pub fn tracer(&self) -> SdkTracer {
        self.tracer_provider.tracer(INSTRUMENTATION_NAME)
    }

    /// Meter scoped to this crate's instrumentation name.
    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(INSTRUMENTATION_NAME)
    }

    /// Writes the trace context carried by `cx` into an outgoing
    /// request's header map.
    pub fn inject_context(&self, cx: &Context, headers: &mut http::HeaderMap) {
        self.propagator
            .inject_context(cx, &mut HeaderInjector(headers));
    }

    /// Flushes pending spans and metrics without shutting down.
    pub fn force_flush(&self) -> Result<(), OTelSdkError> {
        self.tracer_provider.force_flush()?;
        self.meter_provider.force_flush()?;
        Ok(())
    }

    /// Flushes and stops both providers. Must run after the probe loop
    /// has exited so nothing records into a closed pipeline.
    pub fn shutdown(&self) -> Result<(), OTelSdkError> {
        self.tracer_provider.shutdown()?;
        self.meter_provider.shutdown()?;
        Ok(())
    }
}

fn metadata(config: &CollectorConfig) -> Result<MetadataMap, TelemetryError> {
    let mut metadata = MetadataMap::new();
    if let Some(api_key) = &config.api_key {
        let value: MetadataValue<_> = api_key.parse().map_err(|_| TelemetryError::ApiKey)?;
        metadata.insert(API_KEY_METADATA, value);
    }
    Ok(metadata)
}

/// Explicit TLS channel to the collector. The channel timeout must
/// match the exporter timeout, which the callers below guarantee.
fn channel(config: &CollectorConfig) -> Result<Channel, TelemetryError> {
    let endpoint = Channel::from_shared(config.endpoint.clone())
        .map_err(|err| TelemetryError::Endpoint(err.to_string()))?
        .tls_config(ClientTlsConfig::new().with_native_roots())?
        .timeout(config.export_timeout);
    Ok(endpoint.connect_lazy())
}

fn span_exporter(config: &CollectorConfig) -> Result<SpanExporter, TelemetryError> {
    let builder = SpanExporter::builder()
        .with_tonic()
        .with_metadata(metadata(config)?)
        .with_timeout(config.export_timeout);
    let exporter = match config.transport {
        ExporterTransport::GrpcChannel => builder.with_channel(channel(config)?).build()?,
        ExporterTransport::Grpc => builder
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_endpoint(config.endpoint.clone())
            .build()?,
    };
    Ok(exporter)
}

fn metric_exporter(config: &CollectorConfig) -> Result<MetricExporter, TelemetryError> {
    let builder = MetricExporter::builder()
        .with_tonic()
        .with_metadata(metadata(config)?)
        .with_timeout(config.export_timeout);
    let exporter = match config.transport {
        ExporterTransport::GrpcChannel => builder.with_channel(channel(config)?).build()?,
        ExporterTransport::Grpc => builder
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_endpoint(config.endpoint.clone())
            .build()?,
    };
    Ok(exporter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_becomes_metadata_entry() {
        let config = CollectorConfig {
            api_key: Some("abc123".to_string()),
            ..CollectorConfig::default()
        };
        let metadata = metadata(&config).expect("valid key");
        assert_eq!(
            metadata.get(API_KEY_METADATA).map(|v| v.to_str().ok()),
            Some(Some("abc123"))
        );
    }

    #[test]
    fn missing_api_key_yields_empty_metadata() {
        let metadata = metadata(&CollectorConfig::default()).expect("no key is fine");
        assert!(metadata.get(API_KEY_METADATA).is_none());
    }

    #[tokio::test]
    async fn init_builds_stdout_and_otlp_pipelines() {
        // The channel is lazy and nothing is recorded, so building and
        // tearing down the full pipeline touches no network.
        let telemetry = Telemetry::init(&CollectorConfig::default()).expect("pipelines build");
        telemetry.shutdown().expect("clean shutdown with nothing buffered");
    }

    #[test]
    fn non_ascii_api_key_is_rejected() {
        let config = CollectorConfig {
            api_key: Some("clé\u{202e}".to_string()),
            ..CollectorConfig::default()
        };
        assert!(matches!(metadata(&config), Err(TelemetryError::ApiKey)));
    }
}
