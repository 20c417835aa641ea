//! The periodic instrumented HTTP probe.
//!
//! Each cycle issues one GET against the fixed target inside a parent
//! client span, injects the trace context into the outgoing headers,
//! reads the response body inside a child span, and records the
//! declared content length as a span event. Send failures are recorded
//! on the parent span, read failures on the child span alone, and
//! neither aborts the loop; the next cycle starts after the fixed
//! sleep. Span parentage is carried in an
//! explicit [`Context`] value rather than thread-local ambience, so
//! the span tree is deterministic under test.

use std::sync::{Arc, Mutex};

use http::{Method, Request};
use http_body_util::Full;
use hyper::body::Bytes;
use opentelemetry::metrics::{Meter, ObservableGauge};
use opentelemetry::trace::{Span, SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::SdkTracer;
use opentelemetry_semantic_conventions::attribute::{
    HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, URL_FULL,
};
use sysinfo::System;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ProbeConfig;
use crate::telemetry::Telemetry;
use crate::transport::{HttpTransport, TransportError, TransportResponse};

/// Name of the free-memory gauge instrument.
pub const FREE_MEMORY_GAUGE: &str = "process.memory.free";

/// Parent span covering one request/response exchange.
pub const REQUEST_SPAN: &str = "http_get";

/// Child span covering the body read.
pub const BODY_READ_SPAN: &str = "read_response_body";

/// Event recorded on the child span; its `result` attribute carries
/// the declared content length, -1 when the response did not declare
/// one.
pub const BODY_READ_EVENT: &str = "body_read";
const RESULT_KEY: &str = "result";

/// Periodic instrumented HTTP probe. Runs until its cancellation
/// token fires; no cycle state survives past its iteration.
pub struct Probe {
    telemetry: Arc<Telemetry>,
    tracer: SdkTracer,
    transport: Arc<dyn HttpTransport>,
    config: ProbeConfig,
    // Keeps the gauge callback registered for the probe's lifetime.
    _free_memory: ObservableGauge<u64>,
}

impl Probe {
    pub fn new(
        telemetry: Arc<Telemetry>,
        transport: Arc<dyn HttpTransport>,
        config: ProbeConfig,
    ) -> Self {
        let tracer = telemetry.tracer();
        let free_memory = register_free_memory_gauge(&telemetry.meter());
        Self {
            telemetry,
            tracer,
            transport,
            config,
            _free_memory: free_memory,
        }
    }

    /// Runs cycles until `cancel` fires. Cancellation is raced against
    /// both the cycle and the sleep, so the loop winds down promptly
    /// even with a request in flight.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.run_cycle() => {
                    if let Err(err) = result {
                        // Unexpected failure outside the instrumented
                        // path; log it and keep the loop alive.
                        error!(error = %err, "probe cycle aborted");
                    }
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
        info!("probe loop stopped");
    }

    /// One full cycle: request, response, spans, log line. Transport
    /// errors are absorbed into span status; only request construction
    /// can return an error here.
    pub async fn run_cycle(&self) -> Result<(), TransportError> {
        let mut request = Request::builder()
            .method(Method::GET)
            .uri(self.config.target.as_str())
            .body(Full::new(Bytes::new()))?;

        let parent = self
            .tracer
            .span_builder(REQUEST_SPAN)
            .with_kind(SpanKind::Client)
            .with_attributes([
                KeyValue::new("component", "http"),
                KeyValue::new(HTTP_REQUEST_METHOD, "GET"),
                KeyValue::new(URL_FULL, self.config.target.clone()),
            ])
            .start_with_context(&self.tracer, &Context::new());
        let cx = Context::new().with_span(parent);

        self.telemetry.inject_context(&cx, request.headers_mut());

        let sent = match tokio::time::timeout(
            self.config.request_timeout,
            self.transport.send(request),
        )
        .await
        {
            Ok(sent) => sent,
            Err(_) => Err(TransportError::Connect("request timed out".to_string())),
        };

        let mut status: u16 = 0;
        let mut body = String::new();
        match sent {
            Ok(response) => {
                status = response.status();
                match self.read_body(&cx, response).await {
                    Ok(text) => body = text,
                    // The read failure stays on the child span; a
                    // response was obtained, so the exchange itself
                    // succeeded.
                    Err(err) => warn!(error = %err, "response body read failed"),
                }
                cx.span().set_status(Status::Ok);
            }
            Err(err) => {
                warn!(error = %err, "request failed");
                cx.span().set_status(Status::error(format!("HTTP Code: {status}")));
            }
        }

        cx.span()
            .set_attribute(KeyValue::new(HTTP_RESPONSE_STATUS_CODE, i64::from(status)));
        info!(status, body = %body, "probe cycle finished");
        cx.span().end();
        Ok(())
    }

    /// Reads the response body inside a child span parented on the
    /// cycle context. The child is always ended, before the parent.
    async fn read_body(
        &self,
        cycle_cx: &Context,
        response: TransportResponse,
    ) -> Result<String, TransportError> {
        let mut child = self
            .tracer
            .span_builder(BODY_READ_SPAN)
            .with_kind(SpanKind::Internal)
            .start_with_context(&self.tracer, cycle_cx);

        let declared_length = response.content_length().map_or(-1, |length| length as i64);
        let result = response.read_body().await;
        match &result {
            Ok(_) => {
                child.add_event(
                    BODY_READ_EVENT,
                    vec![KeyValue::new(RESULT_KEY, declared_length)],
                );
                child.set_status(Status::Ok);
            }
            Err(_) => child.set_status(Status::error("")),
        }
        child.end();
        result
    }
}

/// Registers the free-memory gauge. The callback runs on the metric
/// reader's schedule and owns its [`System`] handle exclusively, so it
/// shares no state with the probe loop.
fn register_free_memory_gauge(meter: &Meter) -> ObservableGauge<u64> {
    let system = Mutex::new(System::new());
    meter
        .u64_observable_gauge(FREE_MEMORY_GAUGE)
        .with_description("Free memory reported by the host.")
        .with_unit("By")
        .with_callback(move |observer| {
            if let Ok(mut system) = system.lock() {
                system.refresh_memory();
                observer.observe(system.free_memory(), &[]);
            }
        })
        .build()
}
