//! A pair of demo programs showing OpenTelemetry instrumentation of
//! plain HTTP traffic:
//!
//! - [`server`] — a single-route echo server that logs request
//!   metadata and answers `This is the response at <URI>`.
//! - [`probe`] — a periodic HTTP GET loop that wraps each request in a
//!   client span, wraps the body read in a child span, records the
//!   declared content length as a span event, and samples the host's
//!   free memory through an observable gauge.
//!
//! Spans and metrics are exported over OTLP/gRPC by the [`telemetry`]
//! client, which owns the provider lifecycle explicitly: the binaries
//! construct it at startup, pass it into the probe, and shut it down
//! (flushing buffered telemetry) once the run loop has been cancelled.

pub mod config;
pub mod probe;
pub mod server;
pub mod telemetry;
pub mod transport;
