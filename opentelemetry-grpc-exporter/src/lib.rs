//! gRPC exporters for the OpenTelemetry SDK.
//!
//! This crate ships two exporters that plug into the `opentelemetry_sdk`
//! pipelines:
//!
//! * [`JaegerExporter`], a [`SpanExporter`] sending span batches to a Jaeger
//!   collector through `jaeger.api_v2.CollectorService/PostSpans`.
//! * [`LogExporter`], a [`LogExporter`][sdk-log-exporter] sending log batches
//!   to an OTLP receiver through `opentelemetry.proto.collector.logs.v1.LogsService/Export`.
//!
//! Every non-empty batch handed over by the SDK becomes exactly one unary RPC.
//! Failed batches are reported back to the SDK and never retried.
//!
//! [`SpanExporter`]: opentelemetry_sdk::trace::SpanExporter
//! [sdk-log-exporter]: opentelemetry_sdk::logs::LogExporter
//!
//! # Quickstart
//!
//! ```no_run
//! use opentelemetry::trace::{Tracer, TracerProvider as _};
//! use opentelemetry_grpc_exporter::{JaegerExporter, WithExportConfig, WithTonicConfig};
//! use opentelemetry_sdk::trace::SdkTracerProvider;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let exporter = JaegerExporter::builder()
//!     .with_endpoint("localhost:14250")
//!     .with_insecure(true)
//!     .with_service_name("checkout")
//!     .build()?;
//!
//! let provider = SdkTracerProvider::builder()
//!     .with_batch_exporter(exporter)
//!     .build();
//!
//! provider.tracer("my-app").in_span("doing_work", |_cx| {
//!     // Traced app logic here...
//! });
//!
//! provider.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Values set on a builder win over environment variables, which win over the
//! defaults.
//!
//! | Variable | Exporter | Default |
//! |---|---|---|
//! | [`OTEL_EXPORTER_JAEGER_ENDPOINT`] | Jaeger | `localhost:14250` |
//! | [`OTEL_EXPORTER_JAEGER_TIMEOUT`] | Jaeger | 10000 ms |
//! | [`OTEL_EXPORTER_JAEGER_CERTIFICATE`] | Jaeger | none |
//! | [`OTEL_EXPORTER_OTLP_LOGS_ENDPOINT`], [`OTEL_EXPORTER_OTLP_ENDPOINT`] | Log | `localhost:4317` |
//! | [`OTEL_EXPORTER_OTLP_LOGS_TIMEOUT`], [`OTEL_EXPORTER_OTLP_TIMEOUT`] | Log | 10000 ms |
//! | [`OTEL_EXPORTER_OTLP_LOGS_COMPRESSION`], [`OTEL_EXPORTER_OTLP_COMPRESSION`] | Log | none |
//! | [`OTEL_EXPORTER_OTLP_LOGS_HEADERS`], [`OTEL_EXPORTER_OTLP_HEADERS`] | Log | none |
//!
//! Endpoints given without a scheme use `https://` unless
//! [`WithTonicConfig::with_insecure`] is set. Secure endpoints need one of the
//! TLS features.
//!
//! # Feature Flags
//!
//! * `internal-logs` (default): emit the exporters' own diagnostics through `tracing`.
//! * `gzip-tonic`, `zstd-tonic`: request compression.
//! * `tls`, `tls-ring`, `tls-aws-lc`: TLS with the matching crypto backend.
//! * `tls-roots`, `tls-webpki-roots`: trust anchors for TLS.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(
    docsrs,
    feature(doc_cfg, doc_auto_cfg),
    deny(rustdoc::broken_intra_doc_links)
)]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

mod exporter;
mod jaeger;
mod logs;

pub mod proto;
pub mod transform;

pub use crate::exporter::{
    Compression, ExportConfig, ExporterBuildError, GrpcExporterBuilder, HasExportConfig,
    HasTonicConfig, TonicConfig, WithExportConfig, WithTonicConfig, OTEL_EXPORTER_OTLP_COMPRESSION,
    OTEL_EXPORTER_OTLP_ENDPOINT, OTEL_EXPORTER_OTLP_HEADERS, OTEL_EXPORTER_OTLP_TIMEOUT,
    OTEL_EXPORTER_TIMEOUT_DEFAULT,
};
pub use crate::jaeger::{
    JaegerExporter, JaegerExporterBuilder, OTEL_EXPORTER_JAEGER_CERTIFICATE,
    OTEL_EXPORTER_JAEGER_ENDPOINT, OTEL_EXPORTER_JAEGER_ENDPOINT_DEFAULT,
    OTEL_EXPORTER_JAEGER_TIMEOUT,
};
pub use crate::logs::{
    LogExporter, LogExporterBuilder, OTEL_EXPORTER_OTLP_LOGS_COMPRESSION,
    OTEL_EXPORTER_OTLP_LOGS_ENDPOINT, OTEL_EXPORTER_OTLP_LOGS_ENDPOINT_DEFAULT,
    OTEL_EXPORTER_OTLP_LOGS_HEADERS, OTEL_EXPORTER_OTLP_LOGS_TIMEOUT,
};
