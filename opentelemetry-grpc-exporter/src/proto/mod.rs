//! Jaeger model and collector service, generated from the `jaeger.api_v2` protos.
//!
//! OTLP message types come from [`opentelemetry_proto`].

#[allow(missing_docs, unreachable_pub, clippy::all)]
#[rustfmt::skip]
#[path = "jaeger.api_v2.rs"]
pub mod jaeger_api_v2;
