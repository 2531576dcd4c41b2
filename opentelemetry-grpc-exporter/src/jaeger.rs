//! Jaeger - Span Exporter
//!
//! Defines a [JaegerExporter] to send spans to a Jaeger collector over gRPC
//! (`jaeger.api_v2.CollectorService/PostSpans`).

use std::fmt::Debug;
use std::time;

use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{SpanData, SpanExporter};
use opentelemetry_sdk::Resource;
use tonic::transport::Channel;

use crate::exporter::client::ExportClient;
use crate::exporter::{
    ExportConfig, ExporterBuildError, GrpcExporterBuilder, HasExportConfig, HasTonicConfig,
    SignalEnv, TonicConfig,
};
use crate::proto::jaeger_api_v2::{collector_service_client::CollectorServiceClient, PostSpansRequest};
use crate::transform::jaeger::JaegerEncoder;

/// Target to which the exporter is going to send spans, defaults to `localhost:14250`.
pub const OTEL_EXPORTER_JAEGER_ENDPOINT: &str = "OTEL_EXPORTER_JAEGER_ENDPOINT";
/// Default target to which the exporter is going to send spans.
pub const OTEL_EXPORTER_JAEGER_ENDPOINT_DEFAULT: &str = "localhost:14250";
/// Maximum time, in milliseconds, the exporter will wait for each batch export.
pub const OTEL_EXPORTER_JAEGER_TIMEOUT: &str = "OTEL_EXPORTER_JAEGER_TIMEOUT";
/// Path to a PEM encoded CA certificate used to verify the collector.
pub const OTEL_EXPORTER_JAEGER_CERTIFICATE: &str = "OTEL_EXPORTER_JAEGER_CERTIFICATE";

const JAEGER_ENV: SignalEnv = SignalEnv {
    endpoint: &[OTEL_EXPORTER_JAEGER_ENDPOINT],
    default_endpoint: OTEL_EXPORTER_JAEGER_ENDPOINT_DEFAULT,
    timeout: &[OTEL_EXPORTER_JAEGER_TIMEOUT],
    compression: &[],
    headers: &[],
    certificate: &[OTEL_EXPORTER_JAEGER_CERTIFICATE],
};

/// Builder for [JaegerExporter].
#[derive(Debug, Default)]
pub struct JaegerExporterBuilder {
    inner: GrpcExporterBuilder,
    service_name: Option<String>,
    max_tag_value_length: Option<usize>,
}

impl JaegerExporterBuilder {
    /// Report every span under `service_name` instead of the resource's
    /// `service.name`.
    pub fn with_service_name<T: Into<String>>(mut self, service_name: T) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Cut string tag values longer than `max_len` characters.
    pub fn with_max_tag_value_length(mut self, max_len: usize) -> Self {
        self.max_tag_value_length = Some(max_len);
        self
    }

    /// Build the exporter. Configuration problems surface here, never on export.
    pub fn build(self) -> Result<JaegerExporter, ExporterBuildError> {
        let transport = self.inner.build_transport(&JAEGER_ENV)?;

        let mut stub = CollectorServiceClient::new(transport.channel);
        if let Some(compression) = transport.compression {
            stub = stub
                .send_compressed(compression)
                .accept_compressed(compression);
        }

        Ok(JaegerExporter {
            client: ExportClient::new(stub, transport.interceptor, transport.timeout),
            encoder: JaegerEncoder::new(self.service_name, self.max_tag_value_length),
            resource: Resource::builder_empty().build(),
        })
    }
}

impl HasExportConfig for JaegerExporterBuilder {
    fn export_config(&mut self) -> &mut ExportConfig {
        &mut self.inner.export_config
    }
}

impl HasTonicConfig for JaegerExporterBuilder {
    fn tonic_config(&mut self) -> &mut TonicConfig {
        &mut self.inner.tonic_config
    }
}

/// Jaeger exporter that sends spans to a collector.
#[derive(Debug)]
pub struct JaegerExporter {
    client: ExportClient<CollectorServiceClient<Channel>>,
    encoder: JaegerEncoder,
    resource: Resource,
}

impl JaegerExporter {
    /// Obtain a builder to configure a [JaegerExporter].
    pub fn builder() -> JaegerExporterBuilder {
        JaegerExporterBuilder::default()
    }
}

impl SpanExporter for JaegerExporter {
    async fn export(&self, batch: Vec<SpanData>) -> OTelSdkResult {
        let resource = &self.resource;
        self.client
            .export(batch.len(), || PostSpansRequest {
                batch: Some(self.encoder.encode(batch.iter().map(|span| (resource, span)))),
            })
            .await
    }

    fn shutdown_with_timeout(&mut self, _timeout: time::Duration) -> OTelSdkResult {
        self.client.shutdown()
    }

    fn shutdown(&mut self) -> OTelSdkResult {
        self.client.shutdown()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.resource = resource.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::{tests::run_env_test, WithExportConfig, WithTonicConfig};
    use opentelemetry::trace::{Tracer, TracerProvider as _};
    use opentelemetry_sdk::error::OTelSdkError;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
    use std::time::Duration;

    fn finished_span() -> SpanData {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        provider.tracer("jaeger-test").in_span("checkout", |_| {});
        exporter.get_finished_spans().unwrap().remove(0)
    }

    fn unreachable_exporter() -> JaegerExporter {
        JaegerExporter::builder()
            .with_endpoint("http://127.0.0.1:1")
            .with_timeout(Duration::from_millis(500))
            .build()
            .expect("plaintext endpoint builds")
    }

    #[tokio::test]
    async fn builds_from_environment() {
        run_env_test(
            vec![
                (OTEL_EXPORTER_JAEGER_ENDPOINT, "http://collector:14250"),
                (OTEL_EXPORTER_JAEGER_TIMEOUT, "1500"),
            ],
            || {
                let exporter = JaegerExporter::builder().build().unwrap();
                assert!(format!("{exporter:?}").contains("timeout: 1.5s"));
            },
        );
    }

    #[tokio::test]
    async fn builder_overrides_environment() {
        run_env_test(vec![(OTEL_EXPORTER_JAEGER_TIMEOUT, "1500")], || {
            let exporter = JaegerExporter::builder()
                .with_endpoint("collector:14250")
                .with_insecure(true)
                .with_timeout(Duration::from_secs(4))
                .with_service_name("checkout")
                .with_max_tag_value_length(64)
                .build()
                .unwrap();
            assert!(format!("{exporter:?}").contains("timeout: 4s"));
        });
    }

    #[cfg(not(feature = "_tls-base"))]
    #[tokio::test]
    async fn default_endpoint_is_secure() {
        temp_env::with_var_unset(OTEL_EXPORTER_JAEGER_ENDPOINT, || {
            let result = JaegerExporter::builder().build();
            assert!(matches!(
                result,
                Err(ExporterBuildError::TlsFeatureRequired(uri)) if uri.contains("localhost:14250")
            ));
        });
    }

    #[tokio::test]
    async fn empty_batch_never_connects() {
        let exporter = unreachable_exporter();
        assert!(exporter.export(Vec::new()).await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_collector_fails_the_batch() {
        let exporter = unreachable_exporter();
        assert!(exporter.export(vec![finished_span()]).await.is_err());
    }

    #[tokio::test]
    async fn export_after_shutdown_fails() {
        let mut exporter = unreachable_exporter();
        assert!(exporter.shutdown().is_ok());
        assert!(exporter.shutdown().is_ok());

        let result = exporter.export(vec![finished_span()]).await;
        assert!(matches!(result, Err(OTelSdkError::AlreadyShutdown)));
    }

    #[tokio::test]
    async fn shutdown_with_timeout_releases_the_client() {
        let mut exporter = unreachable_exporter();
        assert!(exporter
            .shutdown_with_timeout(Duration::from_secs(1))
            .is_ok());

        let result = exporter.export(vec![finished_span()]).await;
        assert!(matches!(result, Err(OTelSdkError::AlreadyShutdown)));
    }

    #[tokio::test]
    async fn set_resource_replaces_the_resource() {
        let mut exporter = unreachable_exporter();
        assert!(exporter.resource.is_empty());

        exporter.set_resource(
            &Resource::builder_empty()
                .with_service_name("inventory")
                .build(),
        );

        let span = finished_span();
        let batch = exporter.encoder.encode([(&exporter.resource, &span)]);
        assert_eq!(batch.process.unwrap().service_name, "inventory");
    }
}
