//! OTLP - Log Exporter
//!
//! Defines a [LogExporter] to send logs via the OpenTelemetry Protocol (OTLP)
//! over gRPC.

use std::fmt::Debug;
use std::time;

use opentelemetry_proto::tonic::collector::logs::v1::{
    logs_service_client::LogsServiceClient, ExportLogsServiceRequest,
};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::LogBatch;
use opentelemetry_sdk::Resource;
use tonic::transport::Channel;

use crate::exporter::client::ExportClient;
use crate::exporter::{
    ExportConfig, ExporterBuildError, GrpcExporterBuilder, HasExportConfig, HasTonicConfig,
    SignalEnv, TonicConfig, OTEL_EXPORTER_OTLP_COMPRESSION, OTEL_EXPORTER_OTLP_ENDPOINT,
    OTEL_EXPORTER_OTLP_HEADERS, OTEL_EXPORTER_OTLP_TIMEOUT,
};
use crate::transform::logs::resource_logs;

/// Compression algorithm to use, defaults to none.
pub const OTEL_EXPORTER_OTLP_LOGS_COMPRESSION: &str = "OTEL_EXPORTER_OTLP_LOGS_COMPRESSION";

/// Target to which the exporter is going to send logs
pub const OTEL_EXPORTER_OTLP_LOGS_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_LOGS_ENDPOINT";

/// Default target to which the exporter is going to send logs.
pub const OTEL_EXPORTER_OTLP_LOGS_ENDPOINT_DEFAULT: &str = "localhost:4317";

/// Maximum time the OTLP exporter will wait for each batch logs export.
pub const OTEL_EXPORTER_OTLP_LOGS_TIMEOUT: &str = "OTEL_EXPORTER_OTLP_LOGS_TIMEOUT";

/// Key-value pairs to be used as metadata associated with gRPC requests
/// for sending logs.
/// Example: `k1=v1,k2=v2`
pub const OTEL_EXPORTER_OTLP_LOGS_HEADERS: &str = "OTEL_EXPORTER_OTLP_LOGS_HEADERS";

const LOGS_ENV: SignalEnv = SignalEnv {
    endpoint: &[OTEL_EXPORTER_OTLP_LOGS_ENDPOINT, OTEL_EXPORTER_OTLP_ENDPOINT],
    default_endpoint: OTEL_EXPORTER_OTLP_LOGS_ENDPOINT_DEFAULT,
    timeout: &[OTEL_EXPORTER_OTLP_LOGS_TIMEOUT, OTEL_EXPORTER_OTLP_TIMEOUT],
    compression: &[OTEL_EXPORTER_OTLP_LOGS_COMPRESSION, OTEL_EXPORTER_OTLP_COMPRESSION],
    headers: &[OTEL_EXPORTER_OTLP_LOGS_HEADERS, OTEL_EXPORTER_OTLP_HEADERS],
    certificate: &[],
};

/// Builder for [LogExporter].
#[derive(Debug, Default)]
pub struct LogExporterBuilder {
    inner: GrpcExporterBuilder,
}

impl LogExporterBuilder {
    /// Build the exporter. Configuration problems surface here, never on export.
    pub fn build(self) -> Result<LogExporter, ExporterBuildError> {
        let transport = self.inner.build_transport(&LOGS_ENV)?;

        let mut stub = LogsServiceClient::new(transport.channel);
        if let Some(compression) = transport.compression {
            stub = stub
                .send_compressed(compression)
                .accept_compressed(compression);
        }

        Ok(LogExporter {
            client: ExportClient::new(stub, transport.interceptor, transport.timeout),
            resource: Resource::builder_empty().build(),
        })
    }
}

impl HasExportConfig for LogExporterBuilder {
    fn export_config(&mut self) -> &mut ExportConfig {
        &mut self.inner.export_config
    }
}

impl HasTonicConfig for LogExporterBuilder {
    fn tonic_config(&mut self) -> &mut TonicConfig {
        &mut self.inner.tonic_config
    }
}

/// OTLP exporter that sends log data
#[derive(Debug)]
pub struct LogExporter {
    client: ExportClient<LogsServiceClient<Channel>>,
    resource: Resource,
}

impl LogExporter {
    /// Obtain a builder to configure a [LogExporter].
    pub fn builder() -> LogExporterBuilder {
        LogExporterBuilder::default()
    }
}

impl opentelemetry_sdk::logs::LogExporter for LogExporter {
    async fn export(&self, batch: LogBatch<'_>) -> OTelSdkResult {
        let resource = &self.resource;
        let count = batch.iter().count();
        self.client
            .export(count, || ExportLogsServiceRequest {
                resource_logs: resource_logs(
                    batch
                        .iter()
                        .map(|(record, scope)| (resource, record, scope)),
                ),
            })
            .await
    }

    fn shutdown_with_timeout(&self, _timeout: time::Duration) -> OTelSdkResult {
        self.client.shutdown()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.resource = resource.clone();
    }
}
