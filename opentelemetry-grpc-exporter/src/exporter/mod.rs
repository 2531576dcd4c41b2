//! Exporter builder and configurations.
//!
//! Both exporters of this crate talk gRPC through [tonic]. They share the
//! configuration surface defined here: [`ExportConfig`] for the endpoint and
//! timeout, [`TonicConfig`] for everything transport specific.
//!
//! Values set on a builder always win over environment variables, which in
//! turn win over the defaults.
//!
//! [tonic]: https://github.com/hyperium/tonic

use std::env;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use http::{header::USER_AGENT, HeaderMap, HeaderName, HeaderValue};
use opentelemetry::otel_debug;
use thiserror::Error;
use tonic::codec::CompressionEncoding;
use tonic::metadata::{KeyAndValueRef, MetadataMap};
use tonic::service::Interceptor;
use tonic::transport::{Channel, Endpoint};
#[cfg(feature = "_tls-base")]
use tonic::transport::{Certificate, ClientTlsConfig};

pub(crate) mod client;

/// Target to which the OTLP exporter sends signals when no signal specific
/// endpoint is configured.
pub const OTEL_EXPORTER_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
/// Key-value pairs sent as gRPC metadata with every OTLP request.
/// Example: `k1=v1,k2=v2`
pub const OTEL_EXPORTER_OTLP_HEADERS: &str = "OTEL_EXPORTER_OTLP_HEADERS";
/// Compression algorithm for OTLP requests, `gzip` or `zstd`. Defaults to none.
pub const OTEL_EXPORTER_OTLP_COMPRESSION: &str = "OTEL_EXPORTER_OTLP_COMPRESSION";
/// Max waiting time in milliseconds for the backend to process each OTLP batch.
pub const OTEL_EXPORTER_OTLP_TIMEOUT: &str = "OTEL_EXPORTER_OTLP_TIMEOUT";

/// Default max waiting time for the backend to process each batch.
pub const OTEL_EXPORTER_TIMEOUT_DEFAULT: Duration = Duration::from_millis(10_000);

/// Endpoint and timeout of an exporter.
#[derive(Clone, Debug, Default)]
pub struct ExportConfig {
    /// The address of the collector. Without a scheme, `http://` or
    /// `https://` is prepended depending on [`WithTonicConfig::with_insecure`].
    ///
    /// Note: Programmatically setting this will override any value set via the environment variable.
    pub endpoint: Option<String>,

    /// The timeout of each export request. The default value is 10 seconds.
    ///
    /// Note: Programmatically setting this will override any value set via the environment variable.
    pub timeout: Option<Duration>,
}

/// Errors that can occur while building an exporter.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ExporterBuildError {
    /// Feature required to use the specified compression algorithm.
    #[cfg(any(not(feature = "gzip-tonic"), not(feature = "zstd-tonic")))]
    #[error("feature '{0}' is required to use the compression algorithm '{1}'")]
    FeatureRequiredForCompressionAlgorithm(&'static str, Compression),

    /// Unsupported compression algorithm.
    #[error("unsupported compression algorithm '{0}'")]
    UnsupportedCompressionAlgorithm(String),

    /// Invalid URI.
    #[error("invalid URI {0}. Reason {1}")]
    InvalidUri(String, String),

    /// A secure endpoint was configured but the crate was built without TLS support.
    #[error("endpoint {0} requires TLS, enable the 'tls' feature or use an insecure channel")]
    TlsFeatureRequired(String),

    /// The CA certificate could not be read.
    #[cfg(feature = "_tls-base")]
    #[error("failed to read certificate {path}: {reason}")]
    CertificateRead {
        /// Path of the certificate file.
        path: String,
        /// Why reading failed.
        reason: String,
    },

    /// The TLS settings were rejected by the transport.
    #[cfg(feature = "_tls-base")]
    #[error("invalid TLS config: {0}")]
    InvalidTlsConfig(String),
}

/// The compression algorithm to use when sending data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    /// Compresses data using gzip.
    Gzip,
    /// Compresses data using zstd.
    Zstd,
}

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::Gzip => write!(f, "gzip"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

impl FromStr for Compression {
    type Err = ExporterBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "gzip" => Ok(Compression::Gzip),
            "zstd" => Ok(Compression::Zstd),
            _ => Err(ExporterBuildError::UnsupportedCompressionAlgorithm(
                s.to_string(),
            )),
        }
    }
}

impl TryFrom<Compression> for CompressionEncoding {
    type Error = ExporterBuildError;

    fn try_from(value: Compression) -> Result<Self, Self::Error> {
        match value {
            #[cfg(feature = "gzip-tonic")]
            Compression::Gzip => Ok(CompressionEncoding::Gzip),
            #[cfg(not(feature = "gzip-tonic"))]
            Compression::Gzip => Err(ExporterBuildError::FeatureRequiredForCompressionAlgorithm(
                "gzip-tonic",
                Compression::Gzip,
            )),
            #[cfg(feature = "zstd-tonic")]
            Compression::Zstd => Ok(CompressionEncoding::Zstd),
            #[cfg(not(feature = "zstd-tonic"))]
            Compression::Zstd => Err(ExporterBuildError::FeatureRequiredForCompressionAlgorithm(
                "zstd-tonic",
                Compression::Zstd,
            )),
        }
    }
}

pub(crate) struct BoxInterceptor(Box<dyn Interceptor + Send + Sync>);

impl Interceptor for BoxInterceptor {
    fn call(&mut self, request: tonic::Request<()>) -> Result<tonic::Request<()>, tonic::Status> {
        self.0.call(request)
    }
}

impl Debug for BoxInterceptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "BoxInterceptor(..)")
    }
}

/// Transport settings of a gRPC exporter.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct TonicConfig {
    /// Custom metadata entries to send to the collector.
    pub(crate) metadata: Option<MetadataMap>,
    /// Use a plaintext channel for endpoints given without a scheme.
    pub(crate) insecure: Option<bool>,
    /// TLS settings for the collector endpoint.
    #[cfg(feature = "_tls-base")]
    pub(crate) tls_config: Option<ClientTlsConfig>,
    /// The compression algorithm to use when communicating with the collector.
    pub(crate) compression: Option<Compression>,
    pub(crate) channel: Option<Channel>,
    pub(crate) interceptor: Option<BoxInterceptor>,
}

/// Environment variables consulted for one signal, most specific first.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SignalEnv {
    pub(crate) endpoint: &'static [&'static str],
    pub(crate) default_endpoint: &'static str,
    pub(crate) timeout: &'static [&'static str],
    pub(crate) compression: &'static [&'static str],
    pub(crate) headers: &'static [&'static str],
    #[cfg_attr(not(feature = "_tls-base"), allow(dead_code))]
    pub(crate) certificate: &'static [&'static str],
}

/// Everything an export client needs, resolved from builder and environment.
#[derive(Debug)]
pub(crate) struct GrpcTransport {
    pub(crate) channel: Channel,
    pub(crate) interceptor: BoxInterceptor,
    pub(crate) compression: Option<CompressionEncoding>,
    pub(crate) timeout: Duration,
}

/// Shared builder state of the exporters in this crate.
#[derive(Debug, Default)]
pub struct GrpcExporterBuilder {
    pub(crate) tonic_config: TonicConfig,
    pub(crate) export_config: ExportConfig,
}

impl GrpcExporterBuilder {
    pub(crate) fn build_transport(
        self,
        signal: &SignalEnv,
    ) -> Result<GrpcTransport, ExporterBuildError> {
        let compression = resolve_compression(self.tonic_config.compression, signal.compression)?;
        let timeout = resolve_timeout(signal.timeout, self.export_config.timeout.as_ref());

        let (headers_from_env, headers_for_logging) = parse_headers_from_env(signal.headers);
        let metadata = merge_metadata(headers_from_env, self.tonic_config.metadata);

        let add_metadata = move |mut req: tonic::Request<()>| {
            for key_and_value in metadata.iter() {
                match key_and_value {
                    KeyAndValueRef::Ascii(key, value) => {
                        req.metadata_mut().append(key, value.to_owned())
                    }
                    KeyAndValueRef::Binary(key, value) => {
                        req.metadata_mut().append_bin(key, value.to_owned())
                    }
                };
            }

            Ok(req)
        };

        let interceptor = match self.tonic_config.interceptor {
            Some(mut interceptor) => {
                BoxInterceptor(Box::new(move |req| interceptor.call(add_metadata(req)?)))
            }
            None => BoxInterceptor(Box::new(add_metadata)),
        };

        // A caller supplied channel already carries its endpoint and TLS settings.
        if let Some(channel) = self.tonic_config.channel {
            otel_debug!(
                name: "GrpcExporter.CustomChannelUsed",
                timeout_in_millisecs = timeout.as_millis()
            );
            return Ok(GrpcTransport {
                channel,
                interceptor,
                compression,
                timeout,
            });
        }

        let insecure = self.tonic_config.insecure.unwrap_or(false);
        let uri = with_scheme(resolve_endpoint(self.export_config.endpoint, signal), insecure);
        let endpoint = Channel::from_shared(uri.clone())
            .map_err(|e| ExporterBuildError::InvalidUri(uri.clone(), e.to_string()))?;

        #[cfg(feature = "_tls-base")]
        let endpoint = configure_tls(endpoint, self.tonic_config.tls_config, signal.certificate)?;
        #[cfg(not(feature = "_tls-base"))]
        let endpoint = require_plaintext(endpoint)?;

        let channel = endpoint.timeout(timeout).connect_lazy();

        otel_debug!(
            name: "GrpcExporter.ChannelBuilt",
            endpoint = uri.as_str(),
            timeout_in_millisecs = timeout.as_millis(),
            compression = format!("{:?}", compression),
            headers = format!("{:?}", headers_for_logging)
        );
        Ok(GrpcTransport {
            channel,
            interceptor,
            compression,
            timeout,
        })
    }
}

#[cfg(feature = "_tls-base")]
fn configure_tls(
    endpoint: Endpoint,
    tls_config: Option<ClientTlsConfig>,
    certificate_vars: &[&str],
) -> Result<Endpoint, ExporterBuildError> {
    if endpoint.uri().scheme_str() != Some("https") {
        return Ok(endpoint);
    }

    let tls_config = match tls_config {
        Some(tls_config) => tls_config,
        None => {
            let mut tls_config = ClientTlsConfig::new().with_enabled_roots();
            if let Some(path) = env_value(certificate_vars) {
                let pem = std::fs::read(&path).map_err(|e| ExporterBuildError::CertificateRead {
                    path,
                    reason: e.to_string(),
                })?;
                tls_config = tls_config.ca_certificate(Certificate::from_pem(pem));
            }
            tls_config
        }
    };

    endpoint
        .tls_config(tls_config)
        .map_err(|e| ExporterBuildError::InvalidTlsConfig(e.to_string()))
}

#[cfg(not(feature = "_tls-base"))]
fn require_plaintext(endpoint: Endpoint) -> Result<Endpoint, ExporterBuildError> {
    if endpoint.uri().scheme_str() == Some("https") {
        Err(ExporterBuildError::TlsFeatureRequired(
            endpoint.uri().to_string(),
        ))
    } else {
        Ok(endpoint)
    }
}

/// First non-empty value among `vars`.
fn env_value(vars: &[&str]) -> Option<String> {
    vars.iter()
        .filter_map(|var| env::var(var).ok())
        .find(|value| !value.trim().is_empty())
}

fn resolve_endpoint(provided: Option<String>, signal: &SignalEnv) -> String {
    provided
        .filter(|endpoint| !endpoint.is_empty())
        .or_else(|| env_value(signal.endpoint))
        .unwrap_or_else(|| signal.default_endpoint.to_string())
}

fn with_scheme(endpoint: String, insecure: bool) -> String {
    if endpoint.contains("://") {
        endpoint
    } else if insecure {
        format!("http://{endpoint}")
    } else {
        format!("https://{endpoint}")
    }
}

fn resolve_timeout(timeout_vars: &[&str], provided_timeout: Option<&Duration>) -> Duration {
    // programmatic configuration overrides any value set via environment variables
    if let Some(timeout) = provided_timeout {
        *timeout
    } else if let Some(millis) = timeout_vars
        .iter()
        .filter_map(|var| env::var(var).ok())
        .find_map(|value| value.trim().parse::<u64>().ok())
    {
        Duration::from_millis(millis)
    } else {
        OTEL_EXPORTER_TIMEOUT_DEFAULT
    }
}

fn resolve_compression(
    provided: Option<Compression>,
    compression_vars: &[&str],
) -> Result<Option<CompressionEncoding>, ExporterBuildError> {
    let compression = match provided {
        Some(compression) => Some(compression),
        None => env_value(compression_vars)
            .map(|value| value.parse::<Compression>())
            .transpose()?,
    };
    compression.map(CompressionEncoding::try_from).transpose()
}

/// default user-agent headers
fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!(
        "OTel-Grpc-Exporter-Rust/{}",
        env!("CARGO_PKG_VERSION")
    )) {
        headers.insert(USER_AGENT, value);
    }
    headers
}

/// Defaults, then headers from the environment, then builder metadata. Later
/// entries replace earlier ones with the same key.
fn merge_metadata(headers_from_env: HeaderMap, metadata: Option<MetadataMap>) -> MetadataMap {
    let mut headers = default_headers();
    headers.extend(headers_from_env);
    if let Some(metadata) = metadata {
        headers.extend(metadata.into_headers());
    }
    MetadataMap::from_headers(headers)
}

fn parse_headers_from_env(header_vars: &[&str]) -> (HeaderMap, Vec<(String, String)>) {
    let mut headers = Vec::new();

    (
        env_value(header_vars)
            .map(|input| {
                parse_header_string(&input)
                    .filter_map(|(key, value)| {
                        headers.push((key.to_owned(), value.clone()));
                        Some((
                            HeaderName::from_str(key).ok()?,
                            HeaderValue::from_str(&value).ok()?,
                        ))
                    })
                    .collect::<HeaderMap>()
            })
            .unwrap_or_default(),
        headers,
    )
}

fn parse_header_string(value: &str) -> impl Iterator<Item = (&str, String)> {
    value
        .split_terminator(',')
        .map(str::trim)
        .filter_map(parse_header_key_value_string)
}

fn url_decode(value: &str) -> Option<String> {
    let mut result = String::with_capacity(value.len());
    let mut chars_to_decode = Vec::<u8>::new();
    let mut all_chars = value.chars();

    loop {
        let ch = all_chars.next();

        if ch == Some('%') {
            chars_to_decode.push(
                u8::from_str_radix(&format!("{}{}", all_chars.next()?, all_chars.next()?), 16)
                    .ok()?,
            );
            continue;
        }

        if !chars_to_decode.is_empty() {
            result.push_str(std::str::from_utf8(&chars_to_decode).ok()?);
            chars_to_decode.clear();
        }

        match ch {
            Some(c) => result.push(c),
            None => return Some(result),
        }
    }
}

fn parse_header_key_value_string(key_value_string: &str) -> Option<(&str, String)> {
    key_value_string
        .split_once('=')
        .map(|(key, value)| {
            (
                key.trim(),
                url_decode(value.trim()).unwrap_or(value.to_string()),
            )
        })
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
}

/// Provide access to the [ExportConfig] field within the exporter builders.
pub trait HasExportConfig {
    /// Return a mutable reference to the [ExportConfig] within the exporter builders.
    fn export_config(&mut self) -> &mut ExportConfig;
}

impl HasExportConfig for GrpcExporterBuilder {
    fn export_config(&mut self) -> &mut ExportConfig {
        &mut self.export_config
    }
}

/// Expose methods to override [ExportConfig].
///
/// This trait will be implemented for every struct that implemented [`HasExportConfig`] trait.
///
/// ## Examples
/// ```
/// use opentelemetry_grpc_exporter::{JaegerExporter, WithExportConfig};
///
/// let builder = JaegerExporter::builder().with_endpoint("http://localhost:14250");
/// ```
pub trait WithExportConfig {
    /// Set the address of the collector. If not set or set to empty string,
    /// the environment or the default address is used.
    fn with_endpoint<T: Into<String>>(self, endpoint: T) -> Self;
    /// Set the timeout of each export request.
    fn with_timeout(self, timeout: Duration) -> Self;
    /// Set export config. This will override all previous configurations.
    fn with_export_config(self, export_config: ExportConfig) -> Self;
}

impl<B: HasExportConfig> WithExportConfig for B {
    fn with_endpoint<T: Into<String>>(mut self, endpoint: T) -> Self {
        self.export_config().endpoint = Some(endpoint.into());
        self
    }

    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.export_config().timeout = Some(timeout);
        self
    }

    fn with_export_config(mut self, export_config: ExportConfig) -> Self {
        *self.export_config() = export_config;
        self
    }
}

/// Expose interface for modifying [TonicConfig] fields within the exporter builders.
pub trait HasTonicConfig {
    /// Return a mutable reference to the tonic config within the exporter builders.
    fn tonic_config(&mut self) -> &mut TonicConfig;
}

impl HasTonicConfig for GrpcExporterBuilder {
    fn tonic_config(&mut self) -> &mut TonicConfig {
        &mut self.tonic_config
    }
}

/// Expose methods to override [TonicConfig].
///
/// This trait will be implemented for every struct that implemented [`HasTonicConfig`] trait.
pub trait WithTonicConfig {
    /// Use a plaintext channel for an endpoint given without a scheme.
    ///
    /// Channels are secure by default.
    fn with_insecure(self, insecure: bool) -> Self;

    /// Set the TLS settings for the collector endpoint.
    #[cfg(feature = "_tls-base")]
    fn with_tls_config(self, tls_config: ClientTlsConfig) -> Self;

    /// Set custom metadata entries to send to the collector.
    fn with_metadata(self, metadata: MetadataMap) -> Self;

    /// Set the compression algorithm to use when communicating with the collector.
    fn with_compression(self, compression: Compression) -> Self;

    /// Use `channel` as tonic's transport channel.
    /// This overrides the endpoint and TLS config.
    ///
    /// Users MUST make sure the [`ExportConfig::timeout`] is
    /// the same as the channel's timeout.
    fn with_channel(self, channel: Channel) -> Self;

    /// Use a custom `interceptor` to modify each outbound request.
    /// This can be used to modify the grpc metadata, for example
    /// to inject auth tokens.
    fn with_interceptor<I>(self, interceptor: I) -> Self
    where
        I: Interceptor + Clone + Send + Sync + 'static;
}

impl<B: HasTonicConfig> WithTonicConfig for B {
    fn with_insecure(mut self, insecure: bool) -> Self {
        self.tonic_config().insecure = Some(insecure);
        self
    }

    #[cfg(feature = "_tls-base")]
    fn with_tls_config(mut self, tls_config: ClientTlsConfig) -> Self {
        self.tonic_config().tls_config = Some(tls_config);
        self
    }

    fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        // extending metadata maps is harder than just casting back/forth
        let mut existing_headers = self
            .tonic_config()
            .metadata
            .take()
            .unwrap_or_default()
            .into_headers();
        existing_headers.extend(metadata.into_headers());

        self.tonic_config().metadata = Some(MetadataMap::from_headers(existing_headers));
        self
    }

    fn with_compression(mut self, compression: Compression) -> Self {
        self.tonic_config().compression = Some(compression);
        self
    }

    fn with_channel(mut self, channel: Channel) -> Self {
        self.tonic_config().channel = Some(channel);
        self
    }

    fn with_interceptor<I>(mut self, interceptor: I) -> Self
    where
        I: Interceptor + Clone + Send + Sync + 'static,
    {
        self.tonic_config().interceptor = Some(BoxInterceptor(Box::new(interceptor)));
        self
    }
}
