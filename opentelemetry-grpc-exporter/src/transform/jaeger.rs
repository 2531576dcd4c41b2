//! Conversion of SDK spans into the Jaeger protobuf model.

use opentelemetry::{
    trace::{Event, Link, SpanKind, Status},
    InstrumentationScope, Key, KeyValue as OtelKeyValue, Value,
};
use opentelemetry_sdk::{trace::SpanData, Resource};

use super::attributes::{attribute_tag, bool_tag, int_tag, string_tag};
use super::group::{group_by_resource_and_scope, scope_is_set};
use super::ids::{span_id_bytes, trace_id_bytes};
use super::time::{duration_between, timestamp_from_epoch_nanos, to_nanos};
use crate::proto::jaeger_api_v2::{Batch, KeyValue, Log, Process, Span, SpanRef, SpanRefType};

/// Scope name MUST be reported in Jaeger span tags with the following key
pub const INSTRUMENTATION_LIBRARY_NAME: &str = "otel.instrumentation_library.name";

/// Scope version MUST be reported in Jaeger span tags with the following key
pub const INSTRUMENTATION_LIBRARY_VERSION: &str = "otel.instrumentation_library.version";

const ERROR: &str = "error";
const SPAN_KIND: &str = "span.kind";
const STATUS_CODE: &str = "status.code";
const STATUS_MESSAGE: &str = "status.message";
const EVENT_MESSAGE: &str = "message";

const SERVICE_NAME: &str = "service.name";
const DEFAULT_SERVICE_NAME: &str = "unknown_service";

/// Jaeger string for every span kind.
pub fn format_span_kind(kind: &SpanKind) -> &'static str {
    match kind {
        SpanKind::Client => "client",
        SpanKind::Server => "server",
        SpanKind::Producer => "producer",
        SpanKind::Consumer => "consumer",
        SpanKind::Internal => "internal",
    }
}

/// Numeric status code reported in the `status.code` tag.
pub fn status_code(status: &Status) -> i64 {
    match status {
        Status::Unset => 0,
        Status::Ok => 1,
        Status::Error { .. } => 2,
    }
}

/// Translates spans into Jaeger batches.
///
/// The encoder holds only configuration, so encoding the same spans twice
/// yields equal batches.
#[derive(Clone, Debug, Default)]
pub struct JaegerEncoder {
    service_name: Option<String>,
    max_tag_value_length: Option<usize>,
}

impl JaegerEncoder {
    /// Create an encoder.
    ///
    /// `service_name` overrides the resource's `service.name`. String tag values
    /// longer than `max_tag_value_length` characters are cut.
    pub fn new(service_name: Option<String>, max_tag_value_length: Option<usize>) -> Self {
        JaegerEncoder {
            service_name,
            max_tag_value_length,
        }
    }

    /// Encode spans paired with the resource that produced them.
    ///
    /// Spans are grouped by resource, each group sharing one process block.
    /// Within a group spans keep their input order; the scope travels as span
    /// tags. `Batch::process` is only set when all spans share a resource.
    pub fn encode<'a, I>(&self, spans: I) -> Batch
    where
        I: IntoIterator<Item = (&'a Resource, &'a SpanData)>,
    {
        let groups = group_by_resource_and_scope(
            spans
                .into_iter()
                .map(|(resource, span)| (resource, None, span)),
        );

        let mut batch = Batch::default();
        let single_group = groups.len() == 1;
        for group in &groups {
            let process = self.process(group.resource);
            batch.spans.extend(
                group
                    .records()
                    .map(|(_, span)| self.translate_span(span, group.resource, &process)),
            );
            if single_group {
                batch.process = Some(process);
            }
        }

        batch
    }

    /// Build the process block for a resource.
    pub fn process(&self, resource: &Resource) -> Process {
        let service_name = self.service_name.clone().unwrap_or_else(|| {
            resource
                .get(&Key::from_static_str(SERVICE_NAME))
                .map(|v| v.to_string())
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string())
        });

        let tags = sorted_resource_attributes(resource)
            .into_iter()
            .filter(|(key, _)| key.as_str() != SERVICE_NAME)
            .map(|(key, value)| attribute_tag(key, value, self.max_tag_value_length))
            .collect();

        Process { service_name, tags }
    }

    /// Convert a single span.
    pub fn translate_span(&self, span: &SpanData, resource: &Resource, process: &Process) -> Span {
        let start_time = timestamp_from_epoch_nanos(to_nanos(span.start_time));
        let end_time = timestamp_from_epoch_nanos(to_nanos(span.end_time));
        let scope = Some(&span.instrumentation_scope).filter(|s| scope_is_set(s));

        Span {
            trace_id: trace_id_bytes(span.span_context.trace_id()),
            span_id: span_id_bytes(span.span_context.span_id()),
            operation_name: span.name.to_string(),
            references: links_to_references(&span.links),
            flags: u32::from(span.span_context.trace_flags().to_u8()),
            duration: Some(duration_between(&start_time, &end_time)),
            start_time: Some(start_time),
            tags: self.build_span_tags(
                &span.attributes,
                resource,
                &span.status,
                &span.span_kind,
                scope,
            ),
            logs: self.events_to_logs(&span.events),
            process: Some(process.clone()),
            ..Default::default()
        }
    }

    fn build_span_tags(
        &self,
        attrs: &[OtelKeyValue],
        resource: &Resource,
        status: &Status,
        kind: &SpanKind,
        scope: Option<&InstrumentationScope>,
    ) -> Vec<KeyValue> {
        let mut tags = attrs
            .iter()
            .map(|kv| attribute_tag(&kv.key, &kv.value, self.max_tag_value_length))
            .collect::<Vec<_>>();

        tags.extend(
            sorted_resource_attributes(resource)
                .into_iter()
                .map(|(key, value)| attribute_tag(key, value, self.max_tag_value_length)),
        );

        tags.push(int_tag(STATUS_CODE, status_code(status)));
        let message = match status {
            Status::Error { description } => description.as_ref(),
            _ => "",
        };
        tags.push(string_tag(STATUS_MESSAGE, message));
        tags.push(string_tag(SPAN_KIND, format_span_kind(kind)));

        if matches!(status, Status::Error { .. }) {
            tags.push(bool_tag(ERROR, true));
        }

        if let Some(scope) = scope {
            tags.push(string_tag(INSTRUMENTATION_LIBRARY_NAME, scope.name()));
            if let Some(version) = scope.version() {
                tags.push(string_tag(INSTRUMENTATION_LIBRARY_VERSION, version));
            }
        }

        tags
    }

    fn events_to_logs(&self, events: &[Event]) -> Vec<Log> {
        events
            .iter()
            .map(|event| {
                let mut fields = event
                    .attributes
                    .iter()
                    .map(|kv| attribute_tag(&kv.key, &kv.value, self.max_tag_value_length))
                    .collect::<Vec<_>>();
                fields.push(string_tag(EVENT_MESSAGE, event.name.as_ref()));

                Log {
                    timestamp: Some(timestamp_from_epoch_nanos(to_nanos(event.timestamp))),
                    fields,
                }
            })
            .collect()
    }
}

// Only links become references; the parent span id is carried by neither.
fn links_to_references(links: &[Link]) -> Vec<SpanRef> {
    links
        .iter()
        .map(|link| SpanRef {
            trace_id: trace_id_bytes(link.span_context.trace_id()),
            span_id: span_id_bytes(link.span_context.span_id()),
            ref_type: SpanRefType::FollowsFrom as i32,
        })
        .collect()
}

fn sorted_resource_attributes(resource: &Resource) -> Vec<(&Key, &Value)> {
    let mut attrs = resource.iter().collect::<Vec<_>>();
    attrs.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
    attrs
}
