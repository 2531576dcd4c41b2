//! Conversion of SDK log records into OTLP `ResourceLogs`.

use opentelemetry::{
    logs::{AnyValue as LogsAnyValue, Severity},
    otel_warn, Array, InstrumentationScope, Key, Value,
};
use opentelemetry_proto::tonic::{
    common::v1::{
        any_value, AnyValue, ArrayValue, InstrumentationScope as ProtoScope, KeyValue,
        KeyValueList,
    },
    logs::v1::{LogRecord, ResourceLogs, ScopeLogs, SeverityNumber},
    resource::v1::Resource as ProtoResource,
};
use opentelemetry_sdk::{logs::SdkLogRecord, Resource};

use super::group::{group_by_resource_and_scope, scope_is_set};
use super::ids::{span_id_bytes, trace_id_bytes};
use super::time::to_nanos;

const SEVERITIES: [Severity; 24] = [
    Severity::Trace,
    Severity::Trace2,
    Severity::Trace3,
    Severity::Trace4,
    Severity::Debug,
    Severity::Debug2,
    Severity::Debug3,
    Severity::Debug4,
    Severity::Info,
    Severity::Info2,
    Severity::Info3,
    Severity::Info4,
    Severity::Warn,
    Severity::Warn2,
    Severity::Warn3,
    Severity::Warn4,
    Severity::Error,
    Severity::Error2,
    Severity::Error3,
    Severity::Error4,
    Severity::Fatal,
    Severity::Fatal2,
    Severity::Fatal3,
    Severity::Fatal4,
];

/// Group log records by resource and scope and convert them.
///
/// One `ResourceLogs` is emitted per distinct resource and one `ScopeLogs` per
/// distinct scope within it, both in order of first appearance.
pub fn resource_logs<'a, I>(records: I) -> Vec<ResourceLogs>
where
    I: IntoIterator<Item = (&'a Resource, &'a SdkLogRecord, &'a InstrumentationScope)>,
{
    group_by_resource_and_scope(records.into_iter().map(|(resource, record, scope)| {
        (resource, Some(scope).filter(|s| scope_is_set(s)), record)
    }))
    .into_iter()
    .map(|group| ResourceLogs {
        resource: Some(resource_to_proto(group.resource)),
        schema_url: group.resource.schema_url().unwrap_or_default().to_string(),
        scope_logs: group
            .scopes
            .into_iter()
            .map(|bucket| ScopeLogs {
                schema_url: bucket
                    .scope
                    .and_then(|s| s.schema_url())
                    .unwrap_or_default()
                    .to_string(),
                scope: bucket.scope.map(scope_to_proto),
                log_records: bucket.records.into_iter().map(log_record_to_proto).collect(),
            })
            .collect(),
    })
    .collect()
}

/// Convert one record.
pub fn log_record_to_proto(record: &SdkLogRecord) -> LogRecord {
    let trace_context = record.trace_context();
    let (attributes, dropped) = log_attributes(record.attributes_iter().map(|(k, v)| (k, v)));

    LogRecord {
        time_unix_nano: record.timestamp().map(to_nanos).unwrap_or_default(),
        observed_time_unix_nano: record.observed_timestamp().map(to_nanos).unwrap_or_default(),
        severity_number: severity_number(record.severity_number(), record.severity_text()),
        severity_text: record.severity_text().unwrap_or_default().to_string(),
        body: record.body().map(body_value),
        attributes,
        dropped_attributes_count: dropped,
        flags: trace_context
            .and_then(|ctx| ctx.trace_flags)
            .map(|flags| u32::from(flags.to_u8()))
            .unwrap_or_default(),
        trace_id: trace_context
            .map(|ctx| trace_id_bytes(ctx.trace_id))
            .unwrap_or_default(),
        span_id: trace_context
            .map(|ctx| span_id_bytes(ctx.span_id))
            .unwrap_or_default(),
        event_name: record.event_name().unwrap_or_default().to_string(),
        ..Default::default()
    }
}

/// OTLP severity number of a record.
///
/// An explicit severity wins. Otherwise the severity text is matched against
/// the severity names (`INFO`, `WARN2`, ...) ignoring case.
pub fn severity_number(severity: Option<Severity>, text: Option<&str>) -> i32 {
    match severity {
        Some(severity) => severity as i32,
        None => text
            .and_then(|text| {
                SEVERITIES
                    .iter()
                    .find(|s| s.name().eq_ignore_ascii_case(text.trim()))
            })
            .map(|s| *s as i32)
            .unwrap_or(SeverityNumber::Unspecified as i32),
    }
}

/// Convert log attributes, dropping values that have no attribute encoding.
///
/// Returns the converted attributes and the number dropped.
pub fn log_attributes<'a, I>(attributes: I) -> (Vec<KeyValue>, u32)
where
    I: IntoIterator<Item = (&'a Key, &'a LogsAnyValue)>,
{
    let mut dropped = 0;
    let converted: Vec<KeyValue> = attributes
        .into_iter()
        .filter_map(|(key, value)| match attribute_value(value) {
            Some(value) => Some(KeyValue {
                key: key.to_string(),
                value: Some(value),
            }),
            None => {
                otel_warn!(
                    name: "LogExporter.AttributeDropped",
                    key = key.as_str(),
                    value_type = kind_name(value)
                );
                dropped += 1;
                None
            }
        })
        .collect();
    (converted, dropped)
}

// Scalars and sequences of scalars only.
fn attribute_value(value: &LogsAnyValue) -> Option<AnyValue> {
    match value {
        LogsAnyValue::ListAny(values) => values
            .iter()
            .map(scalar_value)
            .collect::<Option<Vec<_>>>()
            .map(|values| AnyValue {
                value: Some(any_value::Value::ArrayValue(ArrayValue { values })),
            }),
        other => scalar_value(other),
    }
}

fn scalar_value(value: &LogsAnyValue) -> Option<AnyValue> {
    let value = match value {
        LogsAnyValue::Boolean(b) => any_value::Value::BoolValue(*b),
        LogsAnyValue::Int(i) => any_value::Value::IntValue(*i),
        LogsAnyValue::Double(f) => any_value::Value::DoubleValue(*f),
        LogsAnyValue::String(s) => any_value::Value::StringValue(s.to_string()),
        _ => return None,
    };
    Some(AnyValue { value: Some(value) })
}

fn kind_name(value: &LogsAnyValue) -> &'static str {
    match value {
        LogsAnyValue::Map(_) => "map",
        LogsAnyValue::Bytes(_) => "bytes",
        LogsAnyValue::ListAny(_) => "sequence",
        _ => "unknown",
    }
}

/// Convert a log body. Every body shape is representable.
pub fn body_value(value: &LogsAnyValue) -> AnyValue {
    let value = match value {
        LogsAnyValue::Boolean(b) => any_value::Value::BoolValue(*b),
        LogsAnyValue::Int(i) => any_value::Value::IntValue(*i),
        LogsAnyValue::Double(f) => any_value::Value::DoubleValue(*f),
        LogsAnyValue::String(s) => any_value::Value::StringValue(s.to_string()),
        LogsAnyValue::Bytes(bytes) => any_value::Value::BytesValue(bytes.to_vec()),
        LogsAnyValue::ListAny(values) => any_value::Value::ArrayValue(ArrayValue {
            values: values.iter().map(body_value).collect(),
        }),
        LogsAnyValue::Map(map) => {
            let mut entries = map.iter().collect::<Vec<_>>();
            entries.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
            any_value::Value::KvlistValue(KeyValueList {
                values: entries
                    .into_iter()
                    .map(|(key, value)| KeyValue {
                        key: key.to_string(),
                        value: Some(body_value(value)),
                    })
                    .collect(),
            })
        }
        other => any_value::Value::StringValue(format!("{other:?}")),
    };
    AnyValue { value: Some(value) }
}

fn value_to_proto(value: &Value) -> AnyValue {
    let value = match value {
        Value::Bool(b) => any_value::Value::BoolValue(*b),
        Value::I64(i) => any_value::Value::IntValue(*i),
        Value::F64(f) => any_value::Value::DoubleValue(*f),
        Value::String(s) => any_value::Value::StringValue(s.to_string()),
        Value::Array(array) => any_value::Value::ArrayValue(array_to_proto(array)),
        other => any_value::Value::StringValue(other.to_string()),
    };
    AnyValue { value: Some(value) }
}

fn array_to_proto(array: &Array) -> ArrayValue {
    let values: Vec<any_value::Value> = match array {
        Array::Bool(values) => values
            .iter()
            .map(|v| any_value::Value::BoolValue(*v))
            .collect(),
        Array::I64(values) => values
            .iter()
            .map(|v| any_value::Value::IntValue(*v))
            .collect(),
        Array::F64(values) => values
            .iter()
            .map(|v| any_value::Value::DoubleValue(*v))
            .collect(),
        Array::String(values) => values
            .iter()
            .map(|v| any_value::Value::StringValue(v.to_string()))
            .collect(),
        other => vec![any_value::Value::StringValue(other.to_string())],
    };
    ArrayValue {
        values: values
            .into_iter()
            .map(|value| AnyValue { value: Some(value) })
            .collect(),
    }
}

fn key_value(key: &Key, value: &Value) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(value_to_proto(value)),
    }
}

fn resource_to_proto(resource: &Resource) -> ProtoResource {
    let mut attributes = resource.iter().collect::<Vec<_>>();
    attributes.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
    ProtoResource {
        attributes: attributes
            .into_iter()
            .map(|(key, value)| key_value(key, value))
            .collect(),
        dropped_attributes_count: 0,
        ..Default::default()
    }
}

fn scope_to_proto(scope: &InstrumentationScope) -> ProtoScope {
    ProtoScope {
        name: scope.name().to_string(),
        version: scope.version().unwrap_or_default().to_string(),
        attributes: scope
            .attributes()
            .map(|kv| key_value(&kv.key, &kv.value))
            .collect(),
        dropped_attributes_count: 0,
        ..Default::default()
    }
}
