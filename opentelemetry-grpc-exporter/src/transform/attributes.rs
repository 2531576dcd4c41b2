//! Attribute to Jaeger tag conversion.
//!
//! Every [`Value`] is first classified as a [`TagValue`] and then turned into
//! a typed Jaeger [`KeyValue`]. Sequences have no native representation in the
//! Jaeger model and are sent as their display string, e.g. `["a","b"]`.

use std::borrow::Cow;

use opentelemetry::{Key, Value};

use crate::proto::jaeger_api_v2::{KeyValue, ValueType};

/// A span attribute value as understood by the Jaeger tag model.
#[derive(Clone, Debug, PartialEq)]
pub enum TagValue<'a> {
    /// Sent as a `BOOL` tag.
    Bool(bool),
    /// Sent as an `INT64` tag.
    Int(i64),
    /// Sent as a `FLOAT64` tag.
    Float(f64),
    /// Sent as a `STRING` tag, subject to truncation.
    String(Cow<'a, str>),
    /// A homogeneous sequence, already rendered to its display form.
    Sequence(String),
}

impl<'a> From<&'a Value> for TagValue<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Bool(b) => TagValue::Bool(*b),
            Value::I64(i) => TagValue::Int(*i),
            Value::F64(f) => TagValue::Float(*f),
            Value::String(s) => TagValue::String(Cow::Borrowed(s.as_str())),
            Value::Array(array) => TagValue::Sequence(array.to_string()),
            // `Value` may grow variants; fall back to its string form.
            other => TagValue::String(other.as_str()),
        }
    }
}

/// Build a Jaeger tag, cutting string values to at most `max_len` characters.
pub fn tag(key: impl Into<String>, value: TagValue<'_>, max_len: Option<usize>) -> KeyValue {
    let key = key.into();
    match value {
        TagValue::Bool(b) => bool_tag(key, b),
        TagValue::Int(i) => int_tag(key, i),
        TagValue::Float(f) => KeyValue {
            key,
            v_type: ValueType::Float64 as i32,
            v_float64: f,
            ..Default::default()
        },
        TagValue::String(s) => string_tag(key, truncate(s, max_len)),
        TagValue::Sequence(s) => string_tag(key, truncate(Cow::Owned(s), max_len)),
    }
}

/// Convert an attribute key-value pair into a Jaeger tag.
pub fn attribute_tag(key: &Key, value: &Value, max_len: Option<usize>) -> KeyValue {
    tag(key.as_str(), TagValue::from(value), max_len)
}

pub(crate) fn string_tag(key: impl Into<String>, value: impl Into<String>) -> KeyValue {
    KeyValue {
        key: key.into(),
        v_type: ValueType::String as i32,
        v_str: value.into(),
        ..Default::default()
    }
}

pub(crate) fn bool_tag(key: impl Into<String>, value: bool) -> KeyValue {
    KeyValue {
        key: key.into(),
        v_type: ValueType::Bool as i32,
        v_bool: value,
        ..Default::default()
    }
}

pub(crate) fn int_tag(key: impl Into<String>, value: i64) -> KeyValue {
    KeyValue {
        key: key.into(),
        v_type: ValueType::Int64 as i32,
        v_int64: value,
        ..Default::default()
    }
}

/// Hard cut at `max_len` characters, no marker appended.
fn truncate(value: Cow<'_, str>, max_len: Option<usize>) -> String {
    match max_len {
        Some(max_len) => match value.char_indices().nth(max_len) {
            Some((idx, _)) => value[..idx].to_string(),
            None => value.into_owned(),
        },
        None => value.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::{Array, KeyValue as OtelKeyValue, StringValue};

    #[test]
    fn maps_scalar_types() {
        let bool_tag = attribute_tag(&Key::new("b"), &Value::Bool(false), None);
        assert_eq!(bool_tag.v_type, ValueType::Bool as i32);
        assert!(!bool_tag.v_bool);

        let int_tag = attribute_tag(&Key::new("i"), &Value::I64(-7), None);
        assert_eq!(int_tag.v_type, ValueType::Int64 as i32);
        assert_eq!(int_tag.v_int64, -7);

        let float_tag = attribute_tag(&Key::new("f"), &Value::F64(111.22), None);
        assert_eq!(float_tag.v_type, ValueType::Float64 as i32);
        assert_eq!(float_tag.v_float64, 111.22);

        let string_tag = attribute_tag(&Key::new("s"), &"hello_world".into(), None);
        assert_eq!(string_tag.v_type, ValueType::String as i32);
        assert_eq!(string_tag.v_str, "hello_world");
    }

    #[test]
    fn sequences_become_strings() {
        let kv = OtelKeyValue::new(
            "key_tuple",
            Value::Array(Array::String(vec![StringValue::from("tuple_element")])),
        );
        let tag = attribute_tag(&kv.key, &kv.value, None);
        assert_eq!(tag.v_type, ValueType::String as i32);
        assert_eq!(tag.v_str, r#"["tuple_element"]"#);

        let ints = Value::Array(Array::I64(vec![1, 2, 3]));
        assert_eq!(attribute_tag(&Key::new("ints"), &ints, None).v_str, "[1,2,3]");
    }

    #[test]
    fn truncates_long_strings() {
        let value: Value = "hello_world".into();
        let tag = attribute_tag(&Key::new("key"), &value, Some(5));
        assert_eq!(tag.v_str, "hello");

        let exact = attribute_tag(&Key::new("key"), &value, Some(11));
        assert_eq!(exact.v_str, "hello_world");

        let sequence = Value::Array(Array::I64(vec![100, 200]));
        assert_eq!(attribute_tag(&Key::new("seq"), &sequence, Some(4)).v_str, "[100");
    }

    #[test]
    fn no_limit_means_no_truncation() {
        let long = "x".repeat(100_000);
        let tag = attribute_tag(&Key::new("key"), &Value::from(long.clone()), None);
        assert_eq!(tag.v_str, long);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let tag = tag("key", TagValue::String("héllo wörld".into()), Some(2));
        assert_eq!(tag.v_str, "hé");
    }

    #[test]
    fn non_string_values_ignore_limit() {
        let tag = tag("key", TagValue::Int(123_456_789), Some(1));
        assert_eq!(tag.v_int64, 123_456_789);
    }
}
