//! Payload schema for Qdrant points
//!
//! Each point stores `{"text": <segment text>, "metadata": {...}}`.

use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{ListValue, PointId, PointStruct, Struct, Value as QdrantValue};
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::{SegmentPoint, SegmentRow};

/// Payload field holding the segment text
pub const TEXT_FIELD: &str = "text";

/// Payload field holding the segment metadata object
pub const METADATA_FIELD: &str = "metadata";

impl SegmentPoint {
    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self) -> PointStruct {
        let mut payload = HashMap::new();
        payload.insert(TEXT_FIELD.to_string(), string_to_qdrant(&self.text));
        payload.insert(
            METADATA_FIELD.to_string(),
            json_to_qdrant_value(Value::Object(self.metadata)),
        );
        PointStruct::new(self.id.to_string(), self.vector, payload)
    }
}

/// Split a point payload back into text and metadata
pub fn row_from_payload(id: Option<PointId>, payload: HashMap<String, QdrantValue>) -> SegmentRow {
    let mut text = String::new();
    let mut metadata = Map::new();

    for (key, value) in payload {
        match (key.as_str(), json_from_qdrant_value(value)) {
            (TEXT_FIELD, Value::String(s)) => text = s,
            (METADATA_FIELD, Value::Object(map)) => metadata = map,
            _ => {}
        }
    }

    SegmentRow {
        id: point_id_to_string(id),
        text,
        metadata,
    }
}

fn string_to_qdrant(s: &str) -> QdrantValue {
    QdrantValue {
        kind: Some(Kind::StringValue(s.to_string())),
    }
}

/// Convert serde_json Value to a Qdrant value
pub fn json_to_qdrant_value(v: Value) -> QdrantValue {
    let kind = match v {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Kind::StringValue(s),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.into_iter().map(json_to_qdrant_value).collect(),
        }),
        Value::Object(map) => Kind::StructValue(Struct {
            fields: map
                .into_iter()
                .map(|(k, v)| (k, json_to_qdrant_value(v)))
                .collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

/// Convert Qdrant value to serde_json Value
pub fn json_from_qdrant_value(v: QdrantValue) -> Value {
    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}

/// Convert PointId to string
pub fn point_id_to_string(id: Option<PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;

    match id {
        Some(PointId {
            point_id_options: Some(PointIdOptions::Uuid(uuid)),
        }) => uuid,
        Some(PointId {
            point_id_options: Some(PointIdOptions::Num(num)),
        }) => num.to_string(),
        _ => String::new(),
    }
}
