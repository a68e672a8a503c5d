//! Result envelopes returned by statement execution (spec.md §6).
//!
//! Every statement produces a tagged JSON-serializable record: `error: bool`,
//! a `message` when `error` is true, and operation-specific fields on success.

use crate::error::RelResult;
use crate::schema::TableSchema;
use crate::value::Value;
use serde::Serialize;
use serde_json::{Map, Value as Json};

/// Renders a decoded attribute value the way the result envelope serializes it.
/// POINT gets the `{type, x, y, string_representation}` shape from spec.md §6;
/// everything else maps onto its natural JSON representation.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => Json::from(*f),
        Value::Bool(b) => Json::from(*b),
        Value::Date(d) => Json::from(*d),
        Value::Str(s) => Json::from(s.clone()),
        Value::Point(p) => {
            let mut obj = Map::new();
            obj.insert("type".into(), Json::from("POINT"));
            obj.insert("x".into(), Json::from(p.x));
            obj.insert("y".into(), Json::from(p.y));
            obj.insert("string_representation".into(), Json::from(p.to_string()));
            Json::Object(obj)
        }
    }
}

/// Projects a decoded row onto `projected` (or every attribute, for `SELECT *`).
pub fn project_row(schema: &TableSchema, values: &[Value], projected: Option<&[String]>) -> RelResult<Map<String, Json>> {
    let mut out = Map::new();
    match projected {
        None => {
            for (attr, value) in schema.attributes.iter().zip(values) {
                out.insert(attr.name.clone(), value_to_json(value));
            }
        }
        Some(names) => {
            for name in names {
                let idx = schema.attribute_index(name).ok_or_else(|| {
                    crate::error::RelError::Schema(format!("unknown attribute '{name}' in projection"))
                })?;
                out.insert(name.clone(), value_to_json(&values[idx]));
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectResult {
    pub error: bool,
    pub rows: Vec<Map<String, Json>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsertRowOutcome {
    pub row_index: usize,
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsertResult {
    pub error: bool,
    pub inserted: usize,
    pub failed: usize,
    pub results: Vec<InsertRowOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub error: bool,
    pub deleted: Vec<u32>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportRowOutcome {
    pub row_index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub error: bool,
    pub successes: usize,
    pub failures: usize,
    pub rows: Vec<ImportRowOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AckResult {
    pub error: bool,
    pub message: String,
}

/// One executed statement's outcome. Untagged so each variant serializes
/// exactly as its own shape, matching spec.md §6's per-operation fields.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StatementResult {
    Select(SelectResult),
    Insert(InsertResult),
    Delete(DeleteResult),
    Import(ImportResult),
    Ack(AckResult),
}

impl StatementResult {
    pub fn failure(message: impl Into<String>) -> Self {
        StatementResult::Ack(AckResult { error: true, message: message.into() })
    }

    pub fn ok(message: impl Into<String>) -> Self {
        StatementResult::Ack(AckResult { error: false, message: message.into() })
    }

    pub fn is_error(&self) -> bool {
        match self {
            StatementResult::Select(r) => r.error,
            StatementResult::Insert(r) => r.error,
            StatementResult::Delete(r) => r.error,
            StatementResult::Import(r) => r.error,
            StatementResult::Ack(r) => r.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Point;

    #[test]
    fn point_serializes_to_tagged_object() {
        let json = value_to_json(&Value::Point(Point::new(1.5, -2.0)));
        assert_eq!(json["type"], "POINT");
        assert_eq!(json["x"], 1.5);
        assert_eq!(json["y"], -2.0);
        assert_eq!(json["string_representation"], "(1.5, -2)");
    }

    #[test]
    fn projection_restricts_to_named_attributes() {
        use crate::schema::{Attribute, IndexKind};
        use crate::value::DataType;
        let schema = TableSchema {
            table_name: "t".into(),
            attributes: vec![
                Attribute { name: "id".into(), data_type: DataType::Int, is_key: true, index: Some(IndexKind::Hash) },
                Attribute { name: "name".into(), data_type: DataType::Varchar(8), is_key: false, index: None },
            ],
            primary_key: Some("id".into()),
        };
        let values = vec![Value::Int(1), Value::Str("mango".into())];
        let projected = project_row(&schema, &values, Some(&["name".to_string()])).unwrap();
        assert_eq!(projected.len(), 1);
        assert_eq!(projected["name"], "mango");
    }
}
