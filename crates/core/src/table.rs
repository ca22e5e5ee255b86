use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{RegroupError, Result};

/// Request/response envelope: `{"tables": [...]}` plus whatever else the caller sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePayload {
    pub tables: Vec<Table>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TablePayload {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn first_table(&self) -> Result<&Table> {
        self.tables
            .first()
            .ok_or_else(|| RegroupError::malformed("payload contains no tables"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub groups: Vec<GroupDescriptor>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub columns: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_membership: Option<Vec<Vec<String>>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Table {
    /// Number of rows, taken from the first column.
    pub fn row_count(&self) -> usize {
        self.columns.first().map(Vec::len).unwrap_or(0)
    }

    pub fn value_field(&self) -> Result<&FieldDescriptor> {
        self.fields
            .last()
            .ok_or_else(|| RegroupError::malformed("table has no fields"))
    }

    /// Space-joined group names, used for the merged dimension.
    pub fn merged_group_name(&self) -> String {
        self.groups
            .iter()
            .map(|group| group.name.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GroupDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agg: Option<AggDescriptor>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FieldDescriptor {
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Some("string".to_string()),
            agg: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A numeric cell. Integers stay integers until an operation forces a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measure {
    Int(i64),
    Float(f64),
}

impl Measure {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Some(Measure::Int(int))
                } else {
                    number.as_f64().map(Measure::Float)
                }
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Measure::Int(v) => v as f64,
            Measure::Float(v) => v,
        }
    }

    pub fn add(self, other: Measure) -> Measure {
        match (self, other) {
            (Measure::Int(a), Measure::Int(b)) => match a.checked_add(b) {
                Some(sum) => Measure::Int(sum),
                None => Measure::Float(a as f64 + b as f64),
            },
            (a, b) => Measure::Float(a.as_f64() + b.as_f64()),
        }
    }

    pub fn total_cmp(&self, other: &Measure) -> Ordering {
        match (self, other) {
            (Measure::Int(a), Measure::Int(b)) => a.cmp(b),
            (a, b) => a.as_f64().total_cmp(&b.as_f64()),
        }
    }

    pub fn to_value(self) -> Value {
        match self {
            Measure::Int(v) => Value::Number(Number::from(v)),
            Measure::Float(v) => Number::from_f64(v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_keeps_unknown_attributes() {
        let raw = json!({
            "tables": [{
                "groups": [{"name": "region", "label": "Region"}],
                "fields": [
                    {"name": "region", "type": "string"},
                    {"name": "revenue", "agg": {"name": "count", "field": "*"}}
                ],
                "columns": [["A"], [1]],
                "title": "by region"
            }],
            "request_id": "abc"
        });
        let payload: TablePayload = serde_json::from_value(raw.clone()).unwrap();
        let table = payload.first_table().unwrap();
        assert_eq!(table.extra.get("title"), Some(&json!("by region")));
        assert_eq!(table.groups[0].extra.get("label"), Some(&json!("Region")));
        assert_eq!(serde_json::to_value(&payload).unwrap(), raw);
    }

    #[test]
    fn merged_group_name_joins_with_spaces() {
        let table = Table {
            groups: vec![GroupDescriptor::named("country"), GroupDescriptor::named("city")],
            fields: Vec::new(),
            columns: Vec::new(),
            group_membership: None,
            extra: Map::new(),
        };
        assert_eq!(table.merged_group_name(), "country city");
    }

    #[test]
    fn measure_sum_overflows_into_float() {
        let sum = Measure::Int(i64::MAX).add(Measure::Int(1));
        assert!(matches!(sum, Measure::Float(_)));
        assert_eq!(Measure::Int(2).add(Measure::Int(3)), Measure::Int(5));
        assert_eq!(Measure::Int(2).add(Measure::Float(0.5)), Measure::Float(2.5));
    }

    #[test]
    fn measure_rejects_non_numbers() {
        assert_eq!(Measure::from_value(&json!("12")), None);
        assert_eq!(Measure::from_value(&json!(12)), Some(Measure::Int(12)));
        assert_eq!(Measure::from_value(&json!(1.5)), Some(Measure::Float(1.5)));
    }
}
