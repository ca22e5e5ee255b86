use indexmap::IndexMap;
use itertools::Itertools;
use serde_json::Value;
use tracing::warn;

use crate::config::DuplicatePolicy;
use crate::error::{RegroupError, Result};
use crate::table::{Measure, Table};

pub const LABEL_SEPARATOR: &str = ", ";

/// Row labels in input order plus the label -> value lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupKeys {
    pub labels: Vec<String>,
    pub values: IndexMap<String, Measure>,
}

impl GroupKeys {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn value_of(&self, label: &str) -> Option<Measure> {
        self.values.get(label).copied()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GroupKeyBuilder {
    duplicates: DuplicatePolicy,
}

impl GroupKeyBuilder {
    pub fn new(duplicates: DuplicatePolicy) -> Self {
        Self { duplicates }
    }

    pub fn build(&self, table: &Table) -> Result<GroupKeys> {
        let columns = &table.columns;
        if columns.len() < 2 {
            return Err(RegroupError::malformed(format!(
                "expected at least one key column and one value column, got {} column(s)",
                columns.len()
            )));
        }
        let rows = columns[0].len();
        if let Some((idx, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != rows) {
            return Err(RegroupError::malformed(format!(
                "column {idx} has {} rows, expected {rows}",
                col.len()
            )));
        }
        let (value_column, key_columns) = columns
            .split_last()
            .ok_or_else(|| RegroupError::malformed("table has no columns"))?;

        let mut labels = Vec::with_capacity(rows);
        let mut values = IndexMap::with_capacity(rows);
        let mut duplicates = 0usize;
        for row in 0..rows {
            let label = key_columns
                .iter()
                .map(|column| canonical_cell(&column[row]))
                .join(LABEL_SEPARATOR);
            let value = Measure::from_value(&value_column[row]).ok_or_else(|| {
                RegroupError::malformed(format!(
                    "value cell in row {row} is not a number: {}",
                    value_column[row]
                ))
            })?;
            if values.insert(label.clone(), value).is_some() {
                if self.duplicates == DuplicatePolicy::Reject {
                    return Err(RegroupError::malformed(format!(
                        "duplicate group label {label:?} in row {row}"
                    )));
                }
                duplicates += 1;
            }
            labels.push(label);
        }
        if duplicates > 0 {
            warn!(duplicates, "duplicate group labels; later rows overwrite earlier values");
        }
        Ok(GroupKeys { labels, values })
    }
}

/// String form of a key cell as it appears inside a label. Null and booleans
/// are spelled `None`, `True` and `False` so labels match what upstream
/// producers emit for the same rows.
pub fn canonical_cell(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
