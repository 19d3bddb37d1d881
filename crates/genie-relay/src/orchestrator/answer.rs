//! The resolved answer handed to the renderer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::genie::StatementResponse;

/// Outcome of one question: free text, a table, or a user-safe error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenieAnswer {
    Text { message: String },
    Table(TableAnswer),
    Error { message: String },
}

impl GenieAnswer {
    pub fn text(message: impl Into<String>) -> Self {
        GenieAnswer::Text {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        GenieAnswer::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, GenieAnswer::Error { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Declared SQL type, upper case (e.g. `BIGINT`). Empty when unknown.
    pub type_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableAnswer {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// Payload Extraction
// ============================================================================

/// Statement result with an unexpected shape.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("statement result is not an object")]
    NotAnObject,

    #[error("`{0}` is not an array")]
    RowsNotArray(&'static str),

    #[error("row {0} is not an array")]
    RowNotArray(usize),
}

impl TableAnswer {
    /// Build a table from a fetched statement.
    ///
    /// `sql` wins over any SQL text the statement carries.
    pub fn from_statement(
        statement: &StatementResponse,
        sql: Option<String>,
        description: Option<String>,
    ) -> Result<Self, PayloadError> {
        let columns = statement
            .columns()
            .iter()
            .enumerate()
            .map(|(i, c)| Column {
                name: if c.name.is_empty() {
                    format!("col{}", i + 1)
                } else {
                    c.name.clone()
                },
                type_name: c.type_name.as_deref().unwrap_or_default().to_uppercase(),
            })
            .collect();

        let sql = non_blank(sql).or_else(|| non_blank(statement.statement.clone()));

        Ok(Self {
            columns,
            rows: extract_rows(&statement.result)?,
            sql,
            description: non_blank(description),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Pull rows out of a statement result.
///
/// Accepts flat `data_array` rows or `data_typed_array` rows whose cells
/// wrap their value as `{"v": ...}`. A missing result means no rows.
pub fn extract_rows(result: &Value) -> Result<Vec<Vec<Value>>, PayloadError> {
    let object = match result {
        Value::Null => return Ok(Vec::new()),
        Value::Object(map) => map,
        _ => return Err(PayloadError::NotAnObject),
    };

    if let Some(rows) = object.get("data_array").filter(|v| !v.is_null()) {
        let rows = rows
            .as_array()
            .ok_or(PayloadError::RowsNotArray("data_array"))?;
        return rows
            .iter()
            .enumerate()
            .map(|(i, row)| row.as_array().cloned().ok_or(PayloadError::RowNotArray(i)))
            .collect();
    }

    if let Some(rows) = object.get("data_typed_array").filter(|v| !v.is_null()) {
        let rows = rows
            .as_array()
            .ok_or(PayloadError::RowsNotArray("data_typed_array"))?;
        return rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let cells = row.as_array().ok_or(PayloadError::RowNotArray(i))?;
                Ok(cells.iter().map(unwrap_typed_cell).collect())
            })
            .collect();
    }

    Ok(Vec::new())
}

fn unwrap_typed_cell(cell: &Value) -> Value {
    match cell {
        Value::Object(map) => map.get("v").cloned().unwrap_or(Value::Null),
        other => other.clone(),
    }
}
