//! Typed column storage for buffered events.
//!
//! A [`ColumnBatch`] holds one `Vec<Value>` per column of the basket schema.
//! The scheduler only ever looks at its row count; transition bodies and
//! emitters read the values.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;

/// Logical column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// UTF-8 text.
    Text,
    /// Milliseconds since the Unix epoch.
    Timestamp,
}

/// Named, typed column of a basket schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub ty: ColumnType,
}

impl ColumnDef {
    /// Create a column definition.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing value; accepted by every column type.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Timestamp in milliseconds since the epoch.
    Timestamp(u64),
}

impl Value {
    /// Whether this value may be stored in a column of type `ty`.
    #[must_use]
    pub const fn fits(&self, ty: ColumnType) -> bool {
        matches!(
            (self, ty),
            (Self::Null, _)
                | (Self::Bool(_), ColumnType::Bool)
                | (Self::Int(_), ColumnType::Int)
                | (Self::Float(_) | Self::Int(_), ColumnType::Float)
                | (Self::Text(_), ColumnType::Text)
                | (Self::Timestamp(_), ColumnType::Timestamp)
        ) || matches!((self, ty), (Self::Int(v), ColumnType::Timestamp) if *v >= 0)
    }

    /// Convert an accepted value to the column's own representation. Untagged
    /// JSON reads timestamps back as `Int`.
    fn coerce(self, ty: ColumnType) -> Self {
        match (self, ty) {
            (Self::Int(v), ColumnType::Timestamp) => {
                Self::Timestamp(u64::try_from(v).unwrap_or_default())
            }
            (value, _) => value,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Timestamp(v) => write!(f, "{v}"),
        }
    }
}

/// One event: a value per schema column, in schema order.
pub type Row = Vec<Value>;

/// Columnar buffer of events sharing one schema.
#[derive(Debug, Clone)]
pub struct ColumnBatch {
    schema: Arc<[ColumnDef]>,
    columns: Vec<Vec<Value>>,
}

impl ColumnBatch {
    /// Create an empty batch for `schema`.
    #[must_use]
    pub fn new(schema: Arc<[ColumnDef]>) -> Self {
        let columns = vec![Vec::new(); schema.len()];
        Self { schema, columns }
    }

    /// Empty batch with the same schema.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self::new(Arc::clone(&self.schema))
    }

    /// Schema of this batch.
    #[must_use]
    pub fn schema(&self) -> &[ColumnDef] {
        &self.schema
    }

    /// Number of buffered rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Whether the batch holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values of the named column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.schema
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .map(|i| self.columns[i].as_slice())
    }

    /// Copy of row `idx`.
    #[must_use]
    pub fn row(&self, idx: usize) -> Option<Row> {
        if idx >= self.len() {
            return None;
        }
        Some(self.columns.iter().map(|c| c[idx].clone()).collect())
    }

    /// Copies of all rows, in arrival order.
    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        (0..self.len()).filter_map(|i| self.row(i)).collect()
    }

    /// Append one row after checking arity and types.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::RowRejected` if the row does not match the schema;
    /// the batch is left unchanged.
    pub fn push_row(&mut self, row: Row) -> Result<(), SchedulerError> {
        if row.len() != self.schema.len() {
            return Err(SchedulerError::RowRejected(format!(
                "expected {} values, got {}",
                self.schema.len(),
                row.len()
            )));
        }
        if let Some((def, value)) = self
            .schema
            .iter()
            .zip(&row)
            .find(|(def, value)| !value.fits(def.ty))
        {
            return Err(SchedulerError::RowRejected(format!(
                "value {value} does not fit column {} ({:?})",
                def.name, def.ty
            )));
        }
        for ((column, def), value) in self.columns.iter_mut().zip(self.schema.iter()).zip(row) {
            column.push(value.coerce(def.ty));
        }
        Ok(())
    }

    /// Move every row of `other` to the end of this batch.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::RowRejected` if the schemas differ.
    pub fn append_batch(&mut self, other: Self) -> Result<(), SchedulerError> {
        if *self.schema != *other.schema {
            return Err(SchedulerError::RowRejected("schema mismatch".into()));
        }
        for (column, values) in self.columns.iter_mut().zip(other.columns) {
            column.extend(values);
        }
        Ok(())
    }

    /// Drop the first `n` rows, returning how many remain.
    pub fn drop_front(&mut self, n: usize) -> usize {
        let n = n.min(self.len());
        for column in &mut self.columns {
            column.drain(..n);
        }
        self.len()
    }

    /// Copy of the first `n` rows as a new batch.
    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        let n = n.min(self.len());
        Self {
            schema: Arc::clone(&self.schema),
            columns: self.columns.iter().map(|c| c[..n].to_vec()).collect(),
        }
    }

    /// Remove all rows.
    pub fn clear(&mut self) {
        for column in &mut self.columns {
            column.clear();
        }
    }
}
