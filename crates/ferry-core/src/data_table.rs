//! In-memory tabular buffer exchanged between producer and consumer
//!
//! A `DataTable` carries its own schema (`DataColumn`s with a canonical
//! `ColumnType`) so the destination side can create tables and map types
//! without going back to the source. Buffers are moved from stage to stage
//! and dropped once written.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{DialectKind, FerryError, QueryResult, Result, Value, native_column_type};

/// Canonical column type, independent of any database engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal,
    String,
    Bytes,
    Uuid,
    Date,
    Time,
    DateTime,
    DateTimeTz,
    Json,
    Array,
}

impl ColumnType {
    /// Canonical name, the key of every dialect's type-mapping table
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Bool => "bool",
            ColumnType::Int8 => "int8",
            ColumnType::Int16 => "int16",
            ColumnType::Int32 => "int32",
            ColumnType::Int64 => "int64",
            ColumnType::Float32 => "float32",
            ColumnType::Float64 => "float64",
            ColumnType::Decimal => "decimal",
            ColumnType::String => "string",
            ColumnType::Bytes => "bytes",
            ColumnType::Uuid => "uuid",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::DateTime => "datetime",
            ColumnType::DateTimeTz => "datetimetz",
            ColumnType::Json => "json",
            ColumnType::Array => "array",
        }
    }

    /// Type of a concrete value; `None` for NULL
    pub fn of(value: &Value) -> Option<ColumnType> {
        let ty = match value {
            Value::Null => return None,
            Value::Bool(_) => ColumnType::Bool,
            Value::Int8(_) => ColumnType::Int8,
            Value::Int16(_) => ColumnType::Int16,
            Value::Int32(_) => ColumnType::Int32,
            Value::Int64(_) => ColumnType::Int64,
            Value::Float32(_) => ColumnType::Float32,
            Value::Float64(_) => ColumnType::Float64,
            Value::Decimal(_) => ColumnType::Decimal,
            Value::String(_) => ColumnType::String,
            Value::Bytes(_) => ColumnType::Bytes,
            Value::Uuid(_) => ColumnType::Uuid,
            Value::Date(_) => ColumnType::Date,
            Value::Time(_) => ColumnType::Time,
            Value::DateTime(_) => ColumnType::DateTime,
            Value::DateTimeUtc(_) => ColumnType::DateTimeTz,
            Value::Json(_) => ColumnType::Json,
            Value::Array(_) => ColumnType::Array,
        };
        Some(ty)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = FerryError;

    fn from_str(s: &str) -> Result<Self> {
        let ty = match s.to_ascii_lowercase().as_str() {
            "bool" => ColumnType::Bool,
            "int8" => ColumnType::Int8,
            "int16" => ColumnType::Int16,
            "int32" => ColumnType::Int32,
            "int64" => ColumnType::Int64,
            "float32" => ColumnType::Float32,
            "float64" => ColumnType::Float64,
            "decimal" => ColumnType::Decimal,
            "string" => ColumnType::String,
            "bytes" => ColumnType::Bytes,
            "uuid" => ColumnType::Uuid,
            "date" => ColumnType::Date,
            "time" => ColumnType::Time,
            "datetime" => ColumnType::DateTime,
            "datetimetz" => ColumnType::DateTimeTz,
            "json" => ColumnType::Json,
            "array" => ColumnType::Array,
            other => {
                return Err(FerryError::Schema(format!("unknown column type '{}'", other)));
            }
        };
        Ok(ty)
    }
}

/// One column of a `DataTable`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataColumn {
    pub name: String,
    pub column_type: ColumnType,
    /// Maximum character length for bounded strings
    pub max_length: Option<i64>,
    pub nullable: bool,
}

impl DataColumn {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            max_length: None,
            nullable: true,
        }
    }

    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Which slice of a fetch window a buffer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageInfo {
    pub offset: u64,
    pub limit: u64,
    /// First page of the window (newest rows when partitioning)
    pub is_first: bool,
    /// Last page of the window: fewer rows than `limit` came back
    pub is_last: bool,
    /// Fetched newest-first through a partition condition
    pub partitioned: bool,
}

impl PageInfo {
    /// A buffer holding the entire window
    pub fn whole() -> Self {
        Self {
            offset: 0,
            limit: 0,
            is_first: true,
            is_last: true,
            partitioned: false,
        }
    }

    pub fn for_fetch(offset: u64, limit: u64, rows: usize) -> Self {
        Self {
            offset,
            limit,
            is_first: offset == 0,
            is_last: (rows as u64) < limit,
            partitioned: false,
        }
    }

    pub fn with_partitioned(mut self, partitioned: bool) -> Self {
        self.partitioned = partitioned;
        self
    }
}

/// Schema-carrying row set
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    pub name: String,
    pub columns: Vec<DataColumn>,
    pub rows: Vec<Vec<Value>>,
    pub page: PageInfo,
}

impl DataTable {
    pub fn new(name: impl Into<String>, columns: Vec<DataColumn>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
            page: PageInfo::whole(),
        }
    }

    /// Build a table from raw rows, inferring each column's type from its
    /// first non-null value. Columns holding only NULLs become strings.
    pub fn from_rows(name: impl Into<String>, column_names: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let declared = vec![None; column_names.len()];
        Self::from_declared_rows(name, column_names, declared, rows)
    }

    /// Columns with a declared type keep it; the rest are inferred as in
    /// [`from_rows`](Self::from_rows)
    fn from_declared_rows(
        name: impl Into<String>,
        column_names: Vec<String>,
        declared: Vec<Option<ColumnType>>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        let columns = column_names
            .into_iter()
            .zip(declared)
            .enumerate()
            .map(|(idx, (column_name, declared))| {
                let column_type = declared
                    .or_else(|| {
                        rows.iter()
                            .filter_map(|row| row.get(idx))
                            .find_map(ColumnType::of)
                    })
                    .unwrap_or(ColumnType::String);
                DataColumn::new(column_name, column_type)
            })
            .collect();

        Self {
            name: name.into(),
            columns,
            rows,
            page: PageInfo::whole(),
        }
    }

    /// Convert a driver result into a buffer, typing columns from the
    /// driver's column metadata and falling back to the values
    pub fn from_query_result(name: impl Into<String>, dialect: DialectKind, result: QueryResult) -> Self {
        let names: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
        let declared: Vec<Option<ColumnType>> = result
            .columns
            .iter()
            .map(|c| native_column_type(dialect, &c.data_type))
            .collect();
        let lengths: Vec<Option<i64>> = result.columns.iter().map(|c| c.max_length).collect();
        let rows = result.rows.into_iter().map(|row| row.into_values()).collect();

        let mut table = Self::from_declared_rows(name, names, declared, rows);
        for (column, max_length) in table.columns.iter_mut().zip(lengths) {
            if column.column_type == ColumnType::String {
                column.max_length = max_length.filter(|len| *len > 0);
            }
        }
        table
    }

    pub fn with_page(mut self, page: PageInfo) -> Self {
        self.page = page;
        self
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(FerryError::Schema(format!(
                "row has {} values but table '{}' has {} columns",
                row.len(),
                self.name,
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Case-insensitive column lookup
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Empty table with the same schema
    pub fn clone_schema(&self) -> DataTable {
        Self {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: Vec::new(),
            page: self.page,
        }
    }

    pub fn make_all_nullable(&mut self) {
        for column in &mut self.columns {
            column.nullable = true;
        }
    }

    /// Append the rows of `other`, matching columns by name.
    ///
    /// Columns this table has but `other` lacks are filled with NULL; columns
    /// only `other` has are dropped. Returns the number of rows appended.
    pub fn merge(&mut self, other: DataTable) -> usize {
        let mapping: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|column| other.column_index(&column.name))
            .collect();

        let appended = other.rows.len();
        self.rows.reserve(appended);
        for row in other.rows {
            let mut row: Vec<Option<Value>> = row.into_iter().map(Some).collect();
            let merged = mapping
                .iter()
                .map(|source| {
                    source
                        .and_then(|idx| row.get_mut(idx).and_then(Option::take))
                        .unwrap_or(Value::Null)
                })
                .collect();
            self.rows.push(merged);
        }
        appended
    }

    /// Remove the named columns (case-insensitive); unknown names are ignored
    pub fn drop_columns(&mut self, names: &[String]) {
        let keep: Vec<bool> = self
            .columns
            .iter()
            .map(|c| !names.iter().any(|n| n.eq_ignore_ascii_case(&c.name)))
            .collect();
        if keep.iter().all(|k| *k) {
            return;
        }

        let mut flags = keep.iter();
        self.columns.retain(|_| flags.next().copied().unwrap_or(true));
        for row in &mut self.rows {
            let mut flags = keep.iter();
            row.retain(|_| flags.next().copied().unwrap_or(true));
        }
    }

    /// Keep only the named columns (case-insensitive), in table order
    pub fn retain_columns(&mut self, names: &[String]) {
        let dropped: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !names.iter().any(|n| n.eq_ignore_ascii_case(&c.name)))
            .map(|c| c.name.clone())
            .collect();
        self.drop_columns(&dropped);
    }

    /// Append a column holding the same value in every row
    pub fn add_constant_column(&mut self, column: DataColumn, value: Value) {
        for row in &mut self.rows {
            row.push(value.clone());
        }
        self.columns.push(column);
    }

    /// Distinct non-null values of a column, in first-seen order
    pub fn distinct_values(&self, column: &str) -> Vec<Value> {
        let Some(idx) = self.column_index(column) else {
            return Vec::new();
        };
        let mut seen: Vec<Value> = Vec::new();
        for value in self.rows.iter().filter_map(|row| row.get(idx)) {
            if !value.is_null() && !seen.contains(value) {
                seen.push(value.clone());
            }
        }
        seen
    }

    /// Approximate payload size in bytes
    pub fn estimated_bytes(&self) -> u64 {
        self.rows
            .iter()
            .flat_map(|row| row.iter())
            .map(|value| value.estimated_size() as u64)
            .sum()
    }
}
