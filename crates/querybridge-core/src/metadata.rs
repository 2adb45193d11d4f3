//! Table metadata documents and query results

use serde::{Deserialize, Serialize, Serializer};

/// A single result row: column name to value
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A column as described by the warehouse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// Column name
    pub name: String,

    /// Warehouse data type (e.g. "TEXT", "FIXED")
    #[serde(rename = "type")]
    pub data_type: Option<String>,

    /// Whether the column accepts NULL
    pub nullable: Option<bool>,

    /// Column comment
    pub comment: Option<String>,
}

impl ColumnMetadata {
    /// Create a column with only a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
            nullable: None,
            comment: None,
        }
    }

    /// Set data type
    pub fn with_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    /// Set nullability
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    /// Set comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Descriptive document for one warehouse table
///
/// One document is produced per discovered table and stored as a single
/// JSON text blob in the vector index. Documents are never updated in
/// place; a re-index writes fresh copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadataDocument {
    /// Database name
    pub database: Option<String>,

    /// Table name
    pub table: String,

    /// Schema name
    pub schema: Option<String>,

    /// Table comment
    pub comment: Option<String>,

    /// Columns in warehouse order
    pub columns: Vec<ColumnMetadata>,
}

impl TableMetadataDocument {
    /// Create a document for a table with no columns yet
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            database: None,
            table: table.into(),
            schema: None,
            comment: None,
            columns: Vec::new(),
        }
    }

    /// Set database and schema
    pub fn in_schema(mut self, database: impl Into<String>, schema: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self.schema = Some(schema.into());
        self
    }

    /// Set table comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Append a column
    pub fn with_column(mut self, column: ColumnMetadata) -> Self {
        self.columns.push(column);
        self
    }

    /// `database.schema.table` when both qualifiers are known, else the bare table name
    pub fn qualified_name(&self) -> String {
        match (&self.database, &self.schema) {
            (Some(database), Some(schema)) => format!("{}.{}.{}", database, schema, self.table),
            _ => self.table.clone(),
        }
    }

    /// [`qualified_name`](Self::qualified_name) with every part double-quoted
    ///
    /// Unquoted identifiers are upper-cased by the warehouse, so statements
    /// built from catalog names must quote them to keep their case.
    pub fn quoted_name(&self) -> String {
        let table = quote_identifier(&self.table);
        match (&self.database, &self.schema) {
            (Some(database), Some(schema)) => {
                format!("{}.{}.{}", quote_identifier(database), quote_identifier(schema), table)
            }
            _ => table,
        }
    }

    /// Serialize to the text blob stored in the vector index
    pub fn to_page_content(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Double-quote an identifier, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Outcome of answering a question
///
/// Serializes as the row array, as `null` when the warehouse returned no
/// row set, or as the literal string `"nothing"` when no SQL was run.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResults {
    /// Rows returned by the warehouse
    Rows(Vec<Row>),

    /// Statement ran but produced no row set
    Undefined,

    /// No metadata matched or the model produced no SQL
    Nothing,
}

impl QueryResults {
    /// Sentinel string for the `Nothing` outcome
    pub const NOTHING: &'static str = "nothing";

    /// Wrap an optional driver row set
    pub fn from_rows(rows: Option<Vec<Row>>) -> Self {
        match rows {
            Some(rows) => Self::Rows(rows),
            None => Self::Undefined,
        }
    }

    /// Whether this is the "nothing" sentinel
    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }

    /// Rows, if any were returned
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            Self::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

impl Serialize for QueryResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Rows(rows) => rows.serialize(serializer),
            Self::Undefined => serializer.serialize_none(),
            Self::Nothing => serializer.serialize_str(Self::NOTHING),
        }
    }
}
