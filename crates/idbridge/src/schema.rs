//! Table schemas and primary-key inference
//!
//! A [`TableSchema`] names the field a table is keyed on and the secondary
//! index created for every other field. Record types can hand one over
//! explicitly; otherwise it is inferred from the field names with the naming
//! convention in [`is_primary_key`].

use std::fmt;

use thiserror::Error;

/// Why a table schema could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("no primary key found for table {table}")]
    NoPrimaryKey { table: String },

    #[error("multiple primary keys found for table {table}: {}", .fields.join(", "))]
    MultiplePrimaryKeys { table: String, fields: Vec<String> },

    /// An explicit schema names a different table than its record type
    #[error("schema for table {found} registered under table {expected}")]
    TableMismatch { expected: String, found: String },

    /// An explicit schema lists its key field as an index too
    #[error("key field {field} of table {table} cannot also be indexed")]
    KeyIndexed { table: String, field: String },
}

/// Whether `field` names the primary key of `table`.
///
/// Matches case-insensitively: `id`, `id<table>`, `id_<table>`,
/// `<table>id` and `<table>_id`.
pub fn is_primary_key(table: &str, field: &str) -> bool {
    let field = field.to_ascii_lowercase();
    let table = table.to_ascii_lowercase();

    if field == "id" {
        return true;
    }
    if table.is_empty() {
        return false;
    }
    [
        format!("id{}", table),
        format!("id_{}", table),
        format!("{}id", table),
        format!("{}_id", table),
    ]
    .contains(&field)
}

/// A secondary index over one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub unique: bool,
}

/// Layout of one table: its key field and its indexed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub key: String,
    /// Every field except the key, in declaration order
    pub fields: Vec<FieldSpec>,
}

impl TableSchema {
    /// Explicit schema with no indexed fields yet.
    pub fn new(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            fields: Vec::new(),
        }
    }

    /// Add an indexed field.
    pub fn field(mut self, name: impl Into<String>, unique: bool) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            unique,
        });
        self
    }

    /// Infer a schema from field names.
    ///
    /// Exactly one field must match [`is_primary_key`]. Every other field
    /// gets an index, unique when it matches the convention too.
    pub fn infer<S: AsRef<str>>(table: &str, fields: &[S]) -> Result<Self, SchemaError> {
        let keys: Vec<&str> = fields
            .iter()
            .map(AsRef::as_ref)
            .filter(|f| is_primary_key(table, f))
            .collect();

        let key = match keys.as_slice() {
            [] => {
                return Err(SchemaError::NoPrimaryKey {
                    table: table.to_string(),
                })
            }
            [key] => key.to_string(),
            _ => {
                return Err(SchemaError::MultiplePrimaryKeys {
                    table: table.to_string(),
                    fields: keys.iter().map(|k| k.to_string()).collect(),
                })
            }
        };

        let fields = fields
            .iter()
            .map(AsRef::as_ref)
            .filter(|f| *f != key)
            .map(|f| FieldSpec {
                name: f.to_string(),
                unique: is_primary_key(table, f),
            })
            .collect();

        Ok(Self {
            table: table.to_string(),
            key,
            fields,
        })
    }

    /// Check an explicit schema before creating its table.
    pub fn validate(&self, table: &str) -> Result<(), SchemaError> {
        if self.table != table {
            return Err(SchemaError::TableMismatch {
                expected: table.to_string(),
                found: self.table.clone(),
            });
        }
        if self.key.is_empty() {
            return Err(SchemaError::NoPrimaryKey {
                table: self.table.clone(),
            });
        }
        if let Some(field) = self.fields.iter().find(|f| f.name == self.key) {
            return Err(SchemaError::KeyIndexed {
                table: self.table.clone(),
                field: field.name.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}", self.table, self.key)?;
        for field in &self.fields {
            write!(f, ", {}{}", field.name, if field.unique { "!" } else { "" })?;
        }
        f.write_str(")")
    }
}

/// A record type registered for bootstrap.
///
/// Types without a table name are skipped with a warning.
pub trait RecordType: Send + Sync {
    /// Table the type is stored in.
    fn struct_name(&self) -> Option<String> {
        None
    }

    fn field_names(&self) -> Vec<String>;

    /// Explicit schema; when absent the schema is inferred from the field names.
    fn schema(&self) -> Option<TableSchema> {
        None
    }
}

/// A record type described by plain data.
#[derive(Debug, Clone, Default)]
pub struct Template {
    name: Option<String>,
    fields: Vec<String>,
    schema: Option<TableSchema>,
}

impl Template {
    pub fn new<S: Into<String>>(table: impl Into<String>, fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: Some(table.into()),
            fields: fields.into_iter().map(Into::into).collect(),
            schema: None,
        }
    }

    /// A template with no table name. Bootstrap skips it.
    pub fn unnamed<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: None,
            fields: fields.into_iter().map(Into::into).collect(),
            schema: None,
        }
    }

    /// Template with an explicit schema.
    pub fn from_schema(schema: TableSchema) -> Self {
        let mut fields = vec![schema.key.clone()];
        fields.extend(schema.fields.iter().map(|f| f.name.clone()));
        Self {
            name: Some(schema.table.clone()),
            fields,
            schema: Some(schema),
        }
    }
}

impl RecordType for Template {
    fn struct_name(&self) -> Option<String> {
        self.name.clone()
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.clone()
    }

    fn schema(&self) -> Option<TableSchema> {
        self.schema.clone()
    }
}
