//! Query descriptors built by the ORM layer

use std::fmt;
use std::str::FromStr;

use idbridge_engine::{Record, Value};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What a query does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Delete,
    ReadOne,
    ReadAll,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::ReadOne => "read_one",
            Action::ReadAll => "read_all",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            ">" => Ok(Operator::Gt),
            "<" => Ok(Operator::Lt),
            ">=" => Ok(Operator::Ge),
            "<=" => Ok(Operator::Le),
            other => Err(Error::InvalidQuery(format!("unknown operator '{}'", other))),
        }
    }
}

/// A single field condition. A query's conditions are ANDed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    field: String,
    operator: Operator,
    value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Gt, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Lt, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Ge, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Le, value)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

/// A query descriptor. The adapter never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub table: String,
    pub action: Action,
    /// Column names for writes, paired index-wise with `values`
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Query {
    pub fn new(table: impl Into<String>, action: Action) -> Self {
        Self {
            table: table.into(),
            action,
            columns: Vec::new(),
            values: Vec::new(),
            conditions: Vec::new(),
        }
    }

    pub fn create(table: impl Into<String>) -> Self {
        Self::new(table, Action::Create)
    }

    pub fn update(table: impl Into<String>) -> Self {
        Self::new(table, Action::Update)
    }

    pub fn delete(table: impl Into<String>) -> Self {
        Self::new(table, Action::Delete)
    }

    pub fn read_one(table: impl Into<String>) -> Self {
        Self::new(table, Action::ReadOne)
    }

    pub fn read_all(table: impl Into<String>) -> Self {
        Self::new(table, Action::ReadAll)
    }

    /// Add a `(column, value)` pair.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.push(column.into());
        self.values.push(value.into());
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Assemble the record a write stores. Columns and values must pair up.
    pub fn record(&self) -> Result<Record> {
        if self.columns.len() != self.values.len() {
            return Err(Error::InvalidQuery(format!(
                "{} columns but {} values for table {}",
                self.columns.len(),
                self.values.len(),
                self.table
            )));
        }
        if self.columns.is_empty() {
            return Err(Error::InvalidQuery(format!(
                "{} on table {} has no columns",
                self.action, self.table
            )));
        }
        Ok(self
            .columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_operator_parse() {
        let parsed: Vec<Operator> = ["=", "!=", ">", "<", ">=", "<="]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(
            parsed,
            vec![
                Operator::Eq,
                Operator::Ne,
                Operator::Gt,
                Operator::Lt,
                Operator::Ge,
                Operator::Le
            ]
        );
        assert!("LIKE".parse::<Operator>().is_err());
    }

    #[test]
    fn test_record_pairs_columns_and_values() {
        let query = Query::create("user").set("ID", "1").set("Age", 30);
        let record = query.record().unwrap();
        assert_eq!(record["ID"], Value::from("1"));
        assert_eq!(record["Age"], Value::Number(30.0));
    }

    #[test]
    fn test_record_rejects_mismatched_lengths() {
        let mut query = Query::create("user").set("ID", "1");
        query.values.clear();
        assert!(matches!(query.record(), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_query_from_json() {
        let query: Query = serde_json::from_str(
            r#"{
                "table": "product",
                "action": "read_all",
                "conditions": [{"field": "Price", "operator": ">", "value": 1.8}]
            }"#,
        )
        .unwrap();
        assert_eq!(query, Query::read_all("product").filter(Condition::gt("Price", 1.8)));
    }
}
