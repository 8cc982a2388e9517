//! ORM model contract and record mapping

use idbridge_engine::{Record, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::query::{Action, Query};

/// A writable destination for one column.
#[derive(Debug)]
pub enum Slot<'a> {
    Text(&'a mut String),
    /// Receives numbers truncated toward zero
    Int(&'a mut i64),
    Float(&'a mut f64),
    Bool(&'a mut bool),
    /// A field type the adapter does not map; left untouched on read
    Unsupported,
}

impl Slot<'_> {
    /// Assign `value` if its kind fits the slot. Returns whether it did.
    pub fn assign(&mut self, value: &Value) -> bool {
        match (self, value) {
            (Slot::Text(dest), Value::Text(s)) => {
                dest.clone_from(s);
                true
            }
            (Slot::Int(dest), Value::Number(n)) => {
                **dest = n.trunc() as i64;
                true
            }
            (Slot::Float(dest), Value::Number(n)) => {
                **dest = *n;
                true
            }
            (Slot::Bool(dest), Value::Bool(b)) => {
                **dest = *b;
                true
            }
            _ => false,
        }
    }
}

/// A record type the ORM layer reads into and writes from.
///
/// `columns`, `values` and `pointers` are index-aligned.
pub trait Model {
    fn table_name(&self) -> &str;

    fn columns(&self) -> &[&str];

    fn values(&self) -> Vec<Value>;

    fn pointers(&mut self) -> Vec<Slot<'_>>;
}

impl<M: Model + ?Sized> Model for Box<M> {
    fn table_name(&self) -> &str {
        (**self).table_name()
    }

    fn columns(&self) -> &[&str] {
        (**self).columns()
    }

    fn values(&self) -> Vec<Value> {
        (**self).values()
    }

    fn pointers(&mut self) -> Vec<Slot<'_>> {
        (**self).pointers()
    }
}

impl Query {
    /// Write query carrying every column of `model`.
    pub fn for_model<M: Model + ?Sized>(action: Action, model: &M) -> Self {
        let mut query = Query::new(model.table_name(), action);
        query.columns = model.columns().iter().map(|c| c.to_string()).collect();
        query.values = model.values();
        query
    }
}

/// Copy matching fields of `record` into `model`.
///
/// Columns absent from the record, unsupported slots and values whose kind
/// does not fit the slot are left untouched.
pub fn map_record<M: Model + ?Sized>(record: &Record, model: &mut M) -> Result<()> {
    let columns: Vec<String> = model.columns().iter().map(|c| c.to_string()).collect();
    let table = model.table_name().to_string();
    let mut slots = model.pointers();
    if slots.len() != columns.len() {
        return Err(Error::InvalidQuery(format!(
            "model for table {} has {} columns but {} pointers",
            table,
            columns.len(),
            slots.len()
        )));
    }

    for (column, slot) in columns.iter().zip(slots.iter_mut()) {
        let Some(value) = record.get(column) else {
            continue;
        };
        if !slot.assign(value) {
            debug!(table = %table, column = %column, kind = value.type_name(), "value not mapped");
        }
    }
    Ok(())
}
