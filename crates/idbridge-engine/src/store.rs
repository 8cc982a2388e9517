//! Object-store handles

use std::fmt;

use crate::database::IndexSpec;
use crate::error::{EngineError, Result};
use crate::request::Request;
use crate::transaction::{Mode, Op, Transaction};
use crate::value::{Key, Record};

/// An object store seen through one transaction.
///
/// Holding an `ObjectStore` keeps its transaction open.
pub struct ObjectStore {
    tx: Transaction,
    name: String,
}

impl ObjectStore {
    pub(crate) fn new(tx: Transaction, name: &str) -> Self {
        Self {
            tx,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    /// Field the store is keyed on.
    pub fn key_path(&self) -> Result<String> {
        self.with_data(|data| data.key_path.clone())
    }

    pub fn index_names(&self) -> Result<Vec<String>> {
        self.with_data(|data| data.indexes.keys().cloned().collect())
    }

    pub fn index(&self, name: &str) -> Result<IndexSpec> {
        self.with_data(|data| data.indexes.get(name).cloned())?
            .ok_or_else(|| EngineError::not_found(format!("no index named '{}'", name)))
    }

    /// Create a secondary index. Only valid during an upgrade.
    pub fn create_index(&self, name: &str, key_path: &str, unique: bool) -> Result<IndexSpec> {
        if self.tx.mode() != Mode::VersionChange || !self.tx.is_active() {
            return Err(EngineError::invalid_state(
                "indexes can only be created during an upgrade",
            ));
        }

        let mut db = self.tx.inner().db().state.lock();
        let data = db
            .stores
            .get_mut(&self.name)
            .ok_or_else(|| EngineError::not_found(format!("no object store named '{}'", self.name)))?;
        if data.indexes.contains_key(name) {
            return Err(EngineError::constraint(format!(
                "index '{}' already exists on '{}'",
                name, self.name
            )));
        }
        if unique {
            let mut seen = Vec::new();
            for value in data.records.values().filter_map(|r| r.get(key_path)) {
                if seen.contains(&value) {
                    return Err(EngineError::constraint(format!(
                        "existing records violate unique index '{}'",
                        name
                    )));
                }
                seen.push(value);
            }
        }

        let spec = IndexSpec {
            name: name.to_string(),
            key_path: key_path.to_string(),
            unique,
        };
        data.indexes.insert(name.to_string(), spec.clone());
        Ok(spec)
    }

    /// Insert a new record; fails with `ConstraintError` if its key exists.
    pub fn add(&self, record: Record) -> Result<Request> {
        self.ensure_writable()?;
        self.issue(Op::Add(record))
    }

    /// Insert or replace a record by its key.
    pub fn put(&self, record: Record) -> Result<Request> {
        self.ensure_writable()?;
        self.issue(Op::Put(record))
    }

    pub fn get(&self, key: impl Into<Key>) -> Result<Request> {
        self.issue(Op::Get(key.into()))
    }

    /// Delete by key. Deleting an absent key succeeds.
    pub fn delete(&self, key: impl Into<Key>) -> Result<Request> {
        self.ensure_writable()?;
        self.issue(Op::Delete(key.into()))
    }

    pub fn count(&self) -> Result<Request> {
        self.issue(Op::Count)
    }

    /// Open a forward cursor over every record in key order.
    pub fn open_cursor(&self) -> Result<Request> {
        let request = Request::cursor(std::sync::Arc::clone(self.tx.inner()), &self.name);
        self.tx.inner().submit(request, &self.name, Op::Advance(None))
    }

    fn issue(&self, op: Op) -> Result<Request> {
        let request = Request::on_store(std::sync::Arc::clone(self.tx.inner()), &self.name);
        self.tx.inner().submit(request, &self.name, op)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.tx.mode().is_writable() {
            Ok(())
        } else {
            Err(EngineError::read_only(format!(
                "store '{}' was opened read-only",
                self.name
            )))
        }
    }

    fn with_data<T>(&self, f: impl FnOnce(&crate::database::StoreData) -> T) -> Result<T> {
        let db = self.tx.inner().db().state.lock();
        db.stores
            .get(&self.name)
            .map(f)
            .ok_or_else(|| EngineError::not_found(format!("no object store named '{}'", self.name)))
    }
}

impl fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStore")
            .field("name", &self.name)
            .field("transaction", &self.tx)
            .finish()
    }
}
