//! Databases, connections and stored data

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{EngineError, Result};
use crate::event_loop::Turn;
use crate::store::ObjectStore;
use crate::transaction::{Mode, Transaction, TxInner};
use crate::value::{Key, Record};
use crate::Shared;

/// Secondary index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub key_path: String,
    pub unique: bool,
}

/// Records of one object store plus its schema.
#[derive(Debug, Clone)]
pub(crate) struct StoreData {
    pub(crate) key_path: String,
    pub(crate) indexes: BTreeMap<String, IndexSpec>,
    pub(crate) records: BTreeMap<Key, Record>,
}

impl StoreData {
    pub(crate) fn new(key_path: &str) -> Self {
        Self {
            key_path: key_path.to_string(),
            indexes: BTreeMap::new(),
            records: BTreeMap::new(),
        }
    }

    fn key_of(&self, record: &Record) -> Result<Key> {
        let value = record.get(&self.key_path).ok_or_else(|| {
            EngineError::data(format!(
                "record has no value at key path '{}'",
                self.key_path
            ))
        })?;
        Key::from_value(value)
    }

    /// Insert a record, returning its key and the record it replaced.
    /// Without `overwrite`, an existing key is a constraint violation.
    pub(crate) fn insert(&mut self, record: Record, overwrite: bool) -> Result<(Key, Option<Record>)> {
        let key = self.key_of(&record)?;
        if !overwrite && self.records.contains_key(&key) {
            return Err(EngineError::constraint(format!(
                "key '{}' already exists in the object store",
                key
            )));
        }
        self.check_unique(&key, &record)?;
        let previous = self.records.insert(key.clone(), record);
        Ok((key, previous))
    }

    fn check_unique(&self, key: &Key, record: &Record) -> Result<()> {
        for index in self.indexes.values().filter(|i| i.unique) {
            let Some(value) = record.get(&index.key_path) else {
                continue;
            };
            let clash = self
                .records
                .iter()
                .any(|(k, other)| k != key && other.get(&index.key_path) == Some(value));
            if clash {
                return Err(EngineError::constraint(format!(
                    "unique index '{}' already contains '{}'",
                    index.name, value
                )));
            }
        }
        Ok(())
    }

    /// First record strictly after `after`, or the first record.
    pub(crate) fn next_after(&self, after: Option<&Key>) -> Option<(Key, Record)> {
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        self.records
            .range::<Key, _>((lower, Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()))
    }
}

pub(crate) struct DatabaseState {
    pub(crate) version: u32,
    pub(crate) stores: BTreeMap<String, StoreData>,
    /// Running version-change transaction, if any
    pub(crate) upgrade: Option<Arc<TxInner>>,
}

/// A named database owned by the engine.
pub(crate) struct DatabaseCell {
    pub(crate) name: String,
    pub(crate) state: Mutex<DatabaseState>,
}

impl DatabaseCell {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            state: Mutex::new(DatabaseState {
                version: 0,
                stores: BTreeMap::new(),
                upgrade: None,
            }),
        })
    }
}

struct ConnInner {
    shared: Arc<Shared>,
    db: Arc<DatabaseCell>,
    version: u32,
    closed: AtomicBool,
}

/// An open connection to a database.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnInner>,
}

impl Connection {
    pub(crate) fn new(shared: Arc<Shared>, db: Arc<DatabaseCell>, version: u32) -> Self {
        Self {
            inner: Arc::new(ConnInner {
                shared,
                db,
                version,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.db.name
    }

    pub fn version(&self) -> u32 {
        self.inner.version
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Close the connection. New transactions are refused afterwards.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    /// Hold off event delivery. See [`Turn`].
    pub fn turn(&self) -> Turn<'_> {
        self.inner.shared.events.turn()
    }

    pub fn object_store_names(&self) -> Vec<String> {
        self.inner.db.state.lock().stores.keys().cloned().collect()
    }

    pub fn has_object_store(&self, name: &str) -> bool {
        self.inner.db.state.lock().stores.contains_key(name)
    }

    /// Start a transaction over a single store.
    pub fn transaction(&self, store: &str, mode: Mode) -> Result<Transaction> {
        self.transaction_over(&[store], mode)
    }

    /// Start a transaction over several stores.
    pub fn transaction_over(&self, stores: &[&str], mode: Mode) -> Result<Transaction> {
        if self.is_closed() {
            return Err(EngineError::invalid_state("the connection is closed"));
        }
        if mode == Mode::VersionChange {
            return Err(EngineError::invalid_state(
                "version change transactions are created by open",
            ));
        }
        if stores.is_empty() {
            return Err(EngineError::invalid_state("a transaction needs at least one store"));
        }

        let state = self.inner.db.state.lock();
        if state.upgrade.is_some() {
            return Err(EngineError::invalid_state(
                "a version change transaction is running",
            ));
        }
        if let Some(missing) = stores.iter().find(|s| !state.stores.contains_key(**s)) {
            return Err(EngineError::not_found(format!(
                "no object store named '{}'",
                missing
            )));
        }
        drop(state);

        let scope = stores.iter().map(|s| s.to_string()).collect();
        let inner = TxInner::new(
            Arc::clone(&self.inner.shared),
            Arc::clone(&self.inner.db),
            scope,
            mode,
        );
        Ok(Transaction::from_inner(inner))
    }

    /// Create an object store keyed by `key_path`. Only valid while this
    /// connection's upgrade is running.
    pub fn create_object_store(&self, name: &str, key_path: &str) -> Result<ObjectStore> {
        let mut state = self.inner.db.state.lock();
        let upgrade = match &state.upgrade {
            Some(tx) if tx.is_active() => Arc::clone(tx),
            _ => {
                return Err(EngineError::invalid_state(
                    "object stores can only be created during an upgrade",
                ))
            }
        };
        if key_path.is_empty() {
            return Err(EngineError::data("key path must not be empty"));
        }
        if state.stores.contains_key(name) {
            return Err(EngineError::constraint(format!(
                "object store '{}' already exists",
                name
            )));
        }
        state.stores.insert(name.to_string(), StoreData::new(key_path));
        drop(state);

        Ok(ObjectStore::new(Transaction::from_inner(upgrade), name))
    }

    /// Remove an object store. Only valid while this connection's upgrade is running.
    pub fn delete_object_store(&self, name: &str) -> Result<()> {
        let mut state = self.inner.db.state.lock();
        if !matches!(&state.upgrade, Some(tx) if tx.is_active()) {
            return Err(EngineError::invalid_state(
                "object stores can only be deleted during an upgrade",
            ));
        }
        state
            .stores
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found(format!("no object store named '{}'", name)))
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.inner.db.name)
            .field("version", &self.inner.version)
            .field("closed", &self.is_closed())
            .finish()
    }
}
