//! CRUD operations and the ORM entry point

use idbridge_engine::{Key, Mode, Record, Response};
use tracing::{debug, warn};

use crate::adapter::Adapter;
use crate::bridge::RequestFuture;
use crate::error::{Error, Result};
use crate::model::{map_record, Model};
use crate::predicate::{key_lookup, matches};
use crate::query::{Action, Query};
use crate::resolver::StoreHandle;
use crate::tracing::prefix;

/// Receives the records of a read-all query.
pub trait Sink {
    /// A blank destination for the next record.
    fn make(&mut self) -> Box<dyn Model>;

    fn accept(&mut self, model: Box<dyn Model>);
}

/// A [`Sink`] built from a factory and a callback.
pub struct FnSink<F, E> {
    factory: F,
    each: E,
}

impl<F, E> FnSink<F, E>
where
    F: FnMut() -> Box<dyn Model>,
    E: FnMut(Box<dyn Model>),
{
    pub fn new(factory: F, each: E) -> Self {
        Self { factory, each }
    }
}

impl<F, E> Sink for FnSink<F, E>
where
    F: FnMut() -> Box<dyn Model>,
    E: FnMut(Box<dyn Model>),
{
    fn make(&mut self) -> Box<dyn Model> {
        (self.factory)()
    }

    fn accept(&mut self, model: Box<dyn Model>) {
        (self.each)(model)
    }
}

impl Adapter {
    /// Run a query built by the ORM layer.
    ///
    /// Reads map into `model`; read-all delivers through `sink`, which is
    /// required for that action.
    pub fn execute(
        &self,
        query: &Query,
        model: &mut dyn Model,
        sink: Option<&mut dyn Sink>,
    ) -> Result<()> {
        match query.action {
            Action::Create => self.create(query),
            Action::Update => self.update(query),
            Action::Delete => self.delete(query),
            Action::ReadOne => self.read_one(query, model),
            Action::ReadAll => {
                let sink = sink.ok_or_else(|| {
                    Error::InvalidQuery(format!("read_all on table {} needs a sink", query.table))
                })?;
                self.scan_matches(query, |record| {
                    let mut item = sink.make();
                    match map_record(record, &mut item) {
                        Ok(()) => sink.accept(item),
                        Err(err) => warn!("{} mapping error: {}", prefix::DB, err),
                    }
                })
            }
        }
    }

    /// Insert a new record built from the query's columns and values.
    ///
    /// The record must carry its key; an existing key is rejected.
    pub fn create(&self, query: &Query) -> Result<()> {
        let record = query.record()?;
        let handle = self.resolve(&query.table, Mode::ReadWrite)?;
        let pending = handle.issue("add", move |store| store.add(record))?;
        self.settle(&handle, "add", pending)?;
        handle.finish(&self.waiter)
    }

    /// Replace the record with the same key, creating it if absent.
    pub fn update(&self, query: &Query) -> Result<()> {
        let record = query.record()?;
        let handle = self.resolve(&query.table, Mode::ReadWrite)?;
        let pending = handle.issue("put", move |store| store.put(record))?;
        self.settle(&handle, "put", pending)?;
        handle.finish(&self.waiter)
    }

    /// Create a record from every column of `model`.
    pub fn insert<M: Model + ?Sized>(&self, model: &M) -> Result<()> {
        self.create(&Query::for_model(Action::Create, model))
    }

    /// Upsert a record from every column of `model`.
    pub fn upsert<M: Model + ?Sized>(&self, model: &M) -> Result<()> {
        self.update(&Query::for_model(Action::Update, model))
    }

    /// Delete every record matching the query's conditions.
    ///
    /// A single equality on the key field deletes by key; deleting an absent
    /// key succeeds. Anything else scans the table, collects the matching
    /// keys and deletes them one by one in the same transaction.
    pub fn delete(&self, query: &Query) -> Result<()> {
        if query.conditions.is_empty() {
            return Err(Error::UnsupportedOperation(format!(
                "delete on table {} without conditions",
                query.table
            )));
        }

        let handle = self.resolve(&query.table, Mode::ReadWrite)?;
        let keys = match key_lookup(&query.conditions, &handle.key_path()?) {
            Some(key) => vec![key],
            None => self.collect_keys(&handle, query)?,
        };

        debug!("{} deleting {} from {}", prefix::DB, keys.len(), query.table);
        for key in keys {
            let pending = handle.issue("delete", move |store| store.delete(key))?;
            self.settle(&handle, "delete", pending)?;
        }
        handle.finish(&self.waiter)
    }

    /// Map the first record matching the query into `model`.
    ///
    /// Fails with [`Error::NotFound`] when nothing matches.
    pub fn read_one<M: Model + ?Sized>(&self, query: &Query, model: &mut M) -> Result<()> {
        let handle = self.resolve(&query.table, Mode::ReadOnly)?;

        let found = match key_lookup(&query.conditions, &handle.key_path()?) {
            Some(key) => self.get(&handle, key)?,
            None => {
                let mut found = None;
                handle.scan(&self.waiter)?.visit(|_, record| {
                    if matches(record, &query.conditions) {
                        found = Some(record.clone());
                        return false;
                    }
                    true
                })?;
                found
            }
        };
        handle.finish(&self.waiter)?;

        match found {
            Some(record) => map_record(&record, model),
            None => Err(Error::NotFound {
                table: query.table.clone(),
            }),
        }
    }

    /// Every record matching the query, mapped into fresh `M`s.
    pub fn read_all<M: Model + Default>(&self, query: &Query) -> Result<Vec<M>> {
        let mut items = Vec::new();
        self.read_all_with(query, M::default, |item| items.push(item))?;
        Ok(items)
    }

    /// Deliver every record matching the query to `each`, each mapped into a
    /// new destination from `factory`.
    ///
    /// Records already delivered stay delivered if the scan later fails.
    pub fn read_all_with<M, F, E>(&self, query: &Query, mut factory: F, mut each: E) -> Result<()>
    where
        M: Model,
        F: FnMut() -> M,
        E: FnMut(M),
    {
        self.scan_matches(query, |record| {
            let mut item = factory();
            match map_record(record, &mut item) {
                Ok(()) => each(item),
                Err(err) => warn!("{} mapping error: {}", prefix::DB, err),
            }
        })
    }

    /// Scan the whole table read-only and hand every match to `each`.
    fn scan_matches(&self, query: &Query, mut each: impl FnMut(&Record)) -> Result<()> {
        let handle = self.resolve(&query.table, Mode::ReadOnly)?;
        handle.scan(&self.waiter)?.visit(|_, record| {
            if matches(record, &query.conditions) {
                each(record);
            }
            true
        })?;
        handle.finish(&self.waiter)
    }

    fn collect_keys(&self, handle: &StoreHandle, query: &Query) -> Result<Vec<Key>> {
        let mut keys = Vec::new();
        handle.scan(&self.waiter)?.visit(|key, record| {
            if matches(record, &query.conditions) {
                keys.push(key.clone());
            }
            true
        })?;
        Ok(keys)
    }

    fn get(&self, handle: &StoreHandle, key: Key) -> Result<Option<Record>> {
        let pending = handle.issue("get", move |store| store.get(key))?;
        match self.settle(handle, "get", pending)? {
            Response::Record(record) => Ok(record),
            other => Err(Error::RequestFailed {
                table: handle.table().to_string(),
                op: "get",
                message: format!("unexpected response {:?}", other),
            }),
        }
    }

    /// Wait for a request's terminal event.
    fn settle(&self, handle: &StoreHandle, op: &'static str, pending: RequestFuture) -> Result<Response> {
        self.waiter
            .wait(handle.table(), op, pending)?
            .map_err(|err| Error::request(handle.table(), op, &err))
    }
}
