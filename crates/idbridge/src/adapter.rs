//! The adapter handle and its lifecycle

use std::fmt;

use idbridge_engine::{Connection, Engine, Mode};
use parking_lot::RwLock;
use tracing::info;

use crate::bootstrap::{self, BootstrapReport};
use crate::bridge::{RequestFuture, Waiter};
use crate::config::AdapterConfig;
use crate::error::{Error, Result};
use crate::resolver::{self, StoreHandle};
use crate::schema::RecordType;
use crate::tracing::prefix;

/// Source of fresh primary keys for the ORM layer.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn new_id(&self) -> String {
        self()
    }
}

/// Collects everything [`Adapter`] needs before opening.
pub struct AdapterBuilder {
    config: AdapterConfig,
    engine: Option<Engine>,
    id_gen: Option<Box<dyn IdGenerator>>,
    templates: Vec<Box<dyn RecordType>>,
}

impl AdapterBuilder {
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            config,
            engine: None,
            id_gen: None,
            templates: Vec::new(),
        }
    }

    /// Share an existing engine. Without one the adapter starts its own.
    pub fn engine(mut self, engine: Engine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn id_generator(mut self, id_gen: impl IdGenerator + 'static) -> Self {
        self.id_gen = Some(Box::new(id_gen));
        self
    }

    /// Register a record type for bootstrap.
    pub fn table(mut self, template: impl RecordType + 'static) -> Self {
        self.templates.push(Box::new(template));
        self
    }

    pub fn tables(mut self, templates: impl IntoIterator<Item = Box<dyn RecordType>>) -> Self {
        self.templates.extend(templates);
        self
    }

    /// Open the database and block until it is ready.
    pub fn open(self) -> Result<Adapter> {
        self.config.validate()?;
        let engine = match self.engine {
            Some(engine) => engine,
            None => Engine::new()?,
        };
        let waiter = Waiter::new(self.config.request_timeout())?;
        let (conn, report) = bootstrap::open(&engine, &self.config, self.templates, &waiter)?;

        Ok(Adapter {
            engine,
            config: self.config,
            conn: RwLock::new(Some(conn)),
            waiter,
            id_gen: self.id_gen,
            report,
        })
    }
}

/// Blocking CRUD access to one database.
///
/// Every operation opens its own transaction; nothing is shared between
/// calls except the connection. Calls block the current thread and must not
/// be made from inside an async runtime.
pub struct Adapter {
    engine: Engine,
    config: AdapterConfig,
    conn: RwLock<Option<Connection>>,
    pub(crate) waiter: Waiter,
    id_gen: Option<Box<dyn IdGenerator>>,
    report: BootstrapReport,
}

impl Adapter {
    pub fn builder(config: AdapterConfig) -> AdapterBuilder {
        AdapterBuilder::new(config)
    }

    /// Open `config.db_name`, creating tables for `templates` if the
    /// database is new or the version was raised.
    pub fn open(
        engine: Engine,
        config: AdapterConfig,
        id_gen: Option<Box<dyn IdGenerator>>,
        templates: Vec<Box<dyn RecordType>>,
    ) -> Result<Self> {
        let mut builder = AdapterBuilder::new(config).engine(engine).tables(templates);
        builder.id_gen = id_gen;
        builder.open()
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Outcome of schema bootstrap at open time.
    pub fn bootstrap_report(&self) -> &BootstrapReport {
        &self.report
    }

    /// The open connection, or [`Error::NotInitialized`] after close.
    pub fn connection(&self) -> Result<Connection> {
        match self.conn.read().as_ref() {
            Some(conn) if !conn.is_closed() => Ok(conn.clone()),
            _ => Err(Error::NotInitialized),
        }
    }

    pub fn is_open(&self) -> bool {
        self.connection().is_ok()
    }

    pub fn table_exists(&self, table: &str) -> bool {
        self.connection()
            .map(|conn| conn.has_object_store(table))
            .unwrap_or(false)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.connection()
            .map(|conn| conn.object_store_names())
            .unwrap_or_default()
    }

    /// A fresh ID from the configured generator, or an empty string.
    pub fn new_id(&self) -> String {
        self.id_gen
            .as_ref()
            .map(|id_gen| id_gen.new_id())
            .unwrap_or_default()
    }

    /// Close the connection. Later operations fail with `NotInitialized`.
    pub fn close(&self) {
        if let Some(conn) = self.conn.write().take() {
            conn.close();
            info!("{} {} closed", prefix::CLOSE, self.config.db_name);
        }
    }

    /// Delete a database and everything in it.
    pub fn delete_database(engine: &Engine, db_name: &str) -> Result<()> {
        let waiter = Waiter::new(None)?;
        let pending = {
            let _turn = engine.turn();
            RequestFuture::attach(&engine.delete_database(db_name))
        };
        waiter
            .wait(db_name, "delete database", pending)?
            .map(|_| ())
            .map_err(|err| Error::Open(format!("delete {}: {}", db_name, err)))
    }

    pub(crate) fn resolve(&self, table: &str, mode: Mode) -> Result<StoreHandle> {
        resolver::resolve(&self.connection()?, table, mode)
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.get_mut().take() {
            conn.close();
        }
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("db_name", &self.config.db_name)
            .field("open", &self.is_open())
            .field("tables", &self.table_names())
            .finish()
    }
}
