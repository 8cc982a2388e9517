//! Event-driven transactional object-store engine
//!
//! This crate provides an in-process key/value engine with the shape of a
//! browser object-store database: named, versioned databases hold object
//! stores keyed by a key path; stores carry unique or non-unique secondary
//! indexes; every read and write goes through a transaction scoped to stores
//! and an access mode. Nothing returns its result directly. Operations hand
//! back a [`Request`] whose `success` or `error` event is delivered later on a
//! single event-loop thread, and scans go through forward-only cursors that
//! re-fire `success` on the same request per advance.
//!
//! Schema changes happen only inside the version-change transaction that
//! [`Engine::open`] starts when a database is new or the requested version is
//! higher than the stored one.
//!
//! # Example
//!
//! ```rust
//! use std::sync::mpsc;
//! use idbridge_engine::{record, Engine, Event, EventKind, Mode, Response};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new()?;
//!
//! let (tx, rx) = mpsc::channel();
//! {
//!     // Attach listeners before the loop can deliver anything
//!     let _turn = engine.turn();
//!     let open = engine.open("shop", None)?;
//!     open.add_listener(EventKind::UpgradeNeeded, |event| {
//!         if let Event::UpgradeNeeded(upgrade) = event {
//!             let store = upgrade.connection().create_object_store("product", "ID").unwrap();
//!             store.create_index("Name", "Name", false).unwrap();
//!         }
//!     });
//!     open.add_listener(EventKind::Success, move |event| {
//!         if let Event::Success(Response::Connection(conn)) = event {
//!             tx.send(conn.clone()).unwrap();
//!         }
//!     });
//! }
//! let conn = rx.recv()?;
//!
//! let txn = conn.transaction("product", Mode::ReadWrite)?;
//! txn.object_store("product")?.add(record([("ID", "p1"), ("Name", "Apple")]))?;
//! # Ok(())
//! # }
//! ```

pub mod cursor;
pub mod database;
pub mod error;
pub mod event_loop;
pub mod request;
pub mod store;
pub mod transaction;
pub mod value;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

pub use cursor::Cursor;
pub use database::{Connection, IndexSpec};
pub use error::{EngineError, ErrorKind, Result};
pub use event_loop::Turn;
pub use request::{Event, EventKind, ReadyState, Request, Response, UpgradeEvent};
pub use store::ObjectStore;
pub use transaction::{Mode, Transaction};
pub use value::{record, Key, Record, Value};

use database::DatabaseCell;
use event_loop::EventLoop;
use request::Stored;
use transaction::{Snapshot, TxInner};

/// State shared by every handle of one engine.
pub(crate) struct Shared {
    pub(crate) events: EventLoop,
    databases: Mutex<HashMap<String, Arc<DatabaseCell>>>,
}

/// Entry point: owns the event loop and the databases.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    /// Start an engine with its own event-loop thread.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            shared: Arc::new(Shared {
                events: EventLoop::start()?,
                databases: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Hold off event delivery. See [`Turn`].
    pub fn turn(&self) -> Turn<'_> {
        self.shared.events.turn()
    }

    /// Names of every database created so far.
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.databases.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Open (or create) a database.
    ///
    /// Without a version the stored version is used, or 1 for a new
    /// database. If the database is new or `version` is higher than the
    /// stored one, `upgradeneeded` fires first with the version-change
    /// transaction; `success` follows once that transaction commits.
    pub fn open(&self, name: &str, version: Option<u32>) -> Result<Request> {
        if version == Some(0) {
            return Err(EngineError::data("database version must be positive"));
        }
        let request = Request::detached();
        let shared = Arc::clone(&self.shared);
        let name = name.to_string();
        let queued = request.clone();
        self.shared
            .events
            .spawn(move || run_open(shared, &name, version, &queued));
        Ok(request)
    }

    /// Delete a database and everything in it. Succeeds if it does not exist.
    pub fn delete_database(&self, name: &str) -> Request {
        let request = Request::detached();
        let shared = Arc::clone(&self.shared);
        let name = name.to_string();
        let queued = request.clone();
        self.shared.events.spawn(move || {
            let removed = shared.databases.lock().remove(&name).is_some();
            debug!(db = %name, removed, "database deleted");
            queued.succeed(Stored::Empty);
        });
        request
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("databases", &self.database_names())
            .finish()
    }
}

fn run_open(shared: Arc<Shared>, name: &str, version: Option<u32>, request: &Request) {
    let cell = Arc::clone(
        shared
            .databases
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| DatabaseCell::new(name)),
    );

    let mut state = cell.state.lock();
    let current = state.version;
    let target = version.unwrap_or(current.max(1));

    if target < current {
        drop(state);
        request.fail(EngineError::version(format!(
            "requested version {} is lower than the stored version {}",
            target, current
        )));
        return;
    }
    if state.upgrade.is_some() {
        drop(state);
        request.fail(EngineError::invalid_state(format!(
            "database '{}' is being upgraded",
            name
        )));
        return;
    }

    let connection = Connection::new(Arc::clone(&shared), Arc::clone(&cell), target);
    if target == current {
        drop(state);
        request.succeed(Stored::Connection(connection));
        return;
    }

    debug!(db = %name, from = current, to = target, "upgrade needed");
    let upgrade = TxInner::new(
        Arc::clone(&shared),
        Arc::clone(&cell),
        Vec::new(),
        Mode::VersionChange,
    );
    upgrade.remember_schema(Snapshot {
        version: current,
        stores: state.stores.clone(),
    });
    state.version = target;
    state.upgrade = Some(Arc::clone(&upgrade));
    drop(state);

    let finished = request.clone();
    let opened = connection.clone();
    upgrade.on_finish(move |committed| {
        if committed {
            finished.succeed(Stored::Connection(opened));
        } else {
            opened.close();
            finished.fail(EngineError::abort("the version change transaction was aborted"));
        }
    });

    request.settle(Ok(Stored::Connection(connection.clone())));
    request.dispatch(Event::UpgradeNeeded(UpgradeEvent {
        connection,
        transaction: Transaction::from_inner(upgrade),
        old_version: current,
        new_version: target,
    }));
    // The event's transaction handle is dropped here; the upgrade commits
    // once the listeners have released every store handle they created.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_rejects_version_zero() {
        let engine = Engine::new().unwrap();
        let err = engine.open("db", Some(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
    }
}
