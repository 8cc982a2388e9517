//! Transactions
//!
//! A transaction is scoped to a set of object stores and an access mode. Its
//! requests run in issue order on the event loop. It commits on its own once
//! every [`Transaction`] handle (object-store handles hold one too) has been
//! dropped and no request is outstanding, or earlier when [`Transaction::commit`]
//! is called. A failed request aborts it and rolls back its writes.
//! [`Transaction::abort`] overrides a pending commit until the commit lands.
//! Writes go straight to the store; an abort restores each touched record's
//! previous value.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::database::{DatabaseCell, StoreData};
use crate::error::{EngineError, Result};
use crate::request::{Event, EventKind, Listener, Request, Stored};
use crate::store::ObjectStore;
use crate::value::{Key, Record};
use crate::Shared;

static NEXT_TX_ID: AtomicU64 = AtomicU64::new(1);

/// Transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    ReadOnly,
    ReadWrite,
    /// Schema changes during an upgrade. Only the engine creates these.
    VersionChange,
}

impl Mode {
    pub fn is_writable(&self) -> bool {
        !matches!(self, Mode::ReadOnly)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::ReadOnly => "readonly",
            Mode::ReadWrite => "readwrite",
            Mode::VersionChange => "versionchange",
        })
    }
}

/// Operation carried by a queued request.
pub(crate) enum Op {
    Add(Record),
    Put(Record),
    Get(Key),
    Delete(Key),
    Count,
    /// Move a cursor to the first key after the given one (or the first key)
    Advance(Option<Key>),
}

/// Database contents captured before a version change.
#[derive(Clone)]
pub(crate) struct Snapshot {
    pub(crate) version: u32,
    pub(crate) stores: BTreeMap<String, StoreData>,
}

enum Undo {
    Record {
        store: String,
        key: Key,
        previous: Option<Record>,
    },
    Schema(Snapshot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    Finished,
}

type FinishHook = Box<dyn FnOnce(bool) + Send + 'static>;

struct TxState {
    phase: Phase,
    /// Set by commit/abort: no new requests are accepted
    closing: bool,
    commit_requested: bool,
    /// Set by abort: nothing commits and queued requests fail
    aborting: bool,
    outstanding: usize,
    handles: usize,
}

pub(crate) struct TxInner {
    id: u64,
    shared: Arc<Shared>,
    db: Arc<DatabaseCell>,
    scope: Vec<String>,
    mode: Mode,
    state: Mutex<TxState>,
    undo: Mutex<Vec<Undo>>,
    listeners: Mutex<Vec<(EventKind, Listener)>>,
    on_finish: Mutex<Option<FinishHook>>,
}

impl TxInner {
    pub(crate) fn new(
        shared: Arc<Shared>,
        db: Arc<DatabaseCell>,
        scope: Vec<String>,
        mode: Mode,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_TX_ID.fetch_add(1, Ordering::Relaxed),
            shared,
            db,
            scope,
            mode,
            state: Mutex::new(TxState {
                phase: Phase::Active,
                closing: false,
                commit_requested: false,
                aborting: false,
                outstanding: 0,
                handles: 0,
            }),
            undo: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            on_finish: Mutex::new(None),
        })
    }

    pub(crate) fn mode(&self) -> Mode {
        self.mode
    }

    pub(crate) fn db(&self) -> &Arc<DatabaseCell> {
        &self.db
    }

    pub(crate) fn is_active(&self) -> bool {
        let state = self.state.lock();
        state.phase == Phase::Active && !state.closing
    }

    /// Keep the pre-upgrade contents so an abort can restore them.
    pub(crate) fn remember_schema(&self, snapshot: Snapshot) {
        self.undo.lock().push(Undo::Schema(snapshot));
    }

    /// Called once with `true` on commit or `false` on abort.
    pub(crate) fn on_finish(&self, hook: impl FnOnce(bool) + Send + 'static) {
        *self.on_finish.lock() = Some(Box::new(hook));
    }

    /// Queue `op` for `request` on the event loop.
    pub(crate) fn submit(self: &Arc<Self>, request: Request, store: &str, op: Op) -> Result<Request> {
        {
            let mut state = self.state.lock();
            if state.phase != Phase::Active || state.closing {
                return Err(EngineError::inactive(format!(
                    "transaction {} is not accepting requests",
                    self.id
                )));
            }
            state.outstanding += 1;
        }

        let tx = Arc::clone(self);
        let store = store.to_string();
        let queued = request.clone();
        self.shared.events.spawn(move || tx.run(&store, op, &queued));
        Ok(request)
    }

    fn run(self: &Arc<Self>, store: &str, op: Op, request: &Request) {
        let active = {
            let state = self.state.lock();
            state.phase == Phase::Active && !state.aborting
        };
        if !active {
            request.fail(EngineError::abort("the transaction was aborted"));
        } else {
            match self.apply(store, op) {
                Ok(stored) => request.succeed(stored),
                Err(err) => {
                    request.fail(err.clone());
                    self.abort_with(err, true);
                }
            }
        }

        self.state.lock().outstanding -= 1;
        self.finish_if_idle();
    }

    fn apply(&self, store: &str, op: Op) -> Result<Stored> {
        let mut db = self.db.state.lock();
        let data = db
            .stores
            .get_mut(store)
            .ok_or_else(|| EngineError::not_found(format!("no object store named '{}'", store)))?;

        match op {
            Op::Add(record) => {
                let (key, previous) = data.insert(record, false)?;
                self.push_undo(store, &key, previous);
                Ok(Stored::Key(key))
            }
            Op::Put(record) => {
                let (key, previous) = data.insert(record, true)?;
                self.push_undo(store, &key, previous);
                Ok(Stored::Key(key))
            }
            Op::Get(key) => Ok(Stored::Record(data.records.get(&key).cloned())),
            Op::Delete(key) => {
                if let Some(previous) = data.records.remove(&key) {
                    self.push_undo(store, &key, Some(previous));
                }
                Ok(Stored::Empty)
            }
            Op::Count => Ok(Stored::Count(data.records.len())),
            Op::Advance(after) => Ok(Stored::Position(data.next_after(after.as_ref()))),
        }
    }

    fn push_undo(&self, store: &str, key: &Key, previous: Option<Record>) {
        self.undo.lock().push(Undo::Record {
            store: store.to_string(),
            key: key.clone(),
            previous,
        });
    }

    fn rollback(&self) {
        let entries = std::mem::take(&mut *self.undo.lock());
        if entries.is_empty() {
            return;
        }
        let mut db = self.db.state.lock();
        for entry in entries.into_iter().rev() {
            match entry {
                Undo::Record {
                    store,
                    key,
                    previous,
                } => {
                    if let Some(data) = db.stores.get_mut(&store) {
                        match previous {
                            Some(record) => {
                                data.records.insert(key, record);
                            }
                            None => {
                                data.records.remove(&key);
                            }
                        }
                    }
                }
                Undo::Schema(snapshot) => {
                    db.version = snapshot.version;
                    db.stores = snapshot.stores;
                }
            }
        }
    }

    /// Commit when idle. Runs on the event loop.
    pub(crate) fn finish_if_idle(self: &Arc<Self>) {
        let commit = {
            let mut state = self.state.lock();
            let idle = state.outstanding == 0 && (state.handles == 0 || state.commit_requested);
            if state.phase == Phase::Active && !state.aborting && idle {
                state.phase = Phase::Finished;
                true
            } else {
                false
            }
        };
        if !commit {
            return;
        }

        self.undo.lock().clear();
        self.release_upgrade();
        debug!(tx = self.id, mode = %self.mode, "transaction complete");
        self.dispatch(Event::Complete);
        self.run_finish_hook(true);
    }

    /// Abort and roll back. `bubble` also fires `error` first, as a failed
    /// request does. Runs on the event loop.
    pub(crate) fn abort_with(self: &Arc<Self>, reason: EngineError, bubble: bool) {
        {
            let mut state = self.state.lock();
            if state.phase != Phase::Active {
                return;
            }
            state.phase = Phase::Finished;
        }

        self.rollback();
        self.release_upgrade();
        debug!(tx = self.id, mode = %self.mode, %reason, "transaction aborted");
        if bubble {
            self.dispatch(Event::Error(reason.clone()));
        }
        self.dispatch(Event::Abort(reason));
        self.run_finish_hook(false);
    }

    fn release_upgrade(&self) {
        if self.mode == Mode::VersionChange {
            self.db.state.lock().upgrade = None;
        }
    }

    fn run_finish_hook(&self, committed: bool) {
        let hook = self.on_finish.lock().take();
        if let Some(hook) = hook {
            hook(committed);
        }
    }

    fn dispatch(&self, event: Event) {
        let kind = event.kind();
        let mut listeners = std::mem::take(&mut *self.listeners.lock());
        for (k, listener) in listeners.iter_mut() {
            if *k == kind {
                listener(&event);
            }
        }
        let mut slot = self.listeners.lock();
        listeners.append(&mut slot);
        // Complete and Abort are terminal; Error is always followed by Abort
        if matches!(kind, EventKind::Error) {
            *slot = listeners;
        }
    }

    fn in_scope(&self, store: &str) -> bool {
        self.mode == Mode::VersionChange || self.scope.iter().any(|s| s == store)
    }

    fn acquire(&self) {
        self.state.lock().handles += 1;
    }

    fn release(self: &Arc<Self>) {
        let idle = {
            let mut state = self.state.lock();
            state.handles -= 1;
            state.handles == 0
        };
        if idle {
            let tx = Arc::clone(self);
            self.shared.events.spawn(move || tx.finish_if_idle());
        }
    }
}

/// Handle to a transaction.
///
/// Transactions are not isolated from one another: aborting one restores the
/// values it overwrote, even if a concurrent transaction has since written the
/// same keys.
pub struct Transaction {
    inner: Arc<TxInner>,
}

impl Transaction {
    pub(crate) fn from_inner(inner: Arc<TxInner>) -> Self {
        inner.acquire();
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<TxInner> {
        &self.inner
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    /// Names of the stores this transaction may touch.
    pub fn scope(&self) -> &[String] {
        &self.inner.scope
    }

    /// Whether the transaction still accepts requests.
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Open one of the stores in scope.
    pub fn object_store(&self, name: &str) -> Result<ObjectStore> {
        if !self.inner.in_scope(name) {
            return Err(EngineError::not_found(format!(
                "object store '{}' is not in the transaction's scope",
                name
            )));
        }
        if !self.inner.db.state.lock().stores.contains_key(name) {
            return Err(EngineError::not_found(format!(
                "no object store named '{}'",
                name
            )));
        }
        Ok(ObjectStore::new(self.clone(), name))
    }

    /// Register a `complete`, `error` or `abort` listener.
    pub fn add_listener<F>(&self, kind: EventKind, listener: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.inner.listeners.lock().push((kind, Box::new(listener)));
    }

    /// Stop accepting requests and commit once the outstanding ones finish.
    pub fn commit(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Active || state.closing {
                return Err(EngineError::invalid_state("the transaction has finished"));
            }
            state.closing = true;
            state.commit_requested = true;
        }
        let tx = Arc::clone(&self.inner);
        self.inner.shared.events.spawn(move || tx.finish_if_idle());
        Ok(())
    }

    /// Abort, discarding every write made so far.
    ///
    /// Also valid after [`Transaction::commit`] as long as the commit has not
    /// completed yet.
    pub fn abort(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Active || state.aborting {
                return Err(EngineError::invalid_state("the transaction has finished"));
            }
            state.closing = true;
            state.aborting = true;
        }
        let tx = Arc::clone(&self.inner);
        self.inner.shared.events.spawn(move || {
            tx.abort_with(EngineError::abort("the transaction was aborted"), false)
        });
        Ok(())
    }
}

impl Clone for Transaction {
    fn clone(&self) -> Self {
        Self::from_inner(Arc::clone(&self.inner))
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.inner.release();
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("mode", &self.inner.mode)
            .field("scope", &self.inner.scope)
            .finish()
    }
}
