//! Pending operations and the events they deliver
//!
//! A [`Request`] is returned as soon as an operation is issued. Its outcome is
//! reported later, on the event loop, as exactly one `success` or `error`
//! event. Cursor requests are the exception: every advance re-fires `success`
//! on the same request object, so their listeners stay registered until the
//! cursor is exhausted or fails.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cursor::Cursor;
use crate::database::Connection;
use crate::error::{EngineError, Result};
use crate::transaction::{Transaction, TxInner};
use crate::value::{Key, Record};

/// Event names listeners can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A request succeeded (fires once per advance for cursors)
    Success,
    /// A request or transaction failed
    Error,
    /// An open request needs a schema upgrade
    UpgradeNeeded,
    /// A transaction committed
    Complete,
    /// A transaction was aborted
    Abort,
}

/// Payload delivered to listeners.
#[derive(Debug)]
pub enum Event {
    Success(Response),
    Error(EngineError),
    UpgradeNeeded(UpgradeEvent),
    Complete,
    Abort(EngineError),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Success(_) => EventKind::Success,
            Event::Error(_) => EventKind::Error,
            Event::UpgradeNeeded(_) => EventKind::UpgradeNeeded,
            Event::Complete => EventKind::Complete,
            Event::Abort(_) => EventKind::Abort,
        }
    }
}

/// Delivered with `upgradeneeded`: the new connection and the version-change
/// transaction that schema changes must happen in.
#[derive(Debug)]
pub struct UpgradeEvent {
    pub(crate) connection: Connection,
    pub(crate) transaction: Transaction,
    pub(crate) old_version: u32,
    pub(crate) new_version: u32,
}

impl UpgradeEvent {
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn old_version(&self) -> u32 {
        self.old_version
    }

    pub fn new_version(&self) -> u32 {
        self.new_version
    }
}

/// Result value of a successful request.
#[derive(Debug, Clone)]
pub enum Response {
    /// Writes and deletes carry no value
    Empty,
    /// Key of the record written by `add`/`put`
    Key(Key),
    /// Result of `get`; `None` when the key is absent
    Record(Option<Record>),
    Count(usize),
    /// Current cursor position; `None` once the scan is exhausted
    Cursor(Option<Cursor>),
    Connection(Connection),
}

/// Whether a request has produced its result yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Pending,
    Done,
}

pub type Listener = Box<dyn FnMut(&Event) + Send + 'static>;

/// Internal form of a request's result. Cursor positions are stored without
/// the request handle so a request never owns a reference to itself.
#[derive(Debug, Clone)]
pub(crate) enum Stored {
    Empty,
    Key(Key),
    Record(Option<Record>),
    Count(usize),
    Position(Option<(Key, Record)>),
    Connection(Connection),
}

struct Source {
    tx: Arc<TxInner>,
    store: String,
}

struct RequestState {
    ready: ReadyState,
    outcome: Option<Result<Stored>>,
    listeners: Vec<(EventKind, Listener)>,
}

struct RequestInner {
    source: Option<Source>,
    cursor: bool,
    state: Mutex<RequestState>,
}

/// Handle to a pending (or settled) operation.
#[derive(Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

impl Request {
    fn build(source: Option<Source>, cursor: bool) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                source,
                cursor,
                state: Mutex::new(RequestState {
                    ready: ReadyState::Pending,
                    outcome: None,
                    listeners: Vec::new(),
                }),
            }),
        }
    }

    /// Request with no object-store source (open, delete database).
    pub(crate) fn detached() -> Self {
        Self::build(None, false)
    }

    pub(crate) fn on_store(tx: Arc<TxInner>, store: &str) -> Self {
        Self::build(
            Some(Source {
                tx,
                store: store.to_string(),
            }),
            false,
        )
    }

    pub(crate) fn cursor(tx: Arc<TxInner>, store: &str) -> Self {
        Self::build(
            Some(Source {
                tx,
                store: store.to_string(),
            }),
            true,
        )
    }

    /// Register a listener. Listeners run on the event loop thread.
    pub fn add_listener<F>(&self, kind: EventKind, listener: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.inner
            .state
            .lock()
            .listeners
            .push((kind, Box::new(listener)));
    }

    pub fn ready_state(&self) -> ReadyState {
        self.inner.state.lock().ready
    }

    pub fn is_cursor(&self) -> bool {
        self.inner.cursor
    }

    /// The request's result. Fails with `InvalidStateError` while pending and
    /// with the request's own error once it has failed.
    pub fn result(&self) -> Result<Response> {
        let stored = {
            let state = self.inner.state.lock();
            match (&state.ready, &state.outcome) {
                (ReadyState::Done, Some(outcome)) => outcome.clone()?,
                _ => {
                    return Err(EngineError::invalid_state(
                        "the request has not finished",
                    ))
                }
            }
        };
        Ok(self.response(stored))
    }

    /// The request's error, if it failed.
    pub fn error(&self) -> Option<EngineError> {
        match &self.inner.state.lock().outcome {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }

    fn response(&self, stored: Stored) -> Response {
        match stored {
            Stored::Empty => Response::Empty,
            Stored::Key(key) => Response::Key(key),
            Stored::Record(record) => Response::Record(record),
            Stored::Count(n) => Response::Count(n),
            Stored::Connection(conn) => Response::Connection(conn),
            Stored::Position(position) => Response::Cursor(position.and_then(|(key, value)| {
                self.inner.source.as_ref().map(|source| {
                    Cursor::new(
                        self.clone(),
                        Arc::clone(&source.tx),
                        &source.store,
                        key,
                        value,
                    )
                })
            })),
        }
    }

    /// Record a result without notifying anyone.
    pub(crate) fn settle(&self, outcome: Result<Stored>) {
        let mut state = self.inner.state.lock();
        state.ready = ReadyState::Done;
        state.outcome = Some(outcome);
    }

    pub(crate) fn succeed(&self, stored: Stored) {
        self.settle(Ok(stored.clone()));
        let response = self.response(stored);
        self.dispatch(Event::Success(response));
    }

    pub(crate) fn fail(&self, err: EngineError) {
        self.settle(Err(err.clone()));
        self.dispatch(Event::Error(err));
    }

    /// Deliver an event to every listener of its kind. Must run on the loop.
    pub(crate) fn dispatch(&self, event: Event) {
        let kind = event.kind();
        let mut listeners = std::mem::take(&mut self.inner.state.lock().listeners);

        for (k, listener) in listeners.iter_mut() {
            if *k == kind {
                listener(&event);
            }
        }

        let mut state = self.inner.state.lock();
        // Listeners may have registered more listeners while we ran them
        listeners.append(&mut state.listeners);
        if !self.keeps_listeners(kind, &state) {
            listeners.clear();
        }
        state.listeners = listeners;
    }

    /// Terminal events release listeners, except between cursor advances.
    fn keeps_listeners(&self, kind: EventKind, state: &RequestState) -> bool {
        match kind {
            EventKind::UpgradeNeeded => true,
            EventKind::Success if self.inner.cursor => matches!(
                state.outcome,
                Some(Ok(Stored::Position(Some(_))))
            ),
            _ => false,
        }
    }

    /// Put a settled cursor request back into the pending state so it can be
    /// advanced past `key`.
    pub(crate) fn rearm(&self, key: &Key) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.ready == ReadyState::Pending {
            return Err(EngineError::invalid_state("the cursor is already advancing"));
        }
        match &state.outcome {
            Some(Ok(Stored::Position(Some((current, _))))) if current == key => {
                state.ready = ReadyState::Pending;
                Ok(())
            }
            Some(Ok(Stored::Position(None))) => {
                Err(EngineError::invalid_state("the cursor is exhausted"))
            }
            _ => Err(EngineError::invalid_state("the cursor has moved")),
        }
    }

    /// Undo [`Request::rearm`] when the advance could not be queued.
    pub(crate) fn disarm(&self) {
        self.inner.state.lock().ready = ReadyState::Done;
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Request")
            .field("store", &self.inner.source.as_ref().map(|s| s.store.as_str()))
            .field("cursor", &self.inner.cursor)
            .field("ready", &state.ready)
            .finish()
    }
}
