//! Bridging engine events into blocking calls
//!
//! Wraps the engine's listener-based requests into futures, and drives those
//! futures to completion on a small runtime owned by the caller. Listeners
//! run on the engine's event-loop thread and only hand results across a
//! `oneshot` channel; the waiting happens on the calling thread, so the loop
//! is never blocked.
//!
//! Listeners must be attached in the same [`Turn`](idbridge_engine::Turn)
//! the request was issued in, otherwise the terminal event can be delivered
//! before anyone listens.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use idbridge_engine::{
    Cursor, EngineError, Event, EventKind, Key, Record, Request, Response, Transaction,
};
use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Engine-level outcome of one awaited event.
pub type Outcome<T> = std::result::Result<T, EngineError>;

/// Single-fire resolution slot shared by competing listeners.
///
/// The first [`Gate::resolve`] delivers its value; later calls are no-ops
/// until the gate is re-armed.
pub struct Gate<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Gate<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let gate = Self {
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        (gate, rx)
    }

    /// Deliver `value` if nothing has been delivered since the last arm.
    /// Returns whether this call resolved the gate.
    pub fn resolve(&self, value: T) -> bool {
        match self.slot.lock().take() {
            Some(tx) => {
                // A dropped receiver means the waiter gave up; nothing to do
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    /// Open the gate for another delivery.
    pub fn rearm(&self) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        *self.slot.lock() = Some(tx);
        rx
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl<T> Clone for Gate<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

/// Future of one event outcome delivered through a [`Gate`].
pub struct EventFuture<T> {
    rx: oneshot::Receiver<Outcome<T>>,
}

/// Terminal event of a request.
pub type RequestFuture = EventFuture<Response>;

/// Commit or abort of a transaction.
pub type TransactionFuture = EventFuture<()>;

impl<T> EventFuture<T> {
    pub fn from_receiver(rx: oneshot::Receiver<Outcome<T>>) -> Self {
        Self { rx }
    }
}

impl RequestFuture {
    /// Listen for the request's single `success` or `error` event.
    pub fn attach(request: &Request) -> Self {
        let (gate, rx) = Gate::new();

        let on_success = gate.clone();
        request.add_listener(EventKind::Success, move |event| {
            if let Event::Success(response) = event {
                on_success.resolve(Ok(response.clone()));
            }
        });
        request.add_listener(EventKind::Error, move |event| {
            if let Event::Error(err) = event {
                gate.resolve(Err(err.clone()));
            }
        });

        Self::from_receiver(rx)
    }
}

impl TransactionFuture {
    /// Listen for the transaction's `complete`, `error` or `abort` event.
    pub fn attach(transaction: &Transaction) -> Self {
        let (gate, rx) = Gate::new();

        let on_complete = gate.clone();
        transaction.add_listener(EventKind::Complete, move |_| {
            on_complete.resolve(Ok(()));
        });
        let on_error = gate.clone();
        transaction.add_listener(EventKind::Error, move |event| {
            if let Event::Error(err) = event {
                on_error.resolve(Err(err.clone()));
            }
        });
        transaction.add_listener(EventKind::Abort, move |event| {
            if let Event::Abort(err) = event {
                gate.resolve(Err(err.clone()));
            }
        });

        Self::from_receiver(rx)
    }
}

impl<T> Future for EventFuture<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(EngineError::abort(
                    "listener released without a terminal event",
                ))
            })
        })
    }
}

/// Drives bridged futures from synchronous code.
///
/// Must not be used from inside an async runtime or from an engine listener.
pub struct Waiter {
    runtime: Runtime,
    timeout: Option<Duration>,
}

impl Waiter {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("idbridge-waiter")
            .enable_time()
            .build()?;
        Ok(Self { runtime, timeout })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Block until `future` resolves, however long that takes.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Block until `future` resolves. `table` and `op` label the timeout error.
    pub fn wait<F>(&self, table: &str, op: &'static str, future: F) -> Result<F::Output>
    where
        F: Future,
    {
        match self.timeout {
            None => Ok(self.runtime.block_on(future)),
            Some(limit) => self
                .runtime
                .block_on(async move { tokio::time::timeout(limit, future).await })
                .map_err(|_| Error::Timeout {
                    table: table.to_string(),
                    op,
                    after_ms: limit.as_millis() as u64,
                }),
        }
    }
}

/// Pull-style iteration over a cursor request.
///
/// One success/error listener pair serves every advance; each call to
/// [`Iterator::next`] re-arms the gate, advances the cursor and waits for
/// the next position. Iteration ends when the cursor is exhausted or after
/// the first error.
pub struct CursorScan<'w> {
    waiter: &'w Waiter,
    table: String,
    gate: Gate<Outcome<Option<Cursor>>>,
    pending: Option<oneshot::Receiver<Outcome<Option<Cursor>>>>,
    current: Option<Cursor>,
    finished: bool,
}

impl<'w> CursorScan<'w> {
    /// Listen on a cursor request issued in the current turn.
    pub fn attach(waiter: &'w Waiter, table: &str, request: &Request) -> Self {
        let (gate, rx) = Gate::new();

        let on_success = gate.clone();
        request.add_listener(EventKind::Success, move |event| {
            if let Event::Success(Response::Cursor(cursor)) = event {
                on_success.resolve(Ok(cursor.clone()));
            }
        });
        let on_error = gate.clone();
        request.add_listener(EventKind::Error, move |event| {
            if let Event::Error(err) = event {
                on_error.resolve(Err(err.clone()));
            }
        });

        Self {
            waiter,
            table: table.to_string(),
            gate,
            pending: Some(rx),
            current: None,
            finished: false,
        }
    }

    /// Visit records in key order until `visit` returns `false` or the cursor
    /// is exhausted.
    pub fn visit(self, mut visit: impl FnMut(&Key, &Record) -> bool) -> Result<()> {
        for item in self {
            let (key, record) = item?;
            if !visit(&key, &record) {
                break;
            }
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<oneshot::Receiver<Outcome<Option<Cursor>>>> {
        if let Some(rx) = self.pending.take() {
            return Ok(rx);
        }
        let Some(cursor) = self.current.take() else {
            return Err(Error::cursor(
                &self.table,
                &EngineError::invalid_state("the cursor has no position"),
            ));
        };
        let rx = self.gate.rearm();
        cursor
            .continue_()
            .map_err(|err| Error::cursor(&self.table, &err))?;
        Ok(rx)
    }
}

impl Iterator for CursorScan<'_> {
    type Item = Result<(Key, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let step = self.advance().and_then(|rx| {
            self.waiter
                .wait(&self.table, "cursor", EventFuture::from_receiver(rx))
        });
        match step {
            Ok(Ok(Some(cursor))) => {
                let item = (cursor.key().clone(), cursor.value().clone());
                self.current = Some(cursor);
                Some(Ok(item))
            }
            Ok(Ok(None)) => {
                self.finished = true;
                None
            }
            Ok(Err(err)) => {
                self.finished = true;
                Some(Err(Error::cursor(&self.table, &err)))
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}
