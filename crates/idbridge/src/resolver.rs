//! Per-operation transaction and object-store acquisition

use idbridge_engine::{Connection, Mode, ObjectStore, Request, Transaction};
use tracing::debug;

use crate::bridge::{CursorScan, RequestFuture, TransactionFuture, Waiter};
use crate::error::{Error, Result};
use crate::tracing::prefix;

/// A fresh transaction over one table and its object store.
///
/// Holding the handle keeps the transaction open. Finish it with
/// [`StoreHandle::finish`] to commit and wait for completion. Dropping an
/// unfinished handle aborts the transaction, so an operation that gave up
/// part way (an error or a timeout) leaves nothing behind.
pub struct StoreHandle {
    conn: Connection,
    table: String,
    store: ObjectStore,
    transaction: Transaction,
    done: TransactionFuture,
    finished: bool,
}

/// Open a transaction on `table` in `mode`.
///
/// Any refusal by the engine, including an unknown table, is reported as
/// [`Error::TransactionFailed`].
pub fn resolve(conn: &Connection, table: &str, mode: Mode) -> Result<StoreHandle> {
    if conn.is_closed() {
        return Err(Error::NotInitialized);
    }

    let transaction = conn
        .transaction(table, mode)
        .map_err(|err| Error::transaction(table, &err))?;
    let store = transaction
        .object_store(table)
        .map_err(|err| Error::transaction(table, &err))?;
    // Nothing can complete while this handle holds the transaction
    let done = TransactionFuture::attach(&transaction);

    debug!("{} {} transaction on {}", prefix::DB, mode, table);
    Ok(StoreHandle {
        conn: conn.clone(),
        table: table.to_string(),
        store,
        transaction,
        done,
        finished: false,
    })
}

impl StoreHandle {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn mode(&self) -> Mode {
        self.transaction.mode()
    }

    /// Field the table is keyed on.
    pub fn key_path(&self) -> Result<String> {
        self.store
            .key_path()
            .map_err(|err| Error::transaction(&self.table, &err))
    }

    /// Issue a request and attach its listeners in one turn.
    pub fn issue<F>(&self, op: &'static str, submit: F) -> Result<RequestFuture>
    where
        F: FnOnce(&ObjectStore) -> idbridge_engine::Result<Request>,
    {
        let _turn = self.conn.turn();
        let request = submit(&self.store).map_err(|err| Error::request(&self.table, op, &err))?;
        Ok(RequestFuture::attach(&request))
    }

    /// Open a cursor over the whole table in key order.
    pub fn scan<'w>(&self, waiter: &'w Waiter) -> Result<CursorScan<'w>> {
        let _turn = self.conn.turn();
        let request = self
            .store
            .open_cursor()
            .map_err(|err| Error::cursor(&self.table, &err))?;
        Ok(CursorScan::attach(waiter, &self.table, &request))
    }

    /// Commit and wait for the transaction to complete.
    ///
    /// On timeout the commit is aborted instead. If it landed in the meantime
    /// the real outcome is reported rather than the timeout.
    pub fn finish(mut self, waiter: &Waiter) -> Result<()> {
        // A transaction the engine already finished reports through `done`
        let _ = self.transaction.commit();

        let outcome = match waiter.wait(&self.table, "commit", &mut self.done) {
            Ok(outcome) => outcome,
            Err(timeout) => {
                self.finished = true;
                if self.transaction.abort().is_ok() {
                    debug!("{} commit on {} timed out; aborted", prefix::DB, self.table);
                    return Err(timeout);
                }
                waiter.block_on(&mut self.done)
            }
        };
        self.finished = true;
        outcome.map_err(|err| Error::transaction(&self.table, &err))
    }
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        if !self.finished && self.transaction.abort().is_ok() {
            debug!("{} abandoned transaction on {} aborted", prefix::DB, self.table);
        }
    }
}
