//! Forward-only cursors

use std::fmt;
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::request::Request;
use crate::transaction::{Op, TxInner};
use crate::value::{Key, Record};

/// A cursor positioned on one record.
///
/// Advancing re-fires `success` on the request that opened the cursor; the
/// cursor is not restartable.
#[derive(Clone)]
pub struct Cursor {
    request: Request,
    tx: Arc<TxInner>,
    store: String,
    key: Key,
    value: Record,
}

impl Cursor {
    pub(crate) fn new(request: Request, tx: Arc<TxInner>, store: &str, key: Key, value: Record) -> Self {
        Self {
            request,
            tx,
            store: store.to_string(),
            key,
            value,
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn value(&self) -> &Record {
        &self.value
    }

    pub fn into_value(self) -> Record {
        self.value
    }

    /// The request that delivers this cursor's advances.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Advance to the next record. The result arrives as another `success`
    /// event on [`Cursor::request`].
    pub fn continue_(&self) -> Result<()> {
        self.request.rearm(&self.key)?;
        let advance = Op::Advance(Some(self.key.clone()));
        if let Err(err) = self.tx.submit(self.request.clone(), &self.store, advance) {
            self.request.disarm();
            return Err(err);
        }
        Ok(())
    }

    /// Delete the record under the cursor.
    pub fn delete(&self) -> Result<Request> {
        if !self.tx.mode().is_writable() {
            return Err(EngineError::read_only("the cursor's transaction is read-only"));
        }
        let request = Request::on_store(Arc::clone(&self.tx), &self.store);
        self.tx.submit(request, &self.store, Op::Delete(self.key.clone()))
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("store", &self.store)
            .field("key", &self.key)
            .finish()
    }
}
