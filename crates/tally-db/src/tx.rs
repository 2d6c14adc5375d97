//! # Ledger Transactions
//!
//! The unit of work every ledger write runs inside.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  LedgerStore::with_transaction(body)                                    │
//! │       │                                                                 │
//! │       ├── acquire writer lock (timeout → LockTimeout, nothing started)  │
//! │       ├── BEGIN                                                         │
//! │       ▼                                                                 │
//! │  body(&mut LedgerTx)                                                    │
//! │       │   services run here, all on tx.conn()                           │
//! │       │   tx.emit(event) queues notifications                           │
//! │       │   tx.with_transaction(inner) extends the same unit of work      │
//! │       ▼                                                                 │
//! │  Ok  ──► COMMIT ──► invalidate cache ──► publish events ──► unlock      │
//! │  Err ──► ROLLBACK ──► unlock ──► error returned                         │
//! │  panic / future dropped ──► LedgerTx dropped: rollback, unlock          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use futures::future::BoxFuture;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tokio::sync::OwnedMutexGuard;
use tracing::{trace, warn};

use crate::config::LedgerSettings;
use crate::error::{DbError, LedgerResult};
use crate::events::LedgerEvent;

tokio::task_local! {
    /// Set while a transaction body runs on the current task.
    pub(crate) static WRITER_HELD: ();
}

/// Returns true when called from inside a running transaction body.
pub(crate) fn writer_held_by_current_task() -> bool {
    WRITER_HELD.try_with(|_| ()).is_ok()
}

/// An open ledger transaction holding the writer lock.
///
/// Field order matters: on drop the transaction (and its rollback) goes
/// before the writer lock is released.
pub struct LedgerTx {
    tx: Transaction<'static, Sqlite>,
    events: Vec<LedgerEvent>,
    depth: u32,
    settings: LedgerSettings,
    _writer: OwnedMutexGuard<()>,
}

impl LedgerTx {
    pub(crate) fn new(
        tx: Transaction<'static, Sqlite>,
        writer: OwnedMutexGuard<()>,
        settings: LedgerSettings,
    ) -> Self {
        LedgerTx {
            tx,
            events: Vec::new(),
            depth: 0,
            settings,
            _writer: writer,
        }
    }

    /// The connection every statement of this unit of work runs on.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Ledger policy in force for this transaction.
    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// How many `LedgerTx::with_transaction` scopes are currently open.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Queues an event, published only if the transaction commits.
    /// Duplicate events within one transaction are collapsed.
    pub fn emit(&mut self, event: LedgerEvent) {
        if !self.events.contains(&event) {
            trace!(?event, "Queued ledger event");
            self.events.push(event);
        }
    }

    /// Events queued so far.
    pub fn pending_events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Runs `body` as part of this transaction. No second BEGIN is issued.
    ///
    /// There is no savepoint: if the inner body fails and the outer body
    /// swallows the error, whatever the inner body already wrote stays in
    /// the transaction. Propagate the error to roll everything back.
    pub async fn with_transaction<T, F>(&mut self, body: F) -> LedgerResult<T>
    where
        F: for<'t> FnOnce(&'t mut LedgerTx) -> BoxFuture<'t, LedgerResult<T>>,
    {
        self.depth += 1;
        let result = body(self).await;
        self.depth -= 1;
        result
    }

    /// Commits, handing back the queued events and the writer lock so the
    /// caller can publish before other writers proceed.
    pub(crate) async fn commit(self) -> LedgerResult<(Vec<LedgerEvent>, OwnedMutexGuard<()>)> {
        let LedgerTx {
            tx,
            events,
            _writer,
            ..
        } = self;
        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        Ok((events, _writer))
    }

    /// Rolls back. Failures are logged: the connection discards the
    /// transaction on its next use either way.
    pub(crate) async fn rollback(self) {
        let LedgerTx { tx, events, .. } = self;
        if let Err(e) = tx.rollback().await {
            warn!(error = %e, "Rollback failed");
        }
        if !events.is_empty() {
            trace!(dropped = events.len(), "Discarded events of rolled back transaction");
        }
    }
}

impl std::fmt::Debug for LedgerTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerTx")
            .field("depth", &self.depth)
            .field("pending_events", &self.events.len())
            .finish_non_exhaustive()
    }
}
