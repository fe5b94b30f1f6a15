// =============================================================================
// Transactions
// =============================================================================
//
// A transaction is the unit of atomicity. Starting one snapshots the store
// (bincode bytes) and the ownership records; aborting restores both.
// Committing runs the outermost frame-exit check: every frame popped, and
// no live resource left anywhere but storage.
//
// A fatal error raised by any operation poisons the running transaction.
// A poisoned transaction cannot commit.

use crate::error::{VaultError, VaultResult};
use crate::ownership::TrackerSnapshot;
use crate::runtime::Runtime;
use crate::storage::Store;
use std::collections::BTreeSet;
use tracing::{debug, warn};
use vault_val::{Address, FrameId, Value};

/// State of the running transaction
#[derive(Debug)]
pub struct Transaction {
    pub(crate) signers: BTreeSet<Address>,
    snapshot: Vec<u8>,
    records: TrackerSnapshot,
    pub(crate) poisoned: Option<String>,
}

impl Transaction {
    pub fn signers(&self) -> impl Iterator<Item = &Address> {
        self.signers.iter()
    }

    /// The fatal error that poisoned the transaction, if any
    pub fn poisoned(&self) -> Option<&str> {
        self.poisoned.as_deref()
    }
}

/// Lifecycle callbacks a host evaluator drives the runtime with
pub trait HostHooks {
    /// A value was produced for `name` in `frame`
    fn on_bind(&mut self, frame: FrameId, name: &str, value: Value) -> VaultResult<()>;

    /// `frame` returned
    fn on_scope_exit(&mut self, frame: FrameId) -> VaultResult<()>;

    fn on_transaction_start(&mut self, signers: &[Address]) -> VaultResult<()>;

    fn on_transaction_commit(&mut self) -> VaultResult<()>;

    fn on_transaction_abort(&mut self) -> VaultResult<()>;
}

impl Runtime {
    pub fn transaction(&self) -> Option<&Transaction> {
        self.txn.as_ref()
    }

    /// Start a transaction carrying the authority of `signers`
    pub fn begin_transaction(&mut self, signers: &[Address]) -> VaultResult<()> {
        if self.txn.is_some() {
            return Err(VaultError::NestedTransaction);
        }
        let snapshot = self.store.to_bytes()?;
        self.frames.clear();
        self.refs.release_all();
        debug!(signers = signers.len(), "transaction start");
        self.txn = Some(Transaction {
            signers: signers.iter().copied().collect(),
            snapshot,
            records: self.tracker.snapshot(),
            poisoned: None,
        });
        Ok(())
    }

    /// Commit the running transaction. Fails, and rolls back, when the
    /// transaction was poisoned or leaves a resource outside storage.
    pub fn commit_transaction(&mut self) -> VaultResult<()> {
        let Some(txn) = self.txn.as_ref() else {
            return Err(VaultError::NoTransaction);
        };
        if let Some(reason) = txn.poisoned.clone() {
            self.abort_transaction()?;
            return Err(VaultError::TransactionAborted { reason });
        }

        let unwound = match self.frames.outermost() {
            Some(frame) => self.unwind_to(frame),
            None => Ok(()),
        };
        let checked = unwound.and_then(|_| self.check_nothing_lingers());
        if let Err(err) = checked {
            warn!(error = %err, "commit refused");
            self.abort_transaction()?;
            return Err(VaultError::TransactionAborted {
                reason: err.to_string(),
            });
        }

        self.refs.release_all();
        let forgotten = self.tracker.forget_destroyed();
        self.txn = None;
        debug!(resources = self.tracker.len(), forgotten, "transaction commit");
        Ok(())
    }

    fn check_nothing_lingers(&self) -> VaultResult<()> {
        match self.tracker.lingering().into_iter().next() {
            Some((id, at)) => Err(VaultError::UnhandledResource {
                id,
                at: at.map_or_else(|| "in flight".to_string(), |loc| loc.to_string()),
            }),
            None => Ok(()),
        }
    }

    /// Discard every change the running transaction made
    pub fn abort_transaction(&mut self) -> VaultResult<()> {
        let txn = self.txn.take().ok_or(VaultError::NoTransaction)?;
        self.store = Store::from_bytes(&txn.snapshot)?;
        self.tracker.restore(txn.records);
        self.frames.clear();
        self.refs.release_all();
        debug!(reason = txn.poisoned.as_deref().unwrap_or("requested"), "transaction abort");
        Ok(())
    }

    /// Run `body` as one transaction. It commits when `body` succeeds and
    /// rolls back when `body` fails or the commit checks do.
    pub fn execute<T>(
        &mut self,
        signers: &[Address],
        body: impl FnOnce(&mut Self) -> VaultResult<T>,
    ) -> VaultResult<T> {
        self.begin_transaction(signers)?;
        match body(self) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(err) => {
                self.abort_transaction()?;
                Err(err)
            }
        }
    }
}

impl HostHooks for Runtime {
    fn on_bind(&mut self, frame: FrameId, name: &str, value: Value) -> VaultResult<()> {
        self.bind(frame, name, value)
    }

    fn on_scope_exit(&mut self, frame: FrameId) -> VaultResult<()> {
        self.pop_frame(frame)
    }

    fn on_transaction_start(&mut self, signers: &[Address]) -> VaultResult<()> {
        self.begin_transaction(signers)
    }

    fn on_transaction_commit(&mut self) -> VaultResult<()> {
        self.commit_transaction()
    }

    fn on_transaction_abort(&mut self) -> VaultResult<()> {
        self.abort_transaction()
    }
}
