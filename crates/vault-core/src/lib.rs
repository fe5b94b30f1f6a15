//! Runtime core for resource-oriented contracts
//!
//! Linear resources have exactly one owner at any time. They persist only
//! in account storage, are exposed to other principals through revocable
//! capabilities, and must be stored or destroyed before a transaction
//! ends. Everything goes through one [`Runtime`], driven by a host
//! evaluator.

pub mod config;
mod container;
pub mod destroy;
pub mod error;
pub mod link;
pub mod ownership;
pub mod reference;
pub mod runtime;
pub mod storage;
pub mod txn;

#[cfg(test)]
mod tests;

pub use config::RuntimeConfig;
pub use destroy::{DestructorPlan, FieldAction};
pub use error::{BorrowFailure, VaultError, VaultResult};
pub use ownership::{Location, OwnershipState};
pub use reference::ReferenceManager;
pub use runtime::Runtime;
pub use storage::{Link, Store, StoredEntry};
pub use txn::{HostHooks, Transaction};
