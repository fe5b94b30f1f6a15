//! Error types and diagnostics for the Vault runtime core
//!
//! Errors come in two tiers. Recoverable conditions are handed back to the
//! calling code. Fatal conditions abort the enclosing transaction: once one
//! is raised the transaction is poisoned and every storage mutation it
//! made is rolled back, even if the host tried to swallow the error.

use crate::ownership::Location;
use miette::Diagnostic;
use thiserror::Error;
use vault_val::{Address, ResourceId, StoragePath, ValueError};

/// Alias for Result type with Vault errors
pub type VaultResult<T> = std::result::Result<T, VaultError>;

#[derive(Error, Diagnostic, Debug)]
pub enum VaultError {
    // ========================================================================
    // Ownership (E01xx)
    // ========================================================================
    #[error("use of moved value '{name}'")]
    #[diagnostic(
        code(vault_own_E0101),
        help("'{name}' was moved out earlier; move it back in or bind a new value first")
    )]
    UseAfterMove { name: String },

    #[error("resource {id} would be lost by overwriting {at}")]
    #[diagnostic(
        code(vault_own_E0102),
        help("move the resource out of {at} before binding a new value there")
    )]
    ResourceLoss { id: ResourceId, at: Location },

    #[error("resource {id} is still held at {at} when its frame exits")]
    #[diagnostic(
        code(vault_own_E0103),
        help("every resource must be returned, stored or destroyed on every exit path")
    )]
    UnhandledResource { id: ResourceId, at: String },

    #[error("resource {id} is already owned at {at}")]
    #[diagnostic(
        code(vault_own_E0104),
        help("a resource has exactly one owner; this value is a duplicate")
    )]
    AlreadyOwned { id: ResourceId, at: Location },

    #[error("resource {id} is already being moved")]
    #[diagnostic(code(vault_own_E0105))]
    AlreadyInFlight { id: ResourceId },

    #[error("resource {id} has been destroyed")]
    #[diagnostic(code(vault_own_E0106), help("destroyed resources can never be bound again"))]
    UseAfterDestroy { id: ResourceId },

    #[error("resource {id} is not known to this runtime")]
    #[diagnostic(
        code(vault_own_E0107),
        help("resources must be created through the runtime, or were discarded by a rollback")
    )]
    UnknownResource { id: ResourceId },

    #[error("cannot copy linear value of type '{type_name}'")]
    #[diagnostic(code(vault_own_E0108), help("linear values can only be moved or destroyed"))]
    CopyOfLinear { type_name: String },

    #[error("copyable aggregate '{type_name}' cannot hold linear field '{field}'")]
    #[diagnostic(code(vault_own_E0109))]
    LinearInCopyable { type_name: String, field: String },

    #[error("unknown binding '{name}'")]
    #[diagnostic(code(vault_own_E0110))]
    UnknownBinding { name: String },

    #[error("'{name}' is a {kind}, not a container")]
    #[diagnostic(code(vault_own_E0111))]
    NotAContainer { name: String, kind: String },

    #[error("unknown type '{name}'")]
    #[diagnostic(
        code(vault_own_E0112),
        help("declare '{name}' in the type registry before constructing values of it")
    )]
    UnknownType { name: String },

    // ========================================================================
    // Storage (E02xx)
    // ========================================================================
    #[error("storage path {path} of {address} is already occupied")]
    #[diagnostic(
        code(vault_store_E0201),
        help("load the existing value out of {path} before saving a new one")
    )]
    PathOccupied { address: Address, path: StoragePath },

    #[error("value at {path} of {address} has type '{found}', expected '{expected}'")]
    #[diagnostic(code(vault_store_E0202))]
    LoadTypeMismatch {
        address: Address,
        path: StoragePath,
        expected: String,
        found: String,
    },

    #[error("no authority over account {address}")]
    #[diagnostic(
        code(vault_store_E0203),
        help("the transaction must be signed by {address} to touch its private data")
    )]
    Unauthorized { address: Address },

    #[error("path {path} is in the wrong domain for this operation")]
    #[diagnostic(
        code(vault_store_E0204),
        help("values live under /storage, links under /private and /public")
    )]
    InvalidDomain { path: StoragePath },

    #[error("value of kind '{kind}' cannot be stored")]
    #[diagnostic(
        code(vault_store_E0205),
        help("references are never persisted, and resources with moved-out fields are incomplete")
    )]
    NotStorable { kind: String },

    #[error("invalid path: {0}")]
    #[diagnostic(code(vault_store_E0206))]
    InvalidPath(String),

    #[error("invalid address: {0}")]
    #[diagnostic(
        code(vault_store_E0207),
        help("addresses are hexadecimal, with or without a 0x prefix")
    )]
    InvalidAddress(String),

    // ========================================================================
    // References (E04xx)
    // ========================================================================
    #[error("{target} is already borrowed")]
    #[diagnostic(
        code(vault_ref_E0401),
        help("the outstanding reference is released when the frame that created it returns")
    )]
    AlreadyBorrowed { target: String },

    #[error("member '{member}' is not accessible through '{granted}'")]
    #[diagnostic(code(vault_ref_E0402))]
    MemberNotGranted { member: String, granted: String },

    #[error("reference {reference} is no longer valid")]
    #[diagnostic(
        code(vault_ref_E0403),
        help("references cannot outlive the frame that created them")
    )]
    DanglingReference { reference: String },

    // ========================================================================
    // Destruction (E05xx)
    // ========================================================================
    #[error("resource {id} destroyed twice")]
    #[diagnostic(code(vault_destroy_E0501))]
    DoubleDestroy { id: ResourceId },

    #[error("field '{field}' of resource {id} was already moved out")]
    #[diagnostic(
        code(vault_destroy_E0502),
        help("a destructor cannot tear down a slot that no longer holds a value")
    )]
    FieldMoved { id: ResourceId, field: String },

    #[error("destructor for resource {id} leaves linear field '{field}' unhandled")]
    #[diagnostic(
        code(vault_destroy_E0503),
        help("every linear field must be destroyed or moved out by the destructor")
    )]
    IncompleteDestructor { id: ResourceId, field: String },

    // ========================================================================
    // Frames and transactions (E06xx)
    // ========================================================================
    #[error("frame {expected} is not the innermost frame (found {found})")]
    #[diagnostic(code(vault_txn_E0601))]
    FrameMismatch { expected: String, found: String },

    #[error("call depth limit of {limit} frames exceeded")]
    #[diagnostic(code(vault_txn_E0602))]
    FrameDepthExceeded { limit: usize },

    #[error("no transaction is active")]
    #[diagnostic(code(vault_txn_E0603), help("call on_transaction_start or use execute()"))]
    NoTransaction,

    #[error("a transaction is already active")]
    #[diagnostic(code(vault_txn_E0605), help("transactions run to completion before the next begins"))]
    NestedTransaction,

    #[error("transaction aborted: {reason}")]
    #[diagnostic(code(vault_txn_E0604))]
    TransactionAborted { reason: String },

    /// A failed borrow propagated with `?`
    #[error(transparent)]
    #[diagnostic(transparent)]
    Borrow(#[from] BorrowFailure),

    // ========================================================================
    // Ambient
    // ========================================================================
    #[error("configuration error: {0}")]
    #[diagnostic(code(vault_config_E0701))]
    Config(String),

    #[error("encoding error: {0}")]
    #[diagnostic(code(vault_codec_E0702))]
    Codec(String),

    #[error(transparent)]
    #[diagnostic(code(vault_io_E0703))]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// Fatal errors abort and roll back the enclosing transaction.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            VaultError::AlreadyBorrowed { .. }
                | VaultError::Borrow(_)
                | VaultError::UnknownBinding { .. }
                | VaultError::NotAContainer { .. }
                | VaultError::InvalidPath(_)
                | VaultError::InvalidAddress(_)
                | VaultError::Config(_)
                | VaultError::Codec(_)
                | VaultError::Io(_)
        )
    }
}

impl From<ValueError> for VaultError {
    fn from(err: ValueError) -> Self {
        match err {
            ValueError::LinearInCopyable { type_name, field } => {
                VaultError::LinearInCopyable { type_name, field }
            }
            ValueError::CopyOfLinear { type_name } => VaultError::CopyOfLinear { type_name },
            ValueError::InvalidPath(path) => VaultError::InvalidPath(path),
            ValueError::InvalidAddress(addr) => VaultError::InvalidAddress(addr),
        }
    }
}

impl From<bincode::Error> for VaultError {
    fn from(err: bincode::Error) -> Self {
        VaultError::Codec(err.to_string())
    }
}

/// Why a borrow did not produce a reference.
///
/// None of these abort the transaction: a missing or revoked link must look
/// like a silent failure to the capability holder.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum BorrowFailure {
    #[error("nothing is stored at the target path")]
    #[diagnostic(code(vault_link_E0301))]
    AbsentTarget,

    #[error("stored or declared type does not match the requested type")]
    #[diagnostic(code(vault_link_E0302))]
    TypeMismatch,

    #[error("the target is already borrowed")]
    #[diagnostic(code(vault_link_E0303))]
    AlreadyBorrowed,

    #[error("no link at the capability path")]
    #[diagnostic(code(vault_link_E0304), help("the link may have been revoked with unlink"))]
    DeadLink,

    #[error("link chain is cyclic or too deep")]
    #[diagnostic(code(vault_link_E0305))]
    LinkCycle,

    #[error("no authority over the target account")]
    #[diagnostic(code(vault_link_E0306))]
    Unauthorized,

    #[error("requested type needs an authorized capability")]
    #[diagnostic(
        code(vault_link_E0307),
        help("only `auth` capabilities may be downcast to a more specific type")
    )]
    NotAuthorized,

    #[error("references can only be issued inside a transaction")]
    #[diagnostic(code(vault_link_E0308))]
    NoTransaction,
}
