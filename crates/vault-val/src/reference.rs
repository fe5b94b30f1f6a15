//! Ephemeral views onto stored or in-flight values
//!
//! A [`Reference`] is valid only for the dynamic extent of the frame that
//! created it. It is deliberately not serializable: references never
//! reach storage.

use crate::{Address, BorrowType, ResourceId, StoragePath, VaultStr};
use std::fmt;

/// Identifier of a call frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub u32);

impl FrameId {
    /// Scope of the transaction itself, outside any call frame
    pub const TRANSACTION: FrameId = FrameId(0);
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame{}", self.0)
    }
}

/// Identifier of an issued reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefId(pub u64);

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref{}", self.0)
    }
}

/// What a reference points at
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefTarget {
    /// A value in an account's private-data domain
    Storage { address: Address, path: StoragePath },
    /// A local binding of a live frame
    Local { frame: FrameId, name: VaultStr },
}

impl fmt::Display for RefTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefTarget::Storage { address, path } => write!(f, "{}{}", address, path),
            RefTarget::Local { frame, name } => write!(f, "{}:{}", frame, name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub id: RefId,
    pub target: RefTarget,
    /// Identity of the referenced resource, `None` for copyable targets
    pub identity: Option<ResourceId>,
    pub granted: BorrowType,
    /// Frame whose exit invalidates this reference
    pub frame: FrameId,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.id, self.granted, self.target)
    }
}
