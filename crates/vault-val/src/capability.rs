use crate::{Address, BorrowType, StoragePath};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A storable, copyable handle naming an account's link path.
///
/// Holding a capability grants nothing by itself: it is resolved through
/// the link at `path` every time it is borrowed, so unlinking the path
/// revokes every copy that was handed out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub address: Address,
    pub path: StoragePath,
    pub borrow_type: Option<BorrowType>,
}

impl Capability {
    pub fn new(address: Address, path: StoragePath, borrow_type: Option<BorrowType>) -> Self {
        Self {
            address,
            path,
            borrow_type,
        }
    }

    /// The same capability, retyped for a different borrow type
    pub fn with_borrow_type(&self, borrow_type: BorrowType) -> Self {
        Self {
            address: self.address,
            path: self.path.clone(),
            borrow_type: Some(borrow_type),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.borrow_type {
            Some(ty) => write!(f, "Capability<{}>({}{})", ty, self.address, self.path),
            None => write!(f, "Capability({}{})", self.address, self.path),
        }
    }
}
