//! Linear values: move-only resources with a process-unique identity
//!
//! A linear value can be moved or destroyed but never duplicated. Every
//! resource carries a [`ResourceId`] minted by the runtime's ownership
//! tracker, independent of the location currently holding it.

use crate::ValueKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-unique identity of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

impl ResourceId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a value may be duplicated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Linearity {
    /// Value can be copied freely
    Copyable,
    /// Value can only be moved or destroyed
    Linear,
}

impl Linearity {
    pub fn is_linear(&self) -> bool {
        matches!(self, Self::Linear)
    }
}

impl fmt::Display for Linearity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copyable => write!(f, "copyable"),
            Self::Linear => write!(f, "linear"),
        }
    }
}

/// Marker trait for values that may contain linear identities
pub trait Linear {
    fn linearity(&self) -> Linearity;

    fn is_linear(&self) -> bool {
        self.linearity().is_linear()
    }

    /// Visit every resource that is not nested inside another resource.
    ///
    /// `keys` is the chain of container keys leading from `self` to the
    /// resource; it is empty when `self` is the resource.
    fn for_each_root(&self, visit: &mut dyn FnMut(ResourceId, &[ValueKey]));

    /// Identities of every root resource, in visiting order
    fn root_ids(&self) -> Vec<ResourceId> {
        let mut ids = Vec::new();
        self.for_each_root(&mut |id, _| ids.push(id));
        ids
    }
}
