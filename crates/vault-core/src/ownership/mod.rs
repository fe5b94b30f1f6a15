//! Single-owner bookkeeping for linear values
//!
//! Rust already refuses to clone a [`Value`], but identities can still be
//! forged or smuggled around the runtime (a resource rebuilt from its id, a
//! field pulled out of a resource the host holds directly). The tracker
//! keeps one record per identity and checks it on every bind, save, load
//! and destroy, so the single-owner rule holds at runtime whatever the
//! host does.
//!
//! # Locations
//!
//! A resource is owned by exactly one [`Location`]:
//!
//! - a local binding of a live frame
//! - a field slot of another resource
//! - a storage path of an account
//! - an element of a container held at any of the above
//!
//! Resources nested inside another resource are recorded against the
//! enclosing field, so moving the outer resource never rewrites the records
//! of what it owns.

mod frame;
mod tracker;

pub use frame::{Binding, Frame, FrameStack};
pub use tracker::{OwnershipState, OwnershipTracker, TrackerSnapshot};

use std::fmt;
use vault_val::{Address, FrameId, Linear, ResourceId, StoragePath, Value, ValueKey, VaultStr};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Local { frame: FrameId, name: VaultStr },
    Field { owner: ResourceId, field: VaultStr },
    Storage { address: Address, path: StoragePath },
    Element { base: Box<Location>, key: ValueKey },
}

impl Location {
    pub fn local(frame: FrameId, name: impl Into<VaultStr>) -> Self {
        Location::Local {
            frame,
            name: name.into(),
        }
    }

    pub fn field(owner: ResourceId, field: impl Into<VaultStr>) -> Self {
        Location::Field {
            owner,
            field: field.into(),
        }
    }

    pub fn storage(address: Address, path: StoragePath) -> Self {
        Location::Storage { address, path }
    }

    pub fn element(&self, key: ValueKey) -> Self {
        Location::Element {
            base: Box::new(self.clone()),
            key,
        }
    }

    /// Descend through a chain of container keys
    pub fn with_keys(&self, keys: &[ValueKey]) -> Self {
        keys.iter()
            .fold(self.clone(), |loc, key| loc.element(key.clone()))
    }

    /// The binding, field or path that ultimately holds this location
    pub fn root(&self) -> &Location {
        match self {
            Location::Element { base, .. } => base.root(),
            other => other,
        }
    }

    /// Frame owning the location, if it is rooted in a local binding
    pub fn frame(&self) -> Option<FrameId> {
        match self.root() {
            Location::Local { frame, .. } => Some(*frame),
            _ => None,
        }
    }

    pub fn is_storage(&self) -> bool {
        matches!(self.root(), Location::Storage { .. })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local { frame, name } => write!(f, "{}:{}", frame, name),
            Location::Field { owner, field } => write!(f, "{}.{}", owner, field),
            Location::Storage { address, path } => write!(f, "{}{}", address, path),
            Location::Element { base, key } => write!(f, "{}[{}]", base, key),
        }
    }
}

/// Visit every resource reachable from `value` together with the location
/// that owns it, descending into resource fields.
pub fn walk_owned(value: &Value, at: &Location, visit: &mut dyn FnMut(ResourceId, Location)) {
    let mut roots = Vec::new();
    value.for_each_root(&mut |id, keys| roots.push((id, at.with_keys(keys))));
    for (id, loc) in roots {
        visit(id, loc);
    }
    walk_nested(value, at, visit);
}

/// Descend into the fields of resources inside `value`. The resources
/// themselves were already reported as roots.
fn walk_nested(value: &Value, at: &Location, visit: &mut dyn FnMut(ResourceId, Location)) {
    match value {
        Value::Resource(res) => {
            for (name, slot) in res.fields() {
                if let Some(field) = slot {
                    walk_owned(field, &Location::field(res.id(), name.clone()), visit);
                }
            }
        }
        Value::Array(elems) => {
            for (i, elem) in elems.iter().enumerate() {
                walk_nested(elem, &at.element(ValueKey::Uint(i as u64)), visit);
            }
        }
        Value::Dict(map) => {
            for (key, elem) in map {
                walk_nested(elem, &at.element(key.clone()), visit);
            }
        }
        _ => {}
    }
}
