//! Exclusive, frame-scoped views onto stored and local values
//!
//! At most one [`Reference`] exists per target at a time. The lock is
//! held until the frame that created the reference exits, so a nested
//! call can neither borrow the same value again nor move it away while an
//! outer frame is reading it.
//!
//! Every access through a reference names a member, which must belong to
//! the member set of the granted type.

use crate::container;
use crate::error::{BorrowFailure, VaultError, VaultResult};
use crate::ownership::{FrameStack, Location, OwnershipTracker};
use crate::runtime::Runtime;
use crate::storage::Store;
use indexmap::IndexMap;
use tracing::debug;
use vault_val::{BorrowType, FrameId, RefId, RefTarget, Reference, ResourceId, Value, ValueKey};

/// Outstanding references, one per target
#[derive(Debug)]
pub struct ReferenceManager {
    next_id: u64,
    outstanding: IndexMap<RefTarget, (RefId, FrameId)>,
}

impl Default for ReferenceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceManager {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            outstanding: IndexMap::new(),
        }
    }

    /// Lock `target` for `frame`. `None` if it is already locked.
    pub fn acquire(&mut self, target: RefTarget, frame: FrameId) -> Option<RefId> {
        if self.outstanding.contains_key(&target) {
            return None;
        }
        let id = RefId(self.next_id);
        self.next_id += 1;
        self.outstanding.insert(target, (id, frame));
        Some(id)
    }

    pub fn is_borrowed(&self, target: &RefTarget) -> bool {
        self.outstanding.contains_key(target)
    }

    /// Whether `reference` still holds the lock on its target
    pub fn is_live(&self, reference: &Reference) -> bool {
        self.outstanding
            .get(&reference.target)
            .is_some_and(|(id, _)| *id == reference.id)
    }

    /// Drop the references created in `frame` and those onto its locals
    pub fn release_frame(&mut self, frame: FrameId) -> usize {
        let before = self.outstanding.len();
        self.outstanding.retain(|target, (_, owner)| {
            let onto_local = matches!(target, RefTarget::Local { frame: f, .. } if *f == frame);
            *owner != frame && !onto_local
        });
        before - self.outstanding.len()
    }

    pub fn release_all(&mut self) {
        self.outstanding.clear();
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }
}

fn dangling(reference: &Reference) -> VaultError {
    VaultError::DanglingReference {
        reference: reference.to_string(),
    }
}

/// The value `reference` points at, provided it is still the same value
fn target_mut<'a>(
    store: &'a mut Store,
    frames: &'a mut FrameStack,
    reference: &Reference,
) -> VaultResult<&'a mut Value> {
    let value = match &reference.target {
        RefTarget::Storage { address, path } => store.value_mut(*address, path),
        RefTarget::Local { frame, name } => frames
            .get_mut(*frame)
            .ok()
            .and_then(|f| f.get_mut(name).ok()),
    };
    match value {
        Some(value) if value.resource_id() == reference.identity => Ok(value),
        _ => Err(dangling(reference)),
    }
}

fn unknown_member(owner: &Value, member: &str) -> VaultError {
    VaultError::UnknownBinding {
        name: format!("{}.{}", owner.type_of(), member),
    }
}

/// Anything written through a reference may end up persisted
fn ensure_storable(value: &Value) -> VaultResult<()> {
    if value.is_storable() {
        Ok(())
    } else {
        Err(VaultError::NotStorable {
            kind: value.kind_name().to_string(),
        })
    }
}

impl Runtime {
    /// Register a reference onto `target` in the current frame
    pub(crate) fn issue_reference(
        &mut self,
        target: RefTarget,
        identity: Option<ResourceId>,
        granted: BorrowType,
    ) -> Result<Reference, BorrowFailure> {
        let frame = self.frames.current().unwrap_or(FrameId::TRANSACTION);
        let id = self
            .refs
            .acquire(target.clone(), frame)
            .ok_or(BorrowFailure::AlreadyBorrowed)?;
        debug!(reference = %id, target = %target, ty = %granted, frame = %frame, "borrow");
        Ok(Reference {
            id,
            target,
            identity,
            granted,
            frame,
        })
    }

    /// Borrow the value bound to a local. The local cannot be moved or
    /// rebound until the reference's frame exits.
    pub fn borrow_local(
        &mut self,
        frame: FrameId,
        name: &str,
        requested: &BorrowType,
    ) -> Result<Reference, BorrowFailure> {
        if self.txn.is_none() {
            return Err(BorrowFailure::NoTransaction);
        }
        let value = self
            .frames
            .get(frame)
            .ok()
            .and_then(|f| f.get(name).ok())
            .ok_or(BorrowFailure::AbsentTarget)?;
        if !self.types.is_subtype(&value.type_of(), &requested.ty) {
            return Err(BorrowFailure::TypeMismatch);
        }
        let identity = value.resource_id();
        let target = RefTarget::Local {
            frame,
            name: name.into(),
        };
        self.issue_reference(target, identity, requested.clone())
    }

    /// Is `reference` still usable?
    pub fn is_live(&self, reference: &Reference) -> bool {
        self.refs.is_live(reference)
    }

    fn check_access(&self, reference: &Reference, member: &str) -> VaultResult<()> {
        if !self.refs.is_live(reference) {
            return Err(dangling(reference));
        }
        if !self.types.members_of(&reference.granted.ty).contains(member) {
            return Err(VaultError::MemberNotGranted {
                member: member.to_string(),
                granted: reference.granted.to_string(),
            });
        }
        Ok(())
    }

    /// Copy a member out through `reference`
    pub fn ref_read(&mut self, reference: &Reference, member: &str) -> VaultResult<Value> {
        let result = self.read_member(reference, member);
        self.guard(result)
    }

    fn read_member(&mut self, reference: &Reference, member: &str) -> VaultResult<Value> {
        self.check_access(reference, member)?;
        let target: &Value = target_mut(&mut self.store, &mut self.frames, reference)?;
        let value = match target {
            Value::Resource(res) => {
                if !res.has_field(member) {
                    return Err(unknown_member(target, member));
                }
                res.field(member).ok_or_else(|| VaultError::FieldMoved {
                    id: res.id(),
                    field: member.to_string(),
                })?
            }
            Value::Struct(s) => s.get(member).ok_or_else(|| unknown_member(target, member))?,
            other => return Err(unknown_member(other, member)),
        };
        Ok(value.duplicate()?)
    }

    /// Overwrite a member through `reference`. A member still holding a
    /// resource cannot be overwritten.
    pub fn ref_set(&mut self, reference: &Reference, member: &str, value: Value) -> VaultResult<()> {
        let result = self.set_member(reference, member, value);
        self.guard(result)
    }

    fn set_member(&mut self, reference: &Reference, member: &str, value: Value) -> VaultResult<()> {
        self.check_access(reference, member)?;
        ensure_storable(&value)?;
        let name = reference.target.to_string();
        let target = target_mut(&mut self.store, &mut self.frames, reference)?;
        let result = match target {
            Value::Resource(res) => container::put_field(&mut self.tracker, res, &name, member, value),
            Value::Struct(s) => {
                if s.get(member).is_none() {
                    return Err(VaultError::UnknownBinding {
                        name: format!("{}.{}", name, member),
                    });
                }
                Ok(s.set(member, value)?)
            }
            other => Err(unknown_member(other, member)),
        };
        result?;
        debug!(reference = %reference.id, member, "set through reference");
        Ok(())
    }

    /// Move `value` into the container held by a member of the referenced
    /// resource, e.g. a deposit into a vault
    pub fn ref_insert(
        &mut self,
        reference: &Reference,
        member: &str,
        key: ValueKey,
        value: Value,
    ) -> VaultResult<()> {
        let result = ensure_storable(&value).and_then(|()| {
            self.with_member_container(reference, member, |tracker, container, at, name| {
                container::insert(tracker, container, at, name, key, value)
            })
        });
        self.guard(result)
    }

    /// Append `value` to the array held by a member of the referenced
    /// resource
    pub fn ref_push(&mut self, reference: &Reference, member: &str, value: Value) -> VaultResult<()> {
        let result = ensure_storable(&value).and_then(|()| {
            self.with_member_container(reference, member, |tracker, container, at, name| {
                container::push(tracker, container, at, name, value)
            })
        });
        self.guard(result)
    }

    /// Move an element out of the container held by a member of the
    /// referenced resource, e.g. a withdrawal
    pub fn ref_remove(
        &mut self,
        reference: &Reference,
        member: &str,
        key: ValueKey,
    ) -> VaultResult<Option<Value>> {
        let result = self.with_member_container(reference, member, |tracker, container, at, name| {
            container::remove(tracker, container, at, name, &key)
        });
        self.guard(result)
    }

    fn with_member_container<T>(
        &mut self,
        reference: &Reference,
        member: &str,
        op: impl FnOnce(&mut OwnershipTracker, &mut Value, &Location, &str) -> VaultResult<T>,
    ) -> VaultResult<T> {
        self.check_access(reference, member)?;
        let target = target_mut(&mut self.store, &mut self.frames, reference)?;
        let kind = target.kind_name();
        let Some(res) = target.as_resource_mut() else {
            return Err(VaultError::NotAContainer {
                name: format!("{}.{}", reference.target, member),
                kind: kind.to_string(),
            });
        };
        let id = res.id();
        let name = format!("{}.{}", res.type_name(), member);
        if !res.has_field(member) {
            return Err(VaultError::UnknownBinding { name });
        }
        let container = res.field_mut(member).ok_or_else(|| VaultError::FieldMoved {
            id,
            field: member.to_string(),
        })?;
        let result = op(&mut self.tracker, container, &Location::field(id, member), &name);
        if result.is_ok() {
            debug!(reference = %reference.id, member, "container updated through reference");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_val::StoragePath;

    fn local(frame: u32, name: &str) -> RefTarget {
        RefTarget::Local {
            frame: FrameId(frame),
            name: name.into(),
        }
    }

    #[test]
    fn test_one_reference_per_target() {
        let mut refs = ReferenceManager::new();
        let target = RefTarget::Storage {
            address: vault_val::Address(1),
            path: StoragePath::storage("vault"),
        };
        let id = refs.acquire(target.clone(), FrameId(2)).unwrap();
        assert_eq!(id, RefId(1));
        assert!(refs.acquire(target.clone(), FrameId(3)).is_none());
        assert_eq!(refs.release_frame(FrameId(3)), 0);
        assert_eq!(refs.release_frame(FrameId(2)), 1);
        assert_eq!(refs.acquire(target, FrameId(3)), Some(RefId(2)));
    }

    #[test]
    fn test_frame_exit_releases_references_onto_its_locals() {
        let mut refs = ReferenceManager::new();
        refs.acquire(local(2, "vault"), FrameId(3)).unwrap();
        refs.acquire(local(1, "other"), FrameId(3)).unwrap();
        assert_eq!(refs.release_frame(FrameId(2)), 1);
        assert_eq!(refs.len(), 1);
        refs.release_all();
        assert!(refs.is_empty());
    }
}
