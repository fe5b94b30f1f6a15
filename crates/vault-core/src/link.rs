//! Links and capabilities
//!
//! A link at `/public/x` or `/private/x` names a target path and the type
//! its issuer promises. A [`Capability`] names a link path, nothing more,
//! and is resolved again on every borrow. Unlinking the path is therefore
//! enough to revoke every capability ever handed out for it.
//!
//! Borrows through a capability never fail fatally. A missing, revoked or
//! mistyped link is reported as a [`BorrowFailure`] (or `None`), which the
//! holder cannot tell apart from a target that was simply moved away.

use crate::error::{BorrowFailure, VaultError, VaultResult};
use crate::runtime::Runtime;
use crate::storage::{Link, StoredEntry};
use tracing::{debug, trace};
use vault_val::{
    Address, Admission, BorrowType, Capability, Domain, RefTarget, Reference, StoragePath, Type,
};

/// Target reached by following a capability's link chain
#[derive(Debug, Clone, PartialEq)]
struct Resolved {
    address: Address,
    path: StoragePath,
    /// Types promised by the links followed on the way
    promised: Vec<Type>,
}

impl Runtime {
    /// Create a link at `source` pointing at `target`.
    ///
    /// Returns `Ok(None)` when `source` is already in use; the existing
    /// link is left untouched.
    pub fn link(
        &mut self,
        address: Address,
        source: &StoragePath,
        target: &StoragePath,
        borrow_type: BorrowType,
    ) -> VaultResult<Option<Capability>> {
        let result = self.create_link(address, source, target, borrow_type);
        self.guard(result)
    }

    fn create_link(
        &mut self,
        address: Address,
        source: &StoragePath,
        target: &StoragePath,
        borrow_type: BorrowType,
    ) -> VaultResult<Option<Capability>> {
        self.require_authority(address)?;
        if !source.domain.holds_links() {
            return Err(VaultError::InvalidDomain {
                path: source.clone(),
            });
        }
        if self.store.contains(address, source) {
            debug!(address = %address, source = %source, "already linked");
            return Ok(None);
        }
        debug!(address = %address, source = %source, target = %target, ty = %borrow_type, "link");
        let capability = Capability::new(address, source.clone(), Some(borrow_type.clone()));
        self.store.insert(
            address,
            source,
            StoredEntry::Link(Link {
                source: source.clone(),
                target: target.clone(),
                borrow_type,
            }),
        );
        Ok(Some(capability))
    }

    /// Remove the link at `path`. Capabilities naming it stay valid values
    /// but every later borrow through them fails.
    pub fn unlink(&mut self, address: Address, path: &StoragePath) -> VaultResult<()> {
        let result = self.remove_link(address, path);
        self.guard(result)
    }

    fn remove_link(&mut self, address: Address, path: &StoragePath) -> VaultResult<()> {
        self.require_authority(address)?;
        if !path.domain.holds_links() {
            return Err(VaultError::InvalidDomain { path: path.clone() });
        }
        if self.store.link(address, path).is_some() {
            debug!(address = %address, path = %path, "unlink");
            self.store.remove(address, path);
        }
        Ok(())
    }

    /// Capability for the link path `path`. Nothing is checked beyond the
    /// domain: the capability may name a path that was never linked.
    /// Capabilities to `/private` paths need the account's authority.
    pub fn get_capability(
        &mut self,
        address: Address,
        path: &StoragePath,
        borrow_type: Option<BorrowType>,
    ) -> VaultResult<Capability> {
        let allowed = match path.domain {
            Domain::Storage => Err(VaultError::InvalidDomain { path: path.clone() }),
            Domain::Private => self.require_authority(address),
            Domain::Public => Ok(()),
        };
        let result = allowed.map(|_| Capability::new(address, path.clone(), borrow_type));
        self.guard(result)
    }

    /// Target path of the link at `path`, if there is one
    pub fn link_target(
        &mut self,
        address: Address,
        path: &StoragePath,
    ) -> VaultResult<Option<StoragePath>> {
        let allowed = match path.domain {
            Domain::Public => Ok(()),
            _ => self.require_authority(address),
        };
        let result = allowed.map(|_| self.store.link(address, path).map(|link| link.target.clone()));
        self.guard(result)
    }

    /// Would `borrow(capability, requested)` succeed, ignoring exclusivity?
    pub fn check_capability(&self, capability: &Capability, requested: &BorrowType) -> bool {
        self.resolve(capability, requested)
            .and_then(|resolved| self.check_target(&resolved, requested))
            .is_ok()
    }

    /// Borrow the value behind `capability` as `requested`
    pub fn borrow(&mut self, capability: &Capability, requested: &BorrowType) -> Option<Reference> {
        self.try_borrow(capability, requested).ok()
    }

    /// Like [`Runtime::borrow`], with the reason for a failure
    pub fn try_borrow(
        &mut self,
        capability: &Capability,
        requested: &BorrowType,
    ) -> Result<Reference, BorrowFailure> {
        let result = self
            .resolve(capability, requested)
            .and_then(|resolved| self.issue_storage_reference(resolved, requested));
        if let Err(failure) = &result {
            debug!(capability = %capability, requested = %requested, %failure, "borrow failed");
        }
        result
    }

    /// Borrow a stored value directly, with the account's authority
    pub fn borrow_storage(
        &mut self,
        address: Address,
        path: &StoragePath,
        requested: &BorrowType,
    ) -> Option<Reference> {
        self.try_borrow_storage(address, path, requested).ok()
    }

    pub fn try_borrow_storage(
        &mut self,
        address: Address,
        path: &StoragePath,
        requested: &BorrowType,
    ) -> Result<Reference, BorrowFailure> {
        match self.require_authority(address) {
            Ok(()) => {}
            Err(VaultError::NoTransaction) => return Err(BorrowFailure::NoTransaction),
            Err(_) => return Err(BorrowFailure::Unauthorized),
        }
        if !path.domain.holds_values() {
            return Err(BorrowFailure::AbsentTarget);
        }
        let resolved = Resolved {
            address,
            path: path.clone(),
            promised: Vec::new(),
        };
        self.issue_storage_reference(resolved, requested)
    }

    fn admit(&self, declared: &BorrowType, requested: &BorrowType) -> Result<(), BorrowFailure> {
        match self.types.admits(declared, requested) {
            Admission::Upcast | Admission::Downcast => Ok(()),
            Admission::Unauthorized => Err(BorrowFailure::NotAuthorized),
            Admission::Mismatch => Err(BorrowFailure::TypeMismatch),
        }
    }

    /// Follow the link chain from the capability's path to a `/storage`
    /// path, checking `requested` against every declared type on the way.
    fn resolve(
        &self,
        capability: &Capability,
        requested: &BorrowType,
    ) -> Result<Resolved, BorrowFailure> {
        if let Some(declared) = &capability.borrow_type {
            self.admit(declared, requested)?;
        }
        let address = capability.address;
        let mut path = capability.path.clone();
        let mut promised = Vec::new();
        while path.domain.holds_links() {
            if promised.len() == self.config.max_link_depth {
                return Err(BorrowFailure::LinkCycle);
            }
            let link = self
                .store
                .link(address, &path)
                .ok_or(BorrowFailure::DeadLink)?;
            self.admit(&link.borrow_type, requested)?;
            trace!(address = %address, from = %path, to = %link.target, "follow link");
            promised.push(link.borrow_type.ty.clone());
            path = link.target.clone();
        }
        if promised.is_empty() {
            return Err(BorrowFailure::DeadLink);
        }
        Ok(Resolved {
            address,
            path,
            promised,
        })
    }

    /// A value must be stored at the target, of the requested type and of
    /// every type the links promised
    fn check_target(&self, resolved: &Resolved, requested: &BorrowType) -> Result<(), BorrowFailure> {
        let value = self
            .store
            .value(resolved.address, &resolved.path)
            .ok_or(BorrowFailure::AbsentTarget)?;
        let found = value.type_of();
        let conforms = std::iter::once(&requested.ty)
            .chain(&resolved.promised)
            .all(|ty| self.types.is_subtype(&found, ty));
        if conforms {
            Ok(())
        } else {
            Err(BorrowFailure::TypeMismatch)
        }
    }

    fn issue_storage_reference(
        &mut self,
        resolved: Resolved,
        requested: &BorrowType,
    ) -> Result<Reference, BorrowFailure> {
        if self.txn.is_none() {
            return Err(BorrowFailure::NoTransaction);
        }
        self.check_target(&resolved, requested)?;
        let identity = self
            .store
            .value(resolved.address, &resolved.path)
            .and_then(|value| value.resource_id());
        let target = RefTarget::Storage {
            address: resolved.address,
            path: resolved.path,
        };
        self.issue_reference(target, identity, requested.clone())
    }
}
