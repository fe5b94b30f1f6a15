// =============================================================================
// Account storage
// =============================================================================
//
// Persisted state is one map per account, split by domain:
//
//   Address -> Domain -> identifier -> StoredEntry
//
// `/storage` holds values. `/private` and `/public` hold links. This map is
// the only state that outlives a transaction; `Store::state_root` commits
// to it with a blake3 hash of its bincode encoding.

use crate::error::{VaultError, VaultResult};
use crate::ownership::Location;
use crate::runtime::Runtime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use vault_val::{
    Address, BorrowType, Domain, Linear, RefTarget, StoragePath, Type, Value, VaultStr,
};

/// Indirection from a link path to the path holding the value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source: StoragePath,
    pub target: StoragePath,
    /// The type the issuer promises the target conforms to
    pub borrow_type: BorrowType,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub enum StoredEntry {
    Value(Value),
    Link(Link),
}

impl StoredEntry {
    pub fn kind_name(&self) -> &'static str {
        match self {
            StoredEntry::Value(_) => "value",
            StoredEntry::Link(_) => "link",
        }
    }
}

type Paths = BTreeMap<VaultStr, StoredEntry>;

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Store {
    accounts: BTreeMap<Address, BTreeMap<Domain, Paths>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, address: Address, path: &StoragePath) -> Option<&StoredEntry> {
        self.accounts
            .get(&address)?
            .get(&path.domain)?
            .get(path.identifier.as_str())
    }

    fn get_mut(&mut self, address: Address, path: &StoragePath) -> Option<&mut StoredEntry> {
        self.accounts
            .get_mut(&address)?
            .get_mut(&path.domain)?
            .get_mut(path.identifier.as_str())
    }

    pub fn contains(&self, address: Address, path: &StoragePath) -> bool {
        self.get(address, path).is_some()
    }

    pub fn value(&self, address: Address, path: &StoragePath) -> Option<&Value> {
        match self.get(address, path)? {
            StoredEntry::Value(value) => Some(value),
            StoredEntry::Link(_) => None,
        }
    }

    pub(crate) fn value_mut(&mut self, address: Address, path: &StoragePath) -> Option<&mut Value> {
        match self.get_mut(address, path)? {
            StoredEntry::Value(value) => Some(value),
            StoredEntry::Link(_) => None,
        }
    }

    pub fn link(&self, address: Address, path: &StoragePath) -> Option<&Link> {
        match self.get(address, path)? {
            StoredEntry::Link(link) => Some(link),
            StoredEntry::Value(_) => None,
        }
    }

    pub(crate) fn insert(
        &mut self,
        address: Address,
        path: &StoragePath,
        entry: StoredEntry,
    ) -> Option<StoredEntry> {
        self.accounts
            .entry(address)
            .or_default()
            .entry(path.domain)
            .or_default()
            .insert(path.identifier.clone(), entry)
    }

    /// Remove an entry, pruning maps left empty so that equal contents
    /// always encode (and hash) the same way
    pub(crate) fn remove(&mut self, address: Address, path: &StoragePath) -> Option<StoredEntry> {
        let domains = self.accounts.get_mut(&address)?;
        let paths = domains.get_mut(&path.domain)?;
        let entry = paths.remove(path.identifier.as_str());
        if paths.is_empty() {
            domains.remove(&path.domain);
        }
        if domains.is_empty() {
            self.accounts.remove(&address);
        }
        entry
    }

    pub fn accounts(&self) -> impl Iterator<Item = Address> + '_ {
        self.accounts.keys().copied()
    }

    /// Paths in use in one domain of an account, in identifier order
    pub fn paths(&self, address: Address, domain: Domain) -> Vec<StoragePath> {
        self.accounts
            .get(&address)
            .and_then(|domains| domains.get(&domain))
            .map(|paths| {
                paths
                    .keys()
                    .map(|id| StoragePath {
                        domain,
                        identifier: id.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every entry of every account
    pub fn entries(&self) -> impl Iterator<Item = (Address, StoragePath, &StoredEntry)> + '_ {
        self.accounts.iter().flat_map(|(address, domains)| {
            domains.iter().flat_map(move |(domain, paths)| {
                paths.iter().map(move |(id, entry)| {
                    let path = StoragePath {
                        domain: *domain,
                        identifier: id.clone(),
                    };
                    (*address, path, entry)
                })
            })
        })
    }

    pub fn to_bytes(&self) -> VaultResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> VaultResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Commitment to the full persisted state
    pub fn state_root(&self) -> VaultResult<blake3::Hash> {
        Ok(blake3::hash(&self.to_bytes()?))
    }
}

// =============================================================================
// Storage operations
// =============================================================================

impl Runtime {
    fn check_value_path(&self, address: Address, path: &StoragePath) -> VaultResult<()> {
        self.require_authority(address)?;
        if !path.domain.holds_values() {
            return Err(VaultError::InvalidDomain { path: path.clone() });
        }
        Ok(())
    }

    /// Move `value` into `path` of `address`. The slot must be empty:
    /// saving over an existing value is `PathOccupied`.
    pub fn save(&mut self, address: Address, path: &StoragePath, value: Value) -> VaultResult<()> {
        let result = self.save_value(address, path, value);
        self.guard(result)
    }

    fn save_value(&mut self, address: Address, path: &StoragePath, value: Value) -> VaultResult<()> {
        self.check_value_path(address, path)?;
        if !value.is_storable() {
            return Err(VaultError::NotStorable {
                kind: value.kind_name().to_string(),
            });
        }
        if self.store.contains(address, path) {
            return Err(VaultError::PathOccupied {
                address,
                path: path.clone(),
            });
        }
        self.tracker
            .settle_value(&value, &Location::storage(address, path.clone()))?;
        debug!(address = %address, path = %path, kind = value.kind_name(), "save");
        self.store.insert(address, path, StoredEntry::Value(value));
        Ok(())
    }

    /// Move the value at `path` out of storage.
    ///
    /// `Ok(None)` when the slot is empty. A value of another type is a fatal
    /// `LoadTypeMismatch`: paths are shared by every contract deployed to
    /// the account, so a mismatch means two of them disagree.
    pub fn load(
        &mut self,
        address: Address,
        path: &StoragePath,
        expected: &Type,
    ) -> VaultResult<Option<Value>> {
        let result = self.load_value(address, path, expected);
        self.guard(result)
    }

    fn load_value(
        &mut self,
        address: Address,
        path: &StoragePath,
        expected: &Type,
    ) -> VaultResult<Option<Value>> {
        self.check_value_path(address, path)?;
        let Some(value) = self.store.value(address, path) else {
            return Ok(None);
        };
        self.check_stored_type(address, path, value, expected)?;

        let target = RefTarget::Storage {
            address,
            path: path.clone(),
        };
        if self.refs.is_borrowed(&target) {
            return Err(VaultError::AlreadyBorrowed {
                target: target.to_string(),
            });
        }
        self.tracker
            .release_value(value, &Location::storage(address, path.clone()))?;
        debug!(address = %address, path = %path, "load");
        match self.store.remove(address, path) {
            Some(StoredEntry::Value(value)) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// Duplicate a copyable stored value, leaving it in place
    pub fn copy(
        &mut self,
        address: Address,
        path: &StoragePath,
        expected: &Type,
    ) -> VaultResult<Option<Value>> {
        let result = self.copy_value(address, path, expected);
        self.guard(result)
    }

    fn copy_value(
        &self,
        address: Address,
        path: &StoragePath,
        expected: &Type,
    ) -> VaultResult<Option<Value>> {
        self.check_value_path(address, path)?;
        let Some(value) = self.store.value(address, path) else {
            return Ok(None);
        };
        self.check_stored_type(address, path, value, expected)?;
        if value.is_linear() {
            return Err(VaultError::CopyOfLinear {
                type_name: value.type_of().to_string(),
            });
        }
        Ok(Some(value.duplicate()?))
    }

    fn check_stored_type(
        &self,
        address: Address,
        path: &StoragePath,
        value: &Value,
        expected: &Type,
    ) -> VaultResult<()> {
        let found = value.type_of();
        if self.types.is_subtype(&found, expected) {
            Ok(())
        } else {
            Err(VaultError::LoadTypeMismatch {
                address,
                path: path.clone(),
                expected: expected.to_string(),
                found: found.to_string(),
            })
        }
    }

    /// Dynamic type of the value at `path`, `None` for an empty slot
    pub fn type_at(&mut self, address: Address, path: &StoragePath) -> VaultResult<Option<Type>> {
        let result = self
            .check_value_path(address, path)
            .map(|_| self.store.value(address, path).map(Value::type_of));
        self.guard(result)
    }

    /// Identifiers in use in one domain. Listing `/storage` or `/private`
    /// needs the account's authority; `/public` is open to anyone.
    pub fn stored_paths(&mut self, address: Address, domain: Domain) -> VaultResult<Vec<StoragePath>> {
        let allowed = match domain {
            Domain::Public => Ok(()),
            _ => self.require_authority(address),
        };
        let result = allowed.map(|_| self.store.paths(address, domain));
        self.guard(result)
    }
}
