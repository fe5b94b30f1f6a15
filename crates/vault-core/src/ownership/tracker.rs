use super::Location;
use crate::error::{VaultError, VaultResult};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use vault_val::{FrameId, Linear, ResourceId, Value};

/// Where a linear identity currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipState {
    /// Held by exactly one location
    Owned(Location),
    /// In the hands of the host, between a move-out and the next bind
    InFlight,
    Destroyed,
}

impl OwnershipState {
    pub fn is_live(&self) -> bool {
        !matches!(self, OwnershipState::Destroyed)
    }
}

/// Copy of the ownership records, taken at transaction start
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSnapshot {
    records: BTreeMap<ResourceId, OwnershipState>,
}

/// One ownership record per linear identity the runtime has minted.
///
/// Identities are never reused: `next_id` only grows, even across a
/// rollback, so a stale resource left over from an aborted transaction can
/// never alias a fresh one.
#[derive(Debug)]
pub struct OwnershipTracker {
    next_id: u64,
    records: BTreeMap<ResourceId, OwnershipState>,
}

impl Default for OwnershipTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OwnershipTracker {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            records: BTreeMap::new(),
        }
    }

    /// Mint a fresh identity. New resources start in flight.
    pub fn mint(&mut self) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        self.records.insert(id, OwnershipState::InFlight);
        debug!(id = %id, "minted resource");
        id
    }

    /// Record an identity found in persisted storage
    pub fn adopt(&mut self, id: ResourceId, at: Location) {
        self.next_id = self.next_id.max(id.as_u64() + 1);
        self.records.insert(id, OwnershipState::Owned(at));
    }

    pub fn state(&self, id: ResourceId) -> Option<&OwnershipState> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fail unless `id` is in flight and may be bound somewhere
    pub fn expect_in_flight(&self, id: ResourceId) -> VaultResult<()> {
        match self.records.get(&id) {
            Some(OwnershipState::InFlight) => Ok(()),
            Some(OwnershipState::Owned(at)) => Err(VaultError::AlreadyOwned {
                id,
                at: at.clone(),
            }),
            Some(OwnershipState::Destroyed) => Err(VaultError::UseAfterDestroy { id }),
            None => Err(VaultError::UnknownResource { id }),
        }
    }

    /// In flight -> owned by `to`
    pub fn settle(&mut self, id: ResourceId, to: Location) -> VaultResult<()> {
        self.expect_in_flight(id)?;
        debug!(id = %id, to = %to, "bind");
        self.records.insert(id, OwnershipState::Owned(to));
        Ok(())
    }

    /// Owned by `from` -> in flight
    pub fn release(&mut self, id: ResourceId, from: &Location) -> VaultResult<()> {
        match self.records.get(&id) {
            Some(OwnershipState::Owned(at)) if at == from => {
                debug!(id = %id, from = %from, "move out");
                self.records.insert(id, OwnershipState::InFlight);
                Ok(())
            }
            Some(OwnershipState::Owned(at)) => Err(VaultError::AlreadyOwned {
                id,
                at: at.clone(),
            }),
            Some(OwnershipState::InFlight) => Err(VaultError::AlreadyInFlight { id }),
            Some(OwnershipState::Destroyed) => Err(VaultError::UseAfterDestroy { id }),
            None => Err(VaultError::UnknownResource { id }),
        }
    }

    /// Follow a value that shifted inside its container
    pub fn relocate(&mut self, id: ResourceId, to: Location) {
        if let Some(state) = self.records.get_mut(&id) {
            if matches!(state, OwnershipState::Owned(_)) {
                *state = OwnershipState::Owned(to);
            }
        }
    }

    /// Would `destroy(id, held_at)` succeed?
    pub fn check_destroy(&self, id: ResourceId, held_at: Option<&Location>) -> VaultResult<()> {
        match (self.records.get(&id), held_at) {
            (Some(OwnershipState::Destroyed), _) => Err(VaultError::DoubleDestroy { id }),
            (Some(OwnershipState::InFlight), None) => Ok(()),
            (Some(OwnershipState::Owned(at)), Some(held)) if at == held => Ok(()),
            (Some(OwnershipState::Owned(at)), _) => Err(VaultError::AlreadyOwned {
                id,
                at: at.clone(),
            }),
            (Some(OwnershipState::InFlight), Some(_)) => Err(VaultError::AlreadyInFlight { id }),
            (None, _) => Err(VaultError::UnknownResource { id }),
        }
    }

    /// Mark `id` destroyed. `held_at` is the owning location for a nested
    /// resource, `None` for one the host holds in flight.
    pub fn destroy(&mut self, id: ResourceId, held_at: Option<&Location>) -> VaultResult<()> {
        self.check_destroy(id, held_at)?;
        debug!(id = %id, "destroyed");
        self.records.insert(id, OwnershipState::Destroyed);
        Ok(())
    }

    /// Bind every root resource of `value` to `at`, all or nothing
    pub fn settle_value(&mut self, value: &Value, at: &Location) -> VaultResult<()> {
        let mut roots = Vec::new();
        value.for_each_root(&mut |id, keys| roots.push((id, at.with_keys(keys))));

        let mut seen = BTreeSet::new();
        for (id, loc) in &roots {
            self.expect_in_flight(*id)?;
            if !seen.insert(*id) {
                return Err(VaultError::AlreadyOwned {
                    id: *id,
                    at: loc.clone(),
                });
            }
        }
        for (id, loc) in roots {
            self.settle(id, loc)?;
        }
        Ok(())
    }

    /// Release every root resource of `value` held at `at`, all or nothing
    pub fn release_value(&mut self, value: &Value, at: &Location) -> VaultResult<()> {
        let mut roots = Vec::new();
        value.for_each_root(&mut |id, keys| roots.push((id, at.with_keys(keys))));

        for (id, loc) in &roots {
            match self.records.get(id) {
                Some(OwnershipState::Owned(owner)) if owner == loc => {}
                _ => return self.release(*id, loc),
            }
        }
        for (id, loc) in roots {
            self.release(id, &loc)?;
        }
        Ok(())
    }

    /// Identities still owned by a binding of `frame`
    pub fn held_in_frame(&self, frame: FrameId) -> Vec<(ResourceId, Location)> {
        self.records
            .iter()
            .filter_map(|(id, state)| match state {
                OwnershipState::Owned(at) if at.frame() == Some(frame) => Some((*id, at.clone())),
                _ => None,
            })
            .collect()
    }

    /// Live identities that are neither in storage nor inside a stored
    /// resource: in flight, or owned by a local.
    pub fn lingering(&self) -> Vec<(ResourceId, Option<Location>)> {
        self.records
            .iter()
            .filter_map(|(id, state)| match state {
                OwnershipState::InFlight => Some((*id, None)),
                OwnershipState::Owned(at) if at.frame().is_some() => Some((*id, Some(at.clone()))),
                _ => None,
            })
            .collect()
    }

    /// Drop the records of destroyed identities. Returns how many went.
    pub fn forget_destroyed(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, state| state.is_live());
        before - self.records.len()
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            records: self.records.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: TrackerSnapshot) {
        self.records = snapshot.records;
    }
}
