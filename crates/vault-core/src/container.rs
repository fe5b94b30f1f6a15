//! Moves into and out of arrays, dictionaries and resource fields
//!
//! Shared by local bindings and by references: the caller resolves the
//! container and the location that owns it, these functions keep the
//! ownership records in step with the data.

use crate::error::{VaultError, VaultResult};
use crate::ownership::{Location, OwnershipTracker};
use vault_val::{Linear, Resource, ResourceId, Value, ValueKey};

fn index_of(key: &ValueKey) -> Option<usize> {
    match key {
        ValueKey::Uint(i) => usize::try_from(*i).ok(),
        ValueKey::Int(i) => usize::try_from(*i).ok(),
        _ => None,
    }
}

fn no_such_slot(name: &str, key: &ValueKey) -> VaultError {
    VaultError::UnknownBinding {
        name: format!("{}[{}]", name, key),
    }
}

fn not_a_container(name: &str, value: &Value) -> VaultError {
    VaultError::NotAContainer {
        name: name.to_string(),
        kind: value.kind_name().to_string(),
    }
}

fn first_root(value: &Value) -> Option<ResourceId> {
    value.root_ids().into_iter().next()
}

/// Elements from `start` on moved to a new index; point their records at it
fn relocate_from(tracker: &mut OwnershipTracker, elems: &[Value], at: &Location, start: usize) {
    let mut moved = Vec::new();
    for (i, elem) in elems.iter().enumerate().skip(start) {
        let slot = at.element(ValueKey::Uint(i as u64));
        elem.for_each_root(&mut |id, keys| moved.push((id, slot.with_keys(keys))));
    }
    for (id, loc) in moved {
        tracker.relocate(id, loc);
    }
}

pub(crate) fn insert(
    tracker: &mut OwnershipTracker,
    container: &mut Value,
    at: &Location,
    name: &str,
    key: ValueKey,
    value: Value,
) -> VaultResult<()> {
    match container {
        Value::Array(elems) => {
            let index = index_of(&key)
                .filter(|i| *i <= elems.len())
                .ok_or_else(|| no_such_slot(name, &key))?;
            tracker.settle_value(&value, &at.element(ValueKey::Uint(index as u64)))?;
            elems.insert(index, value);
            relocate_from(tracker, elems, at, index + 1);
            Ok(())
        }
        Value::Dict(map) => {
            let slot = at.element(key.clone());
            if let Some(id) = map.get(&key).and_then(first_root) {
                return Err(VaultError::ResourceLoss { id, at: slot });
            }
            tracker.settle_value(&value, &slot)?;
            map.insert(key, value);
            Ok(())
        }
        other => Err(not_a_container(name, other)),
    }
}

pub(crate) fn push(
    tracker: &mut OwnershipTracker,
    container: &mut Value,
    at: &Location,
    name: &str,
    value: Value,
) -> VaultResult<()> {
    match container {
        Value::Array(elems) => {
            let key = ValueKey::Uint(elems.len() as u64);
            tracker.settle_value(&value, &at.element(key))?;
            elems.push(value);
            Ok(())
        }
        other => Err(not_a_container(name, other)),
    }
}

/// Move the element at `key` out. A missing key is `None`, not an error.
pub(crate) fn remove(
    tracker: &mut OwnershipTracker,
    container: &mut Value,
    at: &Location,
    name: &str,
    key: &ValueKey,
) -> VaultResult<Option<Value>> {
    match container {
        Value::Array(elems) => {
            let Some(index) = index_of(key).filter(|i| *i < elems.len()) else {
                return Ok(None);
            };
            tracker.release_value(&elems[index], &at.element(ValueKey::Uint(index as u64)))?;
            let value = elems.remove(index);
            relocate_from(tracker, elems, at, index);
            Ok(Some(value))
        }
        Value::Dict(map) => {
            let Some(value) = map.get(key) else {
                return Ok(None);
            };
            tracker.release_value(value, &at.element(key.clone()))?;
            Ok(map.remove(key))
        }
        other => Err(not_a_container(name, other)),
    }
}

pub(crate) fn take_field(
    tracker: &mut OwnershipTracker,
    res: &mut Resource,
    name: &str,
    field: &str,
) -> VaultResult<Value> {
    if !res.has_field(field) {
        return Err(VaultError::UnknownBinding {
            name: format!("{}.{}", name, field),
        });
    }
    let id = res.id();
    let moved = || VaultError::FieldMoved {
        id,
        field: field.to_string(),
    };
    let value = res.field(field).ok_or_else(moved)?;
    tracker.release_value(value, &Location::field(id, field))?;
    res.take_field(field).ok_or_else(moved)
}

pub(crate) fn put_field(
    tracker: &mut OwnershipTracker,
    res: &mut Resource,
    name: &str,
    field: &str,
    value: Value,
) -> VaultResult<()> {
    if !res.has_field(field) {
        return Err(VaultError::UnknownBinding {
            name: format!("{}.{}", name, field),
        });
    }
    let at = Location::field(res.id(), field);
    if let Some(id) = res.field(field).and_then(first_root) {
        return Err(VaultError::ResourceLoss { id, at });
    }
    tracker.settle_value(&value, &at)?;
    res.put_field(field, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ownership::OwnershipState;
    use pretty_assertions::assert_eq;
    use vault_val::FrameId;

    fn coin(tracker: &mut OwnershipTracker) -> Value {
        let id = tracker.mint();
        Value::Resource(Resource::new(id, "Coin", [("amount", Value::Uint(1))]))
    }

    #[test]
    fn test_array_insert_and_remove_relocate() {
        let mut tracker = OwnershipTracker::new();
        let at = Location::local(FrameId(1), "coins");
        let mut coins = Value::Array(Vec::new());

        let a = coin(&mut tracker);
        let b = coin(&mut tracker);
        let c = coin(&mut tracker);
        push(&mut tracker, &mut coins, &at, "coins", a).unwrap();
        push(&mut tracker, &mut coins, &at, "coins", b).unwrap();
        insert(&mut tracker, &mut coins, &at, "coins", ValueKey::Uint(0), c).unwrap();

        assert_eq!(
            tracker.state(ResourceId(3)),
            Some(&OwnershipState::Owned(at.element(ValueKey::Uint(0))))
        );
        assert_eq!(
            tracker.state(ResourceId(2)),
            Some(&OwnershipState::Owned(at.element(ValueKey::Uint(2))))
        );

        let removed = remove(&mut tracker, &mut coins, &at, "coins", &ValueKey::Uint(1))
            .unwrap()
            .unwrap();
        assert_eq!(removed.resource_id(), Some(ResourceId(1)));
        assert_eq!(tracker.state(ResourceId(1)), Some(&OwnershipState::InFlight));
        assert_eq!(
            tracker.state(ResourceId(2)),
            Some(&OwnershipState::Owned(at.element(ValueKey::Uint(1))))
        );
        assert!(remove(&mut tracker, &mut coins, &at, "coins", &ValueKey::Uint(9))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_dict_overwrite_is_resource_loss() {
        let mut tracker = OwnershipTracker::new();
        let at = Location::local(FrameId(1), "bag");
        let mut bag = Value::Dict(Default::default());
        let first = coin(&mut tracker);
        let second = coin(&mut tracker);
        insert(&mut tracker, &mut bag, &at, "bag", ValueKey::from("gold"), first).unwrap();
        assert!(matches!(
            insert(&mut tracker, &mut bag, &at, "bag", ValueKey::from("gold"), second),
            Err(VaultError::ResourceLoss { .. })
        ));
    }

    #[test]
    fn test_field_moves() {
        let mut tracker = OwnershipTracker::new();
        let inner = coin(&mut tracker);
        let outer_id = tracker.mint();
        tracker
            .settle_value(&inner, &Location::field(outer_id, "coin"))
            .unwrap();
        let mut outer = Resource::new(outer_id, "Wallet", [("coin", inner)]);

        let taken = take_field(&mut tracker, &mut outer, "w", "coin").unwrap();
        assert_eq!(tracker.state(ResourceId(1)), Some(&OwnershipState::InFlight));
        assert!(matches!(
            take_field(&mut tracker, &mut outer, "w", "coin"),
            Err(VaultError::FieldMoved { .. })
        ));
        assert!(matches!(
            take_field(&mut tracker, &mut outer, "w", "nope"),
            Err(VaultError::UnknownBinding { .. })
        ));

        put_field(&mut tracker, &mut outer, "w", "coin", taken).unwrap();
        let again = coin(&mut tracker);
        assert!(matches!(
            put_field(&mut tracker, &mut outer, "w", "coin", again),
            Err(VaultError::ResourceLoss { .. })
        ));
    }

    #[test]
    fn test_not_a_container() {
        let mut tracker = OwnershipTracker::new();
        let at = Location::local(FrameId(1), "n");
        let mut n = Value::Uint(3);
        assert!(matches!(
            push(&mut tracker, &mut n, &at, "n", Value::Uint(4)),
            Err(VaultError::NotAContainer { .. })
        ));
    }
}
