//! Destruction of linear values
//!
//! Destroying a resource destroys everything it transitively owns. The
//! whole tree is checked before the first record changes, so a failing
//! destroy leaves the ownership records as they were.
//!
//! A [`DestructorPlan`] tears a resource down field by field. Each linear
//! field must be either destroyed or moved out; the plan is rejected up
//! front when it leaves one unhandled or names a slot that is already
//! empty.

use crate::error::{VaultError, VaultResult};
use crate::ownership::Location;
use crate::runtime::Runtime;
use indexmap::IndexMap;
use tracing::debug;
use vault_val::{Linear, Resource, ResourceId, Value, ValueKey, VaultStr};

/// What a destructor does with one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAction {
    Destroy,
    /// Hand the field back to the caller
    MoveOut,
}

/// Per-field teardown of a resource.
///
/// ```ignore
/// let plan = DestructorPlan::new().destroy("badge").move_out("coins");
/// let rest = rt.destroy_with(wallet, &plan)?;
/// ```
///
/// Copyable fields the plan does not mention are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestructorPlan {
    actions: IndexMap<VaultStr, FieldAction>,
}

impl DestructorPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn destroy(mut self, field: impl Into<VaultStr>) -> Self {
        self.actions.insert(field.into(), FieldAction::Destroy);
        self
    }

    pub fn move_out(mut self, field: impl Into<VaultStr>) -> Self {
        self.actions.insert(field.into(), FieldAction::MoveOut);
        self
    }

    /// Destroy every filled field of `res`
    pub fn covering(res: &Resource) -> Self {
        res.fields()
            .filter(|(_, slot)| slot.is_some())
            .fold(Self::new(), |plan, (name, _)| plan.destroy(name.clone()))
    }

    pub fn action(&self, field: &str) -> Option<FieldAction> {
        self.actions.get(field).copied()
    }

    /// Check the plan against `res` without touching anything
    pub fn validate(&self, res: &Resource) -> VaultResult<()> {
        for field in self.actions.keys() {
            if !res.has_field(field) {
                return Err(VaultError::UnknownBinding {
                    name: format!("{}.{}", res.type_name(), field),
                });
            }
            if res.is_field_moved(field) {
                return Err(VaultError::FieldMoved {
                    id: res.id(),
                    field: field.to_string(),
                });
            }
        }
        for (name, slot) in res.fields() {
            if self.actions.contains_key(name) {
                continue;
            }
            if slot.is_some_and(|value| value.is_linear()) {
                return Err(VaultError::IncompleteDestructor {
                    id: res.id(),
                    field: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Resources directly inside `value`, looking through arrays and
/// dictionaries but not into resource fields. `at` is the location
/// holding `value`, `None` when the host holds it in flight.
fn resources_in<'a>(
    value: &'a Value,
    at: Option<Location>,
    out: &mut Vec<(&'a Resource, Option<Location>)>,
) {
    match value {
        Value::Resource(res) => out.push((res, at)),
        Value::Array(elems) => {
            for (i, elem) in elems.iter().enumerate() {
                let slot = at.as_ref().map(|l| l.element(ValueKey::Uint(i as u64)));
                resources_in(elem, slot, out);
            }
        }
        Value::Dict(map) => {
            for (key, elem) in map {
                let slot = at.as_ref().map(|l| l.element(key.clone()));
                resources_in(elem, slot, out);
            }
        }
        _ => {}
    }
}

/// Append the teardown of everything owned by `res` to `order`, innermost
/// first. Fields for which `skip` holds are left alone.
fn teardown_fields(
    res: &Resource,
    skip: &dyn Fn(&str) -> bool,
    order: &mut Vec<(ResourceId, Option<Location>)>,
) -> VaultResult<()> {
    for (name, slot) in res.fields() {
        if skip(name.as_str()) {
            continue;
        }
        let Some(value) = slot else {
            return Err(VaultError::FieldMoved {
                id: res.id(),
                field: name.to_string(),
            });
        };
        let mut nested = Vec::new();
        resources_in(value, Some(Location::field(res.id(), name.clone())), &mut nested);
        for (inner, at) in nested {
            teardown_fields(inner, &|_| false, order)?;
            order.push((inner.id(), at));
        }
    }
    Ok(())
}

impl Runtime {
    /// Destroy `value` and every resource it owns. Copyable values are
    /// simply dropped.
    pub fn destroy(&mut self, value: Value) -> VaultResult<()> {
        let result = self.destroy_value(value);
        self.guard(result)
    }

    fn destroy_value(&mut self, value: Value) -> VaultResult<()> {
        self.require_txn()?;
        let mut roots = Vec::new();
        resources_in(&value, None, &mut roots);

        let mut order = Vec::new();
        for (res, at) in roots {
            self.tracker.check_destroy(res.id(), at.as_ref())?;
            teardown_fields(res, &|_| false, &mut order)?;
            order.push((res.id(), at));
        }
        self.apply_teardown(&order)?;
        debug!(kind = value.kind_name(), destroyed = order.len(), "destroy");
        Ok(())
    }

    /// Tear `res` down according to `plan`, returning the fields it moves
    /// out. Those are in flight and must be bound, stored or destroyed.
    pub fn destroy_with(
        &mut self,
        res: Resource,
        plan: &DestructorPlan,
    ) -> VaultResult<IndexMap<VaultStr, Value>> {
        let result = self.destroy_planned(res, plan);
        self.guard(result)
    }

    fn destroy_planned(
        &mut self,
        res: Resource,
        plan: &DestructorPlan,
    ) -> VaultResult<IndexMap<VaultStr, Value>> {
        self.require_txn()?;
        let id = res.id();
        self.tracker.check_destroy(id, None)?;
        plan.validate(&res)?;

        let mut order = Vec::new();
        let moves_out = |field: &str| plan.action(field) == Some(FieldAction::MoveOut);
        teardown_fields(
            &res,
            &|field| moves_out(field) || res.is_field_moved(field),
            &mut order,
        )?;
        order.push((id, None));
        self.check_teardown(&order)?;

        for (name, slot) in res.fields() {
            if let (true, Some(value)) = (moves_out(name.as_str()), slot) {
                self.tracker
                    .release_value(value, &Location::field(id, name.clone()))?;
            }
        }
        self.apply_teardown(&order)?;
        debug!(id = %id, ty = %res.type_name(), "destroy with plan");

        let moved = res
            .into_fields()
            .into_iter()
            .filter(|(name, _)| moves_out(name.as_str()))
            .filter_map(|(name, slot)| slot.map(|value| (name, value)))
            .collect();
        Ok(moved)
    }

    fn check_teardown(&self, order: &[(ResourceId, Option<Location>)]) -> VaultResult<()> {
        for (id, at) in order {
            self.tracker.check_destroy(*id, at.as_ref())?;
        }
        Ok(())
    }

    /// Check every step, then mark every identity destroyed
    fn apply_teardown(&mut self, order: &[(ResourceId, Option<Location>)]) -> VaultResult<()> {
        self.check_teardown(order)?;
        for (id, at) in order {
            self.tracker.destroy(*id, at.as_ref())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ownership::OwnershipTracker;

    fn coin(tracker: &mut OwnershipTracker) -> Value {
        let id = tracker.mint();
        Value::Resource(Resource::new(id, "Coin", [("amount", Value::Uint(5))]))
    }

    #[test]
    fn test_plan_must_cover_linear_fields() {
        let mut tracker = OwnershipTracker::new();
        let wallet = Resource::new(
            ResourceId(10),
            "Wallet",
            [("coin", coin(&mut tracker)), ("label", Value::str("mine"))],
        );
        assert!(matches!(
            DestructorPlan::new().validate(&wallet),
            Err(VaultError::IncompleteDestructor { field, .. }) if field == "coin"
        ));
        assert!(DestructorPlan::new().move_out("coin").validate(&wallet).is_ok());
        assert!(matches!(
            DestructorPlan::new().destroy("coins").validate(&wallet),
            Err(VaultError::UnknownBinding { .. })
        ));
    }

    #[test]
    fn test_plan_rejects_moved_slot() {
        let mut tracker = OwnershipTracker::new();
        let mut wallet = Resource::new(
            ResourceId(10),
            "Wallet",
            [("a", coin(&mut tracker)), ("b", coin(&mut tracker))],
        );
        wallet.take_field("a");
        let plan = DestructorPlan::new().destroy("a").destroy("b");
        assert!(matches!(
            plan.validate(&wallet),
            Err(VaultError::FieldMoved { field, .. }) if field == "a"
        ));
        assert!(DestructorPlan::new().destroy("b").validate(&wallet).is_ok());
    }

    #[test]
    fn test_covering_plan() {
        let mut tracker = OwnershipTracker::new();
        let wallet = Resource::new(ResourceId(10), "Wallet", [("coin", coin(&mut tracker))]);
        let plan = DestructorPlan::covering(&wallet);
        assert_eq!(plan.action("coin"), Some(FieldAction::Destroy));
        assert!(plan.validate(&wallet).is_ok());
    }
}
