use super::*;
use crate::destroy::DestructorPlan;
use crate::error::VaultError;
use crate::ownership::OwnershipState;
use pretty_assertions::assert_eq;
use vault_val::{Resource, ResourceId};

fn into_resource(value: Value) -> Resource {
    match value {
        Value::Resource(res) => res,
        other => panic!("expected a resource, got {}", other),
    }
}

#[test]
fn test_destroy_is_recursive() {
    let mut rt = with_saved_vault(&[1, 2]);
    rt.execute(&[ALICE], |rt| {
        let v = rt
            .load(ALICE, &vault_path(), &Type::composite("Vault"))?
            .unwrap_or_default();
        rt.destroy(v)?;
        for id in 1..=3 {
            assert_eq!(rt.ownership(ResourceId(id)), Some(&OwnershipState::Destroyed));
        }
        Ok(())
    })
    .unwrap();
    // records of destroyed identities are dropped once the commit lands
    for id in 1..=3 {
        assert_eq!(rt.ownership(ResourceId(id)), None);
    }
    assert!(rt.store().is_empty());
}

#[test]
fn test_destroy_twice_is_fatal() {
    let mut rt = runtime();
    rt.begin_transaction(&[ALICE]).unwrap();
    let c = coin(&mut rt, 1).unwrap();
    let id = c.resource_id().unwrap();
    rt.destroy(c).unwrap();

    let forged = Value::Resource(Resource::new(id, "Coin", [("amount", Value::Uint(1))]));
    assert!(matches!(
        rt.destroy(forged),
        Err(VaultError::DoubleDestroy { id: again }) if again == id
    ));
    assert!(rt.transaction().unwrap().poisoned().is_some());
    rt.abort_transaction().unwrap();
}

/// A vault whose coins were moved out into a local, in a fresh transaction
fn vault_missing_coins() -> (Runtime, Value) {
    let mut rt = runtime();
    rt.begin_transaction(&[ALICE]).unwrap();
    let frame = rt.push_frame().unwrap();
    let c = coin(&mut rt, 4).unwrap();
    let v = vault(&mut rt, vec![c]).unwrap();
    rt.bind(frame, "v", v).unwrap();
    let coins = rt.take_field(frame, "v", "coins").unwrap();
    rt.bind(frame, "coins", coins).unwrap();
    let v = rt.take(frame, "v").unwrap();
    (rt, v)
}

#[test]
fn test_moved_field_blocks_destruction() {
    let (mut rt, v) = vault_missing_coins();
    let plan = DestructorPlan::new().destroy("coins");
    assert!(matches!(
        rt.destroy_with(into_resource(v), &plan),
        Err(VaultError::FieldMoved { field, .. }) if field == "coins"
    ));

    let (mut rt, v) = vault_missing_coins();
    let vault_id = v.resource_id().unwrap();
    assert!(matches!(rt.destroy(v), Err(VaultError::FieldMoved { .. })));
    // nothing was destroyed
    assert_eq!(rt.ownership(vault_id), Some(&OwnershipState::InFlight));
    assert!(matches!(
        rt.ownership(ResourceId(1)),
        Some(OwnershipState::Owned(at)) if at.frame().is_some()
    ));
}

#[test]
fn test_plan_must_handle_every_linear_field() {
    let mut rt = runtime();
    rt.begin_transaction(&[ALICE]).unwrap();
    let c = coin(&mut rt, 4).unwrap();
    let coin_id = c.resource_id().unwrap();
    let v = into_resource(vault(&mut rt, vec![c]).unwrap());
    let vault_id = v.id();

    assert!(matches!(
        rt.destroy_with(v, &DestructorPlan::new()),
        Err(VaultError::IncompleteDestructor { field, .. }) if field == "coins"
    ));
    assert_eq!(rt.ownership(vault_id), Some(&OwnershipState::InFlight));
    assert!(matches!(
        rt.ownership(coin_id),
        Some(OwnershipState::Owned(_))
    ));
    assert!(rt.commit_transaction().is_err());
}

#[test]
fn test_move_out_hands_fields_back() {
    let mut rt = runtime();
    let vault_id = rt
        .execute(&[ALICE], |rt| {
            let a = coin(rt, 1)?;
            let b = coin(rt, 2)?;
            let v = into_resource(vault(rt, vec![a, b])?);
            let id = v.id();
            let mut moved = rt.destroy_with(v, &DestructorPlan::new().move_out("coins"))?;
            let coins = moved.swap_remove("coins").unwrap_or_default();
            assert_eq!(coins.to_string(), "[Coin#1(amount: 1), Coin#2(amount: 2)]");
            rt.save(ALICE, &StoragePath::storage("loose"), coins)?;
            Ok(id)
        })
        .unwrap();
    assert_eq!(rt.ownership(vault_id), None);
    assert!(matches!(
        rt.ownership(ResourceId(1)),
        Some(OwnershipState::Owned(at)) if at.is_storage()
    ));
}

#[test]
fn test_unhandled_move_out_is_caught_at_commit() {
    let mut rt = runtime();
    let result = rt.execute(&[ALICE], |rt| {
        let c = coin(rt, 1)?;
        let v = into_resource(vault(rt, vec![c])?);
        rt.destroy_with(v, &DestructorPlan::new().move_out("coins"))
            .map(|_| ())
    });
    assert!(matches!(
        result,
        Err(VaultError::TransactionAborted { reason }) if reason.contains("in flight")
    ));
}

#[test]
fn test_nested_destroy_with_plan() {
    let mut rt = runtime();
    rt.execute(&[ALICE], |rt| {
        let c = coin(rt, 8)?;
        let v = vault(rt, vec![c])?;
        let badge = rt.create_resource("Badge", [("level", Value::Uint(3))])?;
        let wallet = rt.create_resource("Wallet", [("vault", v), ("badge", badge)])?;
        let wallet = into_resource(wallet);

        let plan = DestructorPlan::covering(&wallet);
        let moved = rt.destroy_with(wallet, &plan)?;
        assert!(moved.is_empty());
        for id in 1..=4 {
            assert_eq!(rt.ownership(ResourceId(id)), Some(&OwnershipState::Destroyed));
        }
        Ok(())
    })
    .unwrap();
    assert_eq!(rt.tracked_resources(), 0);
}

#[test]
fn test_copyable_values_are_dropped() {
    let mut rt = runtime();
    rt.execute(&[ALICE], |rt| {
        let receipt = rt.create_struct("Receipt", [("amount", Value::Uint(1))])?;
        rt.destroy(receipt)?;
        rt.destroy(Value::Array(vec![Value::Uint(1), Value::str("x")]))
    })
    .unwrap();
}
