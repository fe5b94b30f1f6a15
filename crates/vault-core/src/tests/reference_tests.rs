use super::*;
use crate::error::{BorrowFailure, VaultError, VaultResult};
use crate::ownership::{Location, OwnershipState};
use pretty_assertions::assert_eq;
use vault_val::{Capability, FrameId, ResourceId, ValueKey};

fn linked_vault(amounts: &[u64]) -> (Runtime, Capability) {
    let mut rt = with_saved_vault(amounts);
    let cap = rt
        .execute(&[ALICE], |rt| {
            rt.link(ALICE, &StoragePath::public("receiver"), &vault_path(), receiver())
        })
        .unwrap()
        .unwrap();
    (rt, cap)
}

#[test]
fn test_borrow_is_exclusive_until_frame_exit() {
    let (mut rt, cap) = linked_vault(&[]);
    rt.begin_transaction(&[BOB]).unwrap();

    let outer = rt.push_frame().unwrap();
    let first = rt.try_borrow(&cap, &receiver()).unwrap();
    assert_eq!(first.frame, outer);

    let inner = rt.push_frame().unwrap();
    assert_eq!(
        rt.try_borrow(&cap, &receiver()),
        Err(BorrowFailure::AlreadyBorrowed)
    );
    rt.pop_frame(inner).unwrap();
    assert!(rt.borrow(&cap, &receiver()).is_none());

    rt.pop_frame(outer).unwrap();
    assert!(!rt.is_live(&first));
    rt.with_frame(|rt, _| {
        assert!(rt.borrow(&cap, &receiver()).is_some());
        Ok(())
    })
    .unwrap();
    rt.commit_transaction().unwrap();
}

#[test]
fn test_borrowed_value_cannot_be_moved_away() {
    let (mut rt, cap) = linked_vault(&[]);
    rt.begin_transaction(&[ALICE]).unwrap();
    let frame = rt.push_frame().unwrap();
    let _reference = rt.try_borrow(&cap, &receiver()).unwrap();

    assert!(matches!(
        rt.load(ALICE, &vault_path(), &Type::composite("Vault")),
        Err(VaultError::AlreadyBorrowed { .. })
    ));
    rt.pop_frame(frame).unwrap();
    rt.commit_transaction().unwrap();
    assert!(rt.store().value(ALICE, &vault_path()).is_some());
}

#[test]
fn test_deposit_and_withdraw_through_reference() {
    let (mut rt, cap) = linked_vault(&[10]);
    let vault_id = ResourceId(2);

    let deposited = rt
        .execute(&[BOB], |rt| {
            rt.with_frame(|rt, _| {
                let reference = rt.try_borrow(&cap, &receiver())?;
                let c = coin(rt, 5)?;
                let id = c.resource_id();
                rt.ref_push(&reference, "coins", c)?;
                Ok(id)
            })
        })
        .unwrap()
        .unwrap();
    assert_eq!(
        rt.ownership(deposited),
        Some(&OwnershipState::Owned(
            Location::field(vault_id, "coins").element(ValueKey::Uint(1))
        ))
    );

    rt.execute(&[ALICE], |rt| {
        rt.with_frame(|rt, frame| {
            let reference = rt
                .borrow_storage(ALICE, &vault_path(), &receiver())
                .unwrap_or_else(|| panic!("vault should be borrowable"));
            let first = rt.ref_remove(&reference, "coins", ValueKey::Uint(0))?;
            let first = first.unwrap_or_default();
            assert_eq!(first.to_string(), "Coin#1(amount: 10)");
            rt.bind(frame, "withdrawn", first)?;
            let withdrawn = rt.take(frame, "withdrawn")?;
            rt.save(ALICE, &StoragePath::storage("spare"), withdrawn)
        })
    })
    .unwrap();
    assert_eq!(
        rt.ownership(deposited),
        Some(&OwnershipState::Owned(
            Location::field(vault_id, "coins").element(ValueKey::Uint(0))
        ))
    );
}

#[test]
fn test_access_is_limited_to_granted_members() {
    let (mut rt, cap) = linked_vault(&[]);
    rt.begin_transaction(&[BOB]).unwrap();
    let frame = rt.push_frame().unwrap();
    let reference = rt.try_borrow(&cap, &receiver()).unwrap();
    assert!(matches!(
        rt.ref_read(&reference, "label"),
        Err(VaultError::MemberNotGranted { member, .. }) if member == "label"
    ));
    rt.pop_frame(frame).unwrap();
    assert!(rt.commit_transaction().is_err());
}

#[test]
fn test_read_and_write_through_labeled_view() {
    let mut rt = with_saved_vault(&[]);
    rt.execute(&[ALICE], |rt| {
        rt.with_frame(|rt, _| {
            let reference = rt
                .borrow_storage(ALICE, &vault_path(), &labeled())
                .unwrap_or_else(|| panic!("vault should be borrowable"));
            assert_eq!(rt.ref_read(&reference, "label")?, Value::str("main"));
            rt.ref_set(&reference, "label", Value::str("savings"))?;
            assert_eq!(rt.ref_read(&reference, "label")?, Value::str("savings"));
            Ok(())
        })
    })
    .unwrap();
    let stored = rt.store().value(ALICE, &vault_path()).unwrap();
    assert_eq!(
        stored.as_resource().unwrap().field("label"),
        Some(&Value::str("savings"))
    );
}

#[test]
fn test_reference_dies_with_its_frame() {
    let (mut rt, cap) = linked_vault(&[]);
    rt.begin_transaction(&[BOB]).unwrap();
    let frame = rt.push_frame().unwrap();
    let reference = rt.try_borrow(&cap, &receiver()).unwrap();
    rt.pop_frame(frame).unwrap();

    let c = coin(&mut rt, 1).unwrap();
    assert!(matches!(
        rt.ref_push(&reference, "coins", c),
        Err(VaultError::DanglingReference { .. })
    ));
    assert!(matches!(
        rt.commit_transaction(),
        Err(VaultError::TransactionAborted { .. })
    ));
}

#[test]
fn test_local_borrow_pins_the_binding() {
    let mut rt = runtime();
    rt.begin_transaction(&[ALICE]).unwrap();
    let outer = rt.push_frame().unwrap();
    let v = vault(&mut rt, Vec::new()).unwrap();
    rt.bind(outer, "v", v).unwrap();

    let inner = rt.push_frame().unwrap();
    let reference = rt.borrow_local(outer, "v", &receiver()).unwrap();
    assert_eq!(reference.frame, inner);
    assert_eq!(
        rt.borrow_local(outer, "v", &receiver()),
        Err(BorrowFailure::AlreadyBorrowed)
    );
    assert_eq!(
        rt.borrow_local(outer, "nothing", &receiver()),
        Err(BorrowFailure::AbsentTarget)
    );
    assert!(matches!(
        rt.take(outer, "v"),
        Err(VaultError::AlreadyBorrowed { .. })
    ));

    let c = coin(&mut rt, 3).unwrap();
    rt.ref_push(&reference, "coins", c).unwrap();
    rt.pop_frame(inner).unwrap();

    let v = rt.take(outer, "v").unwrap();
    assert_eq!(v.to_string(), "Vault#1(coins: [Coin#2(amount: 3)], label: \"main\")");
    rt.save(ALICE, &vault_path(), v).unwrap();
    rt.pop_frame(outer).unwrap();
    rt.commit_transaction().unwrap();
}

#[test]
fn test_reference_cannot_be_written_into_storage() {
    let mut rt = with_saved_vault(&[1]);
    let root = rt.store().state_root().unwrap();

    rt.begin_transaction(&[ALICE]).unwrap();
    let frame = rt.push_frame().unwrap();
    let reference = rt
        .try_borrow_storage(ALICE, &vault_path(), &labeled())
        .unwrap();
    assert!(matches!(
        rt.ref_set(&reference, "label", Value::Reference(reference.clone())),
        Err(VaultError::NotStorable { kind }) if kind == "reference"
    ));
    assert!(rt.transaction().unwrap().poisoned().is_some());
    rt.pop_frame(frame).unwrap();
    assert!(matches!(
        rt.commit_transaction(),
        Err(VaultError::TransactionAborted { .. })
    ));

    assert_eq!(rt.store().state_root().unwrap(), root);
    let stored = rt.store().value(ALICE, &vault_path()).unwrap();
    assert_eq!(
        stored.as_resource().unwrap().field("label"),
        Some(&Value::str("main"))
    );
    // the store still encodes, so the next transaction can start
    rt.begin_transaction(&[ALICE]).unwrap();
    rt.commit_transaction().unwrap();
}

#[test]
fn test_reference_cannot_be_pushed_into_stored_container() {
    let (mut rt, cap) = linked_vault(&[]);
    let root = rt.store().state_root().unwrap();

    let result = rt.execute(&[BOB], |rt| {
        rt.with_frame(|rt, _| {
            let reference = rt.try_borrow(&cap, &receiver())?;
            rt.ref_push(&reference, "coins", Value::Reference(reference.clone()))
        })
    });
    assert!(matches!(
        result,
        Err(VaultError::NotStorable { kind }) if kind == "reference"
    ));
    assert_eq!(rt.store().state_root().unwrap(), root);
}

/// A wallet whose badge was taken out and destroyed, handed back in flight
fn emptied_wallet(rt: &mut Runtime, frame: FrameId) -> VaultResult<Value> {
    let v = vault(rt, Vec::new())?;
    let badge = rt.create_resource("Badge", [("level", Value::Uint(1))])?;
    let wallet = rt.create_resource("Wallet", [("vault", v), ("badge", badge)])?;
    rt.bind(frame, "wallet", wallet)?;
    let badge = rt.take_field(frame, "wallet", "badge")?;
    rt.destroy(badge)?;
    rt.take(frame, "wallet")
}

#[test]
fn test_incomplete_resource_cannot_be_deposited() {
    let (mut rt, cap) = linked_vault(&[1]);
    let root = rt.store().state_root().unwrap();

    rt.begin_transaction(&[BOB]).unwrap();
    let frame = rt.push_frame().unwrap();
    let reference = rt.try_borrow(&cap, &receiver()).unwrap();
    let wallet = emptied_wallet(&mut rt, frame).unwrap();
    assert!(!wallet.is_storable());
    assert!(matches!(
        rt.ref_push(&reference, "coins", wallet),
        Err(VaultError::NotStorable { kind }) if kind == "resource"
    ));
    assert!(rt.transaction().unwrap().poisoned().is_some());
    rt.pop_frame(frame).unwrap();
    assert!(matches!(
        rt.commit_transaction(),
        Err(VaultError::TransactionAborted { .. })
    ));
    assert_eq!(rt.store().state_root().unwrap(), root);

    let result = rt.execute(&[BOB], |rt| {
        rt.with_frame(|rt, frame| {
            let reference = rt.try_borrow(&cap, &receiver())?;
            let wallet = emptied_wallet(rt, frame)?;
            rt.ref_insert(&reference, "coins", ValueKey::Uint(0), wallet)
        })
    });
    assert!(matches!(result, Err(VaultError::NotStorable { .. })));
    assert_eq!(rt.store().state_root().unwrap(), root);
    assert_eq!(
        rt.store().value(ALICE, &vault_path()).unwrap().to_string(),
        "Vault#2(coins: [Coin#1(amount: 1)], label: \"main\")"
    );
}
