use super::*;
use crate::error::{BorrowFailure, VaultError};
use vault_val::Capability;

/// ALICE's vault, with `/public/receiver` linked to it as `link_type`
fn linked(link_type: BorrowType) -> Runtime {
    let mut rt = with_saved_vault(&[10]);
    rt.execute(&[ALICE], |rt| {
        rt.link(ALICE, &StoragePath::public("receiver"), &vault_path(), link_type)
            .map(|_| ())
    })
    .unwrap();
    rt
}

fn public_capability(rt: &mut Runtime) -> Capability {
    rt.get_capability(ALICE, &StoragePath::public("receiver"), None)
        .unwrap()
}

#[test]
fn test_borrow_by_declared_type_only() {
    let mut rt = linked(receiver());
    rt.begin_transaction(&[BOB]).unwrap();
    let cap = public_capability(&mut rt);

    rt.with_frame(|rt, _| {
        assert!(rt.borrow(&cap, &receiver()).is_some());
        Ok(())
    })
    .unwrap();
    rt.with_frame(|rt, _| {
        let coin_ref = BorrowType::new(Type::composite("Coin"));
        assert!(rt.borrow(&cap, &coin_ref).is_none());
        assert_eq!(
            rt.try_borrow(&cap, &coin_ref),
            Err(BorrowFailure::TypeMismatch)
        );
        Ok(())
    })
    .unwrap();
    rt.commit_transaction().unwrap();
}

#[test]
fn test_unlink_revokes_every_capability() {
    let mut rt = linked(receiver());
    let cap = rt
        .execute(&[BOB], |rt| Ok(public_capability(rt)))
        .unwrap();

    rt.execute(&[ALICE], |rt| rt.unlink(ALICE, &StoragePath::public("receiver")))
        .unwrap();

    rt.execute(&[BOB], |rt| {
        assert!(!rt.check_capability(&cap, &receiver()));
        assert!(rt.borrow(&cap, &receiver()).is_none());
        assert_eq!(rt.try_borrow(&cap, &receiver()), Err(BorrowFailure::DeadLink));
        Ok(())
    })
    .unwrap();

    // the vault is untouched and can be exposed again elsewhere
    assert!(rt.store().value(ALICE, &vault_path()).is_some());
    let fresh = rt
        .execute(&[ALICE], |rt| {
            rt.link(ALICE, &StoragePath::public("deposits"), &vault_path(), receiver())
        })
        .unwrap()
        .unwrap();
    rt.execute(&[BOB], |rt| {
        assert!(rt.check_capability(&fresh, &receiver()));
        assert!(!rt.check_capability(&cap, &receiver()));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_already_linked_is_not_an_error() {
    let mut rt = linked(receiver());
    rt.execute(&[ALICE], |rt| {
        let again = rt.link(
            ALICE,
            &StoragePath::public("receiver"),
            &StoragePath::storage("elsewhere"),
            labeled(),
        )?;
        assert!(again.is_none());
        assert_eq!(
            rt.link_target(ALICE, &StoragePath::public("receiver"))?,
            Some(vault_path())
        );
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_restricted_capability_cannot_downcast() {
    let mut rt = linked(receiver());
    rt.begin_transaction(&[BOB]).unwrap();
    let cap = public_capability(&mut rt);
    let concrete = BorrowType::new(Type::composite("Vault"));
    assert_eq!(
        rt.try_borrow(&cap, &concrete),
        Err(BorrowFailure::NotAuthorized)
    );
    assert_eq!(
        rt.try_borrow(&cap, &BorrowType::auth(Type::restricted(None, ["Receiver"]))),
        Err(BorrowFailure::NotAuthorized)
    );
    rt.commit_transaction().unwrap();
}

#[test]
fn test_authorized_capability_can_downcast() {
    let mut rt = linked(BorrowType::auth(Type::restricted(None, ["Receiver"])));
    rt.begin_transaction(&[BOB]).unwrap();
    let cap = public_capability(&mut rt);
    let reference = rt
        .try_borrow(&cap, &BorrowType::auth(Type::composite("Vault")))
        .unwrap();
    assert_eq!(
        rt.ref_read(&reference, "label").unwrap(),
        Value::str("main")
    );
    rt.commit_transaction().unwrap();
}

#[test]
fn test_capability_type_is_checked_before_the_link() {
    let mut rt = linked(receiver());
    rt.begin_transaction(&[BOB]).unwrap();
    let narrowed = rt
        .get_capability(ALICE, &StoragePath::public("receiver"), Some(labeled()))
        .unwrap();
    assert_eq!(
        rt.try_borrow(&narrowed, &receiver()),
        Err(BorrowFailure::TypeMismatch)
    );
    rt.commit_transaction().unwrap();
}

#[test]
fn test_chain_through_private_link() {
    let mut rt = with_saved_vault(&[10]);
    let cap = rt
        .execute(&[ALICE], |rt| {
            let private = StoragePath::private("vault_receiver");
            rt.link(ALICE, &private, &vault_path(), receiver())?;
            rt.link(ALICE, &StoragePath::public("receiver"), &private, receiver())
        })
        .unwrap()
        .unwrap();

    rt.execute(&[BOB], |rt| {
        assert!(rt.check_capability(&cap, &receiver()));
        assert!(matches!(
            rt.get_capability(ALICE, &StoragePath::private("vault_receiver"), None),
            Err(VaultError::Unauthorized { .. })
        ));
        Ok(())
    })
    .unwrap_err();

    rt.execute(&[ALICE], |rt| {
        rt.unlink(ALICE, &StoragePath::private("vault_receiver"))
    })
    .unwrap();
    rt.execute(&[BOB], |rt| {
        assert_eq!(rt.try_borrow(&cap, &receiver()), Err(BorrowFailure::DeadLink));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_target_must_keep_the_promised_type() {
    let mut rt = linked(receiver());
    rt.execute(&[ALICE], |rt| {
        let v = rt
            .load(ALICE, &vault_path(), &Type::composite("Vault"))?
            .unwrap_or_default();
        rt.destroy(v)?;
        let c = coin(rt, 1)?;
        rt.save(ALICE, &vault_path(), c)
    })
    .unwrap();

    rt.execute(&[BOB], |rt| {
        let cap = public_capability(rt);
        assert!(!rt.check_capability(&cap, &receiver()));
        assert!(!rt.check_capability(&cap, &BorrowType::new(Type::Any)));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_borrow_needs_a_transaction() {
    let mut rt = linked(receiver());
    let cap = Capability::new(ALICE, StoragePath::public("receiver"), None);
    assert!(rt.check_capability(&cap, &receiver()));
    assert_eq!(
        rt.try_borrow(&cap, &receiver()),
        Err(BorrowFailure::NoTransaction)
    );
}
