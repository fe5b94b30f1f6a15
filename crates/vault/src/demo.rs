//! The fungible-vault scenario
//!
//! Alice keeps coins in a vault and publishes a deposit-only capability
//! for it. Bob mints a coin and deposits it through that capability, then
//! Alice withdraws one coin into a second path.

use tracing::info;
use vault_core::{Runtime, RuntimeConfig, VaultResult};
use vault_val::{Address, BorrowType, CompositeKind, StoragePath, Type, TypeRegistry, Value, ValueKey};

pub const ALICE: Address = Address(0xa11ce);
pub const BOB: Address = Address(0xb0b);

pub fn registry() -> TypeRegistry {
    let mut types = TypeRegistry::new();
    types.declare_interface("Receiver", CompositeKind::Resource, [], ["coins"]);
    types.declare_composite("Coin", CompositeKind::Resource, [], ["amount"]);
    types.declare_composite("Vault", CompositeKind::Resource, ["Receiver"], ["coins", "label"]);
    types
}

fn receiver() -> BorrowType {
    BorrowType::new(Type::restricted(None, ["Receiver"]))
}

fn mint(rt: &mut Runtime, amount: u64) -> VaultResult<Value> {
    rt.create_resource("Coin", [("amount", Value::Uint(amount))])
}

pub fn run(config: RuntimeConfig) -> VaultResult<Runtime> {
    let mut rt = Runtime::new(config, registry());
    let vault_path = StoragePath::storage("vault");
    let public = StoragePath::public("receiver");

    rt.execute(&[ALICE], |rt| {
        let coins = [50, 25]
            .into_iter()
            .map(|amount| mint(rt, amount))
            .collect::<VaultResult<Vec<_>>>()?;
        let vault = rt.create_resource(
            "Vault",
            [("coins", Value::Array(coins)), ("label", Value::str("alice"))],
        )?;
        rt.save(ALICE, &vault_path, vault)?;
        rt.link(ALICE, &public, &vault_path, receiver()).map(|_| ())
    })?;
    info!("alice published {}", public);

    rt.execute(&[BOB], |rt| {
        let cap = rt.get_capability(ALICE, &public, None)?;
        // bob keeps a copy for later deposits
        rt.save(
            BOB,
            &StoragePath::storage("alice_receiver"),
            Value::Capability(cap.clone()),
        )?;
        rt.with_frame(|rt, _| {
            let reference = rt.try_borrow(&cap, &receiver())?;
            let coin = mint(rt, 10)?;
            rt.ref_push(&reference, "coins", coin)
        })
    })?;
    info!("bob deposited into {}", public);

    rt.execute(&[ALICE], |rt| {
        rt.with_frame(|rt, frame| {
            let reference = rt.try_borrow_storage(ALICE, &vault_path, &receiver())?;
            if let Some(coin) = rt.ref_remove(&reference, "coins", ValueKey::Uint(0))? {
                rt.bind(frame, "coin", coin)?;
                let coin = rt.take(frame, "coin")?;
                rt.save(ALICE, &StoragePath::storage("spending"), coin)?;
            }
            Ok(())
        })
    })?;
    info!("alice withdrew into /storage/spending");
    Ok(rt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_demo_scenario() {
        let rt = run(RuntimeConfig::default()).unwrap();
        let vault = rt.store().value(ALICE, &StoragePath::storage("vault")).unwrap();
        assert_eq!(
            vault.as_resource().unwrap().field("coins").unwrap().to_string(),
            "[Coin#2(amount: 25), Coin#4(amount: 10)]"
        );
        assert_eq!(
            rt.store()
                .value(ALICE, &StoragePath::storage("spending"))
                .unwrap()
                .to_string(),
            "Coin#1(amount: 50)"
        );
    }
}
