mod destroy_tests;
mod link_tests;
mod reference_tests;

use crate::config::RuntimeConfig;
use crate::error::VaultResult;
use crate::runtime::Runtime;
use vault_val::{Address, BorrowType, CompositeKind, StoragePath, Type, TypeRegistry, Value};

pub(crate) const ALICE: Address = Address(0xa11ce);
pub(crate) const BOB: Address = Address(0xb0b);

/// Fungible vault setup: coins held in a vault, exposed to other accounts
/// through the `Receiver` (deposit) and `Labeled` (read-only) interfaces.
pub(crate) fn registry() -> TypeRegistry {
    let mut types = TypeRegistry::new();
    types.declare_interface("Receiver", CompositeKind::Resource, [], ["coins"]);
    types.declare_interface("Labeled", CompositeKind::Resource, [], ["label"]);
    types.declare_composite("Coin", CompositeKind::Resource, [], ["amount"]);
    types.declare_composite(
        "Vault",
        CompositeKind::Resource,
        ["Receiver", "Labeled"],
        ["coins", "label"],
    );
    types.declare_composite("Badge", CompositeKind::Resource, [], ["level"]);
    types.declare_composite("Wallet", CompositeKind::Resource, [], ["vault", "badge"]);
    types.declare_composite("Receipt", CompositeKind::Struct, [], ["amount"]);
    types
}

pub(crate) fn runtime() -> Runtime {
    Runtime::new(RuntimeConfig::default(), registry())
}

pub(crate) fn coin(rt: &mut Runtime, amount: u64) -> VaultResult<Value> {
    rt.create_resource("Coin", [("amount", Value::Uint(amount))])
}

pub(crate) fn vault(rt: &mut Runtime, coins: Vec<Value>) -> VaultResult<Value> {
    rt.create_resource(
        "Vault",
        [("coins", Value::Array(coins)), ("label", Value::str("main"))],
    )
}

pub(crate) fn vault_path() -> StoragePath {
    StoragePath::storage("vault")
}

pub(crate) fn receiver() -> BorrowType {
    BorrowType::new(Type::restricted(None, ["Receiver"]))
}

pub(crate) fn labeled() -> BorrowType {
    BorrowType::new(Type::restricted(None, ["Labeled"]))
}

/// Run one transaction for ALICE that saves a vault holding one coin per
/// amount at `/storage/vault`
pub(crate) fn with_saved_vault(amounts: &[u64]) -> Runtime {
    let mut rt = runtime();
    rt.execute(&[ALICE], |rt| {
        let coins = amounts
            .iter()
            .map(|amount| coin(rt, *amount))
            .collect::<VaultResult<Vec<_>>>()?;
        let vault = vault(rt, coins)?;
        rt.save(ALICE, &vault_path(), vault)
    })
    .unwrap();
    rt
}
