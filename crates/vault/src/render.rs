//! JSON views of persisted state

use serde_json::{json, Map, Value as Json};
use vault_core::{Store, StoredEntry};
use vault_val::{Value, ValueKey};

fn key_name(key: &ValueKey) -> String {
    match key.name() {
        Some(name) => name.to_string(),
        None => key.to_string(),
    }
}

pub fn value_json(value: &Value) -> Json {
    match value {
        Value::Nil => Json::Null,
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Uint(u) => json!(u),
        Value::Str(s) => json!(s.as_str()),
        Value::Address(a) => json!(a.to_string()),
        Value::Path(p) => json!(p.to_string()),
        Value::Array(elems) => Json::Array(elems.iter().map(value_json).collect()),
        Value::Dict(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (key_name(k), value_json(v)))
                .collect(),
        ),
        Value::Struct(s) => {
            let fields: Map<String, Json> = s
                .fields()
                .map(|(name, v)| (name.to_string(), value_json(v)))
                .collect();
            json!({ "struct": s.type_name().as_str(), "fields": fields })
        }
        Value::Resource(res) => {
            let fields: Map<String, Json> = res
                .fields()
                .map(|(name, slot)| (name.to_string(), slot.map_or(json!("<moved>"), value_json)))
                .collect();
            json!({
                "resource": res.type_name().as_str(),
                "id": res.id().as_u64(),
                "fields": fields,
            })
        }
        Value::Capability(cap) => json!({ "capability": cap.to_string() }),
        Value::Reference(r) => json!({ "reference": r.to_string() }),
    }
}

fn entry_json(entry: &StoredEntry) -> Json {
    match entry {
        StoredEntry::Value(value) => json!({
            "type": value.type_of().to_string(),
            "value": value_json(value),
        }),
        StoredEntry::Link(link) => json!({
            "link": link.target.to_string(),
            "type": link.borrow_type.to_string(),
        }),
    }
}

/// Every account with its paths, in path order
pub fn store_json(store: &Store) -> Json {
    let mut accounts = Map::new();
    for (address, path, entry) in store.entries() {
        let paths = accounts
            .entry(address.to_string())
            .or_insert_with(|| Json::Object(Map::new()));
        if let Json::Object(paths) = paths {
            paths.insert(path.to_string(), entry_json(entry));
        }
    }
    Json::Object(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use vault_val::{Resource, ResourceId};

    #[test]
    fn test_value_json() {
        let mut bag = BTreeMap::new();
        bag.insert(ValueKey::from("gold"), Value::Uint(3));
        assert_eq!(value_json(&Value::Dict(bag)), json!({ "gold": 3 }));

        let coin = || Resource::new(ResourceId(5), "Coin", [("amount", Value::Uint(9))]);
        assert_eq!(
            value_json(&Value::Resource(coin())),
            json!({ "resource": "Coin", "id": 5, "fields": { "amount": 9 } })
        );
        let mut emptied = coin();
        emptied.take_field("amount");
        assert_eq!(
            value_json(&Value::Resource(emptied))["fields"]["amount"],
            json!("<moved>")
        );
    }
}
