use crate::{
    Address, Capability, Linear, Linearity, Reference, ResourceId, StoragePath, Type, ValueError,
    VaultStr,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum ValueKey {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Str(VaultStr),
    Address(Address),
}

impl ValueKey {
    pub fn name(&self) -> Option<&str> {
        match self {
            ValueKey::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn key_type(&self) -> Type {
        match self {
            ValueKey::Bool(_) => Type::Bool,
            ValueKey::Int(_) => Type::Int,
            ValueKey::Uint(_) => Type::Uint,
            ValueKey::Str(_) => Type::Str,
            ValueKey::Address(_) => Type::Address,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ValueKey::Bool(b) => Value::Bool(*b),
            ValueKey::Int(i) => Value::Int(*i),
            ValueKey::Uint(u) => Value::Uint(*u),
            ValueKey::Str(s) => Value::Str(s.clone()),
            ValueKey::Address(a) => Value::Address(*a),
        }
    }
}

impl Display for ValueKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValueKey::Bool(b) => write!(f, "{}", b),
            ValueKey::Int(i) => write!(f, "{}", i),
            ValueKey::Uint(u) => write!(f, "{}", u),
            ValueKey::Str(s) => write!(f, "\"{}\"", s),
            ValueKey::Address(a) => write!(f, "{}", a),
        }
    }
}

impl From<&str> for ValueKey {
    fn from(s: &str) -> Self {
        ValueKey::Str(s.into())
    }
}

impl From<VaultStr> for ValueKey {
    fn from(s: VaultStr) -> Self {
        ValueKey::Str(s)
    }
}

impl From<u64> for ValueKey {
    fn from(u: u64) -> Self {
        ValueKey::Uint(u)
    }
}

impl From<i64> for ValueKey {
    fn from(i: i64) -> Self {
        ValueKey::Int(i)
    }
}

impl From<Address> for ValueKey {
    fn from(a: Address) -> Self {
        ValueKey::Address(a)
    }
}

/// Copyable aggregate. Construction rejects linear fields.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Struct {
    type_name: VaultStr,
    fields: IndexMap<VaultStr, Value>,
}

impl Struct {
    pub fn new<I, K>(type_name: impl Into<VaultStr>, fields: I) -> Result<Self, ValueError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<VaultStr>,
    {
        let type_name = type_name.into();
        let mut map = IndexMap::new();
        for (name, value) in fields {
            let name = name.into();
            if value.is_linear() {
                return Err(ValueError::LinearInCopyable {
                    type_name: type_name.to_string(),
                    field: name.to_string(),
                });
            }
            map.insert(name, value);
        }
        Ok(Self {
            type_name,
            fields: map,
        })
    }

    pub fn type_name(&self) -> &VaultStr {
        &self.type_name
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<VaultStr>, value: Value) -> Result<(), ValueError> {
        let field = field.into();
        if value.is_linear() {
            return Err(ValueError::LinearInCopyable {
                type_name: self.type_name.to_string(),
                field: field.to_string(),
            });
        }
        self.fields.insert(field, value);
        Ok(())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&VaultStr, &Value)> {
        self.fields.iter()
    }

    fn duplicate(&self) -> Result<Struct, ValueError> {
        let mut fields = IndexMap::with_capacity(self.fields.len());
        for (name, value) in &self.fields {
            fields.insert(name.clone(), value.duplicate()?);
        }
        Ok(Struct {
            type_name: self.type_name.clone(),
            fields,
        })
    }
}

/// Linear aggregate with a process-unique identity.
///
/// A field slot is `None` after its value has been moved out. Such a
/// resource is incomplete: it cannot be stored and must be refilled or
/// torn down through a destructor plan.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    id: ResourceId,
    type_name: VaultStr,
    fields: IndexMap<VaultStr, Option<Value>>,
}

impl Resource {
    /// Ids must come from the runtime's ownership tracker.
    pub fn new<I, K>(id: ResourceId, type_name: impl Into<VaultStr>, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<VaultStr>,
    {
        Self {
            id,
            type_name: type_name.into(),
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.into(), Some(value)))
                .collect(),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn type_name(&self) -> &VaultStr {
        &self.type_name
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn field(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).and_then(Option::as_ref)
    }

    pub fn field_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field).and_then(Option::as_mut)
    }

    pub fn is_field_moved(&self, field: &str) -> bool {
        matches!(self.fields.get(field), Some(None))
    }

    pub fn moved_fields(&self) -> Vec<VaultStr> {
        self.fields
            .iter()
            .filter(|(_, slot)| slot.is_none())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.fields.values().all(|slot| match slot {
            Some(value) => value.is_storable(),
            None => false,
        })
    }

    /// Move a field out, leaving its slot empty
    pub fn take_field(&mut self, field: &str) -> Option<Value> {
        self.fields.get_mut(field).and_then(Option::take)
    }

    /// Fill a field slot, returning whatever it held before
    pub fn put_field(&mut self, field: impl Into<VaultStr>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), Some(value)).flatten()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&VaultStr, Option<&Value>)> {
        self.fields.iter().map(|(name, slot)| (name, slot.as_ref()))
    }

    pub fn into_fields(self) -> IndexMap<VaultStr, Option<Value>> {
        self.fields
    }

    /// Visit root resources held in filled fields, with the field name
    pub fn for_each_field_root(&self, visit: &mut dyn FnMut(&VaultStr, ResourceId, &[ValueKey])) {
        for (name, slot) in &self.fields {
            if let Some(value) = slot {
                value.for_each_root(&mut |id, keys| visit(name, id, keys));
            }
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Str(VaultStr),
    Address(Address),
    Path(StoragePath),
    Array(Vec<Value>),
    Dict(BTreeMap<ValueKey, Value>),
    Struct(Struct),
    Resource(Resource),
    Capability(Capability),
    #[serde(skip)]
    Reference(Reference),
}

impl Value {
    pub fn str(s: impl Into<VaultStr>) -> Self {
        Value::Str(s.into())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Str(_) => "str",
            Value::Address(_) => "address",
            Value::Path(_) => "path",
            Value::Array(_) => "array",
            Value::Dict(_) => "dict",
            Value::Struct(_) => "struct",
            Value::Resource(_) => "resource",
            Value::Capability(_) => "capability",
            Value::Reference(_) => "reference",
        }
    }

    /// Dynamic type of the value
    pub fn type_of(&self) -> Type {
        match self {
            Value::Nil => Type::Never,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Uint(_) => Type::Uint,
            Value::Str(_) => Type::Str,
            Value::Address(_) => Type::Address,
            Value::Path(_) => Type::Path,
            Value::Array(elems) => Type::array(common_type(elems.iter().map(Value::type_of))),
            Value::Dict(map) => Type::dict(
                common_type(map.keys().map(ValueKey::key_type)),
                common_type(map.values().map(Value::type_of)),
            ),
            Value::Struct(s) => Type::Composite(s.type_name.clone()),
            Value::Resource(r) => Type::Composite(r.type_name.clone()),
            Value::Capability(cap) => Type::Capability(cap.borrow_type.clone().map(Box::new)),
            Value::Reference(r) => Type::Reference(Box::new(r.granted.clone())),
        }
    }

    pub fn as_key(&self) -> Option<ValueKey> {
        match self {
            Value::Bool(b) => Some(ValueKey::Bool(*b)),
            Value::Int(i) => Some(ValueKey::Int(*i)),
            Value::Uint(u) => Some(ValueKey::Uint(*u)),
            Value::Str(s) => Some(ValueKey::Str(s.clone())),
            Value::Address(a) => Some(ValueKey::Address(*a)),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::Uint(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Value::Resource(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_resource_mut(&mut self) -> Option<&mut Resource> {
        match self {
            Value::Resource(r) => Some(r),
            _ => None,
        }
    }

    pub fn resource_id(&self) -> Option<ResourceId> {
        self.as_resource().map(Resource::id)
    }

    /// Duplicate a copyable value. Linear values cannot be duplicated.
    pub fn duplicate(&self) -> Result<Value, ValueError> {
        Ok(match self {
            Value::Nil => Value::Nil,
            Value::Bool(b) => Value::Bool(*b),
            Value::Int(i) => Value::Int(*i),
            Value::Uint(u) => Value::Uint(*u),
            Value::Str(s) => Value::Str(s.clone()),
            Value::Address(a) => Value::Address(*a),
            Value::Path(p) => Value::Path(p.clone()),
            Value::Array(elems) => Value::Array(
                elems
                    .iter()
                    .map(Value::duplicate)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Dict(map) => {
                let mut copy = BTreeMap::new();
                for (k, v) in map {
                    copy.insert(k.clone(), v.duplicate()?);
                }
                Value::Dict(copy)
            }
            Value::Struct(s) => Value::Struct(s.duplicate()?),
            Value::Resource(r) => {
                return Err(ValueError::CopyOfLinear {
                    type_name: r.type_name.to_string(),
                })
            }
            Value::Capability(cap) => Value::Capability(cap.clone()),
            Value::Reference(r) => Value::Reference(r.clone()),
        })
    }

    /// Whether the value may be persisted: no references anywhere inside
    /// and no resource with an empty field slot.
    pub fn is_storable(&self) -> bool {
        match self {
            Value::Reference(_) => false,
            Value::Array(elems) => elems.iter().all(Value::is_storable),
            Value::Dict(map) => map.values().all(Value::is_storable),
            Value::Struct(s) => s.fields.values().all(Value::is_storable),
            Value::Resource(r) => r.is_complete(),
            _ => true,
        }
    }

    fn visit_roots(&self, keys: &mut Vec<ValueKey>, visit: &mut dyn FnMut(ResourceId, &[ValueKey])) {
        match self {
            Value::Resource(r) => visit(r.id, keys),
            Value::Array(elems) => {
                for (i, elem) in elems.iter().enumerate() {
                    keys.push(ValueKey::Uint(i as u64));
                    elem.visit_roots(keys, visit);
                    keys.pop();
                }
            }
            Value::Dict(map) => {
                for (k, v) in map {
                    keys.push(k.clone());
                    v.visit_roots(keys, visit);
                    keys.pop();
                }
            }
            _ => {}
        }
    }
}

fn common_type(mut types: impl Iterator<Item = Type>) -> Type {
    let Some(first) = types.next() else {
        return Type::Never;
    };
    if types.all(|t| t == first) {
        first
    } else {
        Type::Any
    }
}

impl Linear for Value {
    fn linearity(&self) -> Linearity {
        let linear = match self {
            Value::Resource(_) => true,
            Value::Array(elems) => elems.iter().any(Value::is_linear),
            Value::Dict(map) => map.values().any(Value::is_linear),
            _ => false,
        };
        if linear {
            Linearity::Linear
        } else {
            Linearity::Copyable
        }
    }

    fn for_each_root(&self, visit: &mut dyn FnMut(ResourceId, &[ValueKey])) {
        let mut keys = Vec::new();
        self.visit_roots(&mut keys, visit);
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Uint(u) => write!(f, "{}", u),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Address(a) => write!(f, "{}", a),
            Value::Path(p) => write!(f, "{}", p),
            Value::Array(elems) => {
                write!(f, "[")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                write!(f, "]")
            }
            Value::Dict(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Struct(s) => {
                write!(f, "{}(", s.type_name)?;
                for (i, (name, value)) in s.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                write!(f, ")")
            }
            Value::Resource(r) => {
                write!(f, "{}{}(", r.type_name, r.id)?;
                for (i, (name, slot)) in r.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match slot {
                        Some(value) => write!(f, "{}: {}", name, value)?,
                        None => write!(f, "{}: <moved>", name)?,
                    }
                }
                write!(f, ")")
            }
            Value::Capability(cap) => write!(f, "{}", cap),
            Value::Reference(r) => write!(f, "{}", r),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Value {
        Value::Uint(u)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.into())
    }
}

impl From<Address> for Value {
    fn from(a: Address) -> Value {
        Value::Address(a)
    }
}

impl From<Struct> for Value {
    fn from(s: Struct) -> Value {
        Value::Struct(s)
    }
}

impl From<Resource> for Value {
    fn from(r: Resource) -> Value {
        Value::Resource(r)
    }
}

impl From<Capability> for Value {
    fn from(cap: Capability) -> Value {
        Value::Capability(cap)
    }
}
