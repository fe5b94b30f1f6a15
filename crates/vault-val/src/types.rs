use crate::VaultStr;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Type {
    #[default]
    Any,
    /// Bottom type, the element type of empty containers
    Never,
    AnyStruct,
    AnyResource,
    Bool,
    Int,
    Uint,
    Str,
    Address,
    Path,
    Array(Box<Type>),
    Dict(Box<Type>, Box<Type>),
    /// A declared composite or interface, looked up in the [`TypeRegistry`]
    Composite(VaultStr),
    /// `T{I1, I2}`: a value of `T` (or of any type when `base` is `None`)
    /// viewed only through the listed interfaces
    Restricted {
        base: Option<VaultStr>,
        interfaces: Vec<VaultStr>,
    },
    Capability(Option<Box<BorrowType>>),
    Reference(Box<BorrowType>),
}

impl Type {
    pub fn composite(name: impl Into<VaultStr>) -> Self {
        Type::Composite(name.into())
    }

    pub fn restricted<I, S>(base: Option<&str>, interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<VaultStr>,
    {
        Type::Restricted {
            base: base.map(VaultStr::from),
            interfaces: interfaces.into_iter().map(Into::into).collect(),
        }
    }

    pub fn array(elem: Type) -> Self {
        Type::Array(Box::new(elem))
    }

    pub fn dict(key: Type, value: Type) -> Self {
        Type::Dict(Box::new(key), Box::new(value))
    }

    pub fn name(&self) -> VaultStr {
        self.to_string().into()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "Any"),
            Type::Never => write!(f, "Never"),
            Type::AnyStruct => write!(f, "AnyStruct"),
            Type::AnyResource => write!(f, "AnyResource"),
            Type::Bool => write!(f, "Bool"),
            Type::Int => write!(f, "Int"),
            Type::Uint => write!(f, "UInt"),
            Type::Str => write!(f, "String"),
            Type::Address => write!(f, "Address"),
            Type::Path => write!(f, "Path"),
            Type::Array(elem) => write!(f, "[{}]", elem),
            Type::Dict(k, v) => write!(f, "{{{}: {}}}", k, v),
            Type::Composite(name) => write!(f, "{}", name),
            Type::Restricted { base, interfaces } => {
                if let Some(base) = base {
                    write!(f, "{}", base)?;
                }
                write!(f, "{{{}}}", interfaces.join(", "))
            }
            Type::Capability(None) => write!(f, "Capability"),
            Type::Capability(Some(borrow)) => write!(f, "Capability<{}>", borrow),
            Type::Reference(borrow) => write!(f, "{}", borrow),
        }
    }
}

/// Reference type of a borrow: `&T`, or `auth &T` for an authorized
/// reference that may be downcast to a more specific type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BorrowType {
    pub authorized: bool,
    pub ty: Type,
}

impl BorrowType {
    pub fn new(ty: Type) -> Self {
        Self {
            authorized: false,
            ty,
        }
    }

    pub fn auth(ty: Type) -> Self {
        Self {
            authorized: true,
            ty,
        }
    }
}

impl fmt::Display for BorrowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.authorized {
            write!(f, "auth &{}", self.ty)
        } else {
            write!(f, "&{}", self.ty)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeKind {
    Struct,
    Resource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeInfo {
    pub name: VaultStr,
    pub kind: CompositeKind,
    pub conformances: Vec<VaultStr>,
    pub members: BTreeSet<VaultStr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceInfo {
    pub name: VaultStr,
    pub kind: CompositeKind,
    pub inherits: Vec<VaultStr>,
    pub members: BTreeSet<VaultStr>,
}

/// Outcome of checking a requested borrow type against a declared one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Requested type is the declared type or one of its supertypes
    Upcast,
    /// Requested type is more specific, allowed by an authorized declaration
    Downcast,
    /// Requested type is more specific (or authorized) but the declaration
    /// is not authorized
    Unauthorized,
    /// The types are unrelated
    Mismatch,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Upcast | Admission::Downcast)
    }
}

/// Declared composites and interfaces, with the subtype relation over them.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    composites: HashMap<VaultStr, CompositeInfo>,
    interfaces: HashMap<VaultStr, InterfaceInfo>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_composite<C, M, S>(
        &mut self,
        name: impl Into<VaultStr>,
        kind: CompositeKind,
        conformances: C,
        members: M,
    ) where
        C: IntoIterator<Item = S>,
        M: IntoIterator<Item = S>,
        S: Into<VaultStr>,
    {
        let name = name.into();
        let info = CompositeInfo {
            name: name.clone(),
            kind,
            conformances: conformances.into_iter().map(Into::into).collect(),
            members: members.into_iter().map(Into::into).collect(),
        };
        self.composites.insert(name, info);
    }

    pub fn declare_interface<I, M, S>(
        &mut self,
        name: impl Into<VaultStr>,
        kind: CompositeKind,
        inherits: I,
        members: M,
    ) where
        I: IntoIterator<Item = S>,
        M: IntoIterator<Item = S>,
        S: Into<VaultStr>,
    {
        let name = name.into();
        let info = InterfaceInfo {
            name: name.clone(),
            kind,
            inherits: inherits.into_iter().map(Into::into).collect(),
            members: members.into_iter().map(Into::into).collect(),
        };
        self.interfaces.insert(name, info);
    }

    pub fn composite(&self, name: &str) -> Option<&CompositeInfo> {
        self.composites.get(name)
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceInfo> {
        self.interfaces.get(name)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.composites.contains_key(name) || self.interfaces.contains_key(name)
    }

    /// Every interface `name` reaches through declared conformances or
    /// inheritance, including `name` itself when it is an interface.
    fn interface_closure(&self, name: &str) -> BTreeSet<VaultStr> {
        let mut seen = BTreeSet::new();
        let mut pending: Vec<VaultStr> = match (self.composites.get(name), self.interfaces.get(name)) {
            (Some(info), _) => info.conformances.clone(),
            (None, Some(_)) => vec![VaultStr::from(name)],
            (None, None) => Vec::new(),
        };
        while let Some(next) = pending.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(info) = self.interfaces.get(next.as_str()) {
                pending.extend(info.inherits.iter().cloned());
            }
        }
        seen
    }

    fn conforms(&self, name: &str, interface: &str) -> bool {
        name == interface || self.interface_closure(name).contains(interface)
    }

    pub fn is_resource_type(&self, ty: &Type) -> bool {
        match ty {
            Type::AnyResource => true,
            Type::Composite(name) => self.kind_of(name) == Some(CompositeKind::Resource),
            Type::Restricted { base: Some(base), .. } => {
                self.kind_of(base) == Some(CompositeKind::Resource)
            }
            Type::Restricted { base: None, interfaces } => interfaces
                .iter()
                .any(|i| self.kind_of(i) == Some(CompositeKind::Resource)),
            Type::Array(elem) => self.is_resource_type(elem),
            Type::Dict(_, value) => self.is_resource_type(value),
            _ => false,
        }
    }

    fn kind_of(&self, name: &str) -> Option<CompositeKind> {
        self.composites
            .get(name)
            .map(|c| c.kind)
            .or_else(|| self.interfaces.get(name).map(|i| i.kind))
    }

    pub fn is_subtype(&self, sub: &Type, sup: &Type) -> bool {
        if sub == sup {
            return true;
        }
        match (sub, sup) {
            (_, Type::Any) | (Type::Never, _) => true,
            (_, Type::AnyResource) => self.is_resource_type(sub),
            (Type::Any, _) => false,
            (_, Type::AnyStruct) => !self.is_resource_type(sub) && *sub != Type::AnyResource,
            (Type::Composite(a), Type::Composite(b)) => self.conforms(a, b),
            (Type::Composite(a), Type::Restricted { base, interfaces }) => {
                base.as_ref().map_or(true, |b| b == a)
                    && interfaces.iter().all(|i| self.conforms(a, i))
            }
            (Type::Restricted { base, interfaces }, Type::Composite(b)) => {
                if interfaces.is_empty() {
                    base.as_ref().is_some_and(|a| self.conforms(a, b))
                } else {
                    interfaces.iter().any(|i| self.conforms(i, b))
                }
            }
            (
                Type::Restricted { base, interfaces },
                Type::Restricted {
                    base: sup_base,
                    interfaces: sup_interfaces,
                },
            ) => {
                let base_ok = match (base, sup_base) {
                    (_, None) => true,
                    (Some(a), Some(b)) => a == b,
                    (None, Some(_)) => false,
                };
                base_ok
                    && sup_interfaces.iter().all(|want| {
                        if interfaces.is_empty() {
                            base.as_ref().is_some_and(|b| self.conforms(b, want))
                        } else {
                            interfaces.iter().any(|have| self.conforms(have, want))
                        }
                    })
            }
            (Type::Array(a), Type::Array(b)) => self.is_subtype(a, b),
            (Type::Dict(ka, va), Type::Dict(kb, vb)) => {
                self.is_subtype(ka, kb) && self.is_subtype(va, vb)
            }
            (Type::Capability(_), Type::Capability(None)) => true,
            (Type::Capability(Some(a)), Type::Capability(Some(b))) => {
                self.is_borrow_subtype(a, b)
            }
            (Type::Reference(a), Type::Reference(b)) => self.is_borrow_subtype(a, b),
            _ => false,
        }
    }

    /// `auth &T` is a subtype of `&T`, never the other way around.
    pub fn is_borrow_subtype(&self, sub: &BorrowType, sup: &BorrowType) -> bool {
        (sub.authorized || !sup.authorized) && self.is_subtype(&sub.ty, &sup.ty)
    }

    /// Check a requested borrow type against the type a link or
    /// capability declares.
    pub fn admits(&self, declared: &BorrowType, requested: &BorrowType) -> Admission {
        if requested.authorized && !declared.authorized {
            return Admission::Unauthorized;
        }
        if self.is_subtype(&declared.ty, &requested.ty) {
            return Admission::Upcast;
        }
        if self.is_subtype(&requested.ty, &declared.ty) {
            return if declared.authorized {
                Admission::Downcast
            } else {
                Admission::Unauthorized
            };
        }
        Admission::Mismatch
    }

    /// Members visible through a value of type `ty`.
    ///
    /// Restricted types expose the union of their interfaces only; the
    /// concrete base contributes its own members when no interface is named.
    pub fn members_of(&self, ty: &Type) -> BTreeSet<VaultStr> {
        match ty {
            Type::Composite(name) => {
                if let Some(info) = self.composites.get(name.as_str()) {
                    info.members.clone()
                } else {
                    self.interface_members(name)
                }
            }
            Type::Restricted { base, interfaces } => {
                if interfaces.is_empty() {
                    base.as_ref()
                        .map(|b| self.members_of(&Type::Composite(b.clone())))
                        .unwrap_or_default()
                } else {
                    interfaces
                        .iter()
                        .flat_map(|i| self.interface_members(i))
                        .collect()
                }
            }
            _ => BTreeSet::new(),
        }
    }

    fn interface_members(&self, name: &str) -> BTreeSet<VaultStr> {
        self.interface_closure(name)
            .iter()
            .filter_map(|i| self.interfaces.get(i.as_str()))
            .flat_map(|info| info.members.iter().cloned())
            .collect()
    }
}
