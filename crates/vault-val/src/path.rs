use crate::{StrExt, ValueError, VaultStr};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};

/// Account address of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub u64);

impl Address {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl FromStr for Address {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix("0x").unwrap_or(s);
        u64::from_str_radix(hex, 16)
            .map(Address)
            .map_err(|_| ValueError::InvalidAddress(s.to_string()))
    }
}

/// Visibility domain of an account's storage.
///
/// `Storage` is the private-data domain and holds values. `Private` is the
/// link-only domain and `Public` the world-readable one; both hold links.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum Domain {
    Storage,
    Private,
    Public,
}

impl Domain {
    pub fn holds_values(self) -> bool {
        matches!(self, Domain::Storage)
    }

    pub fn holds_links(self) -> bool {
        !self.holds_values()
    }
}

/// A path in an account's storage, written `/<domain>/<identifier>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoragePath {
    pub domain: Domain,
    pub identifier: VaultStr,
}

impl StoragePath {
    pub fn new(domain: Domain, identifier: impl Into<VaultStr>) -> Result<Self, ValueError> {
        let identifier = identifier.into();
        if !identifier.is_identifier() {
            return Err(ValueError::InvalidPath(format!("/{}/{}", domain, identifier)));
        }
        Ok(Self { domain, identifier })
    }

    pub fn storage(identifier: impl Into<VaultStr>) -> Self {
        Self {
            domain: Domain::Storage,
            identifier: identifier.into(),
        }
    }

    pub fn private(identifier: impl Into<VaultStr>) -> Self {
        Self {
            domain: Domain::Private,
            identifier: identifier.into(),
        }
    }

    pub fn public(identifier: impl Into<VaultStr>) -> Self {
        Self {
            domain: Domain::Public,
            identifier: identifier.into(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValueError> {
        s.parse()
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.domain, self.identifier)
    }
}

impl FromStr for StoragePath {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValueError::InvalidPath(s.to_string());
        let rest = s.strip_prefix('/').ok_or_else(invalid)?;
        let (domain, identifier) = rest.split_once('/').ok_or_else(invalid)?;
        let domain = Domain::from_str(domain).map_err(|_| invalid())?;
        StoragePath::new(domain, identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_path_display_and_parse() {
        let path = StoragePath::public("flowTokenReceiver");
        assert_eq!(path.to_string(), "/public/flowTokenReceiver");
        assert_eq!(StoragePath::parse("/public/flowTokenReceiver").unwrap(), path);
    }

    #[test]
    fn test_path_parse_rejects_garbage() {
        assert!(StoragePath::parse("storage/vault").is_err());
        assert!(StoragePath::parse("/vault").is_err());
        assert!(StoragePath::parse("/heap/vault").is_err());
        assert!(StoragePath::parse("/storage/9lives").is_err());
    }

    #[test]
    fn test_domains() {
        let names: Vec<String> = Domain::iter().map(|d| d.to_string()).collect();
        assert_eq!(names, vec!["storage", "private", "public"]);
        assert!(Domain::Storage.holds_values());
        assert!(Domain::Public.holds_links());
        assert!(Domain::Private.holds_links());
    }

    #[test]
    fn test_address_round_trip() {
        let addr = Address::new(0x01cf0e2f2f715450);
        assert_eq!(addr.to_string(), "0x01cf0e2f2f715450");
        assert_eq!("0x01cf0e2f2f715450".parse::<Address>().unwrap(), addr);
        assert!("0xzz".parse::<Address>().is_err());
    }
}
