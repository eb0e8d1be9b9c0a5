use serde::{
    Serialize, Deserialize,
    ser::Serializer,
    de::{self, Deserializer, Unexpected, Visitor},
};
use std::{
    collections::HashMap,
    ops::{BitOr, BitOrAssign},
};
use crate::{
    constant::{PERMISSION_MASK, PERMISSION_NEEDLE},
    error::AuthError,
};

/// A set of elementary capabilities encoded as a bitmask.
///
/// Each elementary permission occupies exactly one bit above the reserved
/// needle. Sets compose with `|`. Only the low 53 bits are usable so the
/// value survives a round trip through a JSON number.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct Permission(u64);

/// Create a permission from its bit index above the needle.
const fn elementary(index: u32) -> Permission {
    Permission(1u64 << (PERMISSION_NEEDLE + index))
}

pub const NONE: Permission = Permission(0);
pub const CREATE_ACCOUNT: Permission = elementary(0);
pub const READ_ACCOUNT: Permission = elementary(1);
pub const UPDATE_ACCOUNT: Permission = elementary(2);
pub const DELETE_ACCOUNT: Permission = elementary(3);
pub const UPLOAD_IMAGE: Permission = elementary(4);
pub const READ_FORTUNE: Permission = elementary(5);
pub const SEARCH_GRAPH: Permission = elementary(6);

// Privileged.
pub const GRANT_PERMISSION: Permission = elementary(16);
pub const REVOKE_SESSION: Permission = elementary(17);

const ORDINARY: &[(&str, Permission)] = &[
    ("create_account", CREATE_ACCOUNT),
    ("read_account", READ_ACCOUNT),
    ("update_account", UPDATE_ACCOUNT),
    ("delete_account", DELETE_ACCOUNT),
    ("upload_image", UPLOAD_IMAGE),
    ("read_fortune", READ_FORTUNE),
    ("search_graph", SEARCH_GRAPH),
];

const PRIVILEGED: &[(&str, Permission)] = &[
    ("grant_permission", GRANT_PERMISSION),
    ("revoke_session", REVOKE_SESSION),
];

impl Permission {

    /// Create a permission set from raw bits, discarding anything above
    /// bit 52.
    pub const fn from_bits(bits: u64) -> Self {
        Permission(bits & PERMISSION_MASK)
    }

    /// Return the raw bits.
    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Return true if this set contains every bit of `required`.
    ///
    /// An empty requirement is trivially satisfied.
    pub const fn has_all(self, required: Permission) -> bool {
        self.0 & required.0 == required.0
    }
}

/// Return true if `granted` satisfies `required`.
pub fn has_all(granted: Permission, required: Permission) -> bool {
    granted.has_all(required)
}

impl BitOr for Permission {
    type Output = Permission;

    fn bitor(self, rhs: Permission) -> Permission {
        Permission(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permission {
    fn bitor_assign(&mut self, rhs: Permission) {
        self.0 |= rhs.0;
    }
}

impl From<Permission> for u64 {
    fn from(p: Permission) -> u64 {
        p.0
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Permission {
    fn serialize<S>(
        &self,
        serializer: S
    ) -> Result<S::Ok, S::Error> where S: Serializer {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where D: Deserializer<'de> {
        struct PermissionVisitor;
        impl<'de> Visitor<'de> for PermissionVisitor {
            type Value = Permission;
            fn visit_u64<E>(self, value: u64) -> Result<Permission, E>
            where E: de::Error {
                if value & !PERMISSION_MASK == 0 {
                    Ok(Permission(value))
                } else {
                    Err(de::Error::invalid_value(
                        Unexpected::Unsigned(value),
                        &self
                    ))
                }
            }
            fn visit_i64<E>(self, value: i64) -> Result<Permission, E>
            where E: de::Error {
                if value >= 0 {
                    self.visit_u64(value as u64)
                } else {
                    Err(de::Error::invalid_value(
                        Unexpected::Signed(value),
                        &self
                    ))
                }
            }
            fn expecting(
                &self,
                f: &mut std::fmt::Formatter<'_>
            ) -> Result<(), std::fmt::Error> {
                write!(f, "a 53-bit permission mask")
            }
        }
        deserializer.deserialize_u64(PermissionVisitor)
    }
}

/// Name to bitmask lookup tables.
///
/// Built once at startup and shared by reference. The privileged table is
/// only consulted when a caller explicitly asks for it.
#[derive(Clone, Debug)]
pub struct PermissionTable {

    /// Permissions any client may request.
    ordinary: HashMap<String, Permission>,

    /// Permissions that are only resolved on request.
    privileged: HashMap<String, Permission>,
}

impl PermissionTable {

    /// Create a table from explicit entries.
    pub fn new<I, J>(ordinary: I, privileged: J) -> Self
    where
        I: IntoIterator<Item = (String, Permission)>,
        J: IntoIterator<Item = (String, Permission)>,
    {
        PermissionTable {
            ordinary: ordinary.into_iter().collect(),
            privileged: privileged.into_iter().collect(),
        }
    }

    /// Create the table holding the built-in permissions.
    pub fn standard() -> Self {
        Self::new(
            ORDINARY.iter().map(|(n, p)| (n.to_string(), *p)),
            PRIVILEGED.iter().map(|(n, p)| (n.to_string(), *p)),
        )
    }

    /// Resolve a list of names to the union of their bits.
    ///
    /// Fails on the first unknown name and returns nothing partially
    /// resolved.
    pub fn resolve<S: AsRef<str>>(
        &self,
        names: &[S],
        include_super: bool,
    ) -> Result<Permission, AuthError> {
        let mut resolved = NONE;
        for name in names {
            let name = name.as_ref();
            let found = self.ordinary.get(name).or_else(|| {
                if include_super {
                    self.privileged.get(name)
                } else {
                    None
                }
            });
            match found {
                Some(p) => resolved |= *p,
                None => {
                    return Err(AuthError::UnrecognizedPermission(
                        name.to_owned()
                    ));
                },
            }
        }
        Ok(resolved)
    }

    /// Return the name of a permission for diagnostics.
    ///
    /// Composite or unnamed sets are rendered as their decimal bitmask.
    pub fn describe(&self, p: Permission) -> String {
        self.ordinary.iter()
            .chain(self.privileged.iter())
            .find(|(_, v)| **v == p)
            .map(|(k, _)| k.clone())
            .unwrap_or_else(|| p.to_string())
    }
}

impl Default for PermissionTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_sit_above_needle() {
        assert_eq!(CREATE_ACCOUNT.bits(), 1 << PERMISSION_NEEDLE);
        for (_, p) in ORDINARY.iter().chain(PRIVILEGED.iter()) {
            assert_eq!(p.bits().count_ones(), 1);
            assert!(p.bits() >= 1 << PERMISSION_NEEDLE);
        }
    }

    #[test]
    fn test_has_all() {
        let granted = CREATE_ACCOUNT | READ_ACCOUNT;
        assert!(has_all(granted, CREATE_ACCOUNT));
        assert!(has_all(granted, CREATE_ACCOUNT | READ_ACCOUNT));
        assert!(!has_all(granted, CREATE_ACCOUNT | DELETE_ACCOUNT));
        assert!(has_all(granted, NONE));
        assert!(has_all(NONE, NONE));
    }

    #[test]
    fn test_resolve() {
        let table = PermissionTable::standard();
        let p = table.resolve(&["create_account", "delete_account"], false).unwrap();
        assert_eq!(p, CREATE_ACCOUNT | DELETE_ACCOUNT);
        assert_eq!(table.resolve::<&str>(&[], false).unwrap(), NONE);
    }

    #[test]
    fn test_resolve_unknown_is_all_or_nothing() {
        let table = PermissionTable::standard();
        let err = table.resolve(&["create_account", "bogus"], false).unwrap_err();
        assert_eq!(err, AuthError::UnrecognizedPermission("bogus".into()));
    }

    #[test]
    fn test_privileged_requires_opt_in() {
        let table = PermissionTable::standard();
        assert!(table.resolve(&["grant_permission"], false).is_err());
        assert_eq!(
            table.resolve(&["grant_permission"], true).unwrap(),
            GRANT_PERMISSION,
        );
    }

    #[test]
    fn test_describe() {
        let table = PermissionTable::standard();
        assert_eq!(table.describe(CREATE_ACCOUNT), "create_account");
        assert_eq!(table.describe(REVOKE_SESSION), "revoke_session");
        let composite = CREATE_ACCOUNT | READ_ACCOUNT;
        assert_eq!(table.describe(composite), composite.bits().to_string());
    }

    #[test]
    fn test_serde_rejects_wide_masks() {
        let p: Permission = serde_json::from_str("48").unwrap();
        assert_eq!(p.bits(), 48);
        assert!(serde_json::from_str::<Permission>("9007199254740992").is_err());
        assert!(serde_json::from_str::<Permission>("-1").is_err());
    }
}
