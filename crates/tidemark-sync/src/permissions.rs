//! ACL-derived permission labels attached to indexed documents.

use std::collections::BTreeSet;

use tidemark_core::{AclEntry, StorageDescriptor};

/// Allowed and denied principals of a storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionLabels {
    /// Users granted read access.
    pub allowed_users: BTreeSet<String>,
    /// Users denied read access.
    pub denied_users: BTreeSet<String>,
    /// Groups granted read access.
    pub allowed_groups: BTreeSet<String>,
    /// Groups denied read access.
    pub denied_groups: BTreeSet<String>,
}

impl PermissionLabels {
    /// Builds labels from the ACL entries of `storage`.
    ///
    /// The storage owner is always an allowed user.
    #[must_use]
    pub fn from_acl(storage: &StorageDescriptor, entries: &[AclEntry]) -> Self {
        let mut labels = Self::default();
        for entry in entries {
            let (allowed, denied) = if entry.principal {
                (&mut labels.allowed_users, &mut labels.denied_users)
            } else {
                (&mut labels.allowed_groups, &mut labels.denied_groups)
            };
            if entry.allows_read() {
                allowed.insert(entry.name.clone());
            } else if entry.denies_read() {
                denied.insert(entry.name.clone());
            }
        }
        if let Some(owner) = &storage.owner {
            labels.denied_users.remove(owner);
            labels.allowed_users.insert(owner.clone());
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_core::StorageKind;

    fn entry(name: &str, principal: bool, mask: u32) -> AclEntry {
        AclEntry {
            name: name.into(),
            principal,
            mask,
        }
    }

    #[test]
    fn splits_users_and_groups() {
        let storage = StorageDescriptor {
            id: 1,
            name: "shared".into(),
            path: "filer:/data".into(),
            kind: StorageKind::Nfs,
            owner: Some("owner".into()),
        };
        let labels = PermissionLabels::from_acl(
            &storage,
            &[
                entry("alice", true, AclEntry::READ),
                entry("bob", true, AclEntry::NO_READ),
                entry("owner", true, AclEntry::NO_READ),
                entry("analysts", false, AclEntry::READ),
                entry("contractors", false, AclEntry::NO_READ),
                entry("writers", false, 4),
            ],
        );

        assert_eq!(
            labels.allowed_users.iter().collect::<Vec<_>>(),
            vec!["alice", "owner"]
        );
        assert_eq!(labels.denied_users.iter().collect::<Vec<_>>(), vec!["bob"]);
        assert_eq!(
            labels.allowed_groups.iter().collect::<Vec<_>>(),
            vec!["analysts"]
        );
        assert_eq!(
            labels.denied_groups.iter().collect::<Vec<_>>(),
            vec!["contractors"]
        );
    }
}
