//! Author and role whitelist

use modshield_core::{Result, StateStore, StateStoreExt, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Store key the whitelist is persisted under
pub const WHITELIST_KEY: &str = "whitelist";

/// Authors and roles exempt from moderation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Whitelist {
    #[serde(default)]
    users: BTreeSet<UserId>,
    #[serde(default)]
    roles: BTreeSet<u64>,
}

impl Whitelist {
    /// Create a whitelist
    pub fn new(users: impl IntoIterator<Item = UserId>, roles: impl IntoIterator<Item = u64>) -> Self {
        Self {
            users: users.into_iter().collect(),
            roles: roles.into_iter().collect(),
        }
    }

    /// Load from a store, empty if absent
    pub fn load(store: &dyn StateStore) -> Result<Self> {
        Ok(store.load_as(WHITELIST_KEY)?.unwrap_or_default())
    }

    /// Persist to a store
    pub fn save(&self, store: &dyn StateStore) -> Result<()> {
        store.save_as(WHITELIST_KEY, self)
    }

    /// Whether an author, or any of their roles, is exempt
    pub fn contains(&self, user_id: UserId, role_ids: &[u64]) -> bool {
        self.users.contains(&user_id) || role_ids.iter().any(|r| self.roles.contains(r))
    }

    /// Exempt a user; false if already exempt
    pub fn add_user(&mut self, user_id: UserId) -> bool {
        self.users.insert(user_id)
    }

    /// Lift a user's exemption; false if they had none
    pub fn remove_user(&mut self, user_id: UserId) -> bool {
        self.users.remove(&user_id)
    }

    /// Exempt a role; false if already exempt
    pub fn add_role(&mut self, role_id: u64) -> bool {
        self.roles.insert(role_id)
    }

    /// Lift a role's exemption; false if it had none
    pub fn remove_role(&mut self, role_id: u64) -> bool {
        self.roles.remove(&role_id)
    }

    /// Whitelisted users
    pub fn users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.users.iter().copied()
    }

    /// Whitelisted roles
    pub fn roles(&self) -> impl Iterator<Item = u64> + '_ {
        self.roles.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.roles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modshield_core::MemoryStore;

    #[test]
    fn test_user_and_role_membership() {
        let mut whitelist = Whitelist::default();
        assert!(whitelist.add_user(10));
        assert!(!whitelist.add_user(10));
        assert!(whitelist.add_role(500));

        assert!(whitelist.contains(10, &[]));
        assert!(whitelist.contains(11, &[1, 500]));
        assert!(!whitelist.contains(11, &[1, 2]));

        assert!(whitelist.remove_role(500));
        assert!(!whitelist.remove_role(500));
        assert!(!whitelist.contains(11, &[500]));

        assert!(whitelist.remove_user(10));
        assert!(!whitelist.remove_user(10));
        assert!(whitelist.is_empty());
    }

    #[test]
    fn test_persistence_roundtrip() {
        let store = MemoryStore::new();
        assert!(Whitelist::load(&store).unwrap().is_empty());

        let whitelist = Whitelist::new([1, 2], [3]);
        whitelist.save(&store).unwrap();
        assert_eq!(Whitelist::load(&store).unwrap(), whitelist);
    }
}
