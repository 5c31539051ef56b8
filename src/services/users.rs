//! User role lookup used by `author_role` triggers

use std::collections::HashMap;

use crate::models::UserId;

/// Resolves the roles of a user
pub trait UserDirectory: Send + Sync {
    /// Roles of `user_id` in priority order, or `None` when the user is unknown
    fn roles(&self, user_id: UserId) -> Option<Vec<String>>;
}

/// In-memory directory, filled once by the host
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: HashMap<UserId, Vec<String>>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user<I, S>(mut self, user_id: UserId, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(user_id, roles);
        self
    }

    pub fn insert<I, S>(&mut self, user_id: UserId, roles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users
            .insert(user_id, roles.into_iter().map(Into::into).collect());
    }
}

impl UserDirectory for StaticUserDirectory {
    fn roles(&self, user_id: UserId) -> Option<Vec<String>> {
        self.users.get(&user_id).cloned()
    }
}
