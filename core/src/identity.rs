/// Users, roles and caller identity.
use crate::errors::IdentityError;
use crate::traits::IdentityResolver;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A named editorial role (e.g. "reporter", "sub-editor").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Role(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(name: &str) -> Self {
        Role::new(name)
    }
}

/// An authenticated user of the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier (login name)
    pub id: String,

    /// Display name, used when rendering the current actor
    #[serde(default)]
    pub name: String,

    /// Roles held by the user
    #[serde(default)]
    pub roles: BTreeSet<Role>,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            roles: BTreeSet::new(),
        }
    }

    /// Builder-style role assignment.
    pub fn with_role(mut self, role: impl Into<Role>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    /// Display name, falling back to the id when no name is set.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Resolves to the same user on every call.
///
/// Used by request handlers that authenticated the caller up front, by the
/// scheduler's system user, and by tests.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    user: User,
}

impl StaticIdentity {
    pub fn new(user: User) -> Self {
        Self { user }
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentity {
    async fn current_user(&self) -> Result<User, IdentityError> {
        Ok(self.user.clone())
    }
}

/// Resolver for a caller that never authenticated.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

#[async_trait]
impl IdentityResolver for Anonymous {
    async fn current_user(&self) -> Result<User, IdentityError> {
        Err(IdentityError::Unauthenticated)
    }
}
