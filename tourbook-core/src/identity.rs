use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    User,
    Admin,
}

impl ActorRole {
    /// Anything other than `admin` is treated as a regular user.
    pub fn from_claim(role: &str) -> Self {
        if role.eq_ignore_ascii_case("admin") {
            ActorRole::Admin
        } else {
            ActorRole::User
        }
    }
}

/// The authenticated caller behind a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Self { id: id.into(), role: ActorRole::User }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self { id: id.into(), role: ActorRole::Admin }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    /// Owners and admins may act on a record.
    pub fn can_access(&self, owner_id: &str) -> bool {
        self.is_admin() || self.id == owner_id
    }
}
