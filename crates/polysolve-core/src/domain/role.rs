//! Roles: the areas of expertise a run consults.

use serde::{Deserialize, Serialize};

/// Stable, 1-based position of a role in identification order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub u32);

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// A named area of expertise and the reason it is relevant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub rationale: String,
}

impl Role {
    pub fn new(id: RoleId, name: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            rationale: rationale.into(),
        }
    }

    /// Dedup key for this role.
    pub fn normalized_name(&self) -> String {
        normalize_role_name(&self.name)
    }
}

/// Case- and whitespace-insensitive key used to deduplicate roles.
pub fn normalize_role_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
