//! Core entity and permission types.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Positive integer entity id, unique within a tenant. Immutable after creation.
pub type EntityId = u64;

/// Polymorphic entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Group,
    Role,
}

impl EntityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Role => "role",
        }
    }
}

/// HTTP-style verb a permission applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Connect,
    Trace,
}

/// Permission effect. `Deny` always dominates `Grant` during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Grant,
    Deny,
}

/// Opaque authorization-scheme tag. Never consulted during evaluation
/// (see `SPEC_FULL.md` §3.2); carried end-to-end for provenance only.
pub type Scheme = String;

/// A single value in a permission's opaque metadata map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Number(f64),
    Bool(bool),
}

/// A permission record owned by exactly one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub uri: String,
    pub verb: Verb,
    pub effect: Effect,
    pub scheme: Scheme,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl Permission {
    #[must_use]
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= at)
    }
}

/// A User, Group, or Role within a tenant.
///
/// Entities do not hold pointers to other entities: hierarchy edges live
/// in the owning `EntityGraph`'s index, never on the struct itself (see
/// `DESIGN.md`, "back-references between entities").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    #[must_use]
    pub fn new(id: EntityId, kind: EntityKind, name: String, at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            name,
            permissions: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }
}

/// A read-only view of an entity's hierarchy neighbours, as returned by
/// the graph (never stored on `Entity` itself).
#[derive(Debug, Clone, Default)]
pub struct EdgeSet {
    pub parents: HashSet<EntityId>,
    pub children: HashSet<EntityId>,
}
