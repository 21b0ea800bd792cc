//! Gateway configuration data model.
//!
//! # Entity Graph
//! ```text
//! PluginGroup ◀───────── attachment ────────┬───────────┬──────────┐
//!                                            │           │          │
//! Cluster ◀── clusters ── Listener ◀── listener ── Resource ◀── resource ── Method
//!    ▲                                                                        │
//!    └──────────────────────────── target.cluster ────────────────────────────┘
//! ```
//!
//! # Design Decisions
//! - Keys are immutable; rename is delete + create
//! - Intra-entity checks run on every draft write (`Entity::validate`)
//! - Cross-entity references are only resolved at release time

pub mod entities;
pub mod patch;

use std::fmt;
use std::hash::Hash;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub use entities::{
    BaseInfo, Cluster, Endpoint, HealthCheck, HttpVerb, LbPolicy, Listener, ListenerTls, Matcher,
    MatcherSource, Method, MethodTarget, Plugin, PluginGroup, Protocol, Resource,
};

/// The configuration entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Cluster,
    PluginGroup,
    Listener,
    Resource,
    Method,
}

impl EntityKind {
    /// Dependency order: every kind only references kinds listed before it.
    pub const DEPENDENCY_ORDER: [EntityKind; 5] = [
        EntityKind::Cluster,
        EntityKind::PluginGroup,
        EntityKind::Listener,
        EntityKind::Resource,
        EntityKind::Method,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Cluster => "cluster",
            EntityKind::PluginGroup => "plugin_group",
            EntityKind::Listener => "listener",
            EntityKind::Resource => "resource",
            EntityKind::Method => "method",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tier of the store to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Draft,
    Published,
}

/// Which publish entry point triggered a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseScope {
    Resource,
    Method,
    PluginGroup,
    All,
}

impl fmt::Display for ReleaseScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReleaseScope::Resource => "resource",
            ReleaseScope::Method => "method",
            ReleaseScope::PluginGroup => "plugin_group",
            ReleaseScope::All => "all",
        })
    }
}

/// Key of every kind except Method.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId {
    pub id: String,
}

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Methods are unique within their owning resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodKey {
    pub resource: String,
    pub id: String,
}

impl MethodKey {
    pub fn new(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.resource, self.id)
    }
}

/// Untyped pointer to an entity, used in references and error reports.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub key: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, key: impl ToString) -> Self {
        Self {
            kind,
            key: key.to_string(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}`", self.kind, self.key)
    }
}

/// An outgoing reference held by an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Field holding the reference (e.g. `target.cluster`).
    pub field: &'static str,
    pub target: EntityRef,
}

impl Reference {
    pub fn new(field: &'static str, kind: EntityKind, key: impl ToString) -> Self {
        Self {
            field,
            target: EntityRef::new(kind, key),
        }
    }
}

/// A single intra-entity validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of removing a reference from an entity during a cascading delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detach {
    /// The reference was dropped and the entity is still well-formed.
    Detached,
    /// The reference is required; the entity has to go as well.
    Remove,
}

/// Common behaviour of every configuration entity.
pub trait Entity:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Key: Clone
        + fmt::Debug
        + fmt::Display
        + Ord
        + Hash
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    const KIND: EntityKind;

    fn key(&self) -> Self::Key;

    /// Intra-entity checks. Empty means valid.
    fn validate(&self) -> Vec<FieldError>;

    /// Every outgoing reference, in field order.
    fn references(&self) -> Vec<Reference>;

    /// Drop every reference to `target`.
    fn detach(&mut self, target: &EntityRef) -> Detach;

    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(Self::KIND, self.key())
    }

    fn refers_to(&self, target: &EntityRef) -> bool {
        self.references().iter().any(|r| &r.target == target)
    }
}
