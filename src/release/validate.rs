//! Referential closure check over a frozen snapshot.

use serde::{Deserialize, Serialize};

use crate::model::{
    Cluster, EntityId, EntityKind, EntityRef, Listener, Method, PluginGroup, Resource,
};
use crate::store::{Snapshot, Stored};

/// A reference that does not resolve inside the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceViolation {
    pub entity: EntityRef,
    pub field: String,
    pub missing: EntityRef,
}

/// Every unresolved reference in `snapshot`, in dependency order of the
/// referring kind and key order within a kind. Empty means publishable.
pub fn validate_snapshot(snapshot: &Snapshot) -> Vec<ReferenceViolation> {
    let mut violations = Vec::new();
    for kind in EntityKind::DEPENDENCY_ORDER {
        match kind {
            EntityKind::Cluster => check_section::<Cluster>(snapshot, &mut violations),
            EntityKind::PluginGroup => check_section::<PluginGroup>(snapshot, &mut violations),
            EntityKind::Listener => check_section::<Listener>(snapshot, &mut violations),
            EntityKind::Resource => check_section::<Resource>(snapshot, &mut violations),
            EntityKind::Method => check_section::<Method>(snapshot, &mut violations),
        }
    }
    violations
}

fn check_section<E: Stored>(snapshot: &Snapshot, violations: &mut Vec<ReferenceViolation>) {
    for entity in E::section(snapshot).values() {
        for reference in entity.references() {
            if !resolves(snapshot, &reference.target) {
                violations.push(ReferenceViolation {
                    entity: entity.entity_ref(),
                    field: reference.field.to_string(),
                    missing: reference.target,
                });
            }
        }
    }
}

fn resolves(snapshot: &Snapshot, target: &EntityRef) -> bool {
    let id = EntityId::new(target.key.as_str());
    match target.kind {
        EntityKind::Cluster => snapshot.clusters.contains_key(&id),
        EntityKind::PluginGroup => snapshot.plugin_groups.contains_key(&id),
        EntityKind::Listener => snapshot.listeners.contains_key(&id),
        EntityKind::Resource => snapshot.resources.contains_key(&id),
        EntityKind::Method => snapshot
            .methods
            .keys()
            .any(|key| key.to_string() == target.key),
    }
}
