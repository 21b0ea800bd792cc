//! Frozen configuration snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{
    BaseInfo, Cluster, EntityId, EntityKind, Listener, Method, MethodKey, PluginGroup,
    ReleaseScope, Resource,
};

/// A consistent point-in-time copy of every entity kind.
///
/// Sections serialize as arrays of entities; keys are recomputed on load.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    /// Draft revision counter at the instant the snapshot was taken.
    pub revision: u64,
    pub taken_at: DateTime<Utc>,
    pub base: BaseInfo,
    #[serde(with = "section")]
    pub clusters: BTreeMap<EntityId, Cluster>,
    #[serde(with = "section")]
    pub plugin_groups: BTreeMap<EntityId, PluginGroup>,
    #[serde(with = "section")]
    pub listeners: BTreeMap<EntityId, Listener>,
    #[serde(with = "section")]
    pub resources: BTreeMap<EntityId, Resource>,
    #[serde(with = "section")]
    pub methods: BTreeMap<MethodKey, Method>,
}

impl Snapshot {
    /// Number of entities per kind.
    pub fn counts(&self) -> BTreeMap<EntityKind, usize> {
        BTreeMap::from([
            (EntityKind::Cluster, self.clusters.len()),
            (EntityKind::PluginGroup, self.plugin_groups.len()),
            (EntityKind::Listener, self.listeners.len()),
            (EntityKind::Resource, self.resources.len()),
            (EntityKind::Method, self.methods.len()),
        ])
    }

    pub fn is_empty(&self) -> bool {
        self.counts().values().all(|n| *n == 0)
    }
}

/// Who committed a published snapshot, and through which entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMeta {
    pub release_id: Uuid,
    pub scope: ReleaseScope,
    pub committed_by: String,
}

/// One immutable entry of the published tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedSnapshot {
    pub version: u64,
    pub committed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<CommitMeta>,
    pub config: Snapshot,
}

impl PublishedSnapshot {
    /// The empty tier that exists before the first release.
    pub fn genesis() -> Self {
        Self {
            version: 0,
            committed_at: DateTime::<Utc>::default(),
            release: None,
            config: Snapshot::default(),
        }
    }

    pub fn summary(&self) -> PublishedSummary {
        PublishedSummary {
            version: self.version,
            committed_at: self.committed_at,
            release: self.release.clone(),
            draft_revision: self.config.revision,
            entities: self.config.counts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedSummary {
    pub version: u64,
    pub committed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<CommitMeta>,
    pub draft_revision: u64,
    pub entities: BTreeMap<EntityKind, usize>,
}

mod section {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use crate::model::Entity;

    pub fn serialize<E, S>(map: &BTreeMap<E::Key, E>, serializer: S) -> Result<S::Ok, S::Error>
    where
        E: Entity,
        S: Serializer,
    {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, E, D>(deserializer: D) -> Result<BTreeMap<E::Key, E>, D::Error>
    where
        E: Entity,
        D: Deserializer<'de>,
    {
        let items = Vec::<E>::deserialize(deserializer)?;
        Ok(items.into_iter().map(|e| (e.key(), e)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Endpoint, LbPolicy};

    #[test]
    fn test_snapshot_sections_serialize_as_arrays() {
        let mut snapshot = Snapshot {
            revision: 7,
            ..Snapshot::default()
        };
        snapshot.clusters.insert(
            EntityId::new("c1"),
            Cluster {
                id: "c1".to_string(),
                endpoints: vec![Endpoint {
                    address: "127.0.0.1:9000".to_string(),
                    weight: 1,
                }],
                lb_policy: LbPolicy::Random,
                health_check: None,
            },
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["clusters"].is_array());
        assert_eq!(json["clusters"][0]["id"], "c1");
        assert_eq!(json["methods"], serde_json::json!([]));

        let back: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(back.counts()[&EntityKind::Cluster], 1);
        assert!(!back.is_empty());
    }

    #[test]
    fn test_genesis_is_empty() {
        let genesis = PublishedSnapshot::genesis();
        assert_eq!(genesis.version, 0);
        assert!(genesis.config.is_empty());
        assert_eq!(genesis.summary().entities.len(), 5);
    }
}
