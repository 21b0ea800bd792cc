//! Ordered push batches.
//!
//! A batch upserts every kind in dependency order, then prunes entities the
//! snapshot no longer contains in reverse order. A target applying the stages
//! in sequence never holds a reference to something it does not have.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::model::{
    BaseInfo, Cluster, EntityKind, Listener, Method, PluginGroup, ReleaseScope, Resource,
};
use crate::store::{Snapshot, Stored};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PushStage {
    Base { base: BaseInfo },
    Upsert { kind: EntityKind, entities: Vec<Value> },
    /// Remove everything of `kind` whose key is not in `keep`.
    Prune { kind: EntityKind, keep: Vec<Value> },
}

impl PushStage {
    pub fn describe(&self) -> String {
        match self {
            PushStage::Base { .. } => "base".to_string(),
            PushStage::Upsert { kind, entities } => format!("upsert {kind} ({})", entities.len()),
            PushStage::Prune { kind, .. } => format!("prune {kind}"),
        }
    }
}

/// Everything one target has to apply for a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushBatch {
    pub release_id: Uuid,
    pub scope: ReleaseScope,
    /// Published version this batch becomes once committed.
    pub version: u64,
    pub draft_revision: u64,
    pub stages: Vec<PushStage>,
}

impl PushBatch {
    pub fn build(
        release_id: Uuid,
        scope: ReleaseScope,
        version: u64,
        snapshot: &Snapshot,
    ) -> Result<Self, serde_json::Error> {
        let stages = vec![
            PushStage::Base {
                base: snapshot.base.clone(),
            },
            upsert::<Cluster>(snapshot)?,
            upsert::<PluginGroup>(snapshot)?,
            upsert::<Listener>(snapshot)?,
            upsert::<Resource>(snapshot)?,
            upsert::<Method>(snapshot)?,
            prune::<Method>(snapshot)?,
            prune::<Resource>(snapshot)?,
            prune::<Listener>(snapshot)?,
            prune::<PluginGroup>(snapshot)?,
            prune::<Cluster>(snapshot)?,
        ];

        Ok(Self {
            release_id,
            scope,
            version,
            draft_revision: snapshot.revision,
            stages,
        })
    }
}

fn upsert<E: Stored>(snapshot: &Snapshot) -> Result<PushStage, serde_json::Error> {
    let entities = E::section(snapshot)
        .values()
        .map(serde_json::to_value)
        .collect::<Result<_, _>>()?;
    Ok(PushStage::Upsert {
        kind: E::KIND,
        entities,
    })
}

fn prune<E: Stored>(snapshot: &Snapshot) -> Result<PushStage, serde_json::Error> {
    let keep = E::section(snapshot)
        .values()
        .map(|e| serde_json::to_value(e.key()))
        .collect::<Result<_, _>>()?;
    Ok(PushStage::Prune { kind: E::KIND, keep })
}
