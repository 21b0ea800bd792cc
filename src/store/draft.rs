//! The mutable draft tier.
//!
//! # Concurrency
//! - One `DashMap` per kind: writes to the same key are serialised by the
//!   shard lock, writes to different keys run in parallel
//! - Every write holds the shared side of `gate` for its whole duration;
//!   `snapshot` takes the exclusive side, so it observes each write entirely
//!   or not at all
//! - Durable writes take the exclusive side instead: the change is staged on
//!   a copy, the copy goes to disk, and only then is the change applied to
//!   the live tables
//! - Cross-kind reference checks on delete are not atomic with concurrent
//!   creates in other tables; a dangling reference that slips through is
//!   caught by release validation

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::{AdminError, AdminResult};
use crate::model::{
    BaseInfo, Cluster, Detach, EntityId, EntityRef, Listener, Method, MethodKey,
    PluginGroup, Resource,
};
use crate::store::snapshot::Snapshot;
use crate::store::Stored;

/// Per-kind draft tables.
#[derive(Debug, Default)]
pub struct DraftTables {
    pub(crate) base: RwLock<BaseInfo>,
    pub(crate) clusters: DashMap<EntityId, Cluster>,
    pub(crate) plugin_groups: DashMap<EntityId, PluginGroup>,
    pub(crate) listeners: DashMap<EntityId, Listener>,
    pub(crate) resources: DashMap<EntityId, Resource>,
    pub(crate) methods: DashMap<MethodKey, Method>,
}

/// What a delete removed or rewired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub removed: Vec<EntityRef>,
    pub detached: Vec<EntityRef>,
}

impl DraftTables {
    fn load(snapshot: Snapshot) -> Self {
        Self {
            base: RwLock::new(snapshot.base),
            clusters: snapshot.clusters.into_iter().collect(),
            plugin_groups: snapshot.plugin_groups.into_iter().collect(),
            listeners: snapshot.listeners.into_iter().collect(),
            resources: snapshot.resources.into_iter().collect(),
            methods: snapshot.methods.into_iter().collect(),
        }
    }

    fn capture(&self, revision: u64) -> Snapshot {
        Snapshot {
            revision,
            taken_at: Utc::now(),
            base: self.base.read().clone(),
            clusters: self.collect::<Cluster>(),
            plugin_groups: self.collect::<PluginGroup>(),
            listeners: self.collect::<Listener>(),
            resources: self.collect::<Resource>(),
            methods: self.collect::<Method>(),
        }
    }

    fn collect<E: Stored>(&self) -> BTreeMap<E::Key, E> {
        E::table(self)
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Every draft entity holding a reference to `target`, sorted.
    pub fn referrers_of(&self, target: &EntityRef) -> Vec<EntityRef> {
        // Clusters and plugin groups hold no references.
        let mut found = Vec::new();
        self.referrers_in::<Listener>(target, &mut found);
        self.referrers_in::<Resource>(target, &mut found);
        self.referrers_in::<Method>(target, &mut found);
        found.sort();
        found
    }

    fn referrers_in<E: Stored>(&self, target: &EntityRef, found: &mut Vec<EntityRef>) {
        found.extend(
            E::table(self)
                .iter()
                .filter(|entry| entry.value().refers_to(target))
                .map(|entry| entry.value().entity_ref()),
        );
    }

    /// Detach or transitively remove everything that referenced `root`.
    pub fn cascade_from(&self, root: EntityRef, outcome: &mut DeleteOutcome) {
        let mut pending = vec![root];
        while let Some(target) = pending.pop() {
            self.detach_in::<Listener>(&target, outcome, &mut pending);
            self.detach_in::<Resource>(&target, outcome, &mut pending);
            self.detach_in::<Method>(&target, outcome, &mut pending);
        }
    }

    fn detach_in<E: Stored>(
        &self,
        target: &EntityRef,
        outcome: &mut DeleteOutcome,
        pending: &mut Vec<EntityRef>,
    ) {
        let table = E::table(self);
        let keys: Vec<E::Key> = table
            .iter()
            .filter(|entry| entry.value().refers_to(target))
            .map(|entry| entry.key().clone())
            .collect();

        for key in keys {
            let verdict = {
                let Some(mut entry) = table.get_mut(&key) else {
                    continue;
                };
                entry.value_mut().detach(target)
            };
            let entity = EntityRef::new(E::KIND, &key);
            match verdict {
                Detach::Detached => {
                    if !outcome.detached.contains(&entity) {
                        outcome.detached.push(entity);
                    }
                }
                Detach::Remove => {
                    if table.remove(&key).is_some() {
                        outcome.detached.retain(|e| *e != entity);
                        outcome.removed.push(entity.clone());
                        pending.push(entity);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct DraftTier {
    gate: RwLock<()>,
    tables: DraftTables,
    revision: AtomicU64,
}

impl DraftTier {
    pub(crate) fn from_snapshot(snapshot: Snapshot) -> Self {
        let revision = snapshot.revision;
        Self {
            gate: RwLock::new(()),
            tables: DraftTables::load(snapshot),
            revision: AtomicU64::new(revision),
        }
    }

    /// Unsynchronised read access; readers may see either side of a write.
    pub(crate) fn tables(&self) -> &DraftTables {
        &self.tables
    }

    /// Run a mutation under the shared gate, bumping the revision on success.
    pub(crate) fn write<T>(&self, op: impl FnOnce(&DraftTables) -> AdminResult<T>) -> AdminResult<T> {
        let _shared = self.gate.read();
        let out = op(&self.tables)?;
        self.revision.fetch_add(1, Ordering::SeqCst);
        Ok(out)
    }

    /// Like [`write`](Self::write), but the tier only changes once `persist`
    /// has stored the resulting snapshot.
    ///
    /// `op` runs twice: on a staged copy, then on the live tables. Both runs
    /// see the same state because the exclusive gate is held throughout.
    pub(crate) fn write_durable<T>(
        &self,
        op: impl Fn(&DraftTables) -> AdminResult<T>,
        persist: impl FnOnce(&Snapshot) -> AdminResult<()>,
    ) -> AdminResult<T> {
        let _exclusive = self.gate.write();
        let revision = self.revision.load(Ordering::SeqCst);

        let staged = DraftTables::load(self.tables.capture(revision));
        op(&staged)?;
        persist(&staged.capture(revision + 1))?;

        let out = op(&self.tables).map_err(|e| {
            AdminError::Internal(format!("draft diverged from its persisted copy: {e}"))
        })?;
        self.revision.store(revision + 1, Ordering::SeqCst);
        Ok(out)
    }

    pub(crate) fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let _exclusive = self.gate.write();
        self.tables.capture(self.revision.load(Ordering::SeqCst))
    }
}
