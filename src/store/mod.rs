//! Configuration store.
//!
//! # Data Flow
//! ```text
//! admin CRUD ──▶ DraftTier (DashMap per kind) ──▶ draft.json
//!                     │
//!          snapshot_draft (exclusive gate)
//!                     ▼
//!              Release Coordinator
//!                     │ commit_published
//!                     ▼
//! ArcSwap<PublishedSnapshot> ◀── published/vN.json + CURRENT
//! ```
//!
//! # Design Decisions
//! - Draft writes only run intra-entity checks; references resolve at release
//! - `commit_published` is the only way into the published tier
//! - Files are written before the in-memory pointer moves

pub mod draft;
pub mod persist;
pub mod snapshot;

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::config::schema::StoreConfig;
use crate::error::{AdminError, AdminResult};
use crate::model::patch::merge_patch;
use crate::model::{
    BaseInfo, Cluster, Entity, EntityId, EntityRef, Listener, Method, MethodKey, PluginGroup,
    Resource, Tier,
};
use crate::observability::metrics;

pub use draft::{DeleteOutcome, DraftTables};
pub use persist::{PersistError, Persistence};
pub use snapshot::{CommitMeta, PublishedSnapshot, PublishedSummary, Snapshot};

use draft::DraftTier;

/// Binds an entity kind to its draft table and snapshot section.
pub trait Stored: Entity {
    fn table(tables: &DraftTables) -> &DashMap<Self::Key, Self>;
    fn section(snapshot: &Snapshot) -> &BTreeMap<Self::Key, Self>;
}

impl Stored for Cluster {
    fn table(tables: &DraftTables) -> &DashMap<EntityId, Self> {
        &tables.clusters
    }
    fn section(snapshot: &Snapshot) -> &BTreeMap<EntityId, Self> {
        &snapshot.clusters
    }
}

impl Stored for PluginGroup {
    fn table(tables: &DraftTables) -> &DashMap<EntityId, Self> {
        &tables.plugin_groups
    }
    fn section(snapshot: &Snapshot) -> &BTreeMap<EntityId, Self> {
        &snapshot.plugin_groups
    }
}

impl Stored for Listener {
    fn table(tables: &DraftTables) -> &DashMap<EntityId, Self> {
        &tables.listeners
    }
    fn section(snapshot: &Snapshot) -> &BTreeMap<EntityId, Self> {
        &snapshot.listeners
    }
}

impl Stored for Resource {
    fn table(tables: &DraftTables) -> &DashMap<EntityId, Self> {
        &tables.resources
    }
    fn section(snapshot: &Snapshot) -> &BTreeMap<EntityId, Self> {
        &snapshot.resources
    }
}

impl Stored for Method {
    fn table(tables: &DraftTables) -> &DashMap<MethodKey, Self> {
        &tables.methods
    }
    fn section(snapshot: &Snapshot) -> &BTreeMap<MethodKey, Self> {
        &snapshot.methods
    }
}

/// Owner of the draft and published tiers.
pub struct ConfigStore {
    draft: DraftTier,
    published: ArcSwap<PublishedSnapshot>,
    /// Newest first.
    history: RwLock<VecDeque<Arc<PublishedSnapshot>>>,
    history_limit: usize,
    commit_lock: Mutex<()>,
    persistence: Option<Persistence>,
}

impl ConfigStore {
    pub fn in_memory(history_limit: usize) -> Self {
        let genesis = Arc::new(PublishedSnapshot::genesis());
        Self {
            draft: DraftTier::default(),
            published: ArcSwap::new(genesis.clone()),
            history: RwLock::new(VecDeque::from([genesis])),
            history_limit: history_limit.max(1),
            commit_lock: Mutex::new(()),
            persistence: None,
        }
    }

    /// Open the store described by `config`, recovering both tiers from disk
    /// when a data directory is configured.
    pub fn open(config: &StoreConfig) -> AdminResult<Self> {
        let Some(data_dir) = &config.data_dir else {
            tracing::warn!("No store.data_dir configured, configuration is kept in memory only");
            return Ok(Self::in_memory(config.history_limit));
        };

        let persistence = Persistence::open(data_dir)?;
        let draft = persistence.load_draft()?.unwrap_or_default();
        let current = persistence
            .load_current()?
            .unwrap_or_else(PublishedSnapshot::genesis);

        let history_limit = config.history_limit.max(1);
        let mut history = VecDeque::new();
        let oldest = current
            .version
            .saturating_sub(history_limit as u64 - 1)
            .max(1);
        for version in (oldest..current.version).rev() {
            match persistence.load_version(version) {
                Ok(Some(snapshot)) => history.push_back(Arc::new(snapshot)),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(version, error = %e, "Skipping unreadable published version");
                    break;
                }
            }
        }

        tracing::info!(
            draft_revision = draft.revision,
            published_version = current.version,
            "Configuration store recovered"
        );
        metrics::record_published_version(current.version);

        let current = Arc::new(current);
        history.push_front(current.clone());

        Ok(Self {
            draft: DraftTier::from_snapshot(draft),
            published: ArcSwap::new(current),
            history: RwLock::new(history),
            history_limit,
            commit_lock: Mutex::new(()),
            persistence: Some(persistence),
        })
    }

    // ===== Reads =====

    /// Every entity of kind `E` in `tier`, sorted by key.
    pub fn list<E: Stored>(&self, tier: Tier) -> Vec<E> {
        match tier {
            Tier::Draft => {
                let mut items: Vec<E> = E::table(self.draft.tables())
                    .iter()
                    .map(|entry| entry.value().clone())
                    .collect();
                items.sort_by_key(|e| e.key());
                items
            }
            Tier::Published => E::section(&self.published.load().config)
                .values()
                .cloned()
                .collect(),
        }
    }

    pub fn detail<E: Stored>(&self, key: &E::Key, tier: Tier) -> AdminResult<E> {
        let found = match tier {
            Tier::Draft => E::table(self.draft.tables())
                .get(key)
                .map(|entry| entry.value().clone()),
            Tier::Published => E::section(&self.published.load().config).get(key).cloned(),
        };
        found.ok_or_else(|| AdminError::not_found(E::KIND, key))
    }

    pub fn base_info(&self, tier: Tier) -> BaseInfo {
        match tier {
            Tier::Draft => self.draft.tables().base.read().clone(),
            Tier::Published => self.published.load().config.base.clone(),
        }
    }

    // ===== Draft mutations =====

    pub fn create<E: Stored>(&self, entity: E) -> AdminResult<E> {
        let errors = entity.validate();
        if !errors.is_empty() {
            return Err(AdminError::invalid(E::KIND.as_str(), errors));
        }

        let created = self.mutate(E::KIND.as_str(), "create", |tables| {
            match E::table(tables).entry(entity.key()) {
                Entry::Occupied(_) => Err(AdminError::already_exists(E::KIND, entity.key())),
                Entry::Vacant(slot) => {
                    slot.insert(entity.clone());
                    Ok(entity.clone())
                }
            }
        })?;

        tracing::debug!(kind = %E::KIND, key = %created.key(), "Draft entity created");
        Ok(created)
    }

    /// Apply a JSON merge patch to the draft entity at `key`.
    pub fn update<E: Stored>(&self, key: &E::Key, patch: &Value) -> AdminResult<E> {
        let kind = E::KIND.as_str();
        if !patch.is_object() {
            return Err(AdminError::invalid_field(
                kind,
                "body",
                "merge patch must be a JSON object",
            ));
        }

        let updated = self.mutate(kind, "update", |tables| {
            let mut entry = E::table(tables)
                .get_mut(key)
                .ok_or_else(|| AdminError::not_found(E::KIND, key))?;

            let updated: E = apply_patch(kind, entry.value(), patch)?;
            let new_key = updated.key();
            if &new_key != key {
                return Err(AdminError::invalid_field(
                    kind,
                    "key",
                    format!("cannot change `{key}` to `{new_key}`, delete and re-create instead"),
                ));
            }
            let errors = updated.validate();
            if !errors.is_empty() {
                return Err(AdminError::invalid(kind, errors));
            }

            *entry.value_mut() = updated.clone();
            Ok(updated)
        })?;

        Ok(updated)
    }

    /// Delete a draft entity.
    ///
    /// Without `cascade`, any draft referrer blocks the delete. With it,
    /// referrers are detached or removed transitively.
    pub fn delete<E: Stored>(&self, key: &E::Key, cascade: bool) -> AdminResult<DeleteOutcome> {
        let target = EntityRef::new(E::KIND, key);

        let outcome = self.mutate(E::KIND.as_str(), "delete", |tables| {
            let table = E::table(tables);
            if !table.contains_key(key) {
                return Err(AdminError::not_found(E::KIND, key));
            }
            if !cascade {
                let referrers = tables.referrers_of(&target);
                if !referrers.is_empty() {
                    return Err(AdminError::ReferentialConflict {
                        target: target.clone(),
                        referrers,
                    });
                }
            }
            if table.remove(key).is_none() {
                return Err(AdminError::not_found(E::KIND, key));
            }

            let mut outcome = DeleteOutcome {
                removed: vec![target.clone()],
                detached: Vec::new(),
            };
            if cascade {
                tables.cascade_from(target.clone(), &mut outcome);
            }
            Ok(outcome)
        })?;

        tracing::info!(
            entity = %target,
            cascade,
            removed = outcome.removed.len(),
            detached = outcome.detached.len(),
            "Draft entity deleted"
        );
        Ok(outcome)
    }

    pub fn set_base_info(&self, patch: &Value) -> AdminResult<BaseInfo> {
        if !patch.is_object() {
            return Err(AdminError::invalid_field(
                "base",
                "body",
                "merge patch must be a JSON object",
            ));
        }

        let updated = self.mutate("base", "update", |tables| {
            let mut base = tables.base.write();
            let updated: BaseInfo = apply_patch("base", &*base, patch)?;
            let errors = updated.validate();
            if !errors.is_empty() {
                return Err(AdminError::invalid("base", errors));
            }
            *base = updated.clone();
            Ok(updated)
        })?;

        Ok(updated)
    }

    /// Apply a draft write. With a data directory the write only lands in
    /// memory once `draft.json` holds it.
    fn mutate<T>(
        &self,
        kind: &'static str,
        op_name: &'static str,
        op: impl Fn(&DraftTables) -> AdminResult<T>,
    ) -> AdminResult<T> {
        let out = match &self.persistence {
            Some(persistence) => self.draft.write_durable(op, |next| {
                persistence.write_draft(next)?;
                Ok(())
            }),
            None => self.draft.write(op),
        }
        .inspect_err(|e| {
            if matches!(e, AdminError::Storage(_)) {
                tracing::error!(kind, op = op_name, error = %e, "Draft write not persisted, change discarded");
            }
        })?;
        metrics::record_store_mutation(kind, op_name);
        Ok(out)
    }

    // ===== Tier transfer =====

    /// Consistent point-in-time copy of the whole draft tier.
    pub fn snapshot_draft(&self) -> Snapshot {
        self.draft.snapshot()
    }

    /// Number of successful draft writes so far.
    pub fn draft_revision(&self) -> u64 {
        self.draft.revision()
    }

    pub fn published(&self) -> Arc<PublishedSnapshot> {
        self.published.load_full()
    }

    /// Append `snapshot` to the published tier as the next version.
    pub fn commit_published(
        &self,
        snapshot: Snapshot,
        meta: CommitMeta,
    ) -> AdminResult<Arc<PublishedSnapshot>> {
        let _commit = self.commit_lock.lock();

        let version = self.published.load().version + 1;
        let next = PublishedSnapshot {
            version,
            committed_at: Utc::now(),
            release: Some(meta),
            config: snapshot,
        };
        if let Some(persistence) = &self.persistence {
            persistence.write_published(&next)?;
        }

        let next = Arc::new(next);
        self.published.store(next.clone());
        {
            let mut history = self.history.write();
            history.push_front(next.clone());
            history.truncate(self.history_limit);
        }

        metrics::record_published_version(version);
        tracing::info!(
            version,
            draft_revision = next.config.revision,
            "Published configuration committed"
        );
        Ok(next)
    }

    /// Summaries of retained published versions, newest first.
    pub fn published_history(&self) -> Vec<PublishedSummary> {
        self.history.read().iter().map(|s| s.summary()).collect()
    }

    pub fn published_version(&self, version: u64) -> AdminResult<Arc<PublishedSnapshot>> {
        let current = self.published();
        if current.version == version {
            return Ok(current);
        }
        if let Some(found) = self
            .history
            .read()
            .iter()
            .find(|s| s.version == version)
            .cloned()
        {
            return Ok(found);
        }
        if version > 0 && version < current.version {
            if let Some(persistence) = &self.persistence {
                if let Some(snapshot) = persistence.load_version(version)? {
                    return Ok(Arc::new(snapshot));
                }
            }
        }
        Err(AdminError::NotFound {
            subject: "published version".to_string(),
            key: version.to_string(),
        })
    }
}

fn apply_patch<T>(subject: &str, current: &T, patch: &Value) -> AdminResult<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut doc =
        serde_json::to_value(current).map_err(|e| AdminError::Internal(e.to_string()))?;
    merge_patch(&mut doc, patch);
    serde_json::from_value(doc).map_err(|e| AdminError::invalid_field(subject, "body", e.to_string()))
}
