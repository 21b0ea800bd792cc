//! Entity definitions and their intra-entity validation.

use std::collections::HashSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Detach, Entity, EntityId, EntityKind, EntityRef, FieldError, MethodKey, Reference};

const MAX_IDENTIFIER_LEN: usize = 128;

/// Gateway-level metadata carried in every snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaseInfo {
    pub name: String,
    pub description: String,
}

impl Default for BaseInfo {
    fn default() -> Self {
        Self {
            name: "gateway".to_string(),
            description: String::new(),
        }
    }
}

impl BaseInfo {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "must not be empty"));
        }
        errors
    }
}

// --- Cluster ---

/// Load-balancing policy applied by the gateway to a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LbPolicy {
    #[default]
    RoundRobin,
    LeastConnections,
    Random,
    ConsistentHash,
}

/// One backend server of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Endpoint {
    /// `host:port`
    pub address: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Active health check parameters for a cluster's endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthCheck {
    pub path: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            interval_secs: 10,
            timeout_secs: 5,
            healthy_threshold: 2,
            unhealthy_threshold: 3,
        }
    }
}

/// A named group of backend endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Cluster {
    pub id: String,
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub lb_policy: LbPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
}

impl Entity for Cluster {
    type Key = EntityId;
    const KIND: EntityKind = EntityKind::Cluster;

    fn key(&self) -> EntityId {
        EntityId::new(&self.id)
    }

    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        check_identifier(&mut errors, "id", &self.id);

        if self.endpoints.is_empty() {
            errors.push(FieldError::new("endpoints", "must contain at least one endpoint"));
        }
        let mut seen = HashSet::new();
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            let field = format!("endpoints[{i}].address");
            check_host_port(&mut errors, &field, &endpoint.address);
            if !seen.insert(endpoint.address.as_str()) {
                errors.push(FieldError::new(field, "duplicate endpoint"));
            }
            if endpoint.weight == 0 {
                errors.push(FieldError::new(format!("endpoints[{i}].weight"), "must be at least 1"));
            }
        }

        if let Some(hc) = &self.health_check {
            if !hc.path.starts_with('/') {
                errors.push(FieldError::new("health_check.path", "must start with `/`"));
            }
            if hc.interval_secs == 0 {
                errors.push(FieldError::new("health_check.interval_secs", "must be greater than 0"));
            }
            if hc.timeout_secs == 0 || hc.timeout_secs >= hc.interval_secs {
                errors.push(FieldError::new(
                    "health_check.timeout_secs",
                    "must be greater than 0 and less than interval_secs",
                ));
            }
            if hc.healthy_threshold == 0 {
                errors.push(FieldError::new("health_check.healthy_threshold", "must be at least 1"));
            }
            if hc.unhealthy_threshold == 0 {
                errors.push(FieldError::new("health_check.unhealthy_threshold", "must be at least 1"));
            }
        }
        errors
    }

    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    fn detach(&mut self, _target: &EntityRef) -> Detach {
        Detach::Detached
    }
}

// --- PluginGroup ---

/// A single plugin configuration inside a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plugin {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: Value,
}

fn default_enabled() -> bool {
    true
}

/// An ordered plugin chain that listeners, resources and methods can attach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginGroup {
    pub id: String,
    #[serde(default)]
    pub plugins: Vec<Plugin>,
}

impl Entity for PluginGroup {
    type Key = EntityId;
    const KIND: EntityKind = EntityKind::PluginGroup;

    fn key(&self) -> EntityId {
        EntityId::new(&self.id)
    }

    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        check_identifier(&mut errors, "id", &self.id);

        let mut seen = HashSet::new();
        for (i, plugin) in self.plugins.iter().enumerate() {
            let field = format!("plugins[{i}].name");
            if plugin.name.trim().is_empty() {
                errors.push(FieldError::new(field, "must not be empty"));
            } else if !seen.insert(plugin.name.as_str()) {
                errors.push(FieldError::new(field, "duplicate plugin in group"));
            }
        }
        errors
    }

    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    fn detach(&mut self, _target: &EntityRef) -> Detach {
        Detach::Detached
    }
}

// --- Listener ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    Http,
    Https,
    Http2,
    Tcp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerTls {
    pub cert_path: String,
    pub key_path: String,
}

/// A network entry point of the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Listener {
    pub id: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<ListenerTls>,
    pub clusters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_group: Option<String>,
}

impl Entity for Listener {
    type Key = EntityId;
    const KIND: EntityKind = EntityKind::Listener;

    fn key(&self) -> EntityId {
        EntityId::new(&self.id)
    }

    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        check_identifier(&mut errors, "id", &self.id);
        check_host(&mut errors, "address", &self.address);

        if self.port == 0 {
            errors.push(FieldError::new("port", "must be between 1 and 65535"));
        }
        match (&self.protocol, &self.tls) {
            (Protocol::Https, None) => {
                errors.push(FieldError::new("tls", "required when protocol is https"));
            }
            (_, Some(tls)) => {
                if tls.cert_path.trim().is_empty() {
                    errors.push(FieldError::new("tls.cert_path", "must not be empty"));
                }
                if tls.key_path.trim().is_empty() {
                    errors.push(FieldError::new("tls.key_path", "must not be empty"));
                }
            }
            _ => {}
        }

        if self.clusters.is_empty() {
            errors.push(FieldError::new("clusters", "must reference at least one cluster"));
        }
        let mut seen = HashSet::new();
        for (i, cluster) in self.clusters.iter().enumerate() {
            let field = format!("clusters[{i}]");
            check_identifier(&mut errors, &field, cluster);
            if !seen.insert(cluster.as_str()) {
                errors.push(FieldError::new(field, "duplicate cluster reference"));
            }
        }
        if let Some(group) = &self.plugin_group {
            check_identifier(&mut errors, "plugin_group", group);
        }
        errors
    }

    fn references(&self) -> Vec<Reference> {
        let mut refs: Vec<Reference> = self
            .clusters
            .iter()
            .map(|c| Reference::new("clusters", EntityKind::Cluster, c))
            .collect();
        if let Some(group) = &self.plugin_group {
            refs.push(Reference::new("plugin_group", EntityKind::PluginGroup, group));
        }
        refs
    }

    fn detach(&mut self, target: &EntityRef) -> Detach {
        match target.kind {
            EntityKind::Cluster => {
                self.clusters.retain(|c| *c != target.key);
                if self.clusters.is_empty() {
                    return Detach::Remove;
                }
            }
            EntityKind::PluginGroup => {
                if self.plugin_group.as_deref() == Some(target.key.as_str()) {
                    self.plugin_group = None;
                }
            }
            _ => {}
        }
        Detach::Detached
    }
}

// --- Resource ---

/// An exposed URL path pattern served by a listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Resource {
    /// URL path pattern, e.g. `/api/v1/users`.
    pub id: String,
    pub listener: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_group: Option<String>,
}

impl Entity for Resource {
    type Key = EntityId;
    const KIND: EntityKind = EntityKind::Resource;

    fn key(&self) -> EntityId {
        EntityId::new(&self.id)
    }

    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        check_path_pattern(&mut errors, "id", &self.id);
        check_identifier(&mut errors, "listener", &self.listener);
        if let Some(group) = &self.plugin_group {
            check_identifier(&mut errors, "plugin_group", group);
        }
        errors
    }

    fn references(&self) -> Vec<Reference> {
        let mut refs = vec![Reference::new("listener", EntityKind::Listener, &self.listener)];
        if let Some(group) = &self.plugin_group {
            refs.push(Reference::new("plugin_group", EntityKind::PluginGroup, group));
        }
        refs
    }

    fn detach(&mut self, target: &EntityRef) -> Detach {
        match target.kind {
            EntityKind::Listener if self.listener == target.key => Detach::Remove,
            EntityKind::PluginGroup => {
                if self.plugin_group.as_deref() == Some(target.key.as_str()) {
                    self.plugin_group = None;
                }
                Detach::Detached
            }
            _ => Detach::Detached,
        }
    }
}

// --- Method ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherSource {
    Header,
    Query,
    Path,
}

/// An extra request predicate evaluated by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Matcher {
    pub source: MatcherSource,
    pub name: String,
    pub value: String,
}

/// Where a matched request goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MethodTarget {
    Cluster {
        cluster: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Handled entirely by the attached plugin group.
    PluginChain,
}

/// An HTTP method exposed on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Method {
    pub resource: String,
    pub id: String,
    pub verb: HttpVerb,
    #[serde(default)]
    pub matchers: Vec<Matcher>,
    pub target: MethodTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_group: Option<String>,
}

impl Entity for Method {
    type Key = MethodKey;
    const KIND: EntityKind = EntityKind::Method;

    fn key(&self) -> MethodKey {
        MethodKey::new(&self.resource, &self.id)
    }

    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        check_path_pattern(&mut errors, "resource", &self.resource);
        let before = errors.len();
        check_identifier(&mut errors, "id", &self.id);
        // `#` separates resource and id in rendered method keys.
        if errors.len() == before && self.id.contains('#') {
            errors.push(FieldError::new("id", "must not contain `#`"));
        }

        for (i, matcher) in self.matchers.iter().enumerate() {
            if matcher.name.trim().is_empty() {
                errors.push(FieldError::new(format!("matchers[{i}].name"), "must not be empty"));
            }
        }
        match &self.target {
            MethodTarget::Cluster {
                cluster,
                timeout_ms,
            } => {
                check_identifier(&mut errors, "target.cluster", cluster);
                if *timeout_ms == Some(0) {
                    errors.push(FieldError::new("target.timeout_ms", "must be greater than 0"));
                }
            }
            MethodTarget::PluginChain => {
                if self.plugin_group.is_none() {
                    errors.push(FieldError::new(
                        "plugin_group",
                        "required when target is plugin_chain",
                    ));
                }
            }
        }
        if let Some(group) = &self.plugin_group {
            check_identifier(&mut errors, "plugin_group", group);
        }
        errors
    }

    fn references(&self) -> Vec<Reference> {
        let mut refs = vec![Reference::new("resource", EntityKind::Resource, &self.resource)];
        if let MethodTarget::Cluster { cluster, .. } = &self.target {
            refs.push(Reference::new("target.cluster", EntityKind::Cluster, cluster));
        }
        if let Some(group) = &self.plugin_group {
            refs.push(Reference::new("plugin_group", EntityKind::PluginGroup, group));
        }
        refs
    }

    fn detach(&mut self, target: &EntityRef) -> Detach {
        match target.kind {
            EntityKind::Resource if self.resource == target.key => Detach::Remove,
            EntityKind::Cluster => match &self.target {
                MethodTarget::Cluster { cluster, .. } if *cluster == target.key => Detach::Remove,
                _ => Detach::Detached,
            },
            EntityKind::PluginGroup if self.plugin_group.as_deref() == Some(target.key.as_str()) => {
                if self.target == MethodTarget::PluginChain {
                    return Detach::Remove;
                }
                self.plugin_group = None;
                Detach::Detached
            }
            _ => Detach::Detached,
        }
    }
}

// --- field checks ---

fn check_identifier(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.is_empty() {
        errors.push(FieldError::new(field, "must not be empty"));
    } else if value.len() > MAX_IDENTIFIER_LEN {
        errors.push(FieldError::new(
            field,
            format!("must be at most {MAX_IDENTIFIER_LEN} characters"),
        ));
    } else if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        errors.push(FieldError::new(field, "must not contain whitespace"));
    }
}

fn check_path_pattern(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    let before = errors.len();
    check_identifier(errors, field, value);
    if errors.len() == before && !value.starts_with('/') {
        errors.push(FieldError::new(field, "must be a path starting with `/`"));
    }
}

fn check_host(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.is_empty() {
        errors.push(FieldError::new(field, "must not be empty"));
        return;
    }
    let is_ip = value.parse::<IpAddr>().is_ok();
    let is_hostname = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if !is_ip && !is_hostname {
        errors.push(FieldError::new(field, "must be an IP address or hostname"));
    }
}

fn check_host_port(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    match value.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            if !matches!(port.parse::<u16>(), Ok(p) if p > 0) {
                errors.push(FieldError::new(field, "port must be between 1 and 65535"));
            }
        }
        _ => errors.push(FieldError::new(field, "must be in `host:port` form")),
    }
}
