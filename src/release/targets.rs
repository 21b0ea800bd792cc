//! Hot-swappable set of gateway targets.

use std::collections::BTreeSet;
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::push::GatewayTarget;

/// The fleet a release pushes to. A release works on the list it loaded when
/// pushing started; replacements only affect later releases.
#[derive(Debug)]
pub struct TargetRegistry {
    targets: ArcSwap<Vec<GatewayTarget>>,
}

impl TargetRegistry {
    pub fn new(targets: Vec<GatewayTarget>) -> Self {
        Self {
            targets: ArcSwap::from_pointee(targets),
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<GatewayTarget>> {
        self.targets.load_full()
    }

    pub fn len(&self) -> usize {
        self.targets.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swap in a new target list, logging what changed.
    pub fn replace(&self, targets: Vec<GatewayTarget>) {
        let old = self.targets.load();
        let before: BTreeSet<&str> = old.iter().map(|t| t.name.as_str()).collect();
        let after: BTreeSet<&str> = targets.iter().map(|t| t.name.as_str()).collect();
        let added: Vec<&str> = after.difference(&before).copied().collect();
        let removed: Vec<&str> = before.difference(&after).copied().collect();

        if *old.as_ref() == targets {
            tracing::debug!("Gateway target list unchanged");
            return;
        }
        tracing::info!(
            targets = targets.len(),
            ?added,
            ?removed,
            "Gateway target list updated"
        );
        self.targets.store(Arc::new(targets));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn target(name: &str) -> GatewayTarget {
        GatewayTarget {
            name: name.to_string(),
            url: Url::parse(&format!("http://{name}.internal:9000")).unwrap(),
        }
    }

    #[test]
    fn test_replace_keeps_old_snapshot_alive() {
        let registry = TargetRegistry::new(vec![target("a")]);
        let in_flight = registry.snapshot();

        registry.replace(vec![target("a"), target("b")]);
        assert_eq!(in_flight.len(), 1);
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }
}
