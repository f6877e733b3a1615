//! Instance registry - Ordered set of known instances

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use super::error::{FleetError, FleetResult};
use super::event::FleetEvent;
use super::instance::{Instance, InstanceName, SimulationInstance};
use super::notifier::StateChangeNotifier;

/// External source of truth for which instances exist
pub trait InstanceSource: Send + Sync {
    /// Current engine-side listing, in the engine's order
    fn list_instances(&self) -> Result<Vec<Arc<dyn SimulationInstance>>>;
}

/// Result of a successful reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub added: Vec<InstanceName>,
    pub removed: Vec<InstanceName>,
}

impl RefreshSummary {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Insertion-ordered instances keyed by name
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: Vec<Instance>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new instance. Rejects a name that is already tracked.
    pub fn add(&mut self, instance: Instance, notifier: &StateChangeNotifier) -> FleetResult<()> {
        if self.contains(instance.name()) {
            return Err(FleetError::DuplicateInstance(instance.name().clone()));
        }

        let name = instance.name().clone();
        self.instances.push(instance);
        info!("Registered instance {}", name);
        notifier.emit(FleetEvent::changed(&name, format!("Instance {} added", name)));
        Ok(())
    }

    /// Stop tracking an instance
    pub fn remove(
        &mut self,
        name: &InstanceName,
        notifier: &StateChangeNotifier,
    ) -> FleetResult<Instance> {
        let index = self
            .position(name)
            .ok_or_else(|| FleetError::InstanceNotFound(name.clone()))?;

        let instance = self.instances.remove(index);
        info!("Removed instance {}", name);
        notifier.emit(FleetEvent::changed(name, format!("Instance {} removed", name)));
        Ok(instance)
    }

    /// Tracked instances in insertion order
    pub fn enumerate(&self) -> &[Instance] {
        &self.instances
    }

    pub fn get(&self, name: &InstanceName) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name() == name)
    }

    pub fn contains(&self, name: &InstanceName) -> bool {
        self.position(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Reconcile with the external listing.
    ///
    /// Already-tracked names are left in place, new names are appended in
    /// listing order, and names missing upstream are pruned. If the listing
    /// cannot be read the registry is left untouched and an issue is emitted.
    pub fn refresh(
        &mut self,
        source: &dyn InstanceSource,
        notifier: &StateChangeNotifier,
    ) -> FleetResult<RefreshSummary> {
        let listing = match source.list_instances() {
            Ok(listing) => listing,
            Err(e) => {
                let error = FleetError::RegistrySync(format!("{:#}", e));
                notifier.emit(FleetEvent::issue(error.clone()));
                return Err(error);
            }
        };

        let mut upstream = Vec::with_capacity(listing.len());
        let mut upstream_names = HashSet::with_capacity(listing.len());
        for handle in listing {
            let instance = Instance::new(handle);
            if upstream_names.insert(instance.name().clone()) {
                upstream.push(instance);
            } else {
                debug!("Ignoring duplicate upstream entry {}", instance.name());
            }
        }

        let mut summary = RefreshSummary::default();

        let stale: Vec<InstanceName> = self
            .instances
            .iter()
            .filter(|i| !upstream_names.contains(i.name()))
            .map(|i| i.name().clone())
            .collect();
        for name in stale {
            self.remove(&name, notifier)?;
            summary.removed.push(name);
        }

        for instance in upstream {
            if self.contains(instance.name()) {
                continue;
            }
            let name = instance.name().clone();
            self.add(instance, notifier)?;
            summary.added.push(name);
        }

        debug!(
            "Refresh complete: {} added, {} removed, {} tracked",
            summary.added.len(),
            summary.removed.len(),
            self.instances.len()
        );
        Ok(summary)
    }

    fn position(&self, name: &InstanceName) -> Option<usize> {
        self.instances.iter().position(|i| i.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::OperatingState;
    use crate::core::testing::{EventLog, FakeInstance, ScriptedSource};

    fn names(registry: &InstanceRegistry) -> Vec<&str> {
        registry.enumerate().iter().map(|i| i.name().as_str()).collect()
    }

    #[test]
    fn add_keeps_insertion_order_and_emits() {
        let (notifier, log) = EventLog::attached();
        let mut registry = InstanceRegistry::new();

        for name in ["PLC_3", "PLC_1", "PLC_2"] {
            registry
                .add(Instance::new(FakeInstance::new(name, OperatingState::Off)), &notifier)
                .unwrap();
        }

        assert_eq!(names(&registry), vec!["PLC_3", "PLC_1", "PLC_2"]);
        assert_eq!(log.changed_count(), 3);
    }

    #[test]
    fn add_rejects_duplicate_identity() {
        let notifier = StateChangeNotifier::new();
        let mut registry = InstanceRegistry::new();
        registry
            .add(Instance::new(FakeInstance::new("PLC_1", OperatingState::Off)), &notifier)
            .unwrap();

        let err = registry
            .add(Instance::new(FakeInstance::new("PLC_1", OperatingState::Run)), &notifier)
            .unwrap_err();

        assert!(matches!(err, FleetError::DuplicateInstance(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_unknown_name_fails_without_event() {
        let (notifier, log) = EventLog::attached();
        let mut registry = InstanceRegistry::new();

        let err = registry
            .remove(&InstanceName::from("ghost"), &notifier)
            .unwrap_err();

        assert!(matches!(err, FleetError::InstanceNotFound(_)));
        assert!(log.events().is_empty());
    }

    #[test]
    fn refresh_adds_new_and_prunes_missing() {
        let (notifier, log) = EventLog::attached();
        let source = ScriptedSource::new(vec![
            FakeInstance::new("PLC_1", OperatingState::Off),
            FakeInstance::new("PLC_2", OperatingState::Stop),
        ]);
        let mut registry = InstanceRegistry::new();

        registry.refresh(&source, &notifier).unwrap();
        assert_eq!(names(&registry), vec!["PLC_1", "PLC_2"]);

        source.set(vec![
            FakeInstance::new("PLC_2", OperatingState::Stop),
            FakeInstance::new("PLC_3", OperatingState::Run),
        ]);
        let summary = registry.refresh(&source, &notifier).unwrap();

        assert_eq!(names(&registry), vec!["PLC_2", "PLC_3"]);
        assert_eq!(summary.added, vec![InstanceName::from("PLC_3")]);
        assert_eq!(summary.removed, vec![InstanceName::from("PLC_1")]);
        assert_eq!(log.changed_count(), 4);
    }

    #[test]
    fn refresh_is_idempotent() {
        let (notifier, log) = EventLog::attached();
        let source = ScriptedSource::new(vec![FakeInstance::new("PLC_1", OperatingState::Off)]);
        let mut registry = InstanceRegistry::new();

        registry.refresh(&source, &notifier).unwrap();
        let before = log.events().len();
        let summary = registry.refresh(&source, &notifier).unwrap();

        assert!(summary.is_unchanged());
        assert_eq!(registry.len(), 1);
        assert_eq!(log.events().len(), before);
    }

    #[test]
    fn refresh_collapses_duplicate_upstream_names() {
        let notifier = StateChangeNotifier::new();
        let source = ScriptedSource::new(vec![
            FakeInstance::new("PLC_1", OperatingState::Off),
            FakeInstance::new("PLC_1", OperatingState::Run),
        ]);
        let mut registry = InstanceRegistry::new();

        registry.refresh(&source, &notifier).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&InstanceName::from("PLC_1")).unwrap().state(),
            OperatingState::Off
        );
    }

    #[test]
    fn failed_listing_leaves_registry_untouched() {
        let (notifier, log) = EventLog::attached();
        let source = ScriptedSource::new(vec![FakeInstance::new("PLC_1", OperatingState::Run)]);
        let mut registry = InstanceRegistry::new();
        registry.refresh(&source, &notifier).unwrap();

        source.fail_with("runtime manager not reachable");
        let err = registry.refresh(&source, &notifier).unwrap_err();

        assert!(matches!(err, FleetError::RegistrySync(_)));
        assert_eq!(names(&registry), vec!["PLC_1"]);
        assert_eq!(log.issue_count(), 1);
    }
}
