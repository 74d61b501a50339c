use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use rill_model::InstanceName;

use crate::instance::ManagedInstance;

/// Node-local map of live instances, keyed by name.
///
/// Cheap to clone; clones share the same map. Every method takes the lock for
/// a single map operation, so readers never see a half-applied change.
#[derive(Clone, Default)]
pub struct InstanceRegistry {
    inner: Arc<Mutex<HashMap<InstanceName, Arc<ManagedInstance>>>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `instance` under its name and return the entry it replaced.
    pub fn add(&self, instance: Arc<ManagedInstance>) -> Option<Arc<ManagedInstance>> {
        self.lock().insert(instance.name().to_string(), instance)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<ManagedInstance>> {
        self.lock().remove(name)
    }

    /// Remove the entry for `instance`'s name only if it is this very instance.
    ///
    /// Returns `true` when something was removed.
    pub fn remove_if_same(&self, instance: &Arc<ManagedInstance>) -> bool {
        let mut map = self.lock();
        match map.get(instance.name()) {
            Some(current) if Arc::ptr_eq(current, instance) => {
                map.remove(instance.name());
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<ManagedInstance>> {
        self.lock().get(name).cloned()
    }

    /// Snapshot of the registered names.
    pub fn names(&self) -> BTreeSet<InstanceName> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<InstanceName, Arc<ManagedInstance>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{RecordingSink, ScriptedSource, scripted_router};

    fn instance(name: &str, registry: &InstanceRegistry) -> Arc<ManagedInstance> {
        let source = ScriptedSource::ok("{}");
        ManagedInstance::builder(
            name,
            registry.clone(),
            scripted_router(&source),
            Arc::new(RecordingSink::default()),
        )
        .build()
    }

    #[test]
    fn add_lookup_and_names() {
        let reg = InstanceRegistry::new();
        assert!(reg.is_empty());

        assert!(reg.add(instance("b", &reg)).is_none());
        assert!(reg.add(instance("a", &reg)).is_none());

        assert_eq!(reg.len(), 2);
        assert!(reg.lookup("a").is_some());
        assert!(reg.lookup("missing").is_none());
        assert_eq!(reg.names().into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn add_replaces_and_returns_previous() {
        let reg = InstanceRegistry::new();
        let first = instance("a", &reg);
        let second = instance("a", &reg);

        reg.add(first.clone());
        let prev = reg.add(second.clone()).unwrap();
        assert!(Arc::ptr_eq(&prev, &first));
        assert!(Arc::ptr_eq(&reg.lookup("a").unwrap(), &second));
    }

    #[test]
    fn remove_if_same_ignores_replaced_entries() {
        let reg = InstanceRegistry::new();
        let stale = instance("a", &reg);
        let fresh = instance("a", &reg);

        reg.add(stale.clone());
        reg.add(fresh.clone());

        assert!(!reg.remove_if_same(&stale));
        assert!(reg.lookup("a").is_some());
        assert!(reg.remove_if_same(&fresh));
        assert!(reg.lookup("a").is_none());
        assert!(reg.remove("a").is_none());
    }

    #[test]
    fn clones_share_the_map() {
        let reg = InstanceRegistry::new();
        let other = reg.clone();
        reg.add(instance("x", &reg));
        assert!(other.lookup("x").is_some());
    }
}
