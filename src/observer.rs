//! Per-entity component change observers

use std::any::Any;

use ahash::AHashMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::component::{Component, ComponentId};
use crate::entity::Entity;

/// Which change an observer reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverKind {
    /// Component newly attached
    OnAdd,
    /// Value written through `set`
    OnSet,
    /// Component detached; the callback sees the removed value
    OnRemove,
}

new_key_type! {
    /// Handle returned by `World::observe`
    pub struct ObserverId;
}

/// Type-erased observer callback
pub type ObserverFn = Box<dyn FnMut(Entity, &dyn Any) + Send>;

type ObserverKey = (Entity, ComponentId, ObserverKind);

struct ObserverEntry {
    key: ObserverKey,
    callback: ObserverFn,
}

/// Registry that manages all observers
#[derive(Default)]
pub struct ObserverRegistry {
    observers: SlotMap<ObserverId, ObserverEntry>,
    by_key: AHashMap<ObserverKey, SmallVec<[ObserverId; 2]>>,
    by_entity: AHashMap<Entity, SmallVec<[ObserverId; 4]>>,
}

impl ObserverRegistry {
    /// Create new registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type-erased callback
    pub fn register(
        &mut self,
        entity: Entity,
        component: ComponentId,
        kind: ObserverKind,
        callback: ObserverFn,
    ) -> ObserverId {
        let key = (entity, component, kind);
        let id = self.observers.insert(ObserverEntry { key, callback });
        self.by_key.entry(key).or_default().push(id);
        self.by_entity.entry(entity).or_default().push(id);
        id
    }

    /// Register a callback receiving the typed component value
    pub fn register_typed<T, F>(&mut self, entity: Entity, kind: ObserverKind, mut f: F) -> ObserverId
    where
        T: Component,
        F: FnMut(Entity, &T) + Send + 'static,
    {
        let callback: ObserverFn = Box::new(move |entity, value| {
            if let Some(value) = value.downcast_ref::<T>() {
                f(entity, value);
            }
        });
        self.register(entity, ComponentId::of::<T>(), kind, callback)
    }

    /// Unregister observer by id
    pub fn unregister(&mut self, id: ObserverId) -> bool {
        let Some(entry) = self.observers.remove(id) else {
            return false;
        };
        if let Some(ids) = self.by_key.get_mut(&entry.key) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_key.remove(&entry.key);
            }
        }
        let entity = entry.key.0;
        if let Some(ids) = self.by_entity.get_mut(&entity) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_entity.remove(&entity);
            }
        }
        true
    }

    /// Anyone listening for this change?
    pub fn is_observed(&self, entity: Entity, component: ComponentId, kind: ObserverKind) -> bool {
        self.by_key.contains_key(&(entity, component, kind))
    }

    /// Run every callback registered for (entity, component, kind).
    /// Returns the number of callbacks invoked.
    pub fn notify(
        &mut self,
        entity: Entity,
        component: ComponentId,
        kind: ObserverKind,
        value: &dyn Any,
    ) -> usize {
        let Some(ids) = self.by_key.get(&(entity, component, kind)) else {
            return 0;
        };
        let mut called = 0;
        for id in ids.clone() {
            if let Some(entry) = self.observers.get_mut(id) {
                (entry.callback)(entity, value);
                called += 1;
            }
        }
        called
    }

    /// Drop every registration for `entity` without firing
    pub fn remove_entity(&mut self, entity: Entity) -> usize {
        let Some(ids) = self.by_entity.remove(&entity) else {
            return 0;
        };
        for &id in &ids {
            if let Some(entry) = self.observers.remove(id) {
                self.by_key.remove(&entry.key);
            }
        }
        ids.len()
    }

    /// Get number of registered observers
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Clear all observers
    pub fn clear(&mut self) {
        self.observers.clear();
        self.by_key.clear();
        self.by_entity.clear();
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, PartialEq)]
    struct Health(u32);

    #[test]
    fn test_observer_registry_creation() {
        let registry = ObserverRegistry::new();
        assert_eq!(registry.observer_count(), 0);
    }

    #[test]
    fn test_notify_typed_callback() {
        let mut registry = ObserverRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let entity = Entity::from_bits(7);

        let sink = seen.clone();
        registry.register_typed::<Health, _>(entity, ObserverKind::OnSet, move |e, hp| {
            sink.lock().unwrap().push((e, hp.0));
        });

        let other = Entity::from_bits(8);
        let health_id = ComponentId::of::<Health>();
        assert_eq!(registry.notify(other, health_id, ObserverKind::OnSet, &Health(1)), 0);
        assert_eq!(registry.notify(entity, health_id, ObserverKind::OnAdd, &Health(1)), 0);
        assert_eq!(registry.notify(entity, health_id, ObserverKind::OnSet, &Health(42)), 1);
        assert_eq!(*seen.lock().unwrap(), vec![(entity, 42)]);
    }

    #[test]
    fn test_unregister_and_remove_entity() {
        let mut registry = ObserverRegistry::new();
        let entity = Entity::from_bits(1);
        let a = registry.register_typed::<Health, _>(entity, ObserverKind::OnAdd, |_, _| {});
        registry.register_typed::<Health, _>(entity, ObserverKind::OnRemove, |_, _| {});
        registry.register_typed::<Health, _>(Entity::from_bits(2), ObserverKind::OnAdd, |_, _| {});

        assert!(registry.unregister(a));
        assert!(!registry.unregister(a));
        assert!(!registry.is_observed(entity, ComponentId::of::<Health>(), ObserverKind::OnAdd));

        assert_eq!(registry.remove_entity(entity), 1);
        assert_eq!(registry.observer_count(), 1);
    }

    #[test]
    fn test_remove_entity_leaves_other_entities_alone() {
        let mut registry = ObserverRegistry::new();
        let doomed = Entity::from_bits(3);
        let kept = Entity::from_bits(4);
        let health = ComponentId::of::<Health>();
        for _ in 0..3 {
            registry.register_typed::<Health, _>(doomed, ObserverKind::OnSet, |_, _| {});
        }
        let keep = registry.register_typed::<Health, _>(kept, ObserverKind::OnSet, |_, _| {});

        assert_eq!(registry.remove_entity(doomed), 3);
        assert_eq!(registry.remove_entity(doomed), 0);
        assert!(!registry.is_observed(doomed, health, ObserverKind::OnSet));
        assert_eq!(registry.notify(kept, health, ObserverKind::OnSet, &Health(1)), 1);

        // Unregistering by id keeps the per-entity list in step
        assert!(registry.unregister(keep));
        assert_eq!(registry.remove_entity(kept), 0);
        assert_eq!(registry.observer_count(), 0);
    }
}
