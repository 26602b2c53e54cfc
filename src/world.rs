// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! World: the public face of the store

use std::any::Any;
use std::ptr::NonNull;

#[cfg(feature = "profiling")]
use tracing::info_span;
use tracing::debug;

use crate::archetype::{canonicalize, Archetype, ArchetypeId};
use crate::component::{Component, ComponentId, ComponentRegistry, ComponentSet};
use crate::config::StoreConfig;
use crate::entity::{Entity, EntityRecord, EntityRef};
use crate::error::{EcsError, Result};
use crate::observer::{ObserverId, ObserverKind, ObserverRegistry};
use crate::query::{Query, QueryCacheStats, QueryKey};
use crate::schedule::{Pipeline, Stage};
use crate::structural::Storage;

/// Tag for entities that survive [`World::prepare_clear_except_marked`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Persistent;

/// Entities removed by a partial clear, plus per-entity data external
/// subsystems need to release their own resources
#[derive(Debug, Clone, PartialEq)]
pub struct ClearReport<R = ()> {
    pub entities: Vec<Entity>,
    pub resources: Vec<(Entity, R)>,
}

impl<R> Default for ClearReport<R> {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
            resources: Vec::new(),
        }
    }
}

/// Central store
///
/// Holds every entity, archetype and index. All structural operations
/// take `&mut self`; references returned by component accessors borrow the
/// world and so cannot outlive the next structural change. Raw pointers
/// from [`World::component_ptr`] carry no such guarantee.
pub struct World {
    storage: Storage,
    observers: ObserverRegistry,
    pipeline: Pipeline,
    quit_requested: bool,
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            storage: Storage::new(config),
            observers: ObserverRegistry::new(),
            pipeline: Pipeline::new(),
            quit_requested: false,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.storage.config
    }

    // ========== Entity lifecycle ==========

    /// Create an entity with no components
    pub fn create(&mut self) -> Entity {
        self.storage.spawn()
    }

    /// Destroy `entity`. Returns false if it was not alive.
    ///
    /// Observers registered on the entity are dropped without firing.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.destroy").entered();

        match self.storage.despawn(entity) {
            Ok(_) => {
                self.observers.remove_entity(entity);
                true
            }
            Err(_) => false,
        }
    }

    /// True for the null handle and for entities not alive in this world
    pub fn is_null(&self, entity: Entity) -> bool {
        entity.is_null() || !self.storage.entities.contains(entity)
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        !self.is_null(entity)
    }

    /// Read-only view of `entity`
    pub fn entity(&self, entity: Entity) -> EntityRef<'_> {
        EntityRef::new(self, entity)
    }

    pub fn entity_count(&self) -> usize {
        self.storage.entities.len()
    }

    pub fn entity_record(&self, entity: Entity) -> Option<EntityRecord> {
        self.storage.entities.get(entity)
    }

    // ========== Component access ==========

    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.storage.has_component(entity, ComponentId::of::<T>())
    }

    /// Shared reference to `entity`'s `T`
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.storage.get::<T>(entity)
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.storage.get_mut::<T>(entity)
    }

    /// Raw pointer to `entity`'s `T`
    ///
    /// The pointer is only valid until the next structural change of any
    /// entity in the same archetype: adding, removing or destroying can
    /// relocate the row, and column growth can move the whole buffer.
    pub fn component_ptr<T: Component>(&mut self, entity: Entity) -> Option<NonNull<T>> {
        self.storage.get_mut::<T>(entity).map(NonNull::from)
    }

    /// Attach a default-constructed `T` and return it
    pub fn add_component<T: Component + Default>(&mut self, entity: Entity) -> Result<&mut T> {
        self.add_component_with(entity, T::default())
    }

    /// Attach `value`. Fails if the entity already has a `T`.
    pub fn add_component_with<T: Component>(&mut self, entity: Entity, value: T) -> Result<&mut T> {
        self.storage.insert_component(entity, value)?;
        self.notify::<T>(entity, ObserverKind::OnAdd);
        self.storage
            .get_mut::<T>(entity)
            .ok_or(EcsError::ComponentNotPresent(std::any::type_name::<T>()))
    }

    /// Detach `T` and return the removed value
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<T> {
        let value = self.storage.take_component::<T>(entity)?;
        let id = ComponentId::of::<T>();
        self.observers
            .notify(entity, id, ObserverKind::OnRemove, &value as &dyn Any);
        Ok(value)
    }

    /// Write `value`, adding the component first if needed
    pub fn set<T: Component>(&mut self, entity: Entity, value: T) -> Result<()> {
        match self.storage.get_mut::<T>(entity) {
            Some(slot) => *slot = value,
            None => {
                self.storage.insert_component(entity, value)?;
                self.notify::<T>(entity, ObserverKind::OnAdd);
            }
        }
        self.notify::<T>(entity, ObserverKind::OnSet);
        Ok(())
    }

    fn notify<T: Component>(&mut self, entity: Entity, kind: ObserverKind) {
        let id = ComponentId::of::<T>();
        if !self.observers.is_observed(entity, id, kind) {
            return;
        }
        if let Some(value) = self.storage.get::<T>(entity) {
            self.observers.notify(entity, id, kind, value as &dyn Any);
        }
    }

    // ========== Cloning ==========

    /// Give `T` a clone function so entities holding it can be cloned
    pub fn register_cloneable<T: Component + Clone>(&mut self) {
        self.storage.registry.register_cloneable::<T>();
    }

    /// Create a copy of `entity` with cloned component values
    pub fn clone_entity(&mut self, entity: Entity) -> Result<Entity> {
        self.storage.clone_entity(entity)
    }

    pub fn component_registry(&self) -> &ComponentRegistry {
        &self.storage.registry
    }

    // ========== Archetypes ==========

    pub fn archetypes(&self) -> &[Archetype] {
        &self.storage.archetypes
    }

    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.storage.archetypes.get(id.index())
    }

    pub fn archetype_count(&self) -> usize {
        self.storage.archetypes.len()
    }

    /// Archetype currently holding `entity`
    pub fn archetype_of(&self, entity: Entity) -> Option<&Archetype> {
        let record = self.storage.entities.get(entity)?;
        Some(self.storage.archetype(record.archetype))
    }

    /// Archetype for exactly the components of `S`, if one was created
    pub fn archetype_for<S: ComponentSet>(&self) -> Option<&Archetype> {
        let signature = canonicalize(S::component_ids());
        let id = self.storage.archetype_index.get(&signature)?;
        Some(self.storage.archetype(id))
    }

    // ========== Queries ==========

    /// Entities having every component in `S`
    pub fn query<S: ComponentSet>(&self) -> Query<'_> {
        self.query_with_key(&QueryKey::of::<S>())
    }

    /// Entities having every component in `S` and none in `X`
    pub fn filtered_query<S: ComponentSet, X: ComponentSet>(&self) -> Query<'_> {
        self.query_with_key(&QueryKey::filtered::<S, X>())
    }

    pub fn query_with_key(&self, key: &QueryKey) -> Query<'_> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.query").entered();

        let storage = &self.storage;
        if !storage.config.query_cache_enabled {
            return Query::new(
                self,
                key.resolve(&storage.archetypes, &storage.component_index),
            );
        }
        let mut cache = storage.query_cache.borrow_mut();
        let matched = match cache.lookup(key) {
            Some(matched) => matched,
            None => {
                let matched = key.resolve(&storage.archetypes, &storage.component_index);
                cache.insert(key.clone(), matched.clone());
                matched
            }
        };
        Query::new(self, matched)
    }

    /// Some entity tagged with `T`
    pub fn first_with_tag<T: Component>(&self) -> Option<Entity> {
        self.query::<(T,)>().iter().next()
    }

    pub fn query_cache_stats(&self) -> QueryCacheStats {
        self.storage.query_cache.borrow().stats()
    }

    /// Drop every cached query result
    pub fn clear_query_cache(&self) {
        self.storage.query_cache.borrow_mut().clear();
    }

    // ========== Observers ==========

    /// Call `f` when `entity`'s `T` changes as `kind` describes
    pub fn observe<T, F>(&mut self, entity: Entity, kind: ObserverKind, f: F) -> Result<ObserverId>
    where
        T: Component,
        F: FnMut(Entity, &T) + Send + 'static,
    {
        if self.is_null(entity) {
            return Err(EcsError::EntityNotFound);
        }
        Ok(self.observers.register_typed::<T, F>(entity, kind, f))
    }

    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.observer_count()
    }

    // ========== Bulk lifecycle ==========

    /// Destroy every entity. Archetypes are reset, not freed.
    pub fn clear_all(&mut self) -> Result<()> {
        self.storage.clear()?;
        self.observers.clear();
        Ok(())
    }

    /// Mark `entity` to survive partial clears
    pub fn mark_persistent(&mut self, entity: Entity) -> Result<()> {
        if self.has_component::<Persistent>(entity) {
            return Ok(());
        }
        self.storage.insert_component(entity, Persistent)?;
        Ok(())
    }

    /// Destroy every entity not tagged [`Persistent`] and report which went
    pub fn prepare_clear_except_marked(&mut self) -> Result<ClearReport> {
        let entities = self.clear_unmarked()?;
        Ok(ClearReport {
            entities,
            resources: Vec::new(),
        })
    }

    /// Like [`World::prepare_clear_except_marked`], also handing back a clone
    /// of each cleared entity's `R`
    pub fn prepare_clear_except_marked_with<R: Component + Clone>(
        &mut self,
    ) -> Result<ClearReport<R>> {
        let keep = ComponentId::of::<Persistent>();
        let resource = ComponentId::of::<R>();
        let mut resources = Vec::new();
        for archetype in &self.storage.archetypes {
            if archetype.has_component(keep) {
                continue;
            }
            if let Some(column) = archetype.column_for(resource) {
                for (row, &entity) in archetype.entities().iter().enumerate() {
                    if let Some(value) = column.get::<R>(row) {
                        resources.push((entity, value.clone()));
                    }
                }
            }
        }
        let entities = self.clear_unmarked()?;
        Ok(ClearReport {
            entities,
            resources,
        })
    }

    fn clear_unmarked(&mut self) -> Result<Vec<Entity>> {
        let removed = self
            .storage
            .clear_except(ComponentId::of::<Persistent>())?;
        for &entity in &removed {
            self.observers.remove_entity(entity);
        }
        Ok(removed)
    }

    // ========== Pipeline ==========

    /// Register `callback` under `name` for `stage`
    pub fn register_callback<F>(&mut self, name: impl Into<String>, stage: Stage, callback: F)
    where
        F: FnMut(&mut World) + Send + 'static,
    {
        self.pipeline.register(name, stage, Box::new(callback));
    }

    pub fn deregister_callback(&mut self, name: &str, stage: Stage) -> Result<()> {
        self.pipeline.deregister(name, stage)
    }

    /// Run one frame of the pipeline. Returns false once quit was requested.
    ///
    /// Callbacks registered from inside a running callback take effect on
    /// the next tick.
    pub fn tick(&mut self) -> bool {
        Pipeline::tick(self)
    }

    /// Stop the pipeline after the current frame
    pub fn request_quit(&mut self) {
        if !self.quit_requested {
            debug!("quit requested");
        }
        self.quit_requested = true;
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn frame_count(&self) -> u64 {
        self.pipeline.frames()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub(crate) fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("storage", &self.storage)
            .field("observers", &self.observers)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
