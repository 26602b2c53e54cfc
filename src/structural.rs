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

//! Archetype graph and entity migration
//!
//! [`Storage`] owns every archetype plus the three indices. Adding or
//! removing a component moves the entity's row to the neighbouring
//! archetype: shared columns are moved bitwise, the vacated row is filled
//! with the last row of the source archetype, and the swapped entity's
//! record is updated. Transitions are memoized on both archetypes.

use std::cell::RefCell;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};

#[cfg(feature = "profiling")]
use tracing::info_span;
use tracing::{debug, trace};

use crate::archetype::{canonicalize, Archetype, ArchetypeId, ArchetypeSignature};
use crate::column::Column;
use crate::component::{Component, ComponentId, ComponentInfo, ComponentRegistry};
use crate::config::StoreConfig;
use crate::entity::{Entity, EntityIndex, EntityRecord};
use crate::error::{EcsError, Result};
use crate::index::{ArchetypeIndex, ComponentIndex};
use crate::query::QueryCache;

/// Borrow two distinct archetypes mutably
fn pair_mut(
    archetypes: &mut [Archetype],
    a: ArchetypeId,
    b: ArchetypeId,
) -> (&mut Archetype, &mut Archetype) {
    let (a, b) = (a.index(), b.index());
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = archetypes.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = archetypes.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

/// Archetype arena, lookup indices and the query cache
pub struct Storage {
    pub(crate) config: StoreConfig,
    pub(crate) registry: ComponentRegistry,
    pub(crate) archetypes: Vec<Archetype>,
    pub(crate) archetype_index: ArchetypeIndex,
    pub(crate) component_index: ComponentIndex,
    pub(crate) entities: EntityIndex,
    pub(crate) query_cache: RefCell<QueryCache>,
}

/// Column pushes for a row that has no entity yet. Unless committed, the
/// pushes are dropped again, including when a `Clone` impl panics.
struct PendingRow<'a> {
    columns: &'a mut [Column],
    len: usize,
    committed: bool,
}

impl<'a> PendingRow<'a> {
    fn new(columns: &'a mut [Column]) -> Self {
        let len = columns.first().map_or(0, Column::len);
        Self {
            columns,
            len,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingRow<'_> {
    fn drop(&mut self) {
        if !self.committed {
            for column in self.columns.iter_mut() {
                column.truncate(self.len);
            }
        }
    }
}

impl Storage {
    pub fn new(config: StoreConfig) -> Self {
        let empty = Archetype::empty(ArchetypeId::EMPTY, config.initial_column_capacity);
        let mut archetype_index = ArchetypeIndex::new();
        archetype_index.insert(ArchetypeSignature::new(), ArchetypeId::EMPTY);
        let mut archetypes = Vec::with_capacity(64);
        archetypes.push(empty);
        Self {
            config,
            registry: ComponentRegistry::new(),
            archetypes,
            archetype_index,
            component_index: ComponentIndex::new(),
            entities: EntityIndex::new(),
            query_cache: RefCell::new(QueryCache::new()),
        }
    }

    #[inline]
    pub fn archetype(&self, id: ArchetypeId) -> &Archetype {
        &self.archetypes[id.index()]
    }

    pub fn record(&self, entity: Entity) -> Result<EntityRecord> {
        self.entities.get(entity).ok_or(EcsError::EntityNotFound)
    }

    /// Find the archetype for `signature`, creating it (and its columns) on
    /// first use
    pub fn get_or_create_archetype(&mut self, signature: ArchetypeSignature) -> Result<ArchetypeId> {
        if let Some(id) = self.archetype_index.get(&signature) {
            return Ok(id);
        }
        if self.archetypes.len() >= self.config.max_archetypes {
            return Err(EcsError::ArchetypeLimitExceeded(self.config.max_archetypes));
        }

        let infos = signature
            .iter()
            .map(|&id| {
                self.registry
                    .get(id)
                    .copied()
                    .ok_or(EcsError::ComponentNotPresent(self.registry.name_of(id)))
            })
            .collect::<Result<Vec<ComponentInfo>>>()?;

        let id = ArchetypeId::new(self.archetypes.len());
        let archetype = Archetype::new(
            id,
            signature.clone(),
            &infos,
            self.config.initial_column_capacity,
        )?;

        self.component_index.insert_archetype(&archetype);
        self.query_cache.get_mut().on_archetype_created(&archetype);
        self.archetype_index.insert(signature, id);
        debug!(
            archetype = id.index(),
            components = ?infos.iter().map(ComponentInfo::name).collect::<Vec<_>>(),
            "archetype created"
        );
        self.archetypes.push(archetype);
        Ok(id)
    }

    /// Archetype reached from `source` by adding `component`
    pub fn target_for_add(
        &mut self,
        source: ArchetypeId,
        component: ComponentId,
    ) -> Result<ArchetypeId> {
        if let Some(target) = self.archetype(source).edge(component).and_then(|e| e.add) {
            return Ok(target);
        }
        let signature = canonicalize(
            self.archetype(source)
                .signature()
                .iter()
                .copied()
                .chain(std::iter::once(component)),
        );
        let target = self.get_or_create_archetype(signature)?;
        self.archetypes[source.index()].edge_for(component).add = Some(target);
        self.archetypes[target.index()].edge_for(component).remove = Some(source);
        Ok(target)
    }

    /// Archetype reached from `source` by removing `component`
    pub fn target_for_remove(
        &mut self,
        source: ArchetypeId,
        component: ComponentId,
    ) -> Result<ArchetypeId> {
        if let Some(target) = self.archetype(source).edge(component).and_then(|e| e.remove) {
            return Ok(target);
        }
        let signature: ArchetypeSignature = self
            .archetype(source)
            .signature()
            .iter()
            .copied()
            .filter(|&id| id != component)
            .collect();
        let target = self.get_or_create_archetype(signature)?;
        self.archetypes[source.index()].edge_for(component).remove = Some(target);
        self.archetypes[target.index()].edge_for(component).add = Some(source);
        Ok(target)
    }

    /// Allocate an entity in the empty archetype
    pub fn spawn(&mut self) -> Entity {
        let entity = self.entities.allocate();
        let row = self.archetypes[ArchetypeId::EMPTY.index()].add_entity(entity);
        self.entities.insert(
            entity,
            EntityRecord {
                archetype: ArchetypeId::EMPTY,
                row,
            },
        );
        entity
    }

    fn invalidate(&mut self, archetype: ArchetypeId) {
        if self.config.query_cache_enabled {
            self.query_cache.get_mut().invalidate_archetype(archetype);
        }
    }

    /// Move `entity`'s row into `target`.
    ///
    /// Columns shared with `target` are moved bitwise. A source column
    /// missing from `target` is dropped, unless it is `taken.0`, in which
    /// case its bytes are moved to `taken.1`. Returns the new row; columns
    /// of `target` not present in the source are left one element short for
    /// the caller to push.
    ///
    /// # Safety
    /// `taken.1` must be valid for writing one element of `taken.0`'s type.
    unsafe fn move_entity(
        &mut self,
        entity: Entity,
        target: ArchetypeId,
        taken: Option<(ComponentId, *mut u8)>,
    ) -> Result<usize> {
        let EntityRecord {
            archetype: source,
            row,
        } = self.record(entity)?;
        if source == target {
            return Ok(row);
        }

        let (src, dst) = pair_mut(&mut self.archetypes, source, target);
        let len = src.len();
        if row >= len {
            return Err(EcsError::RowOutOfBounds { row, len });
        }
        // Nothing below can fail once capacity is in place
        dst.reserve_row()?;

        for column in src.columns_mut() {
            let id = column.component_id();
            let slot = column.element_at(row)?.as_ptr();
            match dst.column_for_mut(id) {
                Some(dst_column) => dst_column.push_from(slot),
                None => match taken {
                    Some((taken_id, out)) if taken_id == id => {
                        ptr::copy_nonoverlapping(slot, out, column.element_size());
                    }
                    _ => column.drop_at(row),
                },
            }
        }
        let new_row = dst.add_entity(entity);
        if let Some(moved) = src.forget_row(row) {
            self.entities.set_row(moved, row);
        }
        self.entities.insert(
            entity,
            EntityRecord {
                archetype: target,
                row: new_row,
            },
        );

        self.invalidate(source);
        self.invalidate(target);
        trace!(
            entity = entity.to_bits(),
            from = source.index(),
            to = target.index(),
            row = new_row,
            "entity moved"
        );
        Ok(new_row)
    }

    pub fn has_component(&self, entity: Entity, component: ComponentId) -> bool {
        self.entities
            .get(entity)
            .is_some_and(|record| self.archetype(record.archetype).has_component(component))
    }

    /// Attach `value` to `entity`, migrating it to the next archetype.
    /// Returns the entity's new row.
    pub fn insert_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<usize> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("storage.insert_component").entered();

        let info = self.registry.register::<T>();
        let source = self.record(entity)?.archetype;
        if self.archetype(source).has_component(info.id()) {
            return Err(EcsError::ComponentAlreadyPresent(info.name()));
        }
        let target = self.target_for_add(source, info.id())?;
        let row = unsafe { self.move_entity(entity, target, None)? };

        if let Some(column) = self.archetypes[target.index()].column_for_mut(info.id()) {
            column.push(value)?;
        }
        Ok(row)
    }

    /// Detach `T` from `entity` and hand the value back
    pub fn take_component<T: Component>(&mut self, entity: Entity) -> Result<T> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("storage.take_component").entered();

        let id = ComponentId::of::<T>();
        let source = self.record(entity)?.archetype;
        if !self.archetype(source).has_component(id) {
            return Err(EcsError::ComponentNotPresent(std::any::type_name::<T>()));
        }
        let target = self.target_for_remove(source, id)?;

        let mut slot = MaybeUninit::<T>::uninit();
        unsafe {
            self.move_entity(entity, target, Some((id, slot.as_mut_ptr() as *mut u8)))?;
            // Columned types were copied into the slot; column-less tags are
            // zero-sized and need no bytes
            Ok(slot.assume_init())
        }
    }

    /// Remove `entity` and compact its archetype. Returns its last record.
    pub fn despawn(&mut self, entity: Entity) -> Result<EntityRecord> {
        let record = self.entities.remove(entity).ok_or(EcsError::EntityNotFound)?;
        let archetype = &mut self.archetypes[record.archetype.index()];
        if let Some(moved) = archetype.swap_remove_row(record.row)? {
            self.entities.set_row(moved, record.row);
        }
        self.invalidate(record.archetype);
        trace!(entity = entity.to_bits(), "entity destroyed");
        Ok(record)
    }

    /// Create a new entity in `entity`'s archetype holding clones of all
    /// its components
    pub fn clone_entity(&mut self, entity: Entity) -> Result<Entity> {
        let record = self.record(entity)?;
        let registry = &self.registry;
        let archetype = &self.archetypes[record.archetype.index()];
        for column in archetype.columns() {
            let cloneable = registry
                .get(column.component_id())
                .is_some_and(ComponentInfo::is_cloneable);
            if !cloneable {
                return Err(EcsError::ComponentNotCloneable(column.info().name()));
            }
        }

        let clone = self.entities.allocate();
        let archetype = &mut self.archetypes[record.archetype.index()];
        archetype.reserve_row()?;
        let mut pending = PendingRow::new(archetype.columns_mut());
        for column in pending.columns.iter_mut() {
            if let Some(cloner) = registry.get(column.component_id()) {
                column.push_clone_of(record.row, cloner)?;
            }
        }
        pending.commit();
        let row = archetype.add_entity(clone);
        self.entities.insert(
            clone,
            EntityRecord {
                archetype: record.archetype,
                row,
            },
        );
        Ok(clone)
    }

    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        let record = self.entities.get(entity)?;
        let archetype = self.archetype(record.archetype);
        let id = ComponentId::of::<T>();
        match archetype.column_for(id) {
            Some(column) => column.get::<T>(record.row),
            None if archetype.has_component(id) && std::mem::size_of::<T>() == 0 => {
                // Tags have no storage; any aligned pointer is a valid ZST
                Some(unsafe { NonNull::<T>::dangling().as_ref() })
            }
            None => None,
        }
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let record = self.entities.get(entity)?;
        let archetype = &mut self.archetypes[record.archetype.index()];
        let id = ComponentId::of::<T>();
        if archetype.has_component(id) && archetype.column_index(id).is_none() {
            return if std::mem::size_of::<T>() == 0 {
                Some(unsafe { NonNull::<T>::dangling().as_mut() })
            } else {
                None
            };
        }
        archetype.column_for_mut(id)?.get_mut::<T>(record.row)
    }

    /// Drop every entity; archetypes, edges and indices survive
    pub fn clear(&mut self) -> Result<()> {
        for archetype in &mut self.archetypes {
            archetype.reset()?;
        }
        let cleared = self.entities.len();
        self.entities.clear();
        debug!(entities = cleared, "storage cleared");
        Ok(())
    }

    /// Reset every archetype without `keep`; returns the entities removed
    pub fn clear_except(&mut self, keep: ComponentId) -> Result<Vec<Entity>> {
        let mut removed = Vec::new();
        for archetype in &mut self.archetypes {
            if archetype.has_component(keep) || archetype.is_empty() {
                continue;
            }
            removed.extend_from_slice(archetype.entities());
            archetype.reset()?;
        }
        for &entity in &removed {
            self.entities.remove(entity);
        }
        debug!(entities = removed.len(), "storage cleared except marked");
        Ok(removed)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("archetypes", &self.archetypes.len())
            .field("entities", &self.entities.len())
            .field("components", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Position(f32, f32);
    #[derive(Debug, Clone, Default, PartialEq)]
    struct Velocity(f32, f32);
    struct Frozen;

    fn storage() -> Storage {
        Storage::new(StoreConfig::default())
    }

    #[test]
    fn test_empty_archetype_exists() {
        let storage = storage();
        assert_eq!(storage.archetypes.len(), 1);
        assert!(storage.archetype(ArchetypeId::EMPTY).signature().is_empty());
    }

    #[test]
    fn test_edges_are_memoized_both_ways() {
        let mut storage = storage();
        let e = storage.spawn();
        storage.insert_component(e, Position(1.0, 2.0)).unwrap();
        let pos_arch = storage.record(e).unwrap().archetype;
        let pos = ComponentId::of::<Position>();

        let edge = storage.archetype(ArchetypeId::EMPTY).edge(pos).unwrap();
        assert_eq!(edge.add, Some(pos_arch));
        assert_eq!(storage.archetype(pos_arch).edge(pos).unwrap().remove, Some(ArchetypeId::EMPTY));

        // Second entity takes the cached edge and creates nothing
        let f = storage.spawn();
        storage.insert_component(f, Position(0.0, 0.0)).unwrap();
        assert_eq!(storage.archetypes.len(), 2);
    }

    #[test]
    fn test_move_keeps_shared_data_and_compacts_source() {
        let mut storage = storage();
        let a = storage.spawn();
        let b = storage.spawn();
        storage.insert_component(a, Position(1.0, 1.0)).unwrap();
        storage.insert_component(b, Position(2.0, 2.0)).unwrap();

        storage.insert_component(a, Velocity(9.0, 9.0)).unwrap();
        assert_eq!(storage.get::<Position>(a), Some(&Position(1.0, 1.0)));
        assert_eq!(storage.get::<Velocity>(a), Some(&Velocity(9.0, 9.0)));
        // b was the last row of the source and now fills row 0
        assert_eq!(storage.record(b).unwrap().row, 0);
        assert_eq!(storage.get::<Position>(b), Some(&Position(2.0, 2.0)));
    }

    #[test]
    fn test_take_component_returns_value() {
        let mut storage = storage();
        let e = storage.spawn();
        storage.insert_component(e, Position(3.0, 4.0)).unwrap();
        storage.insert_component(e, Frozen).unwrap();
        assert!(storage.get::<Frozen>(e).is_some());

        assert_eq!(storage.take_component::<Position>(e).unwrap(), Position(3.0, 4.0));
        assert!(storage.take_component::<Frozen>(e).is_ok());
        assert_eq!(storage.record(e).unwrap().archetype, ArchetypeId::EMPTY);
        assert_eq!(
            storage.take_component::<Frozen>(e).err(),
            Some(EcsError::ComponentNotPresent(std::any::type_name::<Frozen>()))
        );
    }

    #[test]
    fn test_archetype_limit() {
        let mut storage = Storage::new(StoreConfig::default().with_max_archetypes(2));
        let e = storage.spawn();
        storage.insert_component(e, Position::default()).unwrap();
        assert_eq!(
            storage.insert_component(e, Velocity::default()),
            Err(EcsError::ArchetypeLimitExceeded(2))
        );
        // Failed transition leaves the entity where it was
        assert_eq!(storage.get::<Position>(e), Some(&Position::default()));
    }
}
