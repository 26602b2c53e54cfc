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

//! Entity identifiers, location records and the entity index.

use std::fmt;

use ahash::AHashMap;

use crate::archetype::{Archetype, ArchetypeId};
use crate::component::Component;
use crate::world::World;

/// Opaque 64-bit entity handle
///
/// Ids are handed out monotonically and never reused within one store.
/// [`Entity::NULL`] never refers to a live entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Entity(u64);

impl Entity {
    /// The null handle
    pub const NULL: Entity = Entity(0);

    pub fn to_bits(self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Where an entity's data lives: (archetype, row)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRecord {
    pub archetype: ArchetypeId,
    pub row: usize,
}

/// Entity -> record map plus the id generator
#[derive(Debug)]
pub struct EntityIndex {
    records: AHashMap<Entity, EntityRecord>,
    next_id: u64,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self {
            records: AHashMap::with_capacity(64),
            next_id: 1,
        }
    }

    /// Generate a fresh id. Does not insert a record.
    ///
    /// # Panics
    /// Panics if the 64-bit id space is exhausted.
    pub fn allocate(&mut self) -> Entity {
        let id = self.next_id;
        self.next_id = id
            .checked_add(1)
            .unwrap_or_else(|| panic!("Entity ID exhaustion: {id:#x} ids generated"));
        Entity(id)
    }

    pub fn insert(&mut self, entity: Entity, record: EntityRecord) {
        self.records.insert(entity, record);
    }

    pub fn get(&self, entity: Entity) -> Option<EntityRecord> {
        self.records.get(&entity).copied()
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut EntityRecord> {
        self.records.get_mut(&entity)
    }

    pub fn remove(&mut self, entity: Entity) -> Option<EntityRecord> {
        self.records.remove(&entity)
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.records.contains_key(&entity)
    }

    /// Point `entity` at a new row in the same archetype
    pub fn set_row(&mut self, entity: Entity, row: usize) {
        if let Some(record) = self.records.get_mut(&entity) {
            record.row = row;
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Forget every record. The id counter keeps running.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, EntityRecord)> + '_ {
        self.records.iter().map(|(&e, &r)| (e, r))
    }
}

impl Default for EntityIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of one entity, as yielded by [`World::entity`]
#[derive(Clone, Copy)]
pub struct EntityRef<'w> {
    world: &'w World,
    entity: Entity,
}

impl<'w> EntityRef<'w> {
    pub(crate) fn new(world: &'w World, entity: Entity) -> Self {
        Self { world, entity }
    }

    pub fn id(&self) -> Entity {
        self.entity
    }

    /// True for the null handle or an entity no longer in the store
    pub fn is_null(&self) -> bool {
        self.world.is_null(self.entity)
    }

    pub fn has<T: Component>(&self) -> bool {
        self.world.has_component::<T>(self.entity)
    }

    pub fn get<T: Component>(&self) -> Option<&'w T> {
        self.world.get_component::<T>(self.entity)
    }

    pub fn record(&self) -> Option<EntityRecord> {
        self.world.entity_record(self.entity)
    }

    pub fn archetype(&self) -> Option<&'w Archetype> {
        self.world.archetype_of(self.entity)
    }
}

impl fmt::Debug for EntityRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("entity", &self.entity)
            .field("record", &self.record())
            .finish()
    }
}
