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

//! Archetype storage with row allocation, swap removal and transition edges

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::column::Column;
use crate::component::{ComponentId, ComponentInfo, MAX_SET_COMPONENTS};
use crate::entity::Entity;
use crate::error::{EcsError, Result};

/// Canonical component signature: sorted and deduplicated
pub type ArchetypeSignature = SmallVec<[ComponentId; MAX_SET_COMPONENTS]>;

/// Sort and deduplicate a list of component ids
pub fn canonicalize<I: IntoIterator<Item = ComponentId>>(ids: I) -> ArchetypeSignature {
    let mut signature: ArchetypeSignature = ids.into_iter().collect();
    signature.sort_unstable();
    signature.dedup();
    signature
}

/// Stable index of an archetype in the world's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(usize);

impl ArchetypeId {
    /// The archetype with no components; always index 0
    pub const EMPTY: ArchetypeId = ArchetypeId(0);

    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Memoized neighbours reached by adding or removing one component
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchetypeEdge {
    pub add: Option<ArchetypeId>,
    pub remove: Option<ArchetypeId>,
}

/// Archetype: Structure of Arrays storage for one exact component set
///
/// `entities[row]` owns the element at `row` in every column. Tag
/// components are part of the signature but map to no column.
pub struct Archetype {
    id: ArchetypeId,
    signature: ArchetypeSignature,
    components: FxHashMap<ComponentId, Option<usize>>,
    columns: Vec<Column>,
    entities: Vec<Entity>,
    edges: FxHashMap<ComponentId, ArchetypeEdge>,
    initial_capacity: usize,
}

impl Archetype {
    /// Create an empty archetype. `infos` must describe every id in
    /// `signature`, in signature order.
    pub fn new(
        id: ArchetypeId,
        signature: ArchetypeSignature,
        infos: &[ComponentInfo],
        initial_capacity: usize,
    ) -> Result<Self> {
        debug_assert_eq!(signature.len(), infos.len());
        let mut components = FxHashMap::default();
        let mut columns = Vec::new();
        for info in infos {
            if info.is_tag() {
                components.insert(info.id(), None);
            } else {
                components.insert(info.id(), Some(columns.len()));
                columns.push(Column::new(*info, initial_capacity)?);
            }
        }
        Ok(Self {
            id,
            signature,
            components,
            columns,
            entities: Vec::with_capacity(initial_capacity),
            edges: FxHashMap::default(),
            initial_capacity,
        })
    }

    /// Archetype with no components and therefore no columns
    pub fn empty(id: ArchetypeId, initial_capacity: usize) -> Self {
        Self {
            id,
            signature: ArchetypeSignature::new(),
            components: FxHashMap::default(),
            columns: Vec::new(),
            entities: Vec::with_capacity(initial_capacity),
            edges: FxHashMap::default(),
            initial_capacity,
        }
    }

    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Get signature
    pub fn signature(&self) -> &ArchetypeSignature {
        &self.signature
    }

    #[inline]
    pub fn has_component(&self, id: ComponentId) -> bool {
        self.components.contains_key(&id)
    }

    /// Column position for `id`; `None` for tags and absent components
    #[inline]
    pub fn column_index(&self, id: ComponentId) -> Option<usize> {
        self.components.get(&id).copied().flatten()
    }

    pub fn column_for(&self, id: ComponentId) -> Option<&Column> {
        self.column_index(id).map(|idx| &self.columns[idx])
    }

    pub fn column_for_mut(&mut self, id: ComponentId) -> Option<&mut Column> {
        self.column_index(id).map(move |idx| &mut self.columns[idx])
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    /// Get all entities
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity_at(&self, row: usize) -> Result<Entity> {
        self.entities
            .get(row)
            .copied()
            .ok_or(EcsError::RowOutOfBounds {
                row,
                len: self.entities.len(),
            })
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if archetype is empty
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Make room for one more row in every column
    pub fn reserve_row(&mut self) -> Result<()> {
        for column in &mut self.columns {
            column.reserve_one()?;
        }
        Ok(())
    }

    /// Append `entity` and return its row. Column data for the row is
    /// pushed separately by the caller.
    pub fn add_entity(&mut self, entity: Entity) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        row
    }

    /// Drop the last row in every column and pop its entity
    pub fn remove_last_row(&mut self) -> Option<Entity> {
        let entity = self.entities.pop()?;
        let last = self.entities.len();
        for column in &mut self.columns {
            column.truncate(last);
        }
        Some(entity)
    }

    /// Drop row `row` and fill the hole with the last row.
    /// Returns the entity that now lives at `row`, if one was moved.
    pub fn swap_remove_row(&mut self, row: usize) -> Result<Option<Entity>> {
        let len = self.entities.len();
        if row >= len {
            return Err(EcsError::RowOutOfBounds { row, len });
        }
        for column in &mut self.columns {
            column.swap_remove(row)?;
        }
        self.entities.swap_remove(row);
        Ok(self.entities.get(row).copied())
    }

    /// Compact `row` without dropping its column values
    ///
    /// # Safety
    /// Every column value at `row` must already have been moved out or
    /// dropped.
    pub(crate) unsafe fn forget_row(&mut self, row: usize) -> Option<Entity> {
        let last = self.entities.len() - 1;
        for column in &mut self.columns {
            column.swap_remove_forget(row);
        }
        self.entities.swap_remove(row);
        if row < last {
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Cached edge for `id`, if a transition through it was taken before
    pub fn edge(&self, id: ComponentId) -> Option<ArchetypeEdge> {
        self.edges.get(&id).copied()
    }

    /// Get-or-create the edge for `id`
    pub fn edge_for(&mut self, id: ComponentId) -> &mut ArchetypeEdge {
        self.edges.entry(id).or_default()
    }

    pub fn edges(&self) -> impl Iterator<Item = (ComponentId, ArchetypeEdge)> + '_ {
        self.edges.iter().map(|(&id, &edge)| (id, edge))
    }

    /// Drop every row and shrink columns back to their initial capacity.
    /// Signature and edges survive.
    pub fn reset(&mut self) -> Result<()> {
        self.entities = Vec::with_capacity(self.initial_capacity);
        for column in &mut self.columns {
            column.allocate(self.initial_capacity)?;
        }
        Ok(())
    }

    /// Bytes occupied by live column elements
    pub fn memory_used(&self) -> usize {
        self.columns.iter().map(Column::memory_used).sum()
    }

    /// Smallest column capacity, or the entity list's for column-less archetypes
    pub fn capacity(&self) -> usize {
        self.columns
            .iter()
            .map(Column::capacity)
            .min()
            .unwrap_or(self.entities.capacity())
    }
}

impl std::fmt::Debug for Archetype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("components", &self.signature.len())
            .field("columns", &self.columns)
            .field("entities", &self.entities.len())
            .finish()
    }
}
