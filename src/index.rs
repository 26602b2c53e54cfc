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

//! Lookup tables from components and signatures to archetypes

use ahash::AHashMap;

use crate::archetype::{Archetype, ArchetypeId, ArchetypeSignature};
use crate::component::ComponentId;

/// One archetype containing a given component, and the column it lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchetypeRecord {
    pub archetype: ArchetypeId,
    /// `None` for tag components
    pub column: Option<usize>,
}

/// Component -> every archetype that contains it, in creation order
#[derive(Debug, Default)]
pub struct ComponentIndex {
    records: AHashMap<ComponentId, Vec<ArchetypeRecord>>,
    columns: AHashMap<(ComponentId, ArchetypeId), Option<usize>>,
}

impl ComponentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every component of a freshly created archetype
    pub fn insert_archetype(&mut self, archetype: &Archetype) {
        for &id in archetype.signature() {
            let column = archetype.column_index(id);
            self.records.entry(id).or_default().push(ArchetypeRecord {
                archetype: archetype.id(),
                column,
            });
            self.columns.insert((id, archetype.id()), column);
        }
    }

    /// Archetypes containing `id`, oldest first
    pub fn archetypes_with(&self, id: ComponentId) -> &[ArchetypeRecord] {
        self.records.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Number of archetypes containing `id`
    pub fn count(&self, id: ComponentId) -> usize {
        self.records.get(&id).map_or(0, Vec::len)
    }

    /// Column position of `id` inside `archetype`.
    /// Outer `None` means the archetype lacks the component.
    pub fn column_of(&self, id: ComponentId, archetype: ArchetypeId) -> Option<Option<usize>> {
        self.columns.get(&(id, archetype)).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Canonical signature -> archetype. Never holds two equal signatures.
#[derive(Debug, Default)]
pub struct ArchetypeIndex {
    by_signature: AHashMap<ArchetypeSignature, ArchetypeId>,
}

impl ArchetypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, signature: &[ComponentId]) -> Option<ArchetypeId> {
        self.by_signature.get(signature).copied()
    }

    /// Record `signature` -> `id`. Returns the previous id if the signature
    /// was already present, leaving the existing mapping untouched.
    pub fn insert(&mut self, signature: ArchetypeSignature, id: ArchetypeId) -> Option<ArchetypeId> {
        match self.by_signature.get(&signature) {
            Some(&existing) => Some(existing),
            None => {
                self.by_signature.insert(signature, id);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_signature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_signature.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::canonicalize;
    use crate::component::ComponentInfo;

    struct Position;
    struct Hidden;

    #[derive(Clone, Copy)]
    struct Velocity(#[allow(dead_code)] f32);

    fn archetype(id: usize, infos: &mut [ComponentInfo]) -> Archetype {
        infos.sort_by_key(ComponentInfo::id);
        let signature = canonicalize(infos.iter().map(ComponentInfo::id));
        Archetype::new(ArchetypeId::new(id), signature, infos, 2).unwrap()
    }

    #[test]
    fn test_component_index_records_columns_and_tags() {
        let mut index = ComponentIndex::new();
        let a = archetype(1, &mut [ComponentInfo::of::<Velocity>()]);
        let b = archetype(
            2,
            &mut [ComponentInfo::of::<Velocity>(), ComponentInfo::of::<Hidden>()],
        );
        index.insert_archetype(&a);
        index.insert_archetype(&b);

        let velocity = ComponentId::of::<Velocity>();
        assert_eq!(index.count(velocity), 2);
        assert_eq!(index.archetypes_with(velocity)[0].archetype, a.id());
        assert_eq!(index.column_of(velocity, b.id()), Some(Some(0)));
        assert_eq!(
            index.column_of(ComponentId::of::<Hidden>(), b.id()),
            Some(None)
        );
        assert_eq!(index.column_of(ComponentId::of::<Hidden>(), a.id()), None);
        assert!(index.archetypes_with(ComponentId::of::<Position>()).is_empty());
    }

    #[test]
    fn test_archetype_index_deduplicates() {
        let mut index = ArchetypeIndex::new();
        let sig = canonicalize([ComponentId::of::<Position>(), ComponentId::of::<Hidden>()]);
        let same = canonicalize([ComponentId::of::<Hidden>(), ComponentId::of::<Position>()]);
        assert_eq!(index.insert(sig.clone(), ArchetypeId::new(3)), None);
        assert_eq!(index.insert(same.clone(), ArchetypeId::new(4)), Some(ArchetypeId::new(3)));
        assert_eq!(index.get(&same), Some(ArchetypeId::new(3)));
        assert_eq!(index.len(), 1);
    }
}
