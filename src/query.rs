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

//! Query matching, the archetype match cache and the entity iterator
//!
//! A query names a set of required components and, optionally, a set of
//! excluded ones. Matching archetypes are found through the component
//! index and the result list is cached under a hash of the canonical key.
//! Structural moves drop every cache entry that references the source or
//! target archetype; newly created archetypes are appended to the entries
//! they satisfy.

use std::hash::{Hash, Hasher};
use std::iter::FusedIterator;

use ahash::AHashMap;
use rustc_hash::{FxHashSet, FxHasher};
use smallvec::SmallVec;
use tracing::debug;

use crate::archetype::{canonicalize, Archetype, ArchetypeId, ArchetypeSignature};
use crate::component::{ComponentId, ComponentSet};
use crate::entity::{Entity, EntityRef};
use crate::index::ComponentIndex;
use crate::world::World;

/// Hash of a canonical [`QueryKey`]
pub type QueryHash = u64;

/// Canonical query signature: sorted required and excluded component sets
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    required: ArchetypeSignature,
    excluded: ArchetypeSignature,
}

impl QueryKey {
    pub fn new<R, X>(required: R, excluded: X) -> Self
    where
        R: IntoIterator<Item = ComponentId>,
        X: IntoIterator<Item = ComponentId>,
    {
        Self {
            required: canonicalize(required),
            excluded: canonicalize(excluded),
        }
    }

    /// Key for entities having every component of `S`
    pub fn of<S: ComponentSet>() -> Self {
        Self::new(S::component_ids(), [])
    }

    /// Key for entities having all of `S` and none of `X`
    pub fn filtered<S: ComponentSet, X: ComponentSet>() -> Self {
        Self::new(S::component_ids(), X::component_ids())
    }

    pub fn required(&self) -> &[ComponentId] {
        &self.required
    }

    pub fn excluded(&self) -> &[ComponentId] {
        &self.excluded
    }

    /// Stable hash of the sorted key
    pub fn hash_value(&self) -> QueryHash {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Superset of `required` and disjoint from `excluded`
    pub fn matches(&self, archetype: &Archetype) -> bool {
        self.required.iter().all(|&id| archetype.has_component(id))
            && !self.excluded.iter().any(|&id| archetype.has_component(id))
    }

    /// Find every matching archetype, in creation order.
    ///
    /// Candidates come from the component index entry of the rarest
    /// required component; an empty requirement scans every archetype.
    pub fn resolve(&self, archetypes: &[Archetype], index: &ComponentIndex) -> Vec<ArchetypeId> {
        let rarest = self
            .required
            .iter()
            .copied()
            .min_by_key(|&id| index.count(id));

        match rarest {
            Some(id) => index
                .archetypes_with(id)
                .iter()
                .map(|record| record.archetype)
                .filter(|&arch| self.matches(&archetypes[arch.index()]))
                .collect(),
            None => archetypes
                .iter()
                .filter(|archetype| self.matches(archetype))
                .map(Archetype::id)
                .collect(),
        }
    }
}

/// Statistics about the query cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryCacheStats {
    /// Number of unique query keys cached
    pub cached_queries: usize,
    /// Sum of matched archetypes over all cached entries
    pub cached_archetype_refs: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped because an archetype they reference changed
    pub invalidations: u64,
}

#[derive(Debug)]
struct CacheEntry {
    key: QueryKey,
    archetypes: Vec<ArchetypeId>,
}

/// Query hash -> matching archetypes, plus the reverse map used for
/// targeted invalidation
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: AHashMap<QueryHash, CacheEntry>,
    by_archetype: AHashMap<ArchetypeId, FxHashSet<QueryHash>>,
    hits: u64,
    misses: u64,
    invalidations: u64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached archetype list for `key`, counting a hit or a miss
    pub fn lookup(&mut self, key: &QueryKey) -> Option<Vec<ArchetypeId>> {
        match self.entries.get(&key.hash_value()) {
            Some(entry) if entry.key == *key => {
                self.hits += 1;
                Some(entry.archetypes.clone())
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store a freshly resolved list, replacing any entry under the same hash
    pub fn insert(&mut self, key: QueryKey, archetypes: Vec<ArchetypeId>) {
        let hash = key.hash_value();
        self.remove_entry(hash);
        for &arch in &archetypes {
            self.by_archetype.entry(arch).or_default().insert(hash);
        }
        self.entries.insert(hash, CacheEntry { key, archetypes });
    }

    /// Drop every entry that references `archetype`. Returns how many went.
    pub fn invalidate_archetype(&mut self, archetype: ArchetypeId) -> usize {
        let Some(hashes) = self.by_archetype.remove(&archetype) else {
            return 0;
        };
        let mut removed = 0;
        for hash in hashes {
            if self.remove_entry(hash) {
                removed += 1;
            }
        }
        if removed > 0 {
            self.invalidations += removed as u64;
            debug!(
                archetype = archetype.index(),
                removed, "query cache entries invalidated"
            );
        }
        removed
    }

    /// Append a newly created archetype to every cached entry it satisfies
    pub fn on_archetype_created(&mut self, archetype: &Archetype) {
        let id = archetype.id();
        let mut matched: SmallVec<[QueryHash; 4]> = SmallVec::new();
        for (&hash, entry) in self.entries.iter_mut() {
            if entry.key.matches(archetype) {
                entry.archetypes.push(id);
                matched.push(hash);
            }
        }
        if !matched.is_empty() {
            self.by_archetype.entry(id).or_default().extend(matched);
        }
    }

    fn remove_entry(&mut self, hash: QueryHash) -> bool {
        let Some(entry) = self.entries.remove(&hash) else {
            return false;
        };
        for arch in entry.archetypes {
            if let Some(hashes) = self.by_archetype.get_mut(&arch) {
                hashes.remove(&hash);
                if hashes.is_empty() {
                    self.by_archetype.remove(&arch);
                }
            }
        }
        true
    }

    /// Hashes of the entries that reference `archetype`
    pub fn entries_for(&self, archetype: ArchetypeId) -> Vec<QueryHash> {
        self.by_archetype
            .get(&archetype)
            .map(|hashes| hashes.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries
            .get(&key.hash_value())
            .is_some_and(|entry| entry.key == *key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every entry. Counters survive.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_archetype.clear();
    }

    pub fn stats(&self) -> QueryCacheStats {
        QueryCacheStats {
            cached_queries: self.entries.len(),
            cached_archetype_refs: self.entries.values().map(|e| e.archetypes.len()).sum(),
            hits: self.hits,
            misses: self.misses,
            invalidations: self.invalidations,
        }
    }
}

/// Result of [`World::query`]: the matched archetypes of one call
///
/// Holds a shared borrow of the world, so no structural change can happen
/// while it is alive. Iterate as often as needed; each iteration restarts
/// from the first matched row.
pub struct Query<'w> {
    world: &'w World,
    matched: Vec<ArchetypeId>,
}

impl<'w> Query<'w> {
    pub(crate) fn new(world: &'w World, matched: Vec<ArchetypeId>) -> Self {
        Self { world, matched }
    }

    /// Fresh cursor positioned at the first row of the first archetype
    pub fn iter(&self) -> QueryIter<'_> {
        QueryIter {
            archetypes: self.world.archetypes(),
            matched: &self.matched,
            archetype_index: 0,
            row: 0,
        }
    }

    /// Entity views for every match
    pub fn refs(&self) -> impl Iterator<Item = EntityRef<'w>> + '_ {
        let world = self.world;
        self.iter().map(move |entity| world.entity(entity))
    }

    /// Matched archetypes, including ones that are currently empty
    pub fn archetypes(&self) -> &[ArchetypeId] {
        &self.matched
    }

    /// Number of matching entities
    pub fn len(&self) -> usize {
        self.matched
            .iter()
            .map(|&id| self.world.archetypes()[id.index()].len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'q> IntoIterator for &'q Query<'_> {
    type Item = Entity;
    type IntoIter = QueryIter<'q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Forward cursor over (archetype index, row) pairs of a matched list
///
/// Rows of an archetype are visited in order before moving to row 0 of the
/// next matched archetype. Empty archetypes are skipped.
#[derive(Debug, Clone)]
pub struct QueryIter<'q> {
    archetypes: &'q [Archetype],
    matched: &'q [ArchetypeId],
    archetype_index: usize,
    row: usize,
}

impl QueryIter<'_> {
    /// Current (archetype index, row) position
    pub fn position(&self) -> (usize, usize) {
        (self.archetype_index, self.row)
    }

    /// True once every matched row has been visited
    pub fn is_end(&self) -> bool {
        self.clone().next().is_none()
    }
}

impl PartialEq for QueryIter<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.matched, other.matched) && self.position() == other.position()
    }
}

impl Eq for QueryIter<'_> {}

impl Iterator for QueryIter<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        while let Some(id) = self.matched.get(self.archetype_index) {
            let entities = self.archetypes[id.index()].entities();
            if let Some(&entity) = entities.get(self.row) {
                self.row += 1;
                return Some(entity);
            }
            self.archetype_index += 1;
            self.row = 0;
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining: usize = self
            .matched
            .iter()
            .enumerate()
            .skip(self.archetype_index)
            .map(|(i, id)| {
                let len = self.archetypes[id.index()].len();
                if i == self.archetype_index {
                    len.saturating_sub(self.row)
                } else {
                    len
                }
            })
            .sum();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for QueryIter<'_> {}
impl FusedIterator for QueryIter<'_> {}
