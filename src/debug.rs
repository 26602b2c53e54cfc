use std::fmt::Write;

use crate::archetype::ArchetypeId;
use crate::entity::Entity;
use crate::world::World;

/// World inspector for debugging
pub struct WorldInspector;

impl WorldInspector {
    /// Get total entity count
    pub fn entity_count(world: &World) -> usize {
        world.entity_count()
    }

    /// Get archetype summary
    pub fn archetype_summary(world: &World) -> Vec<ArchetypeInfo> {
        let registry = world.component_registry();
        world
            .archetypes()
            .iter()
            .map(|archetype| ArchetypeInfo {
                id: archetype.id(),
                components: archetype
                    .signature()
                    .iter()
                    .map(|&id| registry.name_of(id))
                    .collect(),
                entity_count: archetype.len(),
                column_count: archetype.columns().len(),
                capacity: archetype.capacity(),
                bytes_used: archetype.memory_used(),
            })
            .collect()
    }

    /// Totals over every archetype
    pub fn memory_stats(world: &World) -> MemoryStats {
        let mut stats = MemoryStats {
            archetypes: world.archetype_count(),
            ..MemoryStats::default()
        };
        for archetype in world.archetypes() {
            stats.entities += archetype.len();
            stats.columns += archetype.columns().len();
            stats.bytes_used += archetype.memory_used();
            stats.bytes_reserved += archetype
                .columns()
                .iter()
                .map(|column| column.capacity().saturating_mul(column.element_size()))
                .sum::<usize>();
        }
        stats
    }

    /// Multi-line human readable summary
    pub fn summary(world: &World) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== World Summary ===");
        let _ = writeln!(out, "Entities: {}", Self::entity_count(world));
        let _ = writeln!(out, "Archetypes: {}", world.archetype_count());
        let cache = world.query_cache_stats();
        let _ = writeln!(
            out,
            "Query cache: {} entries, {} hits, {} misses, {} invalidations",
            cache.cached_queries, cache.hits, cache.misses, cache.invalidations
        );
        for info in Self::archetype_summary(world) {
            let _ = writeln!(
                out,
                "Archetype {}: {} entities, capacity {}, {} bytes [{}]",
                info.id.index(),
                info.entity_count,
                info.capacity,
                info.bytes_used,
                info.components.join(", ")
            );
        }
        out
    }

    /// Print world summary to console
    pub fn print_summary(world: &World) {
        print!("{}", Self::summary(world));
    }

    /// Print entity details
    pub fn print_entity(world: &World, entity: Entity) {
        match world.entity_record(entity) {
            Some(record) => {
                println!("=== {entity} ===");
                println!("Archetype: {}", record.archetype.index());
                println!("Row: {}", record.row);
                if let Some(archetype) = world.archetype(record.archetype) {
                    println!("Components: {} types", archetype.signature().len());
                }
            }
            None => println!("{entity} not found"),
        }
    }
}

/// Archetype information for debugging
#[derive(Clone, Debug)]
pub struct ArchetypeInfo {
    pub id: ArchetypeId,
    pub components: Vec<&'static str>,
    pub entity_count: usize,
    /// Tags have no column
    pub column_count: usize,
    pub capacity: usize,
    pub bytes_used: usize,
}

/// Whole-world memory figures
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub archetypes: usize,
    pub entities: usize,
    pub columns: usize,
    pub bytes_used: usize,
    pub bytes_reserved: usize,
}
