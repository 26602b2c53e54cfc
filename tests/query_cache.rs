use archstore::prelude::*;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Frozen;

fn spawn_moving(world: &mut World, n: usize) -> Vec<Entity> {
    (0..n)
        .map(|i| {
            let e = world.create();
            world
                .set(
                    e,
                    Position {
                        x: i as f32,
                        y: 0.0,
                    },
                )
                .unwrap();
            world.set(e, Velocity { x: 1.0, y: 1.0 }).unwrap();
            e
        })
        .collect()
}

#[test]
fn test_query_cache_basic() {
    let mut world = World::new();
    spawn_moving(&mut world, 100);

    // First query - builds cache
    let count1 = world.query::<(Position, Velocity)>().iter().count();
    assert_eq!(count1, 100);

    let stats = world.query_cache_stats();
    assert_eq!(stats.cached_queries, 1);
    assert_eq!(stats.misses, 1);

    // Second query - served from cache, component order does not matter
    let count2 = world.query::<(Velocity, Position)>().iter().count();
    assert_eq!(count2, 100);
    assert_eq!(world.query_cache_stats().hits, 1);
    assert_eq!(world.query_cache_stats().cached_queries, 1);
}

#[test]
fn test_repeated_queries_are_identical() {
    let mut world = World::new();
    spawn_moving(&mut world, 10);
    let first = world.query::<(Position,)>().archetypes().to_vec();
    let second = world.query::<(Position,)>().archetypes().to_vec();
    assert_eq!(first, second);
}

#[test]
fn test_structural_move_invalidates_touched_entries() {
    let mut world = World::new();
    let entities = spawn_moving(&mut world, 3);
    let other = world.create();
    world.set(other, Frozen).unwrap();

    assert_eq!(world.query::<(Position, Velocity)>().len(), 3);
    assert_eq!(world.query::<(Frozen,)>().len(), 1);
    assert_eq!(world.query_cache_stats().cached_queries, 2);

    // Moving out of {Position, Velocity} drops the entry naming it but
    // leaves the unrelated Frozen entry alone
    world.remove_component::<Velocity>(entities[0]).unwrap();
    let stats = world.query_cache_stats();
    assert_eq!(stats.cached_queries, 1);
    assert!(stats.invalidations >= 1);

    // No stale results
    assert_eq!(world.query::<(Position, Velocity)>().len(), 2);
    assert_eq!(world.query::<(Frozen,)>().len(), 1);
}

#[test]
fn test_new_archetype_joins_cached_query() {
    let mut world = World::new();
    let a = world.create();
    world.set(a, Position::default()).unwrap();
    assert_eq!(world.query::<(Position,)>().len(), 1);

    // An archetype created after the query was cached must show up
    let b = world.create();
    world.set(b, Frozen).unwrap();
    world.set(b, Position::default()).unwrap();

    let found: Vec<Entity> = world.query::<(Position,)>().iter().collect();
    assert_eq!(found.len(), 2);
    assert!(found.contains(&b));
}

#[test]
fn test_emptied_archetypes_are_skipped() {
    let mut world = World::new();
    let entities = spawn_moving(&mut world, 4);
    let query_len = world.query::<(Position,)>().len();
    assert_eq!(query_len, 4);
    for e in entities {
        world.destroy(e);
    }
    let query = world.query::<(Position,)>();
    assert!(!query.archetypes().is_empty());
    assert_eq!(query.iter().next(), None);
    assert!(query.is_empty());
}

#[test]
fn test_filtered_query_excludes() {
    let mut world = World::new();
    let entities = spawn_moving(&mut world, 5);
    world.add_component::<Frozen>(entities[1]).unwrap();
    world.add_component::<Frozen>(entities[3]).unwrap();

    let active: Vec<Entity> = world
        .filtered_query::<(Position, Velocity), (Frozen,)>()
        .iter()
        .collect();
    assert_eq!(active.len(), 3);
    assert!(!active.contains(&entities[1]));
    assert!(!active.contains(&entities[3]));
}

#[test]
fn test_query_cache_clear() {
    let mut world = World::new();
    spawn_moving(&mut world, 2);
    let _ = world.query::<(Position,)>();
    world.clear_query_cache();
    assert_eq!(world.query_cache_stats().cached_queries, 0);
    assert_eq!(world.query::<(Position,)>().len(), 2);
}

#[test]
fn test_cache_disabled_still_answers() {
    let mut world = World::with_config(StoreConfig::default().with_query_cache(false));
    let entities = spawn_moving(&mut world, 3);
    assert_eq!(world.query::<(Position,)>().len(), 3);
    world.remove_component::<Position>(entities[0]).unwrap();
    assert_eq!(world.query::<(Position,)>().len(), 2);
    assert_eq!(world.query_cache_stats().cached_queries, 0);
}

#[test]
fn test_iterator_restarts_and_compares_by_position() {
    let mut world = World::new();
    spawn_moving(&mut world, 3);
    let query = world.query::<(Position,)>();

    let mut a = query.iter();
    let b = query.iter();
    assert!(a == b);
    assert_eq!(a.len(), 3);
    a.next();
    assert!(a != b);
    // The empty {Position} archetype was skipped
    assert_eq!(a.position(), (1, 1));

    // A fresh iterator starts from the beginning again
    assert_eq!(query.iter().count(), 3);
    a.by_ref().for_each(drop);
    assert!(a.is_end());
}
