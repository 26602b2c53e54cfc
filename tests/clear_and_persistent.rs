use archstore::prelude::*;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

/// Handle into an external physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BodyHandle(u32);

#[test]
fn test_clear_all_resets_but_keeps_archetypes() {
    let mut world = World::new();
    for _ in 0..10 {
        let e = world.create();
        world.add_component::<Position>(e).unwrap();
    }
    let archetypes = world.archetype_count();
    world.clear_all().unwrap();

    assert_eq!(world.entity_count(), 0);
    assert_eq!(world.archetype_count(), archetypes);
    let archetype = world.archetype_for::<(Position,)>().unwrap();
    assert!(archetype.is_empty());
    assert_eq!(archetype.columns()[0].capacity(), 2);
    assert!(world.query::<(Position,)>().is_empty());

    // The old shape is reused
    let e = world.create();
    world.add_component::<Position>(e).unwrap();
    assert_eq!(world.archetype_count(), archetypes);
    assert_eq!(world.query::<(Position,)>().len(), 1);
}

#[test]
fn test_clear_except_marked() {
    let mut world = World::new();
    let player = world.create();
    world.set(player, Position { x: 1.0, y: 1.0 }).unwrap();
    world.mark_persistent(player).unwrap();
    // Marking twice is fine
    world.mark_persistent(player).unwrap();

    let mut doomed = Vec::new();
    for i in 0..4 {
        let e = world.create();
        world.set(e, Position::default()).unwrap();
        if i % 2 == 0 {
            world.set(e, BodyHandle(i)).unwrap();
        }
        doomed.push(e);
    }

    let report = world.prepare_clear_except_marked_with::<BodyHandle>().unwrap();
    assert_eq!(report.entities.len(), 4);
    for e in &doomed {
        assert!(report.entities.contains(e));
        assert!(world.is_null(*e));
    }
    let mut handles: Vec<u32> = report.resources.iter().map(|(_, h)| h.0).collect();
    handles.sort_unstable();
    assert_eq!(handles, vec![0, 2]);

    assert!(world.is_alive(player));
    assert_eq!(
        world.get_component::<Position>(player),
        Some(&Position { x: 1.0, y: 1.0 })
    );
    assert_eq!(world.first_with_tag::<Persistent>(), Some(player));
    assert_eq!(world.entity_count(), 1);
}

#[test]
fn test_plain_clear_report_has_no_resources() {
    let mut world = World::new();
    let e = world.create();
    world.set(e, BodyHandle(7)).unwrap();
    let report = world.prepare_clear_except_marked().unwrap();
    assert_eq!(report.entities, vec![e]);
    assert!(report.resources.is_empty());
}
