use std::time::Duration;

use cafe_defence_core::{
    Command, EnemyKind, EnemyState, Event, TargetRef, TurretId, TurretKind, Vec2,
};
use cafe_defence_system_enemy_targeting::{Config, EnemyTargeting};
use cafe_defence_world::{self as world, query, World};

fn step(world: &mut World, detection: &mut EnemyTargeting) -> Vec<Event> {
    let mut events = Vec::new();
    world::apply(
        world,
        Command::Tick {
            dt: Duration::from_millis(100),
        },
        &mut events,
    );
    let mut commands = Vec::new();
    detection.handle(
        &events,
        &query::turret_view(world),
        &query::enemy_view(world),
        &mut commands,
    );
    for command in commands {
        world::apply(world, command, &mut events);
    }
    events
}

fn place(world: &mut World, position: Vec2) -> TurretId {
    let mut events = Vec::new();
    world::apply(
        world,
        Command::PlaceTurret {
            kind: TurretKind::Basic,
            position,
            orientation: 0.0,
        },
        &mut events,
    );
    events
        .iter()
        .find_map(|event| match event {
            Event::TurretPlaced { turret, .. } => Some(*turret),
            _ => None,
        })
        .expect("turret placed")
}

#[test]
fn new_turret_in_detection_range_preempts_the_cafe() {
    let mut world = World::default();
    let mut detection = EnemyTargeting::new(Config::new(Duration::from_millis(250), 1.0));
    let mut events = Vec::new();
    world::apply(
        &mut world,
        Command::SpawnEnemy {
            kind: EnemyKind::Grunt,
            position: Vec2::new(30.0, 0.0),
        },
        &mut events,
    );
    let enemy = query::enemy_view(&world)
        .iter()
        .map(|snapshot| snapshot.id)
        .next()
        .expect("enemy spawned");

    let _ = step(&mut world, &mut detection);
    let snapshot = *query::enemy_view(&world).get(enemy).expect("alive");
    assert_eq!(snapshot.state, EnemyState::MovingToCafe);
    assert_eq!(snapshot.target, Some(TargetRef::Cafe));

    let turret = place(&mut world, Vec2::new(24.0, 0.0));

    let mut preempted = Vec::new();
    for _ in 0..3 {
        preempted.extend(step(&mut world, &mut detection));
    }

    assert!(preempted.contains(&Event::EnemyStateChanged {
        enemy,
        from: EnemyState::MovingToCafe,
        to: EnemyState::MovingToTurret,
    }));
    assert!(preempted.contains(&Event::EnemyRetargeted {
        enemy,
        target: TargetRef::Turret(turret),
    }));
    let snapshot = *query::enemy_view(&world).get(enemy).expect("alive");
    assert_eq!(snapshot.state, EnemyState::MovingToTurret);
    assert_eq!(snapshot.target, Some(TargetRef::Turret(turret)));
}

#[test]
fn enemies_switch_only_to_clearly_closer_turrets() {
    let mut world = World::default();
    let mut detection = EnemyTargeting::default();
    let first = place(&mut world, Vec2::new(24.0, 0.0));
    let mut events = Vec::new();
    world::apply(
        &mut world,
        Command::SpawnEnemy {
            kind: EnemyKind::Grunt,
            position: Vec2::new(30.0, 0.0),
        },
        &mut events,
    );
    let enemy = query::enemy_view(&world)
        .iter()
        .map(|snapshot| snapshot.id)
        .next()
        .expect("enemy spawned");
    let _ = step(&mut world, &mut detection);
    assert_eq!(
        query::enemy_view(&world).get(enemy).map(|snapshot| snapshot.target),
        Some(Some(TargetRef::Turret(first)))
    );

    let marginal = place(&mut world, Vec2::new(29.2, 4.6));
    let mut retargets = Vec::new();
    for _ in 0..3 {
        retargets.extend(step(&mut world, &mut detection).into_iter().filter(|event| {
            matches!(event, Event::EnemyRetargeted { enemy: id, .. } if *id == enemy)
        }));
    }
    assert!(retargets.is_empty(), "marginally closer turret must not steal the target");

    let close = place(&mut world, Vec2::new(29.0, 1.0));
    let mut switched = false;
    for _ in 0..3 {
        switched |= step(&mut world, &mut detection).contains(&Event::EnemyRetargeted {
            enemy,
            target: TargetRef::Turret(close),
        });
    }
    assert!(switched);
    assert_ne!(marginal, close);
}
