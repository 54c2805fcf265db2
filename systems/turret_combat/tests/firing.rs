use std::time::Duration;

use cafe_defence_core::{Command, EnemyKind, Event, TurretKind, Vec2};
use cafe_defence_system_turret_combat::TurretCombat;
use cafe_defence_world::{self as world, query, World};

fn apply_all(world: &mut World, commands: Vec<Command>, events: &mut Vec<Event>) {
    for command in commands {
        world::apply(world, command, events);
    }
}

#[test]
fn cannon_fires_once_per_interval_until_the_target_dies() {
    let mut world = World::default();
    let mut events = Vec::new();
    apply_all(
        &mut world,
        vec![
            Command::PlaceTurret {
                kind: TurretKind::Cannon,
                position: Vec2::new(0.0, 10.0),
                orientation: 0.0,
            },
            Command::SpawnEnemy {
                kind: EnemyKind::Grunt,
                position: Vec2::new(0.0, 15.0),
            },
        ],
        &mut events,
    );
    let turret = query::turret_view(&world)
        .iter()
        .map(|snapshot| snapshot.id)
        .next()
        .expect("turret placed");
    let enemy = query::enemy_view(&world)
        .iter()
        .map(|snapshot| snapshot.id)
        .next()
        .expect("enemy spawned");

    apply_all(
        &mut world,
        vec![
            Command::EndPlacement { turret },
            Command::Tick {
                dt: Duration::from_secs(2),
            },
            Command::SetTurretTarget {
                turret,
                target: Some(enemy),
            },
        ],
        &mut events,
    );

    let mut combat = TurretCombat::new();
    let mut fired = 0;
    let mut died = false;
    for _ in 0..40 {
        events.clear();
        world::apply(
            &mut world,
            Command::Tick {
                dt: Duration::from_millis(100),
            },
            &mut events,
        );
        let mut commands = Vec::new();
        combat.handle(&events, &query::turret_view(&world), &mut commands);
        apply_all(&mut world, commands, &mut events);

        fired += events
            .iter()
            .filter(|event| matches!(event, Event::TurretFired { .. }))
            .count();
        died |= events
            .iter()
            .any(|event| matches!(event, Event::EnemyDied { enemy: id, .. } if *id == enemy));
    }

    assert_eq!(fired, 2, "two cannon shots kill a grunt");
    assert!(died);
    assert_eq!(query::projectile_count(&world), 0);
}

#[test]
fn paused_world_never_fires() {
    let mut world = World::default();
    let mut events = Vec::new();
    world::apply(
        &mut world,
        Command::SetTimeScale { scale: 0.0 },
        &mut events,
    );
    events.clear();
    world::apply(
        &mut world,
        Command::Tick {
            dt: Duration::from_millis(100),
        },
        &mut events,
    );

    let mut combat = TurretCombat::new();
    let mut commands = Vec::new();
    combat.handle(&events, &query::turret_view(&world), &mut commands);
    assert!(events.is_empty());
    assert!(commands.is_empty());
}
