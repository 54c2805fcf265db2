use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    time::Duration,
};

use cafe_defence_core::{
    CafeDefinition, Command, EnemyGroup, EnemyKind, Event, LevelDefinition, SpawnError, Vec2,
    WaveDefinition, WaveIndex,
};
use cafe_defence_system_combination::RecipeBook;
use cafe_defence_system_spawning::{Config, Spawning};
use cafe_defence_world::{self as world, query, World, WorldConfig};

fn level(groups: Vec<EnemyGroup>) -> LevelDefinition {
    LevelDefinition {
        cafe: CafeDefinition::default(),
        spawn_points: vec![Vec2::new(25.0, 0.0)],
        waves: vec![WaveDefinition {
            index: WaveIndex::FIRST,
            origin: Vec2::new(25.0, 0.0),
            groups,
        }],
    }
}

/// Runs the world and the spawner together, returning every event observed.
fn simulate(world: &mut World, spawning: &mut Spawning, level: &LevelDefinition, ticks: usize) -> Vec<Event> {
    let mut log = Vec::new();
    let mut events = Vec::new();
    world::apply(
        world,
        Command::LaunchWave {
            wave: WaveIndex::FIRST,
        },
        &mut events,
    );
    for _ in 0..ticks {
        world::apply(
            world,
            Command::Tick {
                dt: Duration::from_millis(100),
            },
            &mut events,
        );
        let mut commands = Vec::new();
        spawning.handle(&events, level, &mut commands);
        log.append(&mut events);
        for command in commands {
            world::apply(world, command, &mut events);
        }
    }
    log.append(&mut events);
    log
}

#[test]
fn launched_wave_spawns_every_enemy_at_the_origin() {
    let level = level(vec![
        EnemyGroup {
            kind: EnemyKind::Grunt,
            count: 3,
            delay: Duration::from_millis(300),
        },
        EnemyGroup {
            kind: EnemyKind::Runner,
            count: 2,
            delay: Duration::from_millis(200),
        },
    ]);
    let mut world = World::default();
    let mut spawning = Spawning::default();

    let log = simulate(&mut world, &mut spawning, &level, 20);

    let spawned: Vec<(EnemyKind, Vec2)> = log
        .iter()
        .filter_map(|event| match event {
            Event::EnemySpawned { kind, position, .. } => Some((*kind, *position)),
            _ => None,
        })
        .collect();
    assert_eq!(
        spawned.iter().map(|(kind, _)| *kind).collect::<Vec<_>>(),
        vec![
            EnemyKind::Grunt,
            EnemyKind::Grunt,
            EnemyKind::Grunt,
            EnemyKind::Runner,
            EnemyKind::Runner,
        ]
    );
    assert!(spawned
        .iter()
        .all(|(_, position)| *position == Vec2::new(25.0, 0.0)));
    assert_eq!(query::live_enemy_count(&world), 5);
    assert_eq!(spawning.pending(), 0);
}

#[test]
fn unregistered_pool_drops_the_request() {
    let level = level(vec![
        EnemyGroup {
            kind: EnemyKind::Brute,
            count: 2,
            delay: Duration::ZERO,
        },
        EnemyGroup {
            kind: EnemyKind::Grunt,
            count: 1,
            delay: Duration::ZERO,
        },
    ]);
    let config = WorldConfig {
        enemy_kinds: vec![EnemyKind::Grunt],
        ..WorldConfig::default()
    };
    let mut world = World::new(config, CafeDefinition::default(), RecipeBook::default());
    let mut spawning = Spawning::default();

    let log = simulate(&mut world, &mut spawning, &level, 5);

    let rejected = log
        .iter()
        .filter(|event| {
            **event
                == Event::SpawnRejected {
                    kind: EnemyKind::Brute,
                    reason: SpawnError::UnregisteredPool,
                }
        })
        .count();
    assert_eq!(rejected, 2);
    assert_eq!(query::live_enemy_count(&world), 1);
}

#[test]
fn spawn_sequence_is_deterministic() {
    let fingerprint = || {
        let level = level(vec![EnemyGroup {
            kind: EnemyKind::Runner,
            count: 6,
            delay: Duration::from_millis(150),
        }]);
        let mut world = World::default();
        let mut spawning = Spawning::new(Config::new(Duration::from_millis(100), 2, 42));
        let log = simulate(&mut world, &mut spawning, &level, 15);
        let mut hasher = DefaultHasher::new();
        for event in &log {
            if let Event::EnemySpawned { enemy, kind, .. } = event {
                enemy.hash(&mut hasher);
                kind.hash(&mut hasher);
            }
        }
        hasher.finish()
    };
    assert_eq!(fingerprint(), fingerprint());
}
