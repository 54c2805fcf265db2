#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Enemy detection tick: live re-targeting of enemies on their way to a target.
//!
//! Movement and attacks are resolved by the world every tick. This system only
//! revisits the choice of target, on its own interval:
//!
//! * an enemy heading for a turret switches to another turret only when the
//!   candidate is closer by more than the hysteresis margin;
//! * an enemy heading for the cafe turns toward any turret that entered its
//!   detection range.

use std::time::Duration;

use cafe_defence_core::{
    nearest_within, Command, EnemySnapshot, EnemyState, EnemyView, Event, TargetRef, TurretId,
    TurretState, TurretView, Vec2,
};
use cafe_defence_scheduler::{CancellationToken, Periodic, TaskError};
use log::debug;

/// Configuration parameters required to construct the detection system.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    detection_interval: Duration,
    hysteresis: f32,
}

impl Config {
    /// Creates a configuration running every `detection_interval`, switching
    /// turret targets only for candidates more than `hysteresis` units closer.
    #[must_use]
    pub const fn new(detection_interval: Duration, hysteresis: f32) -> Self {
        Self {
            detection_interval,
            hysteresis,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), 1.0)
    }
}

const TASK: &str = "enemy detection";

/// Periodic re-targeting of enemies against the current turret population.
#[derive(Debug)]
pub struct EnemyTargeting {
    cadence: Periodic,
    token: CancellationToken,
    hysteresis: f32,
    turret_workspace: Vec<(TurretId, Vec2)>,
    pending: Vec<Command>,
}

impl EnemyTargeting {
    /// Creates a new detection system using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            cadence: Periodic::new(TASK, config.detection_interval),
            token: CancellationToken::new(),
            hysteresis: config.hysteresis.max(0.0),
            turret_workspace: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Stops the detection loop.
    pub fn stop(&mut self) {
        self.token.cancel();
    }

    /// Consumes tick events and emits `Command::RetargetEnemy` for enemies
    /// whose target should change on this detection tick.
    ///
    /// A run that finds a living enemy engaging a turret missing from the
    /// snapshot emits nothing and waits out the backoff before trying again.
    pub fn handle(
        &mut self,
        events: &[Event],
        turrets: &TurretView,
        enemies: &EnemyView,
        out: &mut Vec<Command>,
    ) {
        let elapsed = events.iter().fold(Duration::ZERO, |total, event| match event {
            Event::TimeAdvanced { dt } => total.saturating_add(*dt),
            _ => total,
        });
        if elapsed.is_zero() {
            return;
        }

        let Self {
            cadence,
            token,
            hysteresis,
            turret_workspace,
            pending,
        } = self;
        pending.clear();
        let _ = cadence.advance(elapsed, token, || {
            turret_workspace.clear();
            turret_workspace.extend(
                turrets
                    .iter()
                    .filter(|turret| turret.state != TurretState::Destroyed)
                    .map(|turret| (turret.id, turret.position)),
            );
            detect(turrets, enemies, turret_workspace.as_slice(), *hysteresis, pending)
        });
        out.append(pending);
    }
}

fn detect(
    view: &TurretView,
    enemies: &EnemyView,
    turrets: &[(TurretId, Vec2)],
    hysteresis: f32,
    pending: &mut Vec<Command>,
) -> Result<(), TaskError> {
    let mut commands = Vec::new();
    for enemy in enemies.iter().filter(|enemy| enemy.state.is_alive()) {
        if let (true, Some(TargetRef::Turret(current))) =
            (enemy.state.is_engaging_turret(), enemy.target)
        {
            if view.get(current).is_none() {
                return Err(TaskError::new(
                    TASK,
                    format!(
                        "enemy {} engages turret {} missing from the snapshot",
                        enemy.id.get(),
                        current.get()
                    ),
                ));
            }
        }

        if let Some(target) = reconsider(enemy, turrets, hysteresis) {
            debug!("enemy {} detected turret {}", enemy.id.get(), target.get());
            commands.push(Command::RetargetEnemy {
                enemy: enemy.id,
                target: TargetRef::Turret(target),
            });
        }
    }
    *pending = commands;
    Ok(())
}

fn reconsider(
    enemy: &EnemySnapshot,
    turrets: &[(TurretId, Vec2)],
    hysteresis: f32,
) -> Option<TurretId> {
    let (candidate, candidate_distance) =
        nearest_within(enemy.position, enemy.detection_range, turrets.iter().copied())?;

    match (enemy.state, enemy.target) {
        (EnemyState::MovingToCafe, _) => Some(candidate),
        (EnemyState::MovingToTurret, Some(TargetRef::Turret(current))) => {
            if current == candidate {
                return None;
            }
            let current_distance = turrets
                .iter()
                .find(|(turret, _)| *turret == current)
                .map(|(_, position)| enemy.position.distance(*position));
            match current_distance {
                Some(distance) if candidate_distance + hysteresis >= distance => None,
                _ => Some(candidate),
            }
        }
        _ => None,
    }
}

impl Default for EnemyTargeting {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cafe_defence_core::{EnemyId, EnemyKind, Health, TurretKind, TurretSnapshot};

    fn tick() -> Vec<Event> {
        vec![Event::TimeAdvanced {
            dt: Duration::from_millis(16),
        }]
    }

    fn turret(id: u32, position: Vec2) -> TurretSnapshot {
        let stats = TurretKind::Basic.stats();
        TurretSnapshot {
            id: TurretId::new(id),
            kind: TurretKind::Basic,
            state: TurretState::Idle,
            position,
            orientation: 0.0,
            health: Health::new(stats.max_hp),
            stats,
            target: None,
            ready_in: Duration::ZERO,
        }
    }

    fn enemy(state: EnemyState, target: Option<TargetRef>) -> EnemySnapshot {
        EnemySnapshot {
            id: EnemyId::new(1),
            kind: EnemyKind::Grunt,
            state,
            position: Vec2::ZERO,
            health: Health::new(30.0),
            target,
            detection_range: 8.0,
        }
    }

    fn run(turrets: Vec<TurretSnapshot>, enemy: EnemySnapshot) -> Vec<Command> {
        let mut system = EnemyTargeting::default();
        let mut out = Vec::new();
        system.handle(
            &tick(),
            &TurretView::from_snapshots(turrets),
            &EnemyView::from_snapshots(vec![enemy]),
            &mut out,
        );
        out
    }

    #[test]
    fn hysteresis_keeps_the_current_turret() {
        let out = run(
            vec![turret(1, Vec2::new(5.0, 0.0)), turret(2, Vec2::new(-4.5, 0.0))],
            enemy(
                EnemyState::MovingToTurret,
                Some(TargetRef::Turret(TurretId::new(1))),
            ),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn clearly_closer_turret_replaces_the_target() {
        let out = run(
            vec![turret(1, Vec2::new(5.0, 0.0)), turret(2, Vec2::new(-3.0, 0.0))],
            enemy(
                EnemyState::MovingToTurret,
                Some(TargetRef::Turret(TurretId::new(1))),
            ),
        );
        assert_eq!(
            out,
            vec![Command::RetargetEnemy {
                enemy: EnemyId::new(1),
                target: TargetRef::Turret(TurretId::new(2)),
            }]
        );
    }

    #[test]
    fn attacking_and_dying_enemies_keep_their_target() {
        for state in [
            EnemyState::Spawning,
            EnemyState::AttackingTurret,
            EnemyState::AttackingCafe,
            EnemyState::Dying,
        ] {
            let out = run(
                vec![turret(4, Vec2::new(1.0, 0.0))],
                enemy(state, Some(TargetRef::Cafe)),
            );
            assert!(out.is_empty(), "{state:?} should not be retargeted");
        }
    }

    #[test]
    fn turrets_out_of_detection_range_are_ignored() {
        let out = run(
            vec![turret(4, Vec2::new(9.0, 0.0))],
            enemy(EnemyState::MovingToCafe, Some(TargetRef::Cafe)),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn engaging_a_vanished_turret_backs_off() {
        let mut system = EnemyTargeting::new(Config::new(Duration::from_millis(250), 1.0));
        let stranded = EnemySnapshot {
            position: Vec2::new(30.0, 0.0),
            ..enemy(
                EnemyState::AttackingTurret,
                Some(TargetRef::Turret(TurretId::new(9))),
            )
        };
        let heading_home = EnemySnapshot {
            id: EnemyId::new(2),
            ..enemy(EnemyState::MovingToCafe, Some(TargetRef::Cafe))
        };
        let turrets = TurretView::from_snapshots(vec![turret(4, Vec2::new(1.0, 0.0))]);
        let advance = |system: &mut EnemyTargeting, millis: u64, enemies: Vec<EnemySnapshot>| {
            let mut out = Vec::new();
            system.handle(
                &[Event::TimeAdvanced {
                    dt: Duration::from_millis(millis),
                }],
                &turrets,
                &EnemyView::from_snapshots(enemies),
                &mut out,
            );
            out
        };

        assert!(advance(&mut system, 16, vec![stranded, heading_home]).is_empty());
        assert!(advance(&mut system, 1_000, vec![heading_home]).is_empty());
        assert_eq!(
            advance(&mut system, 250, vec![heading_home]),
            vec![Command::RetargetEnemy {
                enemy: EnemyId::new(2),
                target: TargetRef::Turret(TurretId::new(4)),
            }]
        );
    }
}
