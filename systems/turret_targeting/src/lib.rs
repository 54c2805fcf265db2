#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that periodically reacquires turret targets from world snapshots.
//!
//! Reacquisition runs on its own interval rather than every tick. On each run
//! every idle or active turret is pointed at the nearest living enemy within
//! its range; equidistant enemies resolve to the lowest identifier.

use std::time::Duration;

use cafe_defence_core::{nearest_within, Command, EnemyId, EnemyView, Event, TurretView, Vec2};
use cafe_defence_scheduler::{CancellationToken, Periodic, TaskError};
use log::debug;

/// Configuration parameters required to construct the targeting system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    reacquire_interval: Duration,
}

impl Config {
    /// Creates a configuration that reacquires targets every `reacquire_interval`.
    #[must_use]
    pub const fn new(reacquire_interval: Duration) -> Self {
        Self { reacquire_interval }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

const TASK: &str = "turret targeting";

/// Turret targeting system that reuses a scratch buffer between runs.
#[derive(Debug)]
pub struct TurretTargeting {
    cadence: Periodic,
    token: CancellationToken,
    enemy_workspace: Vec<(EnemyId, Vec2)>,
    pending: Vec<Command>,
}

impl TurretTargeting {
    /// Creates a new targeting system using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            cadence: Periodic::new(TASK, config.reacquire_interval),
            token: CancellationToken::new(),
            enemy_workspace: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Stops the reacquisition loop; later calls to [`Self::handle`] emit nothing.
    pub fn stop(&mut self) {
        self.token.cancel();
    }

    /// Consumes tick events and emits `Command::SetTurretTarget` for every
    /// turret whose nearest in-range enemy differs from its current target.
    ///
    /// A run that finds a turret aimed at an enemy missing from the snapshot
    /// emits nothing and waits out the backoff before trying again.
    pub fn handle(
        &mut self,
        events: &[Event],
        turrets: &TurretView,
        enemies: &EnemyView,
        out: &mut Vec<Command>,
    ) {
        let elapsed = elapsed(events);
        if elapsed.is_zero() {
            return;
        }

        let Self {
            cadence,
            token,
            enemy_workspace,
            pending,
        } = self;
        pending.clear();
        let _ = cadence.advance(elapsed, token, || {
            reacquire(turrets, enemies, enemy_workspace, pending)
        });
        out.append(pending);
    }
}

fn reacquire(
    turrets: &TurretView,
    enemies: &EnemyView,
    enemy_workspace: &mut Vec<(EnemyId, Vec2)>,
    pending: &mut Vec<Command>,
) -> Result<(), TaskError> {
    enemy_workspace.clear();
    enemy_workspace.extend(
        enemies
            .iter()
            .filter(|enemy| enemy.state.is_alive())
            .map(|enemy| (enemy.id, enemy.position)),
    );

    let mut commands = Vec::new();
    for turret in turrets.iter().filter(|turret| turret.state.is_operational()) {
        if let Some(current) = turret.target {
            if enemies.get(current).is_none() {
                return Err(TaskError::new(
                    TASK,
                    format!(
                        "turret {} aims at enemy {} missing from the snapshot",
                        turret.id.get(),
                        current.get()
                    ),
                ));
            }
        }

        let nearest = nearest_within(
            turret.position,
            turret.stats.range,
            enemy_workspace.iter().copied(),
        )
        .map(|(enemy, _)| enemy);

        if nearest != turret.target {
            debug!(
                "turret {} target {:?} -> {:?}",
                turret.id.get(),
                turret.target.map(|enemy| enemy.get()),
                nearest.map(|enemy| enemy.get())
            );
            commands.push(Command::SetTurretTarget {
                turret: turret.id,
                target: nearest,
            });
        }
    }
    *pending = commands;
    Ok(())
}

impl Default for TurretTargeting {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

fn elapsed(events: &[Event]) -> Duration {
    events.iter().fold(Duration::ZERO, |total, event| match event {
        Event::TimeAdvanced { dt } => total.saturating_add(*dt),
        _ => total,
    })
}
