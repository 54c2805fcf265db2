#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that emits fire commands for turrets whose cooldown elapsed.

use cafe_defence_core::{Command, Event, TurretState, TurretView};

/// Turret combat system that queues firing commands for ready turrets.
#[derive(Debug, Default)]
pub struct TurretCombat {
    scratch: Vec<Command>,
}

impl TurretCombat {
    /// Creates a new turret combat system with empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits `Command::FireTurret` entries for active turrets ready to fire.
    ///
    /// Nothing fires unless simulated time advanced, so a paused game stays
    /// silent even when cooldowns already reached zero.
    pub fn handle(&mut self, events: &[Event], turrets: &TurretView, out: &mut Vec<Command>) {
        let advanced = events
            .iter()
            .any(|event| matches!(event, Event::TimeAdvanced { dt } if !dt.is_zero()));
        if !advanced {
            return;
        }

        self.scratch.clear();
        for turret in turrets.iter() {
            if turret.state != TurretState::Active || !turret.ready_in.is_zero() {
                continue;
            }
            if let Some(target) = turret.target {
                self.scratch.push(Command::FireTurret {
                    turret: turret.id,
                    target,
                });
            }
        }

        if self.scratch.is_empty() {
            return;
        }

        out.reserve(self.scratch.len());
        out.append(&mut self.scratch);
    }
}
