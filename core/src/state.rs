//! Lifecycle states, their legal transition graphs, and clamped health.

use serde::{Deserialize, Serialize};

/// Lifecycle of a turret.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurretState {
    /// Being positioned by the player; inert.
    Placement,
    /// Placed with no live target in range.
    Idle,
    /// Engaging a target; the fire cooldown counts down.
    Active,
    /// Locked while a combination is applied.
    Combining,
    /// Terminal state once hit points reach zero.
    Destroyed,
}

impl TurretState {
    /// Reports whether `self -> next` is an edge of the turret lifecycle graph.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Placement, Self::Idle)
                | (Self::Idle, Self::Active)
                | (Self::Active, Self::Idle)
                | (Self::Idle | Self::Active, Self::Combining)
                | (Self::Combining, Self::Idle)
                | (
                    Self::Placement | Self::Idle | Self::Active | Self::Combining,
                    Self::Destroyed
                )
        )
    }

    /// Turrets that are combining or destroyed cannot be relocated or retargeted.
    #[must_use]
    pub const fn can_be_moved(self) -> bool {
        !matches!(self, Self::Combining | Self::Destroyed)
    }

    /// Reports whether the turret takes part in combat.
    #[must_use]
    pub const fn is_operational(self) -> bool {
        matches!(self, Self::Idle | Self::Active)
    }
}

/// Lifecycle of an enemy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnemyState {
    /// Freshly acquired from the pool; resolves its first target on the next tick.
    Spawning,
    /// Walking toward a turret.
    MovingToTurret,
    /// In range of a turret and attacking it.
    AttackingTurret,
    /// Walking toward the cafe.
    MovingToCafe,
    /// In range of the cafe and attacking it.
    AttackingCafe,
    /// Playing its death effect.
    Dying,
    /// Dead and awaiting return to the pool.
    Dead,
}

impl EnemyState {
    /// Reports whether `self -> next` is an edge of the enemy lifecycle graph.
    ///
    /// `Dead -> Spawning` is the edge taken when a pooled instance is reused.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self.is_alive() && matches!(next, Self::Dying) {
            return true;
        }

        matches!(
            (self, next),
            (Self::Spawning, Self::MovingToTurret | Self::MovingToCafe)
                | (Self::MovingToTurret, Self::AttackingTurret | Self::MovingToCafe)
                | (Self::AttackingTurret, Self::MovingToTurret | Self::MovingToCafe)
                | (Self::MovingToCafe, Self::MovingToTurret | Self::AttackingCafe)
                | (Self::AttackingCafe, Self::MovingToCafe)
                | (Self::Dying, Self::Dead)
                | (Self::Dead, Self::Spawning)
        )
    }

    /// Reports whether the enemy still counts as a live hostile.
    #[must_use]
    pub const fn is_alive(self) -> bool {
        !matches!(self, Self::Dying | Self::Dead)
    }

    /// Reports whether the enemy is pursuing or attacking a turret.
    #[must_use]
    pub const fn is_engaging_turret(self) -> bool {
        matches!(self, Self::MovingToTurret | Self::AttackingTurret)
    }
}

/// Phases of the wave-driven game loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamePhase {
    /// Waiting for the first `start_game` call.
    NotStarted,
    /// Countdown before the next wave.
    Preparing,
    /// A wave is in progress.
    Fighting,
    /// Rewards for the finished wave are being granted.
    WaveComplete,
    /// Global time is frozen.
    Paused,
    /// Terminal loss.
    GameOver,
    /// Terminal win.
    Victory,
}

impl GamePhase {
    /// Reports whether the phase accepts no further transitions except a restart.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::GameOver | Self::Victory)
    }

    /// Reports whether the loop is actively running a wave cycle.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Preparing | Self::Fighting | Self::WaveComplete)
    }
}

/// Hit points clamped to `[0, max]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Health {
    current: f32,
    max: f32,
}

impl Health {
    /// Creates full health with the provided maximum.
    ///
    /// Negative or non-finite maxima collapse to zero.
    #[must_use]
    pub fn new(max: f32) -> Self {
        let max = sanitize(max);
        Self { current: max, max }
    }

    /// Current hit points.
    #[must_use]
    pub const fn current(&self) -> f32 {
        self.current
    }

    /// Maximum hit points.
    #[must_use]
    pub const fn max(&self) -> f32 {
        self.max
    }

    /// Reports whether hit points reached zero.
    #[must_use]
    pub fn is_depleted(&self) -> bool {
        self.current <= 0.0
    }

    /// Removes up to `amount` hit points and returns how many were removed.
    ///
    /// Non-positive or non-finite amounts are ignored.
    pub fn damage(&mut self, amount: f32) -> f32 {
        if !(amount.is_finite() && amount > 0.0) {
            return 0.0;
        }
        let applied = amount.min(self.current);
        self.current = (self.current - applied).max(0.0);
        applied
    }

    /// Restores up to `amount` hit points and returns how many were restored.
    pub fn heal(&mut self, amount: f32) -> f32 {
        if !(amount.is_finite() && amount > 0.0) {
            return 0.0;
        }
        let applied = amount.min(self.max - self.current);
        self.current = (self.current + applied).min(self.max);
        applied
    }

    /// Multiplies the maximum and shifts current hit points by the same absolute delta.
    pub fn scale_max(&mut self, multiplier: f32) {
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return;
        }
        let scaled = sanitize(self.max * multiplier);
        let delta = scaled - self.max;
        self.max = scaled;
        self.current = (self.current + delta).clamp(0.0, self.max);
    }

    /// Restores the maximum and refills.
    pub fn reset(&mut self, max: f32) {
        *self = Self::new(max);
    }
}

fn sanitize(value: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}
