//! Pooled homing projectiles fired by turrets.

use cafe_defence_core::{EnemyId, Vec2};
use cafe_defence_pool::Poolable;
use cafe_defence_scheduler::CancellationToken;

/// Distance at which a projectile counts as arrived.
pub(crate) const IMPACT_RADIUS: f32 = 0.25;

/// Projectile in flight toward one life of an enemy.
#[derive(Debug, Default)]
pub(crate) struct Projectile {
    pub(crate) target: Option<EnemyId>,
    pub(crate) position: Vec2,
    pub(crate) damage: f32,
    /// Clone of the target's token; cancelled once the target returns to its pool.
    pub(crate) target_token: CancellationToken,
}

/// Outcome of moving a projectile for one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Flight {
    InFlight,
    Arrived,
}

impl Projectile {
    pub(crate) fn launch(
        &mut self,
        target: EnemyId,
        target_token: CancellationToken,
        position: Vec2,
        damage: f32,
    ) {
        self.target = Some(target);
        self.target_token = target_token;
        self.position = position;
        self.damage = damage;
    }

    /// Moves up to `travel` toward `destination`.
    pub(crate) fn advance(&mut self, destination: Vec2, travel: f32) -> Flight {
        let offset = destination - self.position;
        let distance = offset.length();
        if distance <= travel.max(IMPACT_RADIUS) {
            self.position = destination;
            return Flight::Arrived;
        }
        self.position += offset / distance * travel;
        Flight::InFlight
    }
}

impl Poolable for Projectile {
    fn on_acquire(&mut self) {
        self.target = None;
        self.damage = 0.0;
    }

    fn on_release(&mut self) {
        self.target = None;
        self.target_token = CancellationToken::new();
    }
}
