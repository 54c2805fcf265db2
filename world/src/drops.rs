//! Pooled drop items left behind by defeated enemies.

use cafe_defence_core::{DropId, Vec2};
use cafe_defence_pool::Poolable;
use cafe_defence_scheduler::CancellationToken;

/// Drop item sliding to rest until it is collected or expires.
#[derive(Debug, Default)]
pub(crate) struct DropItem {
    pub(crate) id: Option<DropId>,
    pub(crate) position: Vec2,
    pub(crate) velocity: Vec2,
    pub(crate) token: CancellationToken,
}

impl DropItem {
    /// Integrates velocity and applies exponential damping.
    pub(crate) fn slide(&mut self, dt: f32, damping: f32) {
        self.position += self.velocity * dt;
        self.velocity *= (-damping * dt).exp();
        if self.velocity.length_squared() < 1e-6 {
            self.velocity = Vec2::ZERO;
        }
    }
}

impl Poolable for DropItem {
    fn on_acquire(&mut self) {
        self.token = CancellationToken::new();
        self.velocity = Vec2::ZERO;
    }

    fn on_release(&mut self) {
        self.token.cancel();
        self.id = None;
    }

    fn on_destroy(&mut self) {
        self.token.cancel();
    }
}
