//! Pooled enemies and the enemy lifecycle machine.

use std::time::Duration;

use cafe_defence_core::{
    CurrencyAmounts, EffectKind, EnemyId, EnemyKind, EnemySnapshot, EnemyState, EnemyStats,
    EntityRef, Event, Health, HighlightColor, TargetRef, Vec2,
};
use cafe_defence_pool::Poolable;
use cafe_defence_scheduler::CancellationToken;
use log::{debug, warn};

/// Callback wired to an enemy for the duration of one life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Subscription {
    /// Credits the amounts when the enemy finishes dying.
    DeathReward(CurrencyAmounts),
}

/// Enemy instance owned by a pool and reused across lives.
#[derive(Debug)]
pub(crate) struct Enemy {
    pub(crate) kind: EnemyKind,
    pub(crate) stats: EnemyStats,
    pub(crate) id: EnemyId,
    pub(crate) state: EnemyState,
    pub(crate) position: Vec2,
    pub(crate) health: Health,
    pub(crate) target: Option<TargetRef>,
    pub(crate) attack_ready_in: Duration,
    pub(crate) token: CancellationToken,
    subscriptions: Vec<Subscription>,
}

impl Enemy {
    pub(crate) fn new(kind: EnemyKind) -> Self {
        let stats = kind.stats();
        Self {
            kind,
            stats,
            id: EnemyId::new(0),
            state: EnemyState::Dead,
            position: Vec2::ZERO,
            health: Health::new(stats.max_health),
            target: None,
            attack_ready_in: Duration::ZERO,
            token: CancellationToken::new(),
            subscriptions: Vec::new(),
        }
    }

    /// Restores base statistics and clears everything a previous life left behind.
    pub(crate) fn reset_enemy(&mut self) {
        self.stats = self.kind.stats();
        self.position = Vec2::ZERO;
        self.quick_reset();
    }

    /// Clears targeting, subscriptions, and timers, and issues a fresh token.
    ///
    /// The previous token is cancelled so deferred work from an earlier life
    /// never reaches this one.
    pub(crate) fn quick_reset(&mut self) {
        self.token.cancel();
        self.token = CancellationToken::new();
        self.subscriptions.clear();
        self.target = None;
        self.attack_ready_in = Duration::ZERO;
        self.health.reset(self.stats.max_health);
        self.state = EnemyState::Spawning;
    }

    pub(crate) fn subscribe(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Detaches every subscription so each fires at most once.
    pub(crate) fn take_subscriptions(&mut self) -> Vec<Subscription> {
        std::mem::take(&mut self.subscriptions)
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    /// Moves along a legal edge and emits the transition.
    pub(crate) fn transition(&mut self, next: EnemyState, out: &mut Vec<Event>) -> bool {
        let from = self.state;
        if from == next {
            return false;
        }
        if !from.can_transition_to(next) {
            warn!(
                "enemy {}: refused transition {from:?} -> {next:?}",
                self.id.get()
            );
            return false;
        }
        self.state = next;
        debug!("enemy {}: {from:?} -> {next:?}", self.id.get());
        out.push(Event::EnemyStateChanged {
            enemy: self.id,
            from,
            to: next,
        });

        let entity = EntityRef::Enemy(self.id);
        match next {
            EnemyState::AttackingTurret | EnemyState::AttackingCafe => {
                out.push(Event::HighlightChanged {
                    entity,
                    active: true,
                    color: HighlightColor::ENGAGED,
                    intensity: 0.4,
                });
            }
            EnemyState::Dying => {
                self.target = None;
                out.push(Event::HighlightChanged {
                    entity,
                    active: false,
                    color: HighlightColor::ENGAGED,
                    intensity: 0.0,
                });
                out.push(Event::EffectRequested {
                    effect: EffectKind::EnemyDeath,
                    position: self.position,
                });
            }
            _ if matches!(
                from,
                EnemyState::AttackingTurret | EnemyState::AttackingCafe
            ) =>
            {
                out.push(Event::HighlightChanged {
                    entity,
                    active: false,
                    color: HighlightColor::ENGAGED,
                    intensity: 0.0,
                });
            }
            _ => {}
        }
        true
    }

    /// Points the enemy at `target` and emits the change.
    pub(crate) fn retarget(&mut self, target: TargetRef, out: &mut Vec<Event>) {
        if self.target == Some(target) {
            return;
        }
        self.target = Some(target);
        out.push(Event::EnemyRetargeted {
            enemy: self.id,
            target,
        });
    }

    /// Applies damage and reports whether it started the dying sequence.
    pub(crate) fn take_damage(&mut self, amount: f32, out: &mut Vec<Event>) -> bool {
        if !self.is_alive() {
            debug!("enemy {}: damage while {:?} ignored", self.id.get(), self.state);
            return false;
        }
        let applied = self.health.damage(amount);
        if applied <= 0.0 {
            return false;
        }
        out.push(Event::EnemyDamaged {
            enemy: self.id,
            amount: applied,
            remaining: self.health.current(),
        });
        self.health.is_depleted() && self.transition(EnemyState::Dying, out)
    }

    /// Drops any turret target and heads for the cafe.
    pub(crate) fn force_move_to_cafe(&mut self, out: &mut Vec<Event>) {
        match self.state {
            EnemyState::MovingToCafe | EnemyState::AttackingCafe => {}
            EnemyState::Spawning | EnemyState::MovingToTurret | EnemyState::AttackingTurret => {
                let _ = self.transition(EnemyState::MovingToCafe, out);
                self.retarget(TargetRef::Cafe, out);
            }
            EnemyState::Dying | EnemyState::Dead => {
                warn!("enemy {}: cannot redirect while {:?}", self.id.get(), self.state);
            }
        }
    }

    /// Counts the attack cooldown down and reports whether an attack is ready.
    pub(crate) fn tick_attack(&mut self, dt: Duration) -> bool {
        self.attack_ready_in = self.attack_ready_in.saturating_sub(dt);
        self.attack_ready_in.is_zero()
    }

    pub(crate) fn rearm(&mut self) {
        self.attack_ready_in = self.stats.attack_cooldown;
    }

    pub(crate) fn snapshot(&self) -> EnemySnapshot {
        EnemySnapshot {
            id: self.id,
            kind: self.kind,
            state: self.state,
            position: self.position,
            health: self.health,
            target: self.target,
            detection_range: self.stats.detection_range,
        }
    }
}

impl Poolable for Enemy {
    fn on_acquire(&mut self) {
        self.reset_enemy();
    }

    fn on_release(&mut self) {
        self.token.cancel();
        self.subscriptions.clear();
        self.target = None;
        self.state = EnemyState::Dead;
    }

    fn on_destroy(&mut self) {
        self.token.cancel();
        self.subscriptions.clear();
    }
}
