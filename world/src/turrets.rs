//! Authoritative turret state and the turret lifecycle machine.

use std::{collections::BTreeMap, time::Duration};

use cafe_defence_core::{
    EffectKind, EnemyId, EntityRef, Event, HighlightColor, Health, TurretId, TurretKind,
    TurretSnapshot, TurretState, TurretStats, Vec2,
};
use cafe_defence_scheduler::CancellationToken;
use log::{debug, warn};

const ENGAGED_INTENSITY: f32 = 0.6;
const COMBINING_INTENSITY: f32 = 1.0;

/// Turret stored inside the world.
#[derive(Debug)]
pub(crate) struct Turret {
    pub(crate) id: TurretId,
    pub(crate) kind: TurretKind,
    pub(crate) state: TurretState,
    pub(crate) position: Vec2,
    pub(crate) orientation: f32,
    pub(crate) health: Health,
    pub(crate) stats: TurretStats,
    pub(crate) target: Option<EnemyId>,
    pub(crate) cooldown: Duration,
    pub(crate) activation_pending: bool,
    pub(crate) token: CancellationToken,
}

impl Turret {
    fn new(id: TurretId, kind: TurretKind, position: Vec2, orientation: f32) -> Self {
        let stats = kind.stats();
        Self {
            id,
            kind,
            state: TurretState::Placement,
            position,
            orientation,
            health: Health::new(stats.max_hp),
            stats,
            target: None,
            cooldown: Duration::ZERO,
            activation_pending: false,
            token: CancellationToken::new(),
        }
    }

    /// Moves along a legal edge, emitting the transition and its presentation cues.
    ///
    /// Illegal edges are refused with a warning. Same-state requests are no-ops.
    pub(crate) fn transition(&mut self, next: TurretState, out: &mut Vec<Event>) -> bool {
        let from = self.state;
        if from == next {
            return false;
        }
        if !from.can_transition_to(next) {
            warn!(
                "turret {}: refused transition {from:?} -> {next:?}",
                self.id.get()
            );
            return false;
        }

        self.state = next;
        debug!("turret {}: {from:?} -> {next:?}", self.id.get());
        out.push(Event::TurretStateChanged {
            turret: self.id,
            from,
            to: next,
        });

        let entity = EntityRef::Turret(self.id);
        match from {
            TurretState::Active => out.push(highlight(entity, false, HighlightColor::ENGAGED, 0.0)),
            TurretState::Combining => {
                out.push(highlight(entity, false, HighlightColor::COMBINING, 0.0));
                out.push(effect(EffectKind::CombineEnd, self.position));
            }
            _ => {}
        }

        match next {
            TurretState::Idle if from == TurretState::Placement => {
                self.activation_pending = false;
                out.push(effect(EffectKind::TurretActivated, self.position));
            }
            TurretState::Active => {
                out.push(highlight(
                    entity,
                    true,
                    HighlightColor::ENGAGED,
                    ENGAGED_INTENSITY,
                ));
            }
            TurretState::Combining => {
                self.target = None;
                out.push(highlight(
                    entity,
                    true,
                    HighlightColor::COMBINING,
                    COMBINING_INTENSITY,
                ));
                out.push(effect(EffectKind::CombineStart, self.position));
            }
            TurretState::Destroyed => {
                self.token.cancel();
                self.target = None;
                out.push(effect(EffectKind::TurretDestroyed, self.position));
                out.push(Event::TurretDestroyed {
                    turret: self.id,
                    kind: self.kind,
                    position: self.position,
                });
            }
            _ => {}
        }
        true
    }

    /// Applies damage and reports whether it destroyed the turret.
    pub(crate) fn take_damage(&mut self, amount: f32, out: &mut Vec<Event>) -> bool {
        if self.state == TurretState::Destroyed {
            warn!("turret {}: damage on destroyed turret ignored", self.id.get());
            return false;
        }
        let applied = self.health.damage(amount);
        if applied <= 0.0 {
            return false;
        }
        out.push(Event::TurretDamaged {
            turret: self.id,
            amount: applied,
            remaining: self.health.current(),
        });
        self.health.is_depleted() && self.transition(TurretState::Destroyed, out)
    }

    pub(crate) fn heal(&mut self, amount: f32, out: &mut Vec<Event>) {
        if self.state == TurretState::Destroyed {
            warn!("turret {}: heal on destroyed turret ignored", self.id.get());
            return;
        }
        let applied = self.health.heal(amount);
        if applied > 0.0 {
            out.push(Event::TurretHealed {
                turret: self.id,
                amount: applied,
            });
        }
    }

    /// Enters Combining from Idle or Active; a turret already combining is left alone.
    pub(crate) fn start_combining(&mut self, out: &mut Vec<Event>) -> bool {
        match self.state {
            TurretState::Combining => true,
            TurretState::Idle | TurretState::Active => {
                self.transition(TurretState::Combining, out)
            }
            state => {
                debug!(
                    "turret {}: cannot combine while {state:?}",
                    self.id.get()
                );
                false
            }
        }
    }

    /// Leaves Combining; a turret that is not combining is left alone.
    pub(crate) fn end_combining(&mut self, out: &mut Vec<Event>) {
        if self.state == TurretState::Combining {
            let _ = self.transition(TurretState::Idle, out);
        }
    }

    pub(crate) const fn can_be_moved(&self) -> bool {
        self.state.can_be_moved()
    }

    /// Multiplies statistics; the hit point increase keeps the absolute damage taken.
    pub(crate) fn upgrade_stats(
        &mut self,
        attack_multiplier: f32,
        speed_multiplier: f32,
        hp_multiplier: f32,
        out: &mut Vec<Event>,
    ) {
        if self.state == TurretState::Destroyed {
            warn!("turret {}: upgrade on destroyed turret ignored", self.id.get());
            return;
        }
        self.stats.attack_power *= sanitize_multiplier(attack_multiplier);
        self.stats.attack_speed *= sanitize_multiplier(speed_multiplier);
        self.health.scale_max(sanitize_multiplier(hp_multiplier));
        self.stats.max_hp = self.health.max();
        out.push(Event::TurretUpgraded {
            turret: self.id,
            stats: self.stats,
        });
    }

    /// Counts the fire cooldown down; it only runs while engaged.
    pub(crate) fn tick_cooldown(&mut self, dt: Duration) {
        if self.state == TurretState::Active {
            self.cooldown = self.cooldown.saturating_sub(dt);
        }
    }

    pub(crate) fn is_ready_to_fire(&self) -> bool {
        self.state == TurretState::Active && self.cooldown.is_zero()
    }

    pub(crate) fn rearm(&mut self) {
        self.cooldown = self.stats.fire_interval();
    }

    pub(crate) fn snapshot(&self) -> TurretSnapshot {
        TurretSnapshot {
            id: self.id,
            kind: self.kind,
            state: self.state,
            position: self.position,
            orientation: self.orientation,
            health: self.health,
            stats: self.stats,
            target: self.target,
            ready_in: self.cooldown,
        }
    }
}

fn sanitize_multiplier(multiplier: f32) -> f32 {
    if multiplier.is_finite() && multiplier > 0.0 {
        multiplier
    } else {
        warn!("ignoring invalid stat multiplier {multiplier}");
        1.0
    }
}

fn highlight(entity: EntityRef, active: bool, color: HighlightColor, intensity: f32) -> Event {
    Event::HighlightChanged {
        entity,
        active,
        color,
        intensity,
    }
}

fn effect(effect: EffectKind, position: Vec2) -> Event {
    Event::EffectRequested { effect, position }
}

/// Registry that stores turrets and manages identifier allocation.
#[derive(Debug)]
pub(crate) struct TurretRegistry {
    entries: BTreeMap<TurretId, Turret>,
    next_turret_id: TurretId,
}

impl TurretRegistry {
    /// Creates an empty turret registry with a reset identifier counter.
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_turret_id: TurretId::new(0),
        }
    }

    /// Creates a turret in the placement state and returns its identifier.
    pub(crate) fn insert(&mut self, kind: TurretKind, position: Vec2, orientation: f32) -> TurretId {
        let id = self.next_turret_id;
        self.next_turret_id = TurretId::new(id.get().wrapping_add(1));
        let _ = self
            .entries
            .insert(id, Turret::new(id, kind, position, orientation));
        id
    }

    pub(crate) fn get(&self, id: TurretId) -> Option<&Turret> {
        self.entries.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TurretId) -> Option<&mut Turret> {
        self.entries.get_mut(&id)
    }

    /// Removes a turret, cancelling every task it owns first.
    pub(crate) fn retire(&mut self, id: TurretId) -> Option<Turret> {
        let turret = self.entries.remove(&id)?;
        turret.token.cancel();
        Some(turret)
    }

    pub(crate) fn ids(&self) -> Vec<TurretId> {
        self.entries.keys().copied().collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Turret> {
        self.entries.values()
    }

    /// Retires every turret and returns how many were removed.
    pub(crate) fn clear(&mut self) -> usize {
        let count = self.entries.len();
        for turret in self.entries.values() {
            turret.token.cancel();
        }
        self.entries.clear();
        count
    }

    /// Nearest turret within `range` that enemies may engage.
    pub(crate) fn nearest_engageable(&self, origin: Vec2, range: f32) -> Option<TurretId> {
        cafe_defence_core::nearest_within(
            origin,
            range,
            self.entries
                .values()
                .filter(|turret| turret.state != TurretState::Destroyed)
                .map(|turret| (turret.id, turret.position)),
        )
        .map(|(id, _)| id)
    }
}
