#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state management for Cafe Defence.
//!
//! The world owns every turret, the pooled enemies, projectiles and drop
//! items, the currency ledger and the cafe objective. It only changes through
//! [`apply`], and every deferred consequence of a command (activation delays,
//! death effects, corpse removal, drop expiry) is queued on a timeline keyed by
//! the owning entity's cancellation token, so nothing touches an entity after
//! it was retired or recycled.

mod drops;
mod enemies;
mod ledger;
mod projectiles;
mod turrets;

use std::{collections::BTreeMap, time::Duration};

use cafe_defence_core::{
    CafeDefinition, CombinationError, Command, CurrencyAmounts, DropId, EffectKind, EnemyId,
    EnemyKind, EnemyState, Event, GamePhase, Health, ItemKind, Kind, MoveError, SpawnError,
    TargetRef, TurretId, TurretState, Vec2, WELCOME_BANNER,
};
use cafe_defence_pool::{OverflowPolicy, Pool, PoolError, PoolKey, PoolRegistry};
use cafe_defence_scheduler::Timeline;
use cafe_defence_system_combination::RecipeBook;
use log::{debug, info, warn};

use crate::{
    drops::DropItem,
    enemies::{Enemy, Subscription},
    ledger::CurrencyLedger,
    projectiles::{Flight, Projectile},
    turrets::TurretRegistry,
};

/// Largest accepted time multiplier.
pub const MAX_TIME_SCALE: f32 = 16.0;

/// Tuning values of the world simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldConfig {
    /// Delay between the end of placement input and a turret becoming idle.
    pub activation_delay: Duration,
    /// Length of the dying sequence before an enemy is dead.
    pub death_effect: Duration,
    /// Time a dead enemy lingers before returning to its pool.
    pub corpse_removal: Duration,
    /// Time an uncollected drop stays on the field.
    pub drop_lifetime: Duration,
    /// Currency credited when a drop is collected.
    pub drop_reward: CurrencyAmounts,
    /// Exponential damping rate applied to drop velocity, per second.
    pub drop_damping: f32,
    /// Projectile travel speed in world units per second.
    pub projectile_speed: f32,
    /// Nominal capacity of every pool.
    pub pool_capacity: usize,
    /// Instances built per pool up front, bounded by the capacity.
    pub prewarm: usize,
    /// Behaviour of the pools once the capacity is reached.
    pub overflow: OverflowPolicy,
    /// Enemy kinds that receive a pool.
    pub enemy_kinds: Vec<EnemyKind>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            activation_delay: Duration::from_secs(2),
            death_effect: Duration::from_millis(500),
            corpse_removal: Duration::from_secs(1),
            drop_lifetime: Duration::from_secs(10),
            drop_reward: CurrencyAmounts::water_points(1),
            drop_damping: 3.0,
            projectile_speed: 18.0,
            pool_capacity: 32,
            prewarm: 0,
            overflow: OverflowPolicy::Grow,
            enemy_kinds: EnemyKind::ALL.to_vec(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Deferred {
    ActivateTurret(TurretId),
    FinishDying(EnemyId),
    ReleaseEnemy(EnemyId),
    ExpireDrop(DropId),
}

#[derive(Clone, Copy, Debug)]
struct Cafe {
    position: Vec2,
    health: Health,
    fallen: bool,
}

impl Cafe {
    fn new(definition: CafeDefinition) -> Self {
        Self {
            position: definition.position,
            health: Health::new(definition.max_health),
            fallen: false,
        }
    }

    fn take_damage(&mut self, amount: f32, out: &mut Vec<Event>) {
        if self.fallen {
            return;
        }
        let applied = self.health.damage(amount);
        if applied <= 0.0 {
            return;
        }
        out.push(Event::CafeDamaged {
            amount: applied,
            remaining: self.health.current(),
        });
        if self.health.is_depleted() {
            self.fallen = true;
            warn!("the cafe has fallen");
            out.push(Event::CafeDestroyed);
        }
    }

    fn restore(&mut self) {
        self.health.reset(self.health.max());
        self.fallen = false;
    }
}

type EnemyIndex = BTreeMap<EnemyId, (EnemyKind, PoolKey)>;

/// Instances torn down by [`World::dispose`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisposeReport {
    /// Turrets retired.
    pub turrets: usize,
    /// Pooled enemies destroyed, idle or in use.
    pub enemies: usize,
    /// Pooled projectiles destroyed.
    pub projectiles: usize,
    /// Pooled drop items destroyed.
    pub drops: usize,
}

/// Represents the authoritative Cafe Defence world state.
#[derive(Debug)]
pub struct World {
    banner: &'static str,
    config: WorldConfig,
    recipes: RecipeBook,
    phase: GamePhase,
    time_scale: f32,
    turrets: TurretRegistry,
    enemies: PoolRegistry<EnemyKind, Enemy>,
    enemy_index: EnemyIndex,
    next_enemy_id: u32,
    projectiles: Pool<Projectile>,
    drops: Pool<DropItem>,
    drop_index: BTreeMap<DropId, PoolKey>,
    next_drop_id: u32,
    ledger: CurrencyLedger,
    cafe: Cafe,
    timeline: Timeline<Deferred>,
    disposed: bool,
}

impl Default for World {
    fn default() -> Self {
        Self::new(
            WorldConfig::default(),
            CafeDefinition::default(),
            RecipeBook::default(),
        )
    }
}

impl World {
    /// Creates a world guarding `cafe`, combining turrets with `recipes`.
    #[must_use]
    pub fn new(config: WorldConfig, cafe: CafeDefinition, recipes: RecipeBook) -> Self {
        let mut enemies = PoolRegistry::new();
        for kind in config.enemy_kinds.iter().copied() {
            let mut pool = Pool::new(
                kind.name(),
                config.pool_capacity,
                Box::new(move || Some(Enemy::new(kind))),
            )
            .with_overflow(config.overflow);
            pool.prewarm(config.prewarm);
            enemies.register(kind, pool);
        }
        let mut projectiles = Pool::new(
            "projectile",
            config.pool_capacity,
            Box::new(|| Some(Projectile::default())),
        )
        .with_overflow(config.overflow);
        projectiles.prewarm(config.prewarm);
        let mut drops = Pool::new(
            "drop",
            config.pool_capacity,
            Box::new(|| Some(DropItem::default())),
        )
        .with_overflow(config.overflow);
        drops.prewarm(config.prewarm);

        Self {
            banner: WELCOME_BANNER,
            config,
            recipes,
            phase: GamePhase::NotStarted,
            time_scale: 1.0,
            turrets: TurretRegistry::new(),
            enemies,
            enemy_index: BTreeMap::new(),
            next_enemy_id: 0,
            projectiles,
            drops,
            drop_index: BTreeMap::new(),
            next_drop_id: 0,
            ledger: CurrencyLedger::new(),
            cafe: Cafe::new(cafe),
            timeline: Timeline::new(),
            disposed: false,
        }
    }

    /// Tears the world down for good.
    ///
    /// Deferred work is dropped, every turret is retired, and every pool is
    /// disposed so each pooled instance, idle or in use, runs its destroy hook
    /// exactly once. Later commands find no pools. A second call does nothing.
    pub fn dispose(&mut self) -> DisposeReport {
        if self.disposed {
            warn!("world disposed twice");
            return DisposeReport::default();
        }
        self.disposed = true;
        self.timeline.clear();
        self.enemy_index.clear();
        self.drop_index.clear();

        let report = DisposeReport {
            turrets: self.turrets.clear(),
            enemies: self.enemies.dispose_all(),
            projectiles: self.projectiles.dispose().unwrap_or_default(),
            drops: self.drops.dispose().unwrap_or_default(),
        };
        info!(
            "world disposed: {} turrets, {} enemies, {} projectiles, {} drops",
            report.turrets, report.enemies, report.projectiles, report.drops
        );
        report
    }

    fn tick(&mut self, dt: Duration, out_events: &mut Vec<Event>) {
        let dt = scale_duration(dt, self.time_scale);
        if dt.is_zero() {
            return;
        }
        out_events.push(Event::TimeAdvanced { dt });

        self.run_deferred(dt, out_events);
        self.advance_enemies(dt, out_events);
        self.advance_projectiles(dt, out_events);
        self.advance_drops(dt);
        self.refresh_turrets(dt, out_events);
    }

    fn run_deferred(&mut self, dt: Duration, out_events: &mut Vec<Event>) {
        let mut due = Vec::new();
        self.timeline.advance(dt, &mut due);
        for action in due {
            match action {
                Deferred::ActivateTurret(turret) => {
                    if let Some(turret) = self.turrets.get_mut(turret) {
                        if turret.state == TurretState::Placement {
                            let _ = turret.transition(TurretState::Idle, out_events);
                        }
                    }
                }
                Deferred::FinishDying(enemy) => self.finish_dying(enemy, out_events),
                Deferred::ReleaseEnemy(enemy) => self.release_enemy(enemy, out_events),
                Deferred::ExpireDrop(drop) => {
                    if self.release_drop(drop) {
                        out_events.push(Event::DropExpired { drop });
                    }
                }
            }
        }
    }

    fn advance_enemies(&mut self, dt: Duration, out_events: &mut Vec<Event>) {
        let seconds = dt.as_secs_f32();
        let ids: Vec<EnemyId> = self.enemy_index.keys().copied().collect();
        for id in ids {
            let Some(enemy) = pooled_enemy_mut(&self.enemy_index, &mut self.enemies, id) else {
                continue;
            };
            if !enemy.is_alive() {
                continue;
            }
            let attack_ready = enemy.tick_attack(dt);

            if enemy.state == EnemyState::Spawning {
                pursue_nearest_turret(enemy, &self.turrets, out_events);
            }

            if enemy.state.is_engaging_turret() {
                let target_valid = match enemy.target {
                    Some(TargetRef::Turret(turret)) => self
                        .turrets
                        .get(turret)
                        .map_or(false, |turret| turret.state != TurretState::Destroyed),
                    _ => false,
                };
                if !target_valid {
                    pursue_nearest_turret(enemy, &self.turrets, out_events);
                }
            }

            let travel = enemy.stats.move_speed * seconds;
            let reach = enemy.stats.attack_range;
            match enemy.state {
                EnemyState::MovingToTurret | EnemyState::AttackingTurret => {
                    let Some(TargetRef::Turret(turret_id)) = enemy.target else {
                        continue;
                    };
                    let Some(turret) = self.turrets.get_mut(turret_id) else {
                        continue;
                    };
                    if enemy.position.distance(turret.position) > reach {
                        let _ = enemy.transition(EnemyState::MovingToTurret, out_events);
                        enemy.position = step_toward(enemy.position, turret.position, travel, reach);
                        continue;
                    }
                    let _ = enemy.transition(EnemyState::AttackingTurret, out_events);
                    if !attack_ready {
                        continue;
                    }
                    enemy.rearm();
                    out_events.push(Event::EffectRequested {
                        effect: EffectKind::Attack,
                        position: turret.position,
                    });
                    if turret.take_damage(enemy.stats.attack_damage, out_events) {
                        let _ = self.turrets.retire(turret_id);
                        pursue_nearest_turret(enemy, &self.turrets, out_events);
                    }
                }
                EnemyState::MovingToCafe | EnemyState::AttackingCafe => {
                    let cafe = self.cafe.position;
                    if enemy.position.distance(cafe) > reach {
                        let _ = enemy.transition(EnemyState::MovingToCafe, out_events);
                        enemy.position = step_toward(enemy.position, cafe, travel, reach);
                        continue;
                    }
                    let _ = enemy.transition(EnemyState::AttackingCafe, out_events);
                    if attack_ready {
                        enemy.rearm();
                        out_events.push(Event::EffectRequested {
                            effect: EffectKind::Attack,
                            position: cafe,
                        });
                        self.cafe.take_damage(enemy.stats.attack_damage, out_events);
                    }
                }
                _ => {}
            }
        }
    }

    fn advance_projectiles(&mut self, dt: Duration, out_events: &mut Vec<Event>) {
        let travel = self.config.projectile_speed * dt.as_secs_f32();
        let mut spent = Vec::new();
        let mut hits = Vec::new();
        for key in self.projectiles.active_keys() {
            let Some(projectile) = self.projectiles.get_mut(key) else {
                continue;
            };
            let destination = projectile
                .target
                .filter(|_| !projectile.target_token.is_cancelled())
                .and_then(|enemy| pooled_enemy(&self.enemy_index, &self.enemies, enemy))
                .filter(|enemy| enemy.is_alive())
                .map(|enemy| (enemy.id, enemy.position));

            match destination {
                None => spent.push(key),
                Some((enemy, position)) => {
                    if projectile.advance(position, travel) == Flight::Arrived {
                        hits.push((enemy, projectile.damage, position));
                        spent.push(key);
                    }
                }
            }
        }

        for key in spent {
            let _ = self.projectiles.release(key);
        }
        for (enemy, damage, position) in hits {
            out_events.push(Event::EffectRequested {
                effect: EffectKind::Hit,
                position,
            });
            self.damage_enemy(enemy, damage, out_events);
        }
    }

    fn advance_drops(&mut self, dt: Duration) {
        let seconds = dt.as_secs_f32();
        let damping = self.config.drop_damping;
        for key in self.drops.active_keys() {
            if let Some(item) = self.drops.get_mut(key) {
                item.slide(seconds, damping);
            }
        }
    }

    fn refresh_turrets(&mut self, dt: Duration, out_events: &mut Vec<Event>) {
        for id in self.turrets.ids() {
            let Some(turret) = self.turrets.get_mut(id) else {
                continue;
            };
            if !turret.state.is_operational() {
                continue;
            }

            let engaged = turret
                .target
                .and_then(|enemy| pooled_enemy(&self.enemy_index, &self.enemies, enemy))
                .map_or(false, |enemy| {
                    enemy.is_alive()
                        && turret.position.distance(enemy.position) <= turret.stats.range
                });
            if !engaged && turret.target.take().is_some() {
                out_events.push(Event::TurretTargetChanged {
                    turret: id,
                    target: None,
                });
            }

            let next = if engaged {
                TurretState::Active
            } else {
                TurretState::Idle
            };
            let _ = turret.transition(next, out_events);
            turret.tick_cooldown(dt);
        }
    }

    fn end_placement(&mut self, turret_id: TurretId) {
        let delay = self.config.activation_delay;
        let Some(turret) = self.turrets.get_mut(turret_id) else {
            debug!("end of placement for unknown turret {}", turret_id.get());
            return;
        };
        if turret.state != TurretState::Placement || turret.activation_pending {
            return;
        }
        turret.activation_pending = true;
        let token = turret.token.clone();
        self.timeline
            .delay(delay, &token, Deferred::ActivateTurret(turret_id));
    }

    fn move_turret(&mut self, turret_id: TurretId, position: Vec2, out_events: &mut Vec<Event>) {
        match self.turrets.get_mut(turret_id) {
            None => out_events.push(Event::TurretMoveRejected {
                turret: turret_id,
                reason: MoveError::MissingTurret,
            }),
            Some(turret) if !turret.can_be_moved() => out_events.push(Event::TurretMoveRejected {
                turret: turret_id,
                reason: MoveError::Locked,
            }),
            Some(turret) => {
                turret.position = position;
                out_events.push(Event::TurretMoved {
                    turret: turret_id,
                    position,
                });
            }
        }
    }

    fn set_turret_target(
        &mut self,
        turret_id: TurretId,
        target: Option<EnemyId>,
        out_events: &mut Vec<Event>,
    ) {
        let Some(turret) = self.turrets.get_mut(turret_id) else {
            return;
        };
        if !turret.state.is_operational() {
            debug!(
                "turret {} cannot be retargeted while {:?}",
                turret_id.get(),
                turret.state
            );
            return;
        }

        let Some(enemy_id) = target else {
            if turret.target.take().is_some() {
                out_events.push(Event::TurretTargetChanged {
                    turret: turret_id,
                    target: None,
                });
            }
            let _ = turret.transition(TurretState::Idle, out_events);
            return;
        };

        let in_range = pooled_enemy(&self.enemy_index, &self.enemies, enemy_id).map_or(false, |enemy| {
            enemy.is_alive() && turret.position.distance(enemy.position) <= turret.stats.range
        });
        if !in_range {
            debug!(
                "turret {} ignored target {} outside its range",
                turret_id.get(),
                enemy_id.get()
            );
            return;
        }
        if turret.target != Some(enemy_id) {
            turret.target = Some(enemy_id);
            out_events.push(Event::TurretTargetChanged {
                turret: turret_id,
                target: Some(enemy_id),
            });
        }
        let _ = turret.transition(TurretState::Active, out_events);
    }

    fn fire_turret(&mut self, turret_id: TurretId, target: EnemyId, out_events: &mut Vec<Event>) {
        let Some(turret) = self.turrets.get_mut(turret_id) else {
            return;
        };
        if !turret.is_ready_to_fire() || turret.target != Some(target) {
            debug!("turret {} is not ready to fire", turret_id.get());
            return;
        }
        let Some(enemy) = pooled_enemy(&self.enemy_index, &self.enemies, target)
            .filter(|enemy| enemy.is_alive())
        else {
            return;
        };
        let (enemy_position, enemy_token) = (enemy.position, enemy.token.clone());

        let Ok(key) = self.projectiles.acquire() else {
            return;
        };
        if let Some(projectile) = self.projectiles.get_mut(key) {
            projectile.launch(target, enemy_token, turret.position, turret.stats.attack_power);
        }
        let heading = enemy_position - turret.position;
        turret.orientation = heading.y.atan2(heading.x);
        turret.rearm();
        out_events.push(Event::TurretFired {
            turret: turret_id,
            target,
        });
    }

    fn damage_turret(&mut self, turret_id: TurretId, amount: f32, out_events: &mut Vec<Event>) {
        let Some(turret) = self.turrets.get_mut(turret_id) else {
            debug!("damage for unknown turret {}", turret_id.get());
            return;
        };
        if turret.take_damage(amount, out_events) {
            let _ = self.turrets.retire(turret_id);
        }
    }

    fn apply_combination(&mut self, turret_id: TurretId, item: ItemKind, out_events: &mut Vec<Event>) {
        let reject = |reason| Event::CombinationRejected {
            turret: turret_id,
            item,
            reason,
        };
        let Some(turret) = self.turrets.get_mut(turret_id) else {
            out_events.push(reject(CombinationError::MissingTurret));
            return;
        };
        if !turret.state.is_operational() {
            out_events.push(reject(CombinationError::InvalidState));
            return;
        }
        let Some(result) = self.recipes.resolve(turret.kind, item) else {
            out_events.push(reject(CombinationError::NoMatchingRecipe));
            return;
        };

        let _ = turret.start_combining(out_events);
        turret.end_combining(out_events);
        let (position, orientation) = (turret.position, turret.orientation);
        let _ = self.turrets.retire(turret_id);

        let created = self.turrets.insert(result, position, orientation);
        out_events.push(Event::TurretPlaced {
            turret: created,
            kind: result,
            position,
        });
        if let Some(replacement) = self.turrets.get_mut(created) {
            let _ = replacement.transition(TurretState::Idle, out_events);
        }
        info!(
            "turret {} combined with {item} into {result} turret {}",
            turret_id.get(),
            created.get()
        );
        out_events.push(Event::TurretCombined {
            retired: turret_id,
            created,
            kind: result,
        });
    }

    fn spawn_enemy(&mut self, kind: EnemyKind, position: Vec2, out_events: &mut Vec<Event>) {
        let key = match self.enemies.acquire(kind) {
            Ok(key) => key,
            Err(error) => {
                warn!("spawn of {kind} dropped: {error}");
                let reason = match error {
                    PoolError::Unregistered { .. } => SpawnError::UnregisteredPool,
                    _ => SpawnError::PoolExhausted,
                };
                out_events.push(Event::SpawnRejected { kind, reason });
                return;
            }
        };
        let id = EnemyId::new(self.next_enemy_id);
        self.next_enemy_id = self.next_enemy_id.wrapping_add(1);

        let Some(enemy) = self
            .enemies
            .get_mut(kind)
            .and_then(|pool| pool.get_mut(key))
        else {
            return;
        };
        enemy.id = id;
        enemy.position = position;
        enemy.subscribe(Subscription::DeathReward(CurrencyAmounts::coins(
            enemy.stats.coin_reward,
        )));
        let _ = self.enemy_index.insert(id, (kind, key));
        debug!("enemy {} ({kind}) spawned at {position}", id.get());
        out_events.push(Event::EnemySpawned {
            enemy: id,
            kind,
            position,
        });
    }

    fn retarget_enemy(&mut self, enemy_id: EnemyId, target: TargetRef, out_events: &mut Vec<Event>) {
        let Some(enemy) = pooled_enemy_mut(&self.enemy_index, &mut self.enemies, enemy_id) else {
            return;
        };
        if !enemy.is_alive() {
            return;
        }
        let TargetRef::Turret(turret_id) = target else {
            enemy.force_move_to_cafe(out_events);
            return;
        };
        let valid = self
            .turrets
            .get(turret_id)
            .map_or(false, |turret| turret.state != TurretState::Destroyed);
        if !valid {
            debug!(
                "enemy {} ignored retarget to missing turret {}",
                enemy_id.get(),
                turret_id.get()
            );
            return;
        }
        match enemy.state {
            EnemyState::AttackingCafe => {
                debug!("enemy {} keeps attacking the cafe", enemy_id.get());
            }
            EnemyState::AttackingTurret if enemy.target == Some(target) => {}
            _ => {
                let _ = enemy.transition(EnemyState::MovingToTurret, out_events);
                enemy.retarget(target, out_events);
            }
        }
    }

    fn damage_enemy(&mut self, enemy_id: EnemyId, amount: f32, out_events: &mut Vec<Event>) {
        let delay = self.config.death_effect;
        let Some(enemy) = pooled_enemy_mut(&self.enemy_index, &mut self.enemies, enemy_id) else {
            return;
        };
        if enemy.take_damage(amount, out_events) {
            let token = enemy.token.clone();
            self.timeline
                .delay(delay, &token, Deferred::FinishDying(enemy_id));
        }
    }

    fn finish_dying(&mut self, enemy_id: EnemyId, out_events: &mut Vec<Event>) {
        let Some(enemy) = pooled_enemy_mut(&self.enemy_index, &mut self.enemies, enemy_id) else {
            return;
        };
        if !enemy.transition(EnemyState::Dead, out_events) {
            return;
        }
        let (kind, position, token) = (enemy.kind, enemy.position, enemy.token.clone());

        let reward = enemy
            .take_subscriptions()
            .into_iter()
            .fold(CurrencyAmounts::ZERO, |total, subscription| match subscription {
                Subscription::DeathReward(amounts) => total.saturating_add(amounts),
            });
        out_events.push(Event::EnemyDied {
            enemy: enemy_id,
            kind,
            position,
            reward,
        });
        if !reward.is_zero() {
            let balances = self.ledger.add(reward);
            out_events.push(Event::CurrencyChanged { balances });
        }
        self.timeline.delay(
            self.config.corpse_removal,
            &token,
            Deferred::ReleaseEnemy(enemy_id),
        );
    }

    fn release_enemy(&mut self, enemy_id: EnemyId, out_events: &mut Vec<Event>) {
        let Some((kind, key)) = self.enemy_index.remove(&enemy_id) else {
            return;
        };
        let released = self
            .enemies
            .get_mut(kind)
            .map_or(false, |pool| pool.release(key).is_ok());
        if released {
            out_events.push(Event::EnemyDespawned { enemy: enemy_id });
        }
    }

    fn spawn_drop(&mut self, position: Vec2, impulse: Vec2, out_events: &mut Vec<Event>) {
        let Ok(key) = self.drops.acquire() else {
            return;
        };
        let id = DropId::new(self.next_drop_id);
        self.next_drop_id = self.next_drop_id.wrapping_add(1);
        let Some(item) = self.drops.get_mut(key) else {
            return;
        };
        item.id = Some(id);
        item.position = position;
        item.velocity = impulse;
        let token = item.token.clone();

        let _ = self.drop_index.insert(id, key);
        self.timeline
            .delay(self.config.drop_lifetime, &token, Deferred::ExpireDrop(id));
        out_events.push(Event::DropSpawned { drop: id, position });
        out_events.push(Event::EffectRequested {
            effect: EffectKind::ItemDropped,
            position,
        });
    }

    fn collect_drop(&mut self, drop: DropId, out_events: &mut Vec<Event>) {
        if !self.release_drop(drop) {
            debug!("drop {} is no longer on the field", drop.get());
            return;
        }
        let reward = self.config.drop_reward;
        let balances = self.ledger.add(reward);
        out_events.push(Event::DropCollected { drop, reward });
        out_events.push(Event::CurrencyChanged { balances });
    }

    fn release_drop(&mut self, drop: DropId) -> bool {
        match self.drop_index.remove(&drop) {
            Some(key) => self.drops.release(key).is_ok(),
            None => false,
        }
    }

    fn reset_battlefield(&mut self, out_events: &mut Vec<Event>) {
        let retired = self.turrets.clear();
        let returned = self.enemies.release_all();
        self.enemy_index.clear();
        let _ = self.projectiles.release_all();
        let _ = self.drops.release_all();
        self.drop_index.clear();
        self.timeline.clear();
        self.cafe.restore();
        info!("battlefield reset: {retired} turrets retired, {returned} enemies returned");
        out_events.push(Event::BattlefieldReset);
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::Tick { dt } => world.tick(dt, out_events),
        Command::SetTimeScale { scale } => {
            let scale = if scale.is_finite() {
                scale.clamp(0.0, MAX_TIME_SCALE)
            } else {
                warn!("ignoring non-finite time scale");
                return;
            };
            if scale != world.time_scale {
                world.time_scale = scale;
                out_events.push(Event::TimeScaleChanged { scale });
            }
        }
        Command::SetGamePhase { phase } => {
            if phase != world.phase {
                let from = world.phase;
                world.phase = phase;
                info!("game phase {from:?} -> {phase:?}");
                out_events.push(Event::GamePhaseChanged { from, to: phase });
            }
        }
        Command::PlaceTurret {
            kind,
            position,
            orientation,
        } => {
            let turret = world.turrets.insert(kind, position, orientation);
            out_events.push(Event::TurretPlaced {
                turret,
                kind,
                position,
            });
        }
        Command::EndPlacement { turret } => world.end_placement(turret),
        Command::MoveTurret { turret, position } => world.move_turret(turret, position, out_events),
        Command::SetTurretTarget { turret, target } => {
            world.set_turret_target(turret, target, out_events);
        }
        Command::FireTurret { turret, target } => world.fire_turret(turret, target, out_events),
        Command::DamageTurret { turret, amount } => world.damage_turret(turret, amount, out_events),
        Command::HealTurret { turret, amount } => {
            if let Some(turret) = world.turrets.get_mut(turret) {
                turret.heal(amount, out_events);
            }
        }
        Command::UpgradeTurret {
            turret,
            attack_multiplier,
            speed_multiplier,
            hp_multiplier,
        } => {
            if let Some(turret) = world.turrets.get_mut(turret) {
                turret.upgrade_stats(attack_multiplier, speed_multiplier, hp_multiplier, out_events);
            }
        }
        Command::StartCombining { turret } => {
            if let Some(turret) = world.turrets.get_mut(turret) {
                let _ = turret.start_combining(out_events);
            }
        }
        Command::EndCombining { turret } => {
            if let Some(turret) = world.turrets.get_mut(turret) {
                turret.end_combining(out_events);
            }
        }
        Command::ApplyCombination { turret, item } => {
            world.apply_combination(turret, item, out_events);
        }
        Command::SpawnEnemy { kind, position } => world.spawn_enemy(kind, position, out_events),
        Command::RetargetEnemy { enemy, target } => world.retarget_enemy(enemy, target, out_events),
        Command::DamageEnemy { enemy, amount } => world.damage_enemy(enemy, amount, out_events),
        Command::ForceEnemyToCafe { enemy } => {
            if let Some(enemy) = pooled_enemy_mut(&world.enemy_index, &mut world.enemies, enemy) {
                enemy.force_move_to_cafe(out_events);
            }
        }
        Command::SpawnDrop { position, impulse } => world.spawn_drop(position, impulse, out_events),
        Command::CollectDrop { drop } => world.collect_drop(drop, out_events),
        Command::Credit { amounts } => {
            if !amounts.is_zero() {
                let balances = world.ledger.add(amounts);
                out_events.push(Event::CurrencyChanged { balances });
            }
        }
        Command::Spend { amounts } => {
            if world.ledger.spend(amounts) {
                out_events.push(Event::CurrencyChanged {
                    balances: world.ledger.balances(),
                });
            } else {
                out_events.push(Event::SpendRejected {
                    requested: amounts,
                    balances: world.ledger.balances(),
                });
            }
        }
        Command::LaunchWave { wave } => {
            info!("wave {} launched", wave.number());
            out_events.push(Event::WaveLaunched { wave });
        }
        Command::PersistLedger => out_events.push(Event::LedgerPersistRequested {
            snapshot: world.ledger.balances(),
        }),
        Command::ResetBattlefield => world.reset_battlefield(out_events),
    }
}

fn pooled_enemy<'a>(
    index: &EnemyIndex,
    pools: &'a PoolRegistry<EnemyKind, Enemy>,
    enemy: EnemyId,
) -> Option<&'a Enemy> {
    let (kind, key) = index.get(&enemy)?;
    pools.get(*kind)?.get(*key)
}

fn pooled_enemy_mut<'a>(
    index: &EnemyIndex,
    pools: &'a mut PoolRegistry<EnemyKind, Enemy>,
    enemy: EnemyId,
) -> Option<&'a mut Enemy> {
    let (kind, key) = index.get(&enemy)?;
    pools.get_mut(*kind)?.get_mut(*key)
}

/// Heads for the nearest turret in detection range, or the cafe when there is none.
fn pursue_nearest_turret(enemy: &mut Enemy, turrets: &TurretRegistry, out_events: &mut Vec<Event>) {
    match turrets.nearest_engageable(enemy.position, enemy.stats.detection_range) {
        Some(turret) => {
            let _ = enemy.transition(EnemyState::MovingToTurret, out_events);
            enemy.retarget(TargetRef::Turret(turret), out_events);
        }
        None => {
            let _ = enemy.transition(EnemyState::MovingToCafe, out_events);
            enemy.retarget(TargetRef::Cafe, out_events);
        }
    }
}

fn scale_duration(dt: Duration, scale: f32) -> Duration {
    if scale == 1.0 {
        return dt;
    }
    Duration::try_from_secs_f64(dt.as_secs_f64() * f64::from(scale)).unwrap_or(Duration::ZERO)
}

/// Moves toward `to` by at most `travel`, stopping `stop_distance` short of it.
fn step_toward(from: Vec2, to: Vec2, travel: f32, stop_distance: f32) -> Vec2 {
    let offset = to - from;
    let distance = offset.length();
    let available = distance - stop_distance;
    if available <= 0.0 || distance <= f32::EPSILON {
        return from;
    }
    from + offset / distance * travel.min(available)
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use cafe_defence_core::{
        Currency, CurrencyAmounts, DropId, EnemyId, EnemyKind, EnemyView, GamePhase, Health,
        ItemKind, TurretId, TurretView, Vec2,
    };
    use cafe_defence_pool::PoolStats;
    use cafe_defence_system_combination::RecipeBook;

    use super::{pooled_enemy, World};

    /// Retrieves the welcome banner that adapters may display to players.
    #[must_use]
    pub fn welcome_banner(world: &World) -> &'static str {
        world.banner
    }

    /// Captures a read-only view of every turret on the field.
    #[must_use]
    pub fn turret_view(world: &World) -> TurretView {
        TurretView::from_snapshots(world.turrets.iter().map(|turret| turret.snapshot()).collect())
    }

    /// Captures a read-only view of every enemy drawn from the pools.
    #[must_use]
    pub fn enemy_view(world: &World) -> EnemyView {
        EnemyView::from_snapshots(
            world
                .enemy_index
                .keys()
                .filter_map(|id| pooled_enemy(&world.enemy_index, &world.enemies, *id))
                .map(|enemy| enemy.snapshot())
                .collect(),
        )
    }

    /// Number of enemies that are neither dying nor dead.
    #[must_use]
    pub fn live_enemy_count(world: &World) -> usize {
        world
            .enemy_index
            .keys()
            .filter_map(|id| pooled_enemy(&world.enemy_index, &world.enemies, *id))
            .filter(|enemy| enemy.is_alive())
            .count()
    }

    /// Subscriptions currently wired to an enemy.
    #[must_use]
    pub fn enemy_subscriptions(world: &World, enemy: EnemyId) -> Option<usize> {
        pooled_enemy(&world.enemy_index, &world.enemies, enemy).map(|enemy| enemy.subscription_count())
    }

    /// Lifetime counters of the pool serving `kind`.
    #[must_use]
    pub fn enemy_pool_stats(world: &World, kind: EnemyKind) -> Option<PoolStats> {
        world.enemies.get(kind).map(|pool| pool.stats())
    }

    /// Outstanding enemy acquisitions across every pool, including corpses.
    #[must_use]
    pub fn pooled_enemy_count(world: &World) -> usize {
        world.enemies.active_count()
    }

    /// Projectiles in flight.
    #[must_use]
    pub fn projectile_count(world: &World) -> usize {
        world.projectiles.active_count()
    }

    /// Position of a drop item currently on the field.
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct DropSnapshot {
        /// Identifier of the drop.
        pub id: DropId,
        /// Current position.
        pub position: Vec2,
    }

    /// Drop items on the field, ordered by identifier.
    #[must_use]
    pub fn drops(world: &World) -> Vec<DropSnapshot> {
        let mut drops: Vec<DropSnapshot> = world
            .drops
            .iter()
            .filter_map(|(_, item)| {
                item.id.map(|id| DropSnapshot {
                    id,
                    position: item.position,
                })
            })
            .collect();
        drops.sort_by_key(|drop| drop.id);
        drops
    }

    /// Current balances of the ledger.
    #[must_use]
    pub fn balances(world: &World) -> CurrencyAmounts {
        world.ledger.balances()
    }

    /// Current balance of a single currency.
    #[must_use]
    pub fn balance(world: &World, currency: Currency) -> u64 {
        world.ledger.get(currency)
    }

    /// Phase last recorded by the game loop.
    #[must_use]
    pub fn game_phase(world: &World) -> GamePhase {
        world.phase
    }

    /// Multiplier applied to ticks.
    #[must_use]
    pub fn time_scale(world: &World) -> f32 {
        world.time_scale
    }

    /// Position of the cafe objective.
    #[must_use]
    pub fn cafe_position(world: &World) -> Vec2 {
        world.cafe.position
    }

    /// Hit points of the cafe objective.
    #[must_use]
    pub fn cafe_health(world: &World) -> Health {
        world.cafe.health
    }

    /// Recipes used by combinations.
    #[must_use]
    pub fn recipes(world: &World) -> &RecipeBook {
        &world.recipes
    }

    /// Reports whether dropping `item` on `turret` would combine.
    #[must_use]
    pub fn can_combine(world: &World, turret: TurretId, item: ItemKind) -> bool {
        world.turrets.get(turret).map_or(false, |turret| {
            turret.state.is_operational() && world.recipes.can_combine(turret.kind, item)
        })
    }

    /// Number of deferred actions waiting on the timeline.
    #[must_use]
    pub fn pending_actions(world: &World) -> usize {
        world.timeline.len()
    }

    /// Reports whether [`World::dispose`] already ran.
    #[must_use]
    pub fn is_disposed(world: &World) -> bool {
        world.disposed
    }
}
