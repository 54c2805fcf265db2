#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Shared vocabulary of Cafe Defence: ids, kinds, state machines, and messages.
//!
//! Turrets guard a cafe against waves of enemies. Everything that may change
//! the battlefield is a [`Command`]; everything that did change is an
//! [`Event`]. The world crate is the only place commands are executed, and
//! the gameplay systems only ever see events plus the [`TurretView`] and
//! [`EnemyView`] snapshots taken after each batch.
//!
//! The legal edges of every lifecycle live here too ([`TurretState`],
//! [`EnemyState`], [`GamePhase`]), alongside the level format, the currency
//! ledger contract, and the traits used to reach presentation and storage.

use std::time::Duration;

pub use glam::Vec2;
use serde::{Deserialize, Serialize};

mod currency;
mod kinds;
mod level;
mod presentation;
mod state;

pub use currency::{Currency, CurrencyAmounts, CurrencyStore, LedgerSnapshot, MemoryStore, StoreError};
pub use kinds::{EnemyKind, EnemyStats, ItemKind, Kind, ParseKindError, TurretKind, TurretStats};
pub use level::{
    CafeDefinition, EnemyGroup, LevelDefinition, LevelError, WaveDefinition, WaveIndex,
};
pub use presentation::{
    EffectKind, EffectPlayer, EntityRef, HighlightColor, NullPresentation, VisualFeedback,
};
pub use state::{EnemyState, GamePhase, Health, TurretState};

/// Greeting printed by adapters before the first wave.
pub const WELCOME_BANNER: &str = "The cafe opens. Hold the counter until the last wave.";

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Advances the simulation clock by the provided delta time.
    Tick {
        /// Unscaled duration that elapsed since the previous tick.
        dt: Duration,
    },
    /// Sets the multiplier applied to every subsequent tick.
    SetTimeScale {
        /// Zero freezes simulated time.
        scale: f32,
    },
    /// Records the phase the game loop entered.
    SetGamePhase {
        /// Phase that became active.
        phase: GamePhase,
    },
    /// Places a new turret in the placement state.
    PlaceTurret {
        /// Kind of turret to create.
        kind: TurretKind,
        /// World position of the turret.
        position: Vec2,
        /// Heading in radians.
        orientation: f32,
    },
    /// Signals that placement input ended, starting the activation delay.
    EndPlacement {
        /// Turret being placed.
        turret: TurretId,
    },
    /// Relocates a turret.
    MoveTurret {
        /// Turret to move.
        turret: TurretId,
        /// New world position.
        position: Vec2,
    },
    /// Assigns or clears the target of a turret.
    SetTurretTarget {
        /// Turret being retargeted.
        turret: TurretId,
        /// New target, if any.
        target: Option<EnemyId>,
    },
    /// Fires a projectile from a turret whose cooldown elapsed.
    FireTurret {
        /// Turret that fires.
        turret: TurretId,
        /// Enemy the projectile homes on.
        target: EnemyId,
    },
    /// Applies damage to a turret.
    DamageTurret {
        /// Turret to damage.
        turret: TurretId,
        /// Hit points to remove.
        amount: f32,
    },
    /// Restores hit points of a turret.
    HealTurret {
        /// Turret to heal.
        turret: TurretId,
        /// Hit points to restore.
        amount: f32,
    },
    /// Multiplies turret statistics.
    UpgradeTurret {
        /// Turret to upgrade.
        turret: TurretId,
        /// Multiplier applied to attack power.
        attack_multiplier: f32,
        /// Multiplier applied to attack speed.
        speed_multiplier: f32,
        /// Multiplier applied to maximum hit points.
        hp_multiplier: f32,
    },
    /// Locks a turret into the combining state.
    StartCombining {
        /// Turret being combined.
        turret: TurretId,
    },
    /// Releases a turret from the combining state.
    EndCombining {
        /// Turret being released.
        turret: TurretId,
    },
    /// Consumes an item on a turret, replacing it with the recipe result.
    ApplyCombination {
        /// Turret the item was dropped on.
        turret: TurretId,
        /// Item consumed by the combination.
        item: ItemKind,
    },
    /// Acquires an enemy from its pool at the provided position.
    SpawnEnemy {
        /// Kind of enemy, which also selects the pool.
        kind: EnemyKind,
        /// Spawn position.
        position: Vec2,
    },
    /// Points an enemy at a new target.
    RetargetEnemy {
        /// Enemy being retargeted.
        enemy: EnemyId,
        /// New target.
        target: TargetRef,
    },
    /// Applies damage to an enemy.
    DamageEnemy {
        /// Enemy to damage.
        enemy: EnemyId,
        /// Health to remove.
        amount: f32,
    },
    /// Sends an enemy straight to the cafe, dropping any turret target.
    ForceEnemyToCafe {
        /// Enemy to redirect.
        enemy: EnemyId,
    },
    /// Acquires a drop item and launches it with an impulse.
    SpawnDrop {
        /// Position the item appears at.
        position: Vec2,
        /// Initial velocity.
        impulse: Vec2,
    },
    /// Collects a drop item before it expires.
    CollectDrop {
        /// Drop being collected.
        drop: DropId,
    },
    /// Credits currency to the ledger.
    Credit {
        /// Amounts to add.
        amounts: CurrencyAmounts,
    },
    /// Debits currency from the ledger, all or nothing.
    Spend {
        /// Amounts to remove.
        amounts: CurrencyAmounts,
    },
    /// Announces the start of a wave to spawning systems.
    LaunchWave {
        /// Wave that starts.
        wave: WaveIndex,
    },
    /// Requests that the ledger be persisted.
    PersistLedger,
    /// Retires every turret and returns every pooled entity.
    ResetBattlefield,
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Scaled duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Confirms a new time scale.
    TimeScaleChanged {
        /// Active multiplier.
        scale: f32,
    },
    /// Announces that the game loop changed phase.
    GamePhaseChanged {
        /// Previous phase.
        from: GamePhase,
        /// Phase now active.
        to: GamePhase,
    },
    /// Confirms that a turret was placed.
    TurretPlaced {
        /// Identifier assigned by the world.
        turret: TurretId,
        /// Kind of turret.
        kind: TurretKind,
        /// World position.
        position: Vec2,
    },
    /// Reports a turret lifecycle transition.
    TurretStateChanged {
        /// Turret that transitioned.
        turret: TurretId,
        /// Previous state.
        from: TurretState,
        /// New state.
        to: TurretState,
    },
    /// Reports a change of turret target.
    TurretTargetChanged {
        /// Turret whose target changed.
        turret: TurretId,
        /// New target, if any.
        target: Option<EnemyId>,
    },
    /// Confirms that a turret fired.
    TurretFired {
        /// Turret that fired.
        turret: TurretId,
        /// Enemy targeted by the projectile.
        target: EnemyId,
    },
    /// Reports damage dealt to a turret.
    TurretDamaged {
        /// Damaged turret.
        turret: TurretId,
        /// Hit points removed.
        amount: f32,
        /// Hit points left.
        remaining: f32,
    },
    /// Reports hit points restored to a turret.
    TurretHealed {
        /// Healed turret.
        turret: TurretId,
        /// Hit points restored.
        amount: f32,
    },
    /// Confirms a stat upgrade.
    TurretUpgraded {
        /// Upgraded turret.
        turret: TurretId,
        /// Statistics after the upgrade.
        stats: TurretStats,
    },
    /// Reports that a turret reached zero hit points.
    TurretDestroyed {
        /// Destroyed turret.
        turret: TurretId,
        /// Kind of the destroyed turret.
        kind: TurretKind,
        /// Last position.
        position: Vec2,
    },
    /// Confirms a relocation.
    TurretMoved {
        /// Moved turret.
        turret: TurretId,
        /// New position.
        position: Vec2,
    },
    /// Reports a refused relocation.
    TurretMoveRejected {
        /// Turret that could not move.
        turret: TurretId,
        /// Reason for the refusal.
        reason: MoveError,
    },
    /// Reports that a combination replaced one turret with another.
    TurretCombined {
        /// Turret that was retired.
        retired: TurretId,
        /// Turret created from the recipe result.
        created: TurretId,
        /// Kind of the created turret.
        kind: TurretKind,
    },
    /// Reports a refused combination.
    CombinationRejected {
        /// Turret the item was dropped on.
        turret: TurretId,
        /// Item that was offered.
        item: ItemKind,
        /// Reason for the refusal.
        reason: CombinationError,
    },
    /// Confirms that an enemy entered the field.
    EnemySpawned {
        /// Identifier assigned for this life of the pooled instance.
        enemy: EnemyId,
        /// Kind of enemy.
        kind: EnemyKind,
        /// Spawn position.
        position: Vec2,
    },
    /// Reports a dropped spawn request.
    SpawnRejected {
        /// Requested kind.
        kind: EnemyKind,
        /// Reason for the refusal.
        reason: SpawnError,
    },
    /// Reports an enemy lifecycle transition.
    EnemyStateChanged {
        /// Enemy that transitioned.
        enemy: EnemyId,
        /// Previous state.
        from: EnemyState,
        /// New state.
        to: EnemyState,
    },
    /// Reports a change of enemy target.
    EnemyRetargeted {
        /// Enemy whose target changed.
        enemy: EnemyId,
        /// New target.
        target: TargetRef,
    },
    /// Reports damage dealt to an enemy.
    EnemyDamaged {
        /// Damaged enemy.
        enemy: EnemyId,
        /// Health removed.
        amount: f32,
        /// Health left.
        remaining: f32,
    },
    /// Reports that an enemy finished dying and paid out its reward.
    EnemyDied {
        /// Enemy that died.
        enemy: EnemyId,
        /// Kind of enemy.
        kind: EnemyKind,
        /// Position of death.
        position: Vec2,
        /// Currency credited for the kill.
        reward: CurrencyAmounts,
    },
    /// Confirms that a dead enemy returned to its pool.
    EnemyDespawned {
        /// Enemy whose life ended.
        enemy: EnemyId,
    },
    /// Reports damage dealt to the cafe.
    CafeDamaged {
        /// Hit points removed.
        amount: f32,
        /// Hit points left.
        remaining: f32,
    },
    /// Reports that the cafe fell.
    CafeDestroyed,
    /// Confirms that a drop item appeared.
    DropSpawned {
        /// Identifier of the drop.
        drop: DropId,
        /// Spawn position.
        position: Vec2,
    },
    /// Confirms a collected drop.
    DropCollected {
        /// Collected drop.
        drop: DropId,
        /// Currency credited.
        reward: CurrencyAmounts,
    },
    /// Reports a drop that was never collected and returned to its pool.
    DropExpired {
        /// Expired drop.
        drop: DropId,
    },
    /// Reports the balances after a ledger mutation.
    CurrencyChanged {
        /// Balances after the mutation.
        balances: CurrencyAmounts,
    },
    /// Reports a spend that exceeded the balances and changed nothing.
    SpendRejected {
        /// Amounts that were requested.
        requested: CurrencyAmounts,
        /// Balances left untouched.
        balances: CurrencyAmounts,
    },
    /// Confirms that a wave started.
    WaveLaunched {
        /// Wave that started.
        wave: WaveIndex,
    },
    /// Requests an effect from the presentation collaborator.
    EffectRequested {
        /// Effect to play.
        effect: EffectKind,
        /// World position.
        position: Vec2,
    },
    /// Requests a highlight change from the presentation collaborator.
    HighlightChanged {
        /// Highlighted entity.
        entity: EntityRef,
        /// Whether the highlight is shown.
        active: bool,
        /// Outline color.
        color: HighlightColor,
        /// Outline intensity in `[0, 1]`.
        intensity: f32,
    },
    /// Requests that the persistence collaborator save the ledger.
    LedgerPersistRequested {
        /// Balances to save.
        snapshot: LedgerSnapshot,
    },
    /// Confirms that every turret was retired and every pooled entity returned.
    BattlefieldReset,
}

/// Target an enemy pursues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetRef {
    /// A turret, referenced weakly by identifier.
    Turret(TurretId),
    /// The cafe objective.
    Cafe,
}

/// Unique identifier assigned to a turret.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TurretId(u32);

impl TurretId {
    /// Creates a new turret identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the turret identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Identifier of one life of a pooled enemy instance.
///
/// A recycled instance receives a fresh identifier, so references held from a
/// previous life never resolve to the new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnemyId(u32);

impl EnemyId {
    /// Creates a new enemy identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Identifier of one life of a pooled drop item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DropId(u32);

impl DropId {
    /// Creates a new drop identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Reasons a relocation request may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MoveError {
    /// No turret with the provided identifier exists.
    MissingTurret,
    /// The turret is combining or destroyed.
    Locked,
}

/// Reasons a combination request may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CombinationError {
    /// No turret with the provided identifier exists.
    MissingTurret,
    /// The turret is neither idle nor active.
    InvalidState,
    /// No recipe accepts the turret and item kinds.
    NoMatchingRecipe,
}

/// Reasons a spawn request may be dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpawnError {
    /// No pool was registered for the requested kind.
    UnregisteredPool,
    /// The pool could not produce an instance.
    PoolExhausted,
}

/// Immutable representation of a single turret's state used for queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TurretSnapshot {
    /// Identifier allocated to the turret by the world.
    pub id: TurretId,
    /// Kind of turret.
    pub kind: TurretKind,
    /// Lifecycle state.
    pub state: TurretState,
    /// World position.
    pub position: Vec2,
    /// Heading in radians.
    pub orientation: f32,
    /// Hit points.
    pub health: Health,
    /// Current statistics including upgrades.
    pub stats: TurretStats,
    /// Enemy currently engaged, if any.
    pub target: Option<EnemyId>,
    /// Remaining cooldown before the next shot.
    pub ready_in: Duration,
}

/// Read-only snapshot describing all turrets on the field.
#[derive(Clone, Debug, Default)]
pub struct TurretView {
    snapshots: Vec<TurretSnapshot>,
}

impl TurretView {
    /// Creates a new turret view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<TurretSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured turret snapshots in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &TurretSnapshot> {
        self.snapshots.iter()
    }

    /// Looks up the snapshot of a turret.
    #[must_use]
    pub fn get(&self, turret: TurretId) -> Option<&TurretSnapshot> {
        self.snapshots
            .binary_search_by_key(&turret, |snapshot| snapshot.id)
            .ok()
            .map(|index| &self.snapshots[index])
    }

    /// Consumes the view, yielding the underlying snapshots.
    #[must_use]
    pub fn into_vec(self) -> Vec<TurretSnapshot> {
        self.snapshots
    }
}

/// Immutable representation of a single enemy's state used for queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnemySnapshot {
    /// Identifier of the current life of the enemy.
    pub id: EnemyId,
    /// Kind of enemy.
    pub kind: EnemyKind,
    /// Lifecycle state.
    pub state: EnemyState,
    /// World position.
    pub position: Vec2,
    /// Health.
    pub health: Health,
    /// Target currently pursued.
    pub target: Option<TargetRef>,
    /// Radius scanned for turrets on detection ticks.
    pub detection_range: f32,
}

/// Read-only snapshot describing all enemies currently drawn from pools.
#[derive(Clone, Debug, Default)]
pub struct EnemyView {
    snapshots: Vec<EnemySnapshot>,
}

impl EnemyView {
    /// Creates a new enemy view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<EnemySnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured enemy snapshots in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &EnemySnapshot> {
        self.snapshots.iter()
    }

    /// Looks up the snapshot of an enemy.
    #[must_use]
    pub fn get(&self, enemy: EnemyId) -> Option<&EnemySnapshot> {
        self.snapshots
            .binary_search_by_key(&enemy, |snapshot| snapshot.id)
            .ok()
            .map(|index| &self.snapshots[index])
    }

    /// Number of enemies that are still alive.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.snapshots
            .iter()
            .filter(|snapshot| snapshot.state.is_alive())
            .count()
    }

    /// Consumes the view, yielding the underlying snapshots.
    #[must_use]
    pub fn into_vec(self) -> Vec<EnemySnapshot> {
        self.snapshots
    }
}

/// Finds the candidate closest to `origin` within `range` (inclusive).
///
/// Only strictly closer candidates replace the current best, so among equal
/// distances the first candidate yielded wins. Callers iterate views, which
/// are ordered by identifier, making the lowest identifier the tie-break.
pub fn nearest_within<T, I>(origin: Vec2, range: f32, candidates: I) -> Option<(T, f32)>
where
    I: IntoIterator<Item = (T, Vec2)>,
{
    if !(range.is_finite() && range >= 0.0) {
        return None;
    }

    let mut best: Option<(T, f32)> = None;
    for (candidate, position) in candidates {
        let distance = origin.distance(position);
        if distance > range {
            continue;
        }
        let closer = best
            .as_ref()
            .map_or(true, |(_, best_distance)| distance < *best_distance);
        if closer {
            best = Some((candidate, distance));
        }
    }
    best
}
