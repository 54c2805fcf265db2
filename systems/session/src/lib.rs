#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Session wiring for Cafe Defence.
//!
//! A [`Session`] owns the world, the level data, every system, and the outer
//! collaborators. Each call applies commands to the world and feeds the
//! resulting events back through the systems until nothing new is produced.

mod config;

use std::time::Duration;

use cafe_defence_core::{
    Command, CurrencyAmounts, CurrencyStore, DropId, EffectPlayer, Event, GamePhase, ItemKind,
    LedgerSnapshot, LevelDefinition, TurretId, TurretKind, Vec2, VisualFeedback, WaveIndex,
};
use cafe_defence_system_combination::RecipeBook;
use cafe_defence_system_enemy_targeting::EnemyTargeting;
use cafe_defence_system_game_loop::GameLoop;
use cafe_defence_system_spawning::Spawning;
use cafe_defence_system_turret_combat::TurretCombat;
use cafe_defence_system_turret_targeting::TurretTargeting;
use cafe_defence_world::{self as world, query, World};

pub use cafe_defence_world::DisposeReport;
use log::{debug, error, info, warn};

pub use config::{
    ConfigError, Overflow, SessionConfig, SpawningSection, TargetingSection, WavesSection,
    WorldSection,
};

/// Rounds of command application allowed within a single call.
const MAX_ROUNDS: usize = 64;

/// Running game: world, systems, and collaborators.
#[derive(Debug)]
pub struct Session<S, P> {
    world: World,
    level: LevelDefinition,
    turret_targeting: TurretTargeting,
    turret_combat: TurretCombat,
    enemy_targeting: EnemyTargeting,
    spawning: Spawning,
    game_loop: GameLoop,
    store: S,
    presentation: P,
}

impl<S, P> Session<S, P>
where
    S: CurrencyStore,
    P: VisualFeedback + EffectPlayer,
{
    /// Builds a session and restores the persisted currency balances.
    ///
    /// An unreadable store is logged and the session starts with empty balances.
    pub fn new(
        config: &SessionConfig,
        level: LevelDefinition,
        recipes: RecipeBook,
        store: S,
        presentation: P,
    ) -> Self {
        let world = World::new(config.world_config(), level.cafe, recipes);
        let game_loop = GameLoop::new(config.game_loop(), &level);
        let mut session = Self {
            world,
            level,
            turret_targeting: TurretTargeting::new(config.turret_targeting()),
            turret_combat: TurretCombat::new(),
            enemy_targeting: EnemyTargeting::new(config.enemy_targeting()),
            spawning: Spawning::new(config.spawning()),
            game_loop,
            store,
            presentation,
        };

        match session.store.load() {
            Ok(snapshot) if !snapshot.is_zero() => {
                info!("restored balances {snapshot:?}");
                let _ = session.execute(vec![Command::Credit { amounts: snapshot }]);
            }
            Ok(_) => debug!("no persisted balances"),
            Err(err) => error!("failed to load balances: {err}"),
        }
        session
    }

    /// Read-only access to the world for queries.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Level the session plays.
    #[must_use]
    pub const fn level(&self) -> &LevelDefinition {
        &self.level
    }

    /// Current phase of the wave loop.
    #[must_use]
    pub const fn phase(&self) -> GamePhase {
        self.game_loop.phase()
    }

    /// Wave being prepared or fought.
    #[must_use]
    pub const fn wave(&self) -> WaveIndex {
        self.game_loop.wave()
    }

    /// Enemies killed during the current wave.
    #[must_use]
    pub fn kills(&self) -> u32 {
        self.game_loop.kills()
    }

    /// Time left before the next wave starts, while preparing.
    #[must_use]
    pub fn countdown_remaining(&self) -> Option<Duration> {
        self.game_loop.countdown_remaining()
    }

    /// Current currency balances.
    #[must_use]
    pub fn balances(&self) -> CurrencyAmounts {
        query::balances(&self.world)
    }

    /// Persistence collaborator.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Presentation collaborator.
    #[must_use]
    pub const fn presentation(&self) -> &P {
        &self.presentation
    }

    /// Advances the simulation by one host frame.
    pub fn tick(&mut self, dt: Duration) -> Vec<Event> {
        self.execute(vec![Command::Tick { dt }])
    }

    /// Leaves `NotStarted` and begins preparing the first wave.
    pub fn start_game(&mut self) -> Vec<Event> {
        let mut commands = Vec::new();
        self.game_loop.start_game(&mut commands);
        self.execute(commands)
    }

    /// Freezes time and remembers the interrupted phase.
    pub fn pause_game(&mut self) -> Vec<Event> {
        let mut commands = Vec::new();
        self.game_loop.pause_game(&mut commands);
        self.execute(commands)
    }

    /// Restores the phase interrupted by [`Session::pause_game`].
    pub fn resume_game(&mut self) -> Vec<Event> {
        let mut commands = Vec::new();
        self.game_loop.resume_game(&mut commands);
        self.execute(commands)
    }

    /// Clears the battlefield and prepares the first wave again.
    pub fn restart_game(&mut self) -> Vec<Event> {
        let mut commands = Vec::new();
        self.game_loop.restart_game(&mut commands);
        self.execute(commands)
    }

    /// Ends the game as lost.
    pub fn trigger_game_over(&mut self) -> Vec<Event> {
        let mut commands = Vec::new();
        self.game_loop.trigger_game_over(&mut commands);
        self.execute(commands)
    }

    /// Skips the remaining preparation countdown.
    pub fn begin_wave_now(&mut self) -> Vec<Event> {
        let mut commands = Vec::new();
        self.game_loop.begin_wave_now(&mut commands);
        self.execute(commands)
    }

    /// Adds `amounts` to the balances.
    pub fn credit(&mut self, amounts: CurrencyAmounts) -> Vec<Event> {
        self.execute(vec![Command::Credit { amounts }])
    }

    /// Spends every amount at once, or nothing when any balance is short.
    pub fn spend(&mut self, amounts: CurrencyAmounts) -> bool {
        let events = self.execute(vec![Command::Spend { amounts }]);
        !events
            .iter()
            .any(|event| matches!(event, Event::SpendRejected { .. }))
    }

    /// Places a turret in its placement state without charging for it.
    pub fn place_turret(
        &mut self,
        kind: TurretKind,
        position: Vec2,
        orientation: f32,
    ) -> Option<TurretId> {
        let events = self.execute(vec![Command::PlaceTurret {
            kind,
            position,
            orientation,
        }]);
        events.iter().find_map(|event| match event {
            Event::TurretPlaced { turret, .. } => Some(*turret),
            _ => None,
        })
    }

    /// Charges the coin cost of `kind` and places it, refusing on insufficient funds.
    pub fn place_turret_for_sale(
        &mut self,
        kind: TurretKind,
        position: Vec2,
        orientation: f32,
    ) -> Option<TurretId> {
        let cost = CurrencyAmounts::coins(kind.stats().cost);
        if !self.spend(cost) {
            info!("cannot afford {kind} for {cost:?}");
            return None;
        }
        self.place_turret(kind, position, orientation)
    }

    /// Signals the end of placement input; the turret activates after a delay.
    pub fn end_placement(&mut self, turret: TurretId) -> Vec<Event> {
        self.execute(vec![Command::EndPlacement { turret }])
    }

    /// Relocates a turret when its state allows it.
    pub fn move_turret(&mut self, turret: TurretId, position: Vec2) -> bool {
        let events = self.execute(vec![Command::MoveTurret { turret, position }]);
        events
            .iter()
            .any(|event| matches!(event, Event::TurretMoved { turret: moved, .. } if *moved == turret))
    }

    /// Reports whether dropping `item` on `turret` would combine.
    #[must_use]
    pub fn can_combine(&self, turret: TurretId, item: ItemKind) -> bool {
        query::can_combine(&self.world, turret, item)
    }

    /// Combines `item` into `turret`, returning the replacement turret.
    pub fn apply_combination(&mut self, turret: TurretId, item: ItemKind) -> Option<TurretId> {
        let events = self.execute(vec![Command::ApplyCombination { turret, item }]);
        events.iter().find_map(|event| match event {
            Event::TurretCombined {
                retired, created, ..
            } if *retired == turret => Some(*created),
            _ => None,
        })
    }

    /// Picks up a drop item, crediting its reward.
    pub fn collect_drop(&mut self, drop: DropId) -> bool {
        let events = self.execute(vec![Command::CollectDrop { drop }]);
        events
            .iter()
            .any(|event| matches!(event, Event::DropCollected { drop: collected, .. } if *collected == drop))
    }

    /// Persists the balances ahead of an application pause or quit.
    pub fn suspend(&mut self) {
        let snapshot = query::balances(&self.world);
        self.persist(snapshot);
    }

    /// Persists the balances, stops every system, and tears down the world pools.
    ///
    /// The session ignores every later call. A second shutdown reports nothing.
    pub fn shutdown(&mut self) -> DisposeReport {
        if query::is_disposed(&self.world) {
            debug!("session already shut down");
            return DisposeReport::default();
        }
        if !self.phase().is_terminal() {
            self.suspend();
        }
        self.turret_targeting.stop();
        self.enemy_targeting.stop();
        self.spawning.stop();
        self.game_loop.stop();
        let report = self.world.dispose();
        info!("session shut down during {:?}: {report:?}", self.phase());
        report
    }

    /// Applies `commands` and routes the resulting events through every system
    /// until the round produces no further commands.
    fn execute(&mut self, mut commands: Vec<Command>) -> Vec<Event> {
        if query::is_disposed(&self.world) {
            debug!("ignoring {} commands after shutdown", commands.len());
            return Vec::new();
        }
        let mut log = Vec::new();
        let mut rounds = 0;
        while !commands.is_empty() {
            rounds += 1;
            if rounds > MAX_ROUNDS {
                warn!(
                    "dropping {} commands after {MAX_ROUNDS} rounds",
                    commands.len()
                );
                break;
            }

            let mut events = Vec::new();
            for command in commands.drain(..) {
                world::apply(&mut self.world, command, &mut events);
            }
            self.notify(&events);
            self.run_systems(&events, &mut commands);
            log.extend(events);
        }
        log
    }

    fn run_systems(&mut self, events: &[Event], out: &mut Vec<Command>) {
        if events.is_empty() {
            return;
        }
        let turrets = query::turret_view(&self.world);
        let enemies = query::enemy_view(&self.world);
        self.turret_targeting
            .handle(events, &turrets, &enemies, out);
        self.turret_combat.handle(events, &turrets, out);
        self.enemy_targeting
            .handle(events, &turrets, &enemies, out);
        self.spawning.handle(events, &self.level, out);
        self.game_loop
            .handle(events, query::live_enemy_count(&self.world), out);
    }

    fn notify(&mut self, events: &[Event]) {
        for event in events {
            match event {
                Event::HighlightChanged {
                    entity,
                    active,
                    color,
                    intensity,
                } => self
                    .presentation
                    .set_highlight(*entity, *active, *color, *intensity),
                Event::EffectRequested { effect, position } => {
                    self.presentation.play_effect(*effect, *position);
                }
                Event::LedgerPersistRequested { snapshot } => self.persist(*snapshot),
                _ => {}
            }
        }
    }

    fn persist(&mut self, snapshot: LedgerSnapshot) {
        match self.store.save(&snapshot) {
            Ok(()) => debug!("persisted balances {snapshot:?}"),
            Err(err) => error!("failed to persist balances: {err}"),
        }
    }
}
