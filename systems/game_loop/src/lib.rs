#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Wave-driven game loop: preparation, fight, and resolution phases.
//!
//! The loop owns no world state. It watches world events, keeps a tally of the
//! running wave, and emits commands that change the phase, launch waves, pay
//! rewards, and freeze or restore the global time scale.

use std::time::Duration;

use cafe_defence_core::{
    Command, CurrencyAmounts, EnemyState, Event, GamePhase, LevelDefinition, WaveIndex,
};
use cafe_defence_scheduler::{CancellationToken, Delay, DelayStatus};
use log::{debug, info, warn};

/// Coins granted when a wave is cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RewardTable {
    base: u64,
    wave_bonus: u64,
    kill_bonus: u64,
}

impl RewardTable {
    /// Creates a table paying `base`, plus `wave_bonus` per wave number, plus
    /// `kill_bonus` per kill.
    #[must_use]
    pub const fn new(base: u64, wave_bonus: u64, kill_bonus: u64) -> Self {
        Self {
            base,
            wave_bonus,
            kill_bonus,
        }
    }

    /// Coins earned for clearing `wave` with `kills` kills.
    ///
    /// The wave bonus scales with the one-based wave number.
    #[must_use]
    pub const fn reward(&self, wave: WaveIndex, kills: u32) -> u64 {
        self.base
            .saturating_add(self.wave_bonus.saturating_mul(wave.number() as u64))
            .saturating_add(self.kill_bonus.saturating_mul(kills as u64))
    }
}

impl Default for RewardTable {
    fn default() -> Self {
        Self::new(50, 10, 5)
    }
}

/// Configuration parameters required to construct the game loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    preparation: Duration,
    stipend_base: u64,
    stipend_per_wave: u64,
    rewards: RewardTable,
}

impl Config {
    /// Creates a configuration with a `preparation` countdown and `rewards`.
    #[must_use]
    pub const fn new(preparation: Duration, rewards: RewardTable) -> Self {
        Self {
            preparation,
            stipend_base: 2,
            stipend_per_wave: 1,
            rewards,
        }
    }

    /// Overrides the tech point stipend granted when preparation begins.
    #[must_use]
    pub const fn with_stipend(mut self, base: u64, per_wave: u64) -> Self {
        self.stipend_base = base;
        self.stipend_per_wave = per_wave;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Duration::from_secs(15), RewardTable::default())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct WaveTally {
    expected: u32,
    spawned: u32,
    rejected: u32,
    kills: u32,
    settled: u32,
}

impl WaveTally {
    /// Every enemy was spawned or rejected, none is alive, and every kill paid out.
    ///
    /// A wave whose spawns were all rejected clears with no kills.
    fn is_cleared(&self, live_enemies: usize) -> bool {
        self.spawned.saturating_add(self.rejected) >= self.expected
            && live_enemies == 0
            && self.settled >= self.kills
    }
}

/// Phase machine driving the preparation, fight, and reward cycle.
#[derive(Debug)]
pub struct GameLoop {
    config: Config,
    phase: GamePhase,
    paused_from: Option<GamePhase>,
    wave: WaveIndex,
    wave_sizes: Vec<u32>,
    token: CancellationToken,
    countdown: Option<Delay>,
    tally: Option<WaveTally>,
    stopped: bool,
}

impl GameLoop {
    /// Creates a loop over the waves of `level`.
    ///
    /// A level without waves still plays one generated wave.
    #[must_use]
    pub fn new(config: Config, level: &LevelDefinition) -> Self {
        let total = level.total_waves().max(1);
        let wave_sizes = (0..total)
            .map(|index| level.wave(WaveIndex::new(index)).total_enemies())
            .collect();
        Self {
            config,
            phase: GamePhase::NotStarted,
            paused_from: None,
            wave: WaveIndex::FIRST,
            wave_sizes,
            token: CancellationToken::new(),
            countdown: None,
            tally: None,
            stopped: false,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Wave being prepared or fought.
    #[must_use]
    pub const fn wave(&self) -> WaveIndex {
        self.wave
    }

    /// Number of waves the loop plays before victory.
    #[must_use]
    pub fn total_waves(&self) -> u32 {
        u32::try_from(self.wave_sizes.len()).unwrap_or(u32::MAX)
    }

    /// Kills counted in the running wave.
    #[must_use]
    pub fn kills(&self) -> u32 {
        self.tally.map_or(0, |tally| tally.kills)
    }

    /// Time left in the preparation countdown, if one is running.
    #[must_use]
    pub fn countdown_remaining(&self) -> Option<Duration> {
        self.countdown.as_ref().map(Delay::remaining)
    }

    /// Leaves `NotStarted` and begins preparing the first wave.
    pub fn start_game(&mut self, out: &mut Vec<Command>) {
        if self.phase != GamePhase::NotStarted {
            debug!("start ignored while {:?}", self.phase);
            return;
        }
        self.enter_preparing(out);
    }

    /// Freezes global time, remembering the interrupted phase.
    pub fn pause_game(&mut self, out: &mut Vec<Command>) {
        if !self.phase.is_running() {
            debug!("pause ignored while {:?}", self.phase);
            return;
        }
        self.paused_from = Some(self.phase);
        out.push(Command::SetTimeScale { scale: 0.0 });
        self.set_phase(GamePhase::Paused, out);
    }

    /// Restores global time and returns to the interrupted phase.
    pub fn resume_game(&mut self, out: &mut Vec<Command>) {
        if self.phase != GamePhase::Paused {
            debug!("resume ignored while {:?}", self.phase);
            return;
        }
        let phase = self.paused_from.take().unwrap_or(GamePhase::Preparing);
        out.push(Command::SetTimeScale { scale: 1.0 });
        self.set_phase(phase, out);
    }

    /// Clears the battlefield and prepares the first wave again.
    pub fn restart_game(&mut self, out: &mut Vec<Command>) {
        if self.phase == GamePhase::NotStarted {
            debug!("restart ignored before the game started");
            return;
        }
        info!("restarting from wave {}", self.wave.number());
        self.token.cancel();
        self.token = CancellationToken::new();
        self.paused_from = None;
        self.tally = None;
        self.wave = WaveIndex::FIRST;
        out.push(Command::ResetBattlefield);
        out.push(Command::SetTimeScale { scale: 1.0 });
        self.enter_preparing(out);
    }

    /// Ends the game as lost. Valid from any started, non-terminal phase.
    pub fn trigger_game_over(&mut self, out: &mut Vec<Command>) {
        if self.phase == GamePhase::NotStarted || self.phase.is_terminal() {
            debug!("game over ignored while {:?}", self.phase);
            return;
        }
        warn!("game over during wave {}", self.wave.number());
        self.finish(GamePhase::GameOver, out);
    }

    /// Skips the rest of the preparation countdown.
    pub fn begin_wave_now(&mut self, out: &mut Vec<Command>) {
        if self.phase != GamePhase::Preparing {
            debug!("early wave start ignored while {:?}", self.phase);
            return;
        }
        self.start_fighting(out);
    }

    /// Cancels the countdown and stops reacting to events. The phase is kept.
    pub fn stop(&mut self) {
        self.token.cancel();
        self.countdown = None;
        self.tally = None;
        self.stopped = true;
    }

    /// Consumes world events and advances the phase machine.
    ///
    /// `live_enemies` is the number of enemies neither dying nor dead after
    /// the events were produced.
    pub fn handle(&mut self, events: &[Event], live_enemies: usize, out: &mut Vec<Command>) {
        if self.stopped {
            return;
        }
        let mut elapsed = Duration::ZERO;
        let mut cafe_destroyed = false;
        for event in events {
            match event {
                Event::TimeAdvanced { dt } => elapsed = elapsed.saturating_add(*dt),
                Event::EnemySpawned { .. } => self.record(|tally| tally.spawned += 1),
                Event::SpawnRejected { .. } => self.record(|tally| tally.rejected += 1),
                Event::EnemyStateChanged {
                    to: EnemyState::Dying,
                    ..
                } => self.record(|tally| tally.kills += 1),
                Event::EnemyDied { .. } => self.record(|tally| tally.settled += 1),
                Event::CafeDestroyed => cafe_destroyed = true,
                _ => {}
            }
        }

        if cafe_destroyed {
            self.trigger_game_over(out);
            return;
        }

        match self.phase {
            GamePhase::Preparing => {
                let status = self
                    .countdown
                    .as_mut()
                    .map_or(DelayStatus::Elapsed, |countdown| countdown.advance(elapsed));
                match status {
                    DelayStatus::Elapsed => self.start_fighting(out),
                    DelayStatus::Pending => {}
                    DelayStatus::Cancelled => self.countdown = None,
                }
            }
            GamePhase::Fighting => {
                let cleared = self
                    .tally
                    .map_or(false, |tally| tally.is_cleared(live_enemies));
                if cleared {
                    self.complete_wave(out);
                }
            }
            _ => {}
        }
    }

    fn record(&mut self, update: impl FnOnce(&mut WaveTally)) {
        if let Some(tally) = self.tally.as_mut() {
            update(tally);
        }
    }

    fn set_phase(&mut self, phase: GamePhase, out: &mut Vec<Command>) {
        info!("game loop {:?} -> {phase:?}", self.phase);
        self.phase = phase;
        out.push(Command::SetGamePhase { phase });
    }

    fn enter_preparing(&mut self, out: &mut Vec<Command>) {
        self.set_phase(GamePhase::Preparing, out);
        if self.wave > WaveIndex::FIRST {
            let stipend = self.config.stipend_base.saturating_add(
                self.config
                    .stipend_per_wave
                    .saturating_mul(u64::from(self.wave.get())),
            );
            if stipend > 0 {
                out.push(Command::Credit {
                    amounts: CurrencyAmounts::tech_points(stipend),
                });
            }
        }
        self.countdown = Some(Delay::new(self.config.preparation, self.token.clone()));
    }

    fn start_fighting(&mut self, out: &mut Vec<Command>) {
        self.countdown = None;
        let expected = self
            .wave_sizes
            .get(self.wave.get() as usize)
            .copied()
            .unwrap_or_default();
        self.tally = Some(WaveTally {
            expected,
            ..WaveTally::default()
        });
        self.set_phase(GamePhase::Fighting, out);
        out.push(Command::LaunchWave { wave: self.wave });
    }

    fn complete_wave(&mut self, out: &mut Vec<Command>) {
        let tally = self.tally.take().unwrap_or_default();
        self.set_phase(GamePhase::WaveComplete, out);

        let coins = self.config.rewards.reward(self.wave, tally.kills);
        info!(
            "wave {} cleared with {} kills; rewarding {coins} coins",
            self.wave.number(),
            tally.kills
        );
        out.push(Command::Credit {
            amounts: CurrencyAmounts::coins(coins),
        });

        self.wave = self.wave.next();
        if self.wave.get() >= self.total_waves() {
            self.finish(GamePhase::Victory, out);
        } else {
            self.enter_preparing(out);
        }
    }

    fn finish(&mut self, phase: GamePhase, out: &mut Vec<Command>) {
        self.token.cancel();
        self.countdown = None;
        self.tally = None;
        self.paused_from = None;
        self.set_phase(phase, out);
        out.push(Command::PersistLedger);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cafe_defence_core::{EnemyGroup, EnemyId, EnemyKind, SpawnError, Vec2, WaveDefinition};

    fn level(waves: &[u32]) -> LevelDefinition {
        LevelDefinition {
            waves: waves
                .iter()
                .enumerate()
                .map(|(index, count)| WaveDefinition {
                    index: WaveIndex::new(index as u32),
                    origin: Vec2::new(20.0, 0.0),
                    groups: vec![EnemyGroup {
                        kind: EnemyKind::Grunt,
                        count: *count,
                        delay: Duration::from_millis(100),
                    }],
                })
                .collect(),
            ..LevelDefinition::default()
        }
    }

    fn tick(millis: u64) -> Event {
        Event::TimeAdvanced {
            dt: Duration::from_millis(millis),
        }
    }

    fn spawned(id: u32) -> Event {
        Event::EnemySpawned {
            enemy: EnemyId::new(id),
            kind: EnemyKind::Grunt,
            position: Vec2::ZERO,
        }
    }

    fn dying(id: u32) -> Event {
        Event::EnemyStateChanged {
            enemy: EnemyId::new(id),
            from: EnemyState::MovingToCafe,
            to: EnemyState::Dying,
        }
    }

    fn died(id: u32) -> Event {
        Event::EnemyDied {
            enemy: EnemyId::new(id),
            kind: EnemyKind::Grunt,
            position: Vec2::ZERO,
            reward: CurrencyAmounts::coins(5),
        }
    }

    fn phases(commands: &[Command]) -> Vec<GamePhase> {
        commands
            .iter()
            .filter_map(|command| match command {
                Command::SetGamePhase { phase } => Some(*phase),
                _ => None,
            })
            .collect()
    }

    fn fighting(level: &LevelDefinition) -> GameLoop {
        let mut game = GameLoop::new(Config::default(), level);
        let mut out = Vec::new();
        game.start_game(&mut out);
        game.begin_wave_now(&mut out);
        assert_eq!(game.phase(), GamePhase::Fighting);
        game
    }

    #[test]
    fn reward_math_matches_the_table() {
        let table = RewardTable::new(50, 10, 5);
        assert_eq!(table.reward(WaveIndex::new(2), 7), 115);
        assert_eq!(table.reward(WaveIndex::FIRST, 0), 60);
    }

    #[test]
    fn preparation_countdown_launches_the_wave() {
        let level = level(&[2]);
        let mut game = GameLoop::new(Config::default(), &level);
        let mut out = Vec::new();
        game.start_game(&mut out);
        assert_eq!(phases(&out), vec![GamePhase::Preparing]);
        assert!(!out.iter().any(|command| matches!(command, Command::Credit { .. })));

        out.clear();
        game.handle(&[tick(14_000)], 0, &mut out);
        assert!(out.is_empty());
        assert_eq!(game.countdown_remaining(), Some(Duration::from_secs(1)));

        game.handle(&[tick(1_000)], 0, &mut out);
        assert_eq!(
            out,
            vec![
                Command::SetGamePhase {
                    phase: GamePhase::Fighting,
                },
                Command::LaunchWave {
                    wave: WaveIndex::FIRST,
                },
            ]
        );
    }

    #[test]
    fn wave_completes_exactly_once_after_every_enemy_died() {
        let level = level(&[5, 5]);
        let mut game = fighting(&level);
        let mut out = Vec::new();

        let spawns: Vec<Event> = (0..5).map(spawned).collect();
        game.handle(&spawns, 5, &mut out);
        for id in 0..4 {
            game.handle(&[dying(id)], 4 - id as usize, &mut out);
        }
        assert!(out.is_empty());

        game.handle(&[dying(4)], 0, &mut out);
        assert!(out.is_empty(), "the last rewards are still pending");

        let deaths: Vec<Event> = (0..5).map(died).collect();
        game.handle(&deaths, 0, &mut out);
        game.handle(&[tick(16)], 0, &mut out);
        game.handle(&[tick(16)], 0, &mut out);

        let completions = phases(&out)
            .into_iter()
            .filter(|phase| *phase == GamePhase::WaveComplete)
            .count();
        assert_eq!(completions, 1);
        assert!(out.contains(&Command::Credit {
            amounts: CurrencyAmounts::coins(50 + 10 + 25),
        }));
        assert!(out.contains(&Command::Credit {
            amounts: CurrencyAmounts::tech_points(3),
        }));
        assert_eq!(game.phase(), GamePhase::Preparing);
        assert_eq!(game.wave(), WaveIndex::new(1));
    }

    #[test]
    fn wave_waits_for_enemies_not_yet_spawned() {
        let level = level(&[3]);
        let mut game = fighting(&level);
        let mut out = Vec::new();

        game.handle(&[spawned(0), dying(0), died(0)], 0, &mut out);
        assert!(out.is_empty(), "two enemies are still queued");

        game.handle(
            &[
                spawned(1),
                Event::SpawnRejected {
                    kind: EnemyKind::Grunt,
                    reason: SpawnError::PoolExhausted,
                },
                dying(1),
                died(1),
            ],
            0,
            &mut out,
        );
        assert_eq!(phases(&out), vec![GamePhase::WaveComplete, GamePhase::Victory]);
    }

    #[test]
    fn nothing_happens_before_the_first_spawn() {
        let level = level(&[2]);
        let mut game = fighting(&level);
        let mut out = Vec::new();
        game.handle(&[tick(16)], 0, &mut out);
        assert!(out.is_empty());
        assert_eq!(game.phase(), GamePhase::Fighting);
    }

    #[test]
    fn fully_rejected_wave_still_completes() {
        let level = level(&[2]);
        let mut game = fighting(&level);
        let mut out = Vec::new();
        let rejected = Event::SpawnRejected {
            kind: EnemyKind::Grunt,
            reason: SpawnError::PoolExhausted,
        };

        game.handle(&[rejected.clone()], 0, &mut out);
        assert!(out.is_empty(), "one spawn is still outstanding");

        game.handle(&[rejected, tick(16)], 0, &mut out);
        assert_eq!(phases(&out), vec![GamePhase::WaveComplete, GamePhase::Victory]);
        assert!(out.contains(&Command::Credit {
            amounts: CurrencyAmounts::coins(60),
        }));
        assert_eq!(out.last(), Some(&Command::PersistLedger));
    }

    #[test]
    fn last_wave_ends_in_victory_and_persists() {
        let level = level(&[1]);
        let mut game = fighting(&level);
        let mut out = Vec::new();
        game.handle(&[spawned(0), dying(0), died(0)], 0, &mut out);

        assert_eq!(game.phase(), GamePhase::Victory);
        assert_eq!(out.last(), Some(&Command::PersistLedger));
    }

    #[test]
    fn cafe_destruction_is_game_over_from_any_active_phase() {
        let level = level(&[3]);
        let mut game = GameLoop::new(Config::default(), &level);
        let mut out = Vec::new();
        game.handle(&[Event::CafeDestroyed], 0, &mut out);
        assert!(out.is_empty(), "not started yet");

        game.start_game(&mut out);
        game.pause_game(&mut out);
        out.clear();
        game.handle(&[Event::CafeDestroyed], 0, &mut out);
        assert_eq!(game.phase(), GamePhase::GameOver);
        assert_eq!(
            out,
            vec![
                Command::SetGamePhase {
                    phase: GamePhase::GameOver,
                },
                Command::PersistLedger,
            ]
        );

        out.clear();
        game.trigger_game_over(&mut out);
        game.pause_game(&mut out);
        game.begin_wave_now(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn pause_and_resume_restore_the_interrupted_phase() {
        let level = level(&[3]);
        let mut game = fighting(&level);
        let mut out = Vec::new();

        game.pause_game(&mut out);
        game.pause_game(&mut out);
        assert_eq!(
            out,
            vec![
                Command::SetTimeScale { scale: 0.0 },
                Command::SetGamePhase {
                    phase: GamePhase::Paused,
                },
            ]
        );

        out.clear();
        game.resume_game(&mut out);
        game.resume_game(&mut out);
        assert_eq!(
            out,
            vec![
                Command::SetTimeScale { scale: 1.0 },
                Command::SetGamePhase {
                    phase: GamePhase::Fighting,
                },
            ]
        );
    }

    #[test]
    fn restart_resets_the_battlefield_and_the_wave() {
        let level = level(&[1, 1]);
        let mut game = fighting(&level);
        let mut out = Vec::new();
        game.handle(&[spawned(0), dying(0), died(0)], 0, &mut out);
        assert_eq!(game.wave(), WaveIndex::new(1));

        out.clear();
        game.restart_game(&mut out);
        assert_eq!(out.first(), Some(&Command::ResetBattlefield));
        assert_eq!(game.phase(), GamePhase::Preparing);
        assert_eq!(game.wave(), WaveIndex::FIRST);
        assert_eq!(game.kills(), 0);
    }

    #[test]
    fn missing_waves_still_play_one_generated_wave() {
        let game = GameLoop::new(Config::default(), &LevelDefinition::default());
        assert_eq!(game.total_waves(), 1);
    }

    #[test]
    fn stopped_loop_neither_counts_down_nor_ends() {
        let level = level(&[2]);
        let mut game = GameLoop::new(Config::default(), &level);
        let mut out = Vec::new();
        game.start_game(&mut out);
        game.stop();
        assert_eq!(game.countdown_remaining(), None);

        out.clear();
        game.handle(&[tick(20_000), Event::CafeDestroyed], 0, &mut out);
        assert!(out.is_empty());
        assert_eq!(game.phase(), GamePhase::Preparing);
    }
}
