#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Spawn orchestration: paced wave expansion, a capped spawn queue, and drops.
//!
//! A launched wave is expanded into individual spawn requests that enter the
//! FIFO queue one by one. Each request carries the delay configured for its
//! group, which holds back the request that follows it. A
//! periodic drain pops at most a fixed number of requests per interval and
//! emits `Command::SpawnEnemy` for each. Enemy deaths roll against the drop
//! chance and emit `Command::SpawnDrop` with a randomized impulse.

use std::{collections::VecDeque, time::Duration};

use cafe_defence_core::{
    Command, EnemyKind, Event, LevelDefinition, Vec2, WaveDefinition,
};
use cafe_defence_scheduler::{CancellationToken, Periodic, TaskError, Timeline};
use log::{debug, info};
use rand::{
    distributions::{Distribution, Uniform},
    Rng, SeedableRng,
};
use rand_chacha::ChaCha8Rng;
use rand_distr::UnitCircle;

/// Configuration parameters required to construct the spawning system.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    drain_interval: Duration,
    max_per_drain: usize,
    drop_chance: f64,
    impulse_min: f32,
    impulse_max: f32,
    rng_seed: u64,
}

impl Config {
    /// Creates a configuration draining at most `max_per_drain` requests every
    /// `drain_interval`, rolling drops from `rng_seed`.
    #[must_use]
    pub const fn new(drain_interval: Duration, max_per_drain: usize, rng_seed: u64) -> Self {
        Self {
            drain_interval,
            max_per_drain,
            drop_chance: 0.25,
            impulse_min: 2.0,
            impulse_max: 5.0,
            rng_seed,
        }
    }

    /// Overrides the drop probability and the impulse magnitude range.
    #[must_use]
    pub const fn with_drops(mut self, chance: f64, impulse_min: f32, impulse_max: f32) -> Self {
        self.drop_chance = chance;
        self.impulse_min = impulse_min;
        self.impulse_max = impulse_max;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), 4, 0x5eed_cafe)
    }
}

/// Single enemy waiting to be spawned.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnRequest {
    /// Kind of enemy, which also selects the pool.
    pub kind: EnemyKind,
    /// Spawn position.
    pub position: Vec2,
    /// Wait after this request before the next one of the wave enters the queue.
    pub delay: Duration,
}

/// Spawn orchestrator that owns the pacing timeline, the queue, and the drop RNG.
#[derive(Debug)]
pub struct Spawning {
    token: CancellationToken,
    pacing: Timeline<SpawnRequest>,
    queue: VecDeque<SpawnRequest>,
    drain: Periodic,
    max_per_drain: usize,
    drop_chance: f64,
    impulse: Uniform<f32>,
    rng: ChaCha8Rng,
}

impl Spawning {
    /// Creates a new spawning system using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let (low, high) = if config.impulse_min <= config.impulse_max {
            (config.impulse_min, config.impulse_max)
        } else {
            (config.impulse_max, config.impulse_min)
        };
        let drop_chance = if config.drop_chance.is_nan() {
            0.0
        } else {
            config.drop_chance.clamp(0.0, 1.0)
        };
        Self {
            token: CancellationToken::new(),
            pacing: Timeline::new(),
            queue: VecDeque::new(),
            drain: Periodic::new("spawn queue", config.drain_interval),
            max_per_drain: config.max_per_drain.max(1),
            drop_chance,
            impulse: Uniform::new_inclusive(low.max(0.0), high.max(0.0)),
            rng: ChaCha8Rng::seed_from_u64(config.rng_seed),
        }
    }

    /// Expands `wave` into spawn requests paced by their group delays.
    ///
    /// Groups are sequential: the first request of a group waits for the delay
    /// of the previous group's last request.
    pub fn enqueue(&mut self, wave: &WaveDefinition) {
        let mut offset = Duration::ZERO;
        for group in &wave.groups {
            for _ in 0..group.count {
                let request = SpawnRequest {
                    kind: group.kind,
                    position: wave.origin,
                    delay: group.delay,
                };
                if offset.is_zero() {
                    self.pacing.yield_now(&self.token, request);
                } else {
                    self.pacing.delay(offset, &self.token, request);
                }
                offset = offset.saturating_add(request.delay);
            }
        }
        info!(
            "wave {}: {} spawns enqueued over {:?}",
            wave.index.number(),
            wave.total_enemies(),
            offset
        );
    }

    /// Requests that are scheduled or queued but not yet emitted.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pacing.len() + self.queue.len()
    }

    /// Drops every scheduled and queued request.
    pub fn clear(&mut self) {
        self.token.cancel();
        self.token = CancellationToken::new();
        self.pacing.clear();
        self.queue.clear();
        self.drain.reset();
    }

    /// Cancels the spawning loop for good. Later waves are ignored.
    pub fn stop(&mut self) {
        self.token.cancel();
        self.pacing.clear();
        self.queue.clear();
    }

    /// Reports whether [`Spawning::stop`] was called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Consumes world events and emits spawn and drop commands.
    pub fn handle(&mut self, events: &[Event], level: &LevelDefinition, out: &mut Vec<Command>) {
        if self.is_stopped() {
            return;
        }
        let mut elapsed = Duration::ZERO;
        for event in events {
            match event {
                Event::TimeAdvanced { dt } => elapsed = elapsed.saturating_add(*dt),
                Event::WaveLaunched { wave } => self.enqueue(&level.wave(*wave)),
                Event::EnemyDied { position, .. } => self.roll_drop(*position, out),
                Event::BattlefieldReset => self.clear(),
                _ => {}
            }
        }

        if elapsed.is_zero() {
            return;
        }

        let mut released = Vec::new();
        self.pacing.advance(elapsed, &mut released);
        self.queue.extend(released);

        let limit = self.max_per_drain;
        let queue = &mut self.queue;
        let _ = self
            .drain
            .advance(elapsed, &self.token, || -> Result<(), TaskError> {
                for request in queue.drain(..limit.min(queue.len())) {
                    debug!("spawning {} at {}", request.kind, request.position);
                    out.push(Command::SpawnEnemy {
                        kind: request.kind,
                        position: request.position,
                    });
                }
                Ok(())
            });
    }

    fn roll_drop(&mut self, position: Vec2, out: &mut Vec<Command>) {
        if !self.rng.gen_bool(self.drop_chance) {
            return;
        }
        let [x, y]: [f32; 2] = UnitCircle.sample(&mut self.rng);
        let magnitude = self.impulse.sample(&mut self.rng);
        out.push(Command::SpawnDrop {
            position,
            impulse: Vec2::new(x, y) * magnitude,
        });
    }
}

impl Default for Spawning {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cafe_defence_core::{CurrencyAmounts, EnemyGroup, EnemyId, WaveIndex};

    fn tick(millis: u64) -> Event {
        Event::TimeAdvanced {
            dt: Duration::from_millis(millis),
        }
    }

    fn wave(groups: Vec<EnemyGroup>) -> WaveDefinition {
        WaveDefinition {
            index: WaveIndex::FIRST,
            origin: Vec2::new(20.0, 0.0),
            groups,
        }
    }

    fn spawned_kinds(commands: &[Command]) -> Vec<EnemyKind> {
        commands
            .iter()
            .filter_map(|command| match command {
                Command::SpawnEnemy { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    fn death() -> Event {
        Event::EnemyDied {
            enemy: EnemyId::new(1),
            kind: EnemyKind::Grunt,
            position: Vec2::new(3.0, 4.0),
            reward: CurrencyAmounts::coins(5),
        }
    }

    #[test]
    fn enqueueing_is_paced_by_group_delay() {
        let mut spawning = Spawning::default();
        spawning.enqueue(&wave(vec![
            EnemyGroup {
                kind: EnemyKind::Grunt,
                count: 2,
                delay: Duration::from_millis(500),
            },
            EnemyGroup {
                kind: EnemyKind::Brute,
                count: 1,
                delay: Duration::ZERO,
            },
        ]));
        let level = LevelDefinition::default();
        let mut out = Vec::new();

        spawning.handle(&[tick(100)], &level, &mut out);
        assert_eq!(spawned_kinds(&out), vec![EnemyKind::Grunt]);

        out.clear();
        spawning.handle(&[tick(300)], &level, &mut out);
        assert!(out.is_empty());

        spawning.handle(&[tick(100)], &level, &mut out);
        assert_eq!(spawned_kinds(&out), vec![EnemyKind::Grunt]);

        out.clear();
        spawning.handle(&[tick(500)], &level, &mut out);
        assert_eq!(spawned_kinds(&out), vec![EnemyKind::Brute]);
        assert_eq!(spawning.pending(), 0);
    }

    #[test]
    fn drain_caps_spawns_per_interval() {
        let mut spawning = Spawning::new(Config::new(Duration::from_millis(100), 4, 7));
        spawning.enqueue(&wave(vec![EnemyGroup {
            kind: EnemyKind::Runner,
            count: 10,
            delay: Duration::ZERO,
        }]));
        let level = LevelDefinition::default();
        let mut out = Vec::new();

        spawning.handle(&[tick(16)], &level, &mut out);
        assert_eq!(out.len(), 4);
        assert_eq!(spawning.pending(), 6);

        out.clear();
        spawning.handle(&[tick(16)], &level, &mut out);
        assert!(out.is_empty(), "next drain waits for the interval");

        spawning.handle(&[tick(200)], &level, &mut out);
        assert_eq!(out.len(), 6);
        assert_eq!(spawning.pending(), 0);
    }

    #[test]
    fn wave_launch_uses_fallback_for_missing_wave() {
        let mut spawning = Spawning::default();
        let level = LevelDefinition::default();
        let mut out = Vec::new();

        spawning.handle(
            &[Event::WaveLaunched {
                wave: WaveIndex::FIRST,
            }],
            &level,
            &mut out,
        );
        assert_eq!(spawning.pending(), 3);
        assert!(out.is_empty());
    }

    #[test]
    fn certain_drops_carry_impulse_within_range() {
        let mut spawning =
            Spawning::new(Config::new(Duration::from_millis(100), 4, 11).with_drops(1.0, 2.0, 5.0));
        let level = LevelDefinition::default();
        let mut out = Vec::new();

        spawning.handle(&[death(), death(), death()], &level, &mut out);

        assert_eq!(out.len(), 3);
        for command in &out {
            match command {
                Command::SpawnDrop { position, impulse } => {
                    assert_eq!(*position, Vec2::new(3.0, 4.0));
                    let magnitude = impulse.length();
                    assert!((1.999..=5.001).contains(&magnitude), "{magnitude}");
                }
                other => panic!("unexpected command {other:?}"),
            }
        }
    }

    #[test]
    fn impossible_drops_never_fire() {
        let mut spawning =
            Spawning::new(Config::new(Duration::from_millis(100), 4, 11).with_drops(0.0, 2.0, 5.0));
        let mut out = Vec::new();
        spawning.handle(&[death(), death()], &LevelDefinition::default(), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn drop_rolls_are_reproducible_from_the_seed() {
        let roll = || {
            let mut spawning = Spawning::new(Config::new(Duration::from_millis(100), 4, 99));
            let mut out = Vec::new();
            let deaths: Vec<Event> = (0..32).map(|_| death()).collect();
            spawning.handle(&deaths, &LevelDefinition::default(), &mut out);
            out
        };
        let first = roll();
        assert_eq!(first, roll());
        assert!(!first.is_empty() && first.len() < 32);
    }

    #[test]
    fn reset_drops_pending_requests() {
        let mut spawning = Spawning::default();
        spawning.enqueue(&wave(vec![EnemyGroup {
            kind: EnemyKind::Grunt,
            count: 5,
            delay: Duration::from_secs(1),
        }]));
        let level = LevelDefinition::default();
        let mut out = Vec::new();
        spawning.handle(&[tick(100)], &level, &mut out);
        assert_eq!(out.len(), 1);

        out.clear();
        spawning.handle(&[Event::BattlefieldReset, tick(10_000)], &level, &mut out);
        assert!(out.is_empty());
        assert_eq!(spawning.pending(), 0);
    }

    #[test]
    fn requests_carry_their_group_delay() {
        let mut spawning = Spawning::default();
        spawning.enqueue(&wave(vec![EnemyGroup {
            kind: EnemyKind::Runner,
            count: 2,
            delay: Duration::from_millis(750),
        }]));
        let mut released = Vec::new();
        spawning.pacing.advance(Duration::from_secs(1), &mut released);

        assert_eq!(
            released,
            vec![
                SpawnRequest {
                    kind: EnemyKind::Runner,
                    position: Vec2::new(20.0, 0.0),
                    delay: Duration::from_millis(750),
                };
                2
            ]
        );
    }

    #[test]
    fn stopped_spawner_ignores_waves_and_deaths() {
        let mut spawning =
            Spawning::new(Config::new(Duration::from_millis(100), 4, 3).with_drops(1.0, 2.0, 5.0));
        spawning.enqueue(&wave(vec![EnemyGroup {
            kind: EnemyKind::Grunt,
            count: 3,
            delay: Duration::from_millis(200),
        }]));
        spawning.stop();
        assert!(spawning.is_stopped());
        assert_eq!(spawning.pending(), 0);

        let mut out = Vec::new();
        spawning.handle(
            &[
                Event::WaveLaunched {
                    wave: WaveIndex::FIRST,
                },
                death(),
                tick(5_000),
            ],
            &LevelDefinition::default(),
            &mut out,
        );
        assert!(out.is_empty());
        assert_eq!(spawning.pending(), 0);
    }
}
