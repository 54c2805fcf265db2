//! Tuning document for a whole session.
//!
//! Every section is optional; missing fields keep their defaults so a TOML file
//! only needs to name what it changes. Durations are written in seconds.

use std::time::Duration;

use cafe_defence_core::{CurrencyAmounts, EnemyKind, Kind};
use cafe_defence_pool::OverflowPolicy;
use cafe_defence_system_enemy_targeting::Config as EnemyTargetingConfig;
use cafe_defence_system_game_loop::{Config as GameLoopConfig, RewardTable};
use cafe_defence_system_spawning::Config as SpawningConfig;
use cafe_defence_system_turret_targeting::Config as TurretTargetingConfig;
use cafe_defence_world::WorldConfig;
use serde::Deserialize;

/// Errors raised while reading a session configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document is not valid TOML or does not fit the schema.
    #[error("failed to parse session configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is outside of its accepted range.
    #[error("invalid session configuration value for `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was refused.
        reason: &'static str,
    },
}

/// Pool behaviour once the nominal capacity is exhausted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overflow {
    /// Construct additional instances.
    #[default]
    Grow,
    /// Refuse the acquisition.
    Reject,
}

impl From<Overflow> for OverflowPolicy {
    fn from(overflow: Overflow) -> Self {
        match overflow {
            Overflow::Grow => OverflowPolicy::Grow,
            Overflow::Reject => OverflowPolicy::Reject,
        }
    }
}

/// World simulation section.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldSection {
    /// Seconds between the end of placement and a turret becoming idle.
    pub activation_delay: f32,
    /// Seconds an enemy spends dying.
    pub death_effect: f32,
    /// Seconds a corpse lingers before returning to its pool.
    pub corpse_removal: f32,
    /// Seconds an uncollected drop stays on the field.
    pub drop_lifetime: f32,
    /// Water points credited per collected drop.
    pub drop_water_reward: u64,
    /// Damping rate of drop velocity per second.
    pub drop_damping: f32,
    /// Projectile speed in world units per second.
    pub projectile_speed: f32,
    /// Nominal pool capacity.
    pub pool_capacity: usize,
    /// Instances built per pool before the first spawn.
    pub prewarm: usize,
    /// Pool overflow behaviour.
    pub overflow: Overflow,
    /// Names of the enemy kinds that receive a pool. Kinds left out cannot spawn.
    pub enemy_kinds: Vec<String>,
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            activation_delay: 2.0,
            death_effect: 0.5,
            corpse_removal: 1.0,
            drop_lifetime: 10.0,
            drop_water_reward: 1,
            drop_damping: 3.0,
            projectile_speed: 18.0,
            pool_capacity: 32,
            prewarm: 0,
            overflow: Overflow::Grow,
            enemy_kinds: EnemyKind::ALL.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Targeting cadence section.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetingSection {
    /// Seconds between turret target reacquisitions.
    pub turret_reacquire_interval: f32,
    /// Seconds between enemy detection ticks.
    pub enemy_detection_interval: f32,
    /// Distance a turret must be closer by before an enemy switches to it.
    pub hysteresis: f32,
}

impl Default for TargetingSection {
    fn default() -> Self {
        Self {
            turret_reacquire_interval: 0.25,
            enemy_detection_interval: 0.25,
            hysteresis: 1.0,
        }
    }
}

/// Spawn orchestration section.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpawningSection {
    /// Seconds between spawn queue drains.
    pub drain_interval: f32,
    /// Spawns allowed per drain.
    pub max_per_drain: usize,
    /// Seed of the drop RNG.
    pub seed: u64,
    /// Probability of a drop per death.
    pub drop_chance: f64,
    /// Smallest drop impulse magnitude.
    pub impulse_min: f32,
    /// Largest drop impulse magnitude.
    pub impulse_max: f32,
}

impl Default for SpawningSection {
    fn default() -> Self {
        Self {
            drain_interval: 0.1,
            max_per_drain: 4,
            seed: 0x5eed_cafe,
            drop_chance: 0.25,
            impulse_min: 2.0,
            impulse_max: 5.0,
        }
    }
}

/// Wave loop section.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WavesSection {
    /// Seconds of preparation before each wave.
    pub preparation: f32,
    /// Coins granted for every cleared wave.
    pub reward_base: u64,
    /// Coins granted per wave number.
    pub wave_bonus: u64,
    /// Coins granted per kill.
    pub kill_bonus: u64,
    /// Tech points granted when preparation begins after the first wave.
    pub stipend_base: u64,
    /// Additional tech points per wave index.
    pub stipend_per_wave: u64,
}

impl Default for WavesSection {
    fn default() -> Self {
        Self {
            preparation: 15.0,
            reward_base: 50,
            wave_bonus: 10,
            kill_bonus: 5,
            stipend_base: 2,
            stipend_per_wave: 1,
        }
    }
}

/// Complete tuning of a session.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// World simulation values.
    pub world: WorldSection,
    /// Targeting cadences.
    pub targeting: TargetingSection,
    /// Spawn orchestration values.
    pub spawning: SpawningSection,
    /// Wave loop values.
    pub waves: WavesSection,
}

impl SessionConfig {
    /// Parses a TOML document and validates every value.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that durations, rates, and probabilities are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let seconds = [
            ("world.activation_delay", self.world.activation_delay),
            ("world.death_effect", self.world.death_effect),
            ("world.corpse_removal", self.world.corpse_removal),
            ("world.drop_lifetime", self.world.drop_lifetime),
            (
                "targeting.turret_reacquire_interval",
                self.targeting.turret_reacquire_interval,
            ),
            (
                "targeting.enemy_detection_interval",
                self.targeting.enemy_detection_interval,
            ),
            ("spawning.drain_interval", self.spawning.drain_interval),
            ("waves.preparation", self.waves.preparation),
        ];
        for (field, value) in seconds {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "expected a non-negative number of seconds",
                });
            }
        }

        let rates = [
            ("world.drop_damping", self.world.drop_damping),
            ("world.projectile_speed", self.world.projectile_speed),
            ("targeting.hysteresis", self.targeting.hysteresis),
            ("spawning.impulse_min", self.spawning.impulse_min),
            ("spawning.impulse_max", self.spawning.impulse_max),
        ];
        for (field, value) in rates {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "expected a finite non-negative number",
                });
            }
        }

        if self
            .world
            .enemy_kinds
            .iter()
            .any(|name| name.parse::<EnemyKind>().is_err())
        {
            return Err(ConfigError::Invalid {
                field: "world.enemy_kinds",
                reason: "unknown enemy kind",
            });
        }
        if self.world.projectile_speed == 0.0 {
            return Err(ConfigError::Invalid {
                field: "world.projectile_speed",
                reason: "projectiles must move",
            });
        }
        if !(0.0..=1.0).contains(&self.spawning.drop_chance) {
            return Err(ConfigError::Invalid {
                field: "spawning.drop_chance",
                reason: "expected a probability between 0 and 1",
            });
        }
        if self.world.pool_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "world.pool_capacity",
                reason: "pools need room for at least one instance",
            });
        }
        if self.spawning.max_per_drain == 0 {
            return Err(ConfigError::Invalid {
                field: "spawning.max_per_drain",
                reason: "at least one spawn per drain is required",
            });
        }
        Ok(())
    }

    /// World tuning derived from the world section.
    #[must_use]
    pub fn world_config(&self) -> WorldConfig {
        WorldConfig {
            activation_delay: seconds(self.world.activation_delay),
            death_effect: seconds(self.world.death_effect),
            corpse_removal: seconds(self.world.corpse_removal),
            drop_lifetime: seconds(self.world.drop_lifetime),
            drop_reward: CurrencyAmounts::water_points(self.world.drop_water_reward),
            drop_damping: self.world.drop_damping,
            projectile_speed: self.world.projectile_speed,
            pool_capacity: self.world.pool_capacity,
            prewarm: self.world.prewarm,
            overflow: self.world.overflow.into(),
            enemy_kinds: self
                .world
                .enemy_kinds
                .iter()
                .filter_map(|name| name.parse().ok())
                .collect(),
        }
    }

    /// Turret reacquisition cadence.
    #[must_use]
    pub fn turret_targeting(&self) -> TurretTargetingConfig {
        TurretTargetingConfig::new(seconds(self.targeting.turret_reacquire_interval))
    }

    /// Enemy detection cadence and hysteresis.
    #[must_use]
    pub fn enemy_targeting(&self) -> EnemyTargetingConfig {
        EnemyTargetingConfig::new(
            seconds(self.targeting.enemy_detection_interval),
            self.targeting.hysteresis,
        )
    }

    /// Spawn drain and drop tuning.
    #[must_use]
    pub fn spawning(&self) -> SpawningConfig {
        SpawningConfig::new(
            seconds(self.spawning.drain_interval),
            self.spawning.max_per_drain,
            self.spawning.seed,
        )
        .with_drops(
            self.spawning.drop_chance,
            self.spawning.impulse_min,
            self.spawning.impulse_max,
        )
    }

    /// Preparation countdown, rewards, and stipend.
    #[must_use]
    pub fn game_loop(&self) -> GameLoopConfig {
        let rewards = RewardTable::new(
            self.waves.reward_base,
            self.waves.wave_bonus,
            self.waves.kill_bonus,
        );
        GameLoopConfig::new(seconds(self.waves.preparation), rewards)
            .with_stipend(self.waves.stipend_base, self.waves.stipend_per_wave)
    }
}

fn seconds(value: f32) -> Duration {
    Duration::try_from_secs_f32(value.max(0.0)).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_keeps_the_defaults() {
        let config = SessionConfig::from_toml_str("").expect("empty document");
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.world_config(), WorldConfig::default());
    }

    #[test]
    fn partial_sections_override_single_fields() {
        let config = SessionConfig::from_toml_str(
            r#"
            [world]
            pool_capacity = 8
            overflow = "reject"
            enemy_kinds = ["grunt"]

            [waves]
            preparation = 3.5
            "#,
        )
        .expect("valid document");

        let world = config.world_config();
        assert_eq!(world.pool_capacity, 8);
        assert_eq!(world.overflow, OverflowPolicy::Reject);
        assert_eq!(world.enemy_kinds, vec![EnemyKind::Grunt]);
        assert_eq!(world.activation_delay, Duration::from_secs(2));
        assert_eq!(config.waves.preparation, 3.5);
        assert_eq!(config.waves.reward_base, 50);
    }

    #[test]
    fn negative_durations_are_refused() {
        let error = SessionConfig::from_toml_str("[waves]\npreparation = -1.0\n")
            .expect_err("negative preparation");
        assert!(matches!(
            error,
            ConfigError::Invalid {
                field: "waves.preparation",
                ..
            }
        ));
    }

    #[test]
    fn drop_chance_must_be_a_probability() {
        let error = SessionConfig::from_toml_str("[spawning]\ndrop_chance = 1.5\n")
            .expect_err("out of range");
        assert!(matches!(
            error,
            ConfigError::Invalid {
                field: "spawning.drop_chance",
                ..
            }
        ));
    }

    #[test]
    fn enemy_kinds_use_level_names() {
        let error = SessionConfig::from_toml_str("[world]\nenemy_kinds = [\"dragon\"]\n")
            .expect_err("unknown kind");
        assert!(matches!(
            error,
            ConfigError::Invalid {
                field: "world.enemy_kinds",
                ..
            }
        ));
    }

    #[test]
    fn empty_pools_are_refused() {
        let error = SessionConfig::from_toml_str("[world]\npool_capacity = 0\noverflow = \"reject\"\n")
            .expect_err("zero capacity");
        assert!(matches!(
            error,
            ConfigError::Invalid {
                field: "world.pool_capacity",
                ..
            }
        ));

        let config = SessionConfig::from_toml_str("[world]\npool_capacity = 1\nprewarm = 4\n")
            .expect("smallest usable pool");
        assert_eq!(config.world_config().pool_capacity, 1);
        assert_eq!(config.world_config().prewarm, 4);
    }

    #[test]
    fn unknown_fields_are_parse_errors() {
        let error = SessionConfig::from_toml_str("[world]\nspeed = 3\n").expect_err("unknown");
        assert!(matches!(error, ConfigError::Parse(_)));
    }
}
