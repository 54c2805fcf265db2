//! Entity kinds, their specialization hierarchy, and per-kind base statistics.

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

/// Discriminator shared by every family of entity kinds.
///
/// Kinds form a forest: each kind optionally specializes a parent kind. Recipe
/// and pool matching use [`Kind::is_a`], which accepts the kind itself or any
/// of its specializations.
pub trait Kind: Copy + Eq + fmt::Debug + 'static {
    /// Every kind of the family, in declaration order.
    const ALL: &'static [Self];

    /// Human readable family label used in diagnostics.
    const FAMILY: &'static str;

    /// Kind this kind specializes, if any.
    fn parent(self) -> Option<Self>;

    /// Stable name used by configuration files.
    fn name(self) -> &'static str;

    /// Reports whether `self` equals `base` or transitively specializes it.
    fn is_a(self, base: Self) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == base {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    /// Resolves a configuration name into a kind.
    fn from_name(name: &str) -> Result<Self, ParseKindError> {
        let trimmed = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseKindError {
                family: Self::FAMILY,
                name: trimmed.to_owned(),
            })
    }
}

/// Error produced when a configuration names a kind that does not exist.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown {family} kind `{name}`")]
pub struct ParseKindError {
    /// Family the name was resolved against.
    pub family: &'static str,
    /// Offending name.
    pub name: String,
}

/// Turret variants that can be placed or produced by combination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TurretKind {
    /// Entry level turret every other turret derives from.
    Basic,
    /// Fast firing, low damage specialization of [`TurretKind::Basic`].
    Rapid,
    /// Slow, heavy hitting specialization of [`TurretKind::Basic`].
    Cannon,
    /// Upgraded [`TurretKind::Cannon`].
    HeavyCannon,
    /// Chilling specialization of [`TurretKind::Basic`].
    Frost,
    /// Long range specialization of [`TurretKind::Basic`].
    Sniper,
}

impl Kind for TurretKind {
    const ALL: &'static [Self] = &[
        Self::Basic,
        Self::Rapid,
        Self::Cannon,
        Self::HeavyCannon,
        Self::Frost,
        Self::Sniper,
    ];
    const FAMILY: &'static str = "turret";

    fn parent(self) -> Option<Self> {
        match self {
            Self::Basic => None,
            Self::Rapid | Self::Cannon | Self::Frost | Self::Sniper => Some(Self::Basic),
            Self::HeavyCannon => Some(Self::Cannon),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Rapid => "rapid",
            Self::Cannon => "cannon",
            Self::HeavyCannon => "heavy_cannon",
            Self::Frost => "frost",
            Self::Sniper => "sniper",
        }
    }
}

impl TurretKind {
    /// Base statistics applied to a freshly instantiated turret of this kind.
    #[must_use]
    pub const fn stats(self) -> TurretStats {
        match self {
            Self::Basic => TurretStats::new(10.0, 1.0, 100.0, 6.0, 50),
            Self::Rapid => TurretStats::new(6.0, 3.0, 90.0, 5.5, 80),
            Self::Cannon => TurretStats::new(25.0, 0.5, 150.0, 6.5, 100),
            Self::HeavyCannon => TurretStats::new(45.0, 0.4, 220.0, 7.0, 160),
            Self::Frost => TurretStats::new(8.0, 1.2, 110.0, 6.0, 90),
            Self::Sniper => TurretStats::new(40.0, 0.3, 80.0, 12.0, 120),
        }
    }
}

/// Consumable items dragged onto turrets to trigger combinations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemKind {
    /// Generic power-up.
    Boost,
    /// Stronger [`ItemKind::Boost`].
    PowerBoost,
    /// Freezing crystal.
    Ice,
    /// Optical scope.
    Scope,
    /// Salvage with no recipe of its own.
    Scrap,
}

impl Kind for ItemKind {
    const ALL: &'static [Self] = &[
        Self::Boost,
        Self::PowerBoost,
        Self::Ice,
        Self::Scope,
        Self::Scrap,
    ];
    const FAMILY: &'static str = "item";

    fn parent(self) -> Option<Self> {
        match self {
            Self::PowerBoost => Some(Self::Boost),
            Self::Boost | Self::Ice | Self::Scope | Self::Scrap => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Boost => "boost",
            Self::PowerBoost => "power_boost",
            Self::Ice => "ice",
            Self::Scope => "scope",
            Self::Scrap => "scrap",
        }
    }
}

/// Hostile variants spawned by waves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EnemyKind {
    /// Baseline walker.
    Grunt,
    /// Fast and fragile.
    Runner,
    /// Slow and durable.
    Brute,
}

impl Kind for EnemyKind {
    const ALL: &'static [Self] = &[Self::Grunt, Self::Runner, Self::Brute];
    const FAMILY: &'static str = "enemy";

    fn parent(self) -> Option<Self> {
        None
    }

    fn name(self) -> &'static str {
        match self {
            Self::Grunt => "grunt",
            Self::Runner => "runner",
            Self::Brute => "brute",
        }
    }
}

impl EnemyKind {
    /// Default statistics restored every time an enemy of this kind is reused.
    #[must_use]
    pub const fn stats(self) -> EnemyStats {
        match self {
            Self::Grunt => EnemyStats {
                max_health: 30.0,
                move_speed: 2.0,
                coin_reward: 5,
                attack_damage: 5.0,
                attack_cooldown: Duration::from_millis(1_000),
                attack_range: 1.0,
                detection_range: 8.0,
            },
            Self::Runner => EnemyStats {
                max_health: 18.0,
                move_speed: 3.5,
                coin_reward: 4,
                attack_damage: 3.0,
                attack_cooldown: Duration::from_millis(700),
                attack_range: 0.8,
                detection_range: 6.0,
            },
            Self::Brute => EnemyStats {
                max_health: 90.0,
                move_speed: 1.2,
                coin_reward: 12,
                attack_damage: 15.0,
                attack_cooldown: Duration::from_millis(1_500),
                attack_range: 1.2,
                detection_range: 10.0,
            },
        }
    }
}

macro_rules! kind_string_impls {
    ($($kind:ty),+) => {
        $(
            impl FromStr for $kind {
                type Err = ParseKindError;

                fn from_str(value: &str) -> Result<Self, Self::Err> {
                    <$kind as Kind>::from_name(value)
                }
            }

            impl fmt::Display for $kind {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.name())
                }
            }
        )+
    };
}

kind_string_impls!(TurretKind, ItemKind, EnemyKind);

/// Combat statistics of a turret.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurretStats {
    /// Damage dealt by a single shot.
    pub attack_power: f32,
    /// Shots per simulated second.
    pub attack_speed: f32,
    /// Maximum hit points.
    pub max_hp: f32,
    /// Radius within which hostiles can be targeted, in world units.
    pub range: f32,
    /// Coin price charged when the turret is bought.
    pub cost: u64,
}

impl TurretStats {
    /// Creates a stat block from explicit values.
    #[must_use]
    pub const fn new(attack_power: f32, attack_speed: f32, max_hp: f32, range: f32, cost: u64) -> Self {
        Self {
            attack_power,
            attack_speed,
            max_hp,
            range,
            cost,
        }
    }

    /// Interval between shots derived from the attack speed.
    ///
    /// A non-positive attack speed never fires; the returned interval is then
    /// [`Duration::MAX`].
    #[must_use]
    pub fn fire_interval(&self) -> Duration {
        if self.attack_speed.is_finite() && self.attack_speed > 0.0 {
            Duration::try_from_secs_f32(1.0 / self.attack_speed).unwrap_or(Duration::MAX)
        } else {
            Duration::MAX
        }
    }
}

/// Statistics of an enemy, restored on every pool reuse.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnemyStats {
    /// Maximum health.
    pub max_health: f32,
    /// Travel speed in world units per simulated second.
    pub move_speed: f32,
    /// Coins granted when the enemy dies.
    pub coin_reward: u64,
    /// Damage applied per attack.
    pub attack_damage: f32,
    /// Minimum simulated time between attacks.
    pub attack_cooldown: Duration,
    /// Distance at which the enemy stops and attacks.
    pub attack_range: f32,
    /// Radius scanned for turrets on every detection tick.
    pub detection_range: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specialization_is_transitive() {
        assert!(TurretKind::HeavyCannon.is_a(TurretKind::Cannon));
        assert!(TurretKind::HeavyCannon.is_a(TurretKind::Basic));
        assert!(TurretKind::Basic.is_a(TurretKind::Basic));
        assert!(!TurretKind::Basic.is_a(TurretKind::Cannon));
        assert!(!TurretKind::Rapid.is_a(TurretKind::Cannon));
    }

    #[test]
    fn item_specialization_matches_parent() {
        assert!(ItemKind::PowerBoost.is_a(ItemKind::Boost));
        assert!(!ItemKind::Boost.is_a(ItemKind::PowerBoost));
        assert!(!ItemKind::Scrap.is_a(ItemKind::Boost));
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for kind in TurretKind::ALL {
            assert_eq!(kind.name().parse::<TurretKind>(), Ok(*kind));
        }
        assert_eq!(" Power_Boost ".parse::<ItemKind>(), Ok(ItemKind::PowerBoost));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let error = "dragon".parse::<EnemyKind>().unwrap_err();
        assert_eq!(error.family, "enemy");
        assert_eq!(error.to_string(), "unknown enemy kind `dragon`");
    }

    #[test]
    fn fire_interval_inverts_attack_speed() {
        let stats = TurretStats::new(1.0, 4.0, 1.0, 1.0, 0);
        assert_eq!(stats.fire_interval(), Duration::from_millis(250));

        let silent = TurretStats::new(1.0, 0.0, 1.0, 1.0, 0);
        assert_eq!(silent.fire_interval(), Duration::MAX);
    }
}
