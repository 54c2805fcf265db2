//! Read-only level data: the cafe objective, spawn points, and wave definitions.

use std::time::Duration;

use glam::Vec2;
use log::error;
use serde::Deserialize;

use crate::{EnemyKind, Kind};

/// Zero-based index of a wave within a level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaveIndex(u32);

impl WaveIndex {
    /// The opening wave.
    pub const FIRST: Self = Self(0);

    /// Creates a wave index.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Zero-based value.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// One-based wave number shown to players and used by reward math.
    #[must_use]
    pub const fn number(&self) -> u32 {
        self.0.saturating_add(1)
    }

    /// Index of the wave that follows.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Run of identical enemies spawned one after another.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnemyGroup {
    /// Kind of every enemy in the group.
    pub kind: EnemyKind,
    /// Number of enemies.
    pub count: u32,
    /// Simulated time separating consecutive spawns of the group.
    pub delay: Duration,
}

/// One wave of a level.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveDefinition {
    /// Position of the wave within the level.
    pub index: WaveIndex,
    /// World position enemies appear at.
    pub origin: Vec2,
    /// Groups spawned in order.
    pub groups: Vec<EnemyGroup>,
}

impl WaveDefinition {
    /// Total enemies the wave spawns: the sum of group counts.
    #[must_use]
    pub fn total_enemies(&self) -> u32 {
        self.groups
            .iter()
            .fold(0u32, |total, group| total.saturating_add(group.count))
    }

    /// Generated stand-in for a missing wave so the loop never stalls.
    #[must_use]
    pub fn fallback(index: WaveIndex, origin: Vec2) -> Self {
        Self {
            index,
            origin,
            groups: vec![EnemyGroup {
                kind: EnemyKind::Grunt,
                count: 3 + index.get(),
                delay: Duration::from_secs(1),
            }],
        }
    }
}

/// Objective enemies walk toward when no turret is in reach.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct CafeDefinition {
    /// World position of the cafe.
    pub position: Vec2,
    /// Hit points of the cafe.
    pub max_health: f32,
}

impl Default for CafeDefinition {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            max_health: 500.0,
        }
    }
}

/// Level data supplied by the scene collaborator.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LevelDefinition {
    /// Objective.
    pub cafe: CafeDefinition,
    /// Candidate spawn origins.
    pub spawn_points: Vec<Vec2>,
    /// Waves in play order.
    pub waves: Vec<WaveDefinition>,
}

/// Errors raised while parsing a level document.
#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    /// The document is not valid TOML or does not fit the schema.
    #[error("failed to parse level document: {0}")]
    Parse(#[from] toml::de::Error),
}

impl LevelDefinition {
    /// Number of waves the level declares.
    #[must_use]
    pub fn total_waves(&self) -> u32 {
        u32::try_from(self.waves.len()).unwrap_or(u32::MAX)
    }

    /// Definition of the requested wave, or a generated fallback when missing or empty.
    #[must_use]
    pub fn wave(&self, index: WaveIndex) -> WaveDefinition {
        match self.waves.iter().find(|wave| wave.index == index) {
            Some(wave) if wave.total_enemies() > 0 => wave.clone(),
            Some(_) => {
                error!("wave {} spawns no enemies; substituting a generated wave", index.number());
                WaveDefinition::fallback(index, self.default_origin())
            }
            None => {
                error!("wave {} is not defined; substituting a generated wave", index.number());
                WaveDefinition::fallback(index, self.default_origin())
            }
        }
    }

    /// Parses a level from TOML.
    ///
    /// Groups naming unknown enemy kinds and waves pointing at missing spawn
    /// points are configuration errors: they are logged and degrade to a
    /// skipped group or the first spawn point respectively.
    pub fn from_toml_str(contents: &str) -> Result<Self, LevelError> {
        let document: LevelDocument = toml::from_str(contents)?;
        let spawn_points = document.spawn_points;
        let fallback_origin = spawn_points.first().copied().unwrap_or(Vec2::ZERO);

        let mut waves = Vec::with_capacity(document.waves.len());
        for (position, wave) in document.waves.into_iter().enumerate() {
            let index = WaveIndex::new(u32::try_from(position).unwrap_or(u32::MAX));
            let origin = match spawn_points.get(wave.spawn_point) {
                Some(origin) => *origin,
                None => {
                    error!(
                        "wave {} references missing spawn point {}",
                        index.number(),
                        wave.spawn_point
                    );
                    fallback_origin
                }
            };

            let mut groups = Vec::with_capacity(wave.groups.len());
            for group in wave.groups {
                match EnemyKind::from_name(&group.kind) {
                    Ok(kind) => groups.push(EnemyGroup {
                        kind,
                        count: group.count,
                        delay: Duration::from_millis(group.delay_ms),
                    }),
                    Err(error) => error!("wave {}: {error}; group skipped", index.number()),
                }
            }

            waves.push(WaveDefinition {
                index,
                origin,
                groups,
            });
        }

        Ok(Self {
            cafe: document.cafe,
            spawn_points,
            waves,
        })
    }

    fn default_origin(&self) -> Vec2 {
        self.spawn_points
            .first()
            .copied()
            .unwrap_or(self.cafe.position + Vec2::new(20.0, 0.0))
    }
}

#[derive(Debug, Deserialize)]
struct LevelDocument {
    #[serde(default)]
    cafe: CafeDefinition,
    #[serde(default)]
    spawn_points: Vec<Vec2>,
    #[serde(default)]
    waves: Vec<WaveDocument>,
}

#[derive(Debug, Deserialize)]
struct WaveDocument {
    #[serde(default)]
    spawn_point: usize,
    #[serde(default)]
    groups: Vec<GroupDocument>,
}

#[derive(Debug, Deserialize)]
struct GroupDocument {
    kind: String,
    count: u32,
    #[serde(default)]
    delay_ms: u64,
}
