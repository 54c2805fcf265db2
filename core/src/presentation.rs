//! Boundary contracts for the rendering side: highlights and effect playback.

use glam::Vec2;

use crate::{EnemyId, TurretId};

/// Entity a highlight or effect refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityRef {
    /// A turret.
    Turret(TurretId),
    /// An enemy.
    Enemy(EnemyId),
    /// The cafe objective.
    Cafe,
}

/// Color used by highlight outlines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HighlightColor {
    red: u8,
    green: u8,
    blue: u8,
}

impl HighlightColor {
    /// Outline shown while a turret is combining.
    pub const COMBINING: Self = Self::from_rgb(0xff, 0xc1, 0x07);
    /// Outline shown while a turret engages a target.
    pub const ENGAGED: Self = Self::from_rgb(0xc8, 0x2a, 0x36);
    /// Outline shown on freshly activated turrets.
    pub const READY: Self = Self::from_rgb(0x2f, 0x95, 0x32);

    /// Creates a new color from byte RGB components.
    #[must_use]
    pub const fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Red component of the color.
    #[must_use]
    pub const fn red(&self) -> u8 {
        self.red
    }

    /// Green component of the color.
    #[must_use]
    pub const fn green(&self) -> u8 {
        self.green
    }

    /// Blue component of the color.
    #[must_use]
    pub const fn blue(&self) -> u8 {
        self.blue
    }
}

/// Fire-and-forget visual effects requested by state transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// A turret finished its activation delay.
    TurretActivated,
    /// A turret was destroyed.
    TurretDestroyed,
    /// A combination started on a turret.
    CombineStart,
    /// A combination finished or was cancelled.
    CombineEnd,
    /// A projectile struck an enemy.
    Hit,
    /// An enemy attacked a turret or the cafe.
    Attack,
    /// An enemy started dying.
    EnemyDeath,
    /// An item dropped from a dead enemy.
    ItemDropped,
}

/// Highlight collaborator; the core never knows how highlighting renders.
pub trait VisualFeedback {
    /// Toggles the highlight of an entity.
    fn set_highlight(&mut self, entity: EntityRef, active: bool, color: HighlightColor, intensity: f32);
}

/// Effect playback collaborator.
pub trait EffectPlayer {
    /// Plays an effect at a world position.
    fn play_effect(&mut self, kind: EffectKind, position: Vec2);
}

/// Presentation collaborator that discards everything; used by headless runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullPresentation;

impl VisualFeedback for NullPresentation {
    fn set_highlight(&mut self, _entity: EntityRef, _active: bool, _color: HighlightColor, _intensity: f32) {}
}

impl EffectPlayer for NullPresentation {
    fn play_effect(&mut self, _kind: EffectKind, _position: Vec2) {}
}
