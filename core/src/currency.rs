//! Currency amounts and the persistence contract of the ledger.

use serde::{Deserialize, Serialize};

/// Counters tracked by the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// Coins earned from kills and wave rewards.
    Coin,
    /// Tech points granted during preparation.
    TechPoint,
    /// Water points collected from drops.
    WaterPoint,
}

/// Non-negative amount for every currency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyAmounts {
    /// Coins.
    pub coin: u64,
    /// Tech points.
    pub tech_points: u64,
    /// Water points.
    pub water_points: u64,
}

/// Balances captured for persistence.
pub type LedgerSnapshot = CurrencyAmounts;

impl CurrencyAmounts {
    /// No currency at all.
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Creates amounts from explicit counters.
    #[must_use]
    pub const fn new(coin: u64, tech_points: u64, water_points: u64) -> Self {
        Self {
            coin,
            tech_points,
            water_points,
        }
    }

    /// Coins only.
    #[must_use]
    pub const fn coins(coin: u64) -> Self {
        Self::new(coin, 0, 0)
    }

    /// Tech points only.
    #[must_use]
    pub const fn tech_points(tech_points: u64) -> Self {
        Self::new(0, tech_points, 0)
    }

    /// Water points only.
    #[must_use]
    pub const fn water_points(water_points: u64) -> Self {
        Self::new(0, 0, water_points)
    }

    /// Amount of the requested currency.
    #[must_use]
    pub const fn get(&self, currency: Currency) -> u64 {
        match currency {
            Currency::Coin => self.coin,
            Currency::TechPoint => self.tech_points,
            Currency::WaterPoint => self.water_points,
        }
    }

    /// Reports whether every counter is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.coin == 0 && self.tech_points == 0 && self.water_points == 0
    }

    /// Component-wise saturating sum.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self::new(
            self.coin.saturating_add(other.coin),
            self.tech_points.saturating_add(other.tech_points),
            self.water_points.saturating_add(other.water_points),
        )
    }

    /// Component-wise subtraction that fails if any counter would go negative.
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        let (Some(coin), Some(tech_points), Some(water_points)) = (
            self.coin.checked_sub(other.coin),
            self.tech_points.checked_sub(other.tech_points),
            self.water_points.checked_sub(other.water_points),
        ) else {
            return None;
        };
        Some(Self::new(coin, tech_points, water_points))
    }
}

/// Errors surfaced by a [`CurrencyStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing storage could not be read or written.
    #[error("currency store unavailable: {0}")]
    Unavailable(String),
    /// Stored data could not be decoded.
    #[error("currency snapshot is corrupt: {0}")]
    Corrupt(String),
}

/// Persistence collaborator for the ledger; owns the storage format.
pub trait CurrencyStore {
    /// Loads the last saved balances.
    fn load(&mut self) -> Result<LedgerSnapshot, StoreError>;

    /// Persists the provided balances.
    fn save(&mut self, snapshot: &LedgerSnapshot) -> Result<(), StoreError>;
}

/// In-memory store used by tests and headless runs.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    snapshot: LedgerSnapshot,
    saves: usize,
}

impl MemoryStore {
    /// Creates a store preloaded with the provided balances.
    #[must_use]
    pub const fn with_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self { snapshot, saves: 0 }
    }

    /// Last balances written or preloaded.
    #[must_use]
    pub const fn snapshot(&self) -> LedgerSnapshot {
        self.snapshot
    }

    /// Number of successful saves.
    #[must_use]
    pub const fn saves(&self) -> usize {
        self.saves
    }
}

impl CurrencyStore for MemoryStore {
    fn load(&mut self) -> Result<LedgerSnapshot, StoreError> {
        Ok(self.snapshot)
    }

    fn save(&mut self, snapshot: &LedgerSnapshot) -> Result<(), StoreError> {
        self.snapshot = *snapshot;
        self.saves += 1;
        Ok(())
    }
}
