//! Currency balances owned by the world.

use cafe_defence_core::{Currency, CurrencyAmounts};
use log::debug;

/// Non-negative currency counters with all-or-nothing spending.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct CurrencyLedger {
    balances: CurrencyAmounts,
}

impl CurrencyLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) const fn balances(&self) -> CurrencyAmounts {
        self.balances
    }

    pub(crate) const fn get(&self, currency: Currency) -> u64 {
        self.balances.get(currency)
    }

    /// Credits `amounts`, saturating at the counter limits.
    pub(crate) fn add(&mut self, amounts: CurrencyAmounts) -> CurrencyAmounts {
        self.balances = self.balances.saturating_add(amounts);
        self.balances
    }

    /// Debits every counter of `amounts` or none of them.
    pub(crate) fn spend(&mut self, amounts: CurrencyAmounts) -> bool {
        match self.balances.checked_sub(amounts) {
            Some(remaining) => {
                self.balances = remaining;
                true
            }
            None => {
                debug!("spend of {amounts:?} refused; balances {:?}", self.balances);
                false
            }
        }
    }
}
