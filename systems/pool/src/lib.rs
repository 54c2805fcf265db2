#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Bounded object pools with lifecycle hooks and generational keys.
//!
//! A [`Pool`] owns every instance it ever created. Callers hold [`PoolKey`]
//! values; a key stops resolving once its instance is released, so stale keys
//! and double releases are detected instead of corrupting the idle set.

use std::{
    collections::BTreeMap,
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use log::{debug, error, warn};

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// Lifecycle hooks applied by a [`Pool`].
pub trait Poolable {
    /// Activates the instance and resets transient state before it is handed out.
    fn on_acquire(&mut self) {}

    /// Deactivates the instance and drops any wiring before it returns to the idle set.
    fn on_release(&mut self) {}

    /// Final teardown when the pool is disposed.
    fn on_destroy(&mut self) {}
}

/// Behaviour when an acquisition finds no idle instance and the pool is at capacity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Construct a new instance beyond the nominal capacity.
    #[default]
    Grow,
    /// Fail the acquisition.
    Reject,
}

/// Handle to an instance handed out by a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolKey {
    pool: u32,
    index: u32,
    generation: u32,
}

impl PoolKey {
    /// Slot index within the owning pool; reused across generations.
    #[must_use]
    pub const fn slot(&self) -> u32 {
        self.index
    }
}

/// Guarded failures of pool operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The pool was disposed and accepts no further operations.
    #[error("pool `{pool}` was disposed")]
    Disposed {
        /// Pool label.
        pool: &'static str,
    },
    /// The key was issued by a different pool.
    #[error("key does not belong to pool `{pool}`")]
    ForeignKey {
        /// Pool label.
        pool: &'static str,
    },
    /// The instance behind the key was already released.
    #[error("instance in slot {slot} of pool `{pool}` was already released")]
    AlreadyReleased {
        /// Pool label.
        pool: &'static str,
        /// Slot index of the key.
        slot: u32,
    },
    /// No idle instance and the overflow policy refuses to grow.
    #[error("pool `{pool}` is at capacity {capacity}")]
    Exhausted {
        /// Pool label.
        pool: &'static str,
        /// Nominal capacity.
        capacity: usize,
    },
    /// The factory produced no instance.
    #[error("factory of pool `{pool}` produced no instance")]
    FactoryFailed {
        /// Pool label.
        pool: &'static str,
    },
    /// No pool is registered under the requested key.
    #[error("no pool registered for {key}")]
    Unregistered {
        /// Debug rendering of the requested key.
        key: String,
    },
}

/// Counters describing the history of a pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances produced by the factory.
    pub created: usize,
    /// Successful acquisitions.
    pub acquired: usize,
    /// Successful releases.
    pub released: usize,
    /// Instances torn down by [`Pool::dispose`].
    pub destroyed: usize,
}

#[derive(Debug)]
struct Slot<T> {
    item: T,
    generation: u32,
    active: bool,
}

/// Factory producing new pool instances; `None` marks a failed construction.
pub type Factory<T> = Box<dyn FnMut() -> Option<T>>;

/// Object pool with a nominal capacity and hook-driven lifecycle.
pub struct Pool<T: Poolable> {
    id: u32,
    label: &'static str,
    factory: Factory<T>,
    slots: Vec<Slot<T>>,
    idle: Vec<u32>,
    capacity: usize,
    overflow: OverflowPolicy,
    stats: PoolStats,
    disposed: bool,
}

impl<T: Poolable> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("label", &self.label)
            .field("capacity", &self.capacity)
            .field("active", &self.active_count())
            .field("idle", &self.idle.len())
            .field("stats", &self.stats)
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl<T: Poolable> Pool<T> {
    /// Creates an empty pool; instances are built lazily by `factory`.
    #[must_use]
    pub fn new(label: &'static str, capacity: usize, factory: Factory<T>) -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            label,
            factory,
            slots: Vec::new(),
            idle: Vec::new(),
            capacity,
            overflow: OverflowPolicy::default(),
            stats: PoolStats::default(),
            disposed: false,
        }
    }

    /// Replaces the overflow policy.
    #[must_use]
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Builds `count` idle instances ahead of time, bounded by the capacity.
    pub fn prewarm(&mut self, count: usize) {
        let target = count.min(self.capacity);
        while self.slots.len() < target {
            let Some(mut item) = (self.factory)() else {
                error!("{}: factory failed while prewarming", self.label);
                return;
            };
            item.on_release();
            let index = self.push_slot(item, false);
            self.idle.push(index);
        }
    }

    /// Label used in diagnostics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }

    /// Nominal capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Outstanding acquisitions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.slots.len() - self.idle.len()
    }

    /// Instances waiting for reuse.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Lifetime counters.
    #[must_use]
    pub const fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Reports whether [`Pool::dispose`] already ran.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Hands out an instance in its acquired state.
    ///
    /// Idle instances are reused most-recently-released first. When none is
    /// idle the factory builds a new one, subject to the overflow policy once
    /// the capacity is reached.
    pub fn acquire(&mut self) -> Result<PoolKey, PoolError> {
        if self.disposed {
            warn!("{}: acquire after dispose", self.label);
            return Err(PoolError::Disposed { pool: self.label });
        }

        let index = match self.idle.pop() {
            Some(index) => index,
            None => {
                if self.slots.len() >= self.capacity {
                    match self.overflow {
                        OverflowPolicy::Reject => {
                            warn!("{}: exhausted at capacity {}", self.label, self.capacity);
                            return Err(PoolError::Exhausted {
                                pool: self.label,
                                capacity: self.capacity,
                            });
                        }
                        OverflowPolicy::Grow => {
                            debug!(
                                "{}: growing past capacity {} to {}",
                                self.label,
                                self.capacity,
                                self.slots.len() + 1
                            );
                        }
                    }
                }
                let Some(item) = (self.factory)() else {
                    error!("{}: factory produced no instance", self.label);
                    return Err(PoolError::FactoryFailed { pool: self.label });
                };
                self.push_slot(item, false)
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.active = true;
        slot.item.on_acquire();
        self.stats.acquired += 1;
        Ok(PoolKey {
            pool: self.id,
            index,
            generation: slot.generation,
        })
    }

    /// Returns an instance to the idle set after applying its release hook.
    ///
    /// Foreign keys, stale keys, and releases after dispose are refused and
    /// leave the pool untouched.
    pub fn release(&mut self, key: PoolKey) -> Result<(), PoolError> {
        if self.disposed {
            warn!("{}: release after dispose", self.label);
            return Err(PoolError::Disposed { pool: self.label });
        }
        let index = self.resolve(key).map_err(|failure| {
            warn!("{}: refused release: {failure}", self.label);
            failure
        })?;

        let slot = &mut self.slots[index];
        slot.item.on_release();
        slot.active = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.idle.push(key.index);
        self.stats.released += 1;
        Ok(())
    }

    /// Releases every outstanding instance.
    pub fn release_all(&mut self) -> usize {
        let keys = self.active_keys();
        keys.into_iter()
            .filter(|key| self.release(*key).is_ok())
            .count()
    }

    /// Applies the destroy hook to every instance, outstanding or idle, and clears the pool.
    ///
    /// Returns the number of instances destroyed. A second call is refused.
    pub fn dispose(&mut self) -> Result<usize, PoolError> {
        if self.disposed {
            warn!("{}: dispose called twice", self.label);
            return Err(PoolError::Disposed { pool: self.label });
        }
        let outstanding = self.active_count();
        for slot in &mut self.slots {
            slot.item.on_destroy();
        }
        let destroyed = self.slots.len();
        self.stats.destroyed += destroyed;
        if outstanding > 0 {
            debug!("{}: destroyed {outstanding} outstanding instances", self.label);
        }
        self.slots.clear();
        self.idle.clear();
        self.disposed = true;
        Ok(destroyed)
    }

    /// Resolves a key to its acquired instance.
    #[must_use]
    pub fn get(&self, key: PoolKey) -> Option<&T> {
        let index = self.resolve(key).ok()?;
        Some(&self.slots[index].item)
    }

    /// Resolves a key to its acquired instance mutably.
    pub fn get_mut(&mut self, key: PoolKey) -> Option<&mut T> {
        let index = self.resolve(key).ok()?;
        Some(&mut self.slots[index].item)
    }

    /// Keys of every outstanding instance, in slot order.
    #[must_use]
    pub fn active_keys(&self) -> Vec<PoolKey> {
        self.iter().map(|(key, _)| key).collect()
    }

    /// Iterates outstanding instances in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (PoolKey, &T)> {
        let pool = self.id;
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.active)
            .map(move |(index, slot)| {
                (
                    PoolKey {
                        pool,
                        index: index as u32,
                        generation: slot.generation,
                    },
                    &slot.item,
                )
            })
    }

    fn push_slot(&mut self, item: T, active: bool) -> u32 {
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            item,
            generation: 0,
            active,
        });
        self.stats.created += 1;
        index
    }

    fn resolve(&self, key: PoolKey) -> Result<usize, PoolError> {
        if key.pool != self.id {
            return Err(PoolError::ForeignKey { pool: self.label });
        }
        let index = key.index as usize;
        match self.slots.get(index) {
            Some(slot) if slot.active && slot.generation == key.generation => Ok(index),
            Some(_) => Err(PoolError::AlreadyReleased {
                pool: self.label,
                slot: key.index,
            }),
            None => Err(PoolError::ForeignKey { pool: self.label }),
        }
    }
}

/// Pools keyed by a stable, explicit key such as an entity kind.
pub struct PoolRegistry<K: Ord, T: Poolable> {
    pools: BTreeMap<K, Pool<T>>,
}

impl<K: Ord + fmt::Debug, T: Poolable> fmt::Debug for PoolRegistry<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.pools.iter()).finish()
    }
}

impl<K: Ord, T: Poolable> Default for PoolRegistry<K, T> {
    fn default() -> Self {
        Self {
            pools: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy + fmt::Debug, T: Poolable> PoolRegistry<K, T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pool under `key`, disposing any pool it replaces.
    pub fn register(&mut self, key: K, pool: Pool<T>) {
        if let Some(mut replaced) = self.pools.insert(key, pool) {
            warn!("pool for {key:?} registered twice; disposing the previous one");
            let _ = replaced.dispose();
        }
    }

    /// Reports whether a pool exists for `key`.
    #[must_use]
    pub fn contains(&self, key: K) -> bool {
        self.pools.contains_key(&key)
    }

    /// Acquires from the pool registered under `key`.
    pub fn acquire(&mut self, key: K) -> Result<PoolKey, PoolError> {
        match self.pools.get_mut(&key) {
            Some(pool) => pool.acquire(),
            None => {
                warn!("no pool registered for {key:?}");
                Err(PoolError::Unregistered {
                    key: format!("{key:?}"),
                })
            }
        }
    }

    /// Pool registered under `key`.
    #[must_use]
    pub fn get(&self, key: K) -> Option<&Pool<T>> {
        self.pools.get(&key)
    }

    /// Pool registered under `key`, mutably.
    pub fn get_mut(&mut self, key: K) -> Option<&mut Pool<T>> {
        self.pools.get_mut(&key)
    }

    /// Outstanding acquisitions across every pool.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.pools.values().map(Pool::active_count).sum()
    }

    /// Releases every outstanding instance of every pool.
    pub fn release_all(&mut self) -> usize {
        self.pools.values_mut().map(Pool::release_all).sum()
    }

    /// Disposes every pool and forgets them, returning the instances destroyed.
    pub fn dispose_all(&mut self) -> usize {
        let destroyed = self
            .pools
            .values_mut()
            .filter_map(|pool| pool.dispose().ok())
            .sum();
        self.pools.clear();
        destroyed
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[derive(Debug, Default)]
    struct Cup {
        active: bool,
        acquisitions: u32,
        subscriptions: Vec<&'static str>,
        teardowns: Rc<Cell<usize>>,
    }

    impl Poolable for Cup {
        fn on_acquire(&mut self) {
            self.active = true;
            self.acquisitions += 1;
        }

        fn on_release(&mut self) {
            self.active = false;
            self.subscriptions.clear();
        }

        fn on_destroy(&mut self) {
            self.teardowns.set(self.teardowns.get() + 1);
        }
    }

    fn cup_pool(capacity: usize) -> Pool<Cup> {
        Pool::new("cup", capacity, Box::new(|| Some(Cup::default())))
    }

    #[test]
    fn acquired_instances_are_active_and_released_ones_are_not() {
        let mut pool = cup_pool(2);
        let key = pool.acquire().expect("acquire");
        assert!(pool.get(key).map_or(false, |cup| cup.active));

        pool.get_mut(key).expect("live").subscriptions.push("death");
        pool.release(key).expect("release");
        assert!(pool.get(key).is_none());

        let reused = pool.acquire().expect("reacquire");
        assert_eq!(reused.slot(), key.slot());
        let cup = pool.get(reused).expect("live");
        assert!(cup.active);
        assert!(cup.subscriptions.is_empty());
        assert_eq!(cup.acquisitions, 2);
        assert_eq!(pool.stats().created, 1);
    }

    #[test]
    fn double_release_is_refused_without_corrupting_state() {
        let mut pool = cup_pool(4);
        let key = pool.acquire().expect("acquire");
        pool.release(key).expect("first release");

        let error = pool.release(key).unwrap_err();
        assert_eq!(
            error,
            PoolError::AlreadyReleased {
                pool: "cup",
                slot: 0
            }
        );
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn keys_from_other_pools_are_refused() {
        let mut first = cup_pool(1);
        let mut second = cup_pool(1);
        let key = first.acquire().expect("acquire");
        let _ = second.acquire().expect("acquire");

        assert_eq!(
            second.release(key),
            Err(PoolError::ForeignKey { pool: "cup" })
        );
        assert_eq!(second.active_count(), 1);
    }

    #[test]
    fn reject_policy_fails_at_capacity_while_grow_overflows() {
        let mut strict = cup_pool(1).with_overflow(OverflowPolicy::Reject);
        let _ = strict.acquire().expect("first");
        assert!(matches!(strict.acquire(), Err(PoolError::Exhausted { .. })));

        let mut soft = cup_pool(1);
        let _ = soft.acquire().expect("first");
        let _ = soft.acquire().expect("overflow");
        assert_eq!(soft.active_count(), 2);
    }

    #[test]
    fn failing_factory_is_reported() {
        let mut pool: Pool<Cup> = Pool::new("broken", 3, Box::new(|| None));
        assert_eq!(
            pool.acquire(),
            Err(PoolError::FactoryFailed { pool: "broken" })
        );
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn dispose_destroys_idle_and_outstanding_instances_once() {
        let teardowns = Rc::new(Cell::new(0));
        let counter = Rc::clone(&teardowns);
        let mut pool = Pool::new(
            "cup",
            3,
            Box::new(move || {
                Some(Cup {
                    teardowns: Rc::clone(&counter),
                    ..Cup::default()
                })
            }),
        );
        pool.prewarm(2);
        assert_eq!(pool.idle_count(), 2);
        let held = pool.acquire().expect("acquire");
        assert_eq!(pool.stats().created, 2);
        assert_eq!((pool.active_count(), pool.idle_count()), (1, 1));

        assert_eq!(pool.dispose(), Ok(2));
        assert_eq!(teardowns.get(), 2);
        assert_eq!(pool.stats().destroyed, 2);
        assert!(pool.get(held).is_none());

        assert_eq!(pool.dispose(), Err(PoolError::Disposed { pool: "cup" }));
        assert_eq!(teardowns.get(), 2);
        assert!(matches!(pool.acquire(), Err(PoolError::Disposed { .. })));
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn conservation_holds_for_random_sequences() {
        let mut pool = cup_pool(3);
        let mut held: Vec<PoolKey> = Vec::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0x2545_f491);

        for _ in 0..500 {
            if !held.is_empty() && rng.gen_bool(0.4) {
                let index = rng.gen_range(0..held.len());
                let key = held.swap_remove(index);
                pool.release(key).expect("release held key");
            } else {
                held.push(pool.acquire().expect("grow policy never fails"));
            }

            let stats = pool.stats();
            assert_eq!(pool.active_count(), stats.acquired - stats.released);
            assert_eq!(pool.active_count(), held.len());
            assert!(pool.active_count() <= stats.created);
        }
    }

    #[test]
    fn registry_rejects_unknown_keys() {
        let mut registry: PoolRegistry<u8, Cup> = PoolRegistry::new();
        registry.register(1, cup_pool(2));

        assert!(registry.acquire(1).is_ok());
        assert_eq!(
            registry.acquire(9),
            Err(PoolError::Unregistered {
                key: "9".to_owned()
            })
        );
        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.release_all(), 1);
        assert_eq!(registry.active_count(), 0);

        assert_eq!(registry.dispose_all(), 1);
        assert!(!registry.contains(1));
    }
}
