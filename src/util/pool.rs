use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

/// Source of unique pool ids, so handles from one pool are rejected by another.
static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// Copyable reference to an instance owned by an [`ObjectPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    pool: u32,
    index: u32,
}

impl PoolHandle {
    /// Slot index inside the owning pool.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}/slot{}", self.pool, self.index)
    }
}

/// Construction and state-transition hooks for pooled instances.
///
/// `on_allocate` and `on_release` only see the instance, never the pool.
pub trait PoolHooks {
    type Item;
    type Error;

    /// Build a fresh instance. Called only when the idle set is empty.
    fn create(&mut self) -> Result<Self::Item, Self::Error>;

    /// Put an instance into its in-use state.
    fn on_allocate(&mut self, item: &mut Self::Item);

    /// Put an instance into a hidden, safe-to-keep state.
    fn on_release(&mut self, item: &mut Self::Item);
}

/// [`PoolHooks`] assembled from three closures.
pub struct FnHooks<C, A, R> {
    create: C,
    on_allocate: A,
    on_release: R,
}

impl<C, A, R> FnHooks<C, A, R> {
    pub fn new<T, E>(create: C, on_allocate: A, on_release: R) -> Self
    where
        C: FnMut() -> Result<T, E>,
        A: FnMut(&mut T),
        R: FnMut(&mut T),
    {
        Self {
            create,
            on_allocate,
            on_release,
        }
    }
}

impl<T, E, C, A, R> PoolHooks for FnHooks<C, A, R>
where
    C: FnMut() -> Result<T, E>,
    A: FnMut(&mut T),
    R: FnMut(&mut T),
{
    type Item = T;
    type Error = E;

    fn create(&mut self) -> Result<T, E> {
        (self.create)()
    }

    fn on_allocate(&mut self, item: &mut T) {
        (self.on_allocate)(item)
    }

    fn on_release(&mut self, item: &mut T) {
        (self.on_release)(item)
    }
}

/// What the pool does when asked to release something it does not hold active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReleasePolicy {
    /// Abort with a panic. The caller has a bookkeeping bug.
    #[default]
    Panic,
    /// Log a warning, count it, and hand the error back.
    Warn,
}

/// Pool tuning.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Name used in log lines.
    pub name: &'static str,
    /// Upper bound on instances ever created. `None` = unbounded.
    pub max_instances: Option<usize>,
    pub release_policy: ReleasePolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "pool",
            max_instances: None,
            release_policy: ReleasePolicy::Panic,
        }
    }
}

/// Allocation failure.
#[derive(Debug, Error)]
pub enum AllocError<E> {
    /// Every instance is active and the ceiling forbids creating another.
    #[error("pool exhausted: all {capacity} instances are active")]
    Exhausted { capacity: usize },
    /// The construction hook failed. Pool state is unchanged.
    #[error("failed to construct pooled instance: {0}")]
    Create(#[source] E),
}

/// Rejected release. Pool state is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReleaseError {
    #[error("{handle} belongs to a different pool")]
    ForeignHandle { handle: PoolHandle },
    #[error("{handle} was never allocated by this pool")]
    UnknownSlot { handle: PoolHandle },
    #[error("{handle} is not active (already released?)")]
    NotActive { handle: PoolHandle },
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoolStats {
    /// Instances constructed over the pool's lifetime.
    pub created: usize,
    /// Allocations served from the idle set.
    pub reused: usize,
    /// Successful releases.
    pub released: usize,
    /// Releases refused under [`ReleasePolicy::Warn`].
    pub rejected: usize,
    /// Currently checked out.
    pub active: usize,
    /// Currently parked.
    pub idle: usize,
}

impl PoolStats {
    /// Fraction of allocations that avoided construction (0.0 to 1.0).
    pub fn reuse_rate(&self) -> f64 {
        let total = self.created + self.reused;
        if total == 0 {
            0.0
        } else {
            self.reused as f64 / total as f64
        }
    }
}

struct Slot<T> {
    item: T,
    active: bool,
}

/// Owns every instance it ever created and tracks which are in use.
///
/// Confined to a single owner: all mutation goes through `&mut self`.
pub struct ObjectPool<H: PoolHooks> {
    id: u32,
    hooks: H,
    config: PoolConfig,
    slots: Vec<Slot<H::Item>>,
    /// Idle slot indices. Most recently released on top.
    idle: Vec<u32>,
    active: usize,
    reused: usize,
    released: usize,
    rejected: usize,
}

impl<H: PoolHooks> ObjectPool<H> {
    pub fn new(hooks: H) -> Self {
        Self::with_config(hooks, PoolConfig::default())
    }

    pub fn with_config(hooks: H, config: PoolConfig) -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            hooks,
            config,
            slots: Vec::new(),
            idle: Vec::new(),
            active: 0,
            reused: 0,
            released: 0,
            rejected: 0,
        }
    }

    /// Check out an instance, reusing an idle one before constructing.
    pub fn allocate(&mut self) -> Result<PoolHandle, AllocError<H::Error>> {
        let index = match self.idle.pop() {
            Some(index) => {
                self.reused += 1;
                index
            }
            None => self.grow()?,
        };

        let slot = &mut self.slots[index as usize];
        debug_assert!(!slot.active, "idle list held an active slot");
        slot.active = true;
        self.active += 1;
        self.hooks.on_allocate(&mut slot.item);

        Ok(PoolHandle {
            pool: self.id,
            index,
        })
    }

    fn grow(&mut self) -> Result<u32, AllocError<H::Error>> {
        if let Some(capacity) = self.config.max_instances {
            if self.slots.len() >= capacity {
                return Err(AllocError::Exhausted { capacity });
            }
        }

        let item = self.hooks.create().map_err(AllocError::Create)?;
        self.slots.push(Slot {
            item,
            active: false,
        });
        log::debug!(
            "{}: constructed instance #{}",
            self.config.name,
            self.slots.len()
        );
        Ok((self.slots.len() - 1) as u32)
    }

    /// Return an active instance to the idle set.
    ///
    /// # Panics
    /// Under [`ReleasePolicy::Panic`], if `handle` is not active in this pool.
    pub fn release(&mut self, handle: PoolHandle) -> Result<(), ReleaseError> {
        if let Err(err) = self.check_active(handle) {
            return self.reject(err);
        }

        let slot = &mut self.slots[handle.index()];
        slot.active = false;
        self.active -= 1;
        self.hooks.on_release(&mut slot.item);
        self.idle.push(handle.index);
        self.released += 1;
        Ok(())
    }

    /// Release every active instance in slot order. Returns how many were released.
    pub fn release_all(&mut self) -> usize {
        let handles: Vec<PoolHandle> = self.iter_active().map(|(handle, _)| handle).collect();
        for &handle in &handles {
            // Just collected from the active set.
            let _ = self.release(handle);
        }
        handles.len()
    }

    fn check_active(&self, handle: PoolHandle) -> Result<(), ReleaseError> {
        if handle.pool != self.id {
            return Err(ReleaseError::ForeignHandle { handle });
        }
        match self.slots.get(handle.index()) {
            None => Err(ReleaseError::UnknownSlot { handle }),
            Some(slot) if !slot.active => Err(ReleaseError::NotActive { handle }),
            Some(_) => Ok(()),
        }
    }

    fn reject(&mut self, err: ReleaseError) -> Result<(), ReleaseError> {
        match self.config.release_policy {
            ReleasePolicy::Panic => panic!("{}: invalid release: {err}", self.config.name),
            ReleasePolicy::Warn => {
                self.rejected += 1;
                log::warn!("{}: ignoring invalid release: {err}", self.config.name);
                Err(err)
            }
        }
    }

    /// Borrow an active instance. `None` for idle or foreign handles.
    pub fn get(&self, handle: PoolHandle) -> Option<&H::Item> {
        self.check_active(handle).ok()?;
        Some(&self.slots[handle.index()].item)
    }

    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut H::Item> {
        self.check_active(handle).ok()?;
        Some(&mut self.slots[handle.index()].item)
    }

    pub fn is_active(&self, handle: PoolHandle) -> bool {
        self.check_active(handle).is_ok()
    }

    pub fn iter_active(&self) -> impl Iterator<Item = (PoolHandle, &H::Item)> {
        let pool = self.id;
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.active)
            .map(move |(i, slot)| {
                (
                    PoolHandle {
                        pool,
                        index: i as u32,
                    },
                    &slot.item,
                )
            })
    }

    pub fn active_len(&self) -> usize {
        self.active
    }

    pub fn idle_len(&self) -> usize {
        self.idle.len()
    }

    /// Total instances ever created.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.slots.len(),
            reused: self.reused,
            released: self.released,
            rejected: self.rejected,
            active: self.active,
            idle: self.idle.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::convert::Infallible;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::rc::Rc;

    /// Instance that remembers which hooks ran on it.
    #[derive(Debug)]
    struct Probe {
        serial: u32,
        shown: bool,
        allocs: u32,
        releases: u32,
    }

    /// Hooks that count constructions and record the call log.
    struct CountingHooks {
        created: u32,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl PoolHooks for CountingHooks {
        type Item = Probe;
        type Error = Infallible;

        fn create(&mut self) -> Result<Probe, Infallible> {
            self.created += 1;
            self.log.borrow_mut().push(format!("create {}", self.created));
            Ok(Probe {
                serial: self.created,
                shown: false,
                allocs: 0,
                releases: 0,
            })
        }

        fn on_allocate(&mut self, item: &mut Probe) {
            item.shown = true;
            item.allocs += 1;
            self.log.borrow_mut().push(format!("alloc {}", item.serial));
        }

        fn on_release(&mut self, item: &mut Probe) {
            item.shown = false;
            item.releases += 1;
            self.log.borrow_mut().push(format!("release {}", item.serial));
        }
    }

    fn counting_pool(
        policy: ReleasePolicy,
    ) -> (ObjectPool<CountingHooks>, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let hooks = CountingHooks {
            created: 0,
            log: Rc::clone(&log),
        };
        let config = PoolConfig {
            name: "test",
            release_policy: policy,
            ..PoolConfig::default()
        };
        (ObjectPool::with_config(hooks, config), log)
    }

    #[test]
    fn reuses_released_instance_before_constructing() {
        let (mut pool, _) = counting_pool(ReleasePolicy::Panic);

        let a = pool.allocate().unwrap();
        assert_eq!(pool.hooks().created, 1);
        let b = pool.allocate().unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.hooks().created, 2);

        pool.release(a).unwrap();
        let c = pool.allocate().unwrap();
        assert_eq!(c, a);
        assert_eq!(pool.hooks().created, 2);
        assert_eq!(pool.get(c).unwrap().serial, 1);
    }

    #[test]
    fn allocations_never_alias() {
        let (mut pool, _) = counting_pool(ReleasePolicy::Panic);
        let mut seen = Vec::new();
        for _ in 0..32 {
            let h = pool.allocate().unwrap();
            assert!(!seen.contains(&h));
            seen.push(h);
        }
        pool.release(seen[7]).unwrap();
        pool.release(seen[3]).unwrap();
        let x = pool.allocate().unwrap();
        let y = pool.allocate().unwrap();
        assert_ne!(x, y);
        assert!(pool.is_active(x) && pool.is_active(y));
    }

    #[test]
    fn release_in_any_order_parks_everything() {
        let (mut pool, _) = counting_pool(ReleasePolicy::Panic);
        let mut rng = fastrand::Rng::with_seed(7);
        let mut handles: Vec<_> = (0..50).map(|_| pool.allocate().unwrap()).collect();
        rng.shuffle(&mut handles);

        for h in handles {
            pool.release(h).unwrap();
        }
        assert_eq!(pool.active_len(), 0);
        assert_eq!(pool.idle_len(), 50);
        assert_eq!(pool.len(), 50);
    }

    #[test]
    fn hooks_run_once_per_transition_in_order() {
        let (mut pool, log) = counting_pool(ReleasePolicy::Panic);
        let a = pool.allocate().unwrap();
        assert!(pool.get(a).unwrap().shown);
        pool.release(a).unwrap();
        let a = pool.allocate().unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["create 1", "alloc 1", "release 1", "alloc 1"]
        );
        let probe = pool.get(a).unwrap();
        assert_eq!(probe.allocs, 2);
        assert_eq!(probe.releases, 1);
    }

    #[test]
    fn idle_instances_are_not_reachable() {
        let (mut pool, _) = counting_pool(ReleasePolicy::Panic);
        let a = pool.allocate().unwrap();
        pool.release(a).unwrap();
        assert!(pool.get(a).is_none());
        assert!(pool.get_mut(a).is_none());
        assert_eq!(pool.iter_active().count(), 0);
    }

    #[test]
    #[should_panic(expected = "not active")]
    fn double_release_panics_by_default() {
        let (mut pool, _) = counting_pool(ReleasePolicy::Panic);
        let a = pool.allocate().unwrap();
        pool.release(a).unwrap();
        let _ = pool.release(a);
    }

    #[test]
    fn failed_release_leaves_sets_untouched() {
        let (mut pool, _) = counting_pool(ReleasePolicy::Panic);
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        pool.release(b).unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| pool.release(b)));
        assert!(result.is_err());
        assert_eq!(pool.active_len(), 1);
        assert_eq!(pool.idle_len(), 1);
        assert!(pool.is_active(a));
    }

    #[test]
    fn warn_policy_reports_invalid_releases() {
        let (mut pool, log) = counting_pool(ReleasePolicy::Warn);
        let (mut other, _) = counting_pool(ReleasePolicy::Warn);

        let a = pool.allocate().unwrap();
        let foreign = other.allocate().unwrap();
        pool.release(a).unwrap();
        let calls_before = log.borrow().len();

        assert_eq!(pool.release(a), Err(ReleaseError::NotActive { handle: a }));
        assert_eq!(
            pool.release(foreign),
            Err(ReleaseError::ForeignHandle { handle: foreign })
        );
        let never = PoolHandle {
            pool: pool.id,
            index: 99,
        };
        assert_eq!(
            pool.release(never),
            Err(ReleaseError::UnknownSlot { handle: never })
        );

        assert_eq!(pool.idle_len(), 1);
        assert_eq!(pool.active_len(), 0);
        assert_eq!(pool.stats().rejected, 3);
        assert_eq!(log.borrow().len(), calls_before, "no hook may run on rejection");
    }

    #[test]
    fn ceiling_reports_exhaustion_without_constructing() {
        let config = PoolConfig {
            max_instances: Some(2),
            ..PoolConfig::default()
        };
        let mut built = 0;
        let hooks = FnHooks::new(
            move || {
                built += 1;
                Ok::<u32, Infallible>(built)
            },
            |_: &mut u32| {},
            |_: &mut u32| {},
        );
        let mut pool = ObjectPool::with_config(hooks, config);

        let a = pool.allocate().unwrap();
        let _b = pool.allocate().unwrap();
        assert!(matches!(
            pool.allocate(),
            Err(AllocError::Exhausted { capacity: 2 })
        ));
        assert_eq!(pool.len(), 2);

        pool.release(a).unwrap();
        assert!(pool.allocate().is_ok());
    }

    #[test]
    fn construction_failure_propagates() {
        #[derive(Debug, PartialEq)]
        struct OutOfTextures;

        let hooks = FnHooks::new(
            || Err::<String, _>(OutOfTextures),
            |_: &mut String| {},
            |_: &mut String| {},
        );
        let mut pool = ObjectPool::new(hooks);

        match pool.allocate() {
            Err(AllocError::Create(e)) => assert_eq!(e, OutOfTextures),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(pool.is_empty());
        assert_eq!(pool.active_len(), 0);
    }

    #[test]
    fn closure_hooks_reset_state() {
        let hooks = FnHooks::new(
            || Ok::<f32, Infallible>(0.0),
            |alpha: &mut f32| *alpha = 1.0,
            |alpha: &mut f32| *alpha = 0.0,
        );
        let mut pool = ObjectPool::new(hooks);
        let a = pool.allocate().unwrap();
        assert_eq!(pool.get(a), Some(&1.0));
        *pool.get_mut(a).unwrap() = 0.5;
        pool.release(a).unwrap();
        let a = pool.allocate().unwrap();
        assert_eq!(pool.get(a), Some(&1.0));
    }

    #[test]
    fn release_all_and_stats() {
        let (mut pool, _) = counting_pool(ReleasePolicy::Panic);
        let handles: Vec<_> = (0..4).map(|_| pool.allocate().unwrap()).collect();
        pool.release(handles[0]).unwrap();
        pool.allocate().unwrap();

        assert_eq!(pool.release_all(), 4);
        let stats = pool.stats();
        assert_eq!(stats.created, 4);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.released, 5);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.idle, 4);
        assert!((stats.reuse_rate() - 0.2).abs() < 1e-9);
    }
}
