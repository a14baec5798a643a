//! # Cipher Pool
//!
//! Bounded pool of reusable cipher objects with idle eviction.
//!
//! Borrow and release are serialized by one mutex, so they are linearizable
//! with respect to each other. Cipher creation runs outside the lock. Idle
//! entries past `idle_timeout`, or beyond `max_idle`, are dropped and created
//! again on demand.

use crate::engine::CryptoEngine;
use crate::settings::PoolSettings;
use errors::{CryptoError, PoolError};
use metrics::counter;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use validator::Validate;

/// Creates objects for a pool.
pub trait PooledObjectFactory<T>: Send + Sync {
    fn create(&self) -> Result<T, CryptoError>;
}

/// Borrow/release contract used by the crypto provider.
pub trait ObjectPool<T>: Send + Sync {
    /// Take an object out of the pool, creating one if none is idle.
    fn acquire(&self) -> Result<T, PoolError>;

    /// Hand a borrowed object back.
    fn release(&self, item: T) -> Result<(), PoolError>;
}

/// Factory producing fresh ciphers from an engine.
pub struct EngineCipherFactory<E> {
    engine: Arc<E>
}

impl<E> EngineCipherFactory<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }
}

impl<E: CryptoEngine> PooledObjectFactory<E::Cipher> for EngineCipherFactory<E> {
    fn create(&self) -> Result<E::Cipher, CryptoError> {
        self.engine.create_cipher()
    }
}

struct IdleEntry<T> {
    item: T,
    since: Instant
}

struct PoolState<T> {
    idle: VecDeque<IdleEntry<T>>,
    active: usize,
    closed: bool
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub active: usize,
    pub closed: bool
}

/// Bounded, lazily filled pool.
pub struct CipherPool<T> {
    factory: Box<dyn PooledObjectFactory<T>>,
    settings: PoolSettings,
    state: Mutex<PoolState<T>>
}

impl<T: Send> CipherPool<T> {
    pub fn new(
        factory: impl PooledObjectFactory<T> + 'static,
        settings: PoolSettings
    ) -> Result<Self, CryptoError> {
        settings
            .validate()
            .map_err(|e| CryptoError::configuration(e.to_string()))?;

        debug!(
            max_total = settings.max_total,
            max_idle = settings.max_idle,
            idle_timeout_ms = settings.idle_timeout.as_millis() as u64,
            "Created cipher pool"
        );

        Ok(Self {
            factory: Box::new(factory),
            settings,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                active: 0,
                closed: false
            })
        })
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            idle: state.idle.len(),
            active: state.active,
            closed: state.closed
        }
    }

    /// Drop idle entries older than the idle timeout. Returns how many went.
    pub fn evict_idle(&self) -> usize {
        let mut state = self.state.lock();
        self.evict_expired(&mut state, Instant::now())
    }

    /// Close the pool and drop all idle entries.
    ///
    /// Later borrows fail with [`PoolError::Closed`]; objects released after
    /// closing are dropped and the release reports [`PoolError::Closed`].
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.idle.clear();
            debug!(active = state.active, "Closed cipher pool");
        }
    }

    fn evict_expired(&self, state: &mut PoolState<T>, now: Instant) -> usize {
        let before = state.idle.len();
        state
            .idle
            .retain(|entry| now.duration_since(entry.since) < self.settings.idle_timeout);
        let evicted = before - state.idle.len();
        if evicted > 0 {
            counter!("config_cipher_pool_evicted_total").increment(evicted as u64);
            debug!(evicted, "Evicted idle ciphers");
        }
        evicted
    }
}

impl<T: Send> ObjectPool<T> for CipherPool<T> {
    fn acquire(&self) -> Result<T, PoolError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(PoolError::Closed);
            }
            self.evict_expired(&mut state, Instant::now());

            if let Some(entry) = state.idle.pop_back() {
                state.active += 1;
                return Ok(entry.item);
            }
            if state.active + state.idle.len() >= self.settings.max_total {
                counter!("config_cipher_pool_exhausted_total").increment(1);
                return Err(PoolError::Exhausted {
                    max_total: self.settings.max_total
                });
            }
            state.active += 1;
        }

        match self.factory.create() {
            Ok(item) => {
                counter!("config_cipher_pool_created_total").increment(1);
                Ok(item)
            }
            Err(e) => {
                let mut state = self.state.lock();
                state.active = state.active.saturating_sub(1);
                Err(PoolError::Factory {
                    reason: e.to_string()
                })
            }
        }
    }

    fn release(&self, item: T) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        if state.closed {
            return Err(PoolError::Closed);
        }

        let now = Instant::now();
        self.evict_expired(&mut state, now);
        if state.idle.len() >= self.settings.max_idle {
            counter!("config_cipher_pool_evicted_total").increment(1);
            return Ok(());
        }
        state.idle.push_back(IdleEntry { item, since: now });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingFactory {
        created: Arc<AtomicUsize>,
        fail: bool
    }

    impl PooledObjectFactory<usize> for CountingFactory {
        fn create(&self) -> Result<usize, CryptoError> {
            if self.fail {
                return Err(CryptoError::Operation {
                    reason: "factory down".to_string()
                });
            }
            Ok(self.created.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn pool(settings: PoolSettings) -> (CipherPool<usize>, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let factory = CountingFactory {
            created: created.clone(),
            fail: false
        };
        (CipherPool::new(factory, settings).unwrap(), created)
    }

    #[test]
    fn test_reuses_released_objects() {
        let (pool, created) = pool(PoolSettings::default());

        let first = pool.acquire().unwrap();
        pool.release(first).unwrap();
        let second = pool.acquire().unwrap();

        assert_eq!(first, second);
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().active, 1);
    }

    #[test]
    fn test_exhaustion_is_reported() {
        let (pool, _) = pool(PoolSettings {
            max_total: 2,
            ..PoolSettings::default()
        });

        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert_eq!(pool.acquire(), Err(PoolError::Exhausted { max_total: 2 }));
    }

    #[test]
    fn test_closed_pool_rejects_borrow_and_release() {
        let (pool, _) = pool(PoolSettings::default());
        let item = pool.acquire().unwrap();

        pool.close();
        assert_eq!(pool.acquire(), Err(PoolError::Closed));
        assert_eq!(pool.release(item), Err(PoolError::Closed));
        assert_eq!(pool.stats().active, 0);
    }

    #[test]
    fn test_factory_failure_frees_slot() {
        let factory = CountingFactory {
            created: Arc::new(AtomicUsize::new(0)),
            fail: true
        };
        let pool = CipherPool::new(
            factory,
            PoolSettings {
                max_total: 1,
                ..PoolSettings::default()
            }
        )
        .unwrap();

        assert!(matches!(pool.acquire(), Err(PoolError::Factory { .. })));
        assert!(matches!(pool.acquire(), Err(PoolError::Factory { .. })));
        assert_eq!(pool.stats().active, 0);
    }

    #[test]
    fn test_idle_entries_evicted_and_recreated() {
        let (pool, created) = pool(PoolSettings {
            idle_timeout: Duration::from_millis(0),
            ..PoolSettings::default()
        });

        let item = pool.acquire().unwrap();
        pool.release(item).unwrap();
        std::thread::sleep(Duration::from_millis(2));

        assert_eq!(pool.evict_idle(), 1);
        let again = pool.acquire().unwrap();
        assert_ne!(item, again);
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_max_idle_caps_retained_objects() {
        let (pool, _) = pool(PoolSettings {
            max_idle: 1,
            ..PoolSettings::default()
        });

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        pool.release(a).unwrap();
        pool.release(b).unwrap();

        assert_eq!(pool.stats().idle, 1);
    }

    #[test]
    fn test_concurrent_borrowers_never_share() {
        let (pool, _) = pool(PoolSettings {
            max_total: 8,
            ..PoolSettings::default()
        });
        let pool = Arc::new(pool);
        let in_use = Arc::new(Mutex::new(std::collections::HashSet::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let in_use = in_use.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let item = pool.acquire().unwrap();
                        assert!(in_use.lock().insert(item), "object borrowed twice");
                        in_use.lock().remove(&item);
                        pool.release(item).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.stats().active, 0);
    }
}
