//! # Change Notification
//!
//! [`WatchableConfig`] wraps a [`MutableConfig`] and notifies listeners
//! about changed keys.
//!
//! Mutations apply synchronously and record their keys in a pending set.
//! A background task on the Tokio runtime drains the set once per delivery
//! tick, so every mutation recorded before a tick fires is reported in a
//! single [`ConfigChangeEvent`] per listener. The mutation call never waits
//! for delivery.

use crate::config::{Config, MutableConfig};
use crate::convert::{Converted, ConverterRegistry, Number, TargetType};
use errors::ConfigError;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Keys changed since the previous delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChangeEvent {
    pub keys: BTreeSet<String>
}

/// Receives change notifications on the delivery task.
pub trait ConfigChangeListener: Send + Sync {
    fn on_change(&self, event: &ConfigChangeEvent);
}

impl<F> ConfigChangeListener for F
where
    F: Fn(&ConfigChangeEvent) + Send + Sync
{
    fn on_change(&self, event: &ConfigChangeEvent) {
        self(event)
    }
}

/// Handle returned by [`WatchableConfig::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone)]
pub struct WatchSettings {
    /// Delay between the first pending change and delivery. Changes arriving
    /// inside the window join the same notification.
    pub batch_window: Duration
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            batch_window: Duration::from_millis(10)
        }
    }
}

type Listeners = Vec<(ListenerId, Arc<dyn ConfigChangeListener>)>;

struct Shared {
    pending: Mutex<BTreeSet<String>>,
    listeners: RwLock<Listeners>,
    wake: Notify,
    next_id: AtomicU64
}

impl Shared {
    fn record<'a>(&self, keys: impl IntoIterator<Item = &'a str>) {
        self.pending
            .lock()
            .extend(keys.into_iter().map(str::to_string));
        self.wake.notify_one();
    }

    fn deliver(&self) {
        let keys = std::mem::take(&mut *self.pending.lock());
        if keys.is_empty() {
            return;
        }
        let listeners: Vec<_> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        debug!(keys = keys.len(), listeners = listeners.len(), "Delivering config change");

        let event = ConfigChangeEvent { keys };
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener.on_change(&event))).is_err() {
                error!("Config change listener panicked");
            }
        }
    }
}

async fn delivery_loop(shared: Arc<Shared>, window: Duration) {
    loop {
        shared.wake.notified().await;
        if window.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(window).await;
        }
        shared.deliver();
    }
}

/// Mutable configuration that reports changed keys to listeners.
///
/// # M-CANONICAL-DOCS
///
/// ## Usage
/// ```rust,no_run
/// use config::{ConfigChangeEvent, MemorySource, MutableConfig, MutableConfigNode, WatchableConfig};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let node = MutableConfigNode::new(Arc::new(MemorySource::new("runtime")));
///     let config = WatchableConfig::new(Arc::new(node))?;
///     config.add_listener(|event: &ConfigChangeEvent| println!("changed: {:?}", event.keys));
///
///     config.set("a", Some("1"))?;
///     config.set("b", Some("2"))?;
///     Ok(())
/// }
/// ```
///
/// ## Listener Semantics
/// - Delivery runs on a Tokio task; listeners must not block it for long.
/// - A panicking listener is logged and does not affect the others.
/// - Adding and removing listeners is safe during delivery. A removed
///   listener may still receive one notification that was already in
///   flight when it was removed.
///
/// ## Error Handling
/// Construction fails with [`ConfigError::Runtime`] outside a Tokio runtime.
pub struct WatchableConfig<M: MutableConfig + ?Sized = dyn MutableConfig> {
    inner: Arc<M>,
    shared: Arc<Shared>,
    task: JoinHandle<()>
}

impl<M: MutableConfig + ?Sized> WatchableConfig<M> {
    pub fn new(inner: Arc<M>) -> Result<Self, ConfigError> {
        Self::with_settings(inner, WatchSettings::default())
    }

    pub fn with_settings(inner: Arc<M>, settings: WatchSettings) -> Result<Self, ConfigError> {
        let handle = Handle::try_current().map_err(|e| ConfigError::Runtime {
            reason: e.to_string()
        })?;

        let shared = Arc::new(Shared {
            pending: Mutex::new(BTreeSet::new()),
            listeners: RwLock::new(Vec::new()),
            wake: Notify::new(),
            next_id: AtomicU64::new(0)
        });
        let task = handle.spawn(delivery_loop(shared.clone(), settings.batch_window));
        info!(batch_window = ?settings.batch_window, "Started config change delivery");

        Ok(Self {
            inner,
            shared,
            task
        })
    }

    pub fn inner(&self) -> &Arc<M> {
        &self.inner
    }

    pub fn add_listener(&self, listener: impl ConfigChangeListener + 'static) -> ListenerId {
        let id = ListenerId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Returns whether `id` was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.shared.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Listener forwarding every event into a channel.
    pub fn subscribe(&self) -> (ListenerId, mpsc::UnboundedReceiver<ConfigChangeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.add_listener(move |event: &ConfigChangeEvent| {
            let _ = tx.send(event.clone());
        });
        (id, rx)
    }

    pub fn listener_count(&self) -> usize {
        self.shared.listeners.read().len()
    }
}

impl<M: MutableConfig + ?Sized> Drop for WatchableConfig<M> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<M: MutableConfig + ?Sized> Config for WatchableConfig<M> {
    fn contains_key(&self, key: &str) -> Result<bool, ConfigError> {
        self.inner.contains_key(key)
    }

    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        self.inner.get(key)
    }

    fn get_undecorated(&self, key: &str) -> Result<Option<String>, ConfigError> {
        self.inner.get_undecorated(key)
    }

    fn get_boolean(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        self.inner.get_boolean(key)
    }

    fn get_integer(&self, key: &str) -> Result<Option<i32>, ConfigError> {
        self.inner.get_integer(key)
    }

    fn get_long(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        self.inner.get_long(key)
    }

    fn get_number(&self, key: &str) -> Result<Option<Number>, ConfigError> {
        self.inner.get_number(key)
    }

    fn get_converted(&self, key: &str, target: &TargetType) -> Result<Option<Converted>, ConfigError> {
        self.inner.get_converted(key, target)
    }

    fn keys(&self) -> Result<Vec<String>, ConfigError> {
        self.inner.keys()
    }

    fn converters(&self) -> &ConverterRegistry {
        self.inner.converters()
    }

    fn depth(&self) -> usize {
        self.inner.depth()
    }
}

impl<M: MutableConfig + ?Sized> MutableConfig for WatchableConfig<M> {
    fn set(&self, key: &str, value: Option<&str>) -> Result<(), ConfigError> {
        self.inner.set(key, value)?;
        self.shared.record([key]);
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<(), ConfigError> {
        self.inner.remove(keys)?;
        self.shared.record(keys.iter().copied());
        Ok(())
    }
}

impl<M: MutableConfig + ?Sized> fmt::Debug for WatchableConfig<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchableConfig")
            .field("listeners", &self.listener_count())
            .field("pending", &self.shared.pending.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MutableConfigExt;
    use crate::memory::MemorySource;
    use crate::node::MutableConfigNode;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::timeout;

    fn watchable() -> WatchableConfig<MutableConfigNode<MemorySource>> {
        let node = MutableConfigNode::new(Arc::new(MemorySource::new("watched")));
        WatchableConfig::new(Arc::new(node)).unwrap()
    }

    fn keys(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_requires_runtime() {
        let node = MutableConfigNode::new(Arc::new(MemorySource::new("watched")));
        let result = WatchableConfig::new(Arc::new(node));
        assert!(matches!(result, Err(ConfigError::Runtime { .. })));
    }

    #[tokio::test]
    async fn test_mutations_before_tick_are_coalesced() {
        let config = watchable();
        let (_, mut rx) = config.subscribe();

        config.set_as("a", Some(&1)).unwrap();
        config.set_as("b", Some(&2)).unwrap();

        let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.keys, keys(&["a", "b"]));
        assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_mutation_is_synchronous() {
        let config = watchable();
        config.set("a", Some("1")).unwrap();
        assert_eq!(config.get_integer("a").unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_remove_reports_every_key() {
        let config = watchable();
        let (_, mut rx) = config.subscribe();

        config.set("a", Some("1")).unwrap();
        let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.keys, keys(&["a"]));

        config.remove(&["a", "b"]).unwrap();
        let second = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(second.keys, keys(&["a", "b"]));
    }

    #[tokio::test]
    async fn test_removed_listener_not_notified() {
        let config = watchable();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = config.add_listener(move |_: &ConfigChangeEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (_, mut rx) = config.subscribe();

        assert!(config.remove_listener(id));
        assert!(!config.remove_listener(id));
        config.set("a", Some("1")).unwrap();

        timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(config.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_panicking_listener_isolated() {
        let config = watchable();
        let fail = true;
        config.add_listener(move |_: &ConfigChangeEvent| {
            if fail {
                panic!("listener failure");
            }
        });
        let (_, mut rx) = config.subscribe();

        config.set("a", Some("1")).unwrap();
        let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.keys, keys(&["a"]));
    }

    #[tokio::test]
    async fn test_failed_write_not_reported() {
        struct Rejecting(MutableConfigNode<MemorySource>);

        impl Config for Rejecting {
            fn contains_key(&self, key: &str) -> Result<bool, ConfigError> {
                self.0.contains_key(key)
            }
            fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
                self.0.get(key)
            }
            fn get_undecorated(&self, key: &str) -> Result<Option<String>, ConfigError> {
                self.0.get_undecorated(key)
            }
            fn get_boolean(&self, key: &str) -> Result<Option<bool>, ConfigError> {
                self.0.get_boolean(key)
            }
            fn get_integer(&self, key: &str) -> Result<Option<i32>, ConfigError> {
                self.0.get_integer(key)
            }
            fn get_long(&self, key: &str) -> Result<Option<i64>, ConfigError> {
                self.0.get_long(key)
            }
            fn get_number(&self, key: &str) -> Result<Option<Number>, ConfigError> {
                self.0.get_number(key)
            }
            fn get_converted(&self, key: &str, target: &TargetType) -> Result<Option<Converted>, ConfigError> {
                self.0.get_converted(key, target)
            }
            fn keys(&self) -> Result<Vec<String>, ConfigError> {
                self.0.keys()
            }
            fn converters(&self) -> &ConverterRegistry {
                self.0.converters()
            }
        }

        impl MutableConfig for Rejecting {
            fn set(&self, _key: &str, _value: Option<&str>) -> Result<(), ConfigError> {
                Err(ConfigError::backend("rejecting", "read-only"))
            }
            fn remove(&self, _keys: &[&str]) -> Result<(), ConfigError> {
                Err(ConfigError::backend("rejecting", "read-only"))
            }
        }

        let inner = Rejecting(MutableConfigNode::new(Arc::new(MemorySource::new("m"))));
        let config = WatchableConfig::new(Arc::new(inner)).unwrap();
        let (_, mut rx) = config.subscribe();

        assert!(config.set("a", Some("1")).is_err());
        assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    }
}
