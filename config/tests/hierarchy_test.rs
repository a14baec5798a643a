//! Delegation and fallback behaviour across configuration hierarchies.

use config::{
    Config, ConfigExt, ConfigNode, ConverterRegistry, Converted, MemorySource, Number, TargetType
};
use errors::ConfigError;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Parent recording which accessor was called.
#[derive(Default)]
struct SpyConfig {
    calls: parking_lot::Mutex<HashMap<&'static str, usize>>,
    converters: ConverterRegistry
}

impl SpyConfig {
    fn record(&self, method: &'static str) {
        *self.calls.lock().entry(method).or_default() += 1;
    }

    fn calls(&self) -> HashMap<&'static str, usize> {
        self.calls.lock().clone()
    }

    fn total(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

impl Config for SpyConfig {
    fn contains_key(&self, _key: &str) -> Result<bool, ConfigError> {
        self.record("contains_key");
        Ok(true)
    }

    fn get(&self, _key: &str) -> Result<Option<String>, ConfigError> {
        self.record("get");
        Ok(Some("from-parent".to_string()))
    }

    fn get_undecorated(&self, _key: &str) -> Result<Option<String>, ConfigError> {
        self.record("get_undecorated");
        Ok(Some("from-parent".to_string()))
    }

    fn get_boolean(&self, _key: &str) -> Result<Option<bool>, ConfigError> {
        self.record("get_boolean");
        Ok(Some(true))
    }

    fn get_integer(&self, _key: &str) -> Result<Option<i32>, ConfigError> {
        self.record("get_integer");
        Ok(Some(7))
    }

    fn get_long(&self, _key: &str) -> Result<Option<i64>, ConfigError> {
        self.record("get_long");
        Ok(Some(7))
    }

    fn get_number(&self, _key: &str) -> Result<Option<Number>, ConfigError> {
        self.record("get_number");
        Ok(Some(Number::Integer(7)))
    }

    fn get_converted(&self, _key: &str, _target: &TargetType) -> Result<Option<Converted>, ConfigError> {
        self.record("get_converted");
        Ok(Some(Box::new(7u16)))
    }

    fn keys(&self) -> Result<Vec<String>, ConfigError> {
        self.record("keys");
        Ok(Vec::new())
    }

    fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }
}

fn memory(pairs: &[(&str, &str)]) -> Arc<MemorySource> {
    Arc::new(MemorySource::from_pairs("test", pairs.iter().copied()))
}

fn child_of(spy: &Arc<SpyConfig>, pairs: &[(&str, &str)]) -> ConfigNode<MemorySource> {
    ConfigNode::builder(memory(pairs))
        .parent(spy.clone())
        .build()
        .unwrap()
}

#[test]
fn test_scenario_child_parent_default() {
    let parent = ConfigNode::new(memory(&[("host", "b.com"), ("port", "80")]));
    let child = ConfigNode::builder(memory(&[("host", "a.com")]))
        .parent(Arc::new(parent))
        .build()
        .unwrap();

    assert_eq!(child.get("host").unwrap().as_deref(), Some("a.com"));
    assert_eq!(child.get("port").unwrap().as_deref(), Some("80"));
    assert_eq!(child.get_or("missing", "default").unwrap(), "default");
}

#[test]
fn test_local_key_never_reaches_parent() {
    let spy = Arc::new(SpyConfig::default());
    let child = child_of(&spy, &[("k", "42")]);

    assert_eq!(child.get("k").unwrap().as_deref(), Some("42"));
    assert_eq!(child.get_boolean("k").unwrap(), Some(false));
    assert_eq!(child.get_integer("k").unwrap(), Some(42));
    assert_eq!(child.get_long("k").unwrap(), Some(42));
    assert_eq!(child.get_number("k").unwrap(), Some(Number::Integer(42)));
    assert_eq!(child.get_as::<u16>("k").unwrap(), Some(42));
    assert!(child.contains_key("k").unwrap());
    assert_eq!(spy.total(), 0);
}

#[test]
fn test_missing_key_delegates_to_matching_accessor_once() {
    let cases: [(&str, fn(&ConfigNode<MemorySource>)); 6] = [
        ("get", |c| assert_eq!(c.get("k").unwrap().as_deref(), Some("from-parent"))),
        ("get_boolean", |c| assert_eq!(c.get_boolean("k").unwrap(), Some(true))),
        ("get_integer", |c| assert_eq!(c.get_integer("k").unwrap(), Some(7))),
        ("get_long", |c| assert_eq!(c.get_long("k").unwrap(), Some(7))),
        ("get_number", |c| assert_eq!(c.get_number("k").unwrap(), Some(Number::Integer(7)))),
        ("get_converted", |c| assert_eq!(c.get_as::<u16>("k").unwrap(), Some(7)))
    ];

    for (method, call) in cases {
        let spy = Arc::new(SpyConfig::default());
        let child = child_of(&spy, &[]);
        call(&child);
        assert_eq!(spy.calls(), HashMap::from([(method, 1)]), "{method}");
    }
}

#[test]
fn test_absent_without_parent_skips_parsing() {
    let parsed = Arc::new(AtomicUsize::new(0));
    let counter = parsed.clone();
    let mut registry = ConverterRegistry::default();
    registry.register::<u16>(move |s| {
        counter.fetch_add(1, Ordering::SeqCst);
        s.parse().map_err(|e: std::num::ParseIntError| e.to_string())
    });

    let node = ConfigNode::builder(memory(&[]))
        .converters(Arc::new(registry))
        .build()
        .unwrap();

    assert_eq!(node.get("k").unwrap(), None);
    assert_eq!(node.get_boolean("k").unwrap(), None);
    assert_eq!(node.get_integer("k").unwrap(), None);
    assert_eq!(node.get_long("k").unwrap(), None);
    assert_eq!(node.get_as::<u16>("k").unwrap(), None);
    assert_eq!(parsed.load(Ordering::SeqCst), 0);
}

#[test]
fn test_boolean_values() {
    let node = ConfigNode::new(memory(&[
        ("a", "true"),
        ("b", "TRUE"),
        ("c", "TrUe"),
        ("d", "false"),
        ("e", "yes"),
        ("f", "1")
    ]));

    for key in ["a", "b", "c"] {
        assert_eq!(node.get_boolean(key).unwrap(), Some(true), "{key}");
    }
    for key in ["d", "e", "f"] {
        assert_eq!(node.get_boolean(key).unwrap(), Some(false), "{key}");
    }
}

#[test]
fn test_conversion_error_is_not_defaulted() {
    let node = ConfigNode::new(memory(&[("port", "http")]));

    assert!(matches!(node.get_as_or::<u16>("port", 80), Err(ConfigError::Conversion { .. })));
    assert!(matches!(node.get_integer_or("port", 80), Err(ConfigError::Parse { .. })));
}

#[test]
fn test_three_level_fallback() {
    let root = ConfigNode::new(memory(&[("region", "eu"), ("timeout", "30")]));
    let team = ConfigNode::builder(memory(&[("timeout", "10")]))
        .parent(Arc::new(root))
        .build()
        .unwrap();
    let service = ConfigNode::builder(memory(&[("name", "api")]))
        .parent(Arc::new(team))
        .build()
        .unwrap();

    assert_eq!(service.depth(), 2);
    assert_eq!(service.get("region").unwrap().as_deref(), Some("eu"));
    assert_eq!(service.get_long("timeout").unwrap(), Some(10));
    assert_eq!(service.keys().unwrap(), vec!["name", "region", "timeout"]);
}
