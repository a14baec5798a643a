//! # Variable Resolution
//!
//! Expands `${name}` references inside configuration values.
//!
//! Each `name` is looked up through the owning node and expanded again,
//! recursively. A reference back to any key already being expanded fails
//! fast with [`ConfigError::VariableCycle`]; chains deeper than the
//! configured limit fail with [`ConfigError::VariableDepthExceeded`].
//! References to unknown names are left verbatim.

use errors::ConfigError;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

pub const DEFAULT_MAX_DEPTH: usize = 32;

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^${}]+)\}").expect("variable pattern is valid"));

/// Result of looking up a referenced name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substitution {
    /// Value still subject to expansion by this resolver.
    Unresolved(String),
    /// Value already fully processed elsewhere, inserted as-is.
    Resolved(String)
}

#[derive(Debug, Clone, Copy)]
pub struct VariableResolver {
    max_depth: usize
}

impl Default for VariableResolver {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH
        }
    }
}

impl VariableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Expand every reference in `value`, the value stored under `key`.
    pub fn resolve<F>(&self, key: &str, value: String, lookup: F) -> Result<String, ConfigError>
    where
        F: Fn(&str) -> Result<Option<Substitution>, ConfigError>
    {
        let mut chain = vec![key.to_string()];
        self.expand(value, &lookup, &mut chain)
    }

    fn expand<F>(&self, value: String, lookup: &F, chain: &mut Vec<String>) -> Result<String, ConfigError>
    where
        F: Fn(&str) -> Result<Option<Substitution>, ConfigError>
    {
        if !value.contains("${") {
            return Ok(value);
        }
        if chain.len() > self.max_depth {
            return Err(ConfigError::VariableDepthExceeded {
                key: chain[0].clone(),
                max_depth: self.max_depth
            });
        }

        let mut out = String::with_capacity(value.len());
        let mut last = 0;
        for caps in VARIABLE.captures_iter(&value) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let name = name.as_str().trim();
            out.push_str(&value[last..whole.start()]);
            last = whole.end();

            if chain.iter().any(|k| k == name) {
                chain.push(name.to_string());
                warn!(chain = ?chain, "Variable cycle detected");
                return Err(ConfigError::VariableCycle {
                    chain: chain.clone()
                });
            }

            match lookup(name)? {
                None => out.push_str(whole.as_str()),
                Some(Substitution::Resolved(text)) => out.push_str(&text),
                Some(Substitution::Unresolved(text)) => {
                    chain.push(name.to_string());
                    let expanded = self.expand(text, lookup, chain)?;
                    chain.pop();
                    out.push_str(&expanded);
                }
            }
        }
        out.push_str(&value[last..]);
        Ok(out)
    }
}
