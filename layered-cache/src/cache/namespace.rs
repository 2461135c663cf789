//! Cache namespaces and key construction
//!
//! Every fully-qualified key has the form `prefix:businessKey[:version]`.
//! Prefixes are unique and may not contain the separator or glob
//! metacharacters, so `prefix:*` only ever matches keys of its own namespace.

use crate::cache::types::CacheKey;
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::debug;

/// Separator between prefix, business key and version
pub const KEY_SEPARATOR: char = ':';

const FORBIDDEN_PREFIX_CHARS: [char; 5] = [KEY_SEPARATOR, '*', '?', '[', ']'];

/// A logical cache domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheNamespace {
    pub name: String,
    pub prefix: String,
    pub default_ttl: Duration,
}

impl CacheNamespace {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            default_ttl,
        }
    }

    /// Glob pattern matching every key of this namespace
    pub fn pattern(&self) -> String {
        format!("{}{}*", self.prefix, KEY_SEPARATOR)
    }

    /// Prefix including the trailing separator
    pub fn key_prefix(&self) -> String {
        format!("{}{}", self.prefix, KEY_SEPARATOR)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CacheError::InvalidKey("namespace name is empty".to_string()));
        }
        if self.prefix.is_empty() {
            return Err(CacheError::InvalidKey(format!(
                "namespace '{}' has an empty prefix",
                self.name
            )));
        }
        if let Some(c) = self.prefix.chars().find(|c| FORBIDDEN_PREFIX_CHARS.contains(c)) {
            return Err(CacheError::InvalidKey(format!(
                "prefix '{}' of namespace '{}' contains '{}'",
                self.prefix, self.name, c
            )));
        }
        if self.default_ttl.is_zero() {
            return Err(CacheError::ConfigError(format!(
                "namespace '{}' has a zero default TTL",
                self.name
            )));
        }
        Ok(())
    }
}

/// Result of parsing a fully-qualified key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub namespace: String,

    /// Everything after `prefix:`, including any version suffix
    pub business_key: String,
}

/// Registry of namespaces, keyed by name
#[derive(Debug, Default)]
pub struct NamespaceRegistry {
    namespaces: RwLock<HashMap<String, CacheNamespace>>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a namespace
    ///
    /// Fails on a duplicate name or prefix, or on an invalid prefix.
    pub fn register(&self, namespace: CacheNamespace) -> Result<()> {
        namespace.validate()?;

        let mut namespaces = self.write();
        if namespaces.contains_key(&namespace.name) {
            return Err(CacheError::ConfigError(format!(
                "namespace '{}' already registered",
                namespace.name
            )));
        }
        if let Some(existing) = namespaces.values().find(|ns| ns.prefix == namespace.prefix) {
            return Err(CacheError::ConfigError(format!(
                "prefix '{}' already used by namespace '{}'",
                namespace.prefix, existing.name
            )));
        }

        debug!(
            "Registered cache namespace {} (prefix {}, ttl {:?})",
            namespace.name, namespace.prefix, namespace.default_ttl
        );
        namespaces.insert(namespace.name.clone(), namespace);
        Ok(())
    }

    /// Look up a namespace by name
    pub fn get(&self, name: &str) -> Result<CacheNamespace> {
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::UnknownNamespace(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered namespace names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Build `prefix:businessKey`
    pub fn build_key(&self, namespace: &str, business_key: &str) -> Result<CacheKey> {
        let ns = self.get(namespace)?;
        check_segment(business_key, "business key")?;
        Ok(format!("{}{}{}", ns.prefix, KEY_SEPARATOR, business_key))
    }

    /// Build `prefix:businessKey:version`
    pub fn build_versioned_key(&self, namespace: &str, business_key: &str, version: &str) -> Result<CacheKey> {
        check_segment(version, "version")?;
        let key = self.build_key(namespace, business_key)?;
        Ok(format!("{}{}{}", key, KEY_SEPARATOR, version))
    }

    /// Build `prefix:seg1:seg2:...`
    pub fn build_hierarchical_key<S: AsRef<str>>(&self, namespace: &str, segments: &[S]) -> Result<CacheKey> {
        let ns = self.get(namespace)?;
        if segments.is_empty() {
            return Err(CacheError::InvalidKey("no key segments".to_string()));
        }

        let mut key = ns.prefix;
        for segment in segments {
            let segment = segment.as_ref();
            check_segment(segment, "key segment")?;
            key.push(KEY_SEPARATOR);
            key.push_str(segment);
        }
        Ok(key)
    }

    /// Split a fully-qualified key back into namespace and business key
    pub fn parse_key(&self, full_key: &str) -> Result<ParsedKey> {
        let (prefix, rest) = full_key
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| CacheError::InvalidKey(format!("'{}' has no prefix", full_key)))?;
        if rest.is_empty() {
            return Err(CacheError::InvalidKey(format!(
                "'{}' has an empty business key",
                full_key
            )));
        }

        // Prefixes cannot contain the separator, so the first segment is the prefix
        self.read()
            .values()
            .find(|ns| ns.prefix == prefix)
            .map(|ns| ParsedKey {
                namespace: ns.name.clone(),
                business_key: rest.to_string(),
            })
            .ok_or_else(|| CacheError::UnknownNamespace(format!("prefix '{}'", prefix)))
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheNamespace>> {
        self.namespaces
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheNamespace>> {
        self.namespaces
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn check_segment(segment: &str, what: &str) -> Result<()> {
    if segment.trim().is_empty() {
        return Err(CacheError::InvalidKey(format!("{} is empty", what)));
    }
    Ok(())
}
