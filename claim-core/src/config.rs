//! # Configuration
//!
//! A minimal string key/value store. Applications layer values into it from
//! whatever source they like; [`ClaimConfig::load_env`] covers the common
//! case of environment variables.
//!
//! ```rust
//! use claim_core::ClaimConfig;
//! let mut config = ClaimConfig::new();
//!
//! config.set("fields.email_lower", "correoNormalizado");
//! config.set("messages.locale", "en");
//!
//! assert_eq!(config.get("fields.email_lower"), Some("correoNormalizado"));
//! ```
//!
//! ## Environment overrides
//!
//! ```bash
//! export CLAIM__FIELDS__EMAIL_LOWER=correoNormalizado
//! ```
//!
//! `config.load_env("CLAIM__")` then yields `fields.email_lower = correoNormalizado`.

use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct ClaimConfig {
    values: HashMap<String, String>,
}

impl ClaimConfig {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Later writes to the same key win.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Copy every environment variable starting with `prefix` into the store.
    ///
    /// `CLAIM__MESSAGES__LOCALE` with prefix `CLAIM__` becomes `messages.locale`.
    /// Returns how many keys were loaded.
    pub fn load_env(&mut self, prefix: &str) -> usize {
        self.load_pairs(prefix, std::env::vars())
    }

    pub(crate) fn load_pairs<I>(&mut self, prefix: &str, vars: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut loaded = 0;
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                if normalized.is_empty() {
                    continue;
                }
                self.set(normalized, value);
                loaded += 1;
            }
        }
        loaded
    }

    pub fn snapshot(&self) -> ClaimConfigSnapshot {
        ClaimConfigSnapshot::new(self.values.clone())
    }
}

/// Immutable view handed to services at construction time.
#[derive(Debug, Clone, Default)]
pub struct ClaimConfigSnapshot {
    map: HashMap<String, String>,
}

impl ClaimConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.trim().parse::<u32>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.trim().parse::<bool>().ok())
    }

    /// Comma separated list, blank entries dropped.
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(|v| {
            v.split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_pairs_are_normalized_to_dotted_keys() {
        let mut config = ClaimConfig::new();
        let loaded = config.load_pairs(
            "CLAIM__",
            vec![
                ("CLAIM__MESSAGES__LOCALE".to_string(), "en".to_string()),
                ("CLAIM__".to_string(), "ignored".to_string()),
                ("OTHER__KEY".to_string(), "x".to_string()),
            ],
        );

        assert_eq!(loaded, 1);
        assert_eq!(config.get("messages.locale"), Some("en"));
        assert!(!config.has("other.key"));
    }

    #[test]
    fn snapshot_typed_getters() {
        let mut config = ClaimConfig::new();
        config.set("local.hash_cost", "6");
        config.set("names.given", "displayName, nombre,,Nombre");
        config.set("flag", "true");

        let snap = config.snapshot();
        assert_eq!(snap.get_u32("local.hash_cost"), Some(6));
        assert_eq!(snap.get_bool("flag"), Some(true));
        assert_eq!(
            snap.get_list("names.given"),
            Some(vec!["displayName".to_string(), "nombre".to_string(), "Nombre".to_string()])
        );
    }
}
