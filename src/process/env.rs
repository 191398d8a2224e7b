//! Environment overrides applied to a module's commands.

use std::path::Path;

/// Ordered `(key, value)` overrides layered over the inherited environment.
///
/// Setting a key twice keeps the position of the first occurrence and the
/// value of the last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    vars: Vec<(String, String)>,
}

impl EnvVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.vars.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Overrides from `other` applied on top of `self`.
    pub fn merged(&self, other: &EnvVars) -> EnvVars {
        let mut merged = self.clone();
        for (key, value) in other.iter() {
            merged.set(key, value);
        }
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Prepend `dir` to a colon-separated search path.
pub fn prepend_search_path(path: &str, dir: &Path) -> String {
    if path.is_empty() {
        dir.display().to_string()
    } else {
        format!("{}:{}", dir.display(), path)
    }
}
