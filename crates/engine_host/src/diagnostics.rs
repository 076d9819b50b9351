//! Persistent diagnostics.
//!
//! A diagnostic stays visible under its key until it is explicitly cleared,
//! which for compile errors means until the next successful generation. The
//! map is shared, so compile tasks and the logic thread can both reach it.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

/// Keyed, persistent diagnostic messages.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Arc<DashMap<String, String>>,
}

impl Diagnostics {
    /// Create an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `message` under `key`, replacing any previous message.
    pub fn show(&self, key: impl Into<String>, message: impl Into<String>) {
        let key = key.into();
        let message = message.into();
        warn!(key = %key, message = %message, "diagnostic");
        self.entries.insert(key, message);
    }

    /// Remove the message under `key`. Returns whether one was shown.
    pub fn clear(&self, key: &str) -> bool {
        let cleared = self.entries.remove(key).is_some();
        if cleared {
            info!(key, "diagnostic cleared");
        }
        cleared
    }

    /// The message under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Every shown message, sorted by key.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        all.sort();
        all
    }

    /// Number of shown messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is shown.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_replace_clear() {
        let diagnostics = Diagnostics::new();
        let shared = diagnostics.clone();
        diagnostics.show("compile:world", "syntax error");
        shared.show("compile:world", "type error");
        diagnostics.show("init:world", "missing node");

        assert_eq!(diagnostics.get("compile:world").as_deref(), Some("type error"));
        assert_eq!(shared.len(), 2);
        assert_eq!(diagnostics.snapshot()[1].0, "init:world");

        assert!(shared.clear("compile:world"));
        assert!(!diagnostics.clear("compile:world"));
        assert_eq!(diagnostics.len(), 1);
    }
}
