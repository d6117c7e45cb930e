// src/request/environment.rs

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};

/// The environment a child is started with.
///
/// By default the parent's environment is inherited as it is at spawn time.
/// Individual variables can be set or removed on top of it, or the inherited
/// set can be dropped entirely with [`Environment::clear`] to replace it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    clear: bool,
    /// `Some(value)` sets, `None` removes.
    vars: BTreeMap<OsString, Option<OsString>>,
}

impl Environment {
    /// Inherit the parent's environment unchanged.
    pub fn inherit() -> Self {
        Self::default()
    }

    /// Start from an empty environment containing only `vars`.
    pub fn replace<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let mut env = Self {
            clear: true,
            vars: BTreeMap::new(),
        };
        for (k, v) in vars {
            env.set(k, v);
        }
        env
    }

    pub fn set(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) {
        self.vars.insert(key.into(), Some(value.into()));
    }

    pub fn remove(&mut self, key: impl Into<OsString>) {
        self.vars.insert(key.into(), None);
    }

    /// Drop everything inherited and previously set.
    pub fn clear(&mut self) {
        self.clear = true;
        self.vars.clear();
    }

    pub fn is_inherited(&self) -> bool {
        !self.clear
    }

    /// Look up a variable as the child will see it.
    pub fn get(&self, key: &OsStr) -> Option<OsString> {
        match self.vars.get(key) {
            Some(value) => value.clone(),
            None if self.clear => None,
            None => std::env::var_os(key),
        }
    }

    /// Produce the concrete `(key, value)` list for the child, snapshotting the
    /// parent's environment if it is inherited.
    pub fn resolve(&self) -> Vec<(OsString, OsString)> {
        let mut merged: BTreeMap<OsString, OsString> = if self.clear {
            BTreeMap::new()
        } else {
            std::env::vars_os().collect()
        };

        for (key, value) in &self.vars {
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        merged.into_iter().collect()
    }
}
