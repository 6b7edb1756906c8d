#![forbid(unsafe_code)]

//! Registration policy.
//!
//! [`RegistryConfig`] controls how [`ViewModelRegistry`] treats ambiguous
//! interfaces and which [`Lifetime`] it registers factories with. With the
//! `policy-config` feature the config can be loaded from TOML or JSON:
//!
//! ```toml
//! ambiguity = "error"
//! lifetime = "transient"
//! ```
//!
//! Missing keys fall back to [`RegistryConfig::default`].
//!
//! [`ViewModelRegistry`]: crate::registry::ViewModelRegistry

use std::fmt;

/// What to do with an interface that has more than one implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AmbiguityPolicy {
    /// Leave the interface unregistered, like one with no implementation.
    #[default]
    Skip,
    /// Fail the whole registration call before anything is registered.
    Error,
}

/// How long a resolved service lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Lifetime {
    /// A new instance per resolve.
    #[default]
    Transient,
    /// One instance per container.
    Singleton,
}

/// Configuration for the view-model registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RegistryConfig {
    pub ambiguity: AmbiguityPolicy,
    pub lifetime: Lifetime,
}

impl RegistryConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ambiguity is a hard error.
    #[must_use]
    pub fn strict() -> Self {
        Self::default().with_ambiguity(AmbiguityPolicy::Error)
    }

    #[must_use]
    pub fn with_ambiguity(mut self, ambiguity: AmbiguityPolicy) -> Self {
        self.ambiguity = ambiguity;
        self
    }

    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }
}

#[cfg(feature = "policy-config")]
impl RegistryConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| ConfigError::Toml(e.to_string()))
    }

    /// Parse a JSON document.
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(source).map_err(|e| ConfigError::Json(e.to_string()))
    }
}

/// Errors from loading a [`RegistryConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Toml(String),
    Json(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toml(msg) => write!(f, "invalid TOML registry config: {msg}"),
            Self::Json(msg) => write!(f, "invalid JSON registry config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
