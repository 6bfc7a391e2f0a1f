//! Error types.
//!
//! Only [`RegistryError`] and [`ConfigError`] are fatal, and only before a
//! run starts. Everything raised while a run is in progress is caught by the
//! driver and turned into an empty turn or a recorded outcome.

use thiserror::Error;

use crate::arena::ArenaError;
use crate::config::ConfigError;
use crate::sandbox::SandboxError;

/// Harness misconfiguration, detected at registration or driver startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{kind} registered with an empty name")]
    EmptyName { kind: &'static str },

    #[error("{kind} '{name}' is already registered")]
    Duplicate { kind: &'static str, name: String },

    #[error("{kind} '{name}' has zero weight")]
    ZeroWeight { kind: &'static str, name: String },

    #[error("rule refers to unknown production '{0}'")]
    UnknownProduction(String),

    #[error("grammar has no {0} productions")]
    MissingKind(&'static str),

    #[error("no modules are enabled")]
    NoModules,

    #[error("configured weight for unknown module '{0}'")]
    UnknownModule(String),
}

/// A module or production failed to build a fragment.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("module '{module}' failed: {message}")]
    Module { module: String, message: String },

    #[error("module '{module}' panicked: {message}")]
    Panicked { module: String, message: String },

    #[error(transparent)]
    Arena(#[from] ArenaError),
}

impl GenerationError {
    pub fn module(module: impl Into<String>, message: impl Into<String>) -> Self {
        GenerationError::Module {
            module: module.into(),
            message: message.into(),
        }
    }
}

/// Any error the library reports.
#[derive(Debug, Error)]
pub enum IchorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

pub type Result<T, E = IchorError> = std::result::Result<T, E>;
