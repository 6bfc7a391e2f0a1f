//! Module registry.
//!
//! A module is an independently written generator with one entry point,
//! [`FuzzModule::make_command`], which returns zero or more fragments for a
//! turn. Modules know nothing about each other; the registry weights them
//! and the driver composes a few of them per iteration.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut registry = ModuleRegistry::new();
//! registry.register(Box::new(RuleModule::new("pair", rule)), 1)?;
//! let active = registry.choose_modules(&mut rng, 3);
//! ```

use tracing::debug;

use crate::config::FuzzConfig;
use crate::context::GenContext;
use crate::error::{GenerationError, RegistryError};
use crate::fragment::{Fragment, FragmentKind, Node};
use crate::grammar::{Grammar, Rule, Scope};
use crate::modules;
use crate::random::{RandomExt, RandomSource};

/// A generator module.
pub trait FuzzModule {
    /// Unique registry name.
    fn name(&self) -> &str;

    /// Weight used when the configuration does not override it.
    fn default_weight(&self) -> u32 {
        1
    }

    /// Check the module against the grammar it will run with.
    fn validate(&self, _grammar: &Grammar) -> Result<(), RegistryError> {
        Ok(())
    }

    /// Produce this turn's fragments. An empty list means "nothing this
    /// turn" and is not an error.
    fn make_command(&self, cx: &mut GenContext<'_>) -> Result<Vec<Fragment>, GenerationError>;
}

struct Entry {
    module: Box<dyn FuzzModule>,
    weight: u32,
}

/// Weighted, ordered list of modules.
#[derive(Default)]
pub struct ModuleRegistry {
    entries: Vec<Entry>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in modules, with weights from `config.modules` where
    /// given. A configured weight of zero leaves the module out.
    pub fn standard(config: &FuzzConfig) -> Result<Self, RegistryError> {
        let builtins = modules::builtin();
        for name in config.modules.keys() {
            if !builtins.iter().any(|m| m.name() == name) {
                return Err(RegistryError::UnknownModule(name.clone()));
            }
        }

        let mut registry = Self::new();
        for module in builtins {
            let weight = config
                .modules
                .get(module.name())
                .copied()
                .unwrap_or_else(|| module.default_weight());
            if weight == 0 {
                debug!(module = module.name(), "module disabled by configuration");
                continue;
            }
            registry.register(module, weight)?;
        }
        Ok(registry)
    }

    /// Add a module. Names must be non-empty and unique, weights positive.
    pub fn register(
        &mut self,
        module: Box<dyn FuzzModule>,
        weight: u32,
    ) -> Result<(), RegistryError> {
        let name = module.name();
        if name.is_empty() {
            return Err(RegistryError::EmptyName { kind: "module" });
        }
        if weight == 0 {
            return Err(RegistryError::ZeroWeight {
                kind: "module",
                name: name.to_string(),
            });
        }
        if self.entries.iter().any(|e| e.module.name() == name) {
            return Err(RegistryError::Duplicate {
                kind: "module",
                name: name.to_string(),
            });
        }
        self.entries.push(Entry { module, weight });
        Ok(())
    }

    /// Fail fast on an unusable registry.
    pub fn validate(&self, grammar: &Grammar) -> Result<(), RegistryError> {
        if self.entries.is_empty() {
            return Err(RegistryError::NoModules);
        }
        self.entries
            .iter()
            .try_for_each(|e| e.module.validate(grammar))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&dyn FuzzModule> {
        self.entries.get(index).map(|e| e.module.as_ref())
    }

    pub fn weight(&self, index: usize) -> Option<u32> {
        self.entries.get(index).map(|e| e.weight)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.module.name()).collect()
    }

    /// Pick between 1 and `max` modules for an iteration, weighted, with
    /// repetition. Returns indices into the registry.
    pub fn choose_modules(&self, rng: &mut dyn RandomSource, max: u32) -> Vec<usize> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        let table: Vec<(u32, usize)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.weight, i))
            .collect();
        let count = rng.range(1, max.max(1));
        (0..count)
            .filter_map(|_| rng.choice(&table).copied())
            .collect()
    }
}

// ============================================================
// Rule-backed modules
// ============================================================

/// A module whose command is one expansion of a [`Rule`].
#[derive(Debug, Clone)]
pub struct RuleModule {
    name: String,
    rule: Rule,
    kind: FragmentKind,
    weight: u32,
}

impl RuleModule {
    pub fn new(name: impl Into<String>, rule: Rule) -> Self {
        Self {
            name: name.into(),
            rule,
            kind: FragmentKind::Script,
            weight: 1,
        }
    }

    pub fn with_kind(mut self, kind: FragmentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

impl FuzzModule for RuleModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_weight(&self) -> u32 {
        self.weight
    }

    fn validate(&self, grammar: &Grammar) -> Result<(), RegistryError> {
        self.rule.validate(grammar)
    }

    fn make_command(&self, cx: &mut GenContext<'_>) -> Result<Vec<Fragment>, GenerationError> {
        let budget = cx.budget();
        let node = self.rule.produce(cx, budget, &Scope::new());
        if matches!(&node, Node::Seq(items) if items.is_empty()) {
            return Ok(Vec::new());
        }
        Ok(vec![Fragment::new(self.kind, node)])
    }
}
