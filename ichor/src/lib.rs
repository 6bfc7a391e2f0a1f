//! # Ichor
//!
//! A randomized program generator for fuzzing script engines and their
//! document object models.
//!
//! Ichor produces a stream of small, syntactically plausible code fragments
//! that manipulate a simulated document tree and exercise language features,
//! runs them through an execution sandbox, and applies sampled consistency
//! oracles to what comes back.
//!
//! ## Pipeline
//!
//! ```text
//! Driver -> Module -> Grammar/Rule -> Node -> render -> Classifier -> Sandbox -> Oracles
//!                          |
//!                        Arena (object references shared across turns)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use ichor::{Driver, FuzzConfig, Grammar, ModuleRegistry};
//!
//! let config = FuzzConfig::builder().seed(42).turns(10).build().unwrap();
//! let modules = ModuleRegistry::standard(&config).unwrap();
//! let mut driver = Driver::new(config, Grammar::standard(), modules).unwrap();
//!
//! let summary = driver.run();
//! assert_eq!(summary.turns, 10);
//! println!("{}", driver.testcase());
//! ```
//!
//! Every random decision flows from the run seed, so the same seed and
//! configuration reproduce the same fragments.
//!
//! ## Module Overview
//!
//! - [`random`] - Seedable random source and selection helpers
//! - [`arena`] - Slot table of object references
//! - [`fragment`] / [`render`] - Code trees and their rendering
//! - [`grammar`] - Weighted productions, budgets and binding scopes
//! - [`context`] - Generation context handed to productions and modules
//! - [`module`] / [`modules`] - Pluggable fuzz modules and the built-in set
//! - [`classify`] - Deny-list classification of fragment text
//! - [`sandbox`] - Execution boundary
//! - [`oracle`] - Nesting, bisection and leak oracles
//! - [`driver`] - Iteration and turn loop
//! - [`config`] - Run configuration

pub mod arena;
pub mod classify;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod fragment;
pub mod grammar;
pub mod module;
pub mod modules;
pub mod oracle;
pub mod random;
pub mod render;
pub mod sandbox;

pub use arena::{Arena, Kind, Reference, Roots, SlotIndex};
pub use classify::{Classification, Classifier};
pub use config::{ConfigError, FuzzConfig};
pub use context::GenContext;
pub use driver::{Driver, RunSummary, StopHandle, StopReason};
pub use error::{GenerationError, IchorError, RegistryError, Result};
pub use fragment::{Fragment, FragmentKind, Node};
pub use grammar::{Grammar, Rule};
pub use module::{FuzzModule, ModuleRegistry, RuleModule};
pub use oracle::{Finding, OracleKind};
pub use random::{RandomSource, SeededRandom};
pub use sandbox::{ExecutionSandbox, Outcome, ReachableProbe, SandboxError};
