//! The fuzzing driver.
//!
//! A [`Driver`] owns everything one run needs: its random stream, arena,
//! grammar, module registry, classifier, oracles and (optionally) a sandbox.
//! Nothing is process-global, so independent drivers can coexist.
//!
//! A run is a sequence of iterations. Each iteration picks a few active
//! modules and plays a fixed number of turns; each turn invokes one active
//! module and pushes its fragments through classification and execution:
//!
//! ```text
//! classify ─► compile (allow_parse) ─► execute (allow_execute) ─► observe
//!                                                                  │
//!                                           sampled oracles ◄──────┘
//! ```
//!
//! The sandbox's shared environment lives for one iteration: it is reset to
//! the prelude before the first turn, so the cost of an execution grows
//! with the iteration's turns rather than the whole run. Slots filled in an
//! earlier iteration read as `undefined` there.
//!
//! Module errors and panics become empty turns. Stopping is cooperative and
//! only happens between turns.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = FuzzConfig::builder().seed(42).turns(20).build()?;
//! let modules = ModuleRegistry::standard(&config)?;
//! let mut driver = Driver::new(config, Grammar::standard(), modules)?;
//! let summary = driver.run();
//! println!("{}", driver.testcase());
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::arena::{Arena, Reference, Roots, SlotSnapshot};
use crate::classify::{Classification, Classifier};
use crate::config::FuzzConfig;
use crate::context::{GenContext, GenStats};
use crate::error::{GenerationError, IchorError};
use crate::fragment::{Fragment, Node};
use crate::grammar::Grammar;
use crate::module::ModuleRegistry;
use crate::oracle::{Finding, OracleSuite, Site};
use crate::random::{seed_from_clock, RandomExt, RandomSource, SeededRandom};
use crate::render::render;
use crate::sandbox::{ExecutionSandbox, ReachableProbe, SandboxError};

/// Stream id of the oracle layer's random source.
const ORACLE_STREAM: u64 = 1;

// ============================================================
// Stop handle
// ============================================================

/// Requests a cooperative stop from another thread or a signal handler.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

// ============================================================
// Run records
// ============================================================

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    #[default]
    Completed,
    TimeLimit,
    Requested,
    Finding,
}

/// What happened to a fragment after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Generated only; no sandbox or execution disabled.
    Generated,
    /// The classifier ruled out parsing.
    NotParsed,
    /// The engine rejected it at compile time.
    CompileError,
    /// Compiled; execution was not admissible.
    Compiled,
    /// Ran and raised an error.
    Threw,
    /// Ran to completion.
    Executed,
    /// Ran, and its result is expected to be consistent.
    Observed,
    /// Hit the execution ceiling. Not a finding.
    TimedOut,
    /// The sandbox failed while handling it.
    Fault,
}

/// One logged fragment.
#[derive(Debug, Clone)]
pub struct Entry {
    pub iteration: u64,
    pub turn: u64,
    pub module: String,
    pub fragment: Fragment,
    pub text: String,
    pub classification: Classification,
    pub disposition: Disposition,
}

/// Counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub seed: u64,
    pub iterations: u64,
    pub turns: u64,
    pub empty_turns: u64,
    pub fragments: u64,
    pub module_failures: u64,
    pub productions: u64,
    pub chaos_picks: u64,
    pub subgenerations: u64,
    pub not_parsed: u64,
    pub compile_errors: u64,
    pub compiled: u64,
    pub executed: u64,
    pub threw: u64,
    pub observed: u64,
    pub timeouts: u64,
    pub sandbox_errors: u64,
    pub oracle_checks: u64,
    pub findings: Vec<Finding>,
    pub elapsed_ms: u64,
    pub stop_reason: StopReason,
}

// ============================================================
// Driver
// ============================================================

pub struct Driver {
    config: FuzzConfig,
    seed: u64,
    rng: Box<dyn RandomSource>,
    grammar: Grammar,
    modules: ModuleRegistry,
    arena: Arena<Reference>,
    roots: Roots,
    classifier: Classifier,
    oracles: OracleSuite,
    sandbox: Option<Box<dyn ExecutionSandbox>>,
    probe: Option<Box<dyn ReachableProbe>>,
    active: Vec<usize>,
    entries: Vec<Entry>,
    iteration: u64,
    turn: u64,
    summary: RunSummary,
    stop: StopHandle,
    started: Option<Instant>,
}

impl Driver {
    /// Validate everything and seed a run. Invalid configuration or
    /// registries fail here, before any generation.
    pub fn new(
        config: FuzzConfig,
        grammar: Grammar,
        modules: ModuleRegistry,
    ) -> Result<Self, IchorError> {
        let seed = config.seed.unwrap_or_else(seed_from_clock);
        let rng = SeededRandom::from_seed(seed);
        Self::build(config, seed, Box::new(rng), grammar, modules)
    }

    /// Like [`Driver::new`] with a caller-supplied generator stream. The
    /// oracle stream is still derived from the configured seed (0 when
    /// unset).
    pub fn with_random(
        config: FuzzConfig,
        grammar: Grammar,
        modules: ModuleRegistry,
        rng: Box<dyn RandomSource>,
    ) -> Result<Self, IchorError> {
        let seed = config.seed.unwrap_or(0);
        Self::build(config, seed, rng, grammar, modules)
    }

    fn build(
        config: FuzzConfig,
        seed: u64,
        rng: Box<dyn RandomSource>,
        grammar: Grammar,
        modules: ModuleRegistry,
    ) -> Result<Self, IchorError> {
        config.validate()?;
        grammar.validate()?;
        modules.validate(&grammar)?;

        let roots = Roots::new();
        let mut arena = Arena::new();
        for root in roots.all() {
            arena.push(root.clone());
        }
        let oracles = OracleSuite::new(
            &config.oracle,
            SeededRandom::from_seed(seed).derive(ORACLE_STREAM),
        );
        info!(seed, modules = ?modules.names(), "driver ready");

        Ok(Self {
            config,
            seed,
            rng,
            grammar,
            modules,
            arena,
            roots,
            classifier: Classifier::standard(),
            oracles,
            sandbox: None,
            probe: None,
            active: Vec::new(),
            entries: Vec::new(),
            iteration: 0,
            turn: 0,
            summary: RunSummary {
                seed,
                ..RunSummary::default()
            },
            stop: StopHandle::new(),
            started: None,
        })
    }

    pub fn with_sandbox(mut self, sandbox: Box<dyn ExecutionSandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn with_probe(mut self, probe: Box<dyn ReachableProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &FuzzConfig {
        &self.config
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn arena(&self) -> &Arena<Reference> {
        &self.arena
    }

    pub fn arena_snapshot(&self) -> Vec<SlotSnapshot> {
        self.arena.snapshot()
    }

    /// Indices of this iteration's active modules.
    pub fn active_modules(&self) -> &[usize] {
        &self.active
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// The fragment log, in emission order.
    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.entries.iter().map(|e| &e.fragment)
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn findings(&self) -> &[Finding] {
        &self.summary.findings
    }

    // ============================================================
    // Loop
    // ============================================================

    /// Run iterations until a stop condition holds.
    pub fn run(&mut self) -> RunSummary {
        let started = *self.started.get_or_insert_with(Instant::now);
        let iterations = self.config.driver.iterations;
        info!(seed = self.seed, iterations, "run started");

        let reason = loop {
            if let Some(reason) = self.stop_reason() {
                break reason;
            }
            if iterations != 0 && self.iteration >= iterations {
                break StopReason::Completed;
            }
            self.run_iteration();
        };

        self.summary.stop_reason = reason;
        self.summary.elapsed_ms = started.elapsed().as_millis() as u64;
        self.summary.oracle_checks = self.oracles.checks() as u64;
        info!(
            ?reason,
            turns = self.summary.turns,
            fragments = self.summary.fragments,
            findings = self.summary.findings.len(),
            "run finished"
        );
        self.summary.clone()
    }

    /// Choose active modules and play one iteration's turns.
    pub fn run_iteration(&mut self) {
        self.started.get_or_insert_with(Instant::now);
        self.reset_environment();
        self.iteration += 1;
        self.summary.iterations += 1;

        let max = self.config.driver.max_active_modules;
        self.active = self.modules.choose_modules(&mut *self.rng, max);
        let names: Vec<&str> = self
            .active
            .iter()
            .filter_map(|&i| self.modules.get(i).map(|m| m.name()))
            .collect();
        info!(iteration = self.iteration, modules = ?names, "iteration started");

        let first = self.entries.len();
        for _ in 0..self.config.driver.turns_per_iteration {
            if self.stop_reason().is_some() {
                break;
            }
            self.turn();
        }
        self.maybe_check_leak(first);
    }

    /// Play one turn: invoke an active module, retrying empty results a few
    /// times, and process whatever it produced. Returns the fragments added.
    pub fn turn(&mut self) -> usize {
        if self.active.is_empty() {
            let max = self.config.driver.max_active_modules;
            self.active = self.modules.choose_modules(&mut *self.rng, max);
        }
        self.turn += 1;
        self.summary.turns += 1;

        let mut produced = None;
        for attempt in 0..=self.config.driver.empty_turn_retries {
            let Some(&index) = self.rng.element(&self.active) else {
                break;
            };
            match self.invoke(index) {
                Ok(fragments) if fragments.is_empty() => {
                    trace!(turn = self.turn, attempt, "module produced nothing");
                }
                Ok(fragments) => {
                    produced = Some((index, fragments));
                    break;
                }
                Err(err) => {
                    warn!(turn = self.turn, %err, "module failed");
                    self.summary.module_failures += 1;
                    break;
                }
            }
        }

        let Some((index, fragments)) = produced else {
            self.summary.empty_turns += 1;
            return 0;
        };
        let module = self
            .modules
            .get(index)
            .map(|m| m.name().to_string())
            .unwrap_or_default();
        let count = fragments.len();
        for fragment in fragments {
            self.process(&module, fragment);
        }
        count
    }

    /// Call one module's entry point, converting panics into errors.
    fn invoke(&mut self, index: usize) -> Result<Vec<Fragment>, GenerationError> {
        let Some(module) = self.modules.get(index) else {
            return Ok(Vec::new());
        };
        let mut cx = GenContext::new(
            &mut *self.rng,
            &mut self.arena,
            &self.roots,
            &self.grammar,
            &self.config.generation,
        )
        .with_modules(&self.modules, &self.active);

        let result = panic::catch_unwind(AssertUnwindSafe(|| module.make_command(&mut cx)));
        let stats = cx.stats();
        record_stats(&mut self.summary, stats);

        match result {
            Ok(result) => result,
            Err(payload) => {
                let message = if let Some(s) = payload.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                Err(GenerationError::Panicked {
                    module: module.name().to_string(),
                    message,
                })
            }
        }
    }

    /// Classify, and when a sandbox is attached, compile, execute and
    /// sample oracles.
    fn process(&mut self, module: &str, fragment: Fragment) {
        let text = fragment.text();
        let classification = self.classifier.classify(&text);
        let site = Site {
            seed: self.seed,
            turn: self.turn,
        };
        self.summary.fragments += 1;
        debug!(turn = self.turn, module, kind = %fragment.kind, "fragment");
        trace!(turn = self.turn, "{}", text);

        let disposition = match self.sandbox.as_deref_mut() {
            Some(sandbox) if self.config.driver.execute => {
                let disposition =
                    execute(sandbox, &mut self.summary, &self.oracles, site, &text, &classification);
                let checked = !matches!(
                    disposition,
                    Disposition::Fault | Disposition::TimedOut | Disposition::NotParsed
                );
                if checked {
                    let findings =
                        self.oracles
                            .check_fragment(sandbox, site, &text, &classification);
                    self.summary.findings.extend(findings);
                }
                disposition
            }
            _ => Disposition::Generated,
        };

        self.entries.push(Entry {
            iteration: self.iteration,
            turn: self.turn,
            module: module.to_string(),
            fragment,
            text,
            classification,
            disposition,
        });
    }

    /// Leak-check one fragment executed during this iteration.
    fn maybe_check_leak(&mut self, first: usize) {
        let (Some(sandbox), Some(probe)) = (self.sandbox.as_deref_mut(), self.probe.as_deref_mut())
        else {
            return;
        };
        if !self.config.driver.execute || !self.oracles.sample_leak() {
            return;
        }
        let candidate = self.entries[first..]
            .iter()
            .rev()
            .find(|e| matches!(e.disposition, Disposition::Executed | Disposition::Observed));
        let Some(entry) = candidate else {
            return;
        };
        let site = Site {
            seed: self.seed,
            turn: entry.turn,
        };
        let finding = self.oracles.check_leak(sandbox, probe, site, &entry.text);
        self.summary.findings.extend(finding);
    }

    /// Start the iteration's shared environment from the prelude.
    fn reset_environment(&mut self) {
        if !self.config.driver.execute {
            return;
        }
        let prelude = self.prelude();
        if let Some(sandbox) = self.sandbox.as_deref_mut() {
            if let Err(err) = sandbox.reset(&prelude) {
                warn!(%err, "sandbox reset failed");
                self.summary.sandbox_errors += 1;
            }
        }
    }

    fn stop_reason(&self) -> Option<StopReason> {
        if self.stop.is_stopped() {
            return Some(StopReason::Requested);
        }
        if let (Some(limit), Some(started)) = (self.config.driver.time_limit(), self.started) {
            if started.elapsed() >= limit {
                return Some(StopReason::TimeLimit);
            }
        }
        if self.config.driver.stop_on_finding && !self.summary.findings.is_empty() {
            return Some(StopReason::Finding);
        }
        None
    }

    // ============================================================
    // Testcase
    // ============================================================

    /// Declares the arena array and stores the roots in their slots.
    pub fn prelude(&self) -> String {
        let mut out = String::from("var o = [];\n");
        for (index, root) in self.roots.all().into_iter().enumerate() {
            if let Some(slot) = self.arena.find_index(root) {
                let store = Node::assign(Node::Slot(slot), Node::text(root.origin()));
                out.push_str(&render(&store));
                out.push('\n');
            } else {
                trace!(index, "root not in arena");
            }
        }
        out
    }

    /// The whole run as one program. Fragments that may not execute are
    /// kept as line comments.
    pub fn testcase(&self) -> String {
        let mut out = self.prelude();
        for entry in &self.entries {
            out.push('\n');
            if entry.classification.allow_execute {
                out.push_str(&guard(&entry.text));
            } else {
                for line in entry.text.lines() {
                    out.push_str("// ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        out
    }
}

/// `try { text } catch (e) { }`, so one failing fragment does not stop the
/// rest of a testcase.
pub fn guard(text: &str) -> String {
    let mut out = String::from("try {\n");
    for line in text.lines() {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("} catch (e) { }\n");
    out
}

fn record_stats(summary: &mut RunSummary, stats: GenStats) {
    summary.productions += stats.calls as u64;
    summary.chaos_picks += stats.chaos as u64;
    summary.subgenerations += stats.subgenerations as u64;
}

/// Walk the parse, compile, execute, observe stages for one fragment.
fn execute(
    sandbox: &mut dyn ExecutionSandbox,
    summary: &mut RunSummary,
    oracles: &OracleSuite,
    site: Site,
    text: &str,
    classification: &Classification,
) -> Disposition {
    if !classification.allow_parse {
        summary.not_parsed += 1;
        return Disposition::NotParsed;
    }

    match sandbox.compile(text) {
        Ok(outcome) if outcome.threw => {
            summary.compile_errors += 1;
            debug!(turn = site.turn, error = ?outcome.error_text, "compile error");
            return Disposition::CompileError;
        }
        Ok(_) => summary.compiled += 1,
        Err(err) => return fault(summary, oracles, site, text, err),
    }

    if !classification.allow_execute {
        return Disposition::Compiled;
    }

    match sandbox.execute(text) {
        Ok(outcome) => {
            summary.executed += 1;
            if outcome.threw {
                summary.threw += 1;
                debug!(turn = site.turn, error = ?outcome.error_text, "fragment threw");
                Disposition::Threw
            } else if classification.expect_consistent_output {
                summary.observed += 1;
                trace!(turn = site.turn, value = ?outcome.value, "observed");
                Disposition::Observed
            } else {
                Disposition::Executed
            }
        }
        Err(err) => fault(summary, oracles, site, text, err),
    }
}

/// Crashes are findings; timeouts and harness failures are only counted.
fn fault(
    summary: &mut RunSummary,
    oracles: &OracleSuite,
    site: Site,
    text: &str,
    err: SandboxError,
) -> Disposition {
    match err {
        SandboxError::Crashed { .. } => {
            summary.findings.push(oracles.crash(site, text, &err));
            Disposition::Fault
        }
        SandboxError::TimedOut(limit) => {
            debug!(turn = site.turn, ?limit, "fragment timed out");
            summary.timeouts += 1;
            Disposition::TimedOut
        }
        err => {
            warn!(turn = site.turn, %err, "sandbox error");
            summary.sandbox_errors += 1;
            Disposition::Fault
        }
    }
}
