//! Consistency oracles.
//!
//! Oracles are sampled at low fixed rates to bound cost. Sampling draws from
//! the suite's own random stream, so turning an oracle on or off never
//! changes what the generator produces for a seed.
//!
//! | Oracle | Runs | Finding |
//! |--------|------|---------|
//! | nesting | per pure fragment, 1 in `nesting_rate` | results differ by depth |
//! | bisect | per fragment, 1 in `bisect_rate` | a half crashes or hangs |
//! | leak | per iteration, 1 in `leak_rate` | count above baseline |
//!
//! Crashes are findings everywhere. Hangs are findings only for bisect,
//! where a lone half has no loop or timer to blame; elsewhere they are
//! logged and dropped along with harness failures.

pub mod bisect;
pub mod leak;
pub mod nesting;

pub use leak::{LeakBaseline, LeakCheck, LeakReport};
pub use nesting::NestingVerdict;

use std::fmt;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::classify::Classification;
use crate::config::OracleConfig;
use crate::random::{RandomExt, SeededRandom};
use crate::sandbox::{ExecutionSandbox, ReachableProbe, SandboxError};

/// Which check raised a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    /// The engine crashed or hung while running a fragment.
    Crash,
    Nesting,
    Bisect,
    Leak,
}

impl fmt::Display for OracleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OracleKind::Crash => "crash",
            OracleKind::Nesting => "nesting",
            OracleKind::Bisect => "bisect",
            OracleKind::Leak => "leak",
        })
    }
}

/// A reportable inconsistency, with enough context to reproduce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub oracle: OracleKind,
    pub fragment: String,
    pub observations: Vec<String>,
    pub seed: u64,
    pub turn: u64,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} finding at turn {} (seed {}): {}",
            self.oracle,
            self.turn,
            self.seed,
            self.observations.join(" / ")
        )
    }
}

/// Where a check is happening, for the findings it raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site {
    pub seed: u64,
    pub turn: u64,
}

/// The sampled oracles of one driver.
#[derive(Debug, Clone)]
pub struct OracleSuite {
    rng: SeededRandom,
    config: OracleConfig,
    leak: LeakCheck,
    checks: usize,
}

impl OracleSuite {
    /// `rng` should be a stream derived from the run seed, separate from
    /// the generator's.
    pub fn new(config: &OracleConfig, rng: SeededRandom) -> Self {
        Self {
            rng,
            config: config.clone(),
            leak: LeakCheck::from_config(config),
            checks: 0,
        }
    }

    /// Oracle invocations so far.
    pub fn checks(&self) -> usize {
        self.checks
    }

    fn sample(&mut self, rate: u32) -> bool {
        rate > 0 && self.rng.one_in(rate)
    }

    /// A finding for an engine fault during ordinary execution.
    pub fn crash(&self, site: Site, fragment: &str, err: &SandboxError) -> Finding {
        let finding = Finding {
            oracle: OracleKind::Crash,
            fragment: fragment.to_string(),
            observations: vec![err.to_string()],
            seed: site.seed,
            turn: site.turn,
        };
        error!(turn = site.turn, %err, "engine fault");
        finding
    }

    /// Sampled per-fragment oracles.
    pub fn check_fragment(
        &mut self,
        sandbox: &mut dyn ExecutionSandbox,
        site: Site,
        text: &str,
        classification: &Classification,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        if classification.is_pure() && self.sample(self.config.nesting_rate) {
            findings.extend(self.check_nesting(sandbox, site, text));
        }
        if classification.allow_parse && self.sample(self.config.bisect_rate) {
            findings.extend(self.check_bisect(sandbox, site, text));
        }
        findings
    }

    pub fn check_nesting(
        &mut self,
        sandbox: &mut dyn ExecutionSandbox,
        site: Site,
        text: &str,
    ) -> Option<Finding> {
        self.checks += 1;
        let (shallow, deep) = (self.config.shallow_depth, self.config.deep_depth);
        let observations = match nesting::compare(sandbox, text, shallow, deep) {
            Ok(NestingVerdict::Consistent) => {
                debug!(turn = site.turn, "nesting consistent");
                return None;
            }
            Ok(NestingVerdict::Mismatch { shallow, deep }) => vec![shallow, deep],
            Err(err) if err.is_crash() => vec![err.to_string()],
            Err(err @ SandboxError::TimedOut(_)) => {
                debug!(turn = site.turn, %err, "nesting oracle timed out");
                return None;
            }
            Err(err) => {
                warn!(%err, "nesting oracle skipped");
                return None;
            }
        };
        Some(self.finding(OracleKind::Nesting, site, text, observations))
    }

    pub fn check_bisect(
        &mut self,
        sandbox: &mut dyn ExecutionSandbox,
        site: Site,
        text: &str,
    ) -> Option<Finding> {
        self.checks += 1;
        match bisect::check(sandbox, text) {
            Ok(None) => None,
            Ok(Some(fault)) => Some(self.finding(
                OracleKind::Bisect,
                site,
                text,
                vec![fault.to_string()],
            )),
            Err(err) => {
                warn!(%err, "bisect oracle skipped");
                None
            }
        }
    }

    /// Whether this iteration runs the leak check.
    pub fn sample_leak(&mut self) -> bool {
        self.sample(self.config.leak_rate)
    }

    pub fn check_leak(
        &mut self,
        sandbox: &mut dyn ExecutionSandbox,
        probe: &mut dyn ReachableProbe,
        site: Site,
        code: &str,
    ) -> Option<Finding> {
        self.checks += 1;
        match self.leak.run(sandbox, probe, code) {
            Ok(report) if report.leaked() => Some(self.finding(
                OracleKind::Leak,
                site,
                code,
                vec![
                    format!("baseline {}", report.baseline),
                    format!("after {}", report.after),
                ],
            )),
            Ok(report) => {
                debug!(baseline = report.baseline, after = report.after, "no leak");
                None
            }
            Err(err) if err.is_crash() => Some(self.finding(
                OracleKind::Leak,
                site,
                code,
                vec![err.to_string()],
            )),
            Err(err @ SandboxError::TimedOut(_)) => {
                debug!(turn = site.turn, %err, "leak oracle timed out");
                None
            }
            Err(err) => {
                warn!(%err, "leak oracle skipped");
                None
            }
        }
    }

    fn finding(
        &self,
        oracle: OracleKind,
        site: Site,
        fragment: &str,
        observations: Vec<String>,
    ) -> Finding {
        let finding = Finding {
            oracle,
            fragment: fragment.to_string(),
            observations,
            seed: site.seed,
            turn: site.turn,
        };
        error!(oracle = %oracle, turn = site.turn, "{}", finding);
        finding
    }
}
