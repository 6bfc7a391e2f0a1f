//! Isolation/leak oracle.
//!
//! Code runs in a fresh isolated environment which is then discarded. After
//! a few forced reclamation passes the reachable-object count must be back
//! at its baseline, within a tolerance.

use serde::Serialize;

use crate::config::OracleConfig;
use crate::sandbox::{ExecutionSandbox, ReachableProbe, SandboxError};

/// Where the expected object count comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LeakBaseline {
    /// Counted before every check.
    Measured,
    /// A known count for this host and engine version.
    Fixed(u64),
}

impl LeakBaseline {
    pub fn from_config(config: &OracleConfig) -> Self {
        match config.leak_baseline {
            Some(count) => LeakBaseline::Fixed(count),
            None => LeakBaseline::Measured,
        }
    }
}

/// Counts seen by one leak check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeakReport {
    pub baseline: u64,
    pub after: u64,
    pub tolerance: u64,
}

impl LeakReport {
    pub fn leaked(&self) -> bool {
        self.after > self.baseline.saturating_add(self.tolerance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeakCheck {
    pub baseline: LeakBaseline,
    pub tolerance: u64,
    pub reclaim_passes: u32,
}

impl LeakCheck {
    pub fn from_config(config: &OracleConfig) -> Self {
        Self {
            baseline: LeakBaseline::from_config(config),
            tolerance: config.leak_tolerance,
            reclaim_passes: config.reclaim_passes.max(1),
        }
    }

    pub fn run(
        &self,
        sandbox: &mut dyn ExecutionSandbox,
        probe: &mut dyn ReachableProbe,
        code: &str,
    ) -> Result<LeakReport, SandboxError> {
        probe.start()?;
        let baseline = match self.baseline {
            LeakBaseline::Fixed(count) => count,
            LeakBaseline::Measured => {
                sandbox.force_reclaim()?;
                probe.count_reachable()?
            }
        };
        sandbox.evaluate_isolated(code)?;
        for _ in 0..self.reclaim_passes {
            sandbox.force_reclaim()?;
        }
        let after = probe.count_reachable()?;
        Ok(LeakReport {
            baseline,
            after,
            tolerance: self.tolerance,
        })
    }
}
