//! Execution boundary.
//!
//! The core never runs code itself. It hands fragment text to an
//! [`ExecutionSandbox`] and, for the leak oracle, asks a [`ReachableProbe`]
//! for object counts. Failures of generated code come back as an
//! [`Outcome`] with `threw` set; only failures of the sandbox itself
//! (timeouts, crashes, a missing engine) are errors.
//!
//! [`ScriptedSandbox`] answers from a closure instead of an engine, for
//! tests and generate-only tooling.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// What running a piece of code produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// The code raised an error, at compile or run time.
    pub threw: bool,
    /// Stringified error, when `threw` is set.
    pub error_text: Option<String>,
    /// Stringified completion value, when the sandbox reports one.
    pub value: Option<String>,
}

impl Outcome {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn threw(error: impl Into<String>) -> Self {
        Self {
            threw: true,
            error_text: Some(error.into()),
            value: None,
        }
    }

    /// The observation compared by consistency oracles.
    pub fn observation(&self) -> String {
        match (&self.error_text, &self.value) {
            (Some(err), _) if self.threw => format!("threw: {}", err),
            _ if self.threw => "threw".to_string(),
            (_, Some(value)) => value.clone(),
            (_, None) => "undefined".to_string(),
        }
    }
}

/// Failure of the sandbox itself, as opposed to the code it ran.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("execution exceeded {0:?}")]
    TimedOut(Duration),

    #[error("engine crashed (status {status:?}): {detail}")]
    Crashed { status: Option<i32>, detail: String },

    #[error("sandbox unavailable: {0}")]
    Unavailable(String),

    #[error("sandbox I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Whether the engine under test misbehaved, rather than the harness.
    pub fn is_engine_fault(&self) -> bool {
        matches!(self, SandboxError::TimedOut(_) | SandboxError::Crashed { .. })
    }

    /// Whether the engine died. Hangs are engine faults but not crashes:
    /// generated loops and timers hit the ceiling routinely.
    pub fn is_crash(&self) -> bool {
        matches!(self, SandboxError::Crashed { .. })
    }
}

/// Runs code against the engine under test.
///
/// Implementations must keep the caller's own state intact and must impose
/// their own wall-clock ceiling on every call.
pub trait ExecutionSandbox {
    /// Start a new shared environment that first runs `prelude`.
    fn reset(&mut self, _prelude: &str) -> Result<(), SandboxError> {
        Ok(())
    }

    /// Parse and compile without running.
    fn compile(&mut self, code: &str) -> Result<Outcome, SandboxError>;

    /// Run in the shared environment of the current testcase.
    fn execute(&mut self, code: &str) -> Result<Outcome, SandboxError>;

    /// Run in a fresh isolated environment and report the stringified
    /// completion value.
    fn evaluate_isolated(&mut self, code: &str) -> Result<Outcome, SandboxError>;

    /// Ask the engine to reclaim unreachable memory.
    fn force_reclaim(&mut self) -> Result<(), SandboxError>;
}

/// Counts objects reachable in the engine.
pub trait ReachableProbe {
    /// Begin a measurement. Counts taken afterwards reflect only code
    /// evaluated since.
    fn start(&mut self) -> Result<(), SandboxError> {
        Ok(())
    }

    fn count_reachable(&mut self) -> Result<u64, SandboxError>;
}

// One engine can serve as both the sandbox and the probe of a driver.

impl<T: ExecutionSandbox> ExecutionSandbox for Rc<RefCell<T>> {
    fn reset(&mut self, prelude: &str) -> Result<(), SandboxError> {
        self.borrow_mut().reset(prelude)
    }

    fn compile(&mut self, code: &str) -> Result<Outcome, SandboxError> {
        self.borrow_mut().compile(code)
    }

    fn execute(&mut self, code: &str) -> Result<Outcome, SandboxError> {
        self.borrow_mut().execute(code)
    }

    fn evaluate_isolated(&mut self, code: &str) -> Result<Outcome, SandboxError> {
        self.borrow_mut().evaluate_isolated(code)
    }

    fn force_reclaim(&mut self) -> Result<(), SandboxError> {
        self.borrow_mut().force_reclaim()
    }
}

impl<T: ReachableProbe> ReachableProbe for Rc<RefCell<T>> {
    fn start(&mut self) -> Result<(), SandboxError> {
        self.borrow_mut().start()
    }

    fn count_reachable(&mut self) -> Result<u64, SandboxError> {
        self.borrow_mut().count_reachable()
    }
}

// ============================================================
// Scripted sandbox
// ============================================================

/// Which sandbox entry point was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Reset,
    Compile,
    Execute,
    Isolated,
    Reclaim,
}

type Responder = Box<dyn FnMut(Stage, &str) -> Result<Outcome, SandboxError>>;

/// A sandbox that answers from a closure and records every call.
pub struct ScriptedSandbox {
    responder: Responder,
    calls: Vec<(Stage, String)>,
    counts: VecDeque<u64>,
    last_count: u64,
}

impl Default for ScriptedSandbox {
    fn default() -> Self {
        Self::new(|_, _| Ok(Outcome::ok()))
    }
}

impl ScriptedSandbox {
    pub fn new<F>(responder: F) -> Self
    where
        F: FnMut(Stage, &str) -> Result<Outcome, SandboxError> + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Vec::new(),
            counts: VecDeque::new(),
            last_count: 0,
        }
    }

    /// Reachable counts to report, in order. The last one repeats.
    pub fn with_counts(mut self, counts: impl IntoIterator<Item = u64>) -> Self {
        self.counts = counts.into_iter().collect();
        self
    }

    pub fn calls(&self) -> &[(Stage, String)] {
        &self.calls
    }

    pub fn calls_at(&self, stage: Stage) -> usize {
        self.calls.iter().filter(|(s, _)| *s == stage).count()
    }

    fn respond(&mut self, stage: Stage, code: &str) -> Result<Outcome, SandboxError> {
        self.calls.push((stage, code.to_string()));
        (self.responder)(stage, code)
    }
}

impl ExecutionSandbox for ScriptedSandbox {
    /// Recorded with the prelude as its code; never passed to the
    /// responder.
    fn reset(&mut self, prelude: &str) -> Result<(), SandboxError> {
        self.calls.push((Stage::Reset, prelude.to_string()));
        Ok(())
    }

    fn compile(&mut self, code: &str) -> Result<Outcome, SandboxError> {
        self.respond(Stage::Compile, code)
    }

    fn execute(&mut self, code: &str) -> Result<Outcome, SandboxError> {
        self.respond(Stage::Execute, code)
    }

    fn evaluate_isolated(&mut self, code: &str) -> Result<Outcome, SandboxError> {
        self.respond(Stage::Isolated, code)
    }

    fn force_reclaim(&mut self) -> Result<(), SandboxError> {
        self.respond(Stage::Reclaim, "").map(|_| ())
    }
}

impl ReachableProbe for ScriptedSandbox {
    fn count_reachable(&mut self) -> Result<u64, SandboxError> {
        if let Some(count) = self.counts.pop_front() {
            self.last_count = count;
        }
        Ok(self.last_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_text() {
        assert_eq!(Outcome::ok().observation(), "undefined");
        assert_eq!(Outcome::value("3").observation(), "3");
        assert_eq!(
            Outcome::threw("TypeError: x").observation(),
            "threw: TypeError: x"
        );
    }

    #[test]
    fn test_engine_fault() {
        assert!(SandboxError::TimedOut(Duration::from_secs(1)).is_engine_fault());
        assert!(SandboxError::Crashed {
            status: None,
            detail: String::new()
        }
        .is_engine_fault());
        assert!(!SandboxError::Unavailable("no engine".into()).is_engine_fault());
    }

    #[test]
    fn test_only_crashes_are_crashes() {
        assert!(!SandboxError::TimedOut(Duration::from_secs(1)).is_crash());
        assert!(SandboxError::Crashed {
            status: Some(139),
            detail: String::new()
        }
        .is_crash());
        assert!(!SandboxError::Unavailable("no engine".into()).is_crash());
    }

    #[test]
    fn test_scripted_sandbox_records_calls() {
        let mut sandbox = ScriptedSandbox::new(|stage, code| match stage {
            Stage::Compile if code.contains('(') && !code.contains(')') => {
                Ok(Outcome::threw("SyntaxError"))
            }
            _ => Ok(Outcome::value(code.len().to_string())),
        });
        assert!(sandbox.compile("f(").unwrap().threw);
        assert_eq!(sandbox.execute("abc").unwrap().value.as_deref(), Some("3"));
        sandbox.force_reclaim().unwrap();
        assert_eq!(sandbox.calls().len(), 3);
        assert_eq!(sandbox.calls_at(Stage::Reclaim), 1);
    }

    #[test]
    fn test_reset_is_recorded_without_responder() {
        let mut sandbox = ScriptedSandbox::new(|_, _| Err(SandboxError::Unavailable("down".into())));
        sandbox.reset("var o = [];").unwrap();
        assert_eq!(sandbox.calls(), &[(Stage::Reset, "var o = [];".to_string())]);
        assert!(sandbox.execute("1").is_err());
    }

    #[test]
    fn test_shared_handle_forwards() {
        let shared = Rc::new(RefCell::new(ScriptedSandbox::default().with_counts([4])));
        let mut sandbox: Box<dyn ExecutionSandbox> = Box::new(Rc::clone(&shared));
        let mut probe: Box<dyn ReachableProbe> = Box::new(Rc::clone(&shared));
        sandbox.execute("1").unwrap();
        sandbox.force_reclaim().unwrap();
        assert_eq!(probe.count_reachable().unwrap(), 4);
        assert_eq!(shared.borrow().calls().len(), 2);
    }

    #[test]
    fn test_counts_repeat_last() {
        let mut sandbox = ScriptedSandbox::default().with_counts([10, 12]);
        assert_eq!(sandbox.count_reachable().unwrap(), 10);
        assert_eq!(sandbox.count_reachable().unwrap(), 12);
        assert_eq!(sandbox.count_reachable().unwrap(), 12);
    }
}
