//! Parse-robustness oracle.
//!
//! A fragment is cut at its midpoint and each half compiled on its own.
//! The halves are almost never valid code; syntax errors are expected and
//! ignored. Only a sandbox fault (crash or hang) is interesting.

use crate::sandbox::{ExecutionSandbox, SandboxError};

/// Split at the character boundary nearest the middle.
pub fn halves(text: &str) -> (&str, &str) {
    let mut mid = text.len() / 2;
    while !text.is_char_boundary(mid) {
        mid += 1;
    }
    text.split_at(mid)
}

/// Compile both halves. Returns the first engine fault, if any.
pub fn check(
    sandbox: &mut dyn ExecutionSandbox,
    text: &str,
) -> Result<Option<SandboxError>, SandboxError> {
    let (front, back) = halves(text);
    for half in [front, back] {
        if half.trim().is_empty() {
            continue;
        }
        match sandbox.compile(half) {
            Ok(_) => {}
            Err(err) if err.is_engine_fault() => return Ok(Some(err)),
            Err(err) => return Err(err),
        }
    }
    Ok(None)
}
