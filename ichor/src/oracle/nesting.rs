//! Nesting-consistency oracle.
//!
//! The same fragment is evaluated under two function-nesting depths in an
//! isolated environment. A fragment the classifier considers pure must
//! produce the same stringified result at both depths, unless one of them
//! ran out of stack: the deeper wrapper legitimately overflows first.

use crate::render::quote;
use crate::sandbox::{ExecutionSandbox, Outcome, SandboxError};

/// `code` evaluated inside `depth` nested function calls.
///
/// The code is quoted once and passed to `eval` at the innermost level, so
/// the wrapper grows linearly with depth.
pub fn wrap(code: &str, depth: u32) -> String {
    let mut expr = format!("eval({})", quote(code));
    for _ in 0..depth {
        expr = format!("(function() {{ return {}; }})()", expr);
    }
    format!("{};", expr)
}

/// Outcome of comparing two depths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NestingVerdict {
    Consistent,
    Mismatch { shallow: String, deep: String },
}

pub fn compare(
    sandbox: &mut dyn ExecutionSandbox,
    code: &str,
    shallow_depth: u32,
    deep_depth: u32,
) -> Result<NestingVerdict, SandboxError> {
    let shallow = sandbox.evaluate_isolated(&wrap(code, shallow_depth))?;
    let deep = sandbox.evaluate_isolated(&wrap(code, deep_depth))?;
    Ok(verdict(&shallow, &deep))
}

/// Engine messages for stack exhaustion, lowercased.
const STACK_EXHAUSTION: &[&str] = &[
    "too much recursion",
    "maximum call stack",
    "stack overflow",
    "out of stack space",
];

fn exhausted_stack(observation: &str) -> bool {
    let lower = observation.to_lowercase();
    STACK_EXHAUSTION.iter().any(|m| lower.contains(m))
}

fn verdict(shallow: &Outcome, deep: &Outcome) -> NestingVerdict {
    let (shallow, deep) = (shallow.observation(), deep.observation());
    if shallow == deep || exhausted_stack(&shallow) || exhausted_stack(&deep) {
        NestingVerdict::Consistent
    } else {
        NestingVerdict::Mismatch { shallow, deep }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{ScriptedSandbox, Stage};

    #[test]
    fn test_wrap_depths() {
        assert_eq!(wrap("1 + 1", 0), r#"eval("1 + 1");"#);
        assert_eq!(
            wrap("x", 2),
            r#"(function() { return (function() { return eval("x"); })(); })();"#
        );
    }

    #[test]
    fn test_wrap_quotes_once() {
        let code = r#"a = "\"";"#;
        let deep = wrap(code, 30);
        assert_eq!(deep.matches(r#"\\\""#).count(), 1);
        assert_eq!(deep.matches("function()").count(), 30);
    }

    #[test]
    fn test_compare_detects_mismatch() {
        let mut sandbox = ScriptedSandbox::new(|_, code| {
            Ok(Outcome::value(code.matches("function").count().min(3).to_string()))
        });
        let verdict = compare(&mut sandbox, "1", 2, 30).unwrap();
        assert_eq!(
            verdict,
            NestingVerdict::Mismatch {
                shallow: "2".into(),
                deep: "3".into()
            }
        );
        assert_eq!(sandbox.calls_at(Stage::Isolated), 2);
    }

    #[test]
    fn test_compare_consistent() {
        let mut sandbox = ScriptedSandbox::new(|_, _| Ok(Outcome::value("7")));
        assert_eq!(
            compare(&mut sandbox, "3 + 4", 2, 30).unwrap(),
            NestingVerdict::Consistent
        );
    }

    #[test]
    fn test_stack_exhaustion_is_not_a_mismatch() {
        let mut sandbox = ScriptedSandbox::new(|_, code| {
            if code.matches("function").count() > 10 {
                Ok(Outcome::threw("InternalError: too much recursion"))
            } else {
                Ok(Outcome::value("6"))
            }
        });
        assert_eq!(
            compare(&mut sandbox, "f(3)", 2, 30).unwrap(),
            NestingVerdict::Consistent
        );

        let overflow = Outcome::threw("RangeError: Maximum call stack size exceeded");
        assert_eq!(
            verdict(&overflow, &Outcome::value("1")),
            NestingVerdict::Consistent
        );
    }

    #[test]
    fn test_other_errors_still_mismatch() {
        let result = verdict(&Outcome::value("1"), &Outcome::threw("TypeError: x is undefined"));
        assert!(matches!(result, NestingVerdict::Mismatch { .. }));
    }
}
