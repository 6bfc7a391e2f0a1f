//! The standard denylist.
//!
//! Each rule names a fragment shape that is known to hang, leak host state,
//! or behave differently between two evaluations, and the classification
//! flags that shape clears.

use std::sync::LazyLock;

use regex::Regex;

use super::ClassFlags;
use crate::grammar::INFINITE_LOOP_MARKER;

/// How a rule recognizes a fragment.
#[derive(Debug, Clone, Copy)]
pub enum Predicate {
    /// Case-sensitive substring.
    Contains(&'static str),
    /// ASCII case-insensitive substring.
    ContainsIgnoreCase(&'static str),
    /// A regular expression compiled on first use. A pattern that fails to
    /// compile matches nothing.
    Regex(&'static LazyLock<Option<Regex>>),
    /// Arbitrary check.
    Custom(fn(&str) -> bool),
}

impl Predicate {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Predicate::Contains(needle) => text.contains(needle),
            Predicate::ContainsIgnoreCase(needle) => contains_ignore_case(text, needle),
            Predicate::Regex(lazy) => {
                let compiled: &Option<Regex> = lazy;
                compiled.as_ref().is_some_and(|re| re.is_match(text))
            }
            Predicate::Custom(check) => check(text),
        }
    }
}

/// One denylist entry.
#[derive(Debug, Clone, Copy)]
pub struct DenyRule {
    pub name: &'static str,
    pub predicate: Predicate,
    pub reason: &'static str,
    pub clears: ClassFlags,
}

fn contains_ignore_case(text: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let needle = needle.as_bytes();
    text.as_bytes()
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}

static QUIT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\bquit\s*\(").ok());

static GC_TUNING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(gczeal|schedulegc|verifyprebarriers)\b").ok());

static TIMERS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b(setTimeout|setInterval|requestAnimationFrame|requestIdleCallback)\b").ok()
});

static CLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\bDate\b|\bperformance\.now\b|\bMath\.random\b").ok());

static HOST_STATE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\bo\[\d+\]|\bdocument\b|\bwindow\b").ok());

static GC_OBSERVABLE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(WeakRef|FinalizationRegistry|WeakMap|WeakSet)\b").ok());

static CALLER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\barguments\.callee\b|\.caller\b").ok());

fn has_nul(text: &str) -> bool {
    text.contains('\0')
}

/// Whether brackets outside string literals fail to balance. Regular
/// expression literals are not recognized, so this errs toward rejecting.
fn unbalanced(text: &str) -> bool {
    let mut stack = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in text.chars() {
        if let Some(q) = quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                _ if c == q => quote = None,
                _ => {}
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' => stack.push(')'),
            '[' => stack.push(']'),
            '{' => stack.push('}'),
            ')' | ']' | '}' => {
                if stack.pop() != Some(c) {
                    return true;
                }
            }
            _ => {}
        }
    }
    quote.is_some() || !stack.is_empty()
}

const ALL_CONSISTENCY: ClassFlags = ClassFlags::CONSISTENT_OUTPUT
    .union(ClassFlags::CONSISTENT_REPEATS)
    .union(ClassFlags::CONSISTENT_CONFIGS);

/// The built-in denylist.
pub static STANDARD_RULES: &[DenyRule] = &[
    DenyRule {
        name: "nul-byte",
        predicate: Predicate::Custom(has_nul),
        reason: "engines disagree on raw NUL in source text",
        clears: ClassFlags::PARSE,
    },
    DenyRule {
        name: "unbalanced",
        predicate: Predicate::Custom(unbalanced),
        reason: "brackets do not balance, so the fragment cannot parse",
        clears: ClassFlags::PARSE,
    },
    DenyRule {
        name: "infinite-loop",
        predicate: Predicate::Contains(INFINITE_LOOP_MARKER),
        reason: "loop exit depends on generated code and may never happen",
        clears: ClassFlags::EXECUTE,
    },
    DenyRule {
        name: "quit",
        predicate: Predicate::Regex(&QUIT),
        reason: "ends the engine process",
        clears: ClassFlags::EXECUTE,
    },
    DenyRule {
        name: "oom",
        predicate: Predicate::Contains("oomAfterAllocations"),
        reason: "simulated out-of-memory aborts the run",
        clears: ClassFlags::EXECUTE,
    },
    DenyRule {
        name: "heap-dump",
        predicate: Predicate::Contains("dumpHeap"),
        reason: "output contains addresses",
        clears: ALL_CONSISTENCY,
    },
    DenyRule {
        name: "gc-tuning",
        predicate: Predicate::Regex(&GC_TUNING),
        reason: "collector settings persist past the fragment",
        clears: ClassFlags::CONSISTENT_CONFIGS,
    },
    DenyRule {
        name: "jit-options",
        predicate: Predicate::Contains("setJitCompilerOption"),
        reason: "compiler settings persist past the fragment",
        clears: ClassFlags::CONSISTENT_CONFIGS,
    },
    DenyRule {
        name: "timers",
        predicate: Predicate::Regex(&TIMERS),
        reason: "callbacks run after the evaluation returns",
        clears: ClassFlags::CONSISTENT_OUTPUT.union(ClassFlags::CONSISTENT_REPEATS),
    },
    DenyRule {
        name: "promises",
        predicate: Predicate::Contains("Promise"),
        reason: "reactions run after the evaluation returns",
        clears: ClassFlags::CONSISTENT_OUTPUT,
    },
    DenyRule {
        name: "clock",
        predicate: Predicate::Regex(&CLOCK),
        reason: "depends on time or entropy",
        clears: ALL_CONSISTENCY,
    },
    DenyRule {
        name: "host-state",
        predicate: Predicate::Regex(&HOST_STATE),
        reason: "refers to state that does not exist in an isolated environment",
        clears: ClassFlags::CONSISTENT_OUTPUT,
    },
    DenyRule {
        name: "gc-observable",
        predicate: Predicate::Regex(&GC_OBSERVABLE),
        reason: "results depend on collection timing",
        clears: ClassFlags::CONSISTENT_REPEATS.union(ClassFlags::CONSISTENT_CONFIGS),
    },
    DenyRule {
        name: "stack",
        predicate: Predicate::ContainsIgnoreCase("stack"),
        reason: "stack text and overflow points change with nesting depth",
        clears: ClassFlags::CONSISTENT_OUTPUT,
    },
    DenyRule {
        name: "caller",
        predicate: Predicate::Regex(&CALLER),
        reason: "exposes the wrapper functions around the fragment",
        clears: ClassFlags::CONSISTENT_OUTPUT,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        for rule in STANDARD_RULES {
            if let Predicate::Regex(re) = rule.predicate {
                assert!(re.is_some(), "{} does not compile", rule.name);
            }
        }
    }

    #[test]
    fn test_rule_names_are_unique() {
        let mut names: Vec<_> = STANDARD_RULES.iter().map(|r| r.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), STANDARD_RULES.len());
        assert!(STANDARD_RULES.iter().all(|r| !r.clears.is_empty()));
    }

    #[test]
    fn test_contains_ignore_case() {
        assert!(contains_ignore_case("RangeError: Maximum call STACK", "stack"));
        assert!(!contains_ignore_case("sta ck", "stack"));
        assert!(contains_ignore_case("", ""));
    }

    #[test]
    fn test_unbalanced() {
        assert!(!unbalanced("f(a[0], { b: 1 });"));
        assert!(!unbalanced(r#"g(")", '(', "\")");"#));
        assert!(unbalanced("f(a[0);"));
        assert!(unbalanced("{"));
        assert!(unbalanced("x = \"open"));
    }

    #[test]
    fn test_quit_is_word_bounded() {
        let rule = STANDARD_RULES.iter().find(|r| r.name == "quit").unwrap();
        assert!(rule.predicate.matches("quit();"));
        assert!(rule.predicate.matches("if (x) quit (1);"));
        assert!(!rule.predicate.matches("doNotquit();"));
        assert!(!rule.predicate.matches("var quitting = 1;"));
    }
}
