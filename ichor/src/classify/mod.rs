//! Static classification of fragment text.
//!
//! A [`Classifier`] decides, from text alone, whether a fragment may be
//! parsed, executed, and fed to the consistency oracles. It is a conjunction
//! of independent denylist rules: every matching [`DenyRule`] clears its
//! flags, and nothing ever sets a flag back. Flags then follow their
//! dependencies:
//!
//! ```text
//! PARSE ──► EXECUTE ──► CONSISTENT_OUTPUT
//!                   ├─► CONSISTENT_REPEATS
//!                   └─► CONSISTENT_CONFIGS
//! ```
//!
//! # Example
//!
//! ```rust
//! use ichor::classify::Classifier;
//!
//! let classifier = Classifier::standard();
//! let c = classifier.classify("/*infloop*/\nwhile (x) { }");
//! assert!(c.allow_parse);
//! assert!(!c.allow_execute);
//! ```

mod rules;

pub use rules::{DenyRule, Predicate, STANDARD_RULES};

use serde::Serialize;

bitflags::bitflags! {
    /// Admissibility flags, one bit per [`Classification`] field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClassFlags: u8 {
        /// The fragment may be handed to the parser.
        const PARSE = 1 << 0;
        /// The fragment may run.
        const EXECUTE = 1 << 1;
        /// Its observable output is deterministic.
        const CONSISTENT_OUTPUT = 1 << 2;
        /// Running it twice yields the same result.
        const CONSISTENT_REPEATS = 1 << 3;
        /// Engine tuning does not change its result.
        const CONSISTENT_CONFIGS = 1 << 4;
    }
}

impl ClassFlags {
    /// Apply flag dependencies.
    pub fn normalized(self) -> Self {
        let mut flags = self;
        if !flags.contains(ClassFlags::PARSE) {
            flags.remove(ClassFlags::EXECUTE);
        }
        if !flags.contains(ClassFlags::EXECUTE) {
            flags.remove(
                ClassFlags::CONSISTENT_OUTPUT
                    | ClassFlags::CONSISTENT_REPEATS
                    | ClassFlags::CONSISTENT_CONFIGS,
            );
        }
        flags
    }
}

/// Per-fragment admissibility, recomputed for every fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub allow_parse: bool,
    pub allow_execute: bool,
    pub expect_consistent_output: bool,
    pub expect_consistent_across_repeats: bool,
    pub expect_consistent_across_configurations: bool,
}

impl Classification {
    pub fn flags(&self) -> ClassFlags {
        let mut flags = ClassFlags::empty();
        flags.set(ClassFlags::PARSE, self.allow_parse);
        flags.set(ClassFlags::EXECUTE, self.allow_execute);
        flags.set(ClassFlags::CONSISTENT_OUTPUT, self.expect_consistent_output);
        flags.set(
            ClassFlags::CONSISTENT_REPEATS,
            self.expect_consistent_across_repeats,
        );
        flags.set(
            ClassFlags::CONSISTENT_CONFIGS,
            self.expect_consistent_across_configurations,
        );
        flags
    }

    /// Eligible for the nesting-consistency oracle.
    pub fn is_pure(&self) -> bool {
        self.allow_execute && self.expect_consistent_output && self.expect_consistent_across_repeats
    }
}

impl From<ClassFlags> for Classification {
    fn from(flags: ClassFlags) -> Self {
        let flags = flags.normalized();
        Self {
            allow_parse: flags.contains(ClassFlags::PARSE),
            allow_execute: flags.contains(ClassFlags::EXECUTE),
            expect_consistent_output: flags.contains(ClassFlags::CONSISTENT_OUTPUT),
            expect_consistent_across_repeats: flags.contains(ClassFlags::CONSISTENT_REPEATS),
            expect_consistent_across_configurations: flags
                .contains(ClassFlags::CONSISTENT_CONFIGS),
        }
    }
}

/// Applies a denylist to fragment text.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<DenyRule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::standard()
    }
}

impl Classifier {
    /// The built-in denylist.
    pub fn standard() -> Self {
        Self::with_rules(STANDARD_RULES.to_vec())
    }

    pub fn with_rules(rules: Vec<DenyRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[DenyRule] {
        &self.rules
    }

    pub fn classify(&self, text: &str) -> Classification {
        let mut flags = ClassFlags::all();
        for rule in self.explain(text) {
            flags.remove(rule.clears);
        }
        Classification::from(flags)
    }

    /// The rules that match `text`, in table order.
    pub fn explain(&self, text: &str) -> Vec<&DenyRule> {
        self.rules
            .iter()
            .filter(|rule| rule.predicate.matches(text))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &'static str) -> &'static DenyRule {
        STANDARD_RULES.iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_plain_code_is_fully_admissible() {
        let c = Classifier::standard().classify("var a = (1 + 2);\nif (a) { a = [a]; }");
        assert_eq!(c.flags(), ClassFlags::all());
        assert!(c.is_pure());
    }

    #[test]
    fn test_infinite_loop_blocks_execution() {
        let c = Classifier::standard().classify("/*infloop*/\nwhile (true) { }");
        assert!(c.allow_parse);
        assert!(!c.allow_execute);
        assert!(!c.expect_consistent_output);
        assert!(!c.expect_consistent_across_repeats);
    }

    #[test]
    fn test_unparseable_clears_everything() {
        let c = Classifier::standard().classify("f(");
        assert_eq!(c.flags(), ClassFlags::empty());
    }

    #[test]
    fn test_host_state_only_clears_output() {
        let c = Classifier::standard().classify("o[3].remove();");
        assert!(c.allow_execute);
        assert!(!c.expect_consistent_output);
        assert!(c.expect_consistent_across_repeats);
        assert_eq!(
            Classifier::standard()
                .explain("o[3].remove();")
                .iter()
                .map(|r| r.name)
                .collect::<Vec<_>>(),
            vec!["host-state"]
        );
    }

    #[test]
    fn test_denylist_only_narrows() {
        let classifier = Classifier::standard();
        let samples = [
            "quit();",
            "gczeal(2);",
            "setTimeout(function() { }, 0);",
            "new Date();",
            "new WeakRef({});",
            "e.stack;",
            "dumpHeap();",
        ];
        for text in samples {
            let matched = classifier.explain(text);
            assert!(!matched.is_empty(), "{}", text);
            let flags = classifier.classify(text).flags();
            for rule in matched {
                assert!(!flags.intersects(rule.clears), "{} via {}", text, rule.name);
            }
        }
    }

    #[test]
    fn test_custom_rule_table() {
        let classifier = Classifier::with_rules(vec![*rule("quit")]);
        assert!(!classifier.classify("quit();").allow_execute);
        assert!(classifier.classify("new Date();").expect_consistent_output);
        assert!(Classifier::with_rules(Vec::new()).classify("f(").allow_parse);
    }

    #[test]
    fn test_normalization() {
        let flags = (ClassFlags::all() - ClassFlags::PARSE).normalized();
        assert_eq!(flags, ClassFlags::empty());
        let flags = (ClassFlags::all() - ClassFlags::EXECUTE).normalized();
        assert_eq!(flags, ClassFlags::PARSE);
    }
}
