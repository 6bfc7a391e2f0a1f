//! Property-based tests for ichor.
//!
//! Uses proptest to generate random inputs and verify invariants hold.

use std::rc::Rc;

use ichor::arena::{kinds, Arena, Reference};
use ichor::classify::{Classifier, Predicate, STANDARD_RULES};
use ichor::grammar::Budget;
use ichor::oracle::bisect::halves;
use ichor::random::{RandomExt, RandomSource, SeededRandom};
use ichor::render::quote;
use ichor::{Driver, FuzzConfig, Grammar, ModuleRegistry};
use proptest::prelude::*;

/// Arena operations: reserve, push, or null out an earlier slot.
#[derive(Debug, Clone)]
enum ArenaOp {
    Reserve,
    Push,
    Null(usize),
}

fn arena_op() -> impl Strategy<Value = ArenaOp> {
    prop_oneof![
        Just(ArenaOp::Reserve),
        Just(ArenaOp::Push),
        (0usize..64).prop_map(ArenaOp::Null),
    ]
}

/// Rules that match by plain substring, with their needle.
fn substring_rules() -> Vec<(&'static str, &'static str)> {
    STANDARD_RULES
        .iter()
        .filter_map(|rule| match rule.predicate {
            Predicate::Contains(needle) | Predicate::ContainsIgnoreCase(needle) => {
                Some((rule.name, needle))
            }
            _ => None,
        })
        .collect()
}

proptest! {
    /// Empty sequences always yield the sentinel
    #[test]
    fn index_of_empty_is_sentinel(seed in any::<u64>(), sentinel in any::<u32>()) {
        let mut rng = SeededRandom::from_seed(seed);
        let empty: &[u32] = &[];
        prop_assert_eq!(*rng.index(empty, &sentinel), sentinel);
        prop_assert!(rng.element(empty).is_none());
        prop_assert_eq!(rng.uniform(0), 0);
    }

    /// Ranges are inclusive and never escape their bounds
    #[test]
    fn range_stays_in_bounds(seed in any::<u64>(), lo in 0u32..1000, width in 0u32..1000) {
        let mut rng = SeededRandom::from_seed(seed);
        let hi = lo + width;
        for _ in 0..20 {
            let v = rng.range(lo, hi);
            prop_assert!(v >= lo && v <= hi);
        }
    }

    /// Weighted choice only returns listed values
    #[test]
    fn choice_returns_a_member(seed in any::<u64>(), weights in prop::collection::vec(0u32..10, 1..8)) {
        let mut rng = SeededRandom::from_seed(seed);
        let pairs: Vec<(u32, usize)> = weights.iter().copied().zip(0..).collect();
        let picked = *rng.choice(&pairs).unwrap();
        prop_assert!(picked < pairs.len());
        if weights.iter().any(|&w| w > 0) {
            prop_assert!(weights[picked] > 0);
        }
    }

    /// Descent chains never outlast their fuel
    #[test]
    fn descent_is_bounded_by_fuel(seed in any::<u64>(), depth in 0u32..64) {
        let mut rng = SeededRandom::from_seed(seed);
        let start = Budget::new(depth);
        let mut budget = start;
        let mut steps = 0;
        while !budget.is_exhausted() {
            budget = budget.descend(&mut rng);
            steps += 1;
        }
        prop_assert!(steps <= start.fuel());
    }

    /// Indices are handed out in order and never reused; nulling one slot
    /// leaves every other lookup intact
    #[test]
    fn arena_indices_are_monotonic(ops in prop::collection::vec(arena_op(), 0..64)) {
        let mut arena: Arena<Reference> = Arena::new();
        let mut pushed: Vec<(usize, Rc<Reference>)> = Vec::new();
        let mut nulled = Vec::new();
        for op in ops {
            match op {
                ArenaOp::Reserve => {
                    let index = arena.reserve();
                    prop_assert_eq!(index.get(), arena.len() - 1);
                }
                ArenaOp::Push => {
                    let value = Reference::new(kinds::VALUE, format!("v{}", arena.len()));
                    let index = arena.push(Rc::clone(&value));
                    prop_assert_eq!(index.get(), arena.len() - 1);
                    pushed.push((index.get(), value));
                }
                ArenaOp::Null(n) if !arena.is_empty() => {
                    let index = ichor::arena::SlotIndex::new(n % arena.len());
                    arena.null_out(index);
                    nulled.push(index.get());
                }
                ArenaOp::Null(_) => {}
            }
        }
        for (index, value) in &pushed {
            let slot = ichor::arena::SlotIndex::new(*index);
            prop_assert!(arena.slot(slot).is_some());
            if !nulled.contains(index) {
                prop_assert!(Rc::ptr_eq(arena.get(slot).unwrap(), value));
                prop_assert_eq!(arena.find_index(value), Some(slot));
            } else {
                prop_assert!(arena.get(slot).is_none());
            }
        }
    }

    /// A denylisted substring always clears the flags its rule names
    #[test]
    fn denylist_patterns_always_clear(prefix in "[ -~]{0,24}", suffix in "[ -~]{0,24}", pick in any::<prop::sample::Index>()) {
        let rules = substring_rules();
        let (name, needle) = rules[pick.index(rules.len())];
        let rule = STANDARD_RULES.iter().find(|r| r.name == name).unwrap();
        let text = format!("{}{}{}", prefix, needle, suffix);
        let flags = Classifier::standard().classify(&text).flags();
        prop_assert!(!flags.intersects(rule.clears), "{} on {:?}", name, text);
    }

    /// The classifier accepts any input
    #[test]
    fn classifier_never_panics(text in any::<String>()) {
        let classifier = Classifier::standard();
        let c = classifier.classify(&text);
        prop_assert!(c.allow_parse || !c.allow_execute);
        prop_assert_eq!(classifier.explain(&text).is_empty(), c.flags().is_all());
    }

    /// Quoted code reads back as the original string
    #[test]
    fn quote_reads_back(text in any::<String>()) {
        let quoted = quote(&text);
        let back: String = serde_json::from_str(&quoted).unwrap();
        prop_assert_eq!(back, text);
    }

    /// Halves always reassemble the fragment
    #[test]
    fn halves_reassemble(text in any::<String>()) {
        let (front, back) = halves(&text);
        prop_assert_eq!(format!("{}{}", front, back), text);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Generation under any seed completes and reproduces
    #[test]
    fn any_seed_generates(seed in any::<u64>()) {
        let run = |seed| {
            let config = FuzzConfig::builder().seed(seed).turns(8).build().unwrap();
            let modules = ModuleRegistry::standard(&config).unwrap();
            let mut driver = Driver::new(config, Grammar::standard(), modules).unwrap();
            let summary = driver.run();
            (summary.turns, driver.testcase())
        };
        let (turns, first) = run(seed);
        prop_assert_eq!(turns, 8);
        prop_assert_eq!(run(seed).1, first);
    }
}
