//! Every production terminates within a depth fixed by its budget, whatever
//! the random source answers.

use ichor::arena::{Arena, Reference, Roots};
use ichor::config::GenerationConfig;
use ichor::grammar::{Budget, Scope};
use ichor::random::{RandomSource, SeededRandom};
use ichor::{FuzzModule, GenContext, Grammar, ModuleRegistry};

/// Always takes the last option and drifts the budget upwards.
struct Deepest;

impl RandomSource for Deepest {
    fn uniform(&mut self, n: u32) -> u32 {
        n.saturating_sub(1)
    }

    fn float(&mut self) -> f64 {
        0.999
    }
}

/// Always takes the first option.
struct Shallowest;

impl RandomSource for Shallowest {
    fn uniform(&mut self, _n: u32) -> u32 {
        0
    }

    fn float(&mut self) -> f64 {
        0.0
    }
}

/// Depth of nested production calls allowed for a budget. Each nested
/// call costs fuel, and chaos or term fallbacks add at most two levels.
fn depth_bound(budget: u32) -> usize {
    Budget::new(budget).fuel() as usize + 2
}

fn check_all(rng: &mut dyn RandomSource, budget: u32) {
    let grammar = Grammar::standard();
    let settings = GenerationConfig::default();
    let roots = Roots::new();
    for production in grammar.productions() {
        let mut arena: Arena<Reference> = Arena::new();
        for root in roots.all() {
            arena.push(root.clone());
        }
        let mut cx = GenContext::new(&mut *rng, &mut arena, &roots, &grammar, &settings);
        let _node = cx.produce(production, Budget::new(budget), &Scope::new().with("a"));
        let stats = cx.stats();
        assert!(stats.calls >= 1);
        assert!(
            stats.max_depth <= depth_bound(budget),
            "{} at budget {} reached depth {}",
            production.name,
            budget,
            stats.max_depth
        );
    }
}

#[test]
fn test_deepest_choices_terminate() {
    for budget in 0..=2 {
        check_all(&mut Deepest, budget);
    }
}

#[test]
fn test_shallowest_choices_terminate() {
    for budget in 0..=10 {
        check_all(&mut Shallowest, budget);
    }
}

#[test]
fn test_seeded_choices_terminate() {
    for seed in 0..40 {
        let mut rng = SeededRandom::from_seed(seed);
        for budget in [0, 2, 4, 6] {
            check_all(&mut rng, budget);
        }
    }
}

#[test]
fn test_zero_budget_only_makes_leaves() {
    let mut rng = SeededRandom::from_seed(5);
    let grammar = Grammar::standard();
    let settings = GenerationConfig::default();
    let roots = Roots::new();
    let mut arena: Arena<Reference> = Arena::new();
    let mut cx = GenContext::new(&mut rng, &mut arena, &roots, &grammar, &settings);
    for _ in 0..200 {
        let node = cx.expr(Budget::new(0), &Scope::new());
        assert!(node.depth() <= 2, "{:?}", node);
    }
}

#[test]
fn test_subgeneration_depth_is_bounded() {
    let config = ichor::FuzzConfig::builder()
        .seed(3)
        .max_subgeneration_depth(1)
        .build()
        .unwrap();
    let modules = ModuleRegistry::standard(&config).unwrap();
    let grammar = Grammar::standard();
    let roots = Roots::new();
    let active: Vec<usize> = (0..modules.len()).collect();
    for seed in 0..50 {
        let mut rng = SeededRandom::from_seed(seed);
        let mut arena: Arena<Reference> = Arena::new();
        for root in roots.all() {
            arena.push(root.clone());
        }
        let mut cx = GenContext::new(&mut rng, &mut arena, &roots, &grammar, &config.generation)
            .with_modules(&modules, &active);
        for index in 0..modules.len() {
            let module = modules.get(index).unwrap();
            let _ = module.make_command(&mut cx);
            assert_eq!(cx.nesting(), 0);
        }
    }
}
