//! Fuzz target for rule combinators.
//!
//! Builds an arbitrary rule tree, including references to productions that
//! do not exist, and expands it. Expansion must terminate without panicking.

#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use ichor::arena::{Arena, Reference, Roots};
use ichor::config::GenerationConfig;
use ichor::grammar::{Budget, Scope};
use ichor::random::SeededRandom;
use ichor::{GenContext, Grammar, Rule};

const NAMES: &[&str] = &["number", "binding", "binary", "call", "if", "var", "missing"];

/// A rule tree bounded in depth and width.
#[derive(Debug)]
struct FuzzRule(Rule);

fn rule(u: &mut Unstructured<'_>, depth: u32) -> arbitrary::Result<Rule> {
    let shape = if depth == 0 { u.int_in_range(0..=1)? } else { u.int_in_range(0..=5)? };
    Ok(match shape {
        0 => Rule::leaf(String::arbitrary(u)?),
        1 => Rule::production(NAMES[u.choose_index(NAMES.len())?]),
        2 => {
            let count = u.int_in_range(0..=4)?;
            let children = (0..count)
                .map(|_| rule(u, depth - 1))
                .collect::<arbitrary::Result<Vec<_>>>()?;
            Rule::concat(children)
        }
        3 => {
            let count = u.int_in_range(0..=4)?;
            let branches = (0..count)
                .map(|_| Ok((u32::from(u8::arbitrary(u)?), rule(u, depth - 1)?)))
                .collect::<arbitrary::Result<Vec<_>>>()?;
            Rule::alt(branches)
        }
        4 => {
            let min = u.int_in_range(0..=3)?;
            let max = u.int_in_range(0..=5)?;
            Rule::repeat(rule(u, depth - 1)?, min, max)
        }
        _ => Rule::group(rule(u, depth - 1)?),
    })
}

impl<'a> Arbitrary<'a> for FuzzRule {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(FuzzRule(rule(u, 4)?))
    }
}

fuzz_target!(|input: (FuzzRule, u64, u8)| {
    let (FuzzRule(rule), seed, budget) = input;
    let grammar = Grammar::standard();
    let settings = GenerationConfig::default();
    let roots = Roots::new();
    let mut arena: Arena<Reference> = Arena::new();
    let mut rng = SeededRandom::from_seed(seed);
    let mut cx = GenContext::new(&mut rng, &mut arena, &roots, &grammar, &settings);

    let _ = rule.is_terminal(&grammar);
    let _ = rule.validate(&grammar);
    let node = rule.produce(&mut cx, Budget::new(u32::from(budget % 10)), &Scope::new());
    let _ = ichor::render::render(&node);
});
