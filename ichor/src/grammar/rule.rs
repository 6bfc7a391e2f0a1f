//! Declarative combinators over productions.
//!
//! A [`Rule`] is a small grammar fragment built from leaves and named
//! productions. Every combinator lowers the budget for its children, and an
//! alternation under an exhausted budget only considers terminal branches.

use super::{Budget, Grammar, ProductionKind, Scope};
use crate::context::GenContext;
use crate::error::RegistryError;
use crate::fragment::Node;
use crate::random::RandomExt;

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// Fixed text.
    Leaf(String),
    /// A production from the grammar, by name.
    Production(&'static str),
    /// Children in order.
    Concat(Vec<Rule>),
    /// One weighted branch.
    Alt(Vec<(u32, Rule)>),
    /// Between `min` and `max` copies of a rule.
    Repeat { rule: Box<Rule>, min: u32, max: u32 },
    /// Parenthesized child.
    Group(Box<Rule>),
}

impl Rule {
    pub fn leaf(text: impl Into<String>) -> Self {
        Rule::Leaf(text.into())
    }

    pub fn production(name: &'static str) -> Self {
        Rule::Production(name)
    }

    pub fn concat(rules: Vec<Rule>) -> Self {
        Rule::Concat(rules)
    }

    pub fn alt(branches: Vec<(u32, Rule)>) -> Self {
        Rule::Alt(branches)
    }

    pub fn repeat(rule: Rule, min: u32, max: u32) -> Self {
        Rule::Repeat {
            rule: Box::new(rule),
            min,
            max: max.max(min),
        }
    }

    pub fn group(rule: Rule) -> Self {
        Rule::Group(Box::new(rule))
    }

    /// Whether this rule can be expanded without recursing into a
    /// non-term production.
    pub fn is_terminal(&self, grammar: &Grammar) -> bool {
        match self {
            Rule::Leaf(_) => true,
            Rule::Production(name) => grammar
                .get(name)
                .is_some_and(|p| p.kind == ProductionKind::Term),
            Rule::Concat(rules) => rules.iter().all(|r| r.is_terminal(grammar)),
            Rule::Alt(branches) => branches.iter().any(|(_, r)| r.is_terminal(grammar)),
            Rule::Repeat { rule, min, .. } => *min == 0 || rule.is_terminal(grammar),
            Rule::Group(rule) => rule.is_terminal(grammar),
        }
    }

    /// Check that every referenced production exists.
    pub fn validate(&self, grammar: &Grammar) -> Result<(), RegistryError> {
        match self {
            Rule::Leaf(_) => Ok(()),
            Rule::Production(name) => match grammar.get(name) {
                Some(_) => Ok(()),
                None => Err(RegistryError::UnknownProduction(name.to_string())),
            },
            Rule::Concat(rules) => rules.iter().try_for_each(|r| r.validate(grammar)),
            Rule::Alt(branches) => branches.iter().try_for_each(|(_, r)| r.validate(grammar)),
            Rule::Repeat { rule, .. } | Rule::Group(rule) => rule.validate(grammar),
        }
    }

    /// Expand the rule.
    pub fn produce(&self, cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
        match self {
            Rule::Leaf(text) => Node::Text(text.clone()),
            Rule::Production(name) => {
                let child = budget.descend(cx);
                cx.produce_named(name, child, scope)
            }
            Rule::Concat(rules) => Node::Seq(
                rules
                    .iter()
                    .map(|r| {
                        let child = budget.descend(cx);
                        r.produce(cx, child, scope)
                    })
                    .collect(),
            ),
            Rule::Alt(branches) => {
                let grammar = cx.grammar();
                let candidates: Vec<(u32, &Rule)> = if budget.is_exhausted() {
                    branches
                        .iter()
                        .filter(|(_, r)| r.is_terminal(grammar))
                        .map(|(w, r)| (*w, r))
                        .collect()
                } else {
                    branches.iter().map(|(w, r)| (*w, r)).collect()
                };
                match cx.choice(&candidates).copied() {
                    Some(rule) => {
                        let child = budget.descend(cx);
                        rule.produce(cx, child, scope)
                    }
                    None => Node::Seq(Vec::new()),
                }
            }
            Rule::Repeat { rule, min, max } => {
                let count = if budget.is_exhausted() {
                    *min
                } else {
                    cx.range(*min, *max)
                };
                Node::Seq(
                    (0..count)
                        .map(|_| {
                            let child = budget.descend(cx);
                            rule.produce(cx, child, scope)
                        })
                        .collect(),
                )
            }
            Rule::Group(rule) => {
                let child = budget.descend(cx);
                Node::Group(Box::new(rule.produce(cx, child, scope)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{Arena, Roots};
    use crate::config::GenerationConfig;
    use crate::random::SeededRandom;
    use crate::render::render_expr;

    fn with_context<F: FnOnce(&mut GenContext<'_>)>(seed: u64, f: F) {
        let mut rng = SeededRandom::from_seed(seed);
        let mut arena = Arena::new();
        let roots = Roots::new();
        let grammar = Grammar::standard();
        let settings = GenerationConfig::default();
        let mut cx = GenContext::new(&mut rng, &mut arena, &roots, &grammar, &settings);
        f(&mut cx);
    }

    #[test]
    fn test_concat_of_leaves() {
        let rule = Rule::concat(vec![Rule::leaf("a"), Rule::leaf("b")]);
        with_context(1, |cx| {
            let node = rule.produce(cx, Budget::new(4), &Scope::new());
            assert_eq!(render_expr(&node), "ab");
        });
    }

    #[test]
    fn test_exhausted_alt_takes_terminal_branch() {
        let rule = Rule::alt(vec![
            (100, Rule::production("binary")),
            (1, Rule::leaf("leaf")),
        ]);
        with_context(2, |cx| {
            for _ in 0..50 {
                let node = rule.produce(cx, Budget::exhausted(), &Scope::new());
                assert_eq!(node, Node::Text("leaf".into()));
            }
        });
    }

    #[test]
    fn test_exhausted_alt_without_terminal_is_empty() {
        let rule = Rule::alt(vec![(1, Rule::production("binary"))]);
        with_context(3, |cx| {
            let node = rule.produce(cx, Budget::exhausted(), &Scope::new());
            assert_eq!(node, Node::Seq(Vec::new()));
        });
    }

    #[test]
    fn test_repeat_bounds() {
        let rule = Rule::repeat(Rule::leaf("x"), 2, 4);
        with_context(4, |cx| {
            for _ in 0..50 {
                let text = render_expr(&rule.produce(cx, Budget::new(5), &Scope::new()));
                assert!((2..=4).contains(&text.len()), "{}", text);
            }
            let text = render_expr(&rule.produce(cx, Budget::exhausted(), &Scope::new()));
            assert_eq!(text, "xx");
        });
    }

    #[test]
    fn test_group_parenthesizes() {
        let rule = Rule::group(Rule::leaf("1"));
        with_context(5, |cx| {
            let node = rule.produce(cx, Budget::new(2), &Scope::new());
            assert_eq!(render_expr(&node), "(1)");
        });
    }

    #[test]
    fn test_validate_unknown_production() {
        let grammar = Grammar::standard();
        assert!(Rule::production("number").validate(&grammar).is_ok());
        assert_eq!(
            Rule::concat(vec![Rule::leaf("a"), Rule::production("nope")]).validate(&grammar),
            Err(RegistryError::UnknownProduction("nope".into()))
        );
    }

    #[test]
    fn test_is_terminal() {
        let grammar = Grammar::standard();
        assert!(Rule::leaf("a").is_terminal(&grammar));
        assert!(Rule::production("number").is_terminal(&grammar));
        assert!(!Rule::production("binary").is_terminal(&grammar));
        assert!(Rule::repeat(Rule::production("binary"), 0, 3).is_terminal(&grammar));
    }
}
