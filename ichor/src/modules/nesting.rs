//! Wrappers around further generated output.
//!
//! The wrapped body comes from [`GenContext::subgenerate`], which is bounded
//! by its own nesting limit. Once that limit is reached the body falls back
//! to a small grammar statement list.

use super::embed;
use crate::context::GenContext;
use crate::error::GenerationError;
use crate::fragment::{Fragment, Node};
use crate::grammar::{Scope, COUNTER_NAMES};
use crate::module::FuzzModule;
use crate::random::{RandomExt, RandomSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wrapper {
    Loop,
    Try,
    Timeout,
    Microtask,
}

const WRAPPERS: &[(u32, Wrapper)] = &[
    (3, Wrapper::Loop),
    (3, Wrapper::Try),
    (2, Wrapper::Timeout),
    (1, Wrapper::Microtask),
];

const LOOP_COUNTS: &[u32] = &[1, 2, 3, 10, 100, 1000];

#[derive(Debug, Clone, Copy, Default)]
pub struct NestingModule;

impl FuzzModule for NestingModule {
    fn name(&self) -> &str {
        "nesting"
    }

    fn default_weight(&self) -> u32 {
        2
    }

    fn make_command(&self, cx: &mut GenContext<'_>) -> Result<Vec<Fragment>, GenerationError> {
        let wrapper = cx.choice(WRAPPERS).copied().unwrap_or(Wrapper::Try);
        let body = inner(cx);
        let node = match wrapper {
            Wrapper::Loop => Node::For {
                var: cx.index(COUNTER_NAMES, &"i").to_string(),
                limit: *cx.index(LOOP_COUNTS, &1),
                body,
            },
            Wrapper::Try => Node::Try {
                block: body,
                catch: Some((Some("e".to_string()), Vec::new())),
                finally: None,
            },
            Wrapper::Timeout => {
                let delay = Node::Number(f64::from(cx.uniform(50)));
                Node::stmt(Node::call(
                    Node::global("setTimeout"),
                    vec![callback(body), delay],
                ))
            }
            Wrapper::Microtask => {
                let resolved = Node::method(Node::global("Promise"), "resolve", vec![]);
                Node::stmt(Node::method(resolved, "then", vec![callback(body)]))
            }
        };
        Ok(vec![Fragment::script(node)])
    }
}

fn inner(cx: &mut GenContext<'_>) -> Vec<Node> {
    let body = embed(cx.subgenerate());
    if !body.is_empty() {
        return body;
    }
    let budget = cx.budget().descend_by(2);
    cx.stmts(budget, &Scope::new())
}

fn callback(body: Vec<Node>) -> Node {
    Node::Function {
        name: None,
        params: Vec::new(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::arena::{Arena, Roots};
    use crate::config::GenerationConfig;
    use crate::grammar::Grammar;
    use crate::module::ModuleRegistry;
    use crate::modules::testing::command;
    use crate::random::SeededRandom;

    #[test]
    fn test_wrappers_without_subgeneration() {
        for seed in 0..40 {
            let (fragments, _) = command(&NestingModule, seed);
            assert_eq!(fragments.len(), 1);
            let text = fragments[0].text();
            assert!(
                text.starts_with("for (")
                    || text.starts_with("try {")
                    || text.starts_with("setTimeout(")
                    || text.starts_with("Promise.resolve()"),
                "{}",
                text
            );
        }
    }

    /// Records the deepest nesting it is invoked at, then nests again.
    struct DepthRecorder(Rc<Cell<u32>>);

    impl FuzzModule for DepthRecorder {
        fn name(&self) -> &str {
            "depth_recorder"
        }

        fn make_command(
            &self,
            cx: &mut GenContext<'_>,
        ) -> Result<Vec<Fragment>, GenerationError> {
            self.0.set(self.0.get().max(cx.nesting()));
            Ok(cx.subgenerate())
        }
    }

    #[test]
    fn test_self_nesting_is_bounded() {
        let deepest = Rc::new(Cell::new(0));
        let mut registry = ModuleRegistry::new();
        registry.register(Box::new(NestingModule), 1).unwrap();
        registry
            .register(Box::new(DepthRecorder(Rc::clone(&deepest))), 1)
            .unwrap();
        let active = [0, 1];
        let grammar = Grammar::standard();
        let roots = Roots::new();
        let settings = GenerationConfig {
            max_subgeneration_depth: 2,
            ..GenerationConfig::default()
        };
        for seed in 0..30 {
            let mut rng = SeededRandom::from_seed(seed);
            let mut arena = Arena::new();
            let mut cx = GenContext::new(&mut rng, &mut arena, &roots, &grammar, &settings)
                .with_modules(&registry, &active);
            NestingModule.make_command(&mut cx).unwrap();
            assert_eq!(cx.nesting(), 0);
            assert!(cx.stats().subgenerations >= 1);
        }
        assert!(deepest.get() <= 2);
        assert!(deepest.get() >= 1);
    }
}
