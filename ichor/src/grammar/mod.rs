//! Grammar/production registry.
//!
//! A [`Production`] maps a [`Budget`] and a [`Scope`] to a [`Node`], and may
//! call back into the [`GenContext`] to produce children. Productions come in
//! three kinds:
//!
//! - **Term** productions never recurse. They are the only choices left once
//!   a budget is exhausted, which is what makes generation terminate.
//! - **Expr** productions build compound expressions and hand every child a
//!   strictly smaller budget.
//! - **Stmt** productions build statements, again with smaller budgets.
//!
//! A [`Grammar`] is an ordered registry of productions. Order matters only
//! for reproducibility: the same registry and the same seed always yield the
//! same output. Selection is weighted, with no priority between productions
//! beyond their weights.
//!
//! # Example
//!
//! ```rust,ignore
//! let grammar = Grammar::standard();
//! let mut cx = GenContext::new(&mut rng, &mut arena, &roots, &grammar, &settings);
//! let node = cx.stmt(Budget::new(4), &Scope::new());
//! println!("{}", render(&node));
//! ```

mod budget;
mod exprs;
mod rule;
mod scope;
mod stmts;
mod terms;

pub use budget::Budget;
pub use rule::Rule;
pub use scope::{Scope, BINDING_NAMES, COUNTER_NAMES};
pub use stmts::INFINITE_LOOP_MARKER;
pub use terms::HOST_ACTIONS;

use std::fmt;

use crate::context::GenContext;
use crate::error::RegistryError;
use crate::fragment::Node;
use crate::random::{RandomExt, RandomSource};

/// Signature of every production.
pub type ProduceFn = fn(&mut GenContext<'_>, Budget, &Scope) -> Node;

/// What syntactic slot a production fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductionKind {
    Term,
    Expr,
    Stmt,
}

impl ProductionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductionKind::Term => "term",
            ProductionKind::Expr => "expression",
            ProductionKind::Stmt => "statement",
        }
    }
}

impl fmt::Display for ProductionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, weighted production.
#[derive(Clone, Copy)]
pub struct Production {
    pub name: &'static str,
    pub kind: ProductionKind,
    pub weight: u32,
    pub produce: ProduceFn,
}

impl Production {
    pub const fn new(
        name: &'static str,
        kind: ProductionKind,
        weight: u32,
        produce: ProduceFn,
    ) -> Self {
        Self {
            name,
            kind,
            weight,
            produce,
        }
    }
}

impl fmt::Debug for Production {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Production")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("weight", &self.weight)
            .finish()
    }
}

/// Which productions a selection may draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Terms only.
    Term,
    /// Terms and compound expressions.
    Expr,
    /// Statements.
    Stmt,
}

/// Ordered, weighted registry of productions.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    productions: Vec<Production>,
    terms: Vec<(u32, usize)>,
    exprs: Vec<(u32, usize)>,
    stmts: Vec<(u32, usize)>,
}

impl Grammar {
    /// An empty grammar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in production.
    pub fn standard() -> Self {
        let mut grammar = Self::new();
        for production in terms::PRODUCTIONS
            .iter()
            .chain(exprs::PRODUCTIONS)
            .chain(stmts::PRODUCTIONS)
        {
            // Built-in names are unique and weights positive.
            let _ = grammar.register(*production);
        }
        grammar
    }

    /// Add a production. Names must be unique and weights positive.
    pub fn register(&mut self, production: Production) -> Result<(), RegistryError> {
        if production.name.is_empty() {
            return Err(RegistryError::EmptyName { kind: "production" });
        }
        if production.weight == 0 {
            return Err(RegistryError::ZeroWeight {
                kind: "production",
                name: production.name.to_string(),
            });
        }
        if self.get(production.name).is_some() {
            return Err(RegistryError::Duplicate {
                kind: "production",
                name: production.name.to_string(),
            });
        }

        let index = self.productions.len();
        let entry = (production.weight, index);
        match production.kind {
            ProductionKind::Term => {
                self.terms.push(entry);
                self.exprs.push(entry);
            }
            ProductionKind::Expr => self.exprs.push(entry),
            ProductionKind::Stmt => self.stmts.push(entry),
        }
        self.productions.push(production);
        Ok(())
    }

    /// Check that every selection has something to fall back on.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.terms.is_empty() {
            return Err(RegistryError::MissingKind(ProductionKind::Term.as_str()));
        }
        if self.stmts.is_empty() {
            return Err(RegistryError::MissingKind(ProductionKind::Stmt.as_str()));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Production> {
        self.productions.iter().find(|p| p.name == name)
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    pub fn of_kind(&self, kind: ProductionKind) -> impl Iterator<Item = &Production> {
        self.productions.iter().filter(move |p| p.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.productions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.productions.is_empty()
    }

    /// Weighted choice among the productions a selection admits.
    pub fn choose(&self, rng: &mut dyn RandomSource, selection: Selection) -> Option<&Production> {
        let table = match selection {
            Selection::Term => &self.terms,
            Selection::Expr => &self.exprs,
            Selection::Stmt => &self.stmts,
        };
        rng.choice(table).map(|&i| &self.productions[i])
    }

    /// Uniform choice over the whole registry, ignoring kind and weight.
    pub fn choose_any(&self, rng: &mut dyn RandomSource) -> Option<&Production> {
        rng.element(&self.productions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SeededRandom;

    fn leaf(_: &mut GenContext<'_>, _: Budget, _: &Scope) -> Node {
        Node::Number(1.0)
    }

    #[test]
    fn test_standard_grammar_is_valid() {
        let grammar = Grammar::standard();
        assert!(grammar.validate().is_ok());
        assert!(grammar.of_kind(ProductionKind::Term).count() >= 6);
        assert!(grammar.of_kind(ProductionKind::Expr).count() >= 10);
        assert!(grammar.of_kind(ProductionKind::Stmt).count() >= 10);
        assert_eq!(
            grammar.len(),
            terms::PRODUCTIONS.len() + exprs::PRODUCTIONS.len() + stmts::PRODUCTIONS.len()
        );
    }

    #[test]
    fn test_register_rejects_duplicates_and_zero_weight() {
        let mut grammar = Grammar::new();
        grammar
            .register(Production::new("one", ProductionKind::Term, 1, leaf))
            .unwrap();
        assert_eq!(
            grammar.register(Production::new("one", ProductionKind::Term, 1, leaf)),
            Err(RegistryError::Duplicate {
                kind: "production",
                name: "one".into()
            })
        );
        assert!(matches!(
            grammar.register(Production::new("two", ProductionKind::Expr, 0, leaf)),
            Err(RegistryError::ZeroWeight { .. })
        ));
        assert!(matches!(
            grammar.register(Production::new("", ProductionKind::Expr, 1, leaf)),
            Err(RegistryError::EmptyName { .. })
        ));
    }

    #[test]
    fn test_validate_requires_terms_and_statements() {
        let mut grammar = Grammar::new();
        assert_eq!(grammar.validate(), Err(RegistryError::MissingKind("term")));
        grammar
            .register(Production::new("t", ProductionKind::Term, 1, leaf))
            .unwrap();
        assert_eq!(grammar.validate(), Err(RegistryError::MissingKind("statement")));
    }

    #[test]
    fn test_term_selection_only_yields_terms() {
        let grammar = Grammar::standard();
        let mut rng = SeededRandom::from_seed(12);
        for _ in 0..500 {
            let p = grammar.choose(&mut rng, Selection::Term).unwrap();
            assert_eq!(p.kind, ProductionKind::Term);
            let p = grammar.choose(&mut rng, Selection::Expr).unwrap();
            assert_ne!(p.kind, ProductionKind::Stmt);
            let p = grammar.choose(&mut rng, Selection::Stmt).unwrap();
            assert_eq!(p.kind, ProductionKind::Stmt);
        }
    }

    #[test]
    fn test_names_are_unique() {
        let grammar = Grammar::standard();
        let mut names: Vec<_> = grammar.productions().iter().map(|p| p.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), grammar.len());
    }
}
