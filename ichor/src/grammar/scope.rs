//! Binding scopes.

use crate::random::{RandomExt, RandomSource};

/// Names for fresh bindings. `o` is the arena array and `e`, `i`, `j`, `k`
/// are reserved for catch clauses and loop counters.
pub const BINDING_NAMES: &[&str] = &["a", "b", "c", "d", "f", "g", "h", "x", "y", "z", "w", "v"];

/// Loop counter names for counted loops.
pub const COUNTER_NAMES: &[&str] = &["i", "j", "k"];

/// The names visible at a point in generated code, plus the syntactic
/// context that decides whether `return`, `break` and `continue` are legal.
///
/// Scopes are values: entering a construct builds a new scope from the
/// parent, which is left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    names: Vec<String>,
    in_function: bool,
    in_loop: bool,
    in_switch: bool,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn in_function(&self) -> bool {
        self.in_function
    }

    pub fn in_loop(&self) -> bool {
        self.in_loop
    }

    /// Whether `break` is legal here.
    pub fn can_break(&self) -> bool {
        self.in_loop || self.in_switch
    }

    /// This scope plus `name`.
    pub fn with(&self, name: &str) -> Self {
        let mut next = self.clone();
        if !next.contains(name) {
            next.names.push(name.to_string());
        }
        next
    }

    /// This scope plus every name in `names`.
    pub fn with_all<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let mut next = self.clone();
        for name in names {
            if !next.contains(name.as_ref()) {
                next.names.push(name.as_ref().to_string());
            }
        }
        next
    }

    /// The scope of a function body with `params`. Loop and switch context
    /// does not cross a function boundary.
    pub fn entering_function<S: AsRef<str>>(&self, params: &[S]) -> Self {
        let mut next = self.with_all(params);
        next.in_function = true;
        next.in_loop = false;
        next.in_switch = false;
        next
    }

    pub fn entering_loop(&self) -> Self {
        let mut next = self.clone();
        next.in_loop = true;
        next
    }

    pub fn entering_switch(&self) -> Self {
        let mut next = self.clone();
        next.in_switch = true;
        next
    }

    /// A random visible name.
    pub fn pick(&self, rng: &mut dyn RandomSource) -> Option<&str> {
        rng.element(&self.names).map(String::as_str)
    }

    /// A visible name that may be assigned to. Loop counters are left
    /// alone so counted loops stay bounded.
    pub fn pick_assignable(&self, rng: &mut dyn RandomSource) -> Option<&str> {
        let names: Vec<&str> = self
            .names
            .iter()
            .map(String::as_str)
            .filter(|n| !COUNTER_NAMES.contains(n))
            .collect();
        rng.element(&names).copied()
    }

    /// A name for a new binding, preferring one not already visible.
    pub fn fresh(&self, rng: &mut dyn RandomSource) -> &'static str {
        let unused: Vec<&'static str> = BINDING_NAMES
            .iter()
            .copied()
            .filter(|n| !self.contains(n))
            .collect();
        match rng.element(&unused) {
            Some(name) => *name,
            None => *rng.index(BINDING_NAMES, &"a"),
        }
    }

    /// `count` distinct fresh names, for parameter lists.
    pub fn fresh_many(&self, rng: &mut dyn RandomSource, count: usize) -> Vec<String> {
        let mut scope = self.clone();
        let mut names = Vec::with_capacity(count);
        for _ in 0..count {
            let name = scope.fresh(rng);
            if names.iter().any(|n: &String| n == name) {
                break;
            }
            scope = scope.with(name);
            names.push(name.to_string());
        }
        names
    }
}
