//! Generation context.
//!
//! A [`GenContext`] bundles everything a production or module may touch
//! during one turn: the random source, the reference arena, the grammar and
//! the active modules. The driver builds one per turn from state it owns, so
//! independent drivers never share registries or arenas.

use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::arena::{kinds, Arena, ArenaError, Kind, Reference, Roots, SlotIndex};
use crate::config::GenerationConfig;
use crate::fragment::{Fragment, Node};
use crate::grammar::{Budget, Grammar, Production, Scope, Selection};
use crate::module::ModuleRegistry;
use crate::random::{RandomExt, RandomSource};

/// Counters describing the work done through a context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenStats {
    /// Production invocations dispatched through the context.
    pub calls: usize,
    /// Deepest nesting of dispatched productions.
    pub max_depth: usize,
    /// Times the chaos valve replaced a production choice.
    pub chaos: usize,
    /// Sub-generation requests that were served.
    pub subgenerations: usize,
}

pub struct GenContext<'a> {
    rng: &'a mut dyn RandomSource,
    arena: &'a mut Arena<Reference>,
    roots: &'a Roots,
    grammar: &'a Grammar,
    settings: &'a GenerationConfig,
    modules: Option<(&'a ModuleRegistry, &'a [usize])>,
    nesting: u32,
    depth: usize,
    stats: GenStats,
}

impl RandomSource for GenContext<'_> {
    fn uniform(&mut self, n: u32) -> u32 {
        self.rng.uniform(n)
    }

    fn float(&mut self) -> f64 {
        self.rng.float()
    }
}

impl<'a> GenContext<'a> {
    pub fn new(
        rng: &'a mut dyn RandomSource,
        arena: &'a mut Arena<Reference>,
        roots: &'a Roots,
        grammar: &'a Grammar,
        settings: &'a GenerationConfig,
    ) -> Self {
        Self {
            rng,
            arena,
            roots,
            grammar,
            settings,
            modules: None,
            nesting: 0,
            depth: 0,
            stats: GenStats::default(),
        }
    }

    /// Enable sub-generation over `active`, indices into `modules`.
    pub fn with_modules(mut self, modules: &'a ModuleRegistry, active: &'a [usize]) -> Self {
        self.modules = Some((modules, active));
        self
    }

    pub fn grammar(&self) -> &'a Grammar {
        self.grammar
    }

    pub fn roots(&self) -> &'a Roots {
        self.roots
    }

    pub fn settings(&self) -> &'a GenerationConfig {
        self.settings
    }

    pub fn arena(&self) -> &Arena<Reference> {
        self.arena
    }

    pub fn stats(&self) -> GenStats {
        self.stats
    }

    /// Current sub-generation nesting.
    pub fn nesting(&self) -> u32 {
        self.nesting
    }

    /// Top-level budget for a module command. Nested sub-generation gets
    /// a smaller one.
    pub fn budget(&self) -> Budget {
        Budget::new(self.settings.budget.saturating_sub(2 * self.nesting))
    }

    // ============================================================
    // Production dispatch
    // ============================================================

    /// Run one production, counting the call.
    pub fn produce(&mut self, production: &Production, budget: Budget, scope: &Scope) -> Node {
        self.stats.calls += 1;
        self.depth += 1;
        self.stats.max_depth = self.stats.max_depth.max(self.depth);
        trace!(production = production.name, %budget, "produce");
        let node = (production.produce)(self, budget, scope);
        self.depth -= 1;
        node
    }

    /// Run a production by name. Unknown names produce nothing.
    pub fn produce_named(&mut self, name: &str, budget: Budget, scope: &Scope) -> Node {
        let grammar = self.grammar;
        match grammar.get(name) {
            Some(production) => self.produce(production, budget, scope),
            None => {
                debug!(production = name, "unknown production");
                Node::Seq(Vec::new())
            }
        }
    }

    fn chaos(&mut self, budget: Budget) -> bool {
        let rate = self.settings.chaos_rate;
        if budget.is_exhausted() || rate == 0 || !self.one_in(rate) {
            return false;
        }
        self.stats.chaos += 1;
        true
    }

    /// Any production at all, chosen uniformly.
    pub fn any(&mut self, budget: Budget, scope: &Scope) -> Node {
        let grammar = self.grammar;
        match grammar.choose_any(self) {
            Some(production) => self.produce(production, budget, scope),
            None => Node::Seq(Vec::new()),
        }
    }

    /// A leaf expression.
    pub fn term(&mut self, budget: Budget, scope: &Scope) -> Node {
        let grammar = self.grammar;
        match grammar.choose(self, Selection::Term) {
            Some(production) => self.produce(production, budget, scope),
            None => Node::Number(0.0),
        }
    }

    /// An expression. Exhausted budgets yield a term.
    pub fn expr(&mut self, budget: Budget, scope: &Scope) -> Node {
        if budget.is_exhausted() {
            return self.term(budget, scope);
        }
        if self.chaos(budget) {
            return self.any(budget, scope);
        }
        let grammar = self.grammar;
        match grammar.choose(self, Selection::Expr) {
            Some(production) => self.produce(production, budget, scope),
            None => self.term(budget, scope),
        }
    }

    /// A statement. Exhausted budgets yield a term as an expression
    /// statement.
    pub fn stmt(&mut self, budget: Budget, scope: &Scope) -> Node {
        if budget.is_exhausted() {
            return Node::stmt(self.term(budget, scope));
        }
        if self.chaos(budget) {
            return statement(self.any(budget, scope));
        }
        let grammar = self.grammar;
        match grammar.choose(self, Selection::Stmt) {
            Some(production) => self.produce(production, budget, scope),
            None => Node::stmt(self.term(budget, scope)),
        }
    }

    /// An expression one level below `budget`.
    pub fn child_expr(&mut self, budget: Budget, scope: &Scope) -> Node {
        let child = budget.descend(self);
        self.expr(child, scope)
    }

    /// A statement list one level below `budget`. Declarations extend the
    /// scope of the statements that follow them.
    pub fn stmts(&mut self, budget: Budget, scope: &Scope) -> Vec<Node> {
        let max = self.settings.max_statements.max(1);
        let count = if budget.is_exhausted() {
            1
        } else {
            self.range(1, max)
        };
        let mut scope = scope.clone();
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let child = budget.descend(self);
            let node = self.stmt(child, &scope);
            if let Some(name) = declared_name(&node) {
                scope = scope.with(name);
            }
            out.push(node);
        }
        out
    }

    // ============================================================
    // Arena access
    // ============================================================

    /// A random filled slot of `kind`.
    pub fn slot_of_kind(&mut self, kind: &Kind) -> Option<SlotIndex> {
        self.arena.any_of_kind(&mut *self.rng, kind)
    }

    /// A random filled slot of any kind.
    pub fn any_slot(&mut self) -> Option<SlotIndex> {
        self.arena.any_filled(&mut *self.rng)
    }

    pub fn reserve(&mut self) -> SlotIndex {
        self.arena.reserve()
    }

    pub fn fill(&mut self, index: SlotIndex, value: Rc<Reference>) -> Result<(), ArenaError> {
        self.arena.fill(index, value)
    }

    /// Append a new value and return its slot.
    pub fn store(&mut self, value: Rc<Reference>) -> SlotIndex {
        self.arena.push(value)
    }

    /// Append a shared value unless it is already present; either way
    /// return its slot.
    pub fn intern(&mut self, value: &Rc<Reference>) -> SlotIndex {
        match self.arena.find_index(value) {
            Some(index) => index,
            None => self.arena.push(Rc::clone(value)),
        }
    }

    pub fn null_out(&mut self, index: SlotIndex) -> bool {
        self.arena.null_out(index)
    }

    /// Reserve a slot for `value` and return `o[i] = value`.
    pub fn store_expr(&mut self, index: SlotIndex, value: Node) -> Node {
        let kind = discover_kind(&value);
        let reference = Reference::new(kind, crate::render::render_expr(&value));
        if let Err(err) = self.fill(index, reference) {
            warn!(%err, "store into arena slot failed");
        }
        Node::assign(Node::Slot(index), value)
    }

    // ============================================================
    // Sub-generation
    // ============================================================

    /// Whether [`GenContext::subgenerate`] would produce anything.
    pub fn can_subgenerate(&self) -> bool {
        match self.modules {
            Some((_, active)) => {
                !active.is_empty() && self.nesting < self.settings.max_subgeneration_depth
            }
            None => false,
        }
    }

    /// Run one command from a randomly chosen active module, one nesting
    /// level deeper. Returns nothing once the nesting limit is reached or
    /// when the module fails.
    pub fn subgenerate(&mut self) -> Vec<Fragment> {
        if !self.can_subgenerate() {
            return Vec::new();
        }
        let Some((modules, active)) = self.modules else {
            return Vec::new();
        };
        let Some(&index) = self.rng.element(active) else {
            return Vec::new();
        };
        let Some(module) = modules.get(index) else {
            return Vec::new();
        };

        self.nesting += 1;
        self.stats.subgenerations += 1;
        let result = module.make_command(self);
        self.nesting -= 1;

        match result {
            Ok(fragments) => fragments,
            Err(err) => {
                warn!(module = module.name(), %err, "sub-generation failed");
                Vec::new()
            }
        }
    }
}

/// The name a statement introduces into the following siblings' scope.
pub fn declared_name(node: &Node) -> Option<&str> {
    match node {
        Node::Var { name, .. } => Some(name),
        Node::Function {
            name: Some(name), ..
        } => Some(name),
        _ => None,
    }
}

/// Put a node produced by a registry-wide pick into statement position.
fn statement(node: Node) -> Node {
    match node {
        Node::Seq(_) | Node::Function { name: Some(_), .. } => node,
        node if node.is_statement() => node,
        node => Node::stmt(node),
    }
}

/// Best-effort kind of the value an expression evaluates to.
fn discover_kind(node: &Node) -> Kind {
    match node {
        Node::Function { .. } | Node::Arrow { .. } => kinds::FUNCTION,
        Node::Array(_) | Node::Object(_) | Node::New { .. } => kinds::OBJECT,
        _ => kinds::VALUE,
    }
}
