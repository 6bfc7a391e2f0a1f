//! Statement productions.

use super::scope::COUNTER_NAMES;
use super::{Budget, Production, ProductionKind, Scope};
use crate::context::GenContext;
use crate::fragment::Node;
use crate::random::{RandomExt, RandomSource};

const DECL_KEYWORDS: &[&str] = &["var", "let", "const"];

const LOOP_LIMITS: &[u32] = &[0, 1, 2, 3, 5, 10, 100];

/// Marks loops whose exit depends on generated code.
pub const INFINITE_LOOP_MARKER: &str = "infloop";

pub(super) static PRODUCTIONS: &[Production] = &[
    Production::new("expr_stmt", ProductionKind::Stmt, 6, expr_stmt),
    Production::new("var_decl", ProductionKind::Stmt, 4, var_decl),
    Production::new("block", ProductionKind::Stmt, 1, block),
    Production::new("if", ProductionKind::Stmt, 3, if_stmt),
    Production::new("for", ProductionKind::Stmt, 2, for_counted),
    Production::new("for_of", ProductionKind::Stmt, 1, for_of),
    Production::new("while", ProductionKind::Stmt, 1, while_loop),
    Production::new("try", ProductionKind::Stmt, 2, try_stmt),
    Production::new("switch", ProductionKind::Stmt, 1, switch),
    Production::new("function_decl", ProductionKind::Stmt, 1, function_decl),
    Production::new("return", ProductionKind::Stmt, 1, return_stmt),
    Production::new("break", ProductionKind::Stmt, 1, break_stmt),
    Production::new("continue", ProductionKind::Stmt, 1, continue_stmt),
    Production::new("throw", ProductionKind::Stmt, 1, throw),
];

fn expr_stmt(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    Node::stmt(cx.child_expr(budget, scope))
}

/// A declaration. The new name is visible only to following statements,
/// so the initializer uses the outer scope.
fn var_decl(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let keyword = *cx.index(DECL_KEYWORDS, &"var");
    let name = scope.fresh(cx).to_string();
    let init = if keyword == "const" || cx.one_in(4) {
        Some(Box::new(cx.child_expr(budget, scope)))
    } else {
        None
    };
    Node::Var {
        keyword,
        name,
        init,
    }
}

fn block(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    Node::Block(cx.stmts(budget, scope))
}

fn if_stmt(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let test = cx.child_expr(budget, scope);
    let then = cx.stmts(budget, scope);
    let otherwise = if cx.coin() {
        Some(cx.stmts(budget, scope))
    } else {
        None
    };
    Node::If {
        test: Box::new(test),
        then,
        otherwise,
    }
}

fn for_counted(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let unused: Vec<&str> = COUNTER_NAMES
        .iter()
        .copied()
        .filter(|n| !scope.contains(n))
        .collect();
    let var = match cx.element(&unused) {
        Some(name) => name.to_string(),
        None => cx.index(COUNTER_NAMES, &"i").to_string(),
    };
    let limit = *cx.index(LOOP_LIMITS, &1);
    let body = cx.stmts(budget, &scope.with(&var).entering_loop());
    Node::For { var, limit, body }
}

fn for_of(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let keyword = *cx.index(DECL_KEYWORDS, &"let");
    let binding = scope.fresh(cx).to_string();
    let iterable = if cx.coin() {
        let count = cx.range(0, 3);
        Node::Array((0..count).map(|_| cx.child_expr(budget, scope)).collect())
    } else {
        cx.child_expr(budget, scope)
    };
    let body = cx.stmts(budget, &scope.with(&binding).entering_loop());
    Node::ForOf {
        keyword,
        binding,
        iterable: Box::new(iterable),
        body,
    }
}

/// A `while` loop on a generated condition, tagged so the classifier
/// keeps it out of execution.
fn while_loop(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let test = cx.child_expr(budget, scope);
    let body = cx.stmts(budget, &scope.entering_loop());
    Node::Seq(vec![
        Node::Comment(INFINITE_LOOP_MARKER.to_string()),
        Node::While {
            test: Box::new(test),
            body,
        },
    ])
}

fn try_stmt(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let block = cx.stmts(budget, scope);
    let shape = cx.uniform(3);
    let catch = if shape != 1 {
        if cx.one_in(4) {
            Some((None, cx.stmts(budget, scope)))
        } else {
            Some((Some("e".to_string()), cx.stmts(budget, &scope.with("e"))))
        }
    } else {
        None
    };
    let finally = if shape != 0 {
        Some(cx.stmts(budget, scope))
    } else {
        None
    };
    Node::Try {
        block,
        catch,
        finally,
    }
}

fn switch(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let discriminant = cx.child_expr(budget, scope);
    let inner = scope.entering_switch();
    let count = cx.range(1, 3);
    let mut cases: Vec<(Option<Node>, Vec<Node>)> = (0..count)
        .map(|_| {
            let test = cx.term(budget, scope);
            (Some(test), cx.stmts(budget, &inner))
        })
        .collect();
    if cx.coin() {
        let body = cx.stmts(budget, &inner);
        cases.push((None, body));
    }
    Node::Switch {
        discriminant: Box::new(discriminant),
        cases,
    }
}

/// A function declaration. The name is visible to following statements
/// and inside the body.
fn function_decl(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let body_budget = budget.descend_by(2);
    let name = scope.fresh(cx).to_string();
    let outer = scope.with(&name);
    let count = cx.range(0, 3) as usize;
    let params = outer.fresh_many(cx, count);
    let body = cx.stmts(body_budget, &outer.entering_function(params.as_slice()));
    Node::Function {
        name: Some(name),
        params,
        body,
    }
}

fn return_stmt(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    if !scope.in_function() {
        return expr_stmt(cx, budget, scope);
    }
    if cx.one_in(3) {
        Node::Return(None)
    } else {
        Node::Return(Some(Box::new(cx.child_expr(budget, scope))))
    }
}

fn break_stmt(_: &mut GenContext<'_>, _: Budget, scope: &Scope) -> Node {
    if scope.can_break() {
        Node::Break
    } else {
        Node::Empty
    }
}

fn continue_stmt(_: &mut GenContext<'_>, _: Budget, scope: &Scope) -> Node {
    if scope.in_loop() {
        Node::Continue
    } else {
        Node::Empty
    }
}

fn throw(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    Node::Throw(Box::new(cx.child_expr(budget, scope)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{Arena, Roots};
    use crate::config::GenerationConfig;
    use crate::grammar::Grammar;
    use crate::random::SeededRandom;
    use crate::render::render;

    fn run(name: &str, seed: u64, scope: &Scope) -> Node {
        let production = PRODUCTIONS.iter().find(|p| p.name == name).unwrap();
        let mut rng = SeededRandom::from_seed(seed);
        let mut arena = Arena::new();
        let roots = Roots::new();
        let grammar = Grammar::standard();
        let settings = GenerationConfig::default();
        let mut cx = GenContext::new(&mut rng, &mut arena, &roots, &grammar, &settings);
        cx.produce(production, Budget::new(4), scope)
    }

    #[test]
    fn test_return_outside_function_is_expression() {
        for seed in 0..20 {
            let node = run("return", seed, &Scope::new());
            assert!(matches!(node, Node::ExprStmt(_)));
        }
        let node = run("return", 1, &Scope::new().entering_function(&["p"]));
        assert!(matches!(node, Node::Return(_)));
    }

    #[test]
    fn test_break_and_continue_need_context() {
        assert_eq!(run("break", 0, &Scope::new()), Node::Empty);
        assert_eq!(run("break", 0, &Scope::new().entering_switch()), Node::Break);
        assert_eq!(run("continue", 0, &Scope::new().entering_switch()), Node::Empty);
        assert_eq!(run("continue", 0, &Scope::new().entering_loop()), Node::Continue);
    }

    #[test]
    fn test_while_is_marked() {
        let text = render(&run("while", 7, &Scope::new()));
        assert!(text.starts_with("/*infloop*/\nwhile ("), "{}", text);
    }

    #[test]
    fn test_try_has_handler() {
        for seed in 0..30 {
            match run("try", seed, &Scope::new()) {
                Node::Try { catch, finally, .. } => {
                    assert!(catch.is_some() || finally.is_some());
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_const_always_initialized() {
        for seed in 0..50 {
            if let Node::Var { keyword, init, .. } = run("var_decl", seed, &Scope::new()) {
                if keyword == "const" {
                    assert!(init.is_some());
                }
            }
        }
    }

    #[test]
    fn test_for_counter_avoids_visible_counter() {
        let scope = Scope::new().with_all(&["i", "j"]);
        for seed in 0..20 {
            match run("for", seed, &scope) {
                Node::For { var, .. } => assert_eq!(var, "k"),
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
