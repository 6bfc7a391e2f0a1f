//! Compound expression productions.
//!
//! Every child is produced with a budget strictly below the parent's.
//! Productions that embed bodies which recurse again (functions, arrows,
//! eval) cut the budget by more than one level.

use super::terms::GLOBALS;
use super::{Budget, Production, ProductionKind, Scope};
use crate::context::GenContext;
use crate::fragment::Node;
use crate::random::{RandomExt, RandomSource};
use crate::render;

const UNARY_OPS: &[&str] = &["!", "~", "-", "+", "typeof", "void", "delete"];

const BINARY_OPS: &[&str] = &[
    "+", "-", "*", "/", "%", "**", "==", "===", "!=", "!==", "<", "<=", ">", ">=", "<<", ">>",
    ">>>", "&", "|", "^", "&&", "||", "??", "in", "instanceof",
];

const ASSIGN_OPS: &[&str] = &["=", "=", "=", "+=", "-=", "*=", "|=", "<<=", "&&=", "||=", "??="];

pub(super) const PROPERTIES: &[&str] = &[
    "length",
    "prototype",
    "constructor",
    "__proto__",
    "x",
    "0",
    "name",
    "valueOf",
    "toString",
    "then",
    "size",
    "buffer",
];

const METHODS: &[&str] = &[
    "toString", "valueOf", "slice", "concat", "map", "filter", "push", "pop", "indexOf", "sort",
    "reverse", "join", "at", "includes", "keys", "apply", "call", "bind", "fill", "set", "get",
    "has",
];

const STATIC_CALLS: &[(&str, &str)] = &[
    ("Math", "max"),
    ("Math", "floor"),
    ("Math", "pow"),
    ("JSON", "stringify"),
    ("JSON", "parse"),
    ("Object", "keys"),
    ("Object", "freeze"),
    ("Object", "getOwnPropertyNames"),
    ("Object", "getPrototypeOf"),
    ("Object", "setPrototypeOf"),
    ("Array", "from"),
    ("Array", "isArray"),
    ("String", "fromCharCode"),
    ("Reflect", "ownKeys"),
    ("Reflect", "apply"),
    ("Number", "isInteger"),
    ("Symbol", "for"),
];

const CONSTRUCTORS: &[&str] = &[
    "Array",
    "Object",
    "Map",
    "Set",
    "WeakMap",
    "Uint8Array",
    "Float64Array",
    "ArrayBuffer",
    "Date",
    "RegExp",
    "Error",
    "Proxy",
    "Promise",
    "Function",
];

const TYPE_NAMES: &[&str] = &[
    "undefined",
    "object",
    "boolean",
    "number",
    "string",
    "function",
    "symbol",
    "bigint",
];

pub(super) static PRODUCTIONS: &[Production] = &[
    Production::new("unary", ProductionKind::Expr, 2, unary),
    Production::new("binary", ProductionKind::Expr, 4, binary),
    Production::new("assign", ProductionKind::Expr, 3, assign),
    Production::new("conditional", ProductionKind::Expr, 1, conditional),
    Production::new("call", ProductionKind::Expr, 2, call),
    Production::new("method_call", ProductionKind::Expr, 3, method_call),
    Production::new("member", ProductionKind::Expr, 3, member),
    Production::new("index", ProductionKind::Expr, 2, index),
    Production::new("new", ProductionKind::Expr, 2, construct),
    Production::new("array", ProductionKind::Expr, 2, array),
    Production::new("object", ProductionKind::Expr, 2, object),
    Production::new("function", ProductionKind::Expr, 1, function),
    Production::new("arrow", ProductionKind::Expr, 1, arrow),
    Production::new("comma", ProductionKind::Expr, 1, comma),
    Production::new("typeof_test", ProductionKind::Expr, 1, typeof_test),
    Production::new("eval", ProductionKind::Expr, 1, eval),
    Production::new("store", ProductionKind::Expr, 2, store),
];

/// Up to `max` argument expressions.
fn args(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope, max: u32) -> Vec<Node> {
    let count = cx.range(0, max);
    (0..count).map(|_| cx.child_expr(budget, scope)).collect()
}

fn unary(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let op = *cx.index(UNARY_OPS, &"!");
    Node::Unary {
        op,
        operand: Box::new(cx.child_expr(budget, scope)),
    }
}

fn binary(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let op = *cx.index(BINARY_OPS, &"+");
    let lhs = cx.child_expr(budget, scope);
    let rhs = cx.child_expr(budget, scope);
    Node::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// An assignable place: a visible binding, an arena slot, or a property
/// of either or of a global.
fn place(cx: &mut GenContext<'_>, scope: &Scope) -> Node {
    let base = match cx.uniform(3) {
        0 => scope.pick_assignable(cx).map(Node::ident),
        1 => cx.any_slot().map(Node::Slot),
        _ => None,
    };
    match base {
        Some(base) if cx.coin() => base,
        Some(base) => Node::member(base, *cx.index(PROPERTIES, &"x")),
        None => Node::member(
            Node::global(*cx.index(GLOBALS, &"Math")),
            *cx.index(PROPERTIES, &"x"),
        ),
    }
}

fn assign(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let op = *cx.index(ASSIGN_OPS, &"=");
    let target = place(cx, scope);
    let value = cx.child_expr(budget, scope);
    Node::Assign {
        op,
        target: Box::new(target),
        value: Box::new(value),
    }
}

fn conditional(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let test = cx.child_expr(budget, scope);
    let then = cx.child_expr(budget, scope);
    let otherwise = cx.child_expr(budget, scope);
    Node::Conditional {
        test: Box::new(test),
        then: Box::new(then),
        otherwise: Box::new(otherwise),
    }
}

fn call(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let callee = cx.child_expr(budget, scope);
    let args = args(cx, budget, scope, 3);
    Node::call(callee, args)
}

/// A built-in static call, or a method call on a generated receiver.
fn method_call(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    if cx.coin() {
        let (object, method) = *cx.index(STATIC_CALLS, &("Math", "max"));
        let args = args(cx, budget, scope, 3);
        Node::method(Node::global(object), method, args)
    } else {
        let receiver = cx.child_expr(budget, scope);
        let method = *cx.index(METHODS, &"toString");
        let args = args(cx, budget, scope, 2);
        Node::method(receiver, method, args)
    }
}

fn member(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let object = cx.child_expr(budget, scope);
    Node::member(object, *cx.index(PROPERTIES, &"length"))
}

fn index(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let object = cx.child_expr(budget, scope);
    let index = cx.child_expr(budget, scope);
    Node::Index {
        object: Box::new(object),
        index: Box::new(index),
    }
}

fn construct(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let callee = Node::global(*cx.index(CONSTRUCTORS, &"Object"));
    let args = args(cx, budget, scope, 2);
    Node::New {
        callee: Box::new(callee),
        args,
    }
}

fn array(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    Node::Array(args(cx, budget, scope, 4))
}

fn object(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let count = cx.range(0, 3);
    let props = (0..count)
        .map(|_| {
            let key = cx.index(PROPERTIES, &"x").to_string();
            (key, cx.child_expr(budget, scope))
        })
        .collect();
    Node::Object(props)
}

/// A function expression. The body sees the parameters and, when the
/// function is named, its own name.
fn function(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let body_budget = budget.descend_by(2);
    let name = if cx.one_in(4) {
        Some(scope.fresh(cx).to_string())
    } else {
        None
    };
    let outer = match &name {
        Some(name) => scope.with(name),
        None => scope.clone(),
    };
    let count = cx.range(0, 2) as usize;
    let params = outer.fresh_many(cx, count);
    let inner = outer.entering_function(params.as_slice());
    let mut body = cx.stmts(body_budget, &inner);
    if cx.coin() {
        let value = cx.child_expr(body_budget, &inner);
        body.push(Node::Return(Some(Box::new(value))));
    }
    Node::Function { name, params, body }
}

fn arrow(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let body_budget = budget.descend_by(2);
    let count = cx.range(0, 2) as usize;
    let params = scope.fresh_many(cx, count);
    let body = if cx.coin() {
        cx.child_expr(body_budget, &scope.with_all(params.as_slice()))
    } else {
        Node::Block(cx.stmts(body_budget, &scope.entering_function(params.as_slice())))
    };
    Node::Arrow {
        params,
        body: Box::new(body),
    }
}

fn comma(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let count = cx.range(2, 3);
    Node::Comma((0..count).map(|_| cx.child_expr(budget, scope)).collect())
}

fn typeof_test(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let operand = cx.child_expr(budget, scope);
    let op = if cx.coin() { "==" } else { "===" };
    Node::Binary {
        op,
        lhs: Box::new(Node::Unary {
            op: "typeof",
            operand: Box::new(operand),
        }),
        rhs: Box::new(Node::str(*cx.index(TYPE_NAMES, &"object"))),
    }
}

/// `eval` of generated code: either a sub-generated module command or
/// statements over the current scope, which direct eval can see.
fn eval(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let body_budget = budget.descend_by(3);
    let mut code = String::new();
    if cx.can_subgenerate() && cx.coin() {
        let fragments = cx.subgenerate();
        code = fragments
            .iter()
            .map(|f| f.text())
            .collect::<Vec<_>>()
            .join("\n");
    }
    if code.is_empty() {
        code = cx
            .stmts(body_budget, scope)
            .iter()
            .map(render::render)
            .collect::<Vec<_>>()
            .join("\n");
    }
    Node::call(Node::global("eval"), vec![Node::Str(code)])
}

/// `o[i] = expr`, recording the value in a freshly reserved slot.
fn store(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    let index = cx.reserve();
    let value = cx.child_expr(budget, scope);
    cx.store_expr(index, value)
}
