//! Leaf productions. None of these recurse.

use super::{Budget, Production, ProductionKind, Scope};
use crate::context::GenContext;
use crate::fragment::Node;
use crate::random::{RandomExt, RandomSource};

/// Opaque privileged host actions and their arity. Generated code calls
/// these by name; whether they exist is up to the engine.
pub const HOST_ACTIONS: &[(&str, u32)] = &[
    ("gc", 0),
    ("minorgc", 0),
    ("schedulegc", 1),
    ("gczeal", 1),
    ("verifyprebarriers", 0),
    ("oomAfterAllocations", 1),
    ("setJitCompilerOption", 2),
    ("dumpHeap", 0),
    ("quit", 0),
];

/// Boundary numbers: sign, word-size and precision edges.
const NUMBERS: &[f64] = &[
    0.0,
    -0.0,
    1.0,
    -1.0,
    0.5,
    2.0,
    3.0,
    42.0,
    255.0,
    256.0,
    65535.0,
    65536.0,
    2147483647.0,
    2147483648.0,
    -2147483648.0,
    4294967295.0,
    4294967296.0,
    9007199254740991.0,
    9007199254740992.0,
    1e21,
    5e-324,
    1.7976931348623157e308,
    f64::NAN,
    f64::INFINITY,
    f64::NEG_INFINITY,
];

const STRINGS: &[&str] = &[
    "",
    "a",
    "0",
    "-1",
    "length",
    "constructor",
    "prototype",
    "__proto__",
    "toString",
    "valueOf",
    "\u{0}",
    "\u{fffe}",
    "\u{1d4b3}",
    "<div>",
    "undefined",
];

const CONSTANTS: &[&str] = &["true", "false", "null", "undefined", "this", "arguments"];

pub(super) const GLOBALS: &[&str] = &[
    "Math",
    "JSON",
    "Object",
    "Array",
    "String",
    "Number",
    "Boolean",
    "Symbol",
    "Reflect",
    "Proxy",
    "Promise",
    "Map",
    "Set",
    "WeakMap",
    "WeakRef",
    "ArrayBuffer",
    "Uint8Array",
    "Int32Array",
    "Float64Array",
    "DataView",
    "Date",
    "RegExp",
    "Error",
    "Function",
    "globalThis",
    "document",
    "window",
];

const REGEXPS: &[&str] = &[
    "/a|b/g",
    "/(?:)/",
    "/\\w+/gi",
    "/[^]/u",
    "/^$/m",
    "/(.)\\1/y",
    "/(?<x>a)\\k<x>/",
    "/[\\u0000-\\uffff]/s",
];

pub(super) static PRODUCTIONS: &[Production] = &[
    Production::new("number", ProductionKind::Term, 4, number),
    Production::new("string", ProductionKind::Term, 2, string),
    Production::new("constant", ProductionKind::Term, 2, constant),
    Production::new("binding", ProductionKind::Term, 4, binding),
    Production::new("global", ProductionKind::Term, 2, global),
    Production::new("regexp", ProductionKind::Term, 1, regexp),
    Production::new("slot", ProductionKind::Term, 3, slot),
    Production::new("host_action", ProductionKind::Term, 1, host_action),
];

fn number(cx: &mut GenContext<'_>, _: Budget, _: &Scope) -> Node {
    if cx.one_in(8) {
        return Node::Number(f64::from(cx.uniform(1000)));
    }
    Node::Number(*cx.index(NUMBERS, &0.0))
}

fn string(cx: &mut GenContext<'_>, _: Budget, _: &Scope) -> Node {
    Node::str(*cx.index(STRINGS, &""))
}

fn constant(cx: &mut GenContext<'_>, _: Budget, _: &Scope) -> Node {
    Node::text(*cx.index(CONSTANTS, &"undefined"))
}

/// A visible binding, or a number when nothing is in scope.
fn binding(cx: &mut GenContext<'_>, budget: Budget, scope: &Scope) -> Node {
    match scope.pick(cx) {
        Some(name) => Node::ident(name),
        None => number(cx, budget, scope),
    }
}

fn global(cx: &mut GenContext<'_>, _: Budget, _: &Scope) -> Node {
    Node::global(*cx.index(GLOBALS, &"Math"))
}

fn regexp(cx: &mut GenContext<'_>, _: Budget, _: &Scope) -> Node {
    Node::text(*cx.index(REGEXPS, &"/(?:)/"))
}

/// An earlier value from the arena, or a root when the arena is empty.
fn slot(cx: &mut GenContext<'_>, _: Budget, _: &Scope) -> Node {
    match cx.any_slot() {
        Some(index) => Node::Slot(index),
        None => Node::global("document"),
    }
}

/// A call to an opaque host action with numeric arguments.
fn host_action(cx: &mut GenContext<'_>, _: Budget, _: &Scope) -> Node {
    let (name, arity) = *cx.index(HOST_ACTIONS, &("gc", 0));
    let args = (0..arity)
        .map(|_| Node::Number(f64::from(cx.uniform(10))))
        .collect();
    Node::call(Node::global(name), args)
}
