//! Document tree churn: create, insert, remove, clone and release nodes.
//!
//! Every node the module creates is stored in a fresh arena slot so later
//! turns, from any module, can reach it again. Operations that need an
//! existing node and find none produce nothing for the turn.

use super::materialize;
use crate::arena::{kinds, SlotIndex};
use crate::context::GenContext;
use crate::error::GenerationError;
use crate::fragment::{Fragment, Node};
use crate::module::FuzzModule;
use crate::random::RandomExt;

const TAGS: &[&str] = &[
    "div", "span", "p", "a", "b", "table", "tr", "td", "ul", "li", "iframe", "img", "input",
    "select", "option", "textarea", "video", "audio", "canvas", "svg", "math", "details",
    "summary", "dialog", "template", "slot", "marquee", "style", "script", "object",
];

const TEXTS: &[&str] = &["", "x", "\u{202e}", "\u{fffd}", "&amp;", "<b>", "a b c"];

const INSERTIONS: &[&str] = &["appendChild", "prepend", "append", "before", "after", "replaceWith"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Create,
    CreateText,
    Insert,
    InsertBefore,
    Remove,
    Clone,
    Release,
}

const OPS: &[(u32, Op)] = &[
    (5, Op::Create),
    (2, Op::CreateText),
    (5, Op::Insert),
    (2, Op::InsertBefore),
    (2, Op::Remove),
    (2, Op::Clone),
    (1, Op::Release),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct NodesModule;

impl FuzzModule for NodesModule {
    fn name(&self) -> &str {
        "nodes"
    }

    fn default_weight(&self) -> u32 {
        6
    }

    fn make_command(&self, cx: &mut GenContext<'_>) -> Result<Vec<Fragment>, GenerationError> {
        let op = cx.choice(OPS).copied().unwrap_or(Op::Create);
        let node = match op {
            Op::Create => Some(create(cx)?),
            Op::CreateText => Some(create_text(cx)?),
            Op::Insert => insert(cx),
            Op::InsertBefore => insert_before(cx),
            Op::Remove => remove(cx),
            Op::Clone => clone(cx)?,
            Op::Release => release(cx),
        };
        Ok(node.map(Fragment::dom).into_iter().collect())
    }
}

fn create(cx: &mut GenContext<'_>) -> Result<Node, GenerationError> {
    let tag = *cx.index(TAGS, &"div");
    let value = Node::method(Node::global("document"), "createElement", vec![Node::str(tag)]);
    let (_, node) = materialize(cx, kinds::ELEMENT, value)?;
    Ok(node)
}

fn create_text(cx: &mut GenContext<'_>) -> Result<Node, GenerationError> {
    let text = *cx.index(TEXTS, &"");
    let value = Node::method(Node::global("document"), "createTextNode", vec![Node::str(text)]);
    let (_, node) = materialize(cx, kinds::TEXT, value)?;
    Ok(node)
}

/// An element to insert into: a stored element, or the body.
fn parent(cx: &mut GenContext<'_>) -> SlotIndex {
    match cx.slot_of_kind(&kinds::ELEMENT) {
        Some(index) if !cx.one_in(4) => index,
        _ => {
            let body = &cx.roots().body;
            cx.intern(body)
        }
    }
}

/// Any stored node, element or text.
fn child(cx: &mut GenContext<'_>) -> Option<SlotIndex> {
    if cx.coin() {
        if let Some(index) = cx.slot_of_kind(&kinds::TEXT) {
            return Some(index);
        }
    }
    cx.slot_of_kind(&kinds::ELEMENT)
}

fn insert(cx: &mut GenContext<'_>) -> Option<Node> {
    let parent = parent(cx);
    let child = child(cx)?;
    let method = *cx.index(INSERTIONS, &"appendChild");
    Some(Node::stmt(Node::method(
        Node::Slot(parent),
        method,
        vec![Node::Slot(child)],
    )))
}

fn insert_before(cx: &mut GenContext<'_>) -> Option<Node> {
    let parent = parent(cx);
    let child = child(cx)?;
    let reference = if cx.coin() {
        Node::member(Node::Slot(parent), "firstChild")
    } else {
        Node::text("null")
    };
    Some(Node::stmt(Node::method(
        Node::Slot(parent),
        "insertBefore",
        vec![Node::Slot(child), reference],
    )))
}

fn remove(cx: &mut GenContext<'_>) -> Option<Node> {
    let target = child(cx)?;
    let node = if cx.coin() {
        Node::method(Node::Slot(target), "remove", vec![])
    } else {
        let parent = Node::member(Node::Slot(target), "parentNode");
        Node::method(parent, "removeChild", vec![Node::Slot(target)])
    };
    Some(Node::stmt(node))
}

fn clone(cx: &mut GenContext<'_>) -> Result<Option<Node>, GenerationError> {
    let Some(source) = cx.slot_of_kind(&kinds::ELEMENT) else {
        return Ok(None);
    };
    let deep = if cx.coin() { "true" } else { "false" };
    let value = Node::method(Node::Slot(source), "cloneNode", vec![Node::text(deep)]);
    let (_, node) = materialize(cx, kinds::ELEMENT, value)?;
    Ok(Some(node))
}

/// Drop the generated program's reference to a stored node. The slot is
/// nulled so no later turn refers to it.
fn release(cx: &mut GenContext<'_>) -> Option<Node> {
    let target = child(cx)?;
    if cx.roots().all().iter().any(|root| {
        cx.arena()
            .get(target)
            .is_some_and(|value| std::rc::Rc::ptr_eq(value, root))
    }) {
        return None;
    }
    cx.null_out(target);
    Some(Node::assign(Node::Slot(target), Node::text("null")))
}
