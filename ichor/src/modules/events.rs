//! Event listeners and dispatch.
//!
//! Listener bodies are either sub-generated output from the active modules
//! or a grammar statement list with the handler's parameter in scope.

use super::{embed, materialize};
use crate::arena::{kinds, SlotIndex};
use crate::context::GenContext;
use crate::error::GenerationError;
use crate::fragment::{Fragment, Node};
use crate::grammar::Scope;
use crate::module::FuzzModule;
use crate::random::RandomExt;

const EVENT_TYPES: &[&str] = &[
    "click",
    "input",
    "focus",
    "blur",
    "load",
    "error",
    "scroll",
    "resize",
    "toggle",
    "animationend",
    "transitionend",
    "DOMContentLoaded",
    "DOMNodeInserted",
    "selectionchange",
    "custom",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Listen,
    Dispatch,
    Click,
    Unlisten,
}

const OPS: &[(u32, Op)] = &[
    (4, Op::Listen),
    (3, Op::Dispatch),
    (1, Op::Click),
    (1, Op::Unlisten),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct EventsModule;

impl FuzzModule for EventsModule {
    fn name(&self) -> &str {
        "events"
    }

    fn default_weight(&self) -> u32 {
        3
    }

    fn make_command(&self, cx: &mut GenContext<'_>) -> Result<Vec<Fragment>, GenerationError> {
        let target = target(cx);
        let event_type = *cx.index(EVENT_TYPES, &"click");
        match cx.choice(OPS).copied().unwrap_or(Op::Listen) {
            Op::Listen => listen(cx, target, event_type),
            Op::Dispatch => dispatch(cx, target, event_type),
            Op::Click => Ok(vec![Fragment::dom(Node::stmt(Node::method(
                Node::Slot(target),
                "click",
                vec![],
            )))]),
            Op::Unlisten => Ok(unlisten(cx, target, event_type)),
        }
    }
}

/// A stored element, or the window or document.
fn target(cx: &mut GenContext<'_>) -> SlotIndex {
    if !cx.one_in(4) {
        if let Some(index) = cx.slot_of_kind(&kinds::ELEMENT) {
            return index;
        }
    }
    let roots = cx.roots();
    let root = if cx.coin() { &roots.window } else { &roots.document };
    cx.intern(root)
}

/// Store a handler in the arena, then attach it.
fn listen(
    cx: &mut GenContext<'_>,
    target: SlotIndex,
    event_type: &str,
) -> Result<Vec<Fragment>, GenerationError> {
    let param = Scope::new().fresh(cx).to_string();
    let scope = Scope::new().entering_function(&[param.as_str()]);

    let mut body = Vec::new();
    if cx.can_subgenerate() && cx.coin() {
        body = embed(cx.subgenerate());
    }
    if body.is_empty() {
        let budget = cx.budget().descend_by(2);
        body = cx.stmts(budget, &scope);
    }

    let handler = Node::Function {
        name: None,
        params: vec![param],
        body,
    };
    let (slot, stored) = materialize(cx, kinds::FUNCTION, handler)?;
    let mut args = vec![Node::str(event_type), Node::Slot(slot)];
    if cx.one_in(3) {
        args.push(Node::text("true"));
    }
    let attach = Node::method(Node::Slot(target), "addEventListener", args);
    Ok(vec![
        Fragment::script(Node::stmt(stored)),
        Fragment::dom(Node::stmt(attach)),
    ])
}

/// Dispatch a stored event, creating one first when none fits.
fn dispatch(
    cx: &mut GenContext<'_>,
    target: SlotIndex,
    event_type: &str,
) -> Result<Vec<Fragment>, GenerationError> {
    let mut out = Vec::new();
    let event = match cx.slot_of_kind(&kinds::EVENT) {
        Some(index) if cx.coin() => index,
        _ => {
            let options = Node::Object(vec![
                ("bubbles".to_string(), Node::text(bool_text(cx.coin()))),
                ("cancelable".to_string(), Node::text(bool_text(cx.coin()))),
            ]);
            let value = Node::New {
                callee: Box::new(Node::global("Event")),
                args: vec![Node::str(event_type), options],
            };
            let (index, stored) = materialize(cx, kinds::EVENT, value)?;
            out.push(Fragment::dom(Node::stmt(stored)));
            index
        }
    };
    out.push(Fragment::dom(Node::stmt(Node::method(
        Node::Slot(target),
        "dispatchEvent",
        vec![Node::Slot(event)],
    ))));
    Ok(out)
}

fn unlisten(cx: &mut GenContext<'_>, target: SlotIndex, event_type: &str) -> Vec<Fragment> {
    let Some(handler) = cx.slot_of_kind(&kinds::FUNCTION) else {
        return Vec::new();
    };
    vec![Fragment::dom(Node::stmt(Node::method(
        Node::Slot(target),
        "removeEventListener",
        vec![Node::str(event_type), Node::Slot(handler)],
    )))]
}

fn bool_text(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing::command;

    #[test]
    fn test_listeners_are_stored_before_use() {
        let mut seen = 0;
        for seed in 0..80 {
            let (fragments, arena) = command(&EventsModule, seed);
            let texts: Vec<String> = fragments.iter().map(Fragment::text).collect();
            if let Some(attach) = texts.iter().position(|t| t.contains("addEventListener")) {
                seen += 1;
                assert_eq!(attach, 1);
                let stored = &texts[0];
                assert!(stored.starts_with("(o["), "{}", stored);
                let close = stored.find(']').unwrap();
                let index: usize = stored[3..close].parse().unwrap();
                assert!(stored[close..].starts_with("] = function"), "{}", stored);
                assert!(texts[1].contains(&format!("o[{}]", index)));
                let slot = arena.slot(SlotIndex::new(index)).unwrap();
                assert_eq!(slot.kind(), Some(&kinds::FUNCTION));
            }
        }
        assert!(seen > 0);
    }

    #[test]
    fn test_dispatch_uses_stored_event() {
        for seed in 0..80 {
            let (fragments, _) = command(&EventsModule, seed);
            if let Some(last) = fragments.last() {
                let text = last.text();
                if text.contains("dispatchEvent") {
                    assert!(text.contains("dispatchEvent(o[4])"), "{}", text);
                    assert!(fragments[0].text().contains("new Event("));
                }
            }
        }
    }

    #[test]
    fn test_unlisten_without_handler_is_noop() {
        for seed in 0..80 {
            let (fragments, _) = command(&EventsModule, seed);
            assert!(!fragments.iter().any(|f| f.text().contains("removeEventListener")));
        }
    }
}
