//! Generic attribute mutation.
//!
//! Attribute names map to nested [`Pick`] tables. A table entry can be a
//! fixed value, a generator, or another table, so a small amount of data
//! describes a wide spread of values.

use std::sync::LazyLock;

use crate::arena::{kinds, SlotIndex};
use crate::context::GenContext;
use crate::error::GenerationError;
use crate::fragment::{Fragment, Node};
use crate::module::FuzzModule;
use crate::random::{pick, Pick, RandomExt, RandomSource};

fn length(rng: &mut dyn RandomSource) -> String {
    let units = ["px", "em", "%", "vh", ""];
    let unit = *rng.index(&units, &"px");
    format!("{}{}", rng.uniform(2000), unit)
}

fn integer(rng: &mut dyn RandomSource) -> String {
    let edges = ["-1", "0", "1", "2147483647", "-2147483648", "4294967296"];
    if rng.coin() {
        rng.index(&edges, &"0").to_string()
    } else {
        rng.uniform(100).to_string()
    }
}

fn color(rng: &mut dyn RandomSource) -> String {
    format!("#{:06x}", rng.uniform(0x100_0000))
}

fn style_width(rng: &mut dyn RandomSource) -> String {
    format!("width: {}", length(rng))
}

fn generic() -> Pick<String> {
    Pick::Any(vec![
        Pick::values(["", "auto", "none", "inherit", "initial", "x"].map(String::from)),
        Pick::Gen(integer),
        Pick::Gen(length),
    ])
}

static ATTRIBUTES: LazyLock<Vec<(&'static str, Pick<String>)>> = LazyLock::new(|| {
    vec![
        ("id", Pick::values(["a", "b", "x", ""].map(String::from))),
        ("class", Pick::values(["a", "b c", "x"].map(String::from))),
        ("style", Pick::Any(vec![
            Pick::values(
                [
                    "display: none",
                    "display: contents",
                    "position: fixed",
                    "float: left",
                    "columns: 2",
                    "overflow: scroll",
                    "transform: rotate(1deg)",
                    "content-visibility: hidden",
                ]
                .map(String::from),
            ),
            Pick::Gen(style_width),
        ])),
        ("width", Pick::Any(vec![Pick::Gen(length), Pick::Gen(integer)])),
        ("height", Pick::Any(vec![Pick::Gen(length), Pick::Gen(integer)])),
        ("colspan", Pick::Gen(integer)),
        ("rowspan", Pick::Gen(integer)),
        ("tabindex", Pick::Gen(integer)),
        ("dir", Pick::values(["ltr", "rtl", "auto"].map(String::from))),
        ("hidden", Pick::values(["", "until-found"].map(String::from))),
        ("contenteditable", Pick::values(["true", "false", "plaintext-only"].map(String::from))),
        ("open", Pick::values([String::new()])),
        ("src", Pick::values(["", "#", "data:,", "about:blank"].map(String::from))),
        ("type", Pick::values(["text", "number", "range", "color", "date", "file"].map(String::from))),
        ("color", Pick::Gen(color)),
        ("value", generic()),
        ("title", generic()),
    ]
});

const STYLE_PROPERTIES: &[&str] = &[
    "display", "position", "width", "height", "float", "overflow", "columns", "contain",
    "writing-mode", "transform", "filter", "zoom",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Set,
    Remove,
    Toggle,
    Style,
}

const OPS: &[(u32, Op)] = &[(6, Op::Set), (2, Op::Remove), (1, Op::Toggle), (3, Op::Style)];

#[derive(Debug, Clone, Copy, Default)]
pub struct AttributesModule;

impl FuzzModule for AttributesModule {
    fn name(&self) -> &str {
        "attributes"
    }

    fn default_weight(&self) -> u32 {
        4
    }

    fn make_command(&self, cx: &mut GenContext<'_>) -> Result<Vec<Fragment>, GenerationError> {
        let target = target(cx);
        let Some((name, values)) = cx.element(ATTRIBUTES.as_slice()) else {
            return Ok(Vec::new());
        };
        let element = Node::Slot(target);
        let op = cx.choice(OPS).copied().unwrap_or(Op::Set);
        let call = match op {
            Op::Set => {
                let value = pick(cx, values).unwrap_or_default();
                Node::method(element, "setAttribute", vec![Node::str(*name), Node::str(value)])
            }
            Op::Remove => Node::method(element, "removeAttribute", vec![Node::str(*name)]),
            Op::Toggle => Node::method(element, "toggleAttribute", vec![Node::str(*name)]),
            Op::Style => {
                let property = *cx.index(STYLE_PROPERTIES, &"display");
                let value = pick(cx, &generic()).unwrap_or_default();
                let style = Node::member(element, "style");
                Node::method(style, "setProperty", vec![Node::str(property), Node::str(value)])
            }
        };
        Ok(vec![Fragment::dom(Node::stmt(call))])
    }
}

/// A stored element, falling back to the document element.
fn target(cx: &mut GenContext<'_>) -> SlotIndex {
    if let Some(index) = cx.slot_of_kind(&kinds::ELEMENT) {
        return index;
    }
    let root = &cx.roots().document_element;
    cx.intern(root)
}
