//! Built-in generator modules.
//!
//! | Module | Produces |
//! |--------|----------|
//! | `script` | grammar statements |
//! | `nodes` | element creation, insertion, removal, cloning, release |
//! | `attributes` | attribute and style mutation from nested value tables |
//! | `events` | listeners with generated bodies, dispatch |
//! | `host` | opaque privileged host actions |
//! | `nesting` | loop, try and timer wrappers around sub-generated output |

mod attributes;
mod events;
mod host;
mod nesting;
mod nodes;
mod script;

pub use attributes::AttributesModule;
pub use events::EventsModule;
pub use host::HostModule;
pub use nesting::NestingModule;
pub use nodes::NodesModule;
pub use script::ScriptModule;

use crate::arena::{Kind, Reference, SlotIndex};
use crate::context::GenContext;
use crate::error::GenerationError;
use crate::fragment::{Fragment, Node};
use crate::module::FuzzModule;
use crate::render::render_expr;

/// Fresh instances of every built-in module, in registry order.
pub fn builtin() -> Vec<Box<dyn FuzzModule>> {
    vec![
        Box::new(ScriptModule),
        Box::new(NodesModule),
        Box::new(AttributesModule),
        Box::new(EventsModule),
        Box::new(HostModule),
        Box::new(NestingModule),
    ]
}

/// Store `value` in a new slot tagged with `kind` and return `o[i] = value`.
fn materialize(
    cx: &mut GenContext<'_>,
    kind: Kind,
    value: Node,
) -> Result<(SlotIndex, Node), GenerationError> {
    let index = cx.reserve();
    cx.fill(index, Reference::new(kind, render_expr(&value)))?;
    Ok((index, Node::assign(Node::Slot(index), value)))
}

/// Render fragments as raw statements for embedding in a body.
fn embed(fragments: Vec<Fragment>) -> Vec<Node> {
    fragments.iter().map(|f| Node::Text(f.text())).collect()
}
