//! Generated code as data.
//!
//! Productions build [`Node`] trees rather than strings. A tree can be
//! inspected in tests (which bindings does it reference? how deep is it?)
//! and is turned into target syntax only by [`crate::render`].

use std::fmt;

use crate::arena::SlotIndex;
use crate::render;

/// AST-lite for the generated language.
///
/// Leaves and combinator results come first, then expressions, then
/// statements. Operators are stored as their source spelling.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // ---- leaves ----
    /// Raw text, emitted verbatim.
    Text(String),
    /// Numeric literal.
    Number(f64),
    /// String literal.
    Str(String),
    /// A binding introduced by an enclosing construct.
    Ident(String),
    /// A built-in or host global (`Math`, `document`, ...).
    Global(String),
    /// Reference to an arena slot, `o[i]`.
    Slot(SlotIndex),
    /// Comment, `/*...*/`.
    Comment(String),

    // ---- combinator results ----
    /// Children in order.
    Seq(Vec<Node>),
    /// Parenthesized child.
    Group(Box<Node>),

    // ---- expressions ----
    Unary {
        op: &'static str,
        operand: Box<Node>,
    },
    Binary {
        op: &'static str,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Assign {
        op: &'static str,
        target: Box<Node>,
        value: Box<Node>,
    },
    Conditional {
        test: Box<Node>,
        then: Box<Node>,
        otherwise: Box<Node>,
    },
    Call {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    New {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    Member {
        object: Box<Node>,
        property: String,
    },
    Index {
        object: Box<Node>,
        index: Box<Node>,
    },
    Array(Vec<Node>),
    Object(Vec<(String, Node)>),
    /// Function expression, or a declaration when named and placed directly
    /// in statement position.
    Function {
        name: Option<String>,
        params: Vec<String>,
        body: Vec<Node>,
    },
    Arrow {
        params: Vec<String>,
        body: Box<Node>,
    },
    Comma(Vec<Node>),

    // ---- statements ----
    Var {
        keyword: &'static str,
        name: String,
        init: Option<Box<Node>>,
    },
    ExprStmt(Box<Node>),
    Block(Vec<Node>),
    If {
        test: Box<Node>,
        then: Vec<Node>,
        otherwise: Option<Vec<Node>>,
    },
    /// Counted loop: `for (let var = 0; var < limit; var++)`.
    For {
        var: String,
        limit: u32,
        body: Vec<Node>,
    },
    ForOf {
        keyword: &'static str,
        binding: String,
        iterable: Box<Node>,
        body: Vec<Node>,
    },
    While {
        test: Box<Node>,
        body: Vec<Node>,
    },
    Try {
        block: Vec<Node>,
        catch: Option<(Option<String>, Vec<Node>)>,
        finally: Option<Vec<Node>>,
    },
    Switch {
        discriminant: Box<Node>,
        cases: Vec<(Option<Node>, Vec<Node>)>,
    },
    Return(Option<Box<Node>>),
    Throw(Box<Node>),
    Break,
    Continue,
    Empty,
}

impl Node {
    pub fn text(s: impl Into<String>) -> Self {
        Node::Text(s.into())
    }

    pub fn str(s: impl Into<String>) -> Self {
        Node::Str(s.into())
    }

    pub fn ident(s: impl Into<String>) -> Self {
        Node::Ident(s.into())
    }

    pub fn global(s: impl Into<String>) -> Self {
        Node::Global(s.into())
    }

    pub fn call(callee: Node, args: Vec<Node>) -> Self {
        Node::Call {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn member(object: Node, property: impl Into<String>) -> Self {
        Node::Member {
            object: Box::new(object),
            property: property.into(),
        }
    }

    /// `object.method(args)`
    pub fn method(object: Node, method: impl Into<String>, args: Vec<Node>) -> Self {
        Node::call(Node::member(object, method), args)
    }

    pub fn assign(target: Node, value: Node) -> Self {
        Node::Assign {
            op: "=",
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    /// Wrap an expression as a statement.
    pub fn stmt(expr: Node) -> Self {
        Node::ExprStmt(Box::new(expr))
    }

    /// Whether this node only makes sense in statement position.
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            Node::Var { .. }
                | Node::ExprStmt(_)
                | Node::Block(_)
                | Node::If { .. }
                | Node::For { .. }
                | Node::ForOf { .. }
                | Node::While { .. }
                | Node::Try { .. }
                | Node::Switch { .. }
                | Node::Return(_)
                | Node::Throw(_)
                | Node::Break
                | Node::Continue
                | Node::Empty
        )
    }

    /// Direct children, in source order.
    pub fn children(&self) -> Vec<&Node> {
        match self {
            Node::Text(_)
            | Node::Number(_)
            | Node::Str(_)
            | Node::Ident(_)
            | Node::Global(_)
            | Node::Slot(_)
            | Node::Comment(_)
            | Node::Break
            | Node::Continue
            | Node::Empty => Vec::new(),
            Node::For { body, .. } => body.iter().collect(),
            Node::Seq(items) | Node::Array(items) | Node::Comma(items) | Node::Block(items) => {
                items.iter().collect()
            }
            Node::Group(inner) | Node::ExprStmt(inner) | Node::Throw(inner) => vec![&**inner],
            Node::Unary { operand, .. } => vec![&**operand],
            Node::Binary { lhs, rhs, .. } => vec![&**lhs, &**rhs],
            Node::Assign { target, value, .. } => vec![&**target, &**value],
            Node::Conditional {
                test,
                then,
                otherwise,
            } => vec![&**test, &**then, &**otherwise],
            Node::Call { callee, args } | Node::New { callee, args } => {
                std::iter::once(callee.as_ref()).chain(args.iter()).collect()
            }
            Node::Member { object, .. } => vec![&**object],
            Node::Index { object, index } => vec![&**object, &**index],
            Node::Object(props) => props.iter().map(|(_, v)| v).collect(),
            Node::Function { body, .. } => body.iter().collect(),
            Node::Arrow { body, .. } => vec![&**body],
            Node::Var { init, .. } => init.iter().map(|b| b.as_ref()).collect(),
            Node::If {
                test,
                then,
                otherwise,
            } => std::iter::once(test.as_ref())
                .chain(then.iter())
                .chain(otherwise.iter().flatten())
                .collect(),
            Node::ForOf { iterable, body, .. } => {
                std::iter::once(iterable.as_ref()).chain(body.iter()).collect()
            }
            Node::While { test, body } => std::iter::once(test.as_ref()).chain(body.iter()).collect(),
            Node::Try {
                block,
                catch,
                finally,
            } => block
                .iter()
                .chain(catch.iter().flat_map(|(_, b)| b.iter()))
                .chain(finally.iter().flatten())
                .collect(),
            Node::Switch {
                discriminant,
                cases,
            } => std::iter::once(discriminant.as_ref())
                .chain(
                    cases
                        .iter()
                        .flat_map(|(test, body)| test.iter().chain(body.iter())),
                )
                .collect(),
            Node::Return(value) => value.iter().map(|b| b.as_ref()).collect(),
        }
    }

    /// Height of the tree; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        1 + self.children().into_iter().map(Node::depth).max().unwrap_or(0)
    }

    /// Total number of nodes.
    pub fn size(&self) -> usize {
        1 + self.children().into_iter().map(Node::size).sum::<usize>()
    }
}

/// Which part of the host a fragment exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    /// Plain language code.
    Script,
    /// DOM manipulation.
    Dom,
    /// Privileged host actions.
    Host,
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FragmentKind::Script => "script",
            FragmentKind::Dom => "dom",
            FragmentKind::Host => "host",
        })
    }
}

/// One self-contained unit of generated code.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub node: Node,
}

impl Fragment {
    pub fn new(kind: FragmentKind, node: Node) -> Self {
        Self { kind, node }
    }

    pub fn script(node: Node) -> Self {
        Self::new(FragmentKind::Script, node)
    }

    pub fn dom(node: Node) -> Self {
        Self::new(FragmentKind::Dom, node)
    }

    pub fn host(node: Node) -> Self {
        Self::new(FragmentKind::Host, node)
    }

    /// Render to target syntax, in statement position.
    pub fn text(&self) -> String {
        render::render(&self.node)
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}
