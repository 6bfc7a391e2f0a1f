//! Rendering [`Node`] trees to JavaScript source.
//!
//! This is the only module that knows target syntax. Compound expressions
//! are fully parenthesized, so the tree shape alone decides evaluation
//! order and no precedence table is needed.

use crate::fragment::Node;

const INDENT: &str = "  ";

/// Render a node in statement position.
///
/// Expressions in statement position are terminated with `;`.
pub fn render(node: &Node) -> String {
    let mut out = String::new();
    write_stmt(&mut out, node, 0);
    out
}

/// Render a node in expression position.
pub fn render_expr(node: &Node) -> String {
    let mut out = String::new();
    write_expr(&mut out, node, 0);
    out
}

/// Quote `s` as a string literal.
pub fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| String::from("\"\""))
}

fn number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "(-Infinity)".to_string()
        }
    } else if n == 0.0 && n.is_sign_negative() {
        "(-0)".to_string()
    } else if n < 0.0 {
        format!("({})", n)
    } else {
        format!("{}", n)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn comment(text: &str) -> String {
    format!("/*{}*/", text.replace("*/", "* /"))
}

fn pad(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str(INDENT);
    }
}

fn join_exprs(out: &mut String, items: &[Node], level: usize) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, item, level);
    }
}

/// Write a `{ ... }` body at `level`, leaving the cursor after `}`.
fn write_body(out: &mut String, body: &[Node], level: usize) {
    if body.is_empty() {
        out.push_str("{ }");
        return;
    }
    out.push_str("{\n");
    for stmt in body {
        pad(out, level + 1);
        write_stmt(out, stmt, level + 1);
        out.push('\n');
    }
    pad(out, level);
    out.push('}');
}

/// Operand of a member access or call. Anything that is not already a
/// primary expression gets parentheses.
fn write_operand(out: &mut String, node: &Node, level: usize) {
    let primary = matches!(
        node,
        Node::Ident(_)
            | Node::Global(_)
            | Node::Slot(_)
            | Node::Str(_)
            | Node::Member { .. }
            | Node::Index { .. }
            | Node::Call { .. }
            | Node::Group(_)
            | Node::Array(_)
            | Node::Unary { .. }
            | Node::Binary { .. }
            | Node::Assign { .. }
            | Node::Conditional { .. }
    );
    if primary {
        write_expr(out, node, level);
    } else {
        out.push('(');
        write_expr(out, node, level);
        out.push(')');
    }
}

fn write_expr(out: &mut String, node: &Node, level: usize) {
    match node {
        Node::Text(t) => out.push_str(t),
        Node::Number(n) => out.push_str(&number(*n)),
        Node::Str(s) => out.push_str(&quote(s)),
        Node::Ident(name) | Node::Global(name) => out.push_str(name),
        Node::Slot(index) => {
            out.push_str("o[");
            out.push_str(&index.to_string());
            out.push(']');
        }
        Node::Comment(text) => {
            out.push_str(&comment(text));
            out.push_str("void 0");
        }
        Node::Seq(items) => {
            for item in items {
                write_expr(out, item, level);
            }
        }
        Node::Group(inner) => {
            out.push('(');
            write_expr(out, inner, level);
            out.push(')');
        }
        Node::Unary { op, operand } => {
            out.push('(');
            out.push_str(op);
            if op.chars().all(|c| c.is_ascii_alphabetic()) {
                out.push(' ');
            }
            write_expr(out, operand, level);
            out.push(')');
        }
        Node::Binary { op, lhs, rhs } => {
            out.push('(');
            write_expr(out, lhs, level);
            out.push(' ');
            out.push_str(op);
            out.push(' ');
            write_expr(out, rhs, level);
            out.push(')');
        }
        Node::Assign { op, target, value } => {
            out.push('(');
            write_expr(out, target, level);
            out.push(' ');
            out.push_str(op);
            out.push(' ');
            write_expr(out, value, level);
            out.push(')');
        }
        Node::Conditional {
            test,
            then,
            otherwise,
        } => {
            out.push('(');
            write_expr(out, test, level);
            out.push_str(" ? ");
            write_expr(out, then, level);
            out.push_str(" : ");
            write_expr(out, otherwise, level);
            out.push(')');
        }
        Node::Call { callee, args } => {
            write_operand(out, callee, level);
            out.push('(');
            join_exprs(out, args, level);
            out.push(')');
        }
        Node::New { callee, args } => {
            out.push_str("new ");
            if matches!(callee.as_ref(), Node::Ident(_) | Node::Global(_)) {
                write_expr(out, callee, level);
            } else {
                out.push('(');
                write_expr(out, callee, level);
                out.push(')');
            }
            out.push('(');
            join_exprs(out, args, level);
            out.push(')');
        }
        Node::Member { object, property } => {
            write_operand(out, object, level);
            if is_identifier(property) {
                out.push('.');
                out.push_str(property);
            } else {
                out.push('[');
                out.push_str(&quote(property));
                out.push(']');
            }
        }
        Node::Index { object, index } => {
            write_operand(out, object, level);
            out.push('[');
            write_expr(out, index, level);
            out.push(']');
        }
        Node::Array(items) => {
            out.push('[');
            join_exprs(out, items, level);
            out.push(']');
        }
        Node::Object(props) => {
            if props.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{ ");
            for (i, (key, value)) in props.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if is_identifier(key) {
                    out.push_str(key);
                } else {
                    out.push_str(&quote(key));
                }
                out.push_str(": ");
                write_expr(out, value, level);
            }
            out.push_str(" }");
        }
        Node::Function { name, params, body } => {
            out.push_str("function");
            if let Some(name) = name {
                out.push(' ');
                out.push_str(name);
            }
            out.push('(');
            out.push_str(&params.join(", "));
            out.push_str(") ");
            write_body(out, body, level);
        }
        Node::Arrow { params, body } => {
            out.push_str("((");
            out.push_str(&params.join(", "));
            out.push_str(") => ");
            match body.as_ref() {
                Node::Block(stmts) => write_body(out, stmts, level),
                Node::Object(_) => {
                    out.push('(');
                    write_expr(out, body, level);
                    out.push(')');
                }
                other => write_expr(out, other, level),
            }
            out.push(')');
        }
        Node::Comma(items) => {
            if items.is_empty() {
                out.push_str("void 0");
                return;
            }
            out.push('(');
            join_exprs(out, items, level);
            out.push(')');
        }
        stmt => {
            // A statement in expression position runs inside an immediately
            // invoked function.
            out.push_str("(function() ");
            write_body(out, std::slice::from_ref(stmt), level);
            out.push_str(")()");
        }
    }
}

fn write_stmt(out: &mut String, node: &Node, level: usize) {
    match node {
        Node::Text(t) => out.push_str(t),
        Node::Comment(text) => out.push_str(&comment(text)),
        Node::Seq(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                    pad(out, level);
                }
                write_stmt(out, item, level);
            }
        }
        Node::Function { name: Some(_), .. } => write_expr(out, node, level),
        Node::Var {
            keyword,
            name,
            init,
        } => {
            out.push_str(keyword);
            out.push(' ');
            out.push_str(name);
            if let Some(init) = init {
                out.push_str(" = ");
                write_expr(out, init, level);
            }
            out.push(';');
        }
        Node::ExprStmt(expr) => write_expr_stmt(out, expr, level),
        Node::Block(body) => write_body(out, body, level),
        Node::If {
            test,
            then,
            otherwise,
        } => {
            out.push_str("if (");
            write_expr(out, test, level);
            out.push_str(") ");
            write_body(out, then, level);
            if let Some(otherwise) = otherwise {
                out.push_str(" else ");
                write_body(out, otherwise, level);
            }
        }
        Node::For { var, limit, body } => {
            out.push_str(&format!(
                "for (let {v} = 0; {v} < {limit}; {v}++) ",
                v = var,
                limit = limit
            ));
            write_body(out, body, level);
        }
        Node::ForOf {
            keyword,
            binding,
            iterable,
            body,
        } => {
            out.push_str("for (");
            out.push_str(keyword);
            out.push(' ');
            out.push_str(binding);
            out.push_str(" of ");
            write_expr(out, iterable, level);
            out.push_str(") ");
            write_body(out, body, level);
        }
        Node::While { test, body } => {
            out.push_str("while (");
            write_expr(out, test, level);
            out.push_str(") ");
            write_body(out, body, level);
        }
        Node::Try {
            block,
            catch,
            finally,
        } => {
            out.push_str("try ");
            write_body(out, block, level);
            if let Some((binding, body)) = catch {
                out.push_str(" catch ");
                if let Some(binding) = binding {
                    out.push('(');
                    out.push_str(binding);
                    out.push_str(") ");
                }
                write_body(out, body, level);
            }
            match finally {
                Some(body) => {
                    out.push_str(" finally ");
                    write_body(out, body, level);
                }
                None if catch.is_none() => out.push_str(" finally { }"),
                None => {}
            }
        }
        Node::Switch {
            discriminant,
            cases,
        } => {
            out.push_str("switch (");
            write_expr(out, discriminant, level);
            out.push_str(") {\n");
            for (test, body) in cases {
                pad(out, level + 1);
                match test {
                    Some(test) => {
                        out.push_str("case ");
                        write_expr(out, test, level + 1);
                        out.push(':');
                    }
                    None => out.push_str("default:"),
                }
                out.push('\n');
                for stmt in body {
                    pad(out, level + 2);
                    write_stmt(out, stmt, level + 2);
                    out.push('\n');
                }
            }
            pad(out, level);
            out.push('}');
        }
        Node::Return(value) => {
            out.push_str("return");
            if let Some(value) = value {
                out.push(' ');
                write_expr(out, value, level);
            }
            out.push(';');
        }
        Node::Throw(value) => {
            out.push_str("throw ");
            write_expr(out, value, level);
            out.push(';');
        }
        Node::Break => out.push_str("break;"),
        Node::Continue => out.push_str("continue;"),
        Node::Empty => out.push(';'),
        expr => write_expr_stmt(out, expr, level),
    }
}

/// An expression statement. Text that would be read as a block or a
/// declaration is parenthesized.
fn write_expr_stmt(out: &mut String, expr: &Node, level: usize) {
    let text = {
        let mut buf = String::new();
        write_expr(&mut buf, expr, level);
        buf
    };
    let ambiguous = text.starts_with('{')
        || text.starts_with("function")
        || text.starts_with("class")
        || text.starts_with("let[");
    if ambiguous {
        out.push('(');
        out.push_str(&text);
        out.push(')');
    } else {
        out.push_str(&text);
    }
    out.push(';');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::SlotIndex;

    fn bin(op: &'static str, lhs: Node, rhs: Node) -> Node {
        Node::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    #[test]
    fn test_numbers() {
        assert_eq!(render_expr(&Node::Number(3.0)), "3");
        assert_eq!(render_expr(&Node::Number(0.5)), "0.5");
        assert_eq!(render_expr(&Node::Number(-0.0)), "(-0)");
        assert_eq!(render_expr(&Node::Number(-7.0)), "(-7)");
        assert_eq!(render_expr(&Node::Number(f64::NAN)), "NaN");
        assert_eq!(render_expr(&Node::Number(f64::NEG_INFINITY)), "(-Infinity)");
        assert_eq!(render_expr(&Node::Number(4294967296.0)), "4294967296");
    }

    #[test]
    fn test_string_quoting() {
        assert_eq!(render_expr(&Node::str("a\"b\n")), r#""a\"b\n""#);
    }

    #[test]
    fn test_expression_statement_terminated() {
        let node = Node::assign(Node::Slot(SlotIndex::new(3)), Node::Number(1.0));
        assert_eq!(render(&node), "(o[3] = 1);");
        assert_eq!(render(&Node::stmt(Node::ident("x"))), "x;");
    }

    #[test]
    fn test_binary_is_parenthesized() {
        let node = bin("*", bin("+", Node::ident("a"), Node::ident("b")), Node::Number(2.0));
        assert_eq!(render_expr(&node), "((a + b) * 2)");
    }

    #[test]
    fn test_word_unary_gets_space() {
        let node = Node::Unary {
            op: "typeof",
            operand: Box::new(Node::ident("x")),
        };
        assert_eq!(render_expr(&node), "(typeof x)");
        let neg = Node::Unary {
            op: "-",
            operand: Box::new(Node::ident("x")),
        };
        assert_eq!(render_expr(&neg), "(-x)");
    }

    #[test]
    fn test_member_on_number_and_odd_property() {
        let node = Node::member(Node::Number(1.0), "toString");
        assert_eq!(render_expr(&node), "(1).toString");
        let node = Node::member(Node::global("document"), "data-x");
        assert_eq!(render_expr(&node), r#"document["data-x"]"#);
    }

    #[test]
    fn test_object_in_statement_position() {
        let node = Node::Object(vec![("a".into(), Node::Number(1.0))]);
        assert_eq!(render(&node), "({ a: 1 });");
    }

    #[test]
    fn test_anonymous_function_statement_wrapped() {
        let anon = Node::Function {
            name: None,
            params: vec![],
            body: vec![],
        };
        assert_eq!(render(&anon), "(function() { });");
        let named = Node::Function {
            name: Some("f".into()),
            params: vec!["a".into()],
            body: vec![Node::Return(Some(Box::new(Node::ident("a"))))],
        };
        assert_eq!(render(&named), "function f(a) {\n  return a;\n}");
    }

    #[test]
    fn test_call_on_function_expression() {
        let node = Node::call(
            Node::Function {
                name: None,
                params: vec![],
                body: vec![],
            },
            vec![],
        );
        assert_eq!(render(&node), "(function() { })();");
    }

    #[test]
    fn test_new_with_complex_callee() {
        let node = Node::New {
            callee: Box::new(Node::member(Node::global("window"), "Array")),
            args: vec![Node::Number(2.0)],
        };
        assert_eq!(render_expr(&node), "new (window.Array)(2)");
    }

    #[test]
    fn test_arrow_object_body() {
        let node = Node::Arrow {
            params: vec!["x".into()],
            body: Box::new(Node::Object(vec![])),
        };
        assert_eq!(render_expr(&node), "((x) => ({}))");
    }

    #[test]
    fn test_control_flow() {
        let node = Node::If {
            test: Box::new(Node::ident("x")),
            then: vec![Node::Break],
            otherwise: Some(vec![]),
        };
        assert_eq!(render(&node), "if (x) {\n  break;\n} else { }");

        let node = Node::For {
            var: "i".into(),
            limit: 4,
            body: vec![],
        };
        assert_eq!(render(&node), "for (let i = 0; i < 4; i++) { }");
    }

    #[test]
    fn test_try_without_handlers_gets_finally() {
        let node = Node::Try {
            block: vec![],
            catch: None,
            finally: None,
        };
        assert_eq!(render(&node), "try { } finally { }");
        let node = Node::Try {
            block: vec![],
            catch: Some((Some("e".into()), vec![])),
            finally: None,
        };
        assert_eq!(render(&node), "try { } catch (e) { }");
    }

    #[test]
    fn test_switch() {
        let node = Node::Switch {
            discriminant: Box::new(Node::ident("x")),
            cases: vec![(Some(Node::Number(1.0)), vec![Node::Break]), (None, vec![])],
        };
        assert_eq!(
            render(&node),
            "switch (x) {\n  case 1:\n    break;\n  default:\n}"
        );
    }

    #[test]
    fn test_seq_statement_and_expression_positions() {
        let seq = Node::Seq(vec![Node::text("a"), Node::text("b")]);
        assert_eq!(render_expr(&seq), "ab");
        assert_eq!(render(&seq), "a\nb");
    }

    #[test]
    fn test_comment_cannot_close_early() {
        assert_eq!(render(&Node::Comment("x*/y".into())), "/*x* /y*/");
    }

    #[test]
    fn test_statement_in_expression_position() {
        let node = Node::call(Node::global("f"), vec![Node::Throw(Box::new(Node::Number(1.0)))]);
        assert_eq!(render_expr(&node), "f((function() {\n  throw 1;\n})())");
    }
}
