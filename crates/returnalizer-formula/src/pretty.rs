//! Canonical formula text.
//!
//! Rendering is deterministic: no whitespace, uppercase function names,
//! parentheses only where operator precedence requires them.

use crate::ast::{ASTNode, ASTNodeType};
use returnalizer_common::Value;

/// Render `node` as formula text with the leading `=`.
pub fn canonical_formula(node: &ASTNode) -> String {
    format!("={}", pretty_print(node))
}

/// Render `node` as formula text without the leading `=`.
pub fn pretty_print(node: &ASTNode) -> String {
    let mut out = String::new();
    write_node(node, &mut out);
    out
}

fn precedence(op: &str) -> u8 {
    match op {
        "=" | "<>" | "<" | ">" | "<=" | ">=" => 1,
        "&" => 2,
        "+" | "-" => 3,
        "*" | "/" => 4,
        "^" => 5,
        _ => 0,
    }
}

fn node_precedence(node: &ASTNode) -> u8 {
    match &node.node_type {
        ASTNodeType::BinaryOp { op, .. } => precedence(op),
        _ => u8::MAX,
    }
}

fn write_node(node: &ASTNode, out: &mut String) {
    match &node.node_type {
        ASTNodeType::Literal(v) => write_literal(v, out),
        ASTNodeType::Reference { reference, .. } => out.push_str(&reference.to_string()),
        ASTNodeType::BinaryOp { op, left, right } => {
            let p = precedence(op);
            write_operand(left, p, false, out);
            out.push_str(op);
            // Operators are left-associative, so an equal-precedence right operand needs parens.
            write_operand(right, p, true, out);
        }
        ASTNodeType::Function { name, args } => {
            out.push_str(&name.to_ascii_uppercase());
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_node(arg, out);
            }
            out.push(')');
        }
    }
}

fn write_operand(node: &ASTNode, parent: u8, is_right: bool, out: &mut String) {
    let p = node_precedence(node);
    let needs_parens = p < parent || (is_right && p == parent);
    if needs_parens {
        out.push('(');
        write_node(node, out);
        out.push(')');
    } else {
        write_node(node, out);
    }
}

fn write_literal(v: &Value, out: &mut String) {
    match v {
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Boolean(b) => out.push_str(if *b { "TRUE" } else { "FALSE" }),
        Value::Text(s) => {
            out.push('"');
            out.push_str(&s.replace('"', "\"\""));
            out.push('"');
        }
        Value::Date(d) => {
            out.push('"');
            out.push_str(&d.to_string());
            out.push('"');
        }
        Value::Array(rows) => {
            out.push('{');
            for (r, row) in rows.iter().enumerate() {
                if r > 0 {
                    out.push(';');
                }
                for (c, cell) in row.iter().enumerate() {
                    if c > 0 {
                        out.push(',');
                    }
                    write_literal(cell, out);
                }
            }
            out.push('}');
        }
        Value::Empty => {}
        Value::Error(e) => out.push_str(&e.kind.to_string()),
    }
}
