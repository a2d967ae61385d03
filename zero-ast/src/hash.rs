//! Canonical content hashing (`spec.md` §4.5, §8 property 2).
//!
//! The hash is computed over a hand-written byte serialization, not a
//! `#[derive(Hash)]`/`serde` encoding: derive order follows struct
//! declaration order, which is exactly the kind of accidental sensitivity
//! `spec.md` §3 says the hash must *not* have for semantically-unordered
//! fields (RELATED subtrees are sorted by name before hashing; AND/OR
//! children are already canonically sorted by [`crate::simplify::simplify`]
//! before a `CompletedAst` is ever hashed). Fields whose order *is*
//! semantically meaningful (ORDER BY, the WHERE tree's comparison operands)
//! are hashed in their given order.

use sha2::{Digest, Sha256};
use zero_core::Value;

use crate::ast::{Ast, CompletedAst, OrderDirection, Related, Start};
use crate::expr::{CompareOp, Expr, ExistsExpr};

/// A 32-byte SHA-256 digest, rendered as lowercase hex for use as a CVR query
/// key (`spec.md` §3 "CVR").
pub fn canonical_hash(ast: &CompletedAst) -> String {
    let mut buf = Vec::new();
    write_ast(ast.ast(), &mut buf);
    let digest = Sha256::digest(&buf);
    hex(&digest)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn write_tag(buf: &mut Vec<u8>, tag: u8) {
    buf.push(tag);
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn write_bool(buf: &mut Vec<u8>, b: bool) {
    buf.push(b as u8);
}

fn write_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_value(buf: &mut Vec<u8>, v: &Value) {
    match v {
        Value::Null => write_tag(buf, 0),
        Value::Bool(b) => {
            write_tag(buf, 1);
            write_bool(buf, *b);
        }
        Value::Int(i) => {
            write_tag(buf, 2);
            buf.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float(f) => {
            write_tag(buf, 3);
            buf.extend_from_slice(&f.to_le_bytes());
        }
        Value::String(s) => {
            write_tag(buf, 4);
            write_str(buf, s);
        }
        Value::Bytes(b) => {
            write_tag(buf, 5);
            write_u64(buf, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Json(j) => {
            write_tag(buf, 6);
            write_str(buf, &j.to_string());
        }
    }
}

fn write_compare_op(buf: &mut Vec<u8>, op: CompareOp) {
    let tag = match op {
        CompareOp::Eq => 0,
        CompareOp::Ne => 1,
        CompareOp::Lt => 2,
        CompareOp::Le => 3,
        CompareOp::Gt => 4,
        CompareOp::Ge => 5,
        CompareOp::Like => 6,
    };
    buf.push(tag);
}

fn write_exists(buf: &mut Vec<u8>, ex: &ExistsExpr) {
    write_str(buf, &ex.relationship);
    write_bool(buf, ex.flip);
    match &ex.where_ {
        Some(w) => {
            write_bool(buf, true);
            write_expr(buf, w);
        }
        None => write_bool(buf, false),
    }
}

fn write_expr(buf: &mut Vec<u8>, e: &Expr) {
    match e {
        Expr::And(parts) => {
            write_tag(buf, 0);
            write_u64(buf, parts.len() as u64);
            for p in parts {
                write_expr(buf, p);
            }
        }
        Expr::Or(parts) => {
            write_tag(buf, 1);
            write_u64(buf, parts.len() as u64);
            for p in parts {
                write_expr(buf, p);
            }
        }
        Expr::Not(inner) => {
            write_tag(buf, 2);
            write_expr(buf, inner);
        }
        Expr::Compare { column, op, value } => {
            write_tag(buf, 3);
            write_str(buf, column);
            write_compare_op(buf, *op);
            write_value(buf, value);
        }
        Expr::Exists(ex) => {
            write_tag(buf, 4);
            write_exists(buf, ex);
        }
    }
}

fn write_order_direction(buf: &mut Vec<u8>, d: OrderDirection) {
    buf.push(match d {
        OrderDirection::Asc => 0,
        OrderDirection::Desc => 1,
    });
}

fn write_start(buf: &mut Vec<u8>, start: &Start) {
    write_u64(buf, start.row.len() as u64);
    for v in &start.row {
        write_value(buf, v);
    }
    write_bool(buf, start.inclusive);
}

fn write_related(buf: &mut Vec<u8>, related: &[Related]) {
    let mut sorted: Vec<&Related> = related.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    write_u64(buf, sorted.len() as u64);
    for r in sorted {
        write_str(buf, &r.name);
        write_bool(buf, r.hidden_junction);
        write_ast(&r.child, buf);
    }
}

fn write_ast(ast: &Ast, buf: &mut Vec<u8>) {
    write_str(buf, &ast.table);
    match &ast.alias {
        Some(a) => {
            write_bool(buf, true);
            write_str(buf, a);
        }
        None => write_bool(buf, false),
    }
    match &ast.where_ {
        Some(w) => {
            write_bool(buf, true);
            write_expr(buf, w);
        }
        None => write_bool(buf, false),
    }
    write_u64(buf, ast.order_by.len() as u64);
    for (col, dir) in &ast.order_by {
        write_str(buf, col);
        write_order_direction(buf, *dir);
    }
    match ast.limit {
        Some(l) => {
            write_bool(buf, true);
            write_u64(buf, l);
        }
        None => write_bool(buf, false),
    }
    match &ast.start {
        Some(s) => {
            write_bool(buf, true);
            write_start(buf, s);
        }
        None => write_bool(buf, false),
    }
    write_related(buf, &ast.related);
}
