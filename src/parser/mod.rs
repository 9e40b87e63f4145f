//! Parser module
//!
//! Parses LISP-style S-expressions into the syntax tree of a source unit.

mod ast;
mod sexpr_parser;

pub use ast::{
    BinaryOp, ClassDecl, Expr, ExprKind, LogicalOp, Member, MethodDecl, Span, SyntaxTree,
    UnaryOp,
};
pub use sexpr_parser::{SExprParser, MAX_NESTING_DEPTH};
