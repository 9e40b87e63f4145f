use serde::{Deserialize, Serialize};
use std::fmt;

/// Source position of a syntax node (1-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Line of the first token of the node
    pub line: usize,
    /// Column of the first token of the node
    pub column: usize,
}

impl Span {
    /// Creates a span at the given position
    pub fn new(line: usize, column: usize) -> Self {
        Span { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Parsed source unit: the type declarations in source order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxTree {
    /// Declared types, in declaration order
    pub classes: Vec<ClassDecl>,
}

impl SyntaxTree {
    /// Exported (public) types in declaration order
    pub fn exported(&self) -> impl Iterator<Item = &ClassDecl> {
        self.classes.iter().filter(|c| c.exported)
    }
}

/// Type declaration: `(defclass Name (param) member...)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    /// Type name
    pub name: String,
    /// `defclass` exports the type, `defclass-` keeps it private to the unit
    pub exported: bool,
    /// Constructor parameter names
    pub params: Vec<String>,
    /// Fields, initializer blocks and methods in source order
    pub members: Vec<Member>,
    /// Position of the declaration
    pub span: Span,
}

impl ClassDecl {
    /// Methods of this type in declaration order
    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Method(method) => Some(method),
            _ => None,
        })
    }

    /// Finds a method by name
    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods().find(|m| m.name == name)
    }
}

/// Member of a type declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Member {
    /// Field with initializer: `(field name expr)`
    Field {
        /// Field name
        name: String,
        /// Initializer, evaluated during construction
        init: Expr,
        /// Position of the member
        span: Span,
    },

    /// Constructor body: `(init expr...)`
    Init {
        /// Expressions run during construction, after preceding fields
        body: Vec<Expr>,
        /// Position of the member
        span: Span,
    },

    /// Method: `(defmethod name (params) expr...)`
    Method(MethodDecl),
}

/// Method declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    /// Method name
    pub name: String,
    /// `defmethod` is public, `defmethod-` is private
    pub public: bool,
    /// Parameter names
    pub params: Vec<String>,
    /// Body expressions; the last one is the result
    pub body: Vec<Expr>,
    /// Position of the declaration
    pub span: Span,
}

/// Expression node with its source position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    /// What the expression is
    pub kind: ExprKind,
    /// Where it starts
    pub span: Span,
}

impl Expr {
    /// Creates an expression node
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }

    /// True when control never continues past this expression
    pub fn diverges(&self) -> bool {
        matches!(self.kind, ExprKind::Throw(_) | ExprKind::Return(_))
    }

    /// Name of the literal type, if this is a literal
    pub fn literal_type(&self) -> Option<&'static str> {
        match self.kind {
            ExprKind::Int(_) => Some("int"),
            ExprKind::Float(_) => Some("float"),
            ExprKind::Str(_) => Some("string"),
            ExprKind::Bool(_) => Some("bool"),
            ExprKind::Null => Some("null"),
            _ => None,
        }
    }
}

/// Expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    // Literals
    /// Integer literal expression
    Int(i64),
    /// Floating-point literal expression
    Float(f64),
    /// String literal expression
    Str(String),
    /// Boolean literal expression
    Bool(bool),
    /// Null literal expression
    Null,

    /// Variable, field or constructor parameter reference
    Variable(String),
    /// The current instance
    SelfRef,

    /// Dynamic member read: `(. target name)`
    Member {
        /// Object being read
        target: Box<Expr>,
        /// Member name
        name: String,
    },

    /// Method call: `(call target name args...)`
    Call {
        /// Receiver
        target: Box<Expr>,
        /// Method name
        method: String,
        /// Arguments
        args: Vec<Expr>,
    },

    /// Library function call: `(name args...)`
    Invoke {
        /// Function name, resolved against the reference set
        function: String,
        /// Arguments
        args: Vec<Expr>,
    },

    /// Local definition: `(define name value)`
    Define {
        /// Local name
        name: String,
        /// Initial value
        value: Box<Expr>,
    },

    /// Assignment to a local or field: `(set! name value)`
    Set {
        /// Target name
        name: String,
        /// New value
        value: Box<Expr>,
    },

    /// Conditional: `(if cond then else?)`
    If {
        /// Condition
        condition: Box<Expr>,
        /// Taken when the condition is truthy
        then_branch: Box<Expr>,
        /// Taken otherwise; null when absent
        else_branch: Option<Box<Expr>>,
    },

    /// Loop: `(while cond body...)`
    While {
        /// Loop condition
        condition: Box<Expr>,
        /// Loop body
        body: Vec<Expr>,
    },

    /// Sequence: `(do expr...)`
    Do(Vec<Expr>),

    /// Block on a task: `(await expr)`
    Await(Box<Expr>),

    /// Raise an exception: `(throw expr)`
    Throw(Box<Expr>),

    /// Leave the method: `(return expr?)`
    Return(Option<Box<Expr>>),

    /// Exception handler: `(try body... (catch name handler...))`
    Try {
        /// Protected expressions
        body: Vec<Expr>,
        /// Name bound to the caught exception
        binding: String,
        /// Handler expressions
        handler: Vec<Expr>,
    },

    /// Short-circuit logic: `(and ...)` / `(or ...)`
    Logical {
        /// Operator
        op: LogicalOp,
        /// Operands, at least one
        operands: Vec<Expr>,
    },

    /// Arithmetic or comparison: `(+ a b c)`, `(< a b)`
    Binary {
        /// Operator
        op: BinaryOp,
        /// Operands; arithmetic folds left over all of them
        operands: Vec<Expr>,
    },

    /// Unary operation: `(not x)`, `(- x)`
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Addition (+)
    Add,
    /// Subtraction (-)
    Sub,
    /// Multiplication (*)
    Mul,
    /// Division (/)
    Div,
    /// Remainder (%)
    Mod,
    /// Equality (==)
    Eq,
    /// Inequality (!=)
    NotEq,
    /// Less than (<)
    Lt,
    /// Greater than (>)
    Gt,
    /// Less than or equal (<=)
    LtEq,
    /// Greater than or equal (>=)
    GtEq,
}

impl BinaryOp {
    /// Arithmetic operators fold over any number of operands
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }

    /// Operators that accept only numbers (or strings, for ordering)
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
        };
        f.write_str(symbol)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Arithmetic negation (-)
    Neg,
    /// Logical NOT
    Not,
}

/// Short-circuit operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    /// Logical AND
    And,
    /// Logical OR
    Or,
}
