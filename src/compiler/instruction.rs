//! Bytecode of a binary unit
//!
//! A [`Unit`] is what the compiler emits and the loader reads back. It is a plain
//! data structure: names are stored in the constant pool, calls to library
//! functions go through the import table, and every method body is a [`Chunk`] of
//! stack-machine [`Instruction`]s.

use serde::{Deserialize, Serialize};

use crate::parser::BinaryOp;
use crate::runtime::Value;

/// Compiled source unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Library name the unit was compiled as
    pub name: String,
    /// Library functions the code calls, linked at load time
    pub imports: Vec<Import>,
    /// Literal and name pool
    pub constants: Vec<Constant>,
    /// Types in declaration order
    pub types: Vec<TypeDef>,
}

impl Unit {
    /// Exported types in declaration order
    pub fn exported(&self) -> impl Iterator<Item = (usize, &TypeDef)> {
        self.types.iter().enumerate().filter(|(_, t)| t.exported)
    }
}

/// Reference to a function of a referenced library
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Import {
    /// Reference identifier
    pub library: String,
    /// Function name
    pub function: String,
}

/// Constant pool entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// null
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String literal or member name
    Str(String),
}

impl Constant {
    /// Run-time value of the constant
    pub fn to_value(&self) -> Value {
        match self {
            Constant::Null => Value::Null,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int(n) => Value::Int(*n),
            Constant::Float(f) => Value::Float(*f),
            Constant::Str(s) => Value::String(s.clone()),
        }
    }

    /// Name stored in a string constant
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Constant::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Compiled type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    /// Type name
    pub name: String,
    /// True for the type's `defclass` form
    pub exported: bool,
    /// Field names; constructor parameters come first
    pub fields: Vec<String>,
    /// Constructor; its parameters are stored into the leading fields
    pub constructor: MethodDef,
    /// Methods in declaration order
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    /// Finds a method by name
    pub fn method(&self, name: &str) -> Option<(usize, &MethodDef)> {
        self.methods.iter().enumerate().find(|(_, m)| m.name == name)
    }
}

/// Compiled method or constructor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Callable from outside the unit
    pub public: bool,
    /// Number of parameters; they occupy the first local slots
    pub arity: usize,
    /// Body
    pub chunk: Chunk,
}

/// Instruction sequence with its local slot count
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Number of local slots, parameters included
    pub locals: usize,
    /// Instructions
    pub code: Vec<Instruction>,
}

/// Stack machine instructions
///
/// Every index is checked by the loader's verifier before the unit can run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Push a constant
    Const(usize),
    /// Discard the top value
    Pop,
    /// Duplicate the top value
    Dup,
    /// Push a local
    LoadLocal(usize),
    /// Pop into a local
    StoreLocal(usize),
    /// Push a field of `self`
    LoadField(usize),
    /// Pop into a field of `self`
    StoreField(usize),
    /// Push `self`
    LoadSelf,
    /// Replace the top value with its member named by a string constant
    GetMember(usize),
    /// Call a method by name on a dynamic target: `[target, args...] -> [result]`
    CallMember {
        /// String constant holding the method name
        name: usize,
        /// Number of arguments above the target
        argc: usize,
    },
    /// Call a method of the current type: `[args...] -> [result]`
    CallMethod {
        /// Method index in the current type
        method: usize,
        /// Number of arguments
        argc: usize,
    },
    /// Call a linked library function: `[args...] -> [result]`
    CallImport {
        /// Import index
        import: usize,
        /// Number of arguments
        argc: usize,
    },
    /// Pop two operands, push the result
    Binary(BinaryOp),
    /// Logical negation
    Not,
    /// Arithmetic negation
    Negate,
    /// Unconditional jump
    Jump(usize),
    /// Pop; jump when falsy
    JumpIfFalse(usize),
    /// Pop; jump when truthy
    JumpIfTrue(usize),
    /// Block on the task on top of the stack, push its result
    Await,
    /// Pop and raise an exception
    Throw,
    /// Install a handler; a caught exception is stored in `slot`
    EnterTry {
        /// Handler address
        handler: usize,
        /// Local slot receiving the exception
        slot: usize,
    },
    /// Remove the innermost handler
    ExitTry,
    /// Pop and return from the current method
    Return,
}

impl Instruction {
    /// Jump target, for instructions that transfer control
    pub fn target(&self) -> Option<usize> {
        match self {
            Instruction::Jump(t) | Instruction::JumpIfFalse(t) | Instruction::JumpIfTrue(t) => {
                Some(*t)
            }
            Instruction::EnterTry { handler, .. } => Some(*handler),
            _ => None,
        }
    }
}
