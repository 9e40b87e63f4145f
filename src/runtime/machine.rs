//! Bytecode interpreter
//!
//! One [`Machine`] runs one invocation. Method calls recurse on the native stack up
//! to the configured depth. Exceptions unwind through the handlers a frame installed
//! with `EnterTry`; a timeout skips them all.

use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::time::Instant;

use super::bag::DependencyBag;
use super::exception::{Exception, ExceptionKind};
use super::task::Task;
use super::value::{Instance, Value};
use crate::compiler::{Instruction, MethodDef};
use crate::loader::ExportedType;
use crate::parser::BinaryOp;

struct Handler {
    target: usize,
    slot: usize,
    stack_height: usize,
}

enum Flow {
    Next,
    Jump(usize),
    Return(Value),
}

/// Interpreter state for one invocation
pub(crate) struct Machine<'r> {
    runtime: &'r Runtime,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    max_call_depth: usize,
    depth: usize,
    pending: Vec<Task>,
}

impl<'r> Machine<'r> {
    pub(crate) fn new(
        runtime: &'r Runtime,
        timeout: Option<Duration>,
        max_call_depth: usize,
    ) -> Self {
        Machine {
            runtime,
            timeout,
            deadline: timeout.map(|t| Instant::now() + t),
            max_call_depth,
            depth: 0,
            pending: Vec::new(),
        }
    }

    /// Builds an instance of the entry type and runs its constructor with the bag
    pub(crate) fn construct(
        &mut self,
        entry: &ExportedType,
        bag: &DependencyBag,
    ) -> Result<Arc<Instance>, Exception> {
        let definition = entry.definition();
        let instance = Arc::new(Instance::new(
            entry.unit().clone(),
            entry.index(),
            definition.fields.len(),
        ));
        let args = vec![Value::Bag(Arc::new(bag.clone()))];
        if let Err(exception) = self.execute(&instance, &definition.constructor, args) {
            instance.release_fields();
            return Err(exception);
        }
        Ok(instance)
    }

    /// Calls method `index` of the instance's type
    pub(crate) fn call(
        &mut self,
        instance: &Arc<Instance>,
        index: usize,
        args: Vec<Value>,
    ) -> Result<Value, Exception> {
        let unit = Arc::clone(&instance.unit);
        let method = unit.types()[instance.type_index]
            .methods
            .get(index)
            .ok_or_else(|| invalid_program("method index out of range"))?;
        self.execute(instance, method, args)
    }

    /// Blocks on a task, honoring the deadline
    pub(crate) fn wait(&mut self, task: &Task) -> Result<Value, Exception> {
        self.pending.retain(|t| !t.ptr_eq(task));
        if let Some(result) = task.result() {
            return result;
        }

        match self.deadline {
            Some(deadline) => {
                let waited = self
                    .runtime
                    .block_on(async { tokio::time::timeout_at(deadline, task.wait()).await });
                match waited {
                    Ok(result) => result,
                    Err(_) => {
                        let exception = self.timeout_exception();
                        task.abandon(exception.clone());
                        Err(exception)
                    }
                }
            }
            None => self.runtime.block_on(task.wait()),
        }
    }

    /// Awaits every task started during the invocation and never observed
    pub(crate) fn drain(&mut self) -> Result<(), Exception> {
        while let Some(task) = self.pending.first().cloned() {
            tracing::debug!(task = ?task, "draining unawaited task");
            self.wait(&task)?;
        }
        Ok(())
    }

    fn timeout_exception(&self) -> Exception {
        let millis = self.timeout.map(|t| t.as_millis()).unwrap_or_default();
        Exception::of(
            ExceptionKind::Timeout,
            format!("The invocation did not complete within {} ms", millis),
        )
    }

    fn check_deadline(&self) -> Result<(), Exception> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(self.timeout_exception()),
            _ => Ok(()),
        }
    }

    /// Results of host and library calls may be tasks the script never awaits
    fn track(&mut self, value: &Value) {
        if let Value::Task(task) = value {
            if !task.is_completed() || matches!(task.result(), Some(Err(_))) {
                self.pending.push(task.clone());
            }
        }
    }

    /// A task passed to another call belongs to that call
    fn release(&mut self, args: &[Value]) {
        for arg in args {
            if let Value::Task(task) = arg {
                self.pending.retain(|t| !t.ptr_eq(task));
            }
        }
    }

    fn execute(
        &mut self,
        instance: &Arc<Instance>,
        method: &MethodDef,
        args: Vec<Value>,
    ) -> Result<Value, Exception> {
        if args.len() != method.arity {
            return Err(Exception::of(
                ExceptionKind::ArgumentError,
                format!(
                    "Method '{}.{}' takes {} argument(s), got {}",
                    instance.type_name(),
                    method.name,
                    method.arity,
                    args.len()
                ),
            ));
        }
        if self.depth >= self.max_call_depth {
            return Err(Exception::of(
                ExceptionKind::StackOverflow,
                format!("Call depth exceeded the limit of {}", self.max_call_depth),
            ));
        }

        self.depth += 1;
        let result = self.run_frame(instance, method, args);
        self.depth -= 1;
        result
    }

    fn run_frame(
        &mut self,
        instance: &Arc<Instance>,
        method: &MethodDef,
        args: Vec<Value>,
    ) -> Result<Value, Exception> {
        let chunk = &method.chunk;
        let mut locals = args;
        locals.resize(chunk.locals.max(locals.len()), Value::Null);
        let mut stack: Vec<Value> = Vec::new();
        let mut handlers: Vec<Handler> = Vec::new();
        let mut pc = 0;

        loop {
            let Some(instruction) = chunk.code.get(pc) else {
                return Err(invalid_program("execution ran past the end of a chunk"));
            };
            pc += 1;

            let flow = self.check_deadline().and_then(|_| {
                self.step(*instruction, instance, &mut locals, &mut stack, &mut handlers)
            });

            match flow {
                Ok(Flow::Next) => {}
                Ok(Flow::Jump(target)) => pc = target,
                Ok(Flow::Return(value)) => return Ok(value),
                Err(exception) => {
                    let handler = if exception.is_catchable() {
                        handlers.pop()
                    } else {
                        None
                    };
                    let Some(handler) = handler else {
                        return Err(exception);
                    };
                    stack.truncate(handler.stack_height);
                    match locals.get_mut(handler.slot) {
                        Some(slot) => *slot = Value::exception(exception),
                        None => return Err(invalid_program("handler slot out of range")),
                    }
                    pc = handler.target;
                }
            }
        }
    }

    fn step(
        &mut self,
        instruction: Instruction,
        instance: &Arc<Instance>,
        locals: &mut [Value],
        stack: &mut Vec<Value>,
        handlers: &mut Vec<Handler>,
    ) -> Result<Flow, Exception> {
        let unit = &instance.unit;
        match instruction {
            Instruction::Const(index) => {
                let value = unit
                    .constant(index)
                    .cloned()
                    .ok_or_else(|| invalid_program("constant index out of range"))?;
                stack.push(value);
            }
            Instruction::Pop => {
                pop(stack)?;
            }
            Instruction::Dup => {
                let top = stack
                    .last()
                    .cloned()
                    .ok_or_else(|| invalid_program("evaluation stack underflow"))?;
                stack.push(top);
            }
            Instruction::LoadLocal(slot) => {
                let value = locals
                    .get(slot)
                    .cloned()
                    .ok_or_else(|| invalid_program("local slot out of range"))?;
                stack.push(value);
            }
            Instruction::StoreLocal(slot) => {
                let value = pop(stack)?;
                *locals
                    .get_mut(slot)
                    .ok_or_else(|| invalid_program("local slot out of range"))? = value;
            }
            Instruction::LoadField(index) => {
                let value = instance
                    .fields
                    .lock()
                    .get(index)
                    .cloned()
                    .ok_or_else(|| invalid_program("field index out of range"))?;
                stack.push(value);
            }
            Instruction::StoreField(index) => {
                let value = pop(stack)?;
                *instance
                    .fields
                    .lock()
                    .get_mut(index)
                    .ok_or_else(|| invalid_program("field index out of range"))? = value;
            }
            Instruction::LoadSelf => stack.push(Value::Instance(Arc::clone(instance))),
            Instruction::GetMember(name) => {
                let target = pop(stack)?;
                stack.push(target.get_member(unit.name_constant(name))?);
            }
            Instruction::CallMember { name, argc } => {
                let args = pop_args(stack, argc)?;
                let target = pop(stack)?;
                self.release(&args);
                let result = self.call_member(&target, unit.name_constant(name), args)?;
                self.track(&result);
                stack.push(result);
            }
            Instruction::CallMethod { method, argc } => {
                let args = pop_args(stack, argc)?;
                stack.push(self.call(instance, method, args)?);
            }
            Instruction::CallImport { import, argc } => {
                let args = pop_args(stack, argc)?;
                let builtin = unit
                    .builtin(import)
                    .ok_or_else(|| invalid_program("import index out of range"))?;
                self.release(&args);
                let result = builtin.call(&args)?;
                self.track(&result);
                stack.push(result);
            }
            Instruction::Binary(op) => {
                let right = pop(stack)?;
                let left = pop(stack)?;
                stack.push(binary(op, left, right)?);
            }
            Instruction::Not => {
                let value = pop(stack)?;
                stack.push(Value::Bool(!value.is_truthy()));
            }
            Instruction::Negate => {
                let value = pop(stack)?;
                stack.push(negate(value)?);
            }
            Instruction::Jump(target) => return Ok(Flow::Jump(target)),
            Instruction::JumpIfFalse(target) => {
                if !pop(stack)?.is_truthy() {
                    return Ok(Flow::Jump(target));
                }
            }
            Instruction::JumpIfTrue(target) => {
                if pop(stack)?.is_truthy() {
                    return Ok(Flow::Jump(target));
                }
            }
            Instruction::Await => {
                let value = match pop(stack)? {
                    Value::Task(task) => self.wait(&task)?,
                    other => other,
                };
                stack.push(value);
            }
            Instruction::Throw => return Err(thrown(pop(stack)?)),
            Instruction::EnterTry { handler, slot } => handlers.push(Handler {
                target: handler,
                slot,
                stack_height: stack.len(),
            }),
            Instruction::ExitTry => {
                handlers.pop();
            }
            Instruction::Return => return Ok(Flow::Return(pop(stack)?)),
        }
        Ok(Flow::Next)
    }

    fn call_member(
        &mut self,
        target: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, Exception> {
        match target {
            Value::Null => Err(Exception::of(
                ExceptionKind::NullReference,
                format!("Cannot call method '{}' on a null reference", name),
            )),
            Value::Host(object) => object.call_method(name, &args),
            Value::Instance(instance) => {
                let public = instance
                    .unit
                    .types()
                    .get(instance.type_index)
                    .and_then(|def| def.method(name))
                    .filter(|(_, method)| method.public)
                    .map(|(index, _)| index);
                match public {
                    Some(index) => self.call(instance, index, args),
                    None => Err(Exception::member_not_found(instance.type_name(), name)),
                }
            }
            other => Err(Exception::member_not_found(&other.type_name(), name)),
        }
    }
}

fn invalid_program(message: &str) -> Exception {
    Exception::of(ExceptionKind::InvalidProgram, message)
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, Exception> {
    stack
        .pop()
        .ok_or_else(|| invalid_program("evaluation stack underflow"))
}

fn pop_args(stack: &mut Vec<Value>, argc: usize) -> Result<Vec<Value>, Exception> {
    if stack.len() < argc {
        return Err(invalid_program("evaluation stack underflow"));
    }
    Ok(stack.split_off(stack.len() - argc))
}

/// Exception raised by a `throw` of `value`
fn thrown(value: Value) -> Exception {
    match value {
        Value::Exception(exception) => (*exception).clone(),
        Value::String(message) => Exception::new("Exception", message),
        other => Exception::type_mismatch("exception or string", &other.type_name()),
    }
}

fn negate(value: Value) -> Result<Value, Exception> {
    match value {
        Value::Int(n) => n.checked_neg().map(Value::Int).ok_or_else(|| {
            Exception::of(ExceptionKind::Overflow, format!("Negating {} overflows", n))
        }),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Err(Exception::of(
            ExceptionKind::TypeMismatch,
            format!(
                "Operator '-' cannot be applied to an operand of type '{}'",
                other.type_name()
            ),
        )),
    }
}

fn operand_error(op: BinaryOp, left: &Value, right: &Value) -> Exception {
    Exception::of(
        ExceptionKind::TypeMismatch,
        format!(
            "Operator '{}' cannot be applied to operands of type '{}' and '{}'",
            op,
            left.type_name(),
            right.type_name()
        ),
    )
}

pub(crate) fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, Exception> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::NotEq => Ok(Value::Bool(left != right)),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
            let ordering = match (&left, &right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
                (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                    let (a, b) = (left.as_float()?, right.as_float()?);
                    a.partial_cmp(&b)
                }
                _ => return Err(operand_error(op, &left, &right)),
            };
            let result = match ordering {
                Some(ordering) => match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Gt => ordering.is_gt(),
                    BinaryOp::LtEq => ordering.is_le(),
                    _ => ordering.is_ge(),
                },
                None => false,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) => {
            Ok(Value::String(format!("{}{}", left, right)))
        }
        _ => arithmetic(op, left, right),
    }
}

fn arithmetic(op: BinaryOp, left: Value, right: Value) -> Result<Value, Exception> {
    match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            if b == 0 && matches!(op, BinaryOp::Div | BinaryOp::Mod) {
                return Err(Exception::of(
                    ExceptionKind::DivideByZero,
                    "Attempted to divide by zero",
                ));
            }
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div => a.checked_div(b),
                BinaryOp::Mod => a.checked_rem(b),
                _ => return Err(operand_error(op, &left, &right)),
            };
            result.map(Value::Int).ok_or_else(|| {
                Exception::of(
                    ExceptionKind::Overflow,
                    format!("Arithmetic operation '{} {} {}' overflowed", a, op, b),
                )
            })
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = (left.as_float()?, right.as_float()?);
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Mod => a % b,
                _ => return Err(operand_error(op, &left, &right)),
            };
            Ok(Value::Float(result))
        }
        _ => Err(operand_error(op, &left, &right)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_arithmetic_is_checked() {
        assert_eq!(
            binary(BinaryOp::Add, Value::Int(2), Value::Int(3)).unwrap(),
            Value::Int(5)
        );
        let err = binary(BinaryOp::Mul, Value::Int(i64::MAX), Value::Int(2)).unwrap_err();
        assert!(err.is(ExceptionKind::Overflow));
        let err = binary(BinaryOp::Div, Value::Int(1), Value::Int(0)).unwrap_err();
        assert!(err.is(ExceptionKind::DivideByZero));
        let err = binary(BinaryOp::Mod, Value::Int(1), Value::Int(0)).unwrap_err();
        assert!(err.is(ExceptionKind::DivideByZero));
    }

    #[test]
    fn test_mixed_numbers_promote_to_float() {
        assert_eq!(
            binary(BinaryOp::Div, Value::Int(1), Value::Float(2.0)).unwrap(),
            Value::Float(0.5)
        );
        assert_eq!(
            binary(BinaryOp::Lt, Value::Int(1), Value::Float(1.5)).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_string_concatenation_and_ordering() {
        assert_eq!(
            binary(BinaryOp::Add, Value::from("n="), Value::Int(4)).unwrap(),
            Value::from("n=4")
        );
        assert_eq!(
            binary(BinaryOp::GtEq, Value::from("b"), Value::from("a")).unwrap(),
            Value::Bool(true)
        );
        let err = binary(BinaryOp::Sub, Value::from("a"), Value::Int(1)).unwrap_err();
        assert!(err.is(ExceptionKind::TypeMismatch));
    }

    #[test]
    fn test_thrown_values() {
        assert_eq!(thrown(Value::from("boom")).type_name(), "Exception");
        let exception = Exception::new("Custom", "x");
        assert_eq!(thrown(Value::exception(exception.clone())), exception);
        assert!(thrown(Value::Int(1)).is(ExceptionKind::TypeMismatch));
    }

    #[test]
    fn test_negate() {
        assert_eq!(negate(Value::Int(3)).unwrap(), Value::Int(-3));
        assert!(negate(Value::Int(i64::MIN)).unwrap_err().is(ExceptionKind::Overflow));
        assert!(negate(Value::Null).is_err());
    }
}
