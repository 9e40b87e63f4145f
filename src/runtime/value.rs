use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::bag::DependencyBag;
use super::exception::{Exception, ExceptionKind};
use super::host::HostObject;
use super::task::Task;
use crate::loader::LoadedUnit;

/// Runtime value representation
#[derive(Clone)]
pub enum Value {
    // Primitives
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit integer value
    Int(i64),
    /// 64-bit floating-point value
    Float(f64),
    /// String value
    String(String),

    // Collections (use Arc for large values)
    /// Array of values (reference-counted)
    Array(Arc<Vec<Value>>),
    /// Object with string keys and value fields (reference-counted)
    Object(Arc<HashMap<String, Value>>),

    // Host interop
    /// Dependency bag injected into a constructor
    Bag(Arc<DependencyBag>),
    /// Live object supplied by the host; members resolve at call time
    Host(Arc<dyn HostObject>),

    // Compiled code
    /// Instance of a loaded type
    Instance(Arc<Instance>),
    /// Asynchronous operation handle
    Task(Task),
    /// Exception value (created by `error`, bound by `catch`)
    Exception(Arc<Exception>),
}

/// Instance of a type from a loaded unit
pub struct Instance {
    pub(crate) unit: Arc<LoadedUnit>,
    pub(crate) type_index: usize,
    pub(crate) fields: Mutex<Vec<Value>>,
}

impl Instance {
    pub(crate) fn new(unit: Arc<LoadedUnit>, type_index: usize, field_count: usize) -> Self {
        Instance {
            unit,
            type_index,
            fields: Mutex::new(vec![Value::Null; field_count]),
        }
    }

    /// Name of the instance's type
    pub fn type_name(&self) -> &str {
        &self.unit.types()[self.type_index].name
    }

    /// Reads a field by name
    pub fn field(&self, name: &str) -> Option<Value> {
        let def = &self.unit.types()[self.type_index];
        let index = def.fields.iter().position(|f| f == name)?;
        self.fields.lock().get(index).cloned()
    }

    /// Resets every field to null, dropping values that may refer back to the
    /// instance so its unit can be released
    pub(crate) fn release_fields(&self) {
        let released = {
            let mut fields = self.fields.lock();
            let count = fields.len();
            std::mem::replace(&mut *fields, vec![Value::Null; count])
        };
        drop(released);
    }
}

impl Value {
    /// Creates an array value from a vector of values
    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(Arc::new(values))
    }

    /// Creates an object value from a hashmap of fields
    pub fn object(fields: HashMap<String, Value>) -> Self {
        Value::Object(Arc::new(fields))
    }

    /// Wraps a host object
    pub fn host<T: HostObject + 'static>(object: T) -> Self {
        Value::Host(Arc::new(object))
    }

    /// Wraps an exception
    pub fn exception(exception: Exception) -> Self {
        Value::Exception(Arc::new(exception))
    }

    /// Returns the type name as a string
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Object(_) => "object".to_string(),
            Value::Bag(_) => "DependencyBag".to_string(),
            Value::Host(object) => object.type_name().to_string(),
            Value::Instance(instance) => instance.type_name().to_string(),
            Value::Task(_) => "task".to_string(),
            Value::Exception(_) => "exception".to_string(),
        }
    }

    /// Returns true if the value is truthy in a boolean context
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(arr) => !arr.is_empty(),
            Value::Object(obj) => !obj.is_empty(),
            _ => true,
        }
    }

    // Type conversion methods

    /// Converts value to a 64-bit integer
    pub fn as_int(&self) -> Result<i64, Exception> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Float(f) => Ok(*f as i64),
            _ => Err(Exception::type_mismatch("int", &self.type_name())),
        }
    }

    /// Converts value to a 64-bit floating-point number
    pub fn as_float(&self) -> Result<f64, Exception> {
        match self {
            Value::Float(f) => Ok(*f),
            Value::Int(n) => Ok(*n as f64),
            _ => Err(Exception::type_mismatch("float", &self.type_name())),
        }
    }

    /// Borrows the string contents
    pub fn as_str(&self) -> Result<&str, Exception> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(Exception::type_mismatch("string", &self.type_name())),
        }
    }

    /// Borrows the array elements
    pub fn as_array(&self) -> Result<&[Value], Exception> {
        match self {
            Value::Array(items) => Ok(items),
            _ => Err(Exception::type_mismatch("array", &self.type_name())),
        }
    }

    /// Reads a member by name, as the `.` form does
    pub fn get_member(&self, name: &str) -> Result<Value, Exception> {
        let found = match self {
            Value::Null => {
                return Err(Exception::of(
                    ExceptionKind::NullReference,
                    format!("Cannot read member '{}' of a null reference", name),
                ))
            }
            Value::Bag(bag) => bag.get(name).cloned(),
            Value::Object(fields) => fields.get(name).cloned(),
            Value::Host(object) => object.get_member(name),
            Value::Instance(instance) => instance.field(name),
            Value::Exception(exception) => match name {
                "type" => Some(Value::String(exception.type_name().to_string())),
                "message" => Some(Value::String(exception.message().to_string())),
                "cause" => Some(
                    exception
                        .cause()
                        .map(|c| Value::exception(c.clone()))
                        .unwrap_or(Value::Null),
                ),
                _ => None,
            },
            Value::Array(items) if name == "length" => Some(Value::Int(items.len() as i64)),
            Value::String(s) if name == "length" => Some(Value::Int(s.chars().count() as i64)),
            Value::Task(task) if name == "completed" => Some(Value::Bool(task.is_completed())),
            _ => None,
        };
        found.ok_or_else(|| Exception::member_not_found(&self.type_name(), name))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(arr) => {
                write!(f, "[")?;
                for (i, val) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", val)?;
                }
                write!(f, "]")
            }
            Value::Object(obj) => {
                let mut keys: Vec<_> = obj.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, obj[key])?;
                }
                write!(f, "}}")
            }
            Value::Bag(bag) => write!(f, "DependencyBag({})", bag.names().join(", ")),
            Value::Host(object) => write!(f, "{}", object.type_name()),
            Value::Instance(instance) => write!(f, "{}", instance.type_name()),
            Value::Task(task) => write!(f, "{:?}", task),
            Value::Exception(exception) => write!(f, "{}", exception),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Host(object) => write!(f, "Host({})", object.type_name()),
            Value::Instance(instance) => write!(f, "Instance({})", instance.type_name()),
            Value::Exception(exception) => write!(f, "Exception({})", exception),
            other => write!(f, "{}", other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Bag(a), Value::Bag(b)) => Arc::ptr_eq(a, b),
            (Value::Host(a), Value::Host(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            (Value::Instance(a), Value::Instance(b)) => Arc::ptr_eq(a, b),
            (Value::Task(a), Value::Task(b)) => a.ptr_eq(b),
            (Value::Exception(a), Value::Exception(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::array(values)
    }
}

impl From<Task> for Value {
    fn from(task: Task) -> Self {
        Value::Task(task)
    }
}

impl From<Exception> for Value {
    fn from(exception: Exception) -> Self {
        Value::exception(exception)
    }
}

impl From<Arc<dyn HostObject>> for Value {
    fn from(object: Arc<dyn HostObject>) -> Self {
        Value::Host(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;

    impl HostObject for Probe {
        fn type_name(&self) -> &str {
            "Probe"
        }

        fn get_member(&self, name: &str) -> Option<Value> {
            (name == "answer").then(|| Value::Int(42))
        }
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::host(Probe).is_truthy());
    }

    #[test]
    fn test_host_member_lookup() {
        let probe = Value::host(Probe);
        assert_eq!(probe.get_member("answer").unwrap(), Value::Int(42));

        let err = probe.get_member("question").unwrap_err();
        assert!(err.is(ExceptionKind::MemberNotFound));
        assert!(err.message().contains("'Probe'"));
    }

    #[test]
    fn test_null_member_is_null_reference() {
        let err = Value::Null.get_member("x").unwrap_err();
        assert!(err.is(ExceptionKind::NullReference));
    }

    #[test]
    fn test_exception_members() {
        let value = Value::exception(
            Exception::new("Outer", "top").with_cause(Exception::new("Inner", "bottom")),
        );
        assert_eq!(value.get_member("type").unwrap(), Value::from("Outer"));
        let cause = value.get_member("cause").unwrap();
        assert_eq!(cause.get_member("message").unwrap(), Value::from("bottom"));
        assert_eq!(
            cause.get_member("cause").unwrap(),
            Value::Null,
            "innermost cause has no cause"
        );
    }

    #[test]
    fn test_numeric_equality_crosses_int_and_float() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::from("2"));
    }

    #[test]
    fn test_host_identity() {
        let probe: Arc<dyn HostObject> = Arc::new(Probe);
        let a = Value::from(probe.clone());
        let b = Value::from(probe);
        assert_eq!(a, b);
        assert_ne!(a, Value::host(Probe));
    }

    #[test]
    fn test_display() {
        let value = Value::array(vec![Value::Int(1), Value::from("two"), Value::Null]);
        assert_eq!(value.to_string(), "[1, two, null]");
    }
}
