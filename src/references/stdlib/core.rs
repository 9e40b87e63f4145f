//! Core functions - strings, output, lists and exception values

use super::{arg_count, OutputSink};
use crate::references::{Builtin, Library};
use crate::runtime::{Exception, ExceptionKind, Value};

/// Register all core functions
pub fn register(library: &mut Library, sink: Option<OutputSink>) {
    library.register(StrBuiltin);
    library.register(PrintBuiltin { sink });
    library.register(ListBuiltin);
    library.register(LenBuiltin);
    library.register(NthBuiltin);
    library.register(ErrorBuiltin);
    library.register(TypeOfBuiltin);
}

fn concat(args: &[Value]) -> String {
    args.iter().map(|v| v.to_string()).collect()
}

/// str - Concatenate the display form of all arguments
pub struct StrBuiltin;

impl Builtin for StrBuiltin {
    fn name(&self) -> &str {
        "str"
    }

    fn description(&self) -> &str {
        "Concatenate values into a string"
    }

    fn call(&self, args: &[Value]) -> Result<Value, Exception> {
        Ok(Value::String(concat(args)))
    }
}

/// print - Write the concatenated arguments as one line
pub struct PrintBuiltin {
    sink: Option<OutputSink>,
}

impl Builtin for PrintBuiltin {
    fn name(&self) -> &str {
        "print"
    }

    fn description(&self) -> &str {
        "Print values followed by a newline"
    }

    fn call(&self, args: &[Value]) -> Result<Value, Exception> {
        let line = concat(args);
        match &self.sink {
            Some(sink) => sink.lock().push(line),
            None => println!("{}", line),
        }
        Ok(Value::Null)
    }
}

/// list - Build an array
pub struct ListBuiltin;

impl Builtin for ListBuiltin {
    fn name(&self) -> &str {
        "list"
    }

    fn description(&self) -> &str {
        "Create an array from the arguments"
    }

    fn call(&self, args: &[Value]) -> Result<Value, Exception> {
        Ok(Value::array(args.to_vec()))
    }
}

/// len - Length of a string, array or object
pub struct LenBuiltin;

impl Builtin for LenBuiltin {
    fn name(&self) -> &str {
        "len"
    }

    fn description(&self) -> &str {
        "Number of elements in a collection or characters in a string"
    }

    fn call(&self, args: &[Value]) -> Result<Value, Exception> {
        let [value] = args else {
            return Err(arg_count("len", "1", args.len()));
        };
        let len = match value {
            Value::String(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            Value::Object(fields) => fields.len(),
            Value::Bag(bag) => bag.len(),
            other => {
                return Err(Exception::type_mismatch(
                    "string, array or object",
                    &other.type_name(),
                ))
            }
        };
        Ok(Value::Int(len as i64))
    }

    fn arity(&self) -> Option<(usize, usize)> {
        Some((1, 1))
    }
}

/// nth - Element of an array by index
pub struct NthBuiltin;

impl Builtin for NthBuiltin {
    fn name(&self) -> &str {
        "nth"
    }

    fn description(&self) -> &str {
        "Get the element at an index"
    }

    fn call(&self, args: &[Value]) -> Result<Value, Exception> {
        let [collection, index] = args else {
            return Err(arg_count("nth", "2", args.len()));
        };
        let items = collection.as_array()?;
        let index = index.as_int()?;
        usize::try_from(index)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .ok_or_else(|| {
                Exception::of(
                    ExceptionKind::IndexOutOfRange,
                    format!("Index {} out of range for array of length {}", index, items.len()),
                )
            })
    }

    fn arity(&self) -> Option<(usize, usize)> {
        Some((2, 2))
    }
}

/// error - Build an exception value: `(error type message cause?)`
pub struct ErrorBuiltin;

impl Builtin for ErrorBuiltin {
    fn name(&self) -> &str {
        "error"
    }

    fn description(&self) -> &str {
        "Create an exception with an optional inner cause"
    }

    fn call(&self, args: &[Value]) -> Result<Value, Exception> {
        let (type_name, message, cause) = match args {
            [t, m] => (t, m, &Value::Null),
            [t, m, c] => (t, m, c),
            _ => return Err(arg_count("error", "2 or 3", args.len())),
        };

        let mut exception = Exception::new(type_name.as_str()?, message.to_string());
        match cause {
            Value::Null => {}
            Value::Exception(inner) => exception = exception.with_cause((**inner).clone()),
            other => return Err(Exception::type_mismatch("exception or null", &other.type_name())),
        }
        Ok(Value::exception(exception))
    }

    fn arity(&self) -> Option<(usize, usize)> {
        Some((2, 3))
    }
}

/// type-of - Type name of a value
pub struct TypeOfBuiltin;

impl Builtin for TypeOfBuiltin {
    fn name(&self) -> &str {
        "type-of"
    }

    fn description(&self) -> &str {
        "Get the type name of a value"
    }

    fn call(&self, args: &[Value]) -> Result<Value, Exception> {
        let [value] = args else {
            return Err(arg_count("type-of", "1", args.len()));
        };
        Ok(Value::String(value.type_name()))
    }

    fn arity(&self) -> Option<(usize, usize)> {
        Some((1, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_str_concatenates_display_forms() {
        let result = StrBuiltin
            .call(&[Value::from("n="), Value::Int(3), Value::Null])
            .unwrap();
        assert_eq!(result, Value::from("n=3null"));
    }

    #[test]
    fn test_print_into_sink() {
        let sink: OutputSink = Arc::new(Mutex::new(Vec::new()));
        let print = PrintBuiltin {
            sink: Some(sink.clone()),
        };
        print.call(&[Value::from("Message: "), Value::from("hi")]).unwrap();
        assert_eq!(*sink.lock(), vec!["Message: hi".to_string()]);
    }

    #[test]
    fn test_nth_bounds() {
        let items = Value::array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(NthBuiltin.call(&[items.clone(), Value::Int(1)]).unwrap(), Value::Int(2));
        let err = NthBuiltin.call(&[items, Value::Int(5)]).unwrap_err();
        assert!(err.is(ExceptionKind::IndexOutOfRange));
    }

    #[test]
    fn test_error_nests_cause() {
        let inner = ErrorBuiltin
            .call(&[Value::from("Inner"), Value::from("root cause")])
            .unwrap();
        let outer = ErrorBuiltin
            .call(&[Value::from("Outer"), Value::from("wrapper"), inner])
            .unwrap();

        match outer {
            Value::Exception(exception) => {
                assert_eq!(exception.type_name(), "Outer");
                assert_eq!(exception.cause().unwrap().message(), "root cause");
            }
            other => panic!("expected exception, got {:?}", other),
        }
    }

    #[test]
    fn test_error_rejects_non_exception_cause() {
        let err = ErrorBuiltin
            .call(&[Value::from("A"), Value::from("b"), Value::Int(1)])
            .unwrap_err();
        assert!(err.is(ExceptionKind::TypeMismatch));
    }

    #[test]
    fn test_len_and_type_of() {
        assert_eq!(LenBuiltin.call(&[Value::from("héllo")]).unwrap(), Value::Int(5));
        assert_eq!(TypeOfBuiltin.call(&[Value::Float(1.5)]).unwrap(), Value::from("float"));
    }
}
