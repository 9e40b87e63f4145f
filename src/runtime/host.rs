use super::exception::Exception;
use super::value::Value;

/// Live object supplied by the host through the dependency bag
///
/// Compiled code reaches host objects only by name at run time: `(. obj name)`
/// calls [`get_member`](HostObject::get_member) and `(call obj name args...)` calls
/// [`call_method`](HostObject::call_method). Returning a
/// [`Task`](super::Task) from a method makes the call awaitable.
pub trait HostObject: Send + Sync {
    /// Type name used in messages and cause chains
    fn type_name(&self) -> &str;

    /// Reads a property; `None` means the member does not exist
    fn get_member(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Calls a method with positional arguments
    fn call_method(&self, name: &str, _args: &[Value]) -> Result<Value, Exception> {
        Err(Exception::member_not_found(self.type_name(), name))
    }
}
