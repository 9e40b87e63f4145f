use std::collections::HashMap;
use std::sync::Arc;

use super::exception::Exception;
use super::host::HostObject;
use super::value::Value;

/// Named, schema-less container of values injected into a compiled type
///
/// Nothing is checked when the bag is built. Compiled code resolves members by name
/// when it runs, and a missing name fails at that point with `MemberNotFound`.
#[derive(Debug, Clone, Default)]
pub struct DependencyBag {
    members: HashMap<String, Value>,
}

impl DependencyBag {
    /// Creates an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a member
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.members.insert(name.into(), value.into())
    }

    /// Adds a live host object
    pub fn insert_host<T: HostObject + 'static>(&mut self, name: impl Into<String>, object: T) {
        self.members
            .insert(name.into(), Value::Host(Arc::new(object)));
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Builder-style [`insert_host`](Self::insert_host)
    pub fn with_host<T: HostObject + 'static>(
        mut self,
        name: impl Into<String>,
        object: T,
    ) -> Self {
        self.insert_host(name, object);
        self
    }

    /// Looks a member up without failing
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.members.get(name)
    }

    /// Looks a member up, failing with `MemberNotFound` when absent
    pub fn resolve(&self, name: &str) -> Result<&Value, Exception> {
        self.members
            .get(name)
            .ok_or_else(|| Exception::member_not_found("DependencyBag", name))
    }

    /// Removes a member
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.members.remove(name)
    }

    /// Member names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.members.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when the bag holds no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ExceptionKind;

    #[test]
    fn test_builder_and_lookup() {
        let bag = DependencyBag::new()
            .with("message", "HELLO!")
            .with("count", 3);

        assert_eq!(bag.get("message"), Some(&Value::from("HELLO!")));
        assert_eq!(bag.resolve("count").unwrap(), &Value::Int(3));
        assert_eq!(bag.names(), vec!["count".to_string(), "message".to_string()]);
    }

    #[test]
    fn test_missing_member_fails_on_resolve_only() {
        let bag = DependencyBag::new();
        assert!(bag.is_empty());
        let err = bag.resolve("Message").unwrap_err();
        assert!(err.is(ExceptionKind::MemberNotFound));
    }

    #[test]
    fn test_insert_replaces() {
        let mut bag = DependencyBag::new();
        assert!(bag.insert("x", 1).is_none());
        assert_eq!(bag.insert("x", 2), Some(Value::Int(1)));
        assert_eq!(bag.len(), 1);
    }
}
