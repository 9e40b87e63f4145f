//! Libraries visible to compiled code
//!
//! A [`Library`] is a named registry of native [`Builtin`] functions. A
//! [`ReferenceSet`] is the ordered list of libraries a source unit is compiled and
//! linked against: free function calls bind to the first library that provides the
//! name, and the binary unit records the binding as an import that the loader links
//! back to the same library.

pub mod stdlib;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::runtime::{Exception, Value};

/// Identifier of the core library
pub const CORE_LIBRARY: &str = "runtime.core";
/// Identifier of the task library
pub const TASKS_LIBRARY: &str = "runtime.tasks";
/// Identifier of the dynamic-binding runtime; required for `.` and `call` on
/// dynamic targets
pub const DYNAMIC_LIBRARY: &str = "runtime.dynamic";

/// Native function callable from compiled code
pub trait Builtin: Send + Sync {
    /// Function name as written in source
    fn name(&self) -> &str;

    /// Short description
    fn description(&self) -> &str;

    /// Execute the function
    fn call(&self, args: &[Value]) -> Result<Value, Exception>;

    /// Accepted argument counts, inclusive; `None` means variadic
    fn arity(&self) -> Option<(usize, usize)> {
        None
    }
}

/// Named registry of builtins
pub struct Library {
    name: String,
    builtins: HashMap<String, Arc<dyn Builtin>>,
}

impl Library {
    /// Create an empty library
    pub fn new(name: impl Into<String>) -> Self {
        Library {
            name: name.into(),
            builtins: HashMap::new(),
        }
    }

    /// Library name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a builtin
    pub fn register<T: Builtin + 'static>(&mut self, builtin: T) {
        let name = builtin.name().to_string();
        self.builtins.insert(name, Arc::new(builtin));
    }

    /// Builder-style [`register`](Self::register)
    pub fn with<T: Builtin + 'static>(mut self, builtin: T) -> Self {
        self.register(builtin);
        self
    }

    /// Get builtin by exact name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Builtin>> {
        self.builtins.get(name).cloned()
    }

    /// Check if builtin exists
    pub fn has(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    /// List all builtin names
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<_> = self.builtins.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get builtin count
    pub fn count(&self) -> usize {
        self.builtins.len()
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("builtins", &self.list())
            .finish()
    }
}

/// One entry of a reference set
#[derive(Debug, Clone)]
pub struct Reference {
    /// Identifier recorded in binary imports
    pub identifier: String,
    /// Library handle
    pub library: Arc<Library>,
}

impl Reference {
    /// Reference a library under its own name
    pub fn new(library: Library) -> Self {
        Reference {
            identifier: library.name().to_string(),
            library: Arc::new(library),
        }
    }

    /// Reference a shared library under its own name
    pub fn shared(library: Arc<Library>) -> Self {
        Reference {
            identifier: library.name().to_string(),
            library,
        }
    }
}

/// A builtin resolved through a reference set
#[derive(Clone)]
pub struct ResolvedBuiltin {
    /// Identifier of the reference that provided it
    pub library: String,
    /// The builtin
    pub builtin: Arc<dyn Builtin>,
}

/// Ordered collection of library references
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    references: Vec<Reference>,
}

impl ReferenceSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// The host's standard libraries: core, tasks and the dynamic-binding runtime
    pub fn standard() -> Self {
        ReferenceSet::new()
            .with(stdlib::core())
            .with(stdlib::tasks())
            .with(stdlib::dynamic())
    }

    /// Append a library
    pub fn push(&mut self, library: Library) {
        self.references.push(Reference::new(library));
    }

    /// Append a reference
    pub fn push_reference(&mut self, reference: Reference) {
        self.references.push(reference);
    }

    /// Builder-style [`push`](Self::push)
    pub fn with(mut self, library: Library) -> Self {
        self.push(library);
        self
    }

    /// Builder-style [`push_reference`](Self::push_reference)
    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.push_reference(reference);
        self
    }

    /// References in order
    pub fn iter(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter()
    }

    /// Number of references, duplicates included
    pub fn len(&self) -> usize {
        self.references.len()
    }

    /// True when no library is referenced
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// True if a reference with this identifier is present
    pub fn contains(&self, identifier: &str) -> bool {
        self.references.iter().any(|r| r.identifier == identifier)
    }

    /// First reference with this identifier
    pub fn library(&self, identifier: &str) -> Option<&Arc<Library>> {
        self.references
            .iter()
            .find(|r| r.identifier == identifier)
            .map(|r| &r.library)
    }

    /// Identifiers that appear more than once, in order of their second appearance
    pub fn duplicates(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut duplicates = Vec::new();
        for reference in &self.references {
            if !seen.insert(reference.identifier.as_str())
                && !duplicates.contains(&reference.identifier)
            {
                duplicates.push(reference.identifier.clone());
            }
        }
        duplicates
    }

    /// Resolve a function name; the first library providing it wins
    pub fn resolve(&self, function: &str) -> Option<ResolvedBuiltin> {
        self.references.iter().find_map(|r| {
            r.library.get(function).map(|builtin| ResolvedBuiltin {
                library: r.identifier.clone(),
                builtin,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Answer(&'static str);

    impl Builtin for Answer {
        fn name(&self) -> &str {
            "answer"
        }

        fn description(&self) -> &str {
            "Returns a fixed string"
        }

        fn call(&self, _args: &[Value]) -> Result<Value, Exception> {
            Ok(Value::from(self.0))
        }

        fn arity(&self) -> Option<(usize, usize)> {
            Some((0, 0))
        }
    }

    #[test]
    fn test_library_registration() {
        let library = Library::new("test.lib").with(Answer("a"));
        assert!(library.has("answer"));
        assert!(!library.has("question"));
        assert_eq!(library.count(), 1);
        assert_eq!(library.get("answer").unwrap().call(&[]).unwrap(), Value::from("a"));
    }

    #[test]
    fn test_first_library_wins() {
        let refs = ReferenceSet::new()
            .with(Library::new("first").with(Answer("first")))
            .with(Library::new("second").with(Answer("second")));

        let resolved = refs.resolve("answer").unwrap();
        assert_eq!(resolved.library, "first");
        assert_eq!(resolved.builtin.call(&[]).unwrap(), Value::from("first"));
        assert!(refs.resolve("missing").is_none());
    }

    #[test]
    fn test_duplicates_are_reported_once() {
        let refs = ReferenceSet::standard()
            .with(stdlib::core())
            .with(stdlib::core());
        assert_eq!(refs.duplicates(), vec![CORE_LIBRARY.to_string()]);
        assert_eq!(refs.len(), 5);
    }

    #[test]
    fn test_standard_set() {
        let refs = ReferenceSet::standard();
        assert!(refs.contains(CORE_LIBRARY));
        assert!(refs.contains(TASKS_LIBRARY));
        assert!(refs.contains(DYNAMIC_LIBRARY));
        assert!(refs.resolve("str").is_some());
        assert!(refs.resolve("delay").is_some());
        assert!(refs.duplicates().is_empty());
    }
}
