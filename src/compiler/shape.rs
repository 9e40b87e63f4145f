//! Shape contract of a source unit
//!
//! A unit must export exactly one type whose constructor takes a single dependency
//! parameter and whose entry method is public and parameterless. Types and their
//! members must have unique names.

use std::collections::HashSet;

use super::diagnostic::{codes, Diagnostic, Severity};
use super::CompileOptions;
use crate::parser::{ClassDecl, Member, SyntaxTree};

/// Checks the tree against the shape contract
pub fn check(tree: &SyntaxTree, options: &CompileOptions) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let mut type_names = HashSet::new();
    for class in &tree.classes {
        if !type_names.insert(class.name.as_str()) {
            diagnostics.push(Diagnostic::error(
                codes::DUPLICATE_TYPE,
                format!("The unit already contains a definition for '{}'", class.name),
                class.span,
            ));
        }
        check_members(class, &mut diagnostics);
    }

    let exported: Vec<&ClassDecl> = tree.exported().collect();
    let Some(entry_type) = exported.first() else {
        diagnostics.push(Diagnostic::new(
            codes::NO_EXPORTED_TYPE,
            Severity::Error,
            "The unit does not export a type",
            None,
        ));
        return diagnostics;
    };

    if exported.len() > 1 {
        let severity = if options.allow_multiple_exports {
            Severity::Warning
        } else {
            Severity::Error
        };
        diagnostics.push(Diagnostic::new(
            codes::MULTIPLE_EXPORTED_TYPES,
            severity,
            format!(
                "The unit exports {} types; exactly one is expected ('{}' is used)",
                exported.len(),
                entry_type.name
            ),
            Some(exported[1].span),
        ));
    }

    check_entry_type(entry_type, &options.entry_method, &mut diagnostics);
    diagnostics
}

fn check_members(class: &ClassDecl, diagnostics: &mut Vec<Diagnostic>) {
    let mut names: HashSet<&str> = class.params.iter().map(String::as_str).collect();
    if names.len() != class.params.len() {
        diagnostics.push(Diagnostic::error(
            codes::DUPLICATE_MEMBER,
            format!("Constructor of '{}' repeats a parameter name", class.name),
            class.span,
        ));
    }

    for member in &class.members {
        let (name, span) = match member {
            Member::Field { name, span, .. } => (name, *span),
            Member::Method(method) => (&method.name, method.span),
            Member::Init { .. } => continue,
        };
        if !names.insert(name.as_str()) {
            diagnostics.push(Diagnostic::error(
                codes::DUPLICATE_MEMBER,
                format!(
                    "Type '{}' already defines a member called '{}'",
                    class.name, name
                ),
                span,
            ));
        }
    }
}

fn check_entry_type(class: &ClassDecl, entry_method: &str, diagnostics: &mut Vec<Diagnostic>) {
    if class.params.len() != 1 {
        diagnostics.push(Diagnostic::error(
            codes::CONSTRUCTOR_SHAPE,
            format!(
                "Constructor of '{}' must take exactly one dependency parameter, found {}",
                class.name,
                class.params.len()
            ),
            class.span,
        ));
    }

    let Some(method) = class.method(entry_method) else {
        diagnostics.push(Diagnostic::error(
            codes::ENTRY_METHOD_MISSING,
            format!(
                "Type '{}' does not define an entry method '{}'",
                class.name, entry_method
            ),
            class.span,
        ));
        return;
    };

    if !method.public {
        diagnostics.push(Diagnostic::error(
            codes::ENTRY_METHOD_NOT_PUBLIC,
            format!("Entry method '{}.{}' must be public", class.name, method.name),
            method.span,
        ));
    }
    if !method.params.is_empty() {
        diagnostics.push(Diagnostic::error(
            codes::ENTRY_METHOD_HAS_PARAMETERS,
            format!(
                "Entry method '{}.{}' must not take parameters, found {}",
                class.name,
                method.name,
                method.params.len()
            ),
            method.span,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::SExprScanner;
    use crate::parser::SExprParser;

    fn shape(source: &str, options: &CompileOptions) -> Vec<Diagnostic> {
        let tokens = SExprScanner::new(source).scan_tokens().unwrap();
        let tree = SExprParser::new(tokens).parse().unwrap();
        check(&tree, options)
    }

    fn ids(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_valid_unit() {
        let d = shape(
            "(defclass Script (deps) (defmethod process () 1))",
            &CompileOptions::default(),
        );
        assert!(d.is_empty(), "{:?}", d);
    }

    #[test]
    fn test_no_exported_type() {
        let d = shape(
            "(defclass- Hidden (deps) (defmethod process () 1))",
            &CompileOptions::default(),
        );
        assert_eq!(ids(&d), vec![codes::NO_EXPORTED_TYPE]);
    }

    #[test]
    fn test_multiple_exports_policy() {
        let source = "(defclass A (d) (defmethod process () 1)) (defclass B (d) (defmethod process () 2))";

        let strict = shape(source, &CompileOptions::default());
        assert_eq!(ids(&strict), vec![codes::MULTIPLE_EXPORTED_TYPES]);
        assert_eq!(strict[0].severity, Severity::Error);

        let lenient = shape(source, &CompileOptions::default().allow_multiple_exports(true));
        assert_eq!(lenient[0].severity, Severity::Warning);
        assert!(lenient[0].message.contains("'A'"));
    }

    #[test]
    fn test_entry_method_rules() {
        let options = CompileOptions::default();
        assert_eq!(
            ids(&shape("(defclass S (d) (defmethod run () 1))", &options)),
            vec![codes::ENTRY_METHOD_MISSING]
        );
        assert_eq!(
            ids(&shape("(defclass S (d) (defmethod- process () 1))", &options)),
            vec![codes::ENTRY_METHOD_NOT_PUBLIC]
        );
        assert_eq!(
            ids(&shape("(defclass S (d) (defmethod process (x) x))", &options)),
            vec![codes::ENTRY_METHOD_HAS_PARAMETERS]
        );
        assert_eq!(
            ids(&shape("(defclass S () (defmethod process () 1))", &options)),
            vec![codes::CONSTRUCTOR_SHAPE]
        );
    }

    #[test]
    fn test_custom_entry_method() {
        let d = shape(
            "(defclass S (d) (defmethod run () 1))",
            &CompileOptions::default().entry_method("run"),
        );
        assert!(d.is_empty());
    }

    #[test]
    fn test_duplicates() {
        let d = shape(
            "(defclass- T (d) (defmethod x () 1)) (defclass- T (d) (field d 1) (defmethod x () 1) (defmethod x () 2))
             (defclass S (d) (defmethod process () 1))",
            &CompileOptions::default(),
        );
        assert_eq!(
            ids(&d),
            vec![codes::DUPLICATE_TYPE, codes::DUPLICATE_MEMBER, codes::DUPLICATE_MEMBER]
        );
    }
}
