//! # Script Compiler - source unit to binary unit
//!
//! Compiles a source unit against a reference set into a binary image that the
//! [`loader`](crate::loader) can bring into the process.
//!
//! ## Architecture
//!
//! ```text
//! Source → Tokens → Syntax tree → Shape check → Bind + generate → Unit → Image
//! ```
//!
//! Every problem found along the way becomes a [`Diagnostic`]. A binary is emitted
//! only when no diagnostic is an error or an escalated warning.
//!
//! ## Usage
//!
//! ```ignore
//! use scriptrunner::compiler::{CompileOptions, Compiler, SourceUnit};
//! use scriptrunner::references::ReferenceSet;
//!
//! let source = SourceUnit::new("(defclass Script (deps) (defmethod process () 42))");
//! let compiler = Compiler::new(CompileOptions::default());
//! let result = compiler.compile(&source, &ReferenceSet::standard(), "scripts")?;
//! assert!(result.is_success());
//! ```

pub mod codegen;
pub mod diagnostic;
pub mod emit;
pub mod instruction;
pub mod shape;

pub use diagnostic::{codes, Diagnostic, Severity};
pub use instruction::{Chunk, Constant, Import, Instruction, MethodDef, TypeDef, Unit};

use crate::references::ReferenceSet;
use crate::{Result, SExprParser as Parser, SExprScanner as Scanner};

/// Entry method invoked when nothing else is configured
pub const DEFAULT_ENTRY_METHOD: &str = "process";

/// Program text to compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    text: String,
}

impl SourceUnit {
    /// Wraps program text
    pub fn new(text: impl Into<String>) -> Self {
        SourceUnit { text: text.into() }
    }

    /// The program text
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl From<&str> for SourceUnit {
    fn from(text: &str) -> Self {
        SourceUnit::new(text)
    }
}

/// Compilation options
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Treat every warning as an error
    pub warnings_as_errors: bool,
    /// Warning ids treated as errors
    pub escalate: Vec<String>,
    /// Warning and info ids dropped from the output
    pub suppress: Vec<String>,
    /// Accept more than one exported type; the first one is used
    pub allow_multiple_exports: bool,
    /// Name of the entry method required by the shape check
    pub entry_method: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            warnings_as_errors: false,
            escalate: Vec::new(),
            suppress: Vec::new(),
            allow_multiple_exports: false,
            entry_method: DEFAULT_ENTRY_METHOD.to_string(),
        }
    }
}

impl CompileOptions {
    /// Treat every warning as an error
    pub fn warnings_as_errors(mut self, enabled: bool) -> Self {
        self.warnings_as_errors = enabled;
        self
    }

    /// Treat one warning id as an error
    pub fn escalate(mut self, id: impl Into<String>) -> Self {
        self.escalate.push(id.into());
        self
    }

    /// Drop one warning or info id
    pub fn suppress(mut self, id: impl Into<String>) -> Self {
        self.suppress.push(id.into());
        self
    }

    /// Lenient export policy
    pub fn allow_multiple_exports(mut self, enabled: bool) -> Self {
        self.allow_multiple_exports = enabled;
        self
    }

    /// Entry method name
    pub fn entry_method(mut self, name: impl Into<String>) -> Self {
        self.entry_method = name.into();
        self
    }

    fn is_escalated(&self, id: &str) -> bool {
        self.warnings_as_errors || self.escalate.iter().any(|e| e == id)
    }

    fn is_suppressed(&self, id: &str) -> bool {
        self.suppress.iter().any(|s| s == id)
    }
}

/// Outcome of one compile call
#[derive(Debug, Clone, PartialEq)]
pub enum CompilationResult {
    /// A binary image was produced
    Success {
        /// The image
        binary: Vec<u8>,
        /// Diagnostics that did not prevent emission
        diagnostics: Vec<Diagnostic>,
    },
    /// No image was produced
    Failure {
        /// All diagnostics, at least one of them failing
        diagnostics: Vec<Diagnostic>,
    },
}

impl CompilationResult {
    /// True when a binary was produced
    pub fn is_success(&self) -> bool {
        matches!(self, CompilationResult::Success { .. })
    }

    /// All diagnostics in the order they were produced
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompilationResult::Success { diagnostics, .. }
            | CompilationResult::Failure { diagnostics } => diagnostics,
        }
    }

    /// Diagnostics that failed the compilation
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics().iter().filter(|d| d.is_failure())
    }

    /// The binary image, if one was produced
    pub fn binary(&self) -> Option<&[u8]> {
        match self {
            CompilationResult::Success { binary, .. } => Some(binary),
            CompilationResult::Failure { .. } => None,
        }
    }
}

/// Source unit compiler
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    /// Create a new compiler with options
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Options in effect
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile a source unit into a binary image named `library_name`
    ///
    /// Diagnostics are part of the `Ok` value; `Err` is reserved for failures to
    /// write the image.
    pub fn compile(
        &self,
        source: &SourceUnit,
        refs: &ReferenceSet,
        library_name: &str,
    ) -> Result<CompilationResult> {
        let mut diagnostics = Vec::new();

        // Phase 1: Scan
        let tokens = match Scanner::new(source.text()).scan_tokens() {
            Ok(tokens) => tokens,
            Err(e) => {
                diagnostics.push(front_end_diagnostic(codes::LEXICAL_ERROR, &e));
                return Ok(self.finish(diagnostics, None, library_name));
            }
        };

        // Phase 2: Parse
        let tree = match Parser::new(tokens).parse() {
            Ok(tree) => tree,
            Err(e) => {
                diagnostics.push(front_end_diagnostic(codes::SYNTAX_ERROR, &e));
                return Ok(self.finish(diagnostics, None, library_name));
            }
        };

        // Phase 3: Reference check
        for identifier in refs.duplicates() {
            diagnostics.push(Diagnostic::new(
                codes::DUPLICATE_REFERENCE,
                Severity::Info,
                format!("Library '{}' is referenced more than once", identifier),
                None,
            ));
        }

        // Phase 4: Shape check
        diagnostics.extend(shape::check(&tree, &self.options));

        // Phase 5: Bind + generate
        let (unit, generated) = codegen::generate(&tree, refs, library_name);
        diagnostics.extend(generated);

        // Phase 6: Escalation; Phase 7: Emit
        let image = if self.apply_policy(&mut diagnostics) {
            None
        } else {
            Some(emit::encode(&unit)?)
        };
        Ok(self.finish(diagnostics, image, library_name))
    }

    /// Flags escalated warnings and drops suppressed ones; true if any diagnostic fails
    fn apply_policy(&self, diagnostics: &mut Vec<Diagnostic>) -> bool {
        diagnostics
            .retain(|d| d.severity == Severity::Error || !self.options.is_suppressed(&d.id));
        for diagnostic in diagnostics.iter_mut() {
            if diagnostic.severity == Severity::Warning
                && self.options.is_escalated(&diagnostic.id)
            {
                diagnostic.is_warning_as_error = true;
            }
        }
        diagnostics.iter().any(Diagnostic::is_failure)
    }

    fn finish(
        &self,
        diagnostics: Vec<Diagnostic>,
        image: Option<Vec<u8>>,
        library_name: &str,
    ) -> CompilationResult {
        match image {
            Some(binary) => {
                tracing::debug!(
                    library = library_name,
                    image = %emit::image_id(&binary),
                    bytes = binary.len(),
                    diagnostics = diagnostics.len(),
                    "compilation succeeded"
                );
                CompilationResult::Success {
                    binary,
                    diagnostics,
                }
            }
            None => {
                tracing::debug!(
                    library = library_name,
                    errors = diagnostics.iter().filter(|d| d.is_failure()).count(),
                    "compilation failed"
                );
                CompilationResult::Failure { diagnostics }
            }
        }
    }
}

fn front_end_diagnostic(id: &str, error: &crate::Error) -> Diagnostic {
    let location = error
        .location()
        .map(|(line, column)| crate::parser::Span::new(line, column));
    Diagnostic::new(id, Severity::Error, error.message(), location)
}
