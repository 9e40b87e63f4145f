//! Name binding and bytecode generation
//!
//! Walks the syntax tree once. Names resolve against the innermost local scope
//! first, then the fields of the enclosing type (constructor parameters are the
//! leading fields). Free function calls resolve against the reference set in
//! order and become imports. Diagnostics are collected, never returned early, so a
//! single compile reports every problem it can find.

use super::diagnostic::{codes, Diagnostic};
use super::instruction::{Chunk, Constant, Import, Instruction, MethodDef, TypeDef, Unit};
use crate::parser::{
    BinaryOp, ClassDecl, Expr, ExprKind, LogicalOp, Member, MethodDecl, Span, SyntaxTree,
    UnaryOp,
};
use crate::references::{ReferenceSet, DYNAMIC_LIBRARY};

/// Generates a unit from a syntax tree
pub fn generate(
    tree: &SyntaxTree,
    refs: &ReferenceSet,
    unit_name: &str,
) -> (Unit, Vec<Diagnostic>) {
    let mut generator = CodeGenerator::new(refs);
    let types = tree
        .classes
        .iter()
        .map(|class| generator.class(class))
        .collect();

    let unit = Unit {
        name: unit_name.to_string(),
        imports: generator.imports,
        constants: generator.constants,
        types,
    };
    (unit, generator.diagnostics)
}

/// Unit-wide state: constant pool, import table and diagnostics
struct CodeGenerator<'a> {
    refs: &'a ReferenceSet,
    dynamic_enabled: bool,
    imports: Vec<Import>,
    constants: Vec<Constant>,
    diagnostics: Vec<Diagnostic>,
}

/// Names visible inside one type
struct ClassLayout {
    name: String,
    fields: Vec<String>,
    methods: Vec<(String, usize)>,
}

impl ClassLayout {
    fn new(class: &ClassDecl) -> Self {
        let mut fields = class.params.clone();
        for member in &class.members {
            if let Member::Field { name, .. } = member {
                fields.push(name.clone());
            }
        }
        let methods = class
            .methods()
            .map(|m| (m.name.clone(), m.params.len()))
            .collect();
        ClassLayout {
            name: class.name.clone(),
            fields,
            methods,
        }
    }

    fn field(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    fn method(&self, name: &str) -> Option<(usize, usize)> {
        self.methods
            .iter()
            .position(|(m, _)| m == name)
            .map(|i| (i, self.methods[i].1))
    }
}

impl<'a> CodeGenerator<'a> {
    fn new(refs: &'a ReferenceSet) -> Self {
        CodeGenerator {
            refs,
            dynamic_enabled: refs.contains(DYNAMIC_LIBRARY),
            imports: Vec::new(),
            constants: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn constant(&mut self, constant: Constant) -> usize {
        if let Some(index) = self.constants.iter().position(|c| *c == constant) {
            return index;
        }
        self.constants.push(constant);
        self.constants.len() - 1
    }

    fn import(&mut self, library: &str, function: &str) -> usize {
        let import = Import {
            library: library.to_string(),
            function: function.to_string(),
        };
        if let Some(index) = self.imports.iter().position(|i| *i == import) {
            return index;
        }
        self.imports.push(import);
        self.imports.len() - 1
    }

    fn class(&mut self, class: &ClassDecl) -> TypeDef {
        let layout = ClassLayout::new(class);

        let constructor = {
            let mut f = FunctionEmitter::new(self, &layout, &class.params, class.span);
            for index in 0..class.params.len() {
                f.emit(Instruction::LoadLocal(index));
                f.emit(Instruction::StoreField(index));
            }
            for member in &class.members {
                match member {
                    Member::Field { name, init, .. } => {
                        f.expr(init);
                        if let Some(index) = f.class.field(name) {
                            f.emit(Instruction::StoreField(index));
                        }
                    }
                    Member::Init { body, .. } => {
                        f.scoped_sequence(body);
                        f.emit(Instruction::Pop);
                    }
                    Member::Method(_) => {}
                }
            }
            let null = f.unit.constant(Constant::Null);
            f.emit(Instruction::Const(null));
            f.emit(Instruction::Return);
            MethodDef {
                name: "init".to_string(),
                public: true,
                arity: class.params.len(),
                chunk: f.finish(),
            }
        };

        let methods = class.methods().map(|m| self.method(&layout, m)).collect();

        TypeDef {
            name: class.name.clone(),
            exported: class.exported,
            fields: layout.fields,
            constructor,
            methods,
        }
    }

    fn method(&mut self, layout: &ClassLayout, method: &MethodDecl) -> MethodDef {
        let mut f = FunctionEmitter::new(self, layout, &method.params, method.span);
        f.sequence(&method.body);
        f.emit(Instruction::Return);
        MethodDef {
            name: method.name.clone(),
            public: method.public,
            arity: method.params.len(),
            chunk: f.finish(),
        }
    }
}

struct Local {
    name: String,
    slot: usize,
    span: Span,
    read: bool,
    track_unused: bool,
}

/// Emits one chunk
struct FunctionEmitter<'g, 'a> {
    unit: &'g mut CodeGenerator<'a>,
    class: &'g ClassLayout,
    code: Vec<Instruction>,
    scopes: Vec<Vec<Local>>,
    locals: usize,
}

impl<'g, 'a> FunctionEmitter<'g, 'a> {
    fn new(
        unit: &'g mut CodeGenerator<'a>,
        class: &'g ClassLayout,
        params: &[String],
        span: Span,
    ) -> Self {
        let mut f = FunctionEmitter {
            unit,
            class,
            code: Vec::new(),
            scopes: vec![Vec::new()],
            locals: 0,
        };
        for param in params {
            f.declare(param, span, false);
        }
        f
    }

    fn finish(mut self) -> Chunk {
        while !self.scopes.is_empty() {
            self.pop_scope();
        }
        Chunk {
            locals: self.locals,
            code: self.code,
        }
    }

    fn emit(&mut self, instruction: Instruction) -> usize {
        self.code.push(instruction);
        self.code.len() - 1
    }

    /// Points the jump or handler at `at` to the next instruction
    fn patch(&mut self, at: usize) {
        let here = self.code.len();
        match &mut self.code[at] {
            Instruction::Jump(target)
            | Instruction::JumpIfFalse(target)
            | Instruction::JumpIfTrue(target) => *target = here,
            Instruction::EnterTry { handler, .. } => *handler = here,
            _ => {}
        }
    }

    fn error(&mut self, id: &str, message: String, span: Span) {
        self.unit.diagnostics.push(Diagnostic::error(id, message, span));
    }

    fn push_null(&mut self) {
        let null = self.unit.constant(Constant::Null);
        self.emit(Instruction::Const(null));
    }

    // Scopes

    fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    fn pop_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        for local in scope {
            if local.track_unused && !local.read {
                self.unit.diagnostics.push(Diagnostic::warning(
                    codes::UNUSED_LOCAL,
                    format!(
                        "The variable '{}' is defined but its value is never used",
                        local.name
                    ),
                    local.span,
                ));
            }
        }
    }

    fn allocate(&mut self) -> usize {
        self.locals += 1;
        self.locals - 1
    }

    fn declare(&mut self, name: &str, span: Span, track_unused: bool) -> usize {
        let slot = self.allocate();
        self.bind(name, slot, span, track_unused);
        slot
    }

    fn bind(&mut self, name: &str, slot: usize, span: Span, track_unused: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(Local {
                name: name.to_string(),
                slot,
                span,
                read: false,
                track_unused: track_unused && !name.starts_with('_'),
            });
        }
    }

    fn find_local(&mut self, name: &str) -> Option<&mut Local> {
        self.scopes
            .iter_mut()
            .rev()
            .flat_map(|scope| scope.iter_mut().rev())
            .find(|local| local.name == name)
    }

    // Sequences

    /// Every expression leaves one value; all but the last are discarded
    fn sequence(&mut self, body: &[Expr]) {
        if body.is_empty() {
            self.push_null();
            return;
        }

        let mut diverged = false;
        for (i, expr) in body.iter().enumerate() {
            if diverged {
                self.unit.diagnostics.push(Diagnostic::warning(
                    codes::UNREACHABLE_CODE,
                    "Unreachable code detected",
                    expr.span,
                ));
                diverged = false;
            } else if expr.diverges() && i + 1 < body.len() {
                diverged = true;
            }
            self.expr(expr);
            if i + 1 < body.len() {
                self.emit(Instruction::Pop);
            }
        }
    }

    fn scoped_sequence(&mut self, body: &[Expr]) {
        self.push_scope();
        self.sequence(body);
        self.pop_scope();
    }

    fn scoped_expr(&mut self, expr: &Expr) {
        self.push_scope();
        self.expr(expr);
        self.pop_scope();
    }

    // Expressions

    fn expr(&mut self, expr: &Expr) {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Int(n) => self.literal(Constant::Int(*n)),
            ExprKind::Float(f) => self.literal(Constant::Float(*f)),
            ExprKind::Str(s) => self.literal(Constant::Str(s.clone())),
            ExprKind::Bool(b) => self.literal(Constant::Bool(*b)),
            ExprKind::Null => self.push_null(),
            ExprKind::SelfRef => {
                self.emit(Instruction::LoadSelf);
            }
            ExprKind::Variable(name) => self.variable(name, span),
            ExprKind::Member { target, name } => self.member(target, name, span),
            ExprKind::Call {
                target,
                method,
                args,
            } => self.call(target, method, args, span),
            ExprKind::Invoke { function, args } => self.invoke(function, args, span),
            ExprKind::Define { name, value } => {
                self.expr(value);
                let slot = self.declare(name, span, true);
                self.emit(Instruction::Dup);
                self.emit(Instruction::StoreLocal(slot));
            }
            ExprKind::Set { name, value } => self.assign(name, value, span),
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expr(condition);
                let to_else = self.emit(Instruction::JumpIfFalse(0));
                self.scoped_expr(then_branch);
                let to_end = self.emit(Instruction::Jump(0));
                self.patch(to_else);
                match else_branch {
                    Some(else_branch) => self.scoped_expr(else_branch),
                    None => self.push_null(),
                }
                self.patch(to_end);
            }
            ExprKind::While { condition, body } => {
                let start = self.code.len();
                self.expr(condition);
                let to_end = self.emit(Instruction::JumpIfFalse(0));
                self.scoped_sequence(body);
                self.emit(Instruction::Pop);
                self.emit(Instruction::Jump(start));
                self.patch(to_end);
                self.push_null();
            }
            ExprKind::Do(body) => self.scoped_sequence(body),
            ExprKind::Await(inner) => {
                self.expr(inner);
                self.emit(Instruction::Await);
            }
            ExprKind::Throw(inner) => {
                self.expr(inner);
                self.emit(Instruction::Throw);
            }
            ExprKind::Return(value) => {
                match value {
                    Some(value) => self.expr(value),
                    None => self.push_null(),
                }
                self.emit(Instruction::Return);
            }
            ExprKind::Try {
                body,
                binding,
                handler,
            } => {
                let slot = self.allocate();
                let enter = self.emit(Instruction::EnterTry { handler: 0, slot });
                self.scoped_sequence(body);
                self.emit(Instruction::ExitTry);
                let to_end = self.emit(Instruction::Jump(0));
                self.patch(enter);
                self.push_scope();
                self.bind(binding, slot, span, false);
                self.sequence(handler);
                self.pop_scope();
                self.patch(to_end);
            }
            ExprKind::Logical { op, operands } => self.logical(*op, operands),
            ExprKind::Binary { op, operands } => self.binary(*op, operands),
            ExprKind::Unary { op, operand } => {
                if *op == UnaryOp::Neg {
                    if let Some(ty) = operand.literal_type() {
                        if !matches!(ty, "int" | "float") {
                            self.error(
                                codes::LITERAL_TYPE,
                                format!(
                                    "Operator '-' cannot be applied to an operand of type '{}'",
                                    ty
                                ),
                                operand.span,
                            );
                        }
                    }
                }
                self.expr(operand);
                self.emit(match op {
                    UnaryOp::Neg => Instruction::Negate,
                    UnaryOp::Not => Instruction::Not,
                });
            }
        }
    }

    fn literal(&mut self, constant: Constant) {
        let index = self.unit.constant(constant);
        self.emit(Instruction::Const(index));
    }

    fn unresolved(&mut self, name: &str, span: Span) {
        self.error(
            codes::UNRESOLVED_NAME,
            format!("The name '{}' does not exist in the current context", name),
            span,
        );
    }

    fn variable(&mut self, name: &str, span: Span) {
        if let Some(local) = self.find_local(name) {
            local.read = true;
            let slot = local.slot;
            self.emit(Instruction::LoadLocal(slot));
        } else if let Some(index) = self.class.field(name) {
            self.emit(Instruction::LoadField(index));
        } else {
            self.unresolved(name, span);
            self.push_null();
        }
    }

    fn assign(&mut self, name: &str, value: &Expr, span: Span) {
        self.expr(value);
        self.emit(Instruction::Dup);
        if let Some(slot) = self.find_local(name).map(|l| l.slot) {
            self.emit(Instruction::StoreLocal(slot));
        } else if let Some(index) = self.class.field(name) {
            self.emit(Instruction::StoreField(index));
        } else {
            self.unresolved(name, span);
            self.emit(Instruction::Pop);
        }
    }

    fn require_dynamic(&mut self, what: &str, span: Span) {
        if !self.unit.dynamic_enabled {
            self.error(
                codes::DYNAMIC_RUNTIME_MISSING,
                format!("{} requires a reference to '{}'", what, DYNAMIC_LIBRARY),
                span,
            );
        }
    }

    fn member(&mut self, target: &Expr, name: &str, span: Span) {
        if target.kind == ExprKind::SelfRef {
            match self.class.field(name) {
                Some(index) => {
                    self.emit(Instruction::LoadField(index));
                }
                None => {
                    self.error(
                        codes::UNKNOWN_SELF_MEMBER,
                        format!(
                            "Type '{}' does not contain a field '{}'",
                            self.class.name, name
                        ),
                        span,
                    );
                    self.push_null();
                }
            }
            return;
        }

        self.require_dynamic("Dynamic member access", span);
        self.expr(target);
        let name = self.unit.constant(Constant::Str(name.to_string()));
        self.emit(Instruction::GetMember(name));
    }

    fn arguments(&mut self, args: &[Expr]) {
        for arg in args {
            self.expr(arg);
        }
    }

    fn call(&mut self, target: &Expr, method: &str, args: &[Expr], span: Span) {
        if target.kind == ExprKind::SelfRef {
            self.arguments(args);
            match self.class.method(method) {
                Some((index, arity)) => {
                    if arity != args.len() {
                        self.error(
                            codes::ARGUMENT_COUNT,
                            format!(
                                "Method '{}.{}' takes {} argument(s), found {}",
                                self.class.name,
                                method,
                                arity,
                                args.len()
                            ),
                            span,
                        );
                    }
                    self.emit(Instruction::CallMethod {
                        method: index,
                        argc: args.len(),
                    });
                }
                None => {
                    self.error(
                        codes::UNKNOWN_SELF_MEMBER,
                        format!(
                            "Type '{}' does not contain a method '{}'",
                            self.class.name, method
                        ),
                        span,
                    );
                    self.discard(args.len());
                }
            }
            return;
        }

        self.require_dynamic("Dynamic method call", span);
        self.expr(target);
        self.arguments(args);
        let name = self.unit.constant(Constant::Str(method.to_string()));
        self.emit(Instruction::CallMember {
            name,
            argc: args.len(),
        });
    }

    fn invoke(&mut self, function: &str, args: &[Expr], span: Span) {
        self.arguments(args);

        let Some(resolved) = self.unit.refs.resolve(function) else {
            self.error(
                codes::UNRESOLVED_FUNCTION,
                format!(
                    "The name '{}' does not exist in any referenced library",
                    function
                ),
                span,
            );
            self.discard(args.len());
            return;
        };

        if let Some((min, max)) = resolved.builtin.arity() {
            if args.len() < min || args.len() > max {
                let expected = if min == max {
                    min.to_string()
                } else {
                    format!("{} to {}", min, max)
                };
                self.error(
                    codes::ARGUMENT_COUNT,
                    format!(
                        "Function '{}' takes {} argument(s), found {}",
                        function,
                        expected,
                        args.len()
                    ),
                    span,
                );
            }
        }

        let import = self.unit.import(&resolved.library, function);
        self.emit(Instruction::CallImport {
            import,
            argc: args.len(),
        });
    }

    /// Replaces `count` evaluated values with a single null
    fn discard(&mut self, count: usize) {
        for _ in 0..count {
            self.emit(Instruction::Pop);
        }
        self.push_null();
    }

    fn logical(&mut self, op: LogicalOp, operands: &[Expr]) {
        let mut exits = Vec::new();
        for (i, operand) in operands.iter().enumerate() {
            self.expr(operand);
            if i + 1 < operands.len() {
                self.emit(Instruction::Dup);
                exits.push(self.emit(match op {
                    LogicalOp::And => Instruction::JumpIfFalse(0),
                    LogicalOp::Or => Instruction::JumpIfTrue(0),
                }));
                self.emit(Instruction::Pop);
            }
        }
        for exit in exits {
            self.patch(exit);
        }
    }

    fn binary(&mut self, op: BinaryOp, operands: &[Expr]) {
        for operand in operands {
            let Some(ty) = operand.literal_type() else {
                continue;
            };
            let accepted = match op {
                BinaryOp::Add => !matches!(ty, "bool" | "null"),
                BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                    matches!(ty, "int" | "float")
                }
                BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
                    matches!(ty, "int" | "float" | "string")
                }
                BinaryOp::Eq | BinaryOp::NotEq => true,
            };
            if !accepted {
                self.error(
                    codes::LITERAL_TYPE,
                    format!(
                        "Operator '{}' cannot be applied to an operand of type '{}'",
                        op, ty
                    ),
                    operand.span,
                );
            }
        }

        let mut operands = operands.iter();
        if let Some(first) = operands.next() {
            self.expr(first);
        }
        for operand in operands {
            self.expr(operand);
            self.emit(Instruction::Binary(op));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::SExprScanner;
    use crate::parser::SExprParser;
    use crate::references::{stdlib, Library};

    fn generate_source(source: &str, refs: &ReferenceSet) -> (Unit, Vec<Diagnostic>) {
        let tokens = SExprScanner::new(source).scan_tokens().unwrap();
        let tree = SExprParser::new(tokens).parse().unwrap();
        generate(&tree, refs, "test")
    }

    fn method_source(body: &str) -> String {
        format!("(defclass Script (deps) (defmethod process () {}))", body)
    }

    fn ids(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_constructor_stores_parameter_and_fields() {
        let (unit, diagnostics) = generate_source(
            "(defclass Script (deps) (field count 1) (defmethod process () count))",
            &ReferenceSet::standard(),
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let script = &unit.types[0];
        assert_eq!(script.fields, vec!["deps".to_string(), "count".to_string()]);
        assert_eq!(script.constructor.arity, 1);
        assert_eq!(
            &script.constructor.chunk.code[..2],
            &[Instruction::LoadLocal(0), Instruction::StoreField(0)]
        );
        assert_eq!(
            script.methods[0].chunk.code,
            vec![Instruction::LoadField(1), Instruction::Return]
        );
    }

    #[test]
    fn test_imports_are_deduplicated() {
        let (unit, diagnostics) = generate_source(
            &method_source(r#"(print (str "a")) (print (str "b"))"#),
            &ReferenceSet::standard(),
        );
        assert!(diagnostics.is_empty());
        assert_eq!(unit.imports.len(), 2);
        assert!(unit.imports.iter().all(|i| i.library == crate::references::CORE_LIBRARY));
    }

    #[test]
    fn test_first_library_wins() {
        struct Shadow;
        impl crate::references::Builtin for Shadow {
            fn name(&self) -> &str {
                "str"
            }
            fn description(&self) -> &str {
                "shadow"
            }
            fn call(
                &self,
                _args: &[crate::runtime::Value],
            ) -> Result<crate::runtime::Value, crate::runtime::Exception> {
                Ok(crate::runtime::Value::Null)
            }
        }

        let refs = ReferenceSet::new()
            .with(Library::new("custom").with(Shadow))
            .with(stdlib::core());
        let (unit, _) = generate_source(&method_source("(str 1)"), &refs);
        assert_eq!(unit.imports[0].library, "custom");
    }

    #[test]
    fn test_unresolved_names() {
        let (_, diagnostics) = generate_source(
            &method_source("(set! missing 1) undefined (frobnicate 1)"),
            &ReferenceSet::standard(),
        );
        assert_eq!(
            ids(&diagnostics),
            vec![codes::UNRESOLVED_NAME, codes::UNRESOLVED_NAME, codes::UNRESOLVED_FUNCTION]
        );
    }

    #[test]
    fn test_dynamic_access_requires_runtime() {
        let refs = ReferenceSet::new().with(stdlib::core());
        let (_, diagnostics) =
            generate_source(&method_source("(print (. deps message)) (call deps run)"), &refs);
        assert_eq!(
            ids(&diagnostics),
            vec![codes::DYNAMIC_RUNTIME_MISSING, codes::DYNAMIC_RUNTIME_MISSING]
        );

        let (_, diagnostics) = generate_source(
            &method_source("(print (. deps message))"),
            &ReferenceSet::standard(),
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_self_calls_are_static() {
        let (unit, diagnostics) = generate_source(
            "(defclass S (d) (defmethod process () (call self helper 1)) (defmethod- helper (x) x))",
            &ReferenceSet::standard(),
        );
        assert!(diagnostics.is_empty());
        assert!(unit.types[0].methods[0]
            .chunk
            .code
            .contains(&Instruction::CallMethod { method: 1, argc: 1 }));

        let (_, diagnostics) = generate_source(
            "(defclass S (d) (defmethod process () (call self helper) (call self nope) (. self nope)) (defmethod- helper (x) x))",
            &ReferenceSet::standard(),
        );
        assert_eq!(
            ids(&diagnostics),
            vec![codes::ARGUMENT_COUNT, codes::UNKNOWN_SELF_MEMBER, codes::UNKNOWN_SELF_MEMBER]
        );
    }

    #[test]
    fn test_builtin_arity() {
        let (_, diagnostics) =
            generate_source(&method_source("(len 1 2)"), &ReferenceSet::standard());
        assert_eq!(ids(&diagnostics), vec![codes::ARGUMENT_COUNT]);
        assert!(diagnostics[0].message.contains("'len'"));
    }

    #[test]
    fn test_literal_operand_types() {
        let (_, diagnostics) = generate_source(
            &method_source(r#"(- "a" 1) (+ true 1) (< null 2) (- "x") (+ "a" "b") (== null 1)"#),
            &ReferenceSet::standard(),
        );
        assert_eq!(
            ids(&diagnostics),
            vec![codes::LITERAL_TYPE, codes::LITERAL_TYPE, codes::LITERAL_TYPE, codes::LITERAL_TYPE]
        );
    }

    #[test]
    fn test_unused_local_and_unreachable_code() {
        let (_, diagnostics) = generate_source(
            &method_source("(define unused 1) (define _ignored 2) (define used 3) (return used) 4"),
            &ReferenceSet::standard(),
        );
        assert_eq!(
            ids(&diagnostics),
            vec![codes::UNREACHABLE_CODE, codes::UNUSED_LOCAL]
        );
        assert!(diagnostics[1].message.contains("'unused'"));
    }

    #[test]
    fn test_try_jumps_are_patched() {
        let (unit, diagnostics) = generate_source(
            &method_source(r#"(try (throw "x") (catch e (. e message)))"#),
            &ReferenceSet::standard(),
        );
        assert!(diagnostics.is_empty());

        let code = &unit.types[0].methods[0].chunk.code;
        let Instruction::EnterTry { handler, slot } = code[0] else {
            panic!("expected EnterTry, got {:?}", code[0]);
        };
        assert_eq!(slot, 0);
        assert_eq!(code[handler], Instruction::LoadLocal(0));
        for instruction in code {
            if let Some(target) = instruction.target() {
                assert!(target <= code.len());
            }
        }
    }

    #[test]
    fn test_block_scoping() {
        let (_, diagnostics) = generate_source(
            &method_source("(do (define inner 1) inner) inner"),
            &ReferenceSet::standard(),
        );
        assert_eq!(ids(&diagnostics), vec![codes::UNRESOLVED_NAME]);
    }
}
