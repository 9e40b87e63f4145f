use super::ast::{
    BinaryOp, ClassDecl, Expr, ExprKind, LogicalOp, Member, MethodDecl, Span, SyntaxTree,
    UnaryOp,
};
use crate::error::{Error, Result};
use crate::lexer::{Token, TokenKind};

/// Deepest nesting of list forms the parser accepts
pub const MAX_NESTING_DEPTH: usize = 64;

/// S-expression parser for script source units
pub struct SExprParser {
    tokens: Vec<Token>,
    current: usize,
    depth: usize,
}

impl SExprParser {
    /// Creates a new S-expression parser
    ///
    /// A stream without a trailing `Eof` token gets one appended.
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last(), Some(token) if token.kind == TokenKind::Eof) {
            let (line, column) = tokens
                .last()
                .map(|t| (t.line, t.column + t.lexeme.len()))
                .unwrap_or((1, 1));
            tokens.push(Token::new(TokenKind::Eof, String::new(), line, column));
        }
        SExprParser {
            tokens,
            current: 0,
            depth: 0,
        }
    }

    /// Parses the tokens into a syntax tree
    pub fn parse(&mut self) -> Result<SyntaxTree> {
        let mut classes = Vec::new();

        while !self.is_at_end() {
            classes.push(self.parse_class()?);
        }

        Ok(SyntaxTree { classes })
    }

    /// Parse `(defclass Name (param...) member...)`
    fn parse_class(&mut self) -> Result<ClassDecl> {
        let span = self.span();
        self.consume(TokenKind::LeftParen)?;

        let exported = match &self.peek().kind {
            TokenKind::Identifier(name) if name == "defclass" => true,
            TokenKind::Identifier(name) if name == "defclass-" => false,
            _ => {
                return Err(self.expected_error(
                    "`defclass` or `defclass-`",
                    Some(
                        "A source unit is a list of type declarations.\n\
                         Example: (defclass Script (deps) (defmethod process () ...))",
                    ),
                ))
            }
        };
        self.advance();

        let name = self.expect_identifier("type name")?;
        let params = self.parse_param_list()?;

        let mut members = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            if self.is_at_end() {
                return Err(self.expected_error("`)` to close the type declaration", None));
            }
            members.push(self.parse_member()?);
        }
        self.consume(TokenKind::RightParen)?;

        Ok(ClassDecl {
            name,
            exported,
            params,
            members,
            span,
        })
    }

    /// Parse `(name...)` parameter list
    fn parse_param_list(&mut self) -> Result<Vec<String>> {
        if !self.check(&TokenKind::LeftParen) {
            return Err(self.expected_error(
                "parameter list `(...)`",
                Some("Use `()` for no parameters"),
            ));
        }
        self.advance();

        let mut params = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            if self.is_at_end() {
                return Err(self.expected_error("`)` to close the parameter list", None));
            }
            params.push(self.expect_identifier("parameter name")?);
        }
        self.consume(TokenKind::RightParen)?;
        Ok(params)
    }

    /// Parse a type member: field, init block or method
    fn parse_member(&mut self) -> Result<Member> {
        let span = self.span();
        self.consume(TokenKind::LeftParen)?;

        let head = match &self.peek().kind {
            TokenKind::Identifier(name) => name.clone(),
            _ => {
                return Err(self.expected_error(
                    "`field`, `init`, `defmethod` or `defmethod-`",
                    None,
                ))
            }
        };

        let member = match head.as_str() {
            "field" => {
                self.advance();
                let name = self.expect_identifier("field name")?;
                let init = self.parse_expression()?;
                Member::Field { name, init, span }
            }
            "init" => {
                self.advance();
                let body = self.parse_body()?;
                Member::Init { body, span }
            }
            "defmethod" | "defmethod-" => {
                self.advance();
                let name = self.expect_identifier("method name")?;
                let params = self.parse_param_list()?;
                let body = self.parse_body()?;
                Member::Method(MethodDecl {
                    name,
                    public: head == "defmethod",
                    params,
                    body,
                    span,
                })
            }
            _ => {
                return Err(self.syntax_error(format!(
                    "Unknown member form `{}`.\n\n\
                     Help: Type members are `(field name expr)`, `(init ...)`, \
                     `(defmethod name (params) ...)` or `(defmethod- ...)`",
                    head
                )))
            }
        };

        self.consume(TokenKind::RightParen)?;
        Ok(member)
    }

    /// Parse expressions up to (not including) the closing `)`
    fn parse_body(&mut self) -> Result<Vec<Expr>> {
        let mut body = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            if self.is_at_end() {
                return Err(self.expected_error("`)`", None));
            }
            body.push(self.parse_expression()?);
        }
        Ok(body)
    }

    /// Parse an expression
    fn parse_expression(&mut self) -> Result<Expr> {
        let span = self.span();
        let kind = match self.peek().kind.clone() {
            TokenKind::LeftParen => return self.parse_list(),
            TokenKind::Integer(n) => ExprKind::Int(n),
            TokenKind::Float(f) => ExprKind::Float(f),
            TokenKind::String(s) => ExprKind::Str(s),
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::Null => ExprKind::Null,
            TokenKind::Identifier(name) if name == "self" => ExprKind::SelfRef,
            TokenKind::Identifier(name) => ExprKind::Variable(name),
            other => {
                return Err(self.syntax_error(format!(
                    "Unexpected token {} in expression.\n\n\
                     Help: Expected one of: number, string, boolean, null, identifier, \
                     or S-expression `(...)`",
                    Self::token_kind_name(&other)
                )))
            }
        };
        self.advance();
        Ok(Expr::new(kind, span))
    }

    /// Parse a list form, bounding how deep forms may nest
    fn parse_list(&mut self) -> Result<Expr> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.syntax_error(format!(
                "Expression nesting exceeds the limit of {} levels",
                MAX_NESTING_DEPTH
            )));
        }
        self.depth += 1;
        let parsed = self.parse_list_form();
        self.depth -= 1;
        parsed
    }

    fn parse_list_form(&mut self) -> Result<Expr> {
        let span = self.span();
        self.consume(TokenKind::LeftParen)?;

        if self.check(&TokenKind::RightParen) {
            return Err(self.syntax_error("Empty form `()` is not an expression"));
        }

        let head = self.peek().kind.clone();
        let kind = match head {
            TokenKind::Dot => {
                self.advance();
                let target = self.parse_expression()?;
                let name = self.expect_identifier("member name after `.`")?;
                ExprKind::Member {
                    target: Box::new(target),
                    name,
                }
            }
            ref op if op.is_operator() => {
                self.advance();
                self.parse_operator(op)?
            }
            TokenKind::Identifier(name) => {
                self.advance();
                self.parse_form(&name)?
            }
            other => {
                return Err(self.syntax_error(format!(
                    "Unexpected form starting with {}",
                    Self::token_kind_name(&other)
                )))
            }
        };

        self.consume(TokenKind::RightParen)?;
        Ok(Expr::new(kind, span))
    }

    /// Parse the rest of a form whose head is an identifier
    fn parse_form(&mut self, name: &str) -> Result<ExprKind> {
        let kind = match name {
            "call" => {
                let target = self.parse_expression()?;
                let method = self.expect_identifier("method name")?;
                let args = self.parse_body()?;
                ExprKind::Call {
                    target: Box::new(target),
                    method,
                    args,
                }
            }
            "define" => {
                let name = self.expect_identifier("variable name")?;
                let value = self.parse_expression()?;
                ExprKind::Define {
                    name,
                    value: Box::new(value),
                }
            }
            "set!" => {
                let name = self.expect_identifier("variable or field name")?;
                let value = self.parse_expression()?;
                ExprKind::Set {
                    name,
                    value: Box::new(value),
                }
            }
            "if" => {
                let condition = self.parse_expression()?;
                let then_branch = self.parse_expression()?;
                let else_branch = if self.check(&TokenKind::RightParen) {
                    None
                } else {
                    Some(Box::new(self.parse_expression()?))
                };
                ExprKind::If {
                    condition: Box::new(condition),
                    then_branch: Box::new(then_branch),
                    else_branch,
                }
            }
            "while" => {
                let condition = self.parse_expression()?;
                let body = self.parse_body()?;
                ExprKind::While {
                    condition: Box::new(condition),
                    body,
                }
            }
            "do" => ExprKind::Do(self.parse_body()?),
            "await" => ExprKind::Await(Box::new(self.parse_expression()?)),
            "throw" => ExprKind::Throw(Box::new(self.parse_expression()?)),
            "return" => {
                if self.check(&TokenKind::RightParen) {
                    ExprKind::Return(None)
                } else {
                    ExprKind::Return(Some(Box::new(self.parse_expression()?)))
                }
            }
            "try" => self.parse_try()?,
            "and" | "or" => {
                let op = if name == "and" {
                    LogicalOp::And
                } else {
                    LogicalOp::Or
                };
                let operands = self.parse_body()?;
                if operands.is_empty() {
                    return Err(self.syntax_error(format!("`{}` needs at least one operand", name)));
                }
                ExprKind::Logical { op, operands }
            }
            "not" => ExprKind::Unary {
                op: UnaryOp::Not,
                operand: Box::new(self.parse_expression()?),
            },
            _ => ExprKind::Invoke {
                function: name.to_string(),
                args: self.parse_body()?,
            },
        };
        Ok(kind)
    }

    /// Parse `(try body... (catch name handler...))`; the catch clause comes last
    fn parse_try(&mut self) -> Result<ExprKind> {
        let mut body = Vec::new();
        loop {
            if self.check(&TokenKind::RightParen) || self.is_at_end() {
                return Err(self.expected_error(
                    "`(catch name ...)` clause",
                    Some("Example: (try (risky) (catch e (print (. e message))))"),
                ));
            }
            if self.check(&TokenKind::LeftParen)
                && matches!(&self.peek_next().kind, TokenKind::Identifier(n) if n == "catch")
            {
                break;
            }
            body.push(self.parse_expression()?);
        }

        self.consume(TokenKind::LeftParen)?;
        self.advance(); // catch
        let binding = self.expect_identifier("exception variable name")?;
        let handler = self.parse_body()?;
        self.consume(TokenKind::RightParen)?;

        if !self.check(&TokenKind::RightParen) {
            return Err(self.syntax_error("The `catch` clause must be the last part of `try`"));
        }

        Ok(ExprKind::Try {
            body,
            binding,
            handler,
        })
    }

    /// Parse the operands of an operator form
    fn parse_operator(&mut self, op: &TokenKind) -> Result<ExprKind> {
        let mut operands = self.parse_body()?;
        let op = match op {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            TokenKind::Eq | TokenKind::Assign => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::NotEq,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::LtEq => BinaryOp::LtEq,
            TokenKind::GtEq => BinaryOp::GtEq,
            other => {
                return Err(self.syntax_error(format!(
                    "{} is not an operator",
                    Self::token_kind_name(other)
                )))
            }
        };

        if op == BinaryOp::Sub && operands.len() == 1 {
            if let Some(operand) = operands.pop() {
                return Ok(ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                });
            }
        }

        if op.is_arithmetic() {
            if operands.len() < 2 {
                return Err(self.syntax_error(format!(
                    "Operator `{}` needs at least two operands",
                    op
                )));
            }
        } else if operands.len() != 2 {
            return Err(self.syntax_error(format!(
                "Comparison `{}` takes exactly two operands, found {}",
                op,
                operands.len()
            )));
        }

        Ok(ExprKind::Binary { op, operands })
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.current.min(last)]
    }

    fn peek_next(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.current + 1).min(last)]
    }

    fn span(&self) -> Span {
        let token = self.peek();
        Span::new(token.line, token.column)
    }

    fn advance(&mut self) -> Token {
        if self.is_at_end() {
            return self.peek().clone();
        }
        self.current += 1;
        self.tokens[self.current - 1].clone()
    }

    fn check(&self, kind: &TokenKind) -> bool {
        if self.is_at_end() {
            return false;
        }
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn consume(&mut self, kind: TokenKind) -> Result<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            let expected = Self::token_kind_name(&kind);
            Err(self.expected_error(&expected, None))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.expected_error(what, None)),
        }
    }

    fn token_kind_name(kind: &TokenKind) -> String {
        match kind {
            TokenKind::LeftParen => "`(`".to_string(),
            TokenKind::RightParen => "`)`".to_string(),
            TokenKind::Dot => "`.`".to_string(),
            TokenKind::Integer(_) => "integer".to_string(),
            TokenKind::Float(_) => "float".to_string(),
            TokenKind::String(_) => "string".to_string(),
            TokenKind::Identifier(name) => format!("identifier `{}`", name),
            TokenKind::Eof => "end of file".to_string(),
            other => format!("`{}`", other),
        }
    }

    /// Helper to create a syntax error at the current token
    fn syntax_error(&self, message: impl Into<String>) -> Error {
        let token = self.peek();
        Error::SyntaxError {
            line: token.line,
            col: token.column,
            message: message.into(),
        }
    }

    /// Helper to create a syntax error with expected/got pattern
    fn expected_error(&self, expected: &str, hint: Option<&str>) -> Error {
        let token = self.peek();
        let got_str = Self::token_kind_name(&token.kind);

        let mut message = format!("Expected {}, found {}", expected, got_str);

        if let Some(hint) = hint {
            message.push_str("\n\nHelp: ");
            message.push_str(hint);
        }

        Error::SyntaxError {
            line: token.line,
            col: token.column,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::SExprScanner;

    fn parse(source: &str) -> Result<SyntaxTree> {
        let mut scanner = SExprScanner::new(source);
        let tokens = scanner.scan_tokens()?;
        SExprParser::new(tokens).parse()
    }

    fn parse_method_body(body: &str) -> Vec<Expr> {
        let source = format!("(defclass T (deps) (defmethod process () {}))", body);
        let tree = parse(&source).unwrap();
        tree.classes[0].method("process").unwrap().body.clone()
    }

    #[test]
    fn test_class_shape() {
        let tree = parse(
            r#"
            (defclass Script (deps)
              (field count 0)
              (init (set! count 1))
              (defmethod process () (. deps message))
              (defmethod- helper (a b) (+ a b)))
            "#,
        )
        .unwrap();

        assert_eq!(tree.classes.len(), 1);
        let class = &tree.classes[0];
        assert_eq!(class.name, "Script");
        assert!(class.exported);
        assert_eq!(class.params, vec!["deps".to_string()]);
        assert_eq!(class.members.len(), 4);

        let helper = class.method("helper").unwrap();
        assert!(!helper.public);
        assert_eq!(helper.params.len(), 2);
        assert_eq!(class.span, Span::new(2, 13));
    }

    #[test]
    fn test_private_class() {
        let tree = parse("(defclass- Hidden (d)) (defclass Shown (d))").unwrap();
        let exported: Vec<_> = tree.exported().map(|c| c.name.as_str()).collect();
        assert_eq!(exported, vec!["Shown"]);
    }

    #[test]
    fn test_member_and_call_forms() {
        let body = parse_method_body("(call (. deps writer) write \"hi\" 2)");
        match &body[0].kind {
            ExprKind::Call {
                target,
                method,
                args,
            } => {
                assert_eq!(method, "write");
                assert_eq!(args.len(), 2);
                assert!(matches!(target.kind, ExprKind::Member { ref name, .. } if name == "writer"));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_unary_minus_and_arithmetic() {
        let body = parse_method_body("(- 5) (- 10 2 3)");
        assert!(matches!(
            body[0].kind,
            ExprKind::Unary {
                op: UnaryOp::Neg,
                ..
            }
        ));
        assert!(matches!(
            body[1].kind,
            ExprKind::Binary { op: BinaryOp::Sub, ref operands } if operands.len() == 3
        ));
    }

    #[test]
    fn test_try_catch() {
        let body = parse_method_body("(try (risky) (other) (catch e (print e)))");
        match &body[0].kind {
            ExprKind::Try {
                body,
                binding,
                handler,
            } => {
                assert_eq!(body.len(), 2);
                assert_eq!(binding, "e");
                assert_eq!(handler.len(), 1);
            }
            other => panic!("expected try, got {:?}", other),
        }
    }

    #[test]
    fn test_try_without_catch_is_error() {
        let source = "(defclass T (d) (defmethod process () (try (risky))))";
        assert!(matches!(parse(source), Err(Error::SyntaxError { .. })));
    }

    #[test]
    fn test_missing_paren_reports_location() {
        let err = parse("(defclass Script (deps)\n  (defmethod process ()").unwrap_err();
        match err {
            Error::SyntaxError { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("end of file"), "{}", message);
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_comparison_arity() {
        let source = "(defclass T (d) (defmethod process () (< 1 2 3)))";
        let err = parse(source).unwrap_err();
        assert!(err.to_string().contains("exactly two operands"));
    }

    #[test]
    fn test_empty_token_stream() {
        let tree = SExprParser::new(Vec::new()).parse().unwrap();
        assert!(tree.classes.is_empty());

        let tokens = vec![Token::new(TokenKind::LeftParen, "(".to_string(), 1, 1)];
        assert!(matches!(
            SExprParser::new(tokens).parse(),
            Err(Error::SyntaxError { .. })
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |depth: usize| {
            format!(
                "(defclass T (d) (defmethod process () {}1{}))",
                "(not ".repeat(depth),
                ")".repeat(depth)
            )
        };

        assert!(parse(&nested(MAX_NESTING_DEPTH - 1)).is_ok());

        let err = parse(&nested(20_000)).unwrap_err();
        match err {
            Error::SyntaxError { message, .. } => {
                assert!(message.contains("nesting"), "{}", message)
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_top_level_must_be_class() {
        let err = parse("(print 1)").unwrap_err();
        assert!(err.to_string().contains("defclass"));
    }
}
