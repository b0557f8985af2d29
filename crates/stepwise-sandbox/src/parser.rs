//! Recursive-descent parser producing `ast::Stmt` trees.
//!
//! Automatic semicolon insertion follows the usual line-terminator rule: a
//! statement may end at `;`, before `}`, at end of input, or where the next
//! token starts a new line.

use std::sync::Arc;

use crate::ast::*;
use crate::lexer::{Lexer, SyntaxError, TemplateChunk, Tok, Token};
use crate::value::number_to_string;
use crate::{STACK_RED_ZONE, STACK_SEGMENT};

const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "default", "delete", "do", "else",
    "export", "extends", "false", "finally", "for", "function", "if", "import", "in",
    "instanceof", "new", "null", "return", "super", "switch", "this", "throw", "true", "try",
    "typeof", "var", "void", "while", "with", "yield",
];

fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

/// Parse a whole script body.
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, SyntaxError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.statement()?);
    }
    Ok(body)
}

fn parse_expression_source(source: &str, line: usize) -> Result<Expr, SyntaxError> {
    let tokens = Lexer::new(source)
        .tokenize()
        .map_err(|e| SyntaxError::new(e.message, line))?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expression()?;
    if !parser.at_eof() {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, SyntaxError>;

impl Parser {
    // ── Token helpers ────────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_tok(&self) -> &Tok {
        &self.peek().tok
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + offset).min(last)].tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_tok(), Tok::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek_tok(), Tok::Punct(q) if *q == p)
    }

    fn is_ident(&self, name: &str) -> bool {
        matches!(self.peek_tok(), Tok::Ident(n) if n == name)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        if self.is_ident(name) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> PResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn line(&self) -> usize {
        self.peek().line
    }

    fn unexpected(&self) -> SyntaxError {
        let message = match self.peek_tok() {
            Tok::Ident(n) if is_reserved(n) => format!("Unexpected token '{n}'"),
            Tok::Ident(n) => format!("Unexpected identifier '{n}'"),
            Tok::Num(_) => "Unexpected number".to_string(),
            Tok::Str(_) => "Unexpected string".to_string(),
            Tok::Template(_) => "Unexpected template string".to_string(),
            Tok::Punct(p) => format!("Unexpected token '{p}'"),
            Tok::Regex { .. } => "Unexpected regular expression".to_string(),
            Tok::Eof => "Unexpected end of input".to_string(),
        };
        SyntaxError::new(message, self.line())
    }

    fn consume_semicolon(&mut self) -> PResult<()> {
        if self.eat_punct(";") || self.is_punct("}") || self.at_eof() || self.peek().newline_before {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn identifier(&mut self) -> PResult<String> {
        match self.peek_tok() {
            Tok::Ident(n) if !is_reserved(n) && !n.starts_with('#') => {
                let n = n.clone();
                self.advance();
                Ok(n)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Any identifier, reserved words included (`obj.default`).
    fn property_name(&mut self) -> PResult<String> {
        match self.peek_tok() {
            Tok::Ident(n) => {
                let n = n.clone();
                self.advance();
                Ok(n)
            }
            _ => Err(self.unexpected()),
        }
    }

    // ── Statements ───────────────────────────────────────────────────────────

    fn statement(&mut self) -> PResult<Stmt> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || self.statement_inner())
    }

    fn statement_inner(&mut self) -> PResult<Stmt> {
        if self.is_punct("{") {
            return Ok(Stmt::Block(self.block()?));
        }
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }
        let keyword = match self.peek_tok() {
            Tok::Ident(k) => k.clone(),
            _ => return self.expression_statement(),
        };
        match keyword.as_str() {
            "var" | "const" => self.declaration_statement(),
            "let" if matches!(self.peek_at(1), Tok::Ident(_) | Tok::Punct("[") | Tok::Punct("{")) => {
                self.declaration_statement()
            }
            "function" => {
                self.advance();
                Ok(Stmt::Function(Arc::new(self.function_rest(false, true)?)))
            }
            "async"
                if matches!(self.peek_at(1), Tok::Ident(f) if f == "function")
                    && !self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].newline_before =>
            {
                self.advance();
                self.advance();
                Ok(Stmt::Function(Arc::new(self.function_rest(true, true)?)))
            }
            "if" => self.if_statement(),
            "for" => self.for_statement(),
            "while" => {
                self.advance();
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                let body = Box::new(self.statement()?);
                Ok(Stmt::While { test, body })
            }
            "do" => {
                self.advance();
                let body = Box::new(self.statement()?);
                if !self.eat_ident("while") {
                    return Err(self.unexpected());
                }
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                self.eat_punct(";");
                Ok(Stmt::DoWhile { body, test })
            }
            "return" => {
                self.advance();
                if self.eat_punct(";") || self.is_punct("}") || self.at_eof() || self.peek().newline_before {
                    return Ok(Stmt::Return(None));
                }
                let value = self.expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Return(Some(value)))
            }
            "break" | "continue" => {
                self.advance();
                let label = if matches!(self.peek_tok(), Tok::Ident(_)) && !self.peek().newline_before {
                    Some(self.identifier()?)
                } else {
                    None
                };
                self.consume_semicolon()?;
                Ok(if keyword == "break" {
                    Stmt::Break(label)
                } else {
                    Stmt::Continue(label)
                })
            }
            "throw" => {
                self.advance();
                if self.peek().newline_before {
                    return Err(SyntaxError::new("Illegal newline after throw", self.line()));
                }
                let value = self.expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Throw(value))
            }
            "try" => self.try_statement(),
            "switch" => self.switch_statement(),
            "class" => {
                self.advance();
                Ok(Stmt::Class(Arc::new(self.class_rest(true)?)))
            }
            "import" | "export" => Err(SyntaxError::new(
                format!("'{keyword}' is not supported in scripts"),
                self.line(),
            )),
            _ if !is_reserved(&keyword) && matches!(self.peek_at(1), Tok::Punct(":")) => {
                self.advance();
                self.advance();
                let body = Box::new(self.statement()?);
                Ok(Stmt::Labeled { label: keyword, body })
            }
            _ => self.expression_statement(),
        }
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let expr = self.expression()?;
        self.consume_semicolon()?;
        Ok(Stmt::Expr(expr))
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.eat_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected());
            }
            body.push(self.statement()?);
        }
        Ok(body)
    }

    fn decl_kind(&mut self) -> PResult<DeclKind> {
        let kind = match self.peek_tok() {
            Tok::Ident(k) if k == "var" => DeclKind::Var,
            Tok::Ident(k) if k == "let" => DeclKind::Let,
            Tok::Ident(k) if k == "const" => DeclKind::Const,
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(kind)
    }

    fn declaration_statement(&mut self) -> PResult<Stmt> {
        let kind = self.decl_kind()?;
        let first = self.binding_pattern()?;
        let declarations = self.declaration_list(kind, first)?;
        self.consume_semicolon()?;
        Ok(Stmt::Declare { kind, declarations })
    }

    fn declaration_list(
        &mut self,
        kind: DeclKind,
        first: Pattern,
    ) -> PResult<Vec<(Pattern, Option<Expr>)>> {
        let mut declarations = Vec::new();
        let mut pattern = first;
        loop {
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            if kind == DeclKind::Const && init.is_none() {
                return Err(SyntaxError::new(
                    "Missing initializer in const declaration",
                    self.line(),
                ));
            }
            declarations.push((pattern, init));
            if !self.eat_punct(",") {
                return Ok(declarations);
            }
            pattern = self.binding_pattern()?;
        }
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        self.advance();
        self.expect_punct("(")?;
        let test = self.expression()?;
        self.expect_punct(")")?;
        let consequent = Box::new(self.statement()?);
        let alternate = if self.eat_ident("else") {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    fn for_statement(&mut self) -> PResult<Stmt> {
        self.advance();
        // `for await` iterates eagerly settled values, same as `for`.
        self.eat_ident("await");
        self.expect_punct("(")?;

        let mut init = None;
        if self.is_ident("var") || self.is_ident("let") || self.is_ident("const") {
            let kind = self.decl_kind()?;
            let pattern = self.binding_pattern()?;
            if let Some(stmt) = self.for_in_of_tail(Some(kind), pattern.clone())? {
                return Ok(stmt);
            }
            let declarations = self.declaration_list(kind, pattern)?;
            init = Some(Box::new(Stmt::Declare { kind, declarations }));
        } else if !self.is_punct(";") {
            if matches!(self.peek_tok(), Tok::Ident(_))
                && matches!(self.peek_at(1), Tok::Ident(k) if k == "of" || k == "in")
            {
                let name = self.identifier()?;
                if let Some(stmt) = self.for_in_of_tail(None, Pattern::Ident(name))? {
                    return Ok(stmt);
                }
            }
            init = Some(Box::new(Stmt::Expr(self.expression()?)));
        }
        self.expect_punct(";")?;

        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn for_in_of_tail(
        &mut self,
        kind: Option<DeclKind>,
        pattern: Pattern,
    ) -> PResult<Option<Stmt>> {
        if self.eat_ident("of") {
            let iterable = self.assignment()?;
            self.expect_punct(")")?;
            let body = Box::new(self.statement()?);
            return Ok(Some(Stmt::ForOf {
                kind,
                pattern,
                iterable,
                body,
            }));
        }
        if self.eat_ident("in") {
            let object = self.expression()?;
            self.expect_punct(")")?;
            let body = Box::new(self.statement()?);
            return Ok(Some(Stmt::ForIn {
                kind,
                pattern,
                object,
                body,
            }));
        }
        Ok(None)
    }

    fn try_statement(&mut self) -> PResult<Stmt> {
        self.advance();
        let block = self.block()?;
        let mut param = None;
        let mut handler = None;
        if self.eat_ident("catch") {
            if self.eat_punct("(") {
                param = Some(self.binding_pattern()?);
                self.expect_punct(")")?;
            }
            handler = Some(self.block()?);
        }
        let finalizer = if self.eat_ident("finally") {
            Some(self.block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(SyntaxError::new("Missing catch or finally after try", self.line()));
        }
        Ok(Stmt::Try {
            block,
            param,
            handler,
            finalizer,
        })
    }

    fn switch_statement(&mut self) -> PResult<Stmt> {
        self.advance();
        self.expect_punct("(")?;
        let discriminant = self.expression()?;
        self.expect_punct(")")?;
        self.expect_punct("{")?;
        let mut cases = Vec::new();
        while !self.eat_punct("}") {
            let test = if self.eat_ident("case") {
                Some(self.expression()?)
            } else if self.eat_ident("default") {
                None
            } else {
                return Err(self.unexpected());
            };
            self.expect_punct(":")?;
            let mut body = Vec::new();
            while !(self.is_ident("case") || self.is_ident("default") || self.is_punct("}")) {
                if self.at_eof() {
                    return Err(self.unexpected());
                }
                body.push(self.statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        Ok(Stmt::Switch {
            discriminant,
            cases,
        })
    }

    // ── Patterns and functions ───────────────────────────────────────────────

    fn binding_pattern(&mut self) -> PResult<Pattern> {
        if self.eat_punct("[") {
            let mut elements = Vec::new();
            let mut rest = None;
            loop {
                if self.eat_punct("]") {
                    break;
                }
                if self.eat_punct(",") {
                    elements.push(None);
                    continue;
                }
                if self.eat_punct("...") {
                    rest = Some(Box::new(self.binding_pattern()?));
                    self.expect_punct("]")?;
                    break;
                }
                elements.push(Some(self.binding_element()?));
                if !self.eat_punct(",") {
                    self.expect_punct("]")?;
                    break;
                }
            }
            return Ok(Pattern::Array { elements, rest });
        }

        if self.eat_punct("{") {
            let mut properties = Vec::new();
            let mut rest = None;
            loop {
                if self.eat_punct("}") {
                    break;
                }
                if self.eat_punct("...") {
                    rest = Some(self.identifier()?);
                    self.expect_punct("}")?;
                    break;
                }
                let shorthand = matches!(self.peek_tok(), Tok::Ident(_));
                let key = self.property_key()?;
                let binding = if self.eat_punct(":") {
                    self.binding_element()?
                } else {
                    match (&key, shorthand) {
                        (PropKey::Named(name), true) => Binding {
                            pattern: Pattern::Ident(name.clone()),
                            default: if self.eat_punct("=") {
                                Some(self.assignment()?)
                            } else {
                                None
                            },
                        },
                        _ => return Err(self.unexpected()),
                    }
                };
                properties.push((key, binding));
                if !self.eat_punct(",") {
                    self.expect_punct("}")?;
                    break;
                }
            }
            return Ok(Pattern::Object { properties, rest });
        }

        Ok(Pattern::Ident(self.identifier()?))
    }

    fn binding_element(&mut self) -> PResult<Binding> {
        let pattern = self.binding_pattern()?;
        let default = if self.eat_punct("=") {
            Some(self.assignment()?)
        } else {
            None
        };
        Ok(Binding { pattern, default })
    }

    fn parameters(&mut self) -> PResult<(Vec<Binding>, Option<Pattern>)> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        let mut rest = None;
        loop {
            if self.eat_punct(")") {
                break;
            }
            if self.eat_punct("...") {
                rest = Some(self.binding_pattern()?);
                self.expect_punct(")")?;
                break;
            }
            params.push(self.binding_element()?);
            if !self.eat_punct(",") {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok((params, rest))
    }

    /// Parse after the `function` keyword.
    fn function_rest(&mut self, is_async: bool, require_name: bool) -> PResult<FunctionDef> {
        if self.is_punct("*") {
            return Err(SyntaxError::new("generator functions are not supported", self.line()));
        }
        let name = if matches!(self.peek_tok(), Tok::Ident(_)) {
            Some(self.identifier()?)
        } else if require_name {
            return Err(SyntaxError::new("Function statements require a function name", self.line()));
        } else {
            None
        };
        let (params, rest) = self.parameters()?;
        let body = FunctionBody::Block(self.block()?);
        Ok(FunctionDef {
            name,
            params,
            rest,
            body,
            is_async,
            is_arrow: false,
        })
    }

    /// Parse after the `class` keyword.
    fn class_rest(&mut self, require_name: bool) -> PResult<ClassDef> {
        let name = if matches!(self.peek_tok(), Tok::Ident(n) if n != "extends") {
            Some(self.identifier()?)
        } else if require_name {
            return Err(SyntaxError::new("Class statements require a class name", self.line()));
        } else {
            None
        };
        let extends = if self.eat_ident("extends") {
            Some(self.left_hand_side()?)
        } else {
            None
        };
        self.expect_punct("{")?;
        let mut constructor = None;
        let mut members = Vec::new();
        while !self.eat_punct("}") {
            if self.eat_punct(";") {
                continue;
            }
            if self.at_eof() {
                return Err(self.unexpected());
            }
            let introduces_member =
                |tok: &Tok| !matches!(tok, Tok::Punct("(") | Tok::Punct("=") | Tok::Punct(";") | Tok::Punct("}"));
            let is_static = self.is_ident("static") && introduces_member(self.peek_at(1));
            if is_static {
                self.advance();
                if self.is_punct("{") {
                    return Err(SyntaxError::new("static blocks are not supported", self.line()));
                }
            }
            let is_async = self.is_ident("async")
                && introduces_member(self.peek_at(1))
                && !self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].newline_before;
            if is_async {
                self.advance();
            }
            if self.is_punct("*") {
                return Err(SyntaxError::new("generator methods are not supported", self.line()));
            }
            if (self.is_ident("get") || self.is_ident("set")) && introduces_member(self.peek_at(1)) {
                return Err(SyntaxError::new("getters and setters are not supported", self.line()));
            }
            let key = self.property_key()?;
            if self.is_punct("(") {
                let (params, rest) = self.parameters()?;
                let body = FunctionBody::Block(self.block()?);
                let is_constructor = !is_static && key == PropKey::Named("constructor".to_string());
                let def = Arc::new(FunctionDef {
                    name: match &key {
                        PropKey::Named(name) => Some(name.clone()),
                        PropKey::Computed(_) => None,
                    },
                    params,
                    rest,
                    body,
                    is_async,
                    is_arrow: false,
                });
                if is_constructor {
                    if is_async || constructor.is_some() {
                        return Err(SyntaxError::new("Classes may not have a special constructor", self.line()));
                    }
                    constructor = Some(def);
                } else {
                    members.push(ClassMember {
                        key,
                        is_static,
                        kind: ClassMemberKind::Method(def),
                    });
                }
                continue;
            }
            if is_async || matches!(key, PropKey::Computed(_)) {
                return Err(self.unexpected());
            }
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            self.consume_semicolon()?;
            members.push(ClassMember {
                key,
                is_static,
                kind: ClassMemberKind::Field(init),
            });
        }
        Ok(ClassDef {
            name,
            extends,
            constructor,
            members,
        })
    }

    /// Index of the token closing the bracket at `start`.
    fn matching_close(&self, start: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(start) {
            match token.tok {
                Tok::Punct("(") | Tok::Punct("[") | Tok::Punct("{") => depth += 1,
                Tok::Punct(")") | Tok::Punct("]") | Tok::Punct("}") => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                Tok::Eof => return None,
                _ => {}
            }
        }
        None
    }

    fn arrow_at(&self, index: usize) -> bool {
        match self.tokens.get(index).map(|t| &t.tok) {
            Some(Tok::Ident(n)) if !is_reserved(n) => {
                matches!(self.tokens.get(index + 1).map(|t| &t.tok), Some(Tok::Punct("=>")))
            }
            Some(Tok::Punct("(")) => self
                .matching_close(index)
                .is_some_and(|close| matches!(self.tokens.get(close + 1).map(|t| &t.tok), Some(Tok::Punct("=>")))),
            _ => false,
        }
    }

    fn try_arrow(&mut self) -> PResult<Option<Expr>> {
        let is_async = self.is_ident("async")
            && !self
                .tokens
                .get(self.pos + 1)
                .is_some_and(|t| t.newline_before)
            && self.arrow_at(self.pos + 1);
        if !is_async && !self.arrow_at(self.pos) {
            return Ok(None);
        }
        if is_async {
            self.advance();
        }

        let (params, rest) = if self.is_punct("(") {
            self.parameters()?
        } else {
            let name = self.identifier()?;
            (
                vec![Binding {
                    pattern: Pattern::Ident(name),
                    default: None,
                }],
                None,
            )
        };
        self.expect_punct("=>")?;
        let body = if self.is_punct("{") {
            FunctionBody::Block(self.block()?)
        } else {
            FunctionBody::Expr(Box::new(self.assignment()?))
        };
        Ok(Some(Expr::Function(Arc::new(FunctionDef {
            name: None,
            params,
            rest,
            body,
            is_async,
            is_arrow: true,
        }))))
    }

    // ── Expressions ──────────────────────────────────────────────────────────

    fn expression(&mut self) -> PResult<Expr> {
        let first = self.assignment()?;
        if !self.is_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            items.push(self.assignment()?);
        }
        Ok(Expr::Sequence(items))
    }

    fn assignment(&mut self) -> PResult<Expr> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || self.assignment_inner())
    }

    fn assignment_inner(&mut self) -> PResult<Expr> {
        if let Some(arrow) = self.try_arrow()? {
            return Ok(arrow);
        }
        let left = self.conditional()?;
        let op = match self.peek_tok() {
            Tok::Punct(p) => assign_op(p),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(left);
        };
        let line = self.line();
        self.advance();
        let target = to_pattern(left, op == AssignOp::Assign, line)?;
        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn conditional(&mut self) -> PResult<Expr> {
        let test = self.binary(0)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.assignment()?;
        self.expect_punct(":")?;
        let alternate = self.assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let Some((op, prec)) = binary_op(self.peek_tok()) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.advance();
            let right_assoc = matches!(op, Operator::Binary(BinaryOp::Exp));
            let right = self.binary(if right_assoc { prec } else { prec + 1 })?;
            left = match op {
                Operator::Binary(op) => Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Operator::Logical(op) => Expr::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || self.unary_inner())
    }

    fn unary_inner(&mut self) -> PResult<Expr> {
        let op = match self.peek_tok() {
            Tok::Punct("!") => Some(UnaryOp::Not),
            Tok::Punct("-") => Some(UnaryOp::Neg),
            Tok::Punct("+") => Some(UnaryOp::Plus),
            Tok::Punct("~") => Some(UnaryOp::BitNot),
            Tok::Ident(k) if k == "typeof" => Some(UnaryOp::Typeof),
            Tok::Ident(k) if k == "void" => Some(UnaryOp::Void),
            Tok::Ident(k) if k == "delete" => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let arg = self.unary()?;
            return Ok(Expr::Unary {
                op,
                arg: Box::new(arg),
            });
        }
        if self.eat_ident("await") {
            return Ok(Expr::Await(Box::new(self.unary()?)));
        }
        if self.is_punct("++") || self.is_punct("--") {
            let increment = self.is_punct("++");
            self.advance();
            let target = self.unary()?;
            return Ok(Expr::Update {
                increment,
                prefix: true,
                target: Box::new(target),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let expr = self.left_hand_side()?;
        if (self.is_punct("++") || self.is_punct("--")) && !self.peek().newline_before {
            let increment = self.is_punct("++");
            self.advance();
            return Ok(Expr::Update {
                increment,
                prefix: false,
                target: Box::new(expr),
            });
        }
        Ok(expr)
    }

    fn left_hand_side(&mut self) -> PResult<Expr> {
        let mut expr = if self.is_ident("new") {
            self.new_expression()?
        } else {
            self.primary()?
        };
        let mut optional_seen = false;
        loop {
            if self.eat_punct(".") {
                let name = self.property_name()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: MemberProp::Named(name),
                    optional: false,
                };
            } else if self.eat_punct("?.") {
                optional_seen = true;
                if self.is_punct("(") {
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        optional: true,
                    };
                } else if self.eat_punct("[") {
                    let property = self.expression()?;
                    self.expect_punct("]")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: MemberProp::Computed(Box::new(property)),
                        optional: true,
                    };
                } else {
                    let name = self.property_name()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: MemberProp::Named(name),
                        optional: true,
                    };
                }
            } else if self.eat_punct("[") {
                let property = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: MemberProp::Computed(Box::new(property)),
                    optional: false,
                };
            } else if self.is_punct("(") {
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    optional: false,
                };
            } else if matches!(self.peek_tok(), Tok::Template(_)) && !self.peek().newline_before {
                return Err(SyntaxError::new("tagged templates are not supported", self.line()));
            } else {
                break;
            }
        }
        Ok(if optional_seen {
            Expr::OptionalChain(Box::new(expr))
        } else {
            expr
        })
    }

    fn new_expression(&mut self) -> PResult<Expr> {
        self.advance();
        let mut callee = if self.is_ident("new") {
            self.new_expression()?
        } else {
            self.primary()?
        };
        loop {
            if self.eat_punct(".") {
                let name = self.property_name()?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property: MemberProp::Named(name),
                    optional: false,
                };
            } else if self.eat_punct("[") {
                let property = self.expression()?;
                self.expect_punct("]")?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property: MemberProp::Computed(Box::new(property)),
                    optional: false,
                };
            } else {
                break;
            }
        }
        let args = if self.is_punct("(") {
            self.arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
        })
    }

    fn arguments(&mut self) -> PResult<Vec<ArrayElem>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        loop {
            if self.eat_punct(")") {
                break;
            }
            if self.eat_punct("...") {
                args.push(ArrayElem::Spread(self.assignment()?));
            } else {
                args.push(ArrayElem::Item(self.assignment()?));
            }
            if !self.eat_punct(",") {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let line = self.line();
        match self.peek_tok().clone() {
            Tok::Num(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Tok::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Tok::Regex { pattern, flags } => {
                self.advance();
                Ok(Expr::Regex { pattern, flags })
            }
            Tok::Template(chunks) => {
                self.advance();
                let parts = chunks
                    .into_iter()
                    .map(|chunk| match chunk {
                        TemplateChunk::Text(text) => Ok(TemplatePart::Text(text)),
                        TemplateChunk::Expr(source) => {
                            parse_expression_source(&source, line).map(TemplatePart::Expr)
                        }
                    })
                    .collect::<PResult<Vec<_>>>()?;
                Ok(Expr::Template(parts))
            }
            Tok::Ident(name) => match name.as_str() {
                "true" => {
                    self.advance();
                    Ok(Expr::Bool(true))
                }
                "false" => {
                    self.advance();
                    Ok(Expr::Bool(false))
                }
                "null" => {
                    self.advance();
                    Ok(Expr::Null)
                }
                "this" => {
                    self.advance();
                    Ok(Expr::This)
                }
                "function" => {
                    self.advance();
                    Ok(Expr::Function(Arc::new(self.function_rest(false, false)?)))
                }
                "async" if matches!(self.peek_at(1), Tok::Ident(f) if f == "function") => {
                    self.advance();
                    self.advance();
                    Ok(Expr::Function(Arc::new(self.function_rest(true, false)?)))
                }
                "class" => {
                    self.advance();
                    Ok(Expr::Class(Arc::new(self.class_rest(false)?)))
                }
                "super" => {
                    self.advance();
                    if self.is_punct("(") {
                        return Ok(Expr::SuperCall(self.arguments()?));
                    }
                    if self.eat_punct(".") {
                        return Ok(Expr::SuperMember(MemberProp::Named(self.property_name()?)));
                    }
                    if self.eat_punct("[") {
                        let property = self.expression()?;
                        self.expect_punct("]")?;
                        return Ok(Expr::SuperMember(MemberProp::Computed(Box::new(property))));
                    }
                    Err(SyntaxError::new("'super' keyword unexpected here", line))
                }
                _ => Ok(Expr::Ident(self.identifier()?)),
            },
            Tok::Punct("(") => {
                self.advance();
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Tok::Punct("[") => self.array_literal(),
            Tok::Punct("{") => self.object_literal(),
            _ => Err(self.unexpected()),
        }
    }

    fn array_literal(&mut self) -> PResult<Expr> {
        self.expect_punct("[")?;
        let mut elements = Vec::new();
        loop {
            if self.eat_punct("]") {
                break;
            }
            if self.eat_punct(",") {
                elements.push(ArrayElem::Hole);
                continue;
            }
            if self.eat_punct("...") {
                elements.push(ArrayElem::Spread(self.assignment()?));
            } else {
                elements.push(ArrayElem::Item(self.assignment()?));
            }
            if !self.eat_punct(",") {
                self.expect_punct("]")?;
                break;
            }
        }
        Ok(Expr::Array(elements))
    }

    fn property_key(&mut self) -> PResult<PropKey> {
        match self.peek_tok().clone() {
            Tok::Ident(name) => {
                self.advance();
                Ok(PropKey::Named(name))
            }
            Tok::Str(s) => {
                self.advance();
                Ok(PropKey::Named(s))
            }
            Tok::Num(n) => {
                self.advance();
                Ok(PropKey::Named(number_to_string(n)))
            }
            Tok::Punct("[") => {
                self.advance();
                let expr = self.assignment()?;
                self.expect_punct("]")?;
                Ok(PropKey::Computed(expr))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn object_literal(&mut self) -> PResult<Expr> {
        self.expect_punct("{")?;
        let mut props = Vec::new();
        loop {
            if self.eat_punct("}") {
                break;
            }
            if self.eat_punct("...") {
                props.push(ObjectProp::Spread(self.assignment()?));
            } else {
                let is_async = self.is_ident("async")
                    && !matches!(
                        self.peek_at(1),
                        Tok::Punct(":") | Tok::Punct("(") | Tok::Punct(",") | Tok::Punct("}") | Tok::Punct("=")
                    );
                if is_async {
                    self.advance();
                }
                let shorthand = matches!(self.peek_tok(), Tok::Ident(_));
                let key = self.property_key()?;

                if self.eat_punct(":") {
                    props.push(ObjectProp::KeyValue(key, self.assignment()?));
                } else if self.is_punct("(") {
                    let name = match &key {
                        PropKey::Named(name) => Some(name.clone()),
                        PropKey::Computed(_) => None,
                    };
                    let (params, rest) = self.parameters()?;
                    let body = FunctionBody::Block(self.block()?);
                    let def = FunctionDef {
                        name,
                        params,
                        rest,
                        body,
                        is_async,
                        is_arrow: false,
                    };
                    props.push(ObjectProp::KeyValue(key, Expr::Function(Arc::new(def))));
                } else {
                    match (key, shorthand) {
                        (PropKey::Named(name), true) if !is_reserved(&name) => {
                            if self.eat_punct("=") {
                                props.push(ObjectProp::ShorthandDefault(name, self.assignment()?));
                            } else {
                                props.push(ObjectProp::KeyValue(
                                    PropKey::Named(name.clone()),
                                    Expr::Ident(name),
                                ));
                            }
                        }
                        _ => return Err(self.unexpected()),
                    }
                }
            }
            if !self.eat_punct(",") {
                self.expect_punct("}")?;
                break;
            }
        }
        Ok(Expr::Object(props))
    }
}

enum Operator {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn binary_op(tok: &Tok) -> Option<(Operator, u8)> {
    use Operator::{Binary as B, Logical as L};
    let entry = match tok {
        Tok::Punct("??") => (L(LogicalOp::Nullish), 1),
        Tok::Punct("||") => (L(LogicalOp::Or), 2),
        Tok::Punct("&&") => (L(LogicalOp::And), 3),
        Tok::Punct("|") => (B(BinaryOp::BitOr), 4),
        Tok::Punct("^") => (B(BinaryOp::BitXor), 5),
        Tok::Punct("&") => (B(BinaryOp::BitAnd), 6),
        Tok::Punct("==") => (B(BinaryOp::Eq), 7),
        Tok::Punct("!=") => (B(BinaryOp::NotEq), 7),
        Tok::Punct("===") => (B(BinaryOp::StrictEq), 7),
        Tok::Punct("!==") => (B(BinaryOp::StrictNotEq), 7),
        Tok::Punct("<") => (B(BinaryOp::Lt), 8),
        Tok::Punct(">") => (B(BinaryOp::Gt), 8),
        Tok::Punct("<=") => (B(BinaryOp::LtEq), 8),
        Tok::Punct(">=") => (B(BinaryOp::GtEq), 8),
        Tok::Ident(k) if k == "in" => (B(BinaryOp::In), 8),
        Tok::Ident(k) if k == "instanceof" => (B(BinaryOp::InstanceOf), 8),
        Tok::Punct("<<") => (B(BinaryOp::Shl), 9),
        Tok::Punct(">>") => (B(BinaryOp::Shr), 9),
        Tok::Punct(">>>") => (B(BinaryOp::UShr), 9),
        Tok::Punct("+") => (B(BinaryOp::Add), 10),
        Tok::Punct("-") => (B(BinaryOp::Sub), 10),
        Tok::Punct("*") => (B(BinaryOp::Mul), 11),
        Tok::Punct("/") => (B(BinaryOp::Div), 11),
        Tok::Punct("%") => (B(BinaryOp::Rem), 11),
        Tok::Punct("**") => (B(BinaryOp::Exp), 12),
        _ => return None,
    };
    Some(entry)
}

fn assign_op(p: &str) -> Option<AssignOp> {
    Some(match p {
        "=" => AssignOp::Assign,
        "+=" => AssignOp::Arith(BinaryOp::Add),
        "-=" => AssignOp::Arith(BinaryOp::Sub),
        "*=" => AssignOp::Arith(BinaryOp::Mul),
        "/=" => AssignOp::Arith(BinaryOp::Div),
        "%=" => AssignOp::Arith(BinaryOp::Rem),
        "**=" => AssignOp::Arith(BinaryOp::Exp),
        "<<=" => AssignOp::Arith(BinaryOp::Shl),
        ">>=" => AssignOp::Arith(BinaryOp::Shr),
        ">>>=" => AssignOp::Arith(BinaryOp::UShr),
        "&=" => AssignOp::Arith(BinaryOp::BitAnd),
        "|=" => AssignOp::Arith(BinaryOp::BitOr),
        "^=" => AssignOp::Arith(BinaryOp::BitXor),
        "&&=" => AssignOp::Logical(LogicalOp::And),
        "||=" => AssignOp::Logical(LogicalOp::Or),
        "??=" => AssignOp::Logical(LogicalOp::Nullish),
        _ => return None,
    })
}

/// Reinterpret an expression as an assignment target.
fn to_pattern(expr: Expr, destructure: bool, line: usize) -> PResult<Pattern> {
    let invalid = || SyntaxError::new("Invalid left-hand side in assignment", line);
    match expr {
        Expr::Ident(name) => Ok(Pattern::Ident(name)),
        member @ Expr::Member { optional: false, .. } => Ok(Pattern::Member(Box::new(member))),
        Expr::Array(elements) if destructure => {
            let mut out = Vec::new();
            let mut rest = None;
            let count = elements.len();
            for (i, element) in elements.into_iter().enumerate() {
                match element {
                    ArrayElem::Hole => out.push(None),
                    ArrayElem::Item(item) => out.push(Some(to_binding(item, line)?)),
                    ArrayElem::Spread(target) if i + 1 == count => {
                        rest = Some(Box::new(to_pattern(target, true, line)?));
                    }
                    ArrayElem::Spread(_) => return Err(invalid()),
                }
            }
            Ok(Pattern::Array { elements: out, rest })
        }
        Expr::Object(props) if destructure => {
            let mut properties = Vec::new();
            let mut rest = None;
            for prop in props {
                match prop {
                    ObjectProp::KeyValue(key, value) => properties.push((key, to_binding(value, line)?)),
                    ObjectProp::ShorthandDefault(name, default) => properties.push((
                        PropKey::Named(name.clone()),
                        Binding {
                            pattern: Pattern::Ident(name),
                            default: Some(default),
                        },
                    )),
                    ObjectProp::Spread(Expr::Ident(name)) => rest = Some(name),
                    ObjectProp::Spread(_) => return Err(invalid()),
                }
            }
            Ok(Pattern::Object { properties, rest })
        }
        _ => Err(invalid()),
    }
}

fn to_binding(expr: Expr, line: usize) -> PResult<Binding> {
    match expr {
        Expr::Assign {
            op: AssignOp::Assign,
            target,
            value,
        } => Ok(Binding {
            pattern: *target,
            default: Some(*value),
        }),
        other => Ok(Binding {
            pattern: to_pattern(other, true, line)?,
            default: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_unexpected_identifier_like_v8() {
        let err = parse_program("invalid code;").unwrap_err();
        assert_eq!(err.message, "Unexpected identifier 'code'");
    }

    #[test]
    fn inserts_semicolons_at_line_breaks() {
        let body = parse_program("a = 1\nb = 2\nreturn\na").unwrap();
        assert_eq!(body.len(), 4);
        assert_eq!(body[2], Stmt::Return(None));
    }

    #[test]
    fn parses_arrow_functions() {
        let body = parse_program("const f = async (a, {b}) => a + b").unwrap();
        match &body[0] {
            Stmt::Declare { declarations, .. } => match &declarations[0].1 {
                Some(Expr::Function(def)) => {
                    assert!(def.is_async && def.is_arrow);
                    assert_eq!(def.params.len(), 2);
                }
                other => panic!("unexpected init: {other:?}"),
            },
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn wraps_optional_chains() {
        let body = parse_program("a?.b.c").unwrap();
        assert!(matches!(body[0], Stmt::Expr(Expr::OptionalChain(_))));
    }

    #[test]
    fn binds_multiplication_tighter_than_addition() {
        let body = parse_program("1 + 2 * 3").unwrap();
        match &body[0] {
            Stmt::Expr(Expr::Binary { op, right, .. }) => {
                assert_eq!(*op, BinaryOp::Add);
                assert!(matches!(**right, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn parses_destructuring_assignment() {
        let body = parse_program("[a, b] = [b, a]").unwrap();
        assert!(matches!(
            &body[0],
            Stmt::Expr(Expr::Assign { target, .. }) if matches!(**target, Pattern::Array { .. })
        ));
    }

    #[test]
    fn parses_for_of_with_declaration() {
        let body = parse_program("for (const [k, v] of Object.entries(o)) { total += v }").unwrap();
        assert!(matches!(body[0], Stmt::ForOf { kind: Some(DeclKind::Const), .. }));
    }

    #[test]
    fn rejects_invalid_assignment_target() {
        assert!(parse_program("1 = 2").is_err());
    }

    #[test]
    fn rejects_const_without_initializer() {
        assert!(parse_program("const x;").is_err());
    }

    #[test]
    fn parses_labeled_loops() {
        let body = parse_program("outer: for (;;) { continue outer; break outer }").unwrap();
        match &body[0] {
            Stmt::Labeled { label, body } => {
                assert_eq!(label, "outer");
                assert!(matches!(**body, Stmt::For { .. }));
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn parses_class_members() {
        let source = "class Counter extends Base {\n  count = 0\n  static #made = 0\n  constructor(n) { super(n) }\n  async tick() { return super.tick() }\n  static create() { return new Counter(1) }\n}";
        let body = parse_program(source).unwrap();
        let Stmt::Class(def) = &body[0] else {
            panic!("unexpected stmt: {:?}", body[0]);
        };
        assert_eq!(def.name.as_deref(), Some("Counter"));
        assert!(matches!(def.extends, Some(Expr::Ident(ref n)) if n == "Base"));
        assert!(def.constructor.is_some());
        let summary: Vec<(bool, bool)> = def
            .members
            .iter()
            .map(|m| (m.is_static, matches!(m.kind, ClassMemberKind::Method(_))))
            .collect();
        assert_eq!(summary, vec![(false, false), (true, false), (false, true), (true, true)]);
    }

    #[test]
    fn rejects_accessors_in_classes() {
        let err = parse_program("class A { get x() { return 1 } }").unwrap_err();
        assert_eq!(err.message, "getters and setters are not supported");
    }

    #[test]
    fn parses_regex_literals() {
        let body = parse_program("const ok = /^a+$/i.test(s)").unwrap();
        let Stmt::Declare { declarations, .. } = &body[0] else {
            panic!("unexpected stmt: {:?}", body[0]);
        };
        let Some(Expr::Call { callee, .. }) = &declarations[0].1 else {
            panic!("unexpected init: {:?}", declarations[0].1);
        };
        assert!(matches!(
            &**callee,
            Expr::Member { object, .. } if matches!(&**object, Expr::Regex { flags, .. } if flags == "i")
        ));
    }

    #[test]
    fn deeply_nested_source_parses_without_overflow() {
        let source = format!("x = {}1{}", "(".repeat(5_000), ")".repeat(5_000));
        assert!(parse_program(&source).is_ok());
    }
}
