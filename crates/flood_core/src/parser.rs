use crate::ast::{
    AssignOp, BinaryOp, Block, Decl, Expr, ExprKind, FnDecl, LogicalOp, Param, Program, Stmt,
    UnaryOp, VarDecl,
};
use crate::diagnostics::{Position, Span};
use crate::lexer::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub code: &'static str,
    pub message: String,
    pub span: Span,
    pub fixit: Option<FixItHint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixItHint {
    pub title: &'static str,
    pub span: Span,
    pub replacement: String,
}

/// Parses a whole file, recovering at statement and declaration boundaries so
/// every syntax error in the file is reported at once.
pub fn parse(tokens: &[Token]) -> Result<Program, Vec<ParseError>> {
    let mut parser = Parser::new(tokens);
    let mut decls = Vec::new();

    while !parser.is_eof() {
        let start = parser.index;
        match parser.peek_kind() {
            TokenKind::Fn => match parser.parse_function() {
                Ok(function) => decls.push(Decl::Fn(function)),
                Err(err) => {
                    parser.errors.push(err);
                    parser.sync_to_next_top_level(start);
                }
            },
            TokenKind::Var => match parser.parse_var_decl() {
                Ok(decl) => decls.push(Decl::Var(decl)),
                Err(err) => {
                    parser.errors.push(err);
                    parser.sync_to_next_top_level(start);
                }
            },
            TokenKind::Class => {
                let err = parser.error("E0206", "Classes are not supported.");
                parser.errors.push(err);
                parser.sync_to_next_top_level(start);
            }
            TokenKind::Import => {
                let err = parser.error("E0206", "Imports are not supported.");
                parser.errors.push(err);
                parser.sync_to_next_top_level(start);
            }
            _ => {
                let err = parser.error("E0201", "Expected 'fn' or 'var' at top level.");
                parser.errors.push(err);
                parser.sync_to_next_top_level(start);
            }
        }
    }

    if parser.errors.is_empty() {
        Ok(Program { decls })
    } else {
        Err(parser.errors)
    }
}

/// Parses a single expression; used by tests and tooling.
pub fn parse_expression(tokens: &[Token]) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    if !parser.is_eof() {
        return Err(parser.error("E0203", "Unexpected tokens after expression."));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Token],
    index: usize,
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            index: 0,
            errors: Vec::new(),
        }
    }

    fn parse_function(&mut self) -> Result<FnDecl, ParseError> {
        let start = self.expect_simple(TokenKind::Fn, "Expected 'fn' keyword.")?;
        let name_token = self.expect_ident_token("Expected function name.")?;
        self.expect_simple(TokenKind::LParen, "Expected '(' after function name.")?;
        let params = self.parse_params()?;
        self.expect_simple(TokenKind::RParen, "Expected ')' after parameters.")?;
        let body = self.parse_block()?;
        let span = start.span.to(body.span);

        Ok(FnDecl {
            name: extract_ident(&name_token),
            name_span: name_token.span,
            id: None,
            params,
            body,
            span,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();
        if matches!(self.peek_kind(), TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let token = self.expect_ident_token("Expected parameter name.")?;
            params.push(Param {
                name: extract_ident(&token),
                span: token.span,
                id: None,
            });
            if matches!(self.peek_kind(), TokenKind::Comma) {
                self.bump();
            } else if matches!(self.peek_kind(), TokenKind::Ident(_)) {
                let insert_at = self.tokens[self.index].span.start;
                return Err(self.error_with_fixit(
                    "E0200",
                    "Expected ',' between parameters.",
                    FixItHint {
                        title: "Insert ',' between parameters",
                        span: Span::new(insert_at, insert_at),
                        replacement: ", ".to_string(),
                    },
                ));
            } else {
                break;
            }
        }
        Ok(params)
    }

    fn parse_var_decl(&mut self) -> Result<VarDecl, ParseError> {
        let start = self.expect_simple(TokenKind::Var, "Expected 'var' keyword.")?;
        let name_token = self.expect_ident_token("Expected variable name.")?;
        let init = if matches!(self.peek_kind(), TokenKind::Semi) {
            None
        } else {
            self.expect_simple(TokenKind::Assign, "Expected '=' after variable name.")?;
            Some(self.parse_expr()?)
        };
        let end = self.expect_semi()?;
        Ok(VarDecl {
            name: extract_ident(&name_token),
            name_span: name_token.span,
            id: None,
            init,
            span: start.span.to(end.span),
        })
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let start = self.expect_simple(TokenKind::LBrace, "Expected '{' to open block.")?;
        let mut stmts = Vec::new();
        while !self.is_eof() && !matches!(self.peek_kind(), TokenKind::RBrace) {
            let stmt_start = self.index;
            if matches!(self.peek_kind(), TokenKind::Fn) {
                match self.parse_function() {
                    Ok(function) => self.errors.push(ParseError {
                        code: "E0207",
                        message: "Functions can only be declared at the top level.".to_string(),
                        span: function.name_span,
                        fixit: None,
                    }),
                    Err(err) => {
                        self.errors.push(err);
                        self.sync_to_statement_boundary(stmt_start);
                    }
                }
                continue;
            }
            match self.parse_statement() {
                Ok(stmt) => stmts.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.sync_to_statement_boundary(stmt_start);
                }
            }
        }
        let end = self.expect_simple(TokenKind::RBrace, "Expected '}' to close block.")?;
        Ok(Block {
            stmts,
            span: start.span.to(end.span),
        })
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_kind() {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::If => self.parse_if(),
            TokenKind::Var => Ok(Stmt::Var(self.parse_var_decl()?)),
            TokenKind::Return => self.parse_return(),
            TokenKind::Print => self.parse_print(),
            _ => {
                let expr = self.parse_expr()?;
                let end = self.expect_semi()?;
                let span = expr.span.to(end.span);
                Ok(Stmt::Expr { expr, span })
            }
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect_simple(TokenKind::If, "Expected 'if'.")?;
        self.expect_simple(TokenKind::LParen, "Expected '(' after 'if'.")?;
        let cond = self.parse_expr()?;
        self.expect_rparen_with_fixit("Expected ')' after condition.")?;
        let then_block = self.parse_block()?;
        let else_block = if matches!(self.peek_kind(), TokenKind::Else) {
            self.bump();
            if matches!(self.peek_kind(), TokenKind::If) {
                let nested = self.parse_if()?;
                Some(Block {
                    span: nested.span(),
                    stmts: vec![nested],
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        let end = else_block
            .as_ref()
            .map(|block| block.span)
            .unwrap_or(then_block.span);
        Ok(Stmt::If {
            cond,
            then_block,
            else_block,
            span: start.span.to(end),
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect_simple(TokenKind::Return, "Expected 'return'.")?;
        let value = if matches!(self.peek_kind(), TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let end = self.expect_semi()?;
        Ok(Stmt::Return {
            value,
            span: start.span.to(end.span),
        })
    }

    fn parse_print(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect_simple(TokenKind::Print, "Expected 'print'.")?;
        let expr = self.parse_expr()?;
        let end = self.expect_semi()?;
        Ok(Stmt::Print {
            expr,
            span: start.span.to(end.span),
        })
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.parse_logic_or()?;
        let op = match self.peek_kind() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::Add,
            TokenKind::MinusEq => AssignOp::Sub,
            TokenKind::StarEq => AssignOp::Mul,
            TokenKind::SlashEq => AssignOp::Div,
            TokenKind::SlashSlashEq => AssignOp::FloorDiv,
            TokenKind::PercentEq => AssignOp::Mod,
            _ => return Ok(target),
        };
        self.bump();
        let value = self.parse_assignment()?;
        let span = target.span.to(value.span);
        Ok(Expr {
            kind: ExprKind::Assign {
                target: Box::new(target),
                op,
                value: Box::new(value),
            },
            span,
        })
    }

    fn parse_logic_or(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_logic_and()?;
        while matches!(self.peek_kind(), TokenKind::Or) {
            self.bump();
            let right = self.parse_logic_and()?;
            expr = logical(expr, LogicalOp::Or, right);
        }
        Ok(expr)
    }

    fn parse_logic_and(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_equality()?;
        while matches!(self.peek_kind(), TokenKind::And) {
            self.bump();
            let right = self.parse_equality()?;
            expr = logical(expr, LogicalOp::And, right);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_compare()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinaryOp::EqEq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            self.bump();
            let right = self.parse_compare()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_compare(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_add()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            self.bump();
            let right = self.parse_add()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_add(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_mul()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.bump();
            let right = self.parse_mul()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_mul(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::SlashSlash => BinaryOp::FloorDiv,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.bump();
            let right = self.parse_unary()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        let start = self.bump().span;
        let expr = self.parse_unary()?;
        let span = start.to(expr.span);
        Ok(Expr {
            kind: ExprKind::Unary {
                op,
                expr: Box::new(expr),
            },
            span,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.tokens[self.index].clone();
        let expr = match token.kind {
            TokenKind::Number(value) => {
                self.bump();
                Expr {
                    kind: ExprKind::Number(value),
                    span: token.span,
                }
            }
            TokenKind::Str(value) => {
                self.bump();
                Expr {
                    kind: ExprKind::Str(value),
                    span: token.span,
                }
            }
            TokenKind::True => {
                self.bump();
                Expr {
                    kind: ExprKind::Bool(true),
                    span: token.span,
                }
            }
            TokenKind::False => {
                self.bump();
                Expr {
                    kind: ExprKind::Bool(false),
                    span: token.span,
                }
            }
            TokenKind::Null => {
                self.bump();
                Expr {
                    kind: ExprKind::Null,
                    span: token.span,
                }
            }
            TokenKind::Ident(name) => {
                self.bump();
                Expr {
                    kind: ExprKind::Ident { name, id: None },
                    span: token.span,
                }
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                let end = self.expect_rparen_with_fixit("Expected ')' after expression.")?;
                Expr {
                    kind: inner.kind,
                    span: token.span.to(end.span),
                }
            }
            TokenKind::LBracket => {
                self.bump();
                let elements = self.parse_comma_list(TokenKind::RBracket, "list element")?;
                let end = self.expect_rbracket_with_fixit("Expected ']' after list elements.")?;
                Expr {
                    kind: ExprKind::List(elements),
                    span: token.span.to(end.span),
                }
            }
            _ => return Err(self.error("E0203", "Expected expression.")),
        };

        self.parse_postfix(expr)
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr, ParseError> {
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.bump();
                    let args = self.parse_comma_list(TokenKind::RParen, "call argument")?;
                    let end = self.expect_rparen_with_fixit("Expected ')' after arguments.")?;
                    let span = expr.span.to(end.span);
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    };
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.parse_expr()?;
                    let end =
                        self.expect_rbracket_with_fixit("Expected ']' after index expression.")?;
                    let span = expr.span.to(end.span);
                    expr = Expr {
                        kind: ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    };
                }
                TokenKind::Dot => {
                    self.bump();
                    let name = self.expect_ident_token("Expected property name after '.'.")?;
                    let span = expr.span.to(name.span);
                    expr = Expr {
                        kind: ExprKind::GetProperty {
                            object: Box::new(expr),
                            name: extract_ident(&name),
                        },
                        span,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_comma_list(
        &mut self,
        close: TokenKind,
        what: &str,
    ) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        if self.peek_kind() == &close {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            if matches!(self.peek_kind(), TokenKind::Comma) {
                self.bump();
            } else if self.peek_kind() == &close {
                break;
            } else if starts_expression(self.peek_kind()) {
                let insert_at = self.tokens[self.index].span.start;
                let message = format!("Expected ',' after {what}.");
                return Err(self.error_with_fixit(
                    "E0200",
                    &message,
                    FixItHint {
                        title: "Insert ','",
                        span: Span::new(insert_at, insert_at),
                        replacement: ", ".to_string(),
                    },
                ));
            } else {
                break;
            }
        }
        Ok(items)
    }

    fn expect_simple(&mut self, expected: TokenKind, message: &str) -> Result<Token, ParseError> {
        if self.peek_kind() == &expected {
            Ok(self.bump())
        } else {
            Err(self.error("E0200", message))
        }
    }

    fn expect_semi(&mut self) -> Result<Token, ParseError> {
        if matches!(self.peek_kind(), TokenKind::Semi) {
            Ok(self.bump())
        } else {
            let insert_at = self.previous_span_end();
            Err(self.error_with_fixit(
                "E0200",
                "Expected ';' after statement.",
                FixItHint {
                    title: "Insert ';' statement terminator",
                    span: Span::new(insert_at, insert_at),
                    replacement: ";".to_string(),
                },
            ))
        }
    }

    fn expect_rparen_with_fixit(&mut self, message: &str) -> Result<Token, ParseError> {
        if matches!(self.peek_kind(), TokenKind::RParen) {
            Ok(self.bump())
        } else {
            let insert_at = self.tokens[self.index].span.start;
            Err(self.error_with_fixit(
                "E0200",
                message,
                FixItHint {
                    title: "Insert ')' to close",
                    span: Span::new(insert_at, insert_at),
                    replacement: ")".to_string(),
                },
            ))
        }
    }

    fn expect_rbracket_with_fixit(&mut self, message: &str) -> Result<Token, ParseError> {
        if matches!(self.peek_kind(), TokenKind::RBracket) {
            Ok(self.bump())
        } else {
            let insert_at = self.tokens[self.index].span.start;
            Err(self.error_with_fixit(
                "E0200",
                message,
                FixItHint {
                    title: "Insert ']' to close",
                    span: Span::new(insert_at, insert_at),
                    replacement: "]".to_string(),
                },
            ))
        }
    }

    fn sync_to_next_top_level(&mut self, start: usize) {
        if self.index == start && !self.is_eof() {
            self.bump();
        }
        while !self.is_eof()
            && !matches!(
                self.peek_kind(),
                TokenKind::Fn | TokenKind::Var | TokenKind::Class | TokenKind::Import
            )
        {
            self.bump();
        }
    }

    fn sync_to_statement_boundary(&mut self, start: usize) {
        if self.index == start && !self.is_eof() {
            self.bump();
        }
        while !self.is_eof() {
            match self.peek_kind() {
                TokenKind::Semi => {
                    self.bump();
                    break;
                }
                TokenKind::RBrace
                | TokenKind::LBrace
                | TokenKind::Var
                | TokenKind::If
                | TokenKind::Return
                | TokenKind::Print
                | TokenKind::Fn => break,
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn expect_ident_token(&mut self, message: &str) -> Result<Token, ParseError> {
        match self.peek_kind() {
            TokenKind::Ident(_) => Ok(self.bump()),
            _ => Err(self.error("E0205", message)),
        }
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.index].kind
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.index].clone();
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn previous_span_end(&self) -> Position {
        if self.index == 0 {
            return Position::new(1, 1);
        }
        self.tokens[self.index - 1].span.end
    }

    fn error(&self, code: &'static str, message: &str) -> ParseError {
        ParseError {
            code,
            message: message.to_string(),
            span: self.current_span(),
            fixit: None,
        }
    }

    fn error_with_fixit(
        &self,
        code: &'static str,
        message: &str,
        fixit: FixItHint,
    ) -> ParseError {
        ParseError {
            code,
            message: message.to_string(),
            span: self.current_span(),
            fixit: Some(fixit),
        }
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.index)
            .map(|t| t.span)
            .unwrap_or_default()
    }
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    let span = left.span.to(right.span);
    Expr {
        kind: ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    }
}

fn logical(left: Expr, op: LogicalOp, right: Expr) -> Expr {
    let span = left.span.to(right.span);
    Expr {
        kind: ExprKind::Logical {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    }
}

fn starts_expression(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Ident(_)
            | TokenKind::Number(_)
            | TokenKind::Str(_)
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Null
            | TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::Minus
            | TokenKind::Bang
    )
}

fn extract_ident(token: &Token) -> String {
    if let TokenKind::Ident(name) = &token.kind {
        name.clone()
    } else {
        String::new()
    }
}
