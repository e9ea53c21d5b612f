use crate::diagnostics::{Position, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Fn,
    Var,
    If,
    Else,
    Return,
    Print,
    And,
    Or,
    True,
    False,
    Null,
    Class,
    Import,
    Number(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Semi,
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    SlashSlashEq,
    PercentEq,
    Assign,
    EqEq,
    Bang,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub code: &'static str,
    pub message: String,
    pub span: Span,
}

pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).lex()
}

struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: u32,
    col: u32,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            index: 0,
            line: 1,
            col: 1,
        }
    }

    fn lex(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        while let Some(ch) = self.peek() {
            if is_whitespace(ch) {
                self.advance();
                continue;
            }
            if ch == '#' {
                while let Some(ch) = self.peek() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
                continue;
            }

            let start = self.position();
            let token = match ch {
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '{' => self.single(TokenKind::LBrace),
                '}' => self.single(TokenKind::RBrace),
                '[' => self.single(TokenKind::LBracket),
                ']' => self.single(TokenKind::RBracket),
                ',' => self.single(TokenKind::Comma),
                '.' => self.single(TokenKind::Dot),
                ';' => self.single(TokenKind::Semi),
                '+' => self.with_eq(TokenKind::PlusEq, TokenKind::Plus),
                '-' => self.with_eq(TokenKind::MinusEq, TokenKind::Minus),
                '*' => self.with_eq(TokenKind::StarEq, TokenKind::Star),
                '%' => self.with_eq(TokenKind::PercentEq, TokenKind::Percent),
                '=' => self.with_eq(TokenKind::EqEq, TokenKind::Assign),
                '!' => self.with_eq(TokenKind::NotEq, TokenKind::Bang),
                '<' => self.with_eq(TokenKind::LtEq, TokenKind::Lt),
                '>' => self.with_eq(TokenKind::GtEq, TokenKind::Gt),
                '/' => {
                    self.advance();
                    if self.peek() == Some('/') {
                        self.with_eq(TokenKind::SlashSlashEq, TokenKind::SlashSlash)
                    } else if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::SlashEq
                    } else {
                        TokenKind::Slash
                    }
                }
                '"' => TokenKind::Str(self.lex_string(start)?),
                ch if is_letter(ch) => self.lex_identifier(),
                ch if is_digit(ch) => self.lex_number(start)?,
                _ => {
                    self.advance();
                    let message = format!("Unexpected character '{ch}'.");
                    return Err(self.error("E0100", &message, start));
                }
            };

            let span = Span::new(start, self.position());
            tokens.push(Token { kind: token, span });
        }

        let eof_span = Span::new(self.position(), self.position());
        tokens.push(Token {
            kind: TokenKind::Eof,
            span: eof_span,
        });
        Ok(tokens)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    /// Consumes the current character and an optional trailing '='.
    fn with_eq(&mut self, with: TokenKind, without: TokenKind) -> TokenKind {
        self.advance();
        if self.peek() == Some('=') {
            self.advance();
            with
        } else {
            without
        }
    }

    fn lex_identifier(&mut self) -> TokenKind {
        let mut buf = String::new();
        while let Some(ch) = self.peek() {
            if is_ident_continue(ch) {
                buf.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match buf.as_str() {
            "fn" => TokenKind::Fn,
            "var" => TokenKind::Var,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "return" => TokenKind::Return,
            "print" => TokenKind::Print,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "class" => TokenKind::Class,
            "import" => TokenKind::Import,
            _ => TokenKind::Ident(buf),
        }
    }

    fn lex_number(&mut self, start: Position) -> Result<TokenKind, LexError> {
        let mut buf = String::new();
        while let Some(ch) = self.peek().filter(|ch| is_digit(*ch)) {
            buf.push(ch);
            self.advance();
        }
        if self.peek() == Some('.') && self.peek_next().is_some_and(is_digit) {
            buf.push('.');
            self.advance();
            while let Some(ch) = self.peek().filter(|ch| is_digit(*ch)) {
                buf.push(ch);
                self.advance();
            }
        }

        buf.parse::<f64>().map(TokenKind::Number).map_err(|_| LexError {
            code: "E0101",
            message: "Invalid number literal.".to_string(),
            span: Span::new(start, self.position()),
        })
    }

    fn lex_string(&mut self, start: Position) -> Result<String, LexError> {
        let mut buf = String::new();
        self.advance();
        while let Some(ch) = self.peek() {
            match ch {
                '"' => {
                    self.advance();
                    return Ok(buf);
                }
                '\\' => {
                    self.advance();
                    let escaped = match self.peek() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some(other) => {
                            self.advance();
                            let message = format!("Invalid escape '\\{other}'.");
                            return Err(self.error("E0104", &message, start));
                        }
                        None => {
                            return Err(self.error("E0103", "Unterminated string literal.", start));
                        }
                    };
                    self.advance();
                    buf.push(escaped);
                }
                '\n' => {
                    return Err(self.error("E0103", "Unterminated string literal.", start));
                }
                _ => {
                    buf.push(ch);
                    self.advance();
                }
            }
        }

        Err(self.error("E0103", "Unterminated string literal.", start))
    }

    fn error(&self, code: &'static str, message: &str, start: Position) -> LexError {
        LexError {
            code,
            message: message.to_string(),
            span: Span::new(start, self.position()),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.index + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.index += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.col)
    }
}

fn is_whitespace(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n' | '\r')
}

fn is_letter(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_digit(ch: char) -> bool {
    ch.is_ascii_digit()
}

fn is_ident_continue(ch: char) -> bool {
    is_letter(ch) || is_digit(ch)
}
