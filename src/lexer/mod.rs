//! Byte stream to token stream conversion over code-point identifiers.
//!
//! Identifiers in Emojicode source are single Unicode scalar values drawn
//! from the emoji/pictographic blocks declared in [`identifier_ranges`].
//! Everything else (numbers, strings, symbols, variable names, comments)
//! is lexed the ordinary way.
mod identifier_ranges;
mod token;

pub use identifier_ranges::is_identifier_char;
pub use token::{StringPart, Token, TokenKind};

use std::{error::Error, fmt::Display, iter::Peekable, str::Chars};

/// Line/column location, 1-indexed to match the teacher's `ParseError`
/// rendering convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn single(position: Position) -> Self {
        Self {
            start: position,
            end: position,
        }
    }

    pub fn to(self, end: Position) -> Self {
        Self {
            start: self.start,
            end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    UnterminatedString(Position),
    UnterminatedSymbol(Position),
    MalformedEscape(Position, char),
    InvalidNumber(Position, String),
    UnexpectedByte(Position, char),
}

impl Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexError::UnterminatedString(pos) => {
                write!(f, "unterminated string literal at {}:{}", pos.line, pos.column)
            }
            LexError::UnterminatedSymbol(pos) => {
                write!(f, "unterminated symbol literal at {}:{}", pos.line, pos.column)
            }
            LexError::MalformedEscape(pos, c) => write!(
                f,
                "malformed escape sequence '\\{c}' at {}:{}",
                pos.line, pos.column
            ),
            LexError::InvalidNumber(pos, text) => write!(
                f,
                "invalid numeric literal '{text}' at {}:{}",
                pos.line, pos.column
            ),
            LexError::UnexpectedByte(pos, c) => {
                write!(f, "unexpected character '{c}' at {}:{}", pos.line, pos.column)
            }
        }
    }
}

impl Error for LexError {}

pub type LexResult<T> = Result<T, LexError>;

/// A taco (`🌮`) marks the start and end of a documentation comment; a
/// single `💭` marks the start of a regular, discarded comment that runs
/// to end of line.
const DOC_COMMENT_MARKER: char = '🌮';
const LINE_COMMENT_MARKER: char = '💭';

/// Delimiters for an interpolated segment inside a string literal:
/// `"text🔛expression🔚more text"`.
const INTERPOLATION_START: char = '🔛';
const INTERPOLATION_END: char = '🔚';

/// Sigil that introduces a local-variable or instance-variable token
/// (distinct from the single-code-point `Identifier` tokens used for
/// class/method/protocol names).
const VARIABLE_SIGIL: char = '🍦';

pub struct Lexer<'a> {
    tokens: Vec<Token>,
    iterator: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            tokens: vec![],
            iterator: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn peek(&mut self) -> Option<char> {
        self.iterator.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let next = self.iterator.next()?;
        match next {
            '\n' | '\u{2028}' | '\u{2029}' => {
                self.line += 1;
                self.column = 1;
            }
            _ => self.column += 1,
        }
        Some(next)
    }

    fn eat_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    pub fn lex(mut self) -> LexResult<Vec<Token>> {
        loop {
            self.eat_whitespace();
            if self.peek().is_none() {
                break;
            }
            self.dispatch_one()?;
        }

        Ok(self.tokens)
    }

    /// Lexes exactly one token using the same dispatch as [`Self::lex`],
    /// appending it to `self.tokens`. Shared by the top-level loop and by
    /// [`Self::lex_interpolation`], which temporarily redirects
    /// `self.tokens` to collect just the embedded expression's tokens.
    fn dispatch_one(&mut self) -> LexResult<()> {
        let next = self.peek().expect("dispatch_one called at end of input");
        match next {
            c if c == DOC_COMMENT_MARKER => self.lex_doc_comment(),
            c if c == LINE_COMMENT_MARKER => {
                self.lex_line_comment();
                Ok(())
            }
            c if c == VARIABLE_SIGIL => self.lex_variable(),
            '"' => self.lex_string(),
            '🔣' => self.lex_symbol(),
            '0'..='9' | '-' if self.looks_numeric() => self.lex_number(),
            '👍' => {
                self.push_simple(TokenKind::BooleanTrue, 1);
                Ok(())
            }
            '👎' => {
                self.push_simple(TokenKind::BooleanFalse, 1);
                Ok(())
            }
            '🤷' => {
                self.push_simple(TokenKind::NoType, 1);
                Ok(())
            }
            c if is_identifier_char(c) => {
                self.lex_identifier();
                Ok(())
            }
            c => Err(LexError::UnexpectedByte(self.position(), c)),
        }
    }

    /// Lexes tokens up to (and consuming) the matching `🔚`, returning them
    /// without disturbing the enclosing token stream.
    fn lex_interpolation(&mut self) -> LexResult<Vec<Token>> {
        let outer = std::mem::take(&mut self.tokens);
        loop {
            self.eat_whitespace();
            match self.peek() {
                None => {
                    self.tokens = outer;
                    return Err(LexError::UnterminatedString(self.position()));
                }
                Some(c) if c == INTERPOLATION_END => {
                    self.bump();
                    break;
                }
                Some(_) => self.dispatch_one()?,
            }
        }
        Ok(std::mem::replace(&mut self.tokens, outer))
    }

    fn looks_numeric(&mut self) -> bool {
        let mut clone = self.iterator.clone();
        match clone.next() {
            Some('-') => matches!(clone.next(), Some('0'..='9')),
            Some('0'..='9') => true,
            _ => false,
        }
    }

    fn push_simple(&mut self, kind: TokenKind, width: usize) {
        let start = self.position();
        for _ in 0..width {
            self.bump();
        }
        self.tokens.push(Token {
            kind,
            span: Span::single(start).to(self.position()),
        });
    }

    fn lex_identifier(&mut self) {
        let start = self.position();
        let c = self.bump().expect("identifier start already peeked");
        self.tokens.push(Token {
            kind: TokenKind::Identifier(c),
            span: Span::single(start).to(self.position()),
        });
    }

    fn lex_variable(&mut self) -> LexResult<()> {
        let start = self.position();
        self.bump(); // the sigil itself
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        self.tokens.push(Token {
            kind: TokenKind::Variable(name),
            span: Span::single(start).to(self.position()),
        });
        Ok(())
    }

    fn lex_symbol(&mut self) -> LexResult<()> {
        let start = self.position();
        self.bump(); // 🔣
        let Some(c) = self.peek() else {
            return Err(LexError::UnterminatedSymbol(start));
        };
        let resolved = if c == '\\' {
            self.bump();
            let Some(escaped) = self.peek() else {
                return Err(LexError::UnterminatedSymbol(start));
            };
            let resolved = resolve_escape(escaped).ok_or(LexError::MalformedEscape(start, escaped))?;
            self.bump();
            resolved
        } else {
            self.bump();
            c
        };
        self.tokens.push(Token {
            kind: TokenKind::Symbol(resolved),
            span: Span::single(start).to(self.position()),
        });
        Ok(())
    }

    fn lex_doc_comment(&mut self) -> LexResult<()> {
        let start = self.position();
        self.bump(); // opening taco
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(LexError::UnterminatedString(start)),
                Some(c) if c == DOC_COMMENT_MARKER => {
                    self.bump();
                    break;
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
        self.tokens.push(Token {
            kind: TokenKind::DocComment(text),
            span: Span::single(start).to(self.position()),
        });
        Ok(())
    }

    fn lex_line_comment(&mut self) {
        let start = self.position();
        self.bump();
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == '\n' || c == '\u{2028}' || c == '\u{2029}' {
                break;
            }
            text.push(c);
            self.bump();
        }
        self.tokens.push(Token {
            kind: TokenKind::Comment(text),
            span: Span::single(start).to(self.position()),
        });
    }

    fn lex_string(&mut self) -> LexResult<()> {
        let start = self.position();
        self.bump(); // opening quote
        let mut parts = Vec::new();
        let mut literal = String::new();
        loop {
            match self.peek() {
                None => return Err(LexError::UnterminatedString(start)),
                Some('"') => {
                    self.bump();
                    break;
                }
                Some(c) if c == INTERPOLATION_START => {
                    if !literal.is_empty() {
                        parts.push(StringPart::Literal(std::mem::take(&mut literal)));
                    }
                    self.bump();
                    let inner = self.lex_interpolation()?;
                    parts.push(StringPart::Interpolated(inner));
                }
                Some('\\') => {
                    self.bump();
                    let Some(escaped) = self.peek() else {
                        return Err(LexError::UnterminatedString(start));
                    };
                    let resolved =
                        resolve_escape(escaped).ok_or(LexError::MalformedEscape(start, escaped))?;
                    literal.push(resolved);
                    self.bump();
                }
                Some(c) => {
                    literal.push(c);
                    self.bump();
                }
            }
        }
        if !literal.is_empty() || parts.is_empty() {
            parts.push(StringPart::Literal(literal));
        }
        self.tokens.push(Token {
            kind: TokenKind::String(parts),
            span: Span::single(start).to(self.position()),
        });
        Ok(())
    }

    fn lex_number(&mut self) -> LexResult<()> {
        let start = self.position();
        let mut text = String::new();

        if self.peek() == Some('-') {
            text.push('-');
            self.bump();
        }

        let is_hex = self.peek() == Some('0') && {
            let mut clone = self.iterator.clone();
            clone.next();
            matches!(clone.next(), Some('x'))
        };

        if is_hex {
            self.bump();
            self.bump();
            let mut digits = String::new();
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() || c == '_' {
                    if c != '_' {
                        digits.push(c);
                    }
                    self.bump();
                } else {
                    break;
                }
            }
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|_| LexError::InvalidNumber(start, format!("0x{digits}")))?;
            let value = if text.starts_with('-') { -value } else { value };
            self.tokens.push(Token {
                kind: TokenKind::Integer(value),
                span: Span::single(start).to(self.position()),
            });
            return Ok(());
        }

        let mut is_double = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {
                    if c != '_' {
                        text.push(c);
                    }
                    self.bump();
                }
                '.' => {
                    is_double = true;
                    text.push(c);
                    self.bump();
                }
                _ => break,
            }
        }

        if is_double {
            let value = text
                .parse::<f64>()
                .map_err(|_| LexError::InvalidNumber(start, text.clone()))?;
            self.tokens.push(Token {
                kind: TokenKind::Double(value),
                span: Span::single(start).to(self.position()),
            });
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|_| LexError::InvalidNumber(start, text.clone()))?;
            self.tokens.push(Token {
                kind: TokenKind::Integer(value),
                span: Span::single(start).to(self.position()),
            });
        }

        Ok(())
    }
}

/// Resolves the fixed escape-sequence set from §4.A: `\n \t \r \e \❌ \🔤`.
fn resolve_escape(c: char) -> Option<char> {
    match c {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        'e' => Some('\u{1B}'),
        '❌' => Some('❌'),
        '🔤' => Some('🔤'),
        '"' => Some('"'),
        '\\' => Some('\\'),
        other => Some(other),
    }
}

/// A simple cursor over an already-lexed token stream, used by the
/// recursive-descent parser. Stands in for the "linked list of tokens"
/// the spec describes — a `Vec` with a cursor gives the same one-token
/// lookahead without the indirection overhead of an actual linked list.
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl From<Vec<Token>> for TokenStream {
    fn from(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }
}

impl TokenStream {
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    pub fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn reset_to(&mut self, position: usize) {
        self.pos = position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_single_codepoint_identifiers() {
        let lexer = Lexer::new("\u{1F431}");
        let tokens = lexer.lex().unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(matches!(tokens[0].kind, TokenKind::Identifier('\u{1F431}')));
    }

    #[test]
    fn lexes_integer_with_underscores_and_hex() {
        let lexer = Lexer::new("1_000 0xFF -42");
        let tokens = lexer.lex().unwrap();
        assert_eq!(
            tokens.iter().map(|t| t.kind.clone()).collect::<Vec<_>>(),
            vec![
                TokenKind::Integer(1000),
                TokenKind::Integer(255),
                TokenKind::Integer(-42),
            ]
        );
    }

    #[test]
    fn lexes_double_literal() {
        let lexer = Lexer::new("3.14");
        let tokens = lexer.lex().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Double(3.14));
    }

    #[test]
    fn lexes_string_with_escapes() {
        let lexer = Lexer::new("\"a\\nb\"");
        let tokens = lexer.lex().unwrap();
        assert_eq!(
            tokens[0].kind,
            TokenKind::String(vec![StringPart::Literal("a\nb".to_string())])
        );
    }

    #[test]
    fn lexes_string_with_interpolation() {
        let lexer = Lexer::new("\"hi 🔛🍦x🔚!\"");
        let tokens = lexer.lex().unwrap();
        let TokenKind::String(parts) = &tokens[0].kind else {
            panic!("expected a string token");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], StringPart::Literal("hi ".to_string()));
        assert!(matches!(parts[1], StringPart::Interpolated(_)));
        assert_eq!(parts[2], StringPart::Literal("!".to_string()));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let lexer = Lexer::new("\"abc");
        assert!(matches!(lexer.lex(), Err(LexError::UnterminatedString(_))));
    }

    #[test]
    fn lexes_doc_comment_verbatim() {
        let lexer = Lexer::new("🌮 hello world 🌮");
        let tokens = lexer.lex().unwrap();
        assert_eq!(
            tokens[0].kind,
            TokenKind::DocComment(" hello world ".to_string())
        );
    }

    #[test]
    fn newline_variants_advance_line_counter() {
        let lexer = Lexer::new("\"a\"\u{2028}\"b\"");
        let tokens = lexer.lex().unwrap();
        assert_eq!(tokens[1].span.start.line, 2);
    }
}
