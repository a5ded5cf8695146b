use std::collections::HashMap;

use crate::lexer::{Position, Token, TokenKind, TokenStream};

use super::error::{ParseError, ParseResult};
use super::keywords;

/// The namespace assumed for declarations that appear without an
/// explicit package import — the "standard library" namespace.
pub const DEFAULT_NAMESPACE: char = '🌍';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Class,
    Protocol,
    Enum,
}

/// Maps every top-level class/protocol/enum name to its stable,
/// declaration-order program index before any bodies are parsed, so that
/// forward references (a method returning a class declared later in the
/// same file) resolve during the same pass that builds the AST.
#[derive(Debug, Default)]
pub struct NameTable {
    entries: HashMap<(char, char), (usize, DeclKind)>,
    class_count: usize,
    protocol_count: usize,
    enum_count: usize,
}

impl NameTable {
    pub fn declare(
        &mut self,
        namespace: char,
        name: char,
        kind: DeclKind,
        position: Position,
    ) -> ParseResult<usize> {
        if self.entries.contains_key(&(namespace, name)) {
            return Err(ParseError::DuplicateType(position, namespace, name));
        }
        let index = match kind {
            DeclKind::Class => {
                let i = self.class_count;
                self.class_count += 1;
                i
            }
            DeclKind::Protocol => {
                let i = self.protocol_count;
                self.protocol_count += 1;
                i
            }
            DeclKind::Enum => {
                let i = self.enum_count;
                self.enum_count += 1;
                i
            }
        };
        self.entries.insert((namespace, name), (index, kind));
        Ok(index)
    }

    pub fn lookup(&self, namespace: char, name: char) -> Option<(usize, DeclKind)> {
        self.entries.get(&(namespace, name)).copied()
    }

    pub fn class_index(&self, namespace: char, name: char) -> Option<usize> {
        match self.lookup(namespace, name) {
            Some((index, DeclKind::Class)) => Some(index),
            _ => None,
        }
    }

    pub fn protocol_index(&self, namespace: char, name: char) -> Option<usize> {
        match self.lookup(namespace, name) {
            Some((index, DeclKind::Protocol)) => Some(index),
            _ => None,
        }
    }

    pub fn enum_index(&self, namespace: char, name: char) -> Option<usize> {
        match self.lookup(namespace, name) {
            Some((index, DeclKind::Enum)) => Some(index),
            _ => None,
        }
    }

    /// `(class_count, protocol_count, enum_count)`, used to pre-size the
    /// placeholder vectors the main parse pass fills in by index.
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.class_count, self.protocol_count, self.enum_count)
    }
}

/// A lightweight forward scan over the token stream that records every
/// top-level type declaration without parsing bodies, so type references
/// anywhere in the file can resolve regardless of declaration order.
pub fn collect_declarations(tokens: &TokenStream, namespace: char) -> ParseResult<NameTable> {
    let mut table = NameTable::default();
    let mut cursor = tokens.clone();

    while let Some(token) = cursor.peek().cloned() {
        match token.kind {
            TokenKind::Identifier(keywords::CLASS) => {
                cursor.next();
                let name = expect_identifier(&mut cursor)?;
                table.declare(namespace, name, DeclKind::Class, token.span.start)?;
            }
            TokenKind::Identifier(keywords::PROTOCOL) => {
                cursor.next();
                let name = expect_identifier(&mut cursor)?;
                table.declare(namespace, name, DeclKind::Protocol, token.span.start)?;
            }
            TokenKind::Identifier(keywords::ENUM) => {
                cursor.next();
                let name = expect_identifier(&mut cursor)?;
                table.declare(namespace, name, DeclKind::Enum, token.span.start)?;
            }
            _ => {
                cursor.next();
            }
        }
    }

    Ok(table)
}

fn expect_identifier(tokens: &mut TokenStream) -> ParseResult<char> {
    match tokens.next() {
        Some(Token {
            kind: TokenKind::Identifier(c),
            ..
        }) => Ok(c),
        Some(other) => Err(ParseError::UnexpectedToken(
            other.span.start,
            format!("{:?}", other.kind),
        )),
        None => Err(ParseError::UnexpectedEndOfInput),
    }
}
