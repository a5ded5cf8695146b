use crate::lexer::{Token, TokenKind, TokenStream};
use crate::types::{Type, TypeKind};

use super::error::{ParseError, ParseResult};
use super::keywords;
use super::names::NameTable;

/// Generic parameter names declared by the innermost enclosing class, in
/// declaration order — an identifier matching one of these resolves to a
/// `GenericReference` instead of a class/protocol/enum lookup.
pub struct GenericScope<'a>(pub &'a [char]);

impl<'a> GenericScope<'a> {
    pub fn empty() -> GenericScope<'static> {
        GenericScope(&[])
    }

    fn index_of(&self, name: char) -> Option<usize> {
        self.0.iter().position(|c| *c == name)
    }
}

pub fn parse_type(
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Type> {
    let optional = matches!(
        tokens.peek(),
        Some(Token {
            kind: TokenKind::Identifier(c),
            ..
        }) if *c == keywords::OPTIONAL_MARKER
    );
    if optional {
        tokens.next();
    }

    let base = parse_base_type(tokens, names, namespace, generics)?;
    Ok(if optional { base.optional() } else { base })
}

fn parse_base_type(
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Type> {
    let token = tokens.next().ok_or(ParseError::UnexpectedEndOfInput)?;

    match token.kind {
        TokenKind::NoType => Ok(Type::nothingness()),
        TokenKind::Identifier(c) if c == keywords::INTEGER_TYPE => Ok(Type::integer()),
        TokenKind::Identifier(c) if c == keywords::DOUBLE_TYPE => Ok(Type::double()),
        TokenKind::Identifier(c) if c == keywords::BOOLEAN_TYPE => Ok(Type::boolean()),
        TokenKind::Identifier(c) if c == keywords::SYMBOL_TYPE => Ok(Type::symbol()),
        TokenKind::Identifier(c) if c == keywords::SOMETHING_TYPE => Ok(Type::something()),
        TokenKind::Identifier(c) if c == keywords::SOMEOBJECT_TYPE => Ok(Type::someobject()),
        TokenKind::Identifier(c) if c == keywords::GENERIC_OPEN => {
            parse_callable_type(tokens, names, namespace, generics)
        }
        TokenKind::Identifier(c) => {
            if let Some(index) = generics.index_of(c) {
                return Ok(Type::new(TypeKind::GenericReference(index)));
            }
            match names.lookup(namespace, c) {
                Some((index, super::names::DeclKind::Class)) => {
                    let generic_arguments = parse_generic_arguments(tokens, names, namespace, generics)?;
                    Ok(Type::class(index, generic_arguments))
                }
                Some((index, super::names::DeclKind::Protocol)) => {
                    Ok(Type::new(TypeKind::Protocol(index)))
                }
                Some((index, super::names::DeclKind::Enum)) => Ok(Type::new(TypeKind::Enum(index))),
                None => Err(ParseError::UnknownType(token.span.start, namespace, c)),
            }
        }
        other => Err(ParseError::UnexpectedToken(
            token.span.start,
            format!("{other:?}"),
        )),
    }
}

fn parse_generic_arguments(
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Vec<Type>> {
    let opens = matches!(
        tokens.peek(),
        Some(Token {
            kind: TokenKind::Identifier(c),
            ..
        }) if *c == keywords::GENERIC_OPEN
    );
    if !opens {
        return Ok(vec![]);
    }
    tokens.next();

    let mut args = vec![];
    loop {
        let closes = matches!(
            tokens.peek(),
            Some(Token {
                kind: TokenKind::Identifier(c),
                ..
            }) if *c == keywords::GENERIC_CLOSE
        );
        if closes {
            tokens.next();
            break;
        }
        args.push(parse_type(tokens, names, namespace, generics)?);
    }
    Ok(args)
}

/// `🐚 argType* 🐌 ➜ returnType` — a first-class callable type.
fn parse_callable_type(
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Type> {
    let mut arguments = vec![];
    loop {
        let closes = matches!(
            tokens.peek(),
            Some(Token {
                kind: TokenKind::Identifier(c),
                ..
            }) if *c == keywords::GENERIC_CLOSE
        );
        if closes {
            tokens.next();
            break;
        }
        arguments.push(parse_type(tokens, names, namespace, generics)?);
    }

    let arrow = tokens.next().ok_or(ParseError::UnexpectedEndOfInput)?;
    match arrow.kind {
        TokenKind::Identifier(c) if c == keywords::CALLABLE_ARROW => {}
        other => {
            return Err(ParseError::UnexpectedToken(
                arrow.span.start,
                format!("expected {:?}, found {other:?}", keywords::CALLABLE_ARROW),
            ))
        }
    }

    let return_type = parse_type(tokens, names, namespace, generics)?;
    Ok(Type::new(TypeKind::Callable {
        arguments,
        return_type: Box::new(return_type),
    }))
}
