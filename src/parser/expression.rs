use crate::ast::{
    Arguments, BinaryOperator, CastKind, Closure, Expression, StringSegment,
};
use crate::lexer::{Span, StringPart, Token, TokenKind, TokenStream};
use crate::types::Type;

use super::error::{ParseError, ParseResult};
use super::keywords;
use super::names::NameTable;
use super::statement::parse_block;
use super::types::{parse_type, GenericScope};

fn binary_operator_for(c: char) -> Option<BinaryOperator> {
    use keywords::*;
    use BinaryOperator::*;
    Some(match c {
        c if c == OP_ADD => Add,
        c if c == OP_SUB => Sub,
        c if c == OP_MUL => Mul,
        c if c == OP_DIV => Div,
        c if c == OP_REM => Rem,
        c if c == OP_EQ => Eq,
        c if c == OP_NEQ => Neq,
        c if c == OP_LT => Lt,
        c if c == OP_LTE => Lte,
        c if c == OP_GT => Gt,
        c if c == OP_GTE => Gte,
        c if c == OP_AND => And,
        c if c == OP_OR => Or,
        c if c == OP_SHL => ShiftLeft,
        c if c == OP_SHR => ShiftRight,
        c if c == OP_BITAND => BitAnd,
        c if c == OP_BITOR => BitOr,
        c if c == OP_BITXOR => BitXor,
        _ => return None,
    })
}

fn peek_identifier(tokens: &TokenStream) -> Option<char> {
    match tokens.peek() {
        Some(Token {
            kind: TokenKind::Identifier(c),
            ..
        }) => Some(*c),
        _ => None,
    }
}

/// Parses one expression. Emojicode has no operator precedence: binary
/// operators associate strictly left to right, so this is a flat loop
/// over primaries rather than a precedence-climbing parser.
pub fn parse_expression(
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Expression> {
    let mut left = parse_primary(tokens, names, namespace, generics)?;

    while let Some(c) = peek_identifier(tokens) {
        let Some(op) = binary_operator_for(c) else {
            break;
        };
        tokens.next();
        let right = parse_primary(tokens, names, namespace, generics)?;
        let span = left.start_span_to(&right);
        left = Expression::Binary(op, Box::new(left), Box::new(right), span);
    }

    if let Some(c) = peek_identifier(tokens) {
        if c == keywords::RANGE_INCLUSIVE || c == keywords::RANGE_EXCLUSIVE {
            tokens.next();
            let inclusive = c == keywords::RANGE_INCLUSIVE;
            let stop = parse_primary(tokens, names, namespace, generics)?;
            let step = if matches_identifier(tokens, keywords::RANGE_STEP) {
                tokens.next();
                Some(Box::new(parse_primary(tokens, names, namespace, generics)?))
            } else {
                None
            };
            let span = left.start_span_to(&stop);
            left = Expression::RangeLiteral {
                start: Box::new(left),
                stop: Box::new(stop),
                step,
                inclusive,
                span,
            };
        }
    }

    Ok(left)
}

trait SpanTo {
    fn start_span_to(&self, other: &Expression) -> Span;
}

impl SpanTo for Expression {
    fn start_span_to(&self, other: &Expression) -> Span {
        self.position().to(other.position().end)
    }
}

fn parse_primary(
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Expression> {
    let token = tokens.next().ok_or(ParseError::UnexpectedEndOfInput)?;
    let start = token.span.start;

    match token.kind {
        TokenKind::Integer(v) => Ok(Expression::IntegerLiteral(v, token.span)),
        TokenKind::Double(v) => Ok(Expression::DoubleLiteral(v, token.span)),
        TokenKind::BooleanTrue => Ok(Expression::BooleanLiteral(true, token.span)),
        TokenKind::BooleanFalse => Ok(Expression::BooleanLiteral(false, token.span)),
        TokenKind::Symbol(c) => Ok(Expression::SymbolLiteral(c, token.span)),
        TokenKind::String(parts) => parse_string_literal(parts, token.span, names, namespace, generics),
        TokenKind::Variable(name) => Ok(Expression::VariableLoad(name, token.span)),

        TokenKind::Identifier(c) if c == keywords::SELF => Ok(Expression::SelfExpr(token.span)),

        TokenKind::Identifier(c) if c == keywords::NOT => {
            let inner = parse_primary(tokens, names, namespace, generics)?;
            let span = token.span.to(inner.position().end);
            Ok(Expression::Not(Box::new(inner), span))
        }

        TokenKind::Identifier(c) if c == keywords::LIST_LITERAL => {
            let mut values = vec![];
            loop {
                if matches_identifier(tokens, keywords::LIST_END) {
                    tokens.next();
                    break;
                }
                values.push(parse_expression(tokens, names, namespace, generics)?);
            }
            let span = Span {
                start,
                end: tokens
                    .peek_at(0)
                    .map(|t| t.span.start)
                    .unwrap_or(start),
            };
            Ok(Expression::ListLiteral(values, span))
        }

        TokenKind::Identifier(c) if c == keywords::DICTIONARY_LITERAL => {
            let mut values = vec![];
            loop {
                if matches_identifier(tokens, keywords::DICT_END) {
                    tokens.next();
                    break;
                }
                let key = parse_expression(tokens, names, namespace, generics)?;
                expect_identifier(tokens, keywords::DICT_SEPARATOR)?;
                let value = parse_expression(tokens, names, namespace, generics)?;
                values.push((key, value));
            }
            Ok(Expression::DictionaryLiteral(values, token.span))
        }

        TokenKind::Identifier(c) if c == keywords::CLOSURE => {
            parse_closure(tokens, names, namespace, generics, token.span)
        }

        TokenKind::Identifier(c) if c == keywords::SUPER_INITIALIZER => {
            let initializer_name = expect_any_identifier(tokens)?;
            let arguments = parse_arguments(tokens, names, namespace, generics)?;
            let span = token.span;
            Ok(Expression::SuperInitializerCall {
                initializer_name,
                arguments,
                span,
            })
        }

        TokenKind::Identifier(c) if c == keywords::INITIALIZER => {
            // A class name and an initializer name are both bare
            // identifiers; the only way to tell `🆕 ClassName init args`
            // from the dynamic `🆕 init args` (legal only for `required`
            // initializers, resolved against the runtime class) is
            // whether the leading identifier actually names a declared
            // class — if not, it's the initializer name itself.
            let class_index = peek_identifier(tokens).and_then(|c| names.class_index(namespace, c));
            if class_index.is_some() {
                tokens.next();
            }
            let initializer_name = expect_any_identifier(tokens)?;
            let arguments = parse_arguments(tokens, names, namespace, generics)?;
            Ok(Expression::InitializerCall {
                class_index,
                initializer_name,
                arguments,
                dynamic: class_index.is_none(),
                span: token.span,
            })
        }

        TokenKind::Identifier(c) if c == keywords::CAST || c == keywords::CAST_DYNAMIC => {
            let value = parse_primary(tokens, names, namespace, generics)?;
            let ty = parse_type(tokens, names, namespace, generics)?;
            let kind = if c == keywords::CAST_DYNAMIC {
                CastKind::Dynamic(ty)
            } else {
                classify_cast_target(ty)
            };
            let span = token.span.to(value.position().end);
            Ok(Expression::Cast {
                value: Box::new(value),
                kind,
                span,
            })
        }

        TokenKind::Identifier(c) if c == keywords::CAPTURED_METHOD => {
            let receiver = parse_primary(tokens, names, namespace, generics)?;
            let name = expect_any_identifier(tokens)?;
            let span = token.span.to(receiver.position().end);
            Ok(Expression::CapturedMethod {
                receiver: Box::new(receiver),
                name,
                span,
            })
        }

        _ => {
            // Anything else starts a receiver expression dispatched with
            // a method/instance-variable name: `receiver name args…`.
            let receiver = parse_primary_from(token, tokens, names, namespace, generics)?;
            parse_dispatch_tail(receiver, tokens, names, namespace, generics)
        }
    }
}

/// Re-enters primary parsing for a token already consumed (used when the
/// leading token turned out not to be a keyword but the start of a plain
/// receiver expression, e.g. a variable or instance-variable load).
fn parse_primary_from(
    token: Token,
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Expression> {
    match token.kind {
        TokenKind::Variable(name) => Ok(Expression::VariableLoad(name, token.span)),
        TokenKind::Identifier(c) => {
            // A bare identifier not recognized as a keyword reads an
            // instance variable by that name.
            Ok(Expression::InstanceVariableLoad(c.to_string(), token.span))
        }
        other => {
            let _ = (names, namespace, generics);
            Err(ParseError::UnexpectedToken(
                token.span.start,
                format!("{other:?} is not a valid expression start"),
            ))
        }
    }
}

/// After a receiver is parsed, an optional safe-call marker and a method
/// name with its argument list complete a dispatch expression; otherwise
/// the receiver stands alone.
fn parse_dispatch_tail(
    receiver: Expression,
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Expression> {
    let safe = matches_identifier(tokens, keywords::SAFE_CALL);
    if safe {
        tokens.next();
    }

    let Some(name) = peek_plain_identifier(tokens) else {
        return Ok(receiver);
    };
    tokens.next();
    let arguments = parse_arguments(tokens, names, namespace, generics)?;
    let span = receiver.position().to(
        arguments
            .values
            .last()
            .map(|e| e.position().end)
            .unwrap_or(receiver.position().end),
    );
    Ok(Expression::Dispatch {
        receiver: Box::new(receiver),
        name,
        arguments,
        protocol_index: None,
        safe,
        span,
    })
}

/// An identifier that is not one of the reserved keyword code points —
/// used to recognize a trailing method name after a receiver.
fn peek_plain_identifier(tokens: &TokenStream) -> Option<char> {
    peek_identifier(tokens)
}

fn parse_arguments(
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Arguments> {
    let mut values = vec![];
    while let Some(next) = tokens.peek() {
        if is_argument_terminator(&next.kind) {
            break;
        }
        values.push(parse_expression(tokens, names, namespace, generics)?);
    }
    Ok(Arguments { values })
}

fn is_argument_terminator(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Identifier(c) if *c == keywords::BLOCK_END
            || *c == keywords::LIST_END
            || *c == keywords::DICT_END
            || *c == keywords::GENERIC_CLOSE
    )
}

fn classify_cast_target(ty: Type) -> CastKind {
    use crate::types::TypeKind;
    match ty.kind {
        TypeKind::Class { index, .. } => CastKind::Class(index),
        TypeKind::Protocol(index) => CastKind::Protocol(index),
        other => CastKind::Primitive(Type::new(other)),
    }
}

fn parse_closure(
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
    span: Span,
) -> ParseResult<Expression> {
    let mut params = vec![];
    while let Some(Token {
        kind: TokenKind::Variable(name),
        ..
    }) = tokens.peek().cloned()
    {
        tokens.next();
        let ty = parse_type(tokens, names, namespace, generics)?;
        params.push((name, ty));
    }

    let return_type = if matches_identifier(tokens, keywords::BLOCK_START) {
        Type::nothingness()
    } else {
        parse_type(tokens, names, namespace, generics)?
    };

    let captures_self = matches_identifier(tokens, keywords::SELF);
    if captures_self {
        tokens.next();
    }

    let body = parse_block(tokens, names, namespace, generics)?;

    Ok(Expression::Closure(
        Closure {
            params,
            return_type,
            captures_self,
            body: Box::new(body),
        },
        span,
    ))
}

fn parse_string_literal(
    parts: Vec<StringPart>,
    span: Span,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Expression> {
    let mut segments = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            StringPart::Literal(text) => segments.push(StringSegment::Literal(text)),
            StringPart::Interpolated(inner_tokens) => {
                let mut inner = TokenStream::from(inner_tokens);
                let expr = parse_expression(&mut inner, names, namespace, generics)?;
                segments.push(StringSegment::Interpolated(expr));
            }
        }
    }
    Ok(Expression::StringLiteral(segments, span))
}

fn matches_identifier(tokens: &TokenStream, target: char) -> bool {
    peek_identifier(tokens) == Some(target)
}

fn expect_identifier(tokens: &mut TokenStream, target: char) -> ParseResult<()> {
    match tokens.next() {
        Some(Token {
            kind: TokenKind::Identifier(c),
            ..
        }) if c == target => Ok(()),
        Some(other) => Err(ParseError::UnexpectedToken(
            other.span.start,
            format!("expected {target:?}, found {:?}", other.kind),
        )),
        None => Err(ParseError::UnexpectedEndOfInput),
    }
}

fn expect_any_identifier(tokens: &mut TokenStream) -> ParseResult<char> {
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
