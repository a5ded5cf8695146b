use crate::ast::{
    Assignment, AssignmentTarget, Block, ForEach, ForEachSource, IfBranch, IfChain, Return,
    Statement, VariableDeclaration, WhileLoop,
};
use crate::lexer::{Token, TokenKind, TokenStream};

use super::error::{ParseError, ParseResult};
use super::expression::parse_expression;
use super::keywords;
use super::names::NameTable;
use super::types::GenericScope;

fn is_identifier(tokens: &TokenStream, target: char) -> bool {
    matches!(
        tokens.peek(),
        Some(Token {
            kind: TokenKind::Identifier(c),
            ..
        }) if *c == target
    )
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

fn expect_variable(tokens: &mut TokenStream) -> ParseResult<String> {
    match tokens.next() {
        Some(Token {
            kind: TokenKind::Variable(name),
            ..
        }) => Ok(name),
        Some(other) => Err(ParseError::UnexpectedToken(
            other.span.start,
            format!("expected a variable, found {:?}", other.kind),
        )),
        None => Err(ParseError::UnexpectedEndOfInput),
    }
}

pub fn parse_block(
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Block> {
    expect_identifier(tokens, keywords::BLOCK_START)?;
    let mut statements = vec![];
    while !is_identifier(tokens, keywords::BLOCK_END) {
        if tokens.is_empty() {
            return Err(ParseError::UnexpectedEndOfInput);
        }
        statements.push(parse_statement(tokens, names, namespace, generics)?);
    }
    tokens.next(); // consume block end
    Ok(Block { statements })
}

fn parse_statement(
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Statement> {
    let token = tokens.peek().cloned().ok_or(ParseError::UnexpectedEndOfInput)?;

    match token.kind {
        TokenKind::Identifier(c) if c == keywords::VAR || c == keywords::FROZEN_VAR => {
            parse_variable_declaration(tokens, names, namespace, generics)
        }
        TokenKind::Identifier(c) if c == keywords::IF => {
            parse_if_chain(tokens, names, namespace, generics)
        }
        TokenKind::Identifier(c) if c == keywords::WHILE => {
            parse_while(tokens, names, namespace, generics)
        }
        TokenKind::Identifier(c) if c == keywords::FOR_EACH => {
            parse_for_each(tokens, names, namespace, generics)
        }
        TokenKind::Identifier(c) if c == keywords::RETURN => {
            tokens.next();
            let has_value = !is_identifier(tokens, keywords::BLOCK_END);
            let value = if has_value {
                Some(parse_expression(tokens, names, namespace, generics)?)
            } else {
                None
            };
            Ok(Statement::Return(Return {
                value,
                span: token.span,
            }))
        }
        TokenKind::Identifier(c) if c == keywords::ASSIGN => {
            tokens.next();
            let target = parse_assignment_target(tokens)?;
            let value = parse_expression(tokens, names, namespace, generics)?;
            Ok(Statement::Assignment(Assignment {
                target,
                value,
                span: token.span,
            }))
        }
        _ => {
            let expr = parse_expression(tokens, names, namespace, generics)?;
            Ok(Statement::Expression(expr))
        }
    }
}

fn parse_assignment_target(tokens: &mut TokenStream) -> ParseResult<AssignmentTarget> {
    match tokens.next() {
        Some(Token {
            kind: TokenKind::Variable(name),
            ..
        }) => Ok(AssignmentTarget::Variable(name)),
        Some(Token {
            kind: TokenKind::Identifier(c),
            ..
        }) => Ok(AssignmentTarget::InstanceVariable(c.to_string())),
        Some(other) => Err(ParseError::UnexpectedToken(
            other.span.start,
            format!("expected an assignment target, found {:?}", other.kind),
        )),
        None => Err(ParseError::UnexpectedEndOfInput),
    }
}

fn parse_variable_declaration(
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Statement> {
    let start = tokens.next().expect("caller already peeked VAR/FROZEN_VAR");
    let frozen = matches!(start.kind, TokenKind::Identifier(c) if c == keywords::FROZEN_VAR);

    let name = expect_variable(tokens)?;

    let has_type = !is_identifier(tokens, keywords::ASSIGN);
    let ty = if has_type {
        Some(super::types::parse_type(tokens, names, namespace, generics)?)
    } else {
        None
    };

    expect_identifier(tokens, keywords::ASSIGN)?;
    let value = parse_expression(tokens, names, namespace, generics)?;

    Ok(Statement::VariableDeclaration(VariableDeclaration {
        name,
        ty,
        value,
        frozen,
        span: start.span,
    }))
}

fn parse_if_chain(
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Statement> {
    let start = tokens.next().expect("caller already peeked IF");
    let mut branches = vec![];

    let condition = parse_expression(tokens, names, namespace, generics)?;
    let block = parse_block(tokens, names, namespace, generics)?;
    branches.push(IfBranch { condition, block });

    let mut else_block = None;
    loop {
        if !is_identifier(tokens, keywords::ELSE) {
            break;
        }
        tokens.next();
        if is_identifier(tokens, keywords::IF) {
            tokens.next();
            let condition = parse_expression(tokens, names, namespace, generics)?;
            let block = parse_block(tokens, names, namespace, generics)?;
            branches.push(IfBranch { condition, block });
        } else {
            else_block = Some(parse_block(tokens, names, namespace, generics)?);
            break;
        }
    }

    Ok(Statement::If(IfChain {
        branches,
        else_block,
        span: start.span,
    }))
}

fn parse_while(
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Statement> {
    let start = tokens.next().expect("caller already peeked WHILE");
    let condition = parse_expression(tokens, names, namespace, generics)?;
    let block = parse_block(tokens, names, namespace, generics)?;
    Ok(Statement::While(WhileLoop {
        condition,
        block,
        span: start.span,
    }))
}

fn parse_for_each(
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Statement> {
    let start = tokens.next().expect("caller already peeked FOR_EACH");
    let binding = expect_variable(tokens)?;
    let source_expr = parse_expression(tokens, names, namespace, generics)?;

    // This is a syntactic hint only; the compiler re-derives the actual
    // loop shape from the source expression's inferred static type, since
    // a variable or dispatch result typed as a list/range is just as
    // common as a literal here.
    let source = match &source_expr {
        crate::ast::Expression::ListLiteral(..) => ForEachSource::List(source_expr),
        crate::ast::Expression::RangeLiteral { .. } => ForEachSource::Range(source_expr),
        _ => ForEachSource::Iterable(source_expr),
    };

    let block = parse_block(tokens, names, namespace, generics)?;
    Ok(Statement::ForEach(ForEach {
        binding,
        source,
        block,
        span: start.span,
    }))
}
