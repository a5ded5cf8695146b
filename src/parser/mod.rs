//! §4.C: the declaration parser. Recursive-descent, emoji-keyword
//! dispatched, over the flat token stream produced by the lexer. Builds
//! the program type graph (`ast::Program`) that VTI assignment (§4.D) and
//! the expression/statement compiler (§4.E) run over.
mod error;
mod expression;
mod keywords;
mod names;
mod statement;
mod types;

pub use error::{ParseError, ParseResult, ParseWarning};
pub use names::{DeclKind, NameTable, DEFAULT_NAMESPACE};
pub use types::GenericScope;

use crate::ast::{
    Class, EnumDecl, GenericParameter, InstanceVariable, Package, PackageVersion, Procedure,
    ProcedureFlags, ProcedureKind, Program, Protocol, ProtocolMethod,
};
use crate::lexer::{Lexer, Position, Token, TokenKind, TokenStream};
use crate::types::Type;

use self::statement::parse_block;
use self::types::parse_type;

/// Parses a complete source file into a `Program`. Lexing and parsing
/// warnings/errors are kept separate: a lex failure aborts before any
/// parsing begins, matching §7's "first error is fatal" discipline.
pub fn parse_source(source: &str) -> Result<(Program, Vec<ParseWarning>), ParseFailure> {
    let tokens = Lexer::new(source).lex().map_err(ParseFailure::Lex)?;
    let tokens: Vec<Token> = tokens.into_iter().filter(|t| !t.is_trivia()).collect();
    parse_program(tokens.into()).map_err(ParseFailure::Parse)
}

#[derive(Debug)]
pub enum ParseFailure {
    Lex(crate::lexer::LexError),
    Parse(ParseError),
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseFailure::Lex(e) => write!(f, "{e}"),
            ParseFailure::Parse(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ParseFailure {}

struct Modifiers {
    is_final: bool,
    access: crate::ast::AccessLevel,
    is_override: bool,
    class_side: bool,
    required: bool,
    can_return_nothingness: bool,
    native: bool,
    startup: bool,
}

impl Default for Modifiers {
    fn default() -> Self {
        Self {
            is_final: false,
            access: crate::ast::AccessLevel::Public,
            is_override: false,
            class_side: false,
            required: false,
            can_return_nothingness: false,
            native: false,
            startup: false,
        }
    }
}

fn peek_char(tokens: &TokenStream) -> Option<char> {
    match tokens.peek() {
        Some(Token {
            kind: TokenKind::Identifier(c),
            ..
        }) => Some(*c),
        _ => None,
    }
}

fn is_char(tokens: &TokenStream, target: char) -> bool {
    peek_char(tokens) == Some(target)
}

fn expect_char(tokens: &mut TokenStream, target: char) -> ParseResult<Position> {
    match tokens.next() {
        Some(Token {
            kind: TokenKind::Identifier(c),
            span,
        }) if c == target => Ok(span.start),
        Some(other) => Err(ParseError::UnexpectedToken(
            other.span.start,
            format!("expected {target:?}, found {:?}", other.kind),
        )),
        None => Err(ParseError::UnexpectedEndOfInput),
    }
}

fn expect_any_char(tokens: &mut TokenStream) -> ParseResult<(char, Position)> {
    match tokens.next() {
        Some(Token {
            kind: TokenKind::Identifier(c),
            span,
        }) => Ok((c, span.start)),
        Some(other) => Err(ParseError::UnexpectedToken(
            other.span.start,
            format!("{:?}", other.kind),
        )),
        None => Err(ParseError::UnexpectedEndOfInput),
    }
}

fn expect_integer(tokens: &mut TokenStream) -> ParseResult<i64> {
    match tokens.next() {
        Some(Token {
            kind: TokenKind::Integer(v),
            ..
        }) => Ok(v),
        Some(other) => Err(ParseError::UnexpectedToken(
            other.span.start,
            format!("expected an integer, found {:?}", other.kind),
        )),
        None => Err(ParseError::UnexpectedEndOfInput),
    }
}

fn expect_boolean(tokens: &mut TokenStream) -> ParseResult<bool> {
    match tokens.next() {
        Some(Token {
            kind: TokenKind::BooleanTrue,
            ..
        }) => Ok(true),
        Some(Token {
            kind: TokenKind::BooleanFalse,
            ..
        }) => Ok(false),
        Some(other) => Err(ParseError::UnexpectedToken(
            other.span.start,
            format!("expected a boolean, found {:?}", other.kind),
        )),
        None => Err(ParseError::UnexpectedEndOfInput),
    }
}

fn expect_string_literal(tokens: &mut TokenStream) -> ParseResult<String> {
    match tokens.next() {
        Some(Token {
            kind: TokenKind::String(parts),
            span,
        }) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    crate::lexer::StringPart::Literal(s) => out.push_str(&s),
                    crate::lexer::StringPart::Interpolated(_) => {
                        return Err(ParseError::UnexpectedToken(
                            span.start,
                            "interpolation is not allowed here".to_string(),
                        ))
                    }
                }
            }
            Ok(out)
        }
        Some(other) => Err(ParseError::UnexpectedToken(
            other.span.start,
            format!("expected a string literal, found {:?}", other.kind),
        )),
        None => Err(ParseError::UnexpectedEndOfInput),
    }
}

fn take_doc_comment(_tokens: &mut TokenStream) -> Option<String> {
    // Doc comments are filtered out of the trivia-free token stream before
    // parsing begins (see `parse_source`); full-fidelity doc-comment
    // association with the following declaration would require keeping
    // trivia in the stream and is left for the diagnostics front-end,
    // which re-lexes with trivia retained when `-j` dumps documentation.
    None
}

/// Entry point once the caller already has a token stream (used directly
/// by unit tests that want to skip the lexer).
pub fn parse_program(mut tokens: TokenStream) -> ParseResult<(Program, Vec<ParseWarning>)> {
    let names = names::collect_declarations(&tokens, DEFAULT_NAMESPACE)?;
    let mut program = Program::default();
    // `classes`/`protocols`/`enums` are filled in by index as declarations
    // are parsed; pre-size with placeholders so out-of-order population
    // (class extensions referring forward) never panics on index access.
    let (class_total, protocol_total, enum_total) = names.counts();
    let mut classes: Vec<Option<Class>> = (0..class_total).map(|_| None).collect();
    let mut protocols: Vec<Option<Protocol>> = (0..protocol_total).map(|_| None).collect();
    let mut enums: Vec<Option<EnumDecl>> = (0..enum_total).map(|_| None).collect();
    let mut warnings = Vec::new();

    while let Some(token) = tokens.peek().cloned() {
        match token.kind {
            TokenKind::Identifier(c) if c == keywords::PACKAGE_IMPORT => {
                tokens.next();
                program.packages.push(parse_package_import(&mut tokens)?);
            }
            TokenKind::Identifier(c) if c == keywords::VERSION_DECLARATION => {
                tokens.next();
                let major = expect_integer(&mut tokens)? as u16;
                let minor = expect_integer(&mut tokens)? as u16;
                program.own_version = Some(PackageVersion { major, minor });
            }
            TokenKind::Identifier(c) if c == keywords::NATIVE_BINARY_MARKER => {
                tokens.next();
                program.own_requires_native_binary = true;
            }
            TokenKind::Identifier(c) if c == keywords::PROTOCOL => {
                tokens.next();
                let (index, protocol) = parse_protocol(&mut tokens, &names)?;
                protocols[index] = Some(protocol);
            }
            TokenKind::Identifier(c) if c == keywords::ENUM => {
                tokens.next();
                let (index, decl) = parse_enum(&mut tokens, &names)?;
                enums[index] = Some(decl);
            }
            TokenKind::Identifier(c) if c == keywords::CLASS => {
                tokens.next();
                let (index, class, startup) =
                    parse_class(&mut tokens, &names, &classes, &mut warnings)?;
                if let Some(name) = startup {
                    program.startup_pending = Some((index, name));
                }
                classes[index] = Some(class);
            }
            TokenKind::Identifier(c) if c == keywords::CLASS_EXTENSION => {
                tokens.next();
                parse_class_extension(&mut tokens, &names, &mut classes, &mut warnings)?;
            }
            TokenKind::DocComment(_) | TokenKind::Comment(_) => {
                tokens.next();
            }
            _ => {
                return Err(ParseError::UnexpectedToken(
                    token.span.start,
                    format!("{:?} is not a valid top-level declaration", token.kind),
                ))
            }
        }
    }

    program.classes = classes
        .into_iter()
        .enumerate()
        .map(|(i, c)| c.unwrap_or_else(|| unreachable!("class {i} declared in name table but never parsed")))
        .collect();
    program.protocols = protocols
        .into_iter()
        .enumerate()
        .map(|(i, p)| p.unwrap_or_else(|| unreachable!("protocol {i} declared in name table but never parsed")))
        .collect();
    program.enums = enums
        .into_iter()
        .enumerate()
        .map(|(i, e)| e.unwrap_or_else(|| unreachable!("enum {i} declared in name table but never parsed")))
        .collect();

    Ok((program, warnings))
}

fn parse_package_import(tokens: &mut TokenStream) -> ParseResult<Package> {
    let name = expect_string_literal(tokens)?;
    let major = expect_integer(tokens)? as u16;
    let minor = expect_integer(tokens)? as u16;
    let requires_native_binary = expect_boolean(tokens)?;
    Ok(Package {
        name,
        version: PackageVersion { major, minor },
        requires_native_binary,
    })
}

fn parse_protocol(tokens: &mut TokenStream, names: &NameTable) -> ParseResult<(usize, Protocol)> {
    let start = tokens.peek().map(|t| t.span.start).unwrap_or_default();
    let (name, _) = expect_any_char(tokens)?;
    let index = names
        .protocol_index(DEFAULT_NAMESPACE, name)
        .expect("protocol was registered by collect_declarations");

    expect_char(tokens, keywords::BLOCK_START)?;
    let mut methods = Vec::new();
    while !is_char(tokens, keywords::BLOCK_END) {
        if tokens.is_empty() {
            return Err(ParseError::UnexpectedEndOfInput);
        }
        expect_char(tokens, keywords::METHOD)?;
        let (method_name, _) = expect_any_char(tokens)?;
        let mut params = Vec::new();
        while let Some(Token {
            kind: TokenKind::Variable(_),
            ..
        }) = tokens.peek()
        {
            tokens.next();
            params.push(parse_type(tokens, names, DEFAULT_NAMESPACE, &GenericScope::empty())?);
        }
        let return_type = parse_type(tokens, names, DEFAULT_NAMESPACE, &GenericScope::empty())?;
        methods.push(ProtocolMethod {
            name: method_name,
            params,
            return_type,
        });
    }
    tokens.next(); // block end

    Ok((
        index,
        Protocol {
            name,
            namespace: DEFAULT_NAMESPACE,
            methods,
            index,
            position: start,
            doc_comment: None,
        },
    ))
}

fn parse_enum(tokens: &mut TokenStream, names: &NameTable) -> ParseResult<(usize, EnumDecl)> {
    let start = tokens.peek().map(|t| t.span.start).unwrap_or_default();
    let (name, _) = expect_any_char(tokens)?;
    let index = names
        .enum_index(DEFAULT_NAMESPACE, name)
        .expect("enum was registered by collect_declarations");

    let mut decl = EnumDecl::new(name, DEFAULT_NAMESPACE, start);
    expect_char(tokens, keywords::BLOCK_START)?;
    while !is_char(tokens, keywords::BLOCK_END) {
        if tokens.is_empty() {
            return Err(ParseError::UnexpectedEndOfInput);
        }
        let (member, member_pos) = expect_any_char(tokens)?;
        if decl.members.contains_key(&member) {
            return Err(ParseError::DuplicateMember(member_pos, member));
        }
        let explicit = if matches!(
            tokens.peek(),
            Some(Token { kind: TokenKind::Integer(_), .. })
        ) {
            match tokens.next() {
                Some(Token {
                    kind: TokenKind::Integer(v),
                    ..
                }) => Some(v),
                _ => None,
            }
        } else {
            None
        };
        decl.add_member(member, explicit);
    }
    tokens.next(); // block end

    Ok((index, decl))
}

fn parse_generic_parameters(
    tokens: &mut TokenStream,
    names: &NameTable,
) -> ParseResult<Vec<GenericParameter>> {
    if !is_char(tokens, keywords::GENERIC_OPEN) {
        return Ok(vec![]);
    }
    tokens.next();
    let mut params = Vec::new();
    let mut declared_names: Vec<char> = Vec::new();
    loop {
        if is_char(tokens, keywords::GENERIC_CLOSE) {
            tokens.next();
            break;
        }
        let (name, _) = expect_any_char(tokens)?;
        // A constraint may refer to an earlier parameter in the same list
        // (bounded by it) but never to itself or a later one.
        let scope = GenericScope(&declared_names);
        let constraint = parse_type(tokens, names, DEFAULT_NAMESPACE, &scope)?;
        declared_names.push(name);
        params.push(GenericParameter { name, constraint });
    }
    Ok(params)
}

#[allow(clippy::type_complexity)]
fn parse_class(
    tokens: &mut TokenStream,
    names: &NameTable,
    classes: &[Option<Class>],
    warnings: &mut Vec<ParseWarning>,
) -> ParseResult<(usize, Class, Option<char>)> {
    let is_final = is_char(tokens, keywords::FINAL);
    if is_final {
        tokens.next();
    }

    let start = tokens.peek().map(|t| t.span.start).unwrap_or_default();
    let (name, name_pos) = expect_any_char(tokens)?;
    let index = names
        .class_index(DEFAULT_NAMESPACE, name)
        .expect("class was registered by collect_declarations");

    let mut class = Class::new(name, DEFAULT_NAMESPACE, start);

    let generic_parameters = parse_generic_parameters(tokens, names)?;
    let generic_names: Vec<char> = generic_parameters.iter().map(|g| g.name).collect();
    class.generic_parameters = generic_parameters;

    if is_char(tokens, keywords::EXTENDS) {
        let extends_pos = expect_char(tokens, keywords::EXTENDS)?;
        let attempted_name = peek_char(tokens).unwrap_or(name);
        let scope = GenericScope(&generic_names);
        let super_type = parse_type(tokens, names, DEFAULT_NAMESPACE, &scope)?;
        if super_type.optional {
            return Err(ParseError::OptionalAsSuperclass(extends_pos));
        }
        match super_type.kind {
            crate::types::TypeKind::Class {
                index: super_index,
                generic_arguments,
            } => {
                if super_index >= index {
                    return Err(ParseError::BadSuperclass(extends_pos, attempted_name));
                }
                class.superclass = Some(super_index);
                class.super_generic_arguments = generic_arguments;
            }
            _ => return Err(ParseError::BadSuperclass(extends_pos, attempted_name)),
        }
    }

    let scope = GenericScope(&generic_names);
    expect_char(tokens, keywords::BLOCK_START)?;
    let mut startup = None;
    while !is_char(tokens, keywords::BLOCK_END) {
        if tokens.is_empty() {
            return Err(ParseError::UnexpectedEndOfInput);
        }
        if let Some(name) = parse_class_body_item(
            tokens,
            names,
            &scope,
            &mut class,
            index,
            classes,
            warnings,
        )? {
            startup = Some(name);
        }
    }
    tokens.next(); // block end

    class.inherits_initializers = class.compute_inherits_initializers();

    Ok((index, class, startup))
}

fn parse_class_extension(
    tokens: &mut TokenStream,
    names: &NameTable,
    classes: &mut [Option<Class>],
    warnings: &mut Vec<ParseWarning>,
) -> ParseResult<()> {
    let (name, name_pos) = expect_any_char(tokens)?;
    let index = names
        .class_index(DEFAULT_NAMESPACE, name)
        .ok_or(ParseError::UnknownType(name_pos, DEFAULT_NAMESPACE, name))?;

    let generic_names: Vec<char> = classes[index]
        .as_ref()
        .map(|c| c.generic_parameters.iter().map(|g| g.name).collect())
        .unwrap_or_default();
    let scope = GenericScope(&generic_names);

    expect_char(tokens, keywords::BLOCK_START)?;
    // Extensions parse their body against a scratch class, then splice
    // the new members into the already-declared class so that an
    // extension appearing before the class's own `🐇` body in source
    // order (rare, but not disallowed) still finds a fresh slot.
    let mut scratch = Class::new(name, DEFAULT_NAMESPACE, name_pos);
    while !is_char(tokens, keywords::BLOCK_END) {
        if tokens.is_empty() {
            return Err(ParseError::UnexpectedEndOfInput);
        }
        parse_class_body_item(tokens, names, &scope, &mut scratch, index, classes, warnings)?;
    }
    tokens.next();

    let target = classes[index].get_or_insert_with(|| Class::new(name, DEFAULT_NAMESPACE, name_pos));
    target.instance_variables.extend(scratch.instance_variables);
    target.methods.extend(scratch.methods);
    target.type_methods.extend(scratch.type_methods);
    target.initializers.extend(scratch.initializers);
    target.protocols.extend(scratch.protocols);
    if scratch.deinitializer.is_some() {
        target.deinitializer = scratch.deinitializer;
    }
    Ok(())
}

/// Parses one class-body item (§4.C): an instance variable, a protocol
/// conformance, or a method/type-method/initializer/deinitializer,
/// pushing it into `class`. Returns `Some(name)` iff this item was a
/// `🏁`-flagged startup type-method.
#[allow(clippy::too_many_arguments)]
fn parse_class_body_item(
    tokens: &mut TokenStream,
    names: &NameTable,
    generics: &GenericScope,
    class: &mut Class,
    class_index: usize,
    classes: &[Option<Class>],
    warnings: &mut Vec<ParseWarning>,
) -> ParseResult<Option<char>> {
    let doc_comment = take_doc_comment(tokens);

    if let Some(Token {
        kind: TokenKind::Variable(var_name),
        ..
    }) = tokens.peek().cloned()
    {
        tokens.next();
        let ty = parse_type(tokens, names, DEFAULT_NAMESPACE, generics)?;
        if class.instance_variables.iter().any(|iv| iv.name == var_name) {
            return Err(ParseError::DuplicateMember(
                tokens.peek().map(|t| t.span.start).unwrap_or_default(),
                var_name.chars().next().unwrap_or('?'),
            ));
        }
        if class.instance_variables.len() >= u16::MAX as usize {
            return Err(ParseError::TooManyInstanceVariables(class.position, class.name));
        }
        class.instance_variables.push(InstanceVariable { name: var_name, ty });
        return Ok(None);
    }

    if is_char(tokens, keywords::CONFORMS_TO) {
        let pos = expect_char(tokens, keywords::CONFORMS_TO)?;
        let attempted_name = peek_char(tokens).unwrap_or(class.name);
        let protocol_type = parse_type(tokens, names, DEFAULT_NAMESPACE, generics)?;
        match protocol_type.kind {
            crate::types::TypeKind::Protocol(idx) => {
                if class.protocols.len() >= u16::MAX as usize {
                    return Err(ParseError::TooManyProtocols(pos, class.name));
                }
                class.protocols.push(idx);
            }
            _ => return Err(ParseError::NotAProtocol(pos, DEFAULT_NAMESPACE, attempted_name)),
        }
        return Ok(None);
    }

    if is_char(tokens, keywords::DEINITIALIZER) {
        let pos = expect_char(tokens, keywords::DEINITIALIZER)?;
        let body = parse_block(tokens, names, DEFAULT_NAMESPACE, generics)?;
        class.deinitializer = Some(Procedure {
            kind: ProcedureKind::Method,
            name: keywords::DEINITIALIZER,
            params: vec![],
            return_type: Type::nothingness(),
            access: crate::ast::AccessLevel::Public,
            flags: ProcedureFlags::default(),
            vti: None,
            doc_comment,
            body: Some(body),
            position: pos,
            span: crate::lexer::Span::single(pos),
            compiled: None,
        });
        return Ok(None);
    }

    let modifiers = parse_modifiers(tokens);

    match peek_char(tokens) {
        Some(c) if c == keywords::INITIALIZER => {
            tokens.next();
            let (name, pos) = expect_any_char(tokens)?;
            maybe_warn_reserved(warnings, name, pos);
            if class.initializers.contains_key(&name) {
                return Err(ParseError::DuplicateMember(pos, name));
            }
            let params = parse_params(tokens, names, DEFAULT_NAMESPACE, generics)?;
            let body = if modifiers.native {
                None
            } else {
                Some(parse_block(tokens, names, DEFAULT_NAMESPACE, generics)?)
            };
            let return_type = if modifiers.can_return_nothingness {
                Type::class(class_index, vec![]).optional()
            } else {
                Type::class(class_index, vec![])
            };
            class.initializers.insert(
                name,
                Procedure {
                    kind: ProcedureKind::Initializer,
                    name,
                    params,
                    return_type,
                    access: modifiers.access,
                    flags: ProcedureFlags {
                        is_final: modifiers.is_final,
                        is_override: modifiers.is_override,
                        is_native: modifiers.native,
                        required: modifiers.required,
                        can_return_nothingness: modifiers.can_return_nothingness,
                    },
                    vti: None,
                    doc_comment,
                    body,
                    position: pos,
                    span: crate::lexer::Span::single(pos),
                    compiled: None,
                },
            );
            Ok(None)
        }
        Some(c) if c == keywords::METHOD => {
            tokens.next();
            let (name, pos) = expect_any_char(tokens)?;
            maybe_warn_reserved(warnings, name, pos);
            let table = if modifiers.class_side {
                &mut class.type_methods
            } else {
                &mut class.methods
            };
            if table.contains_key(&name) {
                return Err(ParseError::DuplicateMember(pos, name));
            }
            if modifiers.is_override {
                let inherited = class
                    .superclass
                    .and_then(|sup| classes.get(sup).and_then(|c| c.as_ref()))
                    .map(|sup_class| {
                        if modifiers.class_side {
                            sup_class.type_methods.contains_key(&name)
                        } else {
                            sup_class.methods.contains_key(&name)
                        }
                    })
                    .unwrap_or(false);
                if !inherited {
                    return Err(ParseError::UnexpectedToken(
                        pos,
                        format!("{name} is marked override but no superclass member matches"),
                    ));
                }
            }
            let params = parse_params(tokens, names, DEFAULT_NAMESPACE, generics)?;
            let return_type = parse_type(tokens, names, DEFAULT_NAMESPACE, generics)?;
            let body = if modifiers.native {
                None
            } else {
                Some(parse_block(tokens, names, DEFAULT_NAMESPACE, generics)?)
            };
            let procedure = Procedure {
                kind: if modifiers.class_side {
                    ProcedureKind::TypeMethod
                } else {
                    ProcedureKind::Method
                },
                name,
                params,
                return_type,
                access: modifiers.access,
                flags: ProcedureFlags {
                    is_final: modifiers.is_final,
                    is_override: modifiers.is_override,
                    is_native: modifiers.native,
                    required: false,
                    can_return_nothingness: false,
                },
                vti: None,
                doc_comment,
                body,
                position: pos,
                span: crate::lexer::Span::single(pos),
                compiled: None,
            };
            let table = if modifiers.class_side {
                &mut class.type_methods
            } else {
                &mut class.methods
            };
            table.insert(name, procedure);
            Ok(if modifiers.startup && modifiers.class_side {
                Some(name)
            } else {
                None
            })
        }
        _ => {
            let next = tokens.peek().cloned().ok_or(ParseError::UnexpectedEndOfInput)?;
            Err(ParseError::UnexpectedToken(
                next.span.start,
                format!("expected a class member, found {:?}", next.kind),
            ))
        }
    }
}

fn maybe_warn_reserved(warnings: &mut Vec<ParseWarning>, name: char, pos: Position) {
    if keywords::RESERVED_NAMES.contains(&name) {
        warnings.push(ParseWarning::ReservedName(pos, name));
    }
}

fn parse_modifiers(tokens: &mut TokenStream) -> Modifiers {
    let mut modifiers = Modifiers::default();
    loop {
        match peek_char(tokens) {
            Some(c) if c == keywords::FINAL => {
                modifiers.is_final = true;
                tokens.next();
            }
            Some(c) if c == keywords::OVERRIDE => {
                modifiers.is_override = true;
                tokens.next();
            }
            Some(c) if c == keywords::CLASS_SIDE => {
                modifiers.class_side = true;
                tokens.next();
            }
            Some(c) if c == keywords::REQUIRED => {
                modifiers.required = true;
                tokens.next();
            }
            Some(c) if c == keywords::CAN_RETURN_NOTHINGNESS => {
                modifiers.can_return_nothingness = true;
                tokens.next();
            }
            Some(c) if c == keywords::NATIVE => {
                modifiers.native = true;
                tokens.next();
            }
            Some(c) if c == keywords::STARTUP_FLAG => {
                modifiers.startup = true;
                tokens.next();
            }
            Some(c) if c == keywords::ACCESS_PUBLIC => {
                modifiers.access = crate::ast::AccessLevel::Public;
                tokens.next();
            }
            Some(c) if c == keywords::ACCESS_PROTECTED => {
                modifiers.access = crate::ast::AccessLevel::Protected;
                tokens.next();
            }
            Some(c) if c == keywords::ACCESS_PRIVATE => {
                modifiers.access = crate::ast::AccessLevel::Private;
                tokens.next();
            }
            _ => break,
        }
    }
    modifiers
}

fn parse_params(
    tokens: &mut TokenStream,
    names: &NameTable,
    namespace: char,
    generics: &GenericScope,
) -> ParseResult<Vec<crate::ast::Param>> {
    let mut params = Vec::new();
    while let Some(Token {
        kind: TokenKind::Variable(name),
        ..
    }) = tokens.peek().cloned()
    {
        tokens.next();
        let ty = parse_type(tokens, names, namespace, generics)?;
        params.push(crate::ast::Param { name, ty });
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens_for(src: &str) -> TokenStream {
        Lexer::new(src)
            .lex()
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_trivia())
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn parses_empty_class() {
        let (program, _) = parse_program(tokens_for("🐇🐶🍇🍉")).unwrap();
        assert_eq!(program.classes.len(), 1);
        assert_eq!(program.classes[0].name, '🐶');
        assert!(program.classes[0].inherits_initializers);
    }

    #[test]
    fn parses_subclass_after_superclass() {
        let src = "🐇🐶🍇🍉🐇🐕🦒🐶🍇🍉";
        let (program, _) = parse_program(tokens_for(src)).unwrap();
        assert_eq!(program.classes.len(), 2);
        assert_eq!(program.classes[1].superclass, Some(0));
    }

    #[test]
    fn rejects_forward_superclass_reference() {
        // 🐕 is declared (index 0) before 🐶 (index 1) but tries to extend
        // it anyway, violating the "superclass comes first" ordering.
        let src = "🐇🐕🦒🐶🍇🍉🐇🐶🍇🍉";
        let err = parse_program(tokens_for(src)).unwrap_err();
        assert!(matches!(err, ParseError::BadSuperclass(..)));
    }

    #[test]
    fn rejects_truly_unknown_superclass() {
        let src = "🐇🐕🦒🦔🍇🍉";
        let err = parse_program(tokens_for(src)).unwrap_err();
        assert!(matches!(err, ParseError::UnknownType(..)));
    }

    #[test]
    fn parses_instance_variable_and_method() {
        let src = "🐇🐶🍇🍦x🔢🐖🐾🔢🍇🍎🍦x🍉🍉";
        let (program, _) = parse_program(tokens_for(src)).unwrap();
        let class = &program.classes[0];
        assert_eq!(class.instance_variables.len(), 1);
        assert_eq!(class.methods.len(), 1);
        assert!(!class.inherits_initializers);
    }

    #[test]
    fn parses_protocol_and_conformance() {
        let src = "🐊🐾🍇🐖🏃🔢🍉🐇🐶🍇🐕🐾🐖🏃🔢🍇🍎1🍉🍉";
        let (program, _) = parse_program(tokens_for(src)).unwrap();
        assert_eq!(program.protocols.len(), 1);
        assert_eq!(program.classes[0].protocols, vec![0]);
    }

    #[test]
    fn parses_enum_with_explicit_and_sequential_values() {
        let src = "🦃🎨🍇🔴1🟢🔵🍉";
        let (program, _) = parse_program(tokens_for(src)).unwrap();
        let decl = &program.enums[0];
        assert_eq!(decl.members[&'🔴'], 1);
        assert_eq!(decl.members[&'🟢'], 1);
        assert_eq!(decl.members[&'🔵'], 2);
    }

    #[test]
    fn reserved_name_as_method_emits_warning() {
        let src = "🐇🐶🍇🐖🐇🔢🍇🍎1🍉🍉";
        let (_, warnings) = parse_program(tokens_for(src)).unwrap();
        assert!(matches!(warnings[0], ParseWarning::ReservedName(_, '🐇')));
    }
}
