//! §4.E: expression bytecode emission. Every `compile_*` function pushes
//! exactly one value and returns its static type, which callers use for
//! argument/return/assignment compatibility checks and for resolving
//! dispatch targets against the receiver's type.
use std::collections::HashSet;

use crate::ast::{Arguments, BinaryOperator, CastKind, Closure, Expression, Param, Procedure, StringSegment};
use crate::bytecode::opcode::RUNTIME_CLASS_SENTINEL;
use crate::bytecode::{Instruction, PrimitiveKind, PrimitiveOp};
use crate::lexer::{Position, Span};
use crate::parser::DEFAULT_NAMESPACE;
use crate::types::{compatible, CompatibilityContext, Type, TypeKind};

use super::{resolve_member, Binding, CompileError, CompileResult, Emitter, FnCtx, StringPool};

/// `compatible()` as written treats an unresolved `GenericReference` (one
/// `ctx.resolve_generic` can't substitute, i.e. a reference to the
/// enclosing class' own type parameter used reflexively inside its own
/// method bodies — this VM never monomorphizes, so it never needs
/// resolving) as simply incompatible. Two references to the *same* slot
/// are trivially the same type regardless of what it's eventually bound
/// to, so that case is handled before falling through to the general
/// relation.
pub(super) fn types_compatible(program: &crate::ast::Program, a: &Type, to: &Type, parent: &Type) -> bool {
    if let (TypeKind::GenericReference(ai), TypeKind::GenericReference(bi)) = (&a.kind, &to.kind) {
        if ai == bi && (!a.optional || to.optional) {
            return true;
        }
    }
    compatible(a, to, parent, program)
}

fn substitute_generics(ty: &Type, owner: &Type, program: &crate::ast::Program) -> Type {
    match &ty.kind {
        TypeKind::GenericReference(i) => match program.resolve_generic(owner, *i) {
            Some(mut resolved) => {
                resolved.optional = resolved.optional || ty.optional;
                resolved
            }
            None => ty.clone(),
        },
        TypeKind::Class {
            index,
            generic_arguments,
        } => Type {
            kind: TypeKind::Class {
                index: *index,
                generic_arguments: generic_arguments
                    .iter()
                    .map(|a| substitute_generics(a, owner, program))
                    .collect(),
            },
            optional: ty.optional,
        },
        TypeKind::Callable {
            arguments,
            return_type,
        } => Type {
            kind: TypeKind::Callable {
                arguments: arguments
                    .iter()
                    .map(|a| substitute_generics(a, owner, program))
                    .collect(),
                return_type: Box::new(substitute_generics(return_type, owner, program)),
            },
            optional: ty.optional,
        },
        _ => ty.clone(),
    }
}

pub(super) fn flat_instance_variables<'p>(
    program: &'p crate::ast::Program,
    class_index: usize,
) -> Vec<&'p crate::ast::InstanceVariable> {
    let mut chain = program.superclass_chain(class_index);
    chain.reverse();
    chain
        .into_iter()
        .flat_map(|idx| program.classes[idx].instance_variables.iter())
        .collect()
}

pub(super) fn check_access(
    program: &crate::ast::Program,
    caller_class: usize,
    declaring_class: usize,
    proc: &Procedure,
    pos: Position,
) -> CompileResult<()> {
    use crate::ast::AccessLevel::*;
    match proc.access {
        Public => Ok(()),
        Private => {
            if declaring_class == caller_class {
                Ok(())
            } else {
                Err(CompileError::AccessViolation(pos, proc.name))
            }
        }
        Protected => {
            if program.superclass_chain(caller_class).contains(&declaring_class) {
                Ok(())
            } else {
                Err(CompileError::AccessViolation(pos, proc.name))
            }
        }
    }
}

fn compile_arguments(
    args: &Arguments,
    params: &[Param],
    name: char,
    pos: Position,
    parent: &Type,
    ctx: &mut FnCtx,
    pool: &mut StringPool,
) -> CompileResult<()> {
    if args.values.len() != params.len() {
        return Err(CompileError::WrongArgCount(
            pos,
            name,
            params.len(),
            args.values.len(),
        ));
    }
    for (arg, param) in args.values.iter().zip(params.iter()) {
        let argty = compile_expression(arg, ctx, pool)?;
        if !types_compatible(ctx.program, &argty, &param.ty, parent) {
            return Err(CompileError::TypeMismatch(
                arg.position().start,
                format!("argument to {name} does not match its declared parameter type"),
            ));
        }
    }
    Ok(())
}

pub(crate) fn compile_expression(
    expr: &Expression,
    ctx: &mut FnCtx,
    pool: &mut StringPool,
) -> CompileResult<Type> {
    match expr {
        Expression::IntegerLiteral(v, _) => {
            ctx.emitter.push(Instruction::PushInteger(*v));
            Ok(Type::integer())
        }
        Expression::DoubleLiteral(v, _) => {
            ctx.emitter.push(Instruction::PushDouble(*v));
            Ok(Type::double())
        }
        Expression::BooleanLiteral(v, _) => {
            ctx.emitter.push(Instruction::PushBoolean(*v));
            Ok(Type::boolean())
        }
        Expression::SymbolLiteral(c, _) => {
            ctx.emitter.push(Instruction::PushSymbol(*c));
            Ok(Type::symbol())
        }
        Expression::StringLiteral(segments, span) => compile_string_literal(segments, span, ctx, pool),
        Expression::ListLiteral(values, span) => compile_list_literal(values, span, ctx, pool),
        Expression::DictionaryLiteral(pairs, span) => compile_dictionary_literal(pairs, span, ctx, pool),
        Expression::VariableLoad(name, span) => compile_variable_load(name, span, ctx),
        Expression::InstanceVariableLoad(name, span) => compile_instance_variable_load(name, span, ctx),
        Expression::Dispatch {
            receiver,
            name,
            arguments,
            safe,
            span,
            ..
        } => compile_dispatch(receiver, *name, arguments, *safe, span, ctx, pool),
        Expression::InitializerCall {
            class_index,
            initializer_name,
            arguments,
            dynamic,
            span,
        } => compile_initializer_call(*class_index, *initializer_name, arguments, *dynamic, span, ctx, pool),
        Expression::SuperInitializerCall {
            initializer_name,
            arguments,
            span,
        } => compile_super_initializer_call(*initializer_name, arguments, span, ctx, pool),
        Expression::Cast { value, kind, span } => compile_cast(value, kind, span, ctx, pool),
        Expression::Closure(closure, span) => compile_closure(closure, span, ctx, pool),
        Expression::CapturedMethod { receiver, name, span } => {
            compile_captured_method(receiver, *name, span, ctx, pool)
        }
        Expression::Binary(op, lhs, rhs, span) => compile_binary(op, lhs, rhs, span, ctx, pool),
        Expression::Not(inner, span) => compile_not(inner, span, ctx, pool),
        Expression::SelfExpr(span) => {
            if ctx.is_initializer && ctx.class().superclass.is_some() && !ctx.super_init_called {
                return Err(CompileError::BadSuperInit(
                    span.start,
                    "self used before the super-initializer call".into(),
                ));
            }
            ctx.emitter.push(Instruction::LoadSelf);
            Ok(ctx.self_type())
        }
        Expression::RangeLiteral {
            start,
            stop,
            step,
            inclusive,
            span,
        } => compile_range_literal(start, stop, step.as_deref(), *inclusive, span, ctx, pool),
    }
}

fn compile_string_literal(
    segments: &[StringSegment],
    _span: &Span,
    ctx: &mut FnCtx,
    pool: &mut StringPool,
) -> CompileResult<Type> {
    for segment in segments {
        match segment {
            StringSegment::Literal(text) => {
                let index = pool.intern(text);
                ctx.emitter.push(Instruction::PushStringFromPool(index));
            }
            StringSegment::Interpolated(inner) => {
                compile_expression(inner, ctx, pool)?;
            }
        }
    }
    ctx.emitter
        .push(Instruction::BuildInterpolatedString(segments.len() as u32));
    Ok(string_type(ctx))
}

pub(super) fn string_type(ctx: &FnCtx) -> Type {
    let index = ctx
        .program
        .class_index_by_name(DEFAULT_NAMESPACE, crate::prelude::STRING)
        .expect("prelude always declares String");
    Type::class(index, vec![])
}

pub(super) fn list_type(ctx: &FnCtx, element: Type) -> Type {
    let index = ctx
        .program
        .class_index_by_name(DEFAULT_NAMESPACE, crate::prelude::LIST)
        .expect("prelude always declares List");
    Type::class(index, vec![element])
}

fn dictionary_type(ctx: &FnCtx, value: Type) -> Type {
    let index = ctx
        .program
        .class_index_by_name(DEFAULT_NAMESPACE, crate::prelude::DICTIONARY)
        .expect("prelude always declares Dictionary");
    Type::class(index, vec![value])
}

pub(super) fn range_type(ctx: &FnCtx) -> Type {
    let index = ctx
        .program
        .class_index_by_name(DEFAULT_NAMESPACE, crate::prelude::RANGE)
        .expect("prelude always declares Range");
    Type::class(index, vec![])
}

/// Common-ancestor widening for heterogeneous literal elements: starts at
/// the first element's type and falls back to `something` the moment a
/// later element isn't compatible with what's been settled on so far,
/// rather than searching the whole class graph for a tighter join.
fn widen_to_common(types: &[Type], ctx: &FnCtx) -> Type {
    let Some(first) = types.first() else {
        return Type::something();
    };
    let mut common = first.clone();
    for ty in &types[1..] {
        if !types_compatible(ctx.program, ty, &common, &common) {
            common = Type::something();
            break;
        }
    }
    common
}

fn compile_list_literal(
    values: &[Expression],
    _span: &Span,
    ctx: &mut FnCtx,
    pool: &mut StringPool,
) -> CompileResult<Type> {
    let mut element_types = Vec::with_capacity(values.len());
    for value in values {
        element_types.push(compile_expression(value, ctx, pool)?);
    }
    ctx.emitter.push(Instruction::BuildList(values.len() as u32));
    Ok(list_type(ctx, widen_to_common(&element_types, ctx)))
}

fn compile_dictionary_literal(
    pairs: &[(Expression, Expression)],
    _span: &Span,
    ctx: &mut FnCtx,
    pool: &mut StringPool,
) -> CompileResult<Type> {
    let expected_key = string_type(ctx);
    let mut value_types = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        let key_ty = compile_expression(key, ctx, pool)?;
        if !types_compatible(ctx.program, &key_ty, &expected_key, &expected_key) {
            return Err(CompileError::TypeMismatch(
                key.position().start,
                "dictionary keys must be String".into(),
            ));
        }
        value_types.push(compile_expression(value, ctx, pool)?);
    }
    ctx.emitter.push(Instruction::BuildDictionary(pairs.len() as u32));
    Ok(dictionary_type(ctx, widen_to_common(&value_types, ctx)))
}

fn compile_range_literal(
    start: &Expression,
    stop: &Expression,
    step: Option<&Expression>,
    inclusive: bool,
    _span: &Span,
    ctx: &mut FnCtx,
    pool: &mut StringPool,
) -> CompileResult<Type> {
    let start_ty = compile_expression(start, ctx, pool)?;
    let stop_ty = compile_expression(stop, ctx, pool)?;
    require_integer(&start_ty, start.position().start)?;
    require_integer(&stop_ty, stop.position().start)?;
    let with_step = if let Some(step) = step {
        let step_ty = compile_expression(step, ctx, pool)?;
        require_integer(&step_ty, step.position().start)?;
        true
    } else {
        false
    };
    ctx.emitter
        .push(Instruction::BuildRange { with_step, inclusive });
    Ok(range_type(ctx))
}

fn require_integer(ty: &Type, pos: Position) -> CompileResult<()> {
    if ty.optional || !matches!(ty.kind, TypeKind::Integer) {
        return Err(CompileError::TypeMismatch(pos, "expected a non-optional Integer".into()));
    }
    Ok(())
}

fn compile_variable_load(name: &str, span: &Span, ctx: &mut FnCtx) -> CompileResult<Type> {
    let Some(binding) = ctx.scopes.lookup(name) else {
        return Err(CompileError::TypeMismatch(span.start, format!("{name} is not in scope")));
    };
    let Binding { ty, slot, .. } = binding.clone();
    ctx.emitter.push(Instruction::LoadLocal(slot));
    Ok(ty)
}

fn compile_instance_variable_load(name: &str, span: &Span, ctx: &mut FnCtx) -> CompileResult<Type> {
    let c = name.chars().next().expect("instance variable names are never empty");
    let flat = flat_instance_variables(ctx.program, ctx.class_index);
    if let Some((slot, ivar)) = flat.iter().enumerate().find(|(_, iv)| iv.name == name) {
        if ctx.is_initializer
            && !ivar.ty.optional
            && !ctx
                .ivar_init
                .as_ref()
                .expect("initializer context always carries ivar_init")
                .is_initialized(name)
        {
            return Err(CompileError::UseBeforeInit(span.start, name.to_string()));
        }
        ctx.emitter.push(Instruction::LoadInstanceVariable(slot as u16));
        return Ok(ivar.ty.clone());
    }
    Err(CompileError::UnknownMember(span.start, c))
}

fn compile_dispatch(
    receiver: &Expression,
    name: char,
    arguments: &Arguments,
    safe: bool,
    span: &Span,
    ctx: &mut FnCtx,
    pool: &mut StringPool,
) -> CompileResult<Type> {
    let pos = span.start;

    // A bare identifier naming a class, not an instance variable, as the
    // receiver means this is a type-method call (§4.E): the grammar
    // cannot distinguish `someIvar methodName` from `ClassName
    // typeMethodName` at parse time, since both are a plain identifier
    // followed by another identifier.
    if let Expression::InstanceVariableLoad(rname, _) = receiver {
        let rc = rname.chars().next().expect("never empty");
        let has_ivar = flat_instance_variables(ctx.program, ctx.class_index)
            .iter()
            .any(|iv| iv.name == *rname);
        if !has_ivar {
            if let Some(class_index) = ctx.program.class_index_by_name(DEFAULT_NAMESPACE, rc) {
                return compile_type_method_dispatch(class_index, name, arguments, pos, ctx, pool);
            }
        }
    }

    let receiver_type = compile_expression(receiver, ctx, pool)?;
    if safe && !receiver_type.optional {
        return Err(CompileError::TypeMismatch(
            pos,
            "the safe-call marker is only meaningful on an optional receiver".into(),
        ));
    }
    if !safe && receiver_type.optional {
        return Err(CompileError::TypeMismatch(
            pos,
            "dispatch on an optional receiver requires the safe-call marker".into(),
        ));
    }

    match &receiver_type.kind {
        TypeKind::Class { index, .. } => {
            let Some((proc, declaring)) = resolve_member(ctx.program, *index, name, |c| &c.methods) else {
                return Err(CompileError::UnknownMember(pos, name));
            };
            check_access(ctx.program, ctx.class_index, declaring, proc, pos)?;
            let vti = proc.vti.expect("VTI assignment runs before compilation");
            let params = proc.params.clone();
            let return_type = substitute_generics(&proc.return_type, &receiver_type, ctx.program);

            if safe {
                // `skip_to` names the instruction right past the argument
                // list and the plain `Dispatch` that follows it: if the
                // receiver on top of the stack is nothingness,
                // `SafeDispatch` pushes nothingness itself and jumps there
                // without ever evaluating the arguments.
                let safe_at = ctx.emitter.push(Instruction::SafeDispatch {
                    vti,
                    argument_count: params.len() as u8,
                    skip_to: usize::MAX,
                });
                compile_arguments(arguments, &params, name, pos, &receiver_type, ctx, pool)?;
                ctx.emitter.push(Instruction::Dispatch {
                    vti,
                    argument_count: params.len() as u8,
                });
                let skip_to = ctx.emitter.position();
                ctx.emitter.patch_safe_dispatch(safe_at, skip_to);
                Ok(return_type.optional())
            } else {
                compile_arguments(arguments, &params, name, pos, &receiver_type, ctx, pool)?;
                ctx.emitter.push(Instruction::Dispatch {
                    vti,
                    argument_count: params.len() as u8,
                });
                Ok(return_type)
            }
        }
        TypeKind::Protocol(protocol_index) => {
            if safe {
                return Err(CompileError::TypeMismatch(
                    pos,
                    "safe dispatch is not supported against a protocol receiver".into(),
                ));
            }
            let protocol = &ctx.program.protocols[*protocol_index];
            let Some(method) = protocol.methods.iter().find(|m| m.name == name) else {
                return Err(CompileError::UnknownMember(pos, name));
            };
            let offset = protocol
                .method_offset(name)
                .expect("just located by name above");
            let params: Vec<Param> = method
                .params
                .iter()
                .map(|ty| Param {
                    name: String::new(),
                    ty: ty.clone(),
                })
                .collect();
            let return_type = method.return_type.clone();
            compile_arguments(arguments, &params, name, pos, &receiver_type, ctx, pool)?;
            ctx.emitter.push(Instruction::DispatchProtocol {
                protocol_index: *protocol_index as u16,
                vti: offset as u16,
                argument_count: params.len() as u8,
            });
            Ok(return_type)
        }
        _ => Err(CompileError::UnknownMember(pos, name)),
    }
}

fn compile_type_method_dispatch(
    class_index: usize,
    name: char,
    arguments: &Arguments,
    pos: Position,
    ctx: &mut FnCtx,
    pool: &mut StringPool,
) -> CompileResult<Type> {
    let Some((proc, declaring)) = resolve_member(ctx.program, class_index, name, |c| &c.type_methods) else {
        return Err(CompileError::UnknownMember(pos, name));
    };
    check_access(ctx.program, ctx.class_index, declaring, proc, pos)?;
    let vti = proc.vti.expect("VTI assignment runs before compilation");
    let params = proc.params.clone();
    let return_type = proc.return_type.clone();
    let self_ty = Type::class(class_index, vec![]);

    ctx.emitter.push(Instruction::GetClassByIndex(class_index as u16));
    compile_arguments(arguments, &params, name, pos, &self_ty, ctx, pool)?;
    ctx.emitter.push(Instruction::DispatchTypeMethod {
        class_index: class_index as u16,
        vti,
    });
    Ok(return_type)
}

fn compile_initializer_call(
    class_index: Option<usize>,
    initializer_name: char,
    arguments: &Arguments,
    dynamic: bool,
    span: &Span,
    ctx: &mut FnCtx,
    pool: &mut StringPool,
) -> CompileResult<Type> {
    let pos = span.start;

    if dynamic {
        let Some((proc, _declaring)) =
            resolve_member(ctx.program, ctx.class_index, initializer_name, |c| &c.initializers)
        else {
            return Err(CompileError::UnknownMember(pos, initializer_name));
        };
        if !proc.flags.required {
            return Err(CompileError::TypeMismatch(
                pos,
                format!("{initializer_name} must be declared `required` to be called dynamically"),
            ));
        }
        let vti = proc.vti.expect("VTI assignment runs before compilation");
        let params = proc.params.clone();
        let can_return_nothingness = proc.flags.can_return_nothingness;
        let self_ty = ctx.self_type();
        compile_arguments(arguments, &params, initializer_name, pos, &self_ty, ctx, pool)?;
        ctx.emitter.push(Instruction::CallInitializer {
            class_index: RUNTIME_CLASS_SENTINEL,
            vti,
        });
        let mut ty = ctx.self_type();
        ty.optional = can_return_nothingness;
        return Ok(ty);
    }

    let class_index = class_index.expect("static initializer calls always resolve a class at parse time");
    let Some((proc, _declaring)) = resolve_member(ctx.program, class_index, initializer_name, |c| &c.initializers)
    else {
        return Err(CompileError::UnknownMember(pos, initializer_name));
    };
    let vti = proc.vti.expect("VTI assignment runs before compilation");
    let params = proc.params.clone();
    let can_return_nothingness = proc.flags.can_return_nothingness;
    // Generic classes constructed via `🆕` carry no explicit type
    // arguments in this grammar; `something` is the most permissive
    // instantiation a caller can narrow from with an explicit cast.
    let generic_arguments = ctx.program.classes[class_index]
        .generic_parameters
        .iter()
        .map(|_| Type::something())
        .collect();
    let self_ty = Type::class(class_index, generic_arguments.clone());
    compile_arguments(arguments, &params, initializer_name, pos, &self_ty, ctx, pool)?;
    ctx.emitter.push(Instruction::CallInitializer {
        class_index: class_index as u16,
        vti,
    });
    let mut ty = Type::class(class_index, generic_arguments);
    ty.optional = can_return_nothingness;
    Ok(ty)
}

fn compile_super_initializer_call(
    initializer_name: char,
    arguments: &Arguments,
    span: &Span,
    ctx: &mut FnCtx,
    pool: &mut StringPool,
) -> CompileResult<Type> {
    let pos = span.start;
    if !ctx.is_initializer {
        return Err(CompileError::BadSuperInit(
            pos,
            "only legal inside an initializer body".into(),
        ));
    }
    if ctx.flow_depth != 0 {
        return Err(CompileError::BadSuperInit(
            pos,
            "must not appear inside conditional or loop control flow".into(),
        ));
    }
    if ctx.super_init_called {
        return Err(CompileError::BadSuperInit(pos, "called more than once".into()));
    }
    let Some(superclass) = ctx.class().superclass else {
        return Err(CompileError::BadSuperInit(pos, "class has no superclass".into()));
    };
    let Some((proc, _declaring)) =
        resolve_member(ctx.program, superclass, initializer_name, |c| &c.initializers)
    else {
        return Err(CompileError::UnknownMember(pos, initializer_name));
    };
    let vti = proc.vti.expect("VTI assignment runs before compilation");
    let params = proc.params.clone();
    let super_ty = Type::class(superclass, vec![]);
    compile_arguments(arguments, &params, initializer_name, pos, &super_ty, ctx, pool)?;
    ctx.emitter.push(Instruction::SuperInitializerCall { vti });
    ctx.super_init_called = true;
    Ok(Type::nothingness())
}

fn primitive_kind_of(ty: &Type) -> Option<PrimitiveKind> {
    match ty.kind {
        TypeKind::Integer => Some(PrimitiveKind::Integer),
        TypeKind::Double => Some(PrimitiveKind::Double),
        TypeKind::Boolean => Some(PrimitiveKind::Boolean),
        TypeKind::Symbol => Some(PrimitiveKind::Symbol),
        _ => None,
    }
}

fn compile_cast(
    value: &Expression,
    kind: &CastKind,
    span: &Span,
    ctx: &mut FnCtx,
    pool: &mut StringPool,
) -> CompileResult<Type> {
    let pos = span.start;
    let value_ty = compile_expression(value, ctx, pool)?;
    match kind {
        CastKind::Class(index) => {
            if !matches!(value_ty.kind, TypeKind::Class { .. } | TypeKind::Protocol(_) | TypeKind::SomeObject) {
                return Err(CompileError::BadCast(pos, "can only cast an object-kind value to a class".into()));
            }
            ctx.emitter.push(Instruction::CastClass(*index as u16));
            Ok(Type::class(*index, vec![]).optional())
        }
        CastKind::Protocol(index) => {
            if !matches!(value_ty.kind, TypeKind::Class { .. } | TypeKind::Protocol(_) | TypeKind::SomeObject) {
                return Err(CompileError::BadCast(pos, "can only cast an object-kind value to a protocol".into()));
            }
            ctx.emitter.push(Instruction::CastProtocol(*index as u16));
            Ok(Type::new(TypeKind::Protocol(*index)).optional())
        }
        CastKind::Primitive(target) => {
            let Some(kind) = primitive_kind_of(target) else {
                return Err(CompileError::BadCast(pos, "cast target is not a primitive type".into()));
            };
            ctx.emitter.push(Instruction::CastPrimitive(kind));
            Ok(target.clone().optional())
        }
        CastKind::Dynamic(target) => {
            let Some(kind) = primitive_kind_of(target) else {
                return Err(CompileError::BadCast(pos, "dynamic cast target is not a primitive type".into()));
            };
            ctx.emitter.push(Instruction::CastDynamic(kind));
            Ok(target.clone().optional())
        }
    }
}

fn compile_captured_method(
    receiver: &Expression,
    name: char,
    span: &Span,
    ctx: &mut FnCtx,
    pool: &mut StringPool,
) -> CompileResult<Type> {
    let pos = span.start;
    let receiver_ty = compile_expression(receiver, ctx, pool)?;
    match &receiver_ty.kind {
        TypeKind::Class { index, .. } => {
            let Some((proc, declaring)) = resolve_member(ctx.program, *index, name, |c| &c.methods) else {
                return Err(CompileError::UnknownMember(pos, name));
            };
            check_access(ctx.program, ctx.class_index, declaring, proc, pos)?;
            let vti = proc.vti.expect("VTI assignment runs before compilation");
            let arguments = proc
                .params
                .iter()
                .map(|p| substitute_generics(&p.ty, &receiver_ty, ctx.program))
                .collect();
            let return_type = substitute_generics(&proc.return_type, &receiver_ty, ctx.program);
            ctx.emitter.push(Instruction::BuildCapturedMethod {
                vti,
                protocol_index: u16::MAX,
            });
            Ok(Type::new(TypeKind::Callable {
                arguments,
                return_type: Box::new(return_type),
            }))
        }
        TypeKind::Protocol(protocol_index) => {
            let protocol = &ctx.program.protocols[*protocol_index];
            let Some(method) = protocol.methods.iter().find(|m| m.name == name) else {
                return Err(CompileError::UnknownMember(pos, name));
            };
            let offset = protocol.method_offset(name).expect("just located above");
            ctx.emitter.push(Instruction::BuildCapturedMethod {
                vti: offset as u16,
                protocol_index: *protocol_index as u16,
            });
            Ok(Type::new(TypeKind::Callable {
                arguments: method.params.clone(),
                return_type: Box::new(method.return_type.clone()),
            }))
        }
        _ => Err(CompileError::UnknownMember(pos, name)),
    }
}

fn compile_binary(
    op: &BinaryOperator,
    lhs: &Expression,
    rhs: &Expression,
    span: &Span,
    ctx: &mut FnCtx,
    pool: &mut StringPool,
) -> CompileResult<Type> {
    use BinaryOperator::*;
    let pos = span.start;
    let lty = compile_expression(lhs, ctx, pool)?;
    let rty = compile_expression(rhs, ctx, pool)?;
    if lty.optional || rty.optional {
        return Err(CompileError::TypeMismatch(
            pos,
            "operators require non-optional primitive operands".into(),
        ));
    }

    macro_rules! prim {
        ($op:expr, $ret:expr) => {{
            ctx.emitter.push(Instruction::Primitive($op));
            return Ok($ret);
        }};
    }
    macro_rules! neq_via_eq {
        ($eq_op:expr) => {{
            ctx.emitter.push(Instruction::Primitive($eq_op));
            ctx.emitter.push(Instruction::Primitive(PrimitiveOp::BoolNot));
            return Ok(Type::boolean());
        }};
    }

    match (&lty.kind, &rty.kind, op) {
        (TypeKind::Integer, TypeKind::Integer, Add) => prim!(PrimitiveOp::IntAdd, Type::integer()),
        (TypeKind::Integer, TypeKind::Integer, Sub) => prim!(PrimitiveOp::IntSub, Type::integer()),
        (TypeKind::Integer, TypeKind::Integer, Mul) => prim!(PrimitiveOp::IntMul, Type::integer()),
        (TypeKind::Integer, TypeKind::Integer, Div) => prim!(PrimitiveOp::IntDiv, Type::integer()),
        (TypeKind::Integer, TypeKind::Integer, Rem) => prim!(PrimitiveOp::IntRem, Type::integer()),
        (TypeKind::Integer, TypeKind::Integer, Eq) => prim!(PrimitiveOp::IntEq, Type::boolean()),
        (TypeKind::Integer, TypeKind::Integer, Neq) => neq_via_eq!(PrimitiveOp::IntEq),
        (TypeKind::Integer, TypeKind::Integer, Lt) => prim!(PrimitiveOp::IntLt, Type::boolean()),
        (TypeKind::Integer, TypeKind::Integer, Lte) => prim!(PrimitiveOp::IntLte, Type::boolean()),
        (TypeKind::Integer, TypeKind::Integer, Gt) => prim!(PrimitiveOp::IntGt, Type::boolean()),
        (TypeKind::Integer, TypeKind::Integer, Gte) => prim!(PrimitiveOp::IntGte, Type::boolean()),
        (TypeKind::Integer, TypeKind::Integer, ShiftLeft) => prim!(PrimitiveOp::IntShl, Type::integer()),
        (TypeKind::Integer, TypeKind::Integer, ShiftRight) => prim!(PrimitiveOp::IntShr, Type::integer()),
        (TypeKind::Integer, TypeKind::Integer, BitAnd) => prim!(PrimitiveOp::IntBitAnd, Type::integer()),
        (TypeKind::Integer, TypeKind::Integer, BitOr) => prim!(PrimitiveOp::IntBitOr, Type::integer()),
        (TypeKind::Integer, TypeKind::Integer, BitXor) => prim!(PrimitiveOp::IntBitXor, Type::integer()),

        (TypeKind::Double, TypeKind::Double, Add) => prim!(PrimitiveOp::DoubleAdd, Type::double()),
        (TypeKind::Double, TypeKind::Double, Sub) => prim!(PrimitiveOp::DoubleSub, Type::double()),
        (TypeKind::Double, TypeKind::Double, Mul) => prim!(PrimitiveOp::DoubleMul, Type::double()),
        (TypeKind::Double, TypeKind::Double, Div) => prim!(PrimitiveOp::DoubleDiv, Type::double()),
        (TypeKind::Double, TypeKind::Double, Eq) => prim!(PrimitiveOp::DoubleEq, Type::boolean()),
        (TypeKind::Double, TypeKind::Double, Neq) => neq_via_eq!(PrimitiveOp::DoubleEq),
        (TypeKind::Double, TypeKind::Double, Lt) => prim!(PrimitiveOp::DoubleLt, Type::boolean()),
        (TypeKind::Double, TypeKind::Double, Lte) => prim!(PrimitiveOp::DoubleLte, Type::boolean()),
        (TypeKind::Double, TypeKind::Double, Gt) => prim!(PrimitiveOp::DoubleGt, Type::boolean()),
        (TypeKind::Double, TypeKind::Double, Gte) => prim!(PrimitiveOp::DoubleGte, Type::boolean()),

        (TypeKind::Boolean, TypeKind::Boolean, And) => prim!(PrimitiveOp::BoolAnd, Type::boolean()),
        (TypeKind::Boolean, TypeKind::Boolean, Or) => prim!(PrimitiveOp::BoolOr, Type::boolean()),

        (TypeKind::Symbol, TypeKind::Symbol, Eq) => prim!(PrimitiveOp::SymbolEq, Type::boolean()),
        (TypeKind::Symbol, TypeKind::Symbol, Neq) => neq_via_eq!(PrimitiveOp::SymbolEq),

        _ => Err(CompileError::TypeMismatch(
            pos,
            "this operator is not defined for these operand types".into(),
        )),
    }
}

fn compile_not(inner: &Expression, span: &Span, ctx: &mut FnCtx, pool: &mut StringPool) -> CompileResult<Type> {
    let ty = compile_expression(inner, ctx, pool)?;
    if ty.optional || !matches!(ty.kind, TypeKind::Boolean) {
        return Err(CompileError::TypeMismatch(span.start, "not requires a non-optional Boolean".into()));
    }
    ctx.emitter.push(Instruction::Primitive(PrimitiveOp::BoolNot));
    Ok(Type::boolean())
}

fn compile_closure(closure: &Closure, span: &Span, ctx: &mut FnCtx, pool: &mut StringPool) -> CompileResult<Type> {
    let mut bound: HashSet<String> = closure.params.iter().map(|(n, _)| n.clone()).collect();
    let mut free_order = Vec::new();
    let mut free_seen = HashSet::new();
    collect_free_vars_block(&closure.body, &mut bound, &mut free_order, &mut free_seen);

    let mut captured_slots = Vec::with_capacity(free_order.len());
    let mut captured_bindings: Vec<(String, Type)> = Vec::with_capacity(free_order.len());
    for name in &free_order {
        if let Some(binding) = ctx.scopes.lookup(name) {
            captured_slots.push(binding.slot);
            captured_bindings.push((name.clone(), binding.ty.clone()));
        }
    }

    let mut inner = FnCtx {
        program: ctx.program,
        class_index: ctx.class_index,
        is_initializer: false,
        return_type: closure.return_type.clone(),
        can_return_nothingness: false,
        scopes: super::ScopeStack::new(),
        ivar_init: None,
        emitter: Emitter::new(),
        returned: false,
        super_init_called: false,
        flow_depth: 0,
    };
    for (name, ty) in &captured_bindings {
        inner.scopes.declare(name.clone(), ty.clone(), false);
    }
    for (name, ty) in &closure.params {
        inner.scopes.declare(name.clone(), ty.clone(), false);
    }

    super::statement::compile_block(&closure.body, &mut inner, pool)?;
    if !matches!(inner.return_type.kind, TypeKind::Nothingness) && !inner.return_type.optional && !inner.returned {
        return Err(CompileError::MissingExplicitReturn(span.start));
    }
    inner.emitter.push(Instruction::Return);
    let variable_count = inner.scopes.variable_count();
    let body_instructions = inner.emitter.into_instructions();

    let build_at = ctx.emitter.push(Instruction::BuildClosure {
        variable_count,
        argument_count: closure.params.len() as u8,
        captures_self: closure.captures_self,
        captured_slots,
        body_end: usize::MAX,
    });
    for instr in body_instructions {
        ctx.emitter.push(instr);
    }
    let body_end = ctx.emitter.position();
    ctx.emitter.patch_closure_body_end(build_at, body_end);

    Ok(Type::new(TypeKind::Callable {
        arguments: closure.params.iter().map(|(_, ty)| ty.clone()).collect(),
        return_type: Box::new(closure.return_type.clone()),
    }))
}

fn collect_free_vars_block(
    block: &crate::ast::Block,
    bound: &mut HashSet<String>,
    out: &mut Vec<String>,
    seen: &mut HashSet<String>,
) {
    for statement in &block.statements {
        collect_free_vars_statement(statement, bound, out, seen);
    }
}

fn collect_free_vars_statement(
    statement: &crate::ast::Statement,
    bound: &mut HashSet<String>,
    out: &mut Vec<String>,
    seen: &mut HashSet<String>,
) {
    use crate::ast::Statement::*;
    match statement {
        Expression(expr) => collect_free_vars_expr(expr, bound, out, seen),
        VariableDeclaration(decl) => {
            collect_free_vars_expr(&decl.value, bound, out, seen);
            bound.insert(decl.name.clone());
        }
        Assignment(assign) => {
            if let crate::ast::AssignmentTarget::Variable(name) = &assign.target {
                if !bound.contains(name) {
                    mark_free(name.clone(), out, seen);
                }
            }
            collect_free_vars_expr(&assign.value, bound, out, seen);
        }
        If(chain) => {
            for branch in &chain.branches {
                collect_free_vars_expr(&branch.condition, bound, out, seen);
                let mut inner_bound = bound.clone();
                collect_free_vars_block(&branch.block, &mut inner_bound, out, seen);
            }
            if let Some(else_block) = &chain.else_block {
                let mut inner_bound = bound.clone();
                collect_free_vars_block(else_block, &mut inner_bound, out, seen);
            }
        }
        While(loop_) => {
            collect_free_vars_expr(&loop_.condition, bound, out, seen);
            let mut inner_bound = bound.clone();
            collect_free_vars_block(&loop_.block, &mut inner_bound, out, seen);
        }
        ForEach(each) => {
            let source_expr = match &each.source {
                crate::ast::ForEachSource::List(e)
                | crate::ast::ForEachSource::Range(e)
                | crate::ast::ForEachSource::Iterable(e) => e,
            };
            collect_free_vars_expr(source_expr, bound, out, seen);
            let mut inner_bound = bound.clone();
            inner_bound.insert(each.binding.clone());
            collect_free_vars_block(&each.block, &mut inner_bound, out, seen);
        }
        Return(ret) => {
            if let Some(value) = &ret.value {
                collect_free_vars_expr(value, bound, out, seen);
            }
        }
    }
}

fn mark_free(name: String, out: &mut Vec<String>, seen: &mut HashSet<String>) {
    if seen.insert(name.clone()) {
        out.push(name);
    }
}

fn collect_free_vars_expr(
    expr: &Expression,
    bound: &HashSet<String>,
    out: &mut Vec<String>,
    seen: &mut HashSet<String>,
) {
    match expr {
        Expression::VariableLoad(name, _) => {
            if !bound.contains(name) {
                mark_free(name.clone(), out, seen);
            }
        }
        Expression::IntegerLiteral(..)
        | Expression::DoubleLiteral(..)
        | Expression::BooleanLiteral(..)
        | Expression::SymbolLiteral(..)
        | Expression::InstanceVariableLoad(..)
        | Expression::SelfExpr(_) => {}
        Expression::StringLiteral(segments, _) => {
            for segment in segments {
                if let StringSegment::Interpolated(inner) = segment {
                    collect_free_vars_expr(inner, bound, out, seen);
                }
            }
        }
        Expression::ListLiteral(values, _) => {
            for value in values {
                collect_free_vars_expr(value, bound, out, seen);
            }
        }
        Expression::DictionaryLiteral(pairs, _) => {
            for (key, value) in pairs {
                collect_free_vars_expr(key, bound, out, seen);
                collect_free_vars_expr(value, bound, out, seen);
            }
        }
        Expression::Dispatch {
            receiver, arguments, ..
        } => {
            collect_free_vars_expr(receiver, bound, out, seen);
            for arg in &arguments.values {
                collect_free_vars_expr(arg, bound, out, seen);
            }
        }
        Expression::InitializerCall { arguments, .. } | Expression::SuperInitializerCall { arguments, .. } => {
            for arg in &arguments.values {
                collect_free_vars_expr(arg, bound, out, seen);
            }
        }
        Expression::Cast { value, .. } => collect_free_vars_expr(value, bound, out, seen),
        Expression::Closure(inner_closure, _) => {
            let mut inner_bound = bound.clone();
            for (name, _) in &inner_closure.params {
                inner_bound.insert(name.clone());
            }
            collect_free_vars_block(&inner_closure.body, &mut inner_bound, out, seen);
        }
        Expression::CapturedMethod { receiver, .. } => collect_free_vars_expr(receiver, bound, out, seen),
        Expression::Binary(_, lhs, rhs, _) => {
            collect_free_vars_expr(lhs, bound, out, seen);
            collect_free_vars_expr(rhs, bound, out, seen);
        }
        Expression::Not(inner, _) => collect_free_vars_expr(inner, bound, out, seen),
        Expression::RangeLiteral { start, stop, step, .. } => {
            collect_free_vars_expr(start, bound, out, seen);
            collect_free_vars_expr(stop, bound, out, seen);
            if let Some(step) = step {
                collect_free_vars_expr(step, bound, out, seen);
            }
        }
    }
}
