//! §4.E: statement bytecode emission. Expressions compile through
//! `expression::compile_expression`; this module handles control flow,
//! local/instance-variable writes and the three `for`-loop shapes, each
//! lowered to the matching `ForEach*Next` instruction pair added in
//! `bytecode::opcode`.
use crate::ast::{
    Assignment, AssignmentTarget, Block, ForEach, ForEachSource, IfChain, Return, Statement,
    VariableDeclaration, WhileLoop,
};
use crate::bytecode::Instruction;
use crate::lexer::Position;
use crate::parser::DEFAULT_NAMESPACE;
use crate::types::{Type, TypeKind};

use super::expression::{compile_expression, flat_instance_variables, types_compatible};
use super::{CompileError, CompileResult, FnCtx, IvarInit, StringPool};

pub fn compile_block(block: &Block, ctx: &mut FnCtx, pool: &mut StringPool) -> CompileResult<()> {
    ctx.scopes.push_scope();
    for statement in &block.statements {
        if ctx.returned {
            return Err(CompileError::DeadCode(statement_position(statement)));
        }
        compile_statement(statement, ctx, pool)?;
    }
    ctx.scopes.pop_scope();
    Ok(())
}

fn statement_position(statement: &Statement) -> Position {
    match statement {
        Statement::Expression(expr) => expr.start(),
        Statement::VariableDeclaration(decl) => decl.span.start,
        Statement::Assignment(assign) => assign.span.start,
        Statement::If(chain) => chain.span.start,
        Statement::While(loop_) => loop_.span.start,
        Statement::ForEach(each) => each.span.start,
        Statement::Return(ret) => ret.span.start,
    }
}

fn compile_statement(statement: &Statement, ctx: &mut FnCtx, pool: &mut StringPool) -> CompileResult<()> {
    match statement {
        Statement::Expression(expr) => {
            compile_expression(expr, ctx, pool)?;
            ctx.emitter.push(Instruction::Pop);
            Ok(())
        }
        Statement::VariableDeclaration(decl) => compile_variable_declaration(decl, ctx, pool),
        Statement::Assignment(assign) => compile_assignment(assign, ctx, pool),
        Statement::If(chain) => compile_if(chain, ctx, pool),
        Statement::While(loop_) => compile_while(loop_, ctx, pool),
        Statement::ForEach(each) => compile_for_each(each, ctx, pool),
        Statement::Return(ret) => compile_return(ret, ctx, pool),
    }
}

fn compile_variable_declaration(decl: &VariableDeclaration, ctx: &mut FnCtx, pool: &mut StringPool) -> CompileResult<()> {
    let value_ty = compile_expression(&decl.value, ctx, pool)?;
    let ty = match &decl.ty {
        Some(annotated) => {
            if !types_compatible(ctx.program, &value_ty, annotated, annotated) {
                return Err(CompileError::TypeMismatch(
                    decl.span.start,
                    format!("{} does not match its declared type", decl.name),
                ));
            }
            annotated.clone()
        }
        None => value_ty,
    };
    let slot = ctx.scopes.declare(decl.name.clone(), ty, decl.frozen);
    ctx.emitter.push(Instruction::StoreLocal(slot));
    Ok(())
}

fn compile_assignment(assign: &Assignment, ctx: &mut FnCtx, pool: &mut StringPool) -> CompileResult<()> {
    match &assign.target {
        AssignmentTarget::Variable(name) => {
            let Some(binding) = ctx.scopes.lookup(name) else {
                return Err(CompileError::TypeMismatch(assign.span.start, format!("{name} is not in scope")));
            };
            if binding.frozen {
                return Err(CompileError::FrozenWrite(assign.span.start, name.clone()));
            }
            let slot = binding.slot;
            let target_ty = binding.ty.clone();
            let value_ty = compile_expression(&assign.value, ctx, pool)?;
            if !types_compatible(ctx.program, &value_ty, &target_ty, &target_ty) {
                return Err(CompileError::TypeMismatch(
                    assign.span.start,
                    format!("{name} does not accept this value's type"),
                ));
            }
            ctx.emitter.push(Instruction::StoreLocal(slot));
            Ok(())
        }
        AssignmentTarget::InstanceVariable(name) => {
            let flat = flat_instance_variables(ctx.program, ctx.class_index);
            let Some((slot, ivar)) = flat.iter().enumerate().find(|(_, iv)| iv.name == *name) else {
                let c = name.chars().next().expect("instance variable names are never empty");
                return Err(CompileError::UnknownMember(assign.span.start, c));
            };
            let slot = slot as u16;
            let target_ty = ivar.ty.clone();
            let value_ty = compile_expression(&assign.value, ctx, pool)?;
            if !types_compatible(ctx.program, &value_ty, &target_ty, &target_ty) {
                return Err(CompileError::TypeMismatch(
                    assign.span.start,
                    format!("{name} does not accept this value's type"),
                ));
            }
            ctx.emitter.push(Instruction::StoreInstanceVariable(slot));
            if ctx.is_initializer {
                ctx.ivar_init
                    .as_mut()
                    .expect("initializer context always carries ivar_init")
                    .mark_assigned(name);
            }
            Ok(())
        }
    }
}

fn require_boolean_condition(ty: &Type, pos: Position) -> CompileResult<()> {
    if ty.optional || !matches!(ty.kind, TypeKind::Boolean) {
        return Err(CompileError::TypeMismatch(pos, "condition must be a non-optional Boolean".into()));
    }
    Ok(())
}

/// A branch's outcome doesn't propagate to sibling branches (each explores
/// from the state just before the chain), and `returned`/ivar assignment
/// state is restored before every branch compiles — matching
/// `IvarInit::merge_branches`'s framing that only a variable initialized
/// along *every* branch, with a mandatory `else` present, survives the
/// chain.
fn compile_if(chain: &IfChain, ctx: &mut FnCtx, pool: &mut StringPool) -> CompileResult<()> {
    let saved_returned = ctx.returned;
    let saved_ivar = ctx.ivar_init.as_ref().map(IvarInit::snapshot);

    ctx.flow_depth += 1;
    let mut branch_ends = Vec::with_capacity(chain.branches.len());
    let mut branch_returns = Vec::with_capacity(chain.branches.len());
    let mut branch_ivars = Vec::with_capacity(chain.branches.len());

    for branch in &chain.branches {
        let cond_ty = compile_expression(&branch.condition, ctx, pool)?;
        require_boolean_condition(&cond_ty, branch.condition.start())?;
        let skip_at = ctx.emitter.push_placeholder_jump_if_false();

        ctx.returned = saved_returned;
        if let Some(snap) = &saved_ivar {
            ctx.ivar_init = Some(snap.clone());
        }
        compile_block(&branch.block, ctx, pool)?;
        branch_returns.push(ctx.returned);
        if let Some(ivar) = &ctx.ivar_init {
            branch_ivars.push(ivar.clone());
        }

        let end_at = ctx.emitter.push_placeholder_jump();
        branch_ends.push(end_at);
        let next_test = ctx.emitter.position();
        ctx.emitter.patch_jump(skip_at, next_test);
    }

    let has_else = chain.else_block.is_some();
    if let Some(else_block) = &chain.else_block {
        ctx.returned = saved_returned;
        if let Some(snap) = &saved_ivar {
            ctx.ivar_init = Some(snap.clone());
        }
        compile_block(else_block, ctx, pool)?;
        branch_returns.push(ctx.returned);
        if let Some(ivar) = &ctx.ivar_init {
            branch_ivars.push(ivar.clone());
        }
    }
    ctx.flow_depth -= 1;

    let end = ctx.emitter.position();
    for at in branch_ends {
        ctx.emitter.patch_jump(at, end);
    }

    ctx.returned = saved_returned || (has_else && branch_returns.iter().all(|r| *r));
    if let Some(snap) = saved_ivar {
        let mut merged = snap;
        merged.merge_branches(&branch_ivars, has_else);
        ctx.ivar_init = Some(merged);
    }
    Ok(())
}

/// A `while` body may run zero times, so any `returned`/definite-init state
/// it produces must not leak past the loop (scope.rs's `IvarInit` doc makes
/// the same point about loop bodies generally).
fn compile_while(loop_: &WhileLoop, ctx: &mut FnCtx, pool: &mut StringPool) -> CompileResult<()> {
    let saved_returned = ctx.returned;
    let saved_ivar = ctx.ivar_init.as_ref().map(IvarInit::snapshot);

    ctx.flow_depth += 1;
    let loop_start = ctx.emitter.position();
    let cond_ty = compile_expression(&loop_.condition, ctx, pool)?;
    require_boolean_condition(&cond_ty, loop_.condition.start())?;
    let exit_at = ctx.emitter.push_placeholder_jump_if_false();

    compile_block(&loop_.block, ctx, pool)?;
    ctx.emitter.push(Instruction::Jump(loop_start));
    let end = ctx.emitter.position();
    ctx.emitter.patch_jump(exit_at, end);
    ctx.flow_depth -= 1;

    ctx.returned = saved_returned;
    ctx.ivar_init = saved_ivar;
    Ok(())
}

fn compile_return(ret: &Return, ctx: &mut FnCtx, pool: &mut StringPool) -> CompileResult<()> {
    match &ret.value {
        Some(value) => {
            let value_ty = compile_expression(value, ctx, pool)?;
            if !types_compatible(ctx.program, &value_ty, &ctx.return_type.clone(), &ctx.return_type.clone()) {
                return Err(CompileError::TypeMismatch(
                    ret.span.start,
                    "returned value does not match the declared return type".into(),
                ));
            }
        }
        None => {
            if !matches!(ctx.return_type.kind, TypeKind::Nothingness) && !ctx.can_return_nothingness {
                return Err(CompileError::TypeMismatch(
                    ret.span.start,
                    "a bare return requires a Nothingness-returning or 🍬-marked procedure".into(),
                ));
            }
        }
    }
    ctx.emitter.push(Instruction::Return);
    ctx.returned = true;
    Ok(())
}

fn list_class_index(ctx: &FnCtx) -> usize {
    ctx.program
        .class_index_by_name(DEFAULT_NAMESPACE, crate::prelude::LIST)
        .expect("prelude always declares List")
}

fn range_class_index(ctx: &FnCtx) -> usize {
    ctx.program
        .class_index_by_name(DEFAULT_NAMESPACE, crate::prelude::RANGE)
        .expect("prelude always declares Range")
}

fn iterable_protocol_index(ctx: &FnCtx) -> usize {
    ctx.program
        .protocol_index_by_name(DEFAULT_NAMESPACE, crate::prelude::ITERABLE)
        .expect("prelude always declares Iterable")
}

/// One internal slot holds the source, a second the index/iterator state,
/// and the binding gets a third; all three are reused across iterations
/// rather than redeclared. The parser classifies `each.source` from the
/// source expression's syntactic shape (a literal), but a variable or
/// dispatch result typed as `List`/`Range` is just as common and looks
/// identical to the generic `Iterable` case at parse time — so the actual
/// loop shape is re-derived here from the source's compiled static type,
/// not trusted from the `ForEachSource` tag. `returned`/ivar-init state is
/// restored afterward since the body may run zero times, the same as
/// `while`.
fn compile_for_each(each: &ForEach, ctx: &mut FnCtx, pool: &mut StringPool) -> CompileResult<()> {
    let source_expr = match &each.source {
        ForEachSource::List(e) | ForEachSource::Range(e) | ForEachSource::Iterable(e) => e,
    };

    let saved_returned = ctx.returned;
    let saved_ivar = ctx.ivar_init.as_ref().map(IvarInit::snapshot);
    ctx.scopes.push_scope();

    let source_ty = compile_expression(source_expr, ctx, pool)?;
    let list_index = list_class_index(ctx);
    let range_index = range_class_index(ctx);
    let iterable_index = iterable_protocol_index(ctx);

    let result = match &source_ty.kind {
        TypeKind::Class { index, generic_arguments } if *index == list_index => {
            let element_ty = generic_arguments.first().cloned().unwrap_or_else(Type::something);
            compile_for_each_list_body(each, source_ty.clone(), element_ty, ctx, pool)
        }
        TypeKind::Class { index, .. } if *index == range_index => {
            compile_for_each_range_body(each, source_ty.clone(), ctx, pool)
        }
        TypeKind::Class { index, .. } if ctx.program.class_conforms(*index, iterable_index) => {
            compile_for_each_iterable_body(each, source_ty.clone(), iterable_index, ctx, pool)
        }
        TypeKind::Protocol(idx) if *idx == iterable_index => {
            compile_for_each_iterable_body(each, source_ty.clone(), iterable_index, ctx, pool)
        }
        _ => Err(CompileError::TypeMismatch(
            source_expr.start(),
            "for-each requires a List, Range, or Iterable-conforming receiver".into(),
        )),
    };

    ctx.scopes.pop_scope();
    ctx.returned = saved_returned;
    ctx.ivar_init = saved_ivar;
    result
}

fn compile_for_each_list_body(
    each: &ForEach,
    source_ty: Type,
    element_ty: Type,
    ctx: &mut FnCtx,
    pool: &mut StringPool,
) -> CompileResult<()> {
    let list_slot = ctx.scopes.declare("<list>".into(), source_ty, true);
    ctx.emitter.push(Instruction::StoreLocal(list_slot));
    let index_slot = ctx.scopes.declare("<index>".into(), Type::integer(), true);
    ctx.emitter.push(Instruction::PushInteger(0));
    ctx.emitter.push(Instruction::StoreLocal(index_slot));
    let binding_slot = ctx.scopes.declare(each.binding.clone(), element_ty, false);

    let loop_start = ctx.emitter.position();
    ctx.emitter.push(Instruction::LoadLocal(list_slot));
    ctx.emitter.push(Instruction::LoadLocal(index_slot));
    let next_at = ctx.emitter.push(Instruction::ForEachListNext { body_end: usize::MAX });
    ctx.emitter.push(Instruction::StoreLocal(index_slot));
    ctx.emitter.push(Instruction::StoreLocal(binding_slot));

    compile_block(&each.block, ctx, pool)?;
    ctx.emitter.push(Instruction::Jump(loop_start));
    let body_end = ctx.emitter.position();
    ctx.emitter.patch_for_each_body_end(next_at, body_end);
    Ok(())
}

fn compile_for_each_range_body(
    each: &ForEach,
    source_ty: Type,
    ctx: &mut FnCtx,
    pool: &mut StringPool,
) -> CompileResult<()> {
    let range_slot = ctx.scopes.declare("<range>".into(), source_ty, true);
    ctx.emitter.push(Instruction::StoreLocal(range_slot));
    let index_slot = ctx.scopes.declare("<index>".into(), Type::integer(), true);
    ctx.emitter.push(Instruction::PushInteger(0));
    ctx.emitter.push(Instruction::StoreLocal(index_slot));
    let binding_slot = ctx.scopes.declare(each.binding.clone(), Type::integer(), false);

    let loop_start = ctx.emitter.position();
    ctx.emitter.push(Instruction::LoadLocal(range_slot));
    ctx.emitter.push(Instruction::LoadLocal(index_slot));
    let next_at = ctx.emitter.push(Instruction::ForEachRangeNext { body_end: usize::MAX });
    ctx.emitter.push(Instruction::StoreLocal(index_slot));
    ctx.emitter.push(Instruction::StoreLocal(binding_slot));

    compile_block(&each.block, ctx, pool)?;
    ctx.emitter.push(Instruction::Jump(loop_start));
    let body_end = ctx.emitter.position();
    ctx.emitter.patch_for_each_body_end(next_at, body_end);
    Ok(())
}

/// The generic `Iterable` fallback of §4.K: `hasMore`/`next` are dispatched
/// through the one protocol the prelude declares, so unlike the List/Range
/// forms the element binding is always `something`-typed — a custom
/// `Iterable` conformer carries no element-type parameter to recover a
/// tighter type from.
fn compile_for_each_iterable_body(
    each: &ForEach,
    source_ty: Type,
    iterable_index: usize,
    ctx: &mut FnCtx,
    pool: &mut StringPool,
) -> CompileResult<()> {
    let protocol = &ctx.program.protocols[iterable_index];
    let has_more_offset = protocol
        .method_offset(crate::prelude::HAS_MORE)
        .expect("prelude's Iterable always declares hasMore") as u16;
    let next_offset = protocol
        .method_offset(crate::prelude::NEXT)
        .expect("prelude's Iterable always declares next") as u16;
    let protocol_index = iterable_index as u16;

    let iter_slot = ctx.scopes.declare("<iter>".into(), source_ty, true);
    ctx.emitter.push(Instruction::StoreLocal(iter_slot));
    let binding_slot = ctx.scopes.declare(each.binding.clone(), Type::something(), false);

    let loop_start = ctx.emitter.position();
    ctx.emitter.push(Instruction::LoadLocal(iter_slot));
    ctx.emitter.push(Instruction::DispatchProtocol {
        protocol_index,
        vti: has_more_offset,
        argument_count: 0,
    });
    let next_at = ctx.emitter.push(Instruction::ForEachEnumerableNext { body_end: usize::MAX });
    ctx.emitter.push(Instruction::LoadLocal(iter_slot));
    ctx.emitter.push(Instruction::DispatchProtocol {
        protocol_index,
        vti: next_offset,
        argument_count: 0,
    });
    ctx.emitter.push(Instruction::StoreLocal(binding_slot));

    compile_block(&each.block, ctx, pool)?;
    ctx.emitter.push(Instruction::Jump(loop_start));
    let body_end = ctx.emitter.position();
    ctx.emitter.patch_for_each_body_end(next_at, body_end);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn compile_ok(body: &str) {
        let src = format!("🐇🐶🍇🐖🏃🤷🍇{body}🍉🍉");
        let full = format!("{}{}", crate::prelude::SOURCE, src);
        let (mut program, _warnings) = parse_source(&full).expect("parses");
        crate::vti::assign(&mut program).expect("vti assignment");
        super::super::compile(&program).expect("compiles");
    }

    #[test]
    fn compiles_variable_declaration() {
        compile_ok("🍰🍦x🔢➡5");
    }

    #[test]
    fn compiles_while_loop() {
        compile_ok("🍰🍦x🔢➡0🔁🍦x🐗10🍇➡🍦x🍦x➕1🍉");
    }
}
