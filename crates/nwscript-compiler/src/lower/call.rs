//! Calls to user functions and engine routines.
//!
//! Arguments are pushed right to left so the first argument ends up on top
//! of the stack. Omitted trailing parameters take their declared defaults,
//! pushed before any supplied argument.

use super::Lowerer;
use crate::error::{CompileErrorKind, Result};
use crate::scope::BlockId;
use nwscript_abi::{AbiError, Param};
use nwscript_ast::{Expr, Span, Spanned};
use nwscript_bytecode::{Instruction, JumpKind};
use nwscript_types::{Kind, SLOT_BYTES};
use tracing::trace;

impl Lowerer<'_> {
    pub(super) fn lower_call(
        &mut self,
        block: BlockId,
        name: &str,
        args: &[Spanned<Expr>],
        span: Span,
    ) -> Result<Kind> {
        if let Some(info) = self.functions.get(name) {
            let returns = info.returns.clone();
            let params = info.params.clone();
            return self.lower_user_call(block, name, &returns, &params, args, span);
        }

        let table = self.table;
        let routine = table
            .lookup(name)
            .map_err(|err| CompileErrorKind::from_abi(name, err).at(span))?;
        let pushed = self.push_arguments(block, name, &routine.params, args, span)?;
        self.emit(Instruction::Action {
            routine: routine.id,
            argc: routine.params.len() as u8,
        });
        trace!(routine = %routine.name, id = routine.id, "engine call");
        self.scope.pop_temp(block, pushed);
        let produced = self.width(&routine.returns, span)?;
        self.scope.push_temp(block, produced);
        Ok(routine.returns.clone())
    }

    fn lower_user_call(
        &mut self,
        block: BlockId,
        name: &str,
        returns: &Kind,
        params: &[Param],
        args: &[Spanned<Expr>],
        span: Span,
    ) -> Result<Kind> {
        // result cells stay behind once the callee pops its arguments
        self.push_default(block, returns, span)?;
        let pushed = self.push_arguments(block, name, params, args, span)?;
        self.emit_jsr(name, span);
        self.scope.pop_temp(block, pushed);
        Ok(returns.clone())
    }

    /// Push defaults for omitted parameters, then the supplied arguments,
    /// and validate the argument kinds. Returns the cells pushed.
    fn push_arguments(
        &mut self,
        block: BlockId,
        function: &str,
        params: &[Param],
        args: &[Spanned<Expr>],
        span: Span,
    ) -> Result<u32> {
        let before = self.scope.current_depth(block);
        for param in params.iter().skip(args.len()).rev() {
            if let Some(default) = &param.default {
                self.push_const(block, default);
            }
        }

        let mut supplied = vec![Kind::Void; args.len()];
        for (position, arg) in args.iter().enumerate().rev() {
            supplied[position] = match params.get(position).map(|param| &param.kind) {
                Some(Kind::Action) => {
                    self.lower_action_argument(block, arg)?;
                    Kind::Action
                }
                Some(Kind::Float) => self.lower_float_argument(block, arg)?,
                _ => self.lower_expr(block, arg)?,
            };
        }

        nwscript_abi::check_arguments(function, params, &supplied).map_err(|err| {
            let at = match &err {
                AbiError::ArgumentKindMismatch { position, .. } => args[*position].span,
                _ => span,
            };
            CompileErrorKind::from_abi(function, err).at(at)
        })?;
        Ok(self.scope.current_depth(block) - before)
    }

    /// Lower an argument bound for a `float` parameter, widening an `int`.
    /// Returns the kind as written so validation sees the original.
    fn lower_float_argument(&mut self, block: BlockId, arg: &Spanned<Expr>) -> Result<Kind> {
        if let Expr::Literal(value) = &arg.node {
            if value.kind() == Kind::Int {
                if let Some(widened) = value.coerce(&Kind::Float) {
                    self.push_const(block, &widened);
                    return Ok(Kind::Int);
                }
            }
        }
        let kind = self.lower_expr(block, arg)?;
        if Kind::Float.widens_from(&kind) {
            self.widen_top();
        }
        Ok(kind)
    }

    /// Capture the current frame and emit `arg` as a deferred subroutine:
    ///
    /// ```text
    /// STORE_STATE globals, locals
    /// JMP  past
    /// <arg>            ; result discarded
    /// RETN
    /// past:
    /// ```
    ///
    /// Nothing is left on the stack; the engine receives the saved state.
    fn lower_action_argument(&mut self, block: BlockId, arg: &Spanned<Expr>) -> Result<()> {
        let bp_size = self.globals_width * SLOT_BYTES as u32;
        let sp_size = self.scope.current_depth(block) * SLOT_BYTES as u32;
        self.emit(Instruction::StoreState { bp_size, sp_size });
        let past = self.stream.reserve(JumpKind::Jmp);

        let inner = self.scope.enter_block(block);
        let kind = self.lower_expr(inner, arg)?;
        let width = self.width(&kind, arg.span)?;
        self.discard(inner, width);
        let cells = self.scope.exit_block(inner);
        self.emit_pop(cells);
        self.emit(Instruction::Retn);

        let here = self.stream.next_position();
        self.stream.patch(past, here);
        Ok(())
    }
}
