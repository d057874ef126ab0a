//! Statement lowering.

use super::{Flow, Lowerer, TargetId};
use crate::error::{CompileErrorKind, MismatchSite, Result};
use crate::scope::BlockId;
use nwscript_ast::{CaseLabel, Declaration, Expr, Span, Spanned, Stmt, SwitchCase};
use nwscript_bytecode::{BinaryOpcode, Constant, Instruction, JumpKind, PairCode, TypeCode};
use nwscript_types::{Kind, SLOT_BYTES};

impl Lowerer<'_> {
    pub(super) fn lower_stmt(&mut self, block: BlockId, stmt: &Spanned<Stmt>, flow: Flow) -> Result<()> {
        match &stmt.node {
            Stmt::Declaration(decl) => self.lower_declaration(block, decl),
            Stmt::Expr(expr) => self.lower_expr_stmt(block, expr),
            Stmt::Block(stmts) => {
                let inner = self.scope.enter_block(block);
                for stmt in stmts {
                    self.lower_stmt(inner, stmt, flow)?;
                }
                let cells = self.scope.exit_block(inner);
                self.emit_pop(cells);
                Ok(())
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.lower_condition(block, condition)?;
                let skip_then = self.stream.reserve(JumpKind::Jz);
                self.lower_scoped(block, then_branch, flow)?;
                match else_branch {
                    Some(else_branch) => {
                        let skip_else = self.stream.reserve(JumpKind::Jmp);
                        let here = self.stream.next_position();
                        self.stream.patch(skip_then, here);
                        self.lower_scoped(block, else_branch, flow)?;
                        let here = self.stream.next_position();
                        self.stream.patch(skip_else, here);
                    }
                    None => {
                        let here = self.stream.next_position();
                        self.stream.patch(skip_then, here);
                    }
                }
                Ok(())
            }
            Stmt::While { condition, body } => {
                let depth = self.scope.current_depth(block);
                let cont = self.new_target(depth);
                let brk = self.new_target(depth);
                self.bind(cont);
                self.lower_condition(block, condition)?;
                self.jump_to(JumpKind::Jz, brk);
                self.lower_loop_body(block, body, flow, brk, cont)?;
                self.jump_to(JumpKind::Jmp, cont);
                self.bind(brk);
                Ok(())
            }
            Stmt::DoWhile { body, condition } => {
                let depth = self.scope.current_depth(block);
                let top = self.new_target(depth);
                let cont = self.new_target(depth);
                let brk = self.new_target(depth);
                self.bind(top);
                self.lower_loop_body(block, body, flow, brk, cont)?;
                self.bind(cont);
                self.lower_condition(block, condition)?;
                self.jump_to(JumpKind::Jnz, top);
                self.bind(brk);
                Ok(())
            }
            Stmt::For {
                init,
                condition,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.lower_expr_stmt(block, init)?;
                }
                let depth = self.scope.current_depth(block);
                let top = self.new_target(depth);
                let cont = self.new_target(depth);
                let brk = self.new_target(depth);
                self.bind(top);
                if let Some(condition) = condition {
                    self.lower_condition(block, condition)?;
                    self.jump_to(JumpKind::Jz, brk);
                }
                self.lower_loop_body(block, body, flow, brk, cont)?;
                self.bind(cont);
                if let Some(step) = step {
                    self.lower_expr_stmt(block, step)?;
                }
                self.jump_to(JumpKind::Jmp, top);
                self.bind(brk);
                Ok(())
            }
            Stmt::Switch { subject, cases } => self.lower_switch(block, subject, cases, flow),
            Stmt::Return(value) => self.lower_return(block, value.as_ref(), flow, stmt.span),
            Stmt::Break => {
                let target = flow
                    .brk
                    .ok_or_else(|| CompileErrorKind::BreakContinueOutsideLoop("break").at(stmt.span))?;
                self.jump_out(block, target);
                Ok(())
            }
            Stmt::Continue => {
                let target = flow
                    .cont
                    .ok_or_else(|| CompileErrorKind::BreakContinueOutsideLoop("continue").at(stmt.span))?;
                self.jump_out(block, target);
                Ok(())
            }
        }
    }

    /// Lower `stmt` in its own block so its declarations are popped after it.
    fn lower_scoped(&mut self, block: BlockId, stmt: &Spanned<Stmt>, flow: Flow) -> Result<()> {
        let inner = self.scope.enter_block(block);
        self.lower_stmt(inner, stmt, flow)?;
        let cells = self.scope.exit_block(inner);
        self.emit_pop(cells);
        Ok(())
    }

    fn lower_loop_body(
        &mut self,
        block: BlockId,
        body: &Spanned<Stmt>,
        flow: Flow,
        brk: TargetId,
        cont: TargetId,
    ) -> Result<()> {
        let flow = Flow {
            brk: Some(brk),
            cont: Some(cont),
            ..flow
        };
        self.lower_scoped(block, body, flow)
    }

    /// Declare each declarator in order; later initializers see earlier names.
    pub(super) fn lower_declaration(&mut self, block: BlockId, decl: &Declaration) -> Result<()> {
        for declarator in &decl.declarators {
            let name = &declarator.node.name;
            if !decl.kind.is_storable() {
                return Err(CompileErrorKind::InvalidVariableKind {
                    name: name.clone(),
                    kind: decl.kind.clone(),
                }
                .at(declarator.span));
            }
            let width = self.width(&decl.kind, declarator.span)?;
            match &declarator.node.init {
                Some(init) => {
                    self.lower_expr_as(block, init, &decl.kind, MismatchSite::Initializer(name.clone()))?;
                }
                None => self.push_default(block, &decl.kind, declarator.span)?,
            }
            // the value just pushed becomes the variable
            self.scope.pop_temp(block, width);
            self.scope
                .declare(block, name, decl.kind.clone(), width)
                .map_err(|kind| kind.at(declarator.span))?;
        }
        Ok(())
    }

    /// Reserve uninitialized cells for a value of `kind`.
    pub(super) fn push_default(&mut self, block: BlockId, kind: &Kind, span: Span) -> Result<()> {
        let scalars = self.structs.flatten(kind).map_err(|err| err.at(span))?;
        for scalar in &scalars {
            let code = TypeCode::for_kind(scalar).ok_or_else(|| {
                CompileErrorKind::InvalidVariableKind {
                    name: kind.to_string(),
                    kind: scalar.clone(),
                }
                .at(span)
            })?;
            self.emit(Instruction::RsAdd(code));
        }
        self.scope.push_temp(block, scalars.len() as u32);
        Ok(())
    }

    fn lower_expr_stmt(&mut self, block: BlockId, expr: &Spanned<Expr>) -> Result<()> {
        let kind = self.lower_expr(block, expr)?;
        let width = self.width(&kind, expr.span)?;
        self.discard(block, width);
        Ok(())
    }

    /// Lower an `int` condition. The caller emits the conditional jump that
    /// consumes it.
    fn lower_condition(&mut self, block: BlockId, condition: &Spanned<Expr>) -> Result<()> {
        let kind = self.lower_expr(block, condition)?;
        if kind != Kind::Int {
            return Err(CompileErrorKind::KindMismatch {
                site: MismatchSite::Condition,
                expected: Kind::Int.to_string(),
                found: kind,
            }
            .at(condition.span));
        }
        self.scope.pop_temp(block, 1);
        Ok(())
    }

    /// Compare the subject against each label in turn, then fall to
    /// `default` (or out). The subject stays on the stack until the end.
    fn lower_switch(
        &mut self,
        block: BlockId,
        subject: &Spanned<Expr>,
        cases: &[SwitchCase],
        flow: Flow,
    ) -> Result<()> {
        let kind = self.lower_expr(block, subject)?;
        let operands = match kind {
            Kind::Int => PairCode::IntInt,
            Kind::String => PairCode::StringString,
            other => {
                return Err(CompileErrorKind::KindMismatch {
                    site: MismatchSite::SwitchSubject,
                    expected: "int or string".to_string(),
                    found: other,
                }
                .at(subject.span))
            }
        };
        let brk = self.new_target(self.scope.current_depth(block));

        let mut seen: Vec<&CaseLabel> = Vec::with_capacity(cases.len());
        let mut entries = Vec::with_capacity(cases.len());
        let mut default_case = None;
        for (index, case) in cases.iter().enumerate() {
            let label = &case.label.node;
            if seen.contains(&label) {
                return Err(CompileErrorKind::DuplicateCaseLabel(label_text(label)).at(case.label.span));
            }
            seen.push(label);

            let constant = match label {
                CaseLabel::Default => {
                    default_case = Some(index);
                    entries.push(None);
                    continue;
                }
                CaseLabel::Int(value) => (Kind::Int, Constant::Int(*value)),
                CaseLabel::String(value) => (Kind::String, Constant::String(value.clone())),
            };
            if constant.0 != kind {
                return Err(CompileErrorKind::KindMismatch {
                    site: MismatchSite::CaseLabel,
                    expected: kind.to_string(),
                    found: constant.0,
                }
                .at(case.label.span));
            }
            // copy, compare, branch: net stack change is zero
            self.emit(Instruction::CpTopSp {
                offset: -SLOT_BYTES,
                size: SLOT_BYTES as u16,
            });
            self.emit(Instruction::Const(constant.1));
            self.emit(Instruction::Binary {
                op: BinaryOpcode::Equal,
                operands,
            });
            entries.push(Some(self.stream.reserve(JumpKind::Jnz)));
        }

        let fallback = match default_case {
            Some(_) => Some(self.stream.reserve(JumpKind::Jmp)),
            None => {
                self.jump_to(JumpKind::Jmp, brk);
                None
            }
        };

        let case_flow = Flow { brk: Some(brk), ..flow };
        for (index, case) in cases.iter().enumerate() {
            let start = self.stream.next_position();
            if let Some(jump) = entries[index] {
                self.stream.patch(jump, start);
            }
            if default_case == Some(index) {
                if let Some(jump) = fallback {
                    self.stream.patch(jump, start);
                }
            }
            let inner = self.scope.enter_block(block);
            for stmt in &case.body {
                self.lower_stmt(inner, stmt, case_flow)?;
            }
            let cells = self.scope.exit_block(inner);
            self.emit_pop(cells);
        }

        self.bind(brk);
        self.discard(block, 1);
        Ok(())
    }

    fn lower_return(
        &mut self,
        block: BlockId,
        value: Option<&Spanned<Expr>>,
        flow: Flow,
        span: Span,
    ) -> Result<()> {
        let frame = self.frame.clone();
        let site = || MismatchSite::Return(frame.function.clone());

        match value {
            Some(expr) if frame.returns == Kind::Void => {
                let found = self.lower_expr(block, expr)?;
                return Err(CompileErrorKind::KindMismatch {
                    site: site(),
                    expected: Kind::Void.to_string(),
                    found,
                }
                .at(expr.span));
            }
            Some(expr) => {
                self.lower_expr_as(block, expr, &frame.returns, site())?;
                // result slot sits just below the frame
                let above = (frame.return_width + self.scope.current_depth(block)) as i32;
                self.emit(Instruction::CpDownSp {
                    offset: -above * SLOT_BYTES,
                    size: (frame.return_width as i32 * SLOT_BYTES) as u16,
                });
                self.jump_out(block, flow.ret);
                self.scope.pop_temp(block, frame.return_width);
            }
            None if frame.returns != Kind::Void => {
                return Err(CompileErrorKind::KindMismatch {
                    site: site(),
                    expected: frame.returns.to_string(),
                    found: Kind::Void,
                }
                .at(span));
            }
            None => self.jump_out(block, flow.ret),
        }
        Ok(())
    }
}

fn label_text(label: &CaseLabel) -> String {
    match label {
        CaseLabel::Int(value) => value.to_string(),
        CaseLabel::String(value) => format!("{value:?}"),
        CaseLabel::Default => "default".to_string(),
    }
}
