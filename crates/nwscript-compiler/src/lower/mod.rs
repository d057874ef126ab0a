//! AST lowering.
//!
//! One pass over a compilation unit:
//!
//! 1. collect struct layouts and function signatures (so calls may target
//!    functions defined further down)
//! 2. emit the program prologue: reserve globals, `SAVEBP`, global
//!    initializers, the call to the entry function, teardown
//! 3. lower every function body in source order
//! 4. patch calls made before their callee's body was emitted
//!
//! Every lowering routine receives the current scope block and, for
//! statements, a [`Flow`] naming the return/break/continue targets.

mod call;
mod expr;
mod ops;
mod stmt;

use crate::config::CompilerConfig;
use crate::error::{CompileErrorKind, MismatchSite, Result};
use crate::scope::{BlockId, CodeRoot, Storage, ROOT};
use crate::structs::StructTable;
use indexmap::IndexMap;
use nwscript_abi::{Param, RoutineTable};
use nwscript_ast::{Declarator, FunctionDecl, Item, Program, Span, Spanned, Stmt};
use nwscript_bytecode::{Instruction, InstructionStream, JumpKind, Position, StreamError, TypeCode};
use nwscript_types::{Kind, SLOT_BYTES};
use tracing::debug;

/// Handle to a jump target in the lowering arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TargetId(usize);

/// A label plus the stack depth that must hold when jumping to it.
#[derive(Debug)]
struct Target {
    position: Option<Position>,
    pending: Vec<Position>,
    depth: u32,
}

/// Control-flow targets visible to a statement.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Flow {
    pub ret: TargetId,
    pub brk: Option<TargetId>,
    pub cont: Option<TargetId>,
}

#[derive(Debug)]
struct FunctionInfo {
    returns: Kind,
    params: Vec<Param>,
    defined: bool,
    entry: Option<Position>,
    /// `JSR`s emitted before `entry` was known.
    calls: Vec<(Position, Span)>,
}

/// The function whose body is being lowered.
#[derive(Debug, Clone)]
struct FrameContext {
    function: String,
    returns: Kind,
    return_width: u32,
}

impl Default for FrameContext {
    fn default() -> Self {
        Self {
            function: String::new(),
            returns: Kind::Void,
            return_width: 0,
        }
    }
}

pub(crate) struct Lowerer<'a> {
    table: &'a RoutineTable,
    structs: StructTable,
    functions: IndexMap<String, FunctionInfo>,
    scope: CodeRoot,
    stream: InstructionStream,
    targets: Vec<Target>,
    frame: FrameContext,
    globals_width: u32,
}

/// Lower a whole unit into a finished program.
pub(crate) fn lower_program(
    table: &RoutineTable,
    config: &CompilerConfig,
    program: &Program,
) -> Result<nwscript_bytecode::Program> {
    let mut lowerer = Lowerer {
        table,
        structs: StructTable::default(),
        functions: IndexMap::new(),
        scope: CodeRoot::new(),
        stream: InstructionStream::new(),
        targets: Vec::new(),
        frame: FrameContext::default(),
        globals_width: 0,
    };

    lowerer.declare_items(program)?;
    let entry = lowerer.find_entry(config)?;
    lowerer.lower_prologue(program, &entry)?;
    for item in &program.items {
        if let Item::Function(function) = &item.node {
            if let Some(body) = &function.body {
                lowerer.lower_function(function, body, item.span)?;
            }
        }
    }
    lowerer.patch_calls()?;

    lowerer.stream.finalize().map_err(|err| match err {
        StreamError::UnresolvedJump(at) => CompileErrorKind::UnresolvedJump(at).at(Span::default()),
    })
}

impl<'a> Lowerer<'a> {
    // =========================================================================
    // Declarations pass
    // =========================================================================

    fn declare_items(&mut self, program: &Program) -> Result<()> {
        for item in &program.items {
            match &item.node {
                Item::Struct(decl) => {
                    let fields: Vec<(String, Kind)> = decl
                        .fields
                        .iter()
                        .map(|field| (field.node.name.clone(), field.node.kind.clone()))
                        .collect();
                    self.structs
                        .declare(&decl.name, &fields)
                        .map_err(|kind| kind.at(item.span))?;
                }
                Item::Function(function) => self.declare_function(function, item.span)?,
                Item::Global(_) => {}
            }
        }
        Ok(())
    }

    fn declare_function(&mut self, function: &FunctionDecl, span: Span) -> Result<()> {
        let name = &function.name;
        if self.table.is_known(name) {
            return Err(CompileErrorKind::DuplicateDeclaration(name.clone()).at(span));
        }
        if function.returns == Kind::Action {
            return Err(CompileErrorKind::InvalidVariableKind {
                name: name.clone(),
                kind: Kind::Action,
            }
            .at(span));
        }
        self.structs.width(&function.returns).map_err(|kind| kind.at(span))?;

        let mut params = Vec::with_capacity(function.params.len());
        for param in &function.params {
            let decl = &param.node;
            if !decl.kind.is_storable() {
                return Err(CompileErrorKind::InvalidVariableKind {
                    name: decl.name.clone(),
                    kind: decl.kind.clone(),
                }
                .at(param.span));
            }
            self.structs.width(&decl.kind).map_err(|kind| kind.at(param.span))?;
            let mut abi_param = Param::new(decl.name.clone(), decl.kind.clone());
            if let Some(default) = &decl.default {
                let value = default.coerce(&decl.kind).ok_or_else(|| {
                    CompileErrorKind::KindMismatch {
                        site: MismatchSite::Default(decl.name.clone()),
                        expected: decl.kind.to_string(),
                        found: default.kind(),
                    }
                    .at(param.span)
                })?;
                abi_param.default = Some(value);
            }
            params.push(abi_param);
        }

        let defines = function.body.is_some();
        match self.functions.get_mut(name) {
            Some(existing) => {
                if existing.defined && defines {
                    return Err(CompileErrorKind::DuplicateDeclaration(name.clone()).at(span));
                }
                let same_shape = existing.returns == function.returns
                    && existing.params.len() == params.len()
                    && existing.params.iter().zip(&params).all(|(a, b)| a.kind == b.kind);
                if !same_shape {
                    return Err(CompileErrorKind::SignatureMismatch(name.clone()).at(span));
                }
                for (known, new) in existing.params.iter_mut().zip(params) {
                    if new.default.is_some() {
                        known.default = new.default;
                    }
                }
                existing.defined |= defines;
            }
            None => {
                self.functions.insert(
                    name.clone(),
                    FunctionInfo {
                        returns: function.returns.clone(),
                        params,
                        defined: defines,
                        entry: None,
                        calls: Vec::new(),
                    },
                );
            }
        }
        Ok(())
    }

    fn find_entry(&self, config: &CompilerConfig) -> Result<String> {
        let entry = config
            .entry_points
            .iter()
            .find(|name| self.functions.get(*name).is_some_and(|f| f.defined))
            .ok_or_else(|| {
                CompileErrorKind::MissingEntryPoint(config.entry_points.join(", ")).at(Span::default())
            })?;
        let info = &self.functions[entry];
        if !matches!(info.returns, Kind::Void | Kind::Int) || !info.params.is_empty() {
            return Err(CompileErrorKind::InvalidEntryPoint(entry.clone()).at(Span::default()));
        }
        Ok(entry.clone())
    }

    // =========================================================================
    // Program layout
    // =========================================================================

    /// Reserve globals, `SAVEBP`, initialize globals, call the entry
    /// function, tear down.
    ///
    /// Initializers run after `SAVEBP` so user functions they call can reach
    /// globals through the base pointer. An `int` entry point leaves its
    /// result in a cell reserved below everything else, where the host reads
    /// it after the program returns.
    fn lower_prologue(&mut self, program: &Program, entry: &str) -> Result<()> {
        let returns_int = self.functions[entry].returns == Kind::Int;
        let globals: Vec<(&Kind, &Spanned<Declarator>)> = program
            .items
            .iter()
            .filter_map(|item| match &item.node {
                Item::Global(decl) => Some(decl),
                _ => None,
            })
            .flat_map(|decl| decl.declarators.iter().map(move |declarator| (&decl.kind, declarator)))
            .collect();

        if globals.is_empty() {
            if returns_int {
                self.emit(Instruction::RsAdd(TypeCode::Int));
            }
            self.emit_jsr(entry, Span::default());
            self.emit(Instruction::Retn);
            return Ok(());
        }

        if returns_int {
            self.emit(Instruction::RsAdd(TypeCode::Int));
            self.scope.push_temp(ROOT, 1);
        }
        let base = self.scope.current_depth(ROOT);
        let mut slots = Vec::with_capacity(globals.len());
        for (kind, declarator) in &globals {
            if !kind.is_storable() {
                return Err(CompileErrorKind::InvalidVariableKind {
                    name: declarator.node.name.clone(),
                    kind: (*kind).clone(),
                }
                .at(declarator.span));
            }
            slots.push(self.scope.current_depth(ROOT));
            self.push_default(ROOT, kind, declarator.span)?;
        }
        let depth = self.scope.current_depth(ROOT);
        self.globals_width = depth - base;
        self.emit(Instruction::SaveBp);
        // saved BP cell sits on top of the globals
        self.scope.push_temp(ROOT, 1);
        self.scope.set_bp_base(depth + 1);
        debug!(globals = self.globals_width, "laid out globals");

        for ((kind, declarator), slot) in globals.into_iter().zip(slots) {
            self.lower_global(kind, declarator, slot)?;
        }
        self.scope.pop_temp(ROOT, 1);

        if returns_int {
            self.emit(Instruction::RsAdd(TypeCode::Int));
            self.emit_jsr(entry, Span::default());
            // result cell, saved BP and globals lie above slot 0
            let above = (depth + 2) as i32;
            self.emit(Instruction::CpDownSp {
                offset: -above * SLOT_BYTES,
                size: SLOT_BYTES as u16,
            });
            self.emit_pop(1);
        } else {
            self.emit_jsr(entry, Span::default());
        }
        self.emit(Instruction::RestoreBp);
        self.emit_pop(self.globals_width);
        self.emit(Instruction::Retn);
        Ok(())
    }

    /// Store a global's initializer into its reserved cells, then bind the
    /// name so only later initializers see it.
    fn lower_global(&mut self, kind: &Kind, declarator: &Spanned<Declarator>, slot: u32) -> Result<()> {
        let name = &declarator.node.name;
        let width = self.width(kind, declarator.span)?;
        if let Some(init) = &declarator.node.init {
            self.lower_expr_as(ROOT, init, kind, MismatchSite::Initializer(name.clone()))?;
            self.store(ROOT, Storage::Global { slot }, width);
            self.discard(ROOT, width);
        }
        self.scope
            .declare_reserved(ROOT, name, kind.clone(), slot)
            .map_err(|err| err.at(declarator.span))
    }

    fn lower_function(
        &mut self,
        function: &FunctionDecl,
        body: &[Spanned<Stmt>],
        span: Span,
    ) -> Result<()> {
        let entry = self.stream.next_position();
        if let Some(info) = self.functions.get_mut(&function.name) {
            info.entry = Some(entry);
        }

        // Arguments arrive right to left: the last parameter is deepest.
        let frame = self.scope.enter_frame();
        for param in function.params.iter().rev() {
            let width = self.structs.width(&param.node.kind).map_err(|kind| kind.at(param.span))?;
            self.scope
                .declare(frame, &param.node.name, param.node.kind.clone(), width)
                .map_err(|kind| kind.at(param.span))?;
        }
        let params_width = self.scope.current_depth(frame);
        let return_width = self.structs.width(&function.returns).map_err(|kind| kind.at(span))?;
        debug!(
            function = %function.name,
            %entry,
            params = params_width,
            "lowering function"
        );

        let ret = self.new_target(params_width);
        self.frame = FrameContext {
            function: function.name.clone(),
            returns: function.returns.clone(),
            return_width,
        };
        let flow = Flow {
            ret,
            brk: None,
            cont: None,
        };

        let block = self.scope.enter_block(frame);
        for stmt in body {
            self.lower_stmt(block, stmt, flow)?;
        }
        let locals = self.scope.exit_block(block);
        self.emit_pop(locals);

        self.bind(ret);
        self.emit_pop(params_width);
        self.emit(Instruction::Retn);
        self.frame = FrameContext::default();
        Ok(())
    }

    fn patch_calls(&mut self) -> Result<()> {
        for (name, info) in &mut self.functions {
            for (at, span) in info.calls.drain(..) {
                let entry = info
                    .entry
                    .ok_or_else(|| CompileErrorKind::UnresolvedForwardCall(name.clone()).at(span))?;
                self.stream.patch(at, entry);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Emission helpers
    // =========================================================================

    fn emit(&mut self, instruction: Instruction) -> Position {
        self.stream.append(instruction)
    }

    /// Pop `cells` without touching scope bookkeeping.
    fn emit_pop(&mut self, cells: u32) {
        if cells > 0 {
            self.emit(Instruction::MovSp {
                offset: -(cells as i32) * SLOT_BYTES,
            });
        }
    }

    /// Pop `cells` expression temporaries.
    fn discard(&mut self, block: BlockId, cells: u32) {
        self.emit_pop(cells);
        self.scope.pop_temp(block, cells);
    }

    /// `JSR` to a user function, deferring the target if its body is not
    /// emitted yet.
    fn emit_jsr(&mut self, name: &str, span: Span) {
        let entry = self.functions.get(name).and_then(|info| info.entry);
        match entry {
            Some(entry) => {
                self.emit(Instruction::Jump {
                    kind: JumpKind::Jsr,
                    target: entry,
                });
            }
            None => {
                let at = self.stream.reserve(JumpKind::Jsr);
                if let Some(info) = self.functions.get_mut(name) {
                    info.calls.push((at, span));
                }
            }
        }
    }

    fn new_target(&mut self, depth: u32) -> TargetId {
        self.targets.push(Target {
            position: None,
            pending: Vec::new(),
            depth,
        });
        TargetId(self.targets.len() - 1)
    }

    /// Place `target` at the next instruction and patch jumps waiting on it.
    fn bind(&mut self, target: TargetId) {
        let here = self.stream.next_position();
        let target = &mut self.targets[target.0];
        target.position = Some(here);
        for at in target.pending.drain(..) {
            self.stream.patch(at, here);
        }
    }

    fn jump_to(&mut self, kind: JumpKind, target: TargetId) {
        match self.targets[target.0].position {
            Some(position) => {
                self.emit(Instruction::Jump { kind, target: position });
            }
            None => {
                let at = self.stream.reserve(kind);
                self.targets[target.0].pending.push(at);
            }
        }
    }

    /// Pop down to the target's depth and jump. Bookkeeping is left alone:
    /// code after an unconditional exit is unreachable.
    fn jump_out(&mut self, block: BlockId, target: TargetId) {
        let excess = self.scope.current_depth(block) - self.targets[target.0].depth;
        self.emit_pop(excess);
        self.jump_to(JumpKind::Jmp, target);
    }

    /// Width in cells of `kind`.
    fn width(&self, kind: &Kind, span: Span) -> Result<u32> {
        self.structs.width(kind).map_err(|err| err.at(span))
    }
}
