//! Statement generation

use oxc_ast::ast::*;
use oxc_span::GetSpan;
use skua_vm_bytecode::{Instruction, JumpOffset, Register};

use super::{BindMode, ByteCodeGenerator, Scope};
use crate::analysis::ScopeTag;
use crate::codegen::{ControlEntry, ControlKind, JumpSite};
use crate::error::{CompileError, CompileResult};

impl ByteCodeGenerator {
    pub(super) fn statement(&mut self, stmt: &Statement<'_>) -> CompileResult<()> {
        self.mark(stmt.span().start);
        match stmt {
            Statement::ExpressionStatement(s) => self.with_registers(|g| {
                let dst = g.current.alloc()?;
                g.expression(&s.expression, dst)?;
                if let Some(completion) = g.current.completion {
                    g.emit(Instruction::Move {
                        dst: completion,
                        src: dst,
                    });
                }
                Ok(())
            }),
            Statement::VariableDeclaration(decl) => self.variable_declaration(decl),
            // Created when the enclosing scope is entered
            Statement::FunctionDeclaration(_) => Ok(()),
            Statement::BlockStatement(block) => self.block_statement(block),
            Statement::EmptyStatement(_) => Ok(()),
            Statement::DebuggerStatement(_) => {
                self.emit(Instruction::Debugger);
                Ok(())
            }
            Statement::IfStatement(s) => self.if_statement(s),
            Statement::WhileStatement(s) => self.while_statement(s),
            Statement::DoWhileStatement(s) => self.do_while_statement(s),
            Statement::ForStatement(s) => self.for_statement(s),
            Statement::ForInStatement(s) => self.for_in_statement(s),
            Statement::ForOfStatement(s) => self.for_of_statement(s),
            Statement::SwitchStatement(s) => self.switch_statement(s),
            Statement::LabeledStatement(s) => self.labeled_statement(s),
            Statement::BreakStatement(s) => {
                self.jump_out(s.label.as_ref().map(|l| l.name.as_str()), false, s.span.start)
            }
            Statement::ContinueStatement(s) => {
                self.jump_out(s.label.as_ref().map(|l| l.name.as_str()), true, s.span.start)
            }
            Statement::ReturnStatement(s) => self.with_registers(|g| {
                let flags = g.current.block.flags;
                match &s.argument {
                    Some(arg) if flags.is_async && flags.is_generator => {
                        let src = g.current.alloc()?;
                        g.expression(arg, src)?;
                        g.emit(Instruction::Await { dst: src, src });
                        g.emit(Instruction::Return { src });
                    }
                    Some(arg) => {
                        let src = g.operand(arg)?;
                        g.emit(Instruction::Return { src });
                    }
                    None => g.emit(Instruction::ReturnUndefined),
                }
                Ok(())
            }),
            Statement::ThrowStatement(s) => self.with_registers(|g| {
                let src = g.operand(&s.argument)?;
                g.mark(s.span.start);
                g.emit(Instruction::Throw { src });
                Ok(())
            }),
            Statement::TryStatement(s) => self.try_statement(s),
            Statement::WithStatement(s) => self.with_statement(s),
            Statement::ClassDeclaration(class) => self.with_registers(|g| {
                let Some(id) = &class.id else {
                    return Err(g.syntax_error("class declaration requires a name", class.span.start));
                };
                let value = g.current.alloc()?;
                g.class(class, value, None)?;
                g.store_binding(&id.name, value, BindMode::Init, class.span.end)
            }),
            other => Err(self.unsupported("statement", other.span().start)),
        }
    }

    fn block_statement(&mut self, block: &BlockStatement<'_>) -> CompileResult<()> {
        self.enter_scope((block.span.start, ScopeTag::Block))?;
        self.hoist_functions(&block.body)?;
        for stmt in &block.body {
            self.statement(stmt)?;
        }
        self.exit_scope();
        Ok(())
    }

    fn variable_declaration(&mut self, decl: &VariableDeclaration<'_>) -> CompileResult<()> {
        let mode = match decl.kind {
            VariableDeclarationKind::Var => BindMode::Assign,
            VariableDeclarationKind::Let | VariableDeclarationKind::Const => BindMode::Init,
            _ => return Err(self.unsupported("using declaration", decl.span.start)),
        };
        for declarator in &decl.declarations {
            match &declarator.init {
                Some(init) => self.with_registers(|g| {
                    let value = g.current.alloc()?;
                    let hint = match &declarator.id {
                        BindingPattern::BindingIdentifier(id) => Some(id.name.as_str()),
                        _ => None,
                    };
                    g.expression_named(init, value, hint)?;
                    g.bind_pattern(&declarator.id, value, mode)
                })?,
                // `var x;` leaves the hoisted binding alone
                None if mode == BindMode::Assign => {}
                None => self.with_registers(|g| {
                    let value = g.current.alloc()?;
                    g.emit(Instruction::LoadUndefined { dst: value });
                    g.bind_pattern(&declarator.id, value, mode)
                })?,
            }
        }
        Ok(())
    }

    fn if_statement(&mut self, s: &IfStatement<'_>) -> CompileResult<()> {
        let else_jump = self.with_registers(|g| {
            let cond = g.operand(&s.test)?;
            Ok(g.current.emit_jump(Instruction::JumpIfFalse {
                cond,
                offset: JumpOffset(0),
            }))
        })?;
        self.statement(&s.consequent)?;
        match &s.alternate {
            Some(alternate) => {
                let end_jump = self.jump_placeholder();
                self.current.patch_here(else_jump)?;
                self.statement(alternate)?;
                self.current.patch_here(end_jump)?;
            }
            None => self.current.patch_here(else_jump)?,
        }
        Ok(())
    }

    // ==================== Loops ====================

    fn push_control(&mut self, kind: ControlKind) {
        let labels = std::mem::take(&mut self.current.pending_labels);
        let entry = ControlEntry {
            kind,
            labels,
            breaks: Vec::new(),
            continues: Vec::new(),
            try_depth: self.current.try_depth(),
            env_depth: self.current.env_depth,
            completion_depth: self.current.completion_depth,
        };
        self.current.control.push(entry);
    }

    /// Pop the innermost breakable statement and patch its jumps
    fn pop_control(&mut self, continue_target: Option<usize>) -> CompileResult<()> {
        let Some(entry) = self.current.control.pop() else {
            return Err(CompileError::internal("control stack underflow"));
        };
        let end = self.current.current_index();
        for site in entry.breaks {
            self.current.patch_site(site, end)?;
        }
        if let Some(target) = continue_target {
            for site in entry.continues {
                self.current.patch_site(site, target)?;
            }
        }
        Ok(())
    }

    /// Patch pending `continue` jumps of the innermost loop to the current position
    fn patch_continues(&mut self) -> CompileResult<()> {
        let target = self.current.current_index();
        let sites = match self.current.control.last_mut() {
            Some(entry) => std::mem::take(&mut entry.continues),
            None => return Err(CompileError::internal("control stack underflow")),
        };
        for site in sites {
            self.current.patch_site(site, target)?;
        }
        Ok(())
    }

    fn while_statement(&mut self, s: &WhileStatement<'_>) -> CompileResult<()> {
        self.push_control(ControlKind::Loop);
        let start = self.current.current_index();
        let exit = self.with_registers(|g| {
            let cond = g.operand(&s.test)?;
            Ok(g.current.emit_jump(Instruction::JumpIfFalse {
                cond,
                offset: JumpOffset(0),
            }))
        })?;
        self.statement(&s.body)?;
        self.current.emit_loop(start);
        self.current.patch_here(exit)?;
        self.pop_control(Some(start))
    }

    fn do_while_statement(&mut self, s: &DoWhileStatement<'_>) -> CompileResult<()> {
        self.push_control(ControlKind::Loop);
        let start = self.current.current_index();
        self.statement(&s.body)?;
        self.patch_continues()?;
        self.with_registers(|g| {
            let cond = g.operand(&s.test)?;
            let offset = start as i64 - g.current.current_index() as i64;
            g.emit(Instruction::JumpIfTrue {
                cond,
                offset: JumpOffset(offset as i32),
            });
            Ok(())
        })?;
        self.pop_control(None)
    }

    fn for_statement(&mut self, s: &ForStatement<'_>) -> CompileResult<()> {
        let labels = std::mem::take(&mut self.current.pending_labels);
        self.enter_scope((s.span.start, ScopeTag::Loop))?;
        let per_iteration = self.innermost_has_env();
        if let Some(init) = &s.init {
            match init {
                ForStatementInit::VariableDeclaration(decl) => self.variable_declaration(decl)?,
                other => {
                    if let Some(expr) = other.as_expression() {
                        self.with_registers(|g| {
                            let tmp = g.current.alloc()?;
                            g.expression(expr, tmp)
                        })?;
                    }
                }
            }
        }

        self.current.pending_labels = labels;
        self.push_control(ControlKind::Loop);
        let start = self.current.current_index();
        let exit = match &s.test {
            Some(test) => Some(self.with_registers(|g| {
                let cond = g.operand(test)?;
                Ok(g.current.emit_jump(Instruction::JumpIfFalse {
                    cond,
                    offset: JumpOffset(0),
                }))
            })?),
            None => None,
        };
        self.statement(&s.body)?;
        self.patch_continues()?;
        if per_iteration {
            self.emit(Instruction::RecreateEnvironment);
        }
        if let Some(update) = &s.update {
            self.with_registers(|g| {
                let tmp = g.current.alloc()?;
                g.expression(update, tmp)
            })?;
        }
        self.current.emit_loop(start);
        if let Some(exit) = exit {
            self.current.patch_here(exit)?;
        }
        self.pop_control(None)?;
        self.exit_scope();
        Ok(())
    }

    /// Bind the per-iteration value of a `for-in`/`for-of` head
    fn bind_loop_head(
        &mut self,
        key_start: u32,
        left: &ForStatementLeft<'_>,
        value: Register,
    ) -> CompileResult<bool> {
        match left {
            ForStatementLeft::VariableDeclaration(decl) => {
                let Some(declarator) = decl.declarations.first() else {
                    return Err(CompileError::internal("empty loop declaration"));
                };
                if decl.kind == VariableDeclarationKind::Var {
                    self.bind_pattern(&declarator.id, value, BindMode::Assign)?;
                    Ok(false)
                } else {
                    self.enter_scope((key_start, ScopeTag::Loop))?;
                    self.bind_pattern(&declarator.id, value, BindMode::Init)?;
                    Ok(true)
                }
            }
            other => match other.as_assignment_target() {
                Some(target) => {
                    self.assign_to_target(target, value)?;
                    Ok(false)
                }
                None => Err(CompileError::InvalidAssignmentTarget),
            },
        }
    }

    fn for_in_statement(&mut self, s: &ForInStatement<'_>) -> CompileResult<()> {
        let scope = self.current.open_register_scope();
        let iter = self.current.alloc()?;
        self.with_registers(|g| {
            let object = g.operand(&s.right)?;
            g.emit(Instruction::ForInEnumerate { dst: iter, src: object });
            Ok(())
        })?;

        self.push_control(ControlKind::Loop);
        let start = self.current.current_index();
        let value = self.current.alloc()?;
        let exit = self.current.emit_jump(Instruction::ForInNext {
            dst: value,
            iter,
            done: JumpOffset(0),
        });
        let scoped = self.bind_loop_head(s.span.start, &s.left, value)?;
        self.statement(&s.body)?;
        if scoped {
            self.exit_scope();
        }
        self.current.emit_loop(start);
        self.current.patch_here(exit)?;
        self.pop_control(Some(start))?;
        self.current.close_register_scope(scope);
        Ok(())
    }

    /// `for-of` runs inside a finally handler that closes the iterator on
    /// abrupt exits; normal exhaustion marks the iterator done first
    fn for_of_statement(&mut self, s: &ForOfStatement<'_>) -> CompileResult<()> {
        if s.r#await {
            return self.for_await_statement(s);
        }
        let scope = self.current.open_register_scope();
        let iter = self.current.alloc()?;
        self.with_registers(|g| {
            let iterable = g.operand(&s.right)?;
            g.mark(s.right.span().start);
            g.emit(Instruction::GetIterator {
                dst: iter,
                src: iterable,
            });
            Ok(())
        })?;

        let finally_jump = self.current.emit_jump(Instruction::EnterTryFinally {
            handler: JumpOffset(0),
        });
        self.current.handlers.push(true);

        self.push_control(ControlKind::Loop);
        let start = self.current.current_index();
        let value = self.current.alloc()?;
        let exit = self.current.emit_jump(Instruction::IteratorStep {
            dst: value,
            iter,
            done: JumpOffset(0),
        });
        let scoped = self.bind_loop_head(s.span.start, &s.left, value)?;
        self.statement(&s.body)?;
        if scoped {
            self.exit_scope();
        }
        self.current.emit_loop(start);
        self.current.patch_here(exit)?;
        self.pop_control(Some(start))?;

        self.emit(Instruction::LeaveTry);
        self.current.handlers.pop();
        self.current.patch_here(finally_jump)?;
        self.emit(Instruction::IteratorClose { iter });
        self.emit(Instruction::EndFinally);
        self.current.close_register_scope(scope);
        Ok(())
    }

    /// `for await` mirrors `for-of` with every iterator result awaited; the
    /// finally handler awaits `return()` unless the loop is unwinding a throw
    fn for_await_statement(&mut self, s: &ForOfStatement<'_>) -> CompileResult<()> {
        if !self.current.block.flags.is_async {
            return Err(self.syntax_error("for await is only valid in async functions", s.span.start));
        }
        let scope = self.current.open_register_scope();
        let iter = self.current.alloc()?;
        self.with_registers(|g| {
            let iterable = g.operand(&s.right)?;
            g.mark(s.right.span().start);
            g.emit(Instruction::GetAsyncIterator {
                dst: iter,
                src: iterable,
            });
            Ok(())
        })?;

        let finally_jump = self.current.emit_jump(Instruction::EnterTryFinally {
            handler: JumpOffset(0),
        });
        self.current.handlers.push(true);

        self.push_control(ControlKind::Loop);
        let start = self.current.current_index();
        let value = self.current.alloc()?;
        self.mark(s.span.start);
        self.emit(Instruction::AsyncIteratorNext { dst: value, iter });
        self.emit(Instruction::Await {
            dst: value,
            src: value,
        });
        let exit = self.current.emit_jump(Instruction::AsyncIteratorComplete {
            dst: value,
            iter,
            done: JumpOffset(0),
        });
        let scoped = self.bind_loop_head(s.span.start, &s.left, value)?;
        self.statement(&s.body)?;
        if scoped {
            self.exit_scope();
        }
        self.current.emit_loop(start);
        self.current.patch_here(exit)?;
        self.pop_control(Some(start))?;

        self.emit(Instruction::LeaveTry);
        self.current.handlers.pop();
        self.current.patch_here(finally_jump)?;
        let result = self.current.alloc()?;
        let skip = self.current.emit_jump(Instruction::AsyncIteratorReturn {
            dst: result,
            iter,
            skip: JumpOffset(0),
        });
        self.emit(Instruction::Await {
            dst: result,
            src: result,
        });
        self.current.patch_here(skip)?;
        self.emit(Instruction::EndFinally);
        self.current.close_register_scope(scope);
        Ok(())
    }

    fn switch_statement(&mut self, s: &SwitchStatement<'_>) -> CompileResult<()> {
        let scope = self.current.open_register_scope();
        let discriminant = self.current.alloc()?;
        self.expression(&s.discriminant, discriminant)?;

        self.enter_scope((s.span.start, ScopeTag::Switch))?;
        for case in &s.cases {
            self.hoist_functions(&case.consequent)?;
        }
        self.push_control(ControlKind::Switch);

        let matched = self.current.alloc()?;
        let mut case_jumps = Vec::with_capacity(s.cases.len());
        for case in &s.cases {
            match &case.test {
                Some(test) => {
                    let jump = self.with_registers(|g| {
                        let value = g.operand(test)?;
                        g.emit(Instruction::StrictEq {
                            dst: matched,
                            lhs: discriminant,
                            rhs: value,
                        });
                        Ok(g.current.emit_jump(Instruction::JumpIfTrue {
                            cond: matched,
                            offset: JumpOffset(0),
                        }))
                    })?;
                    case_jumps.push(Some(jump));
                }
                None => case_jumps.push(None),
            }
        }
        let default_jump = self.jump_placeholder();

        let mut default_seen = false;
        for (case, jump) in s.cases.iter().zip(case_jumps) {
            match jump {
                Some(jump) => self.current.patch_here(jump)?,
                None => {
                    self.current.patch_here(default_jump)?;
                    default_seen = true;
                }
            }
            for stmt in &case.consequent {
                self.statement(stmt)?;
            }
        }
        if !default_seen {
            self.current.patch_here(default_jump)?;
        }

        self.pop_control(None)?;
        self.exit_scope();
        self.current.close_register_scope(scope);
        Ok(())
    }

    fn labeled_statement(&mut self, s: &LabeledStatement<'_>) -> CompileResult<()> {
        let label = s.label.name.to_string();
        let in_use = self
            .current
            .control
            .iter()
            .any(|entry| entry.labels.contains(&label))
            || self.current.pending_labels.contains(&label);
        if in_use {
            return Err(self.syntax_error(
                format!("Label '{label}' has already been declared"),
                s.span.start,
            ));
        }
        self.current.pending_labels.push(label);
        match &s.body {
            Statement::WhileStatement(_)
            | Statement::DoWhileStatement(_)
            | Statement::ForStatement(_)
            | Statement::ForInStatement(_)
            | Statement::ForOfStatement(_)
            | Statement::SwitchStatement(_)
            | Statement::LabeledStatement(_) => self.statement(&s.body),
            body => {
                self.push_control(ControlKind::Labeled);
                self.statement(body)?;
                self.pop_control(None)
            }
        }
    }

    /// `break` or `continue`, leaving handlers and environments on the way out
    fn jump_out(&mut self, label: Option<&str>, is_continue: bool, offset: u32) -> CompileResult<()> {
        let target = self.current.control.iter().rposition(|entry| {
            let kind_ok = if is_continue {
                entry.kind == ControlKind::Loop
            } else {
                label.is_some() || entry.kind != ControlKind::Labeled
            };
            kind_ok && label.is_none_or(|l| entry.labels.iter().any(|x| x == l))
        });
        let Some(target) = target else {
            let what = if is_continue { "continue" } else { "break" };
            return Err(self.syntax_error(format!("Illegal {what} statement"), offset));
        };
        let (try_depth, env_depth, completion_depth) = {
            let entry = &self.current.control[target];
            (entry.try_depth, entry.env_depth, entry.completion_depth)
        };

        let crosses_finally = self.current.handlers[try_depth as usize..]
            .iter()
            .any(|is_finally| *is_finally)
            || self.current.completion_depth > completion_depth;

        let site = if crosses_finally {
            let record = self
                .current
                .add_jump_record(try_depth, env_depth, completion_depth);
            self.emit(Instruction::JumpComplex { record });
            JumpSite::Record(record)
        } else {
            for _ in try_depth..self.current.try_depth() {
                self.emit(Instruction::LeaveTry);
            }
            for _ in env_depth..self.current.env_depth {
                self.emit(Instruction::PopEnvironment);
            }
            JumpSite::Direct(self.jump_placeholder())
        };
        let entry = &mut self.current.control[target];
        if is_continue {
            entry.continues.push(site);
        } else {
            entry.breaks.push(site);
        }
        Ok(())
    }

    // ==================== Exceptions ====================

    fn try_statement(&mut self, s: &TryStatement<'_>) -> CompileResult<()> {
        let finally_jump = match &s.finalizer {
            Some(_) => {
                let jump = self.current.emit_jump(Instruction::EnterTryFinally {
                    handler: JumpOffset(0),
                });
                self.current.handlers.push(true);
                Some(jump)
            }
            None => None,
        };

        match &s.handler {
            Some(handler) => {
                let scope = self.current.open_register_scope();
                let exception = self.current.alloc()?;
                let catch_jump = self.current.emit_jump(Instruction::EnterTryCatch {
                    handler: JumpOffset(0),
                    exception,
                });
                self.current.handlers.push(false);
                self.block_statement(&s.block)?;
                self.emit(Instruction::LeaveTry);
                self.current.handlers.pop();
                let end_jump = self.jump_placeholder();

                self.current.patch_here(catch_jump)?;
                self.enter_scope((handler.span.start, ScopeTag::Catch))?;
                if let Some(param) = &handler.param {
                    self.bind_pattern(&param.pattern, exception, BindMode::Init)?;
                }
                self.block_statement(&handler.body)?;
                self.exit_scope();
                self.current.patch_here(end_jump)?;
                self.current.close_register_scope(scope);
            }
            None => self.block_statement(&s.block)?,
        }

        if let (Some(jump), Some(finalizer)) = (finally_jump, &s.finalizer) {
            self.emit(Instruction::LeaveTry);
            self.current.handlers.pop();
            self.current.patch_here(jump)?;
            self.current.completion_depth += 1;
            self.block_statement(finalizer)?;
            self.current.completion_depth -= 1;
            self.emit(Instruction::EndFinally);
        }
        Ok(())
    }

    fn with_statement(&mut self, s: &WithStatement<'_>) -> CompileResult<()> {
        if self.is_strict() {
            return Err(self.syntax_error("Strict mode code may not include a with statement", s.span.start));
        }
        self.with_registers(|g| {
            let obj = g.operand(&s.object)?;
            g.mark(s.span.start);
            g.emit(Instruction::PushWithEnvironment { obj });
            Ok(())
        })?;
        self.current.env_depth += 1;
        self.scopes.push(Scope {
            bindings: Vec::new(),
            has_env: true,
            is_with: true,
            function_level: self.outer.len(),
            in_switch: false,
        });
        self.statement(&s.body)?;
        self.scopes.pop();
        self.emit(Instruction::PopEnvironment);
        self.current.env_depth -= 1;
        Ok(())
    }
}
