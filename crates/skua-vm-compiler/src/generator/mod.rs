//! AST to bytecode generation

mod class;
mod expression;
mod pattern;
mod statement;

use oxc_ast::ast::*;
use skua_vm_bytecode::{
    BindingKind, BindingStorage, ByteCodeBlock, ConstantIndex, EnvironmentLayout, EnvironmentSlot,
    FunctionFlags, FunctionIndex, IdentifierInfo, Instruction, JumpOffset, Register, Script,
};

use crate::analysis::{CodeKind, DeclaredName, ScopeAnalysis, ScopeKey, ScopeTag, has_use_strict};
use crate::codegen::FunctionContext;
use crate::error::{CompileError, CompileResult};

/// Where a binding lives while its scope is active
#[derive(Debug, Clone, Copy)]
enum Location {
    Register(Register),
    Heap(u16),
    Global,
}

#[derive(Debug, Clone)]
struct Binding {
    name: String,
    kind: BindingKind,
    location: Location,
    end: u32,
}

/// Compile-time view of one runtime scope
#[derive(Debug)]
struct Scope {
    bindings: Vec<Binding>,
    /// A runtime environment exists for this scope
    has_env: bool,
    is_with: bool,
    /// Nesting level of the owning function
    function_level: usize,
    /// Case blocks can skip declarations, so TDZ checks are always kept
    in_switch: bool,
}

/// Resolved identifier access
#[derive(Debug, Clone, Copy)]
enum Access {
    Register {
        reg: Register,
        kind: BindingKind,
        tdz: bool,
    },
    Heap {
        depth: u16,
        slot: u16,
        kind: BindingKind,
        tdz: bool,
    },
    Global {
        kind: Option<BindingKind>,
    },
    Dynamic,
}

/// Initialize a fresh binding or assign an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindMode {
    Init,
    Assign,
}

/// Everything needed to generate one function body
struct FunctionSource<'b, 'a> {
    start: u32,
    name: Option<String>,
    params: &'b FormalParameters<'a>,
    body: &'b FunctionBody<'a>,
    flags: FunctionFlags,
    expression_body: bool,
}

/// Generates a [`Script`] from a parsed program
pub(crate) struct ByteCodeGenerator {
    line_starts: Vec<u32>,
    analysis: ScopeAnalysis,
    kind: CodeKind,
    register_limit: u16,
    current: FunctionContext,
    outer: Vec<FunctionContext>,
    functions: Vec<ByteCodeBlock>,
    scopes: Vec<Scope>,
    /// Short-circuit jumps of the optional chain being generated
    chain_exits: Vec<usize>,
    /// Number of enclosing class bodies; class code is always strict
    class_depth: u32,
}

impl ByteCodeGenerator {
    pub fn new(source: &str, analysis: ScopeAnalysis, kind: CodeKind, register_limit: u16) -> Self {
        let line_starts = std::iter::once(0)
            .chain(
                source
                    .bytes()
                    .enumerate()
                    .filter(|(_, b)| *b == b'\n')
                    .map(|(i, _)| i as u32 + 1),
            )
            .collect();
        Self {
            line_starts,
            analysis,
            kind,
            register_limit,
            current: FunctionContext::new(None, register_limit),
            outer: Vec::new(),
            functions: Vec::new(),
            scopes: Vec::new(),
            chain_exits: Vec::new(),
            class_depth: 0,
        }
    }

    /// Generate the entry block and every nested function
    pub fn generate(
        mut self,
        program: &Program<'_>,
        source_name: &str,
        strict: bool,
    ) -> CompileResult<Script> {
        self.functions.push(ByteCodeBlock::default());
        let strict = strict || has_use_strict(&program.directives);
        self.current.block.flags.is_strict = strict;
        let key = (program.span.start, ScopeTag::Program);
        let facts = self.analysis.function(key);
        self.current.block.flags.uses_eval = facts.has_direct_eval;
        self.current.block.flags.has_with = facts.has_with;

        let globals = self.kind == CodeKind::Script || (self.kind == CodeKind::IndirectEval && !strict);
        let scope = self.declare_scope(key, globals, |_| false)?;
        if scope.has_env {
            self.current.block.function_environment =
                Some(self.current.block.environment_layouts.len() as u32 - 1);
        }
        if globals {
            let declarations = &mut self.current.block.global_declarations;
            for binding in &scope.bindings {
                let name: Box<str> = binding.name.as_str().into();
                match binding.kind {
                    BindingKind::Function => declarations.functions.push(name),
                    BindingKind::Let => declarations.lexicals.push((name, false)),
                    BindingKind::Const => declarations.lexicals.push((name, true)),
                    _ => declarations.vars.push(name),
                }
            }
        }
        self.scopes.push(scope);
        if globals && !self.current.block.global_declarations.is_empty() {
            self.emit(Instruction::DeclareGlobals);
        }
        self.initialize_lexicals();

        let completion = self.current.alloc_variable()?;
        self.current.completion = Some(completion);
        self.hoist_functions(&program.body)?;
        for stmt in &program.body {
            self.statement(stmt)?;
        }
        self.emit(Instruction::Return { src: completion });
        self.scopes.pop();

        let entry = std::mem::replace(
            &mut self.current,
            FunctionContext::new(None, self.register_limit),
        );
        self.functions[0] = entry.finish();
        let mut script = Script::new(source_name, self.functions, 0);
        script.is_eval = self.kind != CodeKind::Script;
        Ok(script)
    }

    #[inline]
    fn emit(&mut self, instruction: Instruction) {
        self.current.emit(instruction);
    }

    fn position(&self, offset: u32) -> (u32, u32) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let start = self.line_starts.get(line).copied().unwrap_or(0);
        (line as u32 + 1, offset.saturating_sub(start) + 1)
    }

    /// Attach the source position of `offset` to the next instruction
    fn mark(&mut self, offset: u32) {
        let (line, column) = self.position(offset);
        self.current.mark(offset, line, column);
    }

    fn unsupported(&self, what: &str, offset: u32) -> CompileError {
        let (line, column) = self.position(offset);
        CompileError::unsupported(format!("{what} at {line}:{column}"))
    }

    fn syntax_error(&self, message: impl Into<String>, offset: u32) -> CompileError {
        let (line, column) = self.position(offset);
        CompileError::syntax(message, line, column)
    }

    fn is_strict(&self) -> bool {
        self.class_depth > 0 || self.current.block.flags.is_strict
    }

    /// Whether `this` may still be unbound here: derived constructors and
    /// arrows nested in them before `super()` returns
    fn this_needs_check(&self) -> bool {
        let flags = &self.current.block.flags;
        if !flags.is_arrow {
            return flags.is_derived_constructor;
        }
        self.outer
            .iter()
            .rev()
            .map(|context| &context.block.flags)
            .find(|flags| !flags.is_arrow)
            .is_some_and(|flags| flags.is_derived_constructor)
    }

    /// Register holding `this`, checked for initialization where needed
    fn load_this(&mut self) -> Register {
        let this = self.current.this_register();
        if self.this_needs_check() {
            self.emit(Instruction::CheckThis { src: this });
        }
        this
    }

    /// Run `f` inside a register scope; temporaries it allocates are released
    fn with_registers<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> CompileResult<R>,
    ) -> CompileResult<R> {
        let scope = self.current.open_register_scope();
        let result = f(self);
        self.current.close_register_scope(scope);
        result
    }

    // ==================== Scopes ====================

    /// Assign storage to the declarations of `key`
    ///
    /// Captured names go to a new environment layout, the rest to stack variables.
    fn declare_scope(
        &mut self,
        key: ScopeKey,
        globals: bool,
        force_heap: impl Fn(&DeclaredName) -> bool,
    ) -> CompileResult<Scope> {
        let declarations = self.analysis.declarations(key).to_vec();
        let layout_index = self.current.block.environment_layouts.len() as u32;
        let mut layout = EnvironmentLayout::default();
        let mut bindings = Vec::with_capacity(declarations.len());

        for decl in declarations {
            let (location, storage) = if globals {
                (Location::Global, BindingStorage::Global)
            } else if decl.captured || force_heap(&decl) {
                let slot = layout.slots.len() as u16;
                layout.slots.push(EnvironmentSlot {
                    name: decl.name.as_str().into(),
                    kind: decl.kind,
                });
                (
                    Location::Heap(slot),
                    BindingStorage::Heap {
                        layout: layout_index,
                        slot,
                    },
                )
            } else {
                let reg = self.current.alloc_variable()?;
                (Location::Register(reg), BindingStorage::Register(reg.0))
            };
            self.current.record_identifier(IdentifierInfo {
                name: decl.name.as_str().into(),
                kind: decl.kind,
                storage,
            });
            bindings.push(Binding {
                name: decl.name,
                kind: decl.kind,
                location,
                end: decl.end,
            });
        }

        let has_env = !layout.slots.is_empty();
        if has_env {
            self.current.block.environment_layouts.push(layout);
        }
        Ok(Scope {
            bindings,
            has_env,
            is_with: false,
            function_level: self.outer.len(),
            in_switch: key.1 == ScopeTag::Switch,
        })
    }

    /// Enter a block-like scope, pushing its environment when needed
    fn enter_scope(&mut self, key: ScopeKey) -> CompileResult<()> {
        let scope = self.declare_scope(key, false, |_| false)?;
        if scope.has_env {
            let layout = self.current.block.environment_layouts.len() as u32 - 1;
            self.emit(Instruction::PushEnvironment { layout });
            self.current.env_depth += 1;
        }
        self.scopes.push(scope);
        self.initialize_lexicals();
        Ok(())
    }

    fn exit_scope(&mut self) {
        if let Some(scope) = self.scopes.pop()
            && scope.has_env
        {
            self.emit(Instruction::PopEnvironment);
            self.current.env_depth -= 1;
        }
    }

    /// Put register-allocated lexical bindings of the innermost scope in the TDZ
    fn initialize_lexicals(&mut self) {
        let Some(scope) = self.scopes.last() else {
            return;
        };
        let registers: Vec<Register> = scope
            .bindings
            .iter()
            .filter(|b| b.kind.is_lexical())
            .filter_map(|b| match b.location {
                Location::Register(reg) => Some(reg),
                _ => None,
            })
            .collect();
        for dst in registers {
            self.emit(Instruction::LoadEmpty { dst });
        }
    }

    /// Whether the innermost scope pushed an environment that needs per-iteration copies
    fn innermost_has_env(&self) -> bool {
        self.scopes.last().is_some_and(|s| s.has_env)
    }

    fn resolve(&self, name: &str, offset: u32) -> CompileResult<Access> {
        let level = self.outer.len();
        let mut depth = 0u16;
        let mut dynamic = false;
        for scope in self.scopes.iter().rev() {
            if scope.is_with {
                dynamic = true;
                depth += 1;
                continue;
            }
            if let Some(binding) = scope.bindings.iter().rev().find(|b| b.name == name) {
                if dynamic {
                    return Ok(Access::Dynamic);
                }
                let tdz = binding.kind.is_lexical()
                    && (scope.function_level != level || scope.in_switch || offset < binding.end);
                return match binding.location {
                    Location::Register(reg) if scope.function_level == level => Ok(Access::Register {
                        reg,
                        kind: binding.kind,
                        tdz,
                    }),
                    Location::Register(_) => Err(CompileError::internal(format!(
                        "binding '{name}' referenced from a closure was not captured"
                    ))),
                    Location::Heap(slot) => Ok(Access::Heap {
                        depth,
                        slot,
                        kind: binding.kind,
                        tdz,
                    }),
                    Location::Global => Ok(Access::Global {
                        kind: Some(binding.kind),
                    }),
                };
            }
            if scope.has_env {
                depth += 1;
            }
        }
        if dynamic || self.kind == CodeKind::DirectEval {
            Ok(Access::Dynamic)
        } else {
            Ok(Access::Global { kind: None })
        }
    }

    /// Load the value of identifier `name` into `dst`
    fn load_binding(&mut self, name: &str, dst: Register, offset: u32) -> CompileResult<()> {
        match self.resolve(name, offset)? {
            Access::Register { reg, tdz, .. } => {
                if tdz {
                    let name = self.current.string_constant(name);
                    self.emit(Instruction::CheckInitialized { src: reg, name });
                }
                if reg != dst {
                    self.emit(Instruction::Move { dst, src: reg });
                }
            }
            Access::Heap {
                depth, slot, tdz, ..
            } => {
                self.emit(Instruction::GetHeap { dst, depth, slot });
                if tdz {
                    let name = self.current.string_constant(name);
                    self.emit(Instruction::CheckInitialized { src: dst, name });
                }
            }
            Access::Global { kind: None } if name == "undefined" => {
                self.emit(Instruction::LoadUndefined { dst });
            }
            Access::Global { .. } => {
                let name = self.current.string_constant(name);
                let ic_index = self.current.next_ic();
                self.mark(offset);
                self.emit(Instruction::GetGlobal {
                    dst,
                    name,
                    ic_index,
                });
            }
            Access::Dynamic => {
                let name = self.current.string_constant(name);
                self.mark(offset);
                self.emit(Instruction::GetByName { dst, name });
            }
        }
        Ok(())
    }

    /// Store `src` into identifier `name`
    fn store_binding(
        &mut self,
        name: &str,
        src: Register,
        mode: BindMode,
        offset: u32,
    ) -> CompileResult<()> {
        let strict = self.is_strict();
        let access = self.resolve(name, offset)?;
        let name_index = self.current.string_constant(name);
        match access {
            Access::Register { reg, kind, tdz } => {
                if mode == BindMode::Assign {
                    if tdz {
                        self.emit(Instruction::CheckInitialized {
                            src: reg,
                            name: name_index,
                        });
                    }
                    if !self.check_mutable(kind, name_index, strict) {
                        return Ok(());
                    }
                }
                if reg != src {
                    self.emit(Instruction::Move { dst: reg, src });
                }
            }
            Access::Heap {
                depth,
                slot,
                kind,
                tdz,
            } => {
                if mode == BindMode::Assign {
                    if tdz {
                        self.with_registers(|g| {
                            let tmp = g.current.alloc()?;
                            g.emit(Instruction::GetHeap {
                                dst: tmp,
                                depth,
                                slot,
                            });
                            g.emit(Instruction::CheckInitialized {
                                src: tmp,
                                name: name_index,
                            });
                            Ok(())
                        })?;
                    }
                    if !self.check_mutable(kind, name_index, strict) {
                        return Ok(());
                    }
                }
                self.emit(Instruction::SetHeap { src, depth, slot });
            }
            Access::Global { kind } => {
                self.mark(offset);
                if mode == BindMode::Init && kind.is_some_and(BindingKind::is_lexical) {
                    self.emit(Instruction::InitGlobalLexical {
                        src,
                        name: name_index,
                    });
                } else {
                    let ic_index = self.current.next_ic();
                    self.emit(Instruction::SetGlobal {
                        src,
                        name: name_index,
                        ic_index,
                        strict: strict && mode == BindMode::Assign,
                    });
                }
            }
            Access::Dynamic => {
                self.mark(offset);
                self.emit(Instruction::SetByName {
                    src,
                    name: name_index,
                    strict,
                });
            }
        }
        Ok(())
    }

    /// Emit the failure for assigning an immutable binding; returns false when
    /// the store must be skipped
    fn check_mutable(&mut self, kind: BindingKind, name: ConstantIndex, strict: bool) -> bool {
        if kind.is_mutable() {
            return true;
        }
        if kind == BindingKind::Const || strict {
            self.emit(Instruction::ThrowConstAssignment { name });
        }
        false
    }

    // ==================== Functions ====================

    /// Create closures for the function declarations of a statement list
    fn hoist_functions(&mut self, statements: &[Statement<'_>]) -> CompileResult<()> {
        for stmt in statements {
            if let Statement::FunctionDeclaration(func) = stmt {
                let Some(id) = &func.id else {
                    continue;
                };
                let name = id.name.to_string();
                let index = self.compile_function_node(func, Some(name.clone()), false)?;
                self.with_registers(|g| {
                    let tmp = g.current.alloc()?;
                    g.emit(Instruction::CreateFunction {
                        dst: tmp,
                        func: index,
                    });
                    g.store_binding(&name, tmp, BindMode::Init, func.span.end)
                })?;
            }
        }
        Ok(())
    }

    fn compile_function_node(
        &mut self,
        func: &Function<'_>,
        name: Option<String>,
        is_method: bool,
    ) -> CompileResult<FunctionIndex> {
        let role = FunctionFlags {
            is_method,
            ..FunctionFlags::default()
        };
        self.compile_function_with(func, name, role)
    }

    /// Compile `func`; `role` carries the method and class constructor bits
    fn compile_function_with(
        &mut self,
        func: &Function<'_>,
        name: Option<String>,
        role: FunctionFlags,
    ) -> CompileResult<FunctionIndex> {
        let Some(body) = &func.body else {
            return Err(self.unsupported("function without body", func.span.start));
        };
        let name = func.id.as_ref().map(|id| id.name.to_string()).or(name);
        self.compile_function(FunctionSource {
            start: func.span.start,
            name,
            params: &func.params,
            body,
            flags: FunctionFlags {
                is_strict: self.is_strict() || has_use_strict(&body.directives),
                is_generator: func.generator,
                is_async: func.r#async,
                ..role
            },
            expression_body: false,
        })
    }

    fn compile_arrow(
        &mut self,
        arrow: &ArrowFunctionExpression<'_>,
        name: Option<String>,
    ) -> CompileResult<FunctionIndex> {
        self.compile_function(FunctionSource {
            start: arrow.span.start,
            name,
            params: &arrow.params,
            body: &arrow.body,
            flags: FunctionFlags {
                is_strict: self.is_strict() || has_use_strict(&arrow.body.directives),
                is_async: arrow.r#async,
                is_arrow: true,
                ..FunctionFlags::default()
            },
            expression_body: arrow.expression,
        })
    }

    fn compile_function(&mut self, source: FunctionSource<'_, '_>) -> CompileResult<FunctionIndex> {
        let name = source.name.clone();
        self.compile_child(name, |g| g.function_body(&source))
    }

    /// Compile a function without source parameters: class constructors
    /// synthesized for classes that declare none, field initializers and
    /// static blocks
    fn compile_synthetic(
        &mut self,
        name: Option<String>,
        key: ScopeKey,
        flags: FunctionFlags,
        body: impl FnOnce(&mut Self) -> CompileResult<()>,
    ) -> CompileResult<FunctionIndex> {
        self.compile_child(name, |g| {
            let facts = g.analysis.function(key);
            g.current.block.flags = FunctionFlags {
                uses_eval: facts.has_direct_eval,
                has_with: facts.has_with,
                simple_parameters: true,
                ..flags
            };
            let scope = g.declare_scope(key, false, |_| false)?;
            if scope.has_env {
                g.current.block.function_environment =
                    Some(g.current.block.environment_layouts.len() as u32 - 1);
            }
            g.scopes.push(scope);
            g.initialize_lexicals();
            body(g)
        })
    }

    fn compile_child(
        &mut self,
        name: Option<String>,
        body: impl FnOnce(&mut Self) -> CompileResult<()>,
    ) -> CompileResult<FunctionIndex> {
        let index = self.functions.len() as u32;
        self.functions.push(ByteCodeBlock::default());

        let context = FunctionContext::new(name.clone(), self.register_limit);
        let parent = std::mem::replace(&mut self.current, context);
        self.outer.push(parent);
        self.current.scope_base = self.scopes.len();

        let result = body(self);

        // Unwind this function's scopes even on error
        self.scopes.truncate(self.current.scope_base);
        let context = match self.outer.pop() {
            Some(parent) => std::mem::replace(&mut self.current, parent),
            None => return Err(CompileError::internal("function stack underflow")),
        };
        result?;

        self.functions[index as usize] = context.finish();
        self.current.block.children.push(index);
        tracing::trace!(
            target: "skua::compiler",
            function = name.as_deref().unwrap_or("<anonymous>"),
            index,
            "generated function"
        );
        Ok(FunctionIndex(index))
    }

    fn function_body(&mut self, source: &FunctionSource<'_, '_>) -> CompileResult<()> {
        let key = (source.start, ScopeTag::Function);
        let facts = self.analysis.function(key);
        let params = source.params;
        let simple = params.rest.is_none()
            && params.items.iter().all(|p| {
                p.initializer.is_none() && matches!(p.pattern, BindingPattern::BindingIdentifier(_))
            });

        let mut flags = source.flags;
        flags.uses_arguments = facts.uses_arguments && !flags.is_arrow;
        flags.uses_eval = facts.has_direct_eval;
        flags.has_with = facts.has_with;
        flags.simple_parameters = simple;
        let block = &mut self.current.block;
        block.flags = flags;
        block.param_count = params.items.len() as u16;
        block.length = params
            .items
            .iter()
            .position(|p| p.initializer.is_some())
            .unwrap_or(params.items.len()) as u16;
        block.has_rest = params.rest.is_some();

        // Mapped arguments alias parameters through the function environment
        let mapped = flags.uses_arguments && simple && !flags.is_strict;
        let scope = self.declare_scope(key, false, |d| {
            mapped && matches!(d.kind, BindingKind::Parameter(_))
        })?;
        if scope.has_env {
            self.current.block.function_environment =
                Some(self.current.block.environment_layouts.len() as u32 - 1);
        }
        let callee = scope
            .bindings
            .iter()
            .find(|b| b.kind == BindingKind::Callee)
            .map(|b| b.name.clone());
        self.scopes.push(scope);
        self.initialize_lexicals();

        if let Some(name) = callee {
            self.with_registers(|g| {
                let tmp = g.current.alloc()?;
                g.emit(Instruction::LoadCallee { dst: tmp });
                g.store_binding(&name, tmp, BindMode::Init, source.start)
            })?;
        }
        if flags.uses_arguments {
            self.with_registers(|g| {
                let tmp = g.current.alloc()?;
                g.emit(Instruction::CreateArguments { dst: tmp });
                g.store_binding("arguments", tmp, BindMode::Init, source.start)
            })?;
        }

        for (index, param) in params.items.iter().enumerate() {
            self.with_registers(|g| {
                let tmp = g.current.alloc()?;
                g.emit(Instruction::GetArgument {
                    dst: tmp,
                    index: index as u16,
                });
                if let Some(initializer) = &param.initializer {
                    let skip = g.current.emit_jump(Instruction::JumpIfNotUndefined {
                        src: tmp,
                        offset: JumpOffset(0),
                    });
                    let hint = match &param.pattern {
                        BindingPattern::BindingIdentifier(id) => Some(id.name.as_str()),
                        _ => None,
                    };
                    g.expression_named(initializer, tmp, hint)?;
                    g.current.patch_here(skip)?;
                }
                g.bind_pattern(&param.pattern, tmp, BindMode::Init)
            })?;
        }
        if let Some(rest) = &params.rest {
            self.with_registers(|g| {
                let tmp = g.current.alloc()?;
                g.emit(Instruction::CreateRestParameter {
                    dst: tmp,
                    start: params.items.len() as u16,
                });
                g.bind_pattern(&rest.rest.argument, tmp, BindMode::Init)
            })?;
        }

        self.hoist_functions(&source.body.statements)?;

        if flags.is_generator || flags.is_async {
            self.emit(Instruction::GeneratorsInitialize);
        }

        if source.expression_body {
            if let Some(Statement::ExpressionStatement(stmt)) = source.body.statements.first() {
                self.with_registers(|g| {
                    let dst = g.current.alloc()?;
                    g.expression(&stmt.expression, dst)?;
                    g.emit(Instruction::Return { src: dst });
                    Ok(())
                })?;
            }
        } else {
            for stmt in &source.body.statements {
                self.statement(stmt)?;
            }
        }
        Ok(())
    }

    /// Emit `CreateFunction` for a compiled child
    fn create_function(&mut self, dst: Register, func: FunctionIndex) {
        self.emit(Instruction::CreateFunction { dst, func });
    }

    /// Emit a forward jump placeholder
    fn jump_placeholder(&mut self) -> usize {
        self.current.emit_jump(Instruction::Jump {
            offset: JumpOffset(0),
        })
    }
}
