//! Scope analysis pre-pass
//!
//! Walks the program once before code generation and records, for every scope
//! node, the names it declares and whether each one is captured. A binding is
//! captured when a nested function references it, when a `with` body may reach
//! it by name, or when a direct `eval` could see it. Captured bindings live in
//! heap environments; everything else gets a register.

use oxc_ast::ast::*;
use oxc_span::Span;
use rustc_hash::FxHashMap;
use skua_vm_bytecode::BindingKind;

use crate::error::{CompileError, CompileResult};

/// Kind of scope-introducing node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ScopeTag {
    /// Script or eval body
    Program,
    /// Function or arrow body
    Function,
    /// Block statement
    Block,
    /// `for`/`for-in`/`for-of` head bindings
    Loop,
    /// `catch` parameter
    Catch,
    /// `switch` case block
    Switch,
    /// Class body, holding the inner class name
    Class,
    /// Implicit constructor of a class without one
    Constructor,
    /// Instance field initializer of a class
    InstanceFields,
    /// Static fields and static blocks of a class
    StaticFields,
}

/// Scope lookup key: node start offset plus tag
pub(crate) type ScopeKey = (u32, ScopeTag);

/// A name declared by a scope
#[derive(Debug, Clone)]
pub(crate) struct DeclaredName {
    pub name: String,
    pub kind: BindingKind,
    pub captured: bool,
    /// End offset of the declaration, used to elide TDZ checks
    pub end: u32,
}

/// Per-function facts
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FunctionFacts {
    pub uses_arguments: bool,
    pub has_direct_eval: bool,
    pub has_with: bool,
}

/// Result of the pre-pass
#[derive(Debug, Default)]
pub(crate) struct ScopeAnalysis {
    scopes: FxHashMap<ScopeKey, Vec<DeclaredName>>,
    functions: FxHashMap<ScopeKey, FunctionFacts>,
}

impl ScopeAnalysis {
    /// Declarations of a scope node
    pub fn declarations(&self, key: ScopeKey) -> &[DeclaredName] {
        self.scopes.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Facts about the function or program body keyed by `key`
    pub fn function(&self, key: ScopeKey) -> FunctionFacts {
        self.functions.get(&key).copied().unwrap_or_default()
    }
}

struct Frame {
    key: Option<ScopeKey>,
    names: Vec<DeclaredName>,
    is_function: bool,
    is_arrow: bool,
    is_with: bool,
    /// Names of this frame resolve as globals
    is_global: bool,
}

impl Frame {
    fn scope(key: ScopeKey) -> Self {
        Self {
            key: Some(key),
            names: Vec::new(),
            is_function: false,
            is_arrow: false,
            is_with: false,
            is_global: false,
        }
    }
}

/// Script or eval body being analyzed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CodeKind {
    Script,
    DirectEval,
    IndirectEval,
}

pub(crate) struct Analyzer<'s> {
    source: &'s str,
    frames: Vec<Frame>,
    function_keys: Vec<ScopeKey>,
    result: ScopeAnalysis,
    strict: Vec<bool>,
}

impl<'s> Analyzer<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            frames: Vec::new(),
            function_keys: Vec::new(),
            result: ScopeAnalysis::default(),
            strict: Vec::new(),
        }
    }

    pub fn analyze(mut self, program: &Program<'_>, kind: CodeKind, strict: bool) -> CompileResult<ScopeAnalysis> {
        let strict = strict || has_use_strict(&program.directives);
        let key = (program.span.start, ScopeTag::Program);
        let mut frame = Frame::scope(key);
        frame.is_function = true;
        // Script vars always live on the global object; strict eval keeps them local.
        frame.is_global = kind == CodeKind::Script || (kind == CodeKind::IndirectEval && !strict);
        self.frames.push(frame);
        self.function_keys.push(key);
        self.strict.push(strict);

        let mut vars = Vec::new();
        for stmt in &program.body {
            collect_var_names(stmt, &mut vars);
        }
        for (name, end) in vars {
            self.declare(&name, BindingKind::Var, end)?;
        }
        self.declare_lexical(&program.body)?;
        for stmt in &program.body {
            self.statement(stmt)?;
        }
        self.pop_frame();
        Ok(self.result)
    }

    fn location(&self, offset: u32) -> (u32, u32) {
        line_column(self.source, offset)
    }

    fn redeclared(&self, name: &str, offset: u32) -> CompileError {
        let (line, column) = self.location(offset);
        CompileError::syntax(format!("Identifier '{name}' has already been declared"), line, column)
    }

    fn declare(&mut self, name: &str, kind: BindingKind, end: u32) -> CompileResult<()> {
        let Some(frame) = self.frames.last_mut() else {
            return Err(CompileError::internal("declaration outside of any scope"));
        };
        let Some(existing) = frame.names.iter_mut().find(|d| d.name == name) else {
            frame.names.push(DeclaredName {
                name: name.to_string(),
                kind,
                captured: false,
                end,
            });
            return Ok(());
        };
        let conflict = kind.is_lexical()
            || existing.kind.is_lexical()
            || (existing.kind == BindingKind::CatchParameter && kind != BindingKind::Var);
        if !conflict {
            if matches!((existing.kind, kind), (BindingKind::Callee, _) | (_, BindingKind::Function)) {
                existing.kind = kind;
            }
            return Ok(());
        }
        Err(self.redeclared(name, end))
    }

    fn declare_lexical(&mut self, statements: &[Statement<'_>]) -> CompileResult<()> {
        for stmt in statements {
            match stmt {
                Statement::VariableDeclaration(decl) if decl.kind != VariableDeclarationKind::Var => {
                    let kind = if decl.kind == VariableDeclarationKind::Const {
                        BindingKind::Const
                    } else {
                        BindingKind::Let
                    };
                    for declarator in &decl.declarations {
                        let mut names = Vec::new();
                        bound_names(&declarator.id, &mut names);
                        for (name, span) in names {
                            self.declare(&name, kind, span.end)?;
                        }
                    }
                }
                Statement::FunctionDeclaration(func) => {
                    if let Some(id) = &func.id {
                        self.declare(&id.name, BindingKind::Function, func.span.end)?;
                    }
                }
                Statement::ClassDeclaration(class) => {
                    if let Some(id) = &class.id {
                        self.declare(&id.name, BindingKind::Let, class.span.end)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn pop_frame(&mut self) {
        if let Some(frame) = self.frames.pop()
            && let Some(key) = frame.key
        {
            self.result.scopes.insert(key, frame.names);
        }
    }

    fn facts(&mut self) -> &mut FunctionFacts {
        let key = self.function_keys.last().copied().unwrap_or((0, ScopeTag::Program));
        self.result.functions.entry(key).or_default()
    }

    fn reference(&mut self, name: &str) {
        let mut crossed = false;
        let mut implicit_arguments = None;
        for index in (0..self.frames.len()).rev() {
            let frame = &mut self.frames[index];
            if frame.is_with {
                crossed = true;
                continue;
            }
            if let Some(decl) = frame.names.iter_mut().rev().find(|d| d.name == name) {
                if crossed && !frame.is_global {
                    decl.captured = true;
                }
                return;
            }
            if frame.is_function {
                if name == "arguments" && !frame.is_arrow && !frame.is_global && index > 0 {
                    implicit_arguments = Some((index, crossed));
                    break;
                }
                crossed = true;
            }
        }
        if let Some((index, crossed)) = implicit_arguments {
            let frame = &mut self.frames[index];
            frame.names.push(DeclaredName {
                name: "arguments".to_string(),
                kind: BindingKind::Var,
                captured: crossed,
                end: 0,
            });
            if let Some(key) = frame.key {
                self.result.functions.entry(key).or_default().uses_arguments = true;
            }
        }
    }

    /// Direct eval code may reference every visible binding by name
    fn direct_eval(&mut self) {
        self.facts().has_direct_eval = true;
        for frame in &mut self.frames {
            if !frame.is_global {
                for decl in &mut frame.names {
                    decl.captured = true;
                }
            }
        }
        self.reference("arguments");
        if let Some(frame) = self.frames.iter_mut().rev().find(|f| f.is_function && !f.is_arrow)
            && let Some(decl) = frame.names.iter_mut().find(|d| d.name == "arguments")
        {
            decl.captured = true;
        }
    }

    fn block(&mut self, key: ScopeKey, statements: &[Statement<'_>]) -> CompileResult<()> {
        self.frames.push(Frame::scope(key));
        self.declare_lexical(statements)?;
        for stmt in statements {
            self.statement(stmt)?;
        }
        self.pop_frame();
        Ok(())
    }

    fn statement(&mut self, stmt: &Statement<'_>) -> CompileResult<()> {
        match stmt {
            Statement::ExpressionStatement(s) => self.expression(&s.expression),
            Statement::VariableDeclaration(decl) => self.variable_declaration(decl),
            Statement::FunctionDeclaration(func) => self.function(func, false),
            Statement::ClassDeclaration(class) => self.class(class),
            Statement::BlockStatement(block) => {
                self.block((block.span.start, ScopeTag::Block), &block.body)
            }
            Statement::IfStatement(s) => {
                self.expression(&s.test)?;
                self.statement(&s.consequent)?;
                if let Some(alt) = &s.alternate {
                    self.statement(alt)?;
                }
                Ok(())
            }
            Statement::WhileStatement(s) => {
                self.expression(&s.test)?;
                self.statement(&s.body)
            }
            Statement::DoWhileStatement(s) => {
                self.statement(&s.body)?;
                self.expression(&s.test)
            }
            Statement::ForStatement(s) => {
                self.frames.push(Frame::scope((s.span.start, ScopeTag::Loop)));
                if let Some(init) = &s.init {
                    match init {
                        ForStatementInit::VariableDeclaration(decl) => {
                            self.loop_head_declaration(decl)?;
                            self.variable_declaration(decl)?;
                        }
                        other => {
                            if let Some(expr) = other.as_expression() {
                                self.expression(expr)?;
                            }
                        }
                    }
                }
                if let Some(test) = &s.test {
                    self.expression(test)?;
                }
                if let Some(update) = &s.update {
                    self.expression(update)?;
                }
                self.statement(&s.body)?;
                self.pop_frame();
                Ok(())
            }
            Statement::ForInStatement(s) => self.for_in_of(s.span, &s.left, &s.right, &s.body),
            Statement::ForOfStatement(s) => self.for_in_of(s.span, &s.left, &s.right, &s.body),
            Statement::SwitchStatement(s) => {
                self.expression(&s.discriminant)?;
                self.frames.push(Frame::scope((s.span.start, ScopeTag::Switch)));
                for case in &s.cases {
                    self.declare_lexical(&case.consequent)?;
                }
                for case in &s.cases {
                    if let Some(test) = &case.test {
                        self.expression(test)?;
                    }
                    for stmt in &case.consequent {
                        self.statement(stmt)?;
                    }
                }
                self.pop_frame();
                Ok(())
            }
            Statement::LabeledStatement(s) => self.statement(&s.body),
            Statement::ReturnStatement(s) => match &s.argument {
                Some(arg) => self.expression(arg),
                None => Ok(()),
            },
            Statement::ThrowStatement(s) => self.expression(&s.argument),
            Statement::TryStatement(s) => {
                self.block((s.block.span.start, ScopeTag::Block), &s.block.body)?;
                if let Some(handler) = &s.handler {
                    self.frames.push(Frame::scope((handler.span.start, ScopeTag::Catch)));
                    if let Some(param) = &handler.param {
                        let mut names = Vec::new();
                        bound_names(&param.pattern, &mut names);
                        for (name, span) in names {
                            self.declare(&name, BindingKind::CatchParameter, span.end)?;
                        }
                        self.pattern(&param.pattern)?;
                    }
                    self.block((handler.body.span.start, ScopeTag::Block), &handler.body.body)?;
                    self.pop_frame();
                }
                if let Some(finalizer) = &s.finalizer {
                    self.block((finalizer.span.start, ScopeTag::Block), &finalizer.body)?;
                }
                Ok(())
            }
            Statement::WithStatement(s) => {
                self.expression(&s.object)?;
                self.facts().has_with = true;
                let mut frame = Frame::scope((s.span.start, ScopeTag::Block));
                frame.key = None;
                frame.is_with = true;
                self.frames.push(frame);
                self.statement(&s.body)?;
                self.frames.pop();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn loop_head_declaration(&mut self, decl: &VariableDeclaration<'_>) -> CompileResult<()> {
        if decl.kind == VariableDeclarationKind::Var {
            return Ok(());
        }
        let kind = if decl.kind == VariableDeclarationKind::Const {
            BindingKind::Const
        } else {
            BindingKind::Let
        };
        for declarator in &decl.declarations {
            let mut names = Vec::new();
            bound_names(&declarator.id, &mut names);
            for (name, span) in names {
                self.declare(&name, kind, span.end)?;
            }
        }
        Ok(())
    }

    fn for_in_of(
        &mut self,
        span: Span,
        left: &ForStatementLeft<'_>,
        right: &Expression<'_>,
        body: &Statement<'_>,
    ) -> CompileResult<()> {
        self.expression(right)?;
        self.frames.push(Frame::scope((span.start, ScopeTag::Loop)));
        match left {
            ForStatementLeft::VariableDeclaration(decl) => {
                self.loop_head_declaration(decl)?;
                for declarator in &decl.declarations {
                    self.pattern(&declarator.id)?;
                }
            }
            other => {
                if let Some(target) = other.as_assignment_target() {
                    self.assignment_target(target)?;
                }
            }
        }
        self.statement(body)?;
        self.pop_frame();
        Ok(())
    }

    fn variable_declaration(&mut self, decl: &VariableDeclaration<'_>) -> CompileResult<()> {
        for declarator in &decl.declarations {
            self.pattern(&declarator.id)?;
            if let Some(init) = &declarator.init {
                self.expression(init)?;
            }
        }
        Ok(())
    }

    fn pattern(&mut self, pattern: &BindingPattern<'_>) -> CompileResult<()> {
        match pattern {
            BindingPattern::BindingIdentifier(_) => Ok(()),
            BindingPattern::ObjectPattern(obj) => {
                for prop in &obj.properties {
                    if prop.computed
                        && let Some(key) = prop.key.as_expression()
                    {
                        self.expression(key)?;
                    }
                    self.pattern(&prop.value)?;
                }
                if let Some(rest) = &obj.rest {
                    self.pattern(&rest.argument)?;
                }
                Ok(())
            }
            BindingPattern::ArrayPattern(arr) => {
                for element in arr.elements.iter().flatten() {
                    self.pattern(element)?;
                }
                if let Some(rest) = &arr.rest {
                    self.pattern(&rest.argument)?;
                }
                Ok(())
            }
            BindingPattern::AssignmentPattern(assign) => {
                self.pattern(&assign.left)?;
                self.expression(&assign.right)
            }
        }
    }

    fn assignment_target(&mut self, target: &AssignmentTarget<'_>) -> CompileResult<()> {
        match target {
            AssignmentTarget::AssignmentTargetIdentifier(id) => {
                self.reference(&id.name);
                Ok(())
            }
            AssignmentTarget::ArrayAssignmentTarget(arr) => {
                for element in arr.elements.iter().flatten() {
                    self.assignment_target_maybe_default(element)?;
                }
                if let Some(rest) = &arr.rest {
                    self.assignment_target(&rest.target)?;
                }
                Ok(())
            }
            AssignmentTarget::ObjectAssignmentTarget(obj) => {
                for prop in &obj.properties {
                    match prop {
                        AssignmentTargetProperty::AssignmentTargetPropertyIdentifier(p) => {
                            self.reference(&p.binding.name);
                            if let Some(init) = &p.init {
                                self.expression(init)?;
                            }
                        }
                        AssignmentTargetProperty::AssignmentTargetPropertyProperty(p) => {
                            if p.computed
                                && let Some(key) = p.name.as_expression()
                            {
                                self.expression(key)?;
                            }
                            self.assignment_target_maybe_default(&p.binding)?;
                        }
                    }
                }
                if let Some(rest) = &obj.rest {
                    self.assignment_target(&rest.target)?;
                }
                Ok(())
            }
            other => match other.as_member_expression() {
                Some(member) => self.member(member),
                None => Ok(()),
            },
        }
    }

    fn assignment_target_maybe_default(&mut self, target: &AssignmentTargetMaybeDefault<'_>) -> CompileResult<()> {
        match target {
            AssignmentTargetMaybeDefault::AssignmentTargetWithDefault(d) => {
                self.assignment_target(&d.binding)?;
                self.expression(&d.init)
            }
            other => match other.as_assignment_target() {
                Some(target) => self.assignment_target(target),
                None => Ok(()),
            },
        }
    }

    fn member(&mut self, member: &MemberExpression<'_>) -> CompileResult<()> {
        match member {
            MemberExpression::StaticMemberExpression(m) => self.expression(&m.object),
            MemberExpression::ComputedMemberExpression(m) => {
                self.expression(&m.object)?;
                self.expression(&m.expression)
            }
            MemberExpression::PrivateFieldExpression(p) => self.expression(&p.object),
        }
    }

    fn function(&mut self, func: &Function<'_>, is_expression: bool) -> CompileResult<()> {
        let strict = self.strict.last().copied().unwrap_or(false)
            || func.body.as_ref().is_some_and(|b| has_use_strict(&b.directives));
        let key = (func.span.start, ScopeTag::Function);
        let mut frame = Frame::scope(key);
        frame.is_function = true;
        self.frames.push(frame);
        self.function_keys.push(key);
        self.strict.push(strict);
        self.result.functions.entry(key).or_default();

        if is_expression && let Some(id) = &func.id {
            self.declare(&id.name, BindingKind::Callee, id.span.end)?;
        }
        self.parameters(&func.params)?;
        if let Some(body) = &func.body {
            self.function_body(&body.statements)?;
        }

        self.strict.pop();
        self.function_keys.pop();
        self.pop_frame();
        Ok(())
    }

    fn parameters(&mut self, params: &FormalParameters<'_>) -> CompileResult<()> {
        for (index, param) in params.items.iter().enumerate() {
            let mut names = Vec::new();
            bound_names(&param.pattern, &mut names);
            for (name, span) in names {
                self.declare(&name, BindingKind::Parameter(index as u16), span.end)?;
            }
        }
        if let Some(rest) = &params.rest {
            let mut names = Vec::new();
            bound_names(&rest.rest.argument, &mut names);
            let index = params.items.len() as u16;
            for (name, span) in names {
                self.declare(&name, BindingKind::Parameter(index), span.end)?;
            }
        }
        for param in &params.items {
            self.pattern(&param.pattern)?;
            if let Some(initializer) = &param.initializer {
                self.expression(initializer)?;
            }
        }
        if let Some(rest) = &params.rest {
            self.pattern(&rest.rest.argument)?;
        }
        Ok(())
    }

    fn function_body(&mut self, statements: &[Statement<'_>]) -> CompileResult<()> {
        let mut vars = Vec::new();
        for stmt in statements {
            collect_var_names(stmt, &mut vars);
        }
        for (name, end) in vars {
            self.declare(&name, BindingKind::Var, end)?;
        }
        self.declare_lexical(statements)?;
        for stmt in statements {
            self.statement(stmt)?;
        }
        Ok(())
    }

    /// Class bodies are strict; the inner name is a const visible to every element
    fn class(&mut self, class: &Class<'_>) -> CompileResult<()> {
        self.frames.push(Frame::scope((class.span.start, ScopeTag::Class)));
        self.strict.push(true);
        if let Some(id) = &class.id {
            self.declare(&id.name, BindingKind::Const, id.span.end)?;
        }
        if let Some(heritage) = &class.super_class {
            self.expression(heritage)?;
        }
        for element in &class.body.body {
            match element {
                ClassElement::MethodDefinition(method) => {
                    if method.computed
                        && let Some(key) = method.key.as_expression()
                    {
                        self.expression(key)?;
                    }
                    self.function(&method.value, false)?;
                }
                ClassElement::PropertyDefinition(property) if property.computed => {
                    if let Some(key) = property.key.as_expression() {
                        self.expression(key)?;
                    }
                }
                _ => {}
            }
        }
        self.class_initializer(class, false)?;
        self.class_initializer(class, true)?;
        self.strict.pop();
        self.pop_frame();
        Ok(())
    }

    /// Field values (and static blocks) run inside synthetic initializer functions
    fn class_initializer(&mut self, class: &Class<'_>, is_static: bool) -> CompileResult<()> {
        let tag = if is_static {
            ScopeTag::StaticFields
        } else {
            ScopeTag::InstanceFields
        };
        let key = (class.span.start, tag);
        let mut frame = Frame::scope(key);
        frame.is_function = true;
        frame.is_arrow = true;
        self.frames.push(frame);
        self.function_keys.push(key);
        self.result.functions.entry(key).or_default();

        for element in &class.body.body {
            match element {
                ClassElement::PropertyDefinition(property) if property.r#static == is_static => {
                    if let Some(value) = &property.value {
                        self.expression(value)?;
                    }
                }
                ClassElement::StaticBlock(block) if is_static => {
                    let key = (block.span.start, ScopeTag::Function);
                    let mut frame = Frame::scope(key);
                    frame.is_function = true;
                    frame.is_arrow = true;
                    self.frames.push(frame);
                    self.function_keys.push(key);
                    self.result.functions.entry(key).or_default();
                    self.function_body(&block.body)?;
                    self.function_keys.pop();
                    self.pop_frame();
                }
                _ => {}
            }
        }

        self.function_keys.pop();
        self.pop_frame();
        Ok(())
    }

    fn arrow(&mut self, arrow: &ArrowFunctionExpression<'_>) -> CompileResult<()> {
        let strict = self.strict.last().copied().unwrap_or(false)
            || has_use_strict(&arrow.body.directives);
        let key = (arrow.span.start, ScopeTag::Function);
        let mut frame = Frame::scope(key);
        frame.is_function = true;
        frame.is_arrow = true;
        self.frames.push(frame);
        self.function_keys.push(key);
        self.strict.push(strict);
        self.result.functions.entry(key).or_default();

        self.parameters(&arrow.params)?;
        self.function_body(&arrow.body.statements)?;

        self.strict.pop();
        self.function_keys.pop();
        self.pop_frame();
        Ok(())
    }

    fn arguments(&mut self, arguments: &[Argument<'_>]) -> CompileResult<()> {
        for arg in arguments {
            match arg {
                Argument::SpreadElement(spread) => self.expression(&spread.argument)?,
                other => {
                    if let Some(expr) = other.as_expression() {
                        self.expression(expr)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn expression(&mut self, expr: &Expression<'_>) -> CompileResult<()> {
        match expr {
            Expression::Identifier(id) => {
                self.reference(&id.name);
                Ok(())
            }
            Expression::TemplateLiteral(t) => {
                for e in &t.expressions {
                    self.expression(e)?;
                }
                Ok(())
            }
            Expression::ArrayExpression(arr) => {
                for element in &arr.elements {
                    match element {
                        ArrayExpressionElement::SpreadElement(spread) => {
                            self.expression(&spread.argument)?
                        }
                        ArrayExpressionElement::Elision(_) => {}
                        other => {
                            if let Some(e) = other.as_expression() {
                                self.expression(e)?;
                            }
                        }
                    }
                }
                Ok(())
            }
            Expression::ObjectExpression(obj) => {
                for prop in &obj.properties {
                    match prop {
                        ObjectPropertyKind::ObjectProperty(p) => {
                            if p.computed
                                && let Some(key) = p.key.as_expression()
                            {
                                self.expression(key)?;
                            }
                            self.expression(&p.value)?;
                        }
                        ObjectPropertyKind::SpreadProperty(spread) => {
                            self.expression(&spread.argument)?
                        }
                    }
                }
                Ok(())
            }
            Expression::FunctionExpression(func) => self.function(func, true),
            Expression::ArrowFunctionExpression(arrow) => self.arrow(arrow),
            Expression::AssignmentExpression(assign) => {
                self.assignment_target(&assign.left)?;
                self.expression(&assign.right)
            }
            Expression::AwaitExpression(e) => self.expression(&e.argument),
            Expression::YieldExpression(e) => match &e.argument {
                Some(arg) => self.expression(arg),
                None => Ok(()),
            },
            Expression::BinaryExpression(e) => {
                self.expression(&e.left)?;
                self.expression(&e.right)
            }
            Expression::LogicalExpression(e) => {
                self.expression(&e.left)?;
                self.expression(&e.right)
            }
            Expression::ConditionalExpression(e) => {
                self.expression(&e.test)?;
                self.expression(&e.consequent)?;
                self.expression(&e.alternate)
            }
            Expression::UnaryExpression(e) => self.expression(&e.argument),
            Expression::UpdateExpression(e) => match &e.argument {
                SimpleAssignmentTarget::AssignmentTargetIdentifier(id) => {
                    self.reference(&id.name);
                    Ok(())
                }
                other => match other.as_member_expression() {
                    Some(member) => self.member(member),
                    None => Ok(()),
                },
            },
            Expression::SequenceExpression(seq) => {
                for e in &seq.expressions {
                    self.expression(e)?;
                }
                Ok(())
            }
            Expression::ParenthesizedExpression(e) => self.expression(&e.expression),
            Expression::CallExpression(call) => {
                if let Expression::Identifier(id) = &call.callee
                    && id.name.as_str() == "eval"
                {
                    self.direct_eval();
                }
                self.expression(&call.callee)?;
                self.arguments(&call.arguments)
            }
            Expression::NewExpression(new) => {
                self.expression(&new.callee)?;
                self.arguments(&new.arguments)
            }
            Expression::StaticMemberExpression(_)
            | Expression::ComputedMemberExpression(_)
            | Expression::PrivateFieldExpression(_) => match expr.as_member_expression() {
                Some(member) => self.member(member),
                None => Ok(()),
            },
            Expression::ChainExpression(chain) => match &chain.expression {
                ChainElement::CallExpression(call) => {
                    self.expression(&call.callee)?;
                    self.arguments(&call.arguments)
                }
                element => match element.as_member_expression() {
                    Some(member) => self.member(member),
                    None => Ok(()),
                },
            },
            Expression::TaggedTemplateExpression(t) => {
                self.expression(&t.tag)?;
                for e in &t.quasi.expressions {
                    self.expression(e)?;
                }
                Ok(())
            }
            Expression::ClassExpression(class) => self.class(class),
            _ => Ok(()),
        }
    }
}

/// Whether a directive prologue contains `"use strict"`
pub(crate) fn has_use_strict(directives: &[Directive<'_>]) -> bool {
    directives.iter().any(|d| d.directive.as_str() == "use strict")
}

/// 1-based line and column of a byte offset
pub(crate) fn line_column(source: &str, offset: u32) -> (u32, u32) {
    let offset = (offset as usize).min(source.len());
    let before = &source.as_bytes()[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() as u32 + 1;
    let line_start = before.iter().rposition(|&b| b == b'\n').map_or(0, |p| p + 1);
    (line, (offset - line_start) as u32 + 1)
}

/// Names bound by a pattern, with their spans
pub(crate) fn bound_names(pattern: &BindingPattern<'_>, out: &mut Vec<(String, Span)>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => out.push((id.name.to_string(), id.span)),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                bound_names(&prop.value, out);
            }
            if let Some(rest) = &obj.rest {
                bound_names(&rest.argument, out);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for element in arr.elements.iter().flatten() {
                bound_names(element, out);
            }
            if let Some(rest) = &arr.rest {
                bound_names(&rest.argument, out);
            }
        }
        BindingPattern::AssignmentPattern(assign) => bound_names(&assign.left, out),
    }
}

/// `var` names hoisted out of a statement, without entering nested functions
pub(crate) fn collect_var_names(stmt: &Statement<'_>, out: &mut Vec<(String, u32)>) {
    fn declaration(decl: &VariableDeclaration<'_>, out: &mut Vec<(String, u32)>) {
        if decl.kind != VariableDeclarationKind::Var {
            return;
        }
        for declarator in &decl.declarations {
            let mut names = Vec::new();
            bound_names(&declarator.id, &mut names);
            out.extend(names.into_iter().map(|(n, s)| (n, s.end)));
        }
    }

    match stmt {
        Statement::VariableDeclaration(decl) => declaration(decl, out),
        Statement::BlockStatement(block) => {
            for s in &block.body {
                collect_var_names(s, out);
            }
        }
        Statement::IfStatement(s) => {
            collect_var_names(&s.consequent, out);
            if let Some(alt) = &s.alternate {
                collect_var_names(alt, out);
            }
        }
        Statement::WhileStatement(s) => collect_var_names(&s.body, out),
        Statement::DoWhileStatement(s) => collect_var_names(&s.body, out),
        Statement::ForStatement(s) => {
            if let Some(ForStatementInit::VariableDeclaration(decl)) = &s.init {
                declaration(decl, out);
            }
            collect_var_names(&s.body, out);
        }
        Statement::ForInStatement(s) => {
            if let ForStatementLeft::VariableDeclaration(decl) = &s.left {
                declaration(decl, out);
            }
            collect_var_names(&s.body, out);
        }
        Statement::ForOfStatement(s) => {
            if let ForStatementLeft::VariableDeclaration(decl) = &s.left {
                declaration(decl, out);
            }
            collect_var_names(&s.body, out);
        }
        Statement::SwitchStatement(s) => {
            for case in &s.cases {
                for s in &case.consequent {
                    collect_var_names(s, out);
                }
            }
        }
        Statement::LabeledStatement(s) => collect_var_names(&s.body, out),
        Statement::TryStatement(s) => {
            for st in &s.block.body {
                collect_var_names(st, out);
            }
            if let Some(handler) = &s.handler {
                for st in &handler.body.body {
                    collect_var_names(st, out);
                }
            }
            if let Some(finalizer) = &s.finalizer {
                for st in &finalizer.body {
                    collect_var_names(st, out);
                }
            }
        }
        Statement::WithStatement(s) => collect_var_names(&s.body, out),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn analyze(source: &str) -> ScopeAnalysis {
        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, source, SourceType::default().with_module(false)).parse();
        assert!(parsed.errors.is_empty());
        Analyzer::new(source)
            .analyze(&parsed.program, CodeKind::Script, false)
            .unwrap()
    }

    fn function_names(analysis: &ScopeAnalysis, source: &str, needle: &str) -> Vec<(String, bool)> {
        let start = source.find(needle).unwrap() as u32;
        analysis
            .declarations((start, ScopeTag::Function))
            .iter()
            .map(|d| (d.name.clone(), d.captured))
            .collect()
    }

    #[test]
    fn test_captured_by_closure() {
        let src = "function outer(a, b) { var c = 1; return function () { return a + c; }; }";
        let analysis = analyze(src);
        let names = function_names(&analysis, src, "function outer");
        assert_eq!(
            names,
            vec![
                ("a".to_string(), true),
                ("b".to_string(), false),
                ("c".to_string(), true)
            ]
        );
    }

    #[test]
    fn test_direct_eval_captures_everything() {
        let src = "function f(x) { let y = 2; return eval('x + y'); }";
        let analysis = analyze(src);
        let names = function_names(&analysis, src, "function f");
        assert!(names.iter().all(|(_, captured)| *captured));
        assert!(names.iter().any(|(n, _)| n == "arguments"));
        let start = src.find("function f").unwrap() as u32;
        assert!(analysis.function((start, ScopeTag::Function)).has_direct_eval);
    }

    #[test]
    fn test_implicit_arguments() {
        let src = "function f() { return () => arguments[0]; }";
        let analysis = analyze(src);
        let names = function_names(&analysis, src, "function f");
        assert_eq!(names, vec![("arguments".to_string(), true)]);
        let start = src.find("function f").unwrap() as u32;
        assert!(analysis.function((start, ScopeTag::Function)).uses_arguments);
    }

    #[test]
    fn test_lexical_redeclaration_rejected() {
        let allocator = Allocator::default();
        let src = "function f() { let a = 1; var a; }";
        let parsed = Parser::new(&allocator, src, SourceType::default().with_module(false)).parse();
        let err = Analyzer::new(src)
            .analyze(&parsed.program, CodeKind::Script, false)
            .unwrap_err();
        assert!(err.is_syntax_error());
    }

    #[test]
    fn test_with_marks_reachable_bindings() {
        let src = "function f(o) { var x = 1; with (o) { x; } }";
        let analysis = analyze(src);
        let names = function_names(&analysis, src, "function f");
        assert!(names.contains(&("x".to_string(), true)));
        let start = src.find("function f").unwrap() as u32;
        assert!(analysis.function((start, ScopeTag::Function)).has_with);
    }

    #[test]
    fn test_program_and_leading_function_stay_apart() {
        let src = "function h() { return arguments.length } var g = 1;";
        let analysis = analyze(src);
        let program: Vec<_> = analysis
            .declarations((0, ScopeTag::Program))
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(program, vec!["g".to_string(), "h".to_string()]);
        let function = function_names(&analysis, src, "function h");
        assert_eq!(function, vec![("arguments".to_string(), false)]);
        assert!(analysis.function((0, ScopeTag::Function)).uses_arguments);
        assert!(!analysis.function((0, ScopeTag::Program)).uses_arguments);
    }

    #[test]
    fn test_class_inner_name_is_scoped_to_the_body() {
        let analysis = analyze("class A { m() { return A; } }");
        let inner = analysis.declarations((0, ScopeTag::Class));
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].kind, BindingKind::Const);
        assert!(inner[0].captured);
        let outer = analysis.declarations((0, ScopeTag::Program));
        assert!(outer.iter().any(|d| d.name == "A" && d.kind == BindingKind::Let));
    }

    #[test]
    fn test_field_initializers_capture_like_closures() {
        let src = "function f() { let k = 1; let j = 2; return class { x = k; static { j; } }; }";
        let analysis = analyze(src);
        let names = function_names(&analysis, src, "function f");
        assert_eq!(names, vec![("k".to_string(), true), ("j".to_string(), true)]);
    }

    #[test]
    fn test_line_column() {
        assert_eq!(line_column("a\nbc", 3), (2, 2));
        assert_eq!(line_column("abc", 0), (1, 1));
    }
}
