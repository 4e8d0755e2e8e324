//! Expression generation
//!
//! Every expression is evaluated into a destination register chosen by the caller.
//! Temporaries come from register scopes opened around each sub-evaluation, so the
//! operand stack never grows beyond the deepest expression nesting.

use oxc_ast::ast::*;
use oxc_span::GetSpan;
use skua_vm_bytecode::{ErrorKind, Instruction, JumpOffset, Register, TemplateSite};

use super::{BindMode, ByteCodeGenerator};
use crate::error::{CompileError, CompileResult};

/// Evaluated call target
enum Callee {
    Plain(Register),
    Method { func: Register, receiver: Register },
    Eval(Register),
}

impl ByteCodeGenerator {
    /// Evaluate `expr` into a register, reusing pooled literal registers
    ///
    /// The returned register may be read-only; never write to it.
    pub(super) fn operand(&mut self, expr: &Expression<'_>) -> CompileResult<Register> {
        match expr {
            Expression::NumericLiteral(lit) => {
                if let Some(reg) = self.current.numeral(lit.value) {
                    return Ok(reg);
                }
            }
            Expression::ThisExpression(_) => return Ok(self.load_this()),
            _ => {}
        }
        let dst = self.current.alloc()?;
        self.expression(expr, dst)?;
        Ok(dst)
    }

    /// Evaluate `expr` into `dst`, naming anonymous functions after `hint`
    pub(super) fn expression_named(
        &mut self,
        expr: &Expression<'_>,
        dst: Register,
        hint: Option<&str>,
    ) -> CompileResult<()> {
        match expr {
            Expression::FunctionExpression(func) if func.id.is_none() => {
                let index = self.compile_function_node(func, hint.map(str::to_string), false)?;
                self.create_function(dst, index);
                Ok(())
            }
            Expression::ArrowFunctionExpression(arrow) => {
                let index = self.compile_arrow(arrow, hint.map(str::to_string))?;
                self.create_function(dst, index);
                Ok(())
            }
            Expression::ClassExpression(class) if class.id.is_none() => self.class(class, dst, hint),
            Expression::ParenthesizedExpression(e) => self.expression_named(&e.expression, dst, hint),
            _ => self.expression(expr, dst),
        }
    }

    pub(super) fn expression(&mut self, expr: &Expression<'_>, dst: Register) -> CompileResult<()> {
        match expr {
            Expression::NullLiteral(_) => self.emit(Instruction::LoadNull { dst }),
            Expression::BooleanLiteral(lit) => {
                if lit.value {
                    self.emit(Instruction::LoadTrue { dst });
                } else {
                    self.emit(Instruction::LoadFalse { dst });
                }
            }
            Expression::NumericLiteral(lit) => self.load_number(lit.value, dst),
            Expression::StringLiteral(lit) => {
                let idx = self.current.string_constant(&lit.value);
                self.emit(Instruction::LoadConst { dst, idx });
            }
            Expression::TemplateLiteral(template) => self.template_literal(template, dst)?,
            Expression::Identifier(id) => self.load_binding(&id.name, dst, id.span.start)?,
            Expression::ThisExpression(_) => {
                let src = self.load_this();
                self.emit(Instruction::Move { dst, src });
            }
            Expression::ParenthesizedExpression(e) => self.expression(&e.expression, dst)?,
            Expression::SequenceExpression(seq) => {
                for e in &seq.expressions {
                    self.expression(e, dst)?;
                }
            }
            Expression::ArrayExpression(arr) => self.array_literal(arr, dst)?,
            Expression::ObjectExpression(obj) => self.object_literal(obj, dst)?,
            Expression::FunctionExpression(_) | Expression::ArrowFunctionExpression(_) => {
                self.expression_named(expr, dst, None)?
            }
            Expression::StaticMemberExpression(_)
            | Expression::ComputedMemberExpression(_)
            | Expression::PrivateFieldExpression(_) => {
                let Some(member) = expr.as_member_expression() else {
                    return Err(CompileError::internal("unexpected member expression"));
                };
                self.member_expression(member, dst)?
            }
            Expression::CallExpression(call) => self.call_expression(call, dst)?,
            Expression::NewExpression(new) => self.new_expression(new, dst)?,
            Expression::UnaryExpression(unary) => self.unary_expression(unary, dst)?,
            Expression::UpdateExpression(update) => self.update_expression(update, dst)?,
            Expression::BinaryExpression(binary) => self.with_registers(|g| {
                let lhs = g.operand(&binary.left)?;
                let rhs = g.operand(&binary.right)?;
                g.mark(binary.span.start);
                g.emit(binary_instruction(binary.operator, dst, lhs, rhs));
                Ok(())
            })?,
            Expression::LogicalExpression(logical) => {
                self.expression(&logical.left, dst)?;
                let end = self.short_circuit(logical.operator, dst)?;
                self.expression(&logical.right, dst)?;
                for jump in end {
                    self.current.patch_here(jump)?;
                }
            }
            Expression::ConditionalExpression(cond) => {
                let else_jump = self.with_registers(|g| {
                    let test = g.operand(&cond.test)?;
                    Ok(g.current.emit_jump(Instruction::JumpIfFalse {
                        cond: test,
                        offset: JumpOffset(0),
                    }))
                })?;
                self.expression(&cond.consequent, dst)?;
                let end_jump = self.jump_placeholder();
                self.current.patch_here(else_jump)?;
                self.expression(&cond.alternate, dst)?;
                self.current.patch_here(end_jump)?;
            }
            Expression::AssignmentExpression(assign) => self.assignment_expression(assign, dst)?,
            Expression::YieldExpression(y) => self.yield_expression(y, dst)?,
            Expression::AwaitExpression(a) => self.with_registers(|g| {
                let src = g.operand(&a.argument)?;
                g.mark(a.span.start);
                g.emit(Instruction::Await { dst, src });
                Ok(())
            })?,
            Expression::BigIntLiteral(lit) => return Err(self.unsupported("BigInt literal", lit.span.start)),
            Expression::RegExpLiteral(lit) => return Err(self.unsupported("regular expression literal", lit.span.start)),
            Expression::ClassExpression(class) => self.class(class, dst, None)?,
            Expression::ChainExpression(chain) => self.chain_expression(chain, dst)?,
            Expression::TaggedTemplateExpression(tagged) => self.tagged_template(tagged, dst)?,
            Expression::MetaProperty(meta) => {
                if meta.meta.name.as_str() != "new" || meta.property.name.as_str() != "target" {
                    return Err(self.unsupported("import.meta", meta.span.start));
                }
                self.emit(Instruction::LoadNewTarget { dst });
            }
            Expression::Super(s) => return Err(self.syntax_error("'super' keyword unexpected here", s.span.start)),
            other => return Err(self.unsupported("expression", other.span().start)),
        }
        Ok(())
    }

    fn load_number(&mut self, value: f64, dst: Register) {
        let is_int = value.fract() == 0.0
            && value >= i32::MIN as f64
            && value <= i32::MAX as f64
            && !(value == 0.0 && value.is_sign_negative());
        if is_int {
            self.emit(Instruction::LoadInt32 {
                dst,
                value: value as i32,
            });
        } else if let Some(src) = self.current.numeral(value) {
            self.emit(Instruction::Move { dst, src });
        } else {
            let idx = self.current.number_constant(value);
            self.emit(Instruction::LoadConst { dst, idx });
        }
    }

    /// Emit the conditional skip of a logical operator; returns jumps to patch
    /// at the end of the right-hand side
    fn short_circuit(&mut self, operator: LogicalOperator, value: Register) -> CompileResult<Vec<usize>> {
        Ok(match operator {
            LogicalOperator::And => vec![self.current.emit_jump(Instruction::JumpIfFalse {
                cond: value,
                offset: JumpOffset(0),
            })],
            LogicalOperator::Or => vec![self.current.emit_jump(Instruction::JumpIfTrue {
                cond: value,
                offset: JumpOffset(0),
            })],
            LogicalOperator::Coalesce => {
                let nullish = self.current.emit_jump(Instruction::JumpIfNullish {
                    src: value,
                    offset: JumpOffset(0),
                });
                let skip = self.jump_placeholder();
                // Fall into the right-hand side only for null/undefined
                self.current.patch_here(nullish)?;
                vec![skip]
            }
        })
    }

    fn member_expression(&mut self, member: &MemberExpression<'_>, dst: Register) -> CompileResult<()> {
        if is_super_member(member) {
            return self.with_registers(|g| {
                let key = g.super_key(member)?;
                g.mark(member.span().start);
                g.emit(Instruction::GetSuper { dst, key });
                Ok(())
            });
        }
        match member {
            MemberExpression::StaticMemberExpression(m) => self.with_registers(|g| {
                let obj = g.operand(&m.object)?;
                if m.optional {
                    g.optional_guard(obj);
                }
                let name = g.current.string_constant(&m.property.name);
                let ic_index = g.current.next_ic();
                g.mark(m.span.start);
                g.emit(Instruction::GetNamed {
                    dst,
                    obj,
                    name,
                    ic_index,
                });
                Ok(())
            }),
            MemberExpression::ComputedMemberExpression(m) => self.with_registers(|g| {
                let obj = g.operand(&m.object)?;
                if m.optional {
                    g.optional_guard(obj);
                }
                let key = g.operand(&m.expression)?;
                g.mark(m.span.start);
                g.emit(Instruction::GetKeyed { dst, obj, key });
                Ok(())
            }),
            MemberExpression::PrivateFieldExpression(p) => Err(self.unsupported("private name", p.span.start)),
        }
    }

    /// Key of `super.name` or `super[expr]`, as a property key
    fn super_key(&mut self, member: &MemberExpression<'_>) -> CompileResult<Register> {
        let key = self.current.alloc()?;
        match member {
            MemberExpression::StaticMemberExpression(m) => {
                let idx = self.current.string_constant(&m.property.name);
                self.emit(Instruction::LoadConst { dst: key, idx });
            }
            MemberExpression::ComputedMemberExpression(m) => {
                self.expression(&m.expression, key)?;
                self.emit(Instruction::ToPropertyKey { dst: key, src: key });
            }
            MemberExpression::PrivateFieldExpression(p) => return Err(self.unsupported("private name", p.span.start)),
        }
        Ok(key)
    }

    /// `a?.b.c(d)`: every optional link jumps to a shared exit producing `undefined`
    fn chain_expression(&mut self, chain: &ChainExpression<'_>, dst: Register) -> CompileResult<()> {
        let outer = std::mem::take(&mut self.chain_exits);
        let result = match &chain.expression {
            ChainElement::CallExpression(call) => self.call_expression(call, dst),
            ChainElement::TSNonNullExpression(e) => Err(self.unsupported("TypeScript syntax", e.span.start)),
            element => match element.as_member_expression() {
                Some(member) => self.member_expression(member, dst),
                None => Err(CompileError::internal("unexpected chain element")),
            },
        };
        let exits = std::mem::replace(&mut self.chain_exits, outer);
        result?;
        if !exits.is_empty() {
            let end = self.jump_placeholder();
            for exit in exits {
                self.current.patch_here(exit)?;
            }
            self.emit(Instruction::LoadUndefined { dst });
            self.current.patch_here(end)?;
        }
        Ok(())
    }

    /// Leave the enclosing optional chain when `value` is `null` or `undefined`
    fn optional_guard(&mut self, value: Register) {
        let exit = self.current.emit_jump(Instruction::JumpIfNullish {
            src: value,
            offset: JumpOffset(0),
        });
        self.chain_exits.push(exit);
    }

    fn template_literal(&mut self, template: &TemplateLiteral<'_>, dst: Register) -> CompileResult<()> {
        let cooked = |i: usize| -> CompileResult<&str> {
            template
                .quasis
                .get(i)
                .and_then(|q| q.value.cooked.as_ref())
                .map(|c| c.as_str())
                .ok_or_else(|| CompileError::Parse("invalid escape in template literal".into()))
        };
        let head = cooked(0)?;
        let idx = self.current.string_constant(head);
        self.emit(Instruction::LoadConst { dst, idx });
        for (i, expr) in template.expressions.iter().enumerate() {
            let tail = cooked(i + 1)?;
            self.with_registers(|g| {
                let part = g.current.alloc()?;
                g.expression(expr, part)?;
                g.emit(Instruction::ToString {
                    dst: part,
                    src: part,
                });
                g.emit(Instruction::Add {
                    dst,
                    lhs: dst,
                    rhs: part,
                });
                if !tail.is_empty() {
                    let idx = g.current.string_constant(tail);
                    g.emit(Instruction::LoadConst { dst: part, idx });
                    g.emit(Instruction::Add {
                        dst,
                        lhs: dst,
                        rhs: part,
                    });
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    /// ``tag`a${b}c` `` calls `tag` with the site's frozen strings array
    /// followed by the substitutions
    fn tagged_template(&mut self, tagged: &TaggedTemplateExpression<'_>, dst: Register) -> CompileResult<()> {
        self.with_registers(|g| {
            let (func, receiver) = match g.callee(&tagged.tag)? {
                Callee::Plain(func) | Callee::Eval(func) => (func, None),
                Callee::Method { func, receiver } => (func, Some(receiver)),
            };
            let quasi = &tagged.quasi;
            let site = TemplateSite {
                cooked: quasi
                    .quasis
                    .iter()
                    .map(|q| q.value.cooked.as_ref().map(|c| c.as_str().into()))
                    .collect(),
                raw: quasi.quasis.iter().map(|q| q.value.raw.as_str().into()).collect(),
            };
            let index = g.current.block.templates.len() as u32;
            g.current.block.templates.push(site);

            let argc = quasi.expressions.len() as u16 + 1;
            let args = g.current.alloc_range(argc)?;
            g.emit(Instruction::GetTemplateObject { dst: args, site: index });
            for (i, expr) in quasi.expressions.iter().enumerate() {
                g.expression(expr, args.offset(i as u16 + 1))?;
            }
            g.mark(tagged.span.start);
            g.emit(match receiver {
                Some(receiver) => Instruction::CallWithReceiver {
                    dst,
                    callee: func,
                    receiver,
                    args,
                    argc,
                },
                None => Instruction::Call {
                    dst,
                    callee: func,
                    args,
                    argc,
                },
            });
            Ok(())
        })
    }

    fn array_literal(&mut self, arr: &ArrayExpression<'_>, dst: Register) -> CompileResult<()> {
        // Built in a temporary so elements may still read the old value of `dst`
        self.with_registers(|g| {
            let array = g.current.alloc()?;
            g.emit(Instruction::NewArray {
                dst: array,
                capacity: arr.elements.len() as u32,
            });
            for element in &arr.elements {
                match element {
                    ArrayExpressionElement::Elision(_) => {
                        g.emit(Instruction::ArrayPushHole { arr: array });
                    }
                    ArrayExpressionElement::SpreadElement(spread) => g.with_registers(|g| {
                        let src = g.operand(&spread.argument)?;
                        g.mark(spread.span.start);
                        g.emit(Instruction::ArraySpread { arr: array, src });
                        Ok(())
                    })?,
                    other => {
                        let Some(expr) = other.as_expression() else {
                            return Err(CompileError::internal("unexpected array element"));
                        };
                        g.with_registers(|g| {
                            let src = g.operand(expr)?;
                            g.emit(Instruction::ArrayPush { arr: array, src });
                            Ok(())
                        })?;
                    }
                }
            }
            g.emit(Instruction::Move { dst, src: array });
            Ok(())
        })
    }

    fn object_literal(&mut self, obj: &ObjectExpression<'_>, dst: Register) -> CompileResult<()> {
        self.with_registers(|g| {
            let object = g.current.alloc()?;
            g.emit(Instruction::NewObject { dst: object });
            for property in &obj.properties {
                match property {
                    ObjectPropertyKind::ObjectProperty(prop) => g.with_registers(|g| g.object_property(object, prop))?,
                    ObjectPropertyKind::SpreadProperty(spread) => g.with_registers(|g| {
                        let src = g.operand(&spread.argument)?;
                        g.emit(Instruction::CopyDataProperties { dst: object, src });
                        Ok(())
                    })?,
                }
            }
            g.emit(Instruction::Move { dst, src: object });
            Ok(())
        })
    }

    fn object_property(&mut self, object: Register, prop: &ObjectProperty<'_>) -> CompileResult<()> {
        let static_name = if prop.computed {
            None
        } else {
            match &prop.key {
                PropertyKey::StaticIdentifier(id) => Some(id.name.to_string()),
                PropertyKey::StringLiteral(lit) => Some(lit.value.to_string()),
                _ => None,
            }
        };

        let value_of = |g: &mut Self, value: Register, hint: Option<&str>| -> CompileResult<()> {
            match &prop.value {
                Expression::FunctionExpression(func) if prop.method || prop.kind != PropertyKind::Init => {
                    let name = func.id.as_ref().map(|id| id.name.to_string()).or(hint.map(str::to_string));
                    let index = g.compile_function_node(func, name, true)?;
                    g.emit(Instruction::CreateMethod {
                        dst: value,
                        func: index,
                        home: object,
                    });
                    Ok(())
                }
                other => g.expression_named(other, value, hint),
            }
        };

        if prop.kind == PropertyKind::Init
            && let Some(name) = &static_name
        {
            let value = self.current.alloc()?;
            value_of(self, value, Some(name))?;
            let name = self.current.string_constant(name);
            let ic_index = self.current.next_ic();
            self.emit(Instruction::DefineOwnNamed {
                obj: object,
                name,
                src: value,
                ic_index,
            });
            return Ok(());
        }

        let key = self.current.alloc()?;
        match &static_name {
            Some(name) => {
                let idx = self.current.string_constant(name);
                self.emit(Instruction::LoadConst { dst: key, idx });
            }
            None => {
                let Some(expr) = prop.key.as_expression() else {
                    return Err(self.unsupported("private name", prop.span.start));
                };
                self.expression(expr, key)?;
                self.emit(Instruction::ToPropertyKey { dst: key, src: key });
            }
        }
        let value = self.current.alloc()?;
        let hint = match (prop.kind, static_name.as_deref()) {
            (PropertyKind::Get, Some(name)) => Some(format!("get {name}")),
            (PropertyKind::Set, Some(name)) => Some(format!("set {name}")),
            (_, name) => name.map(str::to_string),
        };
        value_of(self, value, hint.as_deref())?;
        match prop.kind {
            PropertyKind::Init => self.emit(Instruction::DefineOwnKeyed {
                obj: object,
                key,
                src: value,
            }),
            PropertyKind::Get => self.emit(Instruction::DefineGetter {
                obj: object,
                key,
                func: value,
            }),
            PropertyKind::Set => self.emit(Instruction::DefineSetter {
                obj: object,
                key,
                func: value,
            }),
        }
        Ok(())
    }

    // ==================== Calls ====================

    fn callee(&mut self, callee: &Expression<'_>) -> CompileResult<Callee> {
        match callee {
            Expression::Identifier(id) if id.name.as_str() == "eval" => {
                let func = self.current.alloc()?;
                self.load_binding("eval", func, id.span.start)?;
                Ok(Callee::Eval(func))
            }
            Expression::ParenthesizedExpression(e)
                if matches!(
                    e.expression,
                    Expression::StaticMemberExpression(_) | Expression::ComputedMemberExpression(_)
                ) =>
            {
                self.callee(&e.expression)
            }
            Expression::StaticMemberExpression(_) | Expression::ComputedMemberExpression(_)
                if callee.as_member_expression().is_some_and(is_super_member) =>
            {
                let Some(member) = callee.as_member_expression() else {
                    return Err(CompileError::internal("unexpected member expression"));
                };
                let receiver = self.current.alloc()?;
                let this = self.load_this();
                self.emit(Instruction::Move { dst: receiver, src: this });
                let func = self.current.alloc()?;
                self.with_registers(|g| {
                    let key = g.super_key(member)?;
                    g.mark(member.span().start);
                    g.emit(Instruction::GetSuper { dst: func, key });
                    Ok(())
                })?;
                Ok(Callee::Method { func, receiver })
            }
            Expression::StaticMemberExpression(m) => {
                let receiver = self.current.alloc()?;
                self.expression(&m.object, receiver)?;
                if m.optional {
                    self.optional_guard(receiver);
                }
                let func = self.current.alloc()?;
                let name = self.current.string_constant(&m.property.name);
                let ic_index = self.current.next_ic();
                self.mark(m.span.start);
                self.emit(Instruction::GetNamed {
                    dst: func,
                    obj: receiver,
                    name,
                    ic_index,
                });
                Ok(Callee::Method { func, receiver })
            }
            Expression::ComputedMemberExpression(m) => {
                let receiver = self.current.alloc()?;
                self.expression(&m.object, receiver)?;
                if m.optional {
                    self.optional_guard(receiver);
                }
                let func = self.current.alloc()?;
                self.with_registers(|g| {
                    let key = g.operand(&m.expression)?;
                    g.mark(m.span.start);
                    g.emit(Instruction::GetKeyed {
                        dst: func,
                        obj: receiver,
                        key,
                    });
                    Ok(())
                })?;
                Ok(Callee::Method { func, receiver })
            }
            other => {
                let func = self.current.alloc()?;
                self.expression(other, func)?;
                Ok(Callee::Plain(func))
            }
        }
    }

    /// Evaluate arguments into consecutive registers, or into an array when
    /// any argument is spread
    fn arguments(&mut self, arguments: &[Argument<'_>]) -> CompileResult<(Register, Option<u16>)> {
        let spread = arguments
            .iter()
            .any(|a| matches!(a, Argument::SpreadElement(_)));
        if spread {
            let array = self.current.alloc()?;
            self.emit(Instruction::NewArray {
                dst: array,
                capacity: arguments.len() as u32,
            });
            for arg in arguments {
                self.with_registers(|g| {
                    match arg {
                        Argument::SpreadElement(s) => {
                            let src = g.operand(&s.argument)?;
                            g.emit(Instruction::ArraySpread { arr: array, src });
                        }
                        other => {
                            let Some(expr) = other.as_expression() else {
                                return Err(CompileError::internal("unexpected argument"));
                            };
                            let src = g.operand(expr)?;
                            g.emit(Instruction::ArrayPush { arr: array, src });
                        }
                    }
                    Ok(())
                })?;
            }
            return Ok((array, None));
        }

        let argc = arguments.len() as u16;
        let args = self.current.alloc_range(argc)?;
        for (i, arg) in arguments.iter().enumerate() {
            let Some(expr) = arg.as_expression() else {
                return Err(CompileError::internal("unexpected argument"));
            };
            self.expression(expr, args.offset(i as u16))?;
        }
        Ok((args, Some(argc)))
    }

    fn call_expression(&mut self, call: &CallExpression<'_>, dst: Register) -> CompileResult<()> {
        if let Expression::Super(s) = &call.callee {
            return self.super_call(call, dst, s.span.start);
        }
        self.with_registers(|g| {
            let mut callee = g.callee(&call.callee)?;
            if call.optional {
                let func = match callee {
                    Callee::Plain(func) | Callee::Method { func, .. } => func,
                    // `eval?.()` is never a direct eval
                    Callee::Eval(func) => {
                        callee = Callee::Plain(func);
                        func
                    }
                };
                g.optional_guard(func);
            }
            let (args, argc) = g.arguments(&call.arguments)?;
            let strict = g.is_strict();
            g.mark(call.span.start);
            let instruction = match (callee, argc) {
                (Callee::Plain(func), Some(argc)) => Instruction::Call {
                    dst,
                    callee: func,
                    args,
                    argc,
                },
                (Callee::Method { func, receiver }, Some(argc)) => Instruction::CallWithReceiver {
                    dst,
                    callee: func,
                    receiver,
                    args,
                    argc,
                },
                (Callee::Eval(func), Some(argc)) => Instruction::CallEval {
                    dst,
                    callee: func,
                    args,
                    argc,
                    strict,
                },
                (Callee::Method { func, receiver }, None) => Instruction::CallSpread {
                    dst,
                    callee: func,
                    receiver,
                    array: args,
                },
                (Callee::Plain(func) | Callee::Eval(func), None) => {
                    let receiver = g.current.alloc()?;
                    g.emit(Instruction::LoadUndefined { dst: receiver });
                    Instruction::CallSpread {
                        dst,
                        callee: func,
                        receiver,
                        array: args,
                    }
                }
            };
            g.emit(instruction);
            Ok(())
        })
    }

    /// `super(...)` binds `this` of the running derived constructor
    fn super_call(&mut self, call: &CallExpression<'_>, dst: Register, offset: u32) -> CompileResult<()> {
        if !self.current.block.flags.is_derived_constructor {
            return Err(self.syntax_error("'super' keyword unexpected here", offset));
        }
        self.with_registers(|g| {
            let (args, argc) = g.arguments(&call.arguments)?;
            g.mark(call.span.start);
            match argc {
                Some(argc) => g.emit(Instruction::SuperCall { dst, args, argc }),
                None => g.emit(Instruction::SuperCallSpread { dst, array: args }),
            }
            Ok(())
        })
    }

    fn new_expression(&mut self, new: &NewExpression<'_>, dst: Register) -> CompileResult<()> {
        self.with_registers(|g| {
            let callee = g.current.alloc()?;
            g.expression(&new.callee, callee)?;
            let (args, argc) = g.arguments(&new.arguments)?;
            g.mark(new.span.start);
            match argc {
                Some(argc) => g.emit(Instruction::New {
                    dst,
                    callee,
                    args,
                    argc,
                }),
                None => g.emit(Instruction::NewSpread {
                    dst,
                    callee,
                    array: args,
                }),
            }
            Ok(())
        })
    }

    // ==================== Operators ====================

    fn unary_expression(&mut self, unary: &UnaryExpression<'_>, dst: Register) -> CompileResult<()> {
        match unary.operator {
            UnaryOperator::Typeof => {
                if let Expression::Identifier(id) = &unary.argument {
                    return self.typeof_identifier(&id.name, dst, id.span.start);
                }
                self.with_registers(|g| {
                    let src = g.operand(&unary.argument)?;
                    g.emit(Instruction::TypeOf { dst, src });
                    Ok(())
                })
            }
            UnaryOperator::Delete => self.delete_expression(&unary.argument, dst),
            UnaryOperator::Void => {
                self.expression(&unary.argument, dst)?;
                self.emit(Instruction::LoadUndefined { dst });
                Ok(())
            }
            op => self.with_registers(|g| {
                let src = g.operand(&unary.argument)?;
                g.emit(match op {
                    UnaryOperator::UnaryNegation => Instruction::Neg { dst, src },
                    UnaryOperator::UnaryPlus => Instruction::ToNumber { dst, src },
                    UnaryOperator::LogicalNot => Instruction::Not { dst, src },
                    _ => Instruction::BitNot { dst, src },
                });
                Ok(())
            }),
        }
    }

    fn typeof_identifier(&mut self, name: &str, dst: Register, offset: u32) -> CompileResult<()> {
        match self.resolve(name, offset)? {
            super::Access::Global { kind: None } => {
                let name = self.current.string_constant(name);
                self.emit(Instruction::TypeOfGlobal { dst, name });
            }
            super::Access::Dynamic => {
                let name = self.current.string_constant(name);
                self.emit(Instruction::TypeOfByName { dst, name });
            }
            _ => {
                self.load_binding(name, dst, offset)?;
                self.emit(Instruction::TypeOf { dst, src: dst });
            }
        }
        Ok(())
    }

    fn delete_expression(&mut self, argument: &Expression<'_>, dst: Register) -> CompileResult<()> {
        match argument {
            Expression::StaticMemberExpression(_) | Expression::ComputedMemberExpression(_) => {
                match argument.as_member_expression() {
                    Some(member) => self.delete_member(member, dst),
                    None => Err(CompileError::internal("unexpected member expression")),
                }
            }
            Expression::ChainExpression(chain) => {
                let Some(member) = chain.expression.as_member_expression() else {
                    self.expression(argument, dst)?;
                    self.emit(Instruction::LoadTrue { dst });
                    return Ok(());
                };
                let outer = std::mem::take(&mut self.chain_exits);
                let result = self.delete_member(member, dst);
                let exits = std::mem::replace(&mut self.chain_exits, outer);
                result?;
                if !exits.is_empty() {
                    let end = self.jump_placeholder();
                    for exit in exits {
                        self.current.patch_here(exit)?;
                    }
                    self.emit(Instruction::LoadTrue { dst });
                    self.current.patch_here(end)?;
                }
                Ok(())
            }
            Expression::Identifier(id) => {
                match self.resolve(&id.name, id.span.start)? {
                    super::Access::Global { kind: None } | super::Access::Dynamic => {
                        let name = self.current.string_constant(&id.name);
                        self.emit(Instruction::DeleteByName { dst, name });
                    }
                    _ => self.emit(Instruction::LoadFalse { dst }),
                }
                Ok(())
            }
            Expression::ParenthesizedExpression(e) => self.delete_expression(&e.expression, dst),
            other => {
                self.expression(other, dst)?;
                self.emit(Instruction::LoadTrue { dst });
                Ok(())
            }
        }
    }

    fn delete_member(&mut self, member: &MemberExpression<'_>, dst: Register) -> CompileResult<()> {
        if is_super_member(member) {
            // The key is still evaluated before the reference error
            return self.with_registers(|g| {
                g.load_this();
                g.super_key(member)?;
                let message = g.current.string_constant("Unsupported reference to 'super'");
                g.mark(member.span().start);
                g.emit(Instruction::ThrowError {
                    kind: ErrorKind::ReferenceError,
                    message,
                });
                g.emit(Instruction::LoadTrue { dst });
                Ok(())
            });
        }
        let strict = self.is_strict();
        self.with_registers(|g| {
            let (obj, key, offset) = match member {
                MemberExpression::StaticMemberExpression(m) => {
                    let obj = g.operand(&m.object)?;
                    if m.optional {
                        g.optional_guard(obj);
                    }
                    let key = g.current.alloc()?;
                    let idx = g.current.string_constant(&m.property.name);
                    g.emit(Instruction::LoadConst { dst: key, idx });
                    (obj, key, m.span.start)
                }
                MemberExpression::ComputedMemberExpression(m) => {
                    let obj = g.operand(&m.object)?;
                    if m.optional {
                        g.optional_guard(obj);
                    }
                    (obj, g.operand(&m.expression)?, m.span.start)
                }
                MemberExpression::PrivateFieldExpression(p) => {
                    return Err(g.unsupported("private name", p.span.start));
                }
            };
            g.mark(offset);
            g.emit(Instruction::DeleteKeyed {
                dst,
                obj,
                key,
                strict,
            });
            Ok(())
        })
    }

    fn update_expression(&mut self, update: &UpdateExpression<'_>, dst: Register) -> CompileResult<()> {
        let step = |value: Register, src: Register| match update.operator {
            UpdateOperator::Increment => Instruction::Inc { dst: value, src },
            UpdateOperator::Decrement => Instruction::Dec { dst: value, src },
        };
        let prefix = update.prefix;

        // Leaves the updated value in `new_value` and the expression result in `dst`
        let apply = |g: &mut Self, old: Register| -> CompileResult<Register> {
            if prefix {
                g.emit(step(dst, old));
                Ok(dst)
            } else {
                g.emit(Instruction::ToNumeric { dst, src: old });
                let new_value = g.current.alloc()?;
                g.emit(step(new_value, dst));
                Ok(new_value)
            }
        };

        if let Some(member) = update.argument.as_member_expression()
            && is_super_member(member)
        {
            let strict = self.is_strict();
            return self.with_registers(|g| {
                let key = g.super_key(member)?;
                let old = g.current.alloc()?;
                g.mark(member.span().start);
                g.emit(Instruction::GetSuper { dst: old, key });
                let new_value = apply(g, old)?;
                g.emit(Instruction::SetSuper {
                    key,
                    src: new_value,
                    strict,
                });
                Ok(())
            });
        }

        match &update.argument {
            SimpleAssignmentTarget::AssignmentTargetIdentifier(id) => self.with_registers(|g| {
                let old = g.current.alloc()?;
                g.load_binding(&id.name, old, id.span.start)?;
                let new_value = apply(g, old)?;
                g.store_binding(&id.name, new_value, BindMode::Assign, id.span.start)
            }),
            SimpleAssignmentTarget::StaticMemberExpression(m) => self.with_registers(|g| {
                let obj = g.current.alloc()?;
                g.expression(&m.object, obj)?;
                let name = g.current.string_constant(&m.property.name);
                let old = g.current.alloc()?;
                let get_ic = g.current.next_ic();
                g.mark(m.span.start);
                g.emit(Instruction::GetNamed {
                    dst: old,
                    obj,
                    name,
                    ic_index: get_ic,
                });
                let new_value = apply(g, old)?;
                let ic_index = g.current.next_ic();
                let strict = g.is_strict();
                g.emit(Instruction::SetNamed {
                    obj,
                    name,
                    src: new_value,
                    ic_index,
                    strict,
                });
                Ok(())
            }),
            SimpleAssignmentTarget::ComputedMemberExpression(m) => self.with_registers(|g| {
                let obj = g.current.alloc()?;
                g.expression(&m.object, obj)?;
                let key = g.current.alloc()?;
                g.expression(&m.expression, key)?;
                g.emit(Instruction::ToPropertyKey { dst: key, src: key });
                let old = g.current.alloc()?;
                g.mark(m.span.start);
                g.emit(Instruction::GetKeyed { dst: old, obj, key });
                let new_value = apply(g, old)?;
                let strict = g.is_strict();
                g.emit(Instruction::SetKeyed {
                    obj,
                    key,
                    src: new_value,
                    strict,
                });
                Ok(())
            }),
            _ => Err(CompileError::InvalidAssignmentTarget),
        }
    }

    fn assignment_expression(&mut self, assign: &AssignmentExpression<'_>, dst: Register) -> CompileResult<()> {
        let operator = assign.operator;
        let logical = logical_operator(operator);
        let strict = self.is_strict();

        if let Some(member) = assign.left.as_member_expression()
            && is_super_member(member)
        {
            return self.with_registers(|g| {
                let key = g.super_key(member)?;
                let mut end = Vec::new();
                if operator != AssignmentOperator::Assign {
                    g.mark(member.span().start);
                    g.emit(Instruction::GetSuper { dst, key });
                }
                match logical {
                    Some(logical) => {
                        end = g.short_circuit(logical, dst)?;
                        g.expression(&assign.right, dst)?;
                    }
                    None if operator == AssignmentOperator::Assign => g.expression(&assign.right, dst)?,
                    None => g.with_registers(|g| {
                        let rhs = g.operand(&assign.right)?;
                        g.emit(compound_instruction(operator, dst, rhs)?);
                        Ok(())
                    })?,
                }
                g.mark(member.span().start);
                g.emit(Instruction::SetSuper { key, src: dst, strict });
                for jump in end {
                    g.current.patch_here(jump)?;
                }
                Ok(())
            });
        }

        match &assign.left {
            AssignmentTarget::AssignmentTargetIdentifier(id) => {
                let name = id.name.as_str();
                let offset = id.span.start;
                if operator == AssignmentOperator::Assign {
                    self.expression_named(&assign.right, dst, Some(name))?;
                    return self.store_binding(name, dst, BindMode::Assign, offset);
                }
                self.load_binding(name, dst, offset)?;
                if let Some(logical) = logical {
                    let end = self.short_circuit(logical, dst)?;
                    self.expression_named(&assign.right, dst, Some(name))?;
                    self.store_binding(name, dst, BindMode::Assign, offset)?;
                    for jump in end {
                        self.current.patch_here(jump)?;
                    }
                    return Ok(());
                }
                self.with_registers(|g| {
                    let rhs = g.operand(&assign.right)?;
                    g.emit(compound_instruction(operator, dst, rhs)?);
                    Ok(())
                })?;
                self.store_binding(name, dst, BindMode::Assign, offset)
            }
            AssignmentTarget::StaticMemberExpression(m) => self.with_registers(|g| {
                let obj = g.current.alloc()?;
                g.expression(&m.object, obj)?;
                let name = g.current.string_constant(&m.property.name);
                let mut end = Vec::new();
                if operator != AssignmentOperator::Assign {
                    let ic_index = g.current.next_ic();
                    g.mark(m.span.start);
                    g.emit(Instruction::GetNamed {
                        dst,
                        obj,
                        name,
                        ic_index,
                    });
                }
                match logical {
                    Some(logical) => {
                        end = g.short_circuit(logical, dst)?;
                        g.expression(&assign.right, dst)?;
                    }
                    None if operator == AssignmentOperator::Assign => g.expression(&assign.right, dst)?,
                    None => g.with_registers(|g| {
                        let rhs = g.operand(&assign.right)?;
                        g.emit(compound_instruction(operator, dst, rhs)?);
                        Ok(())
                    })?,
                }
                let ic_index = g.current.next_ic();
                g.mark(m.span.start);
                g.emit(Instruction::SetNamed {
                    obj,
                    name,
                    src: dst,
                    ic_index,
                    strict,
                });
                for jump in end {
                    g.current.patch_here(jump)?;
                }
                Ok(())
            }),
            AssignmentTarget::ComputedMemberExpression(m) => self.with_registers(|g| {
                let obj = g.current.alloc()?;
                g.expression(&m.object, obj)?;
                let key = g.current.alloc()?;
                g.expression(&m.expression, key)?;
                let mut end = Vec::new();
                if operator != AssignmentOperator::Assign {
                    g.emit(Instruction::ToPropertyKey { dst: key, src: key });
                    g.mark(m.span.start);
                    g.emit(Instruction::GetKeyed { dst, obj, key });
                }
                match logical {
                    Some(logical) => {
                        end = g.short_circuit(logical, dst)?;
                        g.expression(&assign.right, dst)?;
                    }
                    None if operator == AssignmentOperator::Assign => g.expression(&assign.right, dst)?,
                    None => g.with_registers(|g| {
                        let rhs = g.operand(&assign.right)?;
                        g.emit(compound_instruction(operator, dst, rhs)?);
                        Ok(())
                    })?,
                }
                g.mark(m.span.start);
                g.emit(Instruction::SetKeyed {
                    obj,
                    key,
                    src: dst,
                    strict,
                });
                for jump in end {
                    g.current.patch_here(jump)?;
                }
                Ok(())
            }),
            AssignmentTarget::ArrayAssignmentTarget(_) | AssignmentTarget::ObjectAssignmentTarget(_) => {
                // The pattern may overwrite `dst` through a binding, so it reads a copy
                self.with_registers(|g| {
                    let value = g.current.alloc()?;
                    g.expression(&assign.right, value)?;
                    g.assign_to_target(&assign.left, value)?;
                    g.emit(Instruction::Move { dst, src: value });
                    Ok(())
                })
            }
            other => Err(self.unsupported("assignment target", other.span().start)),
        }
    }

    /// Store `value` into an assignment target (loop heads, destructuring)
    pub(super) fn assign_to_target(&mut self, target: &AssignmentTarget<'_>, value: Register) -> CompileResult<()> {
        let strict = self.is_strict();
        if let Some(member) = target.as_member_expression()
            && is_super_member(member)
        {
            return self.with_registers(|g| {
                let key = g.super_key(member)?;
                g.emit(Instruction::SetSuper { key, src: value, strict });
                Ok(())
            });
        }
        match target {
            AssignmentTarget::AssignmentTargetIdentifier(id) => {
                self.store_binding(&id.name, value, BindMode::Assign, id.span.start)
            }
            AssignmentTarget::StaticMemberExpression(m) => self.with_registers(|g| {
                let obj = g.operand(&m.object)?;
                let name = g.current.string_constant(&m.property.name);
                let ic_index = g.current.next_ic();
                g.emit(Instruction::SetNamed {
                    obj,
                    name,
                    src: value,
                    ic_index,
                    strict,
                });
                Ok(())
            }),
            AssignmentTarget::ComputedMemberExpression(m) => self.with_registers(|g| {
                let obj = g.operand(&m.object)?;
                let key = g.operand(&m.expression)?;
                g.emit(Instruction::SetKeyed {
                    obj,
                    key,
                    src: value,
                    strict,
                });
                Ok(())
            }),
            AssignmentTarget::ArrayAssignmentTarget(array) => self.array_assignment(array, value),
            AssignmentTarget::ObjectAssignmentTarget(object) => self.object_assignment(object, value),
            other => Err(self.unsupported("assignment target", other.span().start)),
        }
    }

    // ==================== Generators ====================

    fn yield_expression(&mut self, y: &YieldExpression<'_>, dst: Register) -> CompileResult<()> {
        if !self.current.block.flags.is_generator {
            return Err(self.syntax_error("yield outside of a generator", y.span.start));
        }
        let is_async = self.current.block.flags.is_async;
        self.with_registers(|g| {
            if y.delegate && is_async {
                return Err(g.unsupported("yield* in async generator", y.span.start));
            }
            if y.delegate {
                let Some(argument) = &y.argument else {
                    return Err(CompileError::Parse("yield* requires an operand".into()));
                };
                let iterable = g.operand(argument)?;
                let iter = g.current.alloc()?;
                g.mark(y.span.start);
                g.emit(Instruction::GetIterator {
                    dst: iter,
                    src: iterable,
                });
                g.emit(Instruction::YieldDelegate { dst, iter });
                return Ok(());
            }
            let src = match &y.argument {
                Some(argument) => g.operand(argument)?,
                None => {
                    let tmp = g.current.alloc()?;
                    g.emit(Instruction::LoadUndefined { dst: tmp });
                    tmp
                }
            };
            g.mark(y.span.start);
            if is_async {
                // Async generators yield the settled value
                let awaited = g.current.alloc()?;
                g.emit(Instruction::Await { dst: awaited, src });
                g.emit(Instruction::Yield { dst, src: awaited });
                return Ok(());
            }
            g.emit(Instruction::Yield { dst, src });
            Ok(())
        })
    }
}

fn is_super_member(member: &MemberExpression<'_>) -> bool {
    matches!(member.object(), Expression::Super(_))
}

fn binary_instruction(op: BinaryOperator, dst: Register, lhs: Register, rhs: Register) -> Instruction {
    match op {
        BinaryOperator::Addition => Instruction::Add { dst, lhs, rhs },
        BinaryOperator::Subtraction => Instruction::Sub { dst, lhs, rhs },
        BinaryOperator::Multiplication => Instruction::Mul { dst, lhs, rhs },
        BinaryOperator::Division => Instruction::Div { dst, lhs, rhs },
        BinaryOperator::Remainder => Instruction::Mod { dst, lhs, rhs },
        BinaryOperator::Exponential => Instruction::Exp { dst, lhs, rhs },
        BinaryOperator::LessThan => Instruction::Lt { dst, lhs, rhs },
        BinaryOperator::LessEqualThan => Instruction::Le { dst, lhs, rhs },
        BinaryOperator::GreaterThan => Instruction::Gt { dst, lhs, rhs },
        BinaryOperator::GreaterEqualThan => Instruction::Ge { dst, lhs, rhs },
        BinaryOperator::Equality => Instruction::Eq { dst, lhs, rhs },
        BinaryOperator::Inequality => Instruction::Ne { dst, lhs, rhs },
        BinaryOperator::StrictEquality => Instruction::StrictEq { dst, lhs, rhs },
        BinaryOperator::StrictInequality => Instruction::StrictNe { dst, lhs, rhs },
        BinaryOperator::BitwiseAnd => Instruction::BitAnd { dst, lhs, rhs },
        BinaryOperator::BitwiseOR => Instruction::BitOr { dst, lhs, rhs },
        BinaryOperator::BitwiseXOR => Instruction::BitXor { dst, lhs, rhs },
        BinaryOperator::ShiftLeft => Instruction::Shl { dst, lhs, rhs },
        BinaryOperator::ShiftRight => Instruction::Shr { dst, lhs, rhs },
        BinaryOperator::ShiftRightZeroFill => Instruction::Ushr { dst, lhs, rhs },
        BinaryOperator::In => Instruction::In {
            dst,
            key: lhs,
            obj: rhs,
        },
        BinaryOperator::Instanceof => Instruction::InstanceOf { dst, lhs, rhs },
    }
}

fn logical_operator(op: AssignmentOperator) -> Option<LogicalOperator> {
    match op {
        AssignmentOperator::LogicalAnd => Some(LogicalOperator::And),
        AssignmentOperator::LogicalOr => Some(LogicalOperator::Or),
        AssignmentOperator::LogicalNullish => Some(LogicalOperator::Coalesce),
        _ => None,
    }
}

/// `target op= rhs` with the current value already in `target`
fn compound_instruction(op: AssignmentOperator, target: Register, rhs: Register) -> CompileResult<Instruction> {
    let binary = match op {
        AssignmentOperator::Addition => BinaryOperator::Addition,
        AssignmentOperator::Subtraction => BinaryOperator::Subtraction,
        AssignmentOperator::Multiplication => BinaryOperator::Multiplication,
        AssignmentOperator::Division => BinaryOperator::Division,
        AssignmentOperator::Remainder => BinaryOperator::Remainder,
        AssignmentOperator::Exponential => BinaryOperator::Exponential,
        AssignmentOperator::ShiftLeft => BinaryOperator::ShiftLeft,
        AssignmentOperator::ShiftRight => BinaryOperator::ShiftRight,
        AssignmentOperator::ShiftRightZeroFill => BinaryOperator::ShiftRightZeroFill,
        AssignmentOperator::BitwiseOR => BinaryOperator::BitwiseOR,
        AssignmentOperator::BitwiseXOR => BinaryOperator::BitwiseXOR,
        AssignmentOperator::BitwiseAnd => BinaryOperator::BitwiseAnd,
        _ => return Err(CompileError::internal("not a compound assignment")),
    };
    Ok(binary_instruction(binary, target, target, rhs))
}
