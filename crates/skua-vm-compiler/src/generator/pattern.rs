//! Destructuring patterns
//!
//! Binding patterns (declarations, parameters, catch parameters) initialize or
//! assign names; assignment patterns (`[a, b.c] = v`) store into arbitrary
//! targets. Both walk the value the same way.

use oxc_ast::ast::*;
use skua_vm_bytecode::{Instruction, JumpOffset, Register};

use super::{BindMode, ByteCodeGenerator};
use crate::error::{CompileError, CompileResult};

impl ByteCodeGenerator {
    /// Bind `value` to every name of `pattern`
    pub(super) fn bind_pattern(
        &mut self,
        pattern: &BindingPattern<'_>,
        value: Register,
        mode: BindMode,
    ) -> CompileResult<()> {
        match pattern {
            BindingPattern::BindingIdentifier(id) => {
                self.store_binding(&id.name, value, mode, id.span.start)
            }
            BindingPattern::AssignmentPattern(assign) => self.with_registers(|g| {
                let tmp = g.current.alloc()?;
                g.emit(Instruction::Move { dst: tmp, src: value });
                let skip = g.current.emit_jump(Instruction::JumpIfNotUndefined {
                    src: tmp,
                    offset: JumpOffset(0),
                });
                let hint = match &assign.left {
                    BindingPattern::BindingIdentifier(id) => Some(id.name.as_str()),
                    _ => None,
                };
                g.expression_named(&assign.right, tmp, hint)?;
                g.current.patch_here(skip)?;
                g.bind_pattern(&assign.left, tmp, mode)
            }),
            BindingPattern::ObjectPattern(object) => self.object_pattern(object, value, mode),
            BindingPattern::ArrayPattern(array) => self.array_pattern(array, value, mode),
        }
    }

    fn object_pattern(
        &mut self,
        pattern: &ObjectPattern<'_>,
        value: Register,
        mode: BindMode,
    ) -> CompileResult<()> {
        self.with_registers(|g| {
            let rest_keys = match &pattern.rest {
                Some(_) => Some(g.current.alloc_range(pattern.properties.len() as u16)?),
                None => None,
            };

            for (i, property) in pattern.properties.iter().enumerate() {
                g.with_registers(|g| {
                    let element = g.current.alloc()?;
                    let static_name = match &property.key {
                        PropertyKey::StaticIdentifier(id) if !property.computed => Some(id.name.as_str()),
                        PropertyKey::StringLiteral(lit) if !property.computed => Some(lit.value.as_str()),
                        _ => None,
                    };
                    match static_name {
                        Some(name) if rest_keys.is_none() => {
                            let name = g.current.string_constant(name);
                            let ic_index = g.current.next_ic();
                            g.emit(Instruction::GetNamed {
                                dst: element,
                                obj: value,
                                name,
                                ic_index,
                            });
                        }
                        _ => {
                            let key = match rest_keys {
                                Some(keys) => keys.offset(i as u16),
                                None => g.current.alloc()?,
                            };
                            match static_name {
                                Some(name) => {
                                    let idx = g.current.string_constant(name);
                                    g.emit(Instruction::LoadConst { dst: key, idx });
                                }
                                None => {
                                    let Some(expr) = property.key.as_expression() else {
                                        return Err(CompileError::internal("unexpected pattern key"));
                                    };
                                    g.expression(expr, key)?;
                                    g.emit(Instruction::ToPropertyKey { dst: key, src: key });
                                }
                            }
                            g.emit(Instruction::GetKeyed {
                                dst: element,
                                obj: value,
                                key,
                            });
                        }
                    }
                    g.bind_pattern(&property.value, element, mode)
                })?;
            }

            if let Some(rest) = &pattern.rest {
                let target = g.current.alloc()?;
                g.emit(Instruction::NewObject { dst: target });
                let excluded = rest_keys.unwrap_or(target);
                g.emit(Instruction::CopyRestProperties {
                    dst: target,
                    src: value,
                    excluded,
                    excluded_count: pattern.properties.len() as u16,
                });
                g.bind_pattern(&rest.argument, target, mode)?;
            }
            Ok(())
        })
    }

    fn array_pattern(
        &mut self,
        pattern: &ArrayPattern<'_>,
        value: Register,
        mode: BindMode,
    ) -> CompileResult<()> {
        self.with_registers(|g| {
            let iter = g.current.alloc()?;
            g.emit(Instruction::GetIterator {
                dst: iter,
                src: value,
            });
            let element = g.current.alloc()?;

            for item in &pattern.elements {
                let step = g.current.emit_jump(Instruction::IteratorStep {
                    dst: element,
                    iter,
                    done: JumpOffset(0),
                });
                let Some(item) = item else {
                    g.current.patch_here(step)?;
                    continue;
                };
                let bind = g.jump_placeholder();
                g.current.patch_here(step)?;
                g.emit(Instruction::LoadUndefined { dst: element });
                g.current.patch_here(bind)?;
                g.bind_pattern(item, element, mode)?;
            }

            if let Some(rest) = &pattern.rest {
                let array = g.current.alloc()?;
                g.emit(Instruction::NewArray {
                    dst: array,
                    capacity: 0,
                });
                let start = g.current.current_index();
                let done = g.current.emit_jump(Instruction::IteratorStep {
                    dst: element,
                    iter,
                    done: JumpOffset(0),
                });
                g.emit(Instruction::ArrayPush {
                    arr: array,
                    src: element,
                });
                g.current.emit_loop(start);
                g.current.patch_here(done)?;
                g.bind_pattern(&rest.argument, array, mode)?;
            }

            g.emit(Instruction::IteratorClose { iter });
            Ok(())
        })
    }

    /// `[a, , b = 1, ...rest] = value`
    pub(super) fn array_assignment(&mut self, pattern: &ArrayAssignmentTarget<'_>, value: Register) -> CompileResult<()> {
        self.with_registers(|g| {
            let iter = g.current.alloc()?;
            g.emit(Instruction::GetIterator {
                dst: iter,
                src: value,
            });
            let element = g.current.alloc()?;

            for item in &pattern.elements {
                let step = g.current.emit_jump(Instruction::IteratorStep {
                    dst: element,
                    iter,
                    done: JumpOffset(0),
                });
                let Some(item) = item else {
                    g.current.patch_here(step)?;
                    continue;
                };
                let assign = g.jump_placeholder();
                g.current.patch_here(step)?;
                g.emit(Instruction::LoadUndefined { dst: element });
                g.current.patch_here(assign)?;
                g.assign_maybe_default(item, element)?;
            }

            if let Some(rest) = &pattern.rest {
                let array = g.current.alloc()?;
                g.emit(Instruction::NewArray {
                    dst: array,
                    capacity: 0,
                });
                let start = g.current.current_index();
                let done = g.current.emit_jump(Instruction::IteratorStep {
                    dst: element,
                    iter,
                    done: JumpOffset(0),
                });
                g.emit(Instruction::ArrayPush {
                    arr: array,
                    src: element,
                });
                g.current.emit_loop(start);
                g.current.patch_here(done)?;
                g.assign_to_target(&rest.target, array)?;
            }

            g.emit(Instruction::IteratorClose { iter });
            Ok(())
        })
    }

    /// `({ a, b: c.d = 1, [k]: e, ...rest } = value)`
    pub(super) fn object_assignment(
        &mut self,
        pattern: &ObjectAssignmentTarget<'_>,
        value: Register,
    ) -> CompileResult<()> {
        self.with_registers(|g| {
            let rest_keys = match &pattern.rest {
                Some(_) => Some(g.current.alloc_range(pattern.properties.len() as u16)?),
                None => None,
            };

            for (i, property) in pattern.properties.iter().enumerate() {
                g.with_registers(|g| {
                    let element = g.current.alloc()?;
                    let key = rest_keys.map(|keys| keys.offset(i as u16));
                    match property {
                        AssignmentTargetProperty::AssignmentTargetPropertyIdentifier(shorthand) => {
                            let name = shorthand.binding.name.as_str();
                            g.load_property(value, element, key, PropertyName::Static(name))?;
                            if let Some(init) = &shorthand.init {
                                let skip = g.current.emit_jump(Instruction::JumpIfNotUndefined {
                                    src: element,
                                    offset: JumpOffset(0),
                                });
                                g.expression_named(init, element, Some(name))?;
                                g.current.patch_here(skip)?;
                            }
                            g.store_binding(name, element, BindMode::Assign, shorthand.binding.span.start)
                        }
                        AssignmentTargetProperty::AssignmentTargetPropertyProperty(prop) => {
                            let name = match &prop.name {
                                PropertyKey::StaticIdentifier(id) if !prop.computed => {
                                    PropertyName::Static(id.name.as_str())
                                }
                                PropertyKey::StringLiteral(lit) if !prop.computed => {
                                    PropertyName::Static(lit.value.as_str())
                                }
                                other => match other.as_expression() {
                                    Some(expr) => PropertyName::Computed(expr),
                                    None => return Err(g.unsupported("private name", prop.span.start)),
                                },
                            };
                            g.load_property(value, element, key, name)?;
                            g.assign_maybe_default(&prop.binding, element)
                        }
                    }
                })?;
            }

            if let Some(rest) = &pattern.rest {
                let target = g.current.alloc()?;
                g.emit(Instruction::NewObject { dst: target });
                let excluded = rest_keys.unwrap_or(target);
                g.emit(Instruction::CopyRestProperties {
                    dst: target,
                    src: value,
                    excluded,
                    excluded_count: pattern.properties.len() as u16,
                });
                g.assign_to_target(&rest.target, target)?;
            }
            Ok(())
        })
    }

    fn assign_maybe_default(&mut self, target: &AssignmentTargetMaybeDefault<'_>, value: Register) -> CompileResult<()> {
        match target {
            AssignmentTargetMaybeDefault::AssignmentTargetWithDefault(with_default) => self.with_registers(|g| {
                let tmp = g.current.alloc()?;
                g.emit(Instruction::Move { dst: tmp, src: value });
                let skip = g.current.emit_jump(Instruction::JumpIfNotUndefined {
                    src: tmp,
                    offset: JumpOffset(0),
                });
                let hint = match &with_default.binding {
                    AssignmentTarget::AssignmentTargetIdentifier(id) => Some(id.name.as_str()),
                    _ => None,
                };
                g.expression_named(&with_default.init, tmp, hint)?;
                g.current.patch_here(skip)?;
                g.assign_to_target(&with_default.binding, tmp)
            }),
            other => match other.as_assignment_target() {
                Some(target) => self.assign_to_target(target, value),
                None => Err(CompileError::internal("unexpected assignment target")),
            },
        }
    }

    /// Read one property of a destructured object into `dst`
    ///
    /// When the pattern has a rest element the key is kept in `key` so the
    /// rest copy can exclude it.
    fn load_property(
        &mut self,
        object: Register,
        dst: Register,
        key: Option<Register>,
        name: PropertyName<'_, '_>,
    ) -> CompileResult<()> {
        match (name, key) {
            (PropertyName::Static(name), None) => {
                let name = self.current.string_constant(name);
                let ic_index = self.current.next_ic();
                self.emit(Instruction::GetNamed {
                    dst,
                    obj: object,
                    name,
                    ic_index,
                });
            }
            (name, key) => {
                let key = match key {
                    Some(key) => key,
                    None => self.current.alloc()?,
                };
                match name {
                    PropertyName::Static(name) => {
                        let idx = self.current.string_constant(name);
                        self.emit(Instruction::LoadConst { dst: key, idx });
                    }
                    PropertyName::Computed(expr) => {
                        self.expression(expr, key)?;
                        self.emit(Instruction::ToPropertyKey { dst: key, src: key });
                    }
                }
                self.emit(Instruction::GetKeyed { dst, obj: object, key });
            }
        }
        Ok(())
    }
}

/// Key of a destructured property
#[derive(Clone, Copy)]
enum PropertyName<'b, 'a> {
    Static(&'b str),
    Computed(&'b Expression<'a>),
}
