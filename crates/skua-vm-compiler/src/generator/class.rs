//! Class definitions
//!
//! A class compiles to its constructor closure plus a prototype created by
//! `CreateClass`. Methods are closures with a home object so `super` can find
//! the parent prototype. Field initializers become synthetic methods: the
//! instance one runs whenever a constructor binds `this`, the static one runs
//! once against the constructor. Computed field keys are evaluated with the
//! class and handed to those methods as arguments.

use oxc_ast::ast::*;
use oxc_span::GetSpan;
use skua_vm_bytecode::{FunctionFlags, FunctionIndex, Instruction, MethodKind, Register};

use super::{BindMode, ByteCodeGenerator};
use crate::analysis::ScopeTag;
use crate::error::CompileResult;

/// Name of a class element key when it is known at compile time
fn static_key<'b>(key: &'b PropertyKey<'_>, computed: bool) -> Option<&'b str> {
    if computed {
        return None;
    }
    match key {
        PropertyKey::StaticIdentifier(id) => Some(id.name.as_str()),
        PropertyKey::StringLiteral(lit) => Some(lit.value.as_str()),
        _ => None,
    }
}

/// Field keys without a compile-time name are evaluated with the class
fn evaluated_key(property: &PropertyDefinition<'_>) -> bool {
    static_key(&property.key, property.computed).is_none()
}

fn is_constructor<'b, 'a>(element: &'b ClassElement<'a>) -> Option<&'b MethodDefinition<'a>> {
    match element {
        ClassElement::MethodDefinition(method) if method.kind == MethodDefinitionKind::Constructor => Some(method),
        _ => None,
    }
}

impl ByteCodeGenerator {
    /// Evaluate `class` into `dst`; `name` names an anonymous class
    pub(super) fn class(&mut self, class: &Class<'_>, dst: Register, name: Option<&str>) -> CompileResult<()> {
        let name = class.id.as_ref().map(|id| id.name.as_str()).or(name);
        self.class_depth += 1;
        let result = self.class_body(class, dst, name);
        self.class_depth -= 1;
        result
    }

    fn class_body(&mut self, class: &Class<'_>, dst: Register, name: Option<&str>) -> CompileResult<()> {
        self.enter_scope((class.span.start, ScopeTag::Class))?;
        let derived = class.super_class.is_some();

        self.with_registers(|g| {
            let ctor = g.current.alloc()?;
            let proto = g.current.alloc()?;
            let heritage = g.current.alloc()?;
            if let Some(super_class) = &class.super_class {
                g.mark(super_class.span().start);
                g.expression(super_class, heritage)?;
            }

            let role = FunctionFlags {
                is_class_constructor: true,
                is_derived_constructor: derived,
                ..FunctionFlags::default()
            };
            let constructor = class.body.body.iter().find_map(is_constructor);
            let index = match constructor {
                Some(method) => g.compile_function_with(&method.value, name.map(str::to_string), role)?,
                None => g.default_constructor(class, name, role)?,
            };
            g.create_function(ctor, index);
            g.mark(class.span.start);
            g.emit(Instruction::CreateClass {
                dst: proto,
                ctor,
                heritage: if derived { heritage } else { ctor },
                derived,
            });

            let elements = &class.body.body;
            let evaluated_keys = |is_static: bool| {
                elements
                    .iter()
                    .filter(|e| matches!(e, ClassElement::PropertyDefinition(p) if evaluated_key(p) && p.r#static == is_static))
                    .count() as u16
            };
            let instance_count = evaluated_keys(false);
            let static_count = evaluated_keys(true);
            let instance_keys = g.current.alloc_range(instance_count)?;
            let static_keys = g.current.alloc_range(static_count)?;

            // Element keys in source order
            let (mut next_instance, mut next_static) = (0u16, 0u16);
            for element in elements {
                match element {
                    ClassElement::MethodDefinition(method) if method.kind != MethodDefinitionKind::Constructor => {
                        let home = if method.r#static { ctor } else { proto };
                        g.with_registers(|g| g.class_method(method, home))?;
                    }
                    ClassElement::MethodDefinition(_) | ClassElement::StaticBlock(_) => {}
                    ClassElement::PropertyDefinition(property) => {
                        if let PropertyKey::PrivateIdentifier(_) = &property.key {
                            return Err(g.unsupported("private name", property.span.start));
                        }
                        if !evaluated_key(property) {
                            continue;
                        }
                        let slot = if property.r#static {
                            next_static += 1;
                            static_keys.offset(next_static - 1)
                        } else {
                            next_instance += 1;
                            instance_keys.offset(next_instance - 1)
                        };
                        g.property_key(&property.key, property.computed, slot)?;
                    }
                    ClassElement::AccessorProperty(accessor) => {
                        return Err(g.unsupported("accessor property", accessor.span.start));
                    }
                    ClassElement::TSIndexSignature(signature) => {
                        return Err(g.unsupported("TypeScript syntax", signature.span.start));
                    }
                }
            }

            let has_instance_fields = elements
                .iter()
                .any(|e| matches!(e, ClassElement::PropertyDefinition(p) if !p.r#static));
            if has_instance_fields {
                let index = g.field_initializer(class, false)?;
                g.with_registers(|g| {
                    let func = g.current.alloc()?;
                    g.emit(Instruction::CreateMethod { dst: func, func: index, home: proto });
                    g.emit(Instruction::SetClassFields {
                        class: ctor,
                        func,
                        keys: if instance_count == 0 { ctor } else { instance_keys },
                        count: instance_count,
                    });
                    Ok(())
                })?;
            }

            if let Some(id) = &class.id {
                g.store_binding(&id.name, ctor, BindMode::Init, id.span.start)?;
            }

            let has_static_elements = elements.iter().any(|e| match e {
                ClassElement::PropertyDefinition(p) => p.r#static,
                ClassElement::StaticBlock(_) => true,
                _ => false,
            });
            if has_static_elements {
                let index = g.field_initializer(class, true)?;
                g.with_registers(|g| {
                    let func = g.current.alloc()?;
                    g.emit(Instruction::CreateMethod { dst: func, func: index, home: ctor });
                    g.emit(Instruction::CallWithReceiver {
                        dst: func,
                        callee: func,
                        receiver: ctor,
                        args: if static_count == 0 { ctor } else { static_keys },
                        argc: static_count,
                    });
                    Ok(())
                })?;
            }

            g.emit(Instruction::Move { dst, src: ctor });
            Ok(())
        })?;

        self.exit_scope();
        Ok(())
    }

    /// Evaluate a property key into `dst`
    fn property_key(&mut self, key: &PropertyKey<'_>, computed: bool, dst: Register) -> CompileResult<()> {
        if let Some(name) = static_key(key, computed) {
            let idx = self.current.string_constant(name);
            self.emit(Instruction::LoadConst { dst, idx });
            return Ok(());
        }
        let Some(expr) = key.as_expression() else {
            return Err(self.unsupported("private name", key.span().start));
        };
        self.expression(expr, dst)?;
        self.emit(Instruction::ToPropertyKey { dst, src: dst });
        Ok(())
    }

    fn class_method(&mut self, method: &MethodDefinition<'_>, home: Register) -> CompileResult<()> {
        let key = self.current.alloc()?;
        self.property_key(&method.key, method.computed, key)?;
        let name = static_key(&method.key, method.computed);
        let (kind, name) = match method.kind {
            MethodDefinitionKind::Get => (MethodKind::Getter, name.map(|n| format!("get {n}"))),
            MethodDefinitionKind::Set => (MethodKind::Setter, name.map(|n| format!("set {n}"))),
            _ => (MethodKind::Method, name.map(str::to_string)),
        };
        let role = FunctionFlags {
            is_method: true,
            ..FunctionFlags::default()
        };
        let index = self.compile_function_with(&method.value, name, role)?;
        let func = self.current.alloc()?;
        self.emit(Instruction::CreateMethod { dst: func, func: index, home });
        self.mark(method.span.start);
        self.emit(Instruction::DefineMethod {
            obj: home,
            key,
            func,
            kind,
        });
        Ok(())
    }

    /// `constructor(...args) { super(...args); }` or an empty constructor
    fn default_constructor(
        &mut self,
        class: &Class<'_>,
        name: Option<&str>,
        role: FunctionFlags,
    ) -> CompileResult<FunctionIndex> {
        let flags = FunctionFlags {
            is_strict: true,
            ..role
        };
        let key = (class.span.start, ScopeTag::Constructor);
        self.compile_synthetic(name.map(str::to_string), key, flags, |g| {
            if !flags.is_derived_constructor {
                return Ok(());
            }
            g.with_registers(|g| {
                let args = g.current.alloc()?;
                g.emit(Instruction::CreateRestParameter { dst: args, start: 0 });
                let result = g.current.alloc()?;
                g.emit(Instruction::SuperCallSpread { dst: result, array: args });
                Ok(())
            })
        })
    }

    /// Synthetic method defining the instance or static fields on `this`
    ///
    /// The static initializer also runs static blocks, each as its own method
    /// so its declarations stay local.
    fn field_initializer(&mut self, class: &Class<'_>, is_static: bool) -> CompileResult<FunctionIndex> {
        let tag = if is_static {
            ScopeTag::StaticFields
        } else {
            ScopeTag::InstanceFields
        };
        let flags = FunctionFlags {
            is_strict: true,
            is_method: true,
            ..FunctionFlags::default()
        };
        self.compile_synthetic(None, (class.span.start, tag), flags, |g| {
            let mut argument = 0u16;
            for element in &class.body.body {
                match element {
                    ClassElement::PropertyDefinition(property) if property.r#static == is_static => {
                        g.with_registers(|g| {
                            let key = g.current.alloc()?;
                            let name = static_key(&property.key, property.computed);
                            match name {
                                Some(name) => {
                                    let idx = g.current.string_constant(name);
                                    g.emit(Instruction::LoadConst { dst: key, idx });
                                }
                                None => {
                                    g.emit(Instruction::GetArgument { dst: key, index: argument });
                                    argument += 1;
                                }
                            }
                            let value = g.current.alloc()?;
                            match &property.value {
                                Some(init) => g.expression_named(init, value, name)?,
                                None => g.emit(Instruction::LoadUndefined { dst: value }),
                            }
                            let this = g.current.this_register();
                            g.mark(property.span.start);
                            g.emit(Instruction::DefineOwnKeyed { obj: this, key, src: value });
                            Ok(())
                        })?;
                    }
                    ClassElement::StaticBlock(block) if is_static => {
                        let index = g.static_block(block)?;
                        g.with_registers(|g| {
                            let func = g.current.alloc()?;
                            let this = g.current.this_register();
                            g.emit(Instruction::CreateMethod { dst: func, func: index, home: this });
                            g.emit(Instruction::CallWithReceiver {
                                dst: func,
                                callee: func,
                                receiver: this,
                                args: func,
                                argc: 0,
                            });
                            Ok(())
                        })?;
                    }
                    _ => {}
                }
            }
            Ok(())
        })
    }

    fn static_block(&mut self, block: &StaticBlock<'_>) -> CompileResult<FunctionIndex> {
        let flags = FunctionFlags {
            is_strict: true,
            is_method: true,
            ..FunctionFlags::default()
        };
        self.compile_synthetic(None, (block.span.start, ScopeTag::Function), flags, |g| {
            g.hoist_functions(&block.body)?;
            for stmt in &block.body {
                g.statement(stmt)?;
            }
            Ok(())
        })
    }
}
