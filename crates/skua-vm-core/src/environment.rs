//! Heap environments and name resolution
//!
//! Captured bindings live in declarative environments laid out by the
//! compiler; `with` pushes object environments. Names that the compiler could
//! not resolve statically are looked up here, walking the chain and then the
//! global lexical table and the global object.

use std::rc::Rc;

use skua_vm_bytecode::{BindingKind, EnvironmentLayout};
use skua_vm_gc::{GcRef, Trace};

use crate::error::{VmError, VmResult};
use crate::heap::HeapCell;
use crate::property::PropertyKey;
use crate::runtime::Runtime;
use crate::value::Value;

/// An environment record
#[derive(Debug)]
pub struct Environment {
    /// Enclosing environment; `None` means the global scope
    pub parent: Option<GcRef>,
    /// Record contents
    pub kind: EnvironmentKind,
}

/// Environment record kinds
#[derive(Debug)]
pub enum EnvironmentKind {
    /// Slots named by a compiler layout
    Declarative {
        /// Names and binding kinds of the slots
        layout: Rc<EnvironmentLayout>,
        /// Slot values; `empty` marks an uninitialized lexical binding
        slots: Vec<Value>,
    },
    /// `with` object
    Object {
        /// Binding object
        object: GcRef,
    },
}

impl Environment {
    /// Fresh declarative environment with every slot initialized per its kind
    pub fn declarative(layout: Rc<EnvironmentLayout>, parent: Option<GcRef>) -> Self {
        let slots = layout
            .slots
            .iter()
            .map(|s| {
                if s.kind.is_lexical() {
                    Value::empty()
                } else {
                    Value::undefined()
                }
            })
            .collect();
        Self {
            parent,
            kind: EnvironmentKind::Declarative { layout, slots },
        }
    }
}

impl Trace for Environment {
    fn trace(&self, tracer: &mut dyn FnMut(GcRef)) {
        self.parent.trace(tracer);
        match &self.kind {
            EnvironmentKind::Declarative { slots, .. } => {
                for slot in slots {
                    slot.trace(tracer);
                }
            }
            EnvironmentKind::Object { object } => tracer(*object),
        }
    }
}

/// Where a dynamically resolved name lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Declarative slot
    Slot {
        /// Environment handle
        env: GcRef,
        /// Slot index
        slot: u16,
        /// Binding kind of the slot
        kind: BindingKind,
    },
    /// Property of a `with` object
    Object(GcRef),
    /// Global lexical declaration
    GlobalLexical,
    /// Property of the global object
    GlobalObject,
}

impl Runtime {
    pub(crate) fn env(&self, handle: GcRef) -> &Environment {
        match self.heap.get(handle) {
            HeapCell::Environment(env) => env,
            other => panic!("expected environment, found {}", other.kind_name()),
        }
    }

    pub(crate) fn env_mut(&mut self, handle: GcRef) -> &mut Environment {
        match self.heap.get_mut(handle) {
            HeapCell::Environment(env) => env,
            other => panic!("expected environment, found {}", other.kind_name()),
        }
    }

    pub(crate) fn alloc_env(&mut self, env: Environment) -> GcRef {
        self.heap.alloc(HeapCell::Environment(env))
    }

    /// The environment `depth` hops above `env`
    pub(crate) fn env_at(&self, env: Option<GcRef>, depth: u16) -> GcRef {
        let mut current = env;
        for _ in 0..depth {
            current = current.and_then(|e| self.env(e).parent);
        }
        match current {
            Some(handle) => handle,
            None => panic!("environment depth {depth} out of range"),
        }
    }

    pub(crate) fn env_slot(&self, env: GcRef, slot: u16) -> Value {
        match &self.env(env).kind {
            EnvironmentKind::Declarative { slots, .. } => slots[slot as usize],
            EnvironmentKind::Object { .. } => panic!("slot access on object environment"),
        }
    }

    pub(crate) fn set_env_slot(&mut self, env: GcRef, slot: u16, value: Value) {
        match &mut self.env_mut(env).kind {
            EnvironmentKind::Declarative { slots, .. } => slots[slot as usize] = value,
            EnvironmentKind::Object { .. } => panic!("slot access on object environment"),
        }
    }

    /// Copy of a declarative environment with the same parent (per-iteration bindings)
    pub(crate) fn copy_env(&mut self, handle: GcRef) -> GcRef {
        let env = self.env(handle);
        let parent = env.parent;
        let kind = match &env.kind {
            EnvironmentKind::Declarative { layout, slots } => EnvironmentKind::Declarative {
                layout: Rc::clone(layout),
                slots: slots.clone(),
            },
            EnvironmentKind::Object { object } => EnvironmentKind::Object { object: *object },
        };
        self.alloc_env(Environment { parent, kind })
    }

    /// Resolve `name` starting at `env`
    pub fn resolve_binding(&mut self, env: Option<GcRef>, name: &str) -> VmResult<Option<Binding>> {
        let mut current = env;
        while let Some(handle) = current {
            let environment = self.env(handle);
            let parent = environment.parent;
            match &environment.kind {
                EnvironmentKind::Declarative { layout, .. } => {
                    if let Some(slot) = layout.find(name) {
                        let kind = layout.slots[slot as usize].kind;
                        return Ok(Some(Binding::Slot {
                            env: handle,
                            slot,
                            kind,
                        }));
                    }
                }
                EnvironmentKind::Object { object } => {
                    let object = *object;
                    if self.has_property(object, &PropertyKey::from_name(name))? {
                        return Ok(Some(Binding::Object(object)));
                    }
                }
            }
            current = parent;
        }

        if self.global_lexicals.contains_key(name) {
            return Ok(Some(Binding::GlobalLexical));
        }
        let global = self.global_object();
        if self.has_property(global, &PropertyKey::from_name(name))? {
            return Ok(Some(Binding::GlobalObject));
        }
        Ok(None)
    }

    /// Read a resolved binding
    pub(crate) fn read_binding(&mut self, binding: Binding, name: &str) -> VmResult<Value> {
        match binding {
            Binding::Slot { env, slot, .. } => {
                let value = self.env_slot(env, slot);
                if value.is_empty() {
                    return Err(tdz_error(name));
                }
                Ok(value)
            }
            Binding::Object(object) => self.get(object, &PropertyKey::from_name(name), Value::object(object)),
            Binding::GlobalLexical => self.read_global_lexical(name),
            Binding::GlobalObject => {
                let global = self.global_object();
                self.get(global, &PropertyKey::from_name(name), Value::object(global))
            }
        }
    }

    /// Write a resolved binding (or create a global for an unresolved sloppy name)
    pub(crate) fn write_binding(
        &mut self,
        binding: Option<Binding>,
        name: &str,
        value: Value,
        strict: bool,
    ) -> VmResult<()> {
        match binding {
            Some(Binding::Slot { env, slot, kind }) => {
                if self.env_slot(env, slot).is_empty() {
                    return Err(tdz_error(name));
                }
                match kind {
                    BindingKind::Const => Err(const_assignment_error()),
                    BindingKind::Callee if strict => Err(const_assignment_error()),
                    BindingKind::Callee => Ok(()),
                    _ => {
                        self.set_env_slot(env, slot, value);
                        Ok(())
                    }
                }
            }
            Some(Binding::Object(object)) => {
                let ok = self.set(object, &PropertyKey::from_name(name), value, Value::object(object))?;
                if !ok && strict {
                    return Err(VmError::type_error(format!(
                        "Cannot assign to read only property '{name}'"
                    )));
                }
                Ok(())
            }
            Some(Binding::GlobalLexical) => self.write_global_lexical(name, value),
            Some(Binding::GlobalObject) | None => {
                if binding.is_none() && strict {
                    return Err(VmError::reference_error(format!("{name} is not defined")));
                }
                let global = self.global_object();
                let ok = self.set(global, &PropertyKey::from_name(name), value, Value::object(global))?;
                if !ok && strict {
                    return Err(VmError::type_error(format!(
                        "Cannot assign to read only property '{name}' of object"
                    )));
                }
                Ok(())
            }
        }
    }

    pub(crate) fn read_global_lexical(&self, name: &str) -> VmResult<Value> {
        match self.global_lexicals.get(name) {
            Some(lexical) if lexical.value.is_empty() => Err(tdz_error(name)),
            Some(lexical) => Ok(lexical.value),
            None => Err(VmError::reference_error(format!("{name} is not defined"))),
        }
    }

    pub(crate) fn write_global_lexical(&mut self, name: &str, value: Value) -> VmResult<()> {
        match self.global_lexicals.get_mut(name) {
            Some(lexical) if lexical.value.is_empty() => Err(tdz_error(name)),
            Some(lexical) if lexical.is_const => Err(const_assignment_error()),
            Some(lexical) => {
                lexical.value = value;
                Ok(())
            }
            None => Err(VmError::reference_error(format!("{name} is not defined"))),
        }
    }
}

/// Access to a lexical binding before its declaration ran
pub(crate) fn tdz_error(name: &str) -> VmError {
    VmError::reference_error(format!("Cannot access '{name}' before initialization"))
}

pub(crate) fn const_assignment_error() -> VmError {
    VmError::type_error("Assignment to constant variable.")
}

/// A top-level `let`/`const`
#[derive(Debug, Clone, Copy)]
pub struct GlobalLexical {
    /// Current value; `empty` until the declaration runs
    pub value: Value,
    /// Declared with `const`
    pub is_const: bool,
}
