//! Host objects with exotic property hooks

use skua_vm_gc::GcRef;

use crate::error::VmResult;
use crate::property::PropertyKey;
use crate::runtime::Runtime;
use crate::value::Value;

/// Outcome of a host hook
#[derive(Debug, Clone, PartialEq)]
pub enum HookResult<T = Value> {
    /// The hook produced the answer
    Handled(T),
    /// Fall back to the ordinary algorithm on the object's own properties
    Unhandled,
}

/// Exotic behavior of a host object
///
/// Every hook defaults to [`HookResult::Unhandled`], so an implementation only
/// overrides the operations it intercepts. `set`, `has` and `delete` report
/// their boolean result as a `Value`.
pub trait HostObjectHooks {
    /// Class name for diagnostics
    fn class_name(&self) -> &str {
        "Object"
    }

    /// `[[Get]]`
    fn get(
        &self,
        _rt: &mut Runtime,
        _this: GcRef,
        _receiver: Value,
        _key: &PropertyKey,
    ) -> VmResult<HookResult> {
        Ok(HookResult::Unhandled)
    }

    /// `[[Set]]`
    fn set(
        &self,
        _rt: &mut Runtime,
        _this: GcRef,
        _receiver: Value,
        _key: &PropertyKey,
        _value: Value,
    ) -> VmResult<HookResult> {
        Ok(HookResult::Unhandled)
    }

    /// `[[HasProperty]]`
    fn has(&self, _rt: &mut Runtime, _this: GcRef, _key: &PropertyKey) -> VmResult<HookResult> {
        Ok(HookResult::Unhandled)
    }

    /// `[[Delete]]`
    fn delete(&self, _rt: &mut Runtime, _this: GcRef, _key: &PropertyKey) -> VmResult<HookResult> {
        Ok(HookResult::Unhandled)
    }

    /// `[[OwnPropertyKeys]]`
    fn own_keys(&self, _rt: &mut Runtime, _this: GcRef) -> VmResult<HookResult<Vec<PropertyKey>>> {
        Ok(HookResult::Unhandled)
    }

    /// Report script values the host keeps alive
    fn trace(&self, _tracer: &mut dyn FnMut(GcRef)) {}
}
