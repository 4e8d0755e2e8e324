//! Tagged template objects
//!
//! Each template literal site gets one frozen strings array, created on first
//! evaluation and cached on the code block so every later evaluation of the
//! same site hands the tag the identical object.

use skua_vm_gc::GcRef;

use crate::error::{VmError, VmResult};
use crate::property::{PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::runtime::Runtime;
use crate::value::Value;

impl Runtime {
    /// `GetTemplateObject` for template site `site` of `code`
    pub(crate) fn template_object(&mut self, code: GcRef, site: u32) -> VmResult<GcRef> {
        if let Some(Some(cached)) = self.code_block(code).templates.get(site as usize) {
            return Ok(*cached);
        }
        let Some(template) = self.code_block(code).block().templates.get(site as usize).cloned() else {
            return Err(VmError::internal(format!("template site {site} out of range")));
        };

        let cooked = template
            .cooked
            .iter()
            .map(|text| match text {
                Some(text) => self.alloc_string(text),
                None => Value::undefined(),
            })
            .collect();
        let raw = template.raw.iter().map(|text| self.alloc_string(text)).collect();
        let strings = self.frozen_array(cooked)?;
        let raw = self.frozen_array(raw)?;
        self.prevent_extensions(raw);
        self.define_data(strings, "raw", Value::object(raw), PropertyAttributes::data(false, false, false));
        self.prevent_extensions(strings);

        if let Some(slot) = self.code_block_mut(code).templates.get_mut(site as usize) {
            *slot = Some(strings);
        }
        Ok(strings)
    }

    fn frozen_array(&mut self, values: Vec<Value>) -> VmResult<GcRef> {
        let array = self.new_array(Vec::new());
        let frozen = PropertyAttributes::data(false, true, false);
        for (index, value) in values.into_iter().enumerate() {
            let key = PropertyKey::Index(index as u32);
            self.define_own_property(array, key, PropertyDescriptor::data(value, frozen))?;
        }
        Ok(array)
    }
}
