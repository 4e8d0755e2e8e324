//! Iteration protocols
//!
//! `GetIterator` wraps the iterator and its cached `next` method into an
//! internal [`IteratorRecord`] object held in a register. Array iterators
//! created by `%Array.prototype%[Symbol.iterator]` are stepped directly while
//! their `next` is still the intrinsic one. `for await` records may wrap a
//! sync iterator whose results are awaited before the loop sees them.

use rustc_hash::FxHashSet;
use skua_vm_gc::GcRef;

use crate::error::{VmError, VmResult};
use crate::object::{ArrayIteratorData, ForInIteratorData, IteratorRecord, ObjectKind};
use crate::promise::ReactionHandler;
use crate::property::{PropertyAttributes, PropertyKey};
use crate::runtime::Runtime;
use crate::value::Value;

impl Runtime {
    // ==================== Iterator records ====================

    /// `GetIterator(value, sync)` as an internal record object
    pub fn get_iterator(&mut self, value: Value) -> VmResult<GcRef> {
        let key = PropertyKey::Symbol(self.intrinsics.symbol_iterator);
        let method = self.get_value(value, &key)?;
        if !self.is_callable(method) {
            return Err(VmError::type_error(format!(
                "{} is not iterable",
                self.display_value(value)
            )));
        }
        let iterator = self.call(method, value, &[])?;
        if !iterator.is_object() {
            return Err(VmError::type_error("Result of the Symbol.iterator method is not an object"));
        }
        self.new_iterator_record(iterator, false)
    }

    fn new_iterator_record(&mut self, iterator: Value, sync_backed: bool) -> VmResult<GcRef> {
        let next = self.get_value(iterator, &PropertyKey::from_name("next"))?;
        Ok(self.new_object_with(
            None,
            ObjectKind::IteratorRecord(IteratorRecord {
                iterator,
                next,
                done: false,
                sync_backed,
            }),
        ))
    }

    fn iterator_record(&self, record: GcRef) -> VmResult<IteratorRecord> {
        match self.object(record).kind() {
            ObjectKind::IteratorRecord(record) => Ok(*record),
            _ => Err(VmError::internal("expected an iterator record")),
        }
    }

    fn set_record_done(&mut self, record: GcRef) {
        if let ObjectKind::IteratorRecord(r) = self.object_mut(record).kind_mut() {
            r.done = true;
        }
    }

    /// `IteratorStepValue`: `None` once the iterator is exhausted
    pub fn iterator_step(&mut self, record: GcRef) -> VmResult<Option<Value>> {
        let rec = self.iterator_record(record)?;
        if rec.done {
            return Ok(None);
        }
        if let Some(iterator) = rec.iterator.as_object()
            && rec.next == Value::object(self.intrinsics.array_iterator_next)
            && matches!(self.object(iterator).kind(), ObjectKind::ArrayIterator(_))
        {
            let step = self.array_iterator_step(iterator);
            if !matches!(step, Ok(Some(_))) {
                self.set_record_done(record);
            }
            return step;
        }

        let result = match self.call(rec.next, rec.iterator, &[]) {
            Ok(result) => result,
            Err(err) => {
                self.set_record_done(record);
                return Err(err);
            }
        };
        if !result.is_object() {
            self.set_record_done(record);
            return Err(VmError::type_error(format!(
                "Iterator result {} is not an object",
                self.display_value(result)
            )));
        }
        let done = self.get_value(result, &PropertyKey::from_name("done"))?;
        if self.to_boolean(done) {
            self.set_record_done(record);
            return Ok(None);
        }
        self.get_value(result, &PropertyKey::from_name("value")).map(Some)
    }

    /// `IteratorClose`; with `suppress` the original throw completion wins
    pub fn iterator_close(&mut self, record: GcRef, suppress: bool) -> VmResult<()> {
        let rec = self.iterator_record(record)?;
        if rec.done {
            return Ok(());
        }
        self.set_record_done(record);
        let method = match self.get_value(rec.iterator, &PropertyKey::from_name("return")) {
            Ok(method) => method,
            Err(_) if suppress => return Ok(()),
            Err(err) => return Err(err),
        };
        if method.is_undefined_or_null() {
            return Ok(());
        }
        match self.call(method, rec.iterator, &[]) {
            Ok(_) if suppress => Ok(()),
            Ok(result) if !result.is_object() => Err(VmError::type_error(format!(
                "Iterator result {} is not an object",
                self.display_value(result)
            ))),
            Ok(_) => Ok(()),
            Err(_) if suppress => Ok(()),
            Err(err) => Err(err),
        }
    }

    // ==================== Async iteration ====================

    /// `GetIterator(value, async)`, falling back to the sync iterator
    ///
    /// A sync-backed record behaves like `CreateAsyncFromSyncIterator`: every
    /// result is turned into a promise for an iterator result whose value has
    /// been awaited.
    pub fn get_async_iterator(&mut self, value: Value) -> VmResult<GcRef> {
        let key = PropertyKey::Symbol(self.intrinsics.symbol_async_iterator);
        let method = self.get_value(value, &key)?;
        if method.is_undefined_or_null() {
            let sync = self.get_iterator(value)?;
            let rec = self.iterator_record(sync)?;
            return self.new_iterator_record(rec.iterator, true);
        }
        if !self.is_callable(method) {
            return Err(VmError::type_error(format!(
                "{} is not async iterable",
                self.display_value(value)
            )));
        }
        let iterator = self.call(method, value, &[])?;
        if !iterator.is_object() {
            return Err(VmError::type_error(
                "Result of the Symbol.asyncIterator method is not an object",
            ));
        }
        self.new_iterator_record(iterator, false)
    }

    /// Call `next` of an async iterator record; the result still has to be awaited
    pub fn async_iterator_next(&mut self, record: GcRef) -> VmResult<Value> {
        let rec = self.iterator_record(record)?;
        let result = match self.call(rec.next, rec.iterator, &[]) {
            Ok(result) => result,
            Err(err) => {
                self.set_record_done(record);
                return Err(err);
            }
        };
        if rec.sync_backed {
            return self.async_from_sync_continuation(result);
        }
        Ok(result)
    }

    /// Inspect an awaited iterator result: `None` once done
    pub fn async_iterator_complete(&mut self, record: GcRef, result: Value) -> VmResult<Option<Value>> {
        if !result.is_object() {
            self.set_record_done(record);
            return Err(VmError::type_error(format!(
                "Iterator result {} is not an object",
                self.display_value(result)
            )));
        }
        let done = self.get_value(result, &PropertyKey::from_name("done"))?;
        if self.to_boolean(done) {
            self.set_record_done(record);
            return Ok(None);
        }
        self.get_value(result, &PropertyKey::from_name("value")).map(Some)
    }

    /// `AsyncIteratorClose` up to the await: the value `return()` produced
    ///
    /// `None` when the record is already done or has no `return` method.
    /// With `suppress` failures are swallowed and nothing is awaited.
    pub fn async_iterator_return(&mut self, record: GcRef, suppress: bool) -> VmResult<Option<Value>> {
        let rec = self.iterator_record(record)?;
        if rec.done {
            return Ok(None);
        }
        self.set_record_done(record);
        let result = self.get_value(rec.iterator, &PropertyKey::from_name("return")).and_then(|method| {
            if method.is_undefined_or_null() {
                return Ok(None);
            }
            let result = self.call(method, rec.iterator, &[])?;
            if rec.sync_backed {
                return self.async_from_sync_continuation(result).map(Some);
            }
            Ok(Some(result))
        });
        match result {
            Ok(_) | Err(_) if suppress => Ok(None),
            other => other,
        }
    }

    /// `AsyncFromSyncIteratorContinuation`
    fn async_from_sync_continuation(&mut self, result: Value) -> VmResult<Value> {
        if !result.is_object() {
            return Err(VmError::type_error(format!(
                "Iterator result {} is not an object",
                self.display_value(result)
            )));
        }
        let done = self.get_value(result, &PropertyKey::from_name("done"))?;
        let done = self.to_boolean(done);
        let value = self.get_value(result, &PropertyKey::from_name("value"))?;
        let promise = self.new_promise();
        match self.promise_resolve(value) {
            Ok(awaited) => self.perform_then(
                awaited,
                ReactionHandler::IterResult { done },
                ReactionHandler::Callback(Value::undefined()),
                Some(promise),
            ),
            Err(err) if err.is_catchable() => {
                let reason = self.materialize_error(&err);
                self.reject_promise(promise, reason);
            }
            Err(err) => return Err(err),
        }
        Ok(Value::object(promise))
    }

    /// Drain an iterable into a list
    pub fn iterable_to_list(&mut self, value: Value) -> VmResult<Vec<Value>> {
        let record = self.get_iterator(value)?;
        let mut values = Vec::new();
        while let Some(v) = self.iterator_step(record)? {
            values.push(v);
        }
        Ok(values)
    }

    /// `CreateIterResultObject`
    pub fn iter_result(&mut self, value: Value, done: bool) -> Value {
        let result = self.new_object();
        self.define_data(result, "value", value, PropertyAttributes::DEFAULT);
        self.define_data(result, "done", Value::from_bool(done), PropertyAttributes::DEFAULT);
        Value::object(result)
    }

    // ==================== Array iterators ====================

    /// Iterator over the elements of an array-like or the code points of a string
    pub fn new_array_iterator(&mut self, target: Value) -> GcRef {
        let proto = self.intrinsics.array_iterator_prototype;
        self.new_object_with(
            Some(proto),
            ObjectKind::ArrayIterator(ArrayIteratorData {
                target,
                index: 0,
                done: false,
            }),
        )
    }

    /// Advance an array iterator; `None` once exhausted
    pub(crate) fn array_iterator_step(&mut self, iterator: GcRef) -> VmResult<Option<Value>> {
        let ObjectKind::ArrayIterator(data) = *self.object(iterator).kind() else {
            return Err(VmError::type_error("next called on incompatible receiver"));
        };
        if data.done {
            return Ok(None);
        }

        let next = if let Some(s) = data.target.as_string() {
            // index counts bytes of the UTF-8 text
            let text = self.js_string(s).text();
            text.get(data.index as usize..)
                .and_then(|rest| rest.chars().next())
                .map(|c| (c.to_string(), c.len_utf8() as u32))
                .map(|(unit, width)| (self.alloc_string(&unit), data.index + width))
        } else {
            let length = self.length_of(data.target)?;
            if (data.index as u64) < length {
                let value = self.get_value(data.target, &PropertyKey::Index(data.index))?;
                Some((value, data.index + 1))
            } else {
                None
            }
        };

        if let ObjectKind::ArrayIterator(state) = self.object_mut(iterator).kind_mut() {
            match next {
                Some((_, index)) => state.index = index,
                None => state.done = true,
            }
        }
        Ok(next.map(|(value, _)| value))
    }

    /// `LengthOfArrayLike`
    pub fn length_of(&mut self, value: Value) -> VmResult<u64> {
        if let Some(object) = value.as_object()
            && let ObjectKind::Array { length } = self.object(object).kind()
        {
            return Ok(*length as u64);
        }
        let length = self.get_value(value, &PropertyKey::from_name("length"))?;
        let length = self.to_integer_or_infinity(length)?;
        Ok(length.clamp(0.0, 9_007_199_254_740_991.0) as u64)
    }

    // ==================== Arrays ====================

    /// Append to an array under construction
    pub(crate) fn array_append(&mut self, array: GcRef, value: Value) {
        let obj = self.object_mut(array);
        if let ObjectKind::Array { length } = &mut obj.kind {
            let index = *length;
            *length += 1;
            obj.elements.set(index, value);
        }
    }

    /// Leave a hole at the end of an array under construction
    pub(crate) fn array_append_hole(&mut self, array: GcRef) {
        if let ObjectKind::Array { length } = &mut self.object_mut(array).kind {
            *length += 1;
        }
    }

    /// Elements of an array as a list (holes read as `undefined`)
    pub fn array_to_list(&mut self, array: Value) -> VmResult<Vec<Value>> {
        let length = self.length_of(array)?;
        let mut values = Vec::with_capacity(length as usize);
        for index in 0..length {
            values.push(self.get_value(array, &PropertyKey::Index(index as u32))?);
        }
        Ok(values)
    }

    // ==================== for-in ====================

    /// Snapshot the enumerable string keys of `value` and its prototypes
    pub fn for_in_enumerate(&mut self, value: Value) -> VmResult<GcRef> {
        let mut data = ForInIteratorData::default();
        if !value.is_undefined_or_null() {
            let object = self.to_object(value)?;
            data.object = Some(object);
            let mut seen: FxHashSet<PropertyKey> = FxHashSet::default();
            let mut current = Some(object);
            while let Some(handle) = current {
                for key in self.own_property_keys(handle)? {
                    if key.is_symbol() || !seen.insert(key.clone()) {
                        continue;
                    }
                    if let Some((_, attributes)) = self.get_own_property(handle, &key)?
                        && attributes.enumerable()
                    {
                        let key = self.key_to_value(&key);
                        data.keys.push(key);
                    }
                }
                current = self.get_prototype_of(handle);
            }
        }
        Ok(self.new_object_with(None, ObjectKind::ForInIterator(data)))
    }

    /// Next key still present on the object, `None` when done
    pub fn for_in_next(&mut self, iterator: GcRef) -> VmResult<Option<Value>> {
        loop {
            let (object, key) = match self.object_mut(iterator).kind_mut() {
                ObjectKind::ForInIterator(data) => match (data.object, data.keys.get(data.index).copied()) {
                    (Some(object), Some(key)) => {
                        data.index += 1;
                        (object, key)
                    }
                    _ => return Ok(None),
                },
                _ => return Err(VmError::internal("expected a for-in iterator")),
            };
            let property = self.to_property_key(key)?;
            if self.has_property(object, &property)? {
                return Ok(Some(key));
            }
        }
    }
}
