//! Global object value properties and functions

use skua_vm_gc::GcRef;

use super::arg;
use crate::error::VmResult;
use crate::property::PropertyAttributes;
use crate::runtime::Runtime;
use crate::value::Value;

pub(super) fn init(rt: &mut Runtime) {
    let global = rt.global_object();
    rt.define_global("globalThis", Value::object(global));

    let frozen = PropertyAttributes::data(false, false, false);
    rt.define_data(global, "undefined", Value::undefined(), frozen);
    rt.define_data(global, "NaN", Value::nan(), frozen);
    rt.define_data(global, "Infinity", Value::number(f64::INFINITY), frozen);

    let eval_fn = rt.intrinsics.eval;
    rt.define_function_name_and_length(eval_fn, "eval", 1);
    rt.define_global("eval", Value::object(eval_fn));

    rt.define_native_function(global, "print", 1, print);
}

/// Indirect `eval`: global scope, sloppy unless the source opts in
pub(super) fn eval(rt: &mut Runtime, _this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let argument = arg(args, 0);
    let Some(source) = rt.string_text(argument) else {
        return Ok(argument);
    };
    let script = rt.compile_eval(&source, false, false)?;
    let entry = script.entry;
    let id = rt.load_script(script);
    let code = rt.code_for(id, entry);
    let this = Value::object(rt.global_object());
    let mut frame = rt.new_frame(code, None, None, this, Vec::new(), None);
    frame.is_eval = true;
    rt.run_frame(Box::new(frame))
}

/// `print(...values)`: space-separated, through the runtime's output sink
fn print(rt: &mut Runtime, _this: Value, args: &[Value], _nt: Option<GcRef>) -> VmResult<Value> {
    let mut line = String::new();
    for (i, value) in args.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        line.push_str(&rt.to_string(*value)?);
    }
    rt.print(&line);
    Ok(Value::undefined())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::runtime::Runtime;

    #[test]
    fn test_print_goes_to_output() {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&lines);
        let mut rt = Runtime::new();
        rt.set_output(move |line| sink.borrow_mut().push(line.to_string()));
        rt.evaluate("print('a', 1, true); print()", "g.js").unwrap();
        assert_eq!(*lines.borrow(), vec!["a 1 true".to_string(), String::new()]);
    }

    #[test]
    fn test_indirect_eval_uses_global_scope() {
        let mut rt = Runtime::new();
        let value = rt
            .evaluate(
                "var x = 'global';\n\
                 function f() { var x = 'local'; var e = eval; return e('x'); }\n\
                 f()",
                "g.js",
            )
            .unwrap();
        assert_eq!(rt.string_text(value).as_deref(), Some("global"));
    }

    #[test]
    fn test_indirect_eval_declares_globals() {
        let mut rt = Runtime::new();
        let value = rt.evaluate("(0, eval)('var fromEval = 3'); fromEval", "g.js").unwrap();
        assert_eq!(value.as_number(), 3.0);
    }

    #[test]
    fn test_global_this() {
        let mut rt = Runtime::new();
        let value = rt.evaluate("var marker = 1; globalThis.marker === 1 && this === globalThis", "g.js").unwrap();
        assert!(value.as_boolean());
    }

    #[test]
    fn test_eval_non_string_passthrough() {
        let mut rt = Runtime::new();
        let value = rt.evaluate("eval(42)", "g.js").unwrap();
        assert_eq!(value.as_number(), 42.0);
    }
}
