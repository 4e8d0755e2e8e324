//! SandBox: top-level execution boundary
//!
//! Everything a script throws stops here and is reported as data. The
//! end of a sandboxed run is a GC safe point.

use skua_vm_gc::GcRef;

use crate::error::{StackFrame, VmError, VmResult};
use crate::runtime::Runtime;
use crate::value::Value;

/// Outcome of [`SandBox::run`]
#[derive(Debug, Clone)]
pub struct SandBoxResult {
    /// Completion value; `undefined` on failure
    pub result: Value,
    /// Thrown value, `None` on success
    pub error: Option<Value>,
    /// Rendered error (`"TypeError: x is not a function"`), empty on success
    pub message: String,
    /// Stack captured when the error was thrown, innermost first
    pub stack_trace: Vec<StackFrame>,
}

impl SandBoxResult {
    /// No error escaped
    pub fn is_successful(&self) -> bool {
        self.error.is_none()
    }

    /// Stack trace rendered one frame per line
    pub fn stack_trace_string(&self) -> String {
        let mut text = self.message.clone();
        for frame in &self.stack_trace {
            text.push_str("\n    ");
            text.push_str(&frame.to_string());
        }
        text
    }
}

/// Runs host closures against a runtime and captures escaping errors
pub struct SandBox<'rt> {
    rt: &'rt mut Runtime,
}

impl<'rt> SandBox<'rt> {
    /// Wrap a runtime
    pub fn new(rt: &'rt mut Runtime) -> Self {
        Self { rt }
    }

    /// Run `body`; afterwards collect garbage if the heap asks for it
    pub fn run(&mut self, body: impl FnOnce(&mut Runtime) -> VmResult<Value>) -> SandBoxResult {
        let base = self.rt.state.len();
        let outcome = body(self.rt);
        self.rt.state.truncate(base);

        let result = match outcome {
            Ok(result) => SandBoxResult {
                result,
                error: None,
                message: String::new(),
                stack_trace: Vec::new(),
            },
            Err(err) => self.capture(err),
        };

        let mut keep = vec![result.result];
        keep.extend(result.error);
        let reclaimed = self.rt.maybe_collect(&keep);
        if !result.is_successful() {
            tracing::debug!(target: "skua::sandbox", message = %result.message, reclaimed, "sandboxed run failed");
        }
        result
    }

    /// Compile and run `source` as a script
    pub fn run_source(&mut self, source: &str, source_name: &str) -> SandBoxResult {
        self.run(|rt| rt.evaluate(source, source_name))
    }

    fn capture(&mut self, err: VmError) -> SandBoxResult {
        match err {
            VmError::Exception(thrown) => SandBoxResult {
                result: Value::undefined(),
                error: Some(thrown.value),
                message: thrown.message,
                stack_trace: thrown.stack,
            },
            other => {
                let message = other.to_string();
                let error = self.rt.materialize_error(&other);
                SandBoxResult {
                    result: Value::undefined(),
                    error: Some(error),
                    message,
                    stack_trace: Vec::new(),
                }
            }
        }
    }

    /// The wrapped runtime
    pub fn runtime(&mut self) -> &mut Runtime {
        self.rt
    }

    /// Keep `handle` alive across the collections that follow sandboxed runs
    pub fn root(&mut self, handle: GcRef) {
        self.rt.root(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success() {
        let mut rt = Runtime::new();
        let result = SandBox::new(&mut rt).run_source("1 + 1", "sb.js");
        assert!(result.is_successful());
        assert_eq!(result.result.as_number(), 2.0);
    }

    #[test]
    fn test_throw_is_captured() {
        let mut rt = Runtime::new();
        let result = SandBox::new(&mut rt).run_source("throw 1", "sb.js");
        assert!(!result.is_successful());
        assert_eq!(result.error.map(|v| v.as_number()), Some(1.0));
        assert_eq!(result.message, "1");
    }

    #[test]
    fn test_syntax_error_is_captured() {
        let mut rt = Runtime::new();
        let result = SandBox::new(&mut rt).run_source(".", "sb.js");
        assert!(!result.is_successful());
        assert!(result.message.starts_with("SyntaxError"));
        let error = result.error.and_then(|e| e.as_object()).unwrap();
        assert_eq!(rt.get_prototype_of(error), Some(rt.intrinsics().syntax_error_prototype));
    }

    #[test]
    fn test_runtime_usable_after_failure() {
        let mut rt = Runtime::new();
        let mut sandbox = SandBox::new(&mut rt);
        assert!(!sandbox.run_source("undefinedName", "sb.js").is_successful());
        let ok = sandbox.run_source("'1' - 1", "sb.js");
        assert!(ok.is_successful());
        assert_eq!(ok.result.as_number(), 0.0);
        assert!(sandbox.runtime().capture_stack().is_empty());
    }

    #[test]
    fn test_stack_trace_has_function_and_line() {
        let mut rt = Runtime::new();
        let result = SandBox::new(&mut rt).run_source(
            "function inner() {\n  throw new Error('deep');\n}\nfunction outer() { inner(); }\nouter();",
            "trace.js",
        );
        assert!(!result.is_successful());
        let names: Vec<&str> = result.stack_trace.iter().map(|f| f.function_name.as_str()).collect();
        assert_eq!(&names[..2], &["inner", "outer"]);
        assert_eq!(result.stack_trace[0].line, 2);
        assert_eq!(result.stack_trace[1].line, 4);
        assert!(result.stack_trace_string().starts_with("Error: deep\n    at inner (trace.js:2:"));
    }
}
