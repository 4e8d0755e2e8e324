//! Compiler entry points

use oxc_allocator::Allocator;
use oxc_parser::Parser;
use oxc_span::SourceType;
use skua_vm_bytecode::{REGULAR_REGISTER_LIMIT, Script};

use crate::analysis::{Analyzer, CodeKind};
use crate::error::{CompileError, CompileResult};
use crate::generator::ByteCodeGenerator;

/// Compiler options
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Name recorded in stack traces
    pub source_name: String,
    /// Compile as if the source started with `"use strict"`
    pub strict: bool,
    /// Operand register budget per function, capped at [`REGULAR_REGISTER_LIMIT`]
    pub register_limit: u16,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            source_name: "<anonymous>".to_string(),
            strict: false,
            register_limit: REGULAR_REGISTER_LIMIT,
        }
    }
}

/// The compiler
///
/// Parses ECMAScript source with oxc, runs the scope pre-pass and generates a
/// [`Script`] whose entry block is function 0.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    /// Create a new compiler
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Compiler options
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile a global script
    pub fn compile_script(&self, source: &str) -> CompileResult<Script> {
        self.compile(source, CodeKind::Script, self.options.strict)
    }

    /// Compile the argument of an `eval` call
    ///
    /// `direct` eval runs in the caller's scope; `strict` is the caller's
    /// strictness for direct eval and ignored otherwise.
    pub fn compile_eval(&self, source: &str, direct: bool, strict: bool) -> CompileResult<Script> {
        let (kind, strict) = if direct {
            (CodeKind::DirectEval, strict || self.options.strict)
        } else {
            (CodeKind::IndirectEval, self.options.strict)
        };
        self.compile(source, kind, strict)
    }

    fn compile(&self, source: &str, kind: CodeKind, strict: bool) -> CompileResult<Script> {
        let allocator = Allocator::default();
        let source_type = SourceType::default().with_module(false);
        let result = Parser::new(&allocator, source, source_type).parse();

        // Check for parse errors
        if let Some(error) = result.errors.first() {
            return Err(CompileError::Parse(error.to_string()));
        }
        let program = result.program;

        let analysis = Analyzer::new(source).analyze(&program, kind, strict)?;
        let script = ByteCodeGenerator::new(source, analysis, kind, self.options.register_limit)
            .generate(&program, &self.options.source_name, strict)?;

        tracing::debug!(
            target: "skua::compiler",
            source = %self.options.source_name,
            ?kind,
            functions = script.functions.len(),
            "compiled"
        );
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skua_vm_bytecode::Instruction;

    fn compile(source: &str) -> Script {
        Compiler::default().compile_script(source).unwrap()
    }

    #[test]
    fn test_entry_returns_completion() {
        let script = compile("1 + 1");
        let entry = script.entry_block().unwrap();
        assert!(entry
            .instructions
            .iter()
            .any(|i| matches!(i, Instruction::Add { .. })));
        assert!(entry
            .instructions
            .iter()
            .any(|i| matches!(i, Instruction::Return { .. })));
    }

    #[test]
    fn test_parse_error() {
        let err = Compiler::default().compile_script(".").unwrap_err();
        assert!(matches!(err, CompileError::Parse(_)));
        assert!(err.is_syntax_error());
    }

    #[test]
    fn test_nested_function_is_child() {
        let script = compile("function f() { return 1; }");
        assert_eq!(script.functions.len(), 2);
        assert_eq!(script.entry_block().unwrap().children, vec![1]);
        assert_eq!(script.functions[1].name.as_deref(), Some("f"));
    }

    #[test]
    fn test_strict_option() {
        let compiler = Compiler::new(CompileOptions {
            strict: true,
            ..CompileOptions::default()
        });
        let script = compiler.compile_script("var x = 1;").unwrap();
        assert!(script.entry_block().unwrap().flags.is_strict);
    }
}
