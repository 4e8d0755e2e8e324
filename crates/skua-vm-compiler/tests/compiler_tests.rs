//! Bytecode generation tests
//!
//! These check the shape of generated blocks: register file sizing, binding
//! storage decisions and the control flow scaffolding around `try`/`finally`.

use proptest::prelude::*;
use skua_vm_bytecode::{BindingStorage, ByteCodeBlock, Instruction, Script};
use skua_vm_compiler::{CompileError, CompileOptions, Compiler};

fn compile(source: &str) -> Script {
    Compiler::default()
        .compile_script(source)
        .unwrap_or_else(|e| panic!("failed to compile {source:?}: {e}"))
}

fn function<'a>(script: &'a Script, name: &str) -> &'a ByteCodeBlock {
    script
        .functions
        .iter()
        .find(|f| f.name.as_deref() == Some(name))
        .unwrap_or_else(|| panic!("no function named {name}"))
}

fn count(block: &ByteCodeBlock, pred: impl Fn(&Instruction) -> bool) -> usize {
    block.instructions.iter().filter(|i| pred(i)).count()
}

#[test]
fn test_register_limit_exceeded() {
    let compiler = Compiler::new(CompileOptions {
        register_limit: 4,
        ..CompileOptions::default()
    });
    let args = (0..8).map(|i| format!("x{i}")).collect::<Vec<_>>().join(", ");
    let err = compiler
        .compile_script(&format!("f({args});"))
        .unwrap_err();
    assert!(matches!(err, CompileError::RegisterLimitExceeded { limit: 4 }));
    assert!(err.is_syntax_error());
}

#[test]
fn test_locals_use_stack_variables() {
    let script = compile("function f(a, b) { let c = a + b; return c; }");
    let f = function(&script, "f");
    // this + a + b + c
    assert_eq!(f.stack_allocated_variable_size, 4);
    assert!(f.environment_layouts.is_empty());
    assert!(f.identifiers.iter().all(|i| matches!(i.storage, BindingStorage::Register(_))));
    assert_eq!(
        f.required_total_register_number,
        f.required_operand_register_number as u32
            + f.stack_allocated_variable_size as u32
            + f.numeral_literals.len() as u32
    );
}

#[test]
fn test_captured_binding_lives_on_heap() {
    let script = compile("function outer() { let n = 0; return () => ++n; }");
    let outer = function(&script, "outer");
    let n = outer
        .identifiers
        .iter()
        .find(|i| &*i.name == "n")
        .expect("n recorded");
    assert!(matches!(n.storage, BindingStorage::Heap { .. }));
    assert!(outer.function_environment.is_some());

    let arrow = &script.functions[outer.children[0] as usize];
    assert!(count(arrow, |i| matches!(i, Instruction::GetHeap { depth: 0, .. })) > 0);
    assert!(count(arrow, |i| matches!(i, Instruction::SetHeap { depth: 0, .. })) > 0);
}

#[test]
fn test_loop_let_copies_environment_per_iteration() {
    let script = compile(
        "function f() { const fns = []; for (let i = 0; i < 3; i++) { fns.push(() => i); } return fns; }",
    );
    let f = function(&script, "f");
    assert_eq!(count(f, |i| matches!(i, Instruction::RecreateEnvironment)), 1);
    assert!(count(f, |i| matches!(i, Instruction::PushEnvironment { .. })) >= 1);
}

#[test]
fn test_uncaptured_loop_needs_no_environment() {
    let script = compile("function f() { let s = 0; for (let i = 0; i < 3; i++) { s += i; } return s; }");
    let f = function(&script, "f");
    assert_eq!(count(f, |i| matches!(i, Instruction::RecreateEnvironment)), 0);
    assert_eq!(count(f, |i| matches!(i, Instruction::PushEnvironment { .. })), 0);
}

#[test]
fn test_break_through_finally_uses_jump_record() {
    let script = compile("function f() { while (true) { try { break; } finally { g(); } } }");
    let f = function(&script, "f");
    assert_eq!(count(f, |i| matches!(i, Instruction::JumpComplex { .. })), 1);
    assert_eq!(f.jump_flow_records.len(), 1);
    let record = f.jump_flow_records[0];
    assert_eq!(record.try_depth, 0);
    assert!((record.target as usize) < f.instructions.len());
    assert_eq!(count(f, |i| matches!(i, Instruction::EnterTryFinally { .. })), 1);
    assert_eq!(count(f, |i| matches!(i, Instruction::EndFinally)), 1);
}

#[test]
fn test_break_inside_catch_only_is_direct() {
    let script = compile("function f() { while (true) { try { break; } catch (e) {} } }");
    let f = function(&script, "f");
    assert_eq!(count(f, |i| matches!(i, Instruction::JumpComplex { .. })), 0);
    assert!(count(f, |i| matches!(i, Instruction::LeaveTry)) >= 2);
}

#[test]
fn test_generator_initializes_after_prologue() {
    let script = compile("function* g(a) { const x = yield a; return x + 1; }");
    let g = function(&script, "g");
    assert!(g.flags.is_generator);
    let init = g
        .instructions
        .iter()
        .position(|i| matches!(i, Instruction::GeneratorsInitialize))
        .expect("initialize");
    let argument = g
        .instructions
        .iter()
        .position(|i| matches!(i, Instruction::GetArgument { .. }))
        .expect("argument");
    assert!(argument < init);
    assert_eq!(count(g, |i| matches!(i, Instruction::Yield { .. })), 1);
}

#[test]
fn test_direct_eval_forces_heap_storage() {
    let script = compile("function f(a) { var b = 2; return eval('a + b'); }");
    let f = function(&script, "f");
    assert!(f.flags.uses_eval);
    assert!(f
        .identifiers
        .iter()
        .filter(|i| &*i.name == "a" || &*i.name == "b")
        .all(|i| matches!(i.storage, BindingStorage::Heap { .. })));
    assert_eq!(count(f, |i| matches!(i, Instruction::CallEval { .. })), 1);
}

#[test]
fn test_script_declares_globals() {
    let script = compile("var a = 1; let b = 2; const c = 3; function d() {}");
    let entry = script.entry_block().unwrap();
    let decls = &entry.global_declarations;
    assert_eq!(decls.vars.len(), 1);
    assert_eq!(decls.functions.len(), 1);
    assert_eq!(decls.lexicals.len(), 2);
    assert!(decls.lexicals.iter().any(|(n, is_const)| &**n == "c" && *is_const));
    assert!(matches!(entry.instructions[0], Instruction::DeclareGlobals));
}

#[test]
fn test_const_assignment_throws() {
    let script = compile("function f() { const x = 1; x = 2; }");
    let f = function(&script, "f");
    assert_eq!(count(f, |i| matches!(i, Instruction::ThrowConstAssignment { .. })), 1);
}

#[test]
fn test_source_map_records_lines() {
    let script = compile("let a = 1;\nfoo();\n");
    let entry = script.entry_block().unwrap();
    let call = entry
        .instructions
        .iter()
        .position(|i| matches!(i, Instruction::Call { .. }))
        .expect("call");
    assert_eq!(entry.source_map.find(call as u32).map(|e| e.line), Some(2));
}

#[test]
fn test_unsupported_private_names() {
    let err = Compiler::default().compile_script("class A { #x = 1; }").unwrap_err();
    assert!(matches!(err, CompileError::Unsupported(_)));
}

#[test]
fn test_derived_constructor_checks_this() {
    let script = compile("class A {} class B extends A { constructor() { super(); this.x = 1; } }");
    let b = function(&script, "B");
    assert!(b.flags.is_class_constructor);
    assert!(b.flags.is_derived_constructor);
    assert!(b.flags.is_strict);
    assert_eq!(count(b, |i| matches!(i, Instruction::SuperCall { argc: 0, .. })), 1);
    assert!(count(b, |i| matches!(i, Instruction::CheckThis { .. })) > 0);

    let a = function(&script, "A");
    assert!(!a.flags.is_derived_constructor);
    assert_eq!(count(a, |i| matches!(i, Instruction::CheckThis { .. })), 0);
}

#[test]
fn test_default_derived_constructor_forwards_arguments() {
    let script = compile("class A {} class B extends A {}");
    let b = function(&script, "B");
    assert_eq!(count(b, |i| matches!(i, Instruction::CreateRestParameter { start: 0, .. })), 1);
    assert_eq!(count(b, |i| matches!(i, Instruction::SuperCallSpread { .. })), 1);
}

#[test]
fn test_super_outside_derived_constructor_rejected() {
    let err = Compiler::default()
        .compile_script("class A { constructor() { super(); } }")
        .unwrap_err();
    assert!(err.is_syntax_error());
}

#[test]
fn test_tagged_template_records_site() {
    let script = compile("tag`a${1}\\u0041`;");
    let entry = &script.functions[0];
    assert_eq!(entry.templates.len(), 1);
    let site = &entry.templates[0];
    assert_eq!(site.raw.len(), 2);
    assert_eq!(&*site.raw[1], "\\u0041");
    assert_eq!(site.cooked[1].as_deref(), Some("A"));
    assert_eq!(count(entry, |i| matches!(i, Instruction::GetTemplateObject { site: 0, .. })), 1);
}

#[test]
fn test_for_await_awaits_each_step() {
    let script = compile("async function f(xs) { for await (const x of xs) {} }");
    let f = function(&script, "f");
    let next = f
        .instructions
        .iter()
        .position(|i| matches!(i, Instruction::AsyncIteratorNext { .. }))
        .expect("next");
    assert!(matches!(f.instructions[next + 1], Instruction::Await { .. }));
    assert!(matches!(f.instructions[next + 2], Instruction::AsyncIteratorComplete { .. }));
    assert_eq!(count(f, |i| matches!(i, Instruction::AsyncIteratorReturn { .. })), 1);
}

#[test]
fn test_async_generator_awaits_before_yield() {
    let script = compile("async function* g() { yield 1; }");
    let g = function(&script, "g");
    assert!(g.flags.is_generator && g.flags.is_async);
    let step = g
        .instructions
        .iter()
        .position(|i| matches!(i, Instruction::Yield { .. }))
        .expect("yield");
    assert!(matches!(g.instructions[step - 1], Instruction::Await { .. }));
}

#[test]
fn test_parse_error_is_syntax_error() {
    let err = Compiler::default().compile_script(".").unwrap_err();
    assert!(err.is_syntax_error());
}

#[test]
fn test_illegal_break() {
    let err = Compiler::default().compile_script("break;").unwrap_err();
    assert!(err.is_syntax_error());
}

#[test]
fn test_dump_lists_functions() {
    let script = compile("function add(a, b) { return a + b; }");
    let listing = script.dump();
    assert!(listing.contains("function add"));
    assert!(listing.contains("Add"));
}

proptest! {
    #[test]
    fn prop_register_file_is_sum_of_parts(count in 1usize..40, literal in 0u32..1000) {
        let body: String = (0..count)
            .map(|i| format!("let v{} = v{i} + {literal}.5;", i + 1))
            .collect();
        let script = compile(&format!("function f(v0) {{ {body} return v0; }}"));
        let f = function(&script, "f");
        prop_assert_eq!(
            f.required_total_register_number,
            f.required_operand_register_number as u32
                + f.stack_allocated_variable_size as u32
                + f.numeral_literals.len() as u32
        );
        // this + v0 + one per declaration
        prop_assert_eq!(f.stack_allocated_variable_size as usize, count + 2);
    }
}
