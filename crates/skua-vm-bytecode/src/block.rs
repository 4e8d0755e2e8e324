//! Per-function bytecode representation

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::constant::{Constant, ConstantPool, NumeralPool};
use crate::instruction::Instruction;

/// Function flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionFlags {
    /// Is strict mode
    pub is_strict: bool,
    /// Is a generator function
    pub is_generator: bool,
    /// Is an async function
    pub is_async: bool,
    /// Is an arrow function
    pub is_arrow: bool,
    /// Is an object literal method or accessor (never a constructor)
    pub is_method: bool,
    /// Does this function reference `arguments`
    pub uses_arguments: bool,
    /// Does this function (or a nested arrow) contain a direct `eval` call
    pub uses_eval: bool,
    /// Does this function contain a `with` statement
    pub has_with: bool,
    /// Parameter list has no defaults, patterns or rest
    pub simple_parameters: bool,
    /// Is a class constructor (throws when called without `new`)
    pub is_class_constructor: bool,
    /// Is the constructor of a class with an `extends` clause
    pub is_derived_constructor: bool,
}

impl FunctionFlags {
    /// Whether closures over this code can be called with `new`
    #[inline]
    pub fn is_constructor(&self) -> bool {
        !(self.is_arrow || self.is_method || self.is_generator || self.is_async)
    }
}

/// How a declared name was introduced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingKind {
    /// Formal parameter at the given position
    Parameter(u16),
    /// `var` declaration
    Var,
    /// `let` declaration
    Let,
    /// `const` declaration
    Const,
    /// Hoisted function declaration
    Function,
    /// `catch` clause parameter
    CatchParameter,
    /// Name of a named function expression, visible inside its own body
    Callee,
}

impl BindingKind {
    /// Whether the binding starts in the temporal dead zone
    #[inline]
    pub fn is_lexical(self) -> bool {
        matches!(self, Self::Let | Self::Const)
    }

    /// Whether assignments to the binding are allowed
    #[inline]
    pub fn is_mutable(self) -> bool {
        !matches!(self, Self::Const | Self::Callee)
    }
}

/// Where a declared name is stored at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingStorage {
    /// Stack-allocated variable register
    Register(u16),
    /// Slot in a heap environment
    Heap {
        /// Index into [`ByteCodeBlock::environment_layouts`]
        layout: u32,
        /// Slot within that environment
        slot: u16,
    },
    /// Property of the global object or global lexical table
    Global,
}

/// Identifier table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierInfo {
    /// Declared name
    pub name: Box<str>,
    /// Declaration form
    pub kind: BindingKind,
    /// Storage location
    pub storage: BindingStorage,
}

/// One slot of a heap environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSlot {
    /// Binding name, used by by-name lookup from `with`/`eval` code
    pub name: Box<str>,
    /// Declaration form
    pub kind: BindingKind,
}

/// Layout of a heap-allocated declarative environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentLayout {
    /// Slots in index order
    pub slots: Vec<EnvironmentSlot>,
}

impl EnvironmentLayout {
    /// Find a slot by name
    pub fn find(&self, name: &str) -> Option<u16> {
        self.slots
            .iter()
            .rposition(|s| &*s.name == name)
            .map(|i| i as u16)
    }
}

/// Target of a jump that leaves one or more `finally`-protected regions
///
/// The interpreter runs every `finally` handler above `try_depth` before landing on
/// `target` with the environment chain popped back to `env_depth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpFlowRecord {
    /// Absolute instruction index to land on
    pub target: u32,
    /// Handler stack depth at the target
    pub try_depth: u16,
    /// Environment depth at the target, relative to function entry
    pub env_depth: u16,
    /// Pending completion record depth at the target
    pub completion_depth: u16,
}

/// Strings of one tagged template call site
///
/// `cooked` is `None` where the literal text has an invalid escape sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSite {
    /// Cooked strings, one per quasi
    pub cooked: Vec<Option<Box<str>>>,
    /// Raw source strings, one per quasi
    pub raw: Vec<Box<str>>,
}

/// Declarations instantiated by [`Instruction::DeclareGlobals`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalDeclarations {
    /// `var` names (created as `undefined` when absent)
    pub vars: Vec<Box<str>>,
    /// Hoisted function names
    pub functions: Vec<Box<str>>,
    /// Top-level `let`/`const` names with their const flag
    pub lexicals: Vec<(Box<str>, bool)>,
}

impl GlobalDeclarations {
    /// Check if nothing is declared
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.functions.is_empty() && self.lexicals.is_empty()
    }
}

/// A compiled function, script body or eval body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ByteCodeBlock {
    /// Function name (`None` for anonymous functions and script bodies)
    pub name: Option<String>,
    /// Function flags
    pub flags: FunctionFlags,
    /// Number of formal parameters before any rest parameter
    pub param_count: u16,
    /// Value of the function's `length`: parameters before the first default
    pub length: u16,
    /// Has a rest parameter
    pub has_rest: bool,
    /// Declared names with their storage
    pub identifiers: Vec<IdentifierInfo>,
    /// Instruction stream
    pub instructions: Vec<Instruction>,
    /// String and overflow number constants
    pub constants: ConstantPool,
    /// Number literals held in registers
    pub numeral_literals: NumeralPool,
    /// Temporaries used by expression evaluation
    pub required_operand_register_number: u16,
    /// `this` plus register-allocated variables
    pub stack_allocated_variable_size: u16,
    /// Size of the register file
    pub required_total_register_number: u32,
    /// Complex jump targets
    pub jump_flow_records: Vec<JumpFlowRecord>,
    /// Heap environment layouts referenced by `PushEnvironment`
    pub environment_layouts: Vec<EnvironmentLayout>,
    /// Layout of the environment created on entry, if any binding is captured
    pub function_environment: Option<u32>,
    /// Number of inline cache sites
    pub inline_cache_count: u32,
    /// Top-level declarations (script and indirect eval bodies)
    pub global_declarations: GlobalDeclarations,
    /// Nested functions, as indices into [`crate::Script::functions`]
    pub children: Vec<u32>,
    /// Tagged template call sites referenced by `GetTemplateObject`
    pub templates: Vec<TemplateSite>,
    /// Instruction index to source location
    pub source_map: SourceMap,
}

impl ByteCodeBlock {
    /// Create an empty block
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Get the function name or `<anonymous>`
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    /// Register index of the `this` slot
    #[inline]
    pub fn this_register(&self) -> u16 {
        self.required_operand_register_number
    }

    /// First register holding a numeral literal
    #[inline]
    pub fn numeral_literal_base(&self) -> u32 {
        self.required_operand_register_number as u32 + self.stack_allocated_variable_size as u32
    }

    /// Check if function is in strict mode
    #[inline]
    pub fn is_strict(&self) -> bool {
        self.flags.is_strict
    }

    /// Check if function is a generator
    #[inline]
    pub fn is_generator(&self) -> bool {
        self.flags.is_generator
    }

    /// Check if function is async
    #[inline]
    pub fn is_async(&self) -> bool {
        self.flags.is_async
    }

    /// Render a human readable listing
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "function {} (params: {}{}, registers: {} operand + {} stack + {} literal = {})",
            self.display_name(),
            self.param_count,
            if self.has_rest { " + rest" } else { "" },
            self.required_operand_register_number,
            self.stack_allocated_variable_size,
            self.numeral_literals.len(),
            self.required_total_register_number,
        );
        if !self.constants.is_empty() {
            let _ = writeln!(out, "  constants:");
            for (i, c) in self.constants.iter().enumerate() {
                match c {
                    Constant::String(s) => {
                        let _ = writeln!(out, "    #{i}: {s:?}");
                    }
                    Constant::Number(n) => {
                        let _ = writeln!(out, "    #{i}: {n}");
                    }
                }
            }
        }
        if !self.numeral_literals.is_empty() {
            let base = self.numeral_literal_base();
            let _ = writeln!(out, "  literals:");
            for (i, n) in self.numeral_literals.values().iter().enumerate() {
                let _ = writeln!(out, "    r{}: {n}", base + i as u32);
            }
        }
        for (i, record) in self.jump_flow_records.iter().enumerate() {
            let _ = writeln!(
                out,
                "  jump record {i}: -> {} (try depth {}, env depth {})",
                record.target, record.try_depth, record.env_depth
            );
        }
        let _ = writeln!(out, "  code:");
        for (pc, insn) in self.instructions.iter().enumerate() {
            let line = self.source_map.find(pc as u32).map(|e| e.line).unwrap_or(0);
            let _ = writeln!(out, "    {pc:04} [{line:>4}] {insn:?}");
        }
        out
    }
}

/// Source location mapping
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMap {
    /// Entries mapping instruction index to source location
    pub entries: Vec<SourceMapEntry>,
}

/// A single source map entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SourceMapEntry {
    /// Instruction index
    pub instruction_index: u32,
    /// Source file offset (bytes)
    pub source_offset: u32,
    /// Line number (1-indexed)
    pub line: u32,
    /// Column number (1-indexed)
    pub column: u32,
}

impl SourceMap {
    /// Create a new empty source map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping entry
    ///
    /// A later entry for the same instruction replaces the earlier one.
    pub fn add(&mut self, instruction_index: u32, source_offset: u32, line: u32, column: u32) {
        let entry = SourceMapEntry {
            instruction_index,
            source_offset,
            line,
            column,
        };
        match self.entries.last_mut() {
            Some(last) if last.instruction_index == instruction_index => *last = entry,
            _ => self.entries.push(entry),
        }
    }

    /// Find source location for instruction index
    pub fn find(&self, instruction_index: u32) -> Option<&SourceMapEntry> {
        let idx = self
            .entries
            .binary_search_by_key(&instruction_index, |e| e.instruction_index);

        match idx {
            Ok(i) => Some(&self.entries[i]),
            Err(i) if i > 0 => Some(&self.entries[i - 1]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::Register;

    #[test]
    fn test_block_register_layout() {
        let mut block = ByteCodeBlock::new(Some("add".into()));
        block.required_operand_register_number = 3;
        block.stack_allocated_variable_size = 2;
        block.numeral_literals.add(1.5, 16);
        block.required_total_register_number = 6;
        block.instructions.push(Instruction::Add {
            dst: Register(0),
            lhs: Register(3),
            rhs: Register(5),
        });
        block.instructions.push(Instruction::Return { src: Register(0) });

        assert_eq!(block.display_name(), "add");
        assert_eq!(block.this_register(), 3);
        assert_eq!(block.numeral_literal_base(), 5);

        let listing = block.dump();
        assert!(listing.contains("function add"));
        assert!(listing.contains("r5: 1.5"));
        assert!(listing.contains("0001"));
    }

    #[test]
    fn test_constructor_flags() {
        let plain = FunctionFlags::default();
        assert!(plain.is_constructor());
        let arrow = FunctionFlags {
            is_arrow: true,
            ..FunctionFlags::default()
        };
        assert!(!arrow.is_constructor());
        let class = FunctionFlags {
            is_class_constructor: true,
            is_derived_constructor: true,
            ..FunctionFlags::default()
        };
        assert!(class.is_constructor());
    }

    #[test]
    fn test_environment_layout_find_last() {
        let layout = EnvironmentLayout {
            slots: vec![
                EnvironmentSlot {
                    name: "a".into(),
                    kind: BindingKind::Parameter(0),
                },
                EnvironmentSlot {
                    name: "a".into(),
                    kind: BindingKind::Parameter(1),
                },
            ],
        };
        assert_eq!(layout.find("a"), Some(1));
        assert_eq!(layout.find("b"), None);
    }

    #[test]
    fn test_source_map() {
        let mut map = SourceMap::new();
        map.add(0, 0, 1, 1);
        map.add(5, 20, 2, 5);
        map.add(10, 50, 3, 1);

        assert_eq!(map.find(0).unwrap().line, 1);
        assert_eq!(map.find(5).unwrap().line, 2);
        assert_eq!(map.find(7).unwrap().line, 2);
        assert_eq!(map.find(10).unwrap().line, 3);
    }
}
