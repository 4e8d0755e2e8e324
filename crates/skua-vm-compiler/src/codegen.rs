//! Bytecode emission state for one function
//!
//! Registers are handed out in three disjoint virtual ranges while a function is
//! being generated: operand temporaries start at 0, stack allocated variables at
//! [`STACK_BASE`] and pooled numeral literals at [`LITERAL_BASE`]. Once the body is
//! complete, [`FunctionContext::finish`] relocates every register to the final
//! `[operands][this + variables][literals]` layout.

use skua_vm_bytecode::{
    BindingStorage, ByteCodeBlock, ConstantIndex, IcIndex, IdentifierInfo, Instruction,
    JumpFlowRecord, JumpOffset, NUMERAL_LITERAL_LIMIT, REGULAR_REGISTER_LIMIT, Register,
    VARIABLE_LIMIT,
};

use crate::error::{CompileError, CompileResult};

/// Virtual base of stack allocated variables
pub(crate) const STACK_BASE: u16 = REGULAR_REGISTER_LIMIT;
/// Virtual base of numeral literal registers
pub(crate) const LITERAL_BASE: u16 = REGULAR_REGISTER_LIMIT * 2;

/// Stack-discipline allocator for operand registers
#[derive(Debug)]
pub struct RegisterAllocator {
    next: u16,
    max: u16,
    limit: u16,
}

impl RegisterAllocator {
    /// Create an allocator that fails past `limit` registers
    pub fn new(limit: u16) -> Self {
        Self {
            next: 0,
            max: 0,
            limit: limit.min(REGULAR_REGISTER_LIMIT),
        }
    }

    /// Allocate one register
    pub fn alloc(&mut self) -> CompileResult<Register> {
        self.alloc_range(1)
    }

    /// Allocate `count` consecutive registers, returning the first
    pub fn alloc_range(&mut self, count: u16) -> CompileResult<Register> {
        let first = self.next;
        let end = first as u32 + count as u32;
        if end > self.limit as u32 {
            return Err(CompileError::RegisterLimitExceeded { limit: self.limit });
        }
        self.next = end as u16;
        self.max = self.max.max(self.next);
        Ok(Register(first))
    }

    /// Get current position (for restoring later)
    pub fn position(&self) -> u16 {
        self.next
    }

    /// Release everything allocated after `pos`
    pub fn restore(&mut self, pos: u16) {
        debug_assert!(pos <= self.next);
        self.next = pos;
    }

    /// Get maximum registers used
    pub fn max_used(&self) -> u16 {
        self.max
    }
}

/// Saved allocator position; registers allocated after it are released by
/// [`FunctionContext::close_register_scope`]
#[must_use]
#[derive(Debug, Clone, Copy)]
pub struct RegisterScope(u16);

/// Patch site of a forward jump
#[derive(Debug, Clone, Copy)]
pub(crate) enum JumpSite {
    /// Instruction whose offset needs patching
    Direct(usize),
    /// Jump flow record whose target needs patching
    Record(u32),
}

/// Breakable statement being generated
#[derive(Debug)]
pub(crate) struct ControlEntry {
    pub kind: ControlKind,
    pub labels: Vec<String>,
    pub breaks: Vec<JumpSite>,
    pub continues: Vec<JumpSite>,
    /// Depths at the statement's break/continue targets
    pub try_depth: u16,
    pub env_depth: u16,
    pub completion_depth: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlKind {
    Loop,
    Switch,
    Labeled,
}

/// Function being compiled
#[derive(Debug)]
pub struct FunctionContext {
    /// Block under construction
    pub block: ByteCodeBlock,
    /// Operand register allocator
    pub registers: RegisterAllocator,
    stack_variables: u16,
    ic_count: u32,
    pub(crate) control: Vec<ControlEntry>,
    /// Kind of each active exception handler (`true` for finally)
    pub(crate) handlers: Vec<bool>,
    pub(crate) env_depth: u16,
    pub(crate) completion_depth: u16,
    /// Index of this function's first scope in the generator's scope stack
    pub(crate) scope_base: usize,
    /// Completion value register of script and eval bodies
    pub(crate) completion: Option<Register>,
    /// Labels waiting for the next breakable statement
    pub(crate) pending_labels: Vec<String>,
}

impl FunctionContext {
    /// Create a new function context
    pub fn new(name: Option<String>, register_limit: u16) -> Self {
        Self {
            block: ByteCodeBlock::new(name),
            registers: RegisterAllocator::new(register_limit),
            stack_variables: 1,
            ic_count: 0,
            control: Vec::new(),
            handlers: Vec::new(),
            env_depth: 0,
            completion_depth: 0,
            scope_base: 0,
            completion: None,
            pending_labels: Vec::new(),
        }
    }

    /// Emit an instruction
    #[inline]
    pub fn emit(&mut self, instruction: Instruction) {
        self.block.instructions.push(instruction);
    }

    /// Get current instruction index (for patching jumps)
    #[inline]
    pub fn current_index(&self) -> usize {
        self.block.instructions.len()
    }

    /// Emit a jump-carrying instruction whose offset is patched later
    pub fn emit_jump(&mut self, instruction: Instruction) -> usize {
        let index = self.current_index();
        self.emit(instruction);
        index
    }

    /// Point the jump at `index` to `target`
    pub fn patch_jump(&mut self, index: usize, target: usize) -> CompileResult<()> {
        let offset = target as i64 - index as i64;
        match self
            .block
            .instructions
            .get_mut(index)
            .and_then(Instruction::jump_offset_mut)
        {
            Some(slot) => {
                *slot = JumpOffset(offset as i32);
                Ok(())
            }
            None => Err(CompileError::internal(format!(
                "instruction {index} is not a jump"
            ))),
        }
    }

    /// Point the jump at `index` to the current position
    pub fn patch_here(&mut self, index: usize) -> CompileResult<()> {
        let here = self.current_index();
        self.patch_jump(index, here)
    }

    /// Patch a jump site to `target`
    pub(crate) fn patch_site(&mut self, site: JumpSite, target: usize) -> CompileResult<()> {
        match site {
            JumpSite::Direct(index) => self.patch_jump(index, target),
            JumpSite::Record(record) => match self.block.jump_flow_records.get_mut(record as usize) {
                Some(r) => {
                    r.target = target as u32;
                    Ok(())
                }
                None => Err(CompileError::internal("unknown jump record")),
            },
        }
    }

    /// Emit a backward jump to `target`
    pub fn emit_loop(&mut self, target: usize) {
        let offset = target as i64 - self.current_index() as i64;
        self.emit(Instruction::Jump {
            offset: JumpOffset(offset as i32),
        });
    }

    /// Add a jump record that lands at the depths of `entry`
    pub(crate) fn add_jump_record(&mut self, try_depth: u16, env_depth: u16, completion_depth: u16) -> u32 {
        let index = self.block.jump_flow_records.len() as u32;
        self.block.jump_flow_records.push(JumpFlowRecord {
            target: 0,
            try_depth,
            env_depth,
            completion_depth,
        });
        index
    }

    /// Start a register scope
    pub fn open_register_scope(&self) -> RegisterScope {
        RegisterScope(self.registers.position())
    }

    /// Release registers allocated since `scope` was opened
    pub fn close_register_scope(&mut self, scope: RegisterScope) {
        self.registers.restore(scope.0);
    }

    /// Allocate an operand register
    pub fn alloc(&mut self) -> CompileResult<Register> {
        self.registers.alloc()
    }

    /// Allocate consecutive operand registers
    pub fn alloc_range(&mut self, count: u16) -> CompileResult<Register> {
        self.registers.alloc_range(count)
    }

    /// Register holding `this`
    pub fn this_register(&self) -> Register {
        Register(STACK_BASE)
    }

    /// Allocate a stack variable register
    pub fn alloc_variable(&mut self) -> CompileResult<Register> {
        if self.stack_variables >= VARIABLE_LIMIT {
            return Err(CompileError::TooManyLocals(VARIABLE_LIMIT));
        }
        let reg = Register(STACK_BASE + self.stack_variables);
        self.stack_variables += 1;
        Ok(reg)
    }

    /// Register of a pooled numeral literal, `None` once the pool is full
    pub fn numeral(&mut self, value: f64) -> Option<Register> {
        self.block
            .numeral_literals
            .add(value, NUMERAL_LITERAL_LIMIT as usize)
            .map(|index| Register(LITERAL_BASE + index))
    }

    /// Add a string constant
    pub fn string_constant(&mut self, value: &str) -> ConstantIndex {
        ConstantIndex(self.block.constants.add_string(value))
    }

    /// Add a number constant
    pub fn number_constant(&mut self, value: f64) -> ConstantIndex {
        ConstantIndex(self.block.constants.add_number(value))
    }

    /// Allocate an inline cache site
    pub fn next_ic(&mut self) -> IcIndex {
        let index = IcIndex(self.ic_count);
        self.ic_count += 1;
        index
    }

    /// Record a source location for the next instruction
    pub fn mark(&mut self, offset: u32, line: u32, column: u32) {
        let index = self.current_index() as u32;
        self.block.source_map.add(index, offset, line, column);
    }

    /// Handler stack depth
    pub fn try_depth(&self) -> u16 {
        self.handlers.len() as u16
    }

    /// Relocate registers and seal the block
    pub fn finish(mut self) -> ByteCodeBlock {
        // Forward jumps may target the end of the stream.
        self.emit(Instruction::ReturnUndefined);

        let operands = self.registers.max_used();
        let variables = self.stack_variables;
        let literals = self.block.numeral_literals.len() as u16;
        let relocate = move |reg: &mut Register| {
            let raw = reg.0;
            reg.0 = if raw >= LITERAL_BASE {
                operands + variables + (raw - LITERAL_BASE)
            } else if raw >= STACK_BASE {
                operands + (raw - STACK_BASE)
            } else {
                raw
            };
        };

        for instruction in &mut self.block.instructions {
            instruction.for_each_register_mut(relocate);
        }
        for info in &mut self.block.identifiers {
            if let BindingStorage::Register(index) = &mut info.storage {
                let mut reg = Register(*index);
                relocate(&mut reg);
                *index = reg.0;
            }
        }

        self.block.required_operand_register_number = operands;
        self.block.stack_allocated_variable_size = variables;
        self.block.required_total_register_number =
            operands as u32 + variables as u32 + literals as u32;
        self.block.inline_cache_count = self.ic_count;
        self.block
    }

    /// Record a declared name in the identifier table
    pub fn record_identifier(&mut self, info: IdentifierInfo) {
        self.block.identifiers.push(info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_limit() {
        let mut regs = RegisterAllocator::new(2);
        assert_eq!(regs.alloc().unwrap(), Register(0));
        assert_eq!(regs.alloc().unwrap(), Register(1));
        assert!(matches!(
            regs.alloc(),
            Err(CompileError::RegisterLimitExceeded { limit: 2 })
        ));
    }

    #[test]
    fn test_register_scope_releases() {
        let mut ctx = FunctionContext::new(None, 16);
        let keep = ctx.alloc().unwrap();
        let scope = ctx.open_register_scope();
        ctx.alloc_range(3).unwrap();
        ctx.close_register_scope(scope);
        assert_eq!(ctx.alloc().unwrap(), Register(keep.0 + 1));
        assert_eq!(ctx.registers.max_used(), 4);
    }

    #[test]
    fn test_relocation_layout() {
        let mut ctx = FunctionContext::new(Some("f".into()), 16);
        let tmp = ctx.alloc_range(2).unwrap();
        let var = ctx.alloc_variable().unwrap();
        let lit = ctx.numeral(2.5).unwrap();
        ctx.emit(Instruction::Add {
            dst: tmp,
            lhs: var,
            rhs: lit,
        });
        ctx.emit(Instruction::Move {
            dst: tmp.offset(1),
            src: ctx.this_register(),
        });
        ctx.emit(Instruction::Return { src: tmp });
        let block = ctx.finish();

        assert_eq!(block.required_operand_register_number, 2);
        assert_eq!(block.stack_allocated_variable_size, 2);
        assert_eq!(block.required_total_register_number, 5);
        assert_eq!(block.this_register(), 2);
        assert_eq!(
            block.instructions[0],
            Instruction::Add {
                dst: Register(0),
                lhs: Register(3),
                rhs: Register(4)
            }
        );
        assert_eq!(
            block.instructions[1],
            Instruction::Move {
                dst: Register(1),
                src: Register(2)
            }
        );
    }

    #[test]
    fn test_patch_forward_jump() {
        let mut ctx = FunctionContext::new(None, 16);
        let jump = ctx.emit_jump(Instruction::Jump {
            offset: JumpOffset(0),
        });
        ctx.emit(Instruction::Nop);
        ctx.patch_here(jump).unwrap();
        assert_eq!(
            ctx.block.instructions[0],
            Instruction::Jump {
                offset: JumpOffset(2)
            }
        );
        assert!(ctx.patch_jump(1, 0).is_err());
    }

    #[test]
    fn test_implicit_return_appended() {
        let ctx = FunctionContext::new(None, 16);
        let block = ctx.finish();
        assert_eq!(block.instructions, vec![Instruction::ReturnUndefined]);
    }
}
