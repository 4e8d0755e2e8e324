//! Bytecode instructions (opcodes)

use serde::{Deserialize, Serialize};

use crate::error::BytecodeError;
use crate::operand::{ConstantIndex, FunctionIndex, IcIndex, JumpOffset, Register};

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $byte:literal,)*) => {
        /// Bytecode opcodes
        ///
        /// One opcode per [`Instruction`] variant. The numeric value is stable across
        /// releases of the same [`crate::BYTECODE_VERSION`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum Opcode {
            $($(#[$doc])* $name = $byte,)*
        }

        impl Opcode {
            /// Decode an opcode byte
            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Get the name of this opcode
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)*
                }
            }
        }
    };
}

opcodes! {
    // ==================== Constants ====================
    /// dst = undefined
    LoadUndefined = 0x00,
    /// dst = null
    LoadNull = 0x01,
    /// dst = true
    LoadTrue = 0x02,
    /// dst = false
    LoadFalse = 0x03,
    /// dst = <empty> (uninitialized lexical binding)
    LoadEmpty = 0x04,
    /// dst = imm32
    LoadInt32 = 0x05,
    /// dst = constants\[idx\]
    LoadConst = 0x06,
    /// dst = src
    Move = 0x07,

    // ==================== Environments ====================
    /// dst = environment(depth).slots\[slot\]
    GetHeap = 0x10,
    /// environment(depth).slots\[slot\] = src
    SetHeap = 0x11,
    /// throw ReferenceError if src is <empty>
    CheckInitialized = 0x12,
    /// throw TypeError for assignment to a constant
    ThrowConstAssignment = 0x13,
    /// push a declarative environment
    PushEnvironment = 0x14,
    /// pop the innermost environment
    PopEnvironment = 0x15,
    /// replace the innermost environment with a copy of itself
    RecreateEnvironment = 0x16,
    /// push an object environment (`with`)
    PushWithEnvironment = 0x17,
    /// dst = global\[name\]
    GetGlobal = 0x18,
    /// global\[name\] = src
    SetGlobal = 0x19,
    /// dst = typeof global\[name\] without ReferenceError
    TypeOfGlobal = 0x1A,
    /// instantiate top-level declarations
    DeclareGlobals = 0x1B,
    /// initialize a top-level lexical binding
    InitGlobalLexical = 0x1C,
    /// dst = lookup(name) through the environment chain
    GetByName = 0x1D,
    /// lookup(name) = src through the environment chain
    SetByName = 0x1E,
    /// dst = typeof lookup(name)
    TypeOfByName = 0x1F,
    /// dst = delete lookup(name)
    DeleteByName = 0x20,

    // ==================== Function prologue ====================
    /// dst = arguments\[index\]
    GetArgument = 0x28,
    /// dst = arguments object
    CreateArguments = 0x29,
    /// dst = \[...arguments.slice(start)\]
    CreateRestParameter = 0x2A,
    /// dst = closure over functions\[func\]
    CreateFunction = 0x2B,
    /// dst = the running function object
    LoadCallee = 0x2C,
    /// dst = new.target
    LoadNewTarget = 0x2D,
    /// dst = method closure over functions\[func\] with a home object
    CreateMethod = 0x2E,

    // ==================== Properties ====================
    /// dst = obj.name (inline cached)
    GetNamed = 0x30,
    /// obj.name = src (inline cached)
    SetNamed = 0x31,
    /// dst = obj\[key\]
    GetKeyed = 0x32,
    /// obj\[key\] = src
    SetKeyed = 0x33,
    /// define own data property obj.name = src (inline cached)
    DefineOwnNamed = 0x34,
    /// define own data property obj\[key\] = src
    DefineOwnKeyed = 0x35,
    /// define accessor getter on obj\[key\]
    DefineGetter = 0x36,
    /// define accessor setter on obj\[key\]
    DefineSetter = 0x37,
    /// copy own enumerable properties of src into dst
    CopyDataProperties = 0x38,
    /// dst = copy of src without the excluded keys
    CopyRestProperties = 0x39,
    /// dst = delete obj\[key\]
    DeleteKeyed = 0x3A,
    /// dst = key in obj
    In = 0x3B,
    /// dst = lhs instanceof rhs
    InstanceOf = 0x3C,
    /// dst = {}
    NewObject = 0x3D,
    /// dst = \[\] with preallocated length hint
    NewArray = 0x3E,
    /// arr.push(src)
    ArrayPush = 0x3F,
    /// arr.length += 1 (hole)
    ArrayPushHole = 0x40,
    /// arr.push(...src)
    ArraySpread = 0x41,
    /// dst = template object of a tagged template site
    GetTemplateObject = 0x42,

    // ==================== Arithmetic ====================
    /// dst = lhs + rhs
    Add = 0x48,
    /// dst = lhs - rhs
    Sub = 0x49,
    /// dst = lhs * rhs
    Mul = 0x4A,
    /// dst = lhs / rhs
    Div = 0x4B,
    /// dst = lhs % rhs
    Mod = 0x4C,
    /// dst = lhs ** rhs
    Exp = 0x4D,
    /// dst = lhs & rhs
    BitAnd = 0x4E,
    /// dst = lhs | rhs
    BitOr = 0x4F,
    /// dst = lhs ^ rhs
    BitXor = 0x50,
    /// dst = lhs << rhs
    Shl = 0x51,
    /// dst = lhs >> rhs
    Shr = 0x52,
    /// dst = lhs >>> rhs
    Ushr = 0x53,
    /// dst = -src
    Neg = 0x54,
    /// dst = +src
    ToNumber = 0x55,
    /// dst = ToNumeric(src)
    ToNumeric = 0x56,
    /// dst = ~src
    BitNot = 0x57,
    /// dst = src + 1
    Inc = 0x58,
    /// dst = src - 1
    Dec = 0x59,
    /// dst = ToString(src)
    ToString = 0x5A,
    /// dst = ToPropertyKey(src)
    ToPropertyKey = 0x5B,

    // ==================== Comparison ====================
    /// dst = lhs == rhs
    Eq = 0x60,
    /// dst = lhs != rhs
    Ne = 0x61,
    /// dst = lhs === rhs
    StrictEq = 0x62,
    /// dst = lhs !== rhs
    StrictNe = 0x63,
    /// dst = lhs < rhs
    Lt = 0x64,
    /// dst = lhs <= rhs
    Le = 0x65,
    /// dst = lhs > rhs
    Gt = 0x66,
    /// dst = lhs >= rhs
    Ge = 0x67,
    /// dst = !src
    Not = 0x68,
    /// dst = typeof src
    TypeOf = 0x69,

    // ==================== Control flow ====================
    /// pc += offset
    Jump = 0x70,
    /// if cond { pc += offset }
    JumpIfTrue = 0x71,
    /// if !cond { pc += offset }
    JumpIfFalse = 0x72,
    /// if src is null or undefined { pc += offset }
    JumpIfNullish = 0x73,
    /// if src is not undefined { pc += offset }
    JumpIfNotUndefined = 0x74,
    /// jump through enclosing finally blocks
    JumpComplex = 0x75,
    /// push a catch handler
    EnterTryCatch = 0x76,
    /// push a finally handler
    EnterTryFinally = 0x77,
    /// pop the innermost handler
    LeaveTry = 0x78,
    /// complete a finally block
    EndFinally = 0x79,
    /// return src
    Return = 0x7A,
    /// return undefined
    ReturnUndefined = 0x7B,
    /// throw src
    Throw = 0x7C,
    /// throw a new error of the given kind
    ThrowError = 0x7D,

    // ==================== Calls ====================
    /// dst = callee(args...)
    Call = 0x80,
    /// dst = receiver.callee(args...)
    CallWithReceiver = 0x81,
    /// dst = receiver.callee(...array)
    CallSpread = 0x82,
    /// dst = eval(args...) with direct eval semantics
    CallEval = 0x83,
    /// dst = new callee(args...)
    New = 0x84,
    /// dst = new callee(...array)
    NewSpread = 0x85,

    // ==================== Iteration ====================
    /// dst = src\[Symbol.iterator\]()
    GetIterator = 0x88,
    /// dst = iter.next().value or jump when done
    IteratorStep = 0x89,
    /// iter.return()
    IteratorClose = 0x8A,
    /// dst = for-in enumerator of src
    ForInEnumerate = 0x8B,
    /// dst = next enumerable key or jump when exhausted
    ForInNext = 0x8C,
    /// dst = src\[Symbol.asyncIterator\]() or a wrapped sync iterator
    GetAsyncIterator = 0x8D,
    /// dst = iter.next(), a promise for async-from-sync records
    AsyncIteratorNext = 0x8E,
    /// dst = dst.value of an awaited result, or jump when done
    AsyncIteratorComplete = 0x8F,
    /// dst = iter.return(), or jump when there is nothing to await
    AsyncIteratorReturn = 0x87,

    // ==================== Generators ====================
    /// pause after argument binding of a generator or async function
    GeneratorsInitialize = 0x90,
    /// dst = yield src
    Yield = 0x91,
    /// dst = yield* iter
    YieldDelegate = 0x92,
    /// dst = await src
    Await = 0x93,

    // ==================== Classes ====================
    /// wire a class constructor to a new prototype object; dst = prototype
    CreateClass = 0x98,
    /// define a non-enumerable method or accessor obj\[key\]
    DefineMethod = 0x99,
    /// attach the instance field initializer to a class constructor
    SetClassFields = 0x9A,
    /// throw ReferenceError if `this` is not yet bound
    CheckThis = 0x9B,
    /// dst = super(args...)
    SuperCall = 0x9C,
    /// dst = super(...array)
    SuperCallSpread = 0x9D,
    /// dst = super\[key\]
    GetSuper = 0x9E,
    /// super\[key\] = src
    SetSuper = 0x9F,

    // ==================== Misc ====================
    /// debugger statement
    Debugger = 0xF0,
    /// no operation
    Nop = 0xF1,
}

impl Opcode {
    /// Encode as a byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = BytecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_byte(byte).ok_or(BytecodeError::InvalidOpcode(byte))
    }
}

/// Error class thrown by [`Instruction::ThrowError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// TypeError
    TypeError,
    /// ReferenceError
    ReferenceError,
    /// RangeError
    RangeError,
    /// SyntaxError
    SyntaxError,
}

/// Property defined by [`Instruction::DefineMethod`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodKind {
    /// Writable data property
    Method,
    /// Accessor getter
    Getter,
    /// Accessor setter
    Setter,
}

/// A bytecode instruction with its operands
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    // Constants
    LoadUndefined { dst: Register },
    LoadNull { dst: Register },
    LoadTrue { dst: Register },
    LoadFalse { dst: Register },
    LoadEmpty { dst: Register },
    LoadInt32 { dst: Register, value: i32 },
    LoadConst { dst: Register, idx: ConstantIndex },
    Move { dst: Register, src: Register },

    // Environments
    GetHeap { dst: Register, depth: u16, slot: u16 },
    SetHeap { src: Register, depth: u16, slot: u16 },
    CheckInitialized { src: Register, name: ConstantIndex },
    ThrowConstAssignment { name: ConstantIndex },
    PushEnvironment { layout: u32 },
    PopEnvironment,
    RecreateEnvironment,
    PushWithEnvironment { obj: Register },
    GetGlobal { dst: Register, name: ConstantIndex, ic_index: IcIndex },
    SetGlobal { src: Register, name: ConstantIndex, ic_index: IcIndex, strict: bool },
    TypeOfGlobal { dst: Register, name: ConstantIndex },
    DeclareGlobals,
    InitGlobalLexical { src: Register, name: ConstantIndex },
    GetByName { dst: Register, name: ConstantIndex },
    SetByName { src: Register, name: ConstantIndex, strict: bool },
    TypeOfByName { dst: Register, name: ConstantIndex },
    DeleteByName { dst: Register, name: ConstantIndex },

    // Function prologue
    GetArgument { dst: Register, index: u16 },
    CreateArguments { dst: Register },
    CreateRestParameter { dst: Register, start: u16 },
    CreateFunction { dst: Register, func: FunctionIndex },
    LoadCallee { dst: Register },
    LoadNewTarget { dst: Register },
    CreateMethod { dst: Register, func: FunctionIndex, home: Register },

    // Properties
    GetNamed { dst: Register, obj: Register, name: ConstantIndex, ic_index: IcIndex },
    SetNamed { obj: Register, name: ConstantIndex, src: Register, ic_index: IcIndex, strict: bool },
    GetKeyed { dst: Register, obj: Register, key: Register },
    SetKeyed { obj: Register, key: Register, src: Register, strict: bool },
    DefineOwnNamed { obj: Register, name: ConstantIndex, src: Register, ic_index: IcIndex },
    DefineOwnKeyed { obj: Register, key: Register, src: Register },
    DefineGetter { obj: Register, key: Register, func: Register },
    DefineSetter { obj: Register, key: Register, func: Register },
    CopyDataProperties { dst: Register, src: Register },
    CopyRestProperties { dst: Register, src: Register, excluded: Register, excluded_count: u16 },
    DeleteKeyed { dst: Register, obj: Register, key: Register, strict: bool },
    In { dst: Register, key: Register, obj: Register },
    InstanceOf { dst: Register, lhs: Register, rhs: Register },
    NewObject { dst: Register },
    NewArray { dst: Register, capacity: u32 },
    ArrayPush { arr: Register, src: Register },
    ArrayPushHole { arr: Register },
    ArraySpread { arr: Register, src: Register },
    GetTemplateObject { dst: Register, site: u32 },

    // Arithmetic
    Add { dst: Register, lhs: Register, rhs: Register },
    Sub { dst: Register, lhs: Register, rhs: Register },
    Mul { dst: Register, lhs: Register, rhs: Register },
    Div { dst: Register, lhs: Register, rhs: Register },
    Mod { dst: Register, lhs: Register, rhs: Register },
    Exp { dst: Register, lhs: Register, rhs: Register },
    BitAnd { dst: Register, lhs: Register, rhs: Register },
    BitOr { dst: Register, lhs: Register, rhs: Register },
    BitXor { dst: Register, lhs: Register, rhs: Register },
    Shl { dst: Register, lhs: Register, rhs: Register },
    Shr { dst: Register, lhs: Register, rhs: Register },
    Ushr { dst: Register, lhs: Register, rhs: Register },
    Neg { dst: Register, src: Register },
    ToNumber { dst: Register, src: Register },
    ToNumeric { dst: Register, src: Register },
    BitNot { dst: Register, src: Register },
    Inc { dst: Register, src: Register },
    Dec { dst: Register, src: Register },
    ToString { dst: Register, src: Register },
    ToPropertyKey { dst: Register, src: Register },

    // Comparison
    Eq { dst: Register, lhs: Register, rhs: Register },
    Ne { dst: Register, lhs: Register, rhs: Register },
    StrictEq { dst: Register, lhs: Register, rhs: Register },
    StrictNe { dst: Register, lhs: Register, rhs: Register },
    Lt { dst: Register, lhs: Register, rhs: Register },
    Le { dst: Register, lhs: Register, rhs: Register },
    Gt { dst: Register, lhs: Register, rhs: Register },
    Ge { dst: Register, lhs: Register, rhs: Register },
    Not { dst: Register, src: Register },
    TypeOf { dst: Register, src: Register },

    // Control flow
    Jump { offset: JumpOffset },
    JumpIfTrue { cond: Register, offset: JumpOffset },
    JumpIfFalse { cond: Register, offset: JumpOffset },
    JumpIfNullish { src: Register, offset: JumpOffset },
    JumpIfNotUndefined { src: Register, offset: JumpOffset },
    JumpComplex { record: u32 },
    EnterTryCatch { handler: JumpOffset, exception: Register },
    EnterTryFinally { handler: JumpOffset },
    LeaveTry,
    EndFinally,
    Return { src: Register },
    ReturnUndefined,
    Throw { src: Register },
    ThrowError { kind: ErrorKind, message: ConstantIndex },

    // Calls
    Call { dst: Register, callee: Register, args: Register, argc: u16 },
    CallWithReceiver { dst: Register, callee: Register, receiver: Register, args: Register, argc: u16 },
    CallSpread { dst: Register, callee: Register, receiver: Register, array: Register },
    CallEval { dst: Register, callee: Register, args: Register, argc: u16, strict: bool },
    New { dst: Register, callee: Register, args: Register, argc: u16 },
    NewSpread { dst: Register, callee: Register, array: Register },

    // Iteration
    GetIterator { dst: Register, src: Register },
    IteratorStep { dst: Register, iter: Register, done: JumpOffset },
    IteratorClose { iter: Register },
    ForInEnumerate { dst: Register, src: Register },
    ForInNext { dst: Register, iter: Register, done: JumpOffset },
    GetAsyncIterator { dst: Register, src: Register },
    AsyncIteratorNext { dst: Register, iter: Register },
    AsyncIteratorComplete { dst: Register, iter: Register, done: JumpOffset },
    AsyncIteratorReturn { dst: Register, iter: Register, skip: JumpOffset },

    // Generators
    GeneratorsInitialize,
    Yield { dst: Register, src: Register },
    YieldDelegate { dst: Register, iter: Register },
    Await { dst: Register, src: Register },

    // Classes
    CreateClass { dst: Register, ctor: Register, heritage: Register, derived: bool },
    DefineMethod { obj: Register, key: Register, func: Register, kind: MethodKind },
    SetClassFields { class: Register, func: Register, keys: Register, count: u16 },
    CheckThis { src: Register },
    SuperCall { dst: Register, args: Register, argc: u16 },
    SuperCallSpread { dst: Register, array: Register },
    GetSuper { dst: Register, key: Register },
    SetSuper { key: Register, src: Register, strict: bool },

    // Misc
    Debugger,
    Nop,
}

impl Instruction {
    /// Opcode of this instruction
    pub fn opcode(&self) -> Opcode {
        use Instruction as I;
        match self {
            I::LoadUndefined { .. } => Opcode::LoadUndefined,
            I::LoadNull { .. } => Opcode::LoadNull,
            I::LoadTrue { .. } => Opcode::LoadTrue,
            I::LoadFalse { .. } => Opcode::LoadFalse,
            I::LoadEmpty { .. } => Opcode::LoadEmpty,
            I::LoadInt32 { .. } => Opcode::LoadInt32,
            I::LoadConst { .. } => Opcode::LoadConst,
            I::Move { .. } => Opcode::Move,
            I::GetHeap { .. } => Opcode::GetHeap,
            I::SetHeap { .. } => Opcode::SetHeap,
            I::CheckInitialized { .. } => Opcode::CheckInitialized,
            I::ThrowConstAssignment { .. } => Opcode::ThrowConstAssignment,
            I::PushEnvironment { .. } => Opcode::PushEnvironment,
            I::PopEnvironment => Opcode::PopEnvironment,
            I::RecreateEnvironment => Opcode::RecreateEnvironment,
            I::PushWithEnvironment { .. } => Opcode::PushWithEnvironment,
            I::GetGlobal { .. } => Opcode::GetGlobal,
            I::SetGlobal { .. } => Opcode::SetGlobal,
            I::TypeOfGlobal { .. } => Opcode::TypeOfGlobal,
            I::DeclareGlobals => Opcode::DeclareGlobals,
            I::InitGlobalLexical { .. } => Opcode::InitGlobalLexical,
            I::GetByName { .. } => Opcode::GetByName,
            I::SetByName { .. } => Opcode::SetByName,
            I::TypeOfByName { .. } => Opcode::TypeOfByName,
            I::DeleteByName { .. } => Opcode::DeleteByName,
            I::GetArgument { .. } => Opcode::GetArgument,
            I::CreateArguments { .. } => Opcode::CreateArguments,
            I::CreateRestParameter { .. } => Opcode::CreateRestParameter,
            I::CreateFunction { .. } => Opcode::CreateFunction,
            I::LoadCallee { .. } => Opcode::LoadCallee,
            I::LoadNewTarget { .. } => Opcode::LoadNewTarget,
            I::CreateMethod { .. } => Opcode::CreateMethod,
            I::GetNamed { .. } => Opcode::GetNamed,
            I::SetNamed { .. } => Opcode::SetNamed,
            I::GetKeyed { .. } => Opcode::GetKeyed,
            I::SetKeyed { .. } => Opcode::SetKeyed,
            I::DefineOwnNamed { .. } => Opcode::DefineOwnNamed,
            I::DefineOwnKeyed { .. } => Opcode::DefineOwnKeyed,
            I::DefineGetter { .. } => Opcode::DefineGetter,
            I::DefineSetter { .. } => Opcode::DefineSetter,
            I::CopyDataProperties { .. } => Opcode::CopyDataProperties,
            I::CopyRestProperties { .. } => Opcode::CopyRestProperties,
            I::DeleteKeyed { .. } => Opcode::DeleteKeyed,
            I::In { .. } => Opcode::In,
            I::InstanceOf { .. } => Opcode::InstanceOf,
            I::NewObject { .. } => Opcode::NewObject,
            I::NewArray { .. } => Opcode::NewArray,
            I::ArrayPush { .. } => Opcode::ArrayPush,
            I::ArrayPushHole { .. } => Opcode::ArrayPushHole,
            I::ArraySpread { .. } => Opcode::ArraySpread,
            I::GetTemplateObject { .. } => Opcode::GetTemplateObject,
            I::Add { .. } => Opcode::Add,
            I::Sub { .. } => Opcode::Sub,
            I::Mul { .. } => Opcode::Mul,
            I::Div { .. } => Opcode::Div,
            I::Mod { .. } => Opcode::Mod,
            I::Exp { .. } => Opcode::Exp,
            I::BitAnd { .. } => Opcode::BitAnd,
            I::BitOr { .. } => Opcode::BitOr,
            I::BitXor { .. } => Opcode::BitXor,
            I::Shl { .. } => Opcode::Shl,
            I::Shr { .. } => Opcode::Shr,
            I::Ushr { .. } => Opcode::Ushr,
            I::Neg { .. } => Opcode::Neg,
            I::ToNumber { .. } => Opcode::ToNumber,
            I::ToNumeric { .. } => Opcode::ToNumeric,
            I::BitNot { .. } => Opcode::BitNot,
            I::Inc { .. } => Opcode::Inc,
            I::Dec { .. } => Opcode::Dec,
            I::ToString { .. } => Opcode::ToString,
            I::ToPropertyKey { .. } => Opcode::ToPropertyKey,
            I::Eq { .. } => Opcode::Eq,
            I::Ne { .. } => Opcode::Ne,
            I::StrictEq { .. } => Opcode::StrictEq,
            I::StrictNe { .. } => Opcode::StrictNe,
            I::Lt { .. } => Opcode::Lt,
            I::Le { .. } => Opcode::Le,
            I::Gt { .. } => Opcode::Gt,
            I::Ge { .. } => Opcode::Ge,
            I::Not { .. } => Opcode::Not,
            I::TypeOf { .. } => Opcode::TypeOf,
            I::Jump { .. } => Opcode::Jump,
            I::JumpIfTrue { .. } => Opcode::JumpIfTrue,
            I::JumpIfFalse { .. } => Opcode::JumpIfFalse,
            I::JumpIfNullish { .. } => Opcode::JumpIfNullish,
            I::JumpIfNotUndefined { .. } => Opcode::JumpIfNotUndefined,
            I::JumpComplex { .. } => Opcode::JumpComplex,
            I::EnterTryCatch { .. } => Opcode::EnterTryCatch,
            I::EnterTryFinally { .. } => Opcode::EnterTryFinally,
            I::LeaveTry => Opcode::LeaveTry,
            I::EndFinally => Opcode::EndFinally,
            I::Return { .. } => Opcode::Return,
            I::ReturnUndefined => Opcode::ReturnUndefined,
            I::Throw { .. } => Opcode::Throw,
            I::ThrowError { .. } => Opcode::ThrowError,
            I::Call { .. } => Opcode::Call,
            I::CallWithReceiver { .. } => Opcode::CallWithReceiver,
            I::CallSpread { .. } => Opcode::CallSpread,
            I::CallEval { .. } => Opcode::CallEval,
            I::New { .. } => Opcode::New,
            I::NewSpread { .. } => Opcode::NewSpread,
            I::GetIterator { .. } => Opcode::GetIterator,
            I::IteratorStep { .. } => Opcode::IteratorStep,
            I::IteratorClose { .. } => Opcode::IteratorClose,
            I::ForInEnumerate { .. } => Opcode::ForInEnumerate,
            I::ForInNext { .. } => Opcode::ForInNext,
            I::GetAsyncIterator { .. } => Opcode::GetAsyncIterator,
            I::AsyncIteratorNext { .. } => Opcode::AsyncIteratorNext,
            I::AsyncIteratorComplete { .. } => Opcode::AsyncIteratorComplete,
            I::AsyncIteratorReturn { .. } => Opcode::AsyncIteratorReturn,
            I::GeneratorsInitialize => Opcode::GeneratorsInitialize,
            I::Yield { .. } => Opcode::Yield,
            I::YieldDelegate { .. } => Opcode::YieldDelegate,
            I::Await { .. } => Opcode::Await,
            I::CreateClass { .. } => Opcode::CreateClass,
            I::DefineMethod { .. } => Opcode::DefineMethod,
            I::SetClassFields { .. } => Opcode::SetClassFields,
            I::CheckThis { .. } => Opcode::CheckThis,
            I::SuperCall { .. } => Opcode::SuperCall,
            I::SuperCallSpread { .. } => Opcode::SuperCallSpread,
            I::GetSuper { .. } => Opcode::GetSuper,
            I::SetSuper { .. } => Opcode::SetSuper,
            I::Debugger => Opcode::Debugger,
            I::Nop => Opcode::Nop,
        }
    }

    /// Visit every register operand mutably.
    ///
    /// The generator uses this to relocate provisional register numbers once the
    /// final operand register count is known.
    pub fn for_each_register_mut(&mut self, mut f: impl FnMut(&mut Register)) {
        use Instruction as I;
        match self {
            I::LoadUndefined { dst }
            | I::LoadNull { dst }
            | I::LoadTrue { dst }
            | I::LoadFalse { dst }
            | I::LoadEmpty { dst }
            | I::LoadInt32 { dst, .. }
            | I::LoadConst { dst, .. }
            | I::GetHeap { dst, .. }
            | I::GetGlobal { dst, .. }
            | I::TypeOfGlobal { dst, .. }
            | I::GetByName { dst, .. }
            | I::TypeOfByName { dst, .. }
            | I::DeleteByName { dst, .. }
            | I::GetArgument { dst, .. }
            | I::CreateArguments { dst }
            | I::CreateRestParameter { dst, .. }
            | I::CreateFunction { dst, .. }
            | I::LoadCallee { dst }
            | I::LoadNewTarget { dst }
            | I::GetTemplateObject { dst, .. }
            | I::NewObject { dst }
            | I::NewArray { dst, .. } => f(dst),

            I::SetHeap { src, .. }
            | I::CheckInitialized { src, .. }
            | I::SetGlobal { src, .. }
            | I::InitGlobalLexical { src, .. }
            | I::SetByName { src, .. }
            | I::Return { src }
            | I::Throw { src }
            | I::JumpIfNullish { src, .. }
            | I::JumpIfNotUndefined { src, .. }
            | I::CheckThis { src } => f(src),

            I::PushWithEnvironment { obj } => f(obj),
            I::ArrayPushHole { arr } => f(arr),
            I::IteratorClose { iter } => f(iter),
            I::JumpIfTrue { cond, .. } | I::JumpIfFalse { cond, .. } => f(cond),
            I::EnterTryCatch { exception, .. } => f(exception),

            I::Move { dst, src }
            | I::Neg { dst, src }
            | I::ToNumber { dst, src }
            | I::ToNumeric { dst, src }
            | I::BitNot { dst, src }
            | I::Inc { dst, src }
            | I::Dec { dst, src }
            | I::ToString { dst, src }
            | I::ToPropertyKey { dst, src }
            | I::Not { dst, src }
            | I::TypeOf { dst, src }
            | I::CopyDataProperties { dst, src }
            | I::GetIterator { dst, src }
            | I::GetAsyncIterator { dst, src }
            | I::ForInEnumerate { dst, src }
            | I::Yield { dst, src }
            | I::Await { dst, src } => {
                f(dst);
                f(src);
            }

            I::YieldDelegate { dst, iter }
            | I::IteratorStep { dst, iter, .. }
            | I::ForInNext { dst, iter, .. }
            | I::AsyncIteratorNext { dst, iter }
            | I::AsyncIteratorComplete { dst, iter, .. }
            | I::AsyncIteratorReturn { dst, iter, .. } => {
                f(dst);
                f(iter);
            }

            I::CreateMethod { dst, home, .. } => {
                f(dst);
                f(home);
            }
            I::CreateClass { dst, ctor, heritage, .. } => {
                f(dst);
                f(ctor);
                f(heritage);
            }
            I::DefineMethod { obj, key, func, .. } => {
                f(obj);
                f(key);
                f(func);
            }
            I::SetClassFields { class, func, keys, .. } => {
                f(class);
                f(func);
                f(keys);
            }
            I::SuperCall { dst, args, .. } => {
                f(dst);
                f(args);
            }
            I::SuperCallSpread { dst, array } => {
                f(dst);
                f(array);
            }
            I::GetSuper { dst, key } => {
                f(dst);
                f(key);
            }
            I::SetSuper { key, src, .. } => {
                f(key);
                f(src);
            }

            I::GetNamed { dst, obj, .. } => {
                f(dst);
                f(obj);
            }
            I::SetNamed { obj, src, .. } | I::DefineOwnNamed { obj, src, .. } => {
                f(obj);
                f(src);
            }
            I::GetKeyed { dst, obj, key } | I::DeleteKeyed { dst, obj, key, .. } => {
                f(dst);
                f(obj);
                f(key);
            }
            I::SetKeyed { obj, key, src, .. } | I::DefineOwnKeyed { obj, key, src } => {
                f(obj);
                f(key);
                f(src);
            }
            I::DefineGetter { obj, key, func } | I::DefineSetter { obj, key, func } => {
                f(obj);
                f(key);
                f(func);
            }
            I::CopyRestProperties { dst, src, excluded, .. } => {
                f(dst);
                f(src);
                f(excluded);
            }
            I::In { dst, key, obj } => {
                f(dst);
                f(key);
                f(obj);
            }
            I::ArrayPush { arr, src } | I::ArraySpread { arr, src } => {
                f(arr);
                f(src);
            }

            I::Add { dst, lhs, rhs }
            | I::Sub { dst, lhs, rhs }
            | I::Mul { dst, lhs, rhs }
            | I::Div { dst, lhs, rhs }
            | I::Mod { dst, lhs, rhs }
            | I::Exp { dst, lhs, rhs }
            | I::BitAnd { dst, lhs, rhs }
            | I::BitOr { dst, lhs, rhs }
            | I::BitXor { dst, lhs, rhs }
            | I::Shl { dst, lhs, rhs }
            | I::Shr { dst, lhs, rhs }
            | I::Ushr { dst, lhs, rhs }
            | I::Eq { dst, lhs, rhs }
            | I::Ne { dst, lhs, rhs }
            | I::StrictEq { dst, lhs, rhs }
            | I::StrictNe { dst, lhs, rhs }
            | I::Lt { dst, lhs, rhs }
            | I::Le { dst, lhs, rhs }
            | I::Gt { dst, lhs, rhs }
            | I::Ge { dst, lhs, rhs }
            | I::InstanceOf { dst, lhs, rhs } => {
                f(dst);
                f(lhs);
                f(rhs);
            }

            I::Call { dst, callee, args, .. }
            | I::CallEval { dst, callee, args, .. }
            | I::New { dst, callee, args, .. } => {
                f(dst);
                f(callee);
                f(args);
            }
            I::CallWithReceiver { dst, callee, receiver, args, .. } => {
                f(dst);
                f(callee);
                f(receiver);
                f(args);
            }
            I::CallSpread { dst, callee, receiver, array } => {
                f(dst);
                f(callee);
                f(receiver);
                f(array);
            }
            I::NewSpread { dst, callee, array } => {
                f(dst);
                f(callee);
                f(array);
            }

            I::ThrowConstAssignment { .. }
            | I::PushEnvironment { .. }
            | I::PopEnvironment
            | I::RecreateEnvironment
            | I::DeclareGlobals
            | I::Jump { .. }
            | I::JumpComplex { .. }
            | I::EnterTryFinally { .. }
            | I::LeaveTry
            | I::EndFinally
            | I::ReturnUndefined
            | I::ThrowError { .. }
            | I::GeneratorsInitialize
            | I::Debugger
            | I::Nop => {}
        }
    }

    /// Relative jump operand, if this is a jump with an offset
    pub fn jump_offset_mut(&mut self) -> Option<&mut JumpOffset> {
        use Instruction as I;
        match self {
            I::Jump { offset }
            | I::JumpIfTrue { offset, .. }
            | I::JumpIfFalse { offset, .. }
            | I::JumpIfNullish { offset, .. }
            | I::JumpIfNotUndefined { offset, .. } => Some(offset),
            I::EnterTryCatch { handler, .. } | I::EnterTryFinally { handler } => Some(handler),
            I::IteratorStep { done, .. } | I::ForInNext { done, .. } | I::AsyncIteratorComplete { done, .. } => {
                Some(done)
            }
            I::AsyncIteratorReturn { skip, .. } => Some(skip),
            _ => None,
        }
    }

    /// Whether control never falls through to the next instruction
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Jump { .. }
                | Instruction::JumpComplex { .. }
                | Instruction::Return { .. }
                | Instruction::ReturnUndefined
                | Instruction::Throw { .. }
                | Instruction::ThrowError { .. }
                | Instruction::ThrowConstAssignment { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for byte in 0..=255u8 {
            if let Some(op) = Opcode::from_byte(byte) {
                assert_eq!(op.to_byte(), byte);
            }
        }
        assert_eq!(Opcode::from_byte(0x48), Some(Opcode::Add));
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_byte(0xFF), None);
        assert!(matches!(
            Opcode::try_from(0xFF),
            Err(BytecodeError::InvalidOpcode(0xFF))
        ));
    }

    #[test]
    fn test_opcode_name() {
        assert_eq!(Opcode::GetNamed.name(), "GetNamed");
        assert_eq!(
            Instruction::ReturnUndefined.opcode().name(),
            "ReturnUndefined"
        );
    }

    #[test]
    fn test_register_visitor_covers_operands() {
        let mut insn = Instruction::CallWithReceiver {
            dst: Register(0),
            callee: Register(1),
            receiver: Register(2),
            args: Register(3),
            argc: 2,
        };
        let mut seen = Vec::new();
        insn.for_each_register_mut(|r| {
            seen.push(r.0);
            r.0 += 10;
        });
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(
            insn,
            Instruction::CallWithReceiver {
                dst: Register(10),
                callee: Register(11),
                receiver: Register(12),
                args: Register(13),
                argc: 2,
            }
        );
    }

    #[test]
    fn test_jump_offset_patch() {
        let mut insn = Instruction::JumpIfFalse {
            cond: Register(0),
            offset: JumpOffset(0),
        };
        *insn.jump_offset_mut().unwrap() = JumpOffset(7);
        assert!(matches!(
            insn,
            Instruction::JumpIfFalse {
                offset: JumpOffset(7),
                ..
            }
        ));
        assert!(Instruction::Nop.jump_offset_mut().is_none());
    }

    #[test]
    fn test_class_instructions_visit_every_register() {
        let mut insn = Instruction::CreateClass {
            dst: Register(1),
            ctor: Register(2),
            heritage: Register(3),
            derived: true,
        };
        let mut seen = Vec::new();
        insn.for_each_register_mut(|r| seen.push(r.0));
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(insn.opcode(), Opcode::CreateClass);
        assert_eq!(Opcode::from_byte(0x9C), Some(Opcode::SuperCall));

        let mut insn = Instruction::SetSuper {
            key: Register(4),
            src: Register(5),
            strict: true,
        };
        seen.clear();
        insn.for_each_register_mut(|r| seen.push(r.0));
        assert_eq!(seen, vec![4, 5]);
    }
}
