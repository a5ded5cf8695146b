//! The instruction vocabulary shared by the emitter (§4.E), the writer/
//! reader (§4.F/§4.G) and the interpreter (§4.J).
//!
//! In memory, a jump-shaped instruction's target is the *index* of another
//! instruction in the same flat `Vec<Instruction>` (the function's
//! instruction stream), not yet a word offset. [`crate::bytecode::Writer`]
//! resolves indices to word offsets (each instruction has a fixed,
//! computable encoded width) when it serializes a function;
//! [`crate::bytecode::Reader`] performs the inverse translation back to
//! instruction indices when it loads a function for the interpreter. This
//! keeps the placeholder/patch bookkeeping described in §4.E local to the
//! compiler while the byte-exact word format of §6 is only ever visible at
//! the Writer/Reader boundary.

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PrimitiveOp {
    IntAdd,
    IntSub,
    IntMul,
    IntDiv,
    IntRem,
    IntEq,
    IntLt,
    IntLte,
    IntGt,
    IntGte,
    IntShl,
    IntShr,
    IntBitAnd,
    IntBitOr,
    IntBitXor,
    DoubleAdd,
    DoubleSub,
    DoubleMul,
    DoubleDiv,
    DoubleEq,
    DoubleLt,
    DoubleLte,
    DoubleGt,
    DoubleGte,
    BoolAnd,
    BoolOr,
    BoolNot,
    SymbolEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PrimitiveKind {
    Integer,
    Double,
    Boolean,
    Symbol,
}

/// Sentinel class index meaning "resolve at runtime from the receiver's
/// actual class" — used by the dynamic form of `required` initializer
/// calls (§4.E).
pub const RUNTIME_CLASS_SENTINEL: u16 = u16::MAX;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Instruction {
    PushInteger(i64),
    PushDouble(f64),
    PushBoolean(bool),
    PushSymbol(char),
    /// Pushes the string at `pool index` from the function's string pool.
    PushStringFromPool(u32),
    /// Concatenates `segment_count` values already pushed (literal and
    /// interpolated pieces, in order) into one String, single-pass length
    /// pre-computed by the VM.
    BuildInterpolatedString(u32),

    LoadLocal(u16),
    StoreLocal(u16),
    LoadInstanceVariable(u16),
    StoreInstanceVariable(u16),
    /// Pushed by `🍭self`.
    LoadSelf,

    /// Static class/type-method dispatch: the VTI to invoke on the
    /// receiver's static class. `argument_count` is carried alongside the
    /// VTI because VTIs are only unique within one class hierarchy (§4.D)
    /// — the interpreter cannot know how many stack slots separate the
    /// receiver from the dispatch instruction without first resolving the
    /// receiver's class, and it cannot find the receiver without first
    /// knowing the argument count.
    Dispatch { vti: u16, argument_count: u8 },
    /// Type-method dispatch against a known class index.
    DispatchTypeMethod { class_index: u16, vti: u16 },
    /// Protocol dispatch: VM resolves via
    /// `class.protocolTable[protocol_index - offset][vti]`.
    DispatchProtocol {
        protocol_index: u16,
        vti: u16,
        argument_count: u8,
    },
    /// Short-circuits to nothingness if the receiver is nothingness,
    /// otherwise behaves like `Dispatch`. `skip_to` names the instruction
    /// index to jump to when short-circuiting (past the argument list).
    SafeDispatch {
        vti: u16,
        argument_count: u8,
        skip_to: usize,
    },

    /// `class_index == RUNTIME_CLASS_SENTINEL` marks the dynamic
    /// (`required`-initializer) form.
    CallInitializer { class_index: u16, vti: u16 },
    SuperInitializerCall { vti: u16 },

    CastClass(u16),
    CastProtocol(u16),
    CastPrimitive(PrimitiveKind),
    /// `something` -> primitive narrowing used by generic code.
    CastDynamic(PrimitiveKind),
    /// Traps (`NothingnessUnwrapped`) if the top of stack is nothingness.
    OptionalUnwrap,

    BuildList(u32),
    BuildDictionary(u32),
    /// Two-operand (start, stop) or three-operand (start, stop, step)
    /// form, `with_step` distinguishes them; `inclusive` marks a `⛓`
    /// range (stop is in bounds) as opposed to a `⛷` one.
    BuildRange { with_step: bool, inclusive: bool },

    /// Unconditional jump to instruction index `target`.
    Jump(usize),
    /// Pops a boolean; jumps to `target` if false.
    JumpIfFalse(usize),

    /// `for` over a list: re-reads the list pointer each iteration since
    /// lists may grow. `body_end` is the loop's exit target.
    ForEachListNext { body_end: usize },
    /// `for` over a protocol-conforming iterable via
    /// `getEnumerator`/`next`/`hasMore`.
    ForEachEnumerableNext { body_end: usize },
    /// `for` over a `Range`, stride arithmetic.
    ForEachRangeNext { body_end: usize },

    /// Builds a Closure object: consumes `variable_count` locals in the
    /// nested block, `argument_count`, whether `self` was captured, and
    /// the captured-variable slot IDs, followed by the nested
    /// instruction block inline (ending at `body_end`).
    BuildClosure {
        variable_count: u16,
        argument_count: u8,
        captures_self: bool,
        captured_slots: Vec<u16>,
        body_end: usize,
    },
    /// Materializes a `(receiver, vti)` pair as a first-class value
    /// without invoking it. `protocol_index == u16::MAX` marks the class
    /// form, where `vti` is already a flattened method-table index;
    /// otherwise `vti` is a protocol method *offset* (protocols, like
    /// VTIs, are only unique within their own table — see `Dispatch`'s
    /// doc comment) and must be resolved against the receiver's actual
    /// class at call time.
    BuildCapturedMethod { vti: u16, protocol_index: u16 },

    Primitive(PrimitiveOp),

    GetStringFromPool(u32),
    GetClassByIndex(u16),

    Pop,
    Return,
}

/// Stable opcode tag written as the first word of every instruction. The
/// reader switches on this value before decoding operand words.
pub fn tag_of(instr: &Instruction) -> u32 {
    use Instruction::*;
    match instr {
        PushInteger(_) => 0,
        PushDouble(_) => 1,
        PushBoolean(_) => 2,
        PushSymbol(_) => 3,
        PushStringFromPool(_) => 4,
        BuildInterpolatedString(_) => 5,
        LoadLocal(_) => 6,
        StoreLocal(_) => 7,
        LoadInstanceVariable(_) => 8,
        StoreInstanceVariable(_) => 9,
        LoadSelf => 10,
        Dispatch { .. } => 11,
        DispatchTypeMethod { .. } => 12,
        DispatchProtocol { .. } => 13,
        SafeDispatch { .. } => 14,
        CallInitializer { .. } => 15,
        SuperInitializerCall { .. } => 16,
        CastClass(_) => 17,
        CastProtocol(_) => 18,
        CastPrimitive(_) => 19,
        CastDynamic(_) => 20,
        OptionalUnwrap => 21,
        BuildList(_) => 22,
        BuildDictionary(_) => 23,
        BuildRange { .. } => 24,
        Jump(_) => 25,
        JumpIfFalse(_) => 26,
        ForEachListNext { .. } => 27,
        ForEachEnumerableNext { .. } => 28,
        ForEachRangeNext { .. } => 29,
        BuildClosure { .. } => 30,
        BuildCapturedMethod { .. } => 31,
        Primitive(_) => 32,
        GetStringFromPool(_) => 33,
        GetClassByIndex(_) => 34,
        Pop => 35,
        Return => 36,
    }
}

/// Stable tag for a [`PrimitiveOp`], written as `Primitive`'s single
/// operand word.
pub fn primitive_op_tag(op: PrimitiveOp) -> u32 {
    use PrimitiveOp::*;
    match op {
        IntAdd => 0,
        IntSub => 1,
        IntMul => 2,
        IntDiv => 3,
        IntRem => 4,
        IntEq => 5,
        IntLt => 6,
        IntLte => 7,
        IntGt => 8,
        IntGte => 9,
        IntShl => 10,
        IntShr => 11,
        IntBitAnd => 12,
        IntBitOr => 13,
        IntBitXor => 14,
        DoubleAdd => 15,
        DoubleSub => 16,
        DoubleMul => 17,
        DoubleDiv => 18,
        DoubleEq => 19,
        DoubleLt => 20,
        DoubleLte => 21,
        DoubleGt => 22,
        DoubleGte => 23,
        BoolAnd => 24,
        BoolOr => 25,
        BoolNot => 26,
        SymbolEq => 27,
    }
}

/// Inverse of [`primitive_op_tag`]; `None` for an out-of-range tag.
pub fn primitive_op_from_tag(tag: u32) -> Option<PrimitiveOp> {
    use PrimitiveOp::*;
    Some(match tag {
        0 => IntAdd,
        1 => IntSub,
        2 => IntMul,
        3 => IntDiv,
        4 => IntRem,
        5 => IntEq,
        6 => IntLt,
        7 => IntLte,
        8 => IntGt,
        9 => IntGte,
        10 => IntShl,
        11 => IntShr,
        12 => IntBitAnd,
        13 => IntBitOr,
        14 => IntBitXor,
        15 => DoubleAdd,
        16 => DoubleSub,
        17 => DoubleMul,
        18 => DoubleDiv,
        19 => DoubleEq,
        20 => DoubleLt,
        21 => DoubleLte,
        22 => DoubleGt,
        23 => DoubleGte,
        24 => BoolAnd,
        25 => BoolOr,
        26 => BoolNot,
        27 => SymbolEq,
        _ => return None,
    })
}

/// Inverse of the primitive-kind half of [`tag_of`]'s `CastPrimitive`/
/// `CastDynamic` operand encoding.
pub fn primitive_kind_from_tag(tag: u32) -> Option<PrimitiveKind> {
    Some(match tag {
        0 => PrimitiveKind::Integer,
        1 => PrimitiveKind::Double,
        2 => PrimitiveKind::Boolean,
        3 => PrimitiveKind::Symbol,
        _ => return None,
    })
}

impl Instruction {
    /// Number of additional 32-bit operand words this instruction carries
    /// beyond its opcode word, used by the Writer/Reader to compute word
    /// offsets for jump targets. Variable-length instructions
    /// (`BuildClosure`) are handled specially by the writer, since their
    /// width depends on the nested block.
    pub fn fixed_operand_words(&self) -> usize {
        use Instruction::*;
        match self {
            PushInteger(_) => 2,
            PushDouble(_) => 2,
            PushBoolean(_) => 1,
            PushSymbol(_) => 1,
            PushStringFromPool(_) => 1,
            BuildInterpolatedString(_) => 1,
            LoadLocal(_) | StoreLocal(_) => 1,
            LoadInstanceVariable(_) | StoreInstanceVariable(_) => 1,
            LoadSelf => 0,
            Dispatch { .. } => 2,
            DispatchTypeMethod { .. } => 2,
            DispatchProtocol { .. } => 3,
            SafeDispatch { .. } => 3,
            CallInitializer { .. } => 2,
            SuperInitializerCall { .. } => 1,
            CastClass(_) | CastProtocol(_) => 1,
            CastPrimitive(_) | CastDynamic(_) => 1,
            OptionalUnwrap => 0,
            BuildList(_) | BuildDictionary(_) => 1,
            BuildRange { .. } => 1,
            Jump(_) | JumpIfFalse(_) => 1,
            ForEachListNext { .. } | ForEachEnumerableNext { .. } | ForEachRangeNext { .. } => 1,
            BuildClosure {
                captured_slots, ..
            } => 4 + captured_slots.len(),
            BuildCapturedMethod { .. } => 2,
            Primitive(_) => 1,
            GetStringFromPool(_) => 1,
            GetClassByIndex(_) => 1,
            Pop | Return => 0,
        }
    }
}
