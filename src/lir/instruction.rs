// This module defines the instruction catalogue of the low-level IR. Opcodes are grouped
// like the backend groups them: zero-operand markers and fences, one-operand moves and
// control transfers, two-operand arithmetic and compares, three-operand division, calls,
// and compare-and-swap. An Instruction is a flat record of opcode, result operand, up to
// three inputs, temporaries, an optional debug-state reference, and an opcode-specific
// payload (branch condition and target, call target and arguments, move kind, convert
// kind, label). Once built, an instruction is immutable except for two sanctioned edits:
// redirecting a branch and replacing the result operand.

//! LIR instruction catalogue.

use super::operand::{Operand, OprType};
use crate::core::error::{CompileError, CompileResult};
use std::fmt;

/// Maximum number of fixed inputs per instruction.
pub const MAX_INPUTS: usize = 3;

/// Basic block identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// Block-local branch destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Opaque reference to the interpreter state recorded for deoptimization and
/// exception dispatch at an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateRef(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    /// Unsigned `<=`.
    BelowEqual,
    /// Unsigned `>=`.
    AboveEqual,
    Always,
}

impl Condition {
    pub fn negate(self) -> Condition {
        match self {
            Condition::Equal => Condition::NotEqual,
            Condition::NotEqual => Condition::Equal,
            Condition::Less => Condition::GreaterEqual,
            Condition::LessEqual => Condition::Greater,
            Condition::Greater => Condition::LessEqual,
            Condition::GreaterEqual => Condition::Less,
            Condition::BelowEqual => Condition::Greater,
            Condition::AboveEqual => Condition::Less,
            Condition::Always => Condition::Always,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Condition::Equal => "eq",
            Condition::NotEqual => "ne",
            Condition::Less => "lt",
            Condition::LessEqual => "le",
            Condition::Greater => "gt",
            Condition::GreaterEqual => "ge",
            Condition::BelowEqual => "be",
            Condition::AboveEqual => "ae",
            Condition::Always => "al",
        }
    }

    pub fn from_name(name: &str) -> Option<Condition> {
        Some(match name {
            "eq" => Condition::Equal,
            "ne" => Condition::NotEqual,
            "lt" => Condition::Less,
            "le" => Condition::LessEqual,
            "gt" => Condition::Greater,
            "ge" => Condition::GreaterEqual,
            "be" => Condition::BelowEqual,
            "ae" => Condition::AboveEqual,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // no operands
    Label,
    Nop,
    StdEntry,
    Membar,
    MembarAcquire,
    MembarRelease,
    MembarLoadLoad,
    MembarStoreStore,
    MembarLoadStore,
    MembarStoreLoad,
    GetThread,
    // one operand
    NullCheck,
    Return,
    Leal,
    Branch,
    Move,
    Convert,
    Safepoint,
    Neg,
    // two operands
    Cmp,
    CMove,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
    Xadd,
    Xchg,
    // three operands
    Idiv,
    Irem,
    // calls
    StaticCall,
    OptVirtualCall,
    IcVirtualCall,
    RuntimeCall,
    // compare and swap
    CasInt,
    CasLong,
    CasObj,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Label => "label",
            Opcode::Nop => "nop",
            Opcode::StdEntry => "std_entry",
            Opcode::Membar => "membar",
            Opcode::MembarAcquire => "membar_acquire",
            Opcode::MembarRelease => "membar_release",
            Opcode::MembarLoadLoad => "membar_loadload",
            Opcode::MembarStoreStore => "membar_storestore",
            Opcode::MembarLoadStore => "membar_loadstore",
            Opcode::MembarStoreLoad => "membar_storeload",
            Opcode::GetThread => "get_thread",
            Opcode::NullCheck => "null_check",
            Opcode::Return => "return",
            Opcode::Leal => "leal",
            Opcode::Branch => "branch",
            Opcode::Move => "move",
            Opcode::Convert => "convert",
            Opcode::Safepoint => "safepoint",
            Opcode::Neg => "neg",
            Opcode::Cmp => "cmp",
            Opcode::CMove => "cmove",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Rem => "rem",
            Opcode::And => "logic_and",
            Opcode::Or => "logic_or",
            Opcode::Xor => "logic_xor",
            Opcode::Shl => "shift_left",
            Opcode::Shr => "shift_right",
            Opcode::Ushr => "ushift_right",
            Opcode::Xadd => "xadd",
            Opcode::Xchg => "xchg",
            Opcode::Idiv => "idiv",
            Opcode::Irem => "irem",
            Opcode::StaticCall => "static_call",
            Opcode::OptVirtualCall => "optvirtual_call",
            Opcode::IcVirtualCall => "icvirtual_call",
            Opcode::RuntimeCall => "rtcall",
            Opcode::CasInt => "cas_int",
            Opcode::CasLong => "cas_long",
            Opcode::CasObj => "cas_obj",
        }
    }

    pub fn is_call(self) -> bool {
        matches!(
            self,
            Opcode::StaticCall | Opcode::OptVirtualCall | Opcode::IcVirtualCall | Opcode::RuntimeCall
        )
    }

    pub fn is_membar(self) -> bool {
        matches!(
            self,
            Opcode::Membar
                | Opcode::MembarAcquire
                | Opcode::MembarRelease
                | Opcode::MembarLoadLoad
                | Opcode::MembarStoreStore
                | Opcode::MembarLoadStore
                | Opcode::MembarStoreLoad
        )
    }

    /// Whether control may leave the block through this instruction.
    pub fn is_block_end(self) -> bool {
        matches!(self, Opcode::Branch | Opcode::Return)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveKind {
    Normal,
    /// Single-copy atomic access of a volatile field.
    Volatile,
    Unaligned,
}

/// Whether the displacement of a memory move is patched at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchCode {
    None,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvertKind {
    I2L,
    L2I,
    I2F,
    I2D,
    L2F,
    L2D,
    F2I,
    F2L,
    D2I,
    D2L,
    F2D,
    D2F,
    I2B,
    I2C,
    I2S,
}

impl ConvertKind {
    const ALL: [(ConvertKind, &'static str); 15] = [
        (ConvertKind::I2L, "i2l"),
        (ConvertKind::L2I, "l2i"),
        (ConvertKind::I2F, "i2f"),
        (ConvertKind::I2D, "i2d"),
        (ConvertKind::L2F, "l2f"),
        (ConvertKind::L2D, "l2d"),
        (ConvertKind::F2I, "f2i"),
        (ConvertKind::F2L, "f2l"),
        (ConvertKind::D2I, "d2i"),
        (ConvertKind::D2L, "d2l"),
        (ConvertKind::F2D, "f2d"),
        (ConvertKind::D2F, "d2f"),
        (ConvertKind::I2B, "i2b"),
        (ConvertKind::I2C, "i2c"),
        (ConvertKind::I2S, "i2s"),
    ];

    pub fn name(self) -> &'static str {
        Self::ALL.iter().find(|(k, _)| *k == self).map_or("?", |(_, n)| n)
    }

    pub fn from_name(name: &str) -> Option<ConvertKind> {
        Self::ALL.iter().find(|(_, n)| *n == name).map(|(k, _)| *k)
    }

    /// Operand type of the converted value.
    pub fn result_type(self) -> OprType {
        match self {
            ConvertKind::I2L | ConvertKind::F2L | ConvertKind::D2L => OprType::Long,
            ConvertKind::I2F | ConvertKind::L2F | ConvertKind::D2F => OprType::Float,
            ConvertKind::I2D | ConvertKind::L2D | ConvertKind::F2D => OprType::Double,
            _ => OprType::Int,
        }
    }
}

/// Call destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallTarget {
    /// Managed method by handle.
    Method(u64),
    /// Native function by address.
    Native(u64),
    /// Named runtime entry.
    Runtime(&'static str),
}

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallTarget::Method(h) => write!(f, "method:{:#x}", h),
            CallTarget::Native(a) => write!(f, "native:{:#x}", a),
            CallTarget::Runtime(name) => write!(f, "runtime:{}", name),
        }
    }
}

/// Out-of-line slow paths a branch may jump to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StubKind {
    /// Record the previous value of a reference field for concurrent marking.
    SatbPreBarrier,
}

/// Slow-path stub. Its operands are inputs of the branch that enters it; control comes
/// back at `continuation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeStub {
    pub kind: StubKind,
    pub inputs: Vec<Operand>,
    pub continuation: Label,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchTarget {
    Block(BlockId),
    Label(Label),
    Stub(Box<CodeStub>),
}

impl fmt::Display for BranchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchTarget::Block(b) => write!(f, "[{}]", b),
            BranchTarget::Label(l) => write!(f, "[{}]", l),
            BranchTarget::Stub(stub) => write!(f, "[stub {:?} -> {}]", stub.kind, stub.continuation),
        }
    }
}

/// Opcode-specific data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    None,
    Label(Label),
    Branch { cond: Condition, target: BranchTarget },
    Condition(Condition),
    Move { kind: MoveKind, patch: PatchCode },
    Convert(ConvertKind),
    Call { target: CallTarget, args: Vec<Operand> },
}

/// A single LIR instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub(crate) opcode: Opcode,
    pub(crate) result: Operand,
    pub(crate) inputs: [Operand; MAX_INPUTS],
    pub(crate) n_inputs: u8,
    pub(crate) temps: Vec<Operand>,
    pub(crate) info: Option<StateRef>,
    pub(crate) payload: Payload,
}

impl Instruction {
    /// Build an instruction. At most [`MAX_INPUTS`] inputs are kept.
    pub fn new(opcode: Opcode, inputs: &[Operand], result: Operand) -> Self {
        debug_assert!(inputs.len() <= MAX_INPUTS, "{} takes at most {} inputs", opcode.name(), MAX_INPUTS);
        let mut fixed = [Operand::Illegal; MAX_INPUTS];
        let n = inputs.len().min(MAX_INPUTS);
        fixed[..n].copy_from_slice(&inputs[..n]);
        Self {
            opcode,
            result,
            inputs: fixed,
            n_inputs: n as u8,
            temps: Vec::new(),
            info: None,
            payload: Payload::None,
        }
    }

    pub fn op0(opcode: Opcode) -> Self {
        Self::new(opcode, &[], Operand::Illegal)
    }

    pub fn with_temps(mut self, temps: &[Operand]) -> Self {
        self.temps = temps.iter().copied().filter(Operand::is_valid).collect();
        self
    }

    pub fn with_info(mut self, info: Option<StateRef>) -> Self {
        self.info = info;
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn result(&self) -> Operand {
        self.result
    }

    pub fn inputs(&self) -> &[Operand] {
        &self.inputs[..self.n_inputs as usize]
    }

    pub fn temps(&self) -> &[Operand] {
        &self.temps
    }

    pub fn info(&self) -> Option<StateRef> {
        self.info
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Call arguments, empty for non-calls.
    pub fn call_args(&self) -> &[Operand] {
        match &self.payload {
            Payload::Call { args, .. } => args,
            _ => &[],
        }
    }

    pub fn branch_target(&self) -> Option<&BranchTarget> {
        match &self.payload {
            Payload::Branch { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Redirect a branch.
    pub fn set_branch_target(&mut self, new_target: BranchTarget) -> CompileResult<()> {
        match &mut self.payload {
            Payload::Branch { target, .. } => {
                *target = new_target;
                Ok(())
            }
            _ => Err(CompileError::invariant(format!("{} is not a branch", self.opcode.name()))),
        }
    }

    /// Replace the result operand.
    pub fn set_result(&mut self, result: Operand) {
        self.result = result;
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<16}", self.opcode.name())?;
        match &self.payload {
            Payload::None => {}
            Payload::Label(l) => write!(f, " {}", l)?,
            Payload::Branch { cond, target } => write!(f, " [{}] {}", cond.name(), target)?,
            Payload::Condition(c) => write!(f, " [{}]", c.name())?,
            Payload::Move { kind, patch } => {
                if *kind != MoveKind::Normal {
                    write!(f, " [{:?}]", kind)?;
                }
                if *patch == PatchCode::Normal {
                    write!(f, " [patch]")?;
                }
            }
            Payload::Convert(k) => write!(f, " [{:?}]", k)?,
            Payload::Call { target, .. } => write!(f, " {}", target)?,
        }
        for input in self.inputs() {
            write!(f, " {}", input)?;
        }
        for arg in self.call_args() {
            write!(f, " {}", arg)?;
        }
        if self.result.is_valid() {
            write!(f, " {}", self.result)?;
        }
        if !self.temps.is_empty() {
            write!(f, " tmp:")?;
            for t in &self.temps {
                write!(f, " {}", t)?;
            }
        }
        if let Some(info) = self.info {
            write!(f, " [info {}]", info.0)?;
        }
        Ok(())
    }
}
