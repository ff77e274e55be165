//! Tree-shaped input IR.
//!
//! A [`Method`] is a list of basic blocks. Each block starts with its phis, runs a list of
//! statements whose expressions are trees, and ends with a single [`Terminator`]. Values
//! are named by [`ValueId`] (`%n` in the text format) and are defined exactly once, either
//! by a phi or by a `let`. Block 0 is the entry block.
//!
//! # Text format
//!
//! ```text
//! ; comments run to the end of the line
//! (method sum (params int int) (returns int)
//!   (block 0 (goto 1))
//!   (block 1
//!     (phi %0 int (0 (param 0)) (2 %2))
//!     (if lt %0 (param 1) 2 3))
//!   (block 2
//!     (let %2 (add int %0 (const int 1)))
//!     (goto 1))
//!   (block 3 (return %0)))
//! ```
//!
//! See [`parser`] for the full grammar.

pub mod parser;

use crate::lir::{BasicType, BlockId, CallTarget, Condition, Constant, ConvertKind, Opcode};
use std::fmt;

pub use parser::parse_method;

/// Name of a value defined by a phi or a `let`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    pub params: Vec<BasicType>,
    pub return_type: BasicType,
    /// Monitors held at once; sizes the monitor area of the frame.
    pub monitor_count: u32,
    pub blocks: Vec<Block>,
}

impl Method {
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    /// Predecessor lists, indexed like `blocks`.
    pub fn predecessors(&self) -> Vec<Vec<BlockId>> {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for block in &self.blocks {
            for succ in block.end.successors() {
                if let Some(pos) = self.blocks.iter().position(|b| b.id == succ) {
                    preds[pos].push(block.id);
                }
            }
        }
        preds
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub phis: Vec<Phi>,
    pub stmts: Vec<Stmt>,
    pub end: Terminator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Phi {
    pub value: ValueId,
    pub ty: BasicType,
    /// Value flowing in from each predecessor.
    pub incoming: Vec<(BlockId, Expr)>,
}

impl Phi {
    pub fn input_from(&self, pred: BlockId) -> Option<&Expr> {
        self.incoming.iter().find(|(b, _)| *b == pred).map(|(_, e)| e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
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
}

impl BinaryOp {
    const ALL: [(BinaryOp, &'static str); 11] = [
        (BinaryOp::Add, "add"),
        (BinaryOp::Sub, "sub"),
        (BinaryOp::Mul, "mul"),
        (BinaryOp::Div, "div"),
        (BinaryOp::Rem, "rem"),
        (BinaryOp::And, "and"),
        (BinaryOp::Or, "or"),
        (BinaryOp::Xor, "xor"),
        (BinaryOp::Shl, "shl"),
        (BinaryOp::Shr, "shr"),
        (BinaryOp::Ushr, "ushr"),
    ];

    pub fn name(self) -> &'static str {
        Self::ALL.iter().find(|(op, _)| *op == self).map_or("?", |(_, n)| n)
    }

    pub fn from_name(name: &str) -> Option<BinaryOp> {
        Self::ALL.iter().find(|(_, n)| *n == name).map(|(op, _)| *op)
    }

    pub fn opcode(self) -> Opcode {
        match self {
            BinaryOp::Add => Opcode::Add,
            BinaryOp::Sub => Opcode::Sub,
            BinaryOp::Mul => Opcode::Mul,
            BinaryOp::Div => Opcode::Div,
            BinaryOp::Rem => Opcode::Rem,
            BinaryOp::And => Opcode::And,
            BinaryOp::Or => Opcode::Or,
            BinaryOp::Xor => Opcode::Xor,
            BinaryOp::Shl => Opcode::Shl,
            BinaryOp::Shr => Opcode::Shr,
            BinaryOp::Ushr => Opcode::Ushr,
        }
    }

    pub fn is_division(self) -> bool {
        matches!(self, BinaryOp::Div | BinaryOp::Rem)
    }
}

/// Strength of the reference a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefStrength {
    #[default]
    Strong,
    Weak,
}

/// A field of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub ty: BasicType,
    /// Byte offset; `None` while the holder class is unresolved.
    pub offset: Option<i32>,
    pub volatile: bool,
    pub strength: RefStrength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Static,
    Virtual,
    Native,
    Runtime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub kind: CallKind,
    pub target: CallTarget,
    pub return_type: BasicType,
    /// Argument types and values, in order.
    pub args: Vec<(BasicType, Expr)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicOp {
    CompareAndSwap,
    Exchange,
    Add,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Constant),
    Param(u32),
    Local(ValueId),
    Binary {
        op: BinaryOp,
        ty: BasicType,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Negate {
        ty: BasicType,
        value: Box<Expr>,
    },
    Convert {
        kind: ConvertKind,
        value: Box<Expr>,
    },
    LoadField {
        object: Box<Expr>,
        field: Field,
    },
    LoadArray {
        elem: BasicType,
        array: Box<Expr>,
        index: Box<Expr>,
    },
    /// Raw load at an arbitrary offset; the base may be null or any object.
    UnsafeLoad {
        ty: BasicType,
        object: Box<Expr>,
        offset: Box<Expr>,
        volatile: bool,
    },
    /// Atomic update at `object + offset`. `operands` holds the expected and new value
    /// for compare-and-swap, the single operand otherwise.
    Atomic {
        op: AtomicOp,
        ty: BasicType,
        object: Box<Expr>,
        offset: Box<Expr>,
        operands: Vec<Expr>,
    },
    Call(Box<Call>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let(ValueId, Expr),
    StoreField {
        object: Expr,
        field: Field,
        value: Expr,
    },
    StoreArray {
        elem: BasicType,
        array: Expr,
        index: Expr,
        value: Expr,
    },
    Eval(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Goto(BlockId),
    If {
        cond: Condition,
        left: Expr,
        right: Expr,
        then_block: BlockId,
        else_block: BlockId,
    },
    Return(Option<Expr>),
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Goto(b) => vec![*b],
            Terminator::If { then_block, else_block, .. } => vec![*then_block, *else_block],
            Terminator::Return(_) => Vec::new(),
        }
    }
}
