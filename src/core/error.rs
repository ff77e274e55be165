// This module defines the error types shared by every stage of LIR generation, using
// thiserror for the Display plumbing. Errors come in two flavours. A Bailout is a
// recoverable, method-scoped failure: the method cannot be compiled at this tier (out of
// virtual registers, frame too large, an offset that does not fit an addressing mode, an
// illegal phi input, or a tree node this backend does not select) and the caller is
// expected to fall back. An Invariant is a programmer error in the orchestration code:
// resolving an access twice, finalizing a frame twice, appending to a sealed block, and
// so on. Those are returned as values and never panic in release builds. Parse errors
// only come out of the textual tree-IR reader.

//! Error types for LIR generation.

use thiserror::Error;

/// Recoverable, method-scoped compilation failure.
///
/// Each variant carries a stable reason code (see [`Bailout::code`]) so that callers can
/// aggregate bailouts without matching on message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Bailout {
    #[error("out of virtual registers in LIR generator")]
    OutOfVirtualRegisters,

    #[error("frame of {requested} bytes exceeds the addressable frame size")]
    FrameTooLarge {
        /// Requested size, saturated on overflow.
        requested: u64,
    },

    #[error("stack offset {offset} is not encodable on {arch}")]
    DisplacementNotEncodable { offset: i64, arch: &'static str },

    #[error("illegal phi input in block {block}")]
    IllegalPhi { block: u32 },

    #[error("unsupported construct: {what}")]
    Unsupported { what: String },
}

impl Bailout {
    /// Stable identifier of the bailout reason.
    pub fn code(&self) -> &'static str {
        match self {
            Bailout::OutOfVirtualRegisters => "out-of-vregs",
            Bailout::FrameTooLarge { .. } => "frame-too-large",
            Bailout::DisplacementNotEncodable { .. } => "displacement",
            Bailout::IllegalPhi { .. } => "illegal-phi",
            Bailout::Unsupported { .. } => "unsupported",
        }
    }
}

/// Main error type for LIR generation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("bailout: {0}")]
    Bailout(#[from] Bailout),

    #[error("invariant violated: {what}")]
    Invariant { what: String },

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl CompileError {
    /// Build an invariant error and log it.
    pub fn invariant(what: impl Into<String>) -> Self {
        let what = what.into();
        log::error!("invariant violated: {}", what);
        CompileError::Invariant { what }
    }

    /// Whether this error is recoverable by retrying at a lower tier.
    pub fn is_bailout(&self) -> bool {
        matches!(self, CompileError::Bailout(_))
    }

    /// The bailout, if this is one.
    pub fn as_bailout(&self) -> Option<&Bailout> {
        match self {
            CompileError::Bailout(b) => Some(b),
            _ => None,
        }
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bailout_converts_into_compile_error() {
        let err: CompileError = Bailout::OutOfVirtualRegisters.into();
        assert!(err.is_bailout());
        assert_eq!(err.as_bailout().map(Bailout::code), Some("out-of-vregs"));
        assert_eq!(err.to_string(), "bailout: out of virtual registers in LIR generator");
    }

    #[test]
    fn test_invariant_is_not_bailout() {
        let err = CompileError::invariant("frame finalized twice");
        assert!(!err.is_bailout());
        assert!(err.to_string().contains("frame finalized twice"));
    }
}
