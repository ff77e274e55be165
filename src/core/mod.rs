// This module gathers the infrastructure shared by every stage of LIR generation: the
// error types that separate recoverable bailouts from invariant violations, the dense
// register table built once per architecture, and the compilation session that owns the
// long-lived arena and accumulates statistics across methods.

//! Core infrastructure.

pub mod error;
pub mod register_file;
pub mod session;

pub use error::{Bailout, CompileError, CompileResult};
pub use register_file::{PhysReg, RegBitSet, RegisterTable};
pub use session::{CompilationSession, SessionStats};
