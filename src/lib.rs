//! lirgen - low-level IR generation for a method JIT.
//!
//! lirgen lowers a small tree IR into per-block LIR programs: linear instruction lists over
//! virtual registers, physical registers, stack slots and addresses. Around the generator
//! it provides the pieces a baseline JIT tier needs before register allocation: a frame
//! map with calling conventions for several targets, an access protocol that wraps heap
//! loads and stores in collector barriers and memory fences, and a phi resolver that turns
//! join-point copies into a sequential move list.
//!
//! # Usage
//!
//! ```ignore
//! use lirgen::arch::X64;
//! use lirgen::config::Config;
//! use lirgen::core::CompilationSession;
//! use lirgen::frame_map::Platform;
//! use lirgen::generator::LirGenerator;
//! use bumpalo::Bump;
//!
//! let platform = Platform::<X64>::new();
//! platform.initialize()?;
//! let mut generator = LirGenerator::new(&platform, &Config::from_env()?)?;
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let method = lirgen::hir::parse_method(text)?;
//! let mut lir = generator.generate(&session, &method)?;
//! lir.finalize_frame(spill_slots)?;
//! ```
//!
//! # Modules
//!
//! - [`lir`] - operands, instructions and block programs
//! - [`arch`] - register files and calling-convention rules per target
//! - [`frame_map`] - calling conventions and frame layout of one method
//! - [`access`] - heap access resolution, barriers and fences
//! - [`phi_resolver`] - parallel copy sequentialization
//! - [`generator`] - tree IR to LIR
//! - [`hir`] - the tree IR and its text reader

pub mod access;
pub mod arch;
pub mod config;
pub mod core;
pub mod frame_map;
pub mod generator;
pub mod hir;
pub mod lir;
pub mod phi_resolver;

pub use crate::core::{Bailout, CompilationSession, CompileError, CompileResult, SessionStats};
pub use access::{AccessProtocol, DecoratorSet, LirAccess};
pub use config::Config;
pub use frame_map::{FrameLayout, FrameMap, Platform};
pub use generator::{LirGenerator, LirMethod};
pub use phi_resolver::PhiResolver;
