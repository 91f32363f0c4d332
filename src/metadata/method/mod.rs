//! # CIL Method Bodies
//!
//! The instruction-stream encoder: opcode tables, the per-method append-only
//! instruction buffer with its label/branch fixed point, exception handler clauses,
//! and tiny/fat method-header selection.
//!
//! ## Key Components
//!
//! - [`opcodes`]: opcode enums grouped by operand category
//! - [`CodeBuffer`] / [`Label`]: instruction authoring and fixed-point resolution
//! - [`ExceptionHandler`] / [`ExceptionHandlerFlags`]: try/catch/filter/finally/fault
//!   regions over label pairs
//! - [`MethodBody`]: header selection and serialization of the complete body

pub mod opcodes;

mod body;
mod exceptions;
mod instructions;

pub use body::MethodBody;
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use instructions::{CodeBuffer, Label};
