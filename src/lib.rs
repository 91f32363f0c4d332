#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

//! # cilforge
//!
//! A library for building ECMA-335 metadata and emitting .NET PE executables.
//!
//! `cilforge` is the backend an IL assembler sits on: the client describes a managed
//! program - classes, fields, methods, type signatures, CIL instruction streams -
//! through the [`CilAssembly`] entity-graph API, and one write call produces a
//! byte-exact CLI executable: a Windows PE file containing the ECMA-335 metadata
//! tables and heaps plus the encoded instruction streams.
//!
//! The interesting work is global consistency. Heap and table index widths, coded
//! index widths, method header formats and exception-clause layouts all depend on
//! sizes that exist only once the *whole* entity graph is known, so emission runs
//! as a one-shot pipeline: populate the graph, run the single `build_tables`
//! finalization pass (signature resolution, per-method instruction fixed points,
//! table sorting, global width computation), then write the image linearly.
//!
//! ## Example
//!
//! ```rust
//! use cilforge::prelude::*;
//!
//! # fn main() -> cilforge::Result<()> {
//! let mut asm = CilAssembly::new("hello.exe", ModuleKind::ConsoleExe);
//!
//! let object = asm.system_class("Object");
//! let program = asm.add_class(
//!     TypeAttributes::PUBLIC,
//!     "Hello",
//!     "Program",
//!     Some(object.into()),
//! );
//!
//! let main = asm.add_method(
//!     program,
//!     MethodAttributes::PUBLIC | MethodAttributes::STATIC,
//!     MethodImplAttributes::IL,
//!     "Main",
//!     MethodSig::new(TypeSignature::Void, vec![]),
//!     &[],
//! );
//!
//! let mut body = MethodBody::new(8);
//! body.code.op(Op::Ret);
//! asm.set_method_body(main, body)?;
//! asm.declare_entry_point(main)?;
//!
//! let image = asm.to_bytes()?;
//! assert_eq!(&image[0..2], b"MZ");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`cilassembly`] - the entity model: arenas of program elements, the single
//!   heap/table registration context, `build_tables` and image assembly
//! - [`metadata`] - tokens, the four metadata heaps, the table manager with its
//!   global width computation, type signatures, and CIL method bodies
//! - [`file`] - byte-level I/O, the PE section model and the image writer
//!
//! ## Scope
//!
//! The crate emits; it does not parse, it does not verify IL semantics, and it
//! does not re-emit incrementally - every build is whole-graph-in, whole-file-out.

#[macro_use]
mod error;

pub mod cilassembly;
pub mod file;
pub mod metadata;
pub mod prelude;

pub use error::Error;

/// Convenience alias for this crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

pub use cilassembly::{CilAssembly, ModuleKind};
