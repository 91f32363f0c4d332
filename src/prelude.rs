//! Common imports for building assemblies.
//!
//! ```rust
//! use cilforge::prelude::*;
//! ```
//!
//! Pulls in the assembly type, the attribute flag sets, the signature model and the
//! instruction-authoring types - everything a front-end needs for typical emission.

pub use crate::cilassembly::{
    AssemblyFlags, AttributeTarget, CilAssembly, Constant, ConstantParent, EventAttributes,
    FieldAttributes, FieldTarget, FileAttributes, GenericOwner, GenericParamAttributes,
    ImplementationTarget, ManifestResourceAttributes, MarshalParent, MemberRefParent,
    MethodAttributes, MethodImplAttributes, MethodSemanticsAttributes, MethodTarget, ModuleKind,
    NativeType, PInvokeAttributes, ParamAttributes, PropertyAttributes, ResolutionScope,
    RuntimeFlags, SecurityAction, SecurityTarget, SemanticsTarget, TypeAttributes,
};
pub use crate::cilassembly::{
    AssemblyRefId, ClassDefId, ClassRefId, EventId, ExportedTypeId, FieldDefId, FileRefId,
    GenericParamId, MemberRefId, MethodDefId, MethodSpecId, ModuleRefId, ParamId, PropertyId,
    TypeSpecId,
};
pub use crate::metadata::method::opcodes::{BranchOp, FieldOp, IntOp, MethodOp, Op, TypeOp};
pub use crate::metadata::method::{
    CodeBuffer, ExceptionHandler, ExceptionHandlerFlags, Label, MethodBody,
};
pub use crate::metadata::signatures::{CallKind, MethodSig, TypeDefOrRef, TypeSignature};
pub use crate::metadata::token::Token;
pub use crate::{Error, Result};
