//! Signature encoders for .NET metadata blob emission.
//!
//! Each encoder appends the ECMA-335 compressed binary form of one signature kind.
//! Encoding needs the owning [`CilAssembly`] to resolve entity references: a named
//! type's compressed token comes from the referenced entity's row, and its CLASS vs
//! VALUETYPE tag from the entity's resolved kind (for definitions, the super-type
//! chain must have been resolved first - emitting a signature for an unresolved
//! definition is an internal fault, not a recoverable condition).
//!
//! # Available Encoders
//!
//! - [`encode_method_signature`] - method signatures for MethodDef, MemberRef, calli
//! - [`encode_field_signature`] - field signatures for Field and MemberRef
//! - [`encode_local_var_signature`] - local variable signatures for StandAloneSig
//! - [`encode_property_signature`] - property signatures for the Property table
//! - [`encode_typespec_signature`] - type specification blobs for TypeSpec
//! - [`encode_method_spec_signature`] - instantiation blobs for MethodSpec
//!
//! # ECMA-335 Reference
//!
//! Formats follow Partition II, section 23.2 (blobs and signatures).

use crate::{
    cilassembly::CilAssembly,
    metadata::compression::{write_compressed_i32, write_compressed_u32},
    metadata::signatures::{
        MethodSig, TypeDefOrRef, TypeSignature, ELEMENT_TYPE, SIGNATURE_HEADER,
    },
    Result,
};

/// Appends the compressed `TypeDefOrRefOrSpecEncoded` token for `target`.
///
/// The encoding is `(row << 2) | discriminant` with discriminant 0 for definitions,
/// 1 for references and 2 for specifications, compressed as an unsigned integer.
///
/// # Errors
///
/// Returns an error if the row does not fit the compressed range.
pub fn write_type_def_or_ref_coded(
    asm: &CilAssembly,
    target: TypeDefOrRef,
    buf: &mut Vec<u8>,
) -> Result<()> {
    let (row, discriminant) = asm.type_target_parts(target);
    write_compressed_u32((row << 2) | discriminant, buf)
}

/// Appends the CLASS or VALUETYPE tag plus compressed token for a named type.
fn write_named_type(asm: &CilAssembly, target: TypeDefOrRef, buf: &mut Vec<u8>) -> Result<()> {
    if matches!(target, TypeDefOrRef::Spec(_)) {
        return Err(internal_fault!(
            "a type specification cannot be named directly in a signature; embed its structural form"
        ));
    }

    let tag = if asm.is_value_type(target)? {
        ELEMENT_TYPE::VALUETYPE
    } else {
        ELEMENT_TYPE::CLASS
    };
    buf.push(tag);
    write_type_def_or_ref_coded(asm, target, buf)
}

/// Appends the ECMA-335 compressed form of a type expression.
///
/// Primitives emit their single tag byte; composite forms emit their tag followed by
/// their recursive content as specified in II.23.2.12.
///
/// # Errors
///
/// Returns an error on unresolved named types, out-of-range array bounds, or a
/// specification used where a named type is required.
pub fn write_type_signature(
    asm: &CilAssembly,
    signature: &TypeSignature,
    buf: &mut Vec<u8>,
) -> Result<()> {
    match signature {
        TypeSignature::Void => buf.push(ELEMENT_TYPE::VOID),
        TypeSignature::Boolean => buf.push(ELEMENT_TYPE::BOOLEAN),
        TypeSignature::Char => buf.push(ELEMENT_TYPE::CHAR),
        TypeSignature::I1 => buf.push(ELEMENT_TYPE::I1),
        TypeSignature::U1 => buf.push(ELEMENT_TYPE::U1),
        TypeSignature::I2 => buf.push(ELEMENT_TYPE::I2),
        TypeSignature::U2 => buf.push(ELEMENT_TYPE::U2),
        TypeSignature::I4 => buf.push(ELEMENT_TYPE::I4),
        TypeSignature::U4 => buf.push(ELEMENT_TYPE::U4),
        TypeSignature::I8 => buf.push(ELEMENT_TYPE::I8),
        TypeSignature::U8 => buf.push(ELEMENT_TYPE::U8),
        TypeSignature::R4 => buf.push(ELEMENT_TYPE::R4),
        TypeSignature::R8 => buf.push(ELEMENT_TYPE::R8),
        TypeSignature::String => buf.push(ELEMENT_TYPE::STRING),
        TypeSignature::Object => buf.push(ELEMENT_TYPE::OBJECT),
        TypeSignature::I => buf.push(ELEMENT_TYPE::I),
        TypeSignature::U => buf.push(ELEMENT_TYPE::U),
        TypeSignature::TypedByRef => buf.push(ELEMENT_TYPE::TYPEDBYREF),
        TypeSignature::Sentinel => buf.push(ELEMENT_TYPE::SENTINEL),
        TypeSignature::Var(index) => {
            buf.push(ELEMENT_TYPE::VAR);
            write_compressed_u32(*index, buf)?;
        }
        TypeSignature::MVar(index) => {
            buf.push(ELEMENT_TYPE::MVAR);
            write_compressed_u32(*index, buf)?;
        }
        TypeSignature::Named(target) => write_named_type(asm, *target, buf)?,
        TypeSignature::SzArray(element) => {
            buf.push(ELEMENT_TYPE::SZARRAY);
            write_type_signature(asm, element, buf)?;
        }
        TypeSignature::Array {
            element,
            rank,
            sizes,
            lower_bounds,
        } => {
            buf.push(ELEMENT_TYPE::ARRAY);
            write_type_signature(asm, element, buf)?;
            write_compressed_u32(*rank, buf)?;
            // Either list may be empty: a zero count byte marks the empty list.
            #[allow(clippy::cast_possible_truncation)]
            write_compressed_u32(sizes.len() as u32, buf)?;
            for size in sizes {
                write_compressed_u32(*size, buf)?;
            }
            #[allow(clippy::cast_possible_truncation)]
            write_compressed_u32(lower_bounds.len() as u32, buf)?;
            for bound in lower_bounds {
                write_compressed_i32(*bound, buf)?;
            }
        }
        TypeSignature::Ptr(pointee) => {
            buf.push(ELEMENT_TYPE::PTR);
            write_type_signature(asm, pointee, buf)?;
        }
        TypeSignature::ByRef(pointee) => {
            buf.push(ELEMENT_TYPE::BYREF);
            write_type_signature(asm, pointee, buf)?;
        }
        TypeSignature::GenericInst { base, args } => {
            buf.push(ELEMENT_TYPE::GENERICINST);
            write_named_type(asm, *base, buf)?;
            #[allow(clippy::cast_possible_truncation)]
            write_compressed_u32(args.len() as u32, buf)?;
            for arg in args {
                write_type_signature(asm, arg, buf)?;
            }
        }
        TypeSignature::FnPtr(method_sig) => {
            buf.push(ELEMENT_TYPE::FNPTR);
            write_method_signature(asm, method_sig, buf)?;
        }
        TypeSignature::ModReq(modifier, inner) => {
            buf.push(ELEMENT_TYPE::CMOD_REQD);
            write_type_def_or_ref_coded(asm, *modifier, buf)?;
            write_type_signature(asm, inner, buf)?;
        }
        TypeSignature::ModOpt(modifier, inner) => {
            buf.push(ELEMENT_TYPE::CMOD_OPT);
            write_type_def_or_ref_coded(asm, *modifier, buf)?;
            write_type_signature(asm, inner, buf)?;
        }
        TypeSignature::Pinned(inner) => {
            buf.push(ELEMENT_TYPE::PINNED);
            write_type_signature(asm, inner, buf)?;
        }
    }
    Ok(())
}

fn write_method_signature(asm: &CilAssembly, sig: &MethodSig, buf: &mut Vec<u8>) -> Result<()> {
    buf.push(sig.call_conv_byte());
    if sig.generic_params > 0 {
        write_compressed_u32(sig.generic_params, buf)?;
    }
    write_compressed_u32(sig.param_count(), buf)?;
    write_type_signature(asm, &sig.return_type, buf)?;
    for param in &sig.params {
        write_type_signature(asm, param, buf)?;
    }
    Ok(())
}

/// Encodes a complete method signature blob (II.23.2.1).
///
/// # Errors
///
/// Returns an error if any contained type fails to encode.
pub fn encode_method_signature(asm: &CilAssembly, sig: &MethodSig) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_method_signature(asm, sig, &mut buf)?;
    Ok(buf)
}

/// Encodes a field signature blob: the FIELD header followed by the type (II.23.2.4).
///
/// # Errors
///
/// Returns an error if the field type fails to encode.
pub fn encode_field_signature(asm: &CilAssembly, field_type: &TypeSignature) -> Result<Vec<u8>> {
    let mut buf = vec![SIGNATURE_HEADER::FIELD];
    write_type_signature(asm, field_type, &mut buf)?;
    Ok(buf)
}

/// Encodes a local variable signature blob (II.23.2.6).
///
/// # Errors
///
/// Returns an error if the method declares no locals (an empty local signature is
/// never emitted; the method header carries a null token instead) or if any local
/// type fails to encode.
pub fn encode_local_var_signature(asm: &CilAssembly, locals: &[TypeSignature]) -> Result<Vec<u8>> {
    if locals.is_empty() {
        return Err(internal_fault!(
            "a local variable signature requires at least one local"
        ));
    }

    let mut buf = vec![SIGNATURE_HEADER::LOCAL_SIG];
    #[allow(clippy::cast_possible_truncation)]
    write_compressed_u32(locals.len() as u32, &mut buf)?;
    for local in locals {
        write_type_signature(asm, local, &mut buf)?;
    }
    Ok(buf)
}

/// Encodes a property signature blob (II.23.2.5).
///
/// # Errors
///
/// Returns an error if the property type or an index parameter fails to encode.
pub fn encode_property_signature(
    asm: &CilAssembly,
    has_this: bool,
    property_type: &TypeSignature,
    params: &[TypeSignature],
) -> Result<Vec<u8>> {
    let mut header = SIGNATURE_HEADER::PROPERTY;
    if has_this {
        header |= super::CALLING_CONVENTION::HASTHIS;
    }
    let mut buf = vec![header];
    #[allow(clippy::cast_possible_truncation)]
    write_compressed_u32(params.len() as u32, &mut buf)?;
    write_type_signature(asm, property_type, &mut buf)?;
    for param in params {
        write_type_signature(asm, param, &mut buf)?;
    }
    Ok(buf)
}

/// Encodes a type specification blob: the bare type expression (II.23.2.14).
///
/// # Errors
///
/// Returns an error if the type fails to encode.
pub fn encode_typespec_signature(asm: &CilAssembly, spec: &TypeSignature) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_type_signature(asm, spec, &mut buf)?;
    Ok(buf)
}

/// Encodes a generic method instantiation blob (II.23.2.15).
///
/// # Errors
///
/// Returns an error if the instantiation is empty or an argument fails to encode.
pub fn encode_method_spec_signature(
    asm: &CilAssembly,
    type_args: &[TypeSignature],
) -> Result<Vec<u8>> {
    if type_args.is_empty() {
        return Err(malformed_error!(
            "a generic method instantiation requires at least one type argument"
        ));
    }

    let mut buf = vec![SIGNATURE_HEADER::GENERIC_INST_METHOD];
    #[allow(clippy::cast_possible_truncation)]
    write_compressed_u32(type_args.len() as u32, &mut buf)?;
    for arg in type_args {
        write_type_signature(asm, arg, &mut buf)?;
    }
    Ok(buf)
}
