//! # Type Signatures
//!
//! The in-memory model for ECMA-335 type expressions and the signature kinds built
//! from them (field, method, local-variable, property, type-spec, method-spec).
//! Emission into compressed binary form lives in [`encoders`].
//!
//! A type expression is one closed tagged variant, [`TypeSignature`], dispatched by
//! pattern match - primitives carry nothing, composite forms carry exactly their own
//! data. Cross-entity references inside signatures ([`TypeDefOrRef`]) are stable arena
//! ids into the owning [`crate::cilassembly::CilAssembly`]; rows behind those ids are
//! assigned at entity creation, so a signature never holds a dangling forward pointer.
//!
//! ## Reference
//! - [ECMA-335 II.23.2](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Blobs and signatures

pub mod encoders;

use crate::cilassembly::{ClassDefId, ClassRefId, TypeSpecId};

/// Element type tags used in signature encoding - from coreclr.
#[allow(non_snake_case, dead_code, missing_docs)]
pub mod ELEMENT_TYPE {
    //Marks end of a list
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    // Followed by type
    pub const PTR: u8 = 0x0f;
    // Followed by type
    pub const BYREF: u8 = 0x10;
    // Followed by TypeDef or TypeRef token
    pub const VALUETYPE: u8 = 0x11;
    // Followed by TypeDef or TypeRef token
    pub const CLASS: u8 = 0x12;
    // Generic parameter in a generic type definition, represented as number
    pub const VAR: u8 = 0x13;
    // type rank boundsCount bound1 ... loCount lo1 ...
    pub const ARRAY: u8 = 0x14;
    // Generic type instantiation. Followed by type type-arg-count type-1 ... type-n
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    // System.IntPtr
    pub const I: u8 = 0x18;
    // System.UIntPtr
    pub const U: u8 = 0x19;
    // Followed by full method signature
    pub const FNPTR: u8 = 0x1b;
    // System.Object
    pub const OBJECT: u8 = 0x1c;
    // Single-dim array with 0 lower bound
    pub const SZARRAY: u8 = 0x1d;
    // Generic parameter in a generic method definition, represented as number
    pub const MVAR: u8 = 0x1e;
    // Required modifier : followed by a TypeDef or TypeRef token
    pub const CMOD_REQD: u8 = 0x1f;
    // Optional modifier : followed by a TypeDef or TypeRef token
    pub const CMOD_OPT: u8 = 0x20;
    // Sentinel for vararg method signature
    pub const SENTINEL: u8 = 0x41;
    // Denotes a local variable that points at a pinned object
    pub const PINNED: u8 = 0x45;
    // Constant-table tag for a null class reference
    pub const CLASS_CONST: u8 = 0x12;
}

/// Signature header bytes selecting the signature kind.
#[allow(non_snake_case, dead_code, missing_docs)]
pub mod SIGNATURE_HEADER {
    pub const FIELD: u8 = 0x06;
    pub const LOCAL_SIG: u8 = 0x07;
    pub const PROPERTY: u8 = 0x08;
    pub const GENERIC_INST_METHOD: u8 = 0x0A;
}

/// Calling convention bits of a method signature's first byte.
#[allow(non_snake_case, dead_code, missing_docs)]
pub mod CALLING_CONVENTION {
    pub const DEFAULT: u8 = 0x00;
    pub const C: u8 = 0x01;
    pub const STDCALL: u8 = 0x02;
    pub const THISCALL: u8 = 0x03;
    pub const FASTCALL: u8 = 0x04;
    pub const VARARG: u8 = 0x05;
    pub const GENERIC: u8 = 0x10;
    pub const HASTHIS: u8 = 0x20;
    pub const EXPLICITTHIS: u8 = 0x40;
}

/// A reference to a type entity: defined here, defined elsewhere, or a specification.
///
/// The discriminant doubles as the low two bits of the compressed
/// `TypeDefOrRefOrSpecEncoded` token (`row << 2 | discriminant`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeDefOrRef {
    /// A class defined in this module
    Def(ClassDefId),
    /// A class defined in another scope
    Ref(ClassRefId),
    /// A type specification blob
    Spec(TypeSpecId),
}

impl From<ClassDefId> for TypeDefOrRef {
    fn from(id: ClassDefId) -> Self {
        TypeDefOrRef::Def(id)
    }
}

impl From<ClassRefId> for TypeDefOrRef {
    fn from(id: ClassRefId) -> Self {
        TypeDefOrRef::Ref(id)
    }
}

impl From<TypeSpecId> for TypeDefOrRef {
    fn from(id: TypeSpecId) -> Self {
        TypeDefOrRef::Spec(id)
    }
}

/// Represents a type expression in any signature.
///
/// Every variant knows its single-byte element tag; composite variants carry only
/// their own data and recurse structurally. Equality and hashing are structural,
/// which is what type-spec interning deduplicates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSignature {
    /// void
    Void,
    /// bool
    Boolean,
    /// char
    Char,
    /// signed 8bit integer
    I1,
    /// unsigned 8bit integer
    U1,
    /// signed 16bit integer
    I2,
    /// unsigned 16bit integer
    U2,
    /// signed 32bit integer
    I4,
    /// unsigned 32bit integer
    U4,
    /// signed 64bit integer
    I8,
    /// unsigned 64bit integer
    U8,
    /// 32bit floating-point
    R4,
    /// 64bit floating-point
    R8,
    /// System.String
    String,
    /// System.Object
    Object,
    /// signed integer, sized to executing platform
    I,
    /// unsigned integer, sized to executing platform
    U,
    /// Type is referenced during runtime
    TypedByRef,
    /// A named class or value type; whether it emits CLASS or VALUETYPE is resolved
    /// from the referenced entity (for definitions, only after the super-type chain
    /// has been resolved)
    Named(TypeDefOrRef),
    /// Single dimension array with zero lower bound
    SzArray(Box<TypeSignature>),
    /// Multi dimensional array with explicit bounds
    Array {
        /// The type of the array elements
        element: Box<TypeSignature>,
        /// The number of dimensions
        rank: u32,
        /// Sizes for leading dimensions (may be shorter than `rank`, or empty)
        sizes: Vec<u32>,
        /// Lower bounds for leading dimensions (may be shorter than `rank`, or empty)
        lower_bounds: Vec<i32>,
    },
    /// Unmanaged pointer to a type
    Ptr(Box<TypeSignature>),
    /// Managed pointer (by-reference) to a type
    ByRef(Box<TypeSignature>),
    /// Generic type instantiation
    GenericInst {
        /// The generic type definition or reference being instantiated
        base: TypeDefOrRef,
        /// The type arguments, in declaration order
        args: Vec<TypeSignature>,
    },
    /// Generic parameter of the enclosing type, by index
    Var(u32),
    /// Generic parameter of the enclosing method, by index
    MVar(u32),
    /// Function pointer carrying a full method signature
    FnPtr(Box<MethodSig>),
    /// Required custom modifier applied to an underlying type
    ModReq(TypeDefOrRef, Box<TypeSignature>),
    /// Optional custom modifier applied to an underlying type
    ModOpt(TypeDefOrRef, Box<TypeSignature>),
    /// A pinned local variable type
    Pinned(Box<TypeSignature>),
    /// The vararg sentinel marking the start of optional call-site arguments
    Sentinel,
}

/// Non-default unmanaged calling kinds for stand-alone (calli) signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Managed, fixed argument list
    Default,
    /// Managed, variable argument list
    Vararg,
    /// Unmanaged cdecl
    Cdecl,
    /// Unmanaged stdcall
    StdCall,
    /// Unmanaged thiscall
    ThisCall,
    /// Unmanaged fastcall
    FastCall,
}

impl CallKind {
    /// Returns the calling convention bits for this kind.
    #[must_use]
    pub fn bits(self) -> u8 {
        match self {
            CallKind::Default => CALLING_CONVENTION::DEFAULT,
            CallKind::Vararg => CALLING_CONVENTION::VARARG,
            CallKind::Cdecl => CALLING_CONVENTION::C,
            CallKind::StdCall => CALLING_CONVENTION::STDCALL,
            CallKind::ThisCall => CALLING_CONVENTION::THISCALL,
            CallKind::FastCall => CALLING_CONVENTION::FASTCALL,
        }
    }
}

/// A method signature: calling convention, return type and parameter types.
///
/// Used for method definitions, member references, call-site (calli) signatures and
/// function pointer types. A [`TypeSignature::Sentinel`] entry in `params` separates
/// fixed from optional vararg arguments and is excluded from the encoded count.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSig {
    /// The calling kind (managed default/vararg, or an unmanaged convention)
    pub kind: CallKind,
    /// True for instance signatures (HASTHIS)
    pub has_this: bool,
    /// True when the this-pointer type is explicit in the parameter list
    pub explicit_this: bool,
    /// Number of generic parameters the method declares, 0 for none
    pub generic_params: u32,
    /// The return type
    pub return_type: TypeSignature,
    /// The parameter types, possibly containing one sentinel
    pub params: Vec<TypeSignature>,
}

impl MethodSig {
    /// Creates a managed signature with the default calling convention.
    #[must_use]
    pub fn new(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        MethodSig {
            kind: CallKind::Default,
            has_this: false,
            explicit_this: false,
            generic_params: 0,
            return_type,
            params,
        }
    }

    /// Creates an instance (HASTHIS) signature with the default calling convention.
    #[must_use]
    pub fn new_instance(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        MethodSig {
            has_this: true,
            ..MethodSig::new(return_type, params)
        }
    }

    /// Returns the first byte of the encoded signature.
    #[must_use]
    pub fn call_conv_byte(&self) -> u8 {
        let mut conv = self.kind.bits();
        if self.generic_params > 0 {
            conv |= CALLING_CONVENTION::GENERIC;
        }
        if self.has_this {
            conv |= CALLING_CONVENTION::HASTHIS;
        }
        if self.explicit_this {
            conv |= CALLING_CONVENTION::EXPLICITTHIS;
        }
        conv
    }

    /// Returns the encoded parameter count: sentinels are markers, not parameters.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn param_count(&self) -> u32 {
        self.params
            .iter()
            .filter(|p| !matches!(p, TypeSignature::Sentinel))
            .count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_conv_byte_composition() {
        let mut sig = MethodSig::new(TypeSignature::Void, vec![]);
        assert_eq!(sig.call_conv_byte(), 0x00);

        sig.has_this = true;
        assert_eq!(sig.call_conv_byte(), 0x20);

        sig.kind = CallKind::Vararg;
        assert_eq!(sig.call_conv_byte(), 0x25);

        sig.generic_params = 2;
        assert_eq!(sig.call_conv_byte(), 0x35);
    }

    #[test]
    fn sentinel_excluded_from_param_count() {
        let sig = MethodSig {
            kind: CallKind::Vararg,
            has_this: false,
            explicit_this: false,
            generic_params: 0,
            return_type: TypeSignature::Void,
            params: vec![
                TypeSignature::I4,
                TypeSignature::Sentinel,
                TypeSignature::R8,
            ],
        };
        assert_eq!(sig.param_count(), 2);
    }

    #[test]
    fn structural_equality_for_interning() {
        let a = TypeSignature::SzArray(Box::new(TypeSignature::I4));
        let b = TypeSignature::SzArray(Box::new(TypeSignature::I4));
        let c = TypeSignature::SzArray(Box::new(TypeSignature::I8));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
