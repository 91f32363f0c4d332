//! Attribute flag words for program elements and the CLI header.
//!
//! Raw ECMA-335 bit sets, carried verbatim into table rows. Only the commonly
//! composed bits are named; exotic combinations can be built with `from_bits_retain`.
//!
//! ## Reference
//! - [ECMA-335 II.23.1](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Flag definitions

use bitflags::bitflags;

bitflags! {
    /// TypeDef row flags (ECMA-335 II.23.1.15).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TypeAttributes: u32 {
        /// Type is not visible outside the assembly
        const NOT_PUBLIC = 0x0000_0000;
        /// Type is visible outside the assembly
        const PUBLIC = 0x0000_0001;
        /// Nested type with public visibility
        const NESTED_PUBLIC = 0x0000_0002;
        /// Nested type with private visibility
        const NESTED_PRIVATE = 0x0000_0003;
        /// Nested type visible to the declaring family
        const NESTED_FAMILY = 0x0000_0004;
        /// Nested type visible within the assembly
        const NESTED_ASSEMBLY = 0x0000_0005;
        /// Fields are laid out sequentially
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        /// Fields are laid out at explicit offsets
        const EXPLICIT_LAYOUT = 0x0000_0010;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Type cannot be derived from
        const SEALED = 0x0000_0100;
        /// Type is abstract
        const ABSTRACT = 0x0000_0080;
        /// Name is special, checked by the runtime
        const SPECIAL_NAME = 0x0000_0400;
        /// Type is imported from COM
        const IMPORT = 0x0000_1000;
        /// Type is serializable
        const SERIALIZABLE = 0x0000_2000;
        /// Strings are interpreted as UNICODE
        const UNICODE_CLASS = 0x0001_0000;
        /// Automatic string interpretation
        const AUTO_CLASS = 0x0002_0000;
        /// Class is initialized before first static field access
        const BEFORE_FIELD_INIT = 0x0010_0000;
        /// Runtime-special name
        const RT_SPECIAL_NAME = 0x0000_0800;
    }
}

bitflags! {
    /// Field row flags (ECMA-335 II.23.1.5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FieldAttributes: u16 {
        /// Accessible only by the declaring type
        const PRIVATE = 0x0001;
        /// Accessible by type and subtypes within the assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessible within the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible by type and subtypes
        const FAMILY = 0x0004;
        /// Accessible by anyone who can see the type
        const PUBLIC = 0x0006;
        /// Static field
        const STATIC = 0x0010;
        /// Writable only in a constructor
        const INIT_ONLY = 0x0020;
        /// Compile-time constant; value lives in the Constant table
        const LITERAL = 0x0040;
        /// Not serialized when the type is remoted
        const NOT_SERIALIZED = 0x0080;
        /// Name is special
        const SPECIAL_NAME = 0x0200;
        /// Implementation is forwarded through P/Invoke
        const PINVOKE_IMPL = 0x2000;
        /// Runtime-special name
        const RT_SPECIAL_NAME = 0x0400;
        /// Field has marshalling information
        const HAS_FIELD_MARSHAL = 0x1000;
        /// Field has a default value
        const HAS_DEFAULT = 0x8000;
        /// Field has an RVA-mapped initial value
        const HAS_FIELD_RVA = 0x0100;
    }
}

bitflags! {
    /// MethodDef row flags (ECMA-335 II.23.1.10).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodAttributes: u16 {
        /// Accessible only by the declaring type
        const PRIVATE = 0x0001;
        /// Accessible by type and subtypes within the assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessible within the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible by type and subtypes
        const FAMILY = 0x0004;
        /// Accessible by subtypes or within the assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessible by anyone who can see the type
        const PUBLIC = 0x0006;
        /// Static method
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name and signature
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new vtable slot
        const NEW_SLOT = 0x0100;
        /// Overridability applies only to this exact method
        const STRICT = 0x0200;
        /// Method is abstract
        const ABSTRACT = 0x0400;
        /// Name is special
        const SPECIAL_NAME = 0x0800;
        /// Runtime-special name (e.g. .ctor)
        const RT_SPECIAL_NAME = 0x1000;
        /// Implementation is forwarded through P/Invoke
        const PINVOKE_IMPL = 0x2000;
        /// Method has declarative security
        const HAS_SECURITY = 0x4000;
    }
}

bitflags! {
    /// MethodDef implementation flags (ECMA-335 II.23.1.11).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodImplAttributes: u16 {
        /// Implemented in CIL
        const IL = 0x0000;
        /// Implemented natively
        const NATIVE = 0x0001;
        /// Implemented by the runtime itself
        const RUNTIME = 0x0003;
        /// Implementation lives in unmanaged code
        const UNMANAGED = 0x0004;
        /// Method cannot be inlined
        const NO_INLINING = 0x0008;
        /// Method body is forwarded
        const FORWARD_REF = 0x0010;
        /// Method is single-threaded through its body
        const SYNCHRONIZED = 0x0020;
        /// Signature is mangled for internal call
        const INTERNAL_CALL = 0x1000;
        /// Reserved: preserve signature across marshalling
        const PRESERVE_SIG = 0x0080;
    }
}

bitflags! {
    /// Param row flags (ECMA-335 II.23.1.13).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParamAttributes: u16 {
        /// Input parameter
        const IN = 0x0001;
        /// Output parameter
        const OUT = 0x0002;
        /// Optional parameter
        const OPTIONAL = 0x0010;
        /// Parameter has a default value
        const HAS_DEFAULT = 0x1000;
        /// Parameter has marshalling information
        const HAS_FIELD_MARSHAL = 0x2000;
    }
}

bitflags! {
    /// Event row flags (ECMA-335 II.23.1.4).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EventAttributes: u16 {
        /// Name is special
        const SPECIAL_NAME = 0x0200;
        /// Runtime-special name
        const RT_SPECIAL_NAME = 0x0400;
    }
}

bitflags! {
    /// Property row flags (ECMA-335 II.23.1.14).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PropertyAttributes: u16 {
        /// Name is special
        const SPECIAL_NAME = 0x0200;
        /// Runtime-special name
        const RT_SPECIAL_NAME = 0x0400;
        /// Property has a default value
        const HAS_DEFAULT = 0x1000;
    }
}

bitflags! {
    /// MethodSemantics association kinds (ECMA-335 II.23.1.12).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodSemanticsAttributes: u16 {
        /// Property setter
        const SETTER = 0x0001;
        /// Property getter
        const GETTER = 0x0002;
        /// Other accessor
        const OTHER = 0x0004;
        /// Event add handler
        const ADD_ON = 0x0008;
        /// Event remove handler
        const REMOVE_ON = 0x0010;
        /// Event fire handler
        const FIRE = 0x0020;
    }
}

bitflags! {
    /// ImplMap (P/Invoke) flags (ECMA-335 II.23.1.8).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PInvokeAttributes: u16 {
        /// Mangle the import name per convention
        const NO_MANGLE = 0x0001;
        /// Marshal strings as ANSI
        const CHAR_SET_ANSI = 0x0002;
        /// Marshal strings as UTF-16
        const CHAR_SET_UNICODE = 0x0004;
        /// Platform-determined string marshalling
        const CHAR_SET_AUTO = 0x0006;
        /// Map Win32 last-error
        const SUPPORTS_LAST_ERROR = 0x0040;
        /// winapi calling convention
        const CALL_CONV_WINAPI = 0x0100;
        /// cdecl calling convention
        const CALL_CONV_CDECL = 0x0200;
        /// stdcall calling convention
        const CALL_CONV_STDCALL = 0x0300;
        /// thiscall calling convention
        const CALL_CONV_THISCALL = 0x0400;
        /// fastcall calling convention
        const CALL_CONV_FASTCALL = 0x0500;
    }
}

bitflags! {
    /// Assembly manifest flags (ECMA-335 II.23.1.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AssemblyFlags: u32 {
        /// The assembly reference holds the full public key
        const PUBLIC_KEY = 0x0001;
        /// The assembly can be retargeted at runtime
        const RETARGETABLE = 0x0100;
        /// JIT tracking enabled
        const ENABLE_JIT_TRACKING = 0x8000;
    }
}

bitflags! {
    /// GenericParam row flags (ECMA-335 II.23.1.7).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GenericParamAttributes: u16 {
        /// Covariant parameter
        const COVARIANT = 0x0001;
        /// Contravariant parameter
        const CONTRAVARIANT = 0x0002;
        /// Must be a reference type
        const REFERENCE_TYPE_CONSTRAINT = 0x0004;
        /// Must be a non-nullable value type
        const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT = 0x0008;
        /// Must have a default constructor
        const DEFAULT_CONSTRUCTOR_CONSTRAINT = 0x0010;
    }
}

bitflags! {
    /// CLI header runtime flags (ECMA-335 II.25.3.3.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RuntimeFlags: u32 {
        /// Image contains only IL
        const IL_ONLY = 0x0000_0001;
        /// Image requires a 32-bit process
        const REQUIRE_32BIT = 0x0000_0002;
        /// Image is strong-name signed
        const STRONG_NAME_SIGNED = 0x0000_0008;
        /// Debugger tracking data present
        const TRACK_DEBUG_DATA = 0x0001_0000;
    }
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        RuntimeFlags::IL_ONLY
    }
}

bitflags! {
    /// ManifestResource flags (ECMA-335 II.23.1.9).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ManifestResourceAttributes: u32 {
        /// Resource is exported from the assembly
        const PUBLIC = 0x0001;
        /// Resource is private to the assembly
        const PRIVATE = 0x0002;
    }
}

bitflags! {
    /// File table flags (ECMA-335 II.23.1.6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FileAttributes: u32 {
        /// The file carries no metadata
        const CONTAINS_NO_METADATA = 0x0001;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composition_matches_raw_bits() {
        let flags = MethodAttributes::PUBLIC | MethodAttributes::STATIC;
        assert_eq!(flags.bits(), 0x0016);

        let flags = TypeAttributes::PUBLIC | TypeAttributes::SEALED;
        assert_eq!(flags.bits(), 0x0000_0101);
    }

    #[test]
    fn runtime_flags_default_is_il_only() {
        assert_eq!(RuntimeFlags::default().bits(), 1);
    }
}
