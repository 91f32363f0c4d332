//! # CIL Assembly Construction
//!
//! The entity model and orchestration for building a .NET module in memory and
//! emitting it as a PE image. A [`CilAssembly`] owns every program element (classes,
//! fields, methods, signatures, attributes, resources) together with the single
//! heap/table context they register into; the whole transform is
//! *whole-graph-in, whole-file-out*:
//!
//! 1. the client populates the entity graph through the `add_*` API;
//! 2. one [`CilAssembly::build_tables`] pass resolves signatures, runs every method's
//!    instruction stream to its fixed point, sorts the coded-index-keyed tables and
//!    computes the global index widths;
//! 3. one write pass ([`CilAssembly::to_bytes`] / [`CilAssembly::write_image`]) lays
//!    out the sections and emits the final byte stream.
//!
//! Cross-entity references are stable arena ids (newtype indexes into the owning
//! arenas), never pointers; a forward reference is simply an id whose target fields
//! are filled in later. Definitions receive their 1-based table row at creation;
//! re-registering a rowed element is a no-op, which is what lets singleton references
//! (e.g. `System.Object`) be shared freely across call sites.
//!
//! The graph is append-only - nothing is removed or mutated after being rowed - and
//! strictly single-threaded; there is no concurrent access to the table/heap context.

mod attributes;
mod build;
mod constants;
mod features;
mod flags;
mod generics;
mod interop;
mod members;
mod resources;
mod rows;
mod scopes;
mod types;
mod write;

pub use attributes::{AttributeTarget, SecurityAction, SecurityTarget};
pub use constants::Constant;
pub use features::SemanticsTarget;
pub use flags::{
    AssemblyFlags, EventAttributes, FieldAttributes, FileAttributes, GenericParamAttributes,
    ManifestResourceAttributes, MethodAttributes, MethodImplAttributes,
    MethodSemanticsAttributes, ParamAttributes, PInvokeAttributes, PropertyAttributes,
    RuntimeFlags, TypeAttributes,
};
pub use generics::GenericOwner;
pub use interop::{NativeType, NATIVE_TYPE};
pub use members::{ConstantParent, MarshalParent, MemberRefParent};
pub use resources::ImplementationTarget;
pub use scopes::ResolutionScope;

use std::collections::HashMap;

use crate::{
    metadata::heaps::{BlobHeap, GuidHeap, StringsHeap, UserStringsHeap},
    metadata::method::CodeBuffer,
    metadata::signatures::{TypeDefOrRef, TypeSignature},
    metadata::tables::{TableId, TableInfo, TableSet},
    metadata::token::Token,
    Result,
};

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

entity_id!(
    /// Stable id of a class defined in this module
    ClassDefId
);
entity_id!(
    /// Stable id of a class reference into another scope
    ClassRefId
);
entity_id!(
    /// Stable id of an interned type specification
    TypeSpecId
);
entity_id!(
    /// Stable id of a field definition
    FieldDefId
);
entity_id!(
    /// Stable id of a method definition
    MethodDefId
);
entity_id!(
    /// Stable id of a parameter row
    ParamId
);
entity_id!(
    /// Stable id of a member (field or method) reference
    MemberRefId
);
entity_id!(
    /// Stable id of an assembly reference
    AssemblyRefId
);
entity_id!(
    /// Stable id of a module reference
    ModuleRefId
);
entity_id!(
    /// Stable id of a generic parameter
    GenericParamId
);
entity_id!(
    /// Stable id of a generic method instantiation
    MethodSpecId
);
entity_id!(
    /// Stable id of an event definition
    EventId
);
entity_id!(
    /// Stable id of a property definition
    PropertyId
);
entity_id!(
    /// Stable id of a file reference
    FileRefId
);
entity_id!(
    /// Stable id of an exported type row
    ExportedTypeId
);

/// The output flavor of the emitted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// Console executable (`_CorExeMain`, CUI subsystem)
    ConsoleExe,
    /// GUI executable (`_CorExeMain`, GUI subsystem)
    WindowsExe,
    /// Dynamically linked library (`_CorDllMain`)
    Dll,
}

impl ModuleKind {
    pub(crate) fn is_dll(self) -> bool {
        matches!(self, ModuleKind::Dll)
    }
}

/// A method referenced from an instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodTarget {
    /// A method defined in this module
    Def(MethodDefId),
    /// A member reference to an external method
    Ref(MemberRefId),
    /// A generic method instantiation
    Spec(MethodSpecId),
}

impl From<MethodDefId> for MethodTarget {
    fn from(id: MethodDefId) -> Self {
        MethodTarget::Def(id)
    }
}

impl From<MemberRefId> for MethodTarget {
    fn from(id: MemberRefId) -> Self {
        MethodTarget::Ref(id)
    }
}

impl From<MethodSpecId> for MethodTarget {
    fn from(id: MethodSpecId) -> Self {
        MethodTarget::Spec(id)
    }
}

/// A field referenced from an instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldTarget {
    /// A field defined in this module
    Def(FieldDefId),
    /// A member reference to an external field
    Ref(MemberRefId),
}

impl From<FieldDefId> for FieldTarget {
    fn from(id: FieldDefId) -> Self {
        FieldTarget::Def(id)
    }
}

impl From<MemberRefId> for FieldTarget {
    fn from(id: MemberRefId) -> Self {
        FieldTarget::Ref(id)
    }
}

/// The whole-program description: entity arenas plus the one heap/table context.
///
/// See the [module documentation](self) for the lifecycle. All mutation happens
/// before [`CilAssembly::build_tables`]; afterwards sizing and writing are pure
/// functions of resolved state.
pub struct CilAssembly {
    pub(crate) kind: ModuleKind,
    pub(crate) module_name_ix: u32,
    pub(crate) mvid_ix: u32,

    // The single registration context shared by every entity.
    pub(crate) strings: StringsHeap,
    pub(crate) user_strings: UserStringsHeap,
    pub(crate) blobs: BlobHeap,
    pub(crate) guids: GuidHeap,
    pub(crate) tables: TableSet,

    // Entity arenas. Arena order is row order for unsorted tables.
    pub(crate) assembly: Option<scopes::AssemblyInfo>,
    pub(crate) assembly_refs: Vec<scopes::AssemblyRefEntry>,
    pub(crate) module_refs: Vec<scopes::ModuleRefEntry>,
    pub(crate) class_defs: Vec<types::ClassDefEntry>,
    pub(crate) class_refs: Vec<types::ClassRefEntry>,
    pub(crate) type_specs: Vec<types::TypeSpecEntry>,
    pub(crate) nested_classes: Vec<types::NestedClassEntry>,
    pub(crate) interface_impls: Vec<types::InterfaceImplEntry>,
    pub(crate) class_layouts: Vec<types::ClassLayoutEntry>,
    pub(crate) fields: Vec<members::FieldDefEntry>,
    pub(crate) methods: Vec<members::MethodDefEntry>,
    pub(crate) params: Vec<members::ParamEntry>,
    pub(crate) member_refs: Vec<members::MemberRefEntry>,
    pub(crate) field_layouts: Vec<members::FieldLayoutEntry>,
    pub(crate) field_rvas: Vec<members::FieldRvaEntry>,
    pub(crate) standalone_sigs: Vec<members::StandAloneSigEntry>,
    pub(crate) constants: Vec<constants::ConstantEntry>,
    pub(crate) custom_attrs: Vec<attributes::CustomAttributeEntry>,
    pub(crate) decl_security: Vec<attributes::DeclSecurityEntry>,
    pub(crate) generic_params: Vec<generics::GenericParamEntry>,
    pub(crate) generic_constraints: Vec<generics::GenericParamConstraintEntry>,
    pub(crate) method_specs: Vec<generics::MethodSpecEntry>,
    pub(crate) events: Vec<features::EventEntry>,
    pub(crate) event_maps: Vec<features::EventMapEntry>,
    pub(crate) properties: Vec<features::PropertyEntry>,
    pub(crate) property_maps: Vec<features::PropertyMapEntry>,
    pub(crate) method_semantics: Vec<features::MethodSemanticsEntry>,
    pub(crate) method_impls: Vec<features::MethodImplEntry>,
    pub(crate) impl_maps: Vec<interop::ImplMapEntry>,
    pub(crate) field_marshals: Vec<interop::FieldMarshalEntry>,
    pub(crate) manifest_resources: Vec<resources::ManifestResourceEntry>,
    pub(crate) file_refs: Vec<resources::FileRefEntry>,
    pub(crate) exported_types: Vec<resources::ExportedTypeEntry>,

    // Structural caches backing singleton sharing.
    pub(crate) class_ref_cache: HashMap<(ResolutionScope, String, String), ClassRefId>,
    pub(crate) type_spec_cache: HashMap<TypeSignature, TypeSpecId>,
    pub(crate) standalone_sig_cache: HashMap<Vec<u8>, u32>,
    pub(crate) mscorlib: Option<AssemblyRefId>,

    // Write orders for the sorted tables, filled by `build_tables`.
    pub(crate) sorted_orders: HashMap<TableId, Vec<usize>>,

    // Image-level state.
    pub(crate) entry_point: Option<MethodDefId>,
    pub(crate) runtime_flags: RuntimeFlags,
    pub(crate) resources_blob: Vec<u8>,
    pub(crate) sdata: Vec<u8>,
    pub(crate) rsrc: Vec<u8>,
    pub(crate) code_region_size: u32,
    pub(crate) table_info: TableInfo,
    pub(crate) built: bool,
}

impl CilAssembly {
    /// Creates a new module description.
    ///
    /// Registers the Module table row and the implicit `<Module>` pseudo-class as
    /// TypeDef row 1, per the CLI specification.
    ///
    /// # Arguments
    /// * `module_name` - The output file name recorded in the Module table
    /// * `kind` - Console/GUI executable or library output
    #[must_use]
    pub fn new(module_name: &str, kind: ModuleKind) -> Self {
        let mut asm = CilAssembly {
            kind,
            module_name_ix: 0,
            mvid_ix: 0,
            strings: StringsHeap::new(),
            user_strings: UserStringsHeap::new(),
            blobs: BlobHeap::new(),
            guids: GuidHeap::new(),
            tables: TableSet::new(),
            assembly: None,
            assembly_refs: Vec::new(),
            module_refs: Vec::new(),
            class_defs: Vec::new(),
            class_refs: Vec::new(),
            type_specs: Vec::new(),
            nested_classes: Vec::new(),
            interface_impls: Vec::new(),
            class_layouts: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            params: Vec::new(),
            member_refs: Vec::new(),
            field_layouts: Vec::new(),
            field_rvas: Vec::new(),
            standalone_sigs: Vec::new(),
            constants: Vec::new(),
            custom_attrs: Vec::new(),
            decl_security: Vec::new(),
            generic_params: Vec::new(),
            generic_constraints: Vec::new(),
            method_specs: Vec::new(),
            events: Vec::new(),
            event_maps: Vec::new(),
            properties: Vec::new(),
            property_maps: Vec::new(),
            method_semantics: Vec::new(),
            method_impls: Vec::new(),
            impl_maps: Vec::new(),
            field_marshals: Vec::new(),
            manifest_resources: Vec::new(),
            file_refs: Vec::new(),
            exported_types: Vec::new(),
            class_ref_cache: HashMap::new(),
            type_spec_cache: HashMap::new(),
            standalone_sig_cache: HashMap::new(),
            mscorlib: None,
            sorted_orders: HashMap::new(),
            entry_point: None,
            runtime_flags: RuntimeFlags::default(),
            resources_blob: Vec::new(),
            sdata: Vec::new(),
            rsrc: Vec::new(),
            code_region_size: 0,
            table_info: TableInfo::default(),
            built: false,
        };

        asm.module_name_ix = asm.strings.add(module_name);
        asm.mvid_ix = asm.guids.add(scopes::module_version_id(module_name));
        asm.tables.add_row(TableId::Module);

        // TypeDef row 1 is always the <Module> pseudo-class holding module-level
        // fields and methods.
        asm.add_class_raw(TypeAttributes::default(), "", "<Module>", None);

        asm
    }

    /// The implicit `<Module>` pseudo-class (TypeDef row 1).
    #[must_use]
    pub fn module_class(&self) -> ClassDefId {
        ClassDefId(0)
    }

    /// Creates an empty instruction buffer for authoring a method body.
    #[must_use]
    pub fn create_code_buffer(&self) -> CodeBuffer {
        CodeBuffer::new()
    }

    /// Marks `method` as the image's managed entry point.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for library output, which has no managed
    /// entry point.
    pub fn declare_entry_point(&mut self, method: MethodDefId) -> Result<()> {
        if self.kind.is_dll() {
            return Err(malformed_error!("a library has no managed entry point"));
        }
        self.entry_point = Some(method);
        Ok(())
    }

    /// Replaces the CLI header runtime flags (default: IL-only).
    pub fn set_runtime_flags(&mut self, flags: RuntimeFlags) {
        self.runtime_flags = flags;
    }

    // ------------------------------------------------------------------
    // Cross-entity resolution helpers. Rows behind ids are assigned at entity
    // creation, so these are total for any id this assembly handed out.
    // ------------------------------------------------------------------

    /// Returns `(row, discriminant)` for the compressed `TypeDefOrRefOrSpec` token.
    pub(crate) fn type_target_parts(&self, target: TypeDefOrRef) -> (u32, u32) {
        match target {
            TypeDefOrRef::Def(id) => (self.class_defs[id.index()].row, 0),
            TypeDefOrRef::Ref(id) => (self.class_refs[id.index()].row, 1),
            TypeDefOrRef::Spec(id) => (self.type_specs[id.index()].row, 2),
        }
    }

    /// Returns `(table, row)` for coded-index serialization of a type target.
    pub(crate) fn type_target_table_row(&self, target: TypeDefOrRef) -> (TableId, u32) {
        match target {
            TypeDefOrRef::Def(id) => (TableId::TypeDef, self.class_defs[id.index()].row),
            TypeDefOrRef::Ref(id) => (TableId::TypeRef, self.class_refs[id.index()].row),
            TypeDefOrRef::Spec(id) => (TableId::TypeSpec, self.type_specs[id.index()].row),
        }
    }

    /// Returns the metadata token of a type target.
    #[must_use]
    pub fn type_target_token(&self, target: TypeDefOrRef) -> Token {
        let (table, row) = self.type_target_table_row(target);
        Token::from_parts(table.token_prefix(), row)
    }

    /// Returns the metadata token of a method target.
    #[must_use]
    pub fn method_target_token(&self, target: MethodTarget) -> Token {
        match target {
            MethodTarget::Def(id) => {
                Token::from_parts(TableId::MethodDef.token_prefix(), self.methods[id.index()].row)
            }
            MethodTarget::Ref(id) => Token::from_parts(
                TableId::MemberRef.token_prefix(),
                self.member_refs[id.index()].row,
            ),
            MethodTarget::Spec(id) => Token::from_parts(
                TableId::MethodSpec.token_prefix(),
                self.method_specs[id.index()].row,
            ),
        }
    }

    /// Returns the metadata token of a field target.
    #[must_use]
    pub fn field_target_token(&self, target: FieldTarget) -> Token {
        match target {
            FieldTarget::Def(id) => {
                Token::from_parts(TableId::Field.token_prefix(), self.fields[id.index()].row)
            }
            FieldTarget::Ref(id) => Token::from_parts(
                TableId::MemberRef.token_prefix(),
                self.member_refs[id.index()].row,
            ),
        }
    }

    /// Returns the metadata token of a method definition.
    #[must_use]
    pub fn method_token(&self, method: MethodDefId) -> Token {
        self.method_target_token(MethodTarget::Def(method))
    }

    /// Returns the metadata token of a class definition.
    #[must_use]
    pub fn class_token(&self, class: ClassDefId) -> Token {
        self.type_target_token(TypeDefOrRef::Def(class))
    }

    /// Interns a `ldstr` literal into the `#US` heap, returning its index.
    pub(crate) fn intern_user_string(&mut self, value: &str) -> Result<u32> {
        self.user_strings.add(value)
    }

    /// Resolves a type-instruction operand to a token, interning a type
    /// specification for structural types.
    pub(crate) fn type_token_for_signature(&mut self, signature: &TypeSignature) -> Result<Token> {
        if let TypeSignature::Named(target) = signature {
            return Ok(self.type_target_token(*target));
        }
        let spec = self.intern_type_spec(signature.clone())?;
        Ok(self.type_target_token(TypeDefOrRef::Spec(spec)))
    }
}
