//! Member entities: field and method definitions, parameters, member references,
//! explicit field offsets, RVA-mapped field data and stand-alone signatures.
//!
//! Definitions register their table rows at creation. Field and method rows must
//! end up contiguous per owning type (the TypeDef row's list indexes demand it),
//! which holds when members are added class by class; `build_tables` validates the
//! grouping and rejects interleaved authoring as malformed input.

use crate::{
    cilassembly::{
        CilAssembly, ClassDefId, FieldAttributes, FieldDefId, MethodAttributes, MethodDefId,
        MethodImplAttributes, ModuleRefId, ParamAttributes, ParamId, PropertyId,
    },
    cilassembly::MemberRefId,
    metadata::method::MethodBody,
    metadata::signatures::{encoders, MethodSig, TypeDefOrRef, TypeSignature},
    metadata::tables::TableId,
    Result,
};

/// One Field row.
pub(crate) struct FieldDefEntry {
    pub(crate) row: u32,
    pub(crate) parent: ClassDefId,
    pub(crate) flags: FieldAttributes,
    pub(crate) name_ix: u32,
    pub(crate) sig: TypeSignature,
    pub(crate) sig_ix: u32,
}

/// One MethodDef row and its optional body.
pub(crate) struct MethodDefEntry {
    pub(crate) row: u32,
    pub(crate) parent: ClassDefId,
    pub(crate) flags: MethodAttributes,
    pub(crate) impl_flags: MethodImplAttributes,
    pub(crate) name_ix: u32,
    pub(crate) sig: MethodSig,
    pub(crate) sig_ix: u32,
    pub(crate) param_ids: Vec<ParamId>,
    /// Row of the first owned Param row; filled by `build_tables`
    pub(crate) param_list: u32,
    pub(crate) body: Option<MethodBody>,
}

/// One Param row.
pub(crate) struct ParamEntry {
    pub(crate) row: u32,
    pub(crate) flags: ParamAttributes,
    pub(crate) sequence: u16,
    pub(crate) name_ix: u32,
}

/// The parent a member reference resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberRefParent {
    /// A type (definition, reference or specification)
    Type(TypeDefOrRef),
    /// A module reference, for global members of another module
    ModuleRef(ModuleRefId),
    /// A method definition, for vararg call-site references
    Method(MethodDefId),
}

impl From<TypeDefOrRef> for MemberRefParent {
    fn from(target: TypeDefOrRef) -> Self {
        MemberRefParent::Type(target)
    }
}

/// The signature side of a member reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum MemberRefSig {
    Method(MethodSig),
    Field(TypeSignature),
}

/// One MemberRef row.
pub(crate) struct MemberRefEntry {
    pub(crate) row: u32,
    pub(crate) parent: MemberRefParent,
    pub(crate) name: String,
    pub(crate) name_ix: u32,
    pub(crate) sig: MemberRefSig,
    pub(crate) sig_ix: u32,
}

/// One FieldLayout row.
pub(crate) struct FieldLayoutEntry {
    pub(crate) field: FieldDefId,
    pub(crate) offset: u32,
}

/// One FieldRVA row; `data_offset` addresses into the `.sdata` buffer.
pub(crate) struct FieldRvaEntry {
    pub(crate) field: FieldDefId,
    pub(crate) data_offset: u32,
}

/// One StandAloneSig row (local-variable or call-site signature blob).
pub(crate) struct StandAloneSigEntry {
    pub(crate) row: u32,
    pub(crate) sig_ix: u32,
}

/// The parent an element constant attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantParent {
    /// A field's default value
    Field(FieldDefId),
    /// A parameter's default value
    Param(ParamId),
    /// A property's default value
    Property(PropertyId),
}

/// The parent a marshalling descriptor attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarshalParent {
    /// Marshalling for a field
    Field(FieldDefId),
    /// Marshalling for a parameter
    Param(ParamId),
}

impl CilAssembly {
    /// Adds a field definition to `class`.
    pub fn add_field(
        &mut self,
        class: ClassDefId,
        flags: FieldAttributes,
        name: &str,
        field_type: TypeSignature,
    ) -> FieldDefId {
        let name_ix = self.strings.add(name);
        let row = self.tables.add_row(TableId::Field);
        self.fields.push(FieldDefEntry {
            row,
            parent: class,
            flags,
            name_ix,
            sig: field_type,
            sig_ix: 0,
        });
        #[allow(clippy::cast_possible_truncation)]
        let id = FieldDefId(self.fields.len() as u32 - 1);
        self.class_defs[class.index()].field_ids.push(id);
        id
    }

    /// Adds a method definition to `class`.
    ///
    /// Parameter rows are registered immediately after the method row, one per
    /// `(flags, name)` entry, with sequence numbers starting at 1.
    pub fn add_method(
        &mut self,
        class: ClassDefId,
        flags: MethodAttributes,
        impl_flags: MethodImplAttributes,
        name: &str,
        sig: MethodSig,
        param_names: &[(ParamAttributes, &str)],
    ) -> MethodDefId {
        let name_ix = self.strings.add(name);
        let row = self.tables.add_row(TableId::MethodDef);

        let mut param_ids = Vec::with_capacity(param_names.len());
        for (position, (param_flags, param_name)) in param_names.iter().enumerate() {
            let param_name_ix = self.strings.add(param_name);
            let param_row = self.tables.add_row(TableId::Param);
            #[allow(clippy::cast_possible_truncation)]
            let sequence = position as u16 + 1;
            self.params.push(ParamEntry {
                row: param_row,
                flags: *param_flags,
                sequence,
                name_ix: param_name_ix,
            });
            #[allow(clippy::cast_possible_truncation)]
            param_ids.push(ParamId(self.params.len() as u32 - 1));
        }

        self.methods.push(MethodDefEntry {
            row,
            parent: class,
            flags,
            impl_flags,
            name_ix,
            sig,
            sig_ix: 0,
            param_ids,
            param_list: 0,
            body: None,
        });
        #[allow(clippy::cast_possible_truncation)]
        let id = MethodDefId(self.methods.len() as u32 - 1);
        self.class_defs[class.index()].method_ids.push(id);
        id
    }

    /// Returns the parameter ids of a method, in sequence order.
    #[must_use]
    pub fn method_params(&self, method: MethodDefId) -> &[ParamId] {
        &self.methods[method.index()].param_ids
    }

    /// Attaches an instruction body to `method`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the method already has a body.
    pub fn set_method_body(&mut self, method: MethodDefId, body: MethodBody) -> Result<()> {
        let entry = &mut self.methods[method.index()];
        if entry.body.is_some() {
            return Err(malformed_error!("method already has a body"));
        }
        entry.body = Some(body);
        Ok(())
    }

    /// Adds a reference to a method of an external (or vararg call-site) parent.
    ///
    /// Structurally equal references (same parent, name and signature) intern to
    /// one row.
    pub fn add_method_ref(
        &mut self,
        parent: MemberRefParent,
        name: &str,
        sig: MethodSig,
    ) -> MemberRefId {
        self.add_member_ref(parent, name, MemberRefSig::Method(sig))
    }

    /// Adds a reference to a field of an external parent.
    pub fn add_field_ref(
        &mut self,
        parent: MemberRefParent,
        name: &str,
        field_type: TypeSignature,
    ) -> MemberRefId {
        self.add_member_ref(parent, name, MemberRefSig::Field(field_type))
    }

    fn add_member_ref(
        &mut self,
        parent: MemberRefParent,
        name: &str,
        sig: MemberRefSig,
    ) -> MemberRefId {
        if let Some(existing) = self
            .member_refs
            .iter()
            .position(|entry| entry.parent == parent && entry.name == name && entry.sig == sig)
        {
            #[allow(clippy::cast_possible_truncation)]
            return MemberRefId(existing as u32);
        }

        let name_ix = self.strings.add(name);
        let row = self.tables.add_row(TableId::MemberRef);
        self.member_refs.push(MemberRefEntry {
            row,
            parent,
            name: name.to_string(),
            name_ix,
            sig,
            sig_ix: 0,
        });
        #[allow(clippy::cast_possible_truncation)]
        MemberRefId(self.member_refs.len() as u32 - 1)
    }

    /// Records an explicit byte offset for `field` (explicit-layout types).
    pub fn set_field_offset(&mut self, field: FieldDefId, offset: u32) {
        self.tables.add_row(TableId::FieldLayout);
        self.field_layouts.push(FieldLayoutEntry { field, offset });
    }

    /// Maps `field` onto initialized data, which lands in the `.sdata` section.
    ///
    /// Marks the field `HAS_FIELD_RVA` and returns the data's offset within the
    /// initialized-data region.
    pub fn set_field_data(&mut self, field: FieldDefId, data: &[u8]) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let data_offset = self.sdata.len() as u32;
        self.sdata.extend_from_slice(data);
        // Data constants stay quad-aligned so consecutive mappings are addressable.
        crate::file::io::pad_to_alignment(&mut self.sdata, 4);

        self.fields[field.index()].flags |= FieldAttributes::HAS_FIELD_RVA;
        self.tables.add_row(TableId::FieldRVA);
        self.field_rvas.push(FieldRvaEntry { field, data_offset });
        data_offset
    }

    /// Interns a stand-alone signature blob, returning its row.
    pub(crate) fn intern_standalone_sig(&mut self, blob: &[u8]) -> Result<u32> {
        if let Some(existing) = self.standalone_sig_cache.get(blob) {
            return Ok(*existing);
        }
        let sig_ix = self.blobs.add(blob)?;
        let row = self.tables.add_row(TableId::StandAloneSig);
        self.standalone_sigs.push(StandAloneSigEntry { row, sig_ix });
        self.standalone_sig_cache.insert(blob.to_vec(), row);
        Ok(row)
    }

    /// Interns the local-variable signature for a method body, returning its row.
    pub(crate) fn intern_local_signature(&mut self, locals: &[TypeSignature]) -> Result<u32> {
        let blob = encoders::encode_local_var_signature(self, locals)?;
        self.intern_standalone_sig(&blob)
    }

    /// Interns a call-site signature for `calli`, returning its row.
    pub(crate) fn intern_calli_signature(&mut self, sig: &MethodSig) -> Result<u32> {
        let blob = encoders::encode_method_signature(self, sig)?;
        self.intern_standalone_sig(&blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cilassembly::{ModuleKind, TypeAttributes};

    fn assembly_with_class() -> (CilAssembly, ClassDefId) {
        let mut asm = CilAssembly::new("t.exe", ModuleKind::ConsoleExe);
        let object = asm.system_class("Object");
        let class = asm.add_class(TypeAttributes::PUBLIC, "Demo", "Program", Some(object.into()));
        (asm, class)
    }

    #[test]
    fn field_and_method_rows_are_one_based() {
        let (mut asm, class) = assembly_with_class();
        let field = asm.add_field(
            class,
            FieldAttributes::PRIVATE,
            "counter",
            TypeSignature::I4,
        );
        let method = asm.add_method(
            class,
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            MethodImplAttributes::IL,
            "Main",
            MethodSig::new(TypeSignature::Void, vec![]),
            &[],
        );
        assert_eq!(asm.fields[field.index()].row, 1);
        assert_eq!(asm.methods[method.index()].row, 1);
        assert_eq!(asm.method_token(method).value(), 0x0600_0001);
    }

    #[test]
    fn params_register_with_sequence_numbers() {
        let (mut asm, class) = assembly_with_class();
        let method = asm.add_method(
            class,
            MethodAttributes::PUBLIC,
            MethodImplAttributes::IL,
            "Add",
            MethodSig::new_instance(
                TypeSignature::I4,
                vec![TypeSignature::I4, TypeSignature::I4],
            ),
            &[
                (ParamAttributes::IN, "left"),
                (ParamAttributes::IN, "right"),
            ],
        );
        let params = asm.method_params(method);
        assert_eq!(params.len(), 2);
        assert_eq!(asm.params[params[0].index()].sequence, 1);
        assert_eq!(asm.params[params[1].index()].sequence, 2);
    }

    #[test]
    fn member_refs_intern_structurally() {
        let (mut asm, _) = assembly_with_class();
        let console = asm.system_class("Console");
        let sig = MethodSig::new(TypeSignature::Void, vec![TypeSignature::String]);
        let a = asm.add_method_ref(TypeDefOrRef::Ref(console).into(), "WriteLine", sig.clone());
        let b = asm.add_method_ref(TypeDefOrRef::Ref(console).into(), "WriteLine", sig);
        assert_eq!(a, b);
        assert_eq!(asm.member_refs.len(), 1);
    }

    #[test]
    fn field_data_marks_rva_flag() {
        let (mut asm, class) = assembly_with_class();
        let field = asm.add_field(
            class,
            FieldAttributes::STATIC | FieldAttributes::ASSEMBLY,
            "init",
            TypeSignature::I4,
        );
        let offset = asm.set_field_data(field, &[1, 2, 3, 4]);
        assert_eq!(offset, 0);
        assert!(asm.fields[field.index()]
            .flags
            .contains(FieldAttributes::HAS_FIELD_RVA));
        assert_eq!(asm.sdata.len(), 4);
    }

    #[test]
    fn double_body_rejected() {
        let (mut asm, class) = assembly_with_class();
        let method = asm.add_method(
            class,
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            MethodImplAttributes::IL,
            "Main",
            MethodSig::new(TypeSignature::Void, vec![]),
            &[],
        );
        asm.set_method_body(method, MethodBody::new(8)).unwrap();
        assert!(asm.set_method_body(method, MethodBody::new(8)).is_err());
    }
}
