//! Table row serialization for the `#~` stream.
//!
//! Every row writes itself through a [`RowSink`], which applies the globally
//! computed index widths: heap indexes, plain table indexes and coded indexes all
//! serialize at 2 or 4 bytes as [`crate::metadata::tables::TableInfo`] dictates,
//! uniformly for every row regardless of when its entity was created.
//!
//! Row field layouts follow ECMA-335 II.22; rows are emitted in table-id order,
//! sorted tables in their key order via the permutations `build_tables` recorded.

use strum::IntoEnumIterator;

use crate::{
    cilassembly::resources::ImplementationTarget,
    cilassembly::{CilAssembly, MemberRefParent, ResolutionScope},
    file::io::{emit_le, emit_le_dyn},
    metadata::tables::{CodedIndexType, TableId, TableInfo},
    Result,
};

/// RVA inputs the rows need from section layout: where method bodies and
/// initialized data land in the image. All values are zero during the sizing
/// pass - row widths never depend on them.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RowLayout {
    /// RVA of the first method body (text RVA + code start offset)
    pub(crate) code_base: u32,
    /// RVA of the `.sdata` section, 0 if absent
    pub(crate) sdata_rva: u32,
}

/// Width-applying writer for one row stream.
pub(crate) struct RowSink<'a> {
    buf: &'a mut Vec<u8>,
    info: &'a TableInfo,
}

impl<'a> RowSink<'a> {
    fn new(buf: &'a mut Vec<u8>, info: &'a TableInfo) -> Self {
        RowSink { buf, info }
    }

    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u16(&mut self, value: u16) {
        emit_le(self.buf, value);
    }

    fn u32(&mut self, value: u32) {
        emit_le(self.buf, value);
    }

    fn str_ix(&mut self, index: u32) -> Result<()> {
        emit_le_dyn(self.buf, index, self.info.is_large_str())
    }

    fn blob_ix(&mut self, index: u32) -> Result<()> {
        emit_le_dyn(self.buf, index, self.info.is_large_blob())
    }

    fn guid_ix(&mut self, index: u32) -> Result<()> {
        emit_le_dyn(self.buf, index, self.info.is_large_guid())
    }

    fn table_ix(&mut self, table: TableId, row: u32) -> Result<()> {
        emit_le_dyn(self.buf, row, self.info.is_large(table))
    }

    fn coded(&mut self, ci: CodedIndexType, table: TableId, row: u32) -> Result<()> {
        let value = ci.encode(table, row)?;
        emit_le_dyn(self.buf, value, self.info.is_large_coded(ci))
    }
}

impl CilAssembly {
    fn resolution_scope_table_row(&self, scope: ResolutionScope) -> (TableId, u32) {
        match scope {
            ResolutionScope::Module => (TableId::Module, 1),
            ResolutionScope::ModuleRef(id) => (TableId::ModuleRef, self.module_refs[id.index()].row),
            ResolutionScope::AssemblyRef(id) => {
                (TableId::AssemblyRef, self.assembly_refs[id.index()].row)
            }
            ResolutionScope::Nested(id) => (TableId::TypeRef, self.class_refs[id.index()].row),
        }
    }

    fn member_ref_parent_table_row(&self, parent: MemberRefParent) -> (TableId, u32) {
        match parent {
            MemberRefParent::Type(target) => self.type_target_table_row(target),
            MemberRefParent::ModuleRef(id) => {
                (TableId::ModuleRef, self.module_refs[id.index()].row)
            }
            MemberRefParent::Method(id) => (TableId::MethodDef, self.methods[id.index()].row),
        }
    }

    fn implementation_table_row(&self, target: Option<ImplementationTarget>) -> (TableId, u32) {
        match target {
            None => (TableId::File, 0),
            Some(ImplementationTarget::File(id)) => (TableId::File, self.file_refs[id.index()].row),
            Some(ImplementationTarget::AssemblyRef(id)) => {
                (TableId::AssemblyRef, self.assembly_refs[id.index()].row)
            }
        }
    }

    fn sorted_order_or_natural(&self, table: TableId, len: usize) -> Vec<usize> {
        self.sorted_orders
            .get(&table)
            .cloned()
            .unwrap_or_else(|| (0..len).collect())
    }

    /// Serializes all present tables' rows in table-id order.
    pub(crate) fn write_table_rows(&self, layout: RowLayout, buf: &mut Vec<u8>) -> Result<()> {
        for table in TableId::iter() {
            if self.tables.row_count(table) == 0 {
                continue;
            }
            self.write_rows_of(table, layout, buf)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn write_rows_of(&self, table: TableId, layout: RowLayout, buf: &mut Vec<u8>) -> Result<()> {
        let info = &self.table_info;
        let mut sink = RowSink::new(buf, info);

        match table {
            TableId::Module => {
                sink.u16(0); // generation
                sink.str_ix(self.module_name_ix)?;
                sink.guid_ix(self.mvid_ix)?;
                sink.guid_ix(0)?;
                sink.guid_ix(0)?;
            }
            TableId::TypeRef => {
                for entry in &self.class_refs {
                    let (scope_table, scope_row) = self.resolution_scope_table_row(entry.scope);
                    sink.coded(CodedIndexType::ResolutionScope, scope_table, scope_row)?;
                    sink.str_ix(entry.name_ix)?;
                    sink.str_ix(entry.namespace_ix)?;
                }
            }
            TableId::TypeDef => {
                for entry in &self.class_defs {
                    sink.u32(entry.flags.bits());
                    sink.str_ix(entry.name_ix)?;
                    sink.str_ix(entry.namespace_ix)?;
                    match entry.extends {
                        Some(target) => {
                            let (ext_table, ext_row) = self.type_target_table_row(target);
                            sink.coded(CodedIndexType::TypeDefOrRef, ext_table, ext_row)?;
                        }
                        None => sink.coded(CodedIndexType::TypeDefOrRef, TableId::TypeDef, 0)?,
                    }
                    sink.table_ix(TableId::Field, entry.field_list)?;
                    sink.table_ix(TableId::MethodDef, entry.method_list)?;
                }
            }
            TableId::Field => {
                for entry in &self.fields {
                    sink.u16(entry.flags.bits());
                    sink.str_ix(entry.name_ix)?;
                    sink.blob_ix(entry.sig_ix)?;
                }
            }
            TableId::MethodDef => {
                for entry in &self.methods {
                    let rva = match &entry.body {
                        Some(body) => layout.code_base + body.code_offset,
                        None => 0,
                    };
                    sink.u32(rva);
                    sink.u16(entry.impl_flags.bits());
                    sink.u16(entry.flags.bits());
                    sink.str_ix(entry.name_ix)?;
                    sink.blob_ix(entry.sig_ix)?;
                    sink.table_ix(TableId::Param, entry.param_list)?;
                }
            }
            TableId::Param => {
                for entry in &self.params {
                    sink.u16(entry.flags.bits());
                    sink.u16(entry.sequence);
                    sink.str_ix(entry.name_ix)?;
                }
            }
            TableId::InterfaceImpl => {
                for index in
                    self.sorted_order_or_natural(TableId::InterfaceImpl, self.interface_impls.len())
                {
                    let entry = &self.interface_impls[index];
                    sink.table_ix(TableId::TypeDef, self.class_defs[entry.class.index()].row)?;
                    let (iface_table, iface_row) = self.type_target_table_row(entry.interface);
                    sink.coded(CodedIndexType::TypeDefOrRef, iface_table, iface_row)?;
                }
            }
            TableId::MemberRef => {
                for entry in &self.member_refs {
                    let (parent_table, parent_row) = self.member_ref_parent_table_row(entry.parent);
                    sink.coded(CodedIndexType::MemberRefParent, parent_table, parent_row)?;
                    sink.str_ix(entry.name_ix)?;
                    sink.blob_ix(entry.sig_ix)?;
                }
            }
            TableId::Constant => {
                for index in self.sorted_order_or_natural(TableId::Constant, self.constants.len()) {
                    let entry = &self.constants[index];
                    sink.u8(entry.element_type);
                    sink.u8(0);
                    let (parent_table, parent_row) = self.constant_parent_table_row(entry.parent);
                    sink.coded(CodedIndexType::HasConstant, parent_table, parent_row)?;
                    sink.blob_ix(entry.value_ix)?;
                }
            }
            TableId::CustomAttribute => {
                for index in
                    self.sorted_order_or_natural(TableId::CustomAttribute, self.custom_attrs.len())
                {
                    let entry = &self.custom_attrs[index];
                    let (parent_table, parent_row) = self.attribute_target_table_row(entry.parent);
                    sink.coded(CodedIndexType::HasCustomAttribute, parent_table, parent_row)?;
                    let (ctor_table, ctor_row) = self.method_target_table_row(entry.ctor);
                    sink.coded(CodedIndexType::CustomAttributeType, ctor_table, ctor_row)?;
                    sink.blob_ix(entry.value_ix)?;
                }
            }
            TableId::FieldMarshal => {
                for index in
                    self.sorted_order_or_natural(TableId::FieldMarshal, self.field_marshals.len())
                {
                    let entry = &self.field_marshals[index];
                    let (parent_table, parent_row) = self.marshal_parent_table_row(entry.parent);
                    sink.coded(CodedIndexType::HasFieldMarshal, parent_table, parent_row)?;
                    sink.blob_ix(entry.native_type_ix)?;
                }
            }
            TableId::DeclSecurity => {
                for index in
                    self.sorted_order_or_natural(TableId::DeclSecurity, self.decl_security.len())
                {
                    let entry = &self.decl_security[index];
                    sink.u16(entry.action);
                    let (parent_table, parent_row) = self.security_target_table_row(entry.parent);
                    sink.coded(CodedIndexType::HasDeclSecurity, parent_table, parent_row)?;
                    sink.blob_ix(entry.permission_ix)?;
                }
            }
            TableId::ClassLayout => {
                for entry in &self.class_layouts {
                    sink.u16(entry.packing);
                    sink.u32(entry.class_size);
                    sink.table_ix(TableId::TypeDef, self.class_defs[entry.class.index()].row)?;
                }
            }
            TableId::FieldLayout => {
                for entry in &self.field_layouts {
                    sink.u32(entry.offset);
                    sink.table_ix(TableId::Field, self.fields[entry.field.index()].row)?;
                }
            }
            TableId::StandAloneSig => {
                for entry in &self.standalone_sigs {
                    sink.blob_ix(entry.sig_ix)?;
                }
            }
            TableId::EventMap => {
                for entry in &self.event_maps {
                    sink.table_ix(TableId::TypeDef, self.class_defs[entry.parent.index()].row)?;
                    sink.table_ix(TableId::Event, entry.event_list)?;
                }
            }
            TableId::Event => {
                for entry in &self.events {
                    sink.u16(entry.flags.bits());
                    sink.str_ix(entry.name_ix)?;
                    let (type_table, type_row) = self.type_target_table_row(entry.event_type);
                    sink.coded(CodedIndexType::TypeDefOrRef, type_table, type_row)?;
                }
            }
            TableId::PropertyMap => {
                for entry in &self.property_maps {
                    sink.table_ix(TableId::TypeDef, self.class_defs[entry.parent.index()].row)?;
                    sink.table_ix(TableId::Property, entry.property_list)?;
                }
            }
            TableId::Property => {
                for entry in &self.properties {
                    sink.u16(entry.flags.bits());
                    sink.str_ix(entry.name_ix)?;
                    sink.blob_ix(entry.sig_ix)?;
                }
            }
            TableId::MethodSemantics => {
                for index in self
                    .sorted_order_or_natural(TableId::MethodSemantics, self.method_semantics.len())
                {
                    let entry = &self.method_semantics[index];
                    sink.u16(entry.semantics.bits());
                    sink.table_ix(TableId::MethodDef, self.methods[entry.method.index()].row)?;
                    let (assoc_table, assoc_row) =
                        self.semantics_target_table_row(entry.association);
                    sink.coded(CodedIndexType::HasSemantics, assoc_table, assoc_row)?;
                }
            }
            TableId::MethodImpl => {
                for entry in &self.method_impls {
                    sink.table_ix(TableId::TypeDef, self.class_defs[entry.class.index()].row)?;
                    let (body_table, body_row) = self.method_target_table_row(entry.body);
                    sink.coded(CodedIndexType::MethodDefOrRef, body_table, body_row)?;
                    let (decl_table, decl_row) = self.method_target_table_row(entry.declaration);
                    sink.coded(CodedIndexType::MethodDefOrRef, decl_table, decl_row)?;
                }
            }
            TableId::ModuleRef => {
                for entry in &self.module_refs {
                    sink.str_ix(entry.name_ix)?;
                }
            }
            TableId::TypeSpec => {
                for entry in &self.type_specs {
                    let sig_ix = entry.sig_ix.ok_or_else(|| {
                        internal_fault!("type specification blob missing at write time")
                    })?;
                    sink.blob_ix(sig_ix)?;
                }
            }
            TableId::ImplMap => {
                for index in self.sorted_order_or_natural(TableId::ImplMap, self.impl_maps.len()) {
                    let entry = &self.impl_maps[index];
                    sink.u16(entry.flags.bits());
                    sink.coded(
                        CodedIndexType::MemberForwarded,
                        TableId::MethodDef,
                        self.methods[entry.method.index()].row,
                    )?;
                    sink.str_ix(entry.import_name_ix)?;
                    sink.table_ix(TableId::ModuleRef, self.module_refs[entry.scope.index()].row)?;
                }
            }
            TableId::FieldRVA => {
                for entry in &self.field_rvas {
                    sink.u32(layout.sdata_rva + entry.data_offset);
                    sink.table_ix(TableId::Field, self.fields[entry.field.index()].row)?;
                }
            }
            TableId::Assembly => {
                if let Some(info) = &self.assembly {
                    sink.u32(info.hash_alg);
                    sink.u16(info.version.0);
                    sink.u16(info.version.1);
                    sink.u16(info.version.2);
                    sink.u16(info.version.3);
                    sink.u32(info.flags.bits());
                    sink.blob_ix(info.key_ix)?;
                    sink.str_ix(info.name_ix)?;
                    sink.str_ix(info.culture_ix)?;
                }
            }
            TableId::AssemblyRef => {
                for entry in &self.assembly_refs {
                    sink.u16(entry.version.0);
                    sink.u16(entry.version.1);
                    sink.u16(entry.version.2);
                    sink.u16(entry.version.3);
                    sink.u32(entry.flags.bits());
                    sink.blob_ix(entry.key_ix)?;
                    sink.str_ix(entry.name_ix)?;
                    sink.str_ix(entry.culture_ix)?;
                    sink.blob_ix(entry.hash_ix)?;
                }
            }
            TableId::File => {
                for entry in &self.file_refs {
                    sink.u32(entry.flags.bits());
                    sink.str_ix(entry.name_ix)?;
                    sink.blob_ix(entry.hash_ix)?;
                }
            }
            TableId::ExportedType => {
                for entry in &self.exported_types {
                    sink.u32(entry.flags.bits());
                    sink.u32(entry.type_def_hint);
                    sink.str_ix(entry.name_ix)?;
                    sink.str_ix(entry.namespace_ix)?;
                    let (impl_table, impl_row) =
                        self.implementation_table_row(Some(entry.implementation));
                    sink.coded(CodedIndexType::Implementation, impl_table, impl_row)?;
                }
            }
            TableId::ManifestResource => {
                for entry in &self.manifest_resources {
                    sink.u32(entry.offset);
                    sink.u32(entry.flags.bits());
                    sink.str_ix(entry.name_ix)?;
                    let (impl_table, impl_row) =
                        self.implementation_table_row(entry.implementation);
                    sink.coded(CodedIndexType::Implementation, impl_table, impl_row)?;
                }
            }
            TableId::NestedClass => {
                for entry in &self.nested_classes {
                    sink.table_ix(TableId::TypeDef, self.class_defs[entry.nested.index()].row)?;
                    sink.table_ix(
                        TableId::TypeDef,
                        self.class_defs[entry.enclosing.index()].row,
                    )?;
                }
            }
            TableId::GenericParam => {
                for index in
                    self.sorted_order_or_natural(TableId::GenericParam, self.generic_params.len())
                {
                    let entry = &self.generic_params[index];
                    sink.u16(entry.number);
                    sink.u16(entry.flags.bits());
                    let (owner_table, owner_row) = self.generic_owner_table_row(entry.owner);
                    sink.coded(CodedIndexType::TypeOrMethodDef, owner_table, owner_row)?;
                    sink.str_ix(entry.name_ix)?;
                }
            }
            TableId::MethodSpec => {
                for entry in &self.method_specs {
                    let (method_table, method_row) = self.method_target_table_row(entry.method);
                    sink.coded(CodedIndexType::MethodDefOrRef, method_table, method_row)?;
                    sink.blob_ix(entry.sig_ix)?;
                }
            }
            TableId::GenericParamConstraint => {
                for index in self.sorted_order_or_natural(
                    TableId::GenericParamConstraint,
                    self.generic_constraints.len(),
                ) {
                    let entry = &self.generic_constraints[index];
                    sink.table_ix(
                        TableId::GenericParam,
                        self.generic_params[entry.owner.index()].row,
                    )?;
                    let (con_table, con_row) = self.type_target_table_row(entry.constraint);
                    sink.coded(CodedIndexType::TypeDefOrRef, con_table, con_row)?;
                }
            }
            _ => {
                return Err(internal_fault!(
                    "table {:?} is never populated by this emitter",
                    table
                ))
            }
        }
        Ok(())
    }
}
