//! The `build_tables` pass: the single finalization step between authoring and
//! writing.
//!
//! Ordering inside the pass is a dependency chain, not a convention:
//!
//! 1. super-type chains resolve (signature tags depend on them);
//! 2. member lists are computed and contiguity validated;
//! 3. every deferred signature blob is built (rows are known, tags are known);
//! 4. every method body runs its instruction fixed point, which may still add
//!    heap content, type specifications and stand-alone signature rows;
//! 5. the coded-index-keyed tables sort and renumber (no rows exist after this);
//! 6. heaps finalize (quad alignment, large classification);
//! 7. the global width set is computed from the final row counts and heap sizes.
//!
//! After the pass, sizing and writing are pure functions of resolved state.

use crate::{
    cilassembly::{AttributeTarget, CilAssembly, ConstantParent, GenericOwner, MarshalParent, MethodTarget, SecurityTarget},
    cilassembly::features::SemanticsTarget,
    file::io::align_up,
    metadata::signatures::encoders,
    metadata::tables::{CodedIndexType, TableId, TableInfo},
    Result,
};

impl CilAssembly {
    /// Finalizes heap content, rows, sorting and index widths for the whole graph.
    ///
    /// Runs once; later calls are no-ops. After this, no entity may be added.
    ///
    /// # Errors
    ///
    /// Any error (malformed graph, non-contiguous member lists, unresolvable
    /// instruction stream) aborts the whole emission.
    pub fn build_tables(&mut self) -> Result<()> {
        if self.built {
            return Ok(());
        }

        self.resolve_value_types()?;
        self.built = true;

        self.compute_member_lists()?;
        self.build_signature_blobs()?;
        self.resolve_method_bodies()?;
        self.sort_tables()?;

        self.strings.finalize();
        self.user_strings.finalize();
        self.blobs.finalize();
        self.guids.finalize();

        self.table_info = TableInfo::compute(
            self.tables.row_counts(),
            self.strings.len(),
            self.user_strings.len(),
            self.guids.len(),
            self.blobs.len(),
        );

        Ok(())
    }

    /// Computes each type's field/method list start and each method's param list
    /// start, validating that member rows are contiguous per owner.
    fn compute_member_lists(&mut self) -> Result<()> {
        let mut expected_field_row = 1_u32;
        let mut expected_method_row = 1_u32;

        for index in 0..self.class_defs.len() {
            self.class_defs[index].field_list = expected_field_row;
            for field_id in self.class_defs[index].field_ids.clone() {
                let field = &self.fields[field_id.index()];
                if field.parent.index() != index || field.row != expected_field_row {
                    return Err(malformed_error!(
                        "fields of type '{}' are not contiguous; add all members of one type before the next",
                        self.class_display_name(index)
                    ));
                }
                expected_field_row += 1;
            }

            self.class_defs[index].method_list = expected_method_row;
            for method_id in self.class_defs[index].method_ids.clone() {
                let method = &self.methods[method_id.index()];
                if method.parent.index() != index || method.row != expected_method_row {
                    return Err(malformed_error!(
                        "methods of type '{}' are not contiguous; add all members of one type before the next",
                        self.class_display_name(index)
                    ));
                }
                expected_method_row += 1;
            }
        }

        let mut expected_param_row = 1_u32;
        for index in 0..self.methods.len() {
            self.methods[index].param_list = expected_param_row;
            #[allow(clippy::cast_possible_truncation)]
            {
                expected_param_row += self.methods[index].param_ids.len() as u32;
            }
        }

        Ok(())
    }

    /// Builds every deferred signature blob now that rows and tags are known.
    fn build_signature_blobs(&mut self) -> Result<()> {
        for index in 0..self.fields.len() {
            let sig = self.fields[index].sig.clone();
            let blob = encoders::encode_field_signature(self, &sig)?;
            self.fields[index].sig_ix = self.blobs.add(&blob)?;
        }

        for index in 0..self.methods.len() {
            let sig = self.methods[index].sig.clone();
            let blob = encoders::encode_method_signature(self, &sig)?;
            self.methods[index].sig_ix = self.blobs.add(&blob)?;
        }

        for index in 0..self.member_refs.len() {
            let sig = self.member_refs[index].sig.clone();
            let blob = match &sig {
                crate::cilassembly::members::MemberRefSig::Method(method_sig) => {
                    encoders::encode_method_signature(self, method_sig)?
                }
                crate::cilassembly::members::MemberRefSig::Field(field_type) => {
                    encoders::encode_field_signature(self, field_type)?
                }
            };
            self.member_refs[index].sig_ix = self.blobs.add(&blob)?;
        }

        for index in 0..self.type_specs.len() {
            if self.type_specs[index].sig_ix.is_none() {
                let sig = self.type_specs[index].sig.clone();
                let sig_ix = self.encode_type_spec_blob(&sig)?;
                self.type_specs[index].sig_ix = Some(sig_ix);
            }
        }

        for index in 0..self.properties.len() {
            let entry = &self.properties[index];
            let (has_this, property_type, params) =
                (entry.has_this, entry.property_type.clone(), entry.params.clone());
            let blob = encoders::encode_property_signature(self, has_this, &property_type, &params)?;
            self.properties[index].sig_ix = self.blobs.add(&blob)?;
        }

        self.build_method_spec_blobs()?;

        Ok(())
    }

    /// Runs each body's fixed point and lays bodies out in the code region.
    ///
    /// Fat-header bodies must start quad-aligned; aligning every body keeps the
    /// layout uniform.
    fn resolve_method_bodies(&mut self) -> Result<()> {
        let mut cursor = 0_u32;
        for index in 0..self.methods.len() {
            let Some(mut body) = self.methods[index].body.take() else {
                continue;
            };
            body.resolve(self)?;

            cursor = align_up(cursor, 4);
            body.code_offset = cursor;
            cursor += body.encoded_size();
            self.methods[index].body = Some(body);
        }
        self.code_region_size = align_up(cursor, 4);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sorting. Keys are the coded-index values the tables are ordered by in the
    // final stream; renumbering invalidates any token cached before this point,
    // which is why nothing in the crate caches tokens into sorted tables.
    // ------------------------------------------------------------------

    fn sort_tables(&mut self) -> Result<()> {
        // InterfaceImpl: class row, then interface coded index.
        let keys = self
            .interface_impls
            .iter()
            .map(|entry| {
                let (table, row) = self.type_target_table_row(entry.interface);
                let interface = CodedIndexType::TypeDefOrRef.encode(table, row)?;
                Ok((u64::from(self.class_defs[entry.class.index()].row) << 32)
                    | u64::from(interface))
            })
            .collect::<Result<Vec<_>>>()?;
        let order = Self::sorted_order(&keys);
        for (position, index) in order.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            {
                self.interface_impls[*index].row = position as u32 + 1;
            }
        }
        self.sorted_orders.insert(TableId::InterfaceImpl, order);

        self.sort_simple(TableId::Constant, |asm| {
            asm.constants
                .iter()
                .map(|entry| {
                    let (table, row) = asm.constant_parent_table_row(entry.parent);
                    Ok(u64::from(CodedIndexType::HasConstant.encode(table, row)?))
                })
                .collect()
        })?;

        self.sort_simple(TableId::FieldMarshal, |asm| {
            asm.field_marshals
                .iter()
                .map(|entry| {
                    let (table, row) = asm.marshal_parent_table_row(entry.parent);
                    Ok(u64::from(CodedIndexType::HasFieldMarshal.encode(table, row)?))
                })
                .collect()
        })?;

        self.sort_simple(TableId::DeclSecurity, |asm| {
            asm.decl_security
                .iter()
                .map(|entry| {
                    let (table, row) = asm.security_target_table_row(entry.parent);
                    Ok(u64::from(CodedIndexType::HasDeclSecurity.encode(table, row)?))
                })
                .collect()
        })?;

        self.sort_simple(TableId::MethodSemantics, |asm| {
            asm.method_semantics
                .iter()
                .map(|entry| {
                    let (table, row) = asm.semantics_target_table_row(entry.association);
                    Ok(u64::from(CodedIndexType::HasSemantics.encode(table, row)?))
                })
                .collect()
        })?;

        self.sort_simple(TableId::ImplMap, |asm| {
            asm.impl_maps
                .iter()
                .map(|entry| {
                    let row = asm.methods[entry.method.index()].row;
                    Ok(u64::from(
                        CodedIndexType::MemberForwarded.encode(TableId::MethodDef, row)?,
                    ))
                })
                .collect()
        })?;

        // GenericParam: owner coded index, then declaration number.
        self.sort_simple(TableId::GenericParam, |asm| {
            asm.generic_params
                .iter()
                .map(|entry| {
                    let (table, row) = asm.generic_owner_table_row(entry.owner);
                    let owner = CodedIndexType::TypeOrMethodDef.encode(table, row)?;
                    Ok((u64::from(owner) << 16) | u64::from(entry.number))
                })
                .collect()
        })?;

        // Constraints key on their owner's post-sort row.
        self.sort_simple(TableId::GenericParamConstraint, |asm| {
            asm.generic_constraints
                .iter()
                .map(|entry| Ok(u64::from(asm.generic_params[entry.owner.index()].row)))
                .collect()
        })?;

        // CustomAttribute last: parents may live in the tables sorted above.
        self.sort_simple(TableId::CustomAttribute, |asm| {
            asm.custom_attrs
                .iter()
                .map(|entry| {
                    let (table, row) = asm.attribute_target_table_row(entry.parent);
                    Ok(u64::from(
                        CodedIndexType::HasCustomAttribute.encode(table, row)?,
                    ))
                })
                .collect()
        })?;

        Ok(())
    }

    fn sort_simple<F>(&mut self, table: TableId, keys_of: F) -> Result<()>
    where
        F: Fn(&CilAssembly) -> Result<Vec<u64>>,
    {
        let keys = keys_of(self)?;
        let order = Self::sorted_order(&keys);
        for (position, index) in order.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let row = position as u32 + 1;
            match table {
                TableId::Constant => self.constants[*index].row = row,
                TableId::FieldMarshal => self.field_marshals[*index].row = row,
                TableId::DeclSecurity => self.decl_security[*index].row = row,
                TableId::MethodSemantics => self.method_semantics[*index].row = row,
                TableId::ImplMap => self.impl_maps[*index].row = row,
                TableId::GenericParam => self.generic_params[*index].row = row,
                TableId::GenericParamConstraint => self.generic_constraints[*index].row = row,
                TableId::CustomAttribute => self.custom_attrs[*index].row = row,
                _ => {
                    return Err(internal_fault!(
                        "table {:?} declares no sort key",
                        table
                    ))
                }
            }
        }
        self.sorted_orders.insert(table, order);
        Ok(())
    }

    fn sorted_order(keys: &[u64]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..keys.len()).collect();
        order.sort_by_key(|index| keys[*index]);
        order
    }

    fn class_display_name(&self, index: usize) -> String {
        let entry = &self.class_defs[index];
        if entry.namespace.is_empty() {
            entry.name.clone()
        } else {
            format!("{}.{}", entry.namespace, entry.name)
        }
    }

    // ------------------------------------------------------------------
    // Coded-index (table, row) resolution for parent references.
    // ------------------------------------------------------------------

    pub(crate) fn constant_parent_table_row(&self, parent: ConstantParent) -> (TableId, u32) {
        match parent {
            ConstantParent::Field(id) => (TableId::Field, self.fields[id.index()].row),
            ConstantParent::Param(id) => (TableId::Param, self.params[id.index()].row),
            ConstantParent::Property(id) => (TableId::Property, self.properties[id.index()].row),
        }
    }

    pub(crate) fn marshal_parent_table_row(&self, parent: MarshalParent) -> (TableId, u32) {
        match parent {
            MarshalParent::Field(id) => (TableId::Field, self.fields[id.index()].row),
            MarshalParent::Param(id) => (TableId::Param, self.params[id.index()].row),
        }
    }

    pub(crate) fn security_target_table_row(&self, target: SecurityTarget) -> (TableId, u32) {
        match target {
            SecurityTarget::Assembly => (TableId::Assembly, 1),
            SecurityTarget::Class(id) => (TableId::TypeDef, self.class_defs[id.index()].row),
            SecurityTarget::Method(id) => (TableId::MethodDef, self.methods[id.index()].row),
        }
    }

    pub(crate) fn semantics_target_table_row(&self, target: SemanticsTarget) -> (TableId, u32) {
        match target {
            SemanticsTarget::Event(id) => (TableId::Event, self.events[id.index()].row),
            SemanticsTarget::Property(id) => (TableId::Property, self.properties[id.index()].row),
        }
    }

    pub(crate) fn generic_owner_table_row(&self, owner: GenericOwner) -> (TableId, u32) {
        match owner {
            GenericOwner::Class(id) => (TableId::TypeDef, self.class_defs[id.index()].row),
            GenericOwner::Method(id) => (TableId::MethodDef, self.methods[id.index()].row),
        }
    }

    pub(crate) fn method_target_table_row(&self, target: MethodTarget) -> (TableId, u32) {
        match target {
            MethodTarget::Def(id) => (TableId::MethodDef, self.methods[id.index()].row),
            MethodTarget::Ref(id) => (TableId::MemberRef, self.member_refs[id.index()].row),
            MethodTarget::Spec(id) => (TableId::MethodSpec, self.method_specs[id.index()].row),
        }
    }

    pub(crate) fn attribute_target_table_row(&self, target: AttributeTarget) -> (TableId, u32) {
        match target {
            AttributeTarget::Assembly => (TableId::Assembly, 1),
            AttributeTarget::Module => (TableId::Module, 1),
            AttributeTarget::Class(id) => (TableId::TypeDef, self.class_defs[id.index()].row),
            AttributeTarget::ClassRef(id) => (TableId::TypeRef, self.class_refs[id.index()].row),
            AttributeTarget::Method(id) => (TableId::MethodDef, self.methods[id.index()].row),
            AttributeTarget::Field(id) => (TableId::Field, self.fields[id.index()].row),
            AttributeTarget::Param(id) => (TableId::Param, self.params[id.index()].row),
            AttributeTarget::Event(id) => (TableId::Event, self.events[id.index()].row),
            AttributeTarget::Property(id) => (TableId::Property, self.properties[id.index()].row),
            AttributeTarget::GenericParam(id) => {
                (TableId::GenericParam, self.generic_params[id.index()].row)
            }
            AttributeTarget::MemberRef(id) => (TableId::MemberRef, self.member_refs[id.index()].row),
            AttributeTarget::AssemblyRef(id) => {
                (TableId::AssemblyRef, self.assembly_refs[id.index()].row)
            }
        }
    }
}
