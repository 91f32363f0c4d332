//! Generic parameters, their constraints, and generic method instantiations.
//!
//! `GenericParam` sorts by owner coded index with the parameter number as the
//! secondary key; `GenericParamConstraint` sorts by its owner's *post-sort* row, so
//! constraint sorting always runs after parameter sorting in `build_tables`.

use crate::{
    cilassembly::{
        CilAssembly, ClassDefId, GenericParamAttributes, GenericParamId, MethodDefId,
        MethodSpecId, MethodTarget,
    },
    metadata::signatures::{encoders, TypeDefOrRef, TypeSignature},
    metadata::tables::TableId,
    Result,
};

/// The declaring element of a generic parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericOwner {
    /// A generic class definition
    Class(ClassDefId),
    /// A generic method definition
    Method(MethodDefId),
}

impl From<ClassDefId> for GenericOwner {
    fn from(id: ClassDefId) -> Self {
        GenericOwner::Class(id)
    }
}

impl From<MethodDefId> for GenericOwner {
    fn from(id: MethodDefId) -> Self {
        GenericOwner::Method(id)
    }
}

/// One GenericParam row (sorted by owner, then number).
pub(crate) struct GenericParamEntry {
    pub(crate) row: u32,
    pub(crate) number: u16,
    pub(crate) flags: GenericParamAttributes,
    pub(crate) owner: GenericOwner,
    pub(crate) name_ix: u32,
}

/// One GenericParamConstraint row (sorted by owner row).
pub(crate) struct GenericParamConstraintEntry {
    pub(crate) row: u32,
    pub(crate) owner: GenericParamId,
    pub(crate) constraint: TypeDefOrRef,
}

/// One MethodSpec row; the instantiation blob is built during `build_tables`.
pub(crate) struct MethodSpecEntry {
    pub(crate) row: u32,
    pub(crate) method: MethodTarget,
    pub(crate) type_args: Vec<TypeSignature>,
    pub(crate) sig_ix: u32,
}

impl CilAssembly {
    /// Declares a generic parameter on a class or method.
    ///
    /// # Arguments
    /// * `owner` - The declaring class or method
    /// * `number` - The zero-based parameter position
    /// * `name` - The parameter's name (e.g. `T`)
    pub fn add_generic_param(
        &mut self,
        owner: GenericOwner,
        number: u16,
        flags: GenericParamAttributes,
        name: &str,
    ) -> GenericParamId {
        let name_ix = self.strings.add(name);
        let row = self.tables.add_row(TableId::GenericParam);
        self.generic_params.push(GenericParamEntry {
            row,
            number,
            flags,
            owner,
            name_ix,
        });
        #[allow(clippy::cast_possible_truncation)]
        GenericParamId(self.generic_params.len() as u32 - 1)
    }

    /// Constrains a generic parameter to derive from (or implement) `constraint`.
    pub fn add_generic_constraint(&mut self, owner: GenericParamId, constraint: TypeDefOrRef) {
        let row = self.tables.add_row(TableId::GenericParamConstraint);
        self.generic_constraints.push(GenericParamConstraintEntry {
            row,
            owner,
            constraint,
        });
    }

    /// Interns a generic method instantiation, deduplicated by method and argument
    /// structure.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for an empty argument list.
    pub fn intern_method_spec(
        &mut self,
        method: MethodTarget,
        type_args: Vec<TypeSignature>,
    ) -> Result<MethodSpecId> {
        if type_args.is_empty() {
            return Err(malformed_error!(
                "a generic method instantiation requires at least one type argument"
            ));
        }

        if let Some(existing) = self
            .method_specs
            .iter()
            .position(|entry| entry.method == method && entry.type_args == type_args)
        {
            #[allow(clippy::cast_possible_truncation)]
            return Ok(MethodSpecId(existing as u32));
        }

        let row = self.tables.add_row(TableId::MethodSpec);
        self.method_specs.push(MethodSpecEntry {
            row,
            method,
            type_args,
            sig_ix: 0,
        });
        #[allow(clippy::cast_possible_truncation)]
        Ok(MethodSpecId(self.method_specs.len() as u32 - 1))
    }

    pub(crate) fn build_method_spec_blobs(&mut self) -> Result<()> {
        for index in 0..self.method_specs.len() {
            let type_args = self.method_specs[index].type_args.clone();
            let blob = encoders::encode_method_spec_signature(self, &type_args)?;
            self.method_specs[index].sig_ix = self.blobs.add(&blob)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cilassembly::{ModuleKind, TypeAttributes};

    #[test]
    fn method_spec_interning_is_structural() {
        let mut asm = CilAssembly::new("t.exe", ModuleKind::ConsoleExe);
        let object = asm.system_class("Object");
        let class = asm.add_class(TypeAttributes::PUBLIC, "Demo", "P", Some(object.into()));
        let method = asm.add_method(
            class,
            crate::cilassembly::MethodAttributes::PUBLIC,
            crate::cilassembly::MethodImplAttributes::IL,
            "Identity",
            crate::metadata::signatures::MethodSig::new(TypeSignature::MVar(0), vec![TypeSignature::MVar(0)]),
            &[],
        );
        let a = asm
            .intern_method_spec(method.into(), vec![TypeSignature::I4])
            .unwrap();
        let b = asm
            .intern_method_spec(method.into(), vec![TypeSignature::I4])
            .unwrap();
        let c = asm
            .intern_method_spec(method.into(), vec![TypeSignature::I8])
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn empty_instantiation_rejected() {
        let mut asm = CilAssembly::new("t.exe", ModuleKind::ConsoleExe);
        let object = asm.system_class("Object");
        let class = asm.add_class(TypeAttributes::PUBLIC, "Demo", "P", Some(object.into()));
        let method = asm.add_method(
            class,
            crate::cilassembly::MethodAttributes::PUBLIC,
            crate::cilassembly::MethodImplAttributes::IL,
            "M",
            crate::metadata::signatures::MethodSig::new(TypeSignature::Void, vec![]),
            &[],
        );
        assert!(asm.intern_method_spec(method.into(), vec![]).is_err());
    }
}
