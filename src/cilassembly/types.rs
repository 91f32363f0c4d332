//! Type entities: class definitions, class references, type specifications, and
//! the relationship rows that hang off them (nesting, interface implementations,
//! explicit layout).
//!
//! A class definition's element tag (CLASS vs VALUETYPE in signatures) depends on
//! its super-type chain reaching `System.ValueType`/`System.Enum`; the chain can
//! contain forward references, so resolution runs as an explicit pass at the start
//! of `build_tables`, before any definition's signature is emitted.

use std::collections::HashSet;

use crate::{
    cilassembly::{CilAssembly, ClassDefId, ClassRefId, ResolutionScope, TypeAttributes, TypeSpecId},
    cilassembly::{FieldDefId, MethodDefId},
    metadata::signatures::{encoders, TypeDefOrRef, TypeSignature},
    metadata::tables::TableId,
    Result,
};

/// One TypeDef row and its owned member lists.
pub(crate) struct ClassDefEntry {
    pub(crate) row: u32,
    pub(crate) flags: TypeAttributes,
    pub(crate) name: String,
    pub(crate) namespace: String,
    pub(crate) name_ix: u32,
    pub(crate) namespace_ix: u32,
    pub(crate) extends: Option<TypeDefOrRef>,
    pub(crate) field_ids: Vec<FieldDefId>,
    pub(crate) method_ids: Vec<MethodDefId>,
    /// Row of the first owned field; filled by `build_tables`
    pub(crate) field_list: u32,
    /// Row of the first owned method; filled by `build_tables`
    pub(crate) method_list: u32,
    /// CLASS vs VALUETYPE, resolved from the super chain by `build_tables`
    pub(crate) value_type: Option<bool>,
}

/// One TypeRef row.
pub(crate) struct ClassRefEntry {
    pub(crate) row: u32,
    pub(crate) scope: ResolutionScope,
    pub(crate) name: String,
    pub(crate) namespace: String,
    pub(crate) name_ix: u32,
    pub(crate) namespace_ix: u32,
    pub(crate) value_type: bool,
}

/// One TypeSpec row; the blob is built once the value-type pass has run.
pub(crate) struct TypeSpecEntry {
    pub(crate) row: u32,
    pub(crate) sig: TypeSignature,
    pub(crate) sig_ix: Option<u32>,
}

/// One NestedClass row.
pub(crate) struct NestedClassEntry {
    pub(crate) nested: ClassDefId,
    pub(crate) enclosing: ClassDefId,
}

/// One InterfaceImpl row (sorted by class row).
pub(crate) struct InterfaceImplEntry {
    pub(crate) row: u32,
    pub(crate) class: ClassDefId,
    pub(crate) interface: TypeDefOrRef,
}

/// One ClassLayout row.
pub(crate) struct ClassLayoutEntry {
    pub(crate) class: ClassDefId,
    pub(crate) packing: u16,
    pub(crate) class_size: u32,
}

impl CilAssembly {
    pub(crate) fn add_class_raw(
        &mut self,
        flags: TypeAttributes,
        namespace: &str,
        name: &str,
        extends: Option<TypeDefOrRef>,
    ) -> ClassDefId {
        let name_ix = self.strings.add(name);
        let namespace_ix = self.strings.add(namespace);
        let row = self.tables.add_row(TableId::TypeDef);
        self.class_defs.push(ClassDefEntry {
            row,
            flags,
            name: name.to_string(),
            namespace: namespace.to_string(),
            name_ix,
            namespace_ix,
            extends,
            field_ids: Vec::new(),
            method_ids: Vec::new(),
            field_list: 0,
            method_list: 0,
            value_type: None,
        });
        #[allow(clippy::cast_possible_truncation)]
        ClassDefId(self.class_defs.len() as u32 - 1)
    }

    /// Adds a class definition to this module.
    ///
    /// # Arguments
    /// * `flags` - TypeDef attributes
    /// * `namespace` / `name` - The type's full name parts
    /// * `extends` - The super type, or `None` for interfaces and `System.Object`
    pub fn add_class(
        &mut self,
        flags: TypeAttributes,
        namespace: &str,
        name: &str,
        extends: Option<TypeDefOrRef>,
    ) -> ClassDefId {
        self.add_class_raw(flags, namespace, name, extends)
    }

    /// Adds a class definition nested inside `enclosing`, registering the
    /// NestedClass relationship row.
    pub fn add_nested_class(
        &mut self,
        flags: TypeAttributes,
        enclosing: ClassDefId,
        name: &str,
        extends: Option<TypeDefOrRef>,
    ) -> ClassDefId {
        let nested = self.add_class_raw(flags, "", name, extends);
        self.tables.add_row(TableId::NestedClass);
        self.nested_classes.push(NestedClassEntry { nested, enclosing });
        nested
    }

    /// Replaces a class's super type (used when the super is only known after the
    /// class itself was declared).
    pub fn set_class_extends(&mut self, class: ClassDefId, extends: TypeDefOrRef) {
        self.class_defs[class.index()].extends = Some(extends);
    }

    fn add_class_ref_raw(
        &mut self,
        scope: ResolutionScope,
        namespace: &str,
        name: &str,
        value_type: bool,
    ) -> ClassRefId {
        let key = (scope, namespace.to_string(), name.to_string());
        if let Some(existing) = self.class_ref_cache.get(&key) {
            return *existing;
        }

        let name_ix = self.strings.add(name);
        let namespace_ix = self.strings.add(namespace);
        let row = self.tables.add_row(TableId::TypeRef);
        self.class_refs.push(ClassRefEntry {
            row,
            scope,
            name: name.to_string(),
            namespace: namespace.to_string(),
            name_ix,
            namespace_ix,
            value_type,
        });
        #[allow(clippy::cast_possible_truncation)]
        let id = ClassRefId(self.class_refs.len() as u32 - 1);
        self.class_ref_cache.insert(key, id);
        id
    }

    /// Adds (or returns the shared) reference to a class defined in another scope.
    pub fn add_class_ref(
        &mut self,
        scope: ResolutionScope,
        namespace: &str,
        name: &str,
    ) -> ClassRefId {
        self.add_class_ref_raw(scope, namespace, name, false)
    }

    /// Adds (or returns the shared) reference to a value class in another scope.
    ///
    /// Whether an external type is a value type cannot be discovered from here, so
    /// the caller states it; the flag selects VALUETYPE over CLASS in signatures.
    pub fn add_value_class_ref(
        &mut self,
        scope: ResolutionScope,
        namespace: &str,
        name: &str,
    ) -> ClassRefId {
        self.add_class_ref_raw(scope, namespace, name, true)
    }

    /// Adds a reference to a type nested inside an already-referenced type.
    pub fn add_nested_class_ref(&mut self, enclosing: ClassRefId, name: &str) -> ClassRefId {
        self.add_class_ref_raw(ResolutionScope::Nested(enclosing), "", name, false)
    }

    /// Records that `class` implements `interface`.
    pub fn add_interface_impl(&mut self, class: ClassDefId, interface: TypeDefOrRef) {
        let row = self.tables.add_row(TableId::InterfaceImpl);
        self.interface_impls.push(InterfaceImplEntry {
            row,
            class,
            interface,
        });
    }

    /// Records explicit packing/size layout for `class`.
    pub fn set_class_layout(&mut self, class: ClassDefId, packing: u16, class_size: u32) {
        self.tables.add_row(TableId::ClassLayout);
        self.class_layouts.push(ClassLayoutEntry {
            class,
            packing,
            class_size,
        });
    }

    /// Interns a type specification for `sig`, deduplicated by structural identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature cannot be encoded (only possible once the
    /// blob is actually built).
    pub fn intern_type_spec(&mut self, sig: TypeSignature) -> Result<TypeSpecId> {
        if let Some(existing) = self.type_spec_cache.get(&sig) {
            return Ok(*existing);
        }

        let row = self.tables.add_row(TableId::TypeSpec);
        // Blobs for specs created before the value-type pass are deferred to
        // `build_tables`; afterwards (e.g. during instruction resolution) the
        // pass has run and the blob can be built immediately.
        let sig_ix = if self.built {
            Some(self.encode_type_spec_blob(&sig)?)
        } else {
            None
        };
        self.type_specs.push(TypeSpecEntry {
            row,
            sig: sig.clone(),
            sig_ix,
        });
        #[allow(clippy::cast_possible_truncation)]
        let id = TypeSpecId(self.type_specs.len() as u32 - 1);
        self.type_spec_cache.insert(sig, id);
        Ok(id)
    }

    pub(crate) fn encode_type_spec_blob(&mut self, sig: &TypeSignature) -> Result<u32> {
        let blob = encoders::encode_typespec_signature(self, sig)?;
        self.blobs.add(&blob)
    }

    /// Returns whether a type target emits VALUETYPE rather than CLASS.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InternalFault`] for a definition whose super chain
    /// has not been resolved yet - signatures must not be emitted before the
    /// resolution pass.
    pub(crate) fn is_value_type(&self, target: TypeDefOrRef) -> Result<bool> {
        match target {
            TypeDefOrRef::Def(id) => self.class_defs[id.index()].value_type.ok_or_else(|| {
                internal_fault!(
                    "signature emitted before the super-type chain of '{}' was resolved",
                    self.class_defs[id.index()].name
                )
            }),
            TypeDefOrRef::Ref(id) => Ok(self.class_refs[id.index()].value_type),
            TypeDefOrRef::Spec(id) => {
                let sig = &self.type_specs[id.index()].sig;
                match sig {
                    TypeSignature::GenericInst { base, .. } | TypeSignature::Named(base) => {
                        self.is_value_type(*base)
                    }
                    _ => Ok(false),
                }
            }
        }
    }

    /// Resolves every definition's CLASS/VALUETYPE kind by walking super chains.
    ///
    /// A chain terminates at a reference (value kind per the reference's flag, or
    /// because it names `System.ValueType`/`System.Enum`), at a definition already
    /// resolved, or at a class with no super. Cycles are malformed input.
    pub(crate) fn resolve_value_types(&mut self) -> Result<()> {
        for index in 0..self.class_defs.len() {
            if self.class_defs[index].value_type.is_some() {
                continue;
            }

            let mut chain = vec![index];
            let mut visited: HashSet<usize> = HashSet::new();
            visited.insert(index);

            let resolved = loop {
                let current = *chain.last().ok_or_else(|| internal_fault!("empty chain"))?;
                match self.class_defs[current].extends {
                    None => break false,
                    Some(TypeDefOrRef::Spec(_)) => break false,
                    Some(TypeDefOrRef::Ref(r)) => {
                        let target = &self.class_refs[r.index()];
                        break target.namespace == "System"
                            && (target.name == "ValueType" || target.name == "Enum");
                    }
                    Some(TypeDefOrRef::Def(d)) => {
                        if let Some(known) = self.class_defs[d.index()].value_type {
                            break known;
                        }
                        if !visited.insert(d.index()) {
                            return Err(malformed_error!(
                                "cyclic super-type chain through '{}'",
                                self.class_defs[d.index()].name
                            ));
                        }
                        chain.push(d.index());
                    }
                }
            };

            // The tag propagates transitively: any chain that reaches
            // System.ValueType or System.Enum marks every definition along it.
            for link in chain.into_iter().rev() {
                if self.class_defs[link].value_type.is_none() {
                    let is_value = match self.class_defs[link].extends {
                        None | Some(TypeDefOrRef::Spec(_)) => false,
                        Some(TypeDefOrRef::Ref(r)) => {
                            let target = &self.class_refs[r.index()];
                            target.namespace == "System"
                                && (target.name == "ValueType" || target.name == "Enum")
                        }
                        Some(TypeDefOrRef::Def(d)) => {
                            self.class_defs[d.index()].value_type.unwrap_or(resolved)
                        }
                    };
                    self.class_defs[link].value_type = Some(is_value);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cilassembly::ModuleKind;

    fn assembly() -> CilAssembly {
        CilAssembly::new("t.exe", ModuleKind::ConsoleExe)
    }

    #[test]
    fn module_pseudo_class_is_row_one() {
        let asm = assembly();
        assert_eq!(asm.class_defs[0].name, "<Module>");
        assert_eq!(asm.class_defs[0].row, 1);
    }

    #[test]
    fn class_rows_are_sequential_after_module() {
        let mut asm = assembly();
        let object = asm.system_class("Object");
        let class = asm.add_class(
            TypeAttributes::PUBLIC,
            "Demo",
            "Program",
            Some(object.into()),
        );
        assert_eq!(asm.class_defs[class.index()].row, 2);
    }

    #[test]
    fn class_ref_interning() {
        let mut asm = assembly();
        let scope: ResolutionScope = asm.mscorlib().into();
        let a = asm.add_class_ref(scope, "System", "Console");
        let b = asm.add_class_ref(scope, "System", "Console");
        assert_eq!(a, b);
        assert_eq!(asm.class_refs.len(), 1);
    }

    #[test]
    fn value_type_chain_resolution() {
        let mut asm = assembly();
        let value_type = asm.system_class("ValueType");
        let point = asm.add_class(
            TypeAttributes::PUBLIC,
            "Demo",
            "Point",
            Some(value_type.into()),
        );
        let object = asm.system_class("Object");
        let plain = asm.add_class(
            TypeAttributes::PUBLIC,
            "Demo",
            "Plain",
            Some(object.into()),
        );

        asm.resolve_value_types().unwrap();
        assert_eq!(asm.class_defs[point.index()].value_type, Some(true));
        assert_eq!(asm.class_defs[plain.index()].value_type, Some(false));
        assert_eq!(asm.class_defs[0].value_type, Some(false));
    }

    #[test]
    fn enum_super_makes_value_type() {
        let mut asm = assembly();
        let system_enum = asm.system_class("Enum");
        let color = asm.add_class(
            TypeAttributes::PUBLIC,
            "Demo",
            "Color",
            Some(system_enum.into()),
        );
        asm.resolve_value_types().unwrap();
        assert_eq!(asm.class_defs[color.index()].value_type, Some(true));
    }

    #[test]
    fn cyclic_super_chain_is_malformed() {
        let mut asm = assembly();
        let a = asm.add_class(TypeAttributes::PUBLIC, "Demo", "A", None);
        let b = asm.add_class(TypeAttributes::PUBLIC, "Demo", "B", Some(a.into()));
        asm.set_class_extends(a, b.into());
        assert!(asm.resolve_value_types().is_err());
    }

    #[test]
    fn type_spec_interning_is_structural() {
        let mut asm = assembly();
        let a = asm
            .intern_type_spec(TypeSignature::SzArray(Box::new(TypeSignature::I4)))
            .unwrap();
        let b = asm
            .intern_type_spec(TypeSignature::SzArray(Box::new(TypeSignature::I4)))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(asm.type_specs.len(), 1);
    }
}
