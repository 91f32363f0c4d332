//! Custom attributes and declarative security.
//!
//! Both tables sort by their parent coded index, and both reference parents that
//! may themselves live in sorted tables (a generic parameter can carry an
//! attribute), so parents are held as entity ids and their rows are read only at
//! sort/write time - a token cached before the sort would be invalid.

use crate::{
    cilassembly::{
        AssemblyRefId, CilAssembly, ClassDefId, ClassRefId, EventId, FieldDefId, GenericParamId,
        MemberRefId, MethodDefId, MethodTarget, ParamId, PropertyId,
    },
    metadata::tables::TableId,
    Result,
};

/// An element a custom attribute can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeTarget {
    /// The assembly manifest
    Assembly,
    /// The module
    Module,
    /// A class definition
    Class(ClassDefId),
    /// A class reference
    ClassRef(ClassRefId),
    /// A method definition
    Method(MethodDefId),
    /// A field definition
    Field(FieldDefId),
    /// A parameter
    Param(ParamId),
    /// An event
    Event(EventId),
    /// A property
    Property(PropertyId),
    /// A generic parameter
    GenericParam(GenericParamId),
    /// A member reference
    MemberRef(MemberRefId),
    /// An assembly reference
    AssemblyRef(AssemblyRefId),
}

/// One CustomAttribute row (sorted by parent).
pub(crate) struct CustomAttributeEntry {
    pub(crate) row: u32,
    pub(crate) parent: AttributeTarget,
    pub(crate) ctor: MethodTarget,
    pub(crate) value_ix: u32,
}

/// A declarative security action code (ECMA-335 II.22.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SecurityAction {
    /// Demand the permission at runtime
    Demand = 0x0002,
    /// Assert the permission
    Assert = 0x0003,
    /// Deny the permission
    Deny = 0x0004,
    /// Reduce the granted set
    PermitOnly = 0x0005,
    /// Demand at link time
    LinkDemand = 0x0006,
    /// Demand on subclassing
    InheritanceDemand = 0x0007,
    /// Request minimum permissions (assembly only)
    RequestMinimum = 0x0008,
    /// Request optional permissions (assembly only)
    RequestOptional = 0x0009,
    /// Refuse permissions (assembly only)
    RequestRefuse = 0x000A,
}

/// An element declarative security can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityTarget {
    /// The assembly manifest
    Assembly,
    /// A class definition
    Class(ClassDefId),
    /// A method definition
    Method(MethodDefId),
}

/// One DeclSecurity row (sorted by parent).
pub(crate) struct DeclSecurityEntry {
    pub(crate) row: u32,
    pub(crate) action: u16,
    pub(crate) parent: SecurityTarget,
    pub(crate) permission_ix: u32,
}

impl CilAssembly {
    /// Attaches a custom attribute to `target`.
    ///
    /// # Arguments
    /// * `target` - The attributed element
    /// * `ctor` - The attribute's constructor (a method definition or reference)
    /// * `value` - The serialized attribute value blob, or empty for the standard
    ///   zero-argument encoding
    ///
    /// # Errors
    ///
    /// Returns an error if the value blob cannot be added to the heap, or if
    /// `ctor` is a method specification (the standard restricts constructors to
    /// definitions and references).
    pub fn add_custom_attribute(
        &mut self,
        target: AttributeTarget,
        ctor: MethodTarget,
        value: &[u8],
    ) -> Result<()> {
        if matches!(ctor, MethodTarget::Spec(_)) {
            return Err(malformed_error!(
                "a custom attribute constructor cannot be a method specification"
            ));
        }

        let value_ix = self.blobs.add(value)?;
        let row = self.tables.add_row(TableId::CustomAttribute);
        self.custom_attrs.push(CustomAttributeEntry {
            row,
            parent: target,
            ctor,
            value_ix,
        });
        Ok(())
    }

    /// Attaches a declarative security permission set to `target`.
    ///
    /// The permission set is an opaque, already-encoded blob. Legacy XML
    /// permission-set synthesis is deliberately unsupported: callers holding XML
    /// must encode it themselves or receive a fail-fast error rather than
    /// silently-wrong bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotSupported`] for XML input, or a heap error if
    /// the blob cannot be added.
    pub fn add_decl_security(
        &mut self,
        target: SecurityTarget,
        action: SecurityAction,
        permission_set: &[u8],
    ) -> Result<()> {
        if permission_set.first() == Some(&b'<') {
            return Err(crate::Error::NotSupported(
                "XML permission sets are not supported; supply an encoded permission blob"
                    .to_string(),
            ));
        }

        let permission_ix = self.blobs.add(permission_set)?;
        let row = self.tables.add_row(TableId::DeclSecurity);
        self.decl_security.push(DeclSecurityEntry {
            row,
            action: action as u16,
            parent: target,
            permission_ix,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cilassembly::ModuleKind;
    use crate::metadata::signatures::{MethodSig, TypeSignature};

    #[test]
    fn xml_permission_sets_fail_fast() {
        let mut asm = CilAssembly::new("t.exe", ModuleKind::ConsoleExe);
        let result = asm.add_decl_security(
            SecurityTarget::Assembly,
            SecurityAction::Demand,
            b"<PermissionSet/>",
        );
        assert!(matches!(result, Err(crate::Error::NotSupported(_))));
    }

    #[test]
    fn spec_constructor_rejected() {
        let mut asm = CilAssembly::new("t.exe", ModuleKind::ConsoleExe);
        let console = asm.system_class("Console");
        let method = asm.add_method_ref(
            crate::metadata::signatures::TypeDefOrRef::Ref(console).into(),
            "WriteLine",
            MethodSig::new(TypeSignature::Void, vec![]),
        );
        let spec = asm
            .intern_method_spec(method.into(), vec![TypeSignature::I4])
            .unwrap();
        let result =
            asm.add_custom_attribute(AttributeTarget::Module, spec.into(), &[0x01, 0x00, 0x00, 0x00]);
        assert!(result.is_err());
    }
}
