//! Resolution scopes: the assembly manifest, assembly references and module
//! references, plus the `mscorlib` convenience handle.
//!
//! External class references resolve against a [`ResolutionScope`]; the scope rows
//! are registered eagerly so a scope id is usable from the moment it is created.

use uguid::Guid;

use crate::{
    cilassembly::{AssemblyFlags, AssemblyRefId, CilAssembly, ClassRefId, ModuleRefId},
    metadata::tables::TableId,
    Result,
};

/// Where a type reference resolves: this module, another module of this assembly,
/// another assembly, or an enclosing type (for nested references).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionScope {
    /// The current module
    Module,
    /// An external module of this assembly
    ModuleRef(ModuleRefId),
    /// An external assembly
    AssemblyRef(AssemblyRefId),
    /// The enclosing type of a nested type reference
    Nested(ClassRefId),
}

impl From<AssemblyRefId> for ResolutionScope {
    fn from(id: AssemblyRefId) -> Self {
        ResolutionScope::AssemblyRef(id)
    }
}

impl From<ModuleRefId> for ResolutionScope {
    fn from(id: ModuleRefId) -> Self {
        ResolutionScope::ModuleRef(id)
    }
}

/// The Assembly manifest row.
pub(crate) struct AssemblyInfo {
    pub(crate) name_ix: u32,
    pub(crate) culture_ix: u32,
    pub(crate) key_ix: u32,
    pub(crate) version: (u16, u16, u16, u16),
    pub(crate) flags: AssemblyFlags,
    pub(crate) hash_alg: u32,
}

/// One AssemblyRef row.
pub(crate) struct AssemblyRefEntry {
    pub(crate) row: u32,
    pub(crate) name_ix: u32,
    pub(crate) culture_ix: u32,
    pub(crate) key_ix: u32,
    pub(crate) hash_ix: u32,
    pub(crate) version: (u16, u16, u16, u16),
    pub(crate) flags: AssemblyFlags,
}

/// One ModuleRef row.
pub(crate) struct ModuleRefEntry {
    pub(crate) row: u32,
    pub(crate) name_ix: u32,
}

/// Derives a stable module version id from the module name.
///
/// The emitter is a deterministic one-shot transform; a wall-clock or random MVID
/// would make byte-identical inputs produce different images.
pub(crate) fn module_version_id(module_name: &str) -> Guid {
    // FNV-1a over the name, spread across the GUID bytes.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in module_name.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
    }
    let lo = hash.to_le_bytes();
    let hi = hash.rotate_left(31).to_le_bytes();
    let mut bytes = [0_u8; 16];
    bytes[..8].copy_from_slice(&lo);
    bytes[8..].copy_from_slice(&hi);
    Guid::from_bytes(bytes)
}

/// The default hash algorithm recorded in the Assembly row (SHA-1).
const HASH_ALGORITHM_SHA1: u32 = 0x8004;

impl CilAssembly {
    /// Defines this module's assembly manifest.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a manifest was already defined.
    pub fn define_assembly(
        &mut self,
        name: &str,
        version: (u16, u16, u16, u16),
        flags: AssemblyFlags,
    ) -> Result<()> {
        if self.assembly.is_some() {
            return Err(malformed_error!("assembly manifest already defined"));
        }

        let name_ix = self.strings.add(name);
        self.tables.add_row(TableId::Assembly);
        self.assembly = Some(AssemblyInfo {
            name_ix,
            culture_ix: 0,
            key_ix: 0,
            version,
            flags,
            hash_alg: HASH_ALGORITHM_SHA1,
        });
        Ok(())
    }

    /// Sets the manifest's culture string.
    pub fn set_assembly_culture(&mut self, culture: &str) -> Result<()> {
        let culture_ix = self.strings.add(culture);
        let info = self
            .assembly
            .as_mut()
            .ok_or_else(|| malformed_error!("no assembly manifest defined"))?;
        info.culture_ix = culture_ix;
        Ok(())
    }

    /// Sets the manifest's public key blob and marks the PUBLIC_KEY flag.
    pub fn set_assembly_public_key(&mut self, key: &[u8]) -> Result<()> {
        let key_ix = self.blobs.add(key)?;
        let info = self
            .assembly
            .as_mut()
            .ok_or_else(|| malformed_error!("no assembly manifest defined"))?;
        info.key_ix = key_ix;
        info.flags |= AssemblyFlags::PUBLIC_KEY;
        Ok(())
    }

    /// Adds a reference to an external assembly.
    pub fn add_assembly_ref(&mut self, name: &str) -> AssemblyRefId {
        let name_ix = self.strings.add(name);
        let row = self.tables.add_row(TableId::AssemblyRef);
        self.assembly_refs.push(AssemblyRefEntry {
            row,
            name_ix,
            culture_ix: 0,
            key_ix: 0,
            hash_ix: 0,
            version: (0, 0, 0, 0),
            flags: AssemblyFlags::default(),
        });
        #[allow(clippy::cast_possible_truncation)]
        AssemblyRefId(self.assembly_refs.len() as u32 - 1)
    }

    /// Sets the version of an assembly reference.
    pub fn set_assembly_ref_version(&mut self, id: AssemblyRefId, version: (u16, u16, u16, u16)) {
        self.assembly_refs[id.index()].version = version;
    }

    /// Sets the public key token (or full key) blob of an assembly reference.
    pub fn set_assembly_ref_key(&mut self, id: AssemblyRefId, key: &[u8], full_key: bool) -> Result<()> {
        let key_ix = self.blobs.add(key)?;
        let entry = &mut self.assembly_refs[id.index()];
        entry.key_ix = key_ix;
        if full_key {
            entry.flags |= AssemblyFlags::PUBLIC_KEY;
        }
        Ok(())
    }

    /// Sets the culture of an assembly reference.
    pub fn set_assembly_ref_culture(&mut self, id: AssemblyRefId, culture: &str) {
        let culture_ix = self.strings.add(culture);
        self.assembly_refs[id.index()].culture_ix = culture_ix;
    }

    /// Adds a reference to an external module (used by P/Invoke import scopes and
    /// multi-module assemblies).
    pub fn add_module_ref(&mut self, name: &str) -> ModuleRefId {
        let name_ix = self.strings.add(name);
        let row = self.tables.add_row(TableId::ModuleRef);
        self.module_refs.push(ModuleRefEntry { row, name_ix });
        #[allow(clippy::cast_possible_truncation)]
        ModuleRefId(self.module_refs.len() as u32 - 1)
    }

    /// The lazily-created `mscorlib` assembly reference.
    ///
    /// Created once; every later call returns the same id, so `System.*` references
    /// built against it dedup naturally.
    pub fn mscorlib(&mut self) -> AssemblyRefId {
        if let Some(id) = self.mscorlib {
            return id;
        }
        let id = self.add_assembly_ref("mscorlib");
        self.set_assembly_ref_version(id, (2, 0, 0, 0));
        self.mscorlib = Some(id);
        id
    }

    /// Returns the shared reference to a class in `mscorlib`'s `System` namespace.
    ///
    /// Repeated calls with the same name return the same id - the singleton sharing
    /// that makes re-registration a no-op by construction.
    pub fn system_class(&mut self, name: &str) -> ClassRefId {
        let scope = self.mscorlib().into();
        self.add_class_ref(scope, "System", name)
    }

    /// Returns the shared reference to a value class in `mscorlib`'s `System` namespace.
    pub fn system_value_class(&mut self, name: &str) -> ClassRefId {
        let scope = self.mscorlib().into();
        self.add_value_class_ref(scope, "System", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cilassembly::ModuleKind;

    #[test]
    fn mvid_is_deterministic_per_name() {
        assert_eq!(module_version_id("a.exe"), module_version_id("a.exe"));
        assert_ne!(module_version_id("a.exe"), module_version_id("b.exe"));
    }

    #[test]
    fn mscorlib_is_a_singleton() {
        let mut asm = CilAssembly::new("t.exe", ModuleKind::ConsoleExe);
        let a = asm.mscorlib();
        let b = asm.mscorlib();
        assert_eq!(a, b);
        assert_eq!(asm.assembly_refs.len(), 1);
        assert_eq!(asm.assembly_refs[0].version, (2, 0, 0, 0));
    }

    #[test]
    fn system_classes_are_shared() {
        let mut asm = CilAssembly::new("t.exe", ModuleKind::ConsoleExe);
        let a = asm.system_class("Object");
        let b = asm.system_class("Object");
        let c = asm.system_class("String");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(asm.class_refs.len(), 2);
    }

    #[test]
    fn manifest_defined_once() {
        let mut asm = CilAssembly::new("t.exe", ModuleKind::ConsoleExe);
        asm.define_assembly("t", (1, 0, 0, 0), AssemblyFlags::default())
            .unwrap();
        assert!(asm
            .define_assembly("t", (1, 0, 0, 0), AssemblyFlags::default())
            .is_err());
    }
}
