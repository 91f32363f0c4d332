//! Manifest resources, file references and exported types.
//!
//! Embedded resources live in the image itself: each is a 4-byte length followed by
//! its bytes, concatenated into the resources region of `.text` and referenced from
//! the CLI header's resources directory. Linked resources point at a File or
//! AssemblyRef row instead.

use crate::{
    cilassembly::{
        AssemblyRefId, CilAssembly, ExportedTypeId, FileAttributes, FileRefId,
        ManifestResourceAttributes, TypeAttributes,
    },
    file::io::emit_le,
    metadata::tables::TableId,
    Result,
};

/// Where a linked resource or exported type's content lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImplementationTarget {
    /// A file of this assembly
    File(FileRefId),
    /// Another assembly
    AssemblyRef(AssemblyRefId),
}

/// One ManifestResource row.
pub(crate) struct ManifestResourceEntry {
    pub(crate) name_ix: u32,
    pub(crate) flags: ManifestResourceAttributes,
    /// Offset into the embedded-resources region, or the linked offset
    pub(crate) offset: u32,
    pub(crate) implementation: Option<ImplementationTarget>,
}

/// One File row.
pub(crate) struct FileRefEntry {
    pub(crate) row: u32,
    pub(crate) flags: FileAttributes,
    pub(crate) name_ix: u32,
    pub(crate) hash_ix: u32,
}

/// One ExportedType row.
pub(crate) struct ExportedTypeEntry {
    pub(crate) row: u32,
    pub(crate) flags: TypeAttributes,
    pub(crate) type_def_hint: u32,
    pub(crate) name_ix: u32,
    pub(crate) namespace_ix: u32,
    pub(crate) implementation: ImplementationTarget,
}

impl CilAssembly {
    /// Embeds a resource into the image.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource is too large for its length prefix.
    pub fn add_embedded_resource(
        &mut self,
        name: &str,
        flags: ManifestResourceAttributes,
        data: &[u8],
    ) -> Result<()> {
        let length = u32::try_from(data.len())
            .map_err(|_| malformed_error!("resource '{}' exceeds 4 GiB", name))?;

        #[allow(clippy::cast_possible_truncation)]
        let offset = self.resources_blob.len() as u32;
        emit_le(&mut self.resources_blob, length);
        self.resources_blob.extend_from_slice(data);

        let name_ix = self.strings.add(name);
        self.tables.add_row(TableId::ManifestResource);
        self.manifest_resources.push(ManifestResourceEntry {
            name_ix,
            flags,
            offset,
            implementation: None,
        });
        Ok(())
    }

    /// Declares a resource that lives in another file or assembly.
    pub fn add_linked_resource(
        &mut self,
        name: &str,
        flags: ManifestResourceAttributes,
        implementation: ImplementationTarget,
        offset: u32,
    ) {
        let name_ix = self.strings.add(name);
        self.tables.add_row(TableId::ManifestResource);
        self.manifest_resources.push(ManifestResourceEntry {
            name_ix,
            flags,
            offset,
            implementation: Some(implementation),
        });
    }

    /// Adds a File row naming another file of this assembly.
    ///
    /// # Errors
    ///
    /// Returns an error if the hash blob cannot be added.
    pub fn add_file_ref(
        &mut self,
        name: &str,
        flags: FileAttributes,
        hash: &[u8],
    ) -> Result<FileRefId> {
        let name_ix = self.strings.add(name);
        let hash_ix = self.blobs.add(hash)?;
        let row = self.tables.add_row(TableId::File);
        self.file_refs.push(FileRefEntry {
            row,
            flags,
            name_ix,
            hash_ix,
        });
        #[allow(clippy::cast_possible_truncation)]
        Ok(FileRefId(self.file_refs.len() as u32 - 1))
    }

    /// Exports (or forwards) a type that lives in another file or assembly.
    pub fn add_exported_type(
        &mut self,
        flags: TypeAttributes,
        namespace: &str,
        name: &str,
        implementation: ImplementationTarget,
    ) -> ExportedTypeId {
        let name_ix = self.strings.add(name);
        let namespace_ix = self.strings.add(namespace);
        let row = self.tables.add_row(TableId::ExportedType);
        self.exported_types.push(ExportedTypeEntry {
            row,
            flags,
            type_def_hint: 0,
            name_ix,
            namespace_ix,
            implementation,
        });
        #[allow(clippy::cast_possible_truncation)]
        ExportedTypeId(self.exported_types.len() as u32 - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cilassembly::ModuleKind;

    #[test]
    fn embedded_resources_are_length_prefixed() {
        let mut asm = CilAssembly::new("t.exe", ModuleKind::ConsoleExe);
        asm.add_embedded_resource("a", ManifestResourceAttributes::PUBLIC, &[1, 2, 3])
            .unwrap();
        asm.add_embedded_resource("b", ManifestResourceAttributes::PRIVATE, &[9])
            .unwrap();

        assert_eq!(asm.manifest_resources[0].offset, 0);
        assert_eq!(asm.manifest_resources[1].offset, 7);
        assert_eq!(&asm.resources_blob[..4], &3_u32.to_le_bytes());
        assert_eq!(&asm.resources_blob[7..11], &1_u32.to_le_bytes());
    }
}
