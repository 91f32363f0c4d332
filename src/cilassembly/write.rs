//! Whole-image emission: the metadata root, `.text` body layout, import
//! bootstrap, entry thunk and section assembly.
//!
//! `.text` body order is fixed: Import Address Table (one entry), CLI header,
//! concatenated method bodies, embedded resources, metadata, import
//! table/lookup/hint-name/"mscoree.dll", and finally the native entry-point thunk -
//! the image's one absolute address, and therefore its one base relocation.
//!
//! Build order is a dependency chain: metadata sizing must finish before section
//! RVAs are known (the metadata goes inside `.text`); section RVAs must be known
//! before FieldRVA rows, the thunk and the relocation table can be written. The
//! sizing pass serializes the metadata once with zeroed RVA inputs - index widths
//! never depend on RVA values, so the size is exact.

use std::path::Path;

use crate::{
    cilassembly::rows::RowLayout,
    cilassembly::{CilAssembly, ModuleKind},
    file::io::{align_up, emit_le, pad_to_alignment},
    file::pe::{self, DataDirectories, PeImageSpec, Subsystem, IMAGE_BASE, TEXT_RVA},
    file::section::{Section, SectionCharacteristics},
    metadata::tables::TableId,
    Result,
};

use strum::IntoEnumIterator;

/// Size of the one-entry Import Address Table at the start of `.text`.
const IAT_SIZE: u32 = 8;
/// Size of the CLI header.
const CLI_HEADER_SIZE: u32 = 72;
/// Offset of the first method body within `.text`.
const CODE_START: u32 = IAT_SIZE + CLI_HEADER_SIZE;

/// The quad-padded metadata version string (newer runtime revision).
const METADATA_VERSION: &[u8; 12] = b"v2.0.50727\0\0";

/// Stream headers in emission order: quad-padded name and how to index the data.
const STREAM_NAMES: [&[u8]; 5] = [b"#~\0\0", b"#Strings\0\0\0\0", b"#US\0", b"#GUID\0\0\0", b"#Blob\0\0\0"];

impl CilAssembly {
    /// Emits the complete PE image as a byte vector.
    ///
    /// Runs [`CilAssembly::build_tables`] first if it has not run yet.
    ///
    /// # Errors
    ///
    /// Any failure aborts the whole emission; there is no partial output.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.build_tables()?;

        if !self.kind.is_dll() && self.entry_point.is_none() {
            return Err(malformed_error!(
                "an executable image requires a declared entry point"
            ));
        }

        // ---- .text internal layout ----------------------------------------
        let resources_offset = CODE_START + self.code_region_size;
        let resources_size = align_up(self.resources_len(), 4);
        let metadata_offset = resources_offset + resources_size;

        let metadata_size_probe = self.build_metadata(RowLayout::default())?;
        #[allow(clippy::cast_possible_truncation)]
        let metadata_size = metadata_size_probe.len() as u32;

        let import_offset = align_up(metadata_offset + metadata_size, 4);
        let lookup_offset = import_offset + 40;
        let hint_offset = lookup_offset + 8;
        let entry_name: &[u8] = if self.kind.is_dll() {
            b"_CorDllMain\0"
        } else {
            b"_CorExeMain\0"
        };
        #[allow(clippy::cast_possible_truncation)]
        let dll_offset = hint_offset + 2 + entry_name.len() as u32;
        let thunk_offset = align_up(dll_offset + 12, 4);
        let text_tide = thunk_offset + 6;

        // ---- section RVAs -------------------------------------------------
        let mut next_rva = align_up(TEXT_RVA + text_tide, pe::SECTION_ALIGN);
        let sdata_rva = if self.sdata.is_empty() {
            0
        } else {
            let rva = next_rva;
            #[allow(clippy::cast_possible_truncation)]
            {
                next_rva = align_up(next_rva + self.sdata.len() as u32, pe::SECTION_ALIGN);
            }
            rva
        };
        let rsrc_rva = if self.rsrc.is_empty() {
            0
        } else {
            let rva = next_rva;
            #[allow(clippy::cast_possible_truncation)]
            {
                next_rva = align_up(next_rva + self.rsrc.len() as u32, pe::SECTION_ALIGN);
            }
            rva
        };
        let reloc_rva = next_rva;

        // ---- metadata with real RVA inputs --------------------------------
        let layout = RowLayout {
            code_base: TEXT_RVA + CODE_START,
            sdata_rva,
        };
        let metadata = self.build_metadata(layout)?;
        debug_assert_eq!(metadata.len() as u32, metadata_size);

        // ---- .text body ---------------------------------------------------
        let mut text = Vec::with_capacity(text_tide as usize);

        // Import Address Table: one entry, shared with the import lookup table.
        emit_le(&mut text, TEXT_RVA + hint_offset);
        emit_le(&mut text, 0_u32);

        self.write_cli_header(
            &mut text,
            TEXT_RVA + metadata_offset,
            metadata_size,
            if self.resources_blob.is_empty() {
                (0, 0)
            } else {
                (TEXT_RVA + resources_offset, self.resources_len())
            },
        );

        for entry in &self.methods {
            if let Some(body) = &entry.body {
                pad_to_offset(&mut text, CODE_START + body.code_offset);
                body.write(self, &mut text)?;
            }
        }

        pad_to_offset(&mut text, resources_offset);
        text.extend_from_slice(&self.resources_blob);

        pad_to_offset(&mut text, metadata_offset);
        text.extend_from_slice(&metadata);

        // Import directory: one real entry plus the null terminator entry.
        pad_to_offset(&mut text, import_offset);
        emit_le(&mut text, TEXT_RVA + lookup_offset);
        emit_le(&mut text, 0_u32); // timestamp
        emit_le(&mut text, 0_u32); // forwarder chain
        emit_le(&mut text, TEXT_RVA + dll_offset);
        emit_le(&mut text, TEXT_RVA); // IAT
        text.extend_from_slice(&[0_u8; 20]);

        // Import lookup table.
        emit_le(&mut text, TEXT_RVA + hint_offset);
        emit_le(&mut text, 0_u32);

        // Hint/name entry and DLL name.
        emit_le(&mut text, 0_u16);
        text.extend_from_slice(entry_name);
        text.extend_from_slice(b"mscoree.dll\0");

        // Native entry-point thunk: jmp [imagebase + IAT]. The absolute operand is
        // the one address in the image that base relocation must patch.
        pad_to_offset(&mut text, thunk_offset);
        text.push(0xFF);
        text.push(0x25);
        emit_le(&mut text, IMAGE_BASE + TEXT_RVA);

        let mut text_section = Section::new(b".text", text, SectionCharacteristics::text());
        text_section.add_fixup(thunk_offset + 2);

        // ---- sections -----------------------------------------------------
        let mut sections = vec![text_section];
        if !self.sdata.is_empty() {
            sections.push(Section::new(
                b".sdata",
                self.sdata.clone(),
                SectionCharacteristics::sdata(),
            ));
        }
        if !self.rsrc.is_empty() {
            sections.push(Section::new(
                b".rsrc",
                self.rsrc.clone(),
                SectionCharacteristics::rsrc(),
            ));
        }
        sections.push(Section::new(
            b".reloc",
            Vec::new(),
            SectionCharacteristics::reloc(),
        ));

        pe::layout_sections(&mut sections);

        let reloc_body = pe::build_relocation_body(&sections);
        #[allow(clippy::cast_possible_truncation)]
        let reloc_size = reloc_body.len() as u32;
        let reloc_index = sections.len() - 1;
        debug_assert_eq!(sections[reloc_index].rva, reloc_rva);
        sections[reloc_index].data = reloc_body;

        // ---- headers ------------------------------------------------------
        let mut directories = DataDirectories::default();
        directories.entries[DataDirectories::IMPORT_TABLE] = (TEXT_RVA + import_offset, 40);
        directories.entries[DataDirectories::BASE_RELOCATION] = (reloc_rva, reloc_size);
        directories.entries[DataDirectories::IAT] = (TEXT_RVA, IAT_SIZE);
        directories.entries[DataDirectories::CLI_HEADER] = (TEXT_RVA + IAT_SIZE, CLI_HEADER_SIZE);
        if rsrc_rva != 0 {
            #[allow(clippy::cast_possible_truncation)]
            {
                directories.entries[DataDirectories::RESOURCE_TABLE] =
                    (rsrc_rva, self.rsrc.len() as u32);
            }
        }

        let spec = PeImageSpec {
            is_dll: self.kind.is_dll(),
            subsystem: match self.kind {
                ModuleKind::WindowsExe => Subsystem::WindowsGui,
                ModuleKind::ConsoleExe | ModuleKind::Dll => Subsystem::WindowsCui,
            },
            entry_point_rva: TEXT_RVA + thunk_offset,
            directories,
        };

        pe::write_image(&spec, &sections)
    }

    /// Emits the image to a file.
    ///
    /// # Errors
    ///
    /// Emission errors abort the build; I/O errors propagate unchanged.
    pub fn write_image(&mut self, path: &Path) -> Result<()> {
        let image = self.to_bytes()?;
        std::fs::write(path, image)?;
        Ok(())
    }

    /// Attaches a prebuilt Win32 resource (`.rsrc`) section body.
    ///
    /// The bytes are emitted verbatim; directory-tree RVA fixups inside them are
    /// the caller's responsibility.
    pub fn set_win32_resources(&mut self, data: Vec<u8>) {
        self.rsrc = data;
    }

    #[allow(clippy::cast_possible_truncation)]
    fn resources_len(&self) -> u32 {
        self.resources_blob.len() as u32
    }

    fn write_cli_header(
        &self,
        buf: &mut Vec<u8>,
        metadata_rva: u32,
        metadata_size: u32,
        resources: (u32, u32),
    ) {
        emit_le(buf, CLI_HEADER_SIZE);
        emit_le(buf, 2_u16); // runtime major
        emit_le(buf, 0_u16); // runtime minor
        emit_le(buf, metadata_rva);
        emit_le(buf, metadata_size);
        emit_le(buf, self.runtime_flags.bits());
        let entry_token = match self.entry_point {
            Some(method) if !self.kind.is_dll() => self.method_token(method).value(),
            _ => 0,
        };
        emit_le(buf, entry_token);
        emit_le(buf, resources.0);
        emit_le(buf, resources.1);
        emit_le(buf, 0_u64); // strong name signature
        emit_le(buf, 0_u64); // code manager table
        emit_le(buf, 0_u64); // vtable fixups
        emit_le(buf, 0_u64); // export address table jumps
        emit_le(buf, 0_u64); // managed native header
    }

    /// Serializes the metadata root with its five streams.
    pub(crate) fn build_metadata(&self, layout: RowLayout) -> Result<Vec<u8>> {
        let tilde = self.build_tilde_stream(layout)?;
        let stream_data: [&[u8]; 5] = [
            &tilde,
            self.strings.bytes(),
            self.user_strings.bytes(),
            self.guids.bytes(),
            self.blobs.bytes(),
        ];

        #[allow(clippy::cast_possible_truncation)]
        let header_size = 32 + STREAM_NAMES
            .iter()
            .map(|name| 8 + name.len() as u32)
            .sum::<u32>();

        let mut buf = Vec::new();
        emit_le(&mut buf, 0x424A_5342_u32); // metadata signature
        emit_le(&mut buf, 1_u16); // major
        emit_le(&mut buf, 1_u16); // minor
        emit_le(&mut buf, 0_u32); // reserved
        #[allow(clippy::cast_possible_truncation)]
        emit_le(&mut buf, METADATA_VERSION.len() as u32);
        buf.extend_from_slice(METADATA_VERSION);
        emit_le(&mut buf, 0_u16); // flags
        emit_le(&mut buf, 5_u16); // stream count

        let mut offset = header_size;
        for (name, data) in STREAM_NAMES.iter().zip(stream_data.iter()) {
            emit_le(&mut buf, offset);
            #[allow(clippy::cast_possible_truncation)]
            emit_le(&mut buf, data.len() as u32);
            buf.extend_from_slice(name);
            #[allow(clippy::cast_possible_truncation)]
            {
                offset += data.len() as u32;
            }
        }
        debug_assert_eq!(buf.len() as u32, header_size);

        for data in stream_data {
            buf.extend_from_slice(data);
        }
        Ok(buf)
    }

    /// Serializes the `#~` stream: header, row counts, then row data.
    fn build_tilde_stream(&self, layout: RowLayout) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        emit_le(&mut buf, 0_u32); // reserved
        buf.push(2); // major version
        buf.push(0); // minor version
        buf.push(self.table_info.heap_size_flags());
        buf.push(1); // reserved
        emit_le(&mut buf, self.tables.valid_mask());
        emit_le(&mut buf, self.tables.sorted_mask());

        for table in TableId::iter() {
            let count = self.tables.row_count(table);
            if count > 0 {
                emit_le(&mut buf, count);
            }
        }

        self.write_table_rows(layout, &mut buf)?;
        pad_to_alignment(&mut buf, 4);
        Ok(buf)
    }
}

fn pad_to_offset(buf: &mut Vec<u8>, offset: u32) {
    debug_assert!(buf.len() as u32 <= offset);
    buf.resize(offset as usize, 0);
}
