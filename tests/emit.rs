//! End-to-end emission tests: build small assemblies through the public API and
//! verify the bytes of the produced image against the CLI/PE format.

use cilforge::prelude::*;

/// File offset of the `.text` section in a two-section image (headers occupy one
/// file-alignment block).
const TEXT_FILE_OFFSET: usize = 0x200;
/// RVA of the `.text` section.
const TEXT_RVA: u32 = 0x2000;
/// Offset of the CLI header within `.text`.
const CLI_HEADER_OFFSET: usize = 8;
/// Offset of the first method body within `.text`.
const CODE_START: usize = 80;

fn text_file_offset(rva: u32) -> usize {
    (rva - TEXT_RVA) as usize + TEXT_FILE_OFFSET
}

fn read_u16(image: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(image[offset..offset + 2].try_into().unwrap())
}

fn read_u32(image: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(image[offset..offset + 4].try_into().unwrap())
}

fn read_u64(image: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(image[offset..offset + 8].try_into().unwrap())
}

/// Builds the minimal executable: one class with one static `Main` whose body is
/// a single `ret`.
fn minimal_exe() -> CilAssembly {
    let mut asm = CilAssembly::new("hello.exe", ModuleKind::ConsoleExe);
    let object = asm.system_class("Object");
    let program = asm.add_class(
        TypeAttributes::PUBLIC,
        "Hello",
        "Program",
        Some(object.into()),
    );
    let main = asm.add_method(
        program,
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        MethodImplAttributes::IL,
        "Main",
        MethodSig::new(TypeSignature::Void, vec![]),
        &[],
    );
    let mut body = MethodBody::new(8);
    body.code.op(Op::Ret);
    asm.set_method_body(main, body).unwrap();
    asm.declare_entry_point(main).unwrap();
    asm
}

/// Locates the metadata root in the image via the CLI header.
fn metadata_root_offset(image: &[u8]) -> usize {
    let cli = TEXT_FILE_OFFSET + CLI_HEADER_OFFSET;
    assert_eq!(read_u32(image, cli), 72, "CLI header size");
    let metadata_rva = read_u32(image, cli + 8);
    text_file_offset(metadata_rva)
}

/// Locates the `#~` stream (fixed stream order, fixed header size).
fn tilde_offset(image: &[u8]) -> usize {
    let root = metadata_root_offset(image);
    assert_eq!(read_u32(image, root), 0x424A_5342, "metadata signature");
    // Root header: 32 fixed bytes + five stream headers (8 + padded name each).
    root + 32 + (8 + 4) + (8 + 12) + (8 + 4) + (8 + 8) + (8 + 8)
}

#[test]
fn minimal_exe_has_pe_shell() {
    let image = minimal_exe().to_bytes().unwrap();

    assert_eq!(&image[0..2], b"MZ");
    assert_eq!(read_u32(&image, 0x3C), 0x80);
    assert_eq!(&image[0x80..0x84], b"PE\0\0");
    assert_eq!(read_u16(&image, 0x84), 0x014C, "machine");
    assert_eq!(read_u16(&image, 0x86), 2, "section count");
    assert_eq!(read_u16(&image, 0x96), 0x010E, "EXE characteristics");
    assert_eq!(read_u16(&image, 0x98), 0x010B, "PE32 magic");
}

#[test]
fn entry_point_token_names_method_row_one() {
    let image = minimal_exe().to_bytes().unwrap();
    let entry_token = read_u32(&image, TEXT_FILE_OFFSET + CLI_HEADER_OFFSET + 20);
    assert_eq!(entry_token, 0x0600_0001);
}

#[test]
fn runtime_flags_default_to_il_only() {
    let image = minimal_exe().to_bytes().unwrap();
    let flags = read_u32(&image, TEXT_FILE_OFFSET + CLI_HEADER_OFFSET + 16);
    assert_eq!(flags, 0x0000_0001);
}

#[test]
fn type_def_table_has_module_class_plus_user_class() {
    let image = minimal_exe().to_bytes().unwrap();
    let tilde = tilde_offset(&image);

    assert_eq!(read_u32(&image, tilde), 0, "reserved");
    assert_eq!(image[tilde + 4], 2, "tables major version");
    assert_eq!(image[tilde + 5], 0, "tables minor version");
    assert_eq!(image[tilde + 7], 1, "reserved byte");

    let valid = read_u64(&image, tilde + 8);
    // Module, TypeRef, TypeDef, MethodDef, AssemblyRef.
    assert_eq!(
        valid,
        (1 << 0x00) | (1 << 0x01) | (1 << 0x02) | (1 << 0x06) | (1 << 0x23)
    );

    // Row counts follow in ascending table order.
    assert_eq!(read_u32(&image, tilde + 24), 1, "Module rows");
    assert_eq!(read_u32(&image, tilde + 28), 1, "TypeRef rows");
    assert_eq!(read_u32(&image, tilde + 32), 2, "TypeDef rows");
    assert_eq!(read_u32(&image, tilde + 36), 1, "MethodDef rows");
    assert_eq!(read_u32(&image, tilde + 40), 1, "AssemblyRef rows");
}

#[test]
fn small_heaps_leave_heap_size_flags_clear() {
    let image = minimal_exe().to_bytes().unwrap();
    let tilde = tilde_offset(&image);
    assert_eq!(image[tilde + 6], 0, "heap size flags");
}

#[test]
fn ret_only_method_uses_tiny_header() {
    let image = minimal_exe().to_bytes().unwrap();
    let body = TEXT_FILE_OFFSET + CODE_START;
    // Tiny header: low bits 0b10, top 6 bits the code length (one ret byte).
    assert_eq!(image[body], 0x02 | (1 << 2));
    assert_eq!(image[body + 1], 0x2A, "ret");
}

#[test]
fn deep_stack_forces_fat_header() {
    let mut asm = CilAssembly::new("fat.exe", ModuleKind::ConsoleExe);
    let object = asm.system_class("Object");
    let class = asm.add_class(TypeAttributes::PUBLIC, "X", "P", Some(object.into()));
    let main = asm.add_method(
        class,
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        MethodImplAttributes::IL,
        "Main",
        MethodSig::new(TypeSignature::Void, vec![]),
        &[],
    );
    let mut body = MethodBody::new(9); // max-stack over the tiny limit
    body.code.op(Op::Ret);
    asm.set_method_body(main, body).unwrap();
    asm.declare_entry_point(main).unwrap();
    let image = asm.to_bytes().unwrap();

    let body_offset = TEXT_FILE_OFFSET + CODE_START;
    let flags = read_u16(&image, body_offset);
    assert_eq!(flags, 0x3003, "fat format, 3-dword header");
    assert_eq!(read_u16(&image, body_offset + 2), 9, "max stack");
    assert_eq!(read_u32(&image, body_offset + 4), 1, "code size");
    assert_eq!(read_u32(&image, body_offset + 8), 0, "no local signature");
    assert_eq!(image[body_offset + 12], 0x2A, "ret");
}

#[test]
fn locals_force_fat_header_with_signature_token() {
    let mut asm = CilAssembly::new("locals.exe", ModuleKind::ConsoleExe);
    let object = asm.system_class("Object");
    let class = asm.add_class(TypeAttributes::PUBLIC, "X", "P", Some(object.into()));
    let main = asm.add_method(
        class,
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        MethodImplAttributes::IL,
        "Main",
        MethodSig::new(TypeSignature::Void, vec![]),
        &[],
    );
    let mut body = MethodBody::new(1);
    body.locals.push(TypeSignature::I4);
    body.code.op(Op::Ret);
    asm.set_method_body(main, body).unwrap();
    asm.declare_entry_point(main).unwrap();
    let image = asm.to_bytes().unwrap();

    let body_offset = TEXT_FILE_OFFSET + CODE_START;
    let flags = read_u16(&image, body_offset);
    assert_eq!(flags & 0x10, 0x10, "init locals");
    let local_sig = read_u32(&image, body_offset + 8);
    assert_eq!(local_sig, 0x1100_0001, "stand-alone signature token");
}

#[test]
fn forward_branch_displacement_is_relative_to_instruction_end() {
    let mut asm = CilAssembly::new("br.exe", ModuleKind::ConsoleExe);
    let object = asm.system_class("Object");
    let class = asm.add_class(TypeAttributes::PUBLIC, "X", "P", Some(object.into()));
    let main = asm.add_method(
        class,
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        MethodImplAttributes::IL,
        "Main",
        MethodSig::new(TypeSignature::Void, vec![]),
        &[],
    );

    let mut body = MethodBody::new(8);
    let end = body.code.new_label();
    body.code.branch(BranchOp::BrS, end);
    body.code.op(Op::Nop);
    body.code.op(Op::Nop);
    body.code.mark_label(end);
    body.code.op(Op::Ret);
    asm.set_method_body(main, body).unwrap();
    asm.declare_entry_point(main).unwrap();
    let image = asm.to_bytes().unwrap();

    let code = TEXT_FILE_OFFSET + CODE_START + 1; // skip tiny header
    assert_eq!(image[code], 0x2B, "br.s");
    assert_eq!(image[code + 1], 2, "skip two nops");
    assert_eq!(image[code + 2], 0x00);
    assert_eq!(image[code + 3], 0x00);
    assert_eq!(image[code + 4], 0x2A, "ret");
}

#[test]
fn long_branch_backward_encodes_negative_displacement() {
    let mut asm = CilAssembly::new("br2.exe", ModuleKind::ConsoleExe);
    let object = asm.system_class("Object");
    let class = asm.add_class(TypeAttributes::PUBLIC, "X", "P", Some(object.into()));
    let main = asm.add_method(
        class,
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        MethodImplAttributes::IL,
        "Main",
        MethodSig::new(TypeSignature::Void, vec![]),
        &[],
    );

    let mut body = MethodBody::new(8);
    let top = body.code.new_label();
    body.code.mark_label(top);
    body.code.op(Op::Nop);
    body.code.branch(BranchOp::Br, top);
    body.code.op(Op::Ret);
    asm.set_method_body(main, body).unwrap();
    asm.declare_entry_point(main).unwrap();
    let image = asm.to_bytes().unwrap();

    let code = TEXT_FILE_OFFSET + CODE_START + 1;
    assert_eq!(image[code], 0x00, "nop");
    assert_eq!(image[code + 1], 0x38, "br");
    // Branch at offset 1, size 5; target 0 -> displacement -6.
    assert_eq!(
        i32::from_le_bytes(image[code + 2..code + 6].try_into().unwrap()),
        -6
    );
}

#[test]
fn out_of_range_short_branch_is_rejected() {
    let mut asm = CilAssembly::new("far.exe", ModuleKind::ConsoleExe);
    let object = asm.system_class("Object");
    let class = asm.add_class(TypeAttributes::PUBLIC, "X", "P", Some(object.into()));
    let main = asm.add_method(
        class,
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        MethodImplAttributes::IL,
        "Main",
        MethodSig::new(TypeSignature::Void, vec![]),
        &[],
    );

    let mut body = MethodBody::new(8);
    let end = body.code.new_label();
    body.code.branch(BranchOp::BrS, end);
    for _ in 0..200 {
        body.code.op(Op::Nop);
    }
    body.code.mark_label(end);
    body.code.op(Op::Ret);
    asm.set_method_body(main, body).unwrap();
    asm.declare_entry_point(main).unwrap();

    assert!(matches!(asm.to_bytes(), Err(Error::Malformed { .. })));
}

/// Builds a method with one try/catch pair; `try_nops` controls the try span.
fn exe_with_handler(try_nops: usize) -> Vec<u8> {
    let mut asm = CilAssembly::new("eh.exe", ModuleKind::ConsoleExe);
    let object = asm.system_class("Object");
    let exception = asm.system_class("Exception");
    let class = asm.add_class(TypeAttributes::PUBLIC, "X", "P", Some(object.into()));
    let main = asm.add_method(
        class,
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        MethodImplAttributes::IL,
        "Main",
        MethodSig::new(TypeSignature::Void, vec![]),
        &[],
    );

    let mut body = MethodBody::new(8);
    let try_start = body.code.new_label();
    let try_end = body.code.new_label();
    let handler_start = body.code.new_label();
    let handler_end = body.code.new_label();
    let done = body.code.new_label();

    body.code.mark_label(try_start);
    for _ in 0..try_nops {
        body.code.op(Op::Nop);
    }
    body.code.branch(BranchOp::Leave, done);
    body.code.mark_label(try_end);
    body.code.mark_label(handler_start);
    body.code.op(Op::Pop);
    body.code.branch(BranchOp::Leave, done);
    body.code.mark_label(handler_end);
    body.code.mark_label(done);
    body.code.op(Op::Ret);

    body.exception_handlers.push(ExceptionHandler {
        flags: ExceptionHandlerFlags::EXCEPTION,
        try_start,
        try_end,
        handler_start,
        handler_end,
        catch_type: Some(exception.into()),
        filter_start: None,
    });
    asm.set_method_body(main, body).unwrap();
    asm.declare_entry_point(main).unwrap();
    asm.to_bytes().unwrap()
}

/// Parses a fat-header method at the code start, returning the exception
/// section's first bytes.
fn exception_section(image: &[u8]) -> (u16, usize) {
    let body = TEXT_FILE_OFFSET + CODE_START;
    let flags = read_u16(image, body);
    assert_eq!(flags & 0x08, 0x08, "more-sections flag");
    let code_size = read_u32(image, body + 4) as usize;
    let mut section = body + 12 + code_size;
    section = (section + 3) & !3;
    (flags, section)
}

#[test]
fn small_spans_use_small_exception_clauses() {
    let image = exe_with_handler(4);
    let (_, section) = exception_section(&image);
    assert_eq!(image[section], 0x01, "small EH section kind");
    assert_eq!(image[section + 1], 16, "4-byte header + one 12-byte clause");
    // Clause: flags 0 (typed), try offset 0.
    assert_eq!(read_u16(&image, section + 4), 0);
    assert_eq!(read_u16(&image, section + 6), 0);
    // Catch token references the TypeRef table.
    let token = read_u32(&image, section + 12);
    assert_eq!(token >> 24, 0x01);
}

#[test]
fn wide_try_span_forces_fat_exception_clauses() {
    let image = exe_with_handler(300);
    let (_, section) = exception_section(&image);
    assert_eq!(image[section], 0x41, "fat EH section kind");
    // 3-byte data size: 4 + 24.
    assert_eq!(read_u32(&image, section) >> 8, 28);
    assert_eq!(read_u32(&image, section + 4), 0, "typed clause flags");
    assert_eq!(read_u32(&image, section + 8), 0, "try offset");
    assert_eq!(read_u32(&image, section + 12), 305, "try length");
}

#[test]
fn ldstr_operand_carries_user_string_tag() {
    let mut asm = CilAssembly::new("str.exe", ModuleKind::ConsoleExe);
    let object = asm.system_class("Object");
    let class = asm.add_class(TypeAttributes::PUBLIC, "X", "P", Some(object.into()));
    let main = asm.add_method(
        class,
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        MethodImplAttributes::IL,
        "Main",
        MethodSig::new(TypeSignature::Void, vec![]),
        &[],
    );
    let mut body = MethodBody::new(8);
    body.code.ldstr("hi");
    body.code.op(Op::Pop);
    body.code.op(Op::Ret);
    asm.set_method_body(main, body).unwrap();
    asm.declare_entry_point(main).unwrap();
    let image = asm.to_bytes().unwrap();

    let code = TEXT_FILE_OFFSET + CODE_START + 1;
    assert_eq!(image[code], 0x72, "ldstr");
    let token = read_u32(&image, code + 1);
    assert_eq!(token, 0x7000_0001, "first #US entry");
}

#[test]
fn call_operand_references_member_ref_row() {
    let mut asm = CilAssembly::new("call.exe", ModuleKind::ConsoleExe);
    let object = asm.system_class("Object");
    let console = asm.system_class("Console");
    let class = asm.add_class(TypeAttributes::PUBLIC, "X", "P", Some(object.into()));
    let main = asm.add_method(
        class,
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        MethodImplAttributes::IL,
        "Main",
        MethodSig::new(TypeSignature::Void, vec![]),
        &[],
    );
    let write_line = asm.add_method_ref(
        TypeDefOrRef::Ref(console).into(),
        "WriteLine",
        MethodSig::new(TypeSignature::Void, vec![TypeSignature::String]),
    );

    let mut body = MethodBody::new(8);
    body.code.ldstr("hello");
    body.code.method_op(MethodOp::Call, write_line.into());
    body.code.op(Op::Ret);
    asm.set_method_body(main, body).unwrap();
    asm.declare_entry_point(main).unwrap();
    let image = asm.to_bytes().unwrap();

    let code = TEXT_FILE_OFFSET + CODE_START + 1;
    assert_eq!(image[code + 5], 0x28, "call");
    assert_eq!(read_u32(&image, code + 6), 0x0A00_0001, "MemberRef row 1");
}

#[test]
fn strings_heap_growth_flips_width_flag() {
    let mut asm = CilAssembly::new("big.dll", ModuleKind::Dll);
    let scope: ResolutionScope = asm.mscorlib().into();
    // Unique type names push the #Strings heap past 0xFFFF bytes.
    for index in 0..2200 {
        asm.add_class_ref(scope, "Bulk", &format!("Type_{index:04}_padding_padding_padding"));
    }
    let image = asm.to_bytes().unwrap();
    let tilde = tilde_offset(&image);
    assert_eq!(image[tilde + 6] & 0x01, 0x01, "large #Strings flag");
}

#[test]
fn dll_output_has_library_characteristics_and_no_entry_token() {
    let mut asm = CilAssembly::new("lib.dll", ModuleKind::Dll);
    let object = asm.system_class("Object");
    asm.add_class(TypeAttributes::PUBLIC, "Lib", "Api", Some(object.into()));
    let image = asm.to_bytes().unwrap();

    assert_eq!(read_u16(&image, 0x96), 0x210E, "DLL characteristics");
    let entry_token = read_u32(&image, TEXT_FILE_OFFSET + CLI_HEADER_OFFSET + 20);
    assert_eq!(entry_token, 0);
}

#[test]
fn exe_without_entry_point_is_rejected() {
    let mut asm = CilAssembly::new("broken.exe", ModuleKind::ConsoleExe);
    let object = asm.system_class("Object");
    asm.add_class(TypeAttributes::PUBLIC, "X", "P", Some(object.into()));
    assert!(matches!(asm.to_bytes(), Err(Error::Malformed { .. })));
}

#[test]
fn relocation_section_patches_entry_thunk() {
    let image = minimal_exe().to_bytes().unwrap();

    // Base relocation directory (slot 5) points into .reloc.
    let reloc_dir = 0x98 + 96 + 5 * 8;
    let reloc_rva = read_u32(&image, reloc_dir);
    let reloc_size = read_u32(&image, reloc_dir + 4);
    assert!(reloc_rva >= 0x4000);
    assert_eq!(reloc_size, 12, "one page, one fixup, one pad entry");

    // The entry point RVA (optional header) is the thunk; the fixup covers its
    // absolute operand at +2.
    let entry_rva = read_u32(&image, 0x98 + 16);
    let thunk = text_file_offset(entry_rva);
    assert_eq!(image[thunk], 0xFF);
    assert_eq!(image[thunk + 1], 0x25);
    assert_eq!(read_u32(&image, thunk + 2), 0x0040_2000, "imagebase + IAT");
}

#[test]
fn emission_is_deterministic() {
    let a = minimal_exe().to_bytes().unwrap();
    let b = minimal_exe().to_bytes().unwrap();
    assert_eq!(a, b);
}

#[test]
fn write_image_matches_to_bytes() {
    let bytes = minimal_exe().to_bytes().unwrap();
    let file = tempfile::NamedTempFile::new().unwrap();
    minimal_exe().write_image(file.path()).unwrap();
    let written = std::fs::read(file.path()).unwrap();
    assert_eq!(bytes, written);
}

#[test]
fn embedded_resource_appears_in_cli_header() {
    let mut asm = minimal_exe();
    asm.add_embedded_resource("data", ManifestResourceAttributes::PUBLIC, &[1, 2, 3])
        .unwrap();
    let image = asm.to_bytes().unwrap();

    let cli = TEXT_FILE_OFFSET + CLI_HEADER_OFFSET;
    let resources_rva = read_u32(&image, cli + 24);
    let resources_size = read_u32(&image, cli + 28);
    assert_ne!(resources_rva, 0);
    assert_eq!(resources_size, 7, "length prefix + payload");

    let resources = text_file_offset(resources_rva);
    assert_eq!(read_u32(&image, resources), 3);
    assert_eq!(&image[resources + 4..resources + 7], &[1, 2, 3]);
}

#[test]
fn field_data_lands_in_sdata_section() {
    let mut asm = CilAssembly::new("data.dll", ModuleKind::Dll);
    let object = asm.system_class("Object");
    let class = asm.add_class(TypeAttributes::PUBLIC, "D", "Holder", Some(object.into()));
    let field = asm.add_field(
        class,
        FieldAttributes::STATIC | FieldAttributes::ASSEMBLY,
        "blob",
        TypeSignature::I8,
    );
    asm.set_field_data(field, &[0xDE, 0xAD, 0xBE, 0xEF, 1, 2, 3, 4]);
    let image = asm.to_bytes().unwrap();

    // Three sections now: .text, .sdata, .reloc.
    assert_eq!(read_u16(&image, 0x86), 3, "section count");
    // .sdata body sits in the second file block after .text.
    let sdata_header = 0x178 + 40;
    assert_eq!(&image[sdata_header..sdata_header + 6], b".sdata");
    let sdata_offset = read_u32(&image, sdata_header + 20) as usize;
    assert_eq!(&image[sdata_offset..sdata_offset + 4], &[0xDE, 0xAD, 0xBE, 0xEF]);
}
