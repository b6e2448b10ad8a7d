//! In-memory fixtures shared by unit tests.

use goblin::elf::header::EM_X86_64;

use crate::elf::UPDATE_INFO_SECTION;

const EHDR_LEN: usize = 64;
const SHDR_LEN: usize = 64;
const SHT_PROGBITS: u32 = 1;
const SHT_STRTAB: u32 = 3;

/// Minimal little-endian ELF64 executable holding `sections` in order,
/// followed by `.shstrtab` and the section header table.
pub(crate) fn elf64(machine: u16, sections: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    let mut placed = Vec::new();
    for (name, data) in sections {
        placed.push((name.to_string(), EHDR_LEN + body.len(), data.len(), SHT_PROGBITS));
        body.extend_from_slice(data);
    }

    let mut shstrtab = vec![0u8];
    let mut name_offsets = Vec::new();
    for (name, ..) in &placed {
        name_offsets.push(shstrtab.len());
        shstrtab.extend_from_slice(name.as_bytes());
        shstrtab.push(0);
    }
    let shstrtab_name = shstrtab.len();
    shstrtab.extend_from_slice(b".shstrtab\0");
    let shstrtab_offset = EHDR_LEN + body.len();
    body.extend_from_slice(&shstrtab);
    while (EHDR_LEN + body.len()) % 8 != 0 {
        body.push(0);
    }

    let shoff = EHDR_LEN + body.len();
    let shnum = placed.len() + 2;

    let mut out = Vec::new();
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&2u16.to_le_bytes()); // e_type: ET_EXEC
    out.extend_from_slice(&machine.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes()); // e_version
    out.extend_from_slice(&0u64.to_le_bytes()); // e_entry
    out.extend_from_slice(&0u64.to_le_bytes()); // e_phoff
    out.extend_from_slice(&(shoff as u64).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    out.extend_from_slice(&(EHDR_LEN as u16).to_le_bytes());
    out.extend_from_slice(&56u16.to_le_bytes()); // e_phentsize
    out.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
    out.extend_from_slice(&(SHDR_LEN as u16).to_le_bytes());
    out.extend_from_slice(&(shnum as u16).to_le_bytes());
    out.extend_from_slice(&((shnum - 1) as u16).to_le_bytes()); // e_shstrndx
    assert_eq!(out.len(), EHDR_LEN);

    out.extend_from_slice(&body);

    out.extend_from_slice(&[0u8; SHDR_LEN]);
    for ((_, offset, len, kind), name_offset) in placed.iter().zip(&name_offsets) {
        push_shdr(&mut out, *name_offset, *kind, *offset, *len);
    }
    push_shdr(&mut out, shstrtab_name, SHT_STRTAB, shstrtab_offset, shstrtab.len());
    out
}

fn push_shdr(out: &mut Vec<u8>, name: usize, kind: u32, offset: usize, size: usize) {
    out.extend_from_slice(&(name as u32).to_le_bytes());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes()); // sh_flags
    out.extend_from_slice(&0u64.to_le_bytes()); // sh_addr
    out.extend_from_slice(&(offset as u64).to_le_bytes());
    out.extend_from_slice(&(size as u64).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // sh_link
    out.extend_from_slice(&0u32.to_le_bytes()); // sh_info
    out.extend_from_slice(&1u64.to_le_bytes()); // sh_addralign
    out.extend_from_slice(&0u64.to_le_bytes()); // sh_entsize
}

/// x86_64 runtime stand-in with a zero-filled `.upd_info` of `capacity` bytes.
pub(crate) fn runtime_elf(capacity: usize) -> Vec<u8> {
    let code = [0x90u8; 32];
    let upd_info = vec![0u8; capacity];
    elf64(
        EM_X86_64,
        &[(".text", &code[..]), (UPDATE_INFO_SECTION, &upd_info[..])],
    )
}

/// Offset of `.upd_info` data inside [`runtime_elf`] output.
pub(crate) const RUNTIME_UPD_INFO_OFFSET: u64 = (EHDR_LEN + 32) as u64;
