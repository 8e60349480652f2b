//! Just enough ELF64 to find a loaded object's `.text` section on disk: the
//! file header, the section header table, and the section name table.

use crate::consts::{
    EI_CLASS, EI_DATA, EI_MAG0, EI_MAG1, EI_MAG2, EI_MAG3, ELF64_EHDR_SIZE, ELF64_SHDR_SIZE,
    ELFCLASS64, ELFDATA2LSB, ELFMAG0, ELFMAG1, ELFMAG2, ELFMAG3, SHN_UNDEF, TEXT_SECTION_NAME,
};
use crate::error::MapError;
use log::debug;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

const SHN_XINDEX: u16 = 0xffff;

// Refuse to allocate more than this for a section name table.
const MAX_STRTAB_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElfHeader {
    pub e_shoff: u64,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionHeader {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
}

fn read_u16_le(bytes: &[u8], off: usize) -> Option<u16> {
    let b = bytes.get(off..off.checked_add(2)?)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32_le(bytes: &[u8], off: usize) -> Option<u32> {
    let b = bytes.get(off..off.checked_add(4)?)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u64_le(bytes: &[u8], off: usize) -> Option<u64> {
    let b = bytes.get(off..off.checked_add(8)?)?;
    let mut le = [0u8; 8];
    le.copy_from_slice(b);
    Some(u64::from_le_bytes(le))
}

pub fn parse_ehdr(file: &[u8]) -> Result<ElfHeader, String> {
    if file.len() < ELF64_EHDR_SIZE {
        return Err(format!(
            "ELF header too short: len={} min={}",
            file.len(),
            ELF64_EHDR_SIZE
        ));
    }
    if file[EI_MAG0] != ELFMAG0
        || file[EI_MAG1] != ELFMAG1
        || file[EI_MAG2] != ELFMAG2
        || file[EI_MAG3] != ELFMAG3
    {
        return Err("invalid ELF magic".to_string());
    }
    if file[EI_CLASS] != ELFCLASS64 {
        return Err(format!("unsupported ELF class: {}", file[EI_CLASS]));
    }
    if file[EI_DATA] != ELFDATA2LSB {
        return Err(format!("unsupported ELF endianness: {}", file[EI_DATA]));
    }

    let truncated = || "truncated ELF header".to_string();
    Ok(ElfHeader {
        e_shoff: read_u64_le(file, 40).ok_or_else(truncated)?,
        e_shentsize: read_u16_le(file, 58).ok_or_else(truncated)?,
        e_shnum: read_u16_le(file, 60).ok_or_else(truncated)?,
        e_shstrndx: read_u16_le(file, 62).ok_or_else(truncated)?,
    })
}

pub fn parse_shdr(table: &[u8], off: usize) -> Option<SectionHeader> {
    Some(SectionHeader {
        sh_name: read_u32_le(table, off)?,
        sh_type: read_u32_le(table, off + 4)?,
        sh_flags: read_u64_le(table, off + 8)?,
        sh_addr: read_u64_le(table, off + 16)?,
        sh_offset: read_u64_le(table, off + 24)?,
        sh_size: read_u64_le(table, off + 32)?,
        sh_link: read_u32_le(table, off + 40)?,
    })
}

/// Returns the NUL-terminated name starting at `off` in `strtab`.
fn section_name(strtab: &[u8], off: u32) -> Option<&[u8]> {
    let tail = strtab.get(off as usize..)?;
    let nul = tail.iter().position(|b| *b == 0)?;
    Some(&tail[..nul])
}

/// Reads the section headers of the ELF file at `path` and returns the one
/// named `.text`.
///
/// The file is closed on every return path.
pub fn find_text_section(path: &Path) -> Result<SectionHeader, MapError> {
    let mut file = File::open(path).map_err(|source| MapError::OpenExe {
        path: path.to_path_buf(),
        source,
    })?;

    let mut ehdr_bytes = [0u8; ELF64_EHDR_SIZE];
    file.read_exact(&mut ehdr_bytes)
        .map_err(|e| MapError::ReadExeHeader {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    let ehdr = parse_ehdr(&ehdr_bytes).map_err(|reason| MapError::ReadExeHeader {
        path: path.to_path_buf(),
        reason,
    })?;

    let shdrs_err = |reason: String| MapError::ReadExeSectionHeaders {
        path: path.to_path_buf(),
        reason,
    };
    if ehdr.e_shnum == 0 || ehdr.e_shoff == 0 {
        return Err(MapError::RegionNotFound);
    }
    if ehdr.e_shentsize as usize != ELF64_SHDR_SIZE {
        return Err(shdrs_err(format!(
            "unexpected e_shentsize: {} expected {}",
            ehdr.e_shentsize, ELF64_SHDR_SIZE
        )));
    }

    file.seek(SeekFrom::Start(ehdr.e_shoff))
        .map_err(|source| MapError::SeekExeSectionHeaders {
            path: path.to_path_buf(),
            source,
        })?;
    let entsize = ehdr.e_shentsize as usize;
    let mut table = vec![0u8; entsize * ehdr.e_shnum as usize];
    file.read_exact(&mut table)
        .map_err(|e| shdrs_err(e.to_string()))?;

    let shdrs = (0..ehdr.e_shnum as usize)
        .map(|i| parse_shdr(&table, i * entsize))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| shdrs_err("truncated section header".to_string()))?;

    let strndx = match ehdr.e_shstrndx {
        SHN_UNDEF => return Err(shdrs_err("no section name table".to_string())),
        SHN_XINDEX => shdrs[0].sh_link as usize,
        idx => idx as usize,
    };
    let strtab_hdr = shdrs
        .get(strndx)
        .ok_or_else(|| shdrs_err(format!("section name table index {strndx} out of range")))?;

    let strtab_err = |reason: String| MapError::ReadExeStringTable {
        path: path.to_path_buf(),
        reason,
    };
    if strtab_hdr.sh_size > MAX_STRTAB_SIZE {
        return Err(strtab_err(format!(
            "section name table too large: {}",
            strtab_hdr.sh_size
        )));
    }
    file.seek(SeekFrom::Start(strtab_hdr.sh_offset))
        .map_err(|source| MapError::SeekExeStringTable {
            path: path.to_path_buf(),
            source,
        })?;
    let mut strtab = vec![0u8; strtab_hdr.sh_size as usize];
    file.read_exact(&mut strtab)
        .map_err(|e| strtab_err(e.to_string()))?;

    let text = shdrs
        .into_iter()
        .find(|sh| section_name(&strtab, sh.sh_name) == Some(TEXT_SECTION_NAME))
        .ok_or(MapError::RegionNotFound)?;
    debug!(
        "{}: .text at 0x{:x} size 0x{:x}",
        path.display(),
        text.sh_addr,
        text.sh_size
    );
    Ok(text)
}
