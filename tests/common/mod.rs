#![allow(dead_code)]

use large_page::consts::LARGE_PAGE_SIZE;
use large_page::maps::{read_maps, MapsEntry};
use large_page::MemoryRange;
use std::ffi::c_void;
use std::io::Write;
use std::path::Path;
use std::ptr;
use tempfile::NamedTempFile;

pub fn fixture(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

pub fn own_maps() -> Vec<MapsEntry> {
    read_maps(Path::new("/proc/self/maps")).unwrap()
}

/// Anonymous writable mappings that don't overlap `exclude`.
pub fn anon_writable_outside(exclude: MemoryRange) -> Vec<(usize, usize)> {
    own_maps()
        .into_iter()
        .filter(|e| e.pathname.is_none() && e.perms.write)
        .filter(|e| e.end <= exclude.from || exclude.to <= e.start)
        .map(|e| (e.start, e.end))
        .collect()
}

/// Mappings of `after` that weren't in `before` and hold at least `len`
/// bytes. A leaked mapping that merged into a neighbour shows up here too,
/// since the neighbour's bounds change.
pub fn appeared(
    before: &[(usize, usize)],
    after: &[(usize, usize)],
    len: usize,
) -> Vec<(usize, usize)> {
    after
        .iter()
        .filter(|m| !before.contains(m) && m.1 - m.0 >= len)
        .copied()
        .collect()
}

/// An anonymous read-write region of `pages` large pages at a large-page
/// aligned address. Unmapped on drop.
pub struct AlignedRegion {
    pub range: MemoryRange,
}

impl AlignedRegion {
    pub fn new(pages: usize) -> Self {
        let len = (pages + 1) * LARGE_PAGE_SIZE;
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert_ne!(raw, libc::MAP_FAILED);
        let raw = raw as usize;
        let from = (raw + LARGE_PAGE_SIZE - 1) & !(LARGE_PAGE_SIZE - 1);
        let to = from + pages * LARGE_PAGE_SIZE;
        unsafe {
            if from > raw {
                libc::munmap(raw as *mut c_void, from - raw);
            }
            if raw + len > to {
                libc::munmap(to as *mut c_void, raw + len - to);
            }
        }
        Self {
            range: MemoryRange::new(from, to),
        }
    }

    pub fn fill(&self) {
        let bytes = unsafe {
            std::slice::from_raw_parts_mut(self.range.from as *mut u8, self.range.len())
        };
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i ^ (i >> 12) ^ (i >> 21)) as u8;
        }
    }

    pub fn checksum(&self) -> u64 {
        let bytes =
            unsafe { std::slice::from_raw_parts(self.range.from as *const u8, self.range.len()) };
        bytes.iter().fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
            (h ^ *b as u64).wrapping_mul(0x100_0000_01b3)
        })
    }
}

impl Drop for AlignedRegion {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.range.from as *mut c_void, self.range.len()) };
    }
}
