//! The large-page mover.
//!
//! [`move_region_to_large_pages`] replaces the backing of a range that may
//! hold the very code the process is running. While it runs, any code inside
//! that range is unmapped or half-copied, so the mover:
//!
//! 1. lives in its own `.lpstub` section, aligned to a large page, so the
//!    aligned text range of the program stops short of it;
//! 2. is never inlined into a caller that might be moved;
//! 3. calls nothing but libc and always-inlined helpers.
//!
//! The range is read-write-execute between the remap and the final
//! `mprotect`. That window is accepted: the copy-back needs write access to
//! the exact addresses the code runs from.

use crate::config::PageMode;
use crate::error::{MoveFailure, MoveStep};
use crate::range::MemoryRange;
use crate::rt;
use std::ffi::c_void;
use std::ptr;

// Raise the alignment of the mover's section to a large page.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
std::arch::global_asm!(
    ".pushsection .lpstub,\"ax\",%progbits",
    ".balign 0x200000",
    ".popsection",
);

#[inline(always)]
fn failure(step: MoveStep, errno: i32, dst: bool, scratch: bool) -> MoveFailure {
    MoveFailure {
        step,
        errno,
        destination_unmap_failed: dst,
        scratch_unmap_failed: scratch,
    }
}

/// Unmaps both the remapped destination and the scratch copy after `step`
/// failed with `errno`.
#[inline(always)]
unsafe fn unwind_both(
    step: MoveStep,
    errno: i32,
    dst: *mut c_void,
    scratch: *mut c_void,
    size: usize,
) -> MoveFailure {
    let dst_failed = unsafe { libc::munmap(dst, size) } != 0;
    let scratch_failed = unsafe { libc::munmap(scratch, size) } != 0;
    failure(step, errno, dst_failed, scratch_failed)
}

/// Address of the mover's first instruction.
pub fn mover_address() -> usize {
    move_region_to_large_pages as usize
}

/// Moves `range` onto large pages in place.
///
/// # Safety
///
/// `range` must be aligned to the large-page size, readable, and must not
/// contain this function. Nothing else may touch the range while this runs,
/// which in practice means no other threads. On the unwinding failure paths
/// the range is left unmapped.
#[inline(never)]
#[link_section = ".lpstub"]
pub unsafe fn move_region_to_large_pages(
    range: MemoryRange,
    mode: PageMode,
) -> Result<(), MoveFailure> {
    let start = range.from as *mut c_void;
    let size = range.to.wrapping_sub(range.from);
    let explicit = matches!(mode, PageMode::Explicit);

    // 1. Scratch copy of the current contents.
    let nmem = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if nmem == libc::MAP_FAILED {
        return Err(failure(MoveStep::AllocateScratch, rt::errno(), false, false));
    }

    // 2. Straight to libc; `ptr::copy_nonoverlapping` may call back into our
    // own text for its debug checks.
    unsafe { libc::memcpy(nmem, start, size) };

    // 3. Same addresses, new backing. Writable for the copy-back.
    let mut flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_FIXED;
    if explicit {
        flags |= libc::MAP_HUGETLB;
    }
    let tmem = unsafe {
        libc::mmap(
            start,
            size,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            flags,
            -1,
            0,
        )
    };
    if tmem == libc::MAP_FAILED {
        let errno = rt::errno();
        let scratch_failed = unsafe { libc::munmap(nmem, size) } != 0;
        return Err(failure(MoveStep::RemapDestination, errno, false, scratch_failed));
    }

    // 4.
    if !explicit && unsafe { libc::madvise(tmem, size, libc::MADV_HUGEPAGE) } != 0 {
        let errno = rt::errno();
        return Err(unsafe { unwind_both(MoveStep::AdviseHugePages, errno, tmem, nmem, size) });
    }

    // 5.
    unsafe { libc::memcpy(start, nmem, size) };

    // 6.
    if unsafe { libc::mprotect(start, size, libc::PROT_READ | libc::PROT_EXEC) } != 0 {
        let errno = rt::errno();
        return Err(unsafe { unwind_both(MoveStep::RestoreProtection, errno, tmem, nmem, size) });
    }

    // 7.
    if unsafe { libc::munmap(nmem, size) } != 0 {
        return Err(failure(MoveStep::ReleaseScratch, rt::errno(), false, false));
    }
    Ok(())
}
