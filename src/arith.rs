use crate::consts::LARGE_PAGE_SIZE;

const fn is_pow2(align: usize) -> bool {
    align != 0 && (align & (align - 1)) == 0
}

pub fn align_down(value: usize, align: usize) -> usize {
    debug_assert!(is_pow2(align), "alignment is not power-of-two: {align}");
    value & !(align - 1)
}

/// Rounds `value` up to `align`, or `None` if that would wrap past the top
/// of the address space.
pub fn align_up_checked(value: usize, align: usize) -> Option<usize> {
    debug_assert!(is_pow2(align), "alignment is not power-of-two: {align}");
    let add = align - 1;
    value.checked_add(add).map(|sum| sum & !add)
}

pub fn large_page_align_down(addr: usize) -> usize {
    align_down(addr, LARGE_PAGE_SIZE)
}

pub fn large_page_align_up(addr: usize) -> Option<usize> {
    align_up_checked(addr, LARGE_PAGE_SIZE)
}

/// Number of large pages needed to hold `len` bytes.
pub fn large_pages_for(len: usize) -> usize {
    len / LARGE_PAGE_SIZE + usize::from(len % LARGE_PAGE_SIZE != 0)
}
