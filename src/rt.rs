use std::ffi::{c_void, CStr};
use std::os::raw::c_int;

/// Reads the calling thread's errno.
///
/// Always inlined: the mover reads errno while its caller's code may be
/// unmapped.
#[inline(always)]
pub fn errno() -> i32 {
    unsafe { *libc::__errno_location() }
}

pub fn base_page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).unwrap_or(0)
}

/// One entry of the dynamic loader's object list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedObject {
    /// Name as reported by the loader; empty for the main program.
    pub name: String,
    /// Load bias added to the object's link-time addresses.
    pub base: usize,
}

impl LoadedObject {
    pub fn is_main_program(&self) -> bool {
        self.name.is_empty()
    }
}

unsafe extern "C" fn collect_object(
    info: *mut libc::dl_phdr_info,
    _size: libc::size_t,
    data: *mut c_void,
) -> c_int {
    // Must not unwind.
    let objects = unsafe { &mut *(data as *mut Vec<LoadedObject>) };
    let info = unsafe { &*info };
    let name = if info.dlpi_name.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(info.dlpi_name) }
            .to_string_lossy()
            .into_owned()
    };
    objects.push(LoadedObject {
        name,
        base: info.dlpi_addr as usize,
    });
    0
}

/// Snapshots the main program and every loaded shared object, in loader
/// order.
pub fn loaded_objects() -> Vec<LoadedObject> {
    let mut objects: Vec<LoadedObject> = Vec::with_capacity(64);
    unsafe {
        libc::dl_iterate_phdr(
            Some(collect_object),
            &mut objects as *mut Vec<LoadedObject> as *mut c_void,
        );
    }
    objects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_program_comes_first() {
        let objects = loaded_objects();
        assert!(!objects.is_empty());
        #[cfg(target_env = "gnu")]
        assert!(objects[0].is_main_program());
    }

    #[test]
    fn page_size_is_power_of_two() {
        assert!(base_page_size().is_power_of_two());
    }
}
