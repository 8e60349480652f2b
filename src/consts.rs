pub const BASE_PAGE_SIZE: usize = 4096;
pub const LARGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

pub const EI_MAG0: usize = 0;
pub const EI_MAG1: usize = 1;
pub const EI_MAG2: usize = 2;
pub const EI_MAG3: usize = 3;
pub const EI_CLASS: usize = 4;
pub const EI_DATA: usize = 5;

pub const ELFMAG0: u8 = 0x7f;
pub const ELFMAG1: u8 = 69;
pub const ELFMAG2: u8 = 76;
pub const ELFMAG3: u8 = 70;

pub const ELFCLASS64: u8 = 2;
pub const ELFDATA2LSB: u8 = 1;

pub const ELF64_EHDR_SIZE: usize = 64;
pub const ELF64_SHDR_SIZE: usize = 64;

pub const SHN_UNDEF: u16 = 0;

pub const TEXT_SECTION_NAME: &[u8] = b".text";

pub const THP_ENABLED_PATH: &str = "/sys/kernel/mm/transparent_hugepage/enabled";
pub const NR_HUGEPAGES_PATH: &str = "/proc/sys/vm/nr_hugepages";
pub const SELF_MAPS_PATH: &str = "/proc/self/maps";
pub const SELF_EXE_PATH: &str = "/proc/self/exe";

/// Either one, set to any value, selects the explicit hugetlbfs pool instead
/// of transparent huge pages. The first is the name existing deployments use.
pub const USE_EXPLICIT_HP_ENVS: [&str; 2] = ["IODLR_USE_EXPLICIT_HP", "LP_USE_EXPLICIT_HP"];
