//! Flat status codes.
//!
//! Every outcome of the pipeline collapses onto one [`MapStatus`]. The numeric
//! value of each variant is stable: consumers may persist it, so new codes
//! are only ever appended.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MapStatus {
    Ok = 0,
    ExePathReadFailed = 1,
    FailedToOpenThpFile = 2,
    InvalidRegex = 3,
    InvalidRegionAddress = 4,
    MalformedThpFile = 5,
    MalformedMapsFile = 6,
    MapsOpenFailed = 7,
    MoverOverlaps = 8,
    NullRegex = 9,
    RegionNotFound = 10,
    RegionTooSmall = 11,
    SeeErrno = 12,
    MadviseFailed = 13,
    MadviseScratchUnmapFailed = 14,
    MadviseUnmapsFailed = 15,
    MadviseDestinationUnmapFailed = 16,
    RemapFailed = 17,
    RemapScratchUnmapFailed = 18,
    MprotectFailed = 19,
    MprotectScratchUnmapFailed = 20,
    MprotectUnmapsFailed = 21,
    MprotectDestinationUnmapFailed = 22,
    ScratchUnmapFailed = 23,
    UnsupportedPlatform = 24,
    OpenExeFailed = 25,
    SeekExeSectionHeadersFailed = 26,
    ReadExeHeaderFailed = 27,
    ReadExeSectionHeadersFailed = 28,
    SeekExeStringTableFailed = 29,
    ReadExeStringTableFailed = 30,
    NotEnoughExplicitHugePages = 31,
}

// (short, verbose), indexed by discriminant.
const STATUS_TEXT: [(&str, &str); 32] = [
    ("map_ok", "ok"),
    ("map_exe_path_read_failed", "failed to read executable path file"),
    ("map_failed_to_open_thp_file", "failed to open hugepage enablement status file"),
    ("map_invalid_regex", "invalid regex"),
    ("map_invalid_region_address", "invalid region boundaries"),
    ("map_malformed_thp_file", "malformed hugepage enablement status file"),
    ("map_malformed_maps_file", "malformed /proc/<PID>/maps file"),
    ("map_maps_open_failed", "failed to open maps file"),
    ("map_mover_overlaps", "the remapping function is part of the region"),
    ("map_null_regex", "regex was empty"),
    ("map_region_not_found", "map region not found"),
    ("map_region_too_small", "map region too small"),
    ("map_see_errno", "see errno"),
    ("map_see_errno_madvise_tmem_failed", "madvise for destination failed"),
    (
        "map_see_errno_madvise_tmem_munmap_nmem_failed",
        "madvise for destination and unmapping of temporary failed",
    ),
    (
        "map_see_errno_madvise_tmem_munmaps_failed",
        "madvise for destination and unmappings failed",
    ),
    (
        "map_see_errno_madvise_tmem_munmap_tmem_failed",
        "madvise for destination and unmapping of destination failed",
    ),
    ("map_see_errno_mmap_tmem_failed", "mapping of destination failed"),
    (
        "map_see_errno_mmap_tmem_munmap_nmem_failed",
        "mapping of destination and unmapping of temporary failed",
    ),
    ("map_see_errno_mprotect_failed", "mprotect failed"),
    (
        "map_see_errno_mprotect_munmap_nmem_failed",
        "mprotect and unmapping of temporary failed",
    ),
    ("map_see_errno_mprotect_munmaps_failed", "mprotect and unmappings failed"),
    (
        "map_see_errno_mprotect_munmap_tmem_failed",
        "mprotect and unmapping of destination failed",
    ),
    ("map_see_errno_munmap_nmem_failed", "unmapping of temporary failed"),
    (
        "map_unsupported_platform",
        "mapping to large pages is not supported on this platform",
    ),
    ("map_open_exe_failed", "opening executable file failed"),
    (
        "map_see_errno_seek_exe_sheaders_failed",
        "seeking to executable file section headers failed",
    ),
    ("map_read_exe_header_failed", "reading executable file header failed"),
    (
        "map_read_exe_sheaders_failed",
        "reading executable file section headers failed",
    ),
    (
        "map_see_errno_seek_exe_string_table_failed",
        "seeking to executable file string table failed",
    ),
    (
        "map_read_exe_string_table_failed",
        "reading executable file string table failed",
    ),
    (
        "map_not_enough_explicit_hugepages_are_allocated",
        "not enough explicit hugepages are available",
    ),
];

impl MapStatus {
    pub const ALL: [MapStatus; 32] = [
        MapStatus::Ok,
        MapStatus::ExePathReadFailed,
        MapStatus::FailedToOpenThpFile,
        MapStatus::InvalidRegex,
        MapStatus::InvalidRegionAddress,
        MapStatus::MalformedThpFile,
        MapStatus::MalformedMapsFile,
        MapStatus::MapsOpenFailed,
        MapStatus::MoverOverlaps,
        MapStatus::NullRegex,
        MapStatus::RegionNotFound,
        MapStatus::RegionTooSmall,
        MapStatus::SeeErrno,
        MapStatus::MadviseFailed,
        MapStatus::MadviseScratchUnmapFailed,
        MapStatus::MadviseUnmapsFailed,
        MapStatus::MadviseDestinationUnmapFailed,
        MapStatus::RemapFailed,
        MapStatus::RemapScratchUnmapFailed,
        MapStatus::MprotectFailed,
        MapStatus::MprotectScratchUnmapFailed,
        MapStatus::MprotectUnmapsFailed,
        MapStatus::MprotectDestinationUnmapFailed,
        MapStatus::ScratchUnmapFailed,
        MapStatus::UnsupportedPlatform,
        MapStatus::OpenExeFailed,
        MapStatus::SeekExeSectionHeadersFailed,
        MapStatus::ReadExeHeaderFailed,
        MapStatus::ReadExeSectionHeadersFailed,
        MapStatus::SeekExeStringTableFailed,
        MapStatus::ReadExeStringTableFailed,
        MapStatus::NotEnoughExplicitHugePages,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_ok(self) -> bool {
        self == MapStatus::Ok
    }

    /// Symbolic name, e.g. `map_region_not_found`.
    pub fn name(self) -> &'static str {
        STATUS_TEXT[self as usize].0
    }

    /// Human-readable sentence.
    pub fn description(self) -> &'static str {
        STATUS_TEXT[self as usize].1
    }
}

impl TryFrom<i32> for MapStatus {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| MapStatus::ALL.get(idx).copied())
            .ok_or(code)
    }
}

impl fmt::Display for MapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Renders `status` as its symbolic name, or as a sentence when `verbose`.
pub fn map_status_str(status: MapStatus, verbose: bool) -> &'static str {
    if verbose {
        status.description()
    } else {
        status.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_status_has_both_strings() {
        for status in MapStatus::ALL {
            assert!(!map_status_str(status, false).is_empty(), "{status:?}");
            assert!(!map_status_str(status, true).is_empty(), "{status:?}");
            assert!(status.name().starts_with("map_"), "{status:?}");
        }
    }

    #[test]
    fn codes_match_table_position() {
        for (idx, status) in MapStatus::ALL.iter().enumerate() {
            assert_eq!(status.code() as usize, idx);
            assert_eq!(MapStatus::try_from(status.code()), Ok(*status));
        }
        assert_eq!(MapStatus::try_from(-1), Err(-1));
        assert_eq!(MapStatus::try_from(32), Err(32));
    }

    #[test]
    fn names_are_unique() {
        let names: HashSet<_> = MapStatus::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(names.len(), MapStatus::ALL.len());
    }

    #[test]
    fn known_strings() {
        assert_eq!(map_status_str(MapStatus::Ok, false), "map_ok");
        assert_eq!(map_status_str(MapStatus::Ok, true), "ok");
        assert!(MapStatus::Ok.is_ok());
        assert!(MapStatus::ALL[1..].iter().all(|s| !s.is_ok()));
        assert_eq!(
            map_status_str(MapStatus::MoverOverlaps, true),
            "the remapping function is part of the region"
        );
        assert_eq!(
            MapStatus::RegionNotFound.to_string(),
            "map region not found"
        );
    }
}
