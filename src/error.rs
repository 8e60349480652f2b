use crate::status::MapStatus;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The system call step of a move that failed first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveStep {
    /// Anonymous scratch mapping for the copy-out.
    AllocateScratch,
    /// Fixed-address remap of the destination range.
    RemapDestination,
    /// `MADV_HUGEPAGE` on the remapped destination.
    AdviseHugePages,
    /// Dropping write permission on the destination.
    RestoreProtection,
    /// Releasing the scratch mapping.
    ReleaseScratch,
}

impl MoveStep {
    fn describe(self) -> &'static str {
        match self {
            MoveStep::AllocateScratch => "mmap of temporary region",
            MoveStep::RemapDestination => "mmap of destination region",
            MoveStep::AdviseHugePages => "madvise of destination region",
            MoveStep::RestoreProtection => "mprotect of destination region",
            MoveStep::ReleaseScratch => "munmap of temporary region",
        }
    }
}

/// A failed move: which step failed, its errno, and which compensating
/// unmaps failed in turn.
///
/// This is plain data so that the mover can build it without calling out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveFailure {
    pub step: MoveStep,
    pub errno: i32,
    pub destination_unmap_failed: bool,
    pub scratch_unmap_failed: bool,
}

impl MoveFailure {
    pub fn status(&self) -> MapStatus {
        let (dst, scratch) = (self.destination_unmap_failed, self.scratch_unmap_failed);
        match self.step {
            MoveStep::AllocateScratch => MapStatus::SeeErrno,
            MoveStep::RemapDestination if scratch => MapStatus::RemapScratchUnmapFailed,
            MoveStep::RemapDestination => MapStatus::RemapFailed,
            MoveStep::AdviseHugePages => match (dst, scratch) {
                (false, false) => MapStatus::MadviseFailed,
                (false, true) => MapStatus::MadviseScratchUnmapFailed,
                (true, false) => MapStatus::MadviseDestinationUnmapFailed,
                (true, true) => MapStatus::MadviseUnmapsFailed,
            },
            MoveStep::RestoreProtection => match (dst, scratch) {
                (false, false) => MapStatus::MprotectFailed,
                (false, true) => MapStatus::MprotectScratchUnmapFailed,
                (true, false) => MapStatus::MprotectDestinationUnmapFailed,
                (true, true) => MapStatus::MprotectUnmapsFailed,
            },
            MoveStep::ReleaseScratch => MapStatus::ScratchUnmapFailed,
        }
    }
}

impl fmt::Display for MoveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed: {}",
            self.step.describe(),
            io::Error::from_raw_os_error(self.errno)
        )?;
        if self.destination_unmap_failed {
            write!(f, "; unmapping the destination also failed")?;
        }
        if self.scratch_unmap_failed {
            write!(f, "; unmapping the temporary region also failed")?;
        }
        Ok(())
    }
}

impl std::error::Error for MoveFailure {}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("failed to resolve executable path {path:?}: {source}")]
    ExePathRead { path: PathBuf, source: io::Error },
    #[error("failed to open {path:?}: {source}")]
    EnablementFileOpen { path: PathBuf, source: io::Error },
    #[error("malformed enablement file {path:?}: {contents:?}")]
    MalformedEnablementFile { path: PathBuf, contents: String },
    #[error("failed to open maps file {path:?}: {source}")]
    MapsOpen { path: PathBuf, source: io::Error },
    #[error("malformed maps line {line:?}")]
    MalformedMapsLine { line: String },
    #[error("library pattern is empty")]
    NullRegex,
    #[error("invalid library pattern: {0}")]
    InvalidRegex(#[from] regex::Error),
    #[error("failed to open ELF image {path:?}: {source}")]
    OpenExe { path: PathBuf, source: io::Error },
    #[error("failed to read ELF header of {path:?}: {reason}")]
    ReadExeHeader { path: PathBuf, reason: String },
    #[error("failed to seek to section headers of {path:?}: {source}")]
    SeekExeSectionHeaders { path: PathBuf, source: io::Error },
    #[error("failed to read section headers of {path:?}: {reason}")]
    ReadExeSectionHeaders { path: PathBuf, reason: String },
    #[error("failed to seek to section string table of {path:?}: {source}")]
    SeekExeStringTable { path: PathBuf, source: io::Error },
    #[error("failed to read section string table of {path:?}: {reason}")]
    ReadExeStringTable { path: PathBuf, reason: String },
    #[error("text region not found")]
    RegionNotFound,
    #[error("{needed} explicit huge pages needed, {available} available")]
    NotEnoughExplicitHugePages { needed: usize, available: usize },
    #[error("invalid region boundaries 0x{from:x}-0x{to:x}")]
    InvalidRegionAddress { from: usize, to: usize },
    #[error("region 0x{from:x}-0x{to:x} is smaller than one large page")]
    RegionTooSmall { from: usize, to: usize },
    #[error("region 0x{from:x}-0x{to:x} contains the mover at 0x{mover:x}")]
    MoverOverlaps { from: usize, to: usize, mover: usize },
    #[error(transparent)]
    Move(#[from] MoveFailure),
    #[error("large pages are not supported with a base page size of {page_size}")]
    UnsupportedPlatform { page_size: usize },
}

impl MapError {
    pub fn status(&self) -> MapStatus {
        match self {
            MapError::ExePathRead { .. } => MapStatus::ExePathReadFailed,
            MapError::EnablementFileOpen { .. } => MapStatus::FailedToOpenThpFile,
            MapError::MalformedEnablementFile { .. } => MapStatus::MalformedThpFile,
            MapError::MapsOpen { .. } => MapStatus::MapsOpenFailed,
            MapError::MalformedMapsLine { .. } => MapStatus::MalformedMapsFile,
            MapError::NullRegex => MapStatus::NullRegex,
            MapError::InvalidRegex(_) => MapStatus::InvalidRegex,
            MapError::OpenExe { .. } => MapStatus::OpenExeFailed,
            MapError::ReadExeHeader { .. } => MapStatus::ReadExeHeaderFailed,
            MapError::SeekExeSectionHeaders { .. } => MapStatus::SeekExeSectionHeadersFailed,
            MapError::ReadExeSectionHeaders { .. } => MapStatus::ReadExeSectionHeadersFailed,
            MapError::SeekExeStringTable { .. } => MapStatus::SeekExeStringTableFailed,
            MapError::ReadExeStringTable { .. } => MapStatus::ReadExeStringTableFailed,
            MapError::RegionNotFound => MapStatus::RegionNotFound,
            MapError::NotEnoughExplicitHugePages { .. } => MapStatus::NotEnoughExplicitHugePages,
            MapError::InvalidRegionAddress { .. } => MapStatus::InvalidRegionAddress,
            MapError::RegionTooSmall { .. } => MapStatus::RegionTooSmall,
            MapError::MoverOverlaps { .. } => MapStatus::MoverOverlaps,
            MapError::Move(failure) => failure.status(),
            MapError::UnsupportedPlatform { .. } => MapStatus::UnsupportedPlatform,
        }
    }
}

impl<T> From<&Result<T, MapError>> for MapStatus {
    fn from(result: &Result<T, MapError>) -> Self {
        match result {
            Ok(_) => MapStatus::Ok,
            Err(e) => e.status(),
        }
    }
}
