//! Moves a running process's code onto 2MiB pages.
//!
//! Three stages run in order, and any of them may end the run:
//!
//! - [`locate`] finds the range: the program's own text, or the `.text` of a
//!   loaded object matched by name;
//! - [`range::align_and_validate`] shrinks it to whole large pages and
//!   refuses anything that would move the mover;
//! - [`mover`] copies the range out, remaps it on large pages, and copies it
//!   back.
//!
//! Each stage returns a [`MapError`]; [`MapStatus::from`] flattens a result
//! onto the stable status table.

pub mod arith;
pub mod budget;
pub mod config;
pub mod consts;
pub mod elf;
pub mod enabled;
pub mod error;
pub mod locate;
pub mod maps;
pub mod mover;
pub mod range;
pub mod rt;
pub mod status;

pub use budget::HugePageBudget;
pub use config::{Config, PageMode};
pub use error::{MapError, MoveFailure, MoveStep};
pub use range::MemoryRange;
pub use status::{map_status_str, MapStatus};

use consts::BASE_PAGE_SIZE;
use locate::RegionLocator;
use log::info;
use once_cell::sync::Lazy;

/// The pipeline bound to one configuration and one explicit huge page
/// budget.
#[derive(Debug, Default)]
pub struct LargePageMapper {
    config: Config,
    budget: HugePageBudget,
}

impl LargePageMapper {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            budget: HugePageBudget::default(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(Config::from_env())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn budget(&self) -> &HugePageBudget {
        &self.budget
    }

    pub fn locator(&self) -> RegionLocator<'_> {
        RegionLocator::new(&self.config, &self.budget)
    }

    /// Reads the enablement file for the configured mode. In explicit mode
    /// this also refills the budget from the reserved page count.
    pub fn is_enabled(&self) -> Result<bool, MapError> {
        ensure_supported()?;
        enabled::is_large_pages_enabled(&self.config, &self.budget)
    }

    /// Moves the main program's text onto large pages.
    ///
    /// # Safety
    ///
    /// No other thread may run code in the program's text while this runs.
    pub unsafe fn map_static_code(&self) -> Result<MemoryRange, MapError> {
        ensure_supported()?;
        let range = self.locator().find_static_code()?;
        unsafe { self.relocate(range) }
    }

    /// Moves the text of the first loaded object whose name matches
    /// `pattern`.
    ///
    /// # Safety
    ///
    /// No other thread may run code in the matched object while this runs.
    pub unsafe fn map_dso(&self, pattern: &str) -> Result<MemoryRange, MapError> {
        ensure_supported()?;
        let range = self.locator().find_dso(pattern)?;
        unsafe { self.relocate(range) }
    }

    /// Moves `[from, to)` without discovery. Returns the aligned range that
    /// was actually moved.
    ///
    /// # Safety
    ///
    /// The aligned range must be mapped and readable, and nothing may write
    /// to it afterwards: it ends up read-execute only. No other thread may
    /// touch it while this runs.
    pub unsafe fn map_range(&self, from: usize, to: usize) -> Result<MemoryRange, MapError> {
        ensure_supported()?;
        unsafe { self.relocate(MemoryRange::new(from, to)) }
    }

    /// Checks enablement and only then moves the main program's text.
    /// Returns `Ok(None)` without looking for the text when large pages are
    /// disabled.
    ///
    /// # Safety
    ///
    /// As for [`map_static_code`](Self::map_static_code).
    pub unsafe fn map_if_enabled(&self) -> Result<Option<MemoryRange>, MapError> {
        if !self.is_enabled()? {
            info!("large pages are disabled, leaving code where it is");
            return Ok(None);
        }
        unsafe { self.map_static_code() }.map(Some)
    }

    unsafe fn relocate(&self, range: MemoryRange) -> Result<MemoryRange, MapError> {
        let aligned = range::align_and_validate(range, mover::mover_address())?;
        unsafe { mover::move_region_to_large_pages(aligned, self.config.mode) }?;
        info!(
            "moved {aligned} ({} large pages) to large pages",
            aligned.len() / consts::LARGE_PAGE_SIZE
        );
        Ok(aligned)
    }
}

fn ensure_supported() -> Result<(), MapError> {
    match rt::base_page_size() {
        BASE_PAGE_SIZE => Ok(()),
        page_size => Err(MapError::UnsupportedPlatform { page_size }),
    }
}

static MAPPER: Lazy<LargePageMapper> = Lazy::new(LargePageMapper::from_env);

/// The process-wide mapper, configured from the environment on first use.
pub fn process_mapper() -> &'static LargePageMapper {
    &MAPPER
}

pub fn is_large_pages_enabled() -> Result<bool, MapError> {
    MAPPER.is_enabled()
}

/// # Safety
///
/// See [`LargePageMapper::map_static_code`].
pub unsafe fn map_static_code_to_large_pages() -> Result<MemoryRange, MapError> {
    unsafe { MAPPER.map_static_code() }
}

/// # Safety
///
/// See [`LargePageMapper::map_dso`].
pub unsafe fn map_dso_to_large_pages(pattern: &str) -> Result<MemoryRange, MapError> {
    unsafe { MAPPER.map_dso(pattern) }
}

/// # Safety
///
/// See [`LargePageMapper::map_range`].
pub unsafe fn map_static_code_range_to_large_pages(
    from: usize,
    to: usize,
) -> Result<MemoryRange, MapError> {
    unsafe { MAPPER.map_range(from, to) }
}
