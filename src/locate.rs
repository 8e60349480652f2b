//! Region discovery: where the code to move lives right now.

use crate::arith::large_pages_for;
use crate::budget::HugePageBudget;
use crate::config::{Config, PageMode};
use crate::elf::find_text_section;
use crate::error::MapError;
use crate::maps::read_maps;
use crate::range::MemoryRange;
use crate::rt::{self, LoadedObject};
use log::{debug, warn};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

pub struct RegionLocator<'a> {
    config: &'a Config,
    budget: &'a HugePageBudget,
}

impl<'a> RegionLocator<'a> {
    pub fn new(config: &'a Config, budget: &'a HugePageBudget) -> Self {
        Self { config, budget }
    }

    /// Run-time address of the main program's `.text` section.
    pub fn main_text_start(&self) -> Result<usize, MapError> {
        let objects = rt::loaded_objects();
        let main = objects
            .iter()
            .find(|o| o.is_main_program())
            .or_else(|| objects.first())
            .ok_or(MapError::RegionNotFound)?;
        let text = find_text_section(&self.config.exe_path)?;
        Ok(main.base.wrapping_add(text.sh_addr as usize))
    }

    fn resolve_exe(&self) -> Result<PathBuf, MapError> {
        let exe_path = &self.config.exe_path;
        fs::read_link(exe_path).map_err(|source| MapError::ExePathRead {
            path: exe_path.clone(),
            source,
        })
    }

    /// Finds the main program's code, starting at its `.text` section and
    /// running to the end of the mapping that holds it.
    pub fn find_static_code(&self) -> Result<MemoryRange, MapError> {
        let exe = self.resolve_exe()?;
        let code_start = self.main_text_start()?;
        self.scan_static_code(&exe, code_start)
    }

    /// Like [`find_static_code`](Self::find_static_code) with the code start
    /// supplied by the caller.
    pub fn find_static_code_at(&self, code_start: usize) -> Result<MemoryRange, MapError> {
        let exe = self.resolve_exe()?;
        self.scan_static_code(&exe, code_start)
    }

    fn scan_static_code(&self, exe: &Path, code_start: usize) -> Result<MemoryRange, MapError> {
        let entry = read_maps(&self.config.maps_path)?
            .into_iter()
            .find(|e| {
                e.is_text_candidate()
                    && e.pathname.as_deref().map(Path::new) == Some(exe)
                    && e.contains(code_start)
            })
            .ok_or(MapError::RegionNotFound)?;

        let range = MemoryRange::new(code_start, entry.end);
        debug!("static code of {} at {range}", exe.display());
        self.reserve(range)?;
        Ok(range)
    }

    /// Finds the `.text` section of the first loaded object whose name
    /// matches `pattern`. The main program has an empty name.
    ///
    /// A matching object whose image can't be read, or that doesn't fit in
    /// the explicit huge page budget, is skipped. If nothing fits, the last
    /// such error is returned.
    pub fn find_dso(&self, pattern: &str) -> Result<MemoryRange, MapError> {
        if pattern.is_empty() {
            return Err(MapError::NullRegex);
        }
        let regex = Regex::new(pattern)?;

        let mut last_err = None;
        for object in rt::loaded_objects() {
            if !regex.is_match(&object.name) {
                continue;
            }
            match self.text_of(&object).and_then(|range| {
                self.reserve(range)?;
                Ok(range)
            }) {
                Ok(range) => {
                    debug!("{:?} text at {range}", object.name);
                    return Ok(range);
                }
                Err(e) => {
                    warn!("skipping {:?}: {e}", object.name);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(MapError::RegionNotFound))
    }

    fn image_path(&self, object: &LoadedObject) -> PathBuf {
        if object.is_main_program() {
            self.config.exe_path.clone()
        } else {
            PathBuf::from(&object.name)
        }
    }

    fn text_of(&self, object: &LoadedObject) -> Result<MemoryRange, MapError> {
        let text = find_text_section(&self.image_path(object))?;
        let from = object.base.wrapping_add(text.sh_addr as usize);
        Ok(MemoryRange::new(from, from.wrapping_add(text.sh_size as usize)))
    }

    /// Draws the pages `range` will need from the explicit pool.
    fn reserve(&self, range: MemoryRange) -> Result<(), MapError> {
        if self.config.mode != PageMode::Explicit {
            return Ok(());
        }
        let needed = large_pages_for(range.len());
        self.budget
            .try_reserve(needed)
            .map_err(|available| MapError::NotEnoughExplicitHugePages { needed, available })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::MapStatus;
    use claims::{assert_matches, assert_ok};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn own_exe() -> PathBuf {
        fs::read_link("/proc/self/exe").unwrap()
    }

    fn maps_fixture(lines: &[String]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn finds_own_static_code() {
        let config = Config::default();
        let budget = HugePageBudget::default();
        let locator = RegionLocator::new(&config, &budget);
        let range = assert_ok!(locator.find_static_code());
        assert_eq!(range.from, assert_ok!(locator.main_text_start()));
        assert!(range.from < range.to);
    }

    #[test]
    fn static_code_starts_at_anchor_not_mapping() {
        let exe = own_exe();
        let maps = maps_fixture(&[
            "00400000-00401000 r--p 00000000 08:02 77 /bin/other".to_string(),
            format!("00600000-00800000 r-xp 00000000 08:02 77 {}", exe.display()),
            format!("00800000-00a00000 r-xp 00200000 08:02 77 {}", exe.display()),
        ]);
        let config = Config::default().with_maps_path(maps.path());
        let budget = HugePageBudget::default();
        let locator = RegionLocator::new(&config, &budget);
        assert_eq!(
            locator.find_static_code_at(0x80_1234).unwrap(),
            MemoryRange::new(0x80_1234, 0xa0_0000)
        );
    }

    #[test]
    fn static_code_needs_text_perms_and_own_path() {
        let exe = own_exe();
        let maps = maps_fixture(&[
            format!("00600000-00800000 rwxp 00000000 08:02 77 {}", exe.display()),
            "00800000-00a00000 r-xp 00000000 08:02 77 /bin/other".to_string(),
            format!("00a00000-00c00000 r-xp 00000000 00:00 0 {}", exe.display()),
        ]);
        let config = Config::default().with_maps_path(maps.path());
        let budget = HugePageBudget::default();
        let locator = RegionLocator::new(&config, &budget);
        for anchor in [0x60_1000, 0x80_1000, 0xa0_1000, 0xd0_0000] {
            assert_matches!(
                locator.find_static_code_at(anchor),
                Err(MapError::RegionNotFound)
            );
        }
    }

    #[test]
    fn static_code_reports_bad_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let budget = HugePageBudget::default();

        let config = Config::default().with_exe_path(dir.path().join("no-such-link"));
        let locator = RegionLocator::new(&config, &budget);
        assert_matches!(
            locator.find_static_code_at(0x1000),
            Err(MapError::ExePathRead { .. })
        );
        let result = locator.find_static_code();
        assert_matches!(&result, Err(MapError::ExePathRead { .. }));
        assert_eq!(MapStatus::from(&result), MapStatus::ExePathReadFailed);

        let config = Config::default().with_maps_path(dir.path().join("no-such-maps"));
        assert_matches!(
            RegionLocator::new(&config, &budget).find_static_code_at(0x1000),
            Err(MapError::MapsOpen { .. })
        );

        let maps = maps_fixture(&["00400000-00401000 r-xp".to_string()]);
        let config = Config::default().with_maps_path(maps.path());
        assert_matches!(
            RegionLocator::new(&config, &budget).find_static_code_at(0x1000),
            Err(MapError::MalformedMapsLine { .. })
        );
    }

    #[test]
    fn explicit_mode_charges_budget() {
        let exe = own_exe();
        let maps = maps_fixture(&[format!(
            "00400000-00c00000 r-xp 00000000 08:02 77 {}",
            exe.display()
        )]);
        let config = Config::default()
            .with_mode(PageMode::Explicit)
            .with_maps_path(maps.path());

        // 0x401000..0xc00000 rounds up to four large pages.
        let budget = HugePageBudget::new(3);
        let locator = RegionLocator::new(&config, &budget);
        assert_matches!(
            locator.find_static_code_at(0x40_1000),
            Err(MapError::NotEnoughExplicitHugePages { needed: 4, available: 3 })
        );
        assert_eq!(budget.available(), 3);

        let budget = HugePageBudget::new(5);
        let locator = RegionLocator::new(&config, &budget);
        assert_ok!(locator.find_static_code_at(0x40_1000));
        assert_eq!(budget.available(), 1);
    }

    #[test]
    fn dso_pattern_errors() {
        let config = Config::default();
        let budget = HugePageBudget::default();
        let locator = RegionLocator::new(&config, &budget);
        assert_matches!(locator.find_dso(""), Err(MapError::NullRegex));
        assert_matches!(locator.find_dso("(unclosed"), Err(MapError::InvalidRegex(_)));
        assert_matches!(
            locator.find_dso("nonexistent-lib-xyz"),
            Err(MapError::RegionNotFound)
        );
    }

    #[test]
    fn empty_pattern_match_finds_main_program() {
        let config = Config::default();
        let budget = HugePageBudget::default();
        let locator = RegionLocator::new(&config, &budget);
        // `^$` only matches the main program's empty name.
        let range = match locator.find_dso("^$") {
            Ok(range) => range,
            // No loader entry with an empty name on this libc.
            Err(MapError::RegionNotFound) => return,
            Err(e) => panic!("{e}"),
        };
        assert_eq!(range.from, assert_ok!(locator.main_text_start()));
        assert!(!range.is_empty());
    }

    #[cfg(target_env = "gnu")]
    #[test]
    fn finds_libc_text() {
        let config = Config::default();
        let budget = HugePageBudget::default();
        let range = assert_ok!(RegionLocator::new(&config, &budget).find_dso(r"libc\.so"));
        assert!(range.from > 0);
        assert!(!range.is_empty());
    }
}
