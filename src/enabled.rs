//! Whether the kernel will give us large pages at all.

use crate::budget::HugePageBudget;
use crate::config::{Config, PageMode};
use crate::error::MapError;
use log::{info, warn};
use std::fs;
use std::path::Path;

/// Transparent huge page policy, as selected in the sysfs `enabled` file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThpPolicy {
    Always,
    Madvise,
    Never,
    /// None of the three tokens is bracketed.
    Unselected,
}

impl ThpPolicy {
    pub fn allows_large_pages(self) -> bool {
        matches!(self, ThpPolicy::Always | ThpPolicy::Madvise)
    }
}

fn is_selected(token: &str) -> bool {
    token.len() >= 2 && token.starts_with('[') && token.ends_with(']')
}

/// Parses `always madvise never` with exactly one token bracketed. Returns
/// `None` if there are fewer than three tokens.
pub fn parse_thp_policy(contents: &str) -> Option<ThpPolicy> {
    let mut tokens = contents.split_whitespace();
    let always = tokens.next()?;
    let madvise = tokens.next()?;
    let never = tokens.next()?;

    let policy = if is_selected(always) {
        ThpPolicy::Always
    } else if is_selected(madvise) {
        ThpPolicy::Madvise
    } else if is_selected(never) {
        ThpPolicy::Never
    } else {
        ThpPolicy::Unselected
    };
    Some(policy)
}

fn read_enablement_file(path: &Path) -> Result<String, MapError> {
    fs::read_to_string(path).map_err(|source| MapError::EnablementFileOpen {
        path: path.to_path_buf(),
        source,
    })
}

pub fn transparent_huge_pages_enabled(path: &Path) -> Result<bool, MapError> {
    let contents = read_enablement_file(path)?;
    let policy =
        parse_thp_policy(&contents).ok_or_else(|| MapError::MalformedEnablementFile {
            path: path.to_path_buf(),
            contents: contents.clone(),
        })?;
    Ok(policy.allows_large_pages())
}

/// Reads the number of reserved explicit huge pages.
pub fn explicit_huge_pages_reserved(path: &Path) -> Result<i64, MapError> {
    let contents = read_enablement_file(path)?;
    contents
        .split_whitespace()
        .next()
        .and_then(|tok| tok.parse::<i64>().ok())
        .ok_or_else(|| MapError::MalformedEnablementFile {
            path: path.to_path_buf(),
            contents: contents.clone(),
        })
}

/// Checks the enablement file for `config.mode`. In explicit mode this also
/// fills `budget` with the reserved page count.
///
/// An empty explicit pool reports disabled.
pub fn is_large_pages_enabled(config: &Config, budget: &HugePageBudget) -> Result<bool, MapError> {
    match config.mode {
        PageMode::Transparent => transparent_huge_pages_enabled(&config.thp_enabled_path),
        PageMode::Explicit => {
            info!("using explicit hugepages");
            let reserved = explicit_huge_pages_reserved(&config.nr_hugepages_path)?;
            let available = usize::try_from(reserved).unwrap_or(0);
            budget.reset(available);
            if available == 0 {
                warn!(
                    "no explicit hugepages are allocated ({} reports {reserved})",
                    config.nr_hugepages_path.display()
                );
                return Ok(false);
            }
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_matches, assert_ok_eq};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixture(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_each_selection() {
        assert_eq!(parse_thp_policy("[always] madvise never\n"), Some(ThpPolicy::Always));
        assert_eq!(parse_thp_policy("always [madvise] never\n"), Some(ThpPolicy::Madvise));
        assert_eq!(parse_thp_policy("always madvise [never]\n"), Some(ThpPolicy::Never));
        assert_eq!(parse_thp_policy("always madvise never"), Some(ThpPolicy::Unselected));
        assert_eq!(parse_thp_policy("always madvise"), None);
        assert_eq!(parse_thp_policy(""), None);
    }

    #[test]
    fn transparent_mode_reads_policy() {
        let always = fixture("[always] madvise never\n");
        let never = fixture("always madvise [never]\n");
        assert_ok_eq!(transparent_huge_pages_enabled(always.path()), true);
        assert_ok_eq!(transparent_huge_pages_enabled(never.path()), false);
    }

    #[test]
    fn malformed_and_missing_files() {
        let short = fixture("always\n");
        assert_matches!(
            transparent_huge_pages_enabled(short.path()),
            Err(MapError::MalformedEnablementFile { .. })
        );
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("enabled");
        assert_matches!(
            transparent_huge_pages_enabled(&missing),
            Err(MapError::EnablementFileOpen { .. })
        );
    }

    #[test]
    fn explicit_mode_fills_budget() {
        let nr = fixture("12\n");
        let config = Config::default()
            .with_mode(PageMode::Explicit)
            .with_nr_hugepages_path(nr.path());
        let budget = HugePageBudget::default();
        assert_ok_eq!(is_large_pages_enabled(&config, &budget), true);
        assert_eq!(budget.available(), 12);
    }

    #[test]
    fn explicit_mode_empty_pool_is_disabled() {
        for contents in ["0\n", "-3\n"] {
            let nr = fixture(contents);
            let config = Config::default()
                .with_mode(PageMode::Explicit)
                .with_nr_hugepages_path(nr.path());
            let budget = HugePageBudget::new(7);
            assert_ok_eq!(is_large_pages_enabled(&config, &budget), false);
            assert_eq!(budget.available(), 0);
        }
    }

    #[test]
    fn explicit_mode_rejects_garbage() {
        let nr = fixture("lots\n");
        assert_err!(explicit_huge_pages_reserved(nr.path()));
    }
}
