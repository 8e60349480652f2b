use crate::consts::{
    NR_HUGEPAGES_PATH, SELF_EXE_PATH, SELF_MAPS_PATH, THP_ENABLED_PATH, USE_EXPLICIT_HP_ENVS,
};
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

/// How the remapped range gets its large-page backing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PageMode {
    /// Plain anonymous mapping advised with `MADV_HUGEPAGE`.
    #[default]
    Transparent,
    /// `MAP_HUGETLB` mapping drawn from the reserved hugetlbfs pool.
    Explicit,
}

/// Mode selection and the kernel files the pipeline consumes.
///
/// Every path is overridable so that fixtures can stand in for the real
/// procfs and sysfs entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub mode: PageMode,
    pub thp_enabled_path: PathBuf,
    pub nr_hugepages_path: PathBuf,
    pub maps_path: PathBuf,
    pub exe_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: PageMode::default(),
            thp_enabled_path: PathBuf::from(THP_ENABLED_PATH),
            nr_hugepages_path: PathBuf::from(NR_HUGEPAGES_PATH),
            maps_path: PathBuf::from(SELF_MAPS_PATH),
            exe_path: PathBuf::from(SELF_EXE_PATH),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|name| env::var_os(name))
    }

    fn from_vars(var: impl Fn(&str) -> Option<OsString>) -> Self {
        let mode = if USE_EXPLICIT_HP_ENVS.iter().any(|name| var(name).is_some()) {
            PageMode::Explicit
        } else {
            PageMode::Transparent
        };
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: PageMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_thp_enabled_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.thp_enabled_path = path.into();
        self
    }

    pub fn with_nr_hugepages_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.nr_hugepages_path = path.into();
        self
    }

    pub fn with_maps_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.maps_path = path.into();
        self
    }

    pub fn with_exe_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.exe_path = path.into();
        self
    }
}
