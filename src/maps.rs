//! Parser for the process memory-mapping table (`/proc/<pid>/maps`).
//!
//! ```text
//! address           perms offset  dev   inode       pathname
//! 00400000-00452000 r-xp 00000000 08:02 173521      /usr/bin/dbus-daemon
//! ```

use crate::error::MapError;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Perms {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    pub private: bool,
}

impl Perms {
    /// `r-xp`, the only permission a text candidate may have.
    pub const TEXT: Perms = Perms {
        read: true,
        write: false,
        execute: true,
        private: true,
    };

    fn parse(field: &str) -> Option<Self> {
        let b = field.as_bytes();
        if b.len() != 4 {
            return None;
        }
        let flag = |c: u8, set: u8| match c {
            b'-' => Some(false),
            c if c == set => Some(true),
            _ => None,
        };
        Some(Perms {
            read: flag(b[0], b'r')?,
            write: flag(b[1], b'w')?,
            execute: flag(b[2], b'x')?,
            private: match b[3] {
                b'p' => true,
                b's' => false,
                _ => return None,
            },
        })
    }

    pub fn render(self) -> String {
        let mut out = String::with_capacity(4);
        out.push(if self.read { 'r' } else { '-' });
        out.push(if self.write { 'w' } else { '-' });
        out.push(if self.execute { 'x' } else { '-' });
        out.push(if self.private { 'p' } else { 's' });
        out
    }
}

impl fmt::Display for Perms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn next_field<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let s: &'a str = rest;
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    let (tok, tail) = s.split_at(end);
    *rest = tail.trim_start();
    (!tok.is_empty()).then_some(tok)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapsEntry {
    pub start: usize,
    pub end: usize,
    pub perms: Perms,
    pub offset: u64,
    pub dev: String,
    pub inode: u64,
    /// Absent for anonymous mappings.
    pub pathname: Option<String>,
}

impl MapsEntry {
    pub fn parse(line: &str) -> Result<Self, MapError> {
        Self::parse_fields(line).ok_or_else(|| MapError::MalformedMapsLine {
            line: line.to_string(),
        })
    }

    fn parse_fields(line: &str) -> Option<Self> {
        let mut rest = line.trim_start();
        let (start, end) = next_field(&mut rest)?.split_once('-')?;
        let perms = next_field(&mut rest)?;
        let offset = next_field(&mut rest)?;
        let dev = next_field(&mut rest)?;
        let inode = next_field(&mut rest)?;

        let start = usize::from_str_radix(start, 16).ok()?;
        let end = usize::from_str_radix(end, 16).ok()?;
        if start > end {
            return None;
        }
        let dev = dev.contains(':').then(|| dev.to_string())?;
        let entry = MapsEntry {
            start,
            end,
            perms: Perms::parse(perms)?,
            offset: u64::from_str_radix(offset, 16).ok()?,
            dev,
            inode: inode.parse().ok()?,
            pathname: None,
        };

        let pathname = rest.trim_end();
        Some(MapsEntry {
            pathname: (!pathname.is_empty()).then(|| pathname.to_string()),
            ..entry
        })
    }

    pub fn contains(&self, addr: usize) -> bool {
        self.start <= addr && addr < self.end
    }

    /// File-backed and mapped exactly `r-xp`.
    pub fn is_text_candidate(&self) -> bool {
        self.inode != 0 && self.perms == Perms::TEXT
    }
}

/// Reads and parses every line of the mapping table at `path`.
///
/// The table is re-read on every call; mappings change underneath us.
pub fn read_maps(path: &Path) -> Result<Vec<MapsEntry>, MapError> {
    let open_err = |source| MapError::MapsOpen {
        path: path.to_path_buf(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(open_err)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(open_err)?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(MapsEntry::parse(&line)?);
    }
    Ok(entries)
}
