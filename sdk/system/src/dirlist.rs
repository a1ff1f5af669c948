//! Drive and directory listings for the module browser.

use std::fs;
use std::path::Path;

use log::debug;
use modsurfer_hw::{Exec, HardwareSession};

use crate::error::{Error, Result};
use crate::host::{Dos, NodeKind};

/// Name of the synthetic entry leading to the parent directory.
pub const PARENT: &str = "/";

const MOD_PREFIX: &str = "MOD.";
const MOD_SUFFIX: &str = ".MOD";

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKind {
    Dir,
    /// A Protracker module, by name.
    Module,
    File,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub kind: EntryKind,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirList {
    entries: Vec<DirEntry>,
}

impl DirList {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: EntryKind, name: impl Into<String>) {
        self.entries.push(DirEntry { kind, name: name.into() });
    }

    /// Sort by name, leaving the first `fixed` entries in place.
    fn sort_from(&mut self, fixed: usize) {
        if let Some(rest) = self.entries.get_mut(fixed..) {
            rest.sort_by(|a, b| a.name.cmp(&b.name));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DirEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}

/// A directory entry as the filesystem reports it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Somewhere to read directories from.
pub trait FsSource {
    /// Entries of `path`, excluding `.` and `..`.
    fn read_dir(&mut self, path: &str) -> Result<Vec<RawEntry>>;
}

/// The host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFs;

impl FsSource for StdFs {
    fn read_dir(&mut self, path: &str) -> Result<Vec<RawEntry>> {
        let dir = fs::read_dir(Path::new(path)).map_err(|e| {
            debug!("read_dir({}) failed: {}", path, e);
            Error::InvalidPath(path.to_string())
        })?;

        let mut entries = Vec::new();
        for entry in dir {
            let entry = entry?;
            let is_dir = entry.file_type()?.is_dir();
            entries.push(RawEntry { name: entry.file_name().to_string_lossy().into_owned(), is_dir });
        }
        Ok(entries)
    }
}

/// Whether a file name marks a music module (`*.MOD` or `MOD.*`).
pub fn is_module_name(upper: &str) -> bool {
    upper.starts_with(MOD_PREFIX) || upper.ends_with(MOD_SUFFIX)
}

/// Mounted drives: device nodes with a handler task running.
///
/// The device list is only stable while task switching is off, so it is
/// walked under the session's forbid.
pub fn list_drives<E, D>(session: &mut HardwareSession, exec: &mut E, dos: &D) -> DirList
where
    E: Exec + ?Sized,
    D: Dos + ?Sized,
{
    let nodes = session.forbidden(exec, |_| dos.device_nodes());

    let mut drives = DirList::new();
    for node in nodes.into_iter().filter(|n| n.kind == NodeKind::Device && n.has_task) {
        drives.push(EntryKind::Dir, node.name);
    }
    drives.sort_from(0);
    drives
}

/// Contents of `path`, names uppercased and sorted, behind a leading
/// [`PARENT`] entry.
pub fn list_path<F: FsSource + ?Sized>(fs: &mut F, path: &str) -> Result<DirList> {
    if path.is_empty() {
        return Err(Error::InvalidPath(String::new()));
    }

    let mut entries = DirList::new();
    entries.push(EntryKind::Dir, PARENT);

    for raw in fs.read_dir(path)? {
        let name = raw.name.to_uppercase();
        let kind = if raw.is_dir {
            EntryKind::Dir
        } else if is_module_name(&name) {
            EntryKind::Module
        } else {
            EntryKind::File
        };
        entries.push(kind, name);
    }

    entries.sort_from(1);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedFs(Vec<RawEntry>);

    impl FsSource for FixedFs {
        fn read_dir(&mut self, _path: &str) -> Result<Vec<RawEntry>> {
            Ok(self.0.clone())
        }
    }

    fn raw(name: &str, is_dir: bool) -> RawEntry {
        RawEntry { name: name.to_string(), is_dir }
    }

    #[test]
    fn module_names_match_either_end() {
        assert!(is_module_name("TRACK.MOD"));
        assert!(is_module_name("MOD.JUMPER"));
        assert!(!is_module_name("MODULE.TXT"));
        assert!(!is_module_name("TRACK.MODX"));
    }

    #[test]
    fn parent_stays_first_even_if_it_would_sort_later() {
        let mut fs = FixedFs(vec![raw("-intro-", false), raw("!readme", false)]);
        let list = list_path(&mut fs, "DH0:").unwrap();
        assert_eq!(list.names(), ["/", "!README", "-INTRO-"]);
    }

    #[test]
    fn empty_path_is_rejected() {
        let mut fs = FixedFs(Vec::new());
        assert!(matches!(list_path(&mut fs, ""), Err(Error::InvalidPath(p)) if p.is_empty()));
    }

    #[test]
    fn directory_named_like_a_module_is_a_directory() {
        let mut fs = FixedFs(vec![raw("mod.collection", true)]);
        let list = list_path(&mut fs, "DH0:").unwrap();
        assert_eq!(list.get(1).map(|e| e.kind), Some(EntryKind::Dir));
    }
}
