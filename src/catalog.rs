use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::CollectorError;

/// A flat index of known file paths, searched by name instead of walking the
/// filesystem for every lookup.
pub trait FileCatalog {
    fn entries(&self) -> &[Utf8PathBuf];

    /// Entries whose file name contains `term`, in catalog order.
    fn search(&self, term: &str) -> Vec<&Utf8PathBuf> {
        self.entries()
            .iter()
            .filter(|path| base_name(path.as_str()).contains(term))
            .collect()
    }

    /// Entries grouped by file name. Each group keeps catalog order.
    fn group_by_name(&self) -> HashMap<&str, Vec<&Utf8PathBuf>> {
        let mut groups: HashMap<&str, Vec<&Utf8PathBuf>> = HashMap::new();
        for path in self.entries() {
            groups.entry(base_name(path.as_str())).or_default().push(path);
        }
        groups
    }
}

/// Every regular file below a root directory, sorted by path.
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    root: Utf8PathBuf,
    entries: Vec<Utf8PathBuf>,
}

impl DirectoryCatalog {
    pub fn scan(root: &Utf8Path) -> Result<Self, CollectorError> {
        if !root.as_std_path().is_dir() {
            return Err(CollectorError::NotFound(root.to_path_buf()));
        }
        let mut entries = Vec::new();
        for path in walk_dir(root.as_std_path())? {
            if !path.is_file() {
                continue;
            }
            match Utf8PathBuf::from_path_buf(path) {
                Ok(path) => entries.push(path),
                Err(path) => debug!("skipping non UTF-8 path {}", path.display()),
            }
        }
        entries.sort();
        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

impl FileCatalog for DirectoryCatalog {
    fn entries(&self) -> &[Utf8PathBuf] {
        &self.entries
    }
}

/// A text file listing one path per line. Blank lines are ignored; listed
/// paths are not checked for existence.
#[derive(Debug, Clone)]
pub struct FlatFileCatalog {
    entries: Vec<Utf8PathBuf>,
}

impl FlatFileCatalog {
    pub fn load(path: &Utf8Path) -> Result<Self, CollectorError> {
        let content = fs::read(path.as_std_path())
            .map_err(|err| CollectorError::Filesystem(format!("read catalog {path}: {err}")))?;
        Ok(Self::from_lines(&String::from_utf8_lossy(&content)))
    }

    pub fn from_lines(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Utf8PathBuf::from)
            .collect();
        Self { entries }
    }
}

impl FileCatalog for FlatFileCatalog {
    fn entries(&self) -> &[Utf8PathBuf] {
        &self.entries
    }
}

/// Opens a FASTA catalog: a directory is scanned, a file is read as a path list.
pub fn open(path: &Utf8Path) -> Result<Box<dyn FileCatalog>, CollectorError> {
    let std_path = path.as_std_path();
    if std_path.is_dir() {
        Ok(Box::new(DirectoryCatalog::scan(path)?))
    } else if std_path.is_file() {
        Ok(Box::new(FlatFileCatalog::load(path)?))
    } else {
        Err(CollectorError::NotFound(path.to_path_buf()))
    }
}

/// Final path component. Both separators are honoured so catalogs written on
/// Windows still resolve.
pub fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, CollectorError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path)
            .map_err(|err| CollectorError::Filesystem(format!("{}: {err}", path.display())))?;
        for entry in entries {
            let entry = entry.map_err(|err| CollectorError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}
