//! Revision manifest: unminified output name → content-hashed name.
//!
//! ```json
//! {
//!   "css/app.css": "css/app-3f9c0d12ab.min.css",
//!   "js/app.js": "js/app-77e01b5c9d.min.js"
//! }
//! ```
//!
//! Names are relative to the manifest's directory and use forward slashes.
//! The file is merged on every save, never replaced, so groups hashing in
//! separate runs (e.g. watch cycles) keep each other's entries.

use super::error::StageError;
use crate::log;
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

pub type Entries = BTreeMap<String, String>;

/// Manifest shared by the Stages of one Task run.
#[derive(Debug, Default)]
pub struct Manifest {
    /// `None` when the manifest is disabled.
    path: Option<PathBuf>,
    entries: Mutex<Entries>,
}

impl Manifest {
    /// A manifest that records nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Open the manifest at `path`, starting from the entries on disk.
    pub fn load(path: &Path) -> Result<Self, StageError> {
        Ok(Self {
            path: Some(path.to_path_buf()),
            entries: Mutex::new(read_entries(path)?),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Record `original → hashed` (absolute output paths).
    ///
    /// Recording the same mapping twice leaves a single entry.
    pub fn record(&self, original: &Path, hashed: &Path) {
        let Some(dir) = self.path.as_deref().and_then(Path::parent) else {
            return;
        };
        self.entries
            .lock()
            .insert(manifest_name(dir, original), manifest_name(dir, hashed));
    }

    /// Copy of the current entries.
    pub fn snapshot(&self) -> Entries {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge recorded entries into the file on disk.
    ///
    /// Entries written by others since [`Manifest::load`] are kept; ours win
    /// on conflicting keys. Afterwards this manifest holds the merged view.
    pub fn save(&self) -> Result<(), StageError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let mut entries = self.entries.lock();
        let mut merged = read_entries(path)?;
        merged.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));

        let json = serde_json::to_string_pretty(&merged).map_err(|e| StageError::Filesystem {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(StageError::fs(parent))?;
        }
        fs::write(path, json + "\n").map_err(StageError::fs(path))?;

        *entries = merged;
        Ok(())
    }
}

/// Read the entries of an existing manifest; missing file means empty.
fn read_entries(path: &Path) -> Result<Entries, StageError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
        Err(e) => return Err(StageError::fs(path)(e)),
    };

    match serde_json::from_str(&content) {
        Ok(entries) => Ok(entries),
        Err(e) => {
            log!("manifest"; "ignoring unreadable {}: {e}", path.display());
            Ok(Entries::new())
        }
    }
}

/// Path relative to the manifest directory, with forward slashes.
fn manifest_name(dir: &Path, path: &Path) -> String {
    path.strip_prefix(dir)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
