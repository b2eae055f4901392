//! Output cleaning.

use super::error::StageError;
use crate::log;
use std::{fs, path::Path};

/// Remove everything inside `dir`, keeping the directory itself.
///
/// Returns the number of removed entries. A missing directory is already
/// clean.
pub fn clean_dir(dir: &Path) -> Result<usize, StageError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(StageError::fs(dir)(e)),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry.map_err(StageError::fs(dir))?.path();
        let result = if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            // Removed concurrently by an overlapping run
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StageError::fs(&path)(e)),
        }
    }

    Ok(removed)
}

/// Clean every target, in order.
pub fn clean_all(targets: &[impl AsRef<Path>], root: &Path) -> Result<(), StageError> {
    for target in targets {
        let target = target.as_ref();
        let removed = clean_dir(target)?;
        if removed > 0 {
            let rel = target.strip_prefix(root).unwrap_or(target);
            log!("clean"; "cleaned up {}/ ({removed} entries)", rel.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_clean_dir_keeps_directory() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("dist");
        fs::create_dir_all(out.join("css/nested")).unwrap();
        fs::write(out.join("css/nested/old.css"), "x").unwrap();
        fs::write(out.join("index.html"), "x").unwrap();

        assert_eq!(clean_dir(&out).unwrap(), 2);
        assert!(out.is_dir());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn test_clean_missing_dir() {
        let dir = tempdir().unwrap();
        assert_eq!(clean_dir(&dir.path().join("nope")).unwrap(), 0);
    }

    #[test]
    fn test_clean_all() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        for d in [&a, &b] {
            fs::create_dir_all(d).unwrap();
            fs::write(d.join("f"), "x").unwrap();
        }

        clean_all(&[&a, &b], dir.path()).unwrap();
        assert!(!a.join("f").exists());
        assert!(!b.join("f").exists());
    }
}
