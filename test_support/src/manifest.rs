//! Helpers for writing manifest fixtures to disk.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

/// Default manifest file name.
pub const MANIFEST_FILE: &str = "kasane.yml";

/// Write `yaml` as `kasane.yml` inside a fresh temporary directory.
///
/// Returns the directory guard and the manifest path.
pub fn write_manifest(yaml: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join(MANIFEST_FILE);
    fs::write(&path, yaml).expect("write manifest");
    (dir, path)
}
