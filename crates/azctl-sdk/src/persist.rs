//! Atomic file persistence
//!
//! Several azctl processes can run concurrently against the same state
//! files, so every write goes to a temporary sibling and is renamed into
//! place. A concurrent reader sees either the old contents or the new,
//! never a partial file, and a crash mid-write leaves the original intact.

use std::path::{Path, PathBuf};
use tokio::fs;

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".tmp-{}", std::process::id()));
    path.with_file_name(name)
}

/// Write `contents` to `path` via a temp file + rename.
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let tmp = temp_sibling(path);
    fs::write(&tmp, contents).await?;
    match fs::rename(&tmp, path).await {
        Ok(()) => Ok(()),
        Err(err) => {
            // Leave no temp file behind on a failed rename.
            let _ = fs::remove_file(&tmp).await;
            Err(err)
        }
    }
}
