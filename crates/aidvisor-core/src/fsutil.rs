use std::path::{Path, PathBuf};

use rand::RngCore;
use tokio::fs as afs;

/// Temporary sibling for `path`. The name is unique per process and call so
/// concurrent writers (including other processes sharing the directory) never
/// clobber each other's staging file.
fn staging_path(path: &Path) -> PathBuf {
    let mut salt = [0u8; 4];
    rand::rng().fill_bytes(&mut salt);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "entry".to_string());
    path.with_file_name(format!(
        ".{file_name}.{}.{}.tmp",
        std::process::id(),
        hex::encode(salt)
    ))
}

/// Returns true for staging files left behind by [`save_bytes_atomic`].
pub fn is_staging_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') && n.ends_with(".tmp"))
        .unwrap_or(false)
}

/// Write `bytes` to `path` via a staging file and rename, so readers observe
/// either the previous content or the new content, never a partial file.
pub async fn save_bytes_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            afs::create_dir_all(parent).await?;
        }
    }
    let tmp = staging_path(path);
    if let Err(err) = afs::write(&tmp, bytes).await {
        let _ = afs::remove_file(&tmp).await;
        return Err(err);
    }
    match afs::rename(&tmp, path).await {
        Ok(()) => Ok(()),
        Err(_) => {
            // Some platforms refuse to rename over an existing file.
            let _ = afs::remove_file(path).await;
            let res = afs::rename(&tmp, path).await;
            if res.is_err() {
                let _ = afs::remove_file(&tmp).await;
            }
            res
        }
    }
}
