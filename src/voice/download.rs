//! Saving response audio to disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use super::types::{AudioPayload, PlaybackKey};

/// File name for a saved response, numbered from 1 like the artifact list.
pub fn download_filename(key: &PlaybackKey, payload: &AudioPayload) -> String {
    format!(
        "council-response-{}.{}",
        key.response_index + 1,
        payload.file_extension()
    )
}

/// Write `payload` into `dir`, creating the directory if needed.
pub async fn save_payload(key: &PlaybackKey, payload: &AudioPayload, dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create download directory {}", dir.display()))?;

    let path = dir.join(download_filename(key, payload));
    tokio::fs::write(&path, &payload.data[..])
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    info!(key = %key, path = %path.display(), bytes = payload.len(), "Saved response audio");
    Ok(path)
}
