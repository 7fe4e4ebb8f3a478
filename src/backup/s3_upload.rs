// dbdump/src/backup/s3_upload.rs
use std::io;
use std::path::Path;
use tracing::info;

use crate::errors::UploadError;
use crate::storage::ObjectStore;

/// Uploads a local artifact under its file name as the key.
///
/// Local problems (missing file, not a regular file) come back as [`UploadError::Open`]
/// before the store is contacted; anything the store refuses is [`UploadError::Transfer`].
///
/// # Returns
/// The key the artifact was stored under.
pub async fn upload_artifact(store: &dyn ObjectStore, file_path: &Path) -> Result<String, UploadError> {
    let open_err = |error: io::Error| UploadError::Open {
        path: file_path.to_path_buf(),
        error,
    };

    let key = file_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| open_err(io::Error::new(io::ErrorKind::InvalidInput, "file name is not valid UTF-8")))?
        .to_string();

    let file = tokio::fs::File::open(file_path).await.map_err(open_err)?;
    let metadata = file.metadata().await.map_err(open_err)?;
    if !metadata.is_file() {
        return Err(open_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    drop(file);

    info!(
        "Uploading {} ({} bytes) to bucket {} as {}",
        file_path.display(),
        metadata.len(),
        store.bucket(),
        key
    );

    store
        .put_file(&key, file_path)
        .await
        .map_err(|e| UploadError::Transfer {
            key: key.clone(),
            cause: e.to_string(),
        })?;

    info!("✅ Uploaded {} to bucket {}", key, store.bucket());
    Ok(key)
}
