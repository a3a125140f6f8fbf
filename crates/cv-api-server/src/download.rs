//! Intake artifact download (§6 upload path): every intake is addressed by
//! `{bucket, object_key}` in object storage, never an arbitrary URL, so this
//! is narrower than the teacher's media-download module -- one source, one
//! retrieval path -- but keeps the same "downloaded file cleans itself up
//! when dropped" shape.

use std::path::Path;

use anyhow::Context;
use tempfile::TempDir;

use cv_storage::object_storage::S3Config;
use cv_storage::{ObjectStorage, S3ObjectStorage};

/// A downloaded intake file; the backing temp directory is removed when
/// this value is dropped.
pub struct DownloadedIntake {
    dir: TempDir,
    file_name: String,
}

impl DownloadedIntake {
    #[must_use]
    pub fn path(&self) -> std::path::PathBuf {
        self.dir.path().join(&self.file_name)
    }
}

/// Downloads `object_key` from `bucket` into a fresh temp directory.
///
/// # Errors
/// Returns an error if the object storage client cannot be constructed or
/// the object cannot be retrieved.
pub async fn fetch_intake_object(bucket: &str, object_key: &str) -> anyhow::Result<DownloadedIntake> {
    let config = S3Config { bucket: bucket.to_string(), ..S3Config::default() };
    let storage = S3ObjectStorage::new(config).await.context("connecting to object storage")?;

    let dir = TempDir::new().context("creating temp directory for intake download")?;
    let file_name = Path::new(object_key)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| object_key.replace('/', "_"));
    let local_path = dir.path().join(&file_name);

    storage
        .retrieve_file_to_path(object_key, &local_path)
        .await
        .with_context(|| format!("downloading {bucket}/{object_key}"))?;

    Ok(DownloadedIntake { dir, file_name })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downloaded_intake_path_joins_file_name() {
        let dir = TempDir::new().unwrap();
        let intake = DownloadedIntake { dir, file_name: "resume.pdf".to_string() };
        assert!(intake.path().ends_with("resume.pdf"));
    }
}
