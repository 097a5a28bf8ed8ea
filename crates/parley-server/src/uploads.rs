use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ServerError;

/// Content type assumed for file parts that do not declare one.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata of an uploaded image, as stored in the `image` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Assigned by the document store on insert.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub stored_path: String,
    pub file_name: String,
    pub size: u64,
    pub content_type: String,
}

impl ImageRecord {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.stored_path)
    }
}

/// Directory that uploaded files are written to under random names.
#[derive(Debug, Clone)]
pub struct UploadStore {
    base_path: PathBuf,
}

impl UploadStore {
    pub async fn new(base_path: PathBuf) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await?;

        info!(path = %base_path.display(), "Upload store initialized");

        Ok(Self { base_path })
    }

    /// Write one multipart file part to disk.
    ///
    /// Chunks are pulled from the request only as fast as they are written.
    /// If anything fails the partial file is removed before returning.
    pub async fn receive(&self, mut field: Field<'_>) -> Result<ImageRecord, ServerError> {
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let path = self.base_path.join(Uuid::new_v4().to_string());

        let mut size = 0u64;
        let written: Result<(), ServerError> = async {
            let mut file = fs::File::create(&path).await?;
            while let Some(chunk) = field.chunk().await? {
                file.write_all(&chunk).await?;
                size += chunk.len() as u64;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = written {
            discard_uploads([path.as_path()]).await;
            return Err(e);
        }

        debug!(file = %file_name, size, path = %path.display(), "Received upload");

        Ok(ImageRecord {
            id: None,
            stored_path: path.to_string_lossy().into_owned(),
            file_name,
            size,
            content_type,
        })
    }
}

/// Delete uploaded files, best-effort.
///
/// Runs after a request has already failed, so problems here are only
/// logged.
pub async fn discard_uploads<'a>(paths: impl IntoIterator<Item = &'a Path>) {
    for path in paths {
        match fs::try_exists(path).await {
            Err(e) => warn!(
                path = %path.display(),
                error = %e,
                "Could not detect if uploaded file exists, not deleting"
            ),
            Ok(false) => {}
            Ok(true) => match fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "Deleted uploaded file"),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Delete of uploaded file failed"
                ),
            },
        }
    }
}
