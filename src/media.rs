use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Other(String),
}

/// Blob storage for post images. Paths returned by `save` are relative to
/// the media root; that relative form is what gets persisted on the post and
/// rewritten to an absolute URL at serialization time.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn save(&self, mime: &str, bytes: &[u8]) -> Result<String, MediaError>;
    async fn load(&self, relative: &str) -> Result<(Vec<u8>, String), MediaError>;
    async fn delete(&self, relative: &str) -> Result<(), MediaError>;
}

/// Filesystem store rooted at the configured media directory. Content is
/// addressed by SHA-256, so re-uploading identical bytes is idempotent.
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn guard(relative: &str) -> Result<&Path, MediaError> {
        let path = Path::new(relative);
        if path.is_absolute()
            || path
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(MediaError::NotFound);
        }
        Ok(path)
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn save(&self, mime: &str, bytes: &[u8]) -> Result<String, MediaError> {
        let hash = format!("{:x}", Sha256::digest(bytes));
        let relative = format!("posts/{}/{}.{}", &hash[..2], hash, extension_for(mime));
        let full = self.root.join(&relative);
        if let Some(dir) = full.parent() {
            std::fs::create_dir_all(dir).map_err(|e| MediaError::Other(e.to_string()))?;
        }
        std::fs::write(&full, bytes).map_err(|e| MediaError::Other(e.to_string()))?;
        Ok(relative)
    }

    async fn load(&self, relative: &str) -> Result<(Vec<u8>, String), MediaError> {
        let path = self.root.join(Self::guard(relative)?);
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MediaError::NotFound,
            _ => MediaError::Other(e.to_string()),
        })?;
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }

    async fn delete(&self, relative: &str) -> Result<(), MediaError> {
        let path = self.root.join(Self::guard(relative)?);
        // best-effort: a missing file is already deleted
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MediaError::Other(e.to_string())),
        }
    }
}
