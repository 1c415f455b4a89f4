use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Default cap on a single uploaded photo.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// A file attached to an answer submission.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Upload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Error: This quest requires a photo upload.")]
    Missing,
    #[error("Error: The uploaded file is empty.")]
    Empty,
    #[error("Error: The uploaded file is {size} bytes, the limit is {limit} bytes.")]
    TooLarge { size: usize, limit: usize },
    /// The request body was cut off before the whole file arrived.
    #[error("Error: The uploaded file is larger than the {limit}-byte limit.")]
    BodyTooLarge { limit: usize },
    #[error("Error: Failed to store the uploaded file: {0}")]
    Io(#[from] io::Error),
}

/// Where submitted photos end up.
pub trait UploadStore: Send + Sync {
    /// Persist `upload` for the given team and quest, returning where it was written.
    fn store(&self, team: &str, quest_number: u32, upload: &Upload) -> Result<PathBuf, UploadError>;
}

/// Writes uploads into a directory. Files are written under a temporary name and
/// renamed into place, so a reader never sees a partial file.
#[derive(Debug, Clone)]
pub struct DiskUploadStore {
    root: PathBuf,
    max_bytes: usize,
}

impl DiskUploadStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        DiskUploadStore { root: root.into(), max_bytes }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

/// Extension taken from the client's file name, restricted to short alphanumerics.
fn extension_of(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

/// Team names come from configuration, but never trust them as path segments.
fn path_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

impl UploadStore for DiskUploadStore {
    fn store(&self, team: &str, quest_number: u32, upload: &Upload) -> Result<PathBuf, UploadError> {
        if upload.bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if upload.bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge { size: upload.bytes.len(), limit: self.max_bytes });
        }

        fs::create_dir_all(&self.root)?;
        let id = Uuid::new_v4();
        let temp = self.root.join(format!(".{}.part", id));
        let target = self.root.join(format!(
            "{}_quest{}_{}.{}",
            path_safe(team),
            quest_number,
            id,
            extension_of(upload.file_name.as_deref())
        ));

        let written = (|| -> io::Result<()> {
            let mut file = fs::File::create(&temp)?;
            file.write_all(&upload.bytes)?;
            file.sync_all()?;
            fs::rename(&temp, &target)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            tracing::error!(team, quest_number, error = %e, "Failed to store upload");
            return Err(UploadError::Io(e));
        }

        tracing::info!(team, quest_number, path = %target.display(), bytes = upload.bytes.len(), "Stored upload");
        Ok(target)
    }
}
