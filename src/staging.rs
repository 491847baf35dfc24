use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::Result;
use crate::event::FileRef;

/// A downloaded image written to a uniquely named temp file.
///
/// The file is removed when the value drops, on success and error paths alike.
pub struct StagedImage {
    file: NamedTempFile,
    file_name: String,
    mime_type: String,
}

impl StagedImage {
    /// Write `bytes` fully into a fresh temp file under `dir`.
    ///
    /// The write and fsync run on the blocking pool.
    pub async fn stage(dir: &Path, file: &FileRef, bytes: Vec<u8>) -> Result<Self> {
        let dir = dir.to_path_buf();
        let suffix = format!(".{}", file.extension());
        let len = bytes.len();

        let staged = tokio::task::spawn_blocking(move || -> io::Result<NamedTempFile> {
            let mut staged = tempfile::Builder::new()
                .prefix("slack-moderator-")
                .suffix(&suffix)
                .tempfile_in(&dir)?;
            staged.write_all(&bytes)?;
            staged.as_file_mut().sync_all()?;
            Ok(staged)
        })
        .await
        .map_err(io::Error::other)??;

        debug!(
            "Staged {} bytes for file {} at {}",
            len,
            file.id,
            staged.path().display()
        );

        Ok(Self {
            file: staged,
            file_name: format!("{}.{}", file.id, file.extension()),
            mime_type: file.mime_type.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Re-open the staged file and read it back for upload.
    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path()).await?)
    }
}
