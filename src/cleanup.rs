//! Temporary artifacts created for a single CLI invocation.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::types::generation::ImageInput;

/// Materializes prompt images as files Codex can read with `--image`.
pub trait ImageWriter: Send + Sync {
    /// Write the image somewhere on disk and return its path.
    fn write(&self, image: &ImageInput) -> io::Result<PathBuf>;

    /// Remove a file previously returned by [`write`](Self::write).
    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// Writes each image to its own file in the system temp directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct TempImageWriter;

impl ImageWriter for TempImageWriter {
    fn write(&self, image: &ImageInput) -> io::Result<PathBuf> {
        let suffix = format!(".{}", extension_for(&image.mime_type));
        let mut file = tempfile::Builder::new()
            .prefix("codex-img-")
            .suffix(&suffix)
            .tempfile()?;
        file.write_all(&image.data)?;
        file.flush()?;
        let (_, path) = file.keep().map_err(|e| e.error)?;
        Ok(path)
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        _ => "img",
    }
}

/// Scope guard owning every temp file of one call.
///
/// Dropping it deletes the schema directory, the auto-created last-message
/// directory and every image file, on success, error and cancellation alike.
/// Removal failures are ignored.
pub struct TempArtifacts {
    dirs: Vec<TempDir>,
    images: Vec<PathBuf>,
    image_writer: Arc<dyn ImageWriter>,
}

impl TempArtifacts {
    pub fn new(image_writer: Arc<dyn ImageWriter>) -> Self {
        Self {
            dirs: Vec::new(),
            images: Vec::new(),
            image_writer,
        }
    }

    /// Create a fresh temp directory that lives as long as this guard.
    pub fn create_dir(&mut self, prefix: &str) -> io::Result<PathBuf> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
        let path = dir.path().to_path_buf();
        self.dirs.push(dir);
        Ok(path)
    }

    pub fn write_image(&mut self, image: &ImageInput) -> io::Result<PathBuf> {
        let path = self.image_writer.write(image)?;
        self.images.push(path.clone());
        Ok(path)
    }

    pub fn image_paths(&self) -> &[PathBuf] {
        &self.images
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.images.is_empty()
    }
}

impl std::fmt::Debug for TempArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempArtifacts")
            .field("dirs", &self.dirs.iter().map(TempDir::path).collect::<Vec<_>>())
            .field("images", &self.images)
            .field("image_writer", &"<dyn ImageWriter>")
            .finish()
    }
}

impl Drop for TempArtifacts {
    fn drop(&mut self) {
        for path in self.images.drain(..) {
            if let Err(e) = self.image_writer.remove(&path) {
                tracing::debug!(path = %path.display(), "failed to remove temp image: {e}");
            }
        }
        // TempDir removes itself on drop and ignores errors.
        self.dirs.clear();
    }
}
