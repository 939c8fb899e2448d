//! Transient audio files scoped to a single stage
//!
//! A [`TransientAudio`] owns a scratch path and deletes it when dropped, so the file
//! is removed on every exit path: success, `?` propagation, early return or unwind.

use std::path::{Path, PathBuf};

use crate::Result;

/// Allocates uniquely-named scratch audio paths in one directory
#[derive(Debug, Clone)]
pub struct AudioScratch {
    dir: PathBuf,
}

impl AudioScratch {
    /// Use `dir` for scratch files, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Scratch directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Acquire a fresh scratch path
    ///
    /// No file is created; the name is a random v4 UUID so it cannot collide with
    /// any other live handle.
    #[must_use]
    pub fn acquire(&self) -> TransientAudio {
        let path = self
            .dir
            .join(format!("turn_{}.wav", uuid::Uuid::new_v4().simple()));
        tracing::trace!(path = %path.display(), "acquired transient audio");
        TransientAudio { path }
    }
}

/// A scratch audio path deleted when the handle goes out of scope
#[derive(Debug)]
pub struct TransientAudio {
    path: PathBuf,
}

impl TransientAudio {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for TransientAudio {
    fn drop(&mut self) {
        release_path(&self.path);
    }
}

/// Remove `path` if it exists; a missing file is not an error
fn release_path(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::trace!(path = %path.display(), "released transient audio"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove transient audio"
        ),
    }
}
