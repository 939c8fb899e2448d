//! Published audio: synthesis output copied to a publicly served directory

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::Result;

/// Name prefix for a published file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishKind {
    /// Spoken reply to a turn
    Response,
    /// Spoken greeting
    Greeting,
}

impl PublishKind {
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Response => "response",
            Self::Greeting => "greeting",
        }
    }
}

/// A file copied into the public directory
#[derive(Debug, Clone, Serialize)]
pub struct PublishedAudio {
    /// File name, `<prefix>_<token>.wav`
    pub name: String,
    /// Location on disk
    pub path: PathBuf,
    /// Fetchable URL path, `<url_prefix>/<name>`
    pub url: String,
}

/// Owns the public audio directory
///
/// Published files stay until [`AudioPublisher::sweep`] removes them.
#[derive(Debug, Clone)]
pub struct AudioPublisher {
    dir: PathBuf,
    url_prefix: String,
}

impl AudioPublisher {
    /// Publish into `dir`, served under `url_prefix` (e.g. "/static/audio")
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Copy `source` into the public directory under a fresh unique name
    ///
    /// The source is left in place; its owner is responsible for removing it.
    ///
    /// # Errors
    ///
    /// Returns error if the copy fails
    pub async fn publish(&self, source: &Path, kind: PublishKind) -> Result<PublishedAudio> {
        let name = format!("{}_{}.wav", kind.prefix(), uuid::Uuid::new_v4().simple());
        let path = self.dir.join(&name);

        tokio::fs::copy(source, &path).await?;

        let url = format!("{}/{}", self.url_prefix, name);
        tracing::debug!(path = %path.display(), url = %url, "published audio");

        Ok(PublishedAudio { name, path, url })
    }

    /// Delete every `.wav` file in the public directory
    ///
    /// Files that cannot be removed are logged and skipped. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be listed
    pub fn sweep(&self) -> Result<usize> {
        let mut removed = 0;

        for entry in std::fs::read_dir(&self.dir)? {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read public audio entry");
                    continue;
                }
            };

            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("wav") {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "could not delete published audio"
                ),
            }
        }

        tracing::info!(removed, dir = %self.dir.display(), "swept published audio");
        Ok(removed)
    }
}
