//! File-backed tag transport.
//!
//! [`FileTag`] stands in for a proximity tag: the tag payload is the content
//! of a file. Activating a session checks that the file's directory exists,
//! detecting reads the file and writing replaces it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::TagTransport;

/// A tag stored in a file.
#[derive(Debug, Clone)]
pub struct FileTag {
    path: PathBuf,
}

impl FileTag {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TagTransport for FileTag {
    async fn activate_session(&self) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => return Ok(()),
        };
        if tokio::fs::metadata(parent).await.is_err() {
            return Err(Error::tag_transport(format!(
                "Tag directory {} does not exist",
                parent.display()
            )));
        }
        Ok(())
    }

    async fn detect(&self) -> Result<Vec<u8>> {
        match tokio::fs::read(&self.path).await {
            Ok(payload) => {
                debug!(path = %self.path.display(), bytes = payload.len(), "Read tag file");
                Ok(payload)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::tag_transport(
                format!("No tag at {}", self.path.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, payload: &[u8]) -> Result<()> {
        tokio::fs::write(&self.path, payload).await?;
        debug!(path = %self.path.display(), bytes = payload.len(), "Wrote tag file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_write_then_detect() {
        let dir = TempDir::new().unwrap();
        let tag = FileTag::new(dir.path().join("lamp.tag"));

        tag.activate_session().await.unwrap();
        tag.write(br#"{"pairing_key":"c20c8a91"}"#).await.unwrap();

        assert_eq!(
            tag.detect().await.unwrap(),
            br#"{"pairing_key":"c20c8a91"}"#.to_vec()
        );
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let tag = FileTag::new(dir.path().join("absent.tag"));

        assert!(tag.activate_session().await.is_ok());
        assert!(matches!(tag.detect().await, Err(Error::TagTransport(_))));
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let tag = FileTag::new(dir.path().join("nested").join("lamp.tag"));

        assert!(matches!(
            tag.activate_session().await,
            Err(Error::TagTransport(_))
        ));
    }
}
