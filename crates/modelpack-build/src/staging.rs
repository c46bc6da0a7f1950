use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Directory under the project root holding per-build staging directories.
pub const STAGING_ROOT: &str = ".modelpack/tmp";

/// Per-build directory for files the Dockerfile copies in but the user never
/// wrote (requirements.txt, the server wheel).
///
/// Lives inside the project so it is part of the docker build context.
/// Removed on [`StagingArea::cleanup`] or when dropped; [`StagingArea::keep`]
/// leaves it in place for a later `docker build`.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
    relative: PathBuf,
}

impl StagingArea {
    /// Creates `<project>/.modelpack/tmp/build*`.
    pub fn create(project_dir: &Path) -> Result<Self, StagingError> {
        let root = project_dir.join(STAGING_ROOT);
        std::fs::create_dir_all(&root).map_err(|e| StagingError::Create {
            path: root.clone(),
            source: e,
        })?;

        let dir = tempfile::Builder::new()
            .prefix("build")
            .tempdir_in(&root)
            .map_err(|e| StagingError::Create {
                path: root.clone(),
                source: e,
            })?;

        let relative = match dir.path().file_name() {
            Some(name) => Path::new(STAGING_ROOT).join(name),
            None => {
                return Err(StagingError::Unnamed {
                    path: dir.path().to_path_buf(),
                });
            }
        };

        tracing::debug!(path = %dir.path().display(), "created staging directory");
        Ok(Self { dir, relative })
    }

    /// Absolute path of the staging directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Staging directory relative to the project root, as used in `COPY`.
    pub fn relative_path(&self) -> &Path {
        &self.relative
    }

    /// Writes `contents` to the staging directory.
    ///
    /// Returns the Dockerfile lines making the file available in the image
    /// and its path inside the container.
    pub fn write(
        &self,
        filename: &str,
        contents: &[u8],
    ) -> Result<(Vec<String>, String), StagingError> {
        let path = self.dir.path().join(filename);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StagingError::Write {
                filename: filename.to_owned(),
                source: e,
            })?;
        }
        std::fs::write(&path, contents).map_err(|e| StagingError::Write {
            filename: filename.to_owned(),
            source: e,
        })?;

        let container_path = format!("/tmp/{filename}");
        let copy = format!(
            "COPY {} {container_path}",
            self.relative.join(filename).display()
        );
        Ok((vec![copy], container_path))
    }

    /// Removes the staging directory.
    pub fn cleanup(self) -> Result<(), StagingError> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|e| StagingError::Cleanup { path, source: e })
    }

    /// Leaves the staging directory on disk and returns its path.
    pub fn keep(self) -> PathBuf {
        self.dir.keep()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("failed to create staging directory in {path}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("staging directory {path} has no file name")]
    Unnamed { path: PathBuf },
    #[error("failed to write {filename}")]
    Write {
        filename: String,
        source: std::io::Error,
    },
    #[error("failed to clean up {path}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
}
