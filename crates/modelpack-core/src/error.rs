use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    // ── Build settings ──
    #[error("invalid python_version {version:?}: {reason}")]
    InvalidPythonVersion {
        version: String,
        reason: &'static str,
    },

    #[error("cuda/cudnn settings require `gpu = true` in [build]")]
    CudaWithoutGpu,

    #[error("failed to read python requirements from {path}")]
    RequirementsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read server wheel from {path}")]
    ServerWheelRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("server wheel path {path} has no file name")]
    ServerWheelName { path: PathBuf },
}
