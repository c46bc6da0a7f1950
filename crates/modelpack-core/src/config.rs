use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File name of the project configuration, relative to the project root.
pub const CONFIG_FILE_NAME: &str = "modelpack.toml";

/// Entries at or under this many bytes are copied in the grouped small-file
/// layers; anything larger gets its own layer.
///
/// Roughly 200 MB. Older documentation described this as "100 MB"; the
/// numeric value is the one builds have always used.
pub const DEFAULT_SIZE_THRESHOLD: u64 = 200 * 1000 * 1000;

/// modelpack.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelpackConfig {
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub layers: LayerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build on a CUDA image and install Python with pyenv
    #[serde(default)]
    pub gpu: bool,
    /// Python version (`python:<version>` tag on CPU, pyenv prefix on GPU)
    #[serde(default = "default_python_version")]
    pub python_version: String,
    /// CUDA version for the GPU base image
    #[serde(default)]
    pub cuda: Option<String>,
    /// cuDNN major version for the GPU base image
    #[serde(default)]
    pub cudnn: Option<String>,
    /// Additional system packages to install via apt-get
    #[serde(default)]
    pub system_packages: Vec<String>,
    /// pip requirement lines
    #[serde(default)]
    pub python_packages: Vec<String>,
    /// requirements.txt-style file, relative to the project root.
    /// Its lines come before `python_packages`.
    #[serde(default)]
    pub python_requirements: Option<PathBuf>,
    /// Commands run after dependencies are installed, one `RUN` each
    #[serde(default)]
    pub run: Vec<String>,
    /// Legacy name for `run`; appended after it
    #[serde(default)]
    pub pre_install: Vec<String>,
    /// pip package providing the model server
    #[serde(default = "default_server_package")]
    pub server_package: String,
    /// Wheel installed instead of `server_package`, relative to the project root
    #[serde(default)]
    pub server_wheel: Option<PathBuf>,
    /// Extra package index passed to pip with `-i`
    #[serde(default)]
    pub pip_index_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Split the workspace into several COPY layers.
    /// When false, the whole workspace is copied with a single `COPY . /src`.
    #[serde(default = "default_group_files")]
    pub group_files: bool,
    /// Number of layers small files are spread across
    #[serde(default = "default_max_file_groups")]
    pub max_file_groups: usize,
    /// Byte size separating small from large entries
    #[serde(default = "default_size_threshold")]
    pub size_threshold: u64,
}

/// The model server wheel, loaded once and shared for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerWheel {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            gpu: false,
            python_version: default_python_version(),
            cuda: None,
            cudnn: None,
            system_packages: Vec::new(),
            python_packages: Vec::new(),
            python_requirements: None,
            run: Vec::new(),
            pre_install: Vec::new(),
            server_package: default_server_package(),
            server_wheel: None,
            pip_index_url: None,
        }
    }
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            group_files: default_group_files(),
            max_file_groups: default_max_file_groups(),
            size_threshold: default_size_threshold(),
        }
    }
}

impl ModelpackConfig {
    /// Load from modelpack.toml at the given path, or return defaults if not found.
    pub fn load(project_dir: &Path) -> crate::Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            tracing::debug!(path = %config_path.display(), "loading config");
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path,
                source: e,
            })
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }
}

impl BuildConfig {
    /// Image tag for the `FROM` line.
    pub fn base_image(&self) -> crate::Result<String> {
        validate_python_version(&self.python_version)?;

        if !self.gpu {
            if self.cuda.is_some() || self.cudnn.is_some() {
                return Err(crate::Error::CudaWithoutGpu);
            }
            return Ok(format!("python:{}", self.python_version));
        }

        let cuda = match &self.cuda {
            Some(cuda) => cuda.as_str(),
            None => DEFAULT_CUDA,
        };
        let cudnn = match &self.cudnn {
            Some(cudnn) => cudnn.as_str(),
            None => DEFAULT_CUDNN,
        };
        Ok(format!("nvidia/cuda:{cuda}-cudnn{cudnn}-devel-ubuntu22.04"))
    }

    /// Commands to emit as `RUN` lines, `run` first then `pre_install`.
    pub fn run_commands(&self) -> impl Iterator<Item = &str> {
        self.run
            .iter()
            .chain(self.pre_install.iter())
            .map(String::as_str)
    }

    /// Assembles requirements.txt content.
    ///
    /// Returns an empty string when nothing needs installing.
    pub fn python_requirements(&self, project_dir: &Path) -> crate::Result<String> {
        let mut lines = Vec::new();

        if let Some(relative) = &self.python_requirements {
            let path = project_dir.join(relative);
            let content =
                std::fs::read_to_string(&path).map_err(|e| crate::Error::RequirementsRead {
                    path: path.clone(),
                    source: e,
                })?;
            lines.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_owned),
            );
        }

        lines.extend(self.python_packages.iter().map(|p| p.trim().to_owned()));
        lines.retain(|line| !line.is_empty());

        if lines.is_empty() {
            return Ok(String::new());
        }
        Ok(lines.join("\n") + "\n")
    }

    /// Reads the configured server wheel, if any.
    pub fn load_server_wheel(&self, project_dir: &Path) -> crate::Result<Option<ServerWheel>> {
        let Some(relative) = &self.server_wheel else {
            return Ok(None);
        };

        let path = project_dir.join(relative);
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| crate::Error::ServerWheelName { path: path.clone() })?;
        let bytes = std::fs::read(&path).map_err(|e| crate::Error::ServerWheelRead {
            path: path.clone(),
            source: e,
        })?;

        tracing::debug!(wheel = %filename, size = bytes.len(), "loaded server wheel");
        Ok(Some(ServerWheel { filename, bytes }))
    }
}

const DEFAULT_CUDA: &str = "11.8.0";
const DEFAULT_CUDNN: &str = "8";

/// Accepts `3`, `3.11` and `3.11.4`.
fn validate_python_version(version: &str) -> crate::Result<()> {
    let invalid = |reason| crate::Error::InvalidPythonVersion {
        version: version.to_owned(),
        reason,
    };

    if version.is_empty() {
        return Err(invalid("must not be empty"));
    }
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() > 3 {
        return Err(invalid("expected at most major.minor.patch"));
    }
    if parts
        .iter()
        .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(invalid("components must be numbers"));
    }
    Ok(())
}

fn default_python_version() -> String {
    "3.8".to_owned()
}

fn default_server_package() -> String {
    "cog".to_owned()
}

fn default_group_files() -> bool {
    true
}

fn default_max_file_groups() -> usize {
    1
}

fn default_size_threshold() -> u64 {
    DEFAULT_SIZE_THRESHOLD
}
