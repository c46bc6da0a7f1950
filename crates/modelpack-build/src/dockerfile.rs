use std::path::Path;

use modelpack_core::{ModelpackConfig, ServerWheel};

use crate::layers::{self, LayerError};
use crate::staging::{StagingArea, StagingError};

const PREAMBLE: &str = "ENV DEBIAN_FRONTEND=noninteractive
ENV PYTHONUNBUFFERED=1
ENV LD_LIBRARY_PATH=$LD_LIBRARY_PATH:/usr/lib/x86_64-linux-gnu:/usr/local/nvidia/lib64:/usr/local/nvidia/bin";

// tini runs as PID 1 for signal handling and zombie reaping.
const INSTALL_TINI: &str = r#"RUN --mount=type=cache,target=/var/cache/apt set -eux; \
apt-get update -qq; \
apt-get install -qqy --no-install-recommends curl; \
rm -rf /var/lib/apt/lists/*; \
TINI_VERSION=v0.19.0; \
TINI_ARCH="$(dpkg --print-architecture)"; \
curl -sSL -o /sbin/tini "https://github.com/krallin/tini/releases/download/${TINI_VERSION}/tini-${TINI_ARCH}"; \
chmod +x /sbin/tini
ENTRYPOINT ["/sbin/tini", "--"]"#;

const PYENV_BUILD_DEPS: &str = r#"ENV PATH="/root/.pyenv/shims:/root/.pyenv/bin:$PATH"
RUN --mount=type=cache,target=/var/cache/apt apt-get update -qq && apt-get install -qqy --no-install-recommends \
	make \
	build-essential \
	libssl-dev \
	zlib1g-dev \
	libbz2-dev \
	libreadline-dev \
	libsqlite3-dev \
	wget \
	curl \
	llvm \
	libncurses5-dev \
	libncursesw5-dev \
	xz-utils \
	tk-dev \
	libffi-dev \
	liblzma-dev \
	git \
	ca-certificates \
	&& rm -rf /var/lib/apt/lists/*"#;

const PIP_CACHE_MOUNT: &str = "RUN --mount=type=cache,target=/root/.cache/pip";

/// Generates the model service Dockerfile.
///
/// Auxiliary files (requirements.txt, the server wheel) are written to the
/// [`StagingArea`] while rendering.
pub struct DockerfileGenerator<'a> {
    config: &'a ModelpackConfig,
    project_dir: &'a Path,
    staging: &'a StagingArea,
    server_wheel: Option<&'a ServerWheel>,
}

impl<'a> DockerfileGenerator<'a> {
    pub fn new(
        config: &'a ModelpackConfig,
        project_dir: &'a Path,
        staging: &'a StagingArea,
    ) -> Self {
        Self {
            config,
            project_dir,
            staging,
            server_wheel: None,
        }
    }

    /// Install the model server from this wheel instead of the package index.
    pub fn with_server_wheel(mut self, wheel: &'a ServerWheel) -> Self {
        self.server_wheel = Some(wheel);
        self
    }

    /// Everything up to and including `CMD`, without the workspace copy.
    pub fn render_base(&self) -> Result<String, GenerateError> {
        let build = &self.config.build;
        let base_image = build.base_image()?;
        let install_python = if build.gpu {
            self.install_python_cuda()
        } else {
            String::new()
        };
        let install_server = self.install_server()?;
        let apt_installs = self.apt_installs();
        let pip_installs = self.pip_installs()?;
        let run = self.run()?;

        Ok(join_non_empty(&[
            "# syntax = docker/dockerfile:1.2",
            &format!("FROM {base_image}"),
            PREAMBLE,
            INSTALL_TINI,
            &install_python,
            &install_server,
            &apt_installs,
            &pip_installs,
            &run,
            "WORKDIR /src",
            "EXPOSE 5000",
            r#"CMD ["python", "-m", "cog.server.http"]"#,
        ]))
    }

    /// The complete Dockerfile, ending with the workspace `COPY` layers.
    pub fn render(&self) -> Result<String, GenerateError> {
        let base = self.render_base()?;
        let copy_workspace = layers::copy_workspace(self.project_dir, &self.config.layers)?
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");

        Ok(join_non_empty(&[&base, &copy_workspace]))
    }

    fn install_python_cuda(&self) -> String {
        let py = &self.config.build.python_version;
        format!(
            r#"{PYENV_BUILD_DEPS}
RUN curl -s -S -L https://raw.githubusercontent.com/pyenv/pyenv-installer/master/bin/pyenv-installer | bash && \
	git clone https://github.com/momo-lab/pyenv-install-latest.git "$(pyenv root)"/plugins/pyenv-install-latest && \
	pyenv install-latest "{py}" && \
	pyenv global $(pyenv install-latest --print "{py}") && \
	pip install "wheel<1""#
        )
    }

    fn install_server(&self) -> Result<String, GenerateError> {
        let pip = self.pip_install();
        match self.server_wheel {
            Some(wheel) => {
                let (mut lines, container_path) =
                    self.staging.write(&wheel.filename, &wheel.bytes)?;
                lines.push(format!("{pip} {container_path}"));
                Ok(lines.join("\n"))
            }
            None => Ok(format!("{pip} \"{}\"", self.config.build.server_package)),
        }
    }

    fn apt_installs(&self) -> String {
        let packages = &self.config.build.system_packages;
        if packages.is_empty() {
            return String::new();
        }
        format!(
            "RUN --mount=type=cache,target=/var/cache/apt apt-get update -qq && apt-get install -qqy {} && rm -rf /var/lib/apt/lists/*",
            packages.join(" ")
        )
    }

    fn pip_installs(&self) -> Result<String, GenerateError> {
        let requirements = self.config.build.python_requirements(self.project_dir)?;
        if requirements.trim().is_empty() {
            return Ok(String::new());
        }

        let (mut lines, container_path) = self
            .staging
            .write("requirements.txt", requirements.as_bytes())?;
        lines.push(format!("{} -r {container_path}", self.pip_install()));
        Ok(lines.join("\n"))
    }

    fn run(&self) -> Result<String, GenerateError> {
        let mut lines = Vec::new();
        for command in self.config.build.run_commands() {
            let command = command.trim();
            if command.contains('\n') {
                return Err(GenerateError::MultilineRunCommand {
                    command: command.to_owned(),
                });
            }
            lines.push(format!("RUN {command}"));
        }
        Ok(lines.join("\n"))
    }

    fn pip_install(&self) -> String {
        match &self.config.build.pip_index_url {
            Some(index) => format!("{PIP_CACHE_MOUNT} pip install -i {index}"),
            None => format!("{PIP_CACHE_MOUNT} pip install"),
        }
    }
}

fn join_non_empty(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error(transparent)]
    Config(#[from] modelpack_core::Error),
    #[error("failed to stage build file")]
    Staging(#[from] StagingError),
    #[error("failed to plan workspace layers")]
    Layers(#[from] LayerError),
    #[error(
        "a `run` command contains a new line, which won't work; put each command in its own list item\n\nThe offending command: {command}"
    )]
    MultilineRunCommand { command: String },
}
