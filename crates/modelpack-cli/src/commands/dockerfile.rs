use std::path::Path;

use anyhow::Context;
use modelpack_build::{DockerfileGenerator, StagingArea};
use modelpack_core::ModelpackConfig;

pub fn dockerfile(
    dir: &Path,
    no_group_files: bool,
    output: Option<&Path>,
    keep_staging: bool,
) -> anyhow::Result<()> {
    let mut config = ModelpackConfig::load(dir)?;
    if no_group_files {
        config.layers.group_files = false;
    }
    let wheel = config.build.load_server_wheel(dir)?;

    let staging = StagingArea::create(dir)?;
    let mut generator = DockerfileGenerator::new(&config, dir, &staging);
    if let Some(wheel) = &wheel {
        generator = generator.with_server_wheel(wheel);
    }
    let rendered = generator.render();

    let dockerfile = match rendered {
        Ok(dockerfile) => dockerfile,
        Err(e) => {
            // Report the render error, not a cleanup failure.
            // arch-lint: allow(no-error-swallowing) reason="cleanup failure must not mask the render error"
            if let Err(cleanup) = staging.cleanup() {
                tracing::warn!(error = %cleanup, "failed to remove staging directory");
            }
            return Err(e).context("failed to generate Dockerfile");
        }
    };

    match output {
        Some(path) => {
            std::fs::write(path, format!("{dockerfile}\n"))
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote Dockerfile");
        }
        None => println!("{dockerfile}"),
    }

    if keep_staging {
        let kept = staging.keep();
        tracing::info!(path = %kept.display(), "kept staging directory");
        eprintln!(
            "Use the project directory as build context: docker build -f <Dockerfile> {}",
            dir.display()
        );
    } else {
        staging.cleanup()?;
    }

    Ok(())
}
