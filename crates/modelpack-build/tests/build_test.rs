use std::path::Path;

use modelpack_build::layers::{
    self, EntryKind, FsSizer, LayerError, WorkspaceEntry, classify, list_workspace,
};
use modelpack_build::staging::StagingArea;
use modelpack_build::{DockerfileGenerator, GenerateError};
use modelpack_core::{LayerConfig, ModelpackConfig, ServerWheel};
use tempfile::TempDir;

fn write_bytes(path: &Path, len: usize) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, vec![b'x'; len]).unwrap();
}

/// Renders the full Dockerfile for `project` and cleans up staging.
fn render(config: &ModelpackConfig, project: &Path) -> String {
    let staging = StagingArea::create(project).unwrap();
    let output = DockerfileGenerator::new(config, project, &staging)
        .render()
        .unwrap();
    staging.cleanup().unwrap();
    output
}

fn small_layers(max_file_groups: usize, size_threshold: u64) -> ModelpackConfig {
    ModelpackConfig {
        layers: LayerConfig {
            group_files: true,
            max_file_groups,
            size_threshold,
        },
        ..Default::default()
    }
}

// ── Size Classification Tests ──

#[test]
fn directory_size_is_recursive() {
    let tmp = TempDir::new().unwrap();
    write_bytes(&tmp.path().join("data/a.bin"), 50);
    write_bytes(&tmp.path().join("data/nested/b.bin"), 60);

    let entries = vec![WorkspaceEntry::dir("data")];
    let buckets = classify(100, &entries, &FsSizer::new(tmp.path())).unwrap();

    assert_eq!(buckets.large_dirs, vec!["data"]);
    assert!(buckets.small_dirs.is_empty());
}

#[test]
fn file_at_threshold_is_small() {
    let tmp = TempDir::new().unwrap();
    write_bytes(&tmp.path().join("exact.bin"), 100);
    write_bytes(&tmp.path().join("over.bin"), 101);

    let entries = list_workspace(tmp.path()).unwrap();
    let buckets = classify(100, &entries, &FsSizer::new(tmp.path())).unwrap();

    assert_eq!(buckets.small_files, vec!["exact.bin"]);
    assert_eq!(buckets.large_files, vec!["over.bin"]);
}

#[test]
fn list_workspace_is_sorted_and_typed() {
    let tmp = TempDir::new().unwrap();
    write_bytes(&tmp.path().join("zeta.py"), 1);
    write_bytes(&tmp.path().join("alpha/x.py"), 1);
    write_bytes(&tmp.path().join("beta.py"), 1);

    let entries = list_workspace(tmp.path()).unwrap();

    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta.py", "zeta.py"]);
    assert_eq!(entries[0].kind, EntryKind::Dir);
    assert_eq!(entries[1].kind, EntryKind::File);
}

#[test]
fn missing_entry_is_an_io_error() {
    let tmp = TempDir::new().unwrap();
    let entries = vec![WorkspaceEntry::file("ghost.py")];

    let err = classify(100, &entries, &FsSizer::new(tmp.path())).unwrap_err();
    assert!(matches!(err, LayerError::Io { .. }));
}

#[test]
fn missing_workspace_is_an_io_error() {
    let tmp = TempDir::new().unwrap();
    let err = list_workspace(&tmp.path().join("nope")).unwrap_err();
    assert!(matches!(err, LayerError::Io { .. }));
}

// ── Workspace Copy Tests ──

#[test]
fn copy_workspace_isolates_large_files() {
    let tmp = TempDir::new().unwrap();
    write_bytes(&tmp.path().join("weights.bin"), 500);
    write_bytes(&tmp.path().join("a.py"), 10);
    write_bytes(&tmp.path().join("b.py"), 10);
    write_bytes(&tmp.path().join("c.py"), 10);

    let config = small_layers(1, 100);
    let lines: Vec<String> = layers::copy_workspace(tmp.path(), &config.layers)
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();

    assert_eq!(
        lines,
        vec!["COPY weights.bin /src", "COPY a.py b.py c.py /src"]
    );
}

#[test]
fn copy_workspace_keeps_directory_paths() {
    let tmp = TempDir::new().unwrap();
    write_bytes(&tmp.path().join("checkpoints/model.pt"), 500);
    write_bytes(&tmp.path().join("lib/util.py"), 10);
    write_bytes(&tmp.path().join("predict.py"), 10);

    let config = small_layers(1, 100);
    let lines: Vec<String> = layers::copy_workspace(tmp.path(), &config.layers)
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();

    assert_eq!(
        lines,
        vec![
            "COPY predict.py /src",
            "COPY checkpoints /src/checkpoints",
            "COPY lib /src/lib",
        ]
    );
}

#[test]
fn copy_workspace_quotes_names_with_spaces() {
    let tmp = TempDir::new().unwrap();
    write_bytes(&tmp.path().join("model card.md"), 10);
    write_bytes(&tmp.path().join("sample inputs/a.png"), 10);

    let config = small_layers(1, 100);
    let lines: Vec<String> = layers::copy_workspace(tmp.path(), &config.layers)
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();

    assert_eq!(
        lines,
        vec![
            r#"COPY ["model card.md", "/src"]"#,
            r#"COPY ["sample inputs", "/src/sample inputs"]"#,
        ]
    );
}

#[test]
fn copy_workspace_rejects_zero_groups() {
    let tmp = TempDir::new().unwrap();
    write_bytes(&tmp.path().join("a.py"), 1);

    let config = small_layers(0, 100);
    let err = layers::copy_workspace(tmp.path(), &config.layers).unwrap_err();
    assert!(matches!(err, LayerError::InvalidGroupCount(0)));
}

#[test]
fn copy_workspace_empty_dir_has_no_instructions() {
    let tmp = TempDir::new().unwrap();
    let config = small_layers(1, 100);

    assert!(
        layers::copy_workspace(tmp.path(), &config.layers)
            .unwrap()
            .is_empty()
    );
}

// ── Dockerfile Generation Tests ──

#[test]
fn dockerfile_has_fixed_frame() {
    let tmp = TempDir::new().unwrap();
    let output = render(&ModelpackConfig::default(), tmp.path());

    assert!(output.starts_with("# syntax = docker/dockerfile:1.2\nFROM python:3.8\n"));
    assert!(output.contains("ENV PYTHONUNBUFFERED=1"));
    assert!(output.contains(r#"ENTRYPOINT ["/sbin/tini", "--"]"#));
    assert!(output.contains("WORKDIR /src"));
    assert!(output.contains("EXPOSE 5000"));
    assert!(output.contains(r#"CMD ["python", "-m", "cog.server.http"]"#));
}

#[test]
fn dockerfile_cpu_skips_pyenv() {
    let tmp = TempDir::new().unwrap();
    let output = render(&ModelpackConfig::default(), tmp.path());

    assert!(!output.contains("pyenv"));
}

#[test]
fn dockerfile_gpu_uses_cuda_image_and_pyenv() {
    let tmp = TempDir::new().unwrap();
    let mut config = ModelpackConfig::default();
    config.build.gpu = true;
    config.build.python_version = "3.10".to_owned();

    let output = render(&config, tmp.path());

    assert!(output.contains("FROM nvidia/cuda:11.8.0-cudnn8-devel-ubuntu22.04"));
    assert!(output.contains(r#"pyenv install-latest "3.10""#));
    assert!(output.contains(r#"pip install "wheel<1""#));
}

#[test]
fn dockerfile_includes_system_packages() {
    let tmp = TempDir::new().unwrap();
    let mut config = ModelpackConfig::default();
    config.build.system_packages = vec!["ffmpeg".to_owned(), "libgl1".to_owned()];

    let output = render(&config, tmp.path());

    assert!(output.contains("apt-get install -qqy ffmpeg libgl1 && rm -rf /var/lib/apt/lists/*"));
}

#[test]
fn dockerfile_no_apt_line_when_no_packages() {
    let tmp = TempDir::new().unwrap();
    let output = render(&ModelpackConfig::default(), tmp.path());

    assert!(!output.contains("apt-get install -qqy ffmpeg"));
    assert!(!output.contains("-r /tmp/requirements.txt"));
}

#[test]
fn dockerfile_stages_requirements() {
    let tmp = TempDir::new().unwrap();
    let mut config = ModelpackConfig::default();
    config.build.python_packages = vec!["torch==2.1.0".to_owned(), "numpy".to_owned()];

    let staging = StagingArea::create(tmp.path()).unwrap();
    let output = DockerfileGenerator::new(&config, tmp.path(), &staging)
        .render_base()
        .unwrap();

    let staged = staging.path().join("requirements.txt");
    assert_eq!(
        std::fs::read_to_string(&staged).unwrap(),
        "torch==2.1.0\nnumpy\n"
    );

    let copy_line = format!(
        "COPY {} /tmp/requirements.txt",
        staging.relative_path().join("requirements.txt").display()
    );
    assert!(output.contains(&copy_line));
    assert!(output.contains(".modelpack/tmp/build"));
    assert!(output.contains("pip install -r /tmp/requirements.txt"));

    staging.cleanup().unwrap();
}

#[test]
fn dockerfile_uses_pip_index() {
    let tmp = TempDir::new().unwrap();
    let mut config = ModelpackConfig::default();
    config.build.python_packages = vec!["numpy".to_owned()];
    config.build.pip_index_url = Some("https://pypi.example.com/simple".to_owned());

    let output = render(&config, tmp.path());

    assert!(output.contains("pip install -i https://pypi.example.com/simple -r /tmp/requirements.txt"));
    assert!(output.contains(r#"pip install -i https://pypi.example.com/simple "cog""#));
}

#[test]
fn dockerfile_installs_server_package_by_default() {
    let tmp = TempDir::new().unwrap();
    let output = render(&ModelpackConfig::default(), tmp.path());

    assert!(output.contains(r#"RUN --mount=type=cache,target=/root/.cache/pip pip install "cog""#));
}

#[test]
fn dockerfile_installs_server_wheel_from_staging() {
    let tmp = TempDir::new().unwrap();
    let config = ModelpackConfig::default();
    let wheel = ServerWheel {
        filename: "cog-0.0.1.dev-py3-none-any.whl".to_owned(),
        bytes: b"PK\x03\x04".to_vec(),
    };

    let staging = StagingArea::create(tmp.path()).unwrap();
    let output = DockerfileGenerator::new(&config, tmp.path(), &staging)
        .with_server_wheel(&wheel)
        .render_base()
        .unwrap();

    assert_eq!(
        std::fs::read(staging.path().join("cog-0.0.1.dev-py3-none-any.whl")).unwrap(),
        b"PK\x03\x04"
    );
    assert!(output.contains("pip install /tmp/cog-0.0.1.dev-py3-none-any.whl"));
    assert!(!output.contains(r#"pip install "cog""#));

    staging.cleanup().unwrap();
}

#[test]
fn dockerfile_run_commands_in_order() {
    let tmp = TempDir::new().unwrap();
    let mut config = ModelpackConfig::default();
    config.build.run = vec!["  echo one  ".to_owned(), "echo two".to_owned()];
    config.build.pre_install = vec!["echo legacy".to_owned()];

    let output = render(&config, tmp.path());

    let one = output.find("RUN echo one\n").unwrap();
    let two = output.find("RUN echo two\n").unwrap();
    let legacy = output.find("RUN echo legacy\n").unwrap();
    assert!(one < two && two < legacy);
}

#[test]
fn dockerfile_rejects_multiline_run_command() {
    let tmp = TempDir::new().unwrap();
    let mut config = ModelpackConfig::default();
    config.build.run = vec!["echo a\necho b".to_owned()];

    let staging = StagingArea::create(tmp.path()).unwrap();
    let err = DockerfileGenerator::new(&config, tmp.path(), &staging)
        .render()
        .unwrap_err();

    assert!(matches!(err, GenerateError::MultilineRunCommand { .. }));
    assert!(err.to_string().contains("echo a\necho b"));
}

#[test]
fn dockerfile_rejects_invalid_python_version() {
    let tmp = TempDir::new().unwrap();
    let mut config = ModelpackConfig::default();
    config.build.python_version = "latest".to_owned();

    let staging = StagingArea::create(tmp.path()).unwrap();
    let err = DockerfileGenerator::new(&config, tmp.path(), &staging)
        .render()
        .unwrap_err();

    assert!(matches!(err, GenerateError::Config(_)));
}

#[test]
fn dockerfile_without_grouping_copies_everything() {
    let tmp = TempDir::new().unwrap();
    write_bytes(&tmp.path().join("predict.py"), 10);
    let mut config = ModelpackConfig::default();
    config.layers.group_files = false;

    let output = render(&config, tmp.path());

    assert!(output.ends_with("\nCOPY . /src"));
    assert!(!output.contains("COPY predict.py"));
}

#[test]
fn dockerfile_ends_with_grouped_workspace_copy() {
    let tmp = TempDir::new().unwrap();
    write_bytes(&tmp.path().join("predict.py"), 10);
    write_bytes(&tmp.path().join("weights/model.pt"), 10);

    let output = render(&small_layers(1, 100), tmp.path());

    // Staging lives in .modelpack, which is itself a workspace directory.
    assert!(output.contains("\nCOPY predict.py /src\n"));
    assert!(output.contains("COPY .modelpack /src/.modelpack"));
    assert!(output.ends_with("COPY weights /src/weights"));
}

// ── Staging Tests ──

#[test]
fn staging_lives_under_project() {
    let tmp = TempDir::new().unwrap();
    let staging = StagingArea::create(tmp.path()).unwrap();

    assert!(staging.path().starts_with(tmp.path().join(".modelpack/tmp")));
    assert!(staging.relative_path().starts_with(".modelpack/tmp"));
    assert!(
        staging
            .relative_path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("build")
    );
}

#[test]
fn staging_write_returns_copy_line() {
    let tmp = TempDir::new().unwrap();
    let staging = StagingArea::create(tmp.path()).unwrap();

    let (lines, container_path) = staging.write("extra/config.json", b"{}").unwrap();

    assert_eq!(container_path, "/tmp/extra/config.json");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("COPY .modelpack/tmp/build"));
    assert!(lines[0].ends_with("/extra/config.json /tmp/extra/config.json"));
    assert!(staging.path().join("extra/config.json").exists());
}

#[test]
fn staging_cleanup_removes_directory() {
    let tmp = TempDir::new().unwrap();
    let staging = StagingArea::create(tmp.path()).unwrap();
    let path = staging.path().to_path_buf();

    staging.cleanup().unwrap();

    assert!(!path.exists());
}

#[test]
fn staging_keep_leaves_directory() {
    let tmp = TempDir::new().unwrap();
    let staging = StagingArea::create(tmp.path()).unwrap();

    let kept = staging.keep();

    assert!(kept.exists());
}
