//! Dockerfile generation and workspace layer planning for modelpack.
//!
//! # Generation pipeline
//!
//! ```text
//! modelpack dockerfile
//!   1. Config     ── modelpack.toml → ModelpackConfig
//!   2. Staging    ── .modelpack/tmp/build*/ (requirements.txt, server wheel)
//!   3. Base       ── FROM, env, tini, python, server, apt, pip, run
//!   4. Workspace  ── layers::copy_workspace() → COPY instructions
//! ```
//!
//! # Workspace layers
//!
//! With `[layers] group_files = true` (the default), top-level entries are
//! split by size:
//! - Large files (over `size_threshold`) share one `COPY`
//! - Small files are spread over `max_file_groups` `COPY`s
//! - Directories get one `COPY` each, keeping their relative path
//!
//! Otherwise the whole workspace is copied with `COPY . /src`.

pub mod dockerfile;
pub mod layers;
pub mod staging;

pub use dockerfile::{DockerfileGenerator, GenerateError};
pub use layers::{LayerError, LayerPlan};
pub use staging::StagingArea;
