//! Workspace partitioning into cache-friendly `COPY` layers.
//!
//! Top-level workspace entries are classified by byte size, then planned
//! into groups. Each file group becomes one `COPY` instruction, each entry
//! of a folder group gets its own `COPY` so directory structure is kept.
//!
//! ```text
//! list_workspace ─► classify ─► Buckets::into_plan ─► LayerPlan::copy_instructions
//!                   (sizes)     (grouping)             (COPY lines)
//! ```
//!
//! Planning reads sizes from the filesystem synchronously. Running it against
//! a directory that is being modified at the same time can observe a torn
//! view of sizes; callers must hold the workspace stable for one call.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use modelpack_core::LayerConfig;
use serde::Serialize;
use walkdir::WalkDir;

/// Destination of the workspace inside the image.
pub const WORKSPACE_DEST: &str = "/src";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// One top-level file or directory of the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl WorkspaceEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Dir,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Resolves the byte size of a workspace entry.
///
/// Production code uses [`FsSizer`], tests use in-memory or mockall sizers.
#[cfg_attr(test, mockall::automock)]
pub trait EntrySizer {
    /// File: its length. Directory: the sum of all non-directory descendants.
    fn size_of(&self, entry: &WorkspaceEntry) -> Result<u64, LayerError>;
}

/// Reads sizes from entries under a workspace root.
///
/// Symbolic links are not followed; a link counts with its own length.
pub struct FsSizer<'a> {
    root: &'a Path,
}

impl<'a> FsSizer<'a> {
    pub fn new(root: &'a Path) -> Self {
        Self { root }
    }
}

impl EntrySizer for FsSizer<'_> {
    fn size_of(&self, entry: &WorkspaceEntry) -> Result<u64, LayerError> {
        let path = self.root.join(&entry.name);
        match entry.kind {
            EntryKind::File => std::fs::symlink_metadata(&path)
                .map(|m| m.len())
                .map_err(|e| LayerError::Io { path, source: e }),
            EntryKind::Dir => dir_size(&path),
        }
    }
}

fn dir_size(dir: &Path) -> Result<u64, LayerError> {
    let mut size = 0;
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| LayerError::Io {
            path: match e.path() {
                Some(path) => path.to_path_buf(),
                None => dir.to_path_buf(),
            },
            source: e.into(),
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let metadata = entry.metadata().map_err(|e| LayerError::Io {
            path: entry.path().to_path_buf(),
            source: e.into(),
        })?;
        size += metadata.len();
    }
    Ok(size)
}

/// Lists the top-level entries of `root`, sorted by name.
pub fn list_workspace(root: &Path) -> Result<Vec<WorkspaceEntry>, LayerError> {
    let io_err = |source| LayerError::Io {
        path: root.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for dirent in std::fs::read_dir(root).map_err(io_err)? {
        let dirent = dirent.map_err(io_err)?;
        let path = dirent.path();
        let file_type = dirent.file_type().map_err(|e| LayerError::Io {
            path: path.clone(),
            source: e,
        })?;
        let name = dirent.file_name().into_string().map_err(|_| LayerError::Io {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, "file name is not valid UTF-8"),
        })?;

        entries.push(if file_type.is_dir() {
            WorkspaceEntry::dir(name)
        } else {
            WorkspaceEntry::file(name)
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Entry names split by kind and size, each in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Buckets {
    pub small_files: Vec<String>,
    pub large_files: Vec<String>,
    pub small_dirs: Vec<String>,
    pub large_dirs: Vec<String>,
}

/// Splits entries into small/large files and directories.
///
/// Sizes equal to `threshold` count as small. The first size lookup that
/// fails aborts the classification.
pub fn classify(
    threshold: u64,
    entries: &[WorkspaceEntry],
    sizer: &impl EntrySizer,
) -> Result<Buckets, LayerError> {
    let mut buckets = Buckets::default();
    for entry in entries {
        let size = sizer.size_of(entry)?;
        let small = size <= threshold;
        tracing::debug!(name = %entry.name, kind = ?entry.kind, size, small, "classified entry");

        let bucket = match (entry.kind, small) {
            (EntryKind::File, true) => &mut buckets.small_files,
            (EntryKind::File, false) => &mut buckets.large_files,
            (EntryKind::Dir, true) => &mut buckets.small_dirs,
            (EntryKind::Dir, false) => &mut buckets.large_dirs,
        };
        bucket.push(entry.name.clone());
    }
    Ok(buckets)
}

/// Ordered entry groups, one cache layer each.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LayerPlan {
    /// Each group is copied with a single instruction into [`WORKSPACE_DEST`].
    pub file_groups: Vec<Vec<String>>,
    /// Each entry is copied with its own instruction to `WORKSPACE_DEST/<name>`.
    pub folder_groups: Vec<Vec<String>>,
}

impl Buckets {
    /// Groups the buckets into layers.
    ///
    /// Large files form one group, large and small directories one folder
    /// group each. Small files are spread over `num_groups` contiguous
    /// groups with the remainder going to the last one, or copied one per
    /// group when there are no more of them than `num_groups`.
    pub fn into_plan(self, num_groups: usize) -> Result<LayerPlan, LayerError> {
        if num_groups == 0 {
            return Err(LayerError::InvalidGroupCount(num_groups));
        }

        let mut plan = LayerPlan::default();
        if !self.large_files.is_empty() {
            plan.file_groups.push(self.large_files);
        }
        if !self.large_dirs.is_empty() {
            plan.folder_groups.push(self.large_dirs);
        }
        if !self.small_dirs.is_empty() {
            plan.folder_groups.push(self.small_dirs);
        }

        let num_smalls = self.small_files.len();
        if num_smalls <= num_groups {
            plan.file_groups
                .extend(self.small_files.into_iter().map(|f| vec![f]));
            return Ok(plan);
        }

        // TODO: even splitting still yields big layers of small files, and an
        // edit anywhere in a group rebuilds that whole layer. Grouping by
        // modification frequency would cache better.
        let per_group = num_smalls / num_groups;
        let mut smalls = self.small_files.into_iter();
        for _ in 0..num_groups {
            plan.file_groups
                .push(smalls.by_ref().take(per_group).collect());
        }
        if let Some(last) = plan.file_groups.last_mut() {
            last.extend(smalls);
        }

        tracing::debug!(
            num_smalls,
            num_groups,
            per_group,
            remainder = num_smalls % num_groups,
            "split small files"
        );
        Ok(plan)
    }
}

/// Classifies `entries` and groups them into at most `num_groups` layers of
/// small files plus dedicated layers for large entries.
///
/// `num_groups` is checked before any size is read.
pub fn plan(
    num_groups: usize,
    threshold: u64,
    entries: &[WorkspaceEntry],
    sizer: &impl EntrySizer,
) -> Result<LayerPlan, LayerError> {
    if num_groups == 0 {
        return Err(LayerError::InvalidGroupCount(num_groups));
    }
    classify(threshold, entries, sizer)?.into_plan(num_groups)
}

/// A single `COPY` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyInstruction {
    pub sources: Vec<String>,
    pub destination: String,
}

/// Shell form `COPY a b /src`, or the JSON form `COPY ["a b", "/src"]`
/// when a path contains whitespace.
impl fmt::Display for CopyInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let paths = self
            .sources
            .iter()
            .chain(std::iter::once(&self.destination));

        if !paths.clone().any(|p| p.contains(char::is_whitespace)) {
            write!(f, "COPY")?;
            for path in paths {
                write!(f, " {path}")?;
            }
            return Ok(());
        }

        let quoted = paths
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| fmt::Error)?;
        write!(f, "COPY [{}]", quoted.join(", "))
    }
}

impl LayerPlan {
    /// File groups first, then one instruction per folder entry.
    pub fn copy_instructions(&self) -> Vec<CopyInstruction> {
        let files = self.file_groups.iter().map(|group| CopyInstruction {
            sources: group.clone(),
            destination: WORKSPACE_DEST.to_owned(),
        });
        let folders = self.folder_groups.iter().flatten().map(|name| CopyInstruction {
            sources: vec![name.clone()],
            destination: format!("{WORKSPACE_DEST}/{name}"),
        });
        files.chain(folders).collect()
    }

    /// Number of entries across both channels.
    pub fn entry_count(&self) -> usize {
        self.file_groups
            .iter()
            .chain(self.folder_groups.iter())
            .map(Vec::len)
            .sum()
    }
}

/// Copy instructions for the workspace at `root`.
///
/// With grouping disabled this is a single `COPY . /src` and nothing is read
/// from disk.
pub fn copy_workspace(
    root: &Path,
    layers: &LayerConfig,
) -> Result<Vec<CopyInstruction>, LayerError> {
    if !layers.group_files {
        return Ok(vec![CopyInstruction {
            sources: vec![".".to_owned()],
            destination: WORKSPACE_DEST.to_owned(),
        }]);
    }

    let entries = list_workspace(root)?;
    let plan = plan(
        layers.max_file_groups,
        layers.size_threshold,
        &entries,
        &FsSizer::new(root),
    )?;
    Ok(plan.copy_instructions())
}

#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("failed to read size of {path}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid file group count {0}: at least one group is required")]
    InvalidGroupCount(usize),
}
