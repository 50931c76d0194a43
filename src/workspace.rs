//! Workspace collaborators
//!
//! The analyzer never touches the host environment directly. Document text,
//! file enumeration and change notifications come through the narrow
//! contracts defined here; [`FsWorkspace`] implements them on top of the
//! local file system.

use anyhow::{Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tree_sitter::Point;

use crate::models::Position;

/// Include glob for every eligible source file
pub const SOURCE_GLOB: &str = "**/*.{ts,tsx,mts,cts}";

/// Include glob for module declaration files
pub const MODULE_GLOB: &str = "**/*.module.ts";

/// Source text of one file plus line/offset bookkeeping
#[derive(Debug, Clone)]
pub struct TextDocument {
    path: PathBuf,
    text: String,
    /// Byte offset of the first character of every line
    line_starts: Vec<usize>,
}

impl TextDocument {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));

        Self {
            path: path.into(),
            text,
            line_starts,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Text of a line without its terminator
    pub fn line_text(&self, line: usize) -> Option<&str> {
        let start = *self.line_starts.get(line)?;
        let end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        let raw = &self.text[start..end];
        Some(raw.strip_suffix('\r').unwrap_or(raw))
    }

    /// Byte offset of `position`, clamped to the document
    pub fn offset_at(&self, position: Position) -> usize {
        let Some(line) = self.line_text(position.line) else {
            return self.text.len();
        };
        let start = self.line_starts[position.line];
        let column = line
            .char_indices()
            .nth(position.character)
            .map(|(i, _)| i)
            .unwrap_or(line.len());
        start + column
    }

    /// Position of a byte offset, clamped to the document
    pub fn position_at(&self, offset: usize) -> Position {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }

        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let start = self.line_starts[line];
        let character = self.text[start..offset].chars().count();
        Position::new(line, character)
    }

    /// Tree-sitter point (row, byte column) of `position`
    pub fn point_at(&self, position: Position) -> Point {
        let offset = self.offset_at(position);
        let line = self.position_at(offset).line;
        Point::new(line, offset - self.line_starts[line])
    }

    /// Position of a tree-sitter point
    pub fn position_of_point(&self, point: Point) -> Position {
        match self.line_starts.get(point.row) {
            Some(start) => self.position_at(start + point.column),
            None => self.position_at(self.text.len()),
        }
    }
}

/// Supplies the current text of documents
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    /// Read the current content of `path`
    async fn open(&self, path: &Path) -> Result<TextDocument>;
}

/// Enumerates workspace files by glob
#[async_trait]
pub trait FileEnumerator: Send + Sync {
    /// Every workspace file matching `include` and none of `exclude`
    async fn find_files(&self, include: &str, exclude: &[String]) -> Result<Vec<PathBuf>>;

    /// Like [`find_files`](Self::find_files), restricted to the subtree under `dir`
    async fn find_files_in(
        &self,
        dir: &Path,
        include: &str,
        exclude: &[String],
    ) -> Result<Vec<PathBuf>>;
}

/// Kind of a file-system change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Changed,
    Deleted,
}

/// A change notification for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Whether `path` follows the module declaration naming convention
pub fn is_module_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| name.ends_with(".module.ts"))
        .unwrap_or(false)
}

/// Compile a list of glob patterns into one matcher
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .with_context(|| format!("Invalid glob pattern: {}", pattern))?;
        builder.add(glob);
    }
    builder.build().context("Failed to build glob set")
}

/// File-system backed workspace rooted at a directory
#[derive(Debug, Clone)]
pub struct FsWorkspace {
    root: PathBuf,
}

impl FsWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn walk(root: &Path, dir: &Path, include: &GlobSet, exclude: &GlobSet) -> Result<Vec<PathBuf>> {
        let relative = |path: &Path| -> PathBuf {
            path.strip_prefix(root).unwrap_or(path).to_path_buf()
        };

        let exclude_for_dirs = exclude.clone();
        let root_for_dirs = root.to_path_buf();
        let walker = WalkBuilder::new(dir)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
                if !is_dir {
                    return true;
                }
                let rel = entry
                    .path()
                    .strip_prefix(&root_for_dirs)
                    .unwrap_or(entry.path());
                // Prune a directory when anything directly inside it would be excluded
                !exclude_for_dirs.is_match(rel.join("_"))
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let rel = relative(entry.path());
            if include.is_match(&rel) && !exclude.is_match(&rel) {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl DocumentProvider for FsWorkspace {
    async fn open(&self, path: &Path) -> Result<TextDocument> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        Ok(TextDocument::new(path, text))
    }
}

#[async_trait]
impl FileEnumerator for FsWorkspace {
    async fn find_files(&self, include: &str, exclude: &[String]) -> Result<Vec<PathBuf>> {
        let root = self.root.clone();
        self.find_files_in(&root, include, exclude).await
    }

    async fn find_files_in(
        &self,
        dir: &Path,
        include: &str,
        exclude: &[String],
    ) -> Result<Vec<PathBuf>> {
        let include = build_globset(&[include.to_string()])?;
        let exclude = build_globset(exclude)?;
        let root = self.root.clone();
        let dir = dir.to_path_buf();

        log::debug!("Enumerating files under {:?}", dir);

        tokio::task::spawn_blocking(move || Self::walk(&root, &dir, &include, &exclude))
            .await
            .context("File enumeration task failed")?
    }
}
