//! Core domain types for DataBook builds.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DataBookError, Result};

/// Current schema version for the build manifest format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Largest section or document number. Canonical names pad to two digits,
/// so anything larger would no longer sort numerically.
pub const MAX_NUMBER: u32 = 99;

// ---------------------------------------------------------------------------
// DocumentKind
// ---------------------------------------------------------------------------

/// How a source file becomes part of the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Markdown rendered through the external renderer.
    Authored,
    /// Externally pre-rendered PDF, checked against its declared source.
    Prepared,
    /// Hand-edited PDF, passed through verbatim.
    Direct,
    /// Stamped on every page and attached rather than merged inline.
    Reference,
}

impl DocumentKind {
    /// Whether documents of this kind are merged into the page sequence.
    pub fn is_inline(self) -> bool {
        !matches!(self, Self::Reference)
    }

    /// Short description used in progress logs.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Authored => "markdown file",
            Self::Prepared => "prepared PDF file",
            Self::Direct => "directly edited PDF",
            Self::Reference => "reference document/attachment",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Authored => "authored",
            Self::Prepared => "prepared",
            Self::Direct => "direct",
            Self::Reference => "reference",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// CanonicalName
// ---------------------------------------------------------------------------

static CANONICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2})-(\d{2}) \[([^\[\]/\\]*)\] \[([^\[\]/\\]*)\]$").expect("valid regex")
});

/// Check that a section or document name can be embedded in a canonical name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DataBookError::naming("name is empty"));
    }
    if name.trim() != name {
        return Err(DataBookError::naming(format!(
            "name {name:?} has surrounding whitespace"
        )));
    }
    if let Some(c) = name.chars().find(|c| matches!(c, '[' | ']' | '/' | '\\')) {
        return Err(DataBookError::naming(format!(
            "name {name:?} contains reserved character {c:?}"
        )));
    }
    Ok(())
}

/// Check that a section or document number fits the two-digit encoding.
pub fn validate_number(number: u32) -> Result<()> {
    if number > MAX_NUMBER {
        return Err(DataBookError::naming(format!(
            "number {number} exceeds the maximum of {MAX_NUMBER}"
        )));
    }
    Ok(())
}

/// Normalized build-area identity of one document:
/// `SS-DD [SectionName] [DocumentName]`.
///
/// Sorting the rendered strings gives the same order as sorting by
/// `(section_number, document_number)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalName {
    pub section_number: u32,
    pub document_number: u32,
    pub section_name: String,
    pub document_name: String,
}

impl CanonicalName {
    /// Build a canonical name, rejecting values that would not round-trip.
    pub fn new(
        section_number: u32,
        document_number: u32,
        section_name: impl Into<String>,
        document_name: impl Into<String>,
    ) -> Result<Self> {
        let section_name = section_name.into();
        let document_name = document_name.into();
        validate_number(section_number)?;
        validate_number(document_number)?;
        validate_name(&section_name)?;
        validate_name(&document_name)?;
        Ok(Self {
            section_number,
            document_number,
            section_name,
            document_name,
        })
    }

    /// File name of the artifact in the authored build area.
    pub fn file_name(&self) -> String {
        format!("{self}.pdf")
    }

    /// File name of a stamped reference document in the reference build area.
    pub fn reference_file_name(&self) -> String {
        format!(
            "{:02}-{:02} {}-{}.pdf",
            self.section_number, self.document_number, self.section_name, self.document_name
        )
    }

    /// Parse a build-area file name (with or without the `.pdf` extension).
    pub fn parse_file_name(file_name: &str) -> Result<Self> {
        file_name
            .strip_suffix(".pdf")
            .unwrap_or(file_name)
            .parse()
    }
}

impl fmt::Display for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}-{:02} [{}] [{}]",
            self.section_number, self.document_number, self.section_name, self.document_name
        )
    }
}

impl FromStr for CanonicalName {
    type Err = DataBookError;

    fn from_str(s: &str) -> Result<Self> {
        let caps = CANONICAL_RE
            .captures(s)
            .ok_or_else(|| DataBookError::naming(format!("{s:?} is not a canonical name")))?;

        // Two ASCII digits always fit in a u32.
        let section_number: u32 = caps[1].parse().unwrap_or_default();
        let document_number: u32 = caps[2].parse().unwrap_or_default();

        Self::new(section_number, document_number, &caps[3], &caps[4])
    }
}

// ---------------------------------------------------------------------------
// Section / Document
// ---------------------------------------------------------------------------

/// One numbered unit from one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub section_number: u32,
    pub document_number: u32,
    pub name: String,
    pub kind: DocumentKind,
    pub source_path: PathBuf,
    pub canonical_name: CanonicalName,
}

/// A numbered grouping from one source directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub number: u32,
    pub name: String,
    /// Table-of-contents names keyed by document number. The full
    /// [`Document`] records are kept by the caller.
    pub documents: BTreeMap<u32, String>,
}

// ---------------------------------------------------------------------------
// TocEntry
// ---------------------------------------------------------------------------

/// A single line of the table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub section_number: u32,
    pub document_number: u32,
    pub section_name: String,
    pub document_name: String,
}

impl fmt::Display for TocEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} {}",
            self.section_number, self.document_number, self.document_name
        )
    }
}

// ---------------------------------------------------------------------------
// Bookmarks
// ---------------------------------------------------------------------------

/// One node of the merged document's outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bookmark {
    pub label: String,
    /// 0-based index into the merged output's pages.
    pub page_index: usize,
    /// Index of the parent node within the owning [`BookmarkTree`].
    pub parent: Option<usize>,
    /// Section-level nodes are shown bold.
    pub bold: bool,
}

/// Outline nodes in creation order. A parent always precedes its children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BookmarkTree {
    nodes: Vec<Bookmark>,
}

impl BookmarkTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bold top-level node and return its index.
    pub fn push_root(&mut self, label: impl Into<String>, page_index: usize) -> usize {
        self.nodes.push(Bookmark {
            label: label.into(),
            page_index,
            parent: None,
            bold: true,
        });
        self.nodes.len() - 1
    }

    /// Add a child under `parent` and return its index.
    pub fn push_child(
        &mut self,
        parent: usize,
        label: impl Into<String>,
        page_index: usize,
    ) -> usize {
        self.nodes.push(Bookmark {
            label: label.into(),
            page_index,
            parent: Some(parent),
            bold: false,
        });
        self.nodes.len() - 1
    }

    pub fn nodes(&self) -> &[Bookmark] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Indices of the top-level nodes.
    pub fn roots(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of the direct children of `parent`.
    pub fn children(&self, parent: usize) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent == Some(parent))
            .map(|(i, _)| i)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// BuildManifest
// ---------------------------------------------------------------------------

/// One artifact produced by the compile phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub canonical_name: CanonicalName,
    pub kind: DocumentKind,
    /// Source file the artifact was produced from.
    pub source_path: PathBuf,
    /// Path of the artifact inside a build area.
    pub artifact_path: PathBuf,
    pub sha256: String,
}

/// The `manifest.json` written to the authored build area after compiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildManifest {
    pub schema_version: u32,
    pub tool_version: String,
    pub title: String,
    pub datestamp: String,
    pub created_at: DateTime<Utc>,
    /// Artifacts merged inline, in canonical order.
    pub documents: Vec<ManifestEntry>,
    /// Stamped reference documents, in canonical order.
    pub references: Vec<ManifestEntry>,
}

impl BuildManifest {
    /// Paths of inline artifacts in merge order.
    pub fn inline_paths(&self) -> Vec<PathBuf> {
        self.documents
            .iter()
            .map(|e| e.artifact_path.clone())
            .collect()
    }

    /// Paths of reference artifacts in canonical order.
    pub fn reference_paths(&self) -> Vec<PathBuf> {
        self.references
            .iter()
            .map(|e| e.artifact_path.clone())
            .collect()
    }
}
