//! Source file classification.
//!
//! Section directories are named `#<number><name>`; the files inside are
//! classified purely by the shape of their names:
//!
//! | Pattern             | Kind      |
//! |---------------------|-----------|
//! | `#<n><name>.md`     | Authored  |
//! | `#<n>&<name>.pdf`   | Prepared  |
//! | `#<n>%<name>.pdf`   | Direct    |
//! | `#<n>$<name>.pdf`   | Reference |

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use databook_shared::{
    CanonicalName, DataBookError, Document, DocumentKind, Result, validate_name, validate_number,
};

static SECTION_DIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#(\d+)(.*)$").expect("valid regex"));

static FILE_PATTERNS: LazyLock<[(DocumentKind, Regex); 4]> = LazyLock::new(|| {
    [
        (DocumentKind::Prepared, Regex::new(r"^#(\d+)&(.*)\.pdf$").expect("valid regex")),
        (DocumentKind::Direct, Regex::new(r"^#(\d+)%(.*)\.pdf$").expect("valid regex")),
        (DocumentKind::Reference, Regex::new(r"^#(\d+)\$(.*)\.pdf$").expect("valid regex")),
        (DocumentKind::Authored, Regex::new(r"^#(\d+)(.*)\.md$").expect("valid regex")),
    ]
});

/// Number and name parsed from a directory or file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub number: u32,
    pub name: String,
}

/// The result of classifying one file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Authored(ParsedName),
    Prepared(ParsedName),
    Direct(ParsedName),
    Reference(ParsedName),
    Unrecognized { reason: String },
}

impl Classification {
    fn recognized(kind: DocumentKind, parsed: ParsedName) -> Self {
        match kind {
            DocumentKind::Authored => Self::Authored(parsed),
            DocumentKind::Prepared => Self::Prepared(parsed),
            DocumentKind::Direct => Self::Direct(parsed),
            DocumentKind::Reference => Self::Reference(parsed),
        }
    }
}

/// Split `#<digits><rest>` captures into a validated number and trimmed name.
fn parse_fields(digits: &str, rest: &str) -> Result<ParsedName> {
    let number: u32 = digits
        .parse()
        .map_err(|_| DataBookError::naming(format!("number {digits} is too large")))?;
    validate_number(number)?;
    let name = rest.trim().to_string();
    validate_name(&name)?;
    Ok(ParsedName { number, name })
}

/// Match a file name against the source patterns; `Err` carries the reason it is unusable.
fn match_file(file_name: &str) -> std::result::Result<(DocumentKind, ParsedName), String> {
    let (kind, caps) = FILE_PATTERNS
        .iter()
        .find_map(|(kind, re)| re.captures(file_name).map(|caps| (*kind, caps)))
        .ok_or_else(|| "does not match any source file pattern".to_string())?;
    let parsed = parse_fields(&caps[1], &caps[2]).map_err(|e| e.to_string())?;
    Ok((kind, parsed))
}

/// Classify a file by its name alone.
pub fn classify(file_name: &str) -> Classification {
    match match_file(file_name) {
        Ok((kind, parsed)) => Classification::recognized(kind, parsed),
        Err(reason) => Classification::Unrecognized { reason },
    }
}

/// A section directory: `#<number><name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDir {
    pub number: u32,
    pub name: String,
    pub path: PathBuf,
}

impl SectionDir {
    /// Parse the final component of `path` as a section directory name.
    pub fn parse(path: &Path) -> Result<Self> {
        let dir_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DataBookError::naming(format!("{path:?} has no usable name")))?;
        let ParsedName { number, name } = parse_section_name(dir_name)?;
        Ok(Self {
            number,
            name,
            path: path.to_path_buf(),
        })
    }

    /// Classify `file_name` within this section into a [`Document`].
    pub fn document(&self, file_name: &str) -> Result<Document> {
        let (kind, parsed) = match classify(file_name) {
            Classification::Authored(parsed) => (DocumentKind::Authored, parsed),
            Classification::Prepared(parsed) => (DocumentKind::Prepared, parsed),
            Classification::Direct(parsed) => (DocumentKind::Direct, parsed),
            Classification::Reference(parsed) => (DocumentKind::Reference, parsed),
            Classification::Unrecognized { reason } => {
                return Err(DataBookError::naming(format!(
                    "file not recognised {file_name:?}: {reason}"
                )));
            }
        };

        let canonical_name =
            CanonicalName::new(self.number, parsed.number, &self.name, &parsed.name)?;
        Ok(Document {
            section_number: self.number,
            document_number: parsed.number,
            name: parsed.name,
            kind,
            source_path: self.path.join(file_name),
            canonical_name,
        })
    }
}

/// Parse a directory name of the form `#<number><name>`.
pub fn parse_section_name(dir_name: &str) -> Result<ParsedName> {
    let caps = SECTION_DIR_RE.captures(dir_name).ok_or_else(|| {
        DataBookError::naming(format!(
            "directory {dir_name:?} does not start with #<number>"
        ))
    })?;
    parse_fields(&caps[1], &caps[2])
        .map_err(|e| DataBookError::naming(format!("directory {dir_name:?}: {e}")))
}

/// Whether a directory name marks a section at all. Unmarked directories are ignored.
pub fn is_section_candidate(dir_name: &str) -> bool {
    dir_name.contains('#')
}
