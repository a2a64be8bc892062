//! Section registry and table of contents.
//!
//! Sections and documents are registered while the source tree is walked,
//! in whatever order the filesystem yields them. The rendered TOC is always
//! in `(section, document)` order.

use std::collections::BTreeMap;

use tracing::debug;

use databook_shared::{CanonicalName, DataBookError, Result, Section, TocEntry};

/// First lines of every rendered table of contents.
pub const TOC_HEADER: &str = "# Table of Contents\n\n";

/// Document name of the generated TOC page.
pub const TOC_DOCUMENT_NAME: &str = "Table of Contents";

/// Section name used for the TOC when the book has no section 0.
pub const DEFAULT_FRONT_MATTER_NAME: &str = "Intro";

/// Appended to the TOC line of a reference document.
pub const ATTACHMENT_SUFFIX: &str = " (Attachment)";

/// Accumulated sections and documents of one compile run.
#[derive(Debug, Clone, Default)]
pub struct Contents {
    sections: BTreeMap<u32, Section>,
}

impl Contents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a section. Repeating a number with the same name is a no-op.
    pub fn add_section(&mut self, number: u32, name: &str) -> Result<()> {
        if let Some(existing) = self.sections.get(&number) {
            if existing.name == name {
                return Ok(());
            }
            return Err(DataBookError::naming(format!(
                "section {number} is already named {:?}, cannot also be {name:?}",
                existing.name
            )));
        }
        self.sections.insert(
            number,
            Section {
                number,
                name: name.to_string(),
                documents: BTreeMap::new(),
            },
        );
        debug!(number, name, "section registered");
        Ok(())
    }

    /// Register a document under an already registered section.
    ///
    /// Document `0.0` is reserved for the generated table of contents.
    pub fn add_sub_section(&mut self, section: u32, document: u32, name: &str) -> Result<()> {
        if section == 0 && document == 0 {
            return Err(DataBookError::naming(format!(
                "document 0.0 ({name:?}) is reserved for the table of contents"
            )));
        }
        let entry = self.sections.get_mut(&section).ok_or_else(|| {
            DataBookError::validation(format!("section {section} is not registered"))
        })?;
        if let Some(existing) = entry.documents.get(&document) {
            return Err(DataBookError::naming(format!(
                "document {section}.{document} is already {existing:?}, cannot also be {name:?}"
            )));
        }
        entry.documents.insert(document, name.to_string());
        Ok(())
    }

    /// Registered name of a section.
    pub fn section_name(&self, number: u32) -> Option<&str> {
        self.sections.get(&number).map(|s| s.name.as_str())
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn document_count(&self) -> usize {
        self.sections.values().map(|s| s.documents.len()).sum()
    }

    /// Every registered document, section-major then document-minor.
    pub fn entries(&self) -> Vec<TocEntry> {
        self.sections
            .values()
            .flat_map(|section| {
                section.documents.iter().map(|(number, name)| TocEntry {
                    section_number: section.number,
                    document_number: *number,
                    section_name: section.name.clone(),
                    document_name: name.clone(),
                })
            })
            .collect()
    }

    /// One `<section>.<document> <name>` line per document.
    pub fn lines(&self) -> Vec<String> {
        self.entries().iter().map(ToString::to_string).collect()
    }

    /// Markdown source of the table of contents page.
    pub fn render_toc(&self) -> String {
        let mut out = String::from(TOC_HEADER);
        for line in self.lines() {
            out.push_str(&line);
            out.push_str("\n\n");
        }
        out
    }

    /// Build-area identity of the rendered TOC: section 0, document 0.
    pub fn toc_canonical_name(&self) -> Result<CanonicalName> {
        let section_name = self.section_name(0).unwrap_or(DEFAULT_FRONT_MATTER_NAME);
        CanonicalName::new(0, 0, section_name, TOC_DOCUMENT_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toc_is_ordered_regardless_of_registration_order() {
        let mut contents = Contents::new();
        contents.add_section(10, "Ten").unwrap();
        contents.add_sub_section(10, 1, "Late").unwrap();
        contents.add_section(2, "Two").unwrap();
        contents.add_sub_section(2, 11, "Eleven").unwrap();
        contents.add_sub_section(2, 3, "Three").unwrap();
        contents.add_section(0, "Front").unwrap();
        contents.add_sub_section(0, 1, "Cover").unwrap();

        assert_eq!(
            contents.lines(),
            vec!["0.1 Cover", "2.3 Three", "2.11 Eleven", "10.1 Late"]
        );
        assert_eq!(contents.document_count(), 4);
    }

    #[test]
    fn scope_scenario_lines() {
        let mut contents = Contents::new();
        contents.add_section(1, "Scope").unwrap();
        contents.add_sub_section(1, 2, "Appendix").unwrap();
        contents.add_sub_section(1, 1, "Overview").unwrap();

        let toc = contents.render_toc();
        assert!(toc.starts_with(TOC_HEADER));
        let body: Vec<&str> = toc[TOC_HEADER.len()..]
            .lines()
            .filter(|l| !l.is_empty())
            .collect();
        assert_eq!(body, vec!["1.1 Overview", "1.2 Appendix"]);
    }

    #[test]
    fn add_section_is_idempotent_for_same_name() {
        let mut contents = Contents::new();
        contents.add_section(1, "Scope").unwrap();
        contents.add_section(1, "Scope").unwrap();
        let err = contents.add_section(1, "Other").unwrap_err();
        assert!(err.is_naming());
    }

    #[test]
    fn duplicate_document_number_rejected() {
        let mut contents = Contents::new();
        contents.add_section(1, "Scope").unwrap();
        contents.add_sub_section(1, 1, "Overview").unwrap();
        let err = contents.add_sub_section(1, 1, "Again").unwrap_err();
        assert!(err.is_naming());
        assert_eq!(contents.document_count(), 1);
    }

    #[test]
    fn unknown_section_rejected() {
        let mut contents = Contents::new();
        assert!(contents.add_sub_section(4, 1, "Orphan").is_err());
    }

    #[test]
    fn toc_slot_is_reserved() {
        let mut contents = Contents::new();
        contents.add_section(0, "Front").unwrap();
        assert!(contents.add_sub_section(0, 0, "Cover").is_err());
        assert_eq!(
            contents.toc_canonical_name().unwrap().file_name(),
            "00-00 [Front] [Table of Contents].pdf"
        );
    }

    #[test]
    fn toc_name_defaults_without_front_matter() {
        let contents = Contents::new();
        assert_eq!(
            contents.toc_canonical_name().unwrap().to_string(),
            "00-00 [Intro] [Table of Contents]"
        );
        assert_eq!(contents.render_toc(), TOC_HEADER);
    }
}
