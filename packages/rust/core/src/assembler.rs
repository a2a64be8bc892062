//! Linker: merges build-area documents into the bound book.
//!
//! Inputs are canonical build-area files. Sorting them by file name yields
//! the book's page order, because canonical names start with the zero-padded
//! `SS-DD` prefix. Two page counters run through the merge:
//!
//! - `raw_pages` counts every page and locates bookmarks,
//! - `visible_pages` counts only pages of sections > 0 and is printed in
//!   their watermarks.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use databook_shared::{BookmarkTree, CanonicalName, DataBookError, Result};

use crate::tools::Binder;
use crate::watermark::{WatermarkContext, authored_watermark, is_watermarked};

/// File name of the merged book before attachments, kept in the build area.
pub const MERGED_FILE_NAME: &str = "~merged.pdf";

/// Running counters and bookmark cursor of one link run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyState {
    /// Pages appended so far, any section.
    pub raw_pages: usize,
    /// Pages appended so far in sections > 0.
    pub visible_pages: usize,
    /// Section of the last document that contributed a bookmark.
    pub previous_section: Option<u32>,
    /// Bookmark node that new document bookmarks nest under.
    pub active_parent: Option<usize>,
}

impl AssemblyState {
    /// Count one appended page. Returns the visible page number when the page
    /// carries a watermark.
    pub fn advance_page(&mut self, section_number: u32) -> Option<usize> {
        self.raw_pages += 1;
        if is_watermarked(section_number) {
            self.visible_pages += 1;
            Some(self.visible_pages)
        } else {
            None
        }
    }

    /// Add the bookmark for a document whose first page sits at `first_page`.
    ///
    /// A change of section opens a bold top-level node named after the
    /// section; further documents of that section become its children.
    pub fn place_bookmark(
        &mut self,
        tree: &mut BookmarkTree,
        name: &CanonicalName,
        first_page: usize,
    ) -> usize {
        match self.active_parent {
            Some(parent) if self.previous_section == Some(name.section_number) => {
                tree.push_child(parent, &name.document_name, first_page)
            }
            _ => {
                let node = tree.push_root(&name.section_name, first_page);
                self.previous_section = Some(name.section_number);
                self.active_parent = Some(node);
                node
            }
        }
    }
}

/// Outcome of one link run.
#[derive(Debug, Clone, Default)]
pub struct LinkReport {
    pub state: AssemblyState,
    pub bookmarks: BookmarkTree,
    /// Documents merged, in page order.
    pub linked: Vec<CanonicalName>,
    /// Inputs whose names did not parse.
    pub skipped: Vec<PathBuf>,
}

/// Merge `inputs` through `binder` and write the result to `output`.
#[instrument(skip_all, fields(inputs = inputs.len(), output = %output.display()))]
pub fn link(
    inputs: &[PathBuf],
    binder: &mut dyn Binder,
    ctx: &WatermarkContext,
    output: &Path,
) -> Result<LinkReport> {
    let mut ordered: Vec<&PathBuf> = inputs.iter().collect();
    ordered.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut report = LinkReport::default();

    for path in ordered {
        let name = match canonical_name_of(path) {
            Ok(name) => name,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "not a canonical build-area name, skipping");
                report.skipped.push(path.clone());
                continue;
            }
        };

        let first_page = report.state.raw_pages;
        let pages = binder.open(path)?;
        for index in 0..pages {
            match report.state.advance_page(name.section_number) {
                Some(visible) => {
                    let text = authored_watermark(ctx, &name, visible);
                    binder.append_page(index, Some(&text))?;
                }
                None => binder.append_page(index, None)?,
            }
        }

        if pages == 0 {
            warn!(document = %name, "document has no pages, no bookmark placed");
        } else {
            report
                .state
                .place_bookmark(&mut report.bookmarks, &name, first_page);
        }
        debug!(document = %name, pages, first_page, "document linked");
        report.linked.push(name);
    }

    binder.finish(&report.bookmarks, output)?;

    info!(
        documents = report.linked.len(),
        raw_pages = report.state.raw_pages,
        visible_pages = report.state.visible_pages,
        bookmarks = report.bookmarks.len(),
        skipped = report.skipped.len(),
        "link complete"
    );
    Ok(report)
}

fn canonical_name_of(path: &Path) -> Result<CanonicalName> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DataBookError::naming(format!("{path:?} has no usable file name")))?;
    CanonicalName::parse_file_name(file_name)
}

/// Every `*.pdf` in a build area, sorted by name. The merged intermediate is
/// left out.
pub fn scan_build_area(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| DataBookError::io(dir, e))? {
        let entry = entry.map_err(|e| DataBookError::io(dir, e))?;
        let path = entry.path();
        let is_pdf = path.extension().is_some_and(|ext| ext == "pdf");
        let is_merged = path.file_name().is_some_and(|n| n == MERGED_FILE_NAME);
        if path.is_file() && is_pdf && !is_merged {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Records what a real binder would write.
    #[derive(Default)]
    struct FakeBinder {
        pages: HashMap<PathBuf, usize>,
        appended: Vec<(PathBuf, usize, Option<String>)>,
        open: Option<PathBuf>,
        finished: Option<(BookmarkTree, PathBuf)>,
    }

    impl FakeBinder {
        fn with(docs: &[(&str, usize)]) -> Self {
            Self {
                pages: docs.iter().map(|(n, p)| (PathBuf::from(n), *p)).collect(),
                ..Self::default()
            }
        }
    }

    impl Binder for FakeBinder {
        fn open(&mut self, path: &Path) -> Result<usize> {
            let pages = self
                .pages
                .get(path)
                .copied()
                .ok_or_else(|| DataBookError::Pdf(format!("{}: missing", path.display())))?;
            self.open = Some(path.to_path_buf());
            Ok(pages)
        }

        fn append_page(&mut self, index: usize, watermark: Option<&str>) -> Result<()> {
            let path = self.open.clone().expect("open before append");
            self.appended.push((path, index, watermark.map(String::from)));
            Ok(())
        }

        fn finish(&mut self, outline: &BookmarkTree, output: &Path) -> Result<()> {
            self.finished = Some((outline.clone(), output.to_path_buf()));
            Ok(())
        }
    }

    fn ctx() -> WatermarkContext {
        WatermarkContext {
            title: "Plant Handbook".into(),
            datestamp: "2024-01-31".into(),
        }
    }

    fn paths(docs: &[(&str, usize)]) -> Vec<PathBuf> {
        docs.iter().map(|(n, _)| PathBuf::from(n)).collect()
    }

    const BOOK: &[(&str, usize)] = &[
        ("00-00 [Intro] [Table of Contents].pdf", 1),
        ("00-01 [Intro] [Cover].pdf", 2),
        ("01-01 [Scope] [Overview].pdf", 3),
        ("01-02 [Scope] [Appendix].pdf", 4),
        ("02-01 [Data] [Rates].pdf", 5),
    ];

    #[test]
    fn counters_track_raw_and_visible_pages() {
        let mut binder = FakeBinder::with(BOOK);
        let report = link(&paths(BOOK), &mut binder, &ctx(), Path::new("out.pdf")).unwrap();

        assert_eq!(report.state.raw_pages, 15);
        assert_eq!(report.state.visible_pages, 12);
        assert_eq!(binder.appended.len(), 15);
        assert_eq!(report.linked.len(), 5);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn front_matter_is_never_watermarked() {
        let mut binder = FakeBinder::with(BOOK);
        link(&paths(BOOK), &mut binder, &ctx(), Path::new("out.pdf")).unwrap();

        for (path, _, watermark) in &binder.appended {
            let section0 = path.to_string_lossy().starts_with("00-");
            assert_eq!(watermark.is_none(), section0, "{}", path.display());
        }

        let visible: Vec<String> = binder
            .appended
            .iter()
            .filter_map(|(_, _, w)| w.clone())
            .collect();
        assert!(visible[0].starts_with("1.1 Scope - Overview"));
        assert!(visible[0].contains("page 1 "));
        assert!(visible[3].starts_with("1.2 Scope - Appendix"));
        assert!(visible[3].contains("page 4 "));
        assert!(visible[11].contains("page 12 "));
    }

    #[test]
    fn bookmarks_follow_section_changes() {
        let mut binder = FakeBinder::with(BOOK);
        let report = link(&paths(BOOK), &mut binder, &ctx(), Path::new("out.pdf")).unwrap();
        let tree = &report.bookmarks;

        let roots = tree.roots();
        assert_eq!(roots.len(), 3);
        let labels: Vec<&str> = roots.iter().map(|&i| tree.nodes()[i].label.as_str()).collect();
        assert_eq!(labels, vec!["Intro", "Scope", "Data"]);
        assert!(roots.iter().all(|&i| tree.nodes()[i].bold));

        let intro = tree.children(roots[0]);
        assert_eq!(intro.len(), 1);
        assert_eq!(tree.nodes()[intro[0]].label, "Cover");
        assert_eq!(tree.nodes()[intro[0]].page_index, 1);

        let scope = tree.children(roots[1]);
        assert_eq!(scope.len(), 1);
        assert_eq!(tree.nodes()[scope[0]].label, "Appendix");
        assert_eq!(tree.nodes()[scope[0]].page_index, 6);
        assert_eq!(tree.nodes()[roots[1]].page_index, 3);

        assert!(tree.children(roots[2]).is_empty());
        assert_eq!(tree.nodes()[roots[2]].page_index, 10);

        let (finished, output) = binder.finished.expect("finished");
        assert_eq!(&finished, tree);
        assert_eq!(output, Path::new("out.pdf"));
    }

    #[test]
    fn inputs_are_linked_in_canonical_order() {
        let mut shuffled = paths(BOOK);
        shuffled.reverse();
        let mut binder = FakeBinder::with(BOOK);
        let report = link(&shuffled, &mut binder, &ctx(), Path::new("out.pdf")).unwrap();

        let order: Vec<String> = report.linked.iter().map(CanonicalName::file_name).collect();
        let expected: Vec<String> = BOOK.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn reruns_are_identical() {
        let mut first = FakeBinder::with(BOOK);
        let mut second = FakeBinder::with(BOOK);
        let a = link(&paths(BOOK), &mut first, &ctx(), Path::new("out.pdf")).unwrap();
        let b = link(&paths(BOOK), &mut second, &ctx(), Path::new("out.pdf")).unwrap();

        assert_eq!(a.state, b.state);
        assert_eq!(a.bookmarks, b.bookmarks);
        assert_eq!(first.appended, second.appended);
    }

    #[test]
    fn unparseable_names_are_skipped() {
        let docs: &[(&str, usize)] = &[("01-01 [Scope] [Overview].pdf", 2), ("leftover.pdf", 9)];
        let mut binder = FakeBinder::with(docs);
        let report = link(&paths(docs), &mut binder, &ctx(), Path::new("out.pdf")).unwrap();

        assert_eq!(report.skipped, vec![PathBuf::from("leftover.pdf")]);
        assert_eq!(report.state.raw_pages, 2);
    }

    #[test]
    fn empty_document_gets_no_bookmark() {
        let docs: &[(&str, usize)] = &[
            ("01-01 [Scope] [Blank].pdf", 0),
            ("01-02 [Scope] [Overview].pdf", 2),
        ];
        let mut binder = FakeBinder::with(docs);
        let report = link(&paths(docs), &mut binder, &ctx(), Path::new("out.pdf")).unwrap();

        assert_eq!(report.bookmarks.len(), 1);
        assert_eq!(report.bookmarks.nodes()[0].label, "Scope");
        assert_eq!(report.bookmarks.nodes()[0].page_index, 0);
        assert_eq!(report.linked.len(), 2);
    }

    #[test]
    fn page_read_failure_is_fatal() {
        let docs: &[(&str, usize)] = &[("01-01 [Scope] [Overview].pdf", 2)];
        let mut binder = FakeBinder::default();
        let err = link(&paths(docs), &mut binder, &ctx(), Path::new("out.pdf")).unwrap_err();
        assert!(matches!(err, DataBookError::Pdf(_)));
        assert!(binder.finished.is_none());
    }

    #[test]
    fn scan_skips_merged_and_non_pdf_files() {
        let dir = std::env::temp_dir().join(format!("databook-scan-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in [
            "01-02 [Scope] [Appendix].pdf",
            "01-01 [Scope] [Overview].pdf",
            MERGED_FILE_NAME,
            ".toc.md",
            "manifest.json",
        ] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }

        let found: Vec<String> = scan_build_area(&dir)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            found,
            vec!["01-01 [Scope] [Overview].pdf", "01-02 [Scope] [Appendix].pdf"]
        );
        assert!(scan_build_area(&dir.join("missing")).unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
