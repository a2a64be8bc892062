//! Page-by-page merging of whole PDF files into one outlined document.

use std::path::{Path, PathBuf};

use lopdf::{Bookmark, Document, Object, ObjectId, dictionary};
use tracing::{debug, instrument};

use databook_shared::{BookmarkTree, DataBookError, Result};

use crate::overlay::{INHERITABLE, OverlayStyle, add_font, inherited, overlay_page};

/// Outline entry format flag for bold text.
const BOLD: u32 = 2;

/// Builds one output document from pages of successively opened files.
///
/// Pages are taken from the most recently [`open`](Self::open)ed file, in
/// any order, optionally with a text overlay. Pages never appended are left
/// out of the page tree.
pub struct PdfBinder {
    doc: Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    style: OverlayStyle,
    kids: Vec<ObjectId>,
    open_pages: Vec<ObjectId>,
    open_path: Option<PathBuf>,
}

impl PdfBinder {
    pub fn new(style: OverlayStyle) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = add_font(&mut doc);
        Self {
            doc,
            pages_id,
            font_id,
            style,
            kids: Vec::new(),
            open_pages: Vec::new(),
            open_path: None,
        }
    }

    /// Import a file's objects and make its pages available for appending.
    /// Returns the file's page count.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(&mut self, path: &Path) -> Result<usize> {
        let mut source = Document::load(path)
            .map_err(|e| DataBookError::Pdf(format!("{}: {e}", path.display())))?;
        source.renumber_objects_with(self.doc.max_id + 1);

        let page_ids: Vec<ObjectId> = source.get_pages().into_values().collect();

        // The source page tree is dropped, so pages keep their inherited
        // attributes directly.
        let mut pages = Vec::with_capacity(page_ids.len());
        for &id in &page_ids {
            let mut dict = source
                .get_dictionary(id)
                .map_err(|e| DataBookError::Pdf(format!("{}: {e}", path.display())))?
                .clone();
            for key in INHERITABLE {
                if !dict.has(key) {
                    if let Some(value) = inherited(&source, id, key) {
                        dict.set(key, value.clone());
                    }
                }
            }
            dict.set("Parent", self.pages_id);
            pages.push((id, dict));
        }

        let highest = source
            .objects
            .keys()
            .map(|(number, _)| *number)
            .max()
            .unwrap_or(self.doc.max_id);

        for (id, object) in source.objects {
            if !is_structural(&object) {
                self.doc.objects.insert(id, object);
            }
        }
        for (id, dict) in pages {
            self.doc.objects.insert(id, Object::Dictionary(dict));
        }
        self.doc.max_id = self.doc.max_id.max(highest);

        debug!(pages = page_ids.len(), "opened source document");
        self.open_pages = page_ids;
        self.open_path = Some(path.to_path_buf());
        Ok(self.open_pages.len())
    }

    /// Append page `index` (0-based) of the open file, drawing `overlay` on it when given.
    pub fn append_page(&mut self, index: usize, overlay: Option<&str>) -> Result<()> {
        let page_id = *self.open_pages.get(index).ok_or_else(|| {
            DataBookError::Pdf(format!(
                "page {index} out of range for {}",
                self.open_path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<no open document>".into())
            ))
        })?;
        if let Some(text) = overlay {
            overlay_page(&mut self.doc, page_id, self.font_id, text, &self.style)?;
        }
        self.kids.push(page_id);
        Ok(())
    }

    /// Write the page tree, catalog, and outline, and save to `output`.
    #[instrument(skip_all, fields(output = %output.display(), pages = self.kids.len()))]
    pub fn finish(&mut self, outline: &BookmarkTree, output: &Path) -> Result<()> {
        let kids: Vec<Object> = self.kids.iter().map(|id| Object::Reference(*id)).collect();
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => self.kids.len() as i64,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut ids: Vec<u32> = Vec::with_capacity(outline.len());
        for node in outline.nodes() {
            let page = *self.kids.get(node.page_index).ok_or_else(|| {
                DataBookError::Pdf(format!(
                    "bookmark {:?} points past the last page ({})",
                    node.label, node.page_index
                ))
            })?;
            let parent = node.parent.and_then(|p| ids.get(p).copied());
            let format = if node.bold { BOLD } else { 0 };
            let bookmark = Bookmark::new(node.label.clone(), [0.0, 0.0, 0.0], format, page);
            ids.push(self.doc.add_bookmark(bookmark, parent));
        }

        if let Some(outline_id) = self.doc.build_outline() {
            if let Ok(Object::Dictionary(catalog)) = self.doc.get_object_mut(catalog_id) {
                catalog.set("Outlines", outline_id);
                catalog.set("PageMode", "UseOutlines");
            }
        }

        self.doc.compress();
        self.doc
            .save(output)
            .map_err(|e| DataBookError::Pdf(format!("{}: {e}", output.display())))?;
        debug!("merged document written");
        Ok(())
    }
}

/// Page-tree and outline nodes are rebuilt, never copied from sources.
fn is_structural(object: &Object) -> bool {
    let Ok(dict) = object.as_dict() else {
        return false;
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(b"Catalog" | b"Pages" | b"Page" | b"Outlines")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::tests::sample_document;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("databook-pdf-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_sample(dir: &Path, name: &str, pages: usize) -> PathBuf {
        let path = dir.join(name);
        sample_document(pages).save(&path).unwrap();
        path
    }

    #[test]
    fn binds_pages_from_several_files() {
        let tmp = temp_dir();
        let a = write_sample(&tmp, "a.pdf", 2);
        let b = write_sample(&tmp, "b.pdf", 3);

        let mut binder = PdfBinder::new(OverlayStyle::default());
        assert_eq!(binder.open(&a).unwrap(), 2);
        binder.append_page(0, None).unwrap();
        binder.append_page(1, None).unwrap();
        assert_eq!(binder.open(&b).unwrap(), 3);
        for i in 0..3 {
            binder.append_page(i, Some("1.1 Scope - Overview")).unwrap();
        }

        let mut outline = BookmarkTree::new();
        let root = outline.push_root("Intro", 0);
        outline.push_child(root, "Cover", 1);
        outline.push_root("Scope", 2);

        let out = tmp.join("merged.pdf");
        binder.finish(&outline, &out).unwrap();

        let merged = Document::load(&out).unwrap();
        let page_ids: Vec<ObjectId> = merged.get_pages().into_values().collect();
        assert_eq!(page_ids.len(), 5);

        let first = merged.get_dictionary(page_ids[0]).unwrap();
        assert!(first.has(b"MediaBox"), "inherited MediaBox must be flattened");

        for (i, &id) in page_ids.iter().enumerate() {
            let content = merged.get_page_content(id).unwrap();
            let text = String::from_utf8_lossy(&content);
            let expected = if i < 2 { 0 } else { 1 };
            assert_eq!(text.matches("1.1 Scope - Overview").count(), expected, "page {i}");
            assert_eq!(text.matches("DbWm").count(), expected, "page {i}");
        }

        let catalog = merged.catalog().unwrap();
        let outlines_id = catalog.get(b"Outlines").unwrap().as_reference().unwrap();
        let outlines = merged.get_dictionary(outlines_id).unwrap();
        let mut roots = Vec::new();
        let mut next = outlines.get(b"First").and_then(Object::as_reference).ok();
        while let Some(id) = next {
            let item = merged.get_dictionary(id).unwrap();
            roots.push(item);
            next = item.get(b"Next").and_then(Object::as_reference).ok();
        }
        assert_eq!(roots.len(), 2);
        for item in &roots {
            assert_eq!(item.get(b"F").unwrap().as_i64().unwrap(), BOLD as i64);
        }

        let children: Vec<_> = roots
            .iter()
            .filter_map(|item| item.get(b"First").and_then(Object::as_reference).ok())
            .map(|id| merged.get_dictionary(id).unwrap())
            .collect();
        assert_eq!(children.len(), 1, "only Intro has a child");
        let child_format = children[0].get(b"F").and_then(Object::as_i64).unwrap_or(0);
        assert_eq!(child_format, 0);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn out_of_range_page_is_an_error() {
        let tmp = temp_dir();
        let a = write_sample(&tmp, "a.pdf", 1);

        let mut binder = PdfBinder::new(OverlayStyle::default());
        binder.open(&a).unwrap();
        let err = binder.append_page(3, None).unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn bookmark_past_last_page_is_an_error() {
        let tmp = temp_dir();
        let mut binder = PdfBinder::new(OverlayStyle::default());
        let mut outline = BookmarkTree::new();
        outline.push_root("Nothing", 0);
        assert!(binder.finish(&outline, &tmp.join("x.pdf")).is_err());
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
