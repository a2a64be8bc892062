//! PDF page operations for DataBook, backed by `lopdf`.
//!
//! - [`PdfBinder`] merges pages of many files into one outlined document,
//!   drawing a text overlay on selected pages.
//! - [`stamp_all_pages`] writes a copy of a file with the same text on every page.

mod binder;
mod overlay;

pub use binder::PdfBinder;
pub use overlay::OverlayStyle;

use std::path::Path;

use lopdf::Document;
use tracing::{debug, instrument};

use databook_shared::{DataBookError, Result};

fn load(path: &Path) -> Result<Document> {
    Document::load(path).map_err(|e| DataBookError::Pdf(format!("{}: {e}", path.display())))
}

/// Stamp `text` on every page of `input` and write the result to `output`.
/// Returns the number of pages stamped.
#[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
pub fn stamp_all_pages(output: &Path, text: &str, input: &Path, style: &OverlayStyle) -> Result<usize> {
    let mut doc = load(input)?;
    let font_id = overlay::add_font(&mut doc);
    let page_ids: Vec<_> = doc.get_pages().into_values().collect();

    for &page_id in &page_ids {
        overlay::overlay_page(&mut doc, page_id, font_id, text, style)?;
    }

    doc.compress();
    doc.save(output)
        .map_err(|e| DataBookError::Pdf(format!("{}: {e}", output.display())))?;
    debug!(pages = page_ids.len(), "stamped every page");
    Ok(page_ids.len())
}
