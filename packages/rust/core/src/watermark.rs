//! Watermark text for authored and reference pages.

use databook_shared::{BuildConfig, CanonicalName};

/// Gap between the document identity and the book identity.
const FIELD_PADDING: &str = "                  ";

/// Keeps the text clear of the page edge.
const TRAILING_PADDING: &str = "    ";

/// Marker that opens every reference watermark.
pub const REFERENCE_MARKER: &str = "REFERENCE DOCUMENT";

/// Book-wide fields shared by every watermark of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkContext {
    pub title: String,
    pub datestamp: String,
}

impl From<&BuildConfig> for WatermarkContext {
    fn from(config: &BuildConfig) -> Self {
        Self {
            title: config.title.clone(),
            datestamp: config.datestamp.clone(),
        }
    }
}

/// Front matter (section 0) is never watermarked.
pub fn is_watermarked(section_number: u32) -> bool {
    section_number > 0
}

/// Text for one page of an authored document, carrying the visible page number.
pub fn authored_watermark(
    ctx: &WatermarkContext,
    name: &CanonicalName,
    visible_page: usize,
) -> String {
    format!(
        "{}.{} {} - {}{FIELD_PADDING}{}, {}, page {visible_page}{TRAILING_PADDING}",
        name.section_number,
        name.document_number,
        name.section_name,
        name.document_name,
        ctx.title,
        ctx.datestamp,
    )
}

/// Text stamped on every page of a reference document.
pub fn reference_watermark(ctx: &WatermarkContext, name: &CanonicalName) -> String {
    format!(
        "{REFERENCE_MARKER}:  {}.{} {} - {}{FIELD_PADDING}{}, {}{TRAILING_PADDING}",
        name.section_number,
        name.document_number,
        name.section_name,
        name.document_name,
        ctx.title,
        ctx.datestamp,
    )
}
