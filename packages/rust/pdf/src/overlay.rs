//! Single-line text overlays drawn on top of existing page content.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};

use databook_shared::{DataBookError, Result};

/// Resource name the overlay font is registered under on every page.
pub(crate) const FONT_KEY: &str = "DbWm";

/// Page attributes a page may inherit from its `Pages` ancestors.
pub(crate) const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic `Parent` chains in malformed files.
const MAX_TREE_DEPTH: usize = 64;

/// A4 portrait, used when a page declares no usable box.
const FALLBACK_BOX: [f32; 4] = [0.0, 0.0, 595.0, 842.0];

/// Placement of overlay text, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub font_size: f32,
    /// Offset from the lower-left corner of the page's visible box.
    pub margin: f32,
    /// Fill gray level, 0.0 black to 1.0 white.
    pub gray: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            font_size: 7.0,
            margin: 12.0,
            gray: 0.4,
        }
    }
}

/// Add the overlay font to `doc` and return its object id.
pub(crate) fn add_font(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Look up `key` on a page, walking up the page tree when it is absent.
pub(crate) fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        other => other,
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// The visible area of a page: `CropBox`, else `MediaBox`.
pub(crate) fn page_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let rect = |key: &[u8]| -> Option<[f32; 4]> {
        let items = inherited(doc, page_id, key)?.as_array().ok()?;
        let values: Vec<f32> = items.iter().filter_map(|o| number(resolve(doc, o))).collect();
        <[f32; 4]>::try_from(values).ok()
    };
    rect(b"CropBox")
        .or_else(|| rect(b"MediaBox"))
        .unwrap_or(FALLBACK_BOX)
}

/// Encode text for a WinAnsi Type1 font; characters outside Latin-1 become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            code @ (0x20..=0x7e | 0xa0..=0xff) => code as u8,
            _ => b'?',
        })
        .collect()
}

fn pdf_error(context: &str, err: impl std::fmt::Display) -> DataBookError {
    DataBookError::Pdf(format!("{context}: {err}"))
}

/// Draw `text` along the bottom edge of a page, above its existing content.
///
/// The existing content is wrapped in `q`/`Q` so its graphics state cannot
/// leak into the overlay.
pub(crate) fn overlay_page(
    doc: &mut Document,
    page_id: ObjectId,
    font_id: ObjectId,
    text: &str,
    style: &OverlayStyle,
) -> Result<()> {
    let [x0, y0, x1, y1] = page_box(doc, page_id);
    let x = x0.min(x1) + style.margin;
    let y = y0.min(y1) + style.margin;

    let mut resources = match inherited(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };
    let mut fonts = match resources.get(b"Font").map(|o| resolve(doc, o)) {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };
    fonts.set(FONT_KEY, font_id);
    resources.set("Font", fonts);

    let existing: Vec<Object> = {
        let page = doc
            .get_dictionary(page_id)
            .map_err(|e| pdf_error("page lookup", e))?;
        match page.get(b"Contents") {
            Ok(Object::Array(items)) => items.clone(),
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            _ => Vec::new(),
        }
    };

    let overlay = Content {
        operations: vec![
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![FONT_KEY.into(), style.font_size.into()]),
            Operation::new("g", vec![style.gray.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(win_ansi(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ],
    };
    let overlay_bytes = overlay
        .encode()
        .map_err(|e| pdf_error("encode overlay", e))?;

    let prefix_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), overlay_bytes));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(prefix_id));
    contents.extend(existing);
    contents.push(Object::Reference(overlay_id));

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| pdf_error("page lookup", e))?;
    page.set("Contents", contents);
    page.set("Resources", resources);
    Ok(())
}
