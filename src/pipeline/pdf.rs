//! Page-level edits on existing PDFs, built on lopdf.
//!
//! ## Inherited page attributes
//!
//! `Resources`, `MediaBox`, `CropBox` and `Rotate` may live on any ancestor
//! in the page tree rather than on the page itself. Whenever a page is moved
//! into a new tree (merge, split) or edited in place (rotate, watermark),
//! the effective value is looked up through the `Parent` chain first. Merge
//! and split then copy it onto the page so the source tree can be dropped.

use crate::error::{DocsmithError, Result};
use crate::operation::CompressionLevel;
use crate::pipeline::compose::{encode_win_ansi, helvetica, text_width};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;
use tracing::debug;

const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Page tree depth beyond which we assume a `Parent` cycle.
const MAX_TREE_DEPTH: usize = 64;

/// Paragraph `pdf-to-word` writes when a document has no extractable text.
pub const NO_TEXT_PLACEHOLDER: &str = "This PDF appears to contain images or non-text content.";

const WATERMARK_SIZE: f32 = 50.0;
const WATERMARK_OPACITY: f32 = 0.3;
const WATERMARK_FONT: &[u8] = b"DocsmithWmFont";
const WATERMARK_STATE: &[u8] = b"DocsmithWmGs";

/// Serialise a document.
pub fn save(doc: &mut Document) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| DocsmithError::processing("PDF write", e))?;
    Ok(buf)
}

/// Number of pages.
pub fn page_count(doc: &Document) -> usize {
    doc.get_pages().len()
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// Effective value of `key` for a page, walking up through `Parent`.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok();
    let mut depth = 0;
    while let Some(dict) = node {
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        node = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }
    None
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Effective `MediaBox` as `(x0, y0, x1, y1)`; US Letter when absent.
pub fn media_box(doc: &Document, page_id: ObjectId) -> (f32, f32, f32, f32) {
    inherited(doc, page_id, b"MediaBox")
        .map(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok())
        .and_then(|arr| {
            let v: Vec<f32> = arr.iter().filter_map(|o| number(resolve(doc, o))).collect();
            (v.len() == 4).then(|| (v[0], v[1], v[2], v[3]))
        })
        .unwrap_or((0.0, 0.0, 612.0, 792.0))
}

/// Effective `/Rotate`, normalised to `0..360`.
pub fn rotation(doc: &Document, page_id: ObjectId) -> i64 {
    inherited(doc, page_id, b"Rotate")
        .map(|o| resolve(doc, o))
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(0)
        .rem_euclid(360)
}

fn type_of(obj: &Object) -> Option<&[u8]> {
    obj.as_dict().ok()?.get(b"Type").ok()?.as_name().ok()
}

/// Page-tree structure that must not be copied into a new document.
fn is_tree_node(obj: &Object) -> bool {
    matches!(
        type_of(obj),
        Some(b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline")
    )
}

/// Assemble a new document from `(source, page numbers)` pairs, keeping the
/// given page order. Inherited attributes are copied onto each page.
fn assemble(sources: Vec<(Document, Vec<u32>)>) -> Result<Document> {
    let mut next_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for (mut source, selection) in sources {
        source.renumber_objects_with(next_id);
        next_id = source.max_id + 1;

        let page_ids = source.get_pages();
        for number in selection {
            let page_id = *page_ids.get(&number).ok_or_else(|| {
                DocsmithError::Processing(format!("page {number} does not exist"))
            })?;
            let mut page = source.get_dictionary(page_id)?.clone();
            for key in INHERITABLE {
                if !page.has(key) {
                    if let Some(value) = inherited(&source, page_id, key) {
                        page.set(key.to_vec(), value.clone());
                    }
                }
            }
            pages.push((page_id, page));
        }

        objects.extend(
            source
                .objects
                .into_iter()
                .filter(|(_, obj)| !is_tree_node(obj)),
        );
    }

    let mut doc = Document::with_version("1.5");
    doc.objects = objects;
    doc.max_id = next_id - 1;

    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();
    let count = pages.len() as i64;
    for (id, mut page) in pages {
        page.set("Parent", pages_id);
        doc.objects.insert(id, Object::Dictionary(page));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.prune_objects();
    doc.renumber_objects();
    Ok(doc)
}

/// Concatenate documents, every page of each in input order.
pub fn merge(docs: Vec<Document>) -> Result<Document> {
    let sources = docs
        .into_iter()
        .map(|doc| {
            let numbers = doc.get_pages().into_keys().collect();
            (doc, numbers)
        })
        .collect();
    let merged = assemble(sources)?;
    debug!("Merged document has {} pages", page_count(&merged));
    Ok(merged)
}

/// One single-page document per page, in page order.
pub fn split(doc: &Document) -> Result<Vec<Document>> {
    let numbers: Vec<u32> = doc.get_pages().into_keys().collect();
    if numbers.is_empty() {
        return Err(DocsmithError::Processing("PDF has no pages".into()));
    }
    numbers
        .into_iter()
        .map(|n| assemble(vec![(doc.clone(), vec![n])]))
        .collect()
}

/// Add `degrees` to every page's effective rotation.
pub fn rotate(doc: &mut Document, degrees: i64) -> Result<()> {
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for page_id in page_ids {
        let next = (rotation(doc, page_id) + degrees).rem_euclid(360);
        doc.get_object_mut(page_id)?
            .as_dict_mut()?
            .set("Rotate", next);
    }
    Ok(())
}

/// Copy of a dictionary-valued object, following one reference.
fn dict_value(doc: &Document, obj: Option<&Object>) -> Dictionary {
    obj.map(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

/// Register `name → id` in the `category` sub-dictionary of `resources`.
fn add_resource(
    doc: &Document,
    resources: &mut Dictionary,
    category: &[u8],
    name: &[u8],
    id: ObjectId,
) {
    let mut entries = dict_value(doc, resources.get(category).ok());
    entries.set(name.to_vec(), id);
    resources.set(category.to_vec(), entries);
}

fn watermark_ops(text: &[u8], width: f32, center: (f32, f32)) -> Vec<Operation> {
    let (sin, cos) = std::f32::consts::FRAC_PI_4.sin_cos();
    vec![
        Operation::new("q", vec![]),
        Operation::new("gs", vec![Object::Name(WATERMARK_STATE.to_vec())]),
        Operation::new("g", vec![Object::Integer(0)]),
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![
                Object::Name(WATERMARK_FONT.to_vec()),
                Object::Real(WATERMARK_SIZE),
            ],
        ),
        Operation::new(
            "Tm",
            [cos, sin, -sin, cos, center.0, center.1]
                .into_iter()
                .map(Object::Real)
                .collect(),
        ),
        Operation::new(
            "Td",
            vec![
                Object::Real(-width / 2.0),
                Object::Real(-WATERMARK_SIZE / 3.0),
            ],
        ),
        Operation::new("Tj", vec![Object::String(text.to_vec(), StringFormat::Literal)]),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ]
}

/// Stamp `text` diagonally across the centre of every page at 30% opacity.
///
/// The page's existing content is wrapped in `q`/`Q` so whatever graphics
/// state it leaves behind cannot leak into the stamp.
pub fn watermark(doc: &mut Document, text: &str) -> Result<()> {
    let encoded = encode_win_ansi(text);
    let width = text_width(text, WATERMARK_SIZE);

    let font_id = doc.add_object(helvetica());
    let state_id = doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "ca" => Object::Real(WATERMARK_OPACITY),
        "CA" => Object::Real(WATERMARK_OPACITY),
    });
    let save_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let restore_id = doc.add_object(Stream::new(dictionary! {}, b"Q\n".to_vec()));

    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for page_id in page_ids {
        let (x0, y0, x1, y1) = media_box(doc, page_id);
        let center = ((x0 + x1) / 2.0, (y0 + y1) / 2.0);

        let mut resources = dict_value(doc, inherited(doc, page_id, b"Resources"));
        add_resource(doc, &mut resources, b"Font", WATERMARK_FONT, font_id);
        add_resource(doc, &mut resources, b"ExtGState", WATERMARK_STATE, state_id);

        let stamp = Content {
            operations: watermark_ops(&encoded, width, center),
        }
        .encode()?;
        let stamp_id = doc.add_object(Stream::new(dictionary! {}, stamp));

        let mut contents = content_streams(doc, page_id);
        let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
        contents.insert(0, Object::Reference(save_id));
        contents.push(Object::Reference(restore_id));
        contents.push(Object::Reference(stamp_id));
        page.set("Contents", contents);
        page.set("Resources", resources);
    }
    Ok(())
}

/// A page's content streams as a flat list. `/Contents` may be a stream,
/// an array of streams, or a reference to such an array.
fn content_streams(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let Ok(contents) = doc.get_dictionary(page_id).and_then(|p| p.get(b"Contents")) else {
        return Vec::new();
    };
    match contents {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Object::Array(items) => items.clone(),
        _ => Vec::new(),
    }
}

/// Shrink a document in place. Every level keeps all pages and content.
pub fn compact(doc: &mut Document, level: CompressionLevel) {
    doc.prune_objects();
    match level {
        CompressionLevel::Low => {}
        CompressionLevel::Medium => doc.compress(),
        CompressionLevel::High => {
            doc.compress();
            doc.delete_zero_length_streams();
            doc.prune_objects();
            doc.renumber_objects();
        }
    }
}

/// Extract text page by page, in page order. Pages whose text cannot be
/// decoded come back empty rather than failing the whole document.
pub fn extract_text(doc: &Document) -> Vec<String> {
    doc.get_pages()
        .into_keys()
        .map(|number| match doc.extract_text(&[number]) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                debug!("No text on page {}: {}", number, e);
                String::new()
            }
        })
        .collect()
}

/// The `pdf-to-text` layout: a `Page N:` header per page.
pub fn text_report(pages: &[String]) -> String {
    let mut out = String::new();
    for (i, text) in pages.iter().enumerate() {
        let body = if text.is_empty() {
            format!("[Text content from page {}]", i + 1)
        } else {
            text.clone()
        };
        out.push_str(&format!("Page {}:\n\n{}\n\n", i + 1, body));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::sample_pdf;

    fn load(widths: &[i64]) -> Document {
        Document::load_mem(&sample_pdf(widths)).unwrap()
    }

    fn widths(doc: &Document) -> Vec<f32> {
        doc.get_pages()
            .into_values()
            .map(|id| {
                let (x0, _, x1, _) = media_box(doc, id);
                x1 - x0
            })
            .collect()
    }

    fn round_trip(mut doc: Document) -> Document {
        Document::load_mem(&save(&mut doc).unwrap()).unwrap()
    }

    #[test]
    fn merge_keeps_input_and_page_order() {
        let merged = merge(vec![load(&[100, 110]), load(&[200]), load(&[300, 310, 320])]).unwrap();
        let merged = round_trip(merged);
        assert_eq!(
            widths(&merged),
            vec![100.0, 110.0, 200.0, 300.0, 310.0, 320.0]
        );
    }

    #[test]
    fn merged_pages_carry_inherited_resources() {
        let merged = round_trip(merge(vec![load(&[100]), load(&[200])]).unwrap());
        for id in merged.get_pages().into_values() {
            let page = merged.get_dictionary(id).unwrap();
            assert!(page.has(b"Resources"));
            assert!(page.has(b"MediaBox"));
        }
    }

    #[test]
    fn split_yields_one_document_per_page() {
        let parts = split(&load(&[100, 200, 300])).unwrap();
        assert_eq!(parts.len(), 3);
        for (part, expected) in parts.into_iter().zip([100.0, 200.0, 300.0]) {
            let part = round_trip(part);
            assert_eq!(widths(&part), vec![expected]);
        }
    }

    #[test]
    fn rotate_is_additive() {
        let mut doc = load(&[100, 200]);
        rotate(&mut doc, 90).unwrap();
        rotate(&mut doc, 270).unwrap();
        rotate(&mut doc, 180).unwrap();
        let doc = round_trip(doc);
        for id in doc.get_pages().into_values() {
            assert_eq!(rotation(&doc, id), 180);
        }
    }

    #[test]
    fn rotate_respects_inherited_value() {
        let mut doc = load(&[100]);
        let pages_root = doc
            .catalog()
            .unwrap()
            .get(b"Pages")
            .unwrap()
            .as_reference()
            .unwrap();
        doc.get_object_mut(pages_root)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Rotate", 90);
        rotate(&mut doc, 270).unwrap();
        let page = *doc.get_pages().get(&1).unwrap();
        assert_eq!(rotation(&doc, page), 0);
    }

    #[test]
    fn watermark_keeps_pages_and_adds_stamp() {
        let mut doc = load(&[400, 500]);
        watermark(&mut doc, "CONFIDENTIAL").unwrap();
        let doc = round_trip(doc);
        assert_eq!(page_count(&doc), 2);
        for id in doc.get_pages().into_values() {
            let content = doc.get_page_content(id).unwrap();
            let needle = b"CONFIDENTIAL";
            assert!(content.windows(needle.len()).any(|w| w == needle));
            let resources = dict_value(&doc, doc.get_dictionary(id).unwrap().get(b"Resources").ok());
            let fonts = dict_value(&doc, resources.get(b"Font").ok());
            assert!(fonts.has(b"F1"), "original font must survive");
            assert!(fonts.has(WATERMARK_FONT));
        }
    }

    #[test]
    fn compact_keeps_every_page() {
        for level in [
            CompressionLevel::Low,
            CompressionLevel::Medium,
            CompressionLevel::High,
        ] {
            let mut doc = load(&[100, 200, 300]);
            compact(&mut doc, level);
            assert_eq!(page_count(&round_trip(doc)), 3, "{level:?}");
        }
    }

    #[test]
    fn report_uses_placeholder_for_empty_pages() {
        let report = text_report(&["hello".into(), String::new()]);
        assert!(report.starts_with("Page 1:\n\nhello\n\n"));
        assert!(report.ends_with("Page 2:\n\n[Text content from page 2]\n\n"));
        assert!(!report.contains(NO_TEXT_PLACEHOLDER));
    }

    #[test]
    fn watermark_flattens_referenced_content_array() {
        let mut doc = load(&[300]);
        let page_id = doc.get_pages()[&1];
        let original = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Contents")
            .unwrap()
            .clone();
        let array_id = doc.add_object(Object::Array(vec![original]));
        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Contents", array_id);

        watermark(&mut doc, "DRAFT").unwrap();

        let contents = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Contents")
            .unwrap()
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(contents.len(), 4);
        for item in &contents {
            let id = item.as_reference().unwrap();
            assert!(doc.get_object(id).unwrap().as_stream().is_ok());
        }
        let content = doc.get_page_content(page_id).unwrap();
        assert!(content.windows(7).any(|w| w == b"(Page 1"));
        assert!(content.windows(5).any(|w| w == b"DRAFT"));
    }

    #[test]
    fn extract_text_has_one_entry_per_page() {
        assert_eq!(extract_text(&load(&[100, 200])).len(), 2);
    }
}
