//! Build new PDFs from scratch: flowed plain text (word-to-pdf) and one page
//! per image (image-to-pdf).
//!
//! Text is set in the standard Helvetica font, which every PDF reader ships,
//! so nothing is embedded. That limits output to the WinAnsi character set;
//! anything outside it is replaced by `?`.

use crate::error::{DocsmithError, Result};
use image::{ColorType, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

/// US Letter, in points.
pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;

const MARGIN: f32 = 50.0;
const FONT_SIZE: f32 = 12.0;
const LEADING: f32 = 14.0;
const TEXT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN - 12.0;
const FIRST_BASELINE: f32 = PAGE_HEIGHT - 42.0;

/// Lines that fit between the first baseline and the bottom margin.
pub const LINES_PER_PAGE: usize = ((FIRST_BASELINE - MARGIN) / LEADING) as usize + 1;

/// Helvetica advance widths for 0x20..=0x7E, in 1/1000 em.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// Width of `text` set in Helvetica at `size` points.
pub fn text_width(text: &str, size: f32) -> f32 {
    let units: u32 = encode_win_ansi(text)
        .iter()
        .map(|&b| match b {
            0x20..=0x7E => u32::from(HELVETICA_WIDTHS[usize::from(b - 0x20)]),
            _ => 556,
        })
        .sum();
    units as f32 * size / 1000.0
}

/// Encode for a font using `WinAnsiEncoding`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .filter_map(|c| match c {
            '\t' => Some(b' '),
            c if (c as u32) < 0x20 => None,
            '€' => Some(0x80),
            '‚' => Some(0x82),
            '„' => Some(0x84),
            '…' => Some(0x85),
            '‘' => Some(0x91),
            '’' => Some(0x92),
            '“' => Some(0x93),
            '”' => Some(0x94),
            '•' => Some(0x95),
            '–' => Some(0x96),
            '—' => Some(0x97),
            '™' => Some(0x99),
            c if (c as u32) < 0x7F || (0xA0..=0xFF).contains(&(c as u32)) => Some(c as u8),
            _ => Some(b'?'),
        })
        .collect()
}

/// The standard Helvetica font dictionary.
pub fn helvetica() -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Greedy word wrap. Paragraph breaks are kept; blank paragraphs become
/// blank lines. Words wider than a line are broken between characters.
pub fn wrap(text: &str, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{line} {word}")
            };
            if text_width(&candidate, size) <= max_width {
                line = candidate;
                continue;
            }
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            for c in word.chars() {
                line.push(c);
                if text_width(&line, size) > max_width && line.chars().count() > 1 {
                    line.pop();
                    lines.push(std::mem::take(&mut line));
                    line.push(c);
                }
            }
        }
        lines.push(line);
    }
    lines
}

/// Lay out plain text on as many Letter pages as it needs.
pub fn text_document(text: &str) -> Result<Document> {
    let mut lines = wrap(text, FONT_SIZE, TEXT_WIDTH);
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(helvetica());
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    let chunks: Vec<&[String]> = if lines.is_empty() {
        vec![lines.as_slice()]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };
    for chunk in chunks {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), Object::Real(FONT_SIZE)]),
            Operation::new("TL", vec![Object::Real(LEADING)]),
            Operation::new("Td", vec![Object::Real(MARGIN), Object::Real(FIRST_BASELINE)]),
        ];
        for (i, line) in chunk.iter().enumerate() {
            if i > 0 {
                operations.push(Operation::new("T*", vec![]));
            }
            if !line.is_empty() {
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::String(encode_win_ansi(line), StringFormat::Literal)],
                ));
            }
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations }.encode()?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    debug!("Laid out {} lines on {} pages", lines.len(), kids.len());
    let pages = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), Object::Real(PAGE_WIDTH), Object::Real(PAGE_HEIGHT)],
    };
    finish(doc, pages_id, pages)
}

/// One page per image, each page exactly the image's pixel size in points.
pub fn image_document(images: &[(String, Vec<u8>)]) -> Result<Document> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();

    for (name, bytes) in images {
        let (width, height, xobject) = image_xobject(bytes)
            .map_err(|e| DocsmithError::Processing(format!("'{name}': {e}")))?;
        let image_id = doc.add_object(xobject);
        let (w, h) = (width as f32, height as f32);
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    [w, 0.0, 0.0, h, 0.0, 0.0].into_iter().map(Object::Real).collect(),
                ),
                Operation::new("Do", vec!["Im0".into()]),
                Operation::new("Q", vec![]),
            ],
        }
        .encode()?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(w), Object::Real(h)],
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(Object::Reference(page_id));
        debug!("Placed '{}' on a {}x{} pt page", name, width, height);
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
    };
    finish(doc, pages_id, pages)
}

/// Image XObject for encoded image bytes. Baseline RGB and greyscale JPEGs
/// pass through untouched as `DCTDecode`; everything else is flattened to
/// raw RGB and left for [`Document::compress`] to deflate.
fn image_xobject(bytes: &[u8]) -> Result<(u32, u32, Stream)> {
    let format = image::guess_format(bytes)?;
    let img = image::load_from_memory_with_format(bytes, format)?;
    let (width, height) = (img.width(), img.height());

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => i64::from(width),
        "Height" => i64::from(height),
        "BitsPerComponent" => 8,
    };

    let passthrough = format == ImageFormat::Jpeg
        && matches!(img.color(), ColorType::Rgb8 | ColorType::L8);
    let stream = if passthrough {
        let space = if img.color() == ColorType::L8 {
            "DeviceGray"
        } else {
            "DeviceRGB"
        };
        dict.set("ColorSpace", space);
        dict.set("Filter", "DCTDecode");
        let mut stream = Stream::new(dict, bytes.to_vec());
        stream.allows_compression = false;
        stream
    } else {
        dict.set("ColorSpace", "DeviceRGB");
        Stream::new(dict, super::image::flatten(&img).into_raw())
    };
    Ok((width, height, stream))
}

fn finish(mut doc: Document, pages_id: ObjectId, pages: Dictionary) -> Result<Document> {
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();
    Ok(doc)
}
